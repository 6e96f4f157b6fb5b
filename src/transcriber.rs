use std::path::Path;

use candle_core::{Device, IndexOp, Tensor};
use candle_nn::{VarBuilder, ops::softmax};
use candle_transformers::models::whisper::{self as m, Config, audio, model::Whisper as Model};
use hf_hub::{Repo, RepoType, api::sync::Api};
use rand::SeedableRng;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand_distr::weighted::WeightedIndex;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::config::{TranscriptionConfig, WhisperLanguage, WhisperModel};
use crate::error::{Error, Result, ResultExt, require_exists};
use crate::{audio as pcm, multilingual, utils};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    /// Detected (or assumed) language of the recording.
    pub language: String,
}

/// Speech recognition: audio file in, text and spoken language out.
pub trait Transcribe: Send + Sync {
    fn transcribe(&self, audio_path: &Path) -> Result<Transcription>;
}

pub struct WhisperTranscriber {
    device: Device,
    model: WhisperModel,
    language: WhisperLanguage,
}

impl WhisperTranscriber {
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let device = utils::device(config.cpu).model_load("select device")?;
        Ok(WhisperTranscriber {
            device,
            model: config.model,
            language: config.language,
        })
    }

    fn load_model(&self) -> Result<(Model, Tokenizer, Config)> {
        info!("Loading Whisper model: {:?}", self.model);

        let (model_id, revision) = self.model.model_and_revision(self.language);
        let api = Api::new().model_load("hf-hub api")?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        let config_filename = repo.get("config.json").model_load(model_id)?;
        let tokenizer_filename = repo.get("tokenizer.json").model_load(model_id)?;
        let weights_filename = repo.get("model.safetensors").model_load(model_id)?;

        let config_json = std::fs::read_to_string(config_filename)?;
        let config: Config = serde_json::from_str(&config_json).model_load("whisper config")?;
        let tokenizer = Tokenizer::from_file(tokenizer_filename).model_load("whisper tokenizer")?;

        // SAFETY: the weights file is owned by the hf-hub cache and not mutated while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_filename], m::DTYPE, &self.device)
                .model_load("whisper weights")?
        };
        let model = Model::load(&vb, config.clone()).model_load("whisper model")?;
        Ok((model, tokenizer, config))
    }
}

impl Transcribe for WhisperTranscriber {
    fn transcribe(&self, audio_path: &Path) -> Result<Transcription> {
        require_exists(audio_path)?;

        let (pcm_data, sample_rate) =
            pcm::load_audio(audio_path).transcription(&audio_path.display().to_string())?;
        if pcm_data.is_empty() {
            return Err(Error::Transcription(format!(
                "{}: no audio samples",
                audio_path.display()
            )));
        }
        if sample_rate != m::SAMPLE_RATE as u32 {
            debug!("Resampling from {}Hz to {}Hz", sample_rate, m::SAMPLE_RATE);
        }
        let pcm_data = pcm::resample(&pcm_data, sample_rate, m::SAMPLE_RATE as u32);

        let (mut model, tokenizer, config) = self.load_model()?;

        let mel_filters = pcm::mel_filters::<f32>(m::SAMPLE_RATE, m::N_FFT, config.num_mel_bins);
        let mel = audio::pcm_to_mel(&config, &pcm_data, &mel_filters);
        let mel_len = mel.len();
        let mel = Tensor::from_vec(
            mel,
            (1, config.num_mel_bins, mel_len / config.num_mel_bins),
            &self.device,
        )
        .transcription("mel spectrogram")?;
        debug!("Mel spectrogram: {:?}", mel.dims());

        let (language_token, language) = match self.language {
            WhisperLanguage::Auto => {
                let (token, code) = multilingual::detect_language(&mut model, &tokenizer, &mel)
                    .transcription("language detection")?;
                (Some(token), multilingual::pipeline_code(code).to_string())
            }
            WhisperLanguage::English => (None, "en".to_string()),
        };

        let mut decoder = Decoder::new(model, tokenizer, &self.device, language_token)
            .transcription("decoder setup")?;
        let text = decoder.run(&mel).transcription("decoding")?;
        info!(
            "Transcribed {} ({} chars, language '{}')",
            audio_path.display(),
            text.len(),
            language
        );

        Ok(Transcription { text, language })
    }
}

struct Decoder {
    model: Model,
    rng: StdRng,
    tokenizer: Tokenizer,
    suppress_tokens: Tensor,
    sot_token: u32,
    transcribe_token: u32,
    eot_token: u32,
    no_speech_token: u32,
    no_timestamps_token: u32,
    language_token: Option<u32>,
}

#[derive(Debug, Clone)]
struct DecodingResult {
    text: String,
    avg_logprob: f64,
    no_speech_prob: f64,
    compression_ratio: f64,
}

impl Decoder {
    fn new(
        model: Model,
        tokenizer: Tokenizer,
        device: &Device,
        language_token: Option<u32>,
    ) -> candle_core::Result<Self> {
        let no_timestamps_token = utils::token_id(&tokenizer, m::NO_TIMESTAMPS_TOKEN)?;
        let suppress_tokens: Vec<f32> = (0..model.config.vocab_size as u32)
            .map(|i| {
                if model.config.suppress_tokens.contains(&i) {
                    f32::NEG_INFINITY
                } else {
                    0f32
                }
            })
            .collect();
        let suppress_tokens = Tensor::new(suppress_tokens.as_slice(), device)?;
        let sot_token = utils::token_id(&tokenizer, m::SOT_TOKEN)?;
        let transcribe_token = utils::token_id(&tokenizer, m::TRANSCRIBE_TOKEN)?;
        let eot_token = utils::token_id(&tokenizer, m::EOT_TOKEN)?;
        let no_speech_token = m::NO_SPEECH_TOKENS
            .iter()
            .find_map(|token| utils::token_id(&tokenizer, token).ok());
        let Some(no_speech_token) = no_speech_token else {
            candle_core::bail!("unable to find any non-speech token")
        };
        Ok(Self {
            model,
            rng: StdRng::seed_from_u64(299792458),
            tokenizer,
            suppress_tokens,
            sot_token,
            transcribe_token,
            eot_token,
            no_speech_token,
            no_timestamps_token,
            language_token,
        })
    }

    fn run(&mut self, mel: &Tensor) -> candle_core::Result<String> {
        let (_, _, content_frames) = mel.dims3()?;
        let mut seek = 0;
        let mut text = String::new();

        while seek < content_frames {
            self.model.reset_kv_cache();
            let segment_size = usize::min(content_frames - seek, m::N_FRAMES);
            let mel_segment = mel.narrow(2, seek, segment_size)?;
            let dr = self.decode_with_fallback(&mel_segment)?;
            seek += segment_size;

            if dr.no_speech_prob > m::NO_SPEECH_THRESHOLD && dr.avg_logprob < m::LOGPROB_THRESHOLD {
                debug!("no speech detected, skipping window ending at frame {seek}");
                continue;
            }
            let piece = dr.text.trim();
            if !piece.is_empty() {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(piece);
            }
        }

        Ok(text)
    }

    fn decode_with_fallback(&mut self, segment: &Tensor) -> candle_core::Result<DecodingResult> {
        for (i, &t) in m::TEMPERATURES.iter().enumerate() {
            let dr = self.decode(segment, t);
            if i == m::TEMPERATURES.len() - 1 {
                return dr;
            }
            // On errors, we try again with a different temperature.
            match dr {
                Ok(dr) => {
                    let needs_fallback = dr.compression_ratio > m::COMPRESSION_RATIO_THRESHOLD
                        || dr.avg_logprob < m::LOGPROB_THRESHOLD;
                    if !needs_fallback || dr.no_speech_prob > m::NO_SPEECH_THRESHOLD {
                        return Ok(dr);
                    }
                }
                Err(err) => debug!("Error running at {t}: {err}"),
            }
        }
        candle_core::bail!("no temperatures configured")
    }

    fn decode(&mut self, mel: &Tensor, temperature: f64) -> candle_core::Result<DecodingResult> {
        let audio_features = self.model.encoder.forward(mel, true)?;
        let sample_len = self.model.config.max_target_positions / 2;
        let mut sum_logprob = 0f64;
        let mut no_speech_prob = f64::NAN;
        let mut tokens = vec![self.sot_token];
        if let Some(language_token) = self.language_token {
            tokens.push(language_token);
        }
        tokens.push(self.transcribe_token);
        tokens.push(self.no_timestamps_token);

        for i in 0..sample_len {
            let tokens_t = Tensor::new(tokens.as_slice(), mel.device())?.unsqueeze(0)?;
            let ys = self
                .model
                .decoder
                .forward(&tokens_t, &audio_features, i == 0)?;

            if i == 0 {
                let logits = self.model.decoder.final_linear(&ys.i(..1)?)?.i(0)?.i(0)?;
                no_speech_prob = softmax(&logits, 0)?
                    .i(self.no_speech_token as usize)?
                    .to_scalar::<f32>()? as f64;
            }

            let (_, seq_len, _) = ys.dims3()?;
            let logits = self
                .model
                .decoder
                .final_linear(&ys.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?;
            let logits = logits.broadcast_add(&self.suppress_tokens)?;

            let next_token = if temperature > 0f64 {
                let prs = softmax(&(&logits / temperature)?, 0)?;
                let logits_v: Vec<f32> = prs.to_vec1()?;
                let distr = WeightedIndex::new(&logits_v).map_err(candle_core::Error::msg)?;
                distr.sample(&mut self.rng) as u32
            } else {
                let logits_v: Vec<f32> = logits.to_vec1()?;
                logits_v
                    .iter()
                    .enumerate()
                    .max_by(|(_, u), (_, v)| u.total_cmp(v))
                    .map(|(i, _)| i as u32)
                    .unwrap_or(self.eot_token)
            };

            tokens.push(next_token);
            let prob = softmax(&logits, candle_core::D::Minus1)?
                .i(next_token as usize)?
                .to_scalar::<f32>()? as f64;

            if next_token == self.eot_token || tokens.len() > self.model.config.max_target_positions
            {
                break;
            }
            sum_logprob += prob.ln();
        }

        let text = self
            .tokenizer
            .decode(&tokens, true)
            .map_err(candle_core::Error::msg)?;
        let avg_logprob = sum_logprob / tokens.len() as f64;

        Ok(DecodingResult {
            text,
            avg_logprob,
            no_speech_prob,
            compression_ratio: f64::NAN,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_audio_is_resource_not_found() {
        let transcriber = WhisperTranscriber {
            device: Device::Cpu,
            model: WhisperModel::Tiny,
            language: WhisperLanguage::Auto,
        };
        let err = transcriber
            .transcribe(Path::new("/no/such/recording.wav"))
            .unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound(_)));
    }

    #[test]
    fn unreadable_audio_is_transcription_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"not audio").unwrap();
        let transcriber = WhisperTranscriber {
            device: Device::Cpu,
            model: WhisperModel::Tiny,
            language: WhisperLanguage::English,
        };
        let err = transcriber.transcribe(&path).unwrap_err();
        assert!(matches!(err, Error::Transcription(_)), "{err:?}");
    }

    #[test]
    fn english_only_models_use_en_checkpoints() {
        let (id, _) = WhisperModel::Small.model_and_revision(WhisperLanguage::English);
        assert_eq!(id, "openai/whisper-small.en");
    }
}
