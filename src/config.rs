use std::collections::BTreeMap;
use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct VoxReelConfig {
    pub output: OutputConfig,
    pub translation: TranslationConfig,
    pub synthesis: SynthesisConfig,
    pub transcription: TranscriptionConfig,
    pub reel: ReelConfig,
    pub pipeline: PipelineConfig,
}

impl VoxReelConfig {
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file '{}' does not exist", path.display());
                }
                Self::from_file(path)
            }
            None => Ok(VoxReelConfig::default()),
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let file_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: VoxReelConfig = toml::from_str(&file_content).with_context(|| {
            format!(
                "Failed to parse config file '{}' - check TOML syntax",
                path.display()
            )
        })?;

        Ok(config)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub audio_dir: PathBuf,
    pub video_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            audio_dir: PathBuf::from("output/audio/multilingual"),
            video_dir: PathBuf::from("output/videos"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TranslationConfig {
    /// Language scripts are written in; text in this language is never translated.
    pub source_language: String,
    pub cpu: bool,
    pub seed: u64,
    pub max_new_tokens: usize,
    /// Keyed by `source-target`, e.g. `en-es`.
    pub pairs: BTreeMap<String, PairModel>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        // Helsinki-NLP repos only carry safetensors on these PR revisions and
        // ship no fast tokenizer; converted tokenizers live in lmz/candle-marian.
        let pairs = [
            ("en-es", "Helsinki-NLP/opus-mt-en-es", "refs/pr/4", "en-es"),
            ("en-fr", "Helsinki-NLP/opus-mt-en-fr", "refs/pr/9", "en-fr"),
            ("en-ru", "Helsinki-NLP/opus-mt-en-ru", "refs/pr/7", "en-ru"),
            ("en-zh", "Helsinki-NLP/opus-mt-en-zh", "refs/pr/13", "en-zh"),
        ]
        .into_iter()
        .map(|(pair, model, revision, stem)| {
            (
                pair.to_string(),
                PairModel::converted(model, revision, stem),
            )
        })
        .collect();

        TranslationConfig {
            source_language: "en".to_string(),
            cpu: false,
            seed: 299792458,
            max_new_tokens: 512,
            pairs,
        }
    }
}

const CONVERTED_TOKENIZER_REPO: &str = "lmz/candle-marian";

/// Where to fetch one MarianMT model and its tokenizers from.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PairModel {
    pub model_id: String,
    #[serde(default = "PairModel::default_revision")]
    pub revision: String,
    #[serde(default = "PairModel::default_weights")]
    pub weights: String,
    /// Repo holding the tokenizer files, when it differs from `model_id`.
    #[serde(default)]
    pub tokenizer_repo: Option<String>,
    #[serde(default = "PairModel::default_tokenizer")]
    pub tokenizer: String,
    /// Decoder-side tokenizer; defaults to `tokenizer`.
    #[serde(default)]
    pub decoder_tokenizer: Option<String>,
}

impl PairModel {
    pub fn new(model_id: &str) -> Self {
        PairModel {
            model_id: model_id.to_string(),
            revision: Self::default_revision(),
            weights: Self::default_weights(),
            tokenizer_repo: None,
            tokenizer: Self::default_tokenizer(),
            decoder_tokenizer: None,
        }
    }

    /// A model whose tokenizers were converted for candle, e.g. `stem = "en-es"`
    /// reads `tokenizer-marian-base-en-es-en.json` and `...-en-es-es.json`.
    pub fn converted(model_id: &str, revision: &str, stem: &str) -> Self {
        let target = stem.rsplit('-').next().unwrap_or(stem);
        let source = stem.split('-').next().unwrap_or(stem);
        PairModel {
            model_id: model_id.to_string(),
            revision: revision.to_string(),
            weights: Self::default_weights(),
            tokenizer_repo: Some(CONVERTED_TOKENIZER_REPO.to_string()),
            tokenizer: format!("tokenizer-marian-base-{stem}-{source}.json"),
            decoder_tokenizer: Some(format!("tokenizer-marian-base-{stem}-{target}.json")),
        }
    }

    fn default_revision() -> String {
        "main".to_string()
    }

    fn default_weights() -> String {
        "model.safetensors".to_string()
    }

    fn default_tokenizer() -> String {
        "tokenizer.json".to_string()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Coqui TTS command line entry point.
    pub program: String,
    pub model_name: String,
    pub use_cuda: bool,
    pub extra_args: Vec<String>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        SynthesisConfig {
            program: "tts".to_string(),
            model_name: "tts_models/multilingual/multi-dataset/xtts_v2".to_string(),
            use_cuda: false,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub model: WhisperModel,
    pub language: WhisperLanguage,
    pub cpu: bool,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        TranscriptionConfig {
            model: WhisperModel::Base,
            language: WhisperLanguage::Auto,
            cpu: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhisperModel {
    #[serde(rename = "tiny")]
    Tiny,
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "small")]
    Small,
    #[serde(rename = "medium")]
    Medium,
}

impl WhisperModel {
    pub fn model_and_revision(&self, lang: WhisperLanguage) -> (&'static str, &'static str) {
        match lang {
            WhisperLanguage::Auto => match self {
                Self::Tiny => ("openai/whisper-tiny", "main"),
                Self::Base => ("openai/whisper-base", "refs/pr/22"),
                Self::Small => ("openai/whisper-small", "main"),
                Self::Medium => ("openai/whisper-medium", "main"),
            },
            WhisperLanguage::English => match self {
                Self::Tiny => ("openai/whisper-tiny.en", "refs/pr/15"),
                Self::Base => ("openai/whisper-base.en", "refs/pr/13"),
                Self::Small => ("openai/whisper-small.en", "refs/pr/10"),
                Self::Medium => ("openai/whisper-medium.en", "main"),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WhisperLanguage {
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "english")]
    English,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ReelConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub background_color: String,
    pub text_color: String,
    pub accent_color: String,
    /// Explicit font; when unset the first readable `font_fallbacks` entry is used.
    pub font_path: Option<PathBuf>,
    pub font_fallbacks: Vec<PathBuf>,
    pub title_size: f32,
    pub header_size: f32,
    pub body_size: f32,
    pub outro_size: f32,
    pub codec: String,
    pub short_audio: ShortAudioPolicy,
}

impl Default for ReelConfig {
    fn default() -> Self {
        ReelConfig {
            width: 1080,
            height: 1920,
            fps: 30,
            background_color: "#1F2937".to_string(),
            text_color: "#FFFFFF".to_string(),
            accent_color: "#2563EB".to_string(),
            font_path: None,
            font_fallbacks: [
                "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
                "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
                "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
                "/Library/Fonts/Arial Bold.ttf",
                "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
                "C:\\Windows\\Fonts\\arialbd.ttf",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            title_size: 70.0,
            header_size: 60.0,
            body_size: 40.0,
            outro_size: 80.0,
            codec: "libx264".to_string(),
            short_audio: ShortAudioPolicy::default(),
        }
    }
}

/// What to do when narration is shorter than the fixed reel length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortAudioPolicy {
    /// Attach the audio as-is; the video keeps its nominal length.
    #[default]
    Leave,
    PadSilence,
    LoopAudio,
    /// Cut the video down to the audio length.
    ShrinkVideo,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on languages processed at once; 1 keeps the batch sequential.
    pub max_parallel_languages: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            max_parallel_languages: 1,
        }
    }
}
