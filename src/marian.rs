//! MarianMT (opus-mt) translation models running on candle.

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::marian::{self, MTModel};
use hf_hub::{Repo, RepoType, api::sync::Api};
use tokenizers::Tokenizer;
use tracing::debug;

use crate::config::{PairModel, TranslationConfig};
use crate::error::{Result, ResultExt};
use crate::language::LanguagePair;
use crate::translator::{ModelLoader, TranslationModel};
use crate::utils;

pub struct MarianLoader {
    device: Device,
    seed: u64,
    max_new_tokens: usize,
}

impl MarianLoader {
    pub fn new(config: &TranslationConfig) -> Result<Self> {
        let device = utils::device(config.cpu).model_load("select device")?;
        Ok(MarianLoader {
            device,
            seed: config.seed,
            max_new_tokens: config.max_new_tokens,
        })
    }
}

/// Fills fields that older opus-mt `config.json` files omit.
fn with_marian_defaults(mut raw: serde_json::Value) -> serde_json::Value {
    if let Some(obj) = raw.as_object_mut() {
        let vocab_size = obj.get("vocab_size").cloned();
        let pad = obj.get("pad_token_id").cloned();
        let eos = obj.get("eos_token_id").cloned();
        let defaults = [
            ("decoder_vocab_size", vocab_size.unwrap_or(serde_json::Value::Null)),
            ("decoder_start_token_id", pad.unwrap_or(serde_json::json!(0))),
            ("forced_eos_token_id", eos.unwrap_or(serde_json::json!(0))),
            ("share_encoder_decoder_embeddings", serde_json::json!(true)),
            ("use_cache", serde_json::json!(true)),
            ("is_encoder_decoder", serde_json::json!(true)),
            ("scale_embedding", serde_json::json!(true)),
            ("activation_function", serde_json::json!("swish")),
        ];
        for (key, value) in defaults {
            let missing = obj.get(key).is_none_or(|v| v.is_null());
            if missing {
                obj.insert(key.to_string(), value);
            }
        }
    }
    raw
}

impl ModelLoader for MarianLoader {
    fn load(&self, pair: &LanguagePair, model: &PairModel) -> Result<Box<dyn TranslationModel>> {
        let api = Api::new().model_load("hf-hub api")?;
        let repo = api.repo(Repo::with_revision(
            model.model_id.clone(),
            RepoType::Model,
            model.revision.clone(),
        ));
        let tokenizer_repo = match &model.tokenizer_repo {
            Some(id) => api.model(id.clone()),
            None => api.repo(Repo::with_revision(
                model.model_id.clone(),
                RepoType::Model,
                model.revision.clone(),
            )),
        };

        let config_file = repo.get("config.json").model_load(&model.model_id)?;
        let weights_file = repo.get(&model.weights).model_load(&model.model_id)?;
        let tokenizer_file = tokenizer_repo
            .get(&model.tokenizer)
            .model_load(&model.tokenizer)?;
        let decoder_tokenizer_file = match &model.decoder_tokenizer {
            Some(name) => tokenizer_repo.get(name).model_load(name)?,
            None => tokenizer_file.clone(),
        };

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(config_file)?)
                .model_load("marian config")?;
        let config: marian::Config =
            serde_json::from_value(with_marian_defaults(raw)).model_load("marian config")?;

        let tokenizer = Tokenizer::from_file(tokenizer_file).model_load("marian tokenizer")?;
        let decoder_tokenizer =
            Tokenizer::from_file(decoder_tokenizer_file).model_load("marian decoder tokenizer")?;

        // SAFETY: the weights file is owned by the hf-hub cache and not mutated while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_file], candle_core::DType::F32, &self.device)
                .model_load("marian weights")?
        };
        let mt_model = MTModel::new(&config, vb).model_load("marian model")?;
        debug!("Loaded {} for {}", model.model_id, pair);

        Ok(Box::new(MarianTranslator {
            model: mt_model,
            config,
            tokenizer,
            decoder_tokenizer,
            device: self.device.clone(),
            seed: self.seed,
            max_new_tokens: self.max_new_tokens,
        }))
    }
}

struct MarianTranslator {
    model: MTModel,
    config: marian::Config,
    tokenizer: Tokenizer,
    decoder_tokenizer: Tokenizer,
    device: Device,
    seed: u64,
    max_new_tokens: usize,
}

impl MarianTranslator {
    fn run(&mut self, text: &str) -> candle_core::Result<String> {
        self.model.reset_kv_cache();
        let mut logits_processor = LogitsProcessor::new(self.seed, None, None);

        let encoder_xs = {
            let mut tokens = self
                .tokenizer
                .encode(text, true)
                .map_err(candle_core::Error::msg)?
                .get_ids()
                .to_vec();
            tokens.push(self.config.eos_token_id);
            let tokens = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            self.model.encoder().forward(&tokens, 0)?
        };

        let mut token_ids = vec![self.config.decoder_start_token_id];
        for index in 0..self.max_new_tokens {
            let context_size = if index >= 1 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let input_ids = Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;
            let logits = self.model.decode(&input_ids, &encoder_xs, start_pos)?;
            let logits = logits.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?;
            let token = logits_processor.sample(&logits)?;
            if token == self.config.eos_token_id || token == self.config.forced_eos_token_id {
                break;
            }
            token_ids.push(token);
        }

        self.decoder_tokenizer
            .decode(&token_ids, true)
            .map_err(candle_core::Error::msg)
    }
}

impl TranslationModel for MarianTranslator {
    fn generate(&mut self, text: &str) -> Result<String> {
        self.run(text).translation("marian generate")
    }
}
