use candle_core::{D, IndexOp, Tensor};
use candle_transformers::models::whisper::{self as m, model::Whisper};
use tokenizers::Tokenizer;

use crate::utils;

/// Language tokens known to multilingual Whisper checkpoints, in vocabulary order.
pub const LANGUAGES: [&str; 99] = [
    "en", "zh", "de", "es", "ru", "ko", "fr", "ja", "pt", "tr", "pl", "ca", "nl", "ar", "sv",
    "it", "id", "hi", "fi", "vi", "he", "uk", "el", "ms", "cs", "ro", "da", "hu", "ta", "no",
    "th", "ur", "hr", "bg", "lt", "la", "mi", "ml", "cy", "sk", "te", "fa", "lv", "bn", "sr",
    "az", "sl", "kn", "et", "mk", "br", "eu", "is", "hy", "ne", "mn", "bs", "kk", "sq", "sw",
    "gl", "mr", "pa", "si", "km", "sn", "yo", "so", "af", "oc", "ka", "be", "tg", "sd", "gu",
    "am", "yi", "lo", "uz", "fo", "ht", "ps", "tk", "nn", "mt", "sa", "lb", "my", "bo", "tl",
    "mg", "as", "tt", "haw", "ln", "ha", "ba", "jw", "su",
];

/// Maps a Whisper language to the code used by the rest of the pipeline.
pub fn pipeline_code(whisper_code: &str) -> &str {
    match whisper_code {
        "zh" => "zh-cn",
        other => other,
    }
}

/// Returns the most likely language token and its code for the first audio window.
pub fn detect_language(
    model: &mut Whisper,
    tokenizer: &Tokenizer,
    mel: &Tensor,
) -> candle_core::Result<(u32, &'static str)> {
    let (_bsize, _, seq_len) = mel.dims3()?;
    let mel = mel.narrow(
        2,
        0,
        usize::min(seq_len, model.config.max_source_positions),
    )?;
    let device = mel.device();
    let language_token_ids = LANGUAGES
        .iter()
        .map(|t| utils::token_id(tokenizer, &format!("<|{t}|>")))
        .collect::<candle_core::Result<Vec<_>>>()?;
    let sot_token = utils::token_id(tokenizer, m::SOT_TOKEN)?;
    let audio_features = model.encoder.forward(&mel, true)?;
    let tokens = Tensor::new(&[[sot_token]], device)?;
    let language_token_ids_t = Tensor::new(language_token_ids.as_slice(), device)?;
    let ys = model.decoder.forward(&tokens, &audio_features, true)?;
    let logits = model.decoder.final_linear(&ys.i(..1)?)?.i(0)?.i(0)?;
    let logits = logits.index_select(&language_token_ids_t, 0)?;
    let probs = candle_nn::ops::softmax(&logits, D::Minus1)?.to_vec1::<f32>()?;

    let best = probs
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0);
    tracing::debug!(
        "Detected language '{}' (p={:.2})",
        LANGUAGES[best],
        probs.get(best).copied().unwrap_or_default()
    );
    Ok((language_token_ids[best], LANGUAGES[best]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_table_has_no_duplicates() {
        let mut codes = LANGUAGES.to_vec();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), LANGUAGES.len());
    }

    #[test]
    fn chinese_maps_to_synthesizer_code() {
        assert_eq!(pipeline_code("zh"), "zh-cn");
        assert_eq!(pipeline_code("fr"), "fr");
    }
}
