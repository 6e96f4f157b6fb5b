//! Error taxonomy shared by every stage of the reel pipeline.

use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No translation model is configured for the requested pair.
    #[error("translation pair {from}-{to} is not supported")]
    UnsupportedLanguagePair { from: String, to: String },

    /// Model weights, tokenizer or config could not be fetched or loaded.
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// The translation model failed while generating.
    #[error("translation failed: {0}")]
    Translation(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    /// Frame rendering, encoding or muxing of a video failed.
    #[error("video composition failed: {0}")]
    Composition(String),

    #[error("resource not found: {}", .0.display())]
    ResourceNotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wraps foreign errors into an [`Error`] variant with a context prefix.
pub trait ResultExt<T> {
    fn model_load(self, context: &str) -> Result<T>;
    fn translation(self, context: &str) -> Result<T>;
    fn transcription(self, context: &str) -> Result<T>;
    fn synthesis(self, context: &str) -> Result<T>;
    fn composition(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn model_load(self, context: &str) -> Result<T> {
        self.map_err(|e| Error::ModelLoad(format!("{context}: {e}")))
    }
    fn translation(self, context: &str) -> Result<T> {
        self.map_err(|e| Error::Translation(format!("{context}: {e}")))
    }
    fn transcription(self, context: &str) -> Result<T> {
        self.map_err(|e| Error::Transcription(format!("{context}: {e}")))
    }
    fn synthesis(self, context: &str) -> Result<T> {
        self.map_err(|e| Error::Synthesis(format!("{context}: {e}")))
    }
    fn composition(self, context: &str) -> Result<T> {
        self.map_err(|e| Error::Composition(format!("{context}: {e}")))
    }
}

/// Fails with [`Error::ResourceNotFound`] unless `path` exists.
pub(crate) fn require_exists(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::ResourceNotFound(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_pair_display() {
        let e = Error::UnsupportedLanguagePair {
            from: "en".into(),
            to: "xx".into(),
        };
        assert_eq!(e.to_string(), "translation pair en-xx is not supported");
    }

    #[test]
    fn result_ext_prefixes_context() {
        let err: std::result::Result<(), &str> = Err("weights missing");
        let mapped = err.model_load("opus-mt-en-fr");
        assert!(
            matches!(mapped, Err(Error::ModelLoad(s)) if s == "opus-mt-en-fr: weights missing")
        );
    }

    #[test]
    fn result_ext_ok_passthrough() {
        let ok: std::result::Result<u32, &str> = Ok(7);
        assert_eq!(ok.synthesis("unused").unwrap(), 7);
    }

    #[test]
    fn require_exists_reports_path() {
        let missing = std::path::Path::new("/definitely/not/here.wav");
        match require_exists(missing) {
            Err(Error::ResourceNotFound(p)) => assert_eq!(p, missing),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
