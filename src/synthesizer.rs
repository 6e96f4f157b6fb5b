//! Voice-cloning speech synthesis.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{error, info};

use crate::audio;
use crate::config::SynthesisConfig;
use crate::error::{Error, Result, ResultExt, require_exists};
use crate::language::Language;
use crate::utils::partial_path;

/// Speech in `language` that carries the timbre of a reference recording.
pub trait VoiceClone: Send + Sync {
    fn clone_voice(
        &self,
        text: &str,
        reference_audio: &Path,
        output_path: &Path,
        language: &str,
    ) -> Result<PathBuf>;

    fn supported_languages(&self) -> &'static [Language] {
        &Language::ALL
    }
}

/// One synthesis call handed to a backend. `output` is a scratch path.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    pub reference_audio: &'a Path,
    pub output: &'a Path,
    pub language: Language,
}

/// The underlying multilingual voice-cloning model.
pub trait SpeechBackend: Send + Sync {
    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<()>;
}

pub struct VoiceCloner<B> {
    backend: B,
}

impl<B: SpeechBackend> VoiceCloner<B> {
    pub fn new(backend: B) -> Self {
        VoiceCloner { backend }
    }

    fn synthesize_checked(&self, request: &SynthesisRequest<'_>) -> Result<()> {
        self.backend.synthesize(request)?;
        let duration = audio::probe_duration(request.output).synthesis("generated audio")?;
        if duration <= 0.0 {
            return Err(Error::Synthesis("generated audio is empty".to_string()));
        }
        Ok(())
    }
}

impl<B: SpeechBackend> VoiceClone for VoiceCloner<B> {
    fn clone_voice(
        &self,
        text: &str,
        reference_audio: &Path,
        output_path: &Path,
        language: &str,
    ) -> Result<PathBuf> {
        require_exists(reference_audio)?;
        let language = Language::coerce(language);

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        info!("Generating speech in {} with voice cloning...", language);
        let scratch = partial_path(output_path);
        let request = SynthesisRequest {
            text,
            reference_audio,
            output: &scratch,
            language,
        };

        let finished = self
            .synthesize_checked(&request)
            .and_then(|()| std::fs::rename(&scratch, output_path).map_err(Error::from));
        if let Err(e) = finished {
            error!("Failed to clone voice into {}: {}", output_path.display(), e);
            let _ = std::fs::remove_file(&scratch);
            return Err(e);
        }

        info!("Voice cloned audio saved to {}", output_path.display());
        Ok(output_path.to_path_buf())
    }
}

/// Runs the Coqui `tts` command line with an XTTS-style multilingual model.
pub struct CoquiCli {
    config: SynthesisConfig,
}

impl CoquiCli {
    pub fn new(config: SynthesisConfig) -> Self {
        CoquiCli { config }
    }

    pub fn args(&self, request: &SynthesisRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "--model_name".to_string(),
            self.config.model_name.clone(),
            "--text".to_string(),
            request.text.to_string(),
            "--speaker_wav".to_string(),
            request.reference_audio.display().to_string(),
            "--language_idx".to_string(),
            request.language.code().to_string(),
            "--out_path".to_string(),
            request.output.display().to_string(),
        ];
        if self.config.use_cuda {
            args.push("--use_cuda".to_string());
            args.push("true".to_string());
        }
        args.extend(self.config.extra_args.iter().cloned());
        args
    }
}

impl SpeechBackend for CoquiCli {
    fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<()> {
        let output = Command::new(&self.config.program)
            .args(self.args(request))
            .output()
            .synthesis(&format!("failed to run '{}'", self.config.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Synthesis(format!(
                "'{}' exited with {}: {}",
                self.config.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
