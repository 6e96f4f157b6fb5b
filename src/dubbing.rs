//! Audio-to-audio dubbing: transcribe, translate, then re-voice in the
//! original speaker's timbre.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::synthesizer::VoiceClone;
use crate::transcriber::Transcribe;
use crate::translator::Translate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DubbingResult {
    pub original_text: String,
    pub translated_text: String,
    pub audio_path: PathBuf,
}

pub struct VoiceTranslationPipeline {
    transcriber: Arc<dyn Transcribe>,
    translator: Arc<dyn Translate>,
    cloner: Arc<dyn VoiceClone>,
}

impl VoiceTranslationPipeline {
    pub fn new(
        transcriber: Arc<dyn Transcribe>,
        translator: Arc<dyn Translate>,
        cloner: Arc<dyn VoiceClone>,
    ) -> Self {
        VoiceTranslationPipeline {
            transcriber,
            translator,
            cloner,
        }
    }

    pub fn transcribe_audio(&self, audio_path: &Path) -> Result<(String, String)> {
        let transcription = self.transcriber.transcribe(audio_path)?;
        Ok((transcription.text, transcription.language))
    }

    pub fn translate_text(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        self.translator.translate(text, source_lang, target_lang)
    }

    pub fn synthesize_speech(
        &self,
        text: &str,
        reference_audio: &Path,
        output_path: &Path,
        language: &str,
    ) -> Result<PathBuf> {
        self.cloner
            .clone_voice(text, reference_audio, output_path, language)
    }

    /// Dubs `audio_path` into `target_lang`, writing speech to `output_path`.
    /// The first failing stage aborts the run.
    pub fn translate_voice(
        &self,
        audio_path: &Path,
        target_lang: &str,
        output_path: &Path,
    ) -> Result<DubbingResult> {
        info!("Step 1/3: transcribing {}", audio_path.display());
        let (original_text, source_lang) = self.transcribe_audio(audio_path)?;

        let translated_text = if source_lang.eq_ignore_ascii_case(target_lang) {
            info!("Step 2/3: already in '{}', keeping transcript", target_lang);
            original_text.clone()
        } else {
            info!("Step 2/3: translating {} -> {}", source_lang, target_lang);
            self.translate_text(&original_text, &source_lang, target_lang)?
        };

        info!("Step 3/3: synthesizing {} speech", target_lang);
        let audio_path =
            self.synthesize_speech(&translated_text, audio_path, output_path, target_lang)?;

        Ok(DubbingResult {
            original_text,
            translated_text,
            audio_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transcriber::Transcription;
    use parking_lot::Mutex;

    type CallLog = Arc<Mutex<Vec<String>>>;

    struct CannedTranscriber(CallLog, Option<Transcription>);
    struct CannedTranslator(CallLog, &'static str);
    struct CannedCloner(CallLog);

    impl Transcribe for CannedTranscriber {
        fn transcribe(&self, audio_path: &Path) -> Result<Transcription> {
            self.0
                .lock()
                .push(format!("transcribe({})", audio_path.display()));
            self.1
                .clone()
                .ok_or_else(|| Error::Transcription("unrecognized audio".into()))
        }
    }

    impl Translate for CannedTranslator {
        fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
            self.0
                .lock()
                .push(format!("translate({text}, {source}, {target})"));
            Ok(self.1.to_string())
        }
    }

    impl VoiceClone for CannedCloner {
        fn clone_voice(
            &self,
            text: &str,
            reference_audio: &Path,
            output_path: &Path,
            language: &str,
        ) -> Result<PathBuf> {
            self.0.lock().push(format!(
                "synthesize({text}, {}, {}, {language})",
                reference_audio.display(),
                output_path.display()
            ));
            Ok(PathBuf::from("/out.wav"))
        }
    }

    fn pipeline(log: &CallLog, transcript: Option<Transcription>) -> VoiceTranslationPipeline {
        VoiceTranslationPipeline::new(
            Arc::new(CannedTranscriber(log.clone(), transcript)),
            Arc::new(CannedTranslator(log.clone(), "Ceci est un test")),
            Arc::new(CannedCloner(log.clone())),
        )
    }

    fn english() -> Option<Transcription> {
        Some(Transcription {
            text: "This is a test".into(),
            language: "en".into(),
        })
    }

    #[test]
    fn stages_run_once_in_order_with_translated_text() {
        let log = CallLog::default();
        let pipeline = pipeline(&log, english());

        let result = pipeline
            .translate_voice(Path::new("/path/to/audio.wav"), "fr", Path::new("/out.wav"))
            .unwrap();

        assert_eq!(
            log.lock().as_slice(),
            &[
                "transcribe(/path/to/audio.wav)".to_string(),
                "translate(This is a test, en, fr)".to_string(),
                "synthesize(Ceci est un test, /path/to/audio.wav, /out.wav, fr)".to_string(),
            ]
        );
        assert_eq!(
            result,
            DubbingResult {
                original_text: "This is a test".into(),
                translated_text: "Ceci est un test".into(),
                audio_path: PathBuf::from("/out.wav"),
            }
        );
    }

    #[test]
    fn transcription_failure_aborts_remaining_stages() {
        let log = CallLog::default();
        let pipeline = pipeline(&log, None);

        let err = pipeline
            .translate_voice(Path::new("/a.wav"), "fr", Path::new("/out.wav"))
            .unwrap_err();

        assert!(matches!(err, Error::Transcription(_)));
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn same_language_skips_translation() {
        let log = CallLog::default();
        let pipeline = pipeline(&log, english());

        let result = pipeline
            .translate_voice(Path::new("/a.wav"), "en", Path::new("/out.wav"))
            .unwrap();

        assert_eq!(result.translated_text, "This is a test");
        assert!(log.lock().iter().all(|call| !call.starts_with("translate")));
    }

    #[test]
    fn transcribe_audio_returns_text_and_language() {
        let log = CallLog::default();
        let pipeline = pipeline(&log, english());
        let (text, language) = pipeline.transcribe_audio(Path::new("/a.wav")).unwrap();
        assert_eq!(text, "This is a test");
        assert_eq!(language, "en");
    }
}
