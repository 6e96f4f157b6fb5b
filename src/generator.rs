//! Batch narration: one script voiced in many languages.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::synthesizer::VoiceClone;
use crate::translator::Translate;
use crate::utils::safe_name;

/// How much of a requested batch made it through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Complete,
    Partial,
    Failed,
}

impl BatchOutcome {
    pub fn classify(requested: usize, produced: usize) -> Self {
        if produced == 0 {
            BatchOutcome::Failed
        } else if produced >= requested {
            BatchOutcome::Complete
        } else {
            BatchOutcome::Partial
        }
    }
}

pub struct MultilingualAudioGenerator {
    translator: Arc<dyn Translate>,
    cloner: Arc<dyn VoiceClone>,
    reference_audio: PathBuf,
    output_dir: PathBuf,
    source_language: String,
    max_parallel: usize,
}

impl MultilingualAudioGenerator {
    pub fn new(
        translator: Arc<dyn Translate>,
        cloner: Arc<dyn VoiceClone>,
        reference_audio: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        MultilingualAudioGenerator {
            translator,
            cloner,
            reference_audio: reference_audio.into(),
            output_dir: output_dir.into(),
            source_language: "en".to_string(),
            max_parallel: 1,
        }
    }

    pub fn with_source_language(mut self, language: &str) -> Self {
        self.source_language = language.trim().to_lowercase();
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn output_path(&self, repo_name: &str, language: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}.wav", safe_name(repo_name), language))
    }

    /// Voices `script` in every language of `target_languages`.
    ///
    /// Languages whose translation or synthesis fails are logged and left out
    /// of the returned map; an empty map means nothing succeeded.
    pub fn generate_multilingual_audio(
        &self,
        script: &str,
        repo_name: &str,
        target_languages: &[String],
    ) -> BTreeMap<String, PathBuf> {
        let normalized = normalize_languages(target_languages);
        let languages: Vec<&str> = normalized.iter().map(String::as_str).collect();

        if let Err(e) = std::fs::create_dir_all(&self.output_dir) {
            error!(
                "Cannot create audio output directory {}: {}",
                self.output_dir.display(),
                e
            );
            return BTreeMap::new();
        }

        let produced = fan_out(&languages, self.max_parallel, |language| {
            match self.generate_one(script, repo_name, language) {
                Ok(path) => {
                    info!("✅ Generated audio for {}: {}", language, path.display());
                    Some(path)
                }
                Err(e) => {
                    warn!("Skipping {}: {}", language, e);
                    None
                }
            }
        });

        languages
            .into_iter()
            .zip(produced)
            .filter_map(|(language, path)| path.map(|p| (language.to_string(), p)))
            .collect()
    }

    fn generate_one(&self, script: &str, repo_name: &str, language: &str) -> Result<PathBuf> {
        let text = if language == self.source_language {
            script.to_string()
        } else {
            info!("Translating to {}...", language);
            self.translator
                .translate(script, &self.source_language, language)?
        };

        let output_path = self.output_path(repo_name, language);
        self.cloner
            .clone_voice(&text, &self.reference_audio, &output_path, language)
    }

    pub fn reference_audio(&self) -> &Path {
        &self.reference_audio
    }
}

/// Trimmed, lower-cased codes in request order, without blanks or repeats.
pub fn normalize_languages(target_languages: &[String]) -> Vec<String> {
    let mut languages: Vec<String> = Vec::with_capacity(target_languages.len());
    for language in target_languages {
        let language = language.trim().to_lowercase();
        if !language.is_empty() && !languages.contains(&language) {
            languages.push(language);
        }
    }
    languages
}

/// Runs `task` over `items` on at most `limit` threads, keeping input order.
pub(crate) fn fan_out<T, F>(items: &[&str], limit: usize, task: F) -> Vec<Option<T>>
where
    T: Send,
    F: Fn(&str) -> Option<T> + Sync,
{
    let limit = limit.clamp(1, items.len().max(1));
    if limit == 1 {
        return items.iter().map(|item| task(item)).collect();
    }

    let next = AtomicUsize::new(0);
    let slots: Vec<Mutex<Option<T>>> = items.iter().map(|_| Mutex::new(None)).collect();
    std::thread::scope(|s| {
        for _ in 0..limit {
            s.spawn(|| {
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(item) = items.get(index) else {
                        break;
                    };
                    *slots[index].lock() = task(item);
                }
            });
        }
    });
    slots.into_iter().map(Mutex::into_inner).collect()
}
