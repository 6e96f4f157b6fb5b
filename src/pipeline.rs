//! Script and voice sample in, one narrated reel per language out.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info};

use crate::generator::{BatchOutcome, MultilingualAudioGenerator, normalize_languages};
use crate::reel::{ReelCreator, ReelImages, ScriptSegments};

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub success: bool,
    pub message: String,
    pub audio_files: BTreeMap<String, PathBuf>,
    pub video_files: BTreeMap<String, PathBuf>,
    pub languages: Vec<String>,
    pub outcome: BatchOutcome,
}

pub struct ReelPipeline {
    generator: MultilingualAudioGenerator,
    reels: ReelCreator,
}

impl ReelPipeline {
    pub fn new(generator: MultilingualAudioGenerator, reels: ReelCreator) -> Self {
        ReelPipeline { generator, reels }
    }

    pub fn run(
        &self,
        script: &str,
        repo_name: &str,
        target_languages: &[String],
        images: &ReelImages,
    ) -> PipelineReport {
        let requested = normalize_languages(target_languages);
        info!("Generating reels for {} languages", requested.len());

        let audio_files =
            self.generator
                .generate_multilingual_audio(script, repo_name, target_languages);
        if audio_files.is_empty() {
            error!("No narration could be generated for {}", repo_name);
            return PipelineReport {
                success: false,
                message: "Failed to generate audio".to_string(),
                audio_files,
                video_files: BTreeMap::new(),
                languages: Vec::new(),
                outcome: BatchOutcome::Failed,
            };
        }

        let segments = ScriptSegments::from_script(script);
        let mut video_files = BTreeMap::new();
        for (language, audio_path) in &audio_files {
            let reel_name = format!("{repo_name}-{language}");
            match self
                .reels
                .create_reel(&reel_name, &segments, images, Some(audio_path))
            {
                Ok(video_path) => {
                    info!("✅ Video created for {}: {}", language, video_path.display());
                    video_files.insert(language.clone(), video_path);
                }
                Err(e) => error!("Failed to create video for {}: {}", language, e),
            }
        }

        let outcome = match BatchOutcome::classify(requested.len(), video_files.len()) {
            // Narration exists, so the batch is never a total loss.
            BatchOutcome::Failed => BatchOutcome::Partial,
            other => other,
        };

        PipelineReport {
            success: true,
            message: format!("Generated {} reels", video_files.len()),
            languages: video_files.keys().cloned().collect(),
            audio_files,
            video_files,
            outcome,
        }
    }
}
