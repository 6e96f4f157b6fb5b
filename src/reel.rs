//! The fixed five-segment vertical reel and its narrated long-form sibling.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audio;
use crate::config::{ReelConfig, ShortAudioPolicy};
use crate::error::{Result, ResultExt, require_exists};
use crate::renderer::{
    Compositor, FontRasterizer, Layer, Placement, TextLayer, TextRasterizer, parse_hex_color,
};
use crate::utils::{ellipsize, safe_name};
use crate::video::{AudioPlan, EncodeJob, StillSegment, VideoEncoder, plan_narration};

/// Length of a reel before any audio reconciliation, in seconds.
pub const NOMINAL_DURATION: f64 = 20.0;

const BODY_LIMIT: usize = 100;
const CALL_TO_ACTION: &str = "Link in Bio\nCheck the Blog!";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    Intro,
    Problem,
    Solution,
    Architecture,
    Outro,
}

impl SegmentKind {
    pub const TIMELINE: [SegmentKind; 5] = [
        SegmentKind::Intro,
        SegmentKind::Problem,
        SegmentKind::Solution,
        SegmentKind::Architecture,
        SegmentKind::Outro,
    ];

    pub fn nominal_duration(self) -> f64 {
        match self {
            SegmentKind::Intro => 3.0,
            SegmentKind::Problem => 5.0,
            SegmentKind::Solution => 5.0,
            SegmentKind::Architecture => 4.0,
            SegmentKind::Outro => 3.0,
        }
    }

    pub fn frame_count(self, fps: u32) -> u64 {
        (self.nominal_duration() * fps as f64).round() as u64
    }

    fn header(self) -> Option<&'static str> {
        match self {
            SegmentKind::Problem => Some("The Problem"),
            SegmentKind::Solution => Some("The Solution"),
            SegmentKind::Architecture => Some("Architecture"),
            SegmentKind::Intro | SegmentKind::Outro => None,
        }
    }
}

/// Narrative pieces shown on the reel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptSegments {
    pub hook: String,
    pub solution: String,
    /// Closing line; the outro falls back to a call to action when empty.
    pub verdict: String,
}

impl ScriptSegments {
    pub fn from_script(script: &str) -> Self {
        ScriptSegments {
            hook: script.chars().take(BODY_LIMIT).collect(),
            solution: script.to_string(),
            verdict: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReelImages {
    pub flow: Option<PathBuf>,
    pub screenshot: Option<PathBuf>,
    pub architecture: Option<PathBuf>,
}

/// Fits narration to the fixed reel length.
///
/// Audio at least as long as the reel is cut to it. Shorter audio follows
/// `policy`.
pub fn plan_reel_audio(path: &Path, audio_duration: f64, policy: ShortAudioPolicy) -> AudioPlan {
    let mut plan = AudioPlan {
        path: path.to_path_buf(),
        loop_input: false,
        pad_silence: false,
        duration: NOMINAL_DURATION,
    };
    if audio_duration >= NOMINAL_DURATION {
        return plan;
    }
    match policy {
        ShortAudioPolicy::Leave => {}
        ShortAudioPolicy::PadSilence => plan.pad_silence = true,
        ShortAudioPolicy::LoopAudio => plan.loop_input = true,
        ShortAudioPolicy::ShrinkVideo => plan.duration = audio_duration,
    }
    plan
}

pub struct ReelCreator {
    config: ReelConfig,
    output_dir: PathBuf,
    compositor: Compositor,
    encoder: Arc<dyn VideoEncoder>,
    text_color: [u8; 3],
    accent_color: [u8; 3],
}

impl ReelCreator {
    /// Uses the configured font when one loads; otherwise reels are rendered
    /// without text.
    pub fn new(
        config: &ReelConfig,
        output_dir: impl Into<PathBuf>,
        encoder: Arc<dyn VideoEncoder>,
    ) -> Result<Self> {
        let rasterizer: Option<Arc<dyn TextRasterizer>> = match FontRasterizer::from_config(config) {
            Ok(font) => Some(Arc::new(font)),
            Err(e) => {
                warn!("Text overlays disabled: {}", e);
                None
            }
        };
        Self::with_rasterizer(config, output_dir, encoder, rasterizer)
    }

    pub fn with_rasterizer(
        config: &ReelConfig,
        output_dir: impl Into<PathBuf>,
        encoder: Arc<dyn VideoEncoder>,
        rasterizer: Option<Arc<dyn TextRasterizer>>,
    ) -> Result<Self> {
        let background = parse_hex_color(&config.background_color)?;
        Ok(ReelCreator {
            compositor: Compositor::new(config.width, config.height, background, rasterizer),
            text_color: parse_hex_color(&config.text_color)?,
            accent_color: parse_hex_color(&config.accent_color)?,
            config: config.clone(),
            output_dir: output_dir.into(),
            encoder,
        })
    }

    pub fn output_path(&self, repo_name: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}-reel.mp4", safe_name(repo_name)))
    }

    fn title(&self, text: &str, size: f32) -> Layer {
        Layer::Text(TextLayer {
            text: text.to_string(),
            size,
            color: self.text_color,
            backing: None,
            box_width: self.config.width.saturating_sub(100),
            placement: Placement::Center,
        })
    }

    pub fn segment_layers(
        &self,
        kind: SegmentKind,
        repo_name: &str,
        segments: &ScriptSegments,
        images: &ReelImages,
    ) -> Vec<Layer> {
        let (image, body) = match kind {
            SegmentKind::Intro => return vec![self.title(repo_name, self.config.title_size)],
            SegmentKind::Outro => {
                let closing = match segments.verdict.trim() {
                    "" => CALL_TO_ACTION,
                    verdict => verdict,
                };
                return vec![self.title(closing, self.config.outro_size)];
            }
            SegmentKind::Problem => (&images.flow, non_empty(&segments.hook, "Problem Analysis")),
            SegmentKind::Solution => (&images.screenshot, non_empty(&segments.solution, "The Solution")),
            SegmentKind::Architecture => (&images.architecture, "How it Works"),
        };

        let mut layers = Vec::with_capacity(3);
        if let Some(path) = image {
            layers.push(Layer::Image(path.clone()));
        }
        if let Some(header) = kind.header() {
            layers.push(Layer::Text(TextLayer {
                text: header.to_string(),
                size: self.config.header_size,
                color: self.accent_color,
                backing: Some(0.5),
                box_width: self.config.width,
                placement: Placement::Top(100),
            }));
        }
        layers.push(Layer::Text(TextLayer {
            text: ellipsize(body, BODY_LIMIT),
            size: self.config.body_size,
            color: self.text_color,
            backing: Some(0.7),
            box_width: self.config.width.saturating_sub(100),
            placement: Placement::Top(self.config.height.saturating_sub(300)),
        }));
        layers
    }

    /// Renders the five-segment reel for `repo_name`, optionally with
    /// narration, into `{output_dir}/{safe name}-reel.mp4`.
    pub fn create_reel(
        &self,
        repo_name: &str,
        segments: &ScriptSegments,
        images: &ReelImages,
        audio_path: Option<&Path>,
    ) -> Result<PathBuf> {
        info!("Creating reel for {}...", repo_name);

        let audio_plan = match audio_path {
            Some(path) => {
                require_exists(path)?;
                let duration = audio::probe_duration(path).composition("narration audio")?;
                let plan = plan_reel_audio(path, duration, self.config.short_audio);
                info!(
                    "Narration {:.1}s, reel {:.1}s ({:?})",
                    duration, plan.duration, self.config.short_audio
                );
                Some(plan)
            }
            None => None,
        };

        let stills: Vec<StillSegment> = SegmentKind::TIMELINE
            .iter()
            .map(|&kind| {
                let composed = self
                    .compositor
                    .compose(&self.segment_layers(kind, repo_name, segments, images));
                if !composed.skipped.is_empty() {
                    warn!("{:?} segment rendered without {} layer(s)", kind, composed.skipped.len());
                }
                StillSegment {
                    frame: composed.frame,
                    frames: kind.frame_count(self.config.fps),
                }
            })
            .collect();

        let output_path = self.output_path(repo_name);
        self.encoder.encode(&EncodeJob {
            segments: &stills,
            width: self.compositor.width(),
            height: self.compositor.height(),
            fps: self.config.fps,
            audio: audio_plan.as_ref(),
            output: &output_path,
        })?;

        info!("Reel created successfully: {}", output_path.display());
        Ok(output_path)
    }

    /// Lays `audio` over `video`. The audio sets the length: a shorter video
    /// is looped and a longer one is cut.
    pub fn compose_narrated_video(&self, video: &Path, audio: &Path, output: &Path) -> Result<PathBuf> {
        require_exists(video)?;
        require_exists(audio)?;

        let audio_duration = audio::probe_duration(audio).composition("narration audio")?;
        let video_duration = self.encoder.video_duration(video)?;
        let plan = plan_narration(video_duration, audio_duration);
        info!(
            "Narrating {} ({:.1}s) over {:.1}s of audio{}",
            video.display(),
            video_duration,
            audio_duration,
            if plan.loop_video { ", looping video" } else { "" }
        );

        self.encoder.narrate(video, audio, &plan, output)?;
        Ok(output.to_path_buf())
    }
}

fn non_empty<'a>(text: &'a str, fallback: &'a str) -> &'a str {
    if text.trim().is_empty() { fallback } else { text }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::write_wav;
    use crate::error::Error;
    use crate::renderer::fakes::BlockRasterizer;
    use crate::video::fakes::RecordingEncoder;

    fn small_config() -> ReelConfig {
        ReelConfig {
            width: 108,
            height: 192,
            fps: 10,
            title_size: 14.0,
            header_size: 12.0,
            body_size: 8.0,
            outro_size: 16.0,
            ..Default::default()
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        encoder: Arc<RecordingEncoder>,
        creator: ReelCreator,
    }

    fn fixture(config: ReelConfig, rasterizer: Option<Arc<dyn TextRasterizer>>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let encoder = Arc::new(RecordingEncoder::default());
        let creator = ReelCreator::with_rasterizer(
            &config,
            dir.path().join("videos"),
            encoder.clone(),
            rasterizer,
        )
        .unwrap();
        Fixture {
            dir,
            encoder,
            creator,
        }
    }

    fn block_font(poison: Option<&'static str>) -> Option<Arc<dyn TextRasterizer>> {
        Some(Arc::new(BlockRasterizer { poison }))
    }

    fn script() -> ScriptSegments {
        ScriptSegments::from_script("Manual deployments are killing your productivity")
    }

    #[test]
    fn timeline_is_fixed_and_sums_to_twenty_seconds() {
        let kinds: Vec<_> = SegmentKind::TIMELINE.to_vec();
        assert_eq!(
            kinds,
            vec![
                SegmentKind::Intro,
                SegmentKind::Problem,
                SegmentKind::Solution,
                SegmentKind::Architecture,
                SegmentKind::Outro,
            ]
        );
        let durations: Vec<f64> = kinds.iter().map(|k| k.nominal_duration()).collect();
        assert_eq!(durations, vec![3.0, 5.0, 5.0, 4.0, 3.0]);
        assert_eq!(durations.iter().sum::<f64>(), NOMINAL_DURATION);
    }

    #[test]
    fn silent_reel_streams_twenty_seconds_of_frames() {
        let fx = fixture(small_config(), block_font(None));

        let path = fx
            .creator
            .create_reel("Awesome Project", &script(), &ReelImages::default(), None)
            .unwrap();

        assert_eq!(path, fx.dir.path().join("videos/awesome-project-reel.mp4"));
        assert!(path.exists());
        let reels = fx.encoder.reels.lock();
        assert_eq!(reels[0].output, path);
        assert_eq!(reels[0].frames, vec![30, 50, 50, 40, 30]);
        assert_eq!(reels[0].frames.iter().sum::<u64>(), 200);
        assert!(reels[0].audio.is_none());
    }

    #[test]
    fn long_audio_is_truncated_to_nominal_length() {
        let fx = fixture(small_config(), block_font(None));
        let audio = fx.dir.path().join("en.wav");
        write_wav(&audio, 25.0, 8000);

        fx.creator
            .create_reel("demo", &script(), &ReelImages::default(), Some(&audio))
            .unwrap();

        let reels = fx.encoder.reels.lock();
        let plan = reels[0].audio.as_ref().unwrap();
        assert_eq!(plan.duration, 20.0);
        assert!(!plan.loop_input && !plan.pad_silence);
    }

    #[test]
    fn short_audio_is_left_alone_by_default() {
        let fx = fixture(small_config(), block_font(None));
        let audio = fx.dir.path().join("en.wav");
        write_wav(&audio, 4.0, 8000);

        fx.creator
            .create_reel("demo", &script(), &ReelImages::default(), Some(&audio))
            .unwrap();

        let reels = fx.encoder.reels.lock();
        let plan = reels[0].audio.as_ref().unwrap();
        assert_eq!(plan.duration, 20.0);
        assert_eq!(reels[0].frames.iter().sum::<u64>(), 200);
    }

    #[test]
    fn short_audio_policies() {
        let path = Path::new("/a/en.wav");
        let plan = |policy| plan_reel_audio(path, 8.0, policy);

        assert_eq!(plan(ShortAudioPolicy::Leave).duration, 20.0);
        assert!(plan(ShortAudioPolicy::PadSilence).pad_silence);
        assert!(plan(ShortAudioPolicy::LoopAudio).loop_input);
        assert_eq!(plan(ShortAudioPolicy::LoopAudio).duration, 20.0);
        assert_eq!(plan(ShortAudioPolicy::ShrinkVideo).duration, 8.0);
        // Long enough audio ignores the policy.
        assert_eq!(
            plan_reel_audio(path, 31.0, ShortAudioPolicy::ShrinkVideo).duration,
            20.0
        );
    }

    #[test]
    fn missing_audio_is_resource_not_found() {
        let fx = fixture(small_config(), block_font(None));
        let err = fx
            .creator
            .create_reel("demo", &script(), &ReelImages::default(), Some(Path::new("/no/en.wav")))
            .unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound(_)));
        assert!(fx.encoder.reels.lock().is_empty());
    }

    #[test]
    fn failing_text_in_one_segment_still_yields_reel() {
        let fx = fixture(small_config(), block_font(Some("Architecture")));

        let path = fx
            .creator
            .create_reel("demo", &script(), &ReelImages::default(), None)
            .unwrap();

        assert!(path.exists());
        assert_eq!(fx.encoder.reels.lock()[0].frames.len(), 5);
    }

    #[test]
    fn no_font_still_yields_reel_with_backgrounds() {
        let fx = fixture(small_config(), None);

        let path = fx
            .creator
            .create_reel("demo", &script(), &ReelImages::default(), None)
            .unwrap();

        assert!(path.exists());
        let reels = fx.encoder.reels.lock();
        assert!(reels[0].first_pixels.iter().all(|p| *p == [0x1F, 0x29, 0x37]));
    }

    #[test]
    fn encoder_failure_is_composition_error_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = Arc::new(RecordingEncoder {
            fail: true,
            ..Default::default()
        });
        let creator =
            ReelCreator::with_rasterizer(&small_config(), dir.path(), encoder, None).unwrap();

        let err = creator
            .create_reel("demo", &script(), &ReelImages::default(), None)
            .unwrap_err();

        assert!(matches!(err, Error::Composition(_)));
        assert!(!creator.output_path("demo").exists());
    }

    #[test]
    fn content_segments_carry_image_header_and_truncated_body() {
        let fx = fixture(small_config(), None);
        let images = ReelImages {
            flow: Some("/img/flow.png".into()),
            ..Default::default()
        };
        let segments = ScriptSegments {
            hook: "h".repeat(150),
            ..script()
        };

        let layers = fx
            .creator
            .segment_layers(SegmentKind::Problem, "demo", &segments, &images);

        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0], Layer::Image("/img/flow.png".into()));
        let Layer::Text(header) = &layers[1] else { panic!("header") };
        assert_eq!(header.text, "The Problem");
        assert_eq!(header.backing, Some(0.5));
        assert_eq!(header.placement, Placement::Top(100));
        let Layer::Text(body) = &layers[2] else { panic!("body") };
        assert_eq!(body.text.chars().count(), 100);
        assert!(body.text.ends_with("..."));
        // Frame is shorter than the 300px body band, so it pins to the top.
        assert_eq!(body.placement, Placement::Top(0));
    }

    #[test]
    fn intro_and_outro_are_centered_titles() {
        let fx = fixture(small_config(), None);
        let intro = fx
            .creator
            .segment_layers(SegmentKind::Intro, "Awesome Project", &script(), &ReelImages::default());
        let Layer::Text(title) = &intro[0] else { panic!("title") };
        assert_eq!(title.text, "Awesome Project");
        assert_eq!(title.placement, Placement::Center);

        let no_verdict = ScriptSegments::default();
        let outro = fx
            .creator
            .segment_layers(SegmentKind::Outro, "demo", &no_verdict, &ReelImages::default());
        let Layer::Text(closing) = &outro[0] else { panic!("outro") };
        assert_eq!(closing.text, "Link in Bio\nCheck the Blog!");
    }

    #[test]
    fn script_derived_outro_shows_call_to_action() {
        let fx = fixture(small_config(), None);
        let outro = fx.creator.segment_layers(
            SegmentKind::Outro,
            "demo",
            &ScriptSegments::from_script("Great tool"),
            &ReelImages::default(),
        );
        let Layer::Text(closing) = &outro[0] else { panic!("outro") };
        assert_eq!(closing.text, "Link in Bio\nCheck the Blog!");

        let explicit = ScriptSegments {
            verdict: "Ship it".into(),
            ..ScriptSegments::from_script("Great tool")
        };
        let outro = fx
            .creator
            .segment_layers(SegmentKind::Outro, "demo", &explicit, &ReelImages::default());
        let Layer::Text(closing) = &outro[0] else { panic!("outro") };
        assert_eq!(closing.text, "Ship it");
    }

    #[test]
    fn architecture_body_is_fixed_caption() {
        let fx = fixture(small_config(), None);
        let layers = fx.creator.segment_layers(
            SegmentKind::Architecture,
            "demo",
            &script(),
            &ReelImages::default(),
        );
        let Layer::Text(body) = layers.last().unwrap() else { panic!("body") };
        assert_eq!(body.text, "How it Works");
    }

    #[test]
    fn from_script_splits_hook_and_solution() {
        let script = "x".repeat(250);
        let segments = ScriptSegments::from_script(&script);
        assert_eq!(segments.hook.len(), 100);
        assert_eq!(segments.solution, script);
        assert!(segments.verdict.is_empty());
    }

    #[test]
    fn narrated_video_follows_audio_length() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = Arc::new(RecordingEncoder {
            source_duration: 2.0,
            ..Default::default()
        });
        let creator =
            ReelCreator::with_rasterizer(&small_config(), dir.path(), encoder.clone(), None).unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"mp4").unwrap();
        let audio = dir.path().join("voice.wav");
        write_wav(&audio, 6.0, 8000);
        let output = dir.path().join("long/narrated.mp4");

        let produced = creator.compose_narrated_video(&video, &audio, &output).unwrap();

        assert_eq!(produced, output);
        assert!(output.exists());
        let narrations = encoder.narrations.lock();
        assert!(narrations[0].0.loop_video);
        assert!((narrations[0].0.duration - 6.0).abs() < 1e-6);
    }

    #[test]
    fn narrated_video_requires_inputs() {
        let fx = fixture(small_config(), None);
        let err = fx
            .creator
            .compose_narrated_video(Path::new("/no/clip.mp4"), Path::new("/no/a.wav"), Path::new("/o.mp4"))
            .unwrap_err();
        assert!(matches!(err, Error::ResourceNotFound(_)));
    }

    #[test]
    fn bad_palette_is_rejected() {
        let config = ReelConfig {
            accent_color: "blue".into(),
            ..small_config()
        };
        let result = ReelCreator::with_rasterizer(
            &config,
            "/tmp",
            Arc::new(RecordingEncoder::default()),
            None,
        );
        assert!(matches!(result, Err(Error::Composition(_))));
    }
}
