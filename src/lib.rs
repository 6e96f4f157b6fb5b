mod audio;
mod cli;
mod config;
mod dubbing;
mod error;
mod generator;
mod language;
mod marian;
mod multilingual;
mod pipeline;
mod reel;
mod renderer;
mod synthesizer;
mod transcriber;
mod translator;
mod utils;
mod video;

pub use cli::{BatchArgs, Cli, Command, ImageArgs};
pub use config::{
    OutputConfig, PairModel, PipelineConfig, ReelConfig, ShortAudioPolicy, SynthesisConfig,
    TranscriptionConfig, TranslationConfig, VoxReelConfig, WhisperLanguage, WhisperModel,
};
pub use dubbing::{DubbingResult, VoiceTranslationPipeline};
pub use error::{Error, Result};
pub use generator::{BatchOutcome, MultilingualAudioGenerator};
pub use language::{Language, LanguagePair, UnknownLanguage};
pub use marian::MarianLoader;
pub use pipeline::{PipelineReport, ReelPipeline};
pub use reel::{NOMINAL_DURATION, ReelCreator, ReelImages, ScriptSegments, SegmentKind};
pub use renderer::{AlphaMask, FontRasterizer, TextRasterizer};
pub use synthesizer::{CoquiCli, SpeechBackend, SynthesisRequest, VoiceClone, VoiceCloner};
pub use transcriber::{Transcribe, Transcription, WhisperTranscriber};
pub use translator::{ModelLoader, Translate, TranslationModel, Translator};
pub use utils::safe_name;
pub use video::{AudioPlan, EncodeJob, FfmpegEncoder, NarrationPlan, StillSegment, VideoEncoder};
