use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use voxreel::{
    BatchArgs, BatchOutcome, Cli, Command, CoquiCli, FfmpegEncoder, ImageArgs, Language,
    MarianLoader, MultilingualAudioGenerator, ReelCreator, ReelImages, ReelPipeline,
    ScriptSegments, Translate, Translator, VoiceClone, VoiceCloner, VoiceTranslationPipeline,
    VoxReelConfig, WhisperTranscriber,
};

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = match VoxReelConfig::load_or_default(cli.config.as_deref()) {
        Ok(conf) => conf,
        Err(e) => {
            eprintln!("Config Error: {:#}", e);
            std::process::exit(1);
        }
    };
    eprintln!("✅ Configuration loaded successfully!");

    match cli.command {
        Command::Languages => {
            for language in Language::ALL {
                println!("{:<6} {}", language.code(), language.name());
            }
        }
        Command::Translate { text, from, to } => {
            let from = from.unwrap_or_else(|| config.translation.source_language.clone());
            let translation = translator(&config)?.translate(&text, &from, &to)?;
            println!("{}", translation);
        }
        Command::Clone {
            text,
            reference,
            language,
            output,
        } => {
            let path = cloner(&config).clone_voice(&text, &reference, &output, &language)?;
            eprintln!("🎤 Cloned voice saved to: {}", path.display());
        }
        Command::Audio { batch } => {
            let script = read_script(&batch.script)?;
            let generator = audio_generator(&config, &batch)?;
            let results = generator.generate_multilingual_audio(&script, &batch.repo, &batch.languages);
            println!("{}", serde_json::to_string_pretty(&results)?);
            if results.is_empty() {
                eprintln!("❌ No audio could be generated");
                std::process::exit(1);
            }
        }
        Command::Dub { input, to, output } => {
            let output = match output {
                Some(path) => path,
                None => dubbed_output_path(&input, &to)?,
            };
            let transcriber = WhisperTranscriber::new(&config.transcription)?;
            let pipeline = VoiceTranslationPipeline::new(
                Arc::new(transcriber),
                translator(&config)?,
                cloner(&config),
            );
            eprintln!("🎵 Dubbing {} into {}...", input.display(), to);
            let result = pipeline.translate_voice(&input, &to, &output)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Reel {
            repo,
            script,
            audio,
            images,
        } => {
            let script = read_script(&script)?;
            let reels = reel_creator(&config)?;
            let path = reels.create_reel(
                &repo,
                &ScriptSegments::from_script(&script),
                &reel_images(images),
                audio.as_deref(),
            )?;
            eprintln!("🎉 Reel saved to: {}", path.display());
        }
        Command::Narrate {
            video,
            audio,
            output,
        } => {
            let path = reel_creator(&config)?.compose_narrated_video(&video, &audio, &output)?;
            eprintln!("🎉 Narrated video saved to: {}", path.display());
        }
        Command::Generate { batch, images } => {
            let script = read_script(&batch.script)?;
            let pipeline = ReelPipeline::new(audio_generator(&config, &batch)?, reel_creator(&config)?);
            let report = pipeline.run(&script, &batch.repo, &batch.languages, &reel_images(images));
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.outcome == BatchOutcome::Failed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxreel=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn translator(config: &VoxReelConfig) -> Result<Arc<dyn Translate>> {
    let loader = MarianLoader::new(&config.translation)?;
    Ok(Arc::new(Translator::new(loader, config.translation.pairs.clone())))
}

fn cloner(config: &VoxReelConfig) -> Arc<dyn VoiceClone> {
    Arc::new(VoiceCloner::new(CoquiCli::new(config.synthesis.clone())))
}

fn audio_generator(config: &VoxReelConfig, batch: &BatchArgs) -> Result<MultilingualAudioGenerator> {
    Ok(MultilingualAudioGenerator::new(
        translator(config)?,
        cloner(config),
        &batch.reference,
        &config.output.audio_dir,
    )
    .with_source_language(&config.translation.source_language)
    .with_max_parallel(config.pipeline.max_parallel_languages))
}

fn reel_creator(config: &VoxReelConfig) -> Result<ReelCreator> {
    let encoder = Arc::new(FfmpegEncoder::new(&config.reel.codec));
    Ok(ReelCreator::new(&config.reel, &config.output.video_dir, encoder)?)
}

fn reel_images(images: ImageArgs) -> ReelImages {
    ReelImages {
        flow: images.flow,
        screenshot: images.screenshot,
        architecture: images.architecture,
    }
}

fn read_script(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script '{}'", path.display()))
}

fn dubbed_output_path(audio_path: &Path, language: &str) -> Result<PathBuf> {
    let file_stem = audio_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid audio file path"))?;

    let parent_dir = audio_path
        .parent()
        .unwrap_or_else(|| Path::new("."));

    Ok(parent_dir.join(format!("{}_{}.wav", file_stem, language)))
}
