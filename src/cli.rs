use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(long, value_name = "CONFIG FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the languages voice cloning can speak
    Languages,

    /// Translate a piece of text
    Translate {
        #[arg(long)]
        text: String,

        /// Source language; defaults to the configured script language
        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: String,
    },

    /// Speak text in the voice of a reference recording
    Clone {
        #[arg(long)]
        text: String,

        /// Reference voice sample (WAV)
        #[arg(long, value_name = "AUDIO FILE")]
        reference: PathBuf,

        #[arg(long, default_value = "en")]
        language: String,

        #[arg(short, long, value_name = "OUTPUT PATH")]
        output: PathBuf,
    },

    /// Voice a script in several languages
    Audio {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Transcribe, translate and re-voice an existing recording
    Dub {
        /// Input audio file (MP3, WAV, etc.)
        #[arg(short, long, value_name = "AUDIO FILE")]
        input: PathBuf,

        #[arg(long)]
        to: String,

        #[arg(short, long, value_name = "OUTPUT PATH")]
        output: Option<PathBuf>,
    },

    /// Render a single 20 second reel
    Reel {
        #[arg(long)]
        repo: String,

        /// Script text file
        #[arg(long, value_name = "SCRIPT FILE")]
        script: PathBuf,

        /// Narration to attach
        #[arg(long, value_name = "AUDIO FILE")]
        audio: Option<PathBuf>,

        #[command(flatten)]
        images: ImageArgs,
    },

    /// Lay narration over an existing video, looping or cutting it to fit
    Narrate {
        #[arg(long, value_name = "VIDEO FILE")]
        video: PathBuf,

        #[arg(long, value_name = "AUDIO FILE")]
        audio: PathBuf,

        #[arg(short, long, value_name = "OUTPUT PATH")]
        output: PathBuf,
    },

    /// Full pipeline: multilingual narration and one reel per language
    Generate {
        #[command(flatten)]
        batch: BatchArgs,

        #[command(flatten)]
        images: ImageArgs,
    },
}

#[derive(Args)]
pub struct BatchArgs {
    /// Script text file
    #[arg(long, value_name = "SCRIPT FILE")]
    pub script: PathBuf,

    /// Reference voice sample (WAV)
    #[arg(long, value_name = "AUDIO FILE")]
    pub reference: PathBuf,

    #[arg(long, default_value = "demo-project")]
    pub repo: String,

    /// Comma separated language codes
    #[arg(long, value_delimiter = ',', default_value = "en")]
    pub languages: Vec<String>,
}

#[derive(Args)]
pub struct ImageArgs {
    /// Image shown in the problem segment
    #[arg(long, value_name = "IMAGE FILE")]
    pub flow: Option<PathBuf>,

    /// Image shown in the solution segment
    #[arg(long, value_name = "IMAGE FILE")]
    pub screenshot: Option<PathBuf>,

    /// Image shown in the architecture segment
    #[arg(long, value_name = "IMAGE FILE")]
    pub architecture: Option<PathBuf>,
}
