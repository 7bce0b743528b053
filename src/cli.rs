use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{Language, RecognitionMode};

/// Mubsir - sign language to text translator
#[derive(Parser, Debug)]
#[command(name = "mubsir-desktop", version)]
#[command(about = "Translate sign language from a camera or image into text", long_about = None)]
pub struct Cli {
    /// Settings database (defaults to ~/.mubsir/mubsir.db)
    #[arg(long, global = true, value_name = "FILE")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch a live camera and translate signs until Ctrl-C
    Camera(CameraArgs),
    /// Translate a single image file
    Analyze(AnalyzeArgs),
    /// Show or change persisted settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

/// Overrides shared by both capture modes. Unset flags fall back to settings.
#[derive(Args, Debug, Clone, Default)]
pub struct RecognitionArgs {
    #[arg(long, value_enum)]
    pub mode: Option<RecognitionMode>,

    #[arg(long, value_enum)]
    pub lang: Option<Language>,

    /// Speak each new label aloud
    #[arg(long)]
    pub speak: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CameraArgs {
    /// Camera device (index or path, e.g. 0 or /dev/video0)
    #[arg(long, default_value = "0")]
    pub device: String,

    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Send frames as the sensor sees them instead of mirrored
    #[arg(long)]
    pub no_mirror: bool,

    #[arg(long, default_value_t = 640)]
    pub width: u32,

    #[arg(long, default_value_t = 480)]
    pub height: u32,

    #[command(flatten)]
    pub recognition: RecognitionArgs,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Copy the detected label to the clipboard
    #[arg(long)]
    pub copy: bool,

    #[command(flatten)]
    pub recognition: RecognitionArgs,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    Show,
    Set(SettingsUpdate),
}

#[derive(Args, Debug, Clone, Default)]
pub struct SettingsUpdate {
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,

    #[arg(long, value_enum)]
    pub mode: Option<RecognitionMode>,

    #[arg(long, value_enum)]
    pub lang: Option<Language>,

    /// JPEG quality in (0, 1]
    #[arg(long)]
    pub quality: Option<f32>,

    #[arg(long)]
    pub mirror: Option<bool>,
}
