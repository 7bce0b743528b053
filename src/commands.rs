use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use colored::{Color, ColoredString, Colorize};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::api::MubsirApi;
use crate::assistant::clipboard::SystemClipboard;
use crate::assistant::tts::SpeechEngine;
use crate::assistant::Speaker;
use crate::capture::camera::FfmpegCamera;
use crate::capture::FileSource;
use crate::cli::{AnalyzeArgs, CameraArgs, RecognitionArgs, SettingsUpdate};
use crate::config::{validate_interval, validate_quality, AppConfig};
use crate::db;
use crate::db::models::TranslatorSettings;
use crate::error::ErrorKind;
use crate::session::{Session, SessionCommand, SessionHandle, SessionMode, SessionRunner, Status};

const SPEECH_POLL: Duration = Duration::from_millis(100);

// ========== Config ==========

/// Persisted settings and environment, then any per-run flags.
pub fn load_config(db_path: &Path, overrides: &RecognitionArgs) -> Result<AppConfig, String> {
    let mut config = AppConfig::load(db_path)?;
    apply_recognition(&mut config, overrides);
    Ok(config)
}

fn apply_recognition(config: &mut AppConfig, overrides: &RecognitionArgs) {
    if let Some(mode) = overrides.mode {
        config.recognition = mode;
    }
    if let Some(lang) = overrides.lang {
        config.language = lang;
    }
}

fn start_session(
    config: &AppConfig,
    camera: FfmpegCamera,
) -> Result<(SessionHandle, tokio::task::JoinHandle<()>), String> {
    let api = MubsirApi::new(config).map_err(|e| e.to_string())?;
    log::info!("Analyzing frames at {}", api.endpoint());

    let (runner, handle) = SessionRunner::new(
        config,
        Arc::new(camera),
        Arc::new(api),
        Box::new(SpeechEngine::new()),
        Box::new(SystemClipboard),
    );
    Ok((handle, tokio::spawn(runner.run())))
}

/// One-line rendering of a session snapshot for the terminal.
pub fn describe(session: &Session) -> String {
    let style = session.status.style();
    if let Some(error) = &session.last_error {
        return format!("[{}] {}", style.label, error.message);
    }
    if session.detected_label.is_empty() {
        return format!("[{}]", style.label);
    }
    format!(
        "[{}] {} ({:.0}%)",
        style.label,
        session.detected_label,
        session.confidence * 100.0
    )
}

/// `describe` in the badge colour; busy states are bold.
pub fn paint(session: &Session) -> ColoredString {
    let style = session.status.style();
    let color = match style.color {
        "gray" => Color::BrightBlack,
        "blue" => Color::Blue,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "red" => Color::Red,
        _ => Color::White,
    };
    let line = describe(session).color(color);
    if style.pulse {
        line.bold()
    } else {
        line
    }
}

/// What Enter does after an error. A denied camera has to be started again;
/// other errors leave the camera running and only need a retry.
fn recovery_command(session: &Session) -> Option<SessionCommand> {
    if session.status != Status::Errored {
        return None;
    }
    let denied = session
        .last_error
        .as_ref()
        .is_some_and(|e| e.kind == ErrorKind::Permission);
    if denied {
        Some(SessionCommand::StartCamera)
    } else {
        Some(SessionCommand::Retry)
    }
}

// ========== Camera ==========

pub async fn run_camera(db_path: &Path, args: CameraArgs) -> Result<(), String> {
    let mut config = load_config(db_path, &args.recognition)?;
    if let Some(interval_ms) = args.interval_ms {
        config.capture.interval_ms = validate_interval(interval_ms)?;
    }
    if args.no_mirror {
        config.capture.mirror = false;
    }

    let camera = FfmpegCamera::new(&args.device, args.width, args.height);
    let (handle, task) = start_session(&config, camera)?;
    let mut updates = handle.subscribe();
    handle.send(SessionCommand::StartCamera).await?;

    println!("Enter: retry after an error, s: speak, c: copy, q: quit");
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stdin_open = true;
    let mut last = handle.snapshot();
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            line = input.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim() {
                    "q" => break,
                    "s" => handle.send(SessionCommand::Speak).await?,
                    "c" => match handle.copy_label().await {
                        Ok(()) => println!("Copied"),
                        Err(e) => println!("Copy failed: {}", e),
                    },
                    _ => {
                        if let Some(command) = recovery_command(&last) {
                            handle.send(command).await?;
                        }
                    }
                },
                // stdin closed; keep running until Ctrl-C
                Ok(None) => stdin_open = false,
                Err(e) => {
                    log::warn!("Failed to read input: {}", e);
                    stdin_open = false;
                }
            },
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = updates.borrow_and_update().clone();
                if session.status != last.status || session.detected_label != last.detected_label {
                    println!("{}", paint(&session));
                }
                let new_label = !session.detected_label.is_empty()
                    && session.detected_label != last.detected_label;
                if args.recognition.speak && new_label {
                    handle.send(SessionCommand::Speak).await?;
                }
                last = session;
            }
        }
    }

    let _ = handle.send(SessionCommand::Shutdown).await;
    task.await.map_err(|e| format!("Session task failed: {}", e))?;
    Ok(())
}

// ========== Upload ==========

/// Analyze one image file. Errors reported by the session are returned as `Err`.
pub async fn analyze_image(config: &AppConfig, args: &AnalyzeArgs) -> Result<Session, String> {
    // Uploads never open the camera; the device is only there to satisfy the runner.
    let (handle, task) = start_session(config, FfmpegCamera::new("0", 1, 1))?;
    let mut updates = handle.subscribe();
    handle
        .send(SessionCommand::AnalyzeUpload(FileSource::from_path(&args.path)))
        .await?;

    let session = loop {
        updates
            .changed()
            .await
            .map_err(|_| "Session ended before the upload was analyzed".to_string())?;
        let session = updates.borrow_and_update().clone();
        if session.mode == SessionMode::Upload
            && matches!(session.status, Status::Idle | Status::Errored)
        {
            break session;
        }
    };

    if args.copy && session.status == Status::Idle && !session.detected_label.is_empty() {
        handle.copy_label().await?;
    }
    let _ = handle.send(SessionCommand::Shutdown).await;
    task.await.map_err(|e| format!("Session task failed: {}", e))?;

    if let Some(error) = &session.last_error {
        return Err(error.message.clone());
    }

    if args.recognition.speak && !session.detected_label.is_empty() {
        let mut speech = SpeechEngine::new();
        speech.speak(&session.detected_label, config.language);
        while speech.is_speaking() {
            tokio::time::sleep(SPEECH_POLL).await;
        }
    }
    Ok(session)
}

// ========== Settings ==========

pub fn get_settings(db_path: &Path) -> Result<TranslatorSettings, String> {
    db::load_translator_settings(db_path)
}

pub fn update_settings(db_path: &Path, update: &SettingsUpdate) -> Result<TranslatorSettings, String> {
    let mut settings = db::load_translator_settings(db_path)?;
    if let Some(v) = update.interval_ms {
        settings.capture_interval_ms = validate_interval(v)?;
    }
    if let Some(v) = update.quality {
        settings.encode_quality = validate_quality(v)?;
    }
    if let Some(v) = update.mirror {
        settings.mirror = v;
    }
    if let Some(v) = update.mode {
        settings.recognition_mode = v;
    }
    if let Some(v) = update.lang {
        settings.language = v;
    }
    db::save_translator_settings(db_path, &settings)?;
    log::info!("Settings updated: {:?}", settings);
    Ok(settings)
}
