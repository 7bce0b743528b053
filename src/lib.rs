pub mod api;
pub mod assistant;
pub mod capture;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod session;

use std::path::Path;

use clap::Parser;

use cli::{Cli, Command, SettingsCommand};

fn init_logging() {
    let log_path = dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".mubsir")
        .join("mubsir.log");
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    if let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    } else {
        env_logger::init();
    }
}

pub fn run() -> Result<(), String> {
    let cli = Cli::parse();
    init_logging();

    let db_path = cli.db.clone().unwrap_or_else(db::get_db_path);
    db::initialize(&db_path).map_err(|e| format!("Failed to open settings at {:?}: {}", db_path, e))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {}", e))?;
    runtime.block_on(dispatch(cli.command, &db_path))
}

async fn dispatch(command: Command, db_path: &Path) -> Result<(), String> {
    match command {
        Command::Camera(args) => {
            log::info!("Mubsir camera session starting");
            commands::run_camera(db_path, args).await
        }
        Command::Analyze(args) => {
            let config = commands::load_config(db_path, &args.recognition)?;
            let session = commands::analyze_image(&config, &args).await?;
            if session.detected_label.is_empty() {
                println!("No sign detected");
            } else {
                println!(
                    "{} ({:.0}%)",
                    session.detected_label,
                    session.confidence * 100.0
                );
            }
            Ok(())
        }
        Command::Settings { command } => {
            let settings = match command {
                SettingsCommand::Show => commands::get_settings(db_path)?,
                SettingsCommand::Set(update) => commands::update_settings(db_path, &update)?,
            };
            let json = serde_json::to_string_pretty(&settings)
                .map_err(|e| format!("Serialize error: {}", e))?;
            println!("{}", json);
            Ok(())
        }
    }
}
