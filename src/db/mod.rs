pub mod migrations;
pub mod models;

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use models::TranslatorSettings;

pub fn get_db_path() -> PathBuf {
    let data_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mubsir");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("mubsir.db")
}

pub fn initialize(db_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = open(db_path)?;

    // Run migrations
    migrations::run(&conn)?;

    log::info!("Database initialized at {:?}", db_path);
    Ok(())
}

pub fn open(db_path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn get_setting(db_path: &Path, key: &str) -> Result<Option<String>, String> {
    let conn = open(db_path).map_err(|e| format!("DB error: {}", e))?;
    conn.query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| {
        row.get(0)
    })
    .optional()
    .map_err(|e| format!("Read setting '{}' failed: {}", key, e))
}

pub fn set_setting(db_path: &Path, key: &str, value: &str) -> Result<(), String> {
    let conn = open(db_path).map_err(|e| format!("DB error: {}", e))?;
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )
    .map_err(|e| format!("Set setting failed: {}", e))?;
    Ok(())
}

fn read_or<T: FromStr>(db_path: &Path, key: &str, fallback: T) -> Result<T, String> {
    match get_setting(db_path, key)? {
        Some(raw) => match raw.parse() {
            Ok(value) => Ok(value),
            Err(_) => {
                log::warn!("Ignoring invalid setting {}={:?}", key, raw);
                Ok(fallback)
            }
        },
        None => Ok(fallback),
    }
}

pub fn load_translator_settings(db_path: &Path) -> Result<TranslatorSettings, String> {
    let defaults = TranslatorSettings::default();
    Ok(TranslatorSettings {
        capture_interval_ms: read_or(db_path, "capture_interval_ms", defaults.capture_interval_ms)?,
        encode_quality: read_or(db_path, "encode_quality", defaults.encode_quality)?,
        mirror: read_or(db_path, "mirror", defaults.mirror)?,
        recognition_mode: read_or(db_path, "recognition_mode", defaults.recognition_mode)?,
        language: read_or(db_path, "language", defaults.language)?,
    })
}

pub fn save_translator_settings(db_path: &Path, settings: &TranslatorSettings) -> Result<(), String> {
    set_setting(db_path, "capture_interval_ms", &settings.capture_interval_ms.to_string())?;
    set_setting(db_path, "encode_quality", &settings.encode_quality.to_string())?;
    set_setting(db_path, "mirror", if settings.mirror { "true" } else { "false" })?;
    set_setting(db_path, "recognition_mode", settings.recognition_mode.as_str())?;
    set_setting(db_path, "language", settings.language.code())?;
    Ok(())
}
