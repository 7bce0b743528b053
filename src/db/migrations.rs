use rusqlite::Connection;

const MIGRATIONS: &[&str] = &[
    // V1: Core tables
    "CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT DEFAULT (datetime('now'))
    );",
    // V1: Schema version
    "INSERT OR IGNORE INTO settings (key, value) VALUES ('schema_version', '1');",
    // V1: Default settings
    "INSERT OR IGNORE INTO settings (key, value) VALUES ('capture_interval_ms', '2000');",
    "INSERT OR IGNORE INTO settings (key, value) VALUES ('encode_quality', '0.9');",
    "INSERT OR IGNORE INTO settings (key, value) VALUES ('mirror', 'true');",
    "INSERT OR IGNORE INTO settings (key, value) VALUES ('recognition_mode', 'letters');",
    "INSERT OR IGNORE INTO settings (key, value) VALUES ('language', 'en');",
];

pub fn run(conn: &Connection) -> Result<(), rusqlite::Error> {
    for migration in MIGRATIONS {
        conn.execute_batch(migration)?;
    }
    log::info!("Database migrations complete");
    Ok(())
}
