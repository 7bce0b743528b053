use std::io::Write;

fn crash_log(msg: &str) {
    let path = dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".mubsir");
    let _ = std::fs::create_dir_all(&path);
    let log_path = path.join("crash.log");
    if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
        let _ = writeln!(f, "[{}] {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"), msg);
    }
}

fn main() {
    std::panic::set_hook(Box::new(|info| {
        let msg = format!("PANIC: {}", info);
        crash_log(&msg);
        eprintln!("{}", msg);
    }));

    match std::panic::catch_unwind(mubsir_desktop_lib::run) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            crash_log(&format!("FATAL: {:?}", e));
            std::process::exit(101);
        }
    }
}
