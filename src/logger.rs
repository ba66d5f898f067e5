//! Session logger — a `log` backend writing to a single file in the OS data
//! directory.
//!
//! The file is **truncated at each launch**, so it only ever holds output
//! from the most recent run.
//!
//! Log location:
//!   Windows:  `%APPDATA%\MaterialFE\materialfe.log`
//!   Linux:    `~/.local/share/MaterialFE/materialfe.log`
//!   macOS:    `~/Library/Application Support/MaterialFE/materialfe.log`
//!
//! Library code logs through the `log` macros; the binary calls [`init`] once.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{LevelFilter, Log, Metadata, Record};

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

pub struct SessionLogger {
    file: Option<Mutex<File>>,
    path: Option<PathBuf>,
    echo_stderr: bool,
}

impl SessionLogger {
    /// Open (truncating) `path`. A file that cannot be opened leaves the
    /// logger writing to stderr only, if echo is on.
    pub fn open(path: &Path, echo_stderr: bool) -> Self {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path);
        match file {
            Ok(f) => Self {
                file: Some(Mutex::new(f)),
                path: Some(path.to_path_buf()),
                echo_stderr,
            },
            Err(e) => {
                eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
                Self { file: None, path: None, echo_stderr }
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write a raw line. I/O errors are swallowed; logging never fails a run.
    pub fn write_line(&self, line: &str) {
        if let Some(mutex) = &self.file
            && let Ok(mut file) = mutex.lock()
        {
            let _ = writeln!(file, "{}", line);
        }
    }
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] [{}] {}", timestamp(), record.level(), record.args());
        if self.echo_stderr {
            eprintln!("{}", line);
        }
        self.write_line(&line);
    }

    fn flush(&self) {
        if let Some(mutex) = &self.file
            && let Ok(mut file) = mutex.lock()
        {
            let _ = file.flush();
        }
    }
}

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static Path> {
    LOGGER.get().and_then(SessionLogger::path)
}

/// Install the session logger. Later calls only adjust the level.
///
/// * Creates (or truncates) the log file.
/// * Installs a panic hook that writes the panic message to the log before
///   running the previous hook.
pub fn init(level: LevelFilter, echo_stderr: bool) {
    log::set_max_level(level);
    if LOGGER.get().is_some() {
        return;
    }
    let logger = LOGGER.get_or_init(|| SessionLogger::open(&log_file_path(), echo_stderr));
    if log::set_logger(logger).is_err() {
        return;
    }

    logger.write_line(&format!("=== MaterialFE session started {} ===", human_timestamp()));
    if let Some(path) = logger.path() {
        logger.write_line(&format!("Log file: {}", path.display()));
    }
    logger.write_line("");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(l) = LOGGER.get() {
            l.write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        }
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("MaterialFE").join("materialfe.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

/// HH:MM:SS within the current UTC day.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => {
            let secs = d.as_secs();
            format!("{:02}:{:02}:{:02}", (secs % 86400) / 3600, (secs % 3600) / 60, secs % 60)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}
