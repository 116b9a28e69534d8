//! Diagnostic logging sink
//!
//! Append-only `[timestamp] [LEVEL] message` records, one per line, written
//! to a file in the working directory and mirrored to stderr. Installed as
//! the process-wide `log` backend by the host binary; the library itself only
//! ever emits through the `log` macros.

use chrono::Local;
use log::{LevelFilter, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

pub struct DiagnosticLog {
    file: Mutex<File>,
    level: LevelFilter,
}

impl DiagnosticLog {
    pub fn open(path: &Path, level: LevelFilter) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            level,
        })
    }

    fn write_record(&self, level: log::Level, message: &std::fmt::Arguments) {
        let line = format!(
            "[{}] [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level,
            message
        );
        eprintln!("{line}");
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{line}");
        }
    }
}

impl log::Log for DiagnosticLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.write_record(record.level(), record.args());
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

/// Install the diagnostic sink as the global logger. Debug builds log at
/// `Debug`, release builds at `Info`.
pub fn init(path: &Path) -> Result<(), String> {
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let logger = DiagnosticLog::open(path, level)
        .map_err(|e| format!("failed to open diagnostic log {}: {}", path.display(), e))?;

    log::set_boxed_logger(Box::new(logger))
        .map(|()| log::set_max_level(level))
        .map_err(|e| format!("failed to install logger: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_are_appended_with_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.log");

        let sink = DiagnosticLog::open(&path, LevelFilter::Debug).unwrap();
        sink.write_record(log::Level::Info, &format_args!("first"));
        sink.write_record(log::Level::Warn, &format_args!("second {}", 2));
        log::Log::flush(&sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("[INFO] first"));
        assert!(lines[1].ends_with("[WARN] second 2"));
    }

    #[test]
    fn test_reopen_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.log");

        {
            let sink = DiagnosticLog::open(&path, LevelFilter::Info).unwrap();
            sink.write_record(log::Level::Info, &format_args!("one"));
        }
        {
            let sink = DiagnosticLog::open(&path, LevelFilter::Info).unwrap();
            sink.write_record(log::Level::Info, &format_args!("two"));
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
