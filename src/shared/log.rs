pub use crate::debug;
pub use crate::error;
pub use crate::info;
pub use crate::warn;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::{self, Mutex};

static LOG_LEVEL_ONCE: sync::Once = sync::Once::new();
static mut LOG_LEVEL: LogLevel = LogLevel::Debug;

static LOG_SINK: OnceCell<Mutex<Box<dyn Write + Send>>> = OnceCell::new();

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialOrd, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Initializes the logger with the given level, writing to stdout. Equivalent
/// to `init_log_to(lvl, None)`; kept around since most callers don't care
/// about file redirection.
pub fn init_log(lvl: LogLevel) {
    init_log_to(lvl, None).expect("stdout is always writable");
}

/// Initializes the logger with the given level. If `logfile` is `Some`, log
/// lines are appended to that file instead of written to stdout. Only the
/// first call has any effect; later calls are silently ignored, same as
/// [`init_log`].
pub fn init_log_to(lvl: LogLevel, logfile: Option<&str>) -> io::Result<()> {
    if LOG_LEVEL_ONCE.is_completed() {
        return Ok(());
    }

    let sink: Box<dyn Write + Send> = match logfile {
        Some(path) => Box::new(OpenOptions::new().create(true).append(true).open(path)?),
        None => Box::new(io::stdout()),
    };
    // LOG_SINK may already be set if a previous init_log_to call raced us and
    // lost the LOG_LEVEL_ONCE race; get_or_init keeps whichever came first.
    LOG_SINK.get_or_init(|| Mutex::new(sink));

    unsafe {
        LOG_LEVEL_ONCE.call_once(|| {
            LOG_LEVEL = lvl;
        });
    }
    Ok(())
}

pub fn log_level() -> LogLevel {
    if !LOG_LEVEL_ONCE.is_completed() {
        panic!("log not initialized");
    }
    unsafe { LOG_LEVEL }
}

/// Writes a single already-formatted line (no trailing newline) to the
/// configured sink, falling back to stdout if the logger was never
/// initialized through [`init_log`]/[`init_log_to`].
pub fn write_line(line: &str) {
    match LOG_SINK.get() {
        Some(sink) => {
            let mut sink = sink.lock().unwrap();
            let _ = writeln!(sink, "{}", line);
        }
        None => println!("{}", line),
    }
}

#[macro_export]
macro_rules! debug {
    ($fmt:expr) => {{
        use colored::*;
        if log::log_level() <= log::LogLevel::Debug {
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
            log::write_line(&format!("{} {} {}", timestamp, "DEBUG".bold().bright_magenta(), $fmt));
        };
    }};

    ($fmt:expr, $($arg:tt)*) => {{
        use colored::*;
        if log::log_level() <= log::LogLevel::Debug {
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
            log::write_line(&format!("{} {} {}", timestamp, "DEBUG".bold().bright_magenta(), format!($fmt, $($arg)*)));
        }
    }}
}

#[macro_export]
macro_rules! info {
    ($fmt:expr) => {{
        use colored::*;
        if log::log_level() <= log::LogLevel::Info {
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
            log::write_line(&format!("{} {} {}", timestamp, "INFO".bold().bright_green(), $fmt));
        };
    }};

    ($fmt:expr, $($arg:tt)*) => {{
        use colored::*;
        if log::log_level() <= log::LogLevel::Info {
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
            log::write_line(&format!("{} {} {}", timestamp, "INFO".bold().bright_green(), format!($fmt, $($arg)*)));
        }
    }}
}

#[macro_export]
macro_rules! warn {
    ($fmt:expr) => {{
        use colored::*;
        if log::log_level() <= log::LogLevel::Warn {
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
            log::write_line(&format!("{} {} {}", timestamp, "WARN".bold().bright_yellow(), $fmt));
        };
    }};

    ($fmt:expr, $($arg:tt)*) => {{
        use colored::*;
        if log::log_level() <= log::LogLevel::Warn {
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
            log::write_line(&format!("{} {} {}", timestamp, "WARN".bold().bright_yellow(), format!($fmt, $($arg)*)));
        };
    }}
}

#[macro_export]
macro_rules! error {
    ($fmt:expr) => {{
        use colored::*;
        if log::log_level() <= log::LogLevel::Error {
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
            log::write_line(&format!("{} {} {}", timestamp, "ERROR".bold().bright_red(), $fmt));
        };
    }};

    ($fmt:expr, $($arg:tt)+) => {{
        use colored::*;
        if log::log_level() <= log::LogLevel::Error {
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
            log::write_line(&format!("{} {} {}", timestamp, "ERROR".bold().bright_red(), format!($fmt, $($arg)*)));
        };
    }}
}
