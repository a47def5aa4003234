//! Session log for the canvas.
//!
//! Every `log_info!` / `log_warn!` / `log_err!` call goes through [`write`],
//! which formats the line once and hands it to two optional outputs:
//!
//! * the session file, opened by [`init`] and truncated on each launch;
//! * stderr, for lines at or above the severity set with [`set_verbosity`].
//!
//! With neither output configured (library use, tests) logging is a no-op.
//! The file lives in `$GENCANVAS_LOG_DIR` when set, otherwise in the
//! platform data directory under `GenCanvas/gencanvas.log`.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of a log line.  Ordered from most to least severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warn,
    Info,
}

impl Level {
    pub fn tag(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
        }
    }
}

struct Sink {
    file: Option<File>,
    /// Least severe level still mirrored to stderr; `None` = no echo.
    echo: Option<Level>,
}

static SINK: Mutex<Sink> = Mutex::new(Sink { file: None, echo: None });

fn sink() -> std::sync::MutexGuard<'static, Sink> {
    SINK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Mirror lines at `level` or more severe to stderr.  `None` turns the
/// echo off.  The CLI maps `--verbose` to `Some(Level::Info)`.
pub fn set_verbosity(level: Option<Level>) {
    sink().echo = level;
}

fn echoes(threshold: Option<Level>, level: Level) -> bool {
    threshold.is_some_and(|t| level <= t)
}

fn format_line(secs: u64, level: Level, msg: fmt::Arguments<'_>) -> String {
    format!("[{}] [{}] {}", clock(secs), level.tag(), msg)
}

/// Append one line to every configured output.  I/O errors are dropped.
pub fn write(level: Level, msg: fmt::Arguments<'_>) {
    let mut sink = sink();
    let echo = echoes(sink.echo, level);
    if sink.file.is_none() && !echo {
        return;
    }
    let line = format_line(unix_secs(), level, msg);
    if echo {
        eprintln!("{}", line);
    }
    if let Some(file) = sink.file.as_mut() {
        let _ = writeln!(file, "{}", line);
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, format_args!($($arg)*))
    };
}

/// Open the session file and hook panics into it.  Failure to open the file
/// is reported on stderr; the echo keeps working either way.
pub fn init() {
    let path = log_dir().join("gencanvas.log");
    match open_session(&path) {
        Ok(file) => sink().file = Some(file),
        Err(e) => {
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            return;
        }
    }

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        // The panicking thread may hold the sink; never block on it here.
        if let Ok(mut sink) = SINK.try_lock()
            && let Some(file) = sink.file.as_mut()
        {
            let _ = writeln!(file, "[{}] [PANIC] {}", clock(unix_secs()), info);
        }
        prev(info);
    }));
}

fn open_session(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    writeln!(file, "=== GenCanvas session, unix time {} ===", unix_secs())?;
    Ok(file)
}

fn log_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("GENCANVAS_LOG_DIR") {
        return PathBuf::from(dir);
    }
    let base = if cfg!(target_os = "windows") {
        std::env::var_os("APPDATA").map(PathBuf::from)
    } else if cfg!(target_os = "macos") {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join("Library/Application Support"))
    } else {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
    };
    base.unwrap_or_else(std::env::temp_dir).join("GenCanvas")
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// UTC wall-clock `HH:MM:SS` of a unix timestamp.
fn clock(secs: u64) -> String {
    let day = secs % 86_400;
    format!("{:02}:{:02}:{:02}", day / 3600, day % 3600 / 60, day % 60)
}
