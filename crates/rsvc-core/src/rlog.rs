//! Leveled stderr logging.
//!
//! The dispatch path cannot afford a logging framework, so these macros
//! write straight to a locked stderr handle. The level is read from
//! `RSVC_LOG` the first time anything logs (`off`, `error`, `warn`,
//! `info`, `debug`, `trace`; default `warn`). Set `RSVC_LOG_FLUSH=1` to
//! flush after every line when hunting a crash.
//!
//! ```ignore
//! use rsvc_core::{rerror, rwarn, rinfo};
//!
//! rinfo!("worker {} started", id);
//! rwarn!("unexpected state: {}", state);
//! rerror!("futex wake failed: errno {}", errno);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Severity of a log line, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn parse(s: &str) -> Option<LogLevel> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Some(LogLevel::Off),
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn tag(self) -> &'static str {
        const TAGS: [&str; 6] = ["off  ", "error", "warn ", "info ", "debug", "trace"];
        TAGS[self as usize]
    }
}

// The active level lives in one atomic; `u8::MAX` marks "environment not
// consulted yet" so `set_level` can pin a level before anything logs.
const LEVEL_UNSET: u8 = u8::MAX;
static LEVEL: AtomicU8 = AtomicU8::new(LEVEL_UNSET);
static FLUSH: AtomicBool = AtomicBool::new(false);

fn current_level() -> LogLevel {
    match LEVEL.load(Ordering::Relaxed) {
        LEVEL_UNSET => init_from_env(),
        0 => LogLevel::Off,
        1 => LogLevel::Error,
        2 => LogLevel::Warn,
        3 => LogLevel::Info,
        4 => LogLevel::Debug,
        _ => LogLevel::Trace,
    }
}

fn init_from_env() -> LogLevel {
    if let Ok(v) = std::env::var("RSVC_LOG_FLUSH") {
        FLUSH.store(matches!(v.as_str(), "1" | "true" | "on"), Ordering::Relaxed);
    }
    let level = std::env::var("RSVC_LOG")
        .ok()
        .as_deref()
        .and_then(LogLevel::parse)
        .unwrap_or(LogLevel::Warn);
    LEVEL.store(level as u8, Ordering::Relaxed);
    level
}

/// Pin the level programmatically, overriding the environment.
pub fn set_level(level: LogLevel) {
    LEVEL.store(level as u8, Ordering::Relaxed);
}

/// True if a line at `level` would be written.
#[inline]
pub fn enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level <= current_level()
}

/// Single write path behind the macros. One locked write per line, so
/// worker and dispatch output interleave as whole lines, never fragments.
#[doc(hidden)]
pub fn _write(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    let _ = writeln!(out, "[{}] {}", level.tag(), args);
    if FLUSH.load(Ordering::Relaxed) {
        let _ = out.flush();
    }
}

/// Log at an explicit level; the per-level macros below are shorthand.
#[macro_export]
macro_rules! rlog {
    ($level:ident, $($arg:tt)*) => {
        $crate::rlog::_write($crate::rlog::LogLevel::$level, format_args!($($arg)*))
    };
}

/// Error level log (always shown unless logging is off)
#[macro_export]
macro_rules! rerror {
    ($($arg:tt)*) => { $crate::rlog!(Error, $($arg)*) };
}

/// Warning level log
#[macro_export]
macro_rules! rwarn {
    ($($arg:tt)*) => { $crate::rlog!(Warn, $($arg)*) };
}

/// Info level log
#[macro_export]
macro_rules! rinfo {
    ($($arg:tt)*) => { $crate::rlog!(Info, $($arg)*) };
}

/// Debug level log
#[macro_export]
macro_rules! rdebug {
    ($($arg:tt)*) => { $crate::rlog!(Debug, $($arg)*) };
}

/// Trace level log (most verbose)
#[macro_export]
macro_rules! rtrace {
    ($($arg:tt)*) => { $crate::rlog!(Trace, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_names() {
        assert_eq!(LogLevel::parse("TRACE"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("none"), Some(LogLevel::Off));
        assert_eq!(LogLevel::parse("verbose"), None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(LogLevel::Off < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Trace);
    }

    #[test]
    fn test_enabled_respects_pinned_level() {
        set_level(LogLevel::Info);
        assert!(enabled(LogLevel::Error));
        assert!(enabled(LogLevel::Info));
        assert!(!enabled(LogLevel::Debug));

        set_level(LogLevel::Off);
        assert!(!enabled(LogLevel::Error));
        // Suppressed, but the macro paths still have to expand.
        rerror!("suppressed {}", 1);
        rtrace!("also suppressed");
    }
}
