//! Logging Infrastructure
//!
//! Structured, leveled logging for the storage-area runtime. Log output is
//! diagnostic only; nothing in the public API contract depends on it.
//!
//! # Features
//!
//! - **Log Levels**: Trace, Debug, Info, Warn, Error
//! - **Structured Fields**: key-value pairs on any entry
//! - **Output Formats**: plain text and JSON, selected at runtime
//!
//! # Example
//!
//! ```rust,ignore
//! use lsa_runtime::log::{self, Entry, Level};
//!
//! log::info("area created");
//!
//! Entry::new(Level::Debug, "cow split")
//!     .field_int("page", 3)
//!     .field_int("refs", 2)
//!     .emit();
//! ```

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    /// Trace level (most verbose).
    Trace = 0,
    /// Debug level.
    Debug = 1,
    /// Info level.
    Info = 2,
    /// Warning level.
    Warn = 3,
    /// Error level.
    Error = 4,
    /// Off (no logging).
    Off = 5,
}

impl Level {
    /// Level name as an upper-case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    /// Recover a level from its `u8` representation.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Level::Trace),
            1 => Some(Level::Debug),
            2 => Some(Level::Info),
            3 => Some(Level::Warn),
            4 => Some(Level::Error),
            5 => Some(Level::Off),
            _ => None,
        }
    }

    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::Info
    }
}

/// Output format for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Plain text (human readable).
    Plain,
    /// JSON (machine readable).
    Json,
}

impl Format {
    /// Parse a format name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Some(Format::Plain),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

impl Default for Format {
    fn default() -> Self {
        Format::Plain
    }
}

/// A value attached to a structured field.
#[derive(Debug, Clone)]
pub enum Value {
    /// String value.
    Str(String),
    /// Integer value.
    Int(i64),
    /// Boolean value.
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl Value {
    fn to_json(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", escape_json(s)),
            Value::Int(i) => i.to_string(),
            Value::Bool(b) => b.to_string(),
        }
    }
}

/// A structured log entry.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Severity of the entry.
    pub level: Level,
    /// Human-readable message.
    pub message: String,
    /// Structured key-value fields.
    pub fields: Vec<(String, Value)>,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    /// Name of the emitting thread, if it has one.
    pub thread_name: Option<String>,
}

impl Entry {
    /// Create an entry stamped with the current time and thread.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            level,
            message: message.into(),
            fields: Vec::new(),
            timestamp,
            thread_name: std::thread::current().name().map(|s| s.to_string()),
        }
    }

    /// Attach a string field.
    pub fn field_str(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), Value::Str(value.into())));
        self
    }

    /// Attach an integer field.
    pub fn field_int(mut self, key: impl Into<String>, value: i64) -> Self {
        self.fields.push((key.into(), Value::Int(value)));
        self
    }

    /// Attach a boolean field.
    pub fn field_bool(mut self, key: impl Into<String>, value: bool) -> Self {
        self.fields.push((key.into(), Value::Bool(value)));
        self
    }

    /// Render as plain text.
    pub fn format_plain(&self) -> String {
        let mut out = String::new();
        let secs = self.timestamp / 1000;
        let millis = self.timestamp % 1000;
        out.push_str(&format!("[{}.{:03}] {:<5} ", secs, millis, self.level.as_str()));
        if let Some(thread) = &self.thread_name {
            out.push_str(&format!("({}) ", thread));
        }
        out.push_str(&self.message);
        if !self.fields.is_empty() {
            out.push_str(" {");
            for (i, (key, value)) in self.fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&format!("{}={}", key, value));
            }
            out.push('}');
        }
        out
    }

    /// Render as a single JSON object.
    pub fn format_json(&self) -> String {
        let mut out = String::from("{");
        out.push_str(&format!("\"timestamp\":{}", self.timestamp));
        out.push_str(&format!(",\"level\":\"{}\"", self.level.as_str()));
        if let Some(thread) = &self.thread_name {
            out.push_str(&format!(",\"thread\":\"{}\"", escape_json(thread)));
        }
        out.push_str(&format!(",\"message\":\"{}\"", escape_json(&self.message)));
        if !self.fields.is_empty() {
            out.push_str(",\"fields\":{");
            for (i, (key, value)) in self.fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&format!("\"{}\":{}", escape_json(key), value.to_json()));
            }
            out.push('}');
        }
        out.push('}');
        out
    }

    /// Render according to the given format.
    pub fn format(&self, format: Format) -> String {
        match format {
            Format::Plain => self.format_plain(),
            Format::Json => self.format_json(),
        }
    }

    /// Emit this entry through the global logger.
    pub fn emit(self) {
        emit(&self);
    }
}

fn escape_json(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Global logger sink configuration.
static SINK: OnceLock<Mutex<Sink>> = OnceLock::new();

/// Minimum level, kept in an atomic for a cheap pre-filter.
static MIN_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

/// Master enable switch.
static ENABLED: AtomicBool = AtomicBool::new(true);

#[derive(Debug, Default)]
struct Sink {
    format: Format,
}

fn sink() -> &'static Mutex<Sink> {
    SINK.get_or_init(|| Mutex::new(Sink::default()))
}

/// Set the minimum level below which entries are discarded.
pub fn set_level(level: Level) {
    MIN_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Current minimum level.
pub fn level() -> Level {
    Level::from_u8(MIN_LEVEL.load(Ordering::SeqCst)).unwrap_or(Level::Info)
}

/// Set the output format.
pub fn set_format(format: Format) {
    if let Ok(mut cfg) = sink().lock() {
        cfg.format = format;
    }
}

/// Enable or disable logging entirely.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::SeqCst);
}

/// Whether an entry at `level` would currently be written.
pub fn would_log(level: Level) -> bool {
    ENABLED.load(Ordering::SeqCst) && level != Level::Off && level >= self::level()
}

/// Write an entry to stderr if it passes the level filter.
pub fn emit(entry: &Entry) {
    if !would_log(entry.level) {
        return;
    }
    let line = {
        let cfg = match sink().lock() {
            Ok(c) => c,
            Err(_) => return,
        };
        entry.format(cfg.format)
    };
    let _ = writeln!(std::io::stderr(), "{}", line);
}

/// Log a trace message.
pub fn trace(message: impl Into<String>) {
    if would_log(Level::Trace) {
        emit(&Entry::new(Level::Trace, message));
    }
}

/// Log a debug message.
pub fn debug(message: impl Into<String>) {
    if would_log(Level::Debug) {
        emit(&Entry::new(Level::Debug, message));
    }
}

/// Log an info message.
pub fn info(message: impl Into<String>) {
    if would_log(Level::Info) {
        emit(&Entry::new(Level::Info, message));
    }
}

/// Log a warning.
pub fn warn(message: impl Into<String>) {
    if would_log(Level::Warn) {
        emit(&Entry::new(Level::Warn, message));
    }
}

/// Log an error.
pub fn error(message: impl Into<String>) {
    if would_log(Level::Error) {
        emit(&Entry::new(Level::Error, message));
    }
}
