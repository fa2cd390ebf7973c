//! Pattern-hit diagnostics
//!
//! When a pass fuses at least one match and diagnostics are enabled, exactly
//! one line is written to the configured sink:
//!
//! ```text
//! <namespace>,verbose,info,pattern,hit,<pass_name>
//! ```
//!
//! Diagnostics are switched on through `<PREFIX>_DUMP` (default prefix
//! `GRAPH_FUSION`): either an integer level above zero, or a comma separated
//! list of dump modes containing `pattern`.

use std::env;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::FusionResult;

/// Default environment prefix
pub const DEFAULT_ENV_PREFIX: &str = "GRAPH_FUSION";

/// Default namespace of diagnostic lines
pub const DEFAULT_NAMESPACE: &str = "graph_fusion";

/// Dump mode that enables pattern-hit lines
pub const PATTERN_MODE: &str = "pattern";

/// Shared writer behind [`DiagnosticSink::Writer`]
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Where diagnostic lines go
#[derive(Clone, Default)]
pub enum DiagnosticSink {
    /// Process standard output
    #[default]
    Stdout,
    /// Process standard error
    Stderr,
    /// In-memory buffer shared with the caller
    Buffer(Arc<Mutex<Vec<u8>>>),
    /// Any other writer, such as a log file
    Writer(SharedWriter),
}

impl fmt::Debug for DiagnosticSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "Stdout"),
            Self::Stderr => write!(f, "Stderr"),
            Self::Buffer(buf) => write!(f, "Buffer({} bytes)", buf.lock().len()),
            Self::Writer(_) => write!(f, "Writer(<dyn Write>)"),
        }
    }
}

impl DiagnosticSink {
    /// Create an empty shared buffer sink
    pub fn buffer() -> Self {
        Self::Buffer(Arc::new(Mutex::new(Vec::new())))
    }

    /// Wrap a writer
    pub fn writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self::Writer(Arc::new(Mutex::new(Box::new(writer))))
    }

    /// Text written to a buffer sink so far, `None` for stream sinks
    pub fn contents(&self) -> Option<String> {
        match self {
            Self::Buffer(buf) => Some(String::from_utf8_lossy(&buf.lock()).into_owned()),
            _ => None,
        }
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        match self {
            Self::Stdout => {
                let mut out = io::stdout().lock();
                writeln!(out, "{}", line)?;
                out.flush()
            }
            Self::Stderr => writeln!(io::stderr().lock(), "{}", line),
            Self::Buffer(buf) => writeln!(buf.lock(), "{}", line),
            Self::Writer(w) => {
                let mut w = w.lock();
                writeln!(w, "{}", line)?;
                w.flush()
            }
        }
    }
}

/// Diagnostic switches and output target
#[derive(Debug, Clone)]
pub struct DiagnosticConfig {
    /// Integer dump level; anything above zero enables every dump
    pub level: i64,
    /// Named dump modes
    pub modes: Vec<String>,
    /// First field of every line
    pub namespace: String,
    /// Output target
    pub sink: DiagnosticSink,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            level: 0,
            modes: Vec::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            sink: DiagnosticSink::default(),
        }
    }
}

impl DiagnosticConfig {
    /// Diagnostics switched off
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Pattern hits written to `sink`
    pub fn pattern_hits(sink: DiagnosticSink) -> Self {
        Self::default().with_mode(PATTERN_MODE).with_sink(sink)
    }

    /// Read `GRAPH_FUSION_DUMP`
    pub fn from_env() -> Self {
        Self::from_env_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Read `<prefix>_DUMP`
    pub fn from_env_prefix(prefix: &str) -> Self {
        let var = format!("{}_DUMP", prefix);
        match env::var(&var) {
            Ok(value) => Self::default().with_dump_value(&value),
            Err(_) => Self::default(),
        }
    }

    /// Apply a dump value: an integer level or comma separated modes
    pub fn with_dump_value(mut self, value: &str) -> Self {
        let value = value.trim();
        if let Ok(level) = value.parse::<i64>() {
            self.level = level;
        } else {
            self.modes = value
                .split(',')
                .map(|m| m.trim().to_ascii_lowercase())
                .filter(|m| !m.is_empty())
                .collect();
        }
        self
    }

    /// Set the dump level
    pub fn with_level(mut self, level: i64) -> Self {
        self.level = level;
        self
    }

    /// Add a dump mode
    pub fn with_mode(mut self, mode: &str) -> Self {
        self.modes.push(mode.to_ascii_lowercase());
        self
    }

    /// Set the namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the sink
    pub fn with_sink(mut self, sink: DiagnosticSink) -> Self {
        self.sink = sink;
        self
    }

    /// Whether pattern-hit lines are written
    pub fn pattern_hits_enabled(&self) -> bool {
        self.level > 0 || self.modes.iter().any(|m| m == PATTERN_MODE)
    }

    /// Format the hit line of a pass
    pub fn pattern_hit_line(&self, pass_name: &str) -> String {
        format!("{},verbose,info,pattern,hit,{}", self.namespace, pass_name)
    }

    /// Write the hit line if enabled; returns whether a line was written
    pub fn emit_pattern_hit(&self, pass_name: &str) -> FusionResult<bool> {
        if !self.pattern_hits_enabled() {
            return Ok(false);
        }
        self.sink.write_line(&self.pattern_hit_line(pass_name))?;
        Ok(true)
    }
}
