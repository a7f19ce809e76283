//! GPU debug-message channel
//!
//! Backends that run with diagnostics enabled hand every driver or
//! validation message to a [`DiagnosticChannel`], which filters it by
//! severity, keeps counters and forwards it to the pipeline logger.
//! Reports are never fatal.

use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::log::LogSeverity;

/// Which debug messages get forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    /// Only errors
    ErrorsOnly,
    /// Errors and warnings
    ErrorsAndWarnings,
    /// Everything, including info and verbose
    All,
}

impl Default for DebugSeverity {
    fn default() -> Self {
        DebugSeverity::ErrorsAndWarnings
    }
}

/// Severity reported by the driver for one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugMessageSeverity {
    Verbose,
    Info,
    Warning,
    Error,
}

/// Category reported by the driver for one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugMessageKind {
    General,
    Validation,
    Performance,
}

/// One message delivered by the GPU debug callback
#[derive(Debug, Clone)]
pub struct DebugMessage {
    /// Emitting layer or API (e.g. "Vulkan")
    pub source: String,
    pub kind: DebugMessageKind,
    /// Driver message identifier name
    pub id: String,
    pub severity: DebugMessageSeverity,
    pub message: String,
}

/// Counters of messages that passed the severity filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl DiagnosticStats {
    /// Total number of forwarded messages
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Filtering, counting and logging sink for debug messages
pub struct DiagnosticChannel {
    filter: DebugSeverity,
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
    /// Occurrence count per message text
    occurrences: Mutex<FxHashMap<String, u32>>,
}

impl DiagnosticChannel {
    pub fn new(filter: DebugSeverity) -> Self {
        Self {
            filter,
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
            occurrences: Mutex::new(FxHashMap::default()),
        }
    }

    /// Severity filter this channel was created with
    pub fn filter(&self) -> DebugSeverity {
        self.filter
    }

    /// True if a message of `severity` passes the filter
    pub fn accepts(&self, severity: DebugMessageSeverity) -> bool {
        match self.filter {
            DebugSeverity::ErrorsOnly => severity == DebugMessageSeverity::Error,
            DebugSeverity::ErrorsAndWarnings => severity >= DebugMessageSeverity::Warning,
            DebugSeverity::All => true,
        }
    }

    /// Filter, count and log one message
    ///
    /// Returns true if the message was forwarded to the logger.
    pub fn report(&self, message: &DebugMessage) -> bool {
        if !self.accepts(message.severity) {
            return false;
        }

        let counter = match message.severity {
            DebugMessageSeverity::Error => &self.errors,
            DebugMessageSeverity::Warning => &self.warnings,
            DebugMessageSeverity::Info => &self.info,
            DebugMessageSeverity::Verbose => &self.verbose,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let occurrence = match self.occurrences.lock() {
            Ok(mut map) => {
                let count = map.entry(message.message.clone()).or_insert(0);
                *count += 1;
                *count
            }
            Err(_) => 1,
        };
        let repeat = if occurrence > 1 {
            format!(" [x{}]", occurrence)
        } else {
            String::new()
        };

        crate::log::log(
            log_severity(message.severity),
            "ibl::diagnostics",
            format!(
                "[{} {:?}] {}{}: {}",
                message.source, message.kind, message.id, repeat, message.message
            ),
        );
        true
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> DiagnosticStats {
        DiagnosticStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    /// Number of distinct messages reported more than once
    pub fn repeated_messages(&self) -> usize {
        self.occurrences
            .lock()
            .map(|map| map.values().filter(|&&count| count > 1).count())
            .unwrap_or(0)
    }
}

/// Logger severity a debug message is forwarded at
pub fn log_severity(severity: DebugMessageSeverity) -> LogSeverity {
    match severity {
        DebugMessageSeverity::Error => LogSeverity::Error,
        DebugMessageSeverity::Warning => LogSeverity::Warn,
        DebugMessageSeverity::Info => LogSeverity::Info,
        DebugMessageSeverity::Verbose => LogSeverity::Trace,
    }
}

#[cfg(test)]
#[path = "diagnostics_tests.rs"]
mod tests;
