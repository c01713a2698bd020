// src/core/diagnostics.rs

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

/// The stage that reported a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// CVU text that failed to parse.
    Parse,
    /// An expression that failed to evaluate.
    Expression,
    /// A render description that could not be built.
    Render,
    /// A datasource query that could not run.
    Query,
    /// An `include`/`inherit` that could not be followed.
    Include,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::Parse => "parse",
            DiagnosticKind::Expression => "expression",
            DiagnosticKind::Render => "render",
            DiagnosticKind::Query => "query",
            DiagnosticKind::Include => "include",
        };
        f.write_str(name)
    }
}

/// A recoverable problem found while resolving a view.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Stage that reported the problem.
    pub kind: DiagnosticKind,
    /// What was being resolved, such as `list:*` or a property name.
    pub context: String,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.context, self.message)
    }
}

/// Bounded history of diagnostics. Every entry is also logged as a warning;
/// the oldest entries are dropped once the capacity is reached.
pub struct Diagnostics {
    capacity: usize,
    entries: Mutex<VecDeque<Diagnostic>>,
}

impl Diagnostics {
    /// Keeps at most `capacity` entries; zero only logs.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Logs the problem and appends it to the history.
    pub fn record(&self, kind: DiagnosticKind, context: &str, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            kind,
            context: context.to_string(),
            message: message.into(),
        };
        log::warn!("{}", diagnostic);

        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(diagnostic);
    }

    /// Snapshot of the history, oldest first.
    pub fn entries(&self) -> Vec<Diagnostic> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.iter().cloned().collect()
    }

    /// Number of entries kept.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// True when nothing was recorded, or everything was cleared.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops the history.
    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_DIAGNOSTICS_CAPACITY)
    }
}
