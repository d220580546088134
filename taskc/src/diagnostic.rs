use crate::frontend::Location;
use std::fmt::Display;
use std::fmt::Formatter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A message about the input program, reported with its source location.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub loc: Location,
    pub msg: String,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {severity}: {}", self.loc, self.msg)
    }
}

/// Recoverable problems found while lowering one translation unit.
///
/// Lowering keeps going after a warning and skips the offending item.
#[derive(Debug, Default)]
pub struct Diagnostics {
    diagnostics: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn warning(&mut self, loc: Location, msg: &str) {
        tracing::warn!("{loc}: {msg}");
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            loc,
            msg: msg.to_string(),
        });
    }
    pub fn error(&mut self, loc: Location, msg: &str) {
        tracing::error!("{loc}: {msg}");
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            loc,
            msg: msg.to_string(),
        });
    }
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diagnostic| diagnostic.severity == Severity::Error)
    }
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }
    /// Whether any diagnostic message contains `text`.
    pub fn contains(&self, text: &str) -> bool {
        self.diagnostics
            .iter()
            .any(|diagnostic| diagnostic.msg.contains(text))
    }
}
