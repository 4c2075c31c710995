//! Execution strategies for slot fragments.
//!
//! The [`ExecStrategy`] trait decouples the batch engine from how a fragment
//! actually runs. The default backend evaluates fragments with an embedded,
//! fuel-limited template engine ([`template`]); [`process`] pipes fragments
//! to an external interpreter instead. Tests use scripted strategies that
//! return predetermined outcomes without evaluating anything.
//!
//! Strategies never see ambient state: parameters arrive as an immutable,
//! call-scoped mapping in the request and diagnostics accumulate into the
//! returned outcome, so nothing leaks between fragments.

pub mod process;
pub mod template;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Parameters for a single fragment execution.
#[derive(Debug, Clone)]
pub struct ExecRequest<'a> {
    /// Fragment source text, already extracted and trimmed.
    pub source: &'a str,
    /// Caller-supplied parameters, visible to this fragment only.
    pub params: &'a BTreeMap<String, String>,
    /// Wall-clock bound for strategies that wait on external processes.
    pub timeout: Duration,
    /// Cap on captured output, in bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over fragment execution backends.
pub trait ExecStrategy {
    /// Run one fragment. Failures are reported through [`Execution::fault`],
    /// never as a panic or a process-level error.
    fn execute(&self, request: &ExecRequest<'_>) -> Execution;
}

/// Outcome of one fragment execution.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    /// Text the fragment printed while running.
    pub output: String,
    /// Explicit return value, when the fragment produced one.
    pub value: Option<serde_json::Value>,
    /// Non-fatal notices accumulated during the run.
    pub diagnostics: Vec<Diagnostic>,
    /// Set when the fragment failed. Diagnostics gathered before the fault
    /// still stand.
    pub fault: Option<ExecFault>,
}

impl Execution {
    /// Outcome carrying only a fault.
    pub fn faulted(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            fault: Some(ExecFault {
                kind,
                message: message.into(),
            }),
            ..Self::default()
        }
    }

    /// Captured output: printed text followed by the rendered return value.
    pub fn captured(&self) -> String {
        let mut text = self.output.clone();
        if let Some(value) = &self.value {
            text.push_str(&render_value(value));
        }
        text
    }
}

/// Render a return value for inclusion in captured output.
///
/// Strings and numbers append verbatim, booleans as `true`/`false`, and
/// aggregates as a short type tag rather than a serialized dump.
pub fn render_value(value: &serde_json::Value) -> String {
    use serde_json::Value;
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) => "[array]".to_string(),
        Value::Object(_) => "[object]".to_string(),
    }
}

/// A non-fatal notice raised while a fragment ran.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Warning,
    Error,
}

/// A fragment failure, categorized for stable reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecFault {
    pub kind: FaultKind,
    pub message: String,
}

impl fmt::Display for ExecFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Template rendering failed (syntax or runtime).
    Template,
    /// Expression evaluation failed.
    Expression,
    /// The interpreter process could not be started.
    Spawn,
    /// The interpreter exited with a non-zero status.
    Exit,
    /// Execution exceeded the configured wall-clock bound.
    Timeout,
}

impl FaultKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FaultKind::Template => "template",
            FaultKind::Expression => "expression",
            FaultKind::Spawn => "spawn",
            FaultKind::Exit => "exit",
            FaultKind::Timeout => "timeout",
        }
    }
}
