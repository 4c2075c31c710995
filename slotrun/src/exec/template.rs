//! In-process fragment evaluation on the template engine.
//!
//! The default strategy. Fragments never reach an ambient `eval`: they run
//! inside a fresh, fuel-limited minijinja environment built per call, so
//! state cannot leak between fragments and a runaway fragment stops when its
//! fuel is spent instead of stalling the batch.

use minijinja::{Environment, ErrorKind, context};
use tracing::debug;

use crate::exec::{Diagnostic, ExecRequest, ExecStrategy, Execution, FaultKind};

/// Evaluates fragments with minijinja.
///
/// A one-line fragment without template markers is compiled as an
/// expression and yields a return value (`1 + 2`, `params.user`). If it does
/// not parse as an expression it renders as a template instead, so a literal
/// line passes through as output. Multi-line fragments always render as
/// templates. Parameters are exposed under the `params` namespace.
pub struct TemplateStrategy {
    fuel: u64,
}

impl TemplateStrategy {
    pub fn new(fuel: u64) -> Self {
        Self { fuel }
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_fuel(Some(self.fuel));
        env
    }

    /// Evaluate without the output cap; [`ExecStrategy::execute`] applies it.
    fn evaluate(&self, request: &ExecRequest<'_>) -> Execution {
        let source = request.source;
        let ctx = context! { params => request.params };
        let env = self.environment();

        if is_expression_candidate(source) {
            match env.compile_expression(source) {
                Ok(expr) => {
                    return match expr.eval(&ctx) {
                        Ok(value) if value.is_undefined() => {
                            debug!("expression evaluated to undefined");
                            Execution {
                                diagnostics: vec![Diagnostic::warning(
                                    "expression produced no value",
                                )],
                                ..Execution::default()
                            }
                        }
                        Ok(value) => match serde_json::to_value(&value) {
                            Ok(value) => Execution {
                                value: Some(value),
                                ..Execution::default()
                            },
                            Err(err) => Execution::faulted(
                                FaultKind::Expression,
                                format!("unserializable result: {err}"),
                            ),
                        },
                        Err(err) => fault_from(FaultKind::Expression, &err),
                    };
                }
                // Not an expression after all; fall through to rendering.
                Err(_) => debug!("fragment is not an expression, rendering as template"),
            }
        }

        match env.render_str(source, &ctx) {
            Ok(rendered) => Execution {
                output: rendered,
                ..Execution::default()
            },
            Err(err) => fault_from(FaultKind::Template, &err),
        }
    }
}

impl ExecStrategy for TemplateStrategy {
    fn execute(&self, request: &ExecRequest<'_>) -> Execution {
        let mut execution = self.evaluate(request);
        truncate_output(&mut execution, request.output_limit_bytes);
        execution
    }
}

/// One line, no template markers: worth trying as an expression.
fn is_expression_candidate(source: &str) -> bool {
    !source.contains('\n')
        && !source.contains("{{")
        && !source.contains("{%")
        && !source.contains("{#")
}

fn fault_from(kind: FaultKind, err: &minijinja::Error) -> Execution {
    if matches!(err.kind(), ErrorKind::OutOfFuel) {
        return Execution::faulted(FaultKind::Timeout, "evaluation fuel exhausted");
    }
    Execution::faulted(kind, err.to_string())
}

/// Cap the captured form (printed output plus rendered value) at `limit`
/// bytes. A cut collapses any value into plain truncated output, so
/// [`Execution::captured`] stays within the limit on every path.
fn truncate_output(execution: &mut Execution, limit: usize) {
    let mut text = execution.captured();
    if text.len() <= limit {
        return;
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let dropped = text.len() - cut;
    text.truncate(cut);
    execution.output = text;
    execution.value = None;
    execution
        .diagnostics
        .push(Diagnostic::warning(format!("output truncated {dropped} bytes")));
}
