//! Heuristic classification of captured output.

/// Whether captured output looks like tabular (comma-separated) data.
///
/// The first non-empty line decides: contains a comma or not. Only
/// zero-length lines are skipped, so a whitespace-only line decides (and
/// never as tabular). Deliberately cheap and imprecise; a false positive
/// only costs a spurious archive entry, and output with a comma-free
/// first line is never archived.
pub fn looks_tabular(text: &str) -> bool {
    text.split(['\r', '\n'])
        .find(|line| !line.is_empty())
        .is_some_and(|line| line.contains(','))
}
