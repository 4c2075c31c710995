//! Identifier-expression resolution.

/// Resolve an identifier expression into sorted, deduplicated slot ids.
///
/// The grammar is a comma-separated list of tokens, each either a single
/// non-negative integer or an inclusive range `A-B`. En and em dashes are
/// normalized to `-` before parsing, so `3–5` behaves like `3-5`.
///
/// - Reversed ranges (`5-3`) resolve to nothing.
/// - Malformed tokens are dropped silently; resolution never fails. Only a
///   token's outer edges are trimmed, so inner spaces (`3 - 5`) make it
///   malformed.
/// - Empty output is a normal value. Callers decide whether it is an error.
pub fn resolve_ids(expr: &str) -> Vec<u32> {
    let mut ids = Vec::new();
    for raw in expr.split(',') {
        let token = raw.trim().replace(['\u{2013}', '\u{2014}'], "-");
        if token.is_empty() {
            continue;
        }
        if let Some((start, end)) = token.split_once('-') {
            if let (Some(a), Some(b)) = (parse_digits(start), parse_digits(end)) {
                if b >= a {
                    ids.extend(a..=b);
                }
            }
        } else if let Some(id) = parse_digits(&token) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Parse a token consisting solely of ASCII digits.
fn parse_digits(token: &str) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
