//! Post-processing: cut the SQL statement out of a raw model response.
//!
//! Chat models wrap answers in fences, repeat the `SQL:` cue, or continue a
//! few-shot example mid-statement with a dangling `VALUES` line. A handful of
//! deterministic rules, applied in order, recover the statement:
//!
//! 1. Strip an outer code fence (```` ```sql ```` or bare ```` ``` ````)
//! 2. Normalise line endings (CRLF → LF)
//! 3. Strip invisible Unicode (BOM, zero-width spaces)
//! 4. Keep only the text after the first `SQL:` marker, if there is one
//! 5. Drop leading lines starting with `VALUES` (orphaned continuation rows)
//! 6. Trim, and strip a fence again if the marker was followed by one

use crate::prompts::SQL_CUE;
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all extraction rules. `None` when nothing is left.
pub fn extract_sql(raw: &str) -> Option<String> {
    let s = strip_code_fences(raw);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = after_sql_marker(&s);
    let s = drop_leading_values(s);
    let s = strip_code_fences(s.trim());
    let s = s.trim();

    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip invisible characters ───────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}'))
        .collect()
}

// ── Rule 4: Cut at the SQL marker ────────────────────────────────────────────

fn after_sql_marker(input: &str) -> &str {
    match input.split_once(SQL_CUE) {
        Some((_, rest)) => rest,
        None => input,
    }
}

// ── Rule 5: Drop orphaned VALUES lines ───────────────────────────────────────

fn drop_leading_values(input: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for line in input.trim().split('\n') {
        if kept.is_empty() && line.trim().to_uppercase().starts_with("VALUES") {
            continue;
        }
        kept.push(line);
    }
    kept.join("\n")
}
