use once_cell::sync::Lazy;
use regex::Regex;

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws"));
static TOKEN_SEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,]+").expect("token sep"));

/// Collapses every whitespace run to a single space, optionally trimming.
pub fn normalise(text: &str, trim: bool) -> String {
    let collapsed = WS_RE.replace_all(text, " ");
    if trim {
        collapsed.trim().to_string()
    } else {
        collapsed.into_owned()
    }
}

pub fn has_visible_text(text: &str) -> bool {
    text.chars().any(|c| !c.is_whitespace())
}

/// Splits a profiling attribute value into tokens. Both the DITA form
/// (`"pub1 pub2"`) and the merged form (`"pub1, pub2"`) are accepted.
pub fn split_tokens(value: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tok in TOKEN_SEP_RE.split(value) {
        if tok.is_empty() || out.iter().any(|t| t == tok) {
            continue;
        }
        out.push(tok.to_string());
    }
    out
}

pub fn join_tokens(tokens: &[String]) -> String {
    tokens.join(", ")
}

/// Splits `text` into (leading whitespace, core, trailing whitespace).
pub fn split_outer_whitespace(text: &str) -> (&str, &str, &str) {
    let start = text.len() - text.trim_start().len();
    let end = text.trim_end().len().max(start);
    (&text[..start], &text[start..end], &text[end..])
}
