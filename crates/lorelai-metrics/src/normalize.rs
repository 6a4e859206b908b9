use regex::Regex;
use std::sync::OnceLock;

/// Lowercases, drops punctuation and collapses whitespace so that answers
/// differing only in formatting compare equal.
pub(crate) fn text(s: &str) -> String {
    static PUNCT: OnceLock<Regex> = OnceLock::new();
    let re = PUNCT.get_or_init(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("static regex"));
    re.replace_all(&s.to_lowercase(), " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (text(a), text(b));
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    strsim::sorensen_dice(&a, &b)
}
