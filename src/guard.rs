//! Out-of-scope heuristic
//!
//! A post-hoc keyword match over the generated text. It does not see the
//! model's internals: a response that merely discusses these phrases is
//! flagged, and a refusal worded differently is not.

/// Phrases that mark a response as a guardrail refusal
pub const REFUSAL_KEYWORDS: [&str; 3] = ["restricted", "out of scope", "appears out of scope"];

/// First refusal phrase found in `text`, case-insensitively
#[must_use]
pub fn refusal_keyword(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    REFUSAL_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| lowered.contains(keyword))
}

/// Whether `text` reads as an in-scope answer
///
/// # Example
///
/// ```
/// use centinela::guard::is_in_scope;
///
/// assert!(is_in_scope("4"));
/// assert!(!is_in_scope("This request appears OUT OF SCOPE"));
/// ```
#[must_use]
pub fn is_in_scope(text: &str) -> bool {
    refusal_keyword(text).is_none()
}
