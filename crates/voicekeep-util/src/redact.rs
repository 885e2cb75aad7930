/// Number of leading token characters left visible.
pub const VISIBLE_PREFIX: usize = 10;

/// Redact a credential for logs and the status surface: the first ten
/// characters followed by `...`.
pub fn redact_token(token: &str) -> String {
    let prefix: String = token.chars().take(VISIBLE_PREFIX).collect();
    format!("{prefix}...")
}
