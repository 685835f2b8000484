use crate::config::Config;

/// Decide whether a write into `space` is allowed.
///
/// Tokens are opaque bytes; a request passes if its token is in the union
/// of the global and per-space token lists, or if the client certificate
/// fingerprint is whitelisted.
#[must_use]
pub fn authorize_write(
    config: &Config,
    space: &str,
    token: Option<&str>,
    fingerprint: Option<&str>,
) -> bool {
    if let Some(token) = token {
        if config
            .tokens_for_space(space)
            .iter()
            .any(|t| t.as_bytes() == token.as_bytes())
        {
            return true;
        }
    }
    if let Some(fingerprint) = fingerprint {
        if config
            .fingerprints
            .iter()
            .any(|f| f.eq_ignore_ascii_case(fingerprint))
        {
            return true;
        }
    }
    false
}
