use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use voicekeep_gateway::GatewayConfig;
use voicekeep_util::redact::redact_token;
use voicekeep_util::validation::validate_token;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read token registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token registry {path} is not a JSON array of session entries: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no valid tokens found in {path}")]
    Empty { path: PathBuf },
}

/// Read the token registry, keeping the first occurrence of each valid token
/// in file order.
pub fn load_registry(path: &Path) -> Result<Vec<GatewayConfig>, RegistryError> {
    let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: Vec<GatewayConfig> =
        serde_json::from_str(&raw).map_err(|source| RegistryError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    let accepted = filter_entries(entries);
    if accepted.is_empty() {
        return Err(RegistryError::Empty {
            path: path.to_path_buf(),
        });
    }
    tracing::info!(count = accepted.len(), "loaded token registry");
    Ok(accepted)
}

fn filter_entries(entries: Vec<GatewayConfig>) -> Vec<GatewayConfig> {
    let mut seen = HashSet::new();
    let mut accepted = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        if let Err(e) = validate_token(&entry.token) {
            tracing::warn!(entry = index, token = %redact_token(&entry.token), "skipping entry: {e}");
            continue;
        }
        if let Err(e) = entry.validate() {
            tracing::warn!(entry = index, token = %redact_token(&entry.token), "skipping entry: {e}");
            continue;
        }
        if !seen.insert(entry.token.clone()) {
            tracing::warn!(entry = index, token = %redact_token(&entry.token), "skipping duplicate token");
            continue;
        }
        accepted.push(entry);
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(n: u8) -> String {
        format!("{}{}", char::from(b'a' + n), "x".repeat(40))
    }

    fn write_registry(value: serde_json::Value) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, value.to_string()).expect("write registry");
        (dir, path)
    }

    #[test]
    fn keeps_order_and_drops_short_and_duplicate_tokens() {
        let (_dir, path) = write_registry(json!([
            { "token": token(0), "serverId": "g1", "channelId": "c1" },
            { "token": "short" },
            { "token": token(1), "selfDeaf": false },
            { "token": token(0), "serverId": "g2" },
            { "token": "" }
        ]));

        let entries = load_registry(&path).expect("registry");
        let tokens: Vec<_> = entries.iter().map(|e| e.token.clone()).collect();
        assert_eq!(tokens, vec![token(0), token(1)]);
        assert_eq!(entries[0].server_id.as_deref(), Some("g1"));
        assert!(!entries[1].self_deaf);
    }

    #[test]
    fn thirty_characters_is_too_short() {
        let (_dir, path) = write_registry(json!([
            { "token": "y".repeat(30) },
            { "token": "z".repeat(31) }
        ]));
        let entries = load_registry(&path).expect("registry");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].token.len(), 31);
    }

    #[test]
    fn all_rejected_is_an_error() {
        let (_dir, path) = write_registry(json!([{ "token": "short" }]));
        assert!(matches!(load_registry(&path), Err(RegistryError::Empty { .. })));

        let (_dir, path) = write_registry(json!([]));
        assert!(matches!(load_registry(&path), Err(RegistryError::Empty { .. })));
    }

    #[test]
    fn unreadable_or_malformed_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent.json");
        assert!(matches!(load_registry(&missing), Err(RegistryError::Io { .. })));

        let (_dir, path) = write_registry(json!({ "token": token(2) }));
        assert!(matches!(load_registry(&path), Err(RegistryError::Json { .. })));
    }
}
