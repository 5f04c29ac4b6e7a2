use super::CabConfig;
use std::path::PathBuf;
use tracing::warn;

/// Apply environment overrides on top of file/default configuration.
///
/// `lookup` abstracts `std::env::var` so tests can feed a fixed map.
pub(super) fn apply_overrides<F>(config: &mut CabConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("PORT") {
        match v.parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(_) => warn!(value = %v, "Ignoring invalid PORT"),
        }
    }
    if let Some(v) = lookup("CABTRACK_BIND_ADDR") {
        config.server.bind_addr = v;
    }
    if let Some(v) = lookup("CABTRACK_AUTH_TOKENS") {
        let tokens: Vec<String> = v
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if !tokens.is_empty() {
            config.auth.enabled = true;
            config.auth.tokens = tokens;
        }
    }
    if let Some(v) = lookup("CABTRACK_SNAPSHOT_DIR") {
        config.snapshot.directory = PathBuf::from(v);
    }
    if let Some(v) = lookup("CABTRACK_PROXIMITY_URL") {
        config.dispatch.proximity_base_url = Some(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn apply(vars: &[(&str, &str)]) -> CabConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = CabConfig::default();
        apply_overrides(&mut config, |key| vars.get(key).cloned());
        config
    }

    #[test]
    fn test_no_overrides() {
        let config = apply(&[]);
        assert_eq!(config.server.port, 8081);
        assert!(!config.auth.enabled);
    }

    #[test]
    fn test_port_and_bind_override() {
        let config = apply(&[("PORT", "9100"), ("CABTRACK_BIND_ADDR", "127.0.0.1")]);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.bind_addr, "127.0.0.1");
    }

    #[test]
    fn test_invalid_port_ignored() {
        let config = apply(&[("PORT", "not-a-port")]);
        assert_eq!(config.server.port, 8081);
    }

    #[test]
    fn test_tokens_enable_auth() {
        let config = apply(&[("CABTRACK_AUTH_TOKENS", "a, b,,c")]);
        assert!(config.auth.enabled);
        assert_eq!(config.auth.tokens, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_paths_and_urls() {
        let config = apply(&[
            ("CABTRACK_SNAPSHOT_DIR", "/tmp/snaps"),
            ("CABTRACK_PROXIMITY_URL", "http://admin:8081"),
        ]);
        assert_eq!(config.snapshot.directory, PathBuf::from("/tmp/snaps"));
        assert_eq!(config.proximity_base_url(), "http://admin:8081");
    }
}
