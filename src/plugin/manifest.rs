//! Plugin manifest parsing and validation.
//!
//! Every plugin ships a `manifest.json` declaring its identity, the
//! capabilities it needs, and the URL/path allow-lists its sandboxed
//! network and filesystem access are scoped to.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::capability::Capability;

/// Error type for manifest loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid plugin id {0:?}: must be non-empty lowercase [a-z0-9-]")]
    InvalidId(String),

    #[error("manifest id {manifest:?} does not match plugin id {plugin:?}")]
    IdMismatch { manifest: String, plugin: String },

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub author: Option<String>,

    /// Capabilities this plugin may use. Host calls needing an undeclared
    /// capability are rejected, not silently ignored.
    #[serde(default)]
    pub capabilities: Vec<Capability>,

    /// URL patterns for `net:http`; `*` matches any path suffix.
    #[serde(default)]
    pub allowed_urls: Vec<String>,

    /// Absolute path prefixes for `fs:read` / `fs:list`.
    #[serde(default)]
    pub allowed_paths: Vec<PathBuf>,
}

impl PluginManifest {
    /// Parse a manifest from JSON text and validate it.
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let manifest: PluginManifest = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load `manifest.json` from a plugin directory.
    pub fn from_dir(dir: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(dir.join("manifest.json"))?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.id.is_empty()
            || !self
                .id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ManifestError::InvalidId(self.id.clone()));
        }
        if self.name.is_empty() {
            return Err(ManifestError::MissingField("name"));
        }
        if self.version.is_empty() {
            return Err(ManifestError::MissingField("version"));
        }
        Ok(())
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Check a URL against the allow-list. A trailing `*` in a pattern
    /// matches any suffix; otherwise the match is exact.
    pub fn url_allowed(&self, url: &str) -> bool {
        self.allowed_urls.iter().any(|pattern| {
            match pattern.strip_suffix('*') {
                Some(prefix) => url.starts_with(prefix),
                None => url == pattern,
            }
        })
    }

    /// Check a canonicalized path against the allow-list. Paths must live
    /// under the user's home directory and under one of the declared
    /// prefixes.
    pub fn path_allowed(&self, canonical: &Path, home: &Path) -> bool {
        canonical.starts_with(home)
            && self
                .allowed_paths
                .iter()
                .any(|prefix| canonical.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(json: &str) -> PluginManifest {
        PluginManifest::from_json(json).unwrap()
    }

    #[test]
    fn test_minimal_manifest() {
        let m = manifest(r#"{"id": "pr-watch", "name": "PR Watch", "version": "1.0.0"}"#);
        assert_eq!(m.id, "pr-watch");
        assert!(m.capabilities.is_empty());
    }

    #[test]
    fn test_capabilities_parsed() {
        let m = manifest(
            r#"{"id": "auto-confirm", "name": "Auto Confirm", "version": "0.1.0",
                "capabilities": ["pty:write", "ui:sound"]}"#,
        );
        assert!(m.has_capability(Capability::PtyWrite));
        assert!(m.has_capability(Capability::UiSound));
        assert!(!m.has_capability(Capability::NetHttp));
    }

    #[test]
    fn test_invalid_id_rejected() {
        let result =
            PluginManifest::from_json(r#"{"id": "Bad_Id", "name": "x", "version": "1"}"#);
        assert!(matches!(result, Err(ManifestError::InvalidId(_))));

        let result = PluginManifest::from_json(r#"{"id": "", "name": "x", "version": "1"}"#);
        assert!(matches!(result, Err(ManifestError::InvalidId(_))));
    }

    #[test]
    fn test_url_allow_list() {
        let m = manifest(
            r#"{"id": "fetcher", "name": "Fetcher", "version": "1.0.0",
                "capabilities": ["net:http"],
                "allowedUrls": ["https://api.example.com/*", "https://exact.host/ping"]}"#,
        );
        assert!(m.url_allowed("https://api.example.com/v1/items"));
        assert!(m.url_allowed("https://exact.host/ping"));
        assert!(!m.url_allowed("https://exact.host/other"));
        assert!(!m.url_allowed("https://evil.example.org/"));
    }

    #[test]
    fn test_path_allow_list() {
        let m = manifest(
            r#"{"id": "reader", "name": "Reader", "version": "1.0.0",
                "allowedPaths": ["/home/me/.claude"]}"#,
        );
        let home = Path::new("/home/me");
        assert!(m.path_allowed(Path::new("/home/me/.claude/projects/x.jsonl"), home));
        assert!(!m.path_allowed(Path::new("/home/me/secrets.txt"), home));
        assert!(!m.path_allowed(Path::new("/etc/passwd"), home));
    }
}
