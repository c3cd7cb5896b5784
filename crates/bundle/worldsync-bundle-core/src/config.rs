//! Tunables for indexing, import and export.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Directory scan options.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// List bundles whose root has no `meta` map.
    pub include_metaless: bool,
    /// Only scan files with one of these extensions (without the dot,
    /// case-insensitive). `None` scans every regular file.
    pub extensions: Option<Vec<String>>,
}

impl IndexConfig {
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(allowed) = &self.extensions else {
            return true;
        };
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        allowed.iter().any(|a| a.eq_ignore_ascii_case(ext))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Parent for the bundle's root entities. `None` keeps their own `loc`.
    pub root_location: Option<String>,
    /// Account that rule updates are sent from.
    pub account_id: Option<String>,
    /// Rewrite `{"$eid": ..}` references to server ids once all entities exist.
    pub resolve_references: bool,
    pub import_rules: bool,
    pub import_minds: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            root_location: None,
            account_id: None,
            resolve_references: true,
            import_rules: true,
            import_minds: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub name: String,
    pub description: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            name: "export".to_string(),
            description: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_filter_is_case_insensitive() {
        let cfg = IndexConfig {
            extensions: Some(vec!["xml".into()]),
            ..IndexConfig::default()
        };
        assert!(cfg.accepts(Path::new("/tmp/a.XML")));
        assert!(!cfg.accepts(Path::new("/tmp/a.json")));
        assert!(!cfg.accepts(Path::new("/tmp/README")));
        assert!(IndexConfig::default().accepts(Path::new("/tmp/README")));
    }

    #[test]
    fn import_config_fills_missing_fields() {
        let cfg: ImportConfig = serde_json::from_str(r#"{"account_id":"acc1"}"#).unwrap();
        assert_eq!(cfg.account_id.as_deref(), Some("acc1"));
        assert!(cfg.resolve_references && cfg.import_rules && cfg.import_minds);
    }
}
