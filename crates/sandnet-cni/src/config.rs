//! CNI network configuration loading.
//!
//! A configuration file holds either a network list (a `plugins` array run
//! as a chain) or a single network config (one plugin, identified by its
//! `type` field). Both are normalized into a [`NetworkConfigList`].

use std::path::Path;

use sandnet_common::error::{Result, SandnetError};
use serde_json::{Map, Value};

/// CNI spec version used for the built-in loopback network.
pub const LOOPBACK_CNI_VERSION: &str = "0.3.1";

/// Name of the built-in loopback network.
pub const LOOPBACK_NETWORK_NAME: &str = "cni-loopback";

/// An ordered chain of plugin configurations sharing a network name.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfigList {
    /// Network name.
    pub name: String,
    /// CNI spec version the plugins speak.
    pub cni_version: String,
    plugins: Vec<Map<String, Value>>,
}

impl NetworkConfigList {
    /// Loads a network configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid
    /// network configuration.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| SandnetError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        tracing::debug!(path = %path.display(), "loaded cni network config");
        Self::from_bytes(&bytes).map_err(|e| match e {
            SandnetError::Config { message } => SandnetError::Config {
                message: format!("{}: {message}", path.display()),
            },
            other => other,
        })
    }

    /// Parses a network configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not JSON or lacks a name,
    /// version, or plugin type.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Value::Object(mut doc) = serde_json::from_slice::<Value>(bytes)? else {
            return Err(config_error("network config must be a JSON object"));
        };

        let name = required_str(&doc, "name")?;
        let cni_version = required_str(&doc, "cniVersion")?;

        let plugins = match doc.remove("plugins") {
            Some(Value::Array(entries)) => entries
                .into_iter()
                .map(|entry| match entry {
                    Value::Object(plugin) => Ok(plugin),
                    _ => Err(config_error("plugin entries must be JSON objects")),
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(config_error("\"plugins\" must be an array")),
            None => vec![doc],
        };

        if plugins.is_empty() {
            return Err(config_error(format!("network {name:?} has no plugins")));
        }
        for plugin in &plugins {
            let plugin_type = required_str(plugin, "type")?;
            if plugin_type.contains('/') {
                return Err(config_error(format!(
                    "plugin type {plugin_type:?} must be a bare binary name"
                )));
            }
        }

        Ok(Self {
            name,
            cni_version,
            plugins,
        })
    }

    /// The network that brings up `lo` inside every namespace.
    #[must_use]
    pub fn loopback() -> Self {
        let mut plugin = Map::new();
        let _ = plugin.insert("type".to_string(), Value::from("loopback"));
        Self {
            name: LOOPBACK_NETWORK_NAME.to_string(),
            cni_version: LOOPBACK_CNI_VERSION.to_string(),
            plugins: vec![plugin],
        }
    }

    /// Number of plugins in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the chain is empty. Loaded lists never are.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugin types in chain order.
    pub fn plugin_types(&self) -> impl DoubleEndedIterator<Item = &str> + ExactSizeIterator {
        self.plugins
            .iter()
            .map(|p| p.get("type").and_then(Value::as_str).unwrap_or_default())
    }

    /// Builds the stdin document for plugin `index`, chaining `prev_result`.
    #[must_use]
    pub fn plugin_config(&self, index: usize, prev_result: Option<&Value>) -> Value {
        let mut conf = self.plugins.get(index).cloned().unwrap_or_default();
        let _ = conf.insert("name".to_string(), Value::from(self.name.as_str()));
        let _ = conf.insert(
            "cniVersion".to_string(),
            Value::from(self.cni_version.as_str()),
        );
        if let Some(prev) = prev_result {
            let _ = conf.insert("prevResult".to_string(), prev.clone());
        }
        Value::Object(conf)
    }
}

fn required_str(doc: &Map<String, Value>, key: &str) -> Result<String> {
    match doc.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(config_error(format!("missing or empty {key:?}"))),
    }
}

fn config_error(message: impl Into<String>) -> SandnetError {
    SandnetError::Config {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_network_list() {
        let list = NetworkConfigList::from_bytes(
            br#"{
                "cniVersion": "0.4.0",
                "name": "buildkit",
                "plugins": [
                    {"type": "bridge", "bridge": "buildkit0", "ipam": {"type": "host-local"}},
                    {"type": "firewall"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(list.name, "buildkit");
        assert_eq!(list.cni_version, "0.4.0");
        assert_eq!(list.plugin_types().collect::<Vec<_>>(), ["bridge", "firewall"]);
    }

    #[test]
    fn single_config_becomes_one_plugin_list() {
        let list = NetworkConfigList::from_bytes(
            br#"{"cniVersion": "0.3.1", "name": "net", "type": "bridge", "isGateway": true}"#,
        )
        .unwrap();
        assert_eq!(list.len(), 1);
        let conf = list.plugin_config(0, None);
        assert_eq!(conf["type"], "bridge");
        assert_eq!(conf["isGateway"], true);
    }

    #[test]
    fn plugin_config_injects_name_version_and_prev_result() {
        let list = NetworkConfigList::from_bytes(
            br#"{"cniVersion": "1.0.0", "name": "n", "plugins": [{"type": "a"}, {"type": "b"}]}"#,
        )
        .unwrap();
        let prev = serde_json::json!({"ips": [{"address": "10.0.0.2/24"}]});
        let conf = list.plugin_config(1, Some(&prev));
        assert_eq!(conf["name"], "n");
        assert_eq!(conf["cniVersion"], "1.0.0");
        assert_eq!(conf["type"], "b");
        assert_eq!(conf["prevResult"], prev);
    }

    #[test]
    fn rejects_missing_name() {
        let err = NetworkConfigList::from_bytes(br#"{"cniVersion": "0.3.1", "type": "bridge"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("\"name\""));
    }

    #[test]
    fn rejects_empty_plugin_list() {
        let err =
            NetworkConfigList::from_bytes(br#"{"cniVersion": "0.3.1", "name": "n", "plugins": []}"#)
                .unwrap_err();
        assert!(matches!(err, SandnetError::Config { .. }));
    }

    #[test]
    fn rejects_plugin_type_with_path() {
        let err = NetworkConfigList::from_bytes(
            br#"{"cniVersion": "0.3.1", "name": "n", "type": "../../bin/sh"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("bare binary name"));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = NetworkConfigList::from_bytes(b"{not json").unwrap_err();
        assert!(matches!(err, SandnetError::Serialization { .. }));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = NetworkConfigList::from_file(&dir.path().join("absent.conflist")).unwrap_err();
        assert!(matches!(err, SandnetError::Io { .. }));
    }

    #[test]
    fn loopback_network_runs_loopback_plugin() {
        let lo = NetworkConfigList::loopback();
        assert_eq!(lo.name, LOOPBACK_NETWORK_NAME);
        assert_eq!(lo.plugin_types().collect::<Vec<_>>(), ["loopback"]);
    }
}
