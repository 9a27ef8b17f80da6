//! CNI runtime: the ordered set of networks wired into each namespace.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sandnet_common::constants::{DEFAULT_INTERFACE_PREFIX, LOOPBACK_INTERFACE};
use sandnet_common::error::SandnetError;
use sandnet_common::types::NamespaceId;
use serde_json::Value;

use crate::PluginRuntime;
use crate::config::NetworkConfigList;
use crate::error::{CniError, Result};
use crate::invoke::{Command, Invocation, exec_plugin};
use crate::result::{Attachment, NetworkAttachment, PluginResult};

#[derive(Debug, Clone)]
struct Network {
    config: NetworkConfigList,
    ifname: String,
}

/// Plugin runtime backed by CNI plugin binaries.
///
/// The final `ADD` result of each attached network is kept in memory and
/// handed back as `prevResult` on `DEL` for networks speaking CNI 0.4.0
/// or later. The cache does not survive the process.
#[derive(Debug)]
pub struct CniRuntime {
    networks: Vec<Network>,
    plugin_dirs: Vec<PathBuf>,
    min_network_count: usize,
    /// Keyed by container id and network index.
    results: Mutex<HashMap<(String, usize), Value>>,
}

/// Builder for [`CniRuntime`].
#[derive(Debug, Clone, Default)]
pub struct CniRuntimeBuilder {
    conf_files: Vec<PathBuf>,
    plugin_dirs: Vec<PathBuf>,
    loopback: bool,
    interface_prefix: Option<String>,
    min_network_count: usize,
}

impl CniRuntimeBuilder {
    /// Adds a network configuration file. Each file becomes one network.
    #[must_use]
    pub fn conf_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.conf_files.push(path.into());
        self
    }

    /// Adds a directory searched for plugin binaries.
    #[must_use]
    pub fn plugin_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.plugin_dirs.push(path.into());
        self
    }

    /// Attaches a loopback network (`lo`) ahead of the configured networks.
    #[must_use]
    pub const fn loopback(mut self, enabled: bool) -> Self {
        self.loopback = enabled;
        self
    }

    /// Sets the interface prefix for configured networks (default `eth`).
    #[must_use]
    pub fn interface_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.interface_prefix = Some(prefix.into());
        self
    }

    /// Sets the number of networks that must be loaded before attaching.
    #[must_use]
    pub const fn min_network_count(mut self, count: usize) -> Self {
        self.min_network_count = count;
        self
    }

    /// Loads every configuration file and builds the runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file cannot be loaded or no
    /// plugin directory was given.
    pub fn build(self) -> Result<CniRuntime> {
        if self.plugin_dirs.is_empty() {
            return Err(CniError::Config(SandnetError::Config {
                message: "at least one cni plugin directory is required".to_string(),
            }));
        }

        let prefix = self
            .interface_prefix
            .unwrap_or_else(|| DEFAULT_INTERFACE_PREFIX.to_string());

        let mut networks = Vec::with_capacity(self.conf_files.len() + 1);
        if self.loopback {
            networks.push(Network {
                config: NetworkConfigList::loopback(),
                ifname: LOOPBACK_INTERFACE.to_string(),
            });
        }
        for (index, path) in self.conf_files.iter().enumerate() {
            let config = NetworkConfigList::from_file(path)?;
            tracing::debug!(
                network = %config.name,
                plugins = config.len(),
                ifname = %format!("{prefix}{index}"),
                "registered cni network"
            );
            networks.push(Network {
                config,
                ifname: format!("{prefix}{index}"),
            });
        }

        Ok(CniRuntime {
            networks,
            plugin_dirs: self.plugin_dirs,
            min_network_count: self.min_network_count,
            results: Mutex::default(),
        })
    }
}

impl CniRuntime {
    /// Starts building a runtime.
    #[must_use]
    pub fn builder() -> CniRuntimeBuilder {
        CniRuntimeBuilder::default()
    }

    /// Checks that enough networks are loaded to attach.
    ///
    /// # Errors
    ///
    /// Returns [`CniError::NotInitialized`] when fewer networks are loaded
    /// than the configured minimum.
    pub fn status(&self) -> Result<()> {
        if self.networks.len() < self.min_network_count {
            return Err(CniError::NotInitialized {
                required: self.min_network_count,
                found: self.networks.len(),
            });
        }
        Ok(())
    }

    /// Interface names in attach order.
    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.networks.iter().map(|n| n.ifname.as_str())
    }

    fn invocation<'a>(
        &'a self,
        command: Command,
        id: &'a NamespaceId,
        netns: &'a Path,
        network: &'a Network,
    ) -> Invocation<'a> {
        Invocation {
            command,
            container_id: id.as_str(),
            netns,
            ifname: &network.ifname,
            plugin_dirs: &self.plugin_dirs,
        }
    }

    fn cached_results(&self) -> MutexGuard<'_, HashMap<(String, usize), Value>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `ADD` for one network and returns the raw result of its chain.
    fn add_network(
        &self,
        network: &Network,
        id: &NamespaceId,
        netns: &Path,
    ) -> Result<Option<Value>> {
        let invocation = self.invocation(Command::Add, id, netns, network);
        let mut prev: Option<Value> = None;
        for (index, plugin) in network.config.plugin_types().enumerate() {
            let conf = network.config.plugin_config(index, prev.as_ref());
            let stdin = serde_json::to_vec(&conf).map_err(SandnetError::from)?;
            let stdout = exec_plugin(plugin, &invocation, &stdin)?;
            if !stdout.iter().all(u8::is_ascii_whitespace) {
                let value = serde_json::from_slice::<Value>(&stdout).map_err(|source| {
                    CniError::InvalidResult {
                        plugin: plugin.to_string(),
                        source,
                    }
                })?;
                prev = Some(value);
            }
        }
        Ok(prev)
    }

    /// Runs `DEL` for the network at `position`, plugins in reverse.
    fn del_network(&self, position: usize, id: &NamespaceId, netns: &Path) -> Result<()> {
        let network = &self.networks[position];
        let key = (id.as_str().to_string(), position);
        let cached = if supports_cached_result(&network.config.cni_version) {
            self.cached_results().get(&key).cloned()
        } else {
            None
        };

        let invocation = self.invocation(Command::Del, id, netns, network);
        let mut first_err = None;
        for (index, plugin) in network.config.plugin_types().enumerate().rev() {
            let conf = network.config.plugin_config(index, cached.as_ref());
            let outcome = serde_json::to_vec(&conf)
                .map_err(|e| CniError::Config(SandnetError::from(e)))
                .and_then(|stdin| exec_plugin(plugin, &invocation, &stdin));
            if let Err(e) = outcome {
                tracing::debug!(plugin, error = %e, "cni plugin DEL failed");
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => {
                let _ = self.cached_results().remove(&key);
                Ok(())
            }
        }
    }
}

fn parse_result(network: &Network, value: Option<Value>) -> Result<PluginResult> {
    match value {
        Some(value) => serde_json::from_value(value).map_err(|source| CniError::InvalidResult {
            plugin: network.config.plugin_types().last().unwrap_or_default().to_string(),
            source,
        }),
        None => Ok(PluginResult::default()),
    }
}

/// Whether `version` is CNI 0.4.0 or later, the first to pass
/// `prevResult` on `DEL`.
fn supports_cached_result(version: &str) -> bool {
    let mut parts = version.split('.').map(str::parse::<u32>);
    match (parts.next(), parts.next()) {
        (Some(Ok(major)), Some(Ok(minor))) => (major, minor) >= (0, 4),
        _ => false,
    }
}

fn network_error(command: Command, network: &Network, source: CniError) -> CniError {
    CniError::Network {
        command,
        network: network.config.name.clone(),
        ifname: network.ifname.clone(),
        source: Box::new(source),
    }
}

impl PluginRuntime for CniRuntime {
    fn attach(&self, id: &NamespaceId, netns: &Path) -> Result<Attachment> {
        self.status()?;

        let mut attached = Vec::with_capacity(self.networks.len());
        for (index, network) in self.networks.iter().enumerate() {
            let outcome = self.add_network(network, id, netns).and_then(|value| {
                let result = parse_result(network, value.clone())?;
                if let Some(value) = value {
                    let _ = self
                        .cached_results()
                        .insert((id.as_str().to_string(), index), value);
                }
                Ok(result)
            });
            match outcome {
                Ok(result) => attached.push(NetworkAttachment {
                    network: network.config.name.clone(),
                    ifname: network.ifname.clone(),
                    result,
                }),
                Err(e) => {
                    // The failed chain may have run some of its plugins.
                    for done in (0..=index).rev() {
                        if let Err(cleanup) = self.del_network(done, id, netns) {
                            tracing::warn!(
                                id = %id,
                                network = %self.networks[done].config.name,
                                error = %cleanup,
                                "failed to release network after attach failure"
                            );
                        }
                    }
                    return Err(network_error(Command::Add, network, e));
                }
            }
        }

        tracing::debug!(id = %id, networks = attached.len(), "cni networks attached");
        Ok(Attachment { networks: attached })
    }

    fn detach(&self, id: &NamespaceId, netns: &Path) -> Result<()> {
        let mut first_err = None;
        for (position, network) in self.networks.iter().enumerate().rev() {
            if let Err(e) = self.del_network(position, id, netns) {
                if first_err.is_none() {
                    first_err = Some(network_error(Command::Del, network, e));
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => {
                tracing::debug!(id = %id, "cni networks detached");
                Ok(())
            }
        }
    }
}
