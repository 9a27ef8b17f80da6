//! Configuration model for the network namespace provider.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    CNI_INIT_LOCK_PATH_ENV, DEFAULT_CNI_BINARY_DIR, DEFAULT_CNI_CONFIG_PATH, DEFAULT_ROOT,
    NETNS_REGISTRY_DIR,
};

/// How strongly provisioned namespaces isolate the sandboxed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// Kernel network namespaces, joined by the sandboxed process.
    Full,
    /// Plugin attach/detach bookkeeping only. The process keeps the host
    /// network stack.
    Degraded,
}

impl Isolation {
    /// Returns the strongest isolation the target platform supports.
    #[must_use]
    pub const fn platform_default() -> Self {
        if cfg!(target_os = "linux") {
            Self::Full
        } else {
            Self::Degraded
        }
    }
}

impl Default for Isolation {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// Inputs for constructing a CNI-backed namespace provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Directory under which all namespace state for the provider lives.
    pub root: PathBuf,
    /// CNI network configuration file.
    pub config_path: PathBuf,
    /// Directory containing CNI plugin binaries.
    pub binary_dir: PathBuf,
    /// Lock file serializing the construction-time self-test across processes.
    #[serde(default)]
    pub init_lock_path: Option<PathBuf>,
    /// Namespace variant handed out by the provider.
    #[serde(default)]
    pub isolation: Isolation,
}

impl ProviderConfig {
    /// Creates a configuration, picking up the init lock path from
    /// `SANDNET_CNI_INIT_LOCK_PATH` when set and non-empty.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        binary_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            config_path: config_path.into(),
            binary_dir: binary_dir.into(),
            init_lock_path: init_lock_from_env(),
            isolation: Isolation::platform_default(),
        }
    }

    /// Serializes the self-test through the given lock file.
    #[must_use]
    pub fn with_init_lock(mut self, path: impl Into<PathBuf>) -> Self {
        self.init_lock_path = Some(path.into());
        self
    }

    /// Disables the self-test lock regardless of the environment.
    #[must_use]
    pub fn without_init_lock(mut self) -> Self {
        self.init_lock_path = None;
        self
    }

    /// Selects the namespace variant.
    #[must_use]
    pub const fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Directory holding one entry per live namespace.
    #[must_use]
    pub fn registry_dir(&self) -> PathBuf {
        registry_dir(&self.root)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT, DEFAULT_CNI_CONFIG_PATH, DEFAULT_CNI_BINARY_DIR)
    }
}

/// Returns `<root>/net`.
#[must_use]
pub fn registry_dir(root: &Path) -> PathBuf {
    root.join(NETNS_REGISTRY_DIR)
}

fn init_lock_from_env() -> Option<PathBuf> {
    std::env::var_os(CNI_INIT_LOCK_PATH_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
