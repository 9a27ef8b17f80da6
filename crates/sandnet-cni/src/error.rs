//! Error types for the CNI plugin runtime.

use sandnet_common::error::SandnetError;
use thiserror::Error;

use crate::invoke::Command;

/// Errors raised while loading networks or running plugins.
#[derive(Debug, Error)]
pub enum CniError {
    /// Network configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] SandnetError),

    /// Fewer networks are loaded than the runtime requires.
    #[error("cni plugin not initialized: {found} networks loaded, {required} required")]
    NotInitialized {
        /// Minimum network count.
        required: usize,
        /// Networks actually loaded.
        found: usize,
    },

    /// The plugin binary is missing from every plugin directory.
    #[error("failed to find plugin {plugin:?} in path {dirs}")]
    PluginNotFound {
        /// Plugin type.
        plugin: String,
        /// Searched directories.
        dirs: String,
        /// Lookup failure.
        source: which::Error,
    },

    /// The plugin process could not be run.
    #[error("failed to execute plugin {plugin}: {source}")]
    Exec {
        /// Plugin type.
        plugin: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The plugin ran and reported a failure.
    #[error("plugin {plugin} failed with code {code}: {msg}")]
    PluginFailed {
        /// Plugin type.
        plugin: String,
        /// CNI error code.
        code: u32,
        /// Short error message.
        msg: String,
        /// Extended details, possibly empty.
        details: String,
    },

    /// The plugin printed something that is not a CNI result.
    #[error("invalid result from plugin {plugin}: {source}")]
    InvalidResult {
        /// Plugin type.
        plugin: String,
        /// Parse failure.
        source: serde_json::Error,
    },

    /// A network-level operation failed.
    #[error("{command} of network {network} ({ifname}) failed: {source}")]
    Network {
        /// Operation that failed.
        command: Command,
        /// Network name.
        network: String,
        /// Interface the network is bound to.
        ifname: String,
        /// Plugin-level failure.
        source: Box<CniError>,
    },
}

/// Convenience alias for CNI runtime results.
pub type Result<T> = std::result::Result<T, CniError>;
