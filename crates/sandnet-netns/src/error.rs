//! Error types for namespace provisioning.
//!
//! Every variant carries enough context (stage, namespace ID, path) to tell
//! the failure points apart without inspecting the underlying cause.

use std::fmt;
use std::path::PathBuf;

use sandnet_cni::CniError;
use sandnet_common::types::NamespaceId;
use thiserror::Error;

/// Boxed cause of a setup or teardown failure.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Step of namespace creation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupStage {
    /// Creating the registry directory under the provider root.
    RegistryCreate,
    /// Creating the OS-level namespace object.
    NamespaceCreate,
    /// Attaching the plugin chain.
    PluginAttach,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RegistryCreate => "registry-create",
            Self::NamespaceCreate => "namespace-create",
            Self::PluginAttach => "plugin-attach",
        })
    }
}

/// Step of namespace teardown that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownStage {
    /// Detaching the plugin chain.
    PluginDetach,
    /// Unmounting the namespace object.
    NamespaceUnmount,
    /// Removing the registry entry.
    RegistryRemove,
}

impl fmt::Display for TeardownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PluginDetach => "plugin-detach",
            Self::NamespaceUnmount => "namespace-unmount",
            Self::RegistryRemove => "registry-remove",
        })
    }
}

/// Errors raised by network providers and the namespaces they issue.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// A required configuration path does not exist or cannot be read.
    #[error("failed to read cni {what} {path:?}: {source}")]
    Config {
        /// Which input was checked.
        what: &'static str,
        /// Checked path.
        path: PathBuf,
        /// Metadata lookup failure.
        source: std::io::Error,
    },

    /// The plugin runtime rejected its configuration.
    #[error("failed to initialize cni runtime: {0}")]
    Runtime(#[source] CniError),

    /// The requested isolation is not available on this platform.
    #[error("unsupported: {message}")]
    Unsupported {
        /// Description of the missing capability.
        message: String,
    },

    /// Creating a namespace failed.
    #[error("network namespace setup failed at {stage} (id {id}, path {path:?}): {source}")]
    Setup {
        /// Failed step.
        stage: SetupStage,
        /// Namespace identifier.
        id: NamespaceId,
        /// Namespace path.
        path: PathBuf,
        /// Underlying failure.
        source: Cause,
    },

    /// Releasing a namespace failed.
    #[error("network namespace teardown failed at {stage} (id {id}, path {path:?}): {source}")]
    Teardown {
        /// Failed step.
        stage: TeardownStage,
        /// Namespace identifier.
        id: NamespaceId,
        /// Namespace path.
        path: PathBuf,
        /// Underlying failure.
        source: Cause,
    },

    /// The construction-time self-test cycle failed.
    #[error("network provider self-test failed: {0}")]
    SelfTest(#[source] Box<NetworkError>),

    /// The cross-process init lock could not be taken.
    #[error("failed to lock {path:?}: {source}")]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Underlying failure.
        source: std::io::Error,
    },
}

impl NetworkError {
    /// Whether the error stems from configuration rather than runtime state.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Runtime(_) | Self::Unsupported { .. })
    }

    /// Setup stage, when this is a setup failure (also inside a self-test).
    #[must_use]
    pub fn setup_stage(&self) -> Option<SetupStage> {
        match self {
            Self::Setup { stage, .. } => Some(*stage),
            Self::SelfTest(inner) => inner.setup_stage(),
            _ => None,
        }
    }

    /// Teardown stage, when this is a teardown failure (also inside a self-test).
    #[must_use]
    pub fn teardown_stage(&self) -> Option<TeardownStage> {
        match self {
            Self::Teardown { stage, .. } => Some(*stage),
            Self::SelfTest(inner) => inner.teardown_stage(),
            _ => None,
        }
    }

    pub(crate) fn setup(
        stage: SetupStage,
        id: &NamespaceId,
        path: impl Into<PathBuf>,
        source: impl Into<Cause>,
    ) -> Self {
        Self::Setup {
            stage,
            id: id.clone(),
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn teardown(
        stage: TeardownStage,
        id: &NamespaceId,
        path: impl Into<PathBuf>,
        source: impl Into<Cause>,
    ) -> Self {
        Self::Teardown {
            stage,
            id: id.clone(),
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Convenience alias for provider results.
pub type Result<T> = std::result::Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names() {
        assert_eq!(SetupStage::NamespaceCreate.to_string(), "namespace-create");
        assert_eq!(SetupStage::PluginAttach.to_string(), "plugin-attach");
        assert_eq!(TeardownStage::RegistryRemove.to_string(), "registry-remove");
    }

    #[test]
    fn self_test_exposes_inner_stage() {
        let inner = NetworkError::setup(
            SetupStage::PluginAttach,
            &NamespaceId::new("abc"),
            "/tmp/bk/net/abc",
            std::io::Error::other("boom"),
        );
        let err = NetworkError::SelfTest(Box::new(inner));
        assert_eq!(err.setup_stage(), Some(SetupStage::PluginAttach));
        assert_eq!(err.teardown_stage(), None);
        assert!(!err.is_config());
        assert!(err.to_string().contains("self-test"));
    }

    #[test]
    fn setup_message_names_stage_id_and_path() {
        let err = NetworkError::setup(
            SetupStage::NamespaceCreate,
            &NamespaceId::new("abc"),
            "/tmp/bk/net/abc",
            std::io::Error::other("boom"),
        );
        let message = err.to_string();
        assert!(message.contains("namespace-create"));
        assert!(message.contains("abc"));
        assert!(message.contains("/tmp/bk/net/abc"));
    }
}
