//! Namespace handles issued by the CNI provider.
//!
//! Both variants share the same registry entry (`<root>/net/<id>`) and the
//! same teardown protocol; they differ in the OS-level object behind the
//! entry and in what `apply` does to the process spec.

pub mod degraded;
#[cfg(target_os = "linux")]
pub mod kernel;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sandnet_cni::PluginRuntime;
use sandnet_common::config::Isolation;
use sandnet_common::types::NamespaceId;

pub use degraded::DegradedNamespace;
#[cfg(target_os = "linux")]
pub use kernel::KernelNamespace;

use crate::NetworkNamespace;
use crate::error::{NetworkError, Result, TeardownStage};

/// Namespace variant resolved from the configured isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Variant {
    #[cfg(target_os = "linux")]
    Kernel,
    Degraded,
}

impl Variant {
    pub(crate) fn resolve(isolation: Isolation) -> Result<Self> {
        match isolation {
            #[cfg(target_os = "linux")]
            Isolation::Full => Ok(Self::Kernel),
            #[cfg(not(target_os = "linux"))]
            Isolation::Full => Err(NetworkError::Unsupported {
                message: "kernel network namespaces require Linux".to_string(),
            }),
            Isolation::Degraded => Ok(Self::Degraded),
        }
    }

    /// Creates the OS-level object at `path`.
    pub(crate) fn create_object(self, path: &Path) -> io::Result<()> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Kernel => kernel::create_netns(path),
            Self::Degraded => create_placeholder(path),
        }
    }

    /// Undoes [`Self::create_object`]. The entry is removed even when the
    /// unmount fails; the first error is returned.
    pub(crate) fn destroy_object(self, path: &Path) -> io::Result<()> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Kernel => {
                let unmounted = kernel::unmount_netns(path);
                let removed = remove_entry(path);
                unmounted.and(removed)
            }
            Self::Degraded => remove_entry(path),
        }
    }

    pub(crate) fn handle(self, registration: Registration) -> Box<dyn NetworkNamespace> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Kernel => Box::new(KernelNamespace { registration }),
            Self::Degraded => Box::new(DegradedNamespace { registration }),
        }
    }
}

/// A namespace attached to the plugin runtime.
#[derive(Debug)]
pub(crate) struct Registration {
    pub(crate) id: NamespaceId,
    pub(crate) path: PathBuf,
    pub(crate) runtime: Arc<dyn PluginRuntime>,
}

impl Registration {
    /// Detaches the plugin chain, then unconditionally unmounts and removes
    /// the entry. The first failure is returned.
    pub(crate) fn release(self, unmount: impl FnOnce(&Path) -> io::Result<()>) -> Result<()> {
        tracing::debug!(id = %self.id, path = %self.path.display(), "releasing network namespace");

        let mut first_err = self.runtime.detach(&self.id, &self.path).err().map(|e| {
            NetworkError::teardown(TeardownStage::PluginDetach, &self.id, &self.path, e)
        });

        let steps = [
            (TeardownStage::NamespaceUnmount, unmount(&self.path)),
            (TeardownStage::RegistryRemove, remove_entry(&self.path)),
        ];
        for (stage, outcome) in steps {
            let Err(e) = outcome else { continue };
            if first_err.is_none() {
                first_err = Some(NetworkError::teardown(stage, &self.id, &self.path, e));
            } else {
                tracing::warn!(
                    id = %self.id,
                    stage = %stage,
                    error = %e,
                    "network namespace cleanup failed after earlier error"
                );
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => {
                tracing::info!(id = %self.id, "network namespace released");
                Ok(())
            }
        }
    }
}

/// Creates an empty file standing in for the namespace object.
pub(crate) fn create_placeholder(path: &Path) -> io::Result<()> {
    std::fs::File::create_new(path).map(drop)
}

/// Removes a registry entry. An entry that is already gone is not an error.
///
/// # Errors
///
/// Returns any failure other than "not found".
pub fn remove_entry(path: &Path) -> io::Result<()> {
    let removed = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    };
    match removed {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
