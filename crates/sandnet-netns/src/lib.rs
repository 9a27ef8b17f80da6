//! # sandnet-netns
//!
//! Network namespace provisioning for sandboxed build steps.
//!
//! A [`Provider`] validates its configuration, runs one create/destroy
//! self-test cycle to surface first-use failures at startup, and then issues
//! namespaces on demand. Each namespace is attached to a CNI plugin chain
//! through a shared [`sandnet_cni::PluginRuntime`] and torn down by
//! [`NetworkNamespace::close`].
//!
//! Two namespace variants exist:
//! - **Kernel** (Linux): a real network namespace bind-mounted at
//!   `<root>/net/<id>` and joined by the sandboxed process.
//! - **Degraded**: plugin attach/detach bookkeeping around a placeholder
//!   entry. The sandboxed process keeps the host network stack.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod error;
pub mod host;
pub mod lock;
pub mod namespace;
pub mod provider;

use std::fmt::Debug;
use std::path::Path;

use sandnet_common::types::{NamespaceId, ProcessSpec};

pub use error::{NetworkError, Result, SetupStage, TeardownStage};
pub use host::{HostProvider, NoneProvider};
pub use lock::InitLock;
pub use provider::Provider;

/// A provisioned network environment for one sandboxed process.
///
/// `close` consumes the namespace, so a handle is released exactly once.
pub trait NetworkNamespace: Send + Sync + Debug {
    /// Points `spec` at this namespace.
    fn apply(&self, spec: &mut ProcessSpec);

    /// Releases the namespace.
    ///
    /// # Errors
    ///
    /// Returns the first teardown failure. Later steps still run.
    fn close(self: Box<Self>) -> Result<()>;

    /// Identifier handed to the plugin runtime, if any.
    fn id(&self) -> Option<&NamespaceId> {
        None
    }

    /// On-disk location of the namespace, if any.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// Factory of network namespaces.
pub trait NetworkProvider: Send + Sync {
    /// Provisions a new namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be created or configured.
    fn new_namespace(&self) -> Result<Box<dyn NetworkNamespace>>;
}
