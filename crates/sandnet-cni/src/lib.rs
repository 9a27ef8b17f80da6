//! # sandnet-cni
//!
//! Plugin runtime adapter for the sandnet namespace provider.
//!
//! Wraps a chain of CNI plugins behind two operations, [`PluginRuntime::attach`]
//! and [`PluginRuntime::detach`]:
//! - **Config**: network configuration files (single network or network list).
//! - **Invoke**: the CNI exec protocol (environment, stdin config, stdout result).
//! - **Result**: typed view over plugin results.
//! - **Runtime**: [`CniRuntime`], the ordered set of networks attached per namespace.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod error;
pub mod invoke;
pub mod result;
pub mod runtime;

use std::fmt::Debug;
use std::path::Path;

use sandnet_common::types::NamespaceId;

pub use error::{CniError, Result};
pub use result::{Attachment, NetworkAttachment, PluginResult};
pub use runtime::{CniRuntime, CniRuntimeBuilder};

/// Network-configuration pipeline wired into a namespace.
///
/// One runtime is shared by a provider and every namespace it issues, so
/// implementors must tolerate concurrent calls for distinct IDs.
pub trait PluginRuntime: Send + Sync + Debug {
    /// Configures networking inside the namespace at `netns`.
    ///
    /// # Errors
    ///
    /// Returns an error if any network fails to attach. Networks attached
    /// before the failure are released again.
    fn attach(&self, id: &NamespaceId, netns: &Path) -> Result<Attachment>;

    /// Releases networking previously attached for `id`.
    ///
    /// # Errors
    ///
    /// Returns the first failure after attempting every network.
    fn detach(&self, id: &NamespaceId, netns: &Path) -> Result<()>;
}
