//! Namespace variant without kernel isolation.
//!
//! Used where network namespaces cannot be joined (or when explicitly
//! configured). The plugin chain is attached and detached exactly as for
//! the kernel variant and the registry entry is created and removed, but
//! [`apply`](crate::NetworkNamespace::apply) leaves the process spec
//! untouched: **the sandboxed process shares the host network stack.**
//! Callers get configuration plumbing, not isolation.

use std::path::Path;

use sandnet_common::types::{NamespaceId, ProcessSpec};

use super::Registration;
use crate::NetworkNamespace;
use crate::error::Result;

/// Plugin bookkeeping around a placeholder registry entry.
#[derive(Debug)]
pub struct DegradedNamespace {
    pub(crate) registration: Registration,
}

impl NetworkNamespace for DegradedNamespace {
    fn apply(&self, _spec: &mut ProcessSpec) {
        tracing::debug!(
            id = %self.registration.id,
            "network isolation not enforced; process keeps the host network"
        );
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.registration.release(|_| Ok(()))
    }

    fn id(&self) -> Option<&NamespaceId> {
        Some(&self.registration.id)
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.registration.path)
    }
}
