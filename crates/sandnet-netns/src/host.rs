//! Providers that need no plugin chain.
//!
//! [`HostProvider`] leaves the process on the host network; [`NoneProvider`]
//! gives it a fresh namespace with nothing but an unconfigured loopback.

use sandnet_common::types::{LinuxNamespace, NamespaceType, ProcessSpec};

use crate::error::Result;
use crate::{NetworkNamespace, NetworkProvider};

/// Runs processes in the host network namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProvider;

impl HostProvider {
    /// Creates the provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl NetworkProvider for HostProvider {
    fn new_namespace(&self) -> Result<Box<dyn NetworkNamespace>> {
        Ok(Box::new(HostNamespace))
    }
}

#[derive(Debug)]
struct HostNamespace;

impl NetworkNamespace for HostNamespace {
    fn apply(&self, spec: &mut ProcessSpec) {
        spec.remove_namespace(NamespaceType::Network);
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Runs processes in a private, unconnected network namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneProvider;

impl NoneProvider {
    /// Creates the provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl NetworkProvider for NoneProvider {
    fn new_namespace(&self) -> Result<Box<dyn NetworkNamespace>> {
        Ok(Box::new(NoneNamespace))
    }
}

#[derive(Debug)]
struct NoneNamespace;

impl NetworkNamespace for NoneNamespace {
    /// Requests a new namespace from the runtime (no path to join).
    fn apply(&self, spec: &mut ProcessSpec) {
        spec.set_namespace(LinuxNamespace {
            ns_type: NamespaceType::Network,
            path: None,
        });
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn spec_with_netns() -> ProcessSpec {
        let mut spec = ProcessSpec::new(vec!["/bin/true".to_string()]);
        spec.set_namespace(LinuxNamespace {
            ns_type: NamespaceType::Network,
            path: Some(PathBuf::from("/var/run/netns/x")),
        });
        spec.set_namespace(LinuxNamespace {
            ns_type: NamespaceType::Mount,
            path: None,
        });
        spec
    }

    #[test]
    fn host_removes_network_namespace() {
        let ns = HostProvider::new().new_namespace().unwrap();
        let mut spec = spec_with_netns();
        ns.apply(&mut spec);
        assert!(spec.namespace(NamespaceType::Network).is_none());
        assert!(spec.namespace(NamespaceType::Mount).is_some());
        assert!(ns.id().is_none());
        ns.close().unwrap();
    }

    #[test]
    fn none_requests_fresh_namespace() {
        let ns = NoneProvider::new().new_namespace().unwrap();
        let mut spec = spec_with_netns();
        ns.apply(&mut spec);
        let netns = spec.namespace(NamespaceType::Network).unwrap();
        assert!(netns.path.is_none());
        assert!(ns.path().is_none());
        ns.close().unwrap();
    }
}
