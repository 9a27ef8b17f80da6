//! Typed view over CNI plugin results.

use serde::{Deserialize, Serialize};

/// Result printed by a plugin on a successful `ADD`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginResult {
    /// Spec version of the result.
    #[serde(default)]
    pub cni_version: String,
    /// Interfaces created or configured.
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    /// Assigned addresses.
    #[serde(default)]
    pub ips: Vec<IpConfig>,
    /// Installed routes.
    #[serde(default)]
    pub routes: Vec<Route>,
    /// DNS settings.
    #[serde(default)]
    pub dns: Dns,
}

/// An interface reported by a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Interface name.
    pub name: String,
    /// Hardware address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Namespace path, for interfaces inside the sandbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
}

/// An address assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpConfig {
    /// Address in CIDR notation.
    pub address: String,
    /// Default gateway for this address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    /// Index into [`PluginResult::interfaces`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<usize>,
}

/// A route installed in the namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination in CIDR notation.
    pub dst: String,
    /// Next hop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<String>,
}

/// DNS configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dns {
    /// Name servers.
    #[serde(default)]
    pub nameservers: Vec<String>,
    /// Local domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Search domains.
    #[serde(default)]
    pub search: Vec<String>,
    /// Resolver options.
    #[serde(default)]
    pub options: Vec<String>,
}

/// Outcome of attaching one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAttachment {
    /// Network name.
    pub network: String,
    /// Interface the network was bound to.
    pub ifname: String,
    /// Final result of the network's plugin chain.
    pub result: PluginResult,
}

/// Outcome of attaching every network to a namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    /// Per-network results, in attach order.
    pub networks: Vec<NetworkAttachment>,
}

impl Attachment {
    /// Returns the attachment bound to `ifname`.
    #[must_use]
    pub fn interface(&self, ifname: &str) -> Option<&NetworkAttachment> {
        self.networks.iter().find(|n| n.ifname == ifname)
    }

    /// All addresses assigned across networks.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.networks
            .iter()
            .flat_map(|n| n.result.ips.iter().map(|ip| ip.address.as_str()))
    }
}
