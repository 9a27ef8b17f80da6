//! System-wide constants and default paths.

/// Default root under which provider state lives.
pub const DEFAULT_ROOT: &str = "/var/lib/sandnet";

/// Default CNI network configuration file.
pub const DEFAULT_CNI_CONFIG_PATH: &str = "/etc/sandnet/cni.json";

/// Default directory holding CNI plugin binaries.
pub const DEFAULT_CNI_BINARY_DIR: &str = "/opt/cni/bin";

/// Environment variable naming the host-wide lock file that serializes
/// the provider's first namespace cycle across processes.
pub const CNI_INIT_LOCK_PATH_ENV: &str = "SANDNET_CNI_INIT_LOCK_PATH";

/// Registry subdirectory (under the provider root) holding namespace entries.
pub const NETNS_REGISTRY_DIR: &str = "net";

/// Interface name prefix for configured networks (`eth0`, `eth1`, ...).
pub const DEFAULT_INTERFACE_PREFIX: &str = "eth";

/// Interface name used by the loopback network.
pub const LOOPBACK_INTERFACE: &str = "lo";

/// Minimum number of loaded networks (loopback plus one configured network).
pub const MIN_NETWORK_COUNT: usize = 2;

/// Length of a generated namespace identifier.
pub const NAMESPACE_ID_LENGTH: usize = 25;
