//! Domain primitive types used across the sandnet workspace.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::NAMESPACE_ID_LENGTH;

const BASE36_ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque unique identifier for a provisioned network namespace.
///
/// The same value names the registry entry on disk and is handed to the
/// plugin runtime as the container ID, so it only ever contains
/// lowercase ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespaceId(String);

impl NamespaceId {
    /// Creates a namespace ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random namespace ID.
    ///
    /// The 128 random bits of a v4 UUID are rendered as fixed-width
    /// base-36, yielding [`NAMESPACE_ID_LENGTH`] characters.
    #[must_use]
    pub fn generate() -> Self {
        let mut value = uuid::Uuid::new_v4().as_u128();
        let mut buf = [b'0'; NAMESPACE_ID_LENGTH];
        for slot in buf.iter_mut().rev() {
            // Remainder is always < 36.
            #[allow(clippy::cast_possible_truncation)]
            let digit = (value % 36) as usize;
            *slot = BASE36_ALPHABET[digit];
            value /= 36;
        }
        Self(buf.iter().map(|&b| char::from(b)).collect())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NamespaceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of Linux namespace referenced from a process specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceType {
    /// PID namespace.
    Pid,
    /// Network namespace.
    Network,
    /// Mount namespace.
    Mount,
    /// IPC namespace.
    Ipc,
    /// UTS (hostname) namespace.
    Uts,
    /// User namespace.
    User,
    /// Cgroup namespace.
    Cgroup,
}

impl fmt::Display for NamespaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pid => "pid",
            Self::Network => "network",
            Self::Mount => "mount",
            Self::Ipc => "ipc",
            Self::Uts => "uts",
            Self::User => "user",
            Self::Cgroup => "cgroup",
        };
        f.write_str(name)
    }
}

/// A namespace the sandboxed process is placed into.
///
/// `path: None` requests a fresh namespace; `Some` joins an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxNamespace {
    /// Namespace kind.
    #[serde(rename = "type")]
    pub ns_type: NamespaceType,
    /// Path of an existing namespace to join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Linux-specific portion of a process specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxSpec {
    /// Namespaces the process is created in.
    #[serde(default)]
    pub namespaces: Vec<LinuxNamespace>,
}

/// Specification used by the build executor to launch a sandboxed command.
///
/// A subset of the OCI runtime spec: only the fields namespace plumbing
/// touches are modeled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Command and arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment in `KEY=value` form.
    #[serde(default)]
    pub env: Vec<String>,
    /// Working directory inside the sandbox.
    #[serde(default)]
    pub cwd: String,
    /// Linux-specific settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<LinuxSpec>,
}

impl ProcessSpec {
    /// Creates a spec running `args` from `/`.
    #[must_use]
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            cwd: "/".to_string(),
            ..Self::default()
        }
    }

    /// Sets a namespace, replacing any existing entry of the same type.
    pub fn set_namespace(&mut self, namespace: LinuxNamespace) {
        let linux = self.linux.get_or_insert_with(LinuxSpec::default);
        if let Some(existing) = linux
            .namespaces
            .iter_mut()
            .find(|ns| ns.ns_type == namespace.ns_type)
        {
            *existing = namespace;
        } else {
            linux.namespaces.push(namespace);
        }
    }

    /// Removes every namespace entry of the given type.
    pub fn remove_namespace(&mut self, ns_type: NamespaceType) {
        if let Some(linux) = self.linux.as_mut() {
            linux.namespaces.retain(|ns| ns.ns_type != ns_type);
        }
    }

    /// Returns the namespace entry of the given type, if any.
    #[must_use]
    pub fn namespace(&self, ns_type: NamespaceType) -> Option<&LinuxNamespace> {
        self.linux
            .as_ref()
            .and_then(|linux| linux.namespaces.iter().find(|ns| ns.ns_type == ns_type))
    }
}
