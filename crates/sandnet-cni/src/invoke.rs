//! CNI plugin exec protocol.
//!
//! A plugin is an executable located in one of the plugin directories. It
//! receives its parameters through `CNI_*` environment variables and its
//! network configuration on stdin, and prints a result (or an error
//! object) on stdout.

use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use sandnet_common::error::SandnetError;
use serde::Deserialize;

use crate::error::{CniError, Result};

/// Spawn attempts made while the plugin binary is still open for writing.
const TEXT_BUSY_RETRIES: u32 = 5;

/// Base delay between "text file busy" retries.
const TEXT_BUSY_BACKOFF: Duration = Duration::from_millis(25);

/// CNI operation passed in `CNI_COMMAND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Attach the container to the network.
    Add,
    /// Release the container from the network.
    Del,
}

impl Command {
    /// Protocol spelling of the command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Del => "DEL",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for one plugin invocation.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// Operation to perform.
    pub command: Command,
    /// Container identifier.
    pub container_id: &'a str,
    /// Path of the network namespace.
    pub netns: &'a Path,
    /// Interface name inside the namespace.
    pub ifname: &'a str,
    /// Directories searched for plugin binaries.
    pub plugin_dirs: &'a [PathBuf],
}

#[derive(Debug, Deserialize)]
struct PluginErrorBody {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    details: String,
}

/// Locates `plugin` in the plugin directories.
///
/// # Errors
///
/// Returns [`CniError::PluginNotFound`] if no directory holds an
/// executable of that name.
pub fn find_plugin(plugin: &str, plugin_dirs: &[PathBuf]) -> Result<PathBuf> {
    let search_path = join_dirs(plugin_dirs)?;
    let cwd = plugin_dirs
        .first()
        .map_or_else(|| PathBuf::from("/"), Clone::clone);
    which::which_in(plugin, Some(&search_path), cwd).map_err(|source| CniError::PluginNotFound {
        plugin: plugin.to_string(),
        dirs: search_path.to_string_lossy().into_owned(),
        source,
    })
}

/// Runs one plugin and returns its stdout.
///
/// # Errors
///
/// Returns an error if the plugin cannot be found or spawned, or if it
/// exits unsuccessfully.
pub fn exec_plugin(plugin: &str, invocation: &Invocation<'_>, stdin: &[u8]) -> Result<Vec<u8>> {
    let binary = find_plugin(plugin, invocation.plugin_dirs)?;
    let cni_path = join_dirs(invocation.plugin_dirs)?;

    tracing::debug!(
        plugin,
        command = %invocation.command,
        container_id = invocation.container_id,
        ifname = invocation.ifname,
        "invoking cni plugin"
    );

    let exec_error = |source: std::io::Error| CniError::Exec {
        plugin: plugin.to_string(),
        source,
    };

    let mut attempt = 0;
    let mut child = loop {
        let spawned = std::process::Command::new(&binary)
            .env("CNI_COMMAND", invocation.command.as_str())
            .env("CNI_CONTAINERID", invocation.container_id)
            .env("CNI_NETNS", invocation.netns)
            .env("CNI_IFNAME", invocation.ifname)
            .env("CNI_PATH", &cni_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        match spawned {
            Ok(child) => break child,
            Err(e) if e.raw_os_error() == Some(libc::ETXTBSY) && attempt < TEXT_BUSY_RETRIES => {
                attempt += 1;
                tracing::debug!(plugin, attempt, "plugin binary busy, retrying");
                std::thread::sleep(TEXT_BUSY_BACKOFF * attempt);
            }
            Err(e) => return Err(exec_error(e)),
        }
    };

    if let Some(mut pipe) = child.stdin.take() {
        match pipe.write_all(stdin) {
            Ok(()) => {}
            // The plugin may exit without reading its config.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Err(e) => return Err(exec_error(e)),
        }
    }

    let output = child.wait_with_output().map_err(exec_error)?;
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(plugin_failure(plugin, &output))
    }
}

fn plugin_failure(plugin: &str, output: &Output) -> CniError {
    if let Ok(body) = serde_json::from_slice::<PluginErrorBody>(&output.stdout) {
        return CniError::PluginFailed {
            plugin: plugin.to_string(),
            code: body.code,
            msg: body.msg,
            details: body.details,
        };
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let msg = if stderr.is_empty() {
        format!("plugin exited with {}", output.status)
    } else {
        stderr
    };
    CniError::PluginFailed {
        plugin: plugin.to_string(),
        code: output
            .status
            .code()
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or_default(),
        msg,
        details: String::new(),
    }
}

fn join_dirs(dirs: &[PathBuf]) -> Result<OsString> {
    std::env::join_paths(dirs).map_err(|e| {
        CniError::Config(SandnetError::Config {
            message: format!("invalid plugin directory list: {e}"),
        })
    })
}
