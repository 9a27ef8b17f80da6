//! Kernel network namespaces (Linux).
//!
//! A namespace is created by unsharing `CLONE_NEWNET` on a short-lived
//! thread and bind-mounting that thread's `ns/net` handle onto the registry
//! entry, which keeps the namespace alive after the thread exits. Requires
//! `CAP_SYS_ADMIN`.

use std::io;
use std::path::Path;

use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags, mount, umount2};
use nix::sched::{CloneFlags, unshare};
use nix::unistd::gettid;
use sandnet_common::types::{LinuxNamespace, NamespaceId, NamespaceType, ProcessSpec};

use super::{Registration, create_placeholder};
use crate::NetworkNamespace;
use crate::error::Result;

/// A network namespace bind-mounted at its registry entry.
#[derive(Debug)]
pub struct KernelNamespace {
    pub(crate) registration: Registration,
}

impl NetworkNamespace for KernelNamespace {
    fn apply(&self, spec: &mut ProcessSpec) {
        spec.set_namespace(LinuxNamespace {
            ns_type: NamespaceType::Network,
            path: Some(self.registration.path.clone()),
        });
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.registration.release(unmount_netns)
    }

    fn id(&self) -> Option<&NamespaceId> {
        Some(&self.registration.id)
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.registration.path)
    }
}

/// Creates a fresh network namespace pinned at `path`.
///
/// On failure the entry file may remain; callers remove it.
pub(crate) fn create_netns(path: &Path) -> io::Result<()> {
    create_placeholder(path)?;

    let target = path.to_path_buf();
    let pinner = std::thread::Builder::new()
        .name("netns-create".to_string())
        .spawn(move || -> nix::Result<()> {
            // Only this thread moves; it exits right after the mount.
            unshare(CloneFlags::CLONE_NEWNET)?;
            let source = format!("/proc/self/task/{}/ns/net", gettid());
            mount(
                Some(source.as_str()),
                target.as_path(),
                None::<&str>,
                MsFlags::MS_BIND,
                None::<&str>,
            )
        })?;

    pinner
        .join()
        .map_err(|_| io::Error::other("network namespace thread panicked"))?
        .map_err(io::Error::from)?;
    tracing::debug!(path = %path.display(), "network namespace created");
    Ok(())
}

/// Lazily unmounts the namespace at `path`. Unmounted or missing entries
/// are not errors.
pub(crate) fn unmount_netns(path: &Path) -> io::Result<()> {
    match umount2(path, MntFlags::MNT_DETACH) {
        Ok(()) | Err(Errno::EINVAL | Errno::ENOENT) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
