//! CNI-backed network provider.

use std::fmt;
use std::io;
#[cfg(unix)]
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sandnet_cni::{CniRuntime, PluginRuntime};
use sandnet_common::config::{ProviderConfig, registry_dir};
use sandnet_common::constants::{DEFAULT_INTERFACE_PREFIX, MIN_NETWORK_COUNT};
use sandnet_common::types::NamespaceId;

use crate::error::{NetworkError, Result, SetupStage};
use crate::lock::InitLock;
use crate::namespace::{Registration, Variant};
use crate::{NetworkNamespace, NetworkProvider};

/// Issues network namespaces attached to a CNI plugin chain.
///
/// Holds no per-call state after construction: [`Provider::new_namespace`]
/// may be called concurrently from any number of threads. Every issued
/// namespace shares the provider's plugin runtime.
pub struct Provider {
    root: PathBuf,
    registry: PathBuf,
    runtime: Arc<dyn PluginRuntime>,
    variant: Variant,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("root", &self.root)
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Builds a provider around a [`CniRuntime`] loaded from `config`.
    ///
    /// The runtime requires the loopback network plus the configured one,
    /// and names configured interfaces `eth0`, `eth1`, ...
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Config`] if the config file or plugin
    /// directory is missing, [`NetworkError::Runtime`] if the config cannot
    /// be loaded, and [`NetworkError::SelfTest`] if the self-test cycle fails.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        validate_paths(config)?;
        let runtime = CniRuntime::builder()
            .min_network_count(MIN_NETWORK_COUNT)
            .conf_file(&config.config_path)
            .plugin_dir(&config.binary_dir)
            .loopback(true)
            .interface_prefix(DEFAULT_INTERFACE_PREFIX)
            .build()
            .map_err(NetworkError::Runtime)?;
        Self::start(config, Arc::new(runtime))
    }

    /// Builds a provider around an existing plugin runtime.
    ///
    /// Paths are validated before the runtime is touched.
    ///
    /// # Errors
    ///
    /// Same as [`Provider::new`], minus runtime loading.
    pub fn with_runtime(config: &ProviderConfig, runtime: Arc<dyn PluginRuntime>) -> Result<Self> {
        validate_paths(config)?;
        Self::start(config, runtime)
    }

    fn start(config: &ProviderConfig, runtime: Arc<dyn PluginRuntime>) -> Result<Self> {
        let provider = Self {
            root: config.root.clone(),
            registry: registry_dir(&config.root),
            runtime,
            variant: Variant::resolve(config.isolation)?,
        };
        tracing::info!(
            root = %provider.root.display(),
            isolation = ?config.isolation,
            "initializing network provider"
        );
        provider.self_test(config.init_lock_path.as_deref())?;
        tracing::info!(root = %provider.root.display(), "network provider ready");
        Ok(provider)
    }

    /// Runs one create/destroy cycle, under the init lock when configured.
    fn self_test(&self, lock_path: Option<&Path>) -> Result<()> {
        let _lock = lock_path.map(InitLock::acquire).transpose()?;
        tracing::debug!("running network provider self-test");
        let namespace = self
            .create()
            .map_err(|e| NetworkError::SelfTest(Box::new(e)))?;
        namespace
            .close()
            .map_err(|e| NetworkError::SelfTest(Box::new(e)))
    }

    /// Root directory of this provider.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registry directory holding one entry per live namespace.
    #[must_use]
    pub fn registry(&self) -> &Path {
        &self.registry
    }

    fn create(&self) -> Result<Box<dyn NetworkNamespace>> {
        let id = NamespaceId::generate();
        let path = self.registry.join(id.as_str());

        create_registry(&self.registry)
            .map_err(|e| NetworkError::setup(SetupStage::RegistryCreate, &id, &path, e))?;

        if let Err(e) = self.variant.create_object(&path) {
            self.discard(&id, &path);
            return Err(NetworkError::setup(SetupStage::NamespaceCreate, &id, &path, e));
        }

        match self.runtime.attach(&id, &path) {
            Ok(attachment) => {
                tracing::info!(
                    id = %id,
                    path = %path.display(),
                    addresses = ?attachment.addresses().collect::<Vec<_>>(),
                    "network namespace ready"
                );
            }
            Err(e) => {
                self.discard(&id, &path);
                return Err(NetworkError::setup(SetupStage::PluginAttach, &id, &path, e));
            }
        }

        Ok(self.variant.handle(Registration {
            id,
            path,
            runtime: Arc::clone(&self.runtime),
        }))
    }

    /// Best-effort removal of a half-created namespace.
    fn discard(&self, id: &NamespaceId, path: &Path) {
        if let Err(e) = self.variant.destroy_object(path) {
            tracing::warn!(
                id = %id,
                path = %path.display(),
                error = %e,
                "failed to clean up network namespace after setup error"
            );
        }
    }
}

impl NetworkProvider for Provider {
    fn new_namespace(&self) -> Result<Box<dyn NetworkNamespace>> {
        self.create()
    }
}

/// Creates the registry directory (and missing parents) owner-only.
fn create_registry(path: &Path) -> io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    let _ = builder.recursive(true);
    #[cfg(unix)]
    let _ = builder.mode(0o700);
    builder.create(path)
}

fn validate_paths(config: &ProviderConfig) -> Result<()> {
    for (what, path) in [
        ("config", &config.config_path),
        ("binary dir", &config.binary_dir),
    ] {
        std::fs::metadata(path).map_err(|source| NetworkError::Config {
            what,
            path: path.clone(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use sandnet_cni::{Attachment, CniError};
    use sandnet_common::config::Isolation;

    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_attach: bool,
    }

    impl PluginRuntime for Recorder {
        fn attach(&self, id: &NamespaceId, netns: &Path) -> sandnet_cni::Result<Attachment> {
            assert!(netns.exists(), "namespace object must exist before attach");
            self.calls.lock().unwrap().push(format!("attach {id}"));
            if self.fail_attach {
                return Err(CniError::PluginFailed {
                    plugin: "bridge".into(),
                    code: 11,
                    msg: "no addresses".into(),
                    details: String::new(),
                });
            }
            Ok(Attachment::default())
        }

        fn detach(&self, id: &NamespaceId, _netns: &Path) -> sandnet_cni::Result<()> {
            self.calls.lock().unwrap().push(format!("detach {id}"));
            Ok(())
        }
    }

    fn config(dir: &Path) -> ProviderConfig {
        let conf = dir.join("cni.json");
        let bin = dir.join("bin");
        std::fs::write(&conf, "{}").unwrap();
        std::fs::create_dir_all(&bin).unwrap();
        ProviderConfig::new(dir.join("root"), conf, bin)
            .without_init_lock()
            .with_isolation(Isolation::Degraded)
    }

    #[test]
    fn construction_runs_one_self_test_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(Recorder::default());
        let provider = Provider::with_runtime(&config(dir.path()), runtime.clone()).unwrap();

        let calls = runtime.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("attach "));
        assert_eq!(calls[0]["attach ".len()..], calls[1]["detach ".len()..]);
        assert_eq!(std::fs::read_dir(provider.registry()).unwrap().count(), 0);
    }

    #[test]
    fn self_test_failure_is_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(Recorder {
            fail_attach: true,
            ..Recorder::default()
        });
        let err = Provider::with_runtime(&config(dir.path()), runtime).unwrap_err();
        assert!(matches!(err, NetworkError::SelfTest(_)));
        assert_eq!(err.setup_stage(), Some(SetupStage::PluginAttach));
    }

    #[test]
    fn namespaces_live_under_registry() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(Recorder::default());
        let provider = Provider::with_runtime(&config(dir.path()), runtime).unwrap();

        let ns = provider.new_namespace().unwrap();
        let id = ns.id().unwrap().clone();
        let path = ns.path().unwrap().to_path_buf();
        assert_eq!(provider.root(), dir.path().join("root"));
        assert_eq!(path, provider.root().join("net").join(id.as_str()));
        assert!(path.exists());

        ns.close().unwrap();
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn registry_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let provider =
            Provider::with_runtime(&config(dir.path()), Arc::new(Recorder::default())).unwrap();

        let mode = std::fs::metadata(provider.registry())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn debug_omits_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let provider =
            Provider::with_runtime(&config(dir.path()), Arc::new(Recorder::default())).unwrap();
        let rendered = format!("{provider:?}");
        assert!(rendered.contains("Provider"));
        assert!(rendered.contains("Degraded"));
    }
}
