//! Storage factory
//!
//! Turns a source or destination specification into a constructed store:
//!
//! - `[NAME://][ACCESS_KEY:SECRET_KEY@]BUCKET[.ENDPOINT][/PREFIX]`
//! - `[USER[:PASSWORD]@]HOST[:PORT][/PATH]` for remote-shell endpoints
//! - a bare local path, optionally ending with `/`
//!
//! Parsing and backend lookup failures are fatal configuration errors and
//! happen before any backend is touched. Backend construction failures are
//! returned for the caller to report.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use sync_core::{Error, Result, StorageEndpoint, SyncConfig};
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::ObjectStorage;
use crate::credentials::{CredentialProvider, TerminalPrompt};
use crate::https::apply_scheme;
use crate::prefix::with_prefix;
use crate::registry::{LocalDiskBuilder, StorageBuilder, StorageRegistry};

/// Backend name used for remote-shell endpoints
pub const REMOTE_SHELL_BACKEND: &str = "sftp";

/// A constructed store and how it was reached
pub struct CreatedStorage {
    /// The store, prefix-wrapped when the specification carried a path
    pub store: Arc<dyn ObjectStorage>,

    /// The parsed endpoint handed to the backend builder
    pub endpoint: StorageEndpoint,

    /// Non-fatal adjustments made while creating the store
    pub warnings: Vec<String>,
}

/// Builds stores from specification strings
pub struct StorageFactory {
    config: SyncConfig,
    registry: Arc<StorageRegistry>,
    credentials: Box<dyn CredentialProvider>,
    private_key_path: Option<String>,
}

impl StorageFactory {
    /// Create a factory with every compiled-in backend and terminal prompting
    ///
    /// The private-key variable named by the configuration is read once here.
    pub fn new(config: SyncConfig) -> Self {
        let private_key_path = std::env::var(&config.private_key_env)
            .ok()
            .filter(|path| !path.is_empty());

        let registry = StorageRegistry::with_defaults();
        registry.register(
            "file",
            LocalDiskBuilder::with_buffer_size(config.listing.buffer_size),
        );

        Self {
            config,
            registry: Arc::new(registry),
            credentials: Box::new(TerminalPrompt),
            private_key_path,
        }
    }

    pub fn with_registry(mut self, registry: Arc<StorageRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_credentials(mut self, credentials: impl CredentialProvider + 'static) -> Self {
        self.credentials = Box::new(credentials);
        self
    }

    /// Override the private key path; `Some` suppresses password prompts
    pub fn with_private_key_path(mut self, path: Option<String>) -> Self {
        self.private_key_path = path;
        self
    }

    /// Current configuration, including any downgrades applied so far
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &StorageRegistry {
        &self.registry
    }

    /// Parse a specification into an endpoint without constructing anything
    pub fn parse(&self, spec: &str) -> Result<StorageEndpoint> {
        if !spec.contains("://") {
            if spec.contains(':') {
                return self.parse_remote_shell(spec);
            }
            return parse_local(spec);
        }
        self.parse_uri(spec)
    }

    fn parse_remote_shell(&self, spec: &str) -> Result<StorageEndpoint> {
        let (user_segment, address) = match spec.rsplit_once('@') {
            Some((user, address)) => (user, address),
            None => ("", spec),
        };
        let (user, password) = match user_segment.split_once(':') {
            Some((user, password)) => (user, Some(password.to_string())),
            None => (user_segment, None),
        };
        let (host, path) = match address.find('/') {
            Some(idx) => (&address[..idx], &address[idx..]),
            None => (address, ""),
        };

        let password = match password {
            Some(password) => password,
            None if self.private_key_path.is_some() => String::new(),
            None => self.credentials.password(user, host)?,
        };

        Ok(StorageEndpoint {
            backend: REMOTE_SHELL_BACKEND.to_string(),
            endpoint: address.to_string(),
            host: host.to_string(),
            path: path.to_string(),
            access_key: user.to_string(),
            secret_key: password,
        })
    }

    fn parse_uri(&self, spec: &str) -> Result<StorageEndpoint> {
        let url = Url::parse(spec).map_err(|e| Error::InvalidConfig {
            message: format!("Can't parse {}: {}", spec, e),
        })?;

        let name = url.scheme().to_lowercase();
        let access_key = decode(url.username())?;
        let secret_key = url.password().map(decode).transpose()?.unwrap_or_default();
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };
        let path = decode(url.path())?;

        let endpoint = match name.as_str() {
            "file" => path.clone(),
            "hdfs" => host.clone(),
            _ => apply_scheme(&name, &host, self.config.no_https),
        };

        Ok(StorageEndpoint {
            backend: name,
            endpoint,
            host,
            path,
            access_key,
            secret_key,
        })
    }

    /// Create the store described by `spec`
    pub async fn create(&mut self, spec: &str) -> Result<CreatedStorage> {
        let endpoint = self.parse(spec)?;
        let builder = self.registry.get(&endpoint.backend)?;
        self.build(endpoint, builder).await
    }

    /// Create a source and destination pair
    ///
    /// Both specifications must end with `/` or neither may. Everything
    /// that can be rejected as configuration is checked before either
    /// backend is constructed.
    pub async fn create_pair(
        &mut self,
        src: &str,
        dst: &str,
    ) -> Result<(CreatedStorage, CreatedStorage)> {
        if src.ends_with('/') != dst.ends_with('/') {
            return Err(Error::InvalidConfig {
                message: "SRC and DST should both end with '/' or not".to_string(),
            });
        }

        let src_endpoint = self.parse(src)?;
        let dst_endpoint = self.parse(dst)?;
        let src_builder = self.registry.get(&src_endpoint.backend)?;
        let dst_builder = self.registry.get(&dst_endpoint.backend)?;

        let src = self.build(src_endpoint, src_builder).await?;
        let dst = self.build(dst_endpoint, dst_builder).await?;
        Ok((src, dst))
    }

    async fn build(
        &mut self,
        endpoint: StorageEndpoint,
        builder: Arc<dyn StorageBuilder>,
    ) -> Result<CreatedStorage> {
        debug!(backend = %endpoint.backend, endpoint = %endpoint.endpoint, "Creating storage");

        let store = builder.build(&endpoint).await.map_err(|e| match e {
            Error::Credential { .. } | Error::Create { .. } => e,
            other => Error::Create {
                backend: endpoint.backend.clone(),
                endpoint: endpoint.endpoint.clone(),
                message: other.to_string(),
            },
        })?;

        let mut warnings = Vec::new();
        if self.config.perms && store.as_file_system().is_none() {
            let message = format!("{} is not a file system, can not preserve permissions", store);
            warn!("{}", message);
            warnings.push(message);
            self.config.perms = false;
        }

        let store = match endpoint.key_prefix() {
            Some(prefix) => with_prefix(store, prefix),
            None => store,
        };

        info!(backend = %endpoint.backend, %store, "Storage ready");
        Ok(CreatedStorage {
            store,
            endpoint,
            warnings,
        })
    }
}

fn decode(raw: &str) -> Result<String> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| Error::InvalidConfig {
            message: format!("invalid escape in {}: {}", raw, e),
        })
}

fn parse_local(spec: &str) -> Result<StorageEndpoint> {
    let mut root = absolute(Path::new(spec))?;
    if spec.ends_with('/') && !root.ends_with('/') {
        root.push('/');
    }

    Ok(StorageEndpoint {
        backend: "file".to_string(),
        endpoint: root.clone(),
        host: String::new(),
        path: root,
        access_key: String::new(),
        secret_key: String::new(),
    })
}

/// Make `path` absolute and drop `.` and `..` components lexically
fn absolute(path: &Path) -> Result<String> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| Error::InvalidConfig {
                message: format!("invalid path {}: {}", path.display(), e),
            })?
            .join(path)
    };

    let mut cleaned = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }

    cleaned
        .into_os_string()
        .into_string()
        .map_err(|raw| Error::InvalidConfig {
            message: format!("invalid path: {:?}", raw),
        })
}
