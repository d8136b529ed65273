//! Startup wiring: build every service from the configuration

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::demo::DemoConfig;
use crate::auth::static_users::StaticConfig;
use crate::auth::{Authenticator, Authorizer, DemoAuthenticator, NullAuthenticator, StaticAuthenticator};
use crate::config::{Config, ModulesConfig};
use crate::error::{Result, WebdeskError};
use crate::packages::{PackageApi, PackageManager};
use crate::server::Connections;
use crate::session::SessionStore;
use crate::storage::filesystem::FileStorageConfig;
use crate::storage::{FileStorage, MemoryStorage, Storage};
use crate::transport::{Transport, TransportRegistry};
use crate::vfs::{Resolver, Vfs};

/// Everything a request handler can reach
pub struct AppContext {
    pub config: Arc<Config>,
    pub sessions: SessionStore,
    pub vfs: Arc<Vfs>,
    pub auth: Authorizer,
    pub storage: Arc<dyn Storage>,
    pub packages: PackageManager,
    pub connections: Connections,
}

impl AppContext {
    /// Load with the built-in transports and no application APIs
    pub async fn load(config: Config) -> Result<Self> {
        ModuleLoader::new(config).load().await
    }

    /// Release module resources; called once at shutdown
    pub async fn destroy(&self) {
        self.connections.close_all();
        if let Err(e) = self.auth.strategy().destroy().await {
            warn!("Failed to destroy authenticator: {}", e);
        }
        if let Err(e) = self.storage.destroy().await {
            warn!("Failed to destroy storage: {}", e);
        }
        self.sessions.clear();
    }
}

/// Builder for [`AppContext`] accepting extra transports and package APIs
pub struct ModuleLoader {
    config: Config,
    transports: TransportRegistry,
    apis: Vec<(String, Arc<dyn PackageApi>)>,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl ModuleLoader {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transports: TransportRegistry::builtin(),
            apis: Vec::new(),
            authenticator: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.register(transport);
        self
    }

    pub fn with_package_api(mut self, name: impl Into<String>, api: Arc<dyn PackageApi>) -> Self {
        self.apis.push((name.into(), api));
        self
    }

    /// Use `strategy` instead of the configured authenticator
    pub fn with_authenticator(mut self, strategy: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(strategy);
        self
    }

    pub async fn load(self) -> Result<AppContext> {
        let ModuleLoader {
            config,
            transports,
            apis,
            authenticator,
        } = self;

        let resolver = Arc::new(Resolver::new(&config));
        info!("Transports: {}", transports.names().join(", "));
        let vfs = Arc::new(Vfs::new(resolver.clone(), transports));

        let mut packages =
            PackageManager::load(config.packages.manifest.as_deref(), resolver.clone()).await?;
        for (name, api) in apis {
            packages.register_api(name, api);
        }

        let strategy = match authenticator {
            Some(strategy) => strategy,
            None => load_authenticator(&config.authenticator, &config.modules)?,
        };
        info!("Using authenticator {}", strategy.name());

        let storage = load_storage(&config.storage, &config.modules)?;
        info!("Using storage {}", storage.name());

        let auth = Authorizer::new(
            strategy,
            config.api.clone(),
            config.vfs.groups.clone(),
            resolver,
        );

        Ok(AppContext {
            sessions: SessionStore::new(config.http.session.ttl),
            config: Arc::new(config),
            vfs,
            auth,
            storage,
            packages,
            connections: Connections::new(),
        })
    }
}

/// Settings block for a module, deserialized into its config type
fn module_config<T>(settings: Option<&serde_yaml::Value>) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match settings {
        Some(value) => serde_yaml::from_value(value.clone()).map_err(|e| {
            WebdeskError::Config(crate::config::ConfigError::ParseError(e.to_string()))
        }),
        None => Ok(T::default()),
    }
}

pub fn load_authenticator(name: &str, modules: &ModulesConfig) -> Result<Arc<dyn Authenticator>> {
    let settings = modules.auth.get(name);
    let strategy: Arc<dyn Authenticator> = match name {
        "demo" => Arc::new(DemoAuthenticator::new(module_config::<DemoConfig>(settings)?)),
        "static" => Arc::new(StaticAuthenticator::new(module_config::<StaticConfig>(settings)?)),
        "none" => Arc::new(NullAuthenticator),
        other => return Err(WebdeskError::NoSuchModule(format!("authenticator {}", other))),
    };
    Ok(strategy)
}

pub fn load_storage(name: &str, modules: &ModulesConfig) -> Result<Arc<dyn Storage>> {
    let settings = modules.storage.get(name);
    let storage: Arc<dyn Storage> = match name {
        "memory" => Arc::new(MemoryStorage::new()),
        "filesystem" => {
            let settings = settings.ok_or_else(|| {
                WebdeskError::Config(crate::config::ConfigError::ValidationError(
                    "modules.storage.filesystem.path is required".to_string(),
                ))
            })?;
            let config: FileStorageConfig = serde_yaml::from_value(settings.clone()).map_err(|e| {
                WebdeskError::Config(crate::config::ConfigError::ParseError(e.to_string()))
            })?;
            Arc::new(FileStorage::new(config))
        }
        other => return Err(WebdeskError::NoSuchModule(format!("storage {}", other))),
    };
    Ok(storage)
}
