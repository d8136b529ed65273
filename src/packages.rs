//! Package metadata and server-side application APIs

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, info};

use crate::context::RequestContext;
use crate::error::{Result, WebdeskError};
use crate::vfs::Resolver;

/// Server-side half of an application, reached through `/API/application`
#[async_trait]
pub trait PackageApi: Send + Sync {
    async fn call(&self, method: &str, ctx: &RequestContext, args: Value) -> Result<Value>;
}

#[derive(Debug, Default, Deserialize)]
struct ListArgs {
    #[serde(default)]
    paths: Vec<String>,
}

/// Commands understood by [`PackageManager::execute`]
const COMMANDS: &[&str] = &["list", "install", "uninstall", "update", "cache"];

/// Package metadata manager
pub struct PackageManager {
    system: Map<String, Value>,
    apis: HashMap<String, Arc<dyn PackageApi>>,
    resolver: Arc<Resolver>,
}

impl PackageManager {
    pub fn new(system: Map<String, Value>, resolver: Arc<Resolver>) -> Self {
        Self {
            system,
            apis: HashMap::new(),
            resolver,
        }
    }

    /// Load the system manifest (if configured)
    pub async fn load(manifest: Option<&Path>, resolver: Arc<Resolver>) -> Result<Self> {
        let system = match manifest {
            Some(path) => {
                let packages = read_manifest(path, "system").await?;
                info!("Loaded {} system package(s) from {:?}", packages.len(), path);
                packages
            }
            None => Map::new(),
        };
        Ok(Self::new(system, resolver))
    }

    pub fn register_api(&mut self, name: impl Into<String>, api: Arc<dyn PackageApi>) {
        let name = name.into();
        info!("Registering application API for {}", name);
        self.apis.insert(name, api);
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.system
    }

    pub fn api(&self, name: &str) -> Result<Arc<dyn PackageApi>> {
        self.apis.get(name).cloned().ok_or_else(|| {
            WebdeskError::NoSuchModule(format!("application API for {}", name))
        })
    }

    pub fn has_command(command: &str) -> bool {
        COMMANDS.contains(&command)
    }

    /// Run a package manager command
    pub async fn execute(&self, ctx: &RequestContext, command: &str, args: Value) -> Result<Value> {
        match command {
            "list" => self.list(ctx, args).await,
            "install" | "uninstall" | "update" | "cache" => {
                Err(WebdeskError::NotImplemented(command.to_string()))
            }
            _ => Err(WebdeskError::NoSuchMethod("No such command".to_string())),
        }
    }

    /// User manifests from `args.paths` merged with the system manifest.
    ///
    /// System entries win on name collisions. Missing user manifests are
    /// skipped.
    pub async fn list(&self, ctx: &RequestContext, args: Value) -> Result<Value> {
        let args: ListArgs = if args.is_null() {
            ListArgs::default()
        } else {
            serde_json::from_value(args)?
        };

        let mut result = Map::new();
        for dir in &args.paths {
            let filename = format!("{}/packages.json", dir.trim_end_matches('/'));
            let resolved = self.resolver.parse_virtual_path(&filename, ctx).map_err(|_| {
                WebdeskError::InvalidPath("Failed to parse user manifest".to_string())
            })?;

            match read_manifest(&resolved.real, "user").await {
                Ok(packages) => result.extend(packages),
                Err(WebdeskError::NotFound(_)) => debug!("no user manifest at {}", filename),
                Err(e) => return Err(e),
            }
        }

        result.extend(self.system.clone());
        Ok(Value::Object(result))
    }
}

async fn read_manifest(path: &Path, scope: &str) -> Result<Map<String, Value>> {
    let data = fs::read(path)
        .await
        .map_err(|e| WebdeskError::from_io(e, path))?;

    let mut packages = match serde_json::from_slice::<Value>(&data)? {
        Value::Object(map) => map,
        _ => {
            return Err(WebdeskError::InvalidArgument(format!(
                "{} is not a package manifest",
                path.display()
            )))
        }
    };

    for meta in packages.values_mut() {
        if let Value::Object(meta) = meta {
            meta.insert("scope".to_string(), Value::String(scope.to_string()));
        }
    }
    Ok(packages)
}
