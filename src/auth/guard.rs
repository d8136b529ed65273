//! Session, capability, filesystem and package checks

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::{has_group, Authenticator, GroupMatch, ADMIN_GROUP};
use crate::config::{ApiConfig, UnmappedPolicy};
use crate::context::RequestContext;
use crate::error::{Result, WebdeskError};
use crate::vfs::{is_remote_url, Resolver};

/// Capability whose check also covers the filesystem
pub const FS_CAPABILITY: &str = "fs";

/// Methods that modify their source location
const MUTATING_METHODS: &[&str] = &["upload", "write", "delete", "mkdir"];

/// Methods that additionally modify their destination
const DEST_MUTATING_METHODS: &[&str] = &["copy", "move"];

fn is_mutating(method: &str, dest_side: bool) -> bool {
    MUTATING_METHODS.contains(&method) || (dest_side && DEST_MUTATING_METHODS.contains(&method))
}

/// Filesystem details for an `fs` capability check
#[derive(Debug, Clone, Default)]
pub struct PermissionOptions {
    pub src: Option<String>,
    pub dest: Option<String>,
    pub method: Option<String>,
}

impl PermissionOptions {
    pub fn fs(src: Option<&str>, dest: Option<&str>, method: &str) -> Self {
        Self {
            src: src.map(str::to_string),
            dest: dest.map(str::to_string),
            method: Some(method.to_string()),
        }
    }
}

/// Authorization on top of an authentication strategy
#[derive(Clone)]
pub struct Authorizer {
    strategy: Arc<dyn Authenticator>,
    api: ApiConfig,
    mount_groups: HashMap<String, Vec<String>>,
    resolver: Arc<Resolver>,
}

impl Authorizer {
    pub fn new(
        strategy: Arc<dyn Authenticator>,
        api: ApiConfig,
        mount_groups: HashMap<String, Vec<String>>,
        resolver: Arc<Resolver>,
    ) -> Self {
        Self {
            strategy,
            api,
            mount_groups,
            resolver,
        }
    }

    pub fn strategy(&self) -> &Arc<dyn Authenticator> {
        &self.strategy
    }

    /// Succeeds only when a user is bound to the session
    pub fn check_session(&self, ctx: &RequestContext) -> Result<String> {
        ctx.username().ok_or(WebdeskError::NoSession)
    }

    /// Strategy groups, or the configured defaults when there are none
    pub async fn user_groups(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        let username = self.check_session(ctx)?;
        let groups = self.strategy.get_groups(ctx, &username).await?;
        if groups.is_empty() {
            Ok(self.api.default_groups.clone())
        } else {
            Ok(groups)
        }
    }

    pub async fn check_permission(
        &self,
        ctx: &RequestContext,
        capability: &str,
        options: &PermissionOptions,
    ) -> Result<()> {
        self.check_permission_with(ctx, capability, options, GroupMatch::RequireAll)
            .await
    }

    /// Check that the session's user holds `capability`.
    ///
    /// `fs` additionally checks the source and destination mounts.
    pub async fn check_permission_with(
        &self,
        ctx: &RequestContext,
        capability: &str,
        options: &PermissionOptions,
        mode: GroupMatch,
    ) -> Result<()> {
        self.check_session(ctx)?;

        let required = match self.api.groups.get(capability) {
            Some(group) => group.clone(),
            None if capability == FS_CAPABILITY => FS_CAPABILITY.to_string(),
            None => match self.api.unmapped_capabilities {
                UnmappedPolicy::Allow => return Ok(()),
                UnmappedPolicy::Deny => {
                    return Err(WebdeskError::PermissionDenied(capability.to_string()))
                }
            },
        };

        let groups = self.user_groups(ctx).await?;
        if !has_group(&groups, &[required], mode) {
            debug!("{:?} lacks capability {}", ctx.username(), capability);
            return Err(WebdeskError::PermissionDenied(capability.to_string()));
        }

        if capability == FS_CAPABILITY {
            let method = options.method.as_deref().unwrap_or("read");
            let allowed = self.filesystem_allowed(
                ctx,
                &groups,
                options.src.as_deref(),
                options.dest.as_deref(),
                method,
            )?;
            if !allowed {
                return Err(WebdeskError::PermissionDenied(format!(
                    "{}, {}",
                    capability, method
                )));
            }
        }

        Ok(())
    }

    /// Whether `method` may touch `src` and `dest`
    pub async fn check_filesystem_permission(
        &self,
        ctx: &RequestContext,
        src: Option<&str>,
        dest: Option<&str>,
        method: &str,
    ) -> Result<bool> {
        let groups = self.user_groups(ctx).await?;
        self.filesystem_allowed(ctx, &groups, src, dest, method)
    }

    fn filesystem_allowed(
        &self,
        ctx: &RequestContext,
        groups: &[String],
        src: Option<&str>,
        dest: Option<&str>,
        method: &str,
    ) -> Result<bool> {
        let src_ok = match src {
            Some(path) => self.mount_allows(ctx, groups, path, method, false)?,
            None => true,
        };
        let dest_ok = match dest {
            Some(path) => self.mount_allows(ctx, groups, path, method, true)?,
            None => true,
        };
        Ok(src_ok && dest_ok)
    }

    fn mount_allows(
        &self,
        ctx: &RequestContext,
        groups: &[String],
        path: &str,
        method: &str,
        dest_side: bool,
    ) -> Result<bool> {
        // remote URLs have no mount; they are readable only
        if is_remote_url(path) {
            return Ok(!is_mutating(method, dest_side));
        }

        let resolved = self.resolver.parse_virtual_path(path, ctx)?;
        if groups.iter().any(|g| g == ADMIN_GROUP) {
            return Ok(true);
        }

        let Some(mount) = self.resolver.mount(&resolved.protocol) else {
            return Ok(true);
        };

        if !mount.enabled {
            warn!("{:?} tried to use disabled mount {}", ctx.username(), mount.protocol);
            return Ok(false);
        }

        if mount.ro && is_mutating(method, dest_side) {
            debug!("{} denied on read-only mount {}", method, mount.protocol);
            return Ok(false);
        }

        match self.mount_groups.get(&mount.protocol) {
            Some(required) => Ok(has_group(groups, required, GroupMatch::RequireAll)),
            None => Ok(true),
        }
    }

    /// Fails when `name` is on the user's package blacklist
    pub async fn check_package_permission(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        let username = self.check_session(ctx)?;
        let blacklist = self.strategy.get_blacklist(ctx, &username).await?;
        if blacklist.iter().any(|p| p == name) {
            debug!("{} is blacklisted for {}", name, username);
            return Err(WebdeskError::PermissionDenied(format!(
                "blacklisted package {}",
                name
            )));
        }
        Ok(())
    }
}
