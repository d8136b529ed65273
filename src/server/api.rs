//! `/API/*` handlers

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::auth::{Credentials, PermissionOptions};
use crate::error::Result;
use crate::modules::AppContext;
use crate::packages::PackageManager;
use crate::response::ApiResponse;
use crate::server::router::ApiRequest;

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    #[serde(default)]
    command: String,
    #[serde(default = "empty_object")]
    args: Value,
    #[serde(default = "empty_object")]
    user: Value,
}

#[derive(Debug, Deserialize)]
struct ApplicationRequest {
    #[serde(default)]
    path: String,
    #[serde(default)]
    method: String,
    #[serde(default = "empty_object")]
    args: Value,
}

#[derive(Debug, Deserialize)]
struct SettingsRequest {
    #[serde(default)]
    settings: Value,
}

fn reply(result: Result<Value>) -> ApiResponse {
    match result {
        Ok(value) => ApiResponse::result(value),
        Err(e) => ApiResponse::error(&e),
    }
}

pub async fn login(app: Arc<AppContext>, req: ApiRequest) -> ApiResponse {
    reply(login_user(&app, &req).await)
}

async fn login_user(app: &AppContext, req: &ApiRequest) -> Result<Value> {
    let credentials: Credentials = req.data()?;
    let strategy = app.auth.strategy();
    let ctx = &req.ctx;

    let mut user = strategy.login(ctx, &credentials).await.map_err(|e| {
        warn!("Failed login for {:?}", credentials.username);
        e
    })?;

    let blacklist = strategy.get_blacklist(ctx, &user.username).await?;
    let settings = app.storage.get_settings(&user.username).await?;

    if user.groups.is_empty() {
        user.groups = strategy.get_groups(ctx, &user.username).await?;
    }
    if user.groups.is_empty() {
        user.groups = app.config.api.default_groups.clone();
    }

    ctx.session.set_user(Some(&user));
    app.connections
        .set_active_user(ctx.session.id(), Some(&user.username));
    info!("{} logged in", user.username);

    Ok(json!({
        "userData": user,
        "userSettings": settings,
        "blacklistedPackages": blacklist,
    }))
}

pub async fn logout(app: Arc<AppContext>, req: ApiRequest) -> ApiResponse {
    let ctx = &req.ctx;
    let result = app.auth.strategy().logout(ctx).await;
    if result.is_ok() {
        if let Some(username) = ctx.username() {
            info!("{} logged out", username);
        }
        ctx.session.set_user(None);
        app.connections.set_active_user(ctx.session.id(), None);
    }
    reply(result.map(Value::Bool))
}

pub async fn packages(app: Arc<AppContext>, req: ApiRequest) -> ApiResponse {
    if let Err(e) = app
        .auth
        .check_permission(&req.ctx, "packages", &PermissionOptions::default())
        .await
    {
        return ApiResponse::forbidden(&e);
    }

    let body: CommandRequest = match req.data() {
        Ok(body) => body,
        Err(e) => return ApiResponse::error(&e),
    };
    if !PackageManager::has_command(&body.command) {
        return ApiResponse::error_message("No such command");
    }

    reply(
        app.packages
            .execute(&req.ctx, &body.command, body.args)
            .await,
    )
}

pub async fn application(app: Arc<AppContext>, req: ApiRequest) -> ApiResponse {
    if let Err(e) = app
        .auth
        .check_permission(&req.ctx, "application", &PermissionOptions::default())
        .await
    {
        return ApiResponse::forbidden(&e);
    }

    let body: ApplicationRequest = match req.data() {
        Ok(body) => body,
        Err(e) => return ApiResponse::error(&e),
    };

    let api = match app.packages.api(&body.path) {
        Ok(api) => api,
        Err(e) => {
            warn!("{}", e);
            return ApiResponse::error_message(format!(
                "Failed to load Application API for: {}",
                body.path
            ));
        }
    };

    reply(api.call(&body.method, &req.ctx, body.args).await)
}

pub async fn settings(app: Arc<AppContext>, req: ApiRequest) -> ApiResponse {
    let username = match app.auth.check_session(&req.ctx) {
        Ok(username) => username,
        Err(e) => return ApiResponse::forbidden(&e),
    };

    let body: SettingsRequest = match req.data() {
        Ok(body) => body,
        Err(e) => return ApiResponse::error(&e),
    };

    reply(
        app.storage
            .set_settings(&username, body.settings)
            .await
            .map(Value::Bool),
    )
}

pub async fn users(app: Arc<AppContext>, req: ApiRequest) -> ApiResponse {
    if let Err(e) = app
        .auth
        .check_permission(&req.ctx, "users", &PermissionOptions::default())
        .await
    {
        return ApiResponse::forbidden(&e);
    }

    let body: CommandRequest = match req.data() {
        Ok(body) => body,
        Err(e) => return ApiResponse::error(&e),
    };

    reply(
        app.auth
            .strategy()
            .manage(&req.ctx, &body.command, body.user)
            .await,
    )
}
