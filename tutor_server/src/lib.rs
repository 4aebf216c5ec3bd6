use std::{fmt, ops::Deref, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use config::{AppConfig, AuthConfig};
use error::AppError;
use handlers::{
    create_conversation_handler, file_handler, impersonate_handler, index_handler,
    list_conversation_handler, list_message_handler, list_users_handler, me_handler,
    poll_message_handler, profile_handler, read_message_handler, send_message_handler,
    signin_handler, signup_handler, stop_impersonating_handler, upload_handler,
};

pub mod config;
mod error;
mod handlers;
mod middlewares;
mod models;
mod openapi;
mod services;
#[cfg(feature = "test-util")]
pub mod test_util;

use middlewares::verify_conversation_perm;
use openapi::OpenApiRouter;
use services::{AdminService, ConversationService, MsgService, UserService};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::fs;
use tutor_core::{
    middlewares::{set_layer, verify_token, TokenVerify},
    utils::{DecodingKey, EncodingKey},
    User,
};

#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[allow(unused)]
pub struct AppStateInner {
    pub config: AppConfig,
    pub(crate) ek: EncodingKey,
    pub(crate) dk: DecodingKey,
    pub(crate) pool: PgPool,
    pub(crate) user_svc: UserService,
    pub(crate) conv_svc: ConversationService,
    pub(crate) msg_svc: MsgService,
    pub(crate) admin_svc: AdminService,
}

pub async fn get_router(state: AppState) -> Result<Router, AppError> {
    let conversation = Router::new()
        .route(
            "/messages/:conversation_id",
            get(list_message_handler).post(send_message_handler),
        )
        .route("/messages/:conversation_id/read", post(read_message_handler))
        .layer(from_fn_with_state(state.clone(), verify_conversation_perm));

    let api = Router::new()
        .route("/users/me", get(me_handler))
        .route("/users/:id", get(profile_handler))
        .route(
            "/messages/conversations",
            get(list_conversation_handler).post(create_conversation_handler),
        )
        .route("/messages/poll", get(poll_message_handler))
        .merge(conversation)
        .route("/upload", post(upload_handler))
        .route("/files/*path", get(file_handler))
        .route("/admin/users", get(list_users_handler))
        .route("/admin/impersonate", post(impersonate_handler))
        .route("/admin/stop-impersonating", post(stop_impersonating_handler))
        .layer(from_fn_with_state(state.clone(), verify_token::<AppState>))
        .route("/signin", post(signin_handler))
        .route("/signup", post(signup_handler));

    let app = Router::new()
        .route("/", get(index_handler))
        .nest("/api", api)
        .openapi()
        .with_state(state);
    Ok(set_layer(app))
}

impl TokenVerify for AppState {
    type Error = AppError;

    fn verify_token(&self, token: &str) -> Result<User, Self::Error> {
        Ok(self.dk.verify(token)?)
    }
}

impl Deref for AppState {
    type Target = AppStateInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl AppState {
    fn load_key(conf: &AuthConfig) -> Result<(EncodingKey, DecodingKey), AppError> {
        let dk = DecodingKey::load(&conf.pk).context("load pk failed")?;
        let ek = EncodingKey::load(&conf.sk).context("load sk failed")?;
        Ok((ek, dk))
    }

    pub async fn try_new(config: AppConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(1000))
            .connect(&config.server.db_url)
            .await
            .context("connect db failed")?;
        Self::try_new_with_pool(config, pool).await
    }

    pub(crate) async fn try_new_with_pool(
        config: AppConfig,
        pool: PgPool,
    ) -> Result<Self, AppError> {
        fs::create_dir_all(&config.server.base_dir)
            .await
            .context("create base_dir failed")?;
        let (ek, dk) = Self::load_key(&config.auth)?;
        let user_svc = UserService::new(pool.clone());
        let conv_svc = ConversationService::new(pool.clone(), user_svc.clone());
        let msg_svc = MsgService::new(pool.clone(), &config.server.base_dir);
        let admin_svc = AdminService::new(user_svc.clone());
        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                ek,
                dk,
                pool,
                user_svc,
                conv_svc,
                msg_svc,
                admin_svc,
            }),
        })
    }
}

impl fmt::Debug for AppStateInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppStateInner")
            .field("config", &self.config)
            .finish()
    }
}
