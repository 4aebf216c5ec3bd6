mod admin;
mod auth;
mod conversation;
mod messages;

pub(crate) use admin::*;
pub(crate) use auth::*;
use axum::response::IntoResponse;
pub(crate) use conversation::*;
pub(crate) use messages::*;

pub(crate) async fn index_handler() -> impl IntoResponse {
    "tutor_server"
}
