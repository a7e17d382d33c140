use crate::state::AppState;
use axum::Router;

pub mod cookie;
pub mod dto;
pub mod handlers;
pub mod oauth;
pub mod password;
pub mod repo;
pub mod services;
pub mod session;
pub(crate) mod extractors;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
