use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    auth::Auth0Client,
    config::Config,
    db::Pool,
    errors::Result,
    handlers::{auth as auth_routes, guests},
    session::Sessions,
};

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod model;
pub mod session;
pub mod views;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub sessions: Sessions,
    pub auth: Option<Auth0Client>,
    pub public_url: Arc<str>,
}

impl AppState {
    pub fn new(pool: Pool, config: &Config) -> Result<Self> {
        Ok(Self {
            pool,
            sessions: Sessions::new(&config.session_secret, config.session_ttl)?,
            auth: config.auth.clone().map(Auth0Client::new).transpose()?,
            public_url: Arc::from(config.public_url.as_str()),
        })
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(guests::hello))
        .route("/{name}", get(guests::hello))
        .route("/submit_form", post(guests::submit_form))
        .route("/login", get(auth_routes::login))
        .route(
            "/callback",
            get(auth_routes::callback_get).post(auth_routes::callback_post),
        )
        .route("/logout", get(auth_routes::logout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
