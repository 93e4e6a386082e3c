use axum::{
    http::{StatusCode, header::InvalidHeaderValue},
    response::{IntoResponse, Response},
};
use serde::de;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // Startup configuration
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("invalid value for {key}: {reason}")]
    InvalidConfig { key: &'static str, reason: String },

    // Data access
    #[error("libsql: {0}")]
    Libsql(#[from] libsql::Error),
    #[error("deserialization: {0}")]
    De(#[from] de::value::Error),
    #[error("connection pool is closed")]
    PoolClosed,

    // Client input
    #[error("phone number must be an integer, got {0:?}")]
    InvalidPhone(String),
    #[error("login state does not match, please try signing in again")]
    OAuthState,
    #[error("identity provider refused the login: {0}")]
    OAuthDenied(String),

    // Identity provider and plumbing
    #[error("authentication is not configured")]
    AuthNotConfigured,
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("openid connect: {0}")]
    Oidc(String),
    #[error("sign-in could not be verified")]
    IdToken(String),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("header: {0}")]
    Header(#[from] InvalidHeaderValue),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidPhone(_) | Error::OAuthState | Error::OAuthDenied(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::IdToken(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            let body = status.canonical_reason().unwrap_or("Internal Server Error");
            return (status, body).into_response();
        }
        if let Error::IdToken(reason) = &self {
            tracing::warn!(%reason, "id token rejected");
        }
        tracing::debug!(error = %self, "rejected request");
        (status, self.to_string()).into_response()
    }
}
