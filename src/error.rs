use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::forms::FieldErrors;

pub const LOGIN_URL: &str = "/todos/login/";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Validation failed: {0:?}")]
    Validation(FieldErrors),

    #[error("Not found")]
    NotFound,

    #[error("Authentication required")]
    AuthenticationRequired { next: String },

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error")]
    InternalServerError,
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        AppError::Validation(errors)
    }
}

/// Plain 302, which is what browsers and the login flow expect after a form post.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

pub fn login_redirect(next: &str) -> Response {
    found(&format!("{}?next={}", LOGIN_URL, urlencoding::encode(next)))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found"),
            AppError::AuthenticationRequired { next } => return login_redirect(&next),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid username or password"),
            AppError::Database(e) => {
                error!("database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred")
            }
            AppError::Template(e) => {
                error!("template error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            other @ (AppError::Migrate(_)
            | AppError::PasswordHash(_)
            | AppError::Config(_)
            | AppError::InternalServerError) => {
                error!("{}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, message).into_response()
    }
}
