pub mod password;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, Uri, header, request::Parts};
use chrono::{DateTime, Duration, Utc};
use cookie::{Cookie, SameSite};
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::users;
use crate::error::AppError;
use crate::forms::{Credentials, FieldErrors};
use crate::models::User;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "sessionid";

#[derive(Debug, Clone)]
pub struct Session {
    pub key: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

/// Identity provider behind the authentication gate.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Creates an account. A taken username is a `Validation` error on `username`.
    async fn register(&self, credentials: &Credentials) -> Result<User, AppError>;
    /// `InvalidCredentials` for an unknown user and for a wrong password alike.
    async fn authenticate(&self, username: &str, password: &str) -> Result<User, AppError>;
    async fn start_session(&self, user: &User) -> Result<Session, AppError>;
    async fn current_user(&self, session_key: &str) -> Result<Option<User>, AppError>;
    async fn end_session(&self, session_key: &str) -> Result<(), AppError>;
}

pub struct SqliteAuthenticator {
    db: SqlitePool,
    session_ttl: Duration,
}

impl SqliteAuthenticator {
    pub fn new(db: SqlitePool, session_ttl: Duration) -> Self {
        Self { db, session_ttl }
    }
}

fn username_taken() -> AppError {
    AppError::Validation(FieldErrors::single(
        "username",
        "A user with that username already exists.",
    ))
}

async fn run_blocking<T, F>(task: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|e| {
        error!("password task panicked: {}", e);
        AppError::InternalServerError
    })?
}

#[async_trait]
impl Authenticator for SqliteAuthenticator {
    async fn register(&self, credentials: &Credentials) -> Result<User, AppError> {
        if users::username_exists(&self.db, &credentials.username).await? {
            return Err(username_taken());
        }

        let raw = credentials.password.clone();
        let hash = run_blocking(move || password::hash_password(&raw)).await?;

        match users::insert_user(&self.db, &credentials.username, &hash).await {
            Ok(user) => {
                info!("registered user {} ({})", user.username, user.id);
                Ok(user)
            }
            Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => {
                Err(username_taken())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn authenticate(&self, username: &str, raw: &str) -> Result<User, AppError> {
        let Some((user, hash)) = users::find_credentials(&self.db, username).await? else {
            warn!("login attempt for unknown username");
            return Err(AppError::InvalidCredentials);
        };

        let raw = raw.to_string();
        let valid = run_blocking(move || password::verify_password(&raw, &hash)).await?;
        if !valid {
            warn!("failed login for user {}", user.id);
            return Err(AppError::InvalidCredentials);
        }

        Ok(user)
    }

    async fn start_session(&self, user: &User) -> Result<Session, AppError> {
        let now = Utc::now();
        let purged = users::purge_expired_sessions(&self.db, now).await?;
        if purged > 0 {
            debug!("purged {} expired sessions", purged);
        }

        let key = Uuid::new_v4().simple().to_string();
        let expires_at = now.checked_add_signed(self.session_ttl).ok_or_else(|| {
            AppError::Config(format!("session ttl {} is out of range", self.session_ttl))
        })?;
        users::insert_session(&self.db, &key, user.id, expires_at).await?;
        info!("user {} logged in", user.id);

        Ok(Session {
            key,
            user: user.clone(),
            expires_at,
        })
    }

    async fn current_user(&self, session_key: &str) -> Result<Option<User>, AppError> {
        Ok(users::find_session_user(&self.db, session_key, Utc::now()).await?)
    }

    async fn end_session(&self, session_key: &str) -> Result<(), AppError> {
        if users::delete_session(&self.db, session_key).await? {
            info!("session ended");
        }
        Ok(())
    }
}

pub fn session_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == SESSION_COOKIE)
        .map(|c| c.value().to_string())
}

pub fn session_cookie(session: &Session, ttl: Duration, secure: bool) -> String {
    Cookie::build((SESSION_COOKIE, session.key.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(cookie::time::Duration::seconds(ttl.num_seconds()))
        .build()
        .to_string()
}

pub fn removal_cookie() -> String {
    let mut cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    cookie.make_removal();
    cookie.to_string()
}

/// Local redirect targets only; anything else goes to the todo list.
pub fn safe_next(next: &str) -> Option<&str> {
    let next = next.trim_matches(' ');
    if !next.starts_with('/')
        || next.starts_with("//")
        || next.contains('\\')
        || next.chars().any(char::is_control)
    {
        return None;
    }
    let uri: Uri = next.parse().ok()?;
    (uri.scheme().is_none() && uri.authority().is_none()).then_some(next)
}

/// The authentication gate. Handlers that take this never run for anonymous requests.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let next = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let Some(key) = session_key(&parts.headers) else {
            debug!("anonymous request to {}", next);
            return Err(AppError::AuthenticationRequired { next });
        };

        match state.auth.current_user(&key).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => {
                debug!("stale session on request to {}", next);
                Err(AppError::AuthenticationRequired { next })
            }
        }
    }
}
