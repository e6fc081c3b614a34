use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// An authenticated account. The password hash never leaves the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub date_joined: DateTime<Utc>,
}
