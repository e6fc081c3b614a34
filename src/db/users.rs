use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::models::User;

#[derive(FromRow)]
struct UserWithHash {
    id: i64,
    username: String,
    date_joined: DateTime<Utc>,
    password_hash: String,
}

pub async fn insert_user(
    db: &SqlitePool,
    username: &str,
    password_hash: &str,
) -> Result<User, sqlx::Error> {
    let now = Utc::now();

    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, password_hash, date_joined)
        VALUES (?1, ?2, ?3)
        RETURNING id, username, date_joined
        "#,
    )
    .bind(username)
    .bind(password_hash)
    .bind(now)
    .fetch_one(db)
    .await
}

pub async fn username_exists(db: &SqlitePool, username: &str) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(db)
        .await?;
    Ok(row.is_some())
}

/// Returns the user together with the stored password hash.
pub async fn find_credentials(
    db: &SqlitePool,
    username: &str,
) -> Result<Option<(User, String)>, sqlx::Error> {
    let row = sqlx::query_as::<_, UserWithHash>(
        "SELECT id, username, date_joined, password_hash FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(db)
    .await?;

    Ok(row.map(|r| {
        (
            User {
                id: r.id,
                username: r.username,
                date_joined: r.date_joined,
            },
            r.password_hash,
        )
    }))
}

pub async fn insert_session(
    db: &SqlitePool,
    session_key: &str,
    user_id: i64,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO sessions (session_key, user_id, expires_at) VALUES (?1, ?2, ?3)")
        .bind(session_key)
        .bind(user_id)
        .bind(expires_at)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn find_session_user(
    db: &SqlitePool,
    session_key: &str,
    now: DateTime<Utc>,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT u.id, u.username, u.date_joined
        FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.session_key = ?1 AND s.expires_at > ?2
        "#,
    )
    .bind(session_key)
    .bind(now)
    .fetch_optional(db)
    .await
}

pub async fn delete_session(db: &SqlitePool, session_key: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE session_key = ?")
        .bind(session_key)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

pub async fn purge_expired_sessions(
    db: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::Duration;

    #[tokio::test]
    async fn test_insert_and_find_credentials() {
        let pool = db::in_memory().await.expect("Failed to create test db");

        let user = insert_user(&pool, "testuser", "hash").await.unwrap();
        assert_eq!(user.username, "testuser");
        assert!(username_exists(&pool, "testuser").await.unwrap());
        assert!(!username_exists(&pool, "TestUser").await.unwrap());

        let (found, hash) = find_credentials(&pool, "testuser").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(hash, "hash");

        assert!(find_credentials(&pool, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let pool = db::in_memory().await.expect("Failed to create test db");

        insert_user(&pool, "testuser", "hash").await.unwrap();
        let err = insert_user(&pool, "testuser", "other").await.unwrap_err();
        assert!(
            err.as_database_error()
                .is_some_and(|e| e.is_unique_violation())
        );
    }

    #[tokio::test]
    async fn test_session_expiry() {
        let pool = db::in_memory().await.expect("Failed to create test db");
        let user = insert_user(&pool, "testuser", "hash").await.unwrap();
        let now = Utc::now();

        insert_session(&pool, "live", user.id, now + Duration::hours(1)).await.unwrap();
        insert_session(&pool, "stale", user.id, now - Duration::hours(1)).await.unwrap();

        assert_eq!(find_session_user(&pool, "live", now).await.unwrap(), Some(user));
        assert_eq!(find_session_user(&pool, "stale", now).await.unwrap(), None);
        assert_eq!(find_session_user(&pool, "missing", now).await.unwrap(), None);

        assert_eq!(purge_expired_sessions(&pool, now).await.unwrap(), 1);
        assert!(delete_session(&pool, "live").await.unwrap());
        assert!(!delete_session(&pool, "live").await.unwrap());
    }
}
