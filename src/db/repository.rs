use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::AppError;
use crate::forms::TodoForm;
use crate::models::{Todo, TodoFields};

const TODO_COLUMNS: &str =
    "id, owner_id, title, description, due_date, priority, is_resolved, resolved_at, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Title,
    DueDate,
    Priority,
    CreatedAt,
}

impl SortField {
    fn name(&self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::DueDate => "due_date",
            SortField::Priority => "priority",
            SortField::CreatedAt => "created_at",
        }
    }

    fn expression(&self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::DueDate => "due_date",
            SortField::Priority => {
                "CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END"
            }
            SortField::CreatedAt => "created_at",
        }
    }
}

/// Ordering for the active list. Only allow-listed fields can be expressed, so a
/// query string never reaches the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl Default for SortKey {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            descending: true,
        }
    }
}

impl SortKey {
    /// Parses `field` or `-field`. Returns `None` for anything off the allow-list.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (descending, name) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let field = match name {
            "title" => SortField::Title,
            "due_date" => SortField::DueDate,
            "priority" => SortField::Priority,
            "created_at" => SortField::CreatedAt,
            _ => return None,
        };

        Some(Self { field, descending })
    }

    /// Unrecognized or missing keys fall back to newest first.
    pub fn from_param(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or_default()
    }

    pub fn as_param(&self) -> String {
        if self.descending {
            format!("-{}", self.field.name())
        } else {
            self.field.name().to_string()
        }
    }

    fn order_by(&self) -> String {
        let direction = if self.descending { "DESC" } else { "ASC" };
        format!(
            "{} {}, created_at DESC, id DESC",
            self.field.expression(),
            direction
        )
    }
}

pub async fn list_active(
    db: &SqlitePool,
    owner_id: i64,
    sort: SortKey,
) -> Result<Vec<Todo>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM todos WHERE owner_id = ?1 AND is_resolved = 0 ORDER BY {}",
        TODO_COLUMNS,
        sort.order_by()
    );

    sqlx::query_as::<_, Todo>(&sql)
        .bind(owner_id)
        .fetch_all(db)
        .await
}

pub async fn list_completed(db: &SqlitePool, owner_id: i64) -> Result<Vec<Todo>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM todos WHERE owner_id = ?1 AND is_resolved = 1 ORDER BY resolved_at DESC, id DESC",
        TODO_COLUMNS
    );

    sqlx::query_as::<_, Todo>(&sql)
        .bind(owner_id)
        .fetch_all(db)
        .await
}

/// Looks a todo up through its owner. A missing id and someone else's id are the
/// same `NotFound`.
pub async fn find_todo(db: &SqlitePool, owner_id: i64, id: i64) -> Result<Todo, AppError> {
    let sql = format!(
        "SELECT {} FROM todos WHERE id = ?1 AND owner_id = ?2",
        TODO_COLUMNS
    );

    sqlx::query_as::<_, Todo>(&sql)
        .bind(id)
        .bind(owner_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| {
            warn!("todo {} not found for user {}", id, owner_id);
            AppError::NotFound
        })
}

pub async fn insert_todo(
    db: &SqlitePool,
    owner_id: i64,
    fields: TodoFields,
) -> Result<Todo, sqlx::Error> {
    let now = Utc::now();
    let sql = format!(
        r#"
        INSERT INTO todos
            (owner_id, title, description, due_date, priority, is_resolved, resolved_at, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, ?6)
        RETURNING {}
        "#,
        TODO_COLUMNS
    );

    sqlx::query_as::<_, Todo>(&sql)
        .bind(owner_id)
        .bind(fields.title)
        .bind(fields.description)
        .bind(fields.due_date)
        .bind(fields.priority)
        .bind(now)
        .fetch_one(db)
        .await
}

pub async fn create(db: &SqlitePool, owner_id: i64, form: &TodoForm) -> Result<Todo, AppError> {
    let fields = form.clean()?;
    let todo = insert_todo(db, owner_id, fields).await?;
    info!("created todo {} for user {}", todo.id, owner_id);
    Ok(todo)
}

/// Ownership is checked before the form, so a foreign id never reports validation errors.
pub async fn update(
    db: &SqlitePool,
    owner_id: i64,
    id: i64,
    form: &TodoForm,
) -> Result<Todo, AppError> {
    find_todo(db, owner_id, id).await?;
    let fields = form.clean()?;

    let sql = format!(
        r#"
        UPDATE todos
        SET title = ?1,
            description = ?2,
            due_date = ?3,
            priority = ?4
        WHERE id = ?5 AND owner_id = ?6
        RETURNING {}
        "#,
        TODO_COLUMNS
    );

    let todo = sqlx::query_as::<_, Todo>(&sql)
        .bind(fields.title)
        .bind(fields.description)
        .bind(fields.due_date)
        .bind(fields.priority)
        .bind(id)
        .bind(owner_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)?;

    info!("updated todo {} for user {}", id, owner_id);
    Ok(todo)
}

pub async fn delete(db: &SqlitePool, owner_id: i64, id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM todos WHERE id = ?1 AND owner_id = ?2")
        .bind(id)
        .bind(owner_id)
        .execute(db)
        .await?
        .rows_affected();

    if result == 0 {
        warn!("delete of todo {} by user {} matched nothing", id, owner_id);
        return Err(AppError::NotFound);
    }

    info!("deleted todo {} for user {}", id, owner_id);
    Ok(())
}

/// Flips `is_resolved` and sets or clears `resolved_at` in the same statement.
pub async fn toggle(db: &SqlitePool, owner_id: i64, id: i64) -> Result<Todo, AppError> {
    let now = Utc::now();
    // SET expressions read the pre-update row, so the CASE sees the old flag.
    let sql = format!(
        r#"
        UPDATE todos
        SET is_resolved = NOT is_resolved,
            resolved_at = CASE WHEN is_resolved THEN NULL ELSE ?1 END
        WHERE id = ?2 AND owner_id = ?3
        RETURNING {}
        "#,
        TODO_COLUMNS
    );

    let todo = sqlx::query_as::<_, Todo>(&sql)
        .bind(now)
        .bind(id)
        .bind(owner_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| {
            warn!("toggle of todo {} by user {} matched nothing", id, owner_id);
            AppError::NotFound
        })?;

    info!(
        "todo {} for user {} is now {}",
        id,
        owner_id,
        if todo.is_resolved { "resolved" } else { "active" }
    );
    Ok(todo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, users};
    use crate::models::Priority;
    use chrono::{Duration, Local};

    async fn setup_test_db() -> (SqlitePool, i64, i64) {
        let pool = db::in_memory().await.expect("Failed to create test db");
        let alice = users::insert_user(&pool, "alice", "hash").await.unwrap();
        let bob = users::insert_user(&pool, "bob", "hash").await.unwrap();
        (pool, alice.id, bob.id)
    }

    fn form(title: &str, priority: &str, due_date: &str) -> TodoForm {
        TodoForm {
            title: title.to_string(),
            description: String::new(),
            due_date: due_date.to_string(),
            priority: priority.to_string(),
        }
    }

    #[test]
    fn test_sort_key_allow_list() {
        assert_eq!(SortKey::parse("title").unwrap().field, SortField::Title);
        let desc = SortKey::parse("-due_date").unwrap();
        assert_eq!(desc.field, SortField::DueDate);
        assert!(desc.descending);
        assert_eq!(desc.as_param(), "-due_date");

        assert_eq!(SortKey::parse("owner_id"), None);
        assert_eq!(SortKey::parse("title; DROP TABLE todos"), None);
        assert_eq!(SortKey::from_param(Some("password")), SortKey::default());
        assert_eq!(SortKey::from_param(None).as_param(), "-created_at");
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (pool, alice, _) = setup_test_db().await;

        let todo = create(&pool, alice, &form("Test TODO", "high", "")).await.unwrap();
        assert_eq!(todo.title, "Test TODO");
        assert_eq!(todo.owner_id, alice);
        assert_eq!(todo.priority, Priority::High);
        assert!(!todo.is_resolved);
        assert!(todo.resolved_at.is_none());

        let active = list_active(&pool, alice, SortKey::default()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, todo.id);
        assert!(list_completed(&pool, alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_form() {
        let (pool, alice, _) = setup_test_db().await;

        let err = create(&pool, alice, &form("", "high", "")).await.unwrap_err();
        match err {
            AppError::Validation(errors) => assert!(errors.contains("title")),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(list_active(&pool, alice, SortKey::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lists_are_scoped_to_owner() {
        let (pool, alice, bob) = setup_test_db().await;

        create(&pool, alice, &form("Alice TODO", "low", "")).await.unwrap();
        let bobs = create(&pool, bob, &form("Bob TODO", "low", "")).await.unwrap();
        toggle(&pool, bob, bobs.id).await.unwrap();

        let active = list_active(&pool, alice, SortKey::default()).await.unwrap();
        assert!(active.iter().all(|t| t.owner_id == alice));
        assert!(list_completed(&pool, alice).await.unwrap().is_empty());
        assert!(list_active(&pool, bob, SortKey::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sorting() {
        let (pool, alice, _) = setup_test_db().await;
        let today = Local::now().date_naive();
        let later = (today + Duration::days(3)).format("%Y-%m-%d").to_string();
        let sooner = (today + Duration::days(1)).format("%Y-%m-%d").to_string();

        create(&pool, alice, &form("M TODO", "medium", "")).await.unwrap();
        create(&pool, alice, &form("A TODO", "low", &later)).await.unwrap();
        create(&pool, alice, &form("Z TODO", "high", &sooner)).await.unwrap();

        let titles = |todos: Vec<Todo>| todos.into_iter().map(|t| t.title).collect::<Vec<_>>();

        let by_default = list_active(&pool, alice, SortKey::default()).await.unwrap();
        assert_eq!(titles(by_default), ["Z TODO", "A TODO", "M TODO"]);

        let by_title = list_active(&pool, alice, SortKey::parse("title").unwrap()).await.unwrap();
        assert_eq!(titles(by_title), ["A TODO", "M TODO", "Z TODO"]);

        let by_priority = list_active(&pool, alice, SortKey::parse("priority").unwrap())
            .await
            .unwrap();
        assert_eq!(titles(by_priority), ["Z TODO", "M TODO", "A TODO"]);

        let by_due = list_active(&pool, alice, SortKey::parse("-due_date").unwrap())
            .await
            .unwrap();
        assert_eq!(titles(by_due), ["A TODO", "Z TODO", "M TODO"]);
    }

    #[tokio::test]
    async fn test_update_applies_fields() {
        let (pool, alice, _) = setup_test_db().await;
        let todo = create(&pool, alice, &form("Test TODO", "high", "")).await.unwrap();

        let mut edit = form("Updated TODO", "low", "2026-01-10");
        edit.description = "Updated description".to_string();
        let updated = update(&pool, alice, todo.id, &edit).await.unwrap();

        assert_eq!(updated.id, todo.id);
        assert_eq!(updated.title, "Updated TODO");
        assert_eq!(updated.priority, Priority::Low);
        assert_eq!(updated.description.as_deref(), Some("Updated description"));
        assert_eq!(updated.created_at, todo.created_at);
        assert_eq!(updated.owner_id, alice);
    }

    #[tokio::test]
    async fn test_foreign_and_missing_ids_are_not_found() {
        let (pool, alice, bob) = setup_test_db().await;
        let todo = create(&pool, alice, &form("Test TODO", "high", "")).await.unwrap();
        let missing = todo.id + 1000;

        for id in [todo.id, missing] {
            assert!(matches!(find_todo(&pool, bob, id).await, Err(AppError::NotFound)));
            // an invalid form must not reveal anything either
            assert!(matches!(
                update(&pool, bob, id, &form("", "", "")).await,
                Err(AppError::NotFound)
            ));
            assert!(matches!(toggle(&pool, bob, id).await, Err(AppError::NotFound)));
            assert!(matches!(delete(&pool, bob, id).await, Err(AppError::NotFound)));
        }

        let untouched = find_todo(&pool, alice, todo.id).await.unwrap();
        assert_eq!(untouched.title, "Test TODO");
        assert!(!untouched.is_resolved);
    }

    #[tokio::test]
    async fn test_toggle_is_its_own_inverse() {
        let (pool, alice, _) = setup_test_db().await;
        let todo = create(&pool, alice, &form("Test TODO", "high", "")).await.unwrap();

        let resolved = toggle(&pool, alice, todo.id).await.unwrap();
        assert!(resolved.is_resolved);
        assert!(resolved.resolved_at.is_some());

        let completed = list_completed(&pool, alice).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert!(list_active(&pool, alice, SortKey::default()).await.unwrap().is_empty());

        let reopened = toggle(&pool, alice, todo.id).await.unwrap();
        assert_eq!(reopened.is_resolved, todo.is_resolved);
        assert_eq!(reopened.resolved_at, todo.resolved_at);
    }

    #[tokio::test]
    async fn test_resolved_at_tracks_flag_after_every_mutation() {
        let (pool, alice, _) = setup_test_db().await;
        let todo = create(&pool, alice, &form("Test TODO", "high", "")).await.unwrap();
        assert_eq!(todo.is_resolved, todo.resolved_at.is_some());

        let toggled = toggle(&pool, alice, todo.id).await.unwrap();
        assert_eq!(toggled.is_resolved, toggled.resolved_at.is_some());

        let updated = update(&pool, alice, todo.id, &form("Renamed", "medium", ""))
            .await
            .unwrap();
        assert!(updated.is_resolved);
        assert_eq!(updated.resolved_at, toggled.resolved_at);
    }

    #[tokio::test]
    async fn test_storage_rejects_broken_invariant() {
        let (pool, alice, _) = setup_test_db().await;

        let result = sqlx::query(
            "INSERT INTO todos (owner_id, title, priority, is_resolved, resolved_at, created_at) VALUES (?1, 'x', 'low', 1, NULL, ?2)",
        )
        .bind(alice)
        .bind(Utc::now())
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_completed_ordered_by_resolved_time() {
        let (pool, alice, _) = setup_test_db().await;
        let first = create(&pool, alice, &form("First", "low", "")).await.unwrap();
        let second = create(&pool, alice, &form("Second", "low", "")).await.unwrap();

        toggle(&pool, alice, second.id).await.unwrap();
        toggle(&pool, alice, first.id).await.unwrap();

        let completed = list_completed(&pool, alice).await.unwrap();
        assert_eq!(completed[0].id, first.id);
        assert_eq!(completed[1].id, second.id);
    }

    #[tokio::test]
    async fn test_delete_is_permanent() {
        let (pool, alice, _) = setup_test_db().await;
        let todo = create(&pool, alice, &form("Test TODO", "high", "")).await.unwrap();

        delete(&pool, alice, todo.id).await.unwrap();
        assert!(matches!(find_todo(&pool, alice, todo.id).await, Err(AppError::NotFound)));
        assert!(matches!(delete(&pool, alice, todo.id).await, Err(AppError::NotFound)));
    }
}
