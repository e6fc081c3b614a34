use axum::Form;
use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse, Response};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::parse_id;
use crate::auth::CurrentUser;
use crate::db::repository::{self, SortKey};
use crate::error::{AppError, found};
use crate::forms::{FieldErrors, TodoForm};
use crate::models::{Priority, User};
use crate::state::AppState;
use crate::views::{TodoView, page_context, priority_choices};

const LIST_URL: &str = "/todos/";

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    sort: Option<String>,
}

#[derive(Serialize)]
struct SortLink {
    value: &'static str,
    label: &'static str,
}

const SORT_LINKS: [SortLink; 4] = [
    SortLink { value: "-created_at", label: "Newest" },
    SortLink { value: "title", label: "Title" },
    SortLink { value: "due_date", label: "Due date" },
    SortLink { value: "priority", label: "Priority" },
];

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> Result<Html<String>, AppError> {
    let sort = SortKey::from_param(params.sort.as_deref());
    let today = Local::now().date_naive();

    let active = repository::list_active(&state.db, user.id, sort).await?;
    let completed = repository::list_completed(&state.db, user.id).await?;

    let todos: Vec<TodoView> = active.iter().map(|t| TodoView::new(t, today)).collect();
    let completed_todos: Vec<TodoView> = completed.iter().map(|t| TodoView::new(t, today)).collect();

    let mut context = page_context(Some(&user));
    context.insert("todos", &todos);
    context.insert("completed_todos", &completed_todos);
    context.insert("current_sort", &sort.as_param());
    context.insert("sort_keys", &SORT_LINKS);
    state.templates.render("todo_list.html", &context)
}

fn render_form(
    state: &AppState,
    user: &User,
    form: &TodoForm,
    errors: &FieldErrors,
    editing: Option<i64>,
) -> Result<Html<String>, AppError> {
    let action = match editing {
        Some(id) => format!("/todos/{}/edit/", id),
        None => "/todos/create/".to_string(),
    };

    let mut context = page_context(Some(user));
    context.insert("form", form);
    context.insert("errors", &errors.for_fields(&TodoForm::FIELDS));
    context.insert("is_edit", &editing.is_some());
    context.insert("action", &action);
    context.insert("priorities", &priority_choices());
    state.templates.render("todo_form.html", &context)
}

pub async fn create_form(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Html<String>, AppError> {
    let form = TodoForm {
        priority: Priority::Medium.as_str().to_string(),
        ..Default::default()
    };
    render_form(&state, &user, &form, &FieldErrors::default(), None)
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<TodoForm>,
) -> Result<Response, AppError> {
    match repository::create(&state.db, user.id, &form).await {
        Ok(_) => Ok(found(LIST_URL)),
        Err(AppError::Validation(errors)) => {
            info!("rejected todo form from user {}", user.id);
            Ok(render_form(&state, &user, &form, &errors, None)?.into_response())
        }
        Err(e) => Err(e),
    }
}

pub async fn edit_form(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Html<String>, AppError> {
    let id = parse_id(&id)?;
    let todo = repository::find_todo(&state.db, user.id, id).await?;
    let form = TodoForm::from(&todo);
    render_form(&state, &user, &form, &FieldErrors::default(), Some(todo.id))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Form(form): Form<TodoForm>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    match repository::update(&state.db, user.id, id, &form).await {
        Ok(_) => Ok(found(LIST_URL)),
        Err(AppError::Validation(errors)) => {
            Ok(render_form(&state, &user, &form, &errors, Some(id))?.into_response())
        }
        Err(e) => Err(e),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    repository::delete(&state.db, user.id, id).await?;
    Ok(found(LIST_URL))
}

pub async fn toggle(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    repository::toggle(&state.db, user.id, id).await?;
    Ok(found(LIST_URL))
}
