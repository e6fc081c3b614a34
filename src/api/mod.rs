mod accounts;
mod todos;

use axum::response::Html;
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::AppState;
use crate::views::page_context;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/todos/", get(todos::list))
        .route("/todos/create/", get(todos::create_form).post(todos::create))
        .route("/todos/{id}/edit/", get(todos::edit_form).post(todos::update))
        .route("/todos/{id}/delete/", post(todos::delete))
        .route("/todos/{id}/toggle/", post(todos::toggle))
        .route("/todos/login/", get(accounts::login_form).post(accounts::login))
        .route("/todos/logout/", post(accounts::logout))
        .route("/todos/register/", get(accounts::register_form).post(accounts::register))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn home(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    state.templates.render("home.html", &page_context(None))
}

/// Ids come from the path as text; anything that isn't one is simply not found.
fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.parse().map_err(|_| AppError::NotFound)
}
