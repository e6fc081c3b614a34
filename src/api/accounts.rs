use axum::Form;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, header};
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use tracing::info;

use crate::auth::{self, CurrentUser, Session};
use crate::error::{AppError, LOGIN_URL, found};
use crate::forms::{FieldErrors, LoginForm, RegisterForm};
use crate::state::AppState;
use crate::views::page_context;

const LOGIN_REDIRECT_URL: &str = "/todos/";
const INVALID_LOGIN: &str = "Invalid username or password";

#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    #[serde(default)]
    next: String,
}

fn render_login(
    state: &AppState,
    username: &str,
    next: &str,
    error: Option<&str>,
) -> Result<Html<String>, AppError> {
    let mut context = page_context(None);
    context.insert("username", username);
    context.insert("next", next);
    context.insert("error", &error);
    state.templates.render("login.html", &context)
}

fn render_register(
    state: &AppState,
    form: &RegisterForm,
    errors: &FieldErrors,
) -> Result<Html<String>, AppError> {
    let mut context = page_context(None);
    context.insert("form", form);
    context.insert("errors", &errors.for_fields(&RegisterForm::FIELDS));
    state.templates.render("register.html", &context)
}

/// 302 to `location` carrying the new session cookie.
fn logged_in(state: &AppState, session: &Session, location: &str) -> Response {
    let cookie = auth::session_cookie(session, state.config.session_ttl, state.config.secure_cookies);
    ([(header::SET_COOKIE, cookie)], found(location)).into_response()
}

pub async fn login_form(
    State(state): State<AppState>,
    Query(params): Query<LoginParams>,
) -> Result<Html<String>, AppError> {
    render_login(&state, "", &params.next, None)
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let username = form.username.trim();
    let authenticated = if username.is_empty() || form.password.is_empty() {
        Err(AppError::InvalidCredentials)
    } else {
        state.auth.authenticate(username, &form.password).await
    };

    match authenticated {
        Ok(user) => {
            let session = state.auth.start_session(&user).await?;
            let target = auth::safe_next(&form.next).unwrap_or(LOGIN_REDIRECT_URL);
            Ok(logged_in(&state, &session, target))
        }
        // Same page and message whether or not the username exists.
        Err(AppError::InvalidCredentials) => {
            Ok(render_login(&state, username, &form.next, Some(INVALID_LOGIN))?.into_response())
        }
        Err(e) => Err(e),
    }
}

pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(key) = auth::session_key(&headers) {
        state.auth.end_session(&key).await?;
    }
    info!("user {} logged out", user.id);

    Ok(([(header::SET_COOKIE, auth::removal_cookie())], found(LOGIN_URL)).into_response())
}

pub async fn register_form(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    render_register(&state, &RegisterForm::default(), &FieldErrors::default())
}

pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    let registered = match form.clean() {
        Ok(credentials) => state.auth.register(&credentials).await,
        Err(errors) => Err(AppError::Validation(errors)),
    };

    match registered {
        Ok(user) => {
            let session = state.auth.start_session(&user).await?;
            Ok(logged_in(&state, &session, LOGIN_REDIRECT_URL))
        }
        Err(AppError::Validation(errors)) => {
            Ok(render_register(&state, &form, &errors)?.into_response())
        }
        Err(e) => Err(e),
    }
}
