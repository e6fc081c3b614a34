#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use chrono::{Duration, Local};
use tower::ServiceExt;

use todos::forms::{Credentials, TodoForm};
use todos::models::{Todo, User};
use todos::{AppState, Config, db, router};

pub struct TestApp {
    pub state: AppState,
    router: Router,
}

pub async fn spawn_app() -> TestApp {
    let pool = db::in_memory().await.expect("Failed to create test db");
    let state = AppState::new(pool, Config::default()).expect("Failed to build state");
    TestApp {
        router: router(state.clone()),
        state,
    }
}

impl TestApp {
    pub async fn create_user(&self, username: &str, password: &str) -> User {
        self.state
            .auth
            .register(&Credentials {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await
            .expect("Failed to create user")
    }

    /// Session cookie for `user`, as a `Cookie` request header value.
    pub async fn session_for(&self, user: &User) -> String {
        let session = self
            .state
            .auth
            .start_session(user)
            .await
            .expect("Failed to start session");
        format!("sessionid={}", session.key)
    }

    pub async fn create_todo(&self, user: &User, title: &str, priority: &str, due_in_days: Option<i64>) -> Todo {
        let form = TodoForm {
            title: title.to_string(),
            description: format!("{} description", title),
            due_date: due_in_days.map(date_in).unwrap_or_default(),
            priority: priority.to_string(),
        };
        todos::db::repository::create(&self.state.db, user.id, &form)
            .await
            .expect("Failed to create todo")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, body: &str, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.send(request.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }
}

pub fn date_in(days: i64) -> String {
    (Local::now().date_naive() + Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("missing Location header")
        .to_str()
        .unwrap()
        .to_string()
}

/// The `name=value` part of the response's Set-Cookie header.
pub fn set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_string())
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("body is not utf-8")
}
