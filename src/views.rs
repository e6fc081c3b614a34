use axum::response::Html;
use chrono::NaiveDate;
use serde::Serialize;
use tera::{Context, Tera};

use crate::error::AppError;
use crate::models::{Priority, Todo, User};

const TEMPLATES: [(&str, &str); 6] = [
    ("base.html", include_str!("../templates/base.html")),
    ("home.html", include_str!("../templates/home.html")),
    ("todo_list.html", include_str!("../templates/todo_list.html")),
    ("todo_form.html", include_str!("../templates/todo_form.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("register.html", include_str!("../templates/register.html")),
];

pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new() -> Result<Self, AppError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES)?;
        Ok(Self { tera })
    }

    pub fn render(&self, name: &str, context: &Context) -> Result<Html<String>, AppError> {
        Ok(Html(self.tera.render(name, context)?))
    }
}

/// Base context every page gets; `user` is always present so templates can test it.
pub fn page_context(user: Option<&User>) -> Context {
    let mut context = Context::new();
    context.insert("user", &user);
    context
}

#[derive(Debug, Serialize)]
pub struct PriorityChoice {
    pub value: &'static str,
    pub label: &'static str,
}

pub fn priority_choices() -> Vec<PriorityChoice> {
    Priority::ALL
        .iter()
        .map(|p| PriorityChoice {
            value: p.as_str(),
            label: p.label(),
        })
        .collect()
}

/// Template-facing projection of a todo, with the derived overdue flag resolved.
#[derive(Debug, Serialize)]
pub struct TodoView {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub priority: &'static str,
    pub priority_label: &'static str,
    pub is_resolved: bool,
    pub is_overdue: bool,
    pub resolved_at: Option<String>,
    pub created_at: String,
}

impl TodoView {
    pub fn new(todo: &Todo, today: NaiveDate) -> Self {
        Self {
            id: todo.id,
            title: todo.title.clone(),
            description: todo.description.clone(),
            due_date: todo.due_date.map(|d| d.format("%Y-%m-%d").to_string()),
            priority: todo.priority.as_str(),
            priority_label: todo.priority.label(),
            is_resolved: todo.is_resolved,
            is_overdue: todo.is_overdue_on(today),
            resolved_at: todo
                .resolved_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string()),
            created_at: todo.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}
