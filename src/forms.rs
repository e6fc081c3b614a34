use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::{Priority, Todo, TodoFields};

pub const TITLE_MAX_LEN: u64 = 200;
pub const USERNAME_MAX_LEN: u64 = 150;
pub const PASSWORD_MIN_LEN: usize = 8;

const REQUIRED: &str = "This field is required.";

fn error(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

/// Error messages keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every named field mapped to its messages (possibly none), for template lookups.
    pub fn for_fields<'a>(&self, fields: &[&'a str]) -> BTreeMap<&'a str, Vec<String>> {
        fields
            .iter()
            .map(|&field| (field, self.0.get(field).cloned().unwrap_or_default()))
            .collect()
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = FieldErrors::default();
        for (field, errs) in errors.field_errors() {
            for err in errs.iter() {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                fields.add(&field.to_string(), message);
            }
        }
        fields
    }
}

fn required(raw: &str) -> Result<(), ValidationError> {
    if raw.trim().is_empty() {
        return Err(error("required", REQUIRED));
    }
    Ok(())
}

fn parse_due_date(raw: &str) -> Result<Option<NaiveDate>, ValidationError> {
    match raw.trim() {
        "" => Ok(None),
        raw => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| error("invalid_date", "Enter a valid date.")),
    }
}

fn parse_priority(raw: &str) -> Result<Priority, ValidationError> {
    match raw.trim() {
        "" => Err(error("required", REQUIRED)),
        raw => raw.parse().map_err(|()| {
            error(
                "invalid_choice",
                format!(
                    "Select a valid choice. {} is not one of the available choices.",
                    raw
                ),
            )
        }),
    }
}

fn valid_due_date(raw: &str) -> Result<(), ValidationError> {
    parse_due_date(raw).map(|_| ())
}

fn valid_priority(raw: &str) -> Result<(), ValidationError> {
    parse_priority(raw).map(|_| ())
}

/// Raw todo form input as posted by the browser.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TodoForm {
    #[validate(
        custom(function = "required"),
        length(max = 200, message = "Ensure this value has at most 200 characters.")
    )]
    pub title: String,
    pub description: String,
    #[validate(custom(function = "valid_due_date"))]
    pub due_date: String,
    #[validate(custom(function = "valid_priority"))]
    pub priority: String,
}

impl TodoForm {
    pub const FIELDS: [&'static str; 4] = ["title", "description", "due_date", "priority"];

    /// Checks every field before returning, so the caller sees all errors at once.
    pub fn clean(&self) -> Result<TodoFields, FieldErrors> {
        self.validate()?;

        let due_date =
            parse_due_date(&self.due_date).map_err(|e| FieldErrors::single("due_date", e.to_string()))?;
        let priority =
            parse_priority(&self.priority).map_err(|e| FieldErrors::single("priority", e.to_string()))?;
        let description = self.description.trim();

        Ok(TodoFields {
            title: self.title.trim().to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            due_date,
            priority,
        })
    }
}

impl From<&Todo> for TodoForm {
    fn from(todo: &Todo) -> Self {
        Self {
            title: todo.title.clone(),
            description: todo.description.clone().unwrap_or_default(),
            due_date: todo
                .due_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            priority: todo.priority.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub next: String,
}

fn valid_username(raw: &str) -> Result<(), ValidationError> {
    required(raw)?;
    if !raw
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
    {
        return Err(error(
            "invalid_username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        ));
    }
    Ok(())
}

fn strong_password(raw: &str) -> Result<(), ValidationError> {
    if raw.is_empty() {
        return Err(error("required", REQUIRED));
    }
    if raw.chars().count() < PASSWORD_MIN_LEN {
        return Err(error(
            "password_too_short",
            format!(
                "This password is too short. It must contain at least {} characters.",
                PASSWORD_MIN_LEN
            ),
        ));
    }
    if raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(error("password_entirely_numeric", "This password is entirely numeric."));
    }
    Ok(())
}

fn password_present(raw: &str) -> Result<(), ValidationError> {
    if raw.is_empty() {
        return Err(error("required", REQUIRED));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RegisterForm {
    #[validate(
        custom(function = "valid_username"),
        length(max = 150, message = "Ensure this value has at most 150 characters.")
    )]
    pub username: String,
    #[serde(skip_serializing)]
    #[validate(custom(function = "password_present"))]
    pub password1: String,
    #[serde(skip_serializing)]
    #[validate(
        custom(function = "strong_password"),
        must_match(other = "password1", message = "The two password fields didn't match.")
    )]
    pub password2: String,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl RegisterForm {
    pub const FIELDS: [&'static str; 3] = ["username", "password1", "password2"];

    pub fn clean(&self) -> Result<Credentials, FieldErrors> {
        self.validate()?;

        Ok(Credentials {
            username: self.username.trim().to_string(),
            password: self.password1.clone(),
        })
    }
}
