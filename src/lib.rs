pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod forms;
pub mod models;
pub mod state;
pub mod views;

pub use api::router;
pub use config::Config;
pub use error::AppError;
pub use state::AppState;
