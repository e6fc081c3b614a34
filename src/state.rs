use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::{Authenticator, SqliteAuthenticator};
use crate::config::Config;
use crate::error::AppError;
use crate::views::Templates;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub auth: Arc<dyn Authenticator>,
    pub templates: Arc<Templates>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Config) -> Result<Self, AppError> {
        let auth = Arc::new(SqliteAuthenticator::new(db.clone(), config.session_ttl));

        Ok(Self {
            db,
            auth,
            templates: Arc::new(Templates::new()?),
            config: Arc::new(config),
        })
    }
}
