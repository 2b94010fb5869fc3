use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::RepositoryHost;

#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub host: Arc<dyn RepositoryHost>,
}

impl AppContext {
    pub fn new(config: AppConfig, host: Arc<dyn RepositoryHost>) -> Self {
        Self { config, host }
    }
}
