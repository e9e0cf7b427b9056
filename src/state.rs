use std::sync::Arc;

use anyhow::Context;

use crate::{auth::jwt::JwtKeys, config::AppConfig, users::repo::UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<UserStore>,
    pub keys: JwtKeys,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let store = UserStore::open(&config.data_file)
            .await
            .with_context(|| {
                format!(
                    "open user store; the service never creates {}, restore it before starting",
                    config.data_file.display()
                )
            })?;
        Ok(Self::from_parts(config, Arc::new(store)))
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<UserStore>) -> Self {
        let keys = JwtKeys::from_config(&config.jwt);
        Self {
            config,
            store,
            keys,
        }
    }
}
