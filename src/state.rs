use axum::extract::FromRef;

use crate::{config::Config, ranking::RecencyFormatter, store::SharedStore};

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub config: Config,
    pub recency: RecencyFormatter,
}

impl AppState {
    pub fn new(store: SharedStore, config: Config) -> Self {
        let recency = RecencyFormatter::new(config.recency_locale);
        Self {
            store,
            config,
            recency,
        }
    }
}

impl FromRef<AppState> for SharedStore {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for RecencyFormatter {
    fn from_ref(state: &AppState) -> Self {
        state.recency
    }
}
