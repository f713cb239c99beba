use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::protocol::Filters;
use storage::{KeyValueStore, SqliteStore};
use tracing::info;
use url::Url;

pub mod config;
pub mod error;
pub mod list;
pub mod permissions;
pub mod remote;
pub mod session;

pub use config::{load_settings, load_settings_from, ClientSettings};
pub use error::{ConfigError, SessionError};
pub use list::{
    FnFetcher, ListFetcher, ListOptions, LoadOutcome, PaginatedListController,
    PaginatedListState, DEFAULT_PAGE_LIMIT,
};
pub use permissions::{permissions_for_role, Permissions};
pub use remote::{HttpAuthApi, HttpListFetcher};
pub use session::{AuthApi, Session, SessionController, SessionPhase};

/// Wires the persisted store, the HTTP data source and the session together so list
/// views can be opened against the configured API.
pub struct AdminClient {
    settings: ClientSettings,
    store: Arc<dyn KeyValueStore>,
    http: Client,
    base_url: Url,
    session: Arc<SessionController>,
}

impl AdminClient {
    /// Opens the SQLite store named by `settings`.
    pub async fn connect(settings: ClientSettings) -> Result<Self> {
        let store = SqliteStore::new(&settings.store_url)
            .await
            .with_context(|| format!("failed to open store at {}", settings.store_url))?;
        Self::with_store(settings, Arc::new(store))
    }

    pub fn with_store(settings: ClientSettings, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        settings.validate()?;
        let base_url = settings.base_url()?;
        let http = remote::build_http_client(&settings)?;
        let auth_api = Arc::new(HttpAuthApi::new(http.clone(), base_url.clone()));
        let session = SessionController::new(store.clone(), auth_api);
        info!(api = %base_url, "admin client ready");
        Ok(Self {
            settings,
            store,
            http,
            base_url,
            session,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    /// Controller for `GET {base}/{resource}`, sized with the configured page limit.
    pub fn list<T>(&self, resource: &str, initial_filters: Filters) -> Arc<PaginatedListController<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.list_with_options(
            resource,
            ListOptions {
                initial_limit: self.settings.page_limit,
                initial_filters,
            },
        )
    }

    pub fn list_with_options<T>(
        &self,
        resource: &str,
        options: ListOptions,
    ) -> Arc<PaginatedListController<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let fetcher: Arc<dyn ListFetcher<T, Filters>> = Arc::new(HttpListFetcher::new(
            self.http.clone(),
            self.base_url.clone(),
            resource,
            self.store.clone(),
        ));
        PaginatedListController::new(fetcher, options)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
