//! Entry point for views: wires the store, loader and API together.

use crate::core::account::{Account, AccountClass, NetWorthPoint};
use crate::core::aggregate::{self, Totals};
use crate::core::api::AccountApi;
use crate::core::config::{AppConfig, NetWorthSource};
use crate::core::error::{FetchError, Result};
use crate::core::loader::ValueLoader;
use crate::core::store::{AccountStore, StoreEvent};
use chrono::TimeDelta;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OnceCell, watch};
use tracing::{debug, warn};

pub struct Dashboard {
    api: Arc<dyn AccountApi>,
    store: AccountStore,
    loader: ValueLoader,
    // one initialisation cell per class so each list is fetched once
    lists: Mutex<HashMap<AccountClass, Arc<OnceCell<()>>>>,
    totals: Arc<watch::Sender<Totals>>,
    net_worth_source: NetWorthSource,
    bucket: Option<TimeDelta>,
    allow_refresh: bool,
}

impl Dashboard {
    pub fn new(api: Arc<dyn AccountApi>, config: &AppConfig) -> Self {
        let store = AccountStore::new();
        let loader = ValueLoader::new(Arc::clone(&api), store.clone());

        let totals = Arc::new(watch::channel(Totals::default()).0);
        let sender = Arc::clone(&totals);
        // Snapshot under the channel lock so a slower observer call cannot
        // publish totals older than the last mutation.
        store.subscribe(Arc::new(move |store: &AccountStore, _: &StoreEvent| {
            sender.send_modify(|totals| *totals = aggregate::totals(&store.all()));
        }));

        Self {
            api,
            store,
            loader,
            lists: Mutex::new(HashMap::new()),
            totals,
            net_worth_source: config.net_worth.source,
            bucket: config
                .net_worth
                .bucket_secs
                .and_then(|secs| i64::try_from(secs).ok())
                .map(TimeDelta::seconds),
            allow_refresh: config.allow_refresh,
        }
    }

    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    pub fn loader(&self) -> &ValueLoader {
        &self.loader
    }

    /// Accounts of one class. The list is fetched from the API on first use
    /// and served from the store afterwards. A failed fetch is retried on the
    /// next call.
    pub async fn accounts(&self, class: AccountClass) -> Result<Vec<Account>> {
        let cell = {
            let mut lists = self.lists.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(lists.entry(class).or_default())
        };

        cell.get_or_try_init(|| async {
            debug!("Fetching {} account list", class);
            let accounts = self.api.list_accounts(class).await?;
            self.store.upsert_accounts(class, accounts);
            Ok::<(), FetchError>(())
        })
        .await?;

        Ok(self.store.get_by_class(class))
    }

    /// Every account of every class, fetching lists as needed.
    pub async fn all_accounts(&self) -> Result<Vec<Account>> {
        for class in AccountClass::ALL {
            self.accounts(class).await?;
        }
        Ok(self.store.all())
    }

    /// Returns the account with its value series loaded.
    ///
    /// A name unknown to the store triggers the class list fetches first. If
    /// the series failed to load the account is still returned, carrying the
    /// `error` status.
    pub async fn select(&self, name: &str) -> Result<Account> {
        if self.store.get_by_name(name).is_none() {
            self.all_accounts().await?;
        }
        if let Err(e) = self.loader.ensure_loaded(name).await {
            if matches!(e, FetchError::NotFound(_)) && self.store.get_by_name(name).is_none() {
                return Err(e);
            }
        }
        self.store
            .get_by_name(name)
            .ok_or_else(|| FetchError::not_found(name))
    }

    /// Loads every account of a class and returns the per-account outcome.
    pub async fn load_class(&self, class: AccountClass) -> Result<Vec<(String, Result<()>)>> {
        let names: Vec<String> = self
            .accounts(class)
            .await?
            .into_iter()
            .map(|account| account.name)
            .collect();
        Ok(self.loader.ensure_loaded_all(&names).await)
    }

    pub fn refresh_enabled(&self) -> bool {
        self.allow_refresh
    }

    /// Re-fetches an account's history when refreshing is enabled. Otherwise
    /// the cached series is kept and this behaves like a plain load.
    pub async fn refresh(&self, name: &str) -> Result<()> {
        if self.allow_refresh {
            self.loader.refresh(name).await
        } else {
            debug!("Refresh disabled, using cached values for {}", name);
            self.loader.ensure_loaded(name).await
        }
    }

    /// Sum of the latest values of one class as currently held in the store.
    pub fn total_value(&self, class: AccountClass) -> Decimal {
        aggregate::total_value(&self.store.get_by_class(class))
    }

    pub fn totals(&self) -> Totals {
        *self.totals.borrow()
    }

    /// Receiver updated every time the store changes.
    pub fn watch_totals(&self) -> watch::Receiver<Totals> {
        self.totals.subscribe()
    }

    /// Net worth over time, either from the API's aggregate endpoint or
    /// derived from every account's series.
    pub async fn net_worth(&self) -> Result<Vec<NetWorthPoint>> {
        match self.net_worth_source {
            NetWorthSource::Remote => self.api.fetch_net_worth().await,
            NetWorthSource::Local => {
                let names: Vec<String> = self
                    .all_accounts()
                    .await?
                    .into_iter()
                    .map(|account| account.name)
                    .collect();
                for (name, result) in self.loader.ensure_loaded_all(&names).await {
                    if let Err(e) = result {
                        warn!(account = %name, error = %e, "Excluding account from net worth");
                    }
                }
                let accounts = self.store.all();
                Ok(match self.bucket {
                    Some(interval) => aggregate::net_worth_series_bucketed(&accounts, interval),
                    None => aggregate::net_worth_series(&accounts),
                })
            }
        }
    }
}
