//! Lazy, coalesced loading of account value series
//!
//! A series is fetched at most once per session. Concurrent callers asking for
//! the same account share one in-flight request. Each request is tagged with an
//! epoch so a response that was superseded by a refresh is discarded instead of
//! overwriting newer state.

use crate::core::account::{AccountClass, LoadStatus};
use crate::core::api::AccountApi;
use crate::core::error::{FetchError, Result};
use crate::core::store::AccountStore;
use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

// `None` when the response was superseded by a refresh and discarded
type LoadFuture = Shared<BoxFuture<'static, Option<Result<()>>>>;

struct InFlight {
    epoch: u64,
    future: LoadFuture,
}

#[derive(Default)]
struct LoaderState {
    in_flight: HashMap<String, InFlight>,
    epochs: HashMap<String, u64>,
}

struct LoaderInner {
    api: Arc<dyn AccountApi>,
    store: AccountStore,
    // Guards every load-status transition; store writes made by the loader
    // happen while it is held.
    state: Mutex<LoaderState>,
}

impl LoaderInner {
    fn state(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct ValueLoader {
    inner: Arc<LoaderInner>,
}

impl ValueLoader {
    pub fn new(api: Arc<dyn AccountApi>, store: AccountStore) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                api,
                store,
                state: Mutex::new(LoaderState::default()),
            }),
        }
    }

    pub fn store(&self) -> &AccountStore {
        &self.inner.store
    }

    /// Resolves once the account's series is loaded or its load has failed.
    ///
    /// Loaded accounts return immediately without a network call. An account
    /// in `error` is fetched again.
    pub async fn ensure_loaded(&self, name: &str) -> Result<()> {
        loop {
            let future = {
                let mut state = self.inner.state();
                let account = self
                    .inner
                    .store
                    .get_by_name(name)
                    .ok_or_else(|| FetchError::not_found(name))?;

                if account.load_status == LoadStatus::Loaded {
                    debug!("Cache hit for account values: {}", name);
                    return Ok(());
                }

                match state.in_flight.get(name) {
                    Some(in_flight) => {
                        debug!("Joining in-flight request for account: {}", name);
                        in_flight.future.clone()
                    }
                    None => {
                        debug!("Cache miss for account values: {}", name);
                        self.start(&mut state, name, account.class)
                    }
                }
            };

            match future.await {
                Some(result) => return result,
                None => debug!("Request for {} was superseded, waiting for the current one", name),
            }
        }
    }

    /// Loads every listed account in parallel. Each account settles on its
    /// own; one failure does not hold back the others.
    pub async fn ensure_loaded_all<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Vec<(String, Result<()>)> {
        let futures = names.iter().map(|name| {
            let name = name.as_ref().to_string();
            async move {
                let result = self.ensure_loaded(&name).await;
                (name, result)
            }
        });
        join_all(futures).await
    }

    /// Discards the cached series and any in-flight request, then loads again.
    pub async fn refresh(&self, name: &str) -> Result<()> {
        let future = {
            let mut state = self.inner.state();
            let account = self
                .inner
                .store
                .get_by_name(name)
                .ok_or_else(|| FetchError::not_found(name))?;
            *state.epochs.entry(name.to_string()).or_default() += 1;
            if state.in_flight.remove(name).is_some() {
                debug!("Superseding in-flight request for account: {}", name);
            }
            self.inner.store.invalidate(name);
            self.start(&mut state, name, account.class)
        };

        match future.await {
            Some(result) => result,
            None => self.ensure_loaded(name).await,
        }
    }

    /// Registers a request for the current epoch and marks the account
    /// loading. Must be called with the state lock held.
    fn start(&self, state: &mut LoaderState, name: &str, class: AccountClass) -> LoadFuture {
        let epoch = *state.epochs.entry(name.to_string()).or_default();
        let future = Self::fetch(Arc::clone(&self.inner), class, name.to_string(), epoch)
            .boxed()
            .shared();
        state.in_flight.insert(
            name.to_string(),
            InFlight {
                epoch,
                future: future.clone(),
            },
        );
        self.inner.store.set_status(name, LoadStatus::Loading);
        future
    }

    async fn fetch(
        inner: Arc<LoaderInner>,
        class: AccountClass,
        name: String,
        epoch: u64,
    ) -> Option<Result<()>> {
        let result = inner.api.fetch_values(class, &name).await;

        let mut state = inner.state();
        let current = state.epochs.get(&name).copied().unwrap_or_default();
        if current != epoch {
            debug!(
                "Discarding superseded response for account {} (epoch {} < {})",
                name, epoch, current
            );
            return None;
        }

        let outcome = match result {
            Ok(values) => {
                inner.store.set_values(&name, values);
                Ok(())
            }
            Err(e) => {
                warn!(account = %name, error = %e, "Failed to load account values");
                inner
                    .store
                    .set_status(&name, LoadStatus::Error(e.to_string()));
                Err(e)
            }
        };
        // the entry goes only once the store reflects the outcome
        if state
            .in_flight
            .get(&name)
            .is_some_and(|in_flight| in_flight.epoch == epoch)
        {
            state.in_flight.remove(&name);
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::account::{Account, NetWorthPoint, ValuePoint};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct MockApi {
        calls: AtomicUsize,
        // call N waits on gates[N] when present
        gates: Vec<Arc<Notify>>,
    }

    impl MockApi {
        fn new() -> Self {
            Self::gated(Vec::new())
        }

        fn gated(gates: Vec<Arc<Notify>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gates,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AccountApi for MockApi {
        async fn list_accounts(&self, _class: AccountClass) -> Result<Vec<Account>> {
            Ok(Vec::new())
        }

        async fn fetch_values(&self, _class: AccountClass, name: &str) -> Result<Vec<ValuePoint>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = self.gates.get(call) {
                gate.notified().await;
            }
            match name {
                "Broken" => Err(FetchError::network("connection refused")),
                _ => Ok(vec![ValuePoint::new(
                    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                    dec!(100) + rust_decimal::Decimal::from(call),
                )]),
            }
        }

        async fn fetch_net_worth(&self) -> Result<Vec<NetWorthPoint>> {
            Ok(Vec::new())
        }
    }

    fn setup(api: Arc<MockApi>) -> ValueLoader {
        let store = AccountStore::new();
        store.upsert_accounts(
            AccountClass::Asset,
            vec![
                Account::new("Checking", AccountClass::Asset),
                Account::new("Savings", AccountClass::Asset),
                Account::new("Broken", AccountClass::Asset),
            ],
        );
        ValueLoader::new(api, store)
    }

    #[tokio::test]
    async fn test_ensure_loaded_is_idempotent() {
        let api = Arc::new(MockApi::new());
        let loader = setup(Arc::clone(&api));

        loader.ensure_loaded("Checking").await.unwrap();
        loader.ensure_loaded("Checking").await.unwrap();

        assert_eq!(api.calls(), 1);
        let account = loader.store().get_by_name("Checking").unwrap();
        assert_eq!(account.load_status, LoadStatus::Loaded);
        assert_eq!(account.values.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_coalesced() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(MockApi::gated(vec![Arc::clone(&gate)]));
        let loader = setup(Arc::clone(&api));

        let first = tokio::spawn({
            let loader = loader.clone();
            async move { loader.ensure_loaded("Checking").await }
        });
        let second = tokio::spawn({
            let loader = loader.clone();
            async move { loader.ensure_loaded("Checking").await }
        });

        // Let both callers register before the response arrives
        while api.calls() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;
        assert_eq!(
            loader.store().get_by_name("Checking").unwrap().load_status,
            LoadStatus::Loading
        );
        gate.notify_one();

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert_eq!(api.calls(), 1);
        assert_eq!(
            loader.store().get_by_name("Checking").unwrap().values[0].amount,
            dec!(100)
        );
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_fetched() {
        let api = Arc::new(MockApi::new());
        let loader = setup(Arc::clone(&api));

        let err = loader.ensure_loaded("Nope").await.unwrap_err();

        assert_eq!(err, FetchError::not_found("Nope"));
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_error_is_isolated_to_failed_account() {
        let api = Arc::new(MockApi::new());
        let loader = setup(Arc::clone(&api));
        loader.ensure_loaded("Checking").await.unwrap();
        let checking_before = loader.store().get_by_name("Checking").unwrap();

        let results = loader.ensure_loaded_all(&["Broken", "Savings"]).await;

        assert!(matches!(results[0], (ref n, Err(FetchError::Network(_))) if n == "Broken"));
        assert!(results[1].1.is_ok());

        let broken = loader.store().get_by_name("Broken").unwrap();
        assert!(matches!(broken.load_status, LoadStatus::Error(_)));
        assert!(broken.values.is_empty());
        assert_eq!(
            loader.store().get_by_name("Savings").unwrap().load_status,
            LoadStatus::Loaded
        );
        assert_eq!(loader.store().get_by_name("Checking").unwrap(), checking_before);
    }

    #[tokio::test]
    async fn test_failed_account_can_be_retried() {
        let api = Arc::new(MockApi::new());
        let loader = setup(Arc::clone(&api));

        assert!(loader.ensure_loaded("Broken").await.is_err());
        assert!(loader.ensure_loaded("Broken").await.is_err());

        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_refetches_loaded_account() {
        let api = Arc::new(MockApi::new());
        let loader = setup(Arc::clone(&api));
        loader.ensure_loaded("Checking").await.unwrap();

        loader.refresh("Checking").await.unwrap();

        assert_eq!(api.calls(), 2);
        let account = loader.store().get_by_name("Checking").unwrap();
        assert_eq!(account.values[0].amount, dec!(101));
    }

    async fn start_stale_and_fresh(
        loader: &ValueLoader,
        api: &MockApi,
    ) -> (
        tokio::task::JoinHandle<Result<()>>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let stale = tokio::spawn({
            let loader = loader.clone();
            async move { loader.ensure_loaded("Checking").await }
        });
        while api.calls() == 0 {
            tokio::task::yield_now().await;
        }

        let fresh = tokio::spawn({
            let loader = loader.clone();
            async move { loader.refresh("Checking").await }
        });
        while api.calls() < 2 {
            tokio::task::yield_now().await;
        }
        (stale, fresh)
    }

    #[tokio::test]
    async fn test_superseded_response_is_discarded() {
        let stale_gate = Arc::new(Notify::new());
        let fresh_gate = Arc::new(Notify::new());
        let api = Arc::new(MockApi::gated(vec![
            Arc::clone(&stale_gate),
            Arc::clone(&fresh_gate),
        ]));
        let loader = setup(Arc::clone(&api));
        let (stale, fresh) = start_stale_and_fresh(&loader, &api).await;

        // Complete the fresh request first, then the stale one
        fresh_gate.notify_one();
        fresh.await.unwrap().unwrap();
        stale_gate.notify_one();
        stale.await.unwrap().unwrap();

        let account = loader.store().get_by_name("Checking").unwrap();
        assert_eq!(account.load_status, LoadStatus::Loaded);
        assert_eq!(account.values.len(), 1);
        assert_eq!(account.values[0].amount, dec!(101));
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_superseded_caller_waits_for_current_request() {
        let stale_gate = Arc::new(Notify::new());
        let fresh_gate = Arc::new(Notify::new());
        let api = Arc::new(MockApi::gated(vec![
            Arc::clone(&stale_gate),
            Arc::clone(&fresh_gate),
        ]));
        let loader = setup(Arc::clone(&api));
        let (stale, fresh) = start_stale_and_fresh(&loader, &api).await;

        // The stale response arrives while the fresh one is still pending
        stale_gate.notify_one();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!stale.is_finished());
        assert_eq!(
            loader.store().get_by_name("Checking").unwrap().load_status,
            LoadStatus::Loading
        );

        fresh_gate.notify_one();
        stale.await.unwrap().unwrap();
        fresh.await.unwrap().unwrap();

        let account = loader.store().get_by_name("Checking").unwrap();
        assert!(account.load_status.is_settled());
        assert_eq!(account.values[0].amount, dec!(101));
        assert_eq!(api.calls(), 2);
    }

    #[tokio::test]
    async fn test_hung_account_does_not_block_others() {
        // the first request never gets a response
        let api = Arc::new(MockApi::gated(vec![Arc::new(Notify::new())]));
        let loader = setup(Arc::clone(&api));

        let hung = tokio::spawn({
            let loader = loader.clone();
            async move { loader.ensure_loaded("Checking").await }
        });
        while api.calls() == 0 {
            tokio::task::yield_now().await;
        }

        tokio::time::timeout(Duration::from_secs(5), loader.ensure_loaded("Savings"))
            .await
            .expect("Savings load should not wait on Checking")
            .unwrap();

        assert_eq!(
            loader.store().get_by_name("Savings").unwrap().load_status,
            LoadStatus::Loaded
        );
        assert_eq!(
            loader.store().get_by_name("Checking").unwrap().load_status,
            LoadStatus::Loading
        );
        assert!(!hung.is_finished());
        hung.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_loads_fetch_once_across_threads() {
        for _ in 0..200 {
            let api = Arc::new(MockApi::new());
            let loader = setup(Arc::clone(&api));

            let tasks: Vec<_> = (0..8)
                .map(|_| {
                    let loader = loader.clone();
                    tokio::spawn(async move { loader.ensure_loaded("Checking").await })
                })
                .collect();
            for task in tasks {
                task.await.unwrap().unwrap();
            }

            assert_eq!(api.calls(), 1);
            let account = loader.store().get_by_name("Checking").unwrap();
            assert_eq!(account.load_status, LoadStatus::Loaded);
            assert_eq!(account.values.len(), 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_every_caller_sees_settled_status_across_threads() {
        for _ in 0..100 {
            let api = Arc::new(MockApi::new());
            let loader = setup(Arc::clone(&api));

            let tasks: Vec<_> = ["Checking", "Savings", "Broken", "Checking", "Savings"]
                .into_iter()
                .map(|name| {
                    let loader = loader.clone();
                    tokio::spawn(async move {
                        let _ = loader.ensure_loaded(name).await;
                        loader.store().get_by_name(name).unwrap().load_status
                    })
                })
                .collect();
            for task in tasks {
                assert!(task.await.unwrap().is_settled());
            }
        }
    }
}
