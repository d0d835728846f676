//! Process-wide registry of known accounts
//!
//! The store is the only place account records are mutated. Every mutation
//! notifies subscribed observers synchronously, after the mutation is complete
//! and the registry lock has been released, so observers may read the store
//! from their callback.

use crate::core::account::{Account, AccountClass, LoadStatus, ValuePoint, normalize_series};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

pub type SubscriptionId = u64;

/// Describes a completed store mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    AccountsUpserted {
        class: AccountClass,
        names: Vec<String>,
    },
    ValuesSet {
        name: String,
    },
    StatusChanged {
        name: String,
        status: LoadStatus,
    },
    Invalidated {
        name: String,
    },
}

pub trait StoreObserver: Send + Sync {
    fn on_change(&self, store: &AccountStore, event: &StoreEvent);
}

impl<F> StoreObserver for F
where
    F: Fn(&AccountStore, &StoreEvent) + Send + Sync,
{
    fn on_change(&self, store: &AccountStore, event: &StoreEvent) {
        self(store, event)
    }
}

#[derive(Default)]
struct Registry {
    accounts: HashMap<String, Account>,
    // insertion order of names
    order: Vec<String>,
}

#[derive(Default)]
struct StoreInner {
    registry: RwLock<Registry>,
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn StoreObserver>)>>,
    next_subscription: AtomicU64,
}

/// Shared handle to the account registry. Clones refer to the same store.
#[derive(Clone, Default)]
pub struct AccountStore {
    inner: Arc<StoreInner>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Merges a freshly fetched account list into the registry.
    ///
    /// Unknown names are appended in the order given. Known names only have
    /// their metadata refreshed; class, loaded values and load status are kept.
    pub fn upsert_accounts(&self, class: AccountClass, accounts: Vec<Account>) {
        let mut names = Vec::with_capacity(accounts.len());
        {
            let mut registry = self.write();
            for incoming in accounts {
                names.push(incoming.name.clone());
                match registry.accounts.get_mut(&incoming.name) {
                    Some(existing) => {
                        debug!("Refreshing metadata for account: {}", incoming.name);
                        // loaded values carry the sign of the original class
                        if existing.class != class {
                            warn!(
                                account = %incoming.name,
                                registered = %existing.class,
                                listed = %class,
                                "Account listed under a second class; keeping the first"
                            );
                        }
                        existing.category = incoming.category;
                        existing.tax_bucket = incoming.tax_bucket;
                    }
                    None => {
                        debug!("Registering account: {}", incoming.name);
                        let account = Account {
                            class,
                            values: Vec::new(),
                            load_status: LoadStatus::Unloaded,
                            ..incoming
                        };
                        registry.order.push(account.name.clone());
                        registry.accounts.insert(account.name.clone(), account);
                    }
                }
            }
        }
        self.notify(StoreEvent::AccountsUpserted { class, names });
    }

    pub fn get_by_name(&self, name: &str) -> Option<Account> {
        self.read().accounts.get(name).cloned()
    }

    /// Accounts of one class in insertion order.
    pub fn get_by_class(&self, class: AccountClass) -> Vec<Account> {
        let registry = self.read();
        registry
            .order
            .iter()
            .filter_map(|name| registry.accounts.get(name))
            .filter(|account| account.class == class)
            .cloned()
            .collect()
    }

    /// Every known account in insertion order.
    pub fn all(&self) -> Vec<Account> {
        let registry = self.read();
        registry
            .order
            .iter()
            .filter_map(|name| registry.accounts.get(name))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores a fetched series and marks the account loaded. Unknown names are
    /// ignored.
    pub fn set_values(&self, name: &str, values: Vec<ValuePoint>) {
        {
            let mut registry = self.write();
            let Some(account) = registry.accounts.get_mut(name) else {
                debug!("Dropping values for unknown account: {}", name);
                return;
            };
            account.values = normalize_series(values);
            account.load_status = LoadStatus::Loaded;
            debug!(
                "Stored {} value points for account: {}",
                account.values.len(),
                name
            );
        }
        self.notify(StoreEvent::ValuesSet {
            name: name.to_string(),
        });
    }

    pub fn set_status(&self, name: &str, status: LoadStatus) {
        {
            let mut registry = self.write();
            let Some(account) = registry.accounts.get_mut(name) else {
                debug!("Dropping status for unknown account: {}", name);
                return;
            };
            if matches!(status, LoadStatus::Unloaded | LoadStatus::Loading) {
                account.values.clear();
            }
            account.load_status = status.clone();
        }
        self.notify(StoreEvent::StatusChanged {
            name: name.to_string(),
            status,
        });
    }

    /// Drops a loaded series so the account can be fetched again.
    pub fn invalidate(&self, name: &str) {
        {
            let mut registry = self.write();
            let Some(account) = registry.accounts.get_mut(name) else {
                return;
            };
            account.values.clear();
            account.load_status = LoadStatus::Unloaded;
        }
        self.notify(StoreEvent::Invalidated {
            name: name.to_string(),
        });
    }

    pub fn subscribe(&self, observer: Arc<dyn StoreObserver>) -> SubscriptionId {
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self
            .inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    fn notify(&self, event: StoreEvent) {
        let observers: Vec<Arc<dyn StoreObserver>> = self
            .inner
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer.on_change(self, &event);
        }
    }
}
