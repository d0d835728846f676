//! Core account cache and aggregation

pub mod account;
pub mod aggregate;
pub mod api;
pub mod config;
pub mod error;
pub mod loader;
pub mod log;
pub mod store;

// Re-export main types for cleaner imports
pub use account::{Account, AccountClass, LoadStatus, NetWorthPoint, ValuePoint};
pub use api::AccountApi;
pub use error::FetchError;
pub use loader::ValueLoader;
pub use store::{AccountStore, StoreEvent, StoreObserver};
