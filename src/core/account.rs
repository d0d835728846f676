//! Account records and their value series

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountClass {
    Asset,
    Liability,
}

impl AccountClass {
    pub const ALL: [AccountClass; 2] = [AccountClass::Asset, AccountClass::Liability];

    /// Path segment used by the remote API.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountClass::Asset => "asset",
            AccountClass::Liability => "liability",
        }
    }
}

impl Display for AccountClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccountClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asset" => Ok(AccountClass::Asset),
            "liability" => Ok(AccountClass::Liability),
            _ => Err(anyhow::anyhow!("Invalid account class: {}", s)),
        }
    }
}

/// Where an account is in its value-series lifecycle.
///
/// `Unloaded -> Loading -> Loaded | Error`, with `Error -> Loading` on a
/// manual retry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Error(String),
}

impl LoadStatus {
    /// True once a load attempt has finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        matches!(self, LoadStatus::Loaded | LoadStatus::Error(_))
    }
}

impl Display for LoadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStatus::Unloaded => write!(f, "unloaded"),
            LoadStatus::Loading => write!(f, "loading"),
            LoadStatus::Loaded => write!(f, "loaded"),
            LoadStatus::Error(_) => write!(f, "error"),
        }
    }
}

/// A single observation of an account's value.
///
/// Liability amounts are negative: they are stored as their contribution to
/// net worth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub timestamp: DateTime<Utc>,
    pub amount: Decimal,
}

impl ValuePoint {
    pub fn new(timestamp: DateTime<Utc>, amount: Decimal) -> Self {
        Self { timestamp, amount }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetWorthPoint {
    pub timestamp: DateTime<Utc>,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub name: String,
    pub class: AccountClass,
    pub category: Option<String>,
    pub tax_bucket: Option<String>,
    pub values: Vec<ValuePoint>,
    pub load_status: LoadStatus,
}

impl Account {
    /// Metadata-only account as it arrives from a list fetch.
    pub fn new(name: impl Into<String>, class: AccountClass) -> Self {
        Self {
            name: name.into(),
            class,
            category: None,
            tax_bucket: None,
            values: Vec::new(),
            load_status: LoadStatus::Unloaded,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tax_bucket(mut self, tax_bucket: impl Into<String>) -> Self {
        self.tax_bucket = Some(tax_bucket.into());
        self
    }

    /// Most recent value point, if the series has been loaded.
    pub fn latest(&self) -> Option<&ValuePoint> {
        self.values.last()
    }

    pub fn is_loaded(&self) -> bool {
        self.load_status == LoadStatus::Loaded
    }
}

/// Sorts points ascending by timestamp and keeps the last point reported for
/// any duplicated timestamp.
pub fn normalize_series(mut values: Vec<ValuePoint>) -> Vec<ValuePoint> {
    values.sort_by_key(|point| point.timestamp);
    let mut normalized: Vec<ValuePoint> = Vec::with_capacity(values.len());
    for point in values {
        match normalized.last_mut() {
            Some(last) if last.timestamp == point.timestamp => *last = point,
            _ => normalized.push(point),
        }
    }
    normalized
}
