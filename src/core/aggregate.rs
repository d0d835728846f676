//! Derived views over account data.
//!
//! Everything here is a pure function of the accounts passed in. Accounts whose
//! series has not been loaded contribute nothing, so a total computed while
//! loads are still pending understates the real figure; `Totals::pending`
//! reports how many accounts had not reached `loaded`.

use crate::core::account::{Account, AccountClass, NetWorthPoint, normalize_series};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub assets: Decimal,
    pub liabilities: Decimal,
    pub net_worth: Decimal,
    /// Accounts not in `loaded` state (unloaded, loading or failed)
    pub pending: usize,
}

/// Sum of each account's latest amount.
pub fn total_value(accounts: &[Account]) -> Decimal {
    accounts
        .iter()
        .filter_map(|account| account.latest())
        .map(|point| point.amount)
        .sum()
}

/// Net worth at every timestamp that appears in any account's series.
///
/// Between reported points an account keeps its last known amount. Accounts
/// with no point at or before a timestamp contribute nothing to it.
pub fn net_worth_series(accounts: &[Account]) -> Vec<NetWorthPoint> {
    let timestamps: BTreeSet<DateTime<Utc>> = accounts
        .iter()
        .flat_map(|account| account.values.iter().map(|point| point.timestamp))
        .collect();

    let mut cursors = vec![0usize; accounts.len()];
    let mut carried: Vec<Option<Decimal>> = vec![None; accounts.len()];

    timestamps
        .into_iter()
        .map(|timestamp| {
            for (i, account) in accounts.iter().enumerate() {
                while let Some(point) = account.values.get(cursors[i]) {
                    if point.timestamp > timestamp {
                        break;
                    }
                    carried[i] = Some(point.amount);
                    cursors[i] += 1;
                }
            }
            NetWorthPoint {
                timestamp,
                amount: carried.iter().flatten().sum(),
            }
        })
        .collect()
}

/// Like [`net_worth_series`], with timestamps first rounded to the nearest
/// multiple of `interval`. Within one bucket the last point of an account wins.
pub fn net_worth_series_bucketed(accounts: &[Account], interval: TimeDelta) -> Vec<NetWorthPoint> {
    if interval <= TimeDelta::zero() {
        return net_worth_series(accounts);
    }

    let bucketed: Vec<Account> = accounts
        .iter()
        .map(|account| {
            let rounded = account
                .values
                .iter()
                .map(|point| {
                    let mut point = *point;
                    point.timestamp = point
                        .timestamp
                        .duration_round(interval)
                        .unwrap_or(point.timestamp);
                    point
                })
                .collect();
            Account {
                values: normalize_series(rounded),
                ..account.clone()
            }
        })
        .collect();

    net_worth_series(&bucketed)
}

pub fn totals(accounts: &[Account]) -> Totals {
    let mut totals = Totals::default();
    for account in accounts {
        if !account.is_loaded() {
            totals.pending += 1;
        }
        let Some(latest) = account.latest() else {
            continue;
        };
        match account.class {
            AccountClass::Asset => totals.assets += latest.amount,
            AccountClass::Liability => totals.liabilities += latest.amount,
        }
    }
    totals.net_worth = totals.assets + totals.liabilities;
    totals
}

/// Latest values grouped by category.
pub fn totals_by_category(accounts: &[Account]) -> BTreeMap<String, Decimal> {
    let mut grouped = BTreeMap::new();
    for account in accounts {
        if let Some(latest) = account.latest() {
            let category = account
                .category
                .clone()
                .unwrap_or_else(|| UNCATEGORIZED.to_string());
            *grouped.entry(category).or_insert(Decimal::ZERO) += latest.amount;
        }
    }
    grouped
}
