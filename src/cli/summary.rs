use super::ui;
use crate::core::account::{Account, AccountClass, LoadStatus};
use crate::core::aggregate::{self, Totals};
use crate::dashboard::Dashboard;
use anyhow::{Context, Result};
use comfy_table::Cell;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

fn class_title(class: AccountClass) -> &'static str {
    match class {
        AccountClass::Asset => "Assets",
        AccountClass::Liability => "Liabilities",
    }
}

/// Renders one class of accounts as a table followed by its total.
pub fn display_accounts(class: AccountClass, accounts: &[Account], currency: &str) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Account"),
        ui::header_cell("Category"),
        ui::header_cell("Tax Bucket"),
        ui::header_cell(&format!("Value ({currency})")),
        ui::header_cell("As Of"),
    ]);

    for account in accounts {
        let value = match (&account.load_status, account.latest()) {
            (_, Some(latest)) => ui::amount_cell(latest.amount, currency),
            (LoadStatus::Error(_), None) => ui::na_cell(true),
            (_, None) => ui::na_cell(false),
        };
        let as_of = ui::format_optional_cell(account.latest(), |p| {
            p.timestamp.format("%Y-%m-%d").to_string()
        });

        table.add_row(vec![
            Cell::new(&account.name),
            Cell::new(account.category.as_deref().unwrap_or("-")),
            Cell::new(account.tax_bucket.as_deref().unwrap_or("-")),
            value,
            as_of,
        ]);
    }

    let mut output = format!(
        "{}\n\n",
        ui::style_text(class_title(class), ui::StyleType::Title)
    );
    output.push_str(&table.to_string());

    for account in accounts {
        if let LoadStatus::Error(reason) = &account.load_status {
            let line = format!("{}: {}", account.name, reason);
            output.push_str(&format!("\n{}", ui::style_text(&line, ui::StyleType::Error)));
        }
    }

    let by_category = aggregate::totals_by_category(accounts);
    if by_category.len() > 1 {
        output.push_str(&format!("\n\n{}", display_categories(&by_category, currency)));
    }

    output.push_str(&format!(
        "\n\nTotal {} ({}): {}",
        class_title(class),
        ui::style_text(currency, ui::StyleType::TotalLabel),
        ui::style_text(
            &ui::format_amount(aggregate::total_value(accounts), currency),
            ui::StyleType::TotalValue
        )
    ));
    output
}

/// Per-category subtotals, largest absolute amount first.
pub fn display_categories(by_category: &BTreeMap<String, Decimal>, currency: &str) -> String {
    let mut rows: Vec<_> = by_category.iter().collect();
    rows.sort_by(|a, b| b.1.abs().cmp(&a.1.abs()).then_with(|| a.0.cmp(b.0)));

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Category"),
        ui::header_cell(&format!("Value ({currency})")),
    ]);
    for (category, amount) in rows {
        table.add_row(vec![Cell::new(category), ui::amount_cell(*amount, currency)]);
    }
    table.to_string()
}

pub fn display_totals(totals: &Totals, currency: &str) -> String {
    let mut output = format!(
        "Net Worth ({}): {}",
        ui::style_text(currency, ui::StyleType::TotalLabel),
        ui::style_text(
            &ui::format_amount(totals.net_worth, currency),
            ui::StyleType::TotalValue
        )
    );
    if totals.pending > 0 {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(
                &format!(
                    "{} account(s) not loaded; totals are understated",
                    totals.pending
                ),
                ui::StyleType::Subtle
            )
        ));
    }
    output
}

/// Loads every account of every class and prints the per-class tables and
/// the overall net worth.
pub async fn run(dashboard: &Dashboard, currency: &str) -> Result<()> {
    let accounts = dashboard
        .all_accounts()
        .await
        .context("Failed to fetch account lists")?;

    let pb = ui::new_progress_bar(accounts.len() as u64, true);
    pb.set_message("Loading account values...");

    let loads = accounts.iter().map(|account| {
        let pb = pb.clone();
        async move {
            let result = dashboard.loader().ensure_loaded(&account.name).await;
            pb.inc(1);
            if let Err(e) = &result {
                debug!("Value load failed for {}: {}", account.name, e);
            }
        }
    });
    join_all(loads).await;
    pb.finish_and_clear();

    for (i, class) in AccountClass::ALL.into_iter().enumerate() {
        let accounts = dashboard.store().get_by_class(class);
        println!("{}", display_accounts(class, &accounts, currency));
        if i < AccountClass::ALL.len() - 1 {
            ui::print_separator();
        }
    }

    ui::print_separator();
    println!("{}", display_totals(&dashboard.totals(), currency));
    Ok(())
}
