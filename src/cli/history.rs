use super::ui;
use crate::core::account::{Account, LoadStatus};
use crate::dashboard::Dashboard;
use anyhow::{Result, bail};
use comfy_table::Cell;
use tracing::warn;

/// Renders an account's value history, newest first, with the change from the
/// previous observation.
pub fn display_history(account: &Account, currency: &str) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell(&format!("Value ({currency})")),
        ui::header_cell("Change"),
    ]);

    let mut previous = None;
    let mut rows = Vec::with_capacity(account.values.len());
    for point in &account.values {
        let change = previous.map(|prev| point.amount - prev);
        rows.push(vec![
            Cell::new(point.timestamp.format("%Y-%m-%d %H:%M").to_string()),
            ui::amount_cell(point.amount, currency),
            change.map_or_else(|| ui::na_cell(false), ui::change_cell),
        ]);
        previous = Some(point.amount);
    }
    for row in rows.into_iter().rev() {
        table.add_row(row);
    }

    let mut output = format!(
        "{} ({})\n\n",
        ui::style_text(&account.name, ui::StyleType::Title),
        account.class
    );
    output.push_str(&table.to_string());
    if let Some(latest) = account.latest() {
        output.push_str(&format!(
            "\n\nCurrent Value ({}): {}",
            ui::style_text(currency, ui::StyleType::TotalLabel),
            ui::style_text(
                &ui::format_amount(latest.amount, currency),
                ui::StyleType::TotalValue
            )
        ));
    }
    output
}

pub async fn run(dashboard: &Dashboard, name: &str, refresh: bool, currency: &str) -> Result<()> {
    let mut account = dashboard.select(name).await?;
    if refresh {
        if !dashboard.refresh_enabled() {
            warn!("Ignoring --refresh for {name}: allow_refresh is disabled in the config");
        } else if let Err(e) = dashboard.refresh(name).await {
            warn!(account = %name, error = %e, "Failed to refresh account history");
        }
        if let Some(updated) = dashboard.store().get_by_name(name) {
            account = updated;
        }
    }

    if let LoadStatus::Error(reason) = &account.load_status {
        bail!("Failed to load history for {name}: {reason}");
    }
    println!("{}", display_history(&account, currency));
    Ok(())
}
