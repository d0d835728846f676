use super::ui;
use crate::core::account::NetWorthPoint;
use crate::dashboard::Dashboard;
use anyhow::{Context, Result};
use comfy_table::Cell;

pub fn display_net_worth(points: &[NetWorthPoint], currency: &str) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell(&format!("Net Worth ({currency})")),
    ]);
    for point in points {
        table.add_row(vec![
            Cell::new(point.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            ui::amount_cell(point.amount, currency),
        ]);
    }

    let mut output = format!(
        "{}\n\n",
        ui::style_text("Net Worth", ui::StyleType::Title)
    );
    output.push_str(&table.to_string());

    let latest = points
        .last()
        .map(|p| ui::format_amount(p.amount, currency))
        .unwrap_or_else(|| "N/A".to_string());
    let style_type = if points.is_empty() {
        ui::StyleType::Error
    } else {
        ui::StyleType::TotalValue
    };
    output.push_str(&format!(
        "\n\nLatest ({}): {}",
        ui::style_text(currency, ui::StyleType::TotalLabel),
        ui::style_text(&latest, style_type)
    ));
    output
}

pub async fn run(dashboard: &Dashboard, currency: &str) -> Result<()> {
    let points = dashboard
        .net_worth()
        .await
        .context("Failed to compute net worth")?;
    println!("{}", display_net_worth(&points, currency));
    Ok(())
}
