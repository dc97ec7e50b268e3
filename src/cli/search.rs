use crate::cli::ui;
use crate::providers::search::SearchHit;
use crate::tracker::FundTracker;
use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

fn hits_table(hits: &[SearchHit]) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Short Name"),
    ]);
    for hit in hits {
        table.add_row(vec![
            Cell::new(hit.code.as_deref().unwrap_or_default()),
            Cell::new(hit.display_name().unwrap_or_default()),
            Cell::new(hit.short_name.as_deref().unwrap_or_default()),
        ]);
    }
    table
}

pub async fn run(tracker: &FundTracker, query: &str, json: bool) -> Result<()> {
    let hits = tracker
        .search()
        .search_funds(query)
        .await
        .with_context(|| format!("Fund search for '{query}' failed"))?;

    if json {
        let output = serde_json::to_string_pretty(&hits).context("Failed to serialize search hits")?;
        println!("{output}");
    } else if hits.is_empty() {
        println!("No funds match '{}'.", query.trim());
    } else {
        println!("{}", hits_table(&hits));
    }
    Ok(())
}
