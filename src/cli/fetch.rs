use crate::cli::ui;
use crate::core::FundSnapshot;
use crate::tracker::{BatchReport, FundTracker};
use anyhow::{Context, Result};
use comfy_table::{Cell, CellAlignment};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Serialize)]
struct FailureOutput<'a> {
    code: &'a str,
    error: String,
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    snapshots: &'a [FundSnapshot],
    failures: Vec<FailureOutput<'a>>,
}

pub fn report_json(report: &BatchReport) -> Result<String> {
    let output = ReportOutput {
        snapshots: &report.snapshots,
        failures: report
            .failures
            .iter()
            .map(|(code, e)| FailureOutput {
                code,
                error: e.to_string(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&output).context("Failed to serialize fund report")
}

/// Refreshes `codes` behind a progress bar.
pub async fn fetch_report(tracker: &FundTracker, codes: &[String]) -> BatchReport {
    let pb = ui::new_progress_bar(codes.len() as u64);
    let report = tracker
        .fetch_all_with_progress(codes, |code| {
            pb.set_message(code.to_string());
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();
    report
}

pub async fn run(tracker: &FundTracker, codes: &[String], holdings: bool, json: bool) -> Result<()> {
    if codes.is_empty() {
        println!("No fund codes given and none configured.");
        return Ok(());
    }

    let report = fetch_report(tracker, codes).await;
    if json {
        println!("{}", report_json(&report)?);
    } else {
        display_report(&report, holdings, &HashSet::new());
    }

    if report.snapshots.is_empty() {
        anyhow::bail!("No data available for any of {} fund(s)", report.failures.len());
    }
    Ok(())
}

/// Prints the report. Codes in `stale` are shown with data from an earlier
/// refresh.
pub fn display_report(report: &BatchReport, show_holdings: bool, stale: &HashSet<String>) {
    if !report.snapshots.is_empty() {
        println!("{}", snapshot_table(&report.snapshots, stale));
    }

    if show_holdings {
        for snapshot in report.snapshots.iter().filter(|s| !s.holdings.is_empty()) {
            ui::print_separator();
            println!(
                "Top holdings: {} {}",
                ui::style_text(&snapshot.name, ui::StyleType::Title),
                ui::style_text(&snapshot.code, ui::StyleType::Subtle)
            );
            println!("{}", holdings_table(snapshot));
        }
    }

    for (code, e) in &report.failures {
        let label = if stale.contains(code) {
            format!("Failed to refresh {code}, showing last known data:")
        } else {
            format!("Failed to fetch {code}:")
        };
        println!("{} {}", ui::style_text(&label, ui::StyleType::Error), e);
    }
}

fn snapshot_table(snapshots: &[FundSnapshot], stale: &HashSet<String>) -> comfy_table::Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Estimate"),
        ui::header_cell("Est. Change"),
        ui::header_cell("Est. Time"),
        ui::header_cell("NAV"),
        ui::header_cell("NAV Date"),
        ui::header_cell("NAV Change"),
    ]);

    for snapshot in snapshots {
        let mut name = snapshot.name.clone();
        if snapshot.no_valuation {
            name = format!("{name} {}", ui::style_text("(settled only)", ui::StyleType::Subtle));
        }
        if stale.contains(&snapshot.code) {
            name = format!("{name} {}", ui::style_text("(stale)", ui::StyleType::Error));
        }
        table.add_row(vec![
            Cell::new(&snapshot.code),
            Cell::new(name),
            ui::format_optional_cell(snapshot.gsz.as_deref(), str::to_string),
            ui::percent_cell(snapshot.gszzl.as_ref()),
            ui::format_optional_cell(snapshot.gztime.as_deref(), str::to_string),
            ui::format_optional_cell(snapshot.dwjz.as_deref(), str::to_string),
            ui::format_optional_cell(snapshot.jzrq.as_deref(), str::to_string),
            snapshot.zzl.map_or_else(|| ui::na_cell(false), ui::change_cell),
        ]);
    }
    table
}

fn holdings_table(snapshot: &FundSnapshot) -> comfy_table::Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Weight"),
        ui::header_cell("Change"),
    ]);
    for holding in &snapshot.holdings {
        table.add_row(vec![
            Cell::new(&holding.code),
            Cell::new(&holding.name),
            Cell::new(&holding.weight).set_alignment(CellAlignment::Right),
            holding.change.map_or_else(|| ui::na_cell(false), ui::change_cell),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FeedError, Holding, PercentChange, Settlement};
    use serde_json::Value;

    fn sample_report() -> BatchReport {
        let mut live = FundSnapshot::settled_only(
            "110022",
            "易方达消费行业".to_string(),
            Settlement {
                dwjz: Some("3.1230".into()),
                jzrq: Some("2024-01-05".into()),
                zzl: Some(-0.4),
            },
        );
        live.no_valuation = false;
        live.gsz = Some("3.1400".into());
        live.gszzl = Some(PercentChange::Number(0.54));
        live.gztime = Some("2024-01-08 15:00".into());
        live.set_holdings(vec![Holding::new(
            "600519".into(),
            "贵州茅台".into(),
            "9.87%".into(),
        )]);

        BatchReport {
            snapshots: vec![live],
            failures: vec![(
                "000001".to_string(),
                FeedError::DataUnavailable("000001".to_string()),
            )],
        }
    }

    #[test]
    fn test_report_json() {
        let json: Value = serde_json::from_str(&report_json(&sample_report()).unwrap()).unwrap();

        let snapshot = &json["snapshots"][0];
        assert_eq!(snapshot["code"], "110022");
        assert_eq!(snapshot["gszzl"], 0.54);
        assert_eq!(snapshot["noValuation"], false);
        assert_eq!(snapshot["holdings"][0]["weight"], "9.87%");
        assert_eq!(json["failures"][0]["code"], "000001");
        assert!(
            json["failures"][0]["error"]
                .as_str()
                .unwrap()
                .contains("000001")
        );
    }

    #[test]
    fn test_tables_render_every_fund() {
        let report = sample_report();
        let rendered = snapshot_table(&report.snapshots, &HashSet::new()).to_string();
        assert!(rendered.contains("110022"));
        assert!(rendered.contains("+0.54%"));
        assert!(rendered.contains("-0.40%"));

        assert!(!rendered.contains("(stale)"));
        let stale = HashSet::from(["110022".to_string()]);
        assert!(snapshot_table(&report.snapshots, &stale).to_string().contains("(stale)"));

        let holdings = holdings_table(&report.snapshots[0]).to_string();
        assert!(holdings.contains("贵州茅台"));
        assert!(holdings.contains("N/A"));
    }
}
