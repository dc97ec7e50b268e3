use crate::cli::{fetch, ui};
use crate::core::FundSnapshot;
use crate::tracker::{BatchReport, FundTracker};
use anyhow::Result;
use chrono::Local;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};

/// Heading line for one refresh cycle.
pub fn cycle_heading(cycle: u64, trading_date: Option<&str>, refreshed_at: &str) -> String {
    let trading = trading_date.map_or_else(
        || "trading date unknown".to_string(),
        |date| format!("trading date {date}"),
    );
    format!("Refresh #{cycle} at {refreshed_at} ({trading})")
}

/// Latest successful snapshot of every watched fund.
#[derive(Debug, Default)]
pub struct LastKnown {
    snapshots: HashMap<String, FundSnapshot>,
}

impl LastKnown {
    /// Records the fresh snapshots in `report` and puts the last known
    /// snapshot of each failed code back in its requested position.
    ///
    /// Returns the codes whose rows are carried over from an earlier cycle.
    pub fn merge(&mut self, codes: &[String], report: &mut BatchReport) -> HashSet<String> {
        for snapshot in &report.snapshots {
            self.snapshots.insert(snapshot.code.clone(), snapshot.clone());
        }

        let stale: HashSet<String> = report
            .failures
            .iter()
            .filter(|(code, _)| self.snapshots.contains_key(code))
            .map(|(code, _)| code.clone())
            .collect();
        if stale.is_empty() {
            return stale;
        }

        let mut fresh: HashMap<String, FundSnapshot> = report
            .snapshots
            .drain(..)
            .map(|snapshot| (snapshot.code.clone(), snapshot))
            .collect();
        let mut seen = HashSet::new();
        for code in codes.iter().filter(|c| seen.insert(c.as_str())) {
            let snapshot = match fresh.remove(code) {
                Some(snapshot) => Some(snapshot),
                None if stale.contains(code) => self.snapshots.get(code).cloned(),
                None => None,
            };
            report.snapshots.extend(snapshot);
        }
        report.snapshots.extend(fresh.into_values());
        stale
    }
}

/// Runs one refresh cycle and prints its results.
pub async fn refresh(
    tracker: &FundTracker,
    codes: &[String],
    holdings: bool,
    cycle: u64,
    last_known: &mut LastKnown,
) {
    let trading_date = tracker.quotes().latest_trading_date().await;
    let mut report = fetch::fetch_report(tracker, codes).await;
    let stale = last_known.merge(codes, &mut report);

    println!(
        "{}",
        ui::style_text(
            &cycle_heading(
                cycle,
                trading_date.as_deref(),
                &Local::now().format("%H:%M:%S").to_string()
            ),
            ui::StyleType::Label
        )
    );
    fetch::display_report(&report, holdings, &stale);
    debug!(
        cycle,
        fetched = report.snapshots.len() - stale.len(),
        stale = stale.len(),
        failed = report.failures.len(),
        "Refresh cycle done"
    );
}

/// Refreshes `codes` every `interval` until interrupted.
///
/// Each cycle starts only after the previous one has finished.
pub async fn run(
    tracker: &FundTracker,
    codes: &[String],
    holdings: bool,
    interval: Duration,
) -> Result<()> {
    if codes.is_empty() {
        println!("No fund codes given and none configured.");
        return Ok(());
    }

    info!(funds = codes.len(), interval_secs = interval.as_secs(), "Watching funds");
    let mut last_known = LastKnown::default();
    let mut cycle = 1;
    loop {
        refresh(tracker, codes, holdings, cycle, &mut last_known).await;
        ui::print_separator();
        println!(
            "{}",
            ui::style_text(
                &format!("Next refresh in {}s, Ctrl-C to stop", interval.as_secs()),
                ui::StyleType::Subtle
            )
        );

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch");
                return Ok(());
            }
            _ = tokio::time::sleep(interval) => {}
        }
        cycle += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FeedError, Settlement};

    fn snapshot(code: &str, dwjz: &str) -> FundSnapshot {
        FundSnapshot::settled_only(
            code,
            format!("fund {code}"),
            Settlement {
                dwjz: Some(dwjz.to_string()),
                jzrq: Some("2024-01-08".into()),
                zzl: None,
            },
        )
    }

    fn failure(code: &str) -> (String, FeedError) {
        (code.to_string(), FeedError::DataUnavailable(code.to_string()))
    }

    fn codes_of(report: &BatchReport) -> Vec<&str> {
        report.snapshots.iter().map(|s| s.code.as_str()).collect()
    }

    #[test]
    fn test_failed_fund_keeps_last_snapshot() {
        let codes: Vec<String> = ["110022", "000001", "161725"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let mut last_known = LastKnown::default();

        let mut first = BatchReport {
            snapshots: vec![snapshot("110022", "3.1230"), snapshot("000001", "1.0900")],
            failures: vec![failure("161725")],
        };
        assert!(last_known.merge(&codes, &mut first).is_empty());
        assert_eq!(codes_of(&first), vec!["110022", "000001"]);

        let mut second = BatchReport {
            snapshots: vec![snapshot("000001", "1.0910")],
            failures: vec![failure("110022"), failure("161725")],
        };
        let stale = last_known.merge(&codes, &mut second);

        assert_eq!(stale, HashSet::from(["110022".to_string()]));
        assert_eq!(codes_of(&second), vec!["110022", "000001"]);
        assert_eq!(second.snapshots[0].dwjz.as_deref(), Some("3.1230"));
        assert_eq!(second.snapshots[1].dwjz.as_deref(), Some("1.0910"));
        assert_eq!(second.failures.len(), 2);

        let mut third = BatchReport {
            snapshots: vec![snapshot("110022", "3.1400")],
            failures: vec![failure("000001"), failure("161725")],
        };
        let stale = last_known.merge(&codes, &mut third);

        assert_eq!(stale, HashSet::from(["000001".to_string()]));
        assert_eq!(codes_of(&third), vec!["110022", "000001"]);
        assert_eq!(third.snapshots[0].dwjz.as_deref(), Some("3.1400"));
        assert_eq!(third.snapshots[1].dwjz.as_deref(), Some("1.0910"));
    }

    #[test]
    fn test_cycle_heading() {
        assert_eq!(
            cycle_heading(3, Some("20240108"), "14:30:00"),
            "Refresh #3 at 14:30:00 (trading date 20240108)"
        );
        assert_eq!(
            cycle_heading(1, None, "09:00:00"),
            "Refresh #1 at 09:00:00 (trading date unknown)"
        );
    }
}
