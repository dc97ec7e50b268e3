use crate::cli::ui;
use crate::providers::history::{MAX_BACKTRACK_DAYS, NavPoint};
use crate::tracker::FundTracker;
use anyhow::Result;
use chrono::NaiveDate;

pub fn describe(code: &str, requested: NaiveDate, point: &NavPoint) -> String {
    let mut line = format!("{code} NAV on {}: {:.4}", point.date, point.value);
    if point.date != requested {
        line.push_str(&format!(" (first settled day on or after {requested})"));
    }
    line
}

/// Prints the settled NAV of `code` on `date`, or on the next day that has one.
pub async fn run(tracker: &FundTracker, code: &str, date: NaiveDate) -> Result<()> {
    match tracker.history().find_first_nav(code, date).await {
        Some(point) => {
            println!(
                "{}",
                ui::style_text(&describe(code, date, &point), ui::StyleType::Label)
            );
            Ok(())
        }
        None => anyhow::bail!(
            "No settled NAV for {code} within {MAX_BACKTRACK_DAYS} days from {date}"
        ),
    }
}
