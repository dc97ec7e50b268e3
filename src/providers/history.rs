//! Settled NAV lookups for past dates.

use super::holdings::archive_content;
use super::jsonp::CallbackChannel;
use crate::core::config::FeedConfig;
use crate::core::text::{leading_f64, strip_tags};
use chrono::{Days, NaiveDate, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use tracing::{debug, instrument, warn};

const FEED: &str = "history";
const NO_DATA_MARKER: &str = "暂无数据";

/// Upper bound on dates tried by one backtrack.
pub const MAX_BACKTRACK_DAYS: usize = 30;

static NAV_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<td[^>]*>(.*?)</td>").expect("nav cell regex"));

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NavPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Current calendar date in the trading timezone.
pub fn trading_date_today(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// Settled NAV for exactly `date` from a history table fragment.
pub fn parse_nav(content: &str, date: &str) -> Option<f64> {
    if content.contains(NO_DATA_MARKER) {
        return None;
    }
    let marker = format!("<td>{date}</td>");
    let row = content.split("<tr>").find(|row| row.contains(&marker))?;
    let cells: Vec<&str> = NAV_CELL.find_iter(row).map(|m| m.as_str()).collect();
    if cells.len() < 2 {
        return None;
    }
    leading_f64(&strip_tags(cells[1]))
}

#[derive(Clone)]
pub struct HistoryProvider {
    channel: Arc<dyn CallbackChannel>,
    feed: FeedConfig,
    timezone: Tz,
}

impl HistoryProvider {
    pub fn new(channel: Arc<dyn CallbackChannel>, feed: FeedConfig, timezone: Tz) -> Self {
        Self {
            channel,
            feed,
            timezone,
        }
    }

    /// Settled NAV published for `date`, if any.
    pub async fn nav_on(&self, code: &str, date: NaiveDate) -> Option<f64> {
        let date = date.format("%Y-%m-%d").to_string();
        let url = format!(
            "{}/F10DataApi.aspx?type=lsjz&code={}&page=1&per=1&sdate={}&edate={}",
            self.feed.base_url, code, date, date
        );
        match archive_content(self.channel.as_ref(), FEED, url, &self.feed).await {
            Ok(content) => parse_nav(&content, &date),
            Err(e) => {
                warn!(code, %date, error = %e, "History lookup failed");
                None
            }
        }
    }

    /// First date on or after `start` with a settled NAV.
    ///
    /// Walks one day at a time for at most [`MAX_BACKTRACK_DAYS`] days and
    /// stops before any date later than today in the trading timezone.
    pub async fn find_first_nav(&self, code: &str, start: NaiveDate) -> Option<NavPoint> {
        let today = trading_date_today(self.timezone);
        self.find_first_nav_until(code, start, today).await
    }

    #[instrument(name = "NavBacktrack", skip(self))]
    pub async fn find_first_nav_until(
        &self,
        code: &str,
        start: NaiveDate,
        today: NaiveDate,
    ) -> Option<NavPoint> {
        let mut date = start;
        for _ in 0..MAX_BACKTRACK_DAYS {
            if date > today {
                debug!(%date, "Reached today without a settled value");
                break;
            }
            if let Some(value) = self.nav_on(code, date).await {
                return Some(NavPoint { date, value });
            }
            date = date.checked_add_days(Days::new(1))?;
        }
        None
    }
}
