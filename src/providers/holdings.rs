use super::jsonp::{CallbackChannel, Delivery, ScriptRequest, cache_buster};
use super::quote::QuoteProvider;
use crate::core::config::FeedConfig;
use crate::core::holdings::parse_holdings;
use crate::core::market::Market;
use crate::core::{FeedError, Holding, MAX_HOLDINGS};
use std::sync::Arc;
use tracing::{debug, warn};

const FEED: &str = "holdings";

/// Reads `apidata.content` from an archive-feed script.
pub(crate) async fn archive_content(
    channel: &dyn CallbackChannel,
    feed: &'static str,
    url: String,
    config: &FeedConfig,
) -> Result<String, FeedError> {
    let request = ScriptRequest::globals(feed, url, config.deadline());
    match channel.send(request).await? {
        Delivery::Loaded(script) => Ok(script
            .object_field("apidata", "content")
            .unwrap_or_default()),
        Delivery::Expired => Err(FeedError::Timeout { feed }),
        Delivery::Payload(_) => Err(FeedError::parse(feed, "unexpected callback payload")),
    }
}

#[derive(Clone)]
pub struct HoldingsProvider {
    channel: Arc<dyn CallbackChannel>,
    feed: FeedConfig,
}

impl HoldingsProvider {
    pub fn new(channel: Arc<dyn CallbackChannel>, feed: FeedConfig) -> Self {
        Self { channel, feed }
    }

    /// Top holdings from the latest portfolio report, never more than ten.
    ///
    /// Fetch or parse trouble yields an empty list.
    pub async fn fetch_holdings(&self, code: &str) -> Vec<Holding> {
        let url = format!(
            "{}/FundArchivesDatas.aspx?type=jjcc&code={}&topline={}&year=&month=&_={}",
            self.feed.base_url,
            code,
            MAX_HOLDINGS,
            cache_buster()
        );
        match archive_content(self.channel.as_ref(), FEED, url, &self.feed).await {
            Ok(html) => {
                let holdings = parse_holdings(&html);
                debug!(code, count = holdings.len(), "Parsed holdings");
                holdings
            }
            Err(e) => {
                warn!(code, error = %e, "Holdings unavailable");
                Vec::new()
            }
        }
    }
}

/// Attaches live price changes to holdings with a listed security code.
///
/// Runs a single batched quote request. Holdings the feed does not answer
/// for, and all holdings when the request fails, keep `change = None`.
pub async fn enrich_holdings(quotes: &QuoteProvider, mut holdings: Vec<Holding>) -> Vec<Holding> {
    let listed: Vec<&str> = holdings
        .iter()
        .map(|h| h.code.as_str())
        .filter(|code| Market::of(code).is_some())
        .collect();
    if listed.is_empty() {
        return holdings;
    }

    match quotes.stock_changes(&listed).await {
        Ok(changes) => {
            for holding in &mut holdings {
                holding.change = changes.get(&holding.code).copied();
            }
        }
        Err(e) => warn!(error = %e, "Holding quotes unavailable"),
    }
    holdings
}
