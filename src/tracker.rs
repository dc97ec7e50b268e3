//! Per-fund fetch pipeline and sequential batch refresh.

use crate::core::config::AppConfig;
use crate::core::reconcile::reconcile_snapshot;
use crate::core::{FeedError, FundSnapshot};
use crate::providers::estimate::EstimateProvider;
use crate::providers::history::HistoryProvider;
use crate::providers::holdings::{HoldingsProvider, enrich_holdings};
use crate::providers::jsonp::{CallbackChannel, HttpScriptChannel};
use crate::providers::quote::{FundQuote, QuoteProvider};
use crate::providers::search::SearchProvider;
use futures::future::join;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Outcome of refreshing several funds.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Snapshots in the order their codes were requested.
    pub snapshots: Vec<FundSnapshot>,
    pub failures: Vec<(String, FeedError)>,
}

impl BatchReport {
    pub fn snapshot(&self, code: &str) -> Option<&FundSnapshot> {
        self.snapshots.iter().find(|s| s.code == code)
    }
}

fn placeholder_name(code: &str) -> String {
    format!("未知基金({code})")
}

pub struct FundTracker {
    estimates: EstimateProvider,
    quotes: QuoteProvider,
    search: SearchProvider,
    holdings: HoldingsProvider,
    history: HistoryProvider,
}

impl FundTracker {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let channel: Arc<dyn CallbackChannel> = Arc::new(HttpScriptChannel::new()?);
        Ok(Self::with_channel(channel, config))
    }

    pub fn with_channel(channel: Arc<dyn CallbackChannel>, config: &AppConfig) -> Self {
        let providers = &config.providers;
        Self {
            estimates: EstimateProvider::new(Arc::clone(&channel), providers.estimate.clone()),
            quotes: QuoteProvider::new(Arc::clone(&channel), providers.quote.clone()),
            search: SearchProvider::new(Arc::clone(&channel), providers.search.clone()),
            holdings: HoldingsProvider::new(Arc::clone(&channel), providers.archive.clone()),
            history: HistoryProvider::new(channel, providers.archive.clone(), config.timezone),
        }
    }

    pub fn quotes(&self) -> &QuoteProvider {
        &self.quotes
    }

    pub fn search(&self) -> &SearchProvider {
        &self.search
    }

    pub fn history(&self) -> &HistoryProvider {
        &self.history
    }

    /// Builds a fresh snapshot for `code`.
    ///
    /// With a live estimate, the settled quote and the holdings are fetched
    /// together and merged in once both have settled. Without one, the
    /// snapshot comes from settled data alone and is flagged `no_valuation`.
    /// The only error surfaced is [`FeedError::DataUnavailable`].
    #[instrument(name = "FundFetch", skip(self), fields(code = %code))]
    pub async fn fetch_fund(&self, code: &str) -> Result<FundSnapshot, FeedError> {
        let estimate = match self.estimates.fetch_estimate(code).await {
            Ok(estimate) => estimate,
            Err(e) => {
                info!(error = %e, "No live estimate, falling back to settled data");
                return self.fallback_snapshot(code).await;
            }
        };

        let holdings = async {
            let holdings = self.holdings.fetch_holdings(code).await;
            enrich_holdings(&self.quotes, holdings).await
        };
        let (settlement, holdings) = join(self.quotes.fund_settlement(code), holdings).await;

        let mut snapshot = estimate.into_snapshot();
        reconcile_snapshot(&mut snapshot, settlement);
        snapshot.set_holdings(holdings);
        Ok(snapshot)
    }

    /// Settled-only snapshot used when the live estimate is missing.
    async fn fallback_snapshot(&self, code: &str) -> Result<FundSnapshot, FeedError> {
        // The search feed has its own deadline, so a slow name lookup only
        // costs the name.
        let searched_name = self.search.lookup_name(code).await;

        let entry = match self.quotes.fund_quote(code).await {
            Ok(Some(entry)) if entry.raw().chars().count() > 5 => entry,
            Ok(_) => {
                warn!(code, "Settled quote feed has no entry");
                return Err(FeedError::DataUnavailable(code.to_string()));
            }
            Err(e) => {
                warn!(code, error = %e, "Settled quote feed failed");
                return Err(FeedError::DataUnavailable(code.to_string()));
            }
        };

        let quote = FundQuote::from_entry(&entry);
        if !quote.has_nav() {
            warn!(code, "Settled quote has no NAV");
            return Err(FeedError::DataUnavailable(code.to_string()));
        }

        let name = searched_name
            .or(quote.name)
            .unwrap_or_else(|| placeholder_name(code));
        debug!(code, %name, "Built settled-only snapshot");
        Ok(FundSnapshot::settled_only(code, name, quote.settlement))
    }

    /// Refreshes `codes` one after another; duplicates are fetched once.
    ///
    /// A failing code is recorded and the batch moves on.
    pub async fn fetch_all(&self, codes: &[String]) -> BatchReport {
        self.fetch_all_with_progress(codes, |_| ()).await
    }

    pub async fn fetch_all_with_progress<F>(&self, codes: &[String], on_fetched: F) -> BatchReport
    where
        F: Fn(&str),
    {
        let mut seen = HashSet::new();
        let mut report = BatchReport::default();

        for code in codes.iter().filter(|c| seen.insert(c.as_str())) {
            match self.fetch_fund(code).await {
                Ok(snapshot) => report.snapshots.push(snapshot),
                Err(e) => {
                    warn!(code = %code, error = %e, "Fund refresh failed");
                    report.failures.push((code.clone(), e));
                }
            }
            on_fetched(code);
        }
        report
    }
}
