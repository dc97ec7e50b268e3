use super::jsonp::{CallbackChannel, Delivery, ScriptRequest, cache_buster, unique_callback};
use crate::core::FeedError;
use crate::core::config::FeedConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const FEED: &str = "search";
const FUND_CATEGORY: i64 = 700;
const FUND_CATEGORY_DESC: &str = "基金";

/// One suggestion from the search feed. Fields the feed adds beyond the
/// ones named here are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "CODE", default)]
    pub code: Option<String>,
    #[serde(rename = "NAME", default)]
    pub name: Option<String>,
    #[serde(rename = "SHORTNAME", default)]
    pub short_name: Option<String>,
    #[serde(rename = "CATEGORY", default)]
    pub category: Option<Value>,
    #[serde(rename = "CATEGORYDESC", default)]
    pub category_desc: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchHit {
    pub fn is_fund(&self) -> bool {
        let by_code = match &self.category {
            Some(Value::Number(n)) => n.as_i64() == Some(FUND_CATEGORY),
            Some(Value::String(s)) => s.trim() == FUND_CATEGORY.to_string(),
            _ => false,
        };
        by_code || self.category_desc.as_deref() == Some(FUND_CATEGORY_DESC)
    }

    /// Full name, else short name.
    pub fn display_name(&self) -> Option<&str> {
        [self.name.as_deref(), self.short_name.as_deref()]
            .into_iter()
            .flatten()
            .find(|n| !n.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "Datas", default)]
    datas: Option<Vec<Value>>,
}

impl SearchResponse {
    /// Hits that have the expected shape; malformed entries are skipped.
    fn hits(self) -> Vec<SearchHit> {
        self.datas
            .unwrap_or_default()
            .into_iter()
            .filter_map(|data| match serde_json::from_value(data) {
                Ok(hit) => Some(hit),
                Err(e) => {
                    debug!(error = %e, "Skipping malformed suggestion");
                    None
                }
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct SearchProvider {
    channel: Arc<dyn CallbackChannel>,
    feed: FeedConfig,
}

impl SearchProvider {
    pub fn new(channel: Arc<dyn CallbackChannel>, feed: FeedConfig) -> Self {
        Self { channel, feed }
    }

    /// Every suggestion for `key`, of any category.
    pub async fn suggest(&self, key: &str) -> Result<Vec<SearchHit>, FeedError> {
        let callback = unique_callback("SuggestData");
        let url = format!(
            "{}/FundSearch/api/FundSearchAPI.ashx?m=1&key={}&callback={}&_={}",
            self.feed.base_url,
            urlencoding::encode(key),
            callback,
            cache_buster()
        );
        let request = ScriptRequest::callback(FEED, url, &callback, self.feed.deadline());

        let payload = match self.channel.send(request).await? {
            Delivery::Payload(payload) => payload,
            Delivery::Loaded(_) | Delivery::Expired => {
                return Err(FeedError::Timeout { feed: FEED });
            }
        };
        if !payload.is_object() {
            return Ok(Vec::new());
        }

        let response: SearchResponse =
            serde_json::from_value(payload).map_err(|e| FeedError::parse(FEED, e))?;
        let hits = response.hits();
        debug!(key, hits = hits.len(), "Received suggestions");
        Ok(hits)
    }

    /// Funds matching a free-text query, for search-as-you-type.
    ///
    /// Blank input returns nothing without touching the network. Only a
    /// transport failure is reported; a slow or garbled answer is treated as
    /// no matches.
    pub async fn search_funds(&self, query: &str) -> Result<Vec<SearchHit>, FeedError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        match self.suggest(query).await {
            Ok(hits) => Ok(hits.into_iter().filter(SearchHit::is_fund).collect()),
            Err(e) if e.is_recoverable() => {
                warn!(query, error = %e, "Search returned no usable answer");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Display name of the fund whose code is exactly `code`, best effort.
    pub async fn lookup_name(&self, code: &str) -> Option<String> {
        match self.suggest(code).await {
            Ok(hits) => hits
                .iter()
                .find(|hit| hit.code.as_deref() == Some(code))
                .and_then(SearchHit::display_name)
                .map(str::to_string),
            Err(e) => {
                debug!(code, error = %e, "Name lookup failed");
                None
            }
        }
    }
}
