//! Batched quote lookups against the tilde-delimited quote feed.
//!
//! One request carries every symbol; the script answers with one
//! `v_<symbol>="f0~f1~..."` global per symbol it knows. Fund entries (`jj`
//! symbols) and stock entries (`s_` symbols) place different figures at the
//! same positions, see [`FundQuote`] and [`stock_change`].

use super::jsonp::{CallbackChannel, Delivery, ScriptRequest};
use crate::core::config::FeedConfig;
use crate::core::market::{fund_symbol, stock_symbol};
use crate::core::text::{leading_f64, prefix_chars};
use crate::core::{FeedError, Settlement};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const FEED: &str = "quote";
const MARKET_INDEX_SYMBOL: &str = "sh000001";

/// Raw tilde-delimited entry for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteEntry {
    raw: String,
    fields: Vec<String>,
}

impl QuoteEntry {
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            fields: raw.split('~').map(str::to_string).collect(),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

}

/// Settled figures of a fund entry: index 1 name, 5 NAV, 7 change, 8 date.
#[derive(Debug, Clone, PartialEq)]
pub struct FundQuote {
    pub name: Option<String>,
    pub settlement: Settlement,
}

impl FundQuote {
    pub fn from_entry(entry: &QuoteEntry) -> Self {
        let non_empty = |i: usize| entry.field(i).filter(|s| !s.is_empty()).map(str::to_string);
        Self {
            name: non_empty(1),
            settlement: Settlement {
                dwjz: entry.field(5).map(str::to_string),
                jzrq: non_empty(8).map(|date| prefix_chars(&date, 10)),
                zzl: entry.field(7).and_then(leading_f64),
            },
        }
    }

    pub fn has_nav(&self) -> bool {
        self.settlement.dwjz.as_deref().is_some_and(|d| !d.is_empty())
    }
}

/// Percent change of a stock entry, index 5.
pub fn stock_change(entry: &QuoteEntry) -> Option<f64> {
    entry.field(5).and_then(leading_f64)
}

#[derive(Clone)]
pub struct QuoteProvider {
    channel: Arc<dyn CallbackChannel>,
    feed: FeedConfig,
}

impl QuoteProvider {
    pub fn new(channel: Arc<dyn CallbackChannel>, feed: FeedConfig) -> Self {
        Self { channel, feed }
    }

    /// Looks up all `symbols` in one request.
    ///
    /// Symbols the feed does not answer for are absent from the map.
    pub async fn fetch_quotes(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, QuoteEntry>, FeedError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }
        let url = format!("{}/q={}", self.feed.base_url, symbols.join(","));
        let request = ScriptRequest::globals(FEED, url, self.feed.deadline());

        let script = match self.channel.send(request).await? {
            Delivery::Loaded(script) => script,
            Delivery::Expired => return Err(FeedError::Timeout { feed: FEED }),
            Delivery::Payload(_) => {
                return Err(FeedError::parse(FEED, "unexpected callback payload"));
            }
        };

        let quotes: HashMap<String, QuoteEntry> = symbols
            .iter()
            .filter_map(|symbol| {
                script
                    .global(&format!("v_{symbol}"))
                    .map(|raw| (symbol.clone(), QuoteEntry::parse(&raw)))
            })
            .collect();
        debug!(
            requested = symbols.len(),
            answered = quotes.len(),
            "Received quotes"
        );
        Ok(quotes)
    }

    /// Raw settled quote for a single fund.
    pub async fn fund_quote(&self, code: &str) -> Result<Option<QuoteEntry>, FeedError> {
        let symbol = fund_symbol(code);
        let mut quotes = self.fetch_quotes(std::slice::from_ref(&symbol)).await?;
        Ok(quotes.remove(&symbol))
    }

    /// Settled NAV figures for `code`, or `None` when the feed has nothing.
    pub async fn fund_settlement(&self, code: &str) -> Option<Settlement> {
        match self.fund_quote(code).await {
            Ok(entry) => entry.map(|e| FundQuote::from_entry(&e).settlement),
            Err(e) => {
                warn!(code, error = %e, "Settled quote unavailable");
                None
            }
        }
    }

    /// Live percent change for each listed security code.
    ///
    /// Codes that do not map to a market, or that the feed does not answer for,
    /// are absent from the result.
    pub async fn stock_changes(&self, codes: &[&str]) -> Result<HashMap<String, f64>, FeedError> {
        let symbols: Vec<(String, String)> = codes
            .iter()
            .filter_map(|code| stock_symbol(code).map(|symbol| (code.to_string(), symbol)))
            .collect();
        let request: Vec<String> = symbols.iter().map(|(_, s)| s.clone()).collect();
        let quotes = self.fetch_quotes(&request).await?;

        Ok(symbols
            .into_iter()
            .filter_map(|(code, symbol)| {
                quotes
                    .get(&symbol)
                    .and_then(stock_change)
                    .map(|change| (code, change))
            })
            .collect())
    }

    /// Latest trade date of the Shanghai composite index, as `YYYYMMDD`.
    pub async fn latest_trading_date(&self) -> Option<String> {
        let symbol = MARKET_INDEX_SYMBOL.to_string();
        let quotes = match self.fetch_quotes(std::slice::from_ref(&symbol)).await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(error = %e, "Market date unavailable");
                return None;
            }
        };
        quotes
            .get(&symbol)
            .and_then(|entry| entry.field(30))
            .map(|stamp| prefix_chars(stamp, 8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::jsonp::HttpScriptChannel;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FUND_ENTRY: &str = "1~华夏成长混合~000001~1.0900~1.0820~1.0910~3.5000~0.83~2024-01-08 00:00:00~";

    async fn create_quote_mock_server(symbols: &str, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/q={symbols}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn provider(base_url: &str) -> QuoteProvider {
        QuoteProvider::new(
            Arc::new(HttpScriptChannel::new().unwrap()),
            FeedConfig {
                base_url: base_url.to_string(),
                timeout_ms: 2000,
            },
        )
    }

    #[test]
    fn test_fund_quote_fields() {
        let quote = FundQuote::from_entry(&QuoteEntry::parse(FUND_ENTRY));
        assert_eq!(quote.name.as_deref(), Some("华夏成长混合"));
        assert_eq!(quote.settlement.dwjz.as_deref(), Some("1.0910"));
        assert_eq!(quote.settlement.zzl, Some(0.83));
        assert_eq!(quote.settlement.jzrq.as_deref(), Some("2024-01-08"));
        assert!(quote.has_nav());

        let sparse = FundQuote::from_entry(&QuoteEntry::parse("1~~000001"));
        assert_eq!(sparse.name, None);
        assert_eq!(sparse.settlement, Settlement::default());
        assert!(!sparse.has_nav());
    }

    #[test]
    fn test_stock_change() {
        assert_eq!(
            stock_change(&QuoteEntry::parse("1~贵州茅台~600519~1700.00~12.00~0.71~100~1")),
            Some(0.71)
        );
        assert_eq!(stock_change(&QuoteEntry::parse("1~a~b~c~d")), None);
        assert_eq!(stock_change(&QuoteEntry::parse("1~a~b~c~d~--~x")), None);
    }

    #[tokio::test]
    async fn test_fund_settlement() {
        let body = format!("v_jj000001=\"{FUND_ENTRY}\";");
        let mock_server = create_quote_mock_server("jj000001", &body).await;

        let settlement = provider(&mock_server.uri())
            .fund_settlement("000001")
            .await
            .unwrap();
        assert_eq!(settlement.dwjz.as_deref(), Some("1.0910"));
        assert_eq!(settlement.jzrq.as_deref(), Some("2024-01-08"));
        assert_eq!(settlement.zzl, Some(0.83));
    }

    #[tokio::test]
    async fn test_missing_variable_yields_nothing() {
        let mock_server = create_quote_mock_server("jj999999", "v_pv_none_match=\"1\";").await;
        let provider = provider(&mock_server.uri());
        assert!(provider.fund_settlement("999999").await.is_none());
        assert_eq!(provider.fund_quote("999999").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_transport_failure_degrades_to_none() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;
        assert!(
            provider(&mock_server.uri())
                .fund_settlement("000001")
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_stock_changes_batches_symbols() {
        let body = "v_s_sh600519=\"1~贵州茅台~600519~1700.00~12.00~0.71~100~1\";\n\
                    v_s_hk00700=\"100~腾讯控股~00700~300.00~-3.00~-0.99~1~1\";";
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/q=s_sh600519,s_sz000858,s_hk00700"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&mock_server)
            .await;

        let changes = provider(&mock_server.uri())
            .stock_changes(&["600519", "000858", "00700", "AAPL"])
            .await
            .unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes.get("600519"), Some(&0.71));
        assert_eq!(changes.get("00700"), Some(&-0.99));
        assert!(!changes.contains_key("000858"));
    }

    #[tokio::test]
    async fn test_latest_trading_date() {
        let mut fields: Vec<String> = (0..35).map(|i| i.to_string()).collect();
        fields[30] = "20240108150003".to_string();
        let body = format!("v_sh000001=\"{}\";", fields.join("~"));
        let mock_server = create_quote_mock_server("sh000001", &body).await;

        assert_eq!(
            provider(&mock_server.uri()).latest_trading_date().await.as_deref(),
            Some("20240108")
        );
    }
}
