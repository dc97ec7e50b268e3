use super::jsonp::{CallbackChannel, Delivery, ScriptRequest, cache_buster};
use crate::core::config::FeedConfig;
use crate::core::{FeedError, FundSnapshot, PercentChange};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

const FEED: &str = "estimate";
const CALLBACK: &str = "jsonpgz";

/// Live intraday estimate as published by the valuation feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub code: String,
    pub name: String,
    pub dwjz: Option<String>,
    pub gsz: Option<String>,
    pub gztime: Option<String>,
    pub jzrq: Option<String>,
    pub gszzl: Option<PercentChange>,
}

impl Estimate {
    pub fn into_snapshot(self) -> FundSnapshot {
        // A timestamp without the value it stamps is meaningless
        let gztime = self.gsz.as_ref().and(self.gztime);
        FundSnapshot {
            code: self.code,
            name: self.name,
            dwjz: self.dwjz,
            gsz: self.gsz,
            gztime,
            jzrq: self.jzrq,
            gszzl: self.gszzl,
            zzl: None,
            no_valuation: false,
            holdings: Vec::new(),
        }
    }
}

/// Field as text, whatever JSON type the feed used for it.
fn value_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn percent_change(value: Option<&Value>) -> Option<PercentChange> {
    match value? {
        Value::Null => None,
        Value::Number(n) => Some(match n.as_f64().filter(|v| v.is_finite()) {
            Some(v) => PercentChange::Number(v),
            None => PercentChange::Raw(n.to_string()),
        }),
        Value::String(s) => Some(PercentChange::from_text(s)),
        other => Some(PercentChange::Raw(other.to_string())),
    }
}

fn parse_estimate(code: &str, payload: &Value) -> Result<Estimate, FeedError> {
    let Some(obj) = payload.as_object() else {
        return Err(FeedError::parse(FEED, format!("payload is not an object: {payload}")));
    };

    Ok(Estimate {
        code: value_text(obj.get("fundcode")).unwrap_or_else(|| code.to_string()),
        name: value_text(obj.get("name")).unwrap_or_default(),
        dwjz: value_text(obj.get("dwjz")),
        gsz: value_text(obj.get("gsz")),
        gztime: value_text(obj.get("gztime")),
        jzrq: value_text(obj.get("jzrq")),
        gszzl: percent_change(obj.get("gszzl")),
    })
}

#[derive(Clone)]
pub struct EstimateProvider {
    channel: Arc<dyn CallbackChannel>,
    feed: FeedConfig,
}

impl EstimateProvider {
    pub fn new(channel: Arc<dyn CallbackChannel>, feed: FeedConfig) -> Self {
        Self { channel, feed }
    }

    /// Fetches the live estimate for `code`.
    ///
    /// Any error here means "no live estimate"; the caller is expected to fall
    /// back to settled data rather than give up.
    #[instrument(name = "EstimateFetch", skip(self), fields(code = %code))]
    pub async fn fetch_estimate(&self, code: &str) -> Result<Estimate, FeedError> {
        let url = format!(
            "{}/js/{}.js?rt={}",
            self.feed.base_url,
            code,
            cache_buster()
        );
        let request = ScriptRequest::callback(FEED, url, CALLBACK, self.feed.deadline());

        match self.channel.send(request).await? {
            Delivery::Payload(payload) => {
                let estimate = parse_estimate(code, &payload)?;
                debug!(gsz = ?estimate.gsz, gztime = ?estimate.gztime, "Received estimate");
                Ok(estimate)
            }
            Delivery::Loaded(_) | Delivery::Expired => Err(FeedError::Timeout { feed: FEED }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::jsonp::HttpScriptChannel;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_estimate_mock_server(code: &str, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/js/{code}.js")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn provider(base_url: &str) -> EstimateProvider {
        let channel = Arc::new(HttpScriptChannel::new().unwrap());
        EstimateProvider::new(
            channel,
            FeedConfig {
                base_url: base_url.to_string(),
                timeout_ms: 2000,
            },
        )
    }

    #[test]
    fn test_parse_estimate_coerces_percent() {
        let payload = json!({
            "fundcode": "110022", "name": "易方达消费行业", "jzrq": "2024-01-05",
            "dwjz": "3.1230", "gsz": "3.1400", "gszzl": "0.54", "gztime": "2024-01-08 15:00"
        });
        let estimate = parse_estimate("110022", &payload).unwrap();
        assert_eq!(estimate.gszzl, Some(PercentChange::Number(0.54)));
        assert_eq!(estimate.dwjz.as_deref(), Some("3.1230"));

        let closed = json!({"fundcode": "110022", "gszzl": "--", "gsz": 3.14});
        let estimate = parse_estimate("110022", &closed).unwrap();
        assert_eq!(estimate.gszzl, Some(PercentChange::Raw("--".to_string())));
        assert_eq!(estimate.gsz.as_deref(), Some("3.14"));
        assert_eq!(estimate.name, "");

        let numeric = json!({"gszzl": -1.25});
        let estimate = parse_estimate("000001", &numeric).unwrap();
        assert_eq!(estimate.code, "000001");
        assert_eq!(estimate.gszzl, Some(PercentChange::Number(-1.25)));
    }

    #[test]
    fn test_parse_estimate_rejects_non_object() {
        assert!(parse_estimate("000001", &Value::Null).is_err());
        assert!(parse_estimate("000001", &json!("text")).is_err());
        assert!(parse_estimate("000001", &json!([1, 2])).is_err());
    }

    #[test]
    fn test_gztime_requires_gsz() {
        let estimate = Estimate {
            code: "000001".into(),
            name: String::new(),
            dwjz: None,
            gsz: None,
            gztime: Some("2024-01-08 15:00".into()),
            jzrq: None,
            gszzl: None,
        };
        let snapshot = estimate.into_snapshot();
        assert!(snapshot.gztime.is_none());
        assert!(!snapshot.no_valuation);
    }

    #[tokio::test]
    async fn test_successful_estimate_fetch() {
        let body = r#"jsonpgz({"fundcode":"000001","name":"华夏成长混合","jzrq":"2024-01-05","dwjz":"1.0820","gsz":"1.0871","gszzl":"0.47","gztime":"2024-01-08 15:00"});"#;
        let mock_server = create_estimate_mock_server("000001", body).await;

        let estimate = provider(&mock_server.uri())
            .fetch_estimate("000001")
            .await
            .unwrap();
        assert_eq!(estimate.code, "000001");
        assert_eq!(estimate.name, "华夏成长混合");
        assert_eq!(estimate.gsz.as_deref(), Some("1.0871"));
        assert_eq!(estimate.gztime.as_deref(), Some("2024-01-08 15:00"));
        assert_eq!(estimate.jzrq.as_deref(), Some("2024-01-05"));
        assert_eq!(estimate.gszzl, Some(PercentChange::Number(0.47)));
    }

    #[tokio::test]
    async fn test_empty_invocation_is_failure() {
        let mock_server = create_estimate_mock_server("000001", "jsonpgz();").await;
        let result = provider(&mock_server.uri()).fetch_estimate("000001").await;
        assert!(matches!(result, Err(FeedError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_missing_invocation_is_timeout() {
        let mock_server = create_estimate_mock_server("000001", "var x = 1;").await;
        let result = provider(&mock_server.uri()).fetch_estimate("000001").await;
        assert_eq!(result.unwrap_err(), FeedError::Timeout { feed: "estimate" });
    }

    #[tokio::test]
    async fn test_slow_feed_is_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/js/000001.js"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("jsonpgz({});")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;
        let channel = Arc::new(HttpScriptChannel::new().unwrap());
        let provider = EstimateProvider::new(
            channel,
            FeedConfig {
                base_url: mock_server.uri(),
                timeout_ms: 100,
            },
        );

        let result = provider.fetch_estimate("000001").await;
        assert_eq!(result.unwrap_err(), FeedError::Timeout { feed: "estimate" });
    }
}
