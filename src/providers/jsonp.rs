//! Callback-style script transport.
//!
//! The feeds answer with executable script rather than data: either a call to
//! an agreed callback (`jsonpgz({...});`) or assignments to globals
//! (`v_jj000001="...";`, `var apidata={ content:"..." };`). [`Script`] reads
//! those two shapes without a JS engine, and [`CallbackChannel`] wraps loading
//! one under a hard deadline.

use crate::core::FeedError;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

static CALLBACK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Allocates a callback name that no other outstanding request shares.
pub fn unique_callback(prefix: &str) -> String {
    let seq = CALLBACK_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{prefix}_{}_{seq}",
        chrono::Utc::now().timestamp_millis()
    )
}

/// Millisecond timestamp used as a cache buster on feed URLs.
pub fn cache_buster() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone)]
pub struct ScriptRequest {
    pub feed: &'static str,
    pub url: String,
    /// Callback the script is expected to invoke, if any.
    pub callback: Option<String>,
    pub deadline: Duration,
}

impl ScriptRequest {
    pub fn globals(feed: &'static str, url: String, deadline: Duration) -> Self {
        Self {
            feed,
            url,
            callback: None,
            deadline,
        }
    }

    pub fn callback(feed: &'static str, url: String, callback: &str, deadline: Duration) -> Self {
        Self {
            feed,
            url,
            callback: Some(callback.to_string()),
            deadline,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Delivery {
    /// The expected callback was invoked with this argument.
    Payload(Value),
    /// The script loaded and no callback was expected.
    Loaded(Script),
    /// The deadline passed, or the expected callback was never invoked.
    Expired,
}

#[async_trait]
pub trait CallbackChannel: Send + Sync {
    async fn send(&self, request: ScriptRequest) -> Result<Delivery, FeedError>;
}

/// A loaded script body.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    body: String,
}

impl Script {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    /// Argument passed to `callback`, `None` if the script never calls it.
    ///
    /// A call without arguments yields `Value::Null`.
    pub fn invocation(&self, callback: &str) -> Option<Result<Value, serde_json::Error>> {
        let pattern = format!(r"(?:^|[^\w$.]){}\s*\(", regex::escape(callback));
        let call = Regex::new(&pattern).ok()?.find(&self.body)?;
        let args = self.body[call.end()..].trim_start();
        if args.is_empty() || args.starts_with(')') {
            return Some(Ok(Value::Null));
        }
        // Only the first argument is read; whatever follows it is ignored.
        let mut de = serde_json::Deserializer::from_str(args);
        Some(Value::deserialize(&mut de))
    }

    /// String assigned to the global `name`.
    pub fn global(&self, name: &str) -> Option<String> {
        let rest = self.assignment(name)?;
        read_js_string(rest)
    }

    /// String property `field` of the object literal assigned to `var`.
    pub fn object_field(&self, var: &str, field: &str) -> Option<String> {
        let object = self.assignment(var)?;
        if !object.starts_with('{') {
            return None;
        }
        let key = format!(r#"[{{,\s]["']?{}["']?\s*:\s*"#, regex::escape(field));
        let key = Regex::new(&key).ok()?.find(object)?;
        read_js_string(&object[key.end()..])
    }

    fn assignment(&self, name: &str) -> Option<&str> {
        let pattern = format!(
            r"(?:^|[^\w$.])(?:(?:var|let|const)\s+)?{}\s*=\s*",
            regex::escape(name)
        );
        let assign = Regex::new(&pattern).ok()?.find(&self.body)?;
        Some(&self.body[assign.end()..])
    }
}

/// Decodes the JS string literal at the start of `src`.
fn read_js_string(src: &str) -> Option<String> {
    let mut chars = src.chars();
    let quote = chars.next().filter(|c| *c == '"' || *c == '\'')?;
    let mut out = String::new();

    while let Some(c) = chars.next() {
        match c {
            c if c == quote => return Some(out),
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'v' => out.push('\u{b}'),
                '0' => out.push('\0'),
                'x' => {
                    let hex: String = chars.by_ref().take(2).collect();
                    out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
                }
                'u' => {
                    let hex: String = chars.by_ref().take(4).collect();
                    let unit = u32::from_str_radix(&hex, 16).ok()?;
                    out.push(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
                '\n' => {}
                other => out.push(other),
            },
            c => out.push(c),
        }
    }
    None
}

/// Removes its entry from the in-flight table when dropped.
struct InFlight {
    id: u64,
    table: Arc<Mutex<HashMap<u64, String>>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Loads scripts over HTTP.
///
/// Every request is tracked under its own correlation id until it settles, on
/// success, failure and expiry alike.
pub struct HttpScriptChannel {
    client: reqwest::Client,
    next_id: AtomicU64,
    in_flight: Arc<Mutex<HashMap<u64, String>>>,
}

impl HttpScriptChannel {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("fundwatch/0.1")
            .build()?;
        Ok(Self {
            client,
            next_id: AtomicU64::new(1),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Number of requests that have not settled yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn track(&self, url: &str) -> InFlight {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, url.to_string());
        InFlight {
            id,
            table: Arc::clone(&self.in_flight),
        }
    }

    async fn load(&self, request: &ScriptRequest) -> Result<String, FeedError> {
        let response = self
            .client
            .get(&request.url)
            .send()
            .await
            .map_err(|e| FeedError::transport(request.feed, e))?;

        if !response.status().is_success() {
            return Err(FeedError::transport(
                request.feed,
                format!("HTTP error: {} for {}", response.status(), request.url),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| FeedError::transport(request.feed, e))
    }
}

#[async_trait]
impl CallbackChannel for HttpScriptChannel {
    async fn send(&self, request: ScriptRequest) -> Result<Delivery, FeedError> {
        let _in_flight = self.track(&request.url);
        debug!(feed = request.feed, url = %request.url, "Loading script");

        let body = match tokio::time::timeout(request.deadline, self.load(&request)).await {
            Ok(body) => body?,
            Err(_) => {
                warn!(
                    feed = request.feed,
                    deadline_ms = request.deadline.as_millis() as u64,
                    "Script did not load before deadline"
                );
                return Ok(Delivery::Expired);
            }
        };

        let script = Script::new(body);
        let Some(callback) = &request.callback else {
            return Ok(Delivery::Loaded(script));
        };

        match script.invocation(callback) {
            Some(Ok(payload)) => Ok(Delivery::Payload(payload)),
            Some(Err(e)) => Err(FeedError::parse(request.feed, e)),
            None => {
                debug!(feed = request.feed, %callback, "Script never invoked callback");
                Ok(Delivery::Expired)
            }
        }
    }
}
