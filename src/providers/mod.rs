pub mod estimate;
pub mod history;
pub mod holdings;
pub mod jsonp;
pub mod quote;
pub mod search;

// Re-export the transport so callers can plug in their own channel
pub use jsonp::{CallbackChannel, Delivery, HttpScriptChannel, Script, ScriptRequest};
