//! Snapshot types produced by the fetch pipeline

use serde::{Deserialize, Serialize};

/// Upper bound on holdings carried by a snapshot.
pub const MAX_HOLDINGS: usize = 10;

/// A percent change as reported by a feed.
///
/// Feeds send placeholders such as `"--"` while the market is closed, so a
/// value that does not parse is kept verbatim instead of being dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PercentChange {
    Number(f64),
    Raw(String),
}

impl PercentChange {
    pub fn from_text(text: &str) -> Self {
        match text.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => PercentChange::Number(value),
            _ => PercentChange::Raw(text.to_string()),
        }
    }
}

/// One constituent security disclosed in a fund's portfolio report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub code: String,
    pub name: String,
    /// Percent of fund net value, e.g. `"3.21%"`.
    pub weight: String,
    /// Live price change, set only when the quote lookup found one.
    pub change: Option<f64>,
}

impl Holding {
    pub fn new(code: String, name: String, weight: String) -> Self {
        Self {
            code,
            name,
            weight,
            change: None,
        }
    }
}

/// Settled NAV figures from one source: value, as-of date and change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settlement {
    pub dwjz: Option<String>,
    pub jzrq: Option<String>,
    pub zzl: Option<f64>,
}

/// Best obtainable view of a fund for one fetch cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundSnapshot {
    pub code: String,
    pub name: String,
    pub dwjz: Option<String>,
    pub gsz: Option<String>,
    pub gztime: Option<String>,
    pub jzrq: Option<String>,
    pub gszzl: Option<PercentChange>,
    pub zzl: Option<f64>,
    pub no_valuation: bool,
    pub holdings: Vec<Holding>,
}

impl FundSnapshot {
    /// Snapshot built from settled data only, without a live estimate.
    pub fn settled_only(code: &str, name: String, settlement: Settlement) -> Self {
        Self {
            code: code.to_string(),
            name,
            dwjz: settlement.dwjz,
            gsz: None,
            gztime: None,
            jzrq: settlement.jzrq,
            gszzl: None,
            zzl: settlement.zzl,
            no_valuation: true,
            holdings: Vec::new(),
        }
    }

    pub fn settlement(&self) -> Settlement {
        Settlement {
            dwjz: self.dwjz.clone(),
            jzrq: self.jzrq.clone(),
            zzl: self.zzl,
        }
    }

    pub fn apply_settlement(&mut self, settlement: Settlement) {
        self.dwjz = settlement.dwjz;
        self.jzrq = settlement.jzrq;
        self.zzl = settlement.zzl;
    }

    pub fn set_holdings(&mut self, mut holdings: Vec<Holding>) {
        holdings.truncate(MAX_HOLDINGS);
        self.holdings = holdings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_change_from_text() {
        assert_eq!(PercentChange::from_text("0.47"), PercentChange::Number(0.47));
        assert_eq!(PercentChange::from_text("-1.2"), PercentChange::Number(-1.2));
        assert_eq!(
            PercentChange::from_text("--"),
            PercentChange::Raw("--".to_string())
        );
        assert_eq!(
            PercentChange::from_text("NaN"),
            PercentChange::Raw("NaN".to_string())
        );
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snapshot = FundSnapshot::settled_only(
            "000001",
            "华夏成长".to_string(),
            Settlement {
                dwjz: Some("1.0820".to_string()),
                jzrq: Some("2024-01-05".to_string()),
                zzl: Some(0.5),
            },
        );
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["noValuation"], true);
        assert!(json["gsz"].is_null());
        assert_eq!(json["dwjz"], "1.0820");

        let estimate = serde_json::to_value(PercentChange::Number(0.47)).unwrap();
        assert_eq!(estimate, serde_json::json!(0.47));
        let raw = serde_json::to_value(PercentChange::Raw("--".into())).unwrap();
        assert_eq!(raw, serde_json::json!("--"));
    }

    #[test]
    fn test_set_holdings_truncates() {
        let mut snapshot = FundSnapshot::settled_only("000001", String::new(), Settlement::default());
        let holdings = (0..15)
            .map(|i| Holding::new(format!("{i:06}"), format!("S{i}"), "1.00%".into()))
            .collect();
        snapshot.set_holdings(holdings);
        assert_eq!(snapshot.holdings.len(), MAX_HOLDINGS);
        assert_eq!(snapshot.holdings[0].code, "000000");
    }
}
