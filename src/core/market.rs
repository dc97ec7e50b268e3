//! Exchange inference for security codes

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Market {
    Shanghai,
    Shenzhen,
    Beijing,
    HongKong,
}

impl Market {
    /// Infers the listing market from a bare security code.
    ///
    /// Six-digit codes map by leading digit (`6`/`9` Shanghai, `4`/`8` Beijing,
    /// anything else Shenzhen); five-digit codes are Hong Kong listings.
    pub fn of(code: &str) -> Option<Market> {
        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        match code.len() {
            6 => Some(match code.as_bytes()[0] {
                b'6' | b'9' => Market::Shanghai,
                b'4' | b'8' => Market::Beijing,
                _ => Market::Shenzhen,
            }),
            5 => Some(Market::HongKong),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Market::Shanghai => "sh",
            Market::Shenzhen => "sz",
            Market::Beijing => "bj",
            Market::HongKong => "hk",
        }
    }
}

pub fn market_prefix(code: &str) -> Option<&'static str> {
    Market::of(code).map(|m| m.prefix())
}

/// Quote symbol for a listed security, e.g. `s_sh600519`.
pub fn stock_symbol(code: &str) -> Option<String> {
    market_prefix(code).map(|prefix| format!("s_{prefix}{code}"))
}

/// Quote symbol for a fund's settled NAV, e.g. `jj000001`.
pub fn fund_symbol(code: &str) -> String {
    format!("jj{code}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_prefix() {
        assert_eq!(market_prefix("600519"), Some("sh"));
        assert_eq!(market_prefix("900901"), Some("sh"));
        assert_eq!(market_prefix("000001"), Some("sz"));
        assert_eq!(market_prefix("300750"), Some("sz"));
        assert_eq!(market_prefix("430047"), Some("bj"));
        assert_eq!(market_prefix("830799"), Some("bj"));
        assert_eq!(market_prefix("00700"), Some("hk"));
    }

    #[test]
    fn test_market_prefix_rejects_other_shapes() {
        assert_eq!(market_prefix(""), None);
        assert_eq!(market_prefix("AAPL"), None);
        assert_eq!(market_prefix("1234"), None);
        assert_eq!(market_prefix("6005190"), None);
        assert_eq!(market_prefix("60051a"), None);
    }

    #[test]
    fn test_symbols() {
        assert_eq!(stock_symbol("600519").as_deref(), Some("s_sh600519"));
        assert_eq!(stock_symbol("00700").as_deref(), Some("s_hk00700"));
        assert_eq!(stock_symbol("TSLA"), None);
        assert_eq!(fund_symbol("110022"), "jj110022");
    }
}
