//! Built-in ETF listings per market.
//!
//! No free provider exposes a fund list endpoint, so listing requests are
//! answered from this table.

use crate::domain::raw::EtfListing;

const MAINLAND: &[(&str, &str)] = &[
    ("159919", "CSI 300 ETF (SZ)"),
    ("510300", "CSI 300 ETF"),
    ("159915", "ChiNext ETF"),
    ("510500", "CSI 500 ETF"),
    ("159949", "ChiNext 50 ETF"),
    ("512100", "CSI 1000 ETF"),
    ("159928", "Consumer ETF"),
    ("512880", "Securities ETF"),
    ("159995", "Semiconductor ETF"),
    ("515050", "5G ETF"),
];

const US: &[(&str, &str)] = &[
    ("SPY", "SPDR S&P 500 ETF"),
    ("QQQ", "Invesco QQQ ETF"),
    ("IWM", "iShares Russell 2000 ETF"),
    ("VTI", "Vanguard Total Stock Market ETF"),
];

pub const MARKETS: &[&str] = &["A", "US"];

/// Listings for `market` (`A` or `US`, case-insensitive).
pub fn builtin_listings(market: &str) -> Option<Vec<EtfListing>> {
    let table = match market.trim().to_ascii_uppercase().as_str() {
        "A" => MAINLAND,
        "US" => US,
        _ => return None,
    };
    Some(
        table
            .iter()
            .map(|(symbol, name)| EtfListing {
                symbol: symbol.to_string(),
                name: name.to_string(),
            })
            .collect(),
    )
}
