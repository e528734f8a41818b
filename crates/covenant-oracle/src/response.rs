//! Oracle response decoders

use covenant_core::{extract_tag, Amount, Fixed};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum length of an external UTXO id for a record to be accepted
const MIN_UTXO_ID_LEN: usize = 32;

/// Asset priced by the oracle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Asset {
    /// Native coin, quoted in BTC
    Native,
    /// Dash, quoted in BTC
    Dash,
    /// Bitcoin, quoted in USD
    Btc,
}

impl Asset {
    pub const ALL: [Asset; 3] = [Asset::Native, Asset::Dash, Asset::Btc];

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Dash => "dash",
            Self::Btc => "btc",
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// UTXO on the external chain, as last reported by the oracle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUtxo {
    /// `<txid>-<index>` on the external chain
    pub id: String,
    /// Base units, from a 4-decimal quote
    pub amount: Amount,
    pub address: String,
    /// Origin network tag
    pub network: String,
    pub spent: bool,
}

impl ExternalUtxo {
    /// Amount usable as stake backing: zero once spent
    pub fn live_amount(&self) -> Amount {
        if self.spent {
            0
        } else {
            self.amount
        }
    }
}

/// Decode a flat list of `<utxo>..` blocks. Blocks with a short or missing id
/// are dropped.
pub fn parse_utxo_response(text: &str) -> Vec<ExternalUtxo> {
    text.split("<utxo>")
        .filter_map(|block| {
            let id = extract_tag(block, "hash").trim();
            if id.len() < MIN_UTXO_ID_LEN {
                return None;
            }
            let amount = Fixed::parse_dp(extract_tag(block, "amount"), 4)
                .map(Fixed::to_amount)
                .unwrap_or(0);
            let spent = Fixed::parse(extract_tag(block, "spent"))
                .map(|v| v.trunc_int() != 0)
                .unwrap_or(false);
            Some(ExternalUtxo {
                id: id.to_string(),
                amount,
                address: extract_tag(block, "address").trim().to_string(),
                network: extract_tag(block, "network").trim().to_string(),
                spent,
            })
        })
        .collect()
}

/// Decode a single price quote, either bare or wrapped in `<price>`.
/// Non-positive quotes are rejected.
pub fn parse_price_response(text: &str) -> Option<Fixed> {
    let tagged = extract_tag(text, "price");
    let raw = if tagged.is_empty() { text } else { tagged };
    Fixed::parse(raw).filter(|p| p.is_positive())
}
