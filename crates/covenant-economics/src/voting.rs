//! Coin-age weighted governance votes
//!
//! A vote is a transaction whose message carries
//! `<coinagevote><gobject/><outcome/><cpk/></coinagevote>`. Its weight is the
//! coin-age of the inputs spent by the vote transaction.

use covenant_core::{
    ChainView, FieldReader, Fixed, PayloadBuilder, Timestamp, Transaction, SECONDS_PER_DAY,
};
use covenant_storage::KeyedCache;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Oldest coin age counted per input, in days
const MAX_AGE_DAYS: i64 = 365;

/// Coin-days destroyed by `tx` in a block stamped `block_time`: for each
/// input, age in days clamped to `[0, 365]` times its amount in coins
pub fn coin_age(chain: &dyn ChainView, tx: &Transaction, block_time: Timestamp) -> Fixed {
    tx.inputs
        .iter()
        .filter_map(|input| chain.transaction_time_and_amount(&input.prevout))
        .map(|(time, amount)| {
            let days = Fixed::from_ratio(block_time - time, SECONDS_PER_DAY)
                .clamp(Fixed::ZERO, Fixed::from_int(MAX_AGE_DAYS));
            days * Fixed::from_amount(amount)
        })
        .sum()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VoteOutcome {
    Yes,
    No,
    Abstain,
}

impl VoteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
            Self::Abstain => "ABSTAIN",
        }
    }
}

impl fmt::Display for VoteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteOutcome {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "YES" => Ok(Self::Yes),
            "NO" => Ok(Self::No),
            "ABSTAIN" => Ok(Self::Abstain),
            _ => Err(()),
        }
    }
}

/// A decoded vote
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinAgeVote {
    /// Governance object hash
    pub gobject: String,
    pub outcome: VoteOutcome,
    /// Voter public key
    pub owner_key: String,
}

impl CoinAgeVote {
    /// Decode the vote carried anywhere in `tx`'s messages
    pub fn from_transaction(tx: &Transaction) -> Option<Self> {
        let message = tx.message();
        let body = covenant_core::extract_tag(&message, "coinagevote");
        if body.is_empty() {
            return None;
        }
        let mut fields = FieldReader::new(body);
        let gobject = fields.text("gobject")?.trim().to_string();
        let outcome = fields.text("outcome")?.parse().ok()?;
        let owner_key = fields.text("cpk")?.trim().to_string();
        Some(Self {
            gobject,
            outcome,
            owner_key,
        })
    }

    pub fn payload(&self) -> String {
        PayloadBuilder::new()
            .field("gobject", &self.gobject)
            .field("outcome", self.outcome)
            .field("cpk", &self.owner_key)
            .wrap("coinagevote")
    }
}

/// Coin-age totals for one governance object
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinAgeTally {
    pub gobject: String,
    pub yes: Fixed,
    pub no: Fixed,
    pub abstain: Fixed,
    pub voters: usize,
}

impl CoinAgeTally {
    pub fn total(&self) -> Fixed {
        self.yes + self.no + self.abstain
    }
}

fn count_section(gobject: &str) -> String {
    format!("COINAGE-VOTE-COUNT-{gobject}")
}

fn sum_section(outcome: VoteOutcome, gobject: &str) -> String {
    format!("COINAGE-VOTE-SUM-{outcome}-{gobject}")
}

/// Vote memory kept in the keyed cache.
///
/// `COINAGE-VOTE-COUNT-<gobject>` maps each voter to their latest outcome;
/// `COINAGE-VOTE-SUM-<outcome>-<gobject>` accumulates each voter's coin-age
/// per outcome. A tally only counts a voter's sum under their latest outcome.
pub struct CoinAgeLedger {
    cache: Arc<dyn KeyedCache>,
}

impl CoinAgeLedger {
    pub fn new(cache: Arc<dyn KeyedCache>) -> Self {
        Self { cache }
    }

    pub fn record(&self, vote: &CoinAgeVote, weight: Fixed, timestamp: Timestamp) {
        self.cache.write(
            &count_section(&vote.gobject),
            &vote.owner_key,
            vote.outcome.as_str(),
            timestamp,
            Default::default(),
        );
        self.cache.update(
            &sum_section(vote.outcome, &vote.gobject),
            &vote.owner_key,
            timestamp,
            &mut |current| {
                let previous = Fixed::parse(current).unwrap_or(Fixed::ZERO);
                (previous + weight).to_string()
            },
        );
    }

    /// Record every vote in a connected block. Returns how many were found.
    pub fn memorize_block(
        &self,
        chain: &dyn ChainView,
        txs: &[Transaction],
        block_time: Timestamp,
    ) -> usize {
        let mut recorded = 0;
        for tx in txs {
            let Some(vote) = CoinAgeVote::from_transaction(tx) else {
                continue;
            };
            let weight = coin_age(chain, tx, block_time);
            debug!(txid = %tx.txid, gobject = %vote.gobject, outcome = %vote.outcome, %weight, "Coin-age vote");
            self.record(&vote, weight, block_time);
            recorded += 1;
        }
        recorded
    }

    pub fn tally(&self, gobject: &str) -> CoinAgeTally {
        let mut tally = CoinAgeTally {
            gobject: gobject.to_string(),
            ..Default::default()
        };
        for (voter, entry) in self.cache.section_entries(&count_section(gobject)) {
            let Ok(outcome) = entry.value.parse::<VoteOutcome>() else {
                continue;
            };
            let weight = Fixed::parse(&self.cache.read_value(&sum_section(outcome, gobject), &voter))
                .unwrap_or(Fixed::ZERO);
            match outcome {
                VoteOutcome::Yes => tally.yes += weight,
                VoteOutcome::No => tally.no += weight,
                VoteOutcome::Abstain => tally.abstain += weight,
            }
            tally.voters += 1;
        }
        tally
    }
}
