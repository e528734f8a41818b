//! # Covenant Economics - Stake Commitments
//!
//! Consensus rules for time-locked stakes sent to the burn address.
//!
//! ## Stake kinds
//!
//! | Kind  | Backing | Duration | Paid |
//! |-------|---------|----------|------|
//! | Whale | native coins burned in the stake transaction | 7-365 days | once, principal + reward, at maturity |
//! | Dash  | a native UTXO and a Dash UTXO, both signed, valued through the oracle | 150-200 days | monthly, from the burn height until maturity |
//!
//! ## Pipeline
//!
//! ```text
//! block connect ──► StakeRegistry::memorize_block ──► DWS-BURN / DASH-BURN sections
//!                                                        │
//!       candidate tx ──► validation ◄── YieldEngine ◄────┤ (re-parsed on read)
//!                                                        │
//!       superblock height ──► PayoutSelector ◄───────────┘
//! ```
//!
//! Stakes are never stored in derived form: the cache only remembers which
//! transactions are stakes, and every read re-parses the transaction.

pub mod budget;
pub mod metrics;
pub mod params;
pub mod payout;
pub mod registry;
pub mod scaling;
pub mod stake;
pub mod validation;
pub mod voting;

#[cfg(test)]
mod fixtures;

pub use budget::{annual_budget, max_rate_for_height, SuperblockSchedule};
pub use metrics::{Claim, Commitment, YieldEngine, YieldMetric};
pub use params::{ConsensusParams, StakingPolicy};
pub use payout::{Payout, PayoutSchedule, PayoutSelector};
pub use registry::{StakeContext, StakeRegistry};
pub use scaling::{owed_amount, scaled_yield, tag_payout, within_tolerance};
pub use stake::{
    parse_dash_stake, parse_whale_stake, DashStake, DashStakeRequest, StakeKind, WhaleStake,
    WhaleStakeRequest,
};
pub use validation::{
    Rejection, RejectionKind, StakeValidator, ValidationContext, ValidationStage, Verdict,
};
pub use voting::{coin_age, CoinAgeLedger, CoinAgeTally, CoinAgeVote, VoteOutcome};

/// Consensus constants
pub mod constants {
    use covenant_core::{Amount, Fixed, Height, COIN};

    /// Blocks mined per day
    pub const BLOCKS_PER_DAY: Height = 205;

    /// Days in a payout month
    pub const DAYS_PER_MONTH: i64 = 30;

    /// Days in a staking year
    pub const DAYS_PER_YEAR: i64 = 365;

    /// Days per budget year (12 payout months)
    pub const BUDGET_DAYS_PER_YEAR: i64 = 360;

    // === Rates ===

    /// Hard maximum whale rate (2.0)
    pub const MAX_WHALE_RATE: Fixed = Fixed::from_int(2);

    /// Whale rate multiplier once `anti_gpu_height` is reached (0.35)
    pub const ANTI_GPU_RATE_FACTOR: Fixed = Fixed::from_raw(350_000_000_000);

    /// Hard maximum dash-stake rate (0.20)
    pub const MAX_DASH_RATE: Fixed = Fixed::from_raw(200_000_000_000);

    /// Lowest rate a stake may claim (0.01)
    pub const MIN_CLAIMED_RATE: Fixed = Fixed::from_raw(10_000_000_000);

    /// Annual saturation above which the offered rate is zero (0.99)
    pub const RATE_CUTOFF_SATURATION: Fixed = Fixed::from_raw(990_000_000_000);

    // === Bounds ===

    pub const WHALE_MIN_DAYS: i64 = 7;
    pub const WHALE_MAX_DAYS: i64 = 365;
    pub const DASH_MIN_DAYS: i64 = 150;
    pub const DASH_MAX_DAYS: i64 = 200;

    pub const WHALE_MIN_AMOUNT: Amount = 100 * COIN;
    pub const WHALE_MAX_AMOUNT: Amount = 1_000_000 * COIN;
    pub const DASH_MIN_NATIVE_AMOUNT: Amount = 1_000 * COIN;
    pub const DASH_MAX_NATIVE_AMOUNT: Amount = 10_000_000 * COIN;

    /// Smallest Dash amount a stake may claim (0.000001 DASH)
    pub const DASH_MIN_EXTERNAL_AMOUNT: Amount = 100;

    // === Budget ===

    /// Share of the yearly subsidy budgeted before `anti_gpu_height` (10%)
    pub const BUDGET_SHARE_EARLY: Fixed = Fixed::from_raw(100_000_000_000);

    /// Share until `poom_phaseout_height` (32.5%)
    pub const BUDGET_SHARE_MIDDLE: Fixed = Fixed::from_raw(325_000_000_000);

    /// Share after `poom_phaseout_height` (64%)
    pub const BUDGET_SHARE_LATE: Fixed = Fixed::from_raw(640_000_000_000);

    /// Whale daily payout cap, coins
    pub const WHALE_DAILY_CAP: Fixed = Fixed::from_int(5_000_000);

    /// Dash daily payout cap, coins
    pub const DASH_DAILY_CAP: Fixed = Fixed::from_int(1_000_000);

    /// Subtracted from the clamp ratio when a payout day exceeds its cap (0.01)
    pub const PAYOUT_CLAMP_MARGIN: Fixed = Fixed::from_raw(10_000_000_000);

    // === Payout tagging ===

    /// Fraction appended to rounded whale payouts (0.1527)
    pub const WHALE_PAYOUT_TAG: Fixed = Fixed::from_raw(152_700_000_000);

    /// Fraction appended to rounded dash monthly earnings (0.1528)
    pub const DASH_PAYOUT_TAG: Fixed = Fixed::from_raw(152_800_000_000);

    // === Cache sections and message kinds ===

    pub const WHALE_BURN_SECTION: &str = "DWS-BURN";
    pub const DASH_BURN_SECTION: &str = "DASH-BURN";
    pub const WHALE_MESSAGE_KIND: &str = "DWS";
    pub const DASH_MESSAGE_KIND: &str = "DASHSTAKE";
}
