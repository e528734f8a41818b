//! Consensus parameters and staking policy

use crate::constants::*;
use covenant_core::{Fixed, Height};
use serde::{Deserialize, Serialize};

/// Height-gated consensus parameters of one network
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    /// Network name
    pub network: String,
    /// Address every stake burns to
    pub burn_address: String,
    pub blocks_per_day: Height,
    /// Blocks between payout superblocks; also the payout window length
    pub superblock_cycle: Height,
    /// Height from which whale rates are cut and both saturations count
    pub anti_gpu_height: Height,
    /// Height from which the late budget share applies
    pub poom_phaseout_height: Height,
    /// Whale stakes burned at or below this height are never paid
    pub whale_cutover_height: Height,
    pub native_address_version: u8,
    pub dash_address_version: u8,
    pub max_whale_rate: Fixed,
    pub max_dash_rate: Fixed,
    /// Coins
    pub whale_daily_cap: Fixed,
    /// Coins
    pub dash_daily_cap: Fixed,
}

impl ConsensusParams {
    pub fn mainnet() -> Self {
        Self {
            network: "main".into(),
            burn_address: "B4T5ciTCkWauSqVAcVKy88ofjcSasUkSYU".into(),
            blocks_per_day: BLOCKS_PER_DAY,
            superblock_cycle: BLOCKS_PER_DAY,
            anti_gpu_height: 200_000,
            poom_phaseout_height: 215_000,
            whale_cutover_height: 100_000,
            native_address_version: covenant_crypto::NATIVE_ADDRESS_VERSION,
            dash_address_version: covenant_crypto::DASH_ADDRESS_VERSION,
            max_whale_rate: MAX_WHALE_RATE,
            max_dash_rate: MAX_DASH_RATE,
            whale_daily_cap: WHALE_DAILY_CAP,
            dash_daily_cap: DASH_DAILY_CAP,
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: "test".into(),
            burn_address: "yLKSrCjLQFsfVgX8RjdctZ797d54atPjnV".into(),
            anti_gpu_height: 1_000,
            poom_phaseout_height: 2_000,
            whale_cutover_height: 100,
            native_address_version: 140,
            ..Self::mainnet()
        }
    }

    /// Blocks in a payout month
    pub fn blocks_per_month(&self) -> Height {
        self.blocks_per_day * DAYS_PER_MONTH
    }

    /// Whale rate ceiling in force at `height`
    pub fn max_whale_rate_at(&self, height: Height) -> Fixed {
        if height >= self.anti_gpu_height {
            self.max_whale_rate * ANTI_GPU_RATE_FACTOR
        } else {
            self.max_whale_rate
        }
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

/// Node-local admission policy for stakes. Tolerances are fractions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingPolicy {
    /// Dual-asset stakes are rejected while false
    pub dash_stake_enabled: bool,
    /// Minimum USD value of the native side of a dash stake
    pub minimum_stake_usd: Fixed,
    /// Absolute band around the offered rate
    pub rate_tolerance: Fixed,
    pub native_price_tolerance: Fixed,
    pub dash_price_tolerance: Fixed,
    pub btc_price_tolerance: Fixed,
    pub usd_value_tolerance: Fixed,
    /// Blocks a burn height may differ from the tip
    pub height_tolerance: Height,
    /// Seconds a claimed time may lag adjusted time
    pub time_window_past_secs: i64,
    /// Seconds a claimed time may lead adjusted time
    pub time_window_future_secs: i64,
    pub whale_max_annual_saturation: Fixed,
    pub whale_max_monthly_saturation: Fixed,
    pub dash_max_annual_saturation: Fixed,
    pub dash_max_monthly_saturation: Fixed,
    /// Coins one owner may have pending in whale stakes before new requests are refused
    pub max_pending_whale: Fixed,
}

impl Default for StakingPolicy {
    fn default() -> Self {
        let pct = |n: i64| Fixed::from_ratio(n, 100);
        Self {
            dash_stake_enabled: false,
            minimum_stake_usd: pct(25),
            rate_tolerance: Fixed::from_ratio(25, 1_000),
            native_price_tolerance: pct(25),
            dash_price_tolerance: pct(10),
            btc_price_tolerance: pct(10),
            usd_value_tolerance: pct(25),
            height_tolerance: 1,
            time_window_past_secs: 3_600,
            time_window_future_secs: 7_200,
            whale_max_annual_saturation: pct(95),
            whale_max_monthly_saturation: Fixed::ONE,
            dash_max_annual_saturation: pct(95),
            dash_max_monthly_saturation: pct(95),
            max_pending_whale: Fixed::from_int(256_000),
        }
    }
}
