//! Stake admission
//!
//! Each candidate runs through a fixed sequence of stages and stops at the
//! first failure:
//!
//! ```text
//! Parse -> Bounds -> HeightWindow -> RateTolerance -> PriceTolerance*
//!       -> DuplicateUtxo* -> Signature* -> Saturation -> Accept
//!                                             (* dash stakes only)
//! ```
//!
//! Validation only reads. Every figure is re-derived from the ledger, the
//! cached oracle data and the registry; the oracle is never refreshed here.

use crate::budget::SuperblockSchedule;
use crate::constants::*;
use crate::metrics::{Commitment, YieldEngine, YieldMetric};
use crate::registry::StakeRegistry;
use crate::scaling::within_tolerance;
use crate::stake::{DashStake, StakeKind, WhaleStake};
use covenant_core::{ChainView, Fixed, Height, Result, Timestamp, Transaction, TxId};
use covenant_crypto::Address;
use covenant_oracle::{Asset, Freshness};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Validation stage, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValidationStage {
    Parse,
    Bounds,
    HeightWindow,
    RateTolerance,
    PriceTolerance,
    DuplicateUtxo,
    Signature,
    Saturation,
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parse => "parse",
            Self::Bounds => "bounds",
            Self::HeightWindow => "height-window",
            Self::RateTolerance => "rate-tolerance",
            Self::PriceTolerance => "price-tolerance",
            Self::DuplicateUtxo => "duplicate-utxo",
            Self::Signature => "signature",
            Self::Saturation => "saturation",
        };
        f.write_str(name)
    }
}

/// Class of a rejection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionKind {
    BoundsViolation,
    ToleranceViolation,
    DuplicateCommitment,
    SaturationExceeded,
    /// Required oracle data is missing or stale
    OracleUnavailable,
    UtxoSpent,
    InvalidSignature,
    FeatureDisabled,
}

/// Why a stake was refused
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub stage: ValidationStage,
    pub kind: RejectionKind,
    pub reason: String,
}

impl Rejection {
    fn new(stage: ValidationStage, kind: RejectionKind, reason: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} check failed: {}", self.stage, self.reason)
    }
}

/// Figures behind an accepted stake
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acceptance {
    pub kind: StakeKind,
    pub txid: TxId,
    pub offered_rate: Fixed,
    pub monthly_saturation: Fixed,
    pub annual_saturation: Fixed,
}

/// Outcome of validating one transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accepted(Acceptance),
    Rejected(Rejection),
    /// No decodable stake; the transaction is not judged here
    NotAStake,
}

impl Verdict {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

/// Tip and time the candidate is judged against
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationContext {
    pub tip_height: Height,
    pub adjusted_time: Timestamp,
}

impl ValidationContext {
    pub fn from_chain(chain: &dyn ChainView) -> Self {
        Self {
            tip_height: chain.tip_height(),
            adjusted_time: chain.adjusted_time(),
        }
    }
}

type Stage = std::result::Result<(), Rejection>;

fn fail(stage: ValidationStage, kind: RejectionKind, reason: impl Into<String>) -> Stage {
    Err(Rejection::new(stage, kind, reason))
}

/// Consensus validator for stake transactions
pub struct StakeValidator<'a> {
    registry: &'a StakeRegistry,
}

impl<'a> StakeValidator<'a> {
    pub fn new(registry: &'a StakeRegistry) -> Self {
        Self { registry }
    }

    /// Judge `tx`. Bad stakes come back as `Ok(Verdict::Rejected)`.
    pub fn validate(&self, tx: &Transaction, ctx: &ValidationContext) -> Result<Verdict> {
        let params = self.registry.params();
        let verdict = match StakeKind::of_transaction(tx, params) {
            Some(StakeKind::Whale) => {
                let stake = self.registry.parse_whale(tx);
                if !stake.found {
                    Verdict::NotAStake
                } else {
                    self.settle(StakeKind::Whale, tx.txid, self.check_whale(&stake, ctx))
                }
            }
            Some(StakeKind::Dash) => {
                let stake = self.registry.parse_dash(tx);
                if !stake.found {
                    Verdict::NotAStake
                } else {
                    self.settle(StakeKind::Dash, tx.txid, self.check_dash(&stake, ctx))
                }
            }
            None => Verdict::NotAStake,
        };
        Ok(verdict)
    }

    fn settle(
        &self,
        kind: StakeKind,
        txid: TxId,
        outcome: std::result::Result<YieldMetric, Rejection>,
    ) -> Verdict {
        match outcome {
            Ok(metric) => {
                info!(
                    %txid,
                    %kind,
                    offered_rate = %metric.offered_rate,
                    monthly_saturation = %metric.monthly_saturation,
                    annual_saturation = %metric.annual_saturation,
                    "Stake accepted"
                );
                Verdict::Accepted(Acceptance {
                    kind,
                    txid,
                    offered_rate: metric.offered_rate,
                    monthly_saturation: metric.monthly_saturation,
                    annual_saturation: metric.annual_saturation,
                })
            }
            Err(rejection) => {
                info!(%txid, %kind, stage = %rejection.stage, reason = %rejection.reason, "Stake rejected");
                Verdict::Rejected(rejection)
            }
        }
    }

    fn check_height_and_time(
        &self,
        height: Height,
        time: Timestamp,
        ctx: &ValidationContext,
    ) -> Stage {
        let policy = &self.registry.context().policy;
        if (height - ctx.tip_height).abs() > policy.height_tolerance {
            return fail(
                ValidationStage::HeightWindow,
                RejectionKind::BoundsViolation,
                format!("burn height {height} too far from tip {}", ctx.tip_height),
            );
        }
        let earliest = ctx.adjusted_time - policy.time_window_past_secs;
        let latest = ctx.adjusted_time + policy.time_window_future_secs;
        if time < earliest || time > latest {
            return fail(
                ValidationStage::HeightWindow,
                RejectionKind::BoundsViolation,
                format!("burn time {time} outside [{earliest}, {latest}]"),
            );
        }
        Ok(())
    }

    /// Claimed rate must be in range and close to both the mempool-inclusive
    /// and the confirmed-only offered rates. Returns the mempool-inclusive
    /// metric for the saturation stage.
    fn check_rate(
        &self,
        kind: StakeKind,
        txid: TxId,
        claimed: Fixed,
        max_rate: Fixed,
        ctx: &ValidationContext,
    ) -> std::result::Result<YieldMetric, Rejection> {
        let stage = ValidationStage::RateTolerance;
        if claimed < MIN_CLAIMED_RATE || claimed > max_rate {
            return Err(Rejection::new(
                stage,
                RejectionKind::BoundsViolation,
                format!("rate {claimed} outside [{MIN_CLAIMED_RATE}, {max_rate}]"),
            ));
        }
        let engine = YieldEngine::new(self.registry);
        let live = engine.metric(kind, ctx.tip_height, true, Some(txid));
        let history = engine.metric(kind, ctx.tip_height, false, Some(txid));
        let tolerance = self.registry.context().policy.rate_tolerance;
        for offered in [live.offered_rate, history.offered_rate] {
            if (claimed - offered).abs() > tolerance {
                return Err(Rejection::new(
                    stage,
                    RejectionKind::ToleranceViolation,
                    format!("rate {claimed} not within {tolerance} of offered {offered}"),
                ));
            }
        }
        Ok(live)
    }

    /// Cap check for every superblock the stake pays at
    fn check_payout_days(
        &self,
        kind: StakeKind,
        txid: TxId,
        payments: &[(Height, Fixed)],
        cap: Fixed,
    ) -> Stage {
        let engine = YieldEngine::new(self.registry);
        for (payout_height, amount) in payments {
            let committed = engine.committed_on(kind, *payout_height, Some(txid));
            if committed + *amount > cap {
                return fail(
                    ValidationStage::Saturation,
                    RejectionKind::SaturationExceeded,
                    format!(
                        "payout day {payout_height} would owe {} over cap {cap}",
                        committed + *amount
                    ),
                );
            }
        }
        Ok(())
    }

    fn check_whale(
        &self,
        stake: &WhaleStake,
        ctx: &ValidationContext,
    ) -> std::result::Result<YieldMetric, Rejection> {
        let params = self.registry.params();
        let policy = &self.registry.context().policy;

        if !(WHALE_MIN_DAYS..=WHALE_MAX_DAYS).contains(&stake.duration_days) {
            return Err(Rejection::new(
                ValidationStage::Bounds,
                RejectionKind::BoundsViolation,
                format!("duration {} days outside [{WHALE_MIN_DAYS}, {WHALE_MAX_DAYS}]", stake.duration_days),
            ));
        }
        if !(WHALE_MIN_AMOUNT..=WHALE_MAX_AMOUNT).contains(&stake.amount) {
            return Err(Rejection::new(
                ValidationStage::Bounds,
                RejectionKind::BoundsViolation,
                format!("amount {} coins outside bounds", stake.coins()),
            ));
        }

        self.check_height_and_time(stake.burn_height, stake.burn_time, ctx)?;

        let max_rate = params.max_whale_rate_at(ctx.tip_height);
        let metric = self.check_rate(StakeKind::Whale, stake.txid, stake.claimed_rate, max_rate, ctx)?;

        let stage = ValidationStage::Saturation;
        if metric.annual_saturation > policy.whale_max_annual_saturation {
            return Err(Rejection::new(
                stage,
                RejectionKind::SaturationExceeded,
                format!("annual saturation {} too high", metric.annual_saturation),
            ));
        }
        if metric.monthly_saturation > policy.whale_max_monthly_saturation {
            return Err(Rejection::new(
                stage,
                RejectionKind::SaturationExceeded,
                format!("monthly saturation {} too high", metric.monthly_saturation),
            ));
        }
        let burned = metric.burned_today_gross + stake.coins() + Fixed::ONE;
        if burned > params.whale_daily_cap {
            return Err(Rejection::new(
                stage,
                RejectionKind::SaturationExceeded,
                format!("today's burns {burned} over cap {}", params.whale_daily_cap),
            ));
        }
        let payments: Vec<(Height, Fixed)> = stake
            .payout_heights(params)
            .into_iter()
            .map(|h| (h, stake.total_owed))
            .collect();
        self.check_payout_days(StakeKind::Whale, stake.txid, &payments, params.whale_daily_cap)?;
        Ok(metric)
    }

    /// Cached oracle price, which must be fresh
    fn fresh_price(&self, asset: Asset) -> std::result::Result<Fixed, Rejection> {
        match self.registry.context().oracle.price(asset) {
            Freshness::Fresh(price) => Ok(price),
            Freshness::Stale(_) => Err(Rejection::new(
                ValidationStage::PriceTolerance,
                RejectionKind::OracleUnavailable,
                format!("cannot verify: {asset} price is stale"),
            )),
            Freshness::Missing => Err(Rejection::new(
                ValidationStage::PriceTolerance,
                RejectionKind::OracleUnavailable,
                format!("cannot verify: no {asset} price"),
            )),
        }
    }

    fn check_prices(&self, stake: &DashStake) -> Stage {
        let stage = ValidationStage::PriceTolerance;
        let ctx = self.registry.context();
        let policy = &ctx.policy;

        if !ctx.oracle.query_utxo(&stake.dash_utxo).is_fresh() {
            return fail(
                stage,
                RejectionKind::OracleUnavailable,
                format!("cannot verify: dash utxo {} not freshly indexed", stake.dash_utxo),
            );
        }
        if stake.spent {
            return fail(
                stage,
                RejectionKind::UtxoSpent,
                format!(
                    "UTXO spent (native {} / dash {})",
                    stake.native_amount, stake.dash_amount
                ),
            );
        }

        let native_price = self.fresh_price(Asset::Native)?;
        let dash_price = self.fresh_price(Asset::Dash)?;
        let btc_price = self.fresh_price(Asset::Btc)?;
        if native_price.is_zero() {
            return fail(stage, RejectionKind::OracleUnavailable, "cannot verify: native price is zero");
        }

        let quotes = [
            ("native", native_price, stake.native_price, policy.native_price_tolerance),
            ("dash", dash_price, stake.dash_price, policy.dash_price_tolerance),
            ("btc", btc_price, stake.btc_price, policy.btc_price_tolerance),
        ];
        for (name, actual, claimed, tolerance) in quotes {
            if !within_tolerance(actual, claimed, tolerance) {
                return fail(
                    stage,
                    RejectionKind::ToleranceViolation,
                    format!("{name} price {claimed} not within {tolerance} of {actual}"),
                );
            }
        }

        let native_usd = stake.native_coins() * native_price * btc_price;
        let dash_usd = stake.dash_coins() * dash_price * btc_price;
        let values = [
            ("native", native_usd, stake.native_value_usd),
            ("dash", dash_usd, stake.dash_value_usd),
        ];
        for (name, actual, claimed) in values {
            if !within_tolerance(actual, claimed, policy.usd_value_tolerance) {
                return fail(
                    stage,
                    RejectionKind::ToleranceViolation,
                    format!("{name} USD value {claimed} not within tolerance of {actual}"),
                );
            }
        }
        if native_usd < policy.minimum_stake_usd {
            return fail(
                stage,
                RejectionKind::BoundsViolation,
                format!("stake worth {native_usd} USD, minimum {}", policy.minimum_stake_usd),
            );
        }
        Ok(())
    }

    fn check_dash(
        &self,
        stake: &DashStake,
        ctx: &ValidationContext,
    ) -> std::result::Result<YieldMetric, Rejection> {
        let params = self.registry.params();
        let policy = &self.registry.context().policy;
        let bounds = ValidationStage::Bounds;

        if !policy.dash_stake_enabled {
            return Err(Rejection::new(
                bounds,
                RejectionKind::FeatureDisabled,
                "dash stakes are disabled",
            ));
        }
        if !(DASH_MIN_DAYS..=DASH_MAX_DAYS).contains(&stake.duration_days) {
            return Err(Rejection::new(
                bounds,
                RejectionKind::BoundsViolation,
                format!("duration {} days outside [{DASH_MIN_DAYS}, {DASH_MAX_DAYS}]", stake.duration_days),
            ));
        }
        if !(DASH_MIN_NATIVE_AMOUNT..=DASH_MAX_NATIVE_AMOUNT).contains(&stake.claimed_native_amount) {
            return Err(Rejection::new(
                bounds,
                RejectionKind::BoundsViolation,
                format!(
                    "native amount {} coins outside bounds",
                    Fixed::from_amount(stake.claimed_native_amount)
                ),
            ));
        }
        if stake.claimed_dash_amount < DASH_MIN_EXTERNAL_AMOUNT {
            return Err(Rejection::new(
                bounds,
                RejectionKind::BoundsViolation,
                "dash amount too small",
            ));
        }
        if !Address::is_valid(&stake.return_address, params.native_address_version) {
            return Err(Rejection::new(
                bounds,
                RejectionKind::BoundsViolation,
                format!("invalid return address {}", stake.return_address),
            ));
        }

        self.check_height_and_time(stake.burn_height, stake.burn_time, ctx)?;
        let metric = self.check_rate(StakeKind::Dash, stake.txid, stake.claimed_rate, params.max_dash_rate, ctx)?;
        self.check_prices(stake)?;

        for utxo in [&stake.native_utxo, &stake.dash_utxo] {
            if self.registry.is_duplicate_utxo(utxo, Some(stake.txid), ctx.tip_height) {
                return Err(Rejection::new(
                    ValidationStage::DuplicateUtxo,
                    RejectionKind::DuplicateCommitment,
                    format!("utxo {utxo} already pledged"),
                ));
            }
        }

        if !stake.native_signature_valid {
            return Err(Rejection::new(
                ValidationStage::Signature,
                RejectionKind::InvalidSignature,
                format!("native utxo {} not signed by its owner", stake.native_utxo),
            ));
        }
        if !stake.dash_signature_valid {
            return Err(Rejection::new(
                ValidationStage::Signature,
                RejectionKind::InvalidSignature,
                format!("dash utxo {} not signed by its owner", stake.dash_utxo),
            ));
        }

        let stage = ValidationStage::Saturation;
        if metric.annual_saturation > policy.dash_max_annual_saturation {
            return Err(Rejection::new(
                stage,
                RejectionKind::SaturationExceeded,
                format!("annual saturation {} too high", metric.annual_saturation),
            ));
        }
        if metric.monthly_saturation > policy.dash_max_monthly_saturation {
            return Err(Rejection::new(
                stage,
                RejectionKind::SaturationExceeded,
                format!("monthly saturation {} too high", metric.monthly_saturation),
            ));
        }
        if metric.due_today_gross + stake.monthly_earnings > params.dash_daily_cap {
            return Err(Rejection::new(
                stage,
                RejectionKind::SaturationExceeded,
                format!("today's payouts would exceed cap {}", params.dash_daily_cap),
            ));
        }
        let schedule = SuperblockSchedule::from_params(params);
        let payments: Vec<(Height, Fixed)> = stake
            .anniversaries(params)
            .into_iter()
            .map(|h| (schedule.superblock_at_or_after(h), stake.monthly_earnings))
            .collect();
        self.check_payout_days(StakeKind::Dash, stake.txid, &payments, params.dash_daily_cap)?;
        Ok(metric)
    }
}
