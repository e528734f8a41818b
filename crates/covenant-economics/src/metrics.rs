//! Yield and saturation engine
//!
//! For a target height the engine sums what live stakes owe over rolling
//! windows and derives the rate the network currently offers:
//!
//! ```text
//! start = H - 1 day          month = H + 30 days
//!   due today      claims maturing in [start, H]
//!   burned today   claims of stakes created in [start, H]
//!   due this month claims maturing in [H, month]
//!   future         outstanding claims maturing at or after start
//!
//! monthly saturation = due-this-month net / (budget / 12)
//! annual saturation  = future net / budget
//! offered rate       = max rate x clamp(1 - max(saturations), 0, 1)
//!                      zero once annual saturation passes 0.99
//! ```
//!
//! Windows are keyed on maturity. A whale claims its whole payout; a dash
//! stake claims one month of earnings in the day and month windows and every
//! remaining month in the future window. Per-anniversary payout days are
//! checked separately through `committed_on`.
//!
//! The result is a pure function of the stake set, so two calls over the same
//! chain and mempool state return identical metrics.

use crate::budget::{annual_budget, max_rate_for_height, SuperblockSchedule};
use crate::constants::{DAYS_PER_MONTH, RATE_CUTOFF_SATURATION};
use crate::params::ConsensusParams;
use crate::registry::StakeRegistry;
use crate::stake::{DashStake, StakeKind, WhaleStake};
use covenant_core::{Fixed, Height, TxId};
use serde::{Deserialize, Serialize};

/// One payout a stake will make
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DuePayment {
    pub height: Height,
    /// Coins paid out
    pub gross: Fixed,
    /// Coins paid beyond returned principal
    pub net: Fixed,
}

/// What a stake claims, as counted by the saturation windows
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Claim {
    pub maturity_height: Height,
    /// Counted by the day and month windows
    pub gross: Fixed,
    pub net: Fixed,
    /// Counted by the future window
    pub outstanding_gross: Fixed,
    pub outstanding_net: Fixed,
}

/// A stake seen as a stream of future payouts
pub trait Commitment {
    fn txid(&self) -> TxId;

    fn kind(&self) -> StakeKind;

    fn creation_height(&self) -> Height;

    fn claim(&self) -> Claim;

    fn payments(&self, params: &ConsensusParams) -> Vec<DuePayment>;

    /// Superblocks that settle this stake's payouts
    fn payout_heights(&self, params: &ConsensusParams) -> Vec<Height> {
        let schedule = SuperblockSchedule::from_params(params);
        self.payments(params)
            .iter()
            .map(|p| schedule.superblock_at_or_after(p.height))
            .collect()
    }
}

impl Commitment for WhaleStake {
    fn txid(&self) -> TxId {
        self.txid
    }

    fn kind(&self) -> StakeKind {
        StakeKind::Whale
    }

    fn creation_height(&self) -> Height {
        self.burn_height
    }

    fn claim(&self) -> Claim {
        Claim {
            maturity_height: self.maturity_height,
            gross: self.total_owed,
            net: self.reward,
            outstanding_gross: self.total_owed,
            outstanding_net: self.reward,
        }
    }

    fn payments(&self, _params: &ConsensusParams) -> Vec<DuePayment> {
        vec![DuePayment {
            height: self.maturity_height,
            gross: self.total_owed,
            net: self.reward,
        }]
    }
}

impl Commitment for DashStake {
    fn txid(&self) -> TxId {
        self.txid
    }

    fn kind(&self) -> StakeKind {
        StakeKind::Dash
    }

    fn creation_height(&self) -> Height {
        self.burn_height
    }

    fn claim(&self) -> Claim {
        let outstanding = self
            .monthly_earnings
            .mul_int(self.duration_days)
            .div_int(DAYS_PER_MONTH)
            .unwrap_or(Fixed::ZERO);
        Claim {
            maturity_height: self.maturity_height,
            gross: self.monthly_earnings,
            net: self.monthly_earnings,
            outstanding_gross: outstanding,
            outstanding_net: outstanding,
        }
    }

    fn payments(&self, params: &ConsensusParams) -> Vec<DuePayment> {
        self.anniversaries(params)
            .into_iter()
            .map(|height| DuePayment {
                height,
                gross: self.monthly_earnings,
                net: self.monthly_earnings,
            })
            .collect()
    }
}

/// Saturation snapshot for one stake kind at one height
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldMetric {
    pub kind: StakeKind,
    pub height: Height,
    pub stakes: usize,
    pub due_today_gross: Fixed,
    pub due_today_net: Fixed,
    pub burned_today_gross: Fixed,
    pub burned_today_net: Fixed,
    pub due_month_gross: Fixed,
    pub due_month_net: Fixed,
    pub future_gross: Fixed,
    pub future_net: Fixed,
    pub annual_budget: Fixed,
    pub monthly_budget: Fixed,
    /// Unclamped; may exceed one
    pub monthly_saturation: Fixed,
    pub annual_saturation: Fixed,
    pub max_rate: Fixed,
    /// Rounded to 4 places
    pub offered_rate: Fixed,
}

impl YieldMetric {
    /// Aggregate `stakes` at `height` against `annual_budget`
    pub fn compute(
        kind: StakeKind,
        height: Height,
        stakes: &[&dyn Commitment],
        params: &ConsensusParams,
        annual_budget: Fixed,
    ) -> Self {
        let start = height - params.blocks_per_day;
        let month_end = height + params.blocks_per_month();
        let max_rate = max_rate_for_height(params, kind, height);
        let monthly_budget = annual_budget.div_int(12).unwrap_or(Fixed::ZERO);

        let mut metric = Self {
            kind,
            height,
            stakes: stakes.len(),
            due_today_gross: Fixed::ZERO,
            due_today_net: Fixed::ZERO,
            burned_today_gross: Fixed::ZERO,
            burned_today_net: Fixed::ZERO,
            due_month_gross: Fixed::ZERO,
            due_month_net: Fixed::ZERO,
            future_gross: Fixed::ZERO,
            future_net: Fixed::ZERO,
            annual_budget,
            monthly_budget,
            monthly_saturation: Fixed::ZERO,
            annual_saturation: Fixed::ZERO,
            max_rate,
            offered_rate: Fixed::ZERO,
        };

        for stake in stakes {
            let claim = stake.claim();
            if (start..=height).contains(&claim.maturity_height) {
                metric.due_today_gross += claim.gross;
                metric.due_today_net += claim.net;
            }
            if (start..=height).contains(&stake.creation_height()) {
                metric.burned_today_gross += claim.gross;
                metric.burned_today_net += claim.net;
            }
            if (height..=month_end).contains(&claim.maturity_height) {
                metric.due_month_gross += claim.gross;
                metric.due_month_net += claim.net;
            }
            if claim.maturity_height >= start {
                metric.future_gross += claim.outstanding_gross;
                metric.future_net += claim.outstanding_net;
            }
        }

        metric.monthly_saturation = metric
            .due_month_net
            .checked_div(monthly_budget)
            .unwrap_or(Fixed::ZERO);
        metric.annual_saturation = metric
            .future_net
            .checked_div(annual_budget)
            .unwrap_or(Fixed::ZERO);

        let annual_counts = kind == StakeKind::Dash || height >= params.anti_gpu_height;
        let binding = if annual_counts {
            metric.monthly_saturation.max(metric.annual_saturation)
        } else {
            metric.monthly_saturation
        };
        let available = (Fixed::ONE - binding).clamp(Fixed::ZERO, Fixed::ONE);
        metric.offered_rate = if metric.annual_saturation > RATE_CUTOFF_SATURATION {
            Fixed::ZERO
        } else {
            (max_rate * available).round_dp(4)
        };
        metric
    }
}

/// Metric queries over the registry's live stakes
pub struct YieldEngine<'a> {
    registry: &'a StakeRegistry,
}

impl<'a> YieldEngine<'a> {
    pub fn new(registry: &'a StakeRegistry) -> Self {
        Self { registry }
    }

    fn commitments(
        &self,
        kind: StakeKind,
        include_mempool: bool,
        exclude: Option<TxId>,
    ) -> Vec<Box<dyn Commitment>> {
        let keep = |txid: TxId| Some(txid) != exclude;
        match kind {
            StakeKind::Whale => self
                .registry
                .whale_stakes(include_mempool)
                .into_iter()
                .filter(|s| keep(s.txid))
                .map(|s| Box::new(s) as Box<dyn Commitment>)
                .collect(),
            StakeKind::Dash => self
                .registry
                .dash_stakes(include_mempool)
                .into_iter()
                .filter(|s| keep(s.txid))
                .map(|s| Box::new(s) as Box<dyn Commitment>)
                .collect(),
        }
    }

    /// Metric for `kind` at `height`, leaving out `exclude`
    pub fn metric(
        &self,
        kind: StakeKind,
        height: Height,
        include_mempool: bool,
        exclude: Option<TxId>,
    ) -> YieldMetric {
        let ctx = self.registry.context();
        let stakes = self.commitments(kind, include_mempool, exclude);
        let refs: Vec<&dyn Commitment> = stakes.iter().map(|s| s.as_ref()).collect();
        let budget = annual_budget(&ctx.params, ctx.chain.as_ref(), height);
        YieldMetric::compute(kind, height, &refs, &ctx.params, budget)
    }

    pub fn whale_metric(&self, height: Height, include_mempool: bool) -> YieldMetric {
        self.metric(StakeKind::Whale, height, include_mempool, None)
    }

    pub fn dash_metric(&self, height: Height, include_mempool: bool) -> YieldMetric {
        self.metric(StakeKind::Dash, height, include_mempool, None)
    }

    pub fn offered_rate(&self, kind: StakeKind, height: Height, include_mempool: bool) -> Fixed {
        self.metric(kind, height, include_mempool, None).offered_rate
    }

    /// Gross coins already owed at superblock `payout_height` by live stakes
    /// (pending included), leaving out `exclude`
    pub fn committed_on(&self, kind: StakeKind, payout_height: Height, exclude: Option<TxId>) -> Fixed {
        let params = &self.registry.context().params;
        let schedule = SuperblockSchedule::from_params(params);
        self.commitments(kind, true, exclude)
            .iter()
            .flat_map(|stake| stake.payments(params))
            .filter(|p| schedule.superblock_at_or_after(p.height) == payout_height)
            .map(|p| p.gross)
            .sum()
    }
}
