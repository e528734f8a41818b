//! Reward budget and superblock schedule

use crate::constants::*;
use crate::params::ConsensusParams;
use crate::stake::StakeKind;
use covenant_core::{ChainView, Fixed, Height};

/// Share of the yearly subsidy set aside for stake rewards at `height`
pub fn budget_share(params: &ConsensusParams, height: Height) -> Fixed {
    if height < params.anti_gpu_height {
        BUDGET_SHARE_EARLY
    } else if height <= params.poom_phaseout_height {
        BUDGET_SHARE_MIDDLE
    } else {
        BUDGET_SHARE_LATE
    }
}

/// Coins available for stake rewards over a budget year starting at `height`.
/// Never below one coin.
pub fn annual_budget(params: &ConsensusParams, chain: &dyn ChainView, height: Height) -> Fixed {
    let subsidy = Fixed::from_amount(chain.block_subsidy(height));
    let yearly = subsidy.mul_int(params.blocks_per_day * BUDGET_DAYS_PER_YEAR);
    (yearly * budget_share(params, height)).max(Fixed::ONE)
}

/// Rate ceiling for `kind` at `height`
pub fn max_rate_for_height(params: &ConsensusParams, kind: StakeKind, height: Height) -> Fixed {
    match kind {
        StakeKind::Whale => params.max_whale_rate_at(height),
        StakeKind::Dash => params.max_dash_rate,
    }
}

/// Payout heights: every multiple of the superblock cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuperblockSchedule {
    cycle: Height,
}

impl SuperblockSchedule {
    pub fn new(cycle: Height) -> Self {
        Self {
            cycle: cycle.max(1),
        }
    }

    pub fn from_params(params: &ConsensusParams) -> Self {
        Self::new(params.superblock_cycle)
    }

    pub fn cycle(&self) -> Height {
        self.cycle
    }

    pub fn is_superblock(&self, height: Height) -> bool {
        height > 0 && height % self.cycle == 0
    }

    /// Superblock that settles anything falling due at `height`
    pub fn superblock_at_or_after(&self, height: Height) -> Height {
        if height <= 0 {
            return self.cycle;
        }
        let rem = height % self.cycle;
        if rem == 0 {
            height
        } else {
            height + self.cycle - rem
        }
    }

    /// First superblock strictly after `height`
    pub fn next_superblock(&self, height: Height) -> Height {
        self.superblock_at_or_after(height + 1)
    }

    /// Heights whose payouts settle at superblock `height`
    pub fn payout_window(&self, height: Height) -> std::ops::RangeInclusive<Height> {
        (height - self.cycle + 1)..=height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_core::{MemoryChain, COIN};

    #[test]
    fn test_budget_shares_by_height() {
        let params = ConsensusParams::mainnet();
        let chain = MemoryChain::default();
        chain.set_subsidy(50 * COIN);

        // 205 * 50 * 360 = 3,690,000 coins a year
        let early = annual_budget(&params, &chain, params.anti_gpu_height - 1);
        assert_eq!(early, Fixed::from_int(369_000));
        let middle = annual_budget(&params, &chain, params.poom_phaseout_height);
        assert_eq!(middle, Fixed::from_int(1_199_250));
        let late = annual_budget(&params, &chain, params.poom_phaseout_height + 1);
        assert_eq!(late, Fixed::from_int(2_361_600));
    }

    #[test]
    fn test_budget_floor() {
        let params = ConsensusParams::mainnet();
        let chain = MemoryChain::default();
        chain.set_subsidy(0);
        assert_eq!(annual_budget(&params, &chain, 10), Fixed::ONE);
    }

    #[test]
    fn test_max_rates() {
        let params = ConsensusParams::mainnet();
        assert_eq!(max_rate_for_height(&params, StakeKind::Dash, 1), MAX_DASH_RATE);
        assert_eq!(
            max_rate_for_height(&params, StakeKind::Whale, 1),
            params.max_whale_rate
        );
    }

    #[test]
    fn test_superblock_schedule() {
        let schedule = SuperblockSchedule::new(205);
        assert!(schedule.is_superblock(410));
        assert!(!schedule.is_superblock(411));
        assert!(!schedule.is_superblock(0));
        assert_eq!(schedule.superblock_at_or_after(410), 410);
        assert_eq!(schedule.superblock_at_or_after(411), 615);
        assert_eq!(schedule.next_superblock(410), 615);
        assert_eq!(schedule.next_superblock(409), 410);
        assert_eq!(schedule.payout_window(410), 206..=410);
    }

    #[test]
    fn test_every_height_settles_in_exactly_one_window() {
        let schedule = SuperblockSchedule::new(7);
        for h in 1..100 {
            let sb = schedule.superblock_at_or_after(h);
            assert!(schedule.is_superblock(sb));
            assert!(schedule.payout_window(sb).contains(&h));
        }
    }
}
