//! Payable-stake selection at superblocks

use crate::budget::SuperblockSchedule;
use crate::constants::{DASH_PAYOUT_TAG, PAYOUT_CLAMP_MARGIN, WHALE_PAYOUT_TAG};
use crate::registry::StakeRegistry;
use crate::stake::StakeKind;
use covenant_core::{Fixed, Height, TxId};
use covenant_crypto::Address;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One payment owed at a superblock
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub kind: StakeKind,
    pub txid: TxId,
    pub address: String,
    /// Coins
    pub amount: Fixed,
}

/// Payments of one kind at one superblock
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSchedule {
    pub kind: StakeKind,
    pub height: Height,
    /// Sum claimed before any clamp
    pub owed: Fixed,
    pub cap: Fixed,
    pub clamped: bool,
    pub payouts: Vec<Payout>,
}

impl PayoutSchedule {
    fn empty(kind: StakeKind, height: Height, cap: Fixed) -> Self {
        Self {
            kind,
            height,
            owed: Fixed::ZERO,
            cap,
            clamped: false,
            payouts: Vec::new(),
        }
    }

    pub fn total(&self) -> Fixed {
        self.payouts.iter().map(|p| p.amount).sum()
    }

    /// Scale every payment down when the day owes more than its cap.
    ///
    /// Scaled payouts are truncated to whole coins before the tag is added
    /// back, and the ratio keeps dropping by the clamp margin until the day
    /// fits under the cap.
    fn clamp_to_cap(&mut self, tag: Fixed) {
        self.owed = self.total();
        if self.owed <= self.cap {
            return;
        }
        let claimed: Vec<Fixed> = self.payouts.iter().map(|p| p.amount).collect();
        let mut ratio = (self.cap.checked_div(self.owed).unwrap_or(Fixed::ZERO) - PAYOUT_CLAMP_MARGIN)
            .max(Fixed::ZERO);
        let mut scaled = scale_payouts(&claimed, ratio, tag);
        while scaled.iter().copied().sum::<Fixed>() > self.cap && ratio.is_positive() {
            ratio = (ratio - PAYOUT_CLAMP_MARGIN).max(Fixed::ZERO);
            scaled = scale_payouts(&claimed, ratio, tag);
        }
        warn!(
            kind = %self.kind,
            height = self.height,
            owed = %self.owed,
            cap = %self.cap,
            %ratio,
            "Payout day over cap, scaling payouts"
        );
        for (payout, amount) in self.payouts.iter_mut().zip(scaled) {
            payout.amount = amount;
        }
        self.payouts.retain(|p| p.amount.is_positive());
        self.clamped = true;
    }
}

/// `amounts` times `ratio`, truncated to whole coins and re-tagged
fn scale_payouts(amounts: &[Fixed], ratio: Fixed, tag: Fixed) -> Vec<Fixed> {
    amounts
        .iter()
        .map(|amount| {
            let coins = (*amount * ratio).trunc_dp(0);
            if coins.is_positive() {
                coins + tag
            } else {
                Fixed::ZERO
            }
        })
        .collect()
}

/// Chooses which stakes a superblock pays
pub struct PayoutSelector<'a> {
    registry: &'a StakeRegistry,
}

impl<'a> PayoutSelector<'a> {
    pub fn new(registry: &'a StakeRegistry) -> Self {
        Self { registry }
    }

    fn schedule(&self) -> SuperblockSchedule {
        SuperblockSchedule::from_params(self.registry.params())
    }

    /// Confirmed whale stakes maturing inside the window settled at `height`
    pub fn whale_payouts(&self, height: Height) -> PayoutSchedule {
        let params = self.registry.params();
        let mut schedule = PayoutSchedule::empty(StakeKind::Whale, height, params.whale_daily_cap);
        let superblocks = self.schedule();
        if !superblocks.is_superblock(height) {
            return schedule;
        }
        let window = superblocks.payout_window(height);
        schedule.payouts = self
            .registry
            .whale_stakes(false)
            .into_iter()
            .filter(|s| window.contains(&s.maturity_height))
            .filter(|s| s.burn_height > params.whale_cutover_height)
            .filter(|s| Address::is_valid(&s.return_address, params.native_address_version))
            .map(|s| Payout {
                kind: StakeKind::Whale,
                txid: s.txid,
                address: s.return_address,
                amount: s.total_owed,
            })
            .collect();
        schedule.clamp_to_cap(WHALE_PAYOUT_TAG);
        schedule
    }

    /// Confirmed dash stakes with a monthly anniversary inside the window
    /// settled at `height`
    pub fn dash_payouts(&self, height: Height) -> PayoutSchedule {
        let params = self.registry.params();
        let mut schedule = PayoutSchedule::empty(StakeKind::Dash, height, params.dash_daily_cap);
        let superblocks = self.schedule();
        if !superblocks.is_superblock(height) {
            return schedule;
        }
        let window = superblocks.payout_window(height);
        schedule.payouts = self
            .registry
            .dash_stakes(false)
            .into_iter()
            .filter(|s| !s.spent && s.signatures_valid() && s.monthly_earnings.is_positive())
            .filter(|s| Address::is_valid(&s.return_address, params.native_address_version))
            .filter(|s| s.anniversaries(params).iter().any(|h| window.contains(h)))
            .map(|s| Payout {
                kind: StakeKind::Dash,
                txid: s.txid,
                address: s.return_address,
                amount: s.monthly_earnings,
            })
            .collect();
        schedule.clamp_to_cap(DASH_PAYOUT_TAG);
        schedule
    }

    pub fn payouts_at(&self, kind: StakeKind, height: Height) -> PayoutSchedule {
        match kind {
            StakeKind::Whale => self.whale_payouts(height),
            StakeKind::Dash => self.dash_payouts(height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::metrics::Commitment;
    use crate::params::ConsensusParams;
    use covenant_core::OutPoint;
    use proptest::prelude::*;

    #[test]
    fn test_whale_paid_at_its_superblock() {
        let h = Harness::new();
        let tx = h.whale_request(1_000, 365, fx("0.7")).transaction(&h.params, vec![]);
        h.confirm(&tx, TIP);
        let stake = h.registry.parse_whale(&tx);
        let payout_height = stake.payout_heights(&h.params)[0];

        let selector = PayoutSelector::new(&h.registry);
        let due = selector.whale_payouts(payout_height);
        assert_eq!(due.payouts.len(), 1);
        assert_eq!(due.payouts[0].amount, fx("1700.1527"));
        assert_eq!(due.payouts[0].address, return_address());
        assert!(!due.clamped);

        let schedule = SuperblockSchedule::from_params(&h.params);
        assert!(selector.whale_payouts(schedule.next_superblock(payout_height)).payouts.is_empty());
        assert!(selector.whale_payouts(payout_height - 1).payouts.is_empty());
    }

    #[test]
    fn test_pending_and_precutover_stakes_not_paid() {
        let h = Harness::with_params(ConsensusParams {
            whale_cutover_height: TIP,
            ..ConsensusParams::mainnet()
        });
        let old = h.whale_request(1_000, 365, fx("0.7")).transaction(&h.params, vec![]);
        h.confirm(&old, TIP);
        let payout_height = h.registry.parse_whale(&old).payout_heights(&h.params)[0];

        let mut pending = h.whale_request(2_000, 365, fx("0.7"));
        pending.burn_height = TIP + 1;
        h.chain.add_to_mempool(pending.transaction(&h.params, vec![]));

        let due = PayoutSelector::new(&h.registry).whale_payouts(payout_height);
        assert!(due.payouts.is_empty());
    }

    #[test]
    fn test_clamp_scales_to_cap() {
        let h = Harness::with_params(ConsensusParams {
            whale_daily_cap: fx("5000"),
            ..ConsensusParams::mainnet()
        });
        let mut payout_height = 0;
        for coins in [1_000, 2_000, 3_000] {
            let tx = h.whale_request(coins, 365, fx("0.7")).transaction(&h.params, vec![]);
            h.confirm(&tx, TIP);
            payout_height = h.registry.parse_whale(&tx).payout_heights(&h.params)[0];
        }

        let due = PayoutSelector::new(&h.registry).whale_payouts(payout_height);
        // 1700 + 3400 + 5100 plus tags
        assert_eq!(due.owed, fx("10200.4581"));
        assert!(due.clamped);
        assert_eq!(due.payouts.len(), 3);
        // Short of the cap by the clamp margin on what was owed, plus at most
        // one truncated coin per payout
        let total = due.total();
        assert_eq!(total, fx("4896.4581"));
        assert!(total <= due.cap, "{total}");
        let floor = due.cap - due.owed * PAYOUT_CLAMP_MARGIN - Fixed::from_int(due.payouts.len() as i64);
        assert!(total >= floor, "{total} < {floor}");
        assert!(due.payouts.windows(2).all(|w| w[0].txid < w[1].txid));
    }

    #[test]
    fn test_single_small_payout_stays_under_cap() {
        let h = Harness::with_params(ConsensusParams {
            dash_daily_cap: fx("10.15"),
            ..ConsensusParams::mainnet()
        });
        let pledge = h.dash_pledge(5_000, 10);
        let tx = pledge.request.transaction(&h.params, vec![]);
        h.confirm(&tx, TIP);
        let first = h.registry.parse_dash(&tx).payout_heights(&h.params)[0];

        let due = PayoutSelector::new(&h.registry).dash_payouts(first);
        assert_eq!(due.owed, fx("62.1528"));
        assert!(due.clamped);
        assert_eq!(due.payouts.len(), 1);
        // 62.1528 x (10.15 / 62.1528 - 0.01) = 9.52..., truncated then tagged
        assert_eq!(due.payouts[0].amount, fx("9.1528"));
        assert!(due.total() <= due.cap);
    }

    fn schedule_of(cap: &str, amounts: &[&str]) -> PayoutSchedule {
        let mut schedule = PayoutSchedule::empty(StakeKind::Whale, 0, fx(cap));
        schedule.payouts = amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| Payout {
                kind: StakeKind::Whale,
                txid: TxId::from_content(format!("payout-{i}").as_bytes()),
                address: return_address(),
                amount: fx(amount),
            })
            .collect();
        schedule
    }

    #[test]
    fn test_clamp_lowers_ratio_until_tags_fit() {
        // The first ratio leaves two 1.1527 payouts, 0.0054 over the cap
        let mut schedule = schedule_of("2.3", &["2.1527", "2.1527"]);
        schedule.clamp_to_cap(WHALE_PAYOUT_TAG);
        assert!(schedule.clamped);
        assert_eq!(schedule.owed, fx("4.3054"));
        assert!(schedule.total() <= schedule.cap, "{}", schedule.total());
        assert!(schedule.payouts.is_empty());
    }

    #[test]
    fn test_day_under_cap_untouched() {
        let mut schedule = schedule_of("100", &["40.1527", "50.1527"]);
        schedule.clamp_to_cap(WHALE_PAYOUT_TAG);
        assert!(!schedule.clamped);
        assert_eq!(schedule.total(), fx("90.3054"));
    }

    proptest! {
        #[test]
        fn prop_clamped_day_never_exceeds_cap(
            coins in proptest::collection::vec(1i64..20_000, 1..12),
            cap in 0i64..50_000,
        ) {
            let amounts: Vec<String> = coins.iter().map(|c| format!("{c}.1527")).collect();
            let refs: Vec<&str> = amounts.iter().map(String::as_str).collect();
            let mut schedule = schedule_of(&cap.to_string(), &refs);
            schedule.clamp_to_cap(WHALE_PAYOUT_TAG);
            prop_assert!(schedule.total() <= schedule.cap);
            prop_assert!(schedule.payouts.iter().all(|p| p.amount.is_positive()));
        }
    }

    #[test]
    fn test_dash_paid_each_anniversary() {
        let h = Harness::new();
        let pledge = h.dash_pledge(5_000, 10);
        let tx = pledge.request.transaction(&h.params, vec![]);
        h.confirm(&tx, TIP);
        let stake = h.registry.parse_dash(&tx);
        let selector = PayoutSelector::new(&h.registry);

        let heights = stake.payout_heights(&h.params);
        assert_eq!(heights.len(), 6);
        for height in &heights {
            let due = selector.dash_payouts(*height);
            assert_eq!(due.payouts.len(), 1);
            assert_eq!(due.payouts[0].amount, fx("62.1528"));
        }
        let schedule = SuperblockSchedule::from_params(&h.params);
        assert!(selector.dash_payouts(schedule.next_superblock(heights[0])).payouts.is_empty());
    }

    #[test]
    fn test_spent_dash_stake_not_paid() {
        let h = Harness::new();
        let pledge = h.dash_pledge(5_000, 10);
        let tx = pledge.request.transaction(&h.params, vec![]);
        h.confirm(&tx, TIP);
        let first = h.registry.parse_dash(&tx).payout_heights(&h.params)[0];
        h.chain.spend(&OutPoint::parse(&pledge.request.native_utxo).unwrap());

        assert!(PayoutSelector::new(&h.registry).dash_payouts(first).payouts.is_empty());
    }
}
