//! Stake registry
//!
//! Remembers which confirmed transactions are stakes and enumerates live
//! stakes by re-reading those transactions from the ledger.

use crate::params::{ConsensusParams, StakingPolicy};
use crate::stake::{parse_dash_stake, parse_whale_stake, DashStake, StakeKind, WhaleStake};
use covenant_core::{ChainView, Fixed, Height, OutPoint, Timestamp, Transaction, TxId};
use covenant_oracle::OracleCache;
use covenant_storage::{KeyCase, KeyedCache};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Everything stake evaluation reads from
#[derive(Clone)]
pub struct StakeContext {
    pub params: ConsensusParams,
    pub policy: StakingPolicy,
    pub chain: Arc<dyn ChainView>,
    pub cache: Arc<dyn KeyedCache>,
    pub oracle: Arc<OracleCache>,
}

impl StakeContext {
    pub fn new(
        params: ConsensusParams,
        policy: StakingPolicy,
        chain: Arc<dyn ChainView>,
        cache: Arc<dyn KeyedCache>,
        oracle: Arc<OracleCache>,
    ) -> Self {
        Self {
            params,
            policy,
            chain,
            cache,
            oracle,
        }
    }
}

/// Stake memorisation and lookup
pub struct StakeRegistry {
    ctx: StakeContext,
}

impl StakeRegistry {
    pub fn new(ctx: StakeContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &StakeContext {
        &self.ctx
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.ctx.params
    }

    pub fn parse_whale(&self, tx: &Transaction) -> WhaleStake {
        parse_whale_stake(tx, &self.ctx.params)
    }

    pub fn parse_dash(&self, tx: &Transaction) -> DashStake {
        parse_dash_stake(
            tx,
            &self.ctx.params,
            self.ctx.chain.as_ref(),
            &self.ctx.oracle,
        )
    }

    /// Record every found stake in a connected block. Returns how many were
    /// recorded. Connecting the same block twice changes nothing.
    pub fn memorize_block(&self, txs: &[Transaction], height: Height, block_time: Timestamp) -> usize {
        let mut recorded = 0;
        for tx in txs {
            let found = match StakeKind::of_transaction(tx, &self.ctx.params) {
                Some(StakeKind::Whale) => Some((StakeKind::Whale, self.parse_whale(tx).found)),
                Some(StakeKind::Dash) => Some((StakeKind::Dash, self.parse_dash(tx).found)),
                None => None,
            };
            if let Some((kind, true)) = found {
                self.ctx.cache.write(
                    kind.section(),
                    &tx.txid.to_hex(),
                    &height.to_string(),
                    block_time,
                    KeyCase::Insensitive,
                );
                debug!(txid = %tx.txid, height, %kind, "Memorized stake");
                recorded += 1;
            }
        }
        recorded
    }

    /// Stake transactions of `kind`, confirmed and optionally pending, by txid
    fn transactions(&self, kind: StakeKind, include_mempool: bool) -> Vec<Transaction> {
        let mut txs = BTreeMap::new();
        for (key, _) in self.ctx.cache.section_entries(kind.section()) {
            let Ok(txid) = TxId::from_hex(&key) else {
                continue;
            };
            if let Some(tx) = self.ctx.chain.transaction(&txid) {
                txs.insert(txid, tx);
            }
        }
        if include_mempool {
            for tx in self.ctx.chain.mempool() {
                if StakeKind::of_transaction(&tx, &self.ctx.params) == Some(kind) {
                    txs.entry(tx.txid).or_insert(tx);
                }
            }
        }
        txs.into_values().collect()
    }

    /// Live whale stakes sorted by txid
    pub fn whale_stakes(&self, include_mempool: bool) -> Vec<WhaleStake> {
        self.transactions(StakeKind::Whale, include_mempool)
            .iter()
            .map(|tx| self.parse_whale(tx))
            .filter(|s| {
                s.found && s.amount > 0 && s.reward.is_positive() && s.actual_rate.is_positive()
            })
            .collect()
    }

    /// Live, unspent dash stakes sorted by txid
    pub fn dash_stakes(&self, include_mempool: bool) -> Vec<DashStake> {
        self.transactions(StakeKind::Dash, include_mempool)
            .iter()
            .map(|tx| self.parse_dash(tx))
            .filter(|s| {
                s.found
                    && s.native_amount > 0
                    && s.actual_rate.is_positive()
                    && s.monthly_earnings.is_positive()
            })
            .collect()
    }

    /// Total owed by pending whale stakes, optionally of one owner
    pub fn whale_stakes_in_mempool(&self, owner_key: Option<&str>) -> Fixed {
        self.ctx
            .chain
            .mempool()
            .iter()
            .filter(|tx| StakeKind::of_transaction(tx, &self.ctx.params) == Some(StakeKind::Whale))
            .map(|tx| self.parse_whale(tx))
            .filter(|s| s.found)
            .filter(|s| owner_key.map_or(true, |key| s.owner_key.eq_ignore_ascii_case(key)))
            .map(|s| s.total_owed)
            .sum()
    }

    /// Every found dash stake with a claimed native amount, whether or not
    /// its backing is still unspent
    fn dash_pledges(&self, include_mempool: bool) -> Vec<DashStake> {
        self.transactions(StakeKind::Dash, include_mempool)
            .iter()
            .map(|tx| self.parse_dash(tx))
            .filter(|s| s.found && s.claimed_native_amount > 0 && s.actual_rate.is_positive())
            .collect()
    }

    /// True when another dash stake, unexpired at `height`, pledges `utxo`.
    /// A pledge keeps its UTXOs until maturity even after its backing is spent.
    pub fn is_duplicate_utxo(&self, utxo: &str, exclude: Option<TxId>, height: Height) -> bool {
        let utxo = utxo.trim();
        !utxo.is_empty()
            && self.dash_pledges(true).iter().any(|s| {
                Some(s.txid) != exclude
                    && s.is_live_at(height)
                    && (s.native_utxo.eq_ignore_ascii_case(utxo)
                        || s.dash_utxo.eq_ignore_ascii_case(utxo))
            })
    }

    /// Dash stake pledging `utxo` on either side
    pub fn dash_stake_by_utxo(&self, utxo: &str) -> Option<DashStake> {
        let utxo = utxo.trim();
        self.dash_stakes(true).into_iter().find(|s| {
            s.native_utxo.eq_ignore_ascii_case(utxo) || s.dash_utxo.eq_ignore_ascii_case(utxo)
        })
    }

    /// Native outpoints pledged by unexpired dash stakes
    pub fn locked_outpoints(&self, height: Height) -> Vec<OutPoint> {
        let mut locked: Vec<OutPoint> = self
            .dash_stakes(true)
            .iter()
            .filter(|s| s.is_live_at(height) && !s.spent)
            .filter_map(|s| OutPoint::parse(&s.native_utxo).ok())
            .collect();
        locked.sort();
        locked.dedup();
        locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::WHALE_BURN_SECTION;
    use crate::fixtures::*;

    #[test]
    fn test_memorize_only_found_stakes() {
        let h = Harness::new();
        let good = h.whale_request(1_000, 30, fx("0.2")).transaction(&h.params, vec![]);
        let mut bad_request = h.whale_request(1_000, 30, fx("0.2"));
        bad_request.return_address = "bogus".into();
        let bad = bad_request.transaction(&h.params, vec![]);
        let plain = Transaction::new(vec![], vec![covenant_core::TxOut::new(return_address(), 5)]);

        for tx in [&good, &bad, &plain] {
            h.chain.add_confirmed(tx.clone(), TIP, TIME);
        }
        let recorded = h
            .registry
            .memorize_block(&[good.clone(), bad, plain], TIP, TIME);
        assert_eq!(recorded, 1);

        let entry = h.cache.read(WHALE_BURN_SECTION, &good.txid.to_hex()).unwrap();
        assert_eq!(entry.value, TIP.to_string());
        assert_eq!(entry.timestamp, TIME);
    }

    #[test]
    fn test_memorize_is_idempotent() {
        let h = Harness::new();
        let tx = h.whale_request(1_000, 30, fx("0.2")).transaction(&h.params, vec![]);
        h.confirm(&tx, TIP);
        h.registry.memorize_block(&[tx], TIP, TIME);
        assert_eq!(h.registry.whale_stakes(false).len(), 1);
    }

    #[test]
    fn test_mempool_inclusion() {
        let h = Harness::new();
        let confirmed = h.whale_request(1_000, 30, fx("0.2")).transaction(&h.params, vec![]);
        h.confirm(&confirmed, TIP);
        let pending = h.whale_request(2_000, 60, fx("0.2")).transaction(&h.params, vec![]);
        h.chain.add_to_mempool(pending.clone());

        assert_eq!(h.registry.whale_stakes(false).len(), 1);
        let all = h.registry.whale_stakes(true);
        assert_eq!(all.len(), 2);
        assert!(all.windows(2).all(|w| w[0].txid < w[1].txid));
    }

    #[test]
    fn test_zero_rate_stake_is_not_live() {
        let h = Harness::new();
        let tx = h.whale_request(1_000, 30, Fixed::ZERO).transaction(&h.params, vec![]);
        h.confirm(&tx, TIP);
        assert!(h.registry.whale_stakes(false).is_empty());
    }

    #[test]
    fn test_pending_whale_totals_by_owner() {
        let h = Harness::new();
        let mut a = h.whale_request(1_000, 365, fx("0.7"));
        a.owner_key = "alice".into();
        let mut b = h.whale_request(500, 365, fx("0.7"));
        b.owner_key = "bob".into();
        h.chain.add_to_mempool(a.transaction(&h.params, vec![]));
        h.chain.add_to_mempool(b.transaction(&h.params, vec![]));

        assert_eq!(h.registry.whale_stakes_in_mempool(Some("ALICE")), fx("1700.1527"));
        assert_eq!(h.registry.whale_stakes_in_mempool(Some("bob")), fx("850.1527"));
        assert_eq!(h.registry.whale_stakes_in_mempool(None), fx("2550.3054"));
    }

    #[test]
    fn test_duplicate_utxo_detection() {
        let h = Harness::new();
        let pledge = h.dash_pledge(5_000, 10);
        let tx = pledge.request.transaction(&h.params, vec![]);
        h.confirm(&tx, TIP);

        assert!(h.registry.is_duplicate_utxo(&pledge.request.dash_utxo, None, TIP));
        assert!(h.registry.is_duplicate_utxo(&pledge.request.native_utxo, None, TIP));
        assert!(!h.registry.is_duplicate_utxo(&pledge.request.dash_utxo, Some(tx.txid), TIP));

        // Expired stakes no longer hold their UTXOs
        let after = TIP + 180 * h.params.blocks_per_day;
        assert!(!h.registry.is_duplicate_utxo(&pledge.request.dash_utxo, None, after));
    }

    #[test]
    fn test_lookup_and_locked_outpoints() {
        let h = Harness::new();
        let pledge = h.dash_pledge(5_000, 10);
        let tx = pledge.request.transaction(&h.params, vec![]);
        h.confirm(&tx, TIP);

        let found = h.registry.dash_stake_by_utxo(&pledge.request.dash_utxo).unwrap();
        assert_eq!(found.txid, tx.txid);
        assert!(h.registry.dash_stake_by_utxo("unknown-0").is_none());

        let locked = h.registry.locked_outpoints(TIP);
        assert_eq!(locked, vec![OutPoint::parse(&pledge.request.native_utxo).unwrap()]);
    }

    #[test]
    fn test_spent_dash_stake_drops_out() {
        let h = Harness::new();
        let pledge = h.dash_pledge(5_000, 10);
        let tx = pledge.request.transaction(&h.params, vec![]);
        h.confirm(&tx, TIP);
        h.chain.spend(&OutPoint::parse(&pledge.request.native_utxo).unwrap());

        assert!(h.registry.dash_stakes(false).is_empty());
        assert!(h.registry.locked_outpoints(TIP).is_empty());
    }

    #[test]
    fn test_spent_pledge_still_holds_its_utxos() {
        let h = Harness::new();
        let pledge = h.dash_pledge(5_000, 10);
        let tx = pledge.request.transaction(&h.params, vec![]);
        h.confirm(&tx, TIP);
        h.chain.spend(&OutPoint::parse(&pledge.request.native_utxo).unwrap());

        assert!(h.registry.dash_stakes(false).is_empty());
        assert!(h.registry.is_duplicate_utxo(&pledge.request.dash_utxo, None, TIP));
        assert!(h.registry.is_duplicate_utxo(&pledge.request.native_utxo, None, TIP));
        let after = TIP + 180 * h.params.blocks_per_day;
        assert!(!h.registry.is_duplicate_utxo(&pledge.request.dash_utxo, None, after));
    }
}
