//! Ledger collaborator interface
//!
//! The commitment layer never owns blocks or the UTXO set. It reads them
//! through `ChainView`, which the hosting node implements. `MemoryChain` is a
//! self-contained implementation used by tests and tooling.

use crate::clock::Clock;
use crate::types::{Amount, Height, OutPoint, Timestamp, Transaction, TxId, TxOut, COIN};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Read-only view of the underlying ledger
pub trait ChainView: Send + Sync {
    /// Height of the active tip
    fn tip_height(&self) -> Height;

    /// Network-adjusted time
    fn adjusted_time(&self) -> Timestamp;

    /// Confirmed or pending transaction by id
    fn transaction(&self, txid: &TxId) -> Option<Transaction>;

    /// Transactions waiting in the pending pool
    fn mempool(&self) -> Vec<Transaction>;

    /// Block time of the transaction holding `outpoint`, with that output's value
    fn transaction_time_and_amount(&self, outpoint: &OutPoint) -> Option<(Timestamp, Amount)>;

    /// The output if it is still unspent
    fn unspent_output(&self, outpoint: &OutPoint) -> Option<TxOut>;

    /// Block subsidy paid at `height`
    fn block_subsidy(&self, height: Height) -> Amount;
}

#[derive(Clone, Debug)]
struct ConfirmedTx {
    tx: Transaction,
    height: Height,
    time: Timestamp,
}

#[derive(Debug)]
struct ChainState {
    tip: Height,
    time: Timestamp,
    subsidy: Amount,
    confirmed: HashMap<TxId, ConfirmedTx>,
    mempool: Vec<Transaction>,
    unspent: HashMap<OutPoint, TxOut>,
}

/// In-memory ledger
pub struct MemoryChain {
    state: RwLock<ChainState>,
}

impl MemoryChain {
    pub fn new(tip: Height, time: Timestamp) -> Self {
        Self {
            state: RwLock::new(ChainState {
                tip,
                time,
                subsidy: 50 * COIN,
                confirmed: HashMap::new(),
                mempool: Vec::new(),
                unspent: HashMap::new(),
            }),
        }
    }

    pub fn set_tip(&self, tip: Height) {
        self.state.write().tip = tip;
    }

    pub fn set_time(&self, time: Timestamp) {
        self.state.write().time = time;
    }

    pub fn set_subsidy(&self, subsidy: Amount) {
        self.state.write().subsidy = subsidy;
    }

    /// Confirm a transaction: spends its inputs, registers its outputs as
    /// unspent and drops it from the mempool.
    pub fn add_confirmed(&self, tx: Transaction, height: Height, time: Timestamp) {
        let mut state = self.state.write();
        for input in &tx.inputs {
            state.unspent.remove(&input.prevout);
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            state
                .unspent
                .insert(OutPoint::new(tx.txid, index as u32), output.clone());
        }
        state.mempool.retain(|pending| pending.txid != tx.txid);
        state
            .confirmed
            .insert(tx.txid, ConfirmedTx { tx, height, time });
    }

    pub fn add_to_mempool(&self, tx: Transaction) {
        let mut state = self.state.write();
        if !state.mempool.iter().any(|pending| pending.txid == tx.txid) {
            state.mempool.push(tx);
        }
    }

    pub fn clear_mempool(&self) {
        self.state.write().mempool.clear();
    }

    /// Register a free-standing unspent output (no parent transaction)
    pub fn add_unspent(&self, outpoint: OutPoint, output: TxOut) {
        self.state.write().unspent.insert(outpoint, output);
    }

    pub fn spend(&self, outpoint: &OutPoint) -> bool {
        self.state.write().unspent.remove(outpoint).is_some()
    }

    /// Confirmation height of a transaction
    pub fn height_of(&self, txid: &TxId) -> Option<Height> {
        self.state.read().confirmed.get(txid).map(|c| c.height)
    }
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl ChainView for MemoryChain {
    fn tip_height(&self) -> Height {
        self.state.read().tip
    }

    fn adjusted_time(&self) -> Timestamp {
        self.state.read().time
    }

    fn transaction(&self, txid: &TxId) -> Option<Transaction> {
        let state = self.state.read();
        state
            .confirmed
            .get(txid)
            .map(|c| c.tx.clone())
            .or_else(|| state.mempool.iter().find(|tx| &tx.txid == txid).cloned())
    }

    fn mempool(&self) -> Vec<Transaction> {
        self.state.read().mempool.clone()
    }

    fn transaction_time_and_amount(&self, outpoint: &OutPoint) -> Option<(Timestamp, Amount)> {
        let state = self.state.read();
        let confirmed = state.confirmed.get(&outpoint.txid)?;
        let output = confirmed.tx.outputs.get(outpoint.vout as usize)?;
        Some((confirmed.time, output.value))
    }

    fn unspent_output(&self, outpoint: &OutPoint) -> Option<TxOut> {
        self.state.read().unspent.get(outpoint).cloned()
    }

    fn block_subsidy(&self, _height: Height) -> Amount {
        self.state.read().subsidy
    }
}

impl Clock for MemoryChain {
    fn now(&self) -> Timestamp {
        self.adjusted_time()
    }
}
