//! Block and transaction inspection.

use serde_json::{json, Value};

use crate::{
    config::CallConfig,
    outcome::Outcome,
    transport::call,
    types::{BlockTxCount, TransferInfo},
};

pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";

/// Account-key shape that marks a transaction as a validator vote.
///
/// A vote transaction has exactly `key_count` account keys and ends with
/// `trailing_keys`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteSignature {
    pub key_count: usize,
    pub trailing_keys: Vec<String>,
}

impl Default for VoteSignature {
    fn default() -> Self {
        Self {
            key_count: 5,
            trailing_keys: vec![
                "SysvarS1otHashes111111111111111111111111111".to_string(),
                "SysvarC1ock11111111111111111111111111111111".to_string(),
                "Vote111111111111111111111111111111111111111".to_string(),
            ],
        }
    }
}

impl VoteSignature {
    pub fn matches(&self, account_keys: &[Value]) -> bool {
        if account_keys.len() != self.key_count || self.trailing_keys.len() > self.key_count {
            return false;
        }
        let tail = &account_keys[self.key_count - self.trailing_keys.len()..];
        tail.iter()
            .zip(&self.trailing_keys)
            .all(|(key, expected)| key.as_str() == Some(expected.as_str()))
    }
}

/// Counts the transactions of block `slot` using the default vote signature.
pub async fn calc_block_tx_count(node: &str, slot: u64, cfg: &CallConfig) -> Outcome<BlockTxCount> {
    calc_block_tx_count_with(node, slot, &VoteSignature::default(), cfg).await
}

pub async fn calc_block_tx_count_with(
    node: &str,
    slot: u64,
    signature: &VoteSignature,
    cfg: &CallConfig,
) -> Outcome<BlockTxCount> {
    let params = json!([slot, {"maxSupportedTransactionVersion": 0}]);
    call(node, "getBlock", params, cfg)
        .await
        .decode(|block| count_block_txs(slot, &block, signature))
}

/// Splits a `getBlock` result into vote/non-vote and ok/error buckets.
///
/// Any transaction without the expected fields fails the whole block.
pub fn count_block_txs(
    slot: u64,
    block: &Value,
    signature: &VoteSignature,
) -> Result<BlockTxCount, String> {
    let txs = block
        .get("transactions")
        .and_then(Value::as_array)
        .ok_or("missing field `transactions`")?;
    let block_time = match block.get("blockTime") {
        Some(Value::Null) => None,
        Some(t) => Some(t.as_i64().ok_or("`blockTime` is not an integer")?),
        None => return Err("missing field `blockTime`".to_string()),
    };

    let mut counts = BlockTxCount {
        slot,
        block_time,
        vote_tx_ok: 0,
        vote_tx_error: 0,
        non_vote_tx_ok: 0,
        non_vote_tx_error: 0,
    };

    for (i, tx) in txs.iter().enumerate() {
        let is_error = !tx
            .pointer("/meta/err")
            .ok_or_else(|| format!("transaction {i}: missing field `meta.err`"))?
            .is_null();
        let account_keys = tx
            .pointer("/transaction/message/accountKeys")
            .and_then(Value::as_array)
            .ok_or_else(|| format!("transaction {i}: missing field `accountKeys`"))?;

        let bucket = match (signature.matches(account_keys), is_error) {
            (true, false) => &mut counts.vote_tx_ok,
            (true, true) => &mut counts.vote_tx_error,
            (false, false) => &mut counts.non_vote_tx_ok,
            (false, true) => &mut counts.non_vote_tx_error,
        };
        *bucket += 1;
    }

    Ok(counts)
}

/// Native SOL transfers contained in transaction `signature`.
pub async fn get_transfers(node: &str, signature: &str, cfg: &CallConfig) -> Outcome<Vec<TransferInfo>> {
    let params = json!([signature, {"encoding": "jsonParsed", "maxSupportedTransactionVersion": 0}]);
    call(node, "getTransaction", params, cfg)
        .await
        .decode(|tx| extract_transfers(&tx))
}

/// Collects system-program `transfer` instructions from a jsonParsed transaction.
///
/// Instructions missing source, destination or lamports are skipped.
pub fn extract_transfers(tx: &Value) -> Result<Vec<TransferInfo>, String> {
    if tx.is_null() {
        return Err("transaction not found".to_string());
    }
    let instructions = tx
        .pointer("/transaction/message/instructions")
        .and_then(Value::as_array)
        .ok_or("missing field `transaction.message.instructions`")?;

    let transfers = instructions
        .iter()
        .filter(|ix| ix.get("programId").and_then(Value::as_str) == Some(SYSTEM_PROGRAM_ID))
        .filter(|ix| ix.pointer("/parsed/type").and_then(Value::as_str) == Some("transfer"))
        .filter_map(|ix| {
            let info = ix.pointer("/parsed/info")?;
            Some(TransferInfo {
                source: info.get("source")?.as_str()?.to_string(),
                destination: info.get("destination")?.as_str()?.to_string(),
                lamports: info.get("lamports")?.as_u64()?,
            })
        })
        .collect();

    Ok(transfers)
}
