use std::{future::Future, str::FromStr};

use log::{debug, warn};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use solana_client::{client_error::ClientError, nonblocking::rpc_client::RpcClient};
use solana_commitment_config::CommitmentConfig;
use solana_keypair::Keypair;
use solana_rpc_client_api::{client_error::ErrorKind, request::RpcError};
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, transaction::Transaction};
use solana_signer::Signer;
use solana_system_interface::instruction as system_instruction;

use crate::{
    block,
    config::{CallConfig, NodePool},
    errors::{CallError, Error},
    keypair,
    outcome::Outcome,
    rpc::{self, AccountLookup},
    token, transport,
    types::{BlockTxCount, EpochInfo, TokenAmount, TransferInfo, VoteAccount},
    units::{lamports_as_sol, sol_to_lamports},
};

/// Runs `op` up to `attempts` times, each time against a node picked from `nodes`.
///
/// Returns the first successful outcome. When every attempt fails the error
/// of the last attempt is returned, together with the most recent raw data
/// any attempt produced.
pub async fn with_retry<T, F, Fut>(nodes: &NodePool, attempts: usize, op: F) -> Outcome<T>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Outcome<T>>,
{
    let mut last_error = None;
    let mut last_raw = None;

    for attempt in 1..=attempts {
        let node = nodes.pick().to_string();
        debug!("attempt {attempt}/{attempts} on {node}");

        let outcome = op(node.clone()).await;
        match outcome.result {
            Ok(value) => return Outcome::ok(value, outcome.raw),
            Err(e) => {
                warn!("attempt {attempt}/{attempts} on {node} failed: {e}");
                if outcome.raw.is_some() {
                    last_raw = outcome.raw;
                }
                last_error = Some(e);
            }
        }
    }

    Outcome::err(last_error.unwrap_or(CallError::UnknownResponse), last_raw)
}

/// Parameters of a native SOL transfer.
#[derive(Debug, Clone)]
pub struct SolTransfer {
    pub from_address: String,
    pub private_key: String,
    pub recipient: String,
    pub amount_sol: Decimal,
}

/// Parameters of an SPL token transfer to a wallet address.
#[derive(Debug, Clone)]
pub struct TokenTransfer {
    pub private_key: String,
    /// Wallet address; its token account is looked up or created.
    pub recipient: String,
    pub mint: String,
    /// Amount in the token's base units.
    pub amount: u64,
}

/// Node-pool aware client.
///
/// Every operation goes through [`with_retry`]: up to `cfg.attempts` attempts,
/// each against a freshly picked node, stopping at the first success.
#[derive(Debug, Clone)]
pub struct NodeClient {
    nodes: NodePool,
    cfg: CallConfig,
}

impl NodeClient {
    /// Creates a client over the given node selection.
    ///
    /// # Example
    /// ```no_run
    /// use solana_node_kit::{CallConfig, NodeClient, NodePool};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let nodes = NodePool::from_nodes(vec![
    ///     "https://api.mainnet-beta.solana.com".to_string(),
    ///     "https://solana-rpc.publicnode.com".to_string(),
    /// ])?;
    /// let client = NodeClient::new(nodes, CallConfig::default());
    ///
    /// let balance = client
    ///     .get_sol_balance("9wkxjGXrRhHB9pFZrEpQKBKAJ52jMjVUahnVNezJFvL7")
    ///     .await;
    /// println!("{}", balance.ok_or_error());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(nodes: NodePool, cfg: CallConfig) -> Self {
        Self { nodes, cfg }
    }

    /// Builds a client from an optional single node and a node list.
    ///
    /// Fails with [`Error::NoNodes`] when both are empty.
    pub fn from_parts(
        node: Option<String>,
        nodes: Vec<String>,
        cfg: CallConfig,
    ) -> Result<Self, Error> {
        Ok(Self::new(NodePool::new(node, nodes)?, cfg))
    }

    /// Node selection every attempt picks from.
    pub fn nodes(&self) -> &NodePool {
        &self.nodes
    }

    /// Per-call settings, including the attempt budget.
    pub fn config(&self) -> &CallConfig {
        &self.cfg
    }

    /// Runs `f` with the client's node selection and attempt budget.
    pub async fn retry_call<T, F, Fut>(&self, f: F) -> Outcome<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Outcome<T>>,
    {
        with_retry(&self.nodes, self.cfg.attempts, f).await
    }

    /// SOL balance of `address`.
    pub async fn get_sol_balance(&self, address: &str) -> Outcome<Decimal> {
        self.retry_call(|node| async move { rpc::get_balance(&node, address, &self.cfg).await })
            .await
            .map(lamports_as_sol)
    }

    /// Token balance of `owner` for `mint`; see [`token::get_balance`].
    pub async fn get_token_balance(
        &self,
        owner: &str,
        mint: &str,
        token_account: Option<&str>,
    ) -> Outcome<TokenAmount> {
        self.retry_call(|node| async move {
            token::get_balance(&node, owner, mint, token_account, &self.cfg).await
        })
        .await
    }

    /// Whether `address` has no account on chain.
    ///
    /// A response without `context.slot` counts as a failed attempt; when
    /// every attempt gets one the result is `unknown_response`.
    pub async fn is_empty_account(&self, address: &str) -> Outcome<bool> {
        self.retry_call(|node| async move {
            rpc::lookup_account(&node, address, &self.cfg)
                .await
                .and_then(|lookup| match lookup {
                    AccountLookup::Missing => Ok(true),
                    AccountLookup::Found(_) => Ok(false),
                    AccountLookup::Unconfirmed => Err(CallError::UnknownResponse),
                })
        })
        .await
    }

    /// Epoch info from the first node that answers.
    pub async fn get_epoch_info(&self) -> Outcome<EpochInfo> {
        self.retry_call(|node| async move { rpc::get_epoch_info(&node, &self.cfg).await })
            .await
    }

    /// Current and delinquent vote accounts.
    pub async fn get_vote_accounts(&self) -> Outcome<Vec<VoteAccount>> {
        self.retry_call(|node| async move { rpc::get_vote_accounts(&node, &self.cfg).await })
            .await
    }

    /// Transaction buckets of the block at `slot`; see [`block::calc_block_tx_count`].
    pub async fn calc_block_tx_count(&self, slot: u64) -> Outcome<BlockTxCount> {
        self.retry_call(|node| async move {
            block::calc_block_tx_count(&node, slot, &self.cfg).await
        })
        .await
    }

    /// Native SOL transfers made by the transaction `signature`.
    pub async fn get_transfers(&self, signature: &str) -> Outcome<Vec<TransferInfo>> {
        self.retry_call(|node| async move {
            block::get_transfers(&node, signature, &self.cfg).await
        })
        .await
    }

    /// Signs and sends a native SOL transfer, returning the signature.
    ///
    /// The key pair, addresses and amount are validated before any network
    /// call; a problem there is returned as `Err`. Each attempt fetches a
    /// fresh blockhash from the node it was given.
    pub async fn transfer_sol(&self, params: &SolTransfer) -> Result<Outcome<String>, Error> {
        let payer = keypair::keypair_from_private_key(&params.private_key)?;
        if payer.pubkey().to_string() != params.from_address {
            return Err(Error::KeyMismatch(params.from_address.clone()));
        }
        let recipient = parse_pubkey(&params.recipient)?;
        let lamports = sol_to_lamports(params.amount_sol)
            .ok_or_else(|| Error::InvalidAmount(params.amount_sol.to_string()))?;

        let payer = &payer;
        let outcome = self
            .retry_call(|node| async move {
                send_transfer(&node, payer, &recipient, lamports, &self.cfg).await
            })
            .await;
        Ok(outcome)
    }

    /// Signs and sends an SPL token transfer, returning the signature.
    ///
    /// Keys are validated before any network call. Each attempt resolves the
    /// token accounts again; see [`token::transfer`].
    pub async fn transfer_token(&self, params: &TokenTransfer) -> Result<Outcome<String>, Error> {
        let payer = keypair::keypair_from_private_key(&params.private_key)?;
        let recipient = parse_pubkey(&params.recipient)?;
        let mint = parse_pubkey(&params.mint)?;
        let amount = params.amount;

        let payer = &payer;
        let outcome = self
            .retry_call(|node| async move {
                token::transfer(&node, payer, &recipient, &mint, amount, &self.cfg).await
            })
            .await;
        Ok(outcome)
    }
}

fn parse_pubkey(address: &str) -> Result<Pubkey, Error> {
    Pubkey::from_str(address).map_err(|e| Error::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

async fn send_transfer(
    node: &str,
    payer: &Keypair,
    recipient: &Pubkey,
    lamports: u64,
    cfg: &CallConfig,
) -> Outcome<String> {
    let raw = json!({ "node": node, "recipient": recipient.to_string(), "lamports": lamports });
    let ix = system_instruction::transfer(&payer.pubkey(), recipient, lamports);
    sign_and_send(node, payer, &[ix], cfg, raw).await
}

/// Signs `instructions` with `payer` over a fresh blockhash from `node` and
/// submits the transaction.
///
/// `raw` describes the request; the signature is added to it as `result`.
pub(crate) async fn sign_and_send(
    node: &str,
    payer: &Keypair,
    instructions: &[Instruction],
    cfg: &CallConfig,
    mut raw: Value,
) -> Outcome<String> {
    if !transport::is_http(node) {
        return Outcome::err(CallError::UnsupportedScheme(node.to_string()), None);
    }

    let client = RpcClient::new_with_timeout_and_commitment(
        node.to_string(),
        cfg.timeout,
        CommitmentConfig::confirmed(),
    );

    let blockhash = match client.get_latest_blockhash().await {
        Ok(hash) => hash,
        Err(e) => return Outcome::err(client_error(e), Some(raw)),
    };

    let tx = Transaction::new_signed_with_payer(instructions, Some(&payer.pubkey()), &[payer], blockhash);

    match client.send_transaction(&tx).await {
        Ok(signature) => {
            let signature = signature.to_string();
            raw["result"] = Value::String(signature.clone());
            Outcome::ok(signature, Some(raw))
        }
        Err(e) => Outcome::err(client_error(e), Some(raw)),
    }
}

/// Maps a solana-client error onto the crate's error taxonomy.
fn client_error(err: ClientError) -> CallError {
    match err.kind() {
        ErrorKind::RpcError(RpcError::RpcResponseError { message, .. }) => {
            CallError::Service(message.clone())
        }
        ErrorKind::RpcError(RpcError::ParseError(msg)) => CallError::Decode(msg.clone()),
        ErrorKind::SerdeJson(e) => CallError::decode(e),
        _ => CallError::Transport(err.to_string()),
    }
}
