//! Subcommand implementations.

use std::{io::BufRead, path::Path};

use color_eyre::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use solana_node_kit::{
    keypair, rpc, types::TokenAmount, CallConfig, CallError, Error, NodeClient, NodePool,
    Outcome, SolTransfer,
};
use solana_keypair::Keypair;
use solana_signer::Signer;

use crate::app::{de_list, de_opt_list, fatal, print_json, Context};

const BALANCE_EXAMPLE: &str = include_str!("../samples/balance.yml");
const TRANSFER_SOL_EXAMPLE: &str = include_str!("../samples/transfer-sol.yml");

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BalanceConfig {
    #[serde(deserialize_with = "de_list")]
    pub accounts: Vec<String>,
    #[serde(deserialize_with = "de_list")]
    pub nodes: Vec<String>,
    #[serde(default, deserialize_with = "de_opt_list")]
    pub tokens: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransferSolConfig {
    pub from_address: String,
    pub private_key: String,
    #[serde(deserialize_with = "de_list")]
    pub recipients: Vec<String>,
    #[serde(deserialize_with = "de_list")]
    pub nodes: Vec<String>,
    pub amount: Decimal,
}

fn client(nodes: &[String]) -> Result<NodeClient> {
    Ok(NodeClient::new(
        NodePool::from_nodes(nodes.to_vec())?,
        CallConfig::default(),
    ))
}

/// Prints SOL balances of every account, then token balances per mint.
pub async fn balance(ctx: &Context, path: &Path) -> Result<()> {
    let config: BalanceConfig = ctx.load_or_exit(path);
    let client = client(&config.nodes)?;
    let tokens = config.tokens.unwrap_or_default();
    print_json(&balances(&client, &config.accounts, &tokens).await);
    Ok(())
}

/// `{"sol": {account: balance}, mint: {account: balance}, ...}`, with
/// `{"error": message}` in place of each balance that could not be read.
async fn balances(client: &NodeClient, accounts: &[String], tokens: &[String]) -> Map<String, Value> {
    let mut result = Map::new();

    let mut sol = Map::new();
    for account in accounts {
        let balance = client.get_sol_balance(account).await;
        sol.insert(account.clone(), balance.ok_or_error());
    }
    result.insert("sol".to_string(), Value::Object(sol));

    for mint in tokens {
        let mut balances = Map::new();
        for account in accounts {
            let balance = first_token_account_balance(client, account, mint)
                .await
                .map(|amount| amount.ui_amount_string);
            balances.insert(account.clone(), balance.ok_or_error());
        }
        result.insert(mint.clone(), Value::Object(balances));
    }

    result
}

/// Balance of the owner's first token account for `mint`.
async fn first_token_account_balance(
    client: &NodeClient,
    owner: &str,
    mint: &str,
) -> Outcome<TokenAmount> {
    let cfg = client.config();
    client
        .retry_call(|node| async move {
            let accounts = rpc::get_token_accounts_by_owner(&node, owner, mint, cfg).await;
            let raw = accounts.raw.clone();
            match accounts.into_result() {
                Ok(accounts) => match accounts.first() {
                    Some(account) => rpc::get_token_account_balance(&node, account, cfg).await,
                    None => Outcome::err(CallError::NoTokenAccounts, raw),
                },
                Err(e) => Outcome::err(e, raw),
            }
        })
        .await
}

/// Sends `amount` SOL to every recipient, printing a signature or error each.
pub async fn transfer_sol(ctx: &Context, path: &Path) -> Result<()> {
    let config: TransferSolConfig = ctx.load_or_exit(path);
    if !keypair::check_private_key(&config.from_address, &config.private_key) {
        fatal(Error::KeyMismatch(config.from_address));
    }
    let client = client(&config.nodes)?;

    let mut result = Map::new();
    for recipient in &config.recipients {
        let params = SolTransfer {
            from_address: config.from_address.clone(),
            private_key: config.private_key.clone(),
            recipient: recipient.clone(),
            amount_sol: config.amount,
        };
        let value = match client.transfer_sol(&params).await {
            Ok(outcome) => outcome.ok_or_error(),
            Err(e) => json!({ "error": e.to_string() }),
        };
        result.insert(recipient.clone(), value);
    }

    print_json(&result);
    Ok(())
}

pub fn generate_accounts(limit: usize, array: bool) {
    let mut result = Map::new();
    for _ in 0..limit {
        let account = keypair::generate_account();
        let private_key = if array {
            keypair::bytes_to_array_string(&account.private_key_arr)
        } else {
            account.private_key_base58
        };
        result.insert(account.public_key, Value::String(private_key));
    }
    print_json(&result);
}

/// Prints a key pair in every encoding.
///
/// `private_key` is base58 text, an array string, or the path of a keypair file.
pub fn keypair(private_key: &str) -> Result<()> {
    let pair = match keypair::keypair_from_private_key(private_key) {
        Ok(pair) => pair,
        Err(_) if Path::new(private_key).is_file() => keypair::read_keypair_file(private_key)?,
        Err(e) => return Err(e.into()),
    };
    print_keypair(&pair);
    Ok(())
}

pub fn keypair_from_mnemonic(mnemonic: Option<String>, passphrase: &str) -> Result<()> {
    let mnemonic = match mnemonic {
        Some(mnemonic) => mnemonic,
        None => {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line
        }
    };
    let pair = keypair::keypair_from_mnemonic(&mnemonic, passphrase)?;
    print_keypair(&pair);
    Ok(())
}

fn print_keypair(pair: &Keypair) {
    print_json(&keypair_json(pair));
}

fn keypair_json(pair: &Keypair) -> Value {
    json!({
        "public": pair.pubkey().to_string(),
        "private_base58": pair.to_base58_string(),
        "private_arr": keypair::bytes_to_array_string(&pair.to_bytes()),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExampleModule {
    Balance,
    TransferSol,
}

pub fn example(module: ExampleModule) {
    let text = match module {
        ExampleModule::Balance => BALANCE_EXAMPLE,
        ExampleModule::TransferSol => TRANSFER_SOL_EXAMPLE,
    };
    print!("{text}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_examples_parse() {
        let balance: BalanceConfig = serde_yaml::from_str(BALANCE_EXAMPLE).unwrap();
        assert_eq!(balance.accounts.len(), 2);
        assert_eq!(balance.tokens.map(|t| t.len()), Some(2));

        let transfer: TransferSolConfig = serde_yaml::from_str(TRANSFER_SOL_EXAMPLE).unwrap();
        assert_eq!(
            transfer.recipients,
            ["2b8bUknUbyLmUdKPH6o4jUbgNeztKSVwCN5w2QtEm61r"]
        );
        assert_eq!(transfer.nodes, ["https://api.devnet.solana.com"]);
        assert_eq!(transfer.private_key, "{{ SOL_PRIVATE_KEY }}");
    }

    #[tokio::test]
    async fn balances_render_errors_per_account() {
        let client = client(&["wss://api.devnet.solana.com".to_string()]).unwrap();
        let accounts = [
            "9wkxjGXrRhHB9pFZrEpQKBKAJ52jMjVUahnVNezJFvL7".to_string(),
            "2b8bUknUbyLmUdKPH6o4jUbgNeztKSVwCN5w2QtEm61r".to_string(),
        ];
        let mint = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB".to_string();

        let result = balances(&client, &accounts, std::slice::from_ref(&mint)).await;

        let error = json!({"error": "unsupported_scheme: wss://api.devnet.solana.com"});
        assert_eq!(result.len(), 2);
        for section in ["sol", mint.as_str()] {
            for account in &accounts {
                assert_eq!(result[section][account], error, "{section} {account}");
            }
        }
    }

    #[tokio::test]
    async fn token_balance_needs_a_token_account() {
        use tokio::{
            io::{AsyncReadExt, AsyncWriteExt},
            net::TcpListener,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let node = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let body = r#"{"jsonrpc":"2.0","result":{"context":{"slot":1},"value":[]},"id":1}"#;
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                // The JSON-RPC body is the last thing sent and ends with `}`.
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                while !request.ends_with(b"}") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        let client = client(&[node]).unwrap();
        let out = first_token_account_balance(
            &client,
            "9wkxjGXrRhHB9pFZrEpQKBKAJ52jMjVUahnVNezJFvL7",
            "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
        )
        .await;
        assert_eq!(out.error(), Some(&CallError::NoTokenAccounts));
        assert_eq!(out.ok_or_error(), json!({"error": "no_token_accounts"}));
    }

    #[test]
    fn keypair_json_has_every_encoding() {
        let pair = keypair::keypair_from_private_key(
            "2eP4yM63zQxBkoF2Rzzmank9AQ2qiPJExxb7AZ95UPxUpHf8XWgYpy7C5ZNy6zU3jj4nYPD1ijK4EzLLZDwkxZXM",
        )
        .unwrap();
        let value = keypair_json(&pair);
        assert_eq!(value["public"], "9wkxjGXrRhHB9pFZrEpQKBKAJ52jMjVUahnVNezJFvL7");
        assert!(value["private_arr"].as_str().unwrap().starts_with("[82,64,164,"));
    }

    #[test]
    fn balance_config_requires_nodes() {
        let err = serde_yaml::from_str::<BalanceConfig>("accounts: [a]\n").unwrap_err();
        assert!(err.to_string().contains("nodes"), "{err}");
    }
}
