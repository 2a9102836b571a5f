//! Wrapper around the `solana` command-line tool.
//!
//! Each operation renders a command line, runs it through a
//! [`CommandExecutor`] and decodes stdout. Raw data is always
//! `{"cmd", "stdout", "stderr"}`, so a failed decode still shows what the
//! tool printed.

use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt,
    io::Write,
    path::Path,
    str::FromStr,
    time::Duration,
};

use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    errors::CallError,
    outcome::Outcome,
    shell::{CommandExecutor, CommandOutput, LocalShell},
    units::{de_opt_sol, de_sol, lamports_as_sol},
};

/// `solana stake-account` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeAccount {
    #[serde(rename(deserialize = "stakeType"))]
    pub stake_type: String,
    /// Account balance in SOL.
    #[serde(rename(deserialize = "accountBalance"), deserialize_with = "de_sol")]
    pub balance: Decimal,
    pub withdrawer: String,
    pub staker: String,
    #[serde(rename(deserialize = "delegatedVoteAccountAddress"), default)]
    pub vote: Option<String>,
}

/// One entry of `solana stakes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    #[serde(rename(deserialize = "stakePubkey"))]
    pub stake_address: String,
    #[serde(rename(deserialize = "withdrawer"))]
    pub withdrawer_address: String,
    #[serde(rename(deserialize = "delegatedVoteAccountAddress"), default)]
    pub vote_address: Option<String>,
    #[serde(rename(deserialize = "accountBalance"), deserialize_with = "de_sol")]
    pub balance: Decimal,
    #[serde(
        rename(deserialize = "delegatedStake"),
        deserialize_with = "de_opt_sol",
        default
    )]
    pub delegated: Option<Decimal>,
    #[serde(
        rename(deserialize = "activeStake"),
        deserialize_with = "de_opt_sol",
        default
    )]
    pub active: Option<Decimal>,
    #[serde(rename(deserialize = "unixTimestamp"), default)]
    pub lock_time: Option<i64>,
}

/// `solana block-production` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockProduction {
    pub epoch: u64,
    #[serde(rename(deserialize = "startSlot"), alias = "start_slot")]
    pub start_slot: u64,
    #[serde(rename(deserialize = "endSlot"), alias = "end_slot")]
    pub end_slot: u64,
    pub leaders: Vec<LeaderProduction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderProduction {
    #[serde(rename(deserialize = "identityPubkey"), alias = "validator")]
    pub validator: String,
    #[serde(rename(deserialize = "leaderSlots"), alias = "leader")]
    pub leader: u64,
    #[serde(rename(deserialize = "blocksProduced"), alias = "produced")]
    pub produced: u64,
    #[serde(rename(deserialize = "skippedSlots"), alias = "skipped")]
    pub skipped: u64,
}

/// Published validator info from `solana validator-info get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatorInfo {
    pub identity_address: String,
    pub info_address: String,
    pub name: Option<String>,
    pub keybase: Option<String>,
    pub website: Option<String>,
    pub details: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireValidatorInfo {
    identity_pubkey: String,
    info_pubkey: String,
    #[serde(default)]
    info: WireInfo,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WireInfo {
    name: Option<String>,
    keybase_username: Option<String>,
    website: Option<String>,
    details: Option<String>,
}

impl From<WireValidatorInfo> for ValidatorInfo {
    fn from(v: WireValidatorInfo) -> Self {
        Self {
            identity_address: v.identity_pubkey,
            info_address: v.info_pubkey,
            name: v.info.name,
            keybase: v.info.keybase_username,
            website: v.info.website,
            details: v.info.details,
        }
    }
}

/// Amount for `withdraw-from-vote-account`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawAmount {
    Sol(Decimal),
    All,
}

impl fmt::Display for WithdrawAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sol(amount) => write!(f, "{amount}"),
            Self::All => f.write_str("ALL"),
        }
    }
}

/// Handle on a `solana` binary reachable through an executor.
#[derive(Debug, Clone)]
pub struct SolanaCli<E = LocalShell> {
    executor: E,
    solana_dir: String,
    url: String,
    timeout: Duration,
}

impl Default for SolanaCli<LocalShell> {
    fn default() -> Self {
        Self::new(LocalShell)
    }
}

impl<E: CommandExecutor> SolanaCli<E> {
    /// Uses `solana` from `PATH` against `localhost` with a 60 second timeout.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            solana_dir: String::new(),
            url: "localhost".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Directory holding the `solana` binary.
    pub fn with_solana_dir(mut self, dir: impl Into<String>) -> Self {
        let mut dir = dir.into();
        if !dir.is_empty() && !dir.ends_with('/') {
            dir.push('/');
        }
        self.solana_dir = dir;
        self
    }

    /// Cluster moniker or RPC URL passed as `-u`.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn solana(&self) -> String {
        quote(&format!("{}solana", self.solana_dir)).into_owned()
    }

    fn url(&self) -> Cow<'_, str> {
        quote(&self.url)
    }

    async fn exec(&self, cmd: &str) -> (CommandOutput, Value) {
        let out = self.executor.run(cmd, self.timeout).await;
        let raw = json!({ "cmd": cmd, "stdout": out.stdout, "stderr": out.stderr });
        (out, raw)
    }

    /// Runs `cmd` and decodes stdout as JSON into `T`.
    async fn exec_json<T: DeserializeOwned>(&self, cmd: &str) -> Outcome<T> {
        let (out, raw) = self.exec(cmd).await;
        match serde_json::from_str(&out.stdout) {
            Ok(value) => Outcome::ok(value, Some(raw)),
            Err(e) => Outcome::err(command_error(&out, e), Some(raw)),
        }
    }

    /// Balance of `address` in SOL.
    pub async fn balance(&self, address: &str) -> Outcome<Decimal> {
        let cmd = format!("{} balance {} -u {}", self.solana(), quote(address), self.url());
        let (out, raw) = self.exec(&cmd).await;
        match Decimal::from_str(out.stdout.replace("SOL", "").trim()) {
            Ok(balance) => Outcome::ok(balance, Some(raw)),
            Err(e) => Outcome::err(command_error(&out, e), Some(raw)),
        }
    }

    pub async fn slot(&self) -> Outcome<u64> {
        let cmd = format!("{} slot -u {}", self.solana(), self.url());
        let (out, raw) = self.exec(&cmd).await;
        match out.stdout.trim().parse::<u64>() {
            Ok(slot) => Outcome::ok(slot, Some(raw)),
            Err(e) => Outcome::err(command_error(&out, e), Some(raw)),
        }
    }

    pub async fn stake_account(&self, address: &str) -> Outcome<StakeAccount> {
        let cmd = format!(
            "{} stake-account --output json -u {} {}",
            self.solana(),
            self.url(),
            quote(address),
        );
        self.exec_json(&cmd).await
    }

    /// Transfers `amount` SOL signed by the keypair file at `key_path`.
    ///
    /// The same key pays the fee. Returns the transaction signature.
    pub async fn transfer_with_key_file(
        &self,
        recipient: &str,
        amount: Decimal,
        key_path: &Path,
        allow_unfunded_recipient: bool,
    ) -> Outcome<String> {
        let key = key_path.to_string_lossy();
        let key = quote(&key);
        let mut cmd = format!(
            "{} transfer {} {amount} --from {key} --fee-payer {key}",
            self.solana(),
            quote(recipient),
        );
        if allow_unfunded_recipient {
            cmd.push_str(" --allow-unfunded-recipient");
        }
        cmd.push_str(&format!(" -u {} --output json", self.url()));
        self.exec_json::<Value>(&cmd).await.decode(signature)
    }

    /// Like [`transfer_with_key_file`](Self::transfer_with_key_file), for key
    /// material held in memory.
    ///
    /// The key is written to a uniquely named file in `tmp_dir` that is removed
    /// when the call returns, whatever the outcome.
    pub async fn transfer_with_private_key(
        &self,
        recipient: &str,
        amount: Decimal,
        private_key: &str,
        tmp_dir: &Path,
    ) -> Outcome<String> {
        let key_file = match write_key_file(private_key, tmp_dir) {
            Ok(file) => file,
            Err(e) => {
                return Outcome::err(
                    CallError::Command(format!("can't write key file: {e}")),
                    None,
                )
            }
        };
        self.transfer_with_key_file(recipient, amount, key_file.path(), true)
            .await
        // key_file dropped here, deleting the file
    }

    pub async fn withdraw_from_vote_account(
        &self,
        recipient: &str,
        amount: WithdrawAmount,
        vote_key_path: &Path,
        fee_payer_key_path: &Path,
    ) -> Outcome<String> {
        let cmd = format!(
            "{} withdraw-from-vote-account --keypair {} -u {} --output json {} {} {amount}",
            self.solana(),
            quote(&fee_payer_key_path.to_string_lossy()),
            self.url(),
            quote(&vote_key_path.to_string_lossy()),
            quote(recipient),
        );
        self.exec_json::<Value>(&cmd).await.decode(signature)
    }

    pub async fn validators_info(&self) -> Outcome<Vec<ValidatorInfo>> {
        let cmd = format!("{} validator-info get --output json -u {}", self.solana(), self.url());
        self.exec_json::<Vec<WireValidatorInfo>>(&cmd)
            .await
            .map(|list| list.into_iter().map(ValidatorInfo::from).collect())
    }

    /// Rewards of a vote account per epoch, in SOL.
    pub async fn vote_account_rewards(
        &self,
        address: &str,
        num_rewards_epochs: u32,
    ) -> Outcome<BTreeMap<u64, Decimal>> {
        let cmd = format!(
            "{} vote-account {} --with-rewards --num-rewards-epochs={num_rewards_epochs} -u {} --output json 2>/dev/null",
            self.solana(),
            quote(address),
            self.url(),
        );
        self.exec_json::<Value>(&cmd).await.decode(epoch_rewards)
    }

    /// Block production of the current epoch.
    ///
    /// A leading `Note:` line printed before the JSON is stripped and kept in
    /// the raw data under `note`.
    pub async fn block_production(&self) -> Outcome<BlockProduction> {
        let cmd = format!("{} block-production --output json -u {}", self.solana(), self.url());
        let (out, mut raw) = self.exec(&cmd).await;

        let (note, body) = split_note(&out.stdout);
        if let Some(note) = note {
            raw["note"] = Value::String(note.to_string());
        }
        match serde_json::from_str(body) {
            Ok(production) => Outcome::ok(production, Some(raw)),
            Err(e) => Outcome::err(command_error(&out, e), Some(raw)),
        }
    }

    pub async fn stakes(&self) -> Outcome<Vec<Stake>> {
        let cmd = format!("{} stakes --output json -u {}", self.solana(), self.url());
        self.exec_json(&cmd).await
    }
}

/// Quotes `arg` for `sh` unless it only holds characters the shell leaves alone.
fn quote(arg: &str) -> Cow<'_, str> {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c));
    if plain {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}

fn write_key_file(private_key: &str, dir: &Path) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("solana__")
        .suffix(".json")
        .tempfile_in(dir)?;
    file.write_all(private_key.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn command_error(out: &CommandOutput, err: impl fmt::Display) -> CallError {
    match out.exit_status {
        Some(0) => CallError::Command(err.to_string()),
        Some(code) => CallError::Command(format!("exit status {code}: {err}")),
        None => CallError::Command(format!("{}: {err}", out.stderr.trim())),
    }
}

fn signature(value: Value) -> Result<String, String> {
    value
        .get("signature")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| "missing field `signature`".to_string())
}

fn epoch_rewards(value: Value) -> Result<BTreeMap<u64, Decimal>, String> {
    let rewards = value
        .get("epochRewards")
        .and_then(Value::as_array)
        .ok_or("missing field `epochRewards`")?;
    rewards
        .iter()
        .map(|r| {
            let epoch = r.get("epoch").and_then(Value::as_u64);
            let amount = r.get("amount").and_then(Value::as_u64);
            match (epoch, amount) {
                (Some(epoch), Some(amount)) => Ok((epoch, lamports_as_sol(amount))),
                _ => Err(format!("malformed reward entry: {r}")),
            }
        })
        .collect()
}

fn split_note(stdout: &str) -> (Option<&str>, &str) {
    let trimmed = stdout.trim();
    if trimmed.starts_with("Note:") {
        if let Some((note, rest)) = trimmed.split_once('\n') {
            return (Some(note.trim_end()), rest);
        }
    }
    (None, trimmed)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Replays canned output and records every command line it was given.
    #[derive(Clone, Default)]
    struct FakeShell {
        output: CommandOutput,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl FakeShell {
        fn printing(stdout: &str) -> Self {
            Self {
                output: CommandOutput {
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                    exit_status: Some(0),
                },
                seen: Arc::default(),
            }
        }

        fn commands(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl CommandExecutor for FakeShell {
        fn run(&self, cmd: &str, _timeout: Duration) -> impl std::future::Future<Output = CommandOutput> + Send {
            self.seen.lock().unwrap().push(cmd.to_string());
            let output = self.output.clone();
            async move { output }
        }
    }

    fn cli(shell: &FakeShell) -> SolanaCli<FakeShell> {
        SolanaCli::new(shell.clone())
            .with_solana_dir("/opt/solana/bin")
            .with_url("https://api.testnet.solana.com")
    }

    #[tokio::test]
    async fn balance_strips_unit() {
        let shell = FakeShell::printing("12.5 SOL\n");
        let out = cli(&shell).balance("addr").await;
        assert_eq!(out.value(), Some(&Decimal::from_str("12.5").unwrap()));
        assert_eq!(
            shell.commands(),
            ["/opt/solana/bin/solana balance addr -u https://api.testnet.solana.com"]
        );
    }

    #[tokio::test]
    async fn unparseable_output_keeps_diagnostics() {
        let shell = FakeShell {
            output: CommandOutput {
                stdout: String::new(),
                stderr: "Error: connection refused".into(),
                exit_status: Some(1),
            },
            seen: Arc::default(),
        };
        let out = cli(&shell).slot().await;
        assert!(matches!(out.error(), Some(CallError::Command(m)) if m.starts_with("exit status 1")));
        let raw = out.raw.unwrap();
        assert_eq!(raw["stderr"], "Error: connection refused");
        assert_eq!(raw["cmd"], "/opt/solana/bin/solana slot -u https://api.testnet.solana.com");
    }

    #[tokio::test]
    async fn stake_account_converts_lamports() {
        let shell = FakeShell::printing(
            r#"{"accountBalance": 2500000000, "stakeType": "Stake", "withdrawer": "w", "staker": "s",
                "delegatedVoteAccountAddress": "v", "rentExemptReserve": 2282880}"#,
        );
        let acc = cli(&shell).stake_account("addr").await.into_result().unwrap();
        assert_eq!(acc.balance, Decimal::from_str("2.5").unwrap());
        assert_eq!(acc.vote.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn transfer_reads_signature_and_renders_flags() {
        let shell = FakeShell::printing(r#"{"signature": "5sig"}"#);
        let out = cli(&shell)
            .transfer_with_key_file("dest", Decimal::ONE, Path::new("/keys/a.json"), true)
            .await;
        assert_eq!(out.value().map(String::as_str), Some("5sig"));
        assert_eq!(
            shell.commands(),
            ["/opt/solana/bin/solana transfer dest 1 --from /keys/a.json --fee-payer /keys/a.json --allow-unfunded-recipient -u https://api.testnet.solana.com --output json"]
        );
    }

    #[tokio::test]
    async fn temporary_key_file_is_removed_on_every_path() {
        let dir = tempfile::tempdir().unwrap();

        for stdout in [r#"{"signature": "5sig"}"#, "not json"] {
            let shell = FakeShell::printing(stdout);
            let _ = cli(&shell)
                .transfer_with_private_key("dest", Decimal::ONE, "[1,2,3]", dir.path())
                .await;

            let cmd = &shell.commands()[0];
            let key_path = cmd.split(" --from ").nth(1).unwrap().split(' ').next().unwrap();
            assert!(key_path.starts_with(dir.path().to_str().unwrap()));
            assert!(!Path::new(key_path).exists());
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn withdraw_all() {
        let shell = FakeShell::printing(r#"{"signature": "w1"}"#);
        let out = cli(&shell)
            .withdraw_from_vote_account(
                "dest",
                WithdrawAmount::All,
                Path::new("vote.json"),
                Path::new("payer.json"),
            )
            .await;
        assert_eq!(out.value().map(String::as_str), Some("w1"));
        assert!(shell.commands()[0].ends_with("--output json vote.json dest ALL"));
    }

    #[tokio::test]
    async fn validators_info_flattens_info_block() {
        let shell = FakeShell::printing(
            r#"[{"identityPubkey": "id1", "infoPubkey": "info1",
                 "info": {"name": "Validator One", "keybaseUsername": "v1", "website": "https://v1.example"}},
                {"identityPubkey": "id2", "infoPubkey": "info2", "info": {}}]"#,
        );
        let list = cli(&shell).validators_info().await.into_result().unwrap();
        assert_eq!(list[0].name.as_deref(), Some("Validator One"));
        assert_eq!(list[0].keybase.as_deref(), Some("v1"));
        assert_eq!(list[1].identity_address, "id2");
        assert_eq!(list[1].details, None);
    }

    #[tokio::test]
    async fn vote_rewards_by_epoch() {
        let shell = FakeShell::printing(
            r#"{"epochRewards": [{"epoch": 401, "amount": 1500000000}, {"epoch": 400, "amount": 2000000000}]}"#,
        );
        let rewards = cli(&shell).vote_account_rewards("vote", 2).await.into_result().unwrap();
        assert_eq!(rewards.len(), 2);
        assert_eq!(rewards[&401], Decimal::from_str("1.5").unwrap());
        assert!(shell.commands()[0].contains("--num-rewards-epochs=2"));
    }

    #[tokio::test]
    async fn block_production_strips_note() {
        let shell = FakeShell::printing(
            "Note: Requested start slot was 100 but minimum ledger slot is 120\n\
             {\"epoch\": 5, \"startSlot\": 120, \"endSlot\": 200, \"leaders\": [\
             {\"identityPubkey\": \"id\", \"leaderSlots\": 8, \"blocksProduced\": 7, \"skippedSlots\": 1}]}\n",
        );
        let out = cli(&shell).block_production().await;
        let raw = out.raw.clone().unwrap();
        let production = out.into_result().unwrap();
        assert_eq!(production.start_slot, 120);
        assert_eq!(production.leaders[0].skipped, 1);
        assert_eq!(
            raw["note"],
            "Note: Requested start slot was 100 but minimum ledger slot is 120"
        );
    }

    #[tokio::test]
    async fn stakes_with_optional_fields() {
        let shell = FakeShell::printing(
            r#"[{"stakePubkey": "s1", "withdrawer": "w", "accountBalance": 1000000000,
                 "delegatedStake": 500000000, "activeStake": 500000000, "delegatedVoteAccountAddress": "v"},
                {"stakePubkey": "s2", "withdrawer": "w", "accountBalance": 3000000000}]"#,
        );
        let stakes = cli(&shell).stakes().await.into_result().unwrap();
        assert_eq!(stakes[0].delegated, Some(Decimal::from_str("0.5").unwrap()));
        assert_eq!(stakes[1].vote_address, None);
        assert_eq!(stakes[1].active, None);
    }

    #[test]
    fn shell_arguments_are_quoted_when_needed() {
        assert_eq!(quote("/keys/a.json"), "/keys/a.json");
        assert_eq!(quote("https://api.testnet.solana.com"), "https://api.testnet.solana.com");
        assert_eq!(quote("my keys/a.json"), "'my keys/a.json'");
        assert_eq!(quote("a;rm -rf ~"), "'a;rm -rf ~'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote(""), "''");
    }

    #[tokio::test]
    async fn key_paths_and_addresses_are_quoted() {
        let shell = FakeShell::printing(r#"{"signature": "w2"}"#);
        let _ = cli(&shell)
            .withdraw_from_vote_account(
                "dest $(id)",
                WithdrawAmount::All,
                Path::new("/home/val/vote key.json"),
                Path::new("/home/val/payer.json"),
            )
            .await;
        assert_eq!(
            shell.commands(),
            ["/opt/solana/bin/solana withdraw-from-vote-account --keypair /home/val/payer.json -u https://api.testnet.solana.com --output json '/home/val/vote key.json' 'dest $(id)' ALL"]
        );
    }

    #[tokio::test]
    async fn quoted_key_file_runs_through_sh() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("fee payer.json");
        std::fs::write(&key_path, "[1]").unwrap();

        let cmd = format!("cat {}", quote(&key_path.to_string_lossy()));
        let out = LocalShell.run(&cmd, Duration::from_secs(5)).await;
        assert_eq!(out.stdout, "[1]");
    }

    #[test]
    fn solana_dir_gets_trailing_slash() {
        let cli = SolanaCli::<LocalShell>::default().with_solana_dir("/usr/local/bin");
        assert_eq!(cli.solana(), "/usr/local/bin/solana");
        assert_eq!(SolanaCli::<LocalShell>::default().solana(), "solana");
    }
}
