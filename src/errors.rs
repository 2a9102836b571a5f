use std::path::PathBuf;

/// Failure half of an [`Outcome`](crate::outcome::Outcome).
///
/// The `Display` form of each variant is the message surfaced to callers and
/// printed by the CLI, so it is kept stable.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Connection failure, timeout or non-success HTTP status.
    #[error("transport_error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC `error` object.
    #[error("service_error: {0}")]
    Service(String),

    /// The response carried neither `result` nor `error`.
    #[error("unknown_response")]
    UnknownResponse,

    /// The response (or command output) did not have the expected shape.
    #[error("exception: {0}")]
    Decode(String),

    /// Only `http://` and `https://` node references are supported.
    #[error("unsupported_scheme: {0}")]
    UnsupportedScheme(String),

    /// The external command failed or printed something unparseable.
    #[error("command_error: {0}")]
    Command(String),

    /// The owner has no token account for the requested mint.
    #[error("no_token_accounts")]
    NoTokenAccounts,

    /// More than one non-empty token account exists for the owner and mint.
    #[error("many_token_accounts: set token_account explicitly")]
    ManyTokenAccounts,

    /// The sender holds more than one token account for the mint.
    #[error("many_from_token_accounts")]
    ManyFromTokenAccounts,

    /// The recipient holds more than one token account for the mint.
    #[error("many_to_token_accounts")]
    ManyToTokenAccounts,
}

impl CallError {
    pub fn decode(err: impl std::fmt::Display) -> Self {
        CallError::Decode(err.to_string())
    }
}

/// Errors raised before any network call is made.
///
/// These indicate a misconfigured caller rather than a failed operation.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Neither a single node nor a node pool was supplied.
    #[error("invalid_config: node or nodes must be set")]
    NoNodes,

    /// The configured address is not derived from the configured private key.
    #[error("invalid_config: from_address {0} does not match private key")]
    KeyMismatch(String),

    /// Private key material could not be decoded.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// A mnemonic has the wrong shape or could not be derived.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// A transfer amount is negative or does not fit in lamports.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// An address could not be parsed as a public key.
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("can't read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
