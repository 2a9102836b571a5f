//! JSON-RPC 2.0 over HTTP(S).
//!
//! [`call`] performs exactly one POST and classifies the answer. Retrying is
//! left to [`crate::client::NodeClient`].

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::{config::CallConfig, errors::CallError, outcome::Outcome};

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: Value,
    pub id: u64,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }
}

/// Calls `method` on `node` with request id 1.
pub async fn call(node: &str, method: &str, params: Value, cfg: &CallConfig) -> Outcome<Value> {
    send(node, &JsonRpcRequest::new(method, params), cfg).await
}

/// Whether `node` uses the `http` or `https` scheme, in any letter case.
pub fn is_http(node: &str) -> bool {
    node.split_once("://").is_some_and(|(scheme, _)| {
        scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
    })
}

/// Sends a prepared request to `node`.
///
/// Only `http://` and `https://` nodes are supported; anything else yields
/// [`CallError::UnsupportedScheme`] without touching the network.
pub async fn send(node: &str, request: &JsonRpcRequest<'_>, cfg: &CallConfig) -> Outcome<Value> {
    if !is_http(node) {
        return Outcome::err(CallError::UnsupportedScheme(node.to_string()), None);
    }

    debug!("rpc {} -> {}", request.method, node);

    let client = match http_client(cfg) {
        Ok(client) => client,
        Err(e) => return Outcome::err(CallError::Transport(e.to_string()), None),
    };

    let resp = match client.post(node).json(request).send().await {
        Ok(resp) => resp,
        Err(e) => return Outcome::err(CallError::Transport(e.to_string()), None),
    };

    let status = resp.status();
    let body = match resp.text().await {
        Ok(body) => body,
        Err(e) => return Outcome::err(CallError::Transport(e.to_string()), None),
    };

    if !status.is_success() {
        let snippet: String = body.chars().take(500).collect();
        return Outcome::err(
            CallError::Transport(format!("http status {}", status.as_u16())),
            Some(Value::String(snippet)),
        );
    }

    match serde_json::from_str::<Value>(&body) {
        Ok(json) => classify(json),
        Err(e) => Outcome::err(CallError::decode(e), Some(Value::String(body))),
    }
}

/// Classifies a decoded JSON-RPC response body.
///
/// A non-empty `error.message` wins over `result`; a body with neither is
/// `unknown_response`. The whole body is kept as raw data.
pub fn classify(body: Value) -> Outcome<Value> {
    if !body.is_object() {
        return Outcome::err(
            CallError::Decode("response is not a JSON object".to_string()),
            Some(body),
        );
    }

    let message = body
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !message.is_empty() {
        let err = CallError::Service(message.to_string());
        return Outcome::err(err, Some(body));
    }

    match body.get("result") {
        Some(result) => {
            let result = result.clone();
            Outcome::ok(result, Some(body))
        }
        None => Outcome::err(CallError::UnknownResponse, Some(body)),
    }
}

fn http_client(cfg: &CallConfig) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(cfg.timeout);
    if let Some(proxy) = &cfg.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    builder.build()
}
