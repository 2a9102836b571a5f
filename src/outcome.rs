//! Success/failure envelope returned by every operation.

use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::CallError;

/// The result of one operation together with the raw data it was derived from.
///
/// `raw` holds the original JSON-RPC response, or `{cmd, stdout, stderr}` for
/// external commands, and is kept on success as well as on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub result: Result<T, CallError>,
    pub raw: Option<Value>,
}

impl<T> Outcome<T> {
    pub fn ok(value: T, raw: Option<Value>) -> Self {
        Self {
            result: Ok(value),
            raw,
        }
    }

    pub fn err(error: CallError, raw: Option<Value>) -> Self {
        Self {
            result: Err(error),
            raw,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn is_err(&self) -> bool {
        self.result.is_err()
    }

    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&CallError> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<T, CallError> {
        self.result
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            result: self.result.map(f),
            raw: self.raw,
        }
    }

    /// Like [`Outcome::map`] for fallible steps; raw data is kept either way.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Result<U, CallError>) -> Outcome<U> {
        Outcome {
            result: self.result.and_then(f),
            raw: self.raw,
        }
    }

    /// Decodes the success payload in place.
    ///
    /// Errors pass through untouched. A failing decoder turns the outcome into
    /// `CallError::Decode` and keeps the pre-decode raw data.
    pub fn decode<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Outcome<U>
    where
        E: std::fmt::Display,
    {
        match self.result {
            Ok(value) => match f(value) {
                Ok(decoded) => Outcome::ok(decoded, self.raw),
                Err(e) => Outcome::err(CallError::decode(e), self.raw),
            },
            Err(e) => Outcome::err(e, self.raw),
        }
    }
}

impl<T: Serialize> Outcome<T> {
    /// The value itself on success, `{"error": message}` on failure.
    pub fn ok_or_error(&self) -> Value {
        match &self.result {
            Ok(value) => serde_json::to_value(value)
                .unwrap_or_else(|e| json!({ "error": format!("exception: {e}") })),
            Err(e) => json!({ "error": e.to_string() }),
        }
    }
}
