//! `{{ NAME }}` placeholders in config values, filled from environment variables.

use serde_json::Value;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("can't get environment variable {0}")]
    MissingVar(String),

    #[error("template syntax error: {0}")]
    Syntax(String),
}

/// Replaces every `{{ NAME }}` in `template` with `lookup(NAME)`.
///
/// An unset or empty variable is an error, as is an unterminated `{{` or a
/// placeholder whose name is not `[A-Za-z0-9_]+`.
pub fn resolve<F>(template: &str, lookup: F) -> Result<String, TemplateError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| TemplateError::Syntax(format!("unterminated placeholder in {template:?}")))?;

        let name = after[..end].trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(TemplateError::Syntax(format!("bad variable name {name:?}")));
        }
        match lookup(name) {
            Some(value) if !value.is_empty() => out.push_str(&value),
            _ => return Err(TemplateError::MissingVar(name.to_string())),
        }

        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Resolves every string inside `value`, recursing through arrays and objects.
pub fn resolve_value<F>(value: &mut Value, lookup: &F) -> Result<(), TemplateError>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => *s = resolve(s, lookup)?,
        Value::Array(items) => {
            for item in items {
                resolve_value(item, lookup)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                resolve_value(item, lookup)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Lookup backed by the process environment.
pub fn from_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn vars(name: &str) -> Option<String> {
        match name {
            "RPC_KEY" => Some("abc123".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_placeholders() {
        assert_eq!(
            resolve("https://rpc.example/?key={{ RPC_KEY }}", vars).unwrap(),
            "https://rpc.example/?key=abc123"
        );
        assert_eq!(resolve("{{RPC_KEY}}-{{ RPC_KEY }}", vars).unwrap(), "abc123-abc123");
        assert_eq!(resolve("plain text", vars).unwrap(), "plain text");
    }

    #[test]
    fn unset_or_empty_variable_is_an_error() {
        assert_eq!(
            resolve("{{ PRIVATE_KEY }}", vars),
            Err(TemplateError::MissingVar("PRIVATE_KEY".into()))
        );
        assert_eq!(
            resolve("{{ EMPTY }}", vars).unwrap_err().to_string(),
            "can't get environment variable EMPTY"
        );
    }

    #[test]
    fn malformed_placeholders() {
        assert!(matches!(resolve("{{ RPC_KEY", vars), Err(TemplateError::Syntax(_))));
        assert!(matches!(resolve("{{ a b }}", vars), Err(TemplateError::Syntax(_))));
    }

    #[test]
    fn walks_nested_values() {
        let mut value = json!({
            "nodes": ["https://a/{{ RPC_KEY }}", "https://b"],
            "amount": 0.5,
            "nested": {"key": "{{ RPC_KEY }}"}
        });
        resolve_value(&mut value, &vars).unwrap();
        assert_eq!(value["nodes"][0], "https://a/abc123");
        assert_eq!(value["nested"]["key"], "abc123");
        assert_eq!(value["amount"], 0.5);
    }
}
