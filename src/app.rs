//! Command config files and output shared by the subcommands.

use std::{collections::HashSet, path::Path, process};

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::env::{self, TemplateError};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("can't parse config file: {0}")]
    Parse(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Global flags that apply to every config-driven subcommand.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Print the resolved config as JSON and exit.
    pub print_config: bool,
    /// Nodes given with `-n`; they replace `nodes` from the config file.
    pub nodes: Vec<String>,
}

impl Context {
    /// Loads the config at `path`, or prints the problem and exits with status 1.
    ///
    /// With `--config` the resolved config is printed and the process exits
    /// with status 0.
    pub fn load_or_exit<T>(&self, path: &Path) -> T
    where
        T: DeserializeOwned + Serialize,
    {
        let config = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))
            .and_then(|text| self.parse(&text, is_toml(path), &env::from_env));
        let config: T = match config {
            Ok(config) => config,
            Err(e) => fatal(e),
        };

        if self.print_config {
            print_json(&config);
            process::exit(0);
        }
        config
    }

    fn parse<T, F>(&self, text: &str, toml: bool, lookup: &F) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> Option<String>,
    {
        let mut value: Value = if toml {
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?
        };

        env::resolve_value(&mut value, lookup)?;

        if !self.nodes.is_empty() {
            if let Value::Object(map) = &mut value {
                map.insert("nodes".to_string(), self.nodes.clone().into());
            }
        }

        serde_json::from_value(value).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

/// Splits a multi-line string into a list.
///
/// Text after `#` is dropped, lines are trimmed, empty lines skipped and
/// repeated entries kept only once.
pub fn str_to_list(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(*line))
        .map(str::to_string)
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    Text(String),
    List(Vec<String>),
}

impl From<StringOrList> for Vec<String> {
    fn from(value: StringOrList) -> Self {
        match value {
            StringOrList::Text(text) => str_to_list(&text),
            StringOrList::List(list) => list,
        }
    }
}

/// Accepts either a list or a multi-line string, see [`str_to_list`].
pub fn de_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrList::deserialize(deserializer).map(Into::into)
}

pub fn de_opt_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrList>::deserialize(deserializer)?.map(Into::into))
}

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => fatal(e),
    }
}

pub fn fatal(message: impl std::fmt::Display) -> ! {
    eprintln!("{message}");
    process::exit(1);
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[derive(Debug, Deserialize, Serialize)]
    #[serde(deny_unknown_fields)]
    struct Sample {
        #[serde(deserialize_with = "de_list")]
        nodes: Vec<String>,
        #[serde(default, deserialize_with = "de_opt_list")]
        tokens: Option<Vec<String>>,
        amount: Decimal,
    }

    fn no_vars(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn multi_line_strings_become_lists() {
        assert_eq!(
            str_to_list("a\n  b # second\n\n# comment only\na\nc"),
            ["a", "b", "c"]
        );
    }

    #[test]
    fn yaml_list_or_text() {
        let ctx = Context::default();
        let text = "nodes: |\n  https://a\n  https://b\namount: 0.01\n";
        let cfg: Sample = ctx.parse(text, false, &no_vars).unwrap();
        assert_eq!(cfg.nodes, ["https://a", "https://b"]);
        assert_eq!(cfg.tokens, None);
        assert_eq!(cfg.amount, Decimal::new(1, 2));

        let text = "nodes: [https://a]\ntokens:\n  - mint1\namount: '2'\n";
        let cfg: Sample = ctx.parse(text, false, &no_vars).unwrap();
        assert_eq!(cfg.tokens, Some(vec!["mint1".to_string()]));
    }

    #[test]
    fn toml_config() {
        let text = "nodes = [\"https://a\"]\namount = \"1.5\"\n";
        let cfg: Sample = Context::default().parse(text, true, &no_vars).unwrap();
        assert_eq!(cfg.amount, Decimal::new(15, 1));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let text = "nodes: [https://a]\namount: 1\nnode: https://b\n";
        let err = Context::default().parse::<Sample, _>(text, false, &no_vars).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn command_line_nodes_replace_config_nodes() {
        let ctx = Context {
            print_config: false,
            nodes: vec!["https://override".to_string()],
        };
        let cfg: Sample = ctx.parse("nodes: [https://a]\namount: 1\n", false, &no_vars).unwrap();
        assert_eq!(cfg.nodes, ["https://override"]);
    }

    #[test]
    fn templates_are_resolved_before_decoding() {
        let lookup = |name: &str| (name == "NODE").then(|| "https://secret".to_string());
        let cfg: Sample = Context::default()
            .parse("nodes: '{{ NODE }}'\namount: 1\n", false, &lookup)
            .unwrap();
        assert_eq!(cfg.nodes, ["https://secret"]);

        let err = Context::default()
            .parse::<Sample, _>("nodes: '{{ MISSING }}'\namount: 1\n", false, &lookup)
            .unwrap_err();
        assert_eq!(err.to_string(), "can't get environment variable MISSING");
    }

    #[test]
    fn toml_extension_selects_format() {
        assert!(is_toml(Path::new("cfg/balance.toml")));
        assert!(!is_toml(Path::new("balance.yml")));
    }
}
