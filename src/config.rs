use std::time::Duration;

use rand::seq::SliceRandom;

use crate::errors::Error;

/// Where RPC calls are sent.
///
/// Either one fixed node, used for every attempt, or a pool from which a node
/// is picked uniformly at random on each attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePool {
    fixed: Option<String>,
    pool: Vec<String>,
}

impl NodePool {
    /// Builds a node selection from an optional single node and a pool.
    ///
    /// Fails with [`Error::NoNodes`] when neither is supplied. A fixed node
    /// takes precedence over the pool.
    pub fn new(node: Option<String>, nodes: Vec<String>) -> Result<Self, Error> {
        let fixed = node.filter(|n| !n.is_empty());
        if fixed.is_none() && nodes.is_empty() {
            return Err(Error::NoNodes);
        }
        Ok(Self { fixed, pool: nodes })
    }

    pub fn single(node: impl Into<String>) -> Result<Self, Error> {
        Self::new(Some(node.into()), Vec::new())
    }

    pub fn from_nodes(nodes: Vec<String>) -> Result<Self, Error> {
        Self::new(None, nodes)
    }

    /// Picks the node for the next attempt.
    pub fn pick(&self) -> &str {
        if let Some(node) = &self.fixed {
            return node;
        }
        // `new` guarantees a non-empty pool when there is no fixed node.
        self.pool
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        if self.fixed.is_some() {
            1
        } else {
            self.pool.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-call settings shared by the transport and the retry wrapper.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Timeout for a single HTTP request.
    pub timeout: Duration,

    /// Optional HTTP(S) proxy URL.
    pub proxy: Option<String>,

    /// Maximum number of attempts made by the retry wrapper.
    ///
    /// Each attempt picks a fresh node from the pool. There is no backoff
    /// between attempts.
    pub attempts: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            proxy: None,
            attempts: 3,
        }
    }
}

impl CallConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_is_rejected() {
        assert!(matches!(NodePool::new(None, vec![]), Err(Error::NoNodes)));
        assert!(matches!(
            NodePool::new(Some(String::new()), vec![]),
            Err(Error::NoNodes)
        ));
    }

    #[test]
    fn fixed_node_wins_over_pool() {
        let pool = NodePool::new(
            Some("http://fixed".into()),
            vec!["http://a".into(), "http://b".into()],
        )
        .unwrap();
        for _ in 0..20 {
            assert_eq!(pool.pick(), "http://fixed");
        }
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn pick_stays_within_pool() {
        let nodes = vec!["http://a".to_string(), "http://b".to_string()];
        let pool = NodePool::from_nodes(nodes.clone()).unwrap();
        for _ in 0..50 {
            assert!(nodes.iter().any(|n| n == pool.pick()));
        }
    }

    #[test]
    fn default_call_config() {
        let cfg = CallConfig::default();
        assert_eq!(cfg.timeout, Duration::from_secs(10));
        assert_eq!(cfg.attempts, 3);
        assert!(cfg.proxy.is_none());

        let cfg = cfg.with_attempts(5).with_proxy("http://proxy:8080");
        assert_eq!(cfg.attempts, 5);
        assert_eq!(cfg.proxy.as_deref(), Some("http://proxy:8080"));
    }
}
