//! Per-query-class request tokens.
//!
//! Every viewport or filter change issues a fresh token. Work started under an
//! older token is stale and must not be committed; this is how out-of-order
//! completions are discarded without cancelling the underlying I/O.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Identifies one request within a query class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestToken {
    pub query_class: String,
    pub sequence: u64,
}

/// Issues monotonically increasing tokens per query class.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: Mutex<HashMap<String, u64>>,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next token for `query_class`, superseding all earlier ones.
    ///
    /// Sequences start at 1.
    pub fn issue(&self, query_class: &str) -> RequestToken {
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        let sequence = latest.entry(query_class.to_string()).or_insert(0);
        *sequence += 1;
        RequestToken { query_class: query_class.to_string(), sequence: *sequence }
    }

    /// Whether `token` is the latest issued for its class.
    pub fn is_current(&self, token: &RequestToken) -> bool {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        latest.get(&token.query_class) == Some(&token.sequence)
    }

    /// Latest sequence issued for a class, if any.
    pub fn current(&self, query_class: &str) -> Option<u64> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).get(query_class).copied()
    }

    /// Classes that have been issued at least one token, sorted.
    pub fn query_classes(&self) -> Vec<String> {
        let mut classes: Vec<String> =
            self.latest.lock().unwrap_or_else(|e| e.into_inner()).keys().cloned().collect();
        classes.sort();
        classes
    }

    /// Supersede every outstanding token in every class.
    pub fn supersede_all(&self) -> Vec<RequestToken> {
        self.query_classes().iter().map(|class| self.issue(class)).collect()
    }
}
