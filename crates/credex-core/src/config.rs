use serde::{Deserialize, Serialize};

/// What `advance` does when another call already holds the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusyPolicy {
    /// Queue behind the in-flight call and apply afterwards.
    Wait,
    /// Return `ExchangeBusy` immediately.
    FailFast,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of live (non-released) exchanges.
    pub max_live_exchanges: usize,
    /// Behavior when two callers race on one exchange.
    pub busy_policy: BusyPolicy,
    /// Upper bound on a single wallet or ledger adapter call, in ms.
    pub adapter_timeout_ms: u64,
    /// Wallet key reference used to sign outgoing envelopes.
    pub local_key_ref: String,
    /// Label presented to peers in connection messages.
    pub label: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_live_exchanges: 1024,
            busy_policy: BusyPolicy::Wait,
            adapter_timeout_ms: 5_000,
            local_key_ref: "local".to_string(),
            label: "credex-agent".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn adapter_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.adapter_timeout_ms)
    }
}
