//! Per-node retry/backoff computation for the executor ("retry per the
//! node's retry config (attempts, backoff)"). Grounded in the
//! dispatcher's `jittered_backoff` shape, generalized to read the
//! attempts/backoff pair out of a node's own JSON config instead of a
//! fixed constant.

use serde_json::Value;
use std::time::Duration;

const DEFAULT_ATTEMPTS: u32 = 1;
const DEFAULT_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: DEFAULT_ATTEMPTS, backoff: Duration::from_millis(DEFAULT_BACKOFF_MS) }
    }
}

impl RetryPolicy {
    /// Reads `config["retry"] = {"attempts": n, "backoffMs": ms}`,
    /// falling back to a single attempt with no retry when absent or
    /// malformed - a node with no retry config is simply not retried.
    pub fn from_node_config(config: &Value) -> Self {
        let Some(retry) = config.get("retry") else {
            return Self::default();
        };
        let attempts = retry.get("attempts").and_then(Value::as_u64).map(|a| a.max(1) as u32).unwrap_or(DEFAULT_ATTEMPTS);
        let backoff_ms = retry.get("backoffMs").and_then(Value::as_u64).unwrap_or(DEFAULT_BACKOFF_MS);
        Self { attempts, backoff: Duration::from_millis(backoff_ms) }
    }

    /// Exponential backoff before attempt `attempt` (0-indexed), capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.backoff.saturating_mul(2u32.saturating_pow(attempt.min(8)));
        exp.min(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_retry_config_defaults_to_a_single_attempt() {
        let policy = RetryPolicy::from_node_config(&json!({}));
        assert_eq!(policy.attempts, 1);
    }

    #[test]
    fn retry_config_is_read_from_node_config() {
        let policy = RetryPolicy::from_node_config(&json!({"retry": {"attempts": 3, "backoffMs": 200}}));
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.backoff, Duration::from_millis(200));
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy { attempts: 5, backoff: Duration::from_secs(1) };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(10), MAX_BACKOFF);
    }
}
