// Copyright (C) 2022-2024 Webb Technologies Inc.
//
// Tangle is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Tangle is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should receive a copy of the GNU General Public License
// If not, see <http://www.gnu.org/licenses/>.

use std::time::Duration;

use ethers::providers::{JsonRpcError, ProviderError, RetryPolicy};
use webb_relayer_utils::probe;

/// Messages some hosted nodes answer with while load balancing or when a
/// daily budget ran out.
const TRANSIENT_MESSAGES: &[&str] = &[
    "header not found",
    "daily request count exceeded, request rate limited",
];

/// Wait before retrying when the node did not ask for a specific backoff.
const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// Retry policy of the external chain RPC transport.
///
/// Only rate limiting and load balancer hiccups are retried here. Everything
/// else surfaces to the watch loop that made the call, which retries on its
/// next tick.
#[derive(Debug, Clone)]
pub struct HttpRetryPolicy {
    rate_limited: regex::Regex,
}

impl HttpRetryPolicy {
    /// Creates the policy.
    pub fn new() -> webb_relayer_utils::Result<Self> {
        let rate_limited = regex::Regex::new(
            r"(?mixU)\b(?:rate|limit|429|Too \s Many \s Requests)\b",
        )
        .map_err(|_| {
            webb_relayer_utils::Error::Generic("invalid retry regex")
        })?;
        Ok(Self { rate_limited })
    }

    /// Creates the policy, boxed for [`ethers::providers::RetryClient`].
    pub fn boxed() -> webb_relayer_utils::Result<Box<Self>> {
        Ok(Box::new(Self::new()?))
    }

    fn is_transient(&self, err: &JsonRpcError) -> bool {
        match err.code {
            429 | -32005 => true,
            -32016 => self.rate_limited.is_match(&err.message),
            _ => TRANSIENT_MESSAGES.contains(&err.message.as_str()),
        }
    }

    /// Some nodes answer a rate limited call with a body that is not a
    /// JSON-RPC response at all.
    fn is_transient_body(&self, err: &serde_json::Error) -> bool {
        #[derive(serde::Deserialize)]
        struct Body {
            error: JsonRpcError,
        }

        let text = err.to_string();
        if let Ok(body) = serde_json::from_str::<Body>(&text) {
            return self.is_transient(&body.error);
        }
        let text = text.to_lowercase();
        let retry = self.rate_limited.is_match(&text)
            || text == "expected value at line 1 column 1";
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Retry,
            should_retry = retry,
            error = %text,
        );
        retry
    }
}

impl RetryPolicy<ProviderError> for HttpRetryPolicy {
    fn should_retry(&self, error: &ProviderError) -> bool {
        match error {
            ProviderError::HTTPError(err) => {
                err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS)
            }
            ProviderError::JsonRpcClientError(err) => {
                if let Some(e) = err.as_error_response() {
                    self.is_transient(e)
                } else if let Some(e) = err.as_serde_error() {
                    self.is_transient_body(e)
                } else {
                    false
                }
            }
            ProviderError::SerdeJson(err) => self.is_transient_body(err),
            _ => false,
        }
    }

    fn backoff_hint(&self, error: &ProviderError) -> Option<Duration> {
        let requested = match error {
            ProviderError::JsonRpcClientError(err) => err
                .as_error_response()
                .and_then(|e| e.data.as_ref())
                .and_then(|data| data.get("rate")?.get("backoff_seconds"))
                .and_then(|seconds| {
                    seconds.as_u64().or_else(|| {
                        seconds.as_f64().map(|s| s.max(0.0) as u64 + 1)
                    })
                }),
            _ => None,
        };
        Some(requested.map_or(DEFAULT_BACKOFF, Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_error(code: i64, message: &str) -> JsonRpcError {
        JsonRpcError {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[test]
    fn classifies_node_errors() {
        let policy = HttpRetryPolicy::new().unwrap();
        assert!(policy.is_transient(&rpc_error(429, "slow down")));
        assert!(policy.is_transient(&rpc_error(-32005, "limit")));
        assert!(policy.is_transient(&rpc_error(-32016, "rate limit hit")));
        assert!(!policy.is_transient(&rpc_error(-32016, "bad ip")));
        assert!(policy.is_transient(&rpc_error(-32000, "header not found")));
        assert!(!policy.is_transient(&rpc_error(-32000, "nonce too low")));
    }

    #[test]
    fn retries_rate_limits_only() {
        let policy = HttpRetryPolicy::new().unwrap();
        // a bare text body, as some rate limiting proxies return.
        let limited = serde_json::from_str::<serde_json::Value>("x")
            .map(|_| ())
            .unwrap_err();
        assert!(policy.should_retry(&ProviderError::SerdeJson(limited)));
        assert!(!policy.should_retry(&ProviderError::CustomError(
            "nonce too low".into()
        )));
        assert!(!policy.should_retry(&ProviderError::UnsupportedRPC));
        assert_eq!(
            policy.backoff_hint(&ProviderError::UnsupportedRPC),
            Some(DEFAULT_BACKOFF)
        );
    }
}
