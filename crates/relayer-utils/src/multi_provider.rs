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

use core::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ethers::providers::{JsonRpcClient, ProviderError};
use serde::{de::DeserializeOwned, Serialize};

use crate::Error as RelayerError;

/// A JSON-RPC transport over every configured endpoint of one external chain.
///
/// Requests start at the next endpoint in round-robin order. When an
/// endpoint cannot be reached the request moves on to the following one, so
/// a call only fails with a transport error once every endpoint failed it.
/// Errors returned by a reachable node are passed through untouched.
#[derive(Debug, Clone)]
pub struct MultiProvider<P> {
    endpoints: Arc<Vec<P>>,
    cursor: Arc<AtomicUsize>,
}

impl<P> MultiProvider<P> {
    /// Creates a provider over the given endpoints.
    pub fn new(endpoints: Arc<Vec<P>>) -> Self {
        Self {
            endpoints,
            cursor: Default::default(),
        }
    }

    /// Number of configured endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether no endpoint is configured.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

fn is_unreachable(error: &ProviderError) -> bool {
    match error {
        ProviderError::HTTPError(_) => true,
        ProviderError::JsonRpcClientError(e) => {
            e.as_error_response().is_none() && e.as_serde_error().is_none()
        }
        _ => false,
    }
}

#[async_trait::async_trait]
impl<P: JsonRpcClient> JsonRpcClient for MultiProvider<P>
where
    P::Error: Into<ProviderError>,
{
    type Error = ProviderError;

    async fn request<
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    >(
        &self,
        method: &str,
        params: T,
    ) -> Result<R, Self::Error> {
        let count = self.endpoints.len();
        if count == 0 {
            return Err(ProviderError::CustomError(
                RelayerError::ProviderNotFound(0).to_string(),
            ));
        }
        // params are sent once per endpoint attempt.
        let params = serde_json::to_value(params)?;
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % count;
        let mut last_error = None;
        for idx in (0..count).map(|offset| (start + offset) % count) {
            let Some(endpoint) = self.endpoints.get(idx) else {
                continue;
            };
            match endpoint.request(method, &params).await.map_err(Into::into)
            {
                Ok(response) => return Ok(response),
                Err(e) if is_unreachable(&e) => {
                    tracing::debug!(
                        endpoint = idx,
                        method,
                        "Endpoint unreachable: {}",
                        e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            ProviderError::CustomError(
                RelayerError::ProviderNotFound(start).to_string(),
            )
        }))
    }
}
