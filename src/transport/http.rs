// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! reqwest adapter for [`ClientsApi`].
//!
//! Reads are idempotent and go through [`retry_if`], which retries
//! connection failures and 5xx statuses only; the correction POST is sent
//! once.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{
    ByCityResponse, ChangeSet, ChangesResponse, CorrectedClient, ForMapResponse,
    HierarchicalSnapshot, LastUpdateResponse, MapListing, UpdateClientRequest,
    UpdateClientResponse,
};
use super::{ClientsApi, TransportError};
use crate::config::SyncConfig;
use crate::record::Location;
use crate::resilience::retry::{retry_if, RetryConfig};
use crate::watermark::Watermark;

const BY_CITY: &str = "/clients/by-city";
const BY_CITY_CHANGES: &str = "/clients/by-city-changes";
const FOR_MAP: &str = "/clients/for-map";
const LAST_UPDATE: &str = "/clients/last-update";
const UPDATE_SINGLE_CLIENT: &str = "/clients/update-single-client";

/// HTTP client for the clients server.
pub struct HttpClientsApi {
    http: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl HttpClientsApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| network("client_init", &e))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http,
            base_url,
            retry: RetryConfig::query(),
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, TransportError> {
        Ok(Self::new(config.base_url.clone(), config.request_timeout())?.with_retry(config.retry()))
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        query: &[(&str, String)],
    ) -> Result<T, TransportError> {
        let url = self.url(endpoint);
        let url = url.as_str();
        debug!(endpoint, "GET");

        retry_if(
            endpoint,
            &self.retry,
            || async move {
                let response = self
                    .http
                    .get(url)
                    .query(query)
                    .send()
                    .await
                    .map_err(|e| network(endpoint, &e))?;
                decode(endpoint, response).await
            },
            TransportError::is_retryable,
        )
        .await
    }
}

fn filter_query(frequent_only: bool) -> Vec<(&'static str, String)> {
    if frequent_only {
        vec![("frequentOnly", "true".to_string())]
    } else {
        Vec::new()
    }
}

fn network(endpoint: &str, err: &reqwest::Error) -> TransportError {
    TransportError::Network {
        endpoint: endpoint.to_string(),
        reason: err.to_string(),
    }
}

fn ensure_success(endpoint: &str, success: bool, message: Option<String>) -> Result<(), TransportError> {
    if success {
        return Ok(());
    }
    let message = message.unwrap_or_else(|| "no message".to_string());
    warn!(endpoint, message = %message, "Server reported failure");
    Err(TransportError::Unsuccessful {
        endpoint: endpoint.to_string(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<T, TransportError> {
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await.map_err(|e| network(endpoint, &e))?;
    serde_json::from_slice(&body).map_err(|e| TransportError::Decode {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl ClientsApi for HttpClientsApi {
    async fn by_city(&self, frequent_only: bool) -> Result<HierarchicalSnapshot, TransportError> {
        let response: ByCityResponse = self.get_json(BY_CITY, &filter_query(frequent_only)).await?;
        ensure_success(BY_CITY, response.success, response.message)?;
        debug!(total = response.total_clients, "Fetched by-city listing");
        Ok(response.data)
    }

    async fn changes_since(&self, since: &Watermark) -> Result<ChangeSet, TransportError> {
        let query = [("since", since.as_str().to_string())];
        let response: ChangesResponse = self.get_json(BY_CITY_CHANGES, &query).await?;
        ensure_success(BY_CITY_CHANGES, response.success, response.message.clone())?;
        Ok(ChangeSet::from(response))
    }

    async fn for_map(&self, frequent_only: bool) -> Result<MapListing, TransportError> {
        let response: ForMapResponse = self.get_json(FOR_MAP, &filter_query(frequent_only)).await?;
        ensure_success(FOR_MAP, response.success, response.message.clone())?;
        Ok(MapListing::from(response))
    }

    async fn last_update(&self) -> Result<Option<Watermark>, TransportError> {
        let response: LastUpdateResponse = self.get_json(LAST_UPDATE, &[]).await?;
        ensure_success(LAST_UPDATE, response.success, response.message)?;
        Ok(response.last_update.and_then(Watermark::from_server))
    }

    async fn update_single_client(
        &self,
        id: &str,
        new_address: &str,
    ) -> Result<CorrectedClient, TransportError> {
        let request = UpdateClientRequest {
            client_id: id,
            new_address,
        };
        debug!(endpoint = UPDATE_SINGLE_CLIENT, id, "POST");

        let response = self
            .http
            .post(self.url(UPDATE_SINGLE_CLIENT))
            .json(&request)
            .send()
            .await
            .map_err(|e| network(UPDATE_SINGLE_CLIENT, &e))?;
        let response: UpdateClientResponse = decode(UPDATE_SINGLE_CLIENT, response).await?;
        ensure_success(UPDATE_SINGLE_CLIENT, response.success, response.message)?;

        let client = response.client.ok_or_else(|| TransportError::Decode {
            endpoint: UPDATE_SINGLE_CLIENT.to_string(),
            reason: "missing client".to_string(),
        })?;
        let location = response.location.unwrap_or_else(|| Location {
            sector: client.sector.clone(),
            city: Some(client.city.clone()),
            district: client.district.clone(),
        });

        Ok(CorrectedClient { client, location })
    }
}
