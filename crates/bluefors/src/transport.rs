// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of BlueFTC.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Request/response mapping shared by both controller drivers

use crate::errors::{BlueforsError, BlueforsResult, DeviceError};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, trace};

/// Thin JSON-over-HTTP client bound to one controller base URL
#[derive(Debug, Clone)]
pub struct DeviceHttp {
    base_url: String,
    client: Client,
}

impl DeviceHttp {
    pub fn new(base_url: impl Into<String>, accept_invalid_certs: bool) -> BlueforsResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| BlueforsError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `base/seg1/seg2/...`
    pub fn endpoint(&self, segments: &[&str]) -> String {
        format!("{}/{}", self.base_url, segments.join("/"))
    }

    /// GET `url` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> BlueforsResult<T> {
        debug!("GET: {}", url);
        send(self.client.get(url).query(query)).await
    }

    /// POST a JSON `body` to `url` and decode the JSON reply
    pub async fn post_json<B, T>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> BlueforsResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(
            "POST: {} - Body: {}",
            url,
            serde_json::to_string(body).unwrap_or_default()
        );
        // .json() also sets Content-Type: application/json
        send(self.client.post(url).query(query).json(body)).await
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> BlueforsResult<T> {
    let response = check_status(request.send().await?).await?;

    let bytes = response.bytes().await?;
    trace!("   Response: {}", String::from_utf8_lossy(&bytes));

    // Empty bodies decode as null (setters that only acknowledge)
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

async fn check_status(response: Response) -> BlueforsResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    error!("Controller returned status {}: {}", status, message);

    if let Ok(body) = serde_json::from_str::<Value>(&message)
        && let Some(device_error) = DeviceError::from_response(&body)
    {
        return Err(BlueforsError::DeviceError(device_error));
    }

    Err(BlueforsError::ApiError {
        status: status.as_u16(),
        message,
    })
}
