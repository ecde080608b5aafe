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

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Bluefors controller error types
#[derive(Error, Debug)]
pub enum BlueforsError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Controller returned error status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("{0}")]
    DeviceError(DeviceError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("No key provided for value request")]
    MissingKey,

    #[error("Switch status must be 'on' or 'off', got '{0}'")]
    InvalidSwitch(String),

    #[error("Power should be in the range of 0 to 1000 microwatts, got {0}")]
    PowerOutOfRange(f64),

    #[error("Mixing chamber channel ID not configured")]
    MixingChamberNotConfigured,

    #[error("Unknown channel: {0}")]
    UnknownChannel(u32),

    #[error("Unknown heater: {0}")]
    UnknownHeater(u32),

    #[error("No measurements for channel {channel} in the last {window_secs}s")]
    NoMeasurements { channel: u32, window_secs: f64 },

    #[error("Time window must be a finite, non-negative number of seconds, got {0}")]
    InvalidWindow(f64),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type BlueforsResult<T> = Result<T, BlueforsError>;

/// Error object reported by the mapper values API.
///
/// The controller wraps failures in an `error` object which either carries a
/// `details` array of sub-errors or describes a single error itself.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceError {
    pub name: String,
    pub description: String,
    pub errors: Vec<String>,
    pub query: Value,
    pub query_data: Value,
    pub data: Value,
}

impl DeviceError {
    /// Build from a full response body. Returns `None` if the body has no `error` object.
    pub fn from_response(body: &Value) -> Option<Self> {
        let error = body.get("error")?.as_object()?;

        let entries: Vec<&Value> = match error.get("details").and_then(Value::as_array) {
            Some(details) => details.iter().collect(),
            None => vec![body.get("error")?],
        };

        let errors = entries
            .iter()
            .map(|entry| {
                format!(
                    "Code: {}, Reason: {}",
                    display_field(entry.get("code")),
                    display_field(entry.get("name"))
                )
            })
            .collect();

        Some(Self {
            name: display_field(error.get("name")),
            description: display_field(error.get("description")),
            errors,
            query: error.get("query").cloned().unwrap_or(Value::Null),
            query_data: error.get("query_data").cloned().unwrap_or(Value::Null),
            data: error.get("data").cloned().unwrap_or(Value::Null),
        })
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}, due to the following errors{}",
            self.name,
            self.description,
            self.errors.concat()
        )
    }
}

fn display_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
