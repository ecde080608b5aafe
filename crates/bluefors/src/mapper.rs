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

//! Driver for the values API of the Bluefors control software.
//!
//! Temperature controller settings are mirrored under
//! `mapper.heater_mappings_bftc.device.*`. Writes are a two step process: the
//! new value is stored first, then the device `write` setter pushes it to the
//! controller. The mapper reports `SYNCHRONIZED` once both sides agree.

use crate::config::MapperConfig;
use crate::errors::{BlueforsError, BlueforsResult, DeviceError};
use crate::transport::DeviceHttp;
use crate::types::{LatestValue, MappedValue, ValuesWrite};
use crate::units::{
    Switch, check_heater_power, flag, flag_from_value, microwatts_to_watts, millikelvin_to_kelvin,
    number_from_value, watts_to_microwatts,
};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

pub const DEVICE_PREFIX: &str = "mapper.heater_mappings_bftc.device";

/// Heater targets exposed by the mapper
pub mod target {
    pub const ACTIVE: &str = "active";
    pub const POWER: &str = "power";
    pub const SETPOINT: &str = "setpoint";
    pub const PID_MODE: &str = "pid_mode";
    pub const TEMPERATURE: &str = "temperature";
    pub const RESISTANCE: &str = "resistance";
}

/// Mapper device id of a temperature channel
pub fn channel_device(channel: u32) -> String {
    format!("{DEVICE_PREFIX}.c{channel}")
}

/// Mapper device id of a heater mapping
pub fn heater_device(heater_id: &str) -> String {
    format!("{DEVICE_PREFIX}.{heater_id}")
}

/// Read a value of `device.target` out of a values response.
///
/// Unsynchronized values are returned with a warning. A missing entry is
/// reported as the controller's error object when the body carries one.
pub fn extract_value(body: &Value, device: &str, target: &str) -> BlueforsResult<MappedValue> {
    let key = format!("{device}.{target}");

    let latest = body
        .get("data")
        .and_then(|data| data.get(&key))
        .and_then(|entry| entry.get("content"))
        .and_then(|content| content.get("latest_valid_value"));

    let Some(latest) = latest else {
        return Err(match DeviceError::from_response(body) {
            Some(device_error) => BlueforsError::DeviceError(device_error),
            None => BlueforsError::InvalidResponse(format!("No value for {key} in response")),
        });
    };

    let mapped = MappedValue::from(serde_json::from_value::<LatestValue>(latest.clone())?);
    if !mapped.status.is_synchronized() {
        warn!("The obtained value of {} is not synchronized: {:?}", key, mapped.status);
    }
    Ok(mapped)
}

/// Client for the key/value mapper API
#[derive(Debug, Clone)]
pub struct MapperController {
    http: DeviceHttp,
    key: Option<String>,
    mixing_chamber_channel_id: Option<u32>,
    heater_device: String,
}

impl MapperController {
    pub fn new(config: &MapperConfig) -> BlueforsResult<Self> {
        Self::with_base_url(config.base_url(), config)
    }

    /// Like [`MapperController::new`] but against an explicit base URL
    pub fn with_base_url(base_url: impl Into<String>, config: &MapperConfig) -> BlueforsResult<Self> {
        let http = DeviceHttp::new(base_url, config.accept_invalid_certs)?;
        info!(
            "Mapper client for {} (heater '{}', MXC channel {:?})",
            http.base_url(),
            config.heater_id,
            config.mixing_chamber_channel_id
        );

        Ok(Self {
            http,
            key: config.key.clone(),
            mixing_chamber_channel_id: config.mixing_chamber_channel_id,
            heater_device: heater_device(&config.heater_id),
        })
    }

    pub fn heater_device(&self) -> &str {
        &self.heater_device
    }

    pub fn mixing_chamber_channel(&self) -> BlueforsResult<u32> {
        self.mixing_chamber_channel_id
            .ok_or(BlueforsError::MixingChamberNotConfigured)
    }

    fn key(&self) -> BlueforsResult<&str> {
        self.key.as_deref().ok_or(BlueforsError::MissingKey)
    }

    /// GET the current values of `device.target`
    pub async fn value_request(&self, device: &str, target: &str) -> BlueforsResult<Value> {
        let key = self.key()?;
        let device_path = device.replace('.', "/");
        let url = self.http.endpoint(&["values", &device_path, target, ""]);

        self.http
            .get_json(&url, &[("prettyprint", "1"), ("key", key)])
            .await
    }

    /// Store a new value for `device.target` (not yet applied to the device)
    pub async fn set_value_request(
        &self,
        device: &str,
        target: &str,
        value: Value,
    ) -> BlueforsResult<Value> {
        let key = self.key()?;
        let url = self.http.endpoint(&["values", ""]);
        let body = ValuesWrite::value(device, target, value);

        let reply = self
            .http
            .post_json(&url, &[("prettyprint", "1"), ("key", key)], &body)
            .await?;
        check_write_reply(reply, device)
    }

    /// Push all stored values of `device` to the temperature controller
    pub async fn apply_values_request(&self, device: &str) -> BlueforsResult<()> {
        let key = self.key()?;
        let url = self.http.endpoint(&["values", ""]);
        let body = ValuesWrite::apply(device);

        let reply = self
            .http
            .post_json(&url, &[("prettyprint", "1"), ("key", key)], &body)
            .await?;
        check_write_reply(reply, device)?;
        Ok(())
    }

    async fn read(&self, device: &str, target: &str) -> BlueforsResult<MappedValue> {
        let body = self.value_request(device, target).await?;
        extract_value(&body, device, target)
    }

    // -- channels ----------------------------------------------------------

    pub async fn channel_data(&self, channel: u32, target: &str) -> BlueforsResult<Value> {
        info!("Requesting value: {} from channel {}", target, channel);
        let mapped = self.read(&channel_device(channel), target).await?;
        Ok(mapped.value)
    }

    /// Channel temperature in kelvin
    pub async fn channel_temperature(&self, channel: u32) -> BlueforsResult<f64> {
        let value = self.channel_data(channel, target::TEMPERATURE).await?;
        as_number(&value, target::TEMPERATURE)
    }

    /// Channel resistance in ohms
    pub async fn channel_resistance(&self, channel: u32) -> BlueforsResult<f64> {
        let value = self.channel_data(channel, target::RESISTANCE).await?;
        as_number(&value, target::RESISTANCE)
    }

    pub async fn mxc_temperature(&self) -> BlueforsResult<f64> {
        let channel = self.mixing_chamber_channel()?;
        self.channel_temperature(channel).await
    }

    pub async fn mxc_resistance(&self) -> BlueforsResult<f64> {
        let channel = self.mixing_chamber_channel()?;
        self.channel_resistance(channel).await
    }

    // -- mixing chamber heater --------------------------------------------

    pub async fn mxc_heater_value(&self, target: &str) -> BlueforsResult<Value> {
        self.mixing_chamber_channel()?;
        let mapped = self.read(&self.heater_device, target).await?;
        Ok(mapped.value)
    }

    /// Whether the heater's `target` is in sync with the temperature controller
    pub async fn heater_value_synced(&self, target: &str) -> BlueforsResult<bool> {
        let mapped = self.read(&self.heater_device, target).await?;
        Ok(mapped.status.is_synchronized())
    }

    /// Store, apply and verify a heater value. Returns the sync status after applying.
    pub async fn set_mxc_heater_value(&self, target: &str, value: Value) -> BlueforsResult<bool> {
        self.mixing_chamber_channel()?;

        info!("Mixing Chamber Heater: Setting {} to {}", target, value);
        self.set_value_request(&self.heater_device, target, value)
            .await?;

        info!("Mixing Chamber Heater: Applying settings");
        self.apply_values_request(&self.heater_device).await?;

        let synced = self.heater_value_synced(target).await?;
        if synced {
            info!("Mixing Chamber Heater: Settings applied and synced");
        } else {
            warn!("Mixing Chamber Heater: {} applied but not synchronized", target);
        }
        Ok(synced)
    }

    pub async fn mxc_heater_status(&self) -> BlueforsResult<bool> {
        let value = self.mxc_heater_value(target::ACTIVE).await?;
        as_flag(&value, target::ACTIVE)
    }

    pub async fn set_mxc_heater_status(&self, active: bool) -> BlueforsResult<bool> {
        self.set_mxc_heater_value(target::ACTIVE, json!(flag(active)))
            .await
    }

    pub async fn toggle_mxc_heater(&self, status: Switch) -> BlueforsResult<bool> {
        self.set_mxc_heater_status(status.is_on()).await
    }

    /// Heater power in microwatts
    pub async fn mxc_heater_power(&self) -> BlueforsResult<f64> {
        let value = self.mxc_heater_value(target::POWER).await?;
        Ok(watts_to_microwatts(as_number(&value, target::POWER)?))
    }

    /// Set heater power in microwatts (0 to 1000 µW)
    pub async fn set_mxc_heater_power(&self, microwatts: f64) -> BlueforsResult<bool> {
        self.mixing_chamber_channel()?;
        let microwatts = check_heater_power(microwatts)?;
        self.set_mxc_heater_value(target::POWER, json!(microwatts_to_watts(microwatts)))
            .await
    }

    /// Heater setpoint in kelvin
    pub async fn mxc_heater_setpoint(&self) -> BlueforsResult<f64> {
        let value = self.mxc_heater_value(target::SETPOINT).await?;
        as_number(&value, target::SETPOINT)
    }

    /// Set the heater setpoint, given in millikelvin
    pub async fn set_mxc_heater_setpoint(&self, millikelvin: f64) -> BlueforsResult<bool> {
        let kelvin = millikelvin_to_kelvin(millikelvin);
        debug!("Setpoint {} mK = {} K", millikelvin, kelvin);
        self.set_mxc_heater_value(target::SETPOINT, json!(kelvin))
            .await
    }

    /// Whether PID control is enabled
    pub async fn mxc_heater_mode(&self) -> BlueforsResult<bool> {
        let value = self.mxc_heater_value(target::PID_MODE).await?;
        as_flag(&value, target::PID_MODE)
    }

    pub async fn set_mxc_heater_mode(&self, pid: bool) -> BlueforsResult<bool> {
        self.set_mxc_heater_value(target::PID_MODE, json!(flag(pid)))
            .await
    }
}

/// A rejected write still answers 200, with an `error` object in the reply
fn check_write_reply(reply: Value, device: &str) -> BlueforsResult<Value> {
    match DeviceError::from_response(&reply) {
        Some(device_error) => {
            error!("Write to {} rejected: {}", device, device_error);
            Err(BlueforsError::DeviceError(device_error))
        }
        None => Ok(reply),
    }
}

fn as_number(value: &Value, target: &str) -> BlueforsResult<f64> {
    number_from_value(value)
        .ok_or_else(|| BlueforsError::InvalidResponse(format!("{target} is not numeric: {value}")))
}

fn as_flag(value: &Value, target: &str) -> BlueforsResult<bool> {
    flag_from_value(value)
        .ok_or_else(|| BlueforsError::InvalidResponse(format!("{target} is not a flag: {value}")))
}
