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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Legacy channel/heater API
// ---------------------------------------------------------------------------

/// `{"data": [...]}` wrapper used by the list endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataList<T> {
    pub data: Vec<T>,
}

/// Temperature channel as reported by `GET /channels`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel_nr: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
    /// Measurement time (seconds)
    #[serde(default)]
    pub meas_time: f64,
    /// Wait time before measuring (seconds)
    #[serde(default)]
    pub wait_time: f64,
    /// 0 when the channel is not coupled to a heater
    #[serde(default, deserialize_with = "lenient_u32")]
    pub coupled_heater_nr: u32,
}

/// Heater as reported by `GET /heaters`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaterInfo {
    pub heater_nr: u32,
    #[serde(default)]
    pub name: String,
    /// Heater power (watts)
    #[serde(default)]
    pub power: f64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub control_algorithm_settings: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub datetime: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelUpdate {
    pub channel_nr: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeaterUpdate {
    pub heater_nr: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    /// Watts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaterQuery {
    pub heater_nr: u32,
}

/// Response of `POST /heater`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaterPower {
    /// Watts
    pub power: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalDataRequest {
    pub start_time: String,
    pub stop_time: String,
    pub channel_nr: u32,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalDataResponse {
    pub measurements: Measurements,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Measurements {
    #[serde(default)]
    pub temperature: Vec<f64>,
    /// Unix timestamps (seconds)
    #[serde(default)]
    pub timestamp: Vec<f64>,
}

/// Temperature reading with its measurement time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureSample {
    /// Kelvin
    pub temperature: f64,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Mapper values API
// ---------------------------------------------------------------------------

pub const SYNCHRONIZED: &str = "SYNCHRONIZED";

/// `content.latest_valid_value` of a mapper value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestValue {
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub status: String,
}

/// Whether the mapper's stored value matches the temperature controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Synchronized,
    Other(String),
}

impl SyncStatus {
    pub fn is_synchronized(&self) -> bool {
        matches!(self, Self::Synchronized)
    }
}

impl From<&str> for SyncStatus {
    fn from(status: &str) -> Self {
        if status == SYNCHRONIZED {
            Self::Synchronized
        } else {
            Self::Other(status.to_owned())
        }
    }
}

/// Value read from the mapper together with its sync status
#[derive(Debug, Clone, PartialEq)]
pub struct MappedValue {
    pub value: Value,
    pub status: SyncStatus,
}

impl From<LatestValue> for MappedValue {
    fn from(latest: LatestValue) -> Self {
        Self {
            status: SyncStatus::from(latest.status.as_str()),
            value: latest.value,
        }
    }
}

/// Body of a `POST /values/` request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValuesWrite {
    pub data: BTreeMap<String, WriteEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WriteEntry {
    pub content: WriteContent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum WriteContent {
    Value { value: Value },
    Call { call: u8 },
}

impl ValuesWrite {
    /// Store `value` under `<device>.<target>`
    pub fn value(device: &str, target: &str, value: Value) -> Self {
        Self::single(format!("{device}.{target}"), WriteContent::Value { value })
    }

    /// Call the `<device>.write` setter, pushing stored values to the device
    pub fn apply(device: &str) -> Self {
        Self::single(format!("{device}.write"), WriteContent::Call { call: 1 })
    }

    fn single(key: String, content: WriteContent) -> Self {
        let mut data = BTreeMap::new();
        data.insert(key, WriteEntry { content });
        Self { data }
    }
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
        Null,
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n)
            if n >= 0.0 && n.fract().abs() < f64::EPSILON && n <= f64::from(u32::MAX) =>
        {
            Ok(n as u32)
        }
        NumberOrString::Text(s) if s.trim().is_empty() => Ok(0),
        NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        NumberOrString::Null => Ok(0),
        NumberOrString::Number(n) => Err(serde::de::Error::custom(format!(
            "invalid heater number: {n}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_info_coupled_heater_as_string() {
        let channel: ChannelInfo = serde_json::from_value(json!({
            "channel_nr": 6,
            "name": "MXC",
            "active": true,
            "meas_time": 3.0,
            "wait_time": 1.5,
            "coupled_heater_nr": "4",
            "excitation_mode": 0
        }))
        .unwrap();

        assert_eq!(channel.coupled_heater_nr, 4);
        assert!(channel.active);
    }

    #[test]
    fn test_channel_info_missing_coupled_heater() {
        let channel: ChannelInfo =
            serde_json::from_value(json!({"channel_nr": 1, "active": false})).unwrap();
        assert_eq!(channel.coupled_heater_nr, 0);
    }

    #[test]
    fn test_channel_info_rejects_non_integer_heater() {
        for nr in [json!(1.5), json!(5e9), json!(-2)] {
            let result = serde_json::from_value::<ChannelInfo>(json!({
                "channel_nr": 1,
                "active": true,
                "coupled_heater_nr": nr
            }));
            assert!(result.is_err(), "coupled_heater_nr {nr} accepted");
        }

        let channel: ChannelInfo = serde_json::from_value(json!({
            "channel_nr": 1,
            "active": true,
            "coupled_heater_nr": 3.0
        }))
        .unwrap();
        assert_eq!(channel.coupled_heater_nr, 3);
    }

    #[test]
    fn test_values_write_bodies() {
        let body = ValuesWrite::value(
            "mapper.heater_mappings_bftc.device.sample",
            "power",
            json!(1e-4),
        );
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"data": {"mapper.heater_mappings_bftc.device.sample.power": {"content": {"value": 1e-4}}}})
        );

        let apply = ValuesWrite::apply("mapper.heater_mappings_bftc.device.sample");
        assert_eq!(
            serde_json::to_value(&apply).unwrap(),
            json!({"data": {"mapper.heater_mappings_bftc.device.sample.write": {"content": {"call": 1}}}})
        );
    }

    #[test]
    fn test_heater_update_skips_unset_fields() {
        let update = HeaterUpdate {
            heater_nr: 2,
            active: Some(true),
            power: None,
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"heater_nr": 2, "active": true})
        );
    }

    #[test]
    fn test_sync_status() {
        assert!(SyncStatus::from("SYNCHRONIZED").is_synchronized());
        assert_eq!(
            SyncStatus::from("PENDING"),
            SyncStatus::Other("PENDING".to_owned())
        );
    }
}
