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

//! Unit conversions and on/off values used by the controller APIs

use crate::errors::BlueforsError;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

const MICRO: f64 = 1e6;
const MILLI: f64 = 1e3;

/// Highest heater power (µW) the mapper driver accepts
pub const MAX_HEATER_POWER_UW: f64 = 1000.0;

pub fn watts_to_microwatts(watts: f64) -> f64 {
    watts * MICRO
}

pub fn microwatts_to_watts(microwatts: f64) -> f64 {
    microwatts / MICRO
}

pub fn kelvin_to_millikelvin(kelvin: f64) -> f64 {
    kelvin * MILLI
}

pub fn millikelvin_to_kelvin(millikelvin: f64) -> f64 {
    millikelvin / MILLI
}

/// Heater power sanity check for the mapper driver (inclusive range)
pub fn check_heater_power(microwatts: f64) -> Result<f64, BlueforsError> {
    if (0.0..=MAX_HEATER_POWER_UW).contains(&microwatts) {
        Ok(microwatts)
    } else {
        Err(BlueforsError::PowerOutOfRange(microwatts))
    }
}

/// On/off switch for channels and heaters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }

    /// String flag used by the mapper API
    pub fn as_flag(self) -> &'static str {
        flag(self.is_on())
    }
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

impl FromStr for Switch {
    type Err = BlueforsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            _ => Err(BlueforsError::InvalidSwitch(s.to_owned())),
        }
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_on() { "on" } else { "off" })
    }
}

/// "1" / "0" flag as stored by the mapper
pub fn flag(on: bool) -> &'static str {
    if on { "1" } else { "0" }
}

/// Interpret a mapper flag. Strings "1"/"0", integers and booleans are accepted.
pub fn flag_from_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "1" => Some(true),
            "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Numeric value that may arrive as a JSON number or a numeric string
pub fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }
}
