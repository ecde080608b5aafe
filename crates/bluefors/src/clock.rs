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

//! Clock offset between this host and the temperature controller

use crate::errors::{BlueforsError, BlueforsResult};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

const PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
const WRITE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Host time minus controller time. Subtracting it from a host timestamp
/// yields the matching controller timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerClock {
    offset: TimeDelta,
}

impl ControllerClock {
    pub fn new(offset: TimeDelta) -> Self {
        Self { offset }
    }

    /// Offset from a controller timestamp observed at host time `now`
    pub fn from_controller_time(controller_time: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::new(now - controller_time)
    }

    pub fn offset(&self) -> TimeDelta {
        self.offset
    }

    pub fn to_controller(&self, host_time: DateTime<Utc>) -> DateTime<Utc> {
        host_time - self.offset
    }

    /// Controller-formatted timestamp for a host time
    pub fn format(&self, host_time: DateTime<Utc>) -> String {
        format_time(self.to_controller(host_time))
    }

    /// Controller-formatted timestamp `seconds_ago` before `now`
    pub fn format_past(&self, now: DateTime<Utc>, seconds_ago: f64) -> BlueforsResult<String> {
        let start = now
            .checked_sub_signed(window(seconds_ago)?)
            .ok_or(BlueforsError::InvalidWindow(seconds_ago))?;
        Ok(self.format(start))
    }
}

pub fn parse_time(s: &str) -> BlueforsResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, PARSE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| BlueforsError::InvalidResponse(format!("Invalid controller datetime '{s}': {e}")))
}

pub fn format_time(time: DateTime<Utc>) -> String {
    time.format(WRITE_FORMAT).to_string()
}

/// Unix timestamp (fractional seconds) as UTC time
pub fn from_unix_seconds(ts: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros((ts * 1e6).round() as i64)
}

/// Saturates at the largest representable span; the caller's date arithmetic
/// then reports the overflow.
fn window(secs: f64) -> BlueforsResult<TimeDelta> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(BlueforsError::InvalidWindow(secs));
    }
    Ok(TimeDelta::microseconds((secs * 1e6).round() as i64))
}
