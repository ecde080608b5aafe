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

//! Driver for the temperature controller's own channel/heater REST API

use crate::clock::{self, ControllerClock};
use crate::config::LegacyConfig;
use crate::errors::{BlueforsError, BlueforsResult};
use crate::transport::DeviceHttp;
use crate::types::{
    ChannelInfo, ChannelUpdate, DataList, HeaterInfo, HeaterPower, HeaterQuery, HeaterUpdate,
    HistoricalDataRequest, HistoricalDataResponse, SystemInfo, TemperatureSample,
};
use crate::units::{Switch, microwatts_to_watts, watts_to_microwatts};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::{debug, error, info, warn};

/// Temperature controller client.
///
/// Keeps the active channels, the heaters, the channel cycle time and the
/// clock offset to the controller. The lists are refreshed after every
/// command that changes them.
#[derive(Debug, Clone)]
pub struct TemperatureController {
    http: DeviceHttp,
    channels: BTreeMap<u32, ChannelInfo>,
    heaters: BTreeMap<u32, HeaterInfo>,
    cycle_time: f64,
    clock: ControllerClock,
}

impl TemperatureController {
    /// Connect and read the initial controller state
    pub async fn connect(config: &LegacyConfig) -> BlueforsResult<Self> {
        Self::connect_url(config.base_url()).await
    }

    pub async fn connect_url(base_url: impl Into<String>) -> BlueforsResult<Self> {
        let mut controller = Self {
            http: DeviceHttp::new(base_url, false)?,
            channels: BTreeMap::new(),
            heaters: BTreeMap::new(),
            cycle_time: 0.0,
            clock: ControllerClock::default(),
        };

        controller.update_heaters().await?;
        controller.update_channels().await?;
        controller.sync_clock().await?;

        info!("Controller driver initialized.");
        Ok(controller)
    }

    pub fn channels(&self) -> &BTreeMap<u32, ChannelInfo> {
        &self.channels
    }

    pub fn heaters(&self) -> &BTreeMap<u32, HeaterInfo> {
        &self.heaters
    }

    /// Seconds for one scan over all active channels
    pub fn cycle_time(&self) -> f64 {
        self.cycle_time
    }

    pub fn clock(&self) -> ControllerClock {
        self.clock
    }

    pub async fn update_heaters(&mut self) -> BlueforsResult<()> {
        let url = self.http.endpoint(&["heaters"]);
        let list: DataList<HeaterInfo> = self.http.get_json(&url, &[]).await?;

        self.heaters = list
            .data
            .into_iter()
            .map(|heater| (heater.heater_nr, heater))
            .collect();
        debug!("Loaded {} heaters", self.heaters.len());
        Ok(())
    }

    /// Refresh the active channels and the cycle time derived from them
    pub async fn update_channels(&mut self) -> BlueforsResult<()> {
        let url = self.http.endpoint(&["channels"]);
        let list: DataList<ChannelInfo> = self.http.get_json(&url, &[]).await?;

        self.channels = list
            .data
            .into_iter()
            .filter(|channel| channel.active)
            .map(|channel| (channel.channel_nr, channel))
            .collect();
        self.cycle_time = cycle_time(self.channels.values());
        debug!(
            "Loaded {} active channels, cycle time {}s",
            self.channels.len(),
            self.cycle_time
        );
        Ok(())
    }

    /// Measure the offset between host and controller clocks
    pub async fn sync_clock(&mut self) -> BlueforsResult<()> {
        let url = self.http.endpoint(&["system"]);
        let info: SystemInfo = self.http.get_json(&url, &[]).await?;
        let controller_time = clock::parse_time(&info.datetime)?;
        info!("Current system time of controller: {}", controller_time);

        self.clock = ControllerClock::from_controller_time(controller_time, Utc::now());
        Ok(())
    }

    pub async fn toggle_channel(&mut self, channel_nr: u32, status: Switch) -> BlueforsResult<()> {
        let url = self.http.endpoint(&["channel", "update"]);
        let payload = ChannelUpdate {
            channel_nr,
            active: status.is_on(),
        };
        let _: Value = self.http.post_json(&url, &[], &payload).await?;

        let name = self
            .channels
            .get(&channel_nr)
            .map_or("unknown", |c| c.name.as_str());
        info!("Turned channel {} ({}) {}.", channel_nr, name, status);

        self.update_channels().await
    }

    /// Temperatures of a channel over the last `seconds`
    pub async fn channel_temps_in_time(
        &self,
        channel_nr: u32,
        seconds: f64,
    ) -> BlueforsResult<Vec<TemperatureSample>> {
        let url = self.http.endpoint(&["channel", "historical-data"]);
        let now = Utc::now();
        let payload = HistoricalDataRequest {
            start_time: self.clock.format_past(now, seconds)?,
            stop_time: self.clock.format(now),
            channel_nr,
            fields: vec!["temperature".to_owned(), "timestamp".to_owned()],
        };

        let response: HistoricalDataResponse = self.http.post_json(&url, &[], &payload).await?;
        let measurements = response.measurements;
        if measurements.temperature.len() != measurements.timestamp.len() {
            warn!(
                "Channel {}: {} temperatures but {} timestamps",
                channel_nr,
                measurements.temperature.len(),
                measurements.timestamp.len()
            );
        }

        measurements
            .temperature
            .into_iter()
            .zip(measurements.timestamp)
            .map(|(temperature, ts)| {
                let timestamp = clock::from_unix_seconds(ts).ok_or_else(|| {
                    BlueforsError::InvalidResponse(format!("Invalid measurement timestamp {ts}"))
                })?;
                Ok(TemperatureSample {
                    temperature,
                    timestamp,
                })
            })
            .collect()
    }

    /// Most recent temperature, looking back two measurement cycles
    pub async fn latest_channel_temp(&self, channel_nr: u32) -> BlueforsResult<TemperatureSample> {
        let window_secs = self.cycle_time * 2.0;
        let samples = self.channel_temps_in_time(channel_nr, window_secs).await?;

        samples.into_iter().last().ok_or_else(|| {
            error!(
                "No temperature for channel {} within the last {}s",
                channel_nr, window_secs
            );
            BlueforsError::NoMeasurements {
                channel: channel_nr,
                window_secs,
            }
        })
    }

    pub async fn toggle_heater(&mut self, heater_nr: u32, status: Switch) -> BlueforsResult<()> {
        let url = self.http.endpoint(&["heater", "update"]);
        let payload = HeaterUpdate {
            heater_nr,
            active: Some(status.is_on()),
            power: None,
        };
        let _: Value = self.http.post_json(&url, &[], &payload).await?;

        let name = self
            .heaters
            .get(&heater_nr)
            .map_or("unknown", |h| h.name.as_str());
        info!("Turned heater {} ({}) {}.", heater_nr, name, status);

        self.update_heaters().await
    }

    /// Set heater power in microwatts
    pub async fn set_heater_power(&mut self, heater_nr: u32, microwatts: f64) -> BlueforsResult<()> {
        let url = self.http.endpoint(&["heater", "update"]);
        let payload = HeaterUpdate {
            heater_nr,
            active: None,
            power: Some(microwatts_to_watts(microwatts)),
        };
        let _: Value = self.http.post_json(&url, &[], &payload).await?;
        info!("Set heater {} to {} uW.", heater_nr, microwatts);

        self.update_heaters().await
    }

    /// Heater power in microwatts
    pub async fn heater_power(&self, heater_nr: u32) -> BlueforsResult<f64> {
        let url = self.http.endpoint(&["heater"]);
        let answer: HeaterPower = self
            .http
            .post_json(&url, &[], &HeaterQuery { heater_nr })
            .await?;
        Ok(watts_to_microwatts(answer.power))
    }

    pub fn channel(&self, channel_nr: u32) -> BlueforsResult<&ChannelInfo> {
        self.channels
            .get(&channel_nr)
            .ok_or(BlueforsError::UnknownChannel(channel_nr))
    }

    pub fn heater(&self, heater_nr: u32) -> BlueforsResult<&HeaterInfo> {
        self.heaters
            .get(&heater_nr)
            .ok_or(BlueforsError::UnknownHeater(heater_nr))
    }

    /// Human-readable summary of heaters and active channels
    pub fn overview(&self) -> String {
        let mut out = String::from("\nHEATERS\n\n");
        for heater in self.heaters.values() {
            let _ = writeln!(out, "{:-^48}", heater.name);
            let _ = writeln!(out, "[Number]: {}", heater.heater_nr);
            let _ = writeln!(out, "[Power (uW)]: {}", watts_to_microwatts(heater.power));
            let _ = writeln!(out, "[Active]: {}", heater.active);
            let _ = writeln!(out, "[PID]: {}", heater.control_algorithm_settings);
        }

        out.push_str("\nTEMPERATURE CHANNELS\n\n");
        for channel in self.channels.values() {
            let _ = writeln!(out, "{:-^48}", channel.name);
            let _ = writeln!(out, "[Number]: {}", channel.channel_nr);
            let _ = writeln!(out, "[Active]: {}", channel.active);
            match self.coupled_heater(channel) {
                Some(heater) => {
                    let _ = writeln!(
                        out,
                        "[Coupled Heater]: {} (Number {})",
                        heater.name, heater.heater_nr
                    );
                }
                None => out.push_str("[Coupled Heater]: Not coupled\n"),
            }
        }
        out
    }

    fn coupled_heater(&self, channel: &ChannelInfo) -> Option<&HeaterInfo> {
        match channel.coupled_heater_nr {
            0 => None,
            nr => self.heaters.get(&nr),
        }
    }
}

fn cycle_time<'a>(channels: impl Iterator<Item = &'a ChannelInfo>) -> f64 {
    channels
        .filter(|c| c.active)
        .map(|c| c.meas_time + c.wait_time)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Mock, Server, ServerGuard};
    use serde_json::json;

    async fn mock_initial_state(server: &mut ServerGuard) -> Vec<Mock> {
        mock_state(server, 1, 1).await
    }

    /// Heater and channel lists expected `heater_fetches` / `channel_fetches` times
    async fn mock_state(
        server: &mut ServerGuard,
        heater_fetches: usize,
        channel_fetches: usize,
    ) -> Vec<Mock> {
        let heaters = server
            .mock("GET", "/heaters")
            .expect(heater_fetches)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"data": [
                    {"heater_nr": 1, "name": "Sample heater", "power": 0.0001, "active": true,
                     "control_algorithm_settings": {"proportional": 0.1, "integral": 10.0}},
                    {"heater_nr": 4, "name": "Still heater", "power": 0.0, "active": false,
                     "control_algorithm_settings": {}}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let channels = server
            .mock("GET", "/channels")
            .expect(channel_fetches)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"data": [
                    {"channel_nr": 1, "name": "50K", "active": true, "meas_time": 3.0,
                     "wait_time": 1.0, "coupled_heater_nr": 0},
                    {"channel_nr": 5, "name": "Still", "active": false, "meas_time": 3.0,
                     "wait_time": 1.0, "coupled_heater_nr": 4},
                    {"channel_nr": 6, "name": "MXC", "active": true, "meas_time": 5.0,
                     "wait_time": 2.0, "coupled_heater_nr": "1"}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let system = server
            .mock("GET", "/system")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"datetime": "2025-03-01T12:00:00.000000Z"}).to_string())
            .create_async()
            .await;

        vec![heaters, channels, system]
    }

    #[tokio::test]
    async fn test_connect_loads_state() {
        let mut server = Server::new_async().await;
        let mocks = mock_initial_state(&mut server).await;

        let controller = TemperatureController::connect_url(server.url())
            .await
            .unwrap();

        assert_eq!(controller.heaters().len(), 2);
        assert_eq!(controller.channels().keys().copied().collect::<Vec<_>>(), vec![1, 6]);
        assert!((controller.cycle_time() - 11.0).abs() < 1e-9);
        // Controller clock is far behind the host clock
        assert!(controller.clock().offset() > chrono::TimeDelta::zero());
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_overview_lists_coupled_heater() {
        let mut server = Server::new_async().await;
        let _mocks = mock_initial_state(&mut server).await;
        let controller = TemperatureController::connect_url(server.url())
            .await
            .unwrap();

        let overview = controller.overview();
        assert!(overview.contains(&format!("{:-^48}", "Sample heater")));
        assert!(overview.contains("[Power (uW)]: 0\n"));
        assert!(overview.contains("[Coupled Heater]: Sample heater (Number 1)"));
        assert!(overview.contains("[Coupled Heater]: Not coupled"));
        assert!(!overview.contains(&format!("{:-^48}", "Still")));
    }

    #[tokio::test]
    async fn test_toggle_channel_posts_and_refreshes() {
        let mut server = Server::new_async().await;
        let mocks = mock_state(&mut server, 1, 2).await;
        let mut controller = TemperatureController::connect_url(server.url())
            .await
            .unwrap();

        let update = server
            .mock("POST", "/channel/update")
            .match_body(Matcher::Json(json!({"channel_nr": 6, "active": false})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        controller.toggle_channel(6, Switch::Off).await.unwrap();
        update.assert_async().await;
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_set_heater_power_converts_to_watts() {
        let mut server = Server::new_async().await;
        let _mocks = mock_initial_state(&mut server).await;
        let mut controller = TemperatureController::connect_url(server.url())
            .await
            .unwrap();

        let update = server
            .mock("POST", "/heater/update")
            .match_body(Matcher::Json(json!({"heater_nr": 1, "power": 0.00025})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        controller.set_heater_power(1, 250.0).await.unwrap();
        update.assert_async().await;
    }

    #[tokio::test]
    async fn test_toggle_heater() {
        let mut server = Server::new_async().await;
        let mocks = mock_state(&mut server, 2, 1).await;
        let mut controller = TemperatureController::connect_url(server.url())
            .await
            .unwrap();

        let update = server
            .mock("POST", "/heater/update")
            .match_body(Matcher::Json(json!({"heater_nr": 4, "active": true})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        controller.toggle_heater(4, Switch::On).await.unwrap();
        update.assert_async().await;
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_heater_power_in_microwatts() {
        let mut server = Server::new_async().await;
        let _mocks = mock_initial_state(&mut server).await;
        let controller = TemperatureController::connect_url(server.url())
            .await
            .unwrap();

        let query = server
            .mock("POST", "/heater")
            .match_body(Matcher::Json(json!({"heater_nr": 1})))
            .with_status(200)
            .with_body(json!({"heater_nr": 1, "power": 0.00012}).to_string())
            .create_async()
            .await;

        let power = controller.heater_power(1).await.unwrap();
        assert!((power - 120.0).abs() < 1e-6);
        query.assert_async().await;
    }

    #[tokio::test]
    async fn test_latest_channel_temp_uses_last_sample() {
        let mut server = Server::new_async().await;
        let _mocks = mock_initial_state(&mut server).await;
        let controller = TemperatureController::connect_url(server.url())
            .await
            .unwrap();

        let history = server
            .mock("POST", "/channel/historical-data")
            .match_body(Matcher::PartialJson(json!({
                "channel_nr": 6,
                "fields": ["temperature", "timestamp"]
            })))
            .with_status(200)
            .with_body(
                json!({"measurements": {
                    "temperature": [0.0121, 0.0119],
                    "timestamp": [1740830400.0, 1740830411.0]
                }})
                .to_string(),
            )
            .create_async()
            .await;

        let sample = controller.latest_channel_temp(6).await.unwrap();
        assert!((sample.temperature - 0.0119).abs() < 1e-12);
        assert_eq!(sample.timestamp.timestamp(), 1740830411);
        history.assert_async().await;
    }

    #[tokio::test]
    async fn test_latest_channel_temp_empty_window() {
        let mut server = Server::new_async().await;
        let _mocks = mock_initial_state(&mut server).await;
        let controller = TemperatureController::connect_url(server.url())
            .await
            .unwrap();

        let _history = server
            .mock("POST", "/channel/historical-data")
            .with_status(200)
            .with_body(json!({"measurements": {"temperature": [], "timestamp": []}}).to_string())
            .create_async()
            .await;

        let result = controller.latest_channel_temp(1).await;
        assert!(matches!(
            result,
            Err(BlueforsError::NoMeasurements { channel: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_history_window_uses_controller_clock() {
        let mut server = Server::new_async().await;
        let _mocks = mock_initial_state(&mut server).await;
        let controller = TemperatureController::connect_url(server.url())
            .await
            .unwrap();

        // Controller reported 12:00:00 at connect, so the window ends just after
        // that on its clock and starts one hour earlier
        let history = server
            .mock("POST", "/channel/historical-data")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""start_time":"2025-03-01T11:00:0\d\.\d{6}Z""#.to_owned()),
                Matcher::Regex(r#""stop_time":"2025-03-01T12:00:0\d\.\d{6}Z""#.to_owned()),
                Matcher::PartialJson(json!({"channel_nr": 1})),
            ]))
            .with_status(200)
            .with_body(
                json!({"measurements": {"temperature": [45.2], "timestamp": [1740826800.0]}})
                    .to_string(),
            )
            .create_async()
            .await;

        let samples = controller.channel_temps_in_time(1, 3600.0).await.unwrap();
        assert_eq!(samples.len(), 1);
        history.assert_async().await;
    }

    #[tokio::test]
    async fn test_history_rejects_unusable_window() {
        let mut server = Server::new_async().await;
        let _mocks = mock_initial_state(&mut server).await;
        let controller = TemperatureController::connect_url(server.url())
            .await
            .unwrap();

        let history = server
            .mock("POST", "/channel/historical-data")
            .expect(0)
            .create_async()
            .await;

        for secs in [1e13, f64::INFINITY] {
            assert!(matches!(
                controller.channel_temps_in_time(1, secs).await,
                Err(BlueforsError::InvalidWindow(_))
            ));
        }
        history.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_lookups() {
        let mut server = Server::new_async().await;
        let _mocks = mock_initial_state(&mut server).await;
        let controller = TemperatureController::connect_url(server.url())
            .await
            .unwrap();

        assert!(controller.channel(6).is_ok());
        assert!(matches!(
            controller.channel(5),
            Err(BlueforsError::UnknownChannel(5))
        ));
        assert!(matches!(
            controller.heater(9),
            Err(BlueforsError::UnknownHeater(9))
        ));
    }

    #[test]
    fn test_cycle_time_sums_active_channels() {
        let channels = [
            ChannelInfo {
                channel_nr: 1,
                name: "A".to_owned(),
                active: true,
                meas_time: 2.5,
                wait_time: 0.5,
                coupled_heater_nr: 0,
            },
            ChannelInfo {
                channel_nr: 2,
                name: "B".to_owned(),
                active: false,
                meas_time: 10.0,
                wait_time: 10.0,
                coupled_heater_nr: 0,
            },
        ];
        assert!((cycle_time(channels.iter()) - 3.0).abs() < 1e-9);
    }
}
