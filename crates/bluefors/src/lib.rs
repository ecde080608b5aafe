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

//! Client drivers for the Bluefors temperature controller.
//!
//! [`TemperatureController`] talks to the controller's channel/heater REST
//! API, [`MapperController`] to the values API of the Bluefors control
//! software.

pub mod clock;
pub mod config;
pub mod errors;
pub mod legacy;
pub mod mapper;
pub mod transport;
pub mod types;
pub mod units;

pub use clock::ControllerClock;
pub use config::{BlueforsConfig, LegacyConfig, LoggingConfig, MapperConfig};
pub use errors::{BlueforsError, BlueforsResult, DeviceError};
pub use legacy::TemperatureController;
pub use mapper::MapperController;
pub use types::{ChannelInfo, HeaterInfo, MappedValue, SyncStatus, TemperatureSample};
pub use units::Switch;
