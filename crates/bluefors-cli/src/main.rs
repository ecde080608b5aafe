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

mod logging;

use anyhow::{Context, Result};
use bluefors::{BlueforsConfig, MapperController, Switch, TemperatureController};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "bluefors")]
#[command(about = "Read temperatures and control heaters of a Bluefors temperature controller", long_about = None)]
struct Cli {
    /// Configuration file (TOML or JSON). Defaults to bluefors.toml / bluefors.json
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, global = true)]
    debug: bool,

    /// Also append log output to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Temperature controller channel/heater API
    Legacy {
        #[command(subcommand)]
        action: LegacyCommand,
    },
    /// Control software values API
    Mapper {
        #[command(subcommand)]
        action: MapperCommand,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand, Debug)]
enum LegacyCommand {
    /// List heaters and active channels
    Overview,
    /// Latest temperature of a channel
    Temp { channel: u32 },
    /// Temperatures of a channel over the last SECONDS
    History { channel: u32, seconds: f64 },
    /// Turn a channel on or off
    Channel { channel: u32, status: Switch },
    /// Turn a heater on or off
    Heater { heater: u32, status: Switch },
    /// Read heater power, or set it when MICROWATTS is given
    Power { heater: u32, microwatts: Option<f64> },
}

#[derive(Subcommand, Debug)]
enum MapperCommand {
    /// Read temperature and resistance of channels, then the MXC heater state
    Read {
        #[arg(long, value_delimiter = ',', default_values_t = [1, 2, 5, 6, 8])]
        channels: Vec<u32>,
    },
    /// Mixing chamber heater
    Heater {
        #[command(subcommand)]
        action: HeaterCommand,
    },
}

#[derive(Subcommand, Debug)]
enum HeaterCommand {
    Status,
    On,
    Off,
    /// Read power, or set it in microwatts (0-1000)
    Power { microwatts: Option<f64> },
    /// Read setpoint (K), or set it in millikelvin
    Setpoint { millikelvin: Option<f64> },
    /// Read PID mode, or switch it on/off
    Mode { status: Option<Switch> },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let startup_level = if cli.debug { "debug" } else { "info" };
    let startup = logging::bootstrap(logging::env_filter(startup_level)?, std::io::stderr);
    let config = load_config(cli.config.as_deref(), startup)?;

    let level = if cli.debug {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let log_file = cli.log_file.as_deref().or(config.logging.file.as_deref());
    logging::init(level, log_file)?;
    debug!("Configuration: {:?}", config);

    // Reported through tracing only
    if let Err(e) = run(&config, cli.command).await {
        error!("{e:#}");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Load configuration with `subscriber` catching what loading reports
fn load_config<S>(path: Option<&Path>, subscriber: S) -> Result<BlueforsConfig>
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    let config = tracing::subscriber::with_default(subscriber, || BlueforsConfig::load(path))?;
    Ok(config)
}

async fn run(config: &BlueforsConfig, command: Command) -> Result<()> {
    match command {
        Command::Legacy { action } => run_legacy(config, action).await,
        Command::Mapper { action } => run_mapper(config, action).await,
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn run_legacy(config: &BlueforsConfig, action: LegacyCommand) -> Result<()> {
    let legacy = config
        .legacy
        .as_ref()
        .context("No [legacy] section in configuration (or BLUEFORS_LEGACY_IP)")?;
    let mut controller = TemperatureController::connect(legacy).await?;

    match action {
        LegacyCommand::Overview => print!("{}", controller.overview()),
        LegacyCommand::Temp { channel } => {
            let sample = controller.latest_channel_temp(channel).await?;
            println!("{} K at {}", sample.temperature, sample.timestamp);
        }
        LegacyCommand::History { channel, seconds } => {
            let samples = controller.channel_temps_in_time(channel, seconds).await?;
            info!("{} samples for channel {}", samples.len(), channel);
            for sample in samples {
                println!("{}\t{}", sample.timestamp.to_rfc3339(), sample.temperature);
            }
        }
        LegacyCommand::Channel { channel, status } => {
            controller.toggle_channel(channel, status).await?;
        }
        LegacyCommand::Heater { heater, status } => {
            controller.toggle_heater(heater, status).await?;
        }
        LegacyCommand::Power { heater, microwatts } => {
            if let Some(microwatts) = microwatts {
                controller.set_heater_power(heater, microwatts).await?;
            }
            println!("Heater {heater} power: {} uW", controller.heater_power(heater).await?);
        }
    }
    Ok(())
}

async fn run_mapper(config: &BlueforsConfig, action: MapperCommand) -> Result<()> {
    let mapper = config
        .mapper
        .as_ref()
        .context("No [mapper] section in configuration (or BLUEFORS_IP)")?;
    let controller = MapperController::new(mapper)?;

    match action {
        MapperCommand::Read { channels } => {
            for channel in channels {
                println!(
                    "Channel {channel} temp: {} Kelvin",
                    controller.channel_temperature(channel).await?
                );
                println!(
                    "Channel {channel} resistance: {} Ohm",
                    controller.channel_resistance(channel).await?
                );
            }
            print_heater_state(&controller).await?;
        }
        MapperCommand::Heater { action } => run_heater(&controller, action).await?,
    }
    Ok(())
}

async fn run_heater(controller: &MapperController, action: HeaterCommand) -> Result<()> {
    let synced = match action {
        HeaterCommand::Status => return print_heater_state(controller).await,
        HeaterCommand::On => controller.toggle_mxc_heater(Switch::On).await?,
        HeaterCommand::Off => controller.toggle_mxc_heater(Switch::Off).await?,
        HeaterCommand::Power { microwatts: None } => {
            println!("MXC heater power: {} uW", controller.mxc_heater_power().await?);
            return Ok(());
        }
        HeaterCommand::Power {
            microwatts: Some(microwatts),
        } => controller.set_mxc_heater_power(microwatts).await?,
        HeaterCommand::Setpoint { millikelvin: None } => {
            println!("MXC heater setpoint: {} K", controller.mxc_heater_setpoint().await?);
            return Ok(());
        }
        HeaterCommand::Setpoint {
            millikelvin: Some(millikelvin),
        } => controller.set_mxc_heater_setpoint(millikelvin).await?,
        HeaterCommand::Mode { status: None } => {
            println!("MXC heater PID: {}", controller.mxc_heater_mode().await?);
            return Ok(());
        }
        HeaterCommand::Mode {
            status: Some(status),
        } => controller.set_mxc_heater_mode(status.is_on()).await?,
    };

    println!("Synchronized: {synced}");
    if !synced {
        anyhow::bail!("value was applied but the controller did not report SYNCHRONIZED");
    }
    Ok(())
}

async fn print_heater_state(controller: &MapperController) -> Result<()> {
    println!("MXC heater status: {}", controller.mxc_heater_status().await?);
    println!("MXC heater power: {} uW", controller.mxc_heater_power().await?);
    println!("MXC heater PID: {}", controller.mxc_heater_mode().await?);
    println!("MXC heater setpoint: {} K", controller.mxc_heater_setpoint().await?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::EnvFilter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn test_config_loading_is_logged() {
        let file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        std::fs::write(file.path(), "[legacy]\nip = \"192.168.1.20\"\n").unwrap();

        let captured = Captured::default();
        let writer = {
            let captured = captured.clone();
            move || captured.clone()
        };

        let config = load_config(
            Some(file.path()),
            logging::bootstrap(EnvFilter::new("info"), writer),
        )
        .unwrap();

        assert!(config.legacy.is_some());
        assert!(captured.text().contains("Loaded configuration from"));
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_mapper_read_defaults() {
        let cli = Cli::try_parse_from(["bluefors", "mapper", "read"]).unwrap();
        match cli.command {
            Command::Mapper {
                action: MapperCommand::Read { channels },
            } => assert_eq!(channels, vec![1, 2, 5, 6, 8]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_channel_list_and_globals() {
        let cli = Cli::try_parse_from([
            "bluefors",
            "mapper",
            "read",
            "--channels",
            "6,8",
            "--debug",
            "--config",
            "lab.toml",
        ])
        .unwrap();

        assert!(cli.debug);
        assert_eq!(cli.config, Some(PathBuf::from("lab.toml")));
        assert!(matches!(
            cli.command,
            Command::Mapper { action: MapperCommand::Read { channels } } if channels == vec![6, 8]
        ));
    }

    #[test]
    fn test_parse_switch_arguments() {
        let cli = Cli::try_parse_from(["bluefors", "legacy", "heater", "2", "ON"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Legacy {
                action: LegacyCommand::Heater {
                    heater: 2,
                    status: Switch::On
                }
            }
        ));

        assert!(Cli::try_parse_from(["bluefors", "legacy", "channel", "1", "maybe"]).is_err());
    }

    #[test]
    fn test_parse_heater_setpoint() {
        let cli =
            Cli::try_parse_from(["bluefors", "mapper", "heater", "setpoint", "20"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Mapper {
                action: MapperCommand::Heater {
                    action: HeaterCommand::Setpoint {
                        millikelvin: Some(v)
                    }
                }
            } if (v - 20.0).abs() < f64::EPSILON
        ));
    }
}
