use ahash::HashMap;
use clap::{Parser, ValueEnum};
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::Debug;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

/// Macro to register an override handler for a specific config key
#[macro_export]
macro_rules! register_override {
    ($key:literal, $func:expr) => {
        inventory::submit! {
            $crate::simulation::config::OverrideHandler {
                key: $key,
                apply: $func,
            }
        }
    };
}

pub struct OverrideHandler {
    pub key: &'static str,
    pub apply: fn(config: &mut Config, value: &str) -> Result<(), ConfigError>,
}

// Collect all OverrideHandler submitted from anywhere in the crate
inventory::collect!(OverrideHandler);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to open config at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to write config to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value '{value}' for config key '{key}'")]
    InvalidValue { key: String, value: String },
    #[error("invalid KEY=VALUE: no `=` found in `{0}`")]
    MalformedOverride(String),
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineArgs {
    #[arg(long, short)]
    pub config: Option<String>,
    #[arg(long = "set", value_parser = parse_key_val)]
    pub overrides: Vec<(String, String)>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.find('=') {
        Some(pos) => Ok((s[..pos].to_string(), s[pos + 1..].to_string())),
        None => Err(ConfigError::MalformedOverride(s.to_string()).to_string()),
    }
}

/// Parses a single override value. Used by the registered override handlers.
pub fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// The configuration is a set of named modules. Modules which are not present in a config file
/// are replaced by their defaults when accessed.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    modules: HashMap<String, Box<dyn ConfigModule>>,
}

impl Config {
    pub fn from_file(config_path: &Path) -> Result<Config, ConfigError> {
        let file = File::open(config_path).map_err(|source| ConfigError::Io {
            path: config_path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_reader(BufReader::new(file)).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })
    }

    pub fn from_args(args: &CommandLineArgs) -> Result<Config, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Config::from_file(Path::new(path))?,
            None => Config::default(),
        };
        config.apply_overrides(&args.overrides)?;
        Ok(config)
    }

    pub fn write(&self, output_path: &Path) -> Result<(), ConfigError> {
        let file = File::create(output_path).map_err(|source| ConfigError::Io {
            path: output_path.to_path_buf(),
            source,
        })?;
        serde_yaml::to_writer(BufWriter::new(file), self).map_err(|source| ConfigError::Write {
            path: output_path.to_path_buf(),
            source,
        })
    }

    /// Apply generic key-value overrides to the config, e.g. simulation.end_time=3600
    pub fn apply_overrides(&mut self, overrides: &[(String, String)]) -> Result<(), ConfigError> {
        if !overrides.is_empty() {
            info!("Applying overrides: {:?}", overrides);
        }

        for (key, value) in overrides {
            if let Some(handler) = inventory::iter::<OverrideHandler>().find(|h| h.key == key) {
                (handler.apply)(self, value)?;
            } else {
                warn!("No override handler found for key: {}", key);
            }
        }
        Ok(())
    }

    pub fn simulation(&self) -> Simulation {
        self.module::<Simulation>("simulation").unwrap_or_default()
    }

    pub fn set_simulation(&mut self, simulation: Simulation) {
        self.modules
            .insert("simulation".to_string(), Box::new(simulation));
    }

    pub fn output(&self) -> Output {
        self.module::<Output>("output").unwrap_or_default()
    }

    pub fn set_output(&mut self, output: Output) {
        self.modules.insert("output".to_string(), Box::new(output));
    }

    fn module<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.modules
            .get(key)
            .and_then(|boxed| boxed.as_ref().as_any().downcast_ref::<T>())
            .cloned()
    }
}

/// How free storage capacity travels back upstream.
#[derive(PartialEq, Debug, ValueEnum, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrafficDynamics {
    /// Capacity freed at the downstream end is usable upstream immediately.
    #[default]
    Queue,
    /// Freed capacity travels upstream as holes at congested wave speed.
    WithHoles,
}

#[derive(PartialEq, Debug, ValueEnum, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VehicleQueueType {
    #[default]
    Fifo,
    Passing,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Simulation {
    pub start_time: u32,
    pub end_time: u32,
    /// seconds per simulation tick
    pub time_step_size: u32,
    pub flow_capacity_factor: f64,
    pub storage_capacity_factor: f64,
    /// overrides the effective cell size of the network if set
    pub effective_cell_size: Option<f64>,
    pub stuck_time: u32,
    pub remove_stuck_vehicles: bool,
    pub traffic_dynamics: TrafficDynamics,
    pub vehicle_queue: VehicleQueueType,
    pub seed: u64,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            start_time: 0,
            end_time: 86400,
            time_step_size: 1,
            flow_capacity_factor: 1.0,
            storage_capacity_factor: 1.0,
            effective_cell_size: None,
            stuck_time: 10,
            remove_stuck_vehicles: true,
            traffic_dynamics: TrafficDynamics::Queue,
            vehicle_queue: VehicleQueueType::Fifo,
            seed: 4711,
        }
    }
}

register_override!("simulation.start_time", |config, value| {
    let mut sim = config.simulation();
    sim.start_time = parse_value("simulation.start_time", value)?;
    config.set_simulation(sim);
    Ok(())
});

register_override!("simulation.end_time", |config, value| {
    let mut sim = config.simulation();
    sim.end_time = parse_value("simulation.end_time", value)?;
    config.set_simulation(sim);
    Ok(())
});

register_override!("simulation.flow_capacity_factor", |config, value| {
    let mut sim = config.simulation();
    sim.flow_capacity_factor = parse_value("simulation.flow_capacity_factor", value)?;
    config.set_simulation(sim);
    Ok(())
});

register_override!("simulation.storage_capacity_factor", |config, value| {
    let mut sim = config.simulation();
    sim.storage_capacity_factor = parse_value("simulation.storage_capacity_factor", value)?;
    config.set_simulation(sim);
    Ok(())
});

register_override!("simulation.stuck_time", |config, value| {
    let mut sim = config.simulation();
    sim.stuck_time = parse_value("simulation.stuck_time", value)?;
    config.set_simulation(sim);
    Ok(())
});

register_override!("simulation.seed", |config, value| {
    let mut sim = config.simulation();
    sim.seed = parse_value("simulation.seed", value)?;
    config.set_simulation(sim);
    Ok(())
});

register_override!("simulation.traffic_dynamics", |config, value| {
    let mut sim = config.simulation();
    sim.traffic_dynamics = TrafficDynamics::from_str(value, true).map_err(|_| {
        ConfigError::InvalidValue {
            key: "simulation.traffic_dynamics".to_string(),
            value: value.to_string(),
        }
    })?;
    config.set_simulation(sim);
    Ok(())
});

register_override!("simulation.vehicle_queue", |config, value| {
    let mut sim = config.simulation();
    sim.vehicle_queue = VehicleQueueType::from_str(value, true).map_err(|_| {
        ConfigError::InvalidValue {
            key: "simulation.vehicle_queue".to_string(),
            value: value.to_string(),
        }
    })?;
    config.set_simulation(sim);
    Ok(())
});

#[derive(PartialEq, Debug, ValueEnum, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Logging {
    None,
    #[default]
    Info,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Output {
    pub output_dir: PathBuf,
    #[serde(default)]
    pub logging: Logging,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            output_dir: PathBuf::from("./"),
            logging: Logging::None,
        }
    }
}

register_override!("output.output_dir", |config, value| {
    let mut output = config.output();
    output.output_dir = PathBuf::from(value);
    config.set_output(output);
    Ok(())
});

register_override!("output.logging", |config, value| {
    let mut output = config.output();
    output.logging = Logging::from_str(value, true).map_err(|_| ConfigError::InvalidValue {
        key: "output.logging".to_string(),
        value: value.to_string(),
    })?;
    config.set_output(output);
    Ok(())
});

#[typetag::serde(tag = "type")]
pub trait ConfigModule: Debug + Send + Sync + DynClone {
    fn as_any(&self) -> &dyn Any;
}

#[typetag::serde]
impl ConfigModule for Simulation {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[typetag::serde]
impl ConfigModule for Output {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// This is needed to allow cloning of the trait object and thus cloning of the Config.
dyn_clone::clone_trait_object!(ConfigModule);
