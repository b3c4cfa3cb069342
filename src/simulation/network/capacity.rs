use crate::simulation::config;
use crate::simulation::config::TrafficDynamics;
use crate::simulation::id::Id;
use crate::simulation::logging::{WarnLimiter, WarningKind};
use crate::simulation::network::Link;
use thiserror::Error;
use tracing::debug;

/// Speed in km/h at which freed space travels upstream in congested traffic.
const CONGESTED_WAVE_SPEED_KMH: f64 = 15.;
/// Lowest plausible congested density in vehicles per metre.
const MIN_CONGESTED_DENSITY: f64 = 1. / 50.;
const MAX_CONGESTED_DENSITY: f64 = 10.;

#[derive(Debug, Error, PartialEq)]
pub enum CapacityError {
    #[error("Link {link} has no finite free speed travel time (length: {length}, free speed: {free_speed}). Please check the attributes length and freespeed.")]
    NonFiniteFreeSpeedTravelTime {
        link: String,
        length: f64,
        free_speed: f64,
    },
    #[error("Link {link} has an invalid {what}: {value}.")]
    InvalidCapacity {
        link: String,
        what: &'static str,
        value: f64,
    },
}

/// Attributes of a link which may change during the simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkAttributes {
    pub length: f64,
    pub free_speed: f64,
    /// Raw flow capacity in vehicles per hour.
    pub capacity_h: f64,
    pub lanes: f64,
}

impl From<&Link> for LinkAttributes {
    fn from(link: &Link) -> Self {
        LinkAttributes {
            length: link.length,
            free_speed: link.freespeed,
            capacity_h: link.capacity,
            lanes: link.permlanes,
        }
    }
}

impl LinkAttributes {
    pub fn capacity_s(&self) -> f64 {
        self.capacity_h / 3600.
    }
}

/// Global factors which scale the capacities of all links.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityFactors {
    pub flow_capacity_factor: f64,
    pub storage_capacity_factor: f64,
    pub effective_cell_size: f64,
    pub time_step_size: u32,
    pub holes: bool,
}

impl CapacityFactors {
    /// `effective_cell_size` is the network's value. The config may override it.
    pub fn from_config(config: &config::Simulation, effective_cell_size: f64) -> Self {
        CapacityFactors {
            flow_capacity_factor: config.flow_capacity_factor,
            storage_capacity_factor: config.storage_capacity_factor,
            effective_cell_size: config.effective_cell_size.unwrap_or(effective_cell_size),
            time_step_size: config.time_step_size,
            holes: config.traffic_dynamics == TrafficDynamics::WithHoles,
        }
    }
}

/// Capacities derived from [`LinkAttributes`] and [`CapacityFactors`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkCapacities {
    pub free_speed_travel_time: f64,
    pub flow_capacity_per_time_step: f64,
    pub buffer_storage_capacity: f64,
    pub storage_capacity: f64,
    /// Number of holes in circulation. Only set if the link simulates holes.
    pub n_holes_max: Option<usize>,
}

pub fn free_speed_travel_time(
    link_id: &Id<Link>,
    attrs: &LinkAttributes,
) -> Result<f64, CapacityError> {
    let fftt = attrs.length / attrs.free_speed;
    if !fftt.is_finite() {
        return Err(CapacityError::NonFiniteFreeSpeedTravelTime {
            link: link_id.external().to_string(),
            length: attrs.length,
            free_speed: attrs.free_speed,
        });
    }
    Ok(fftt)
}

/// Derives flow and storage capacity of a link. Deviations from plausible values are logged
/// through `warnings`, which limits how often each kind of warning is reported.
pub fn calculate(
    link_id: &Id<Link>,
    attrs: &LinkAttributes,
    factors: &CapacityFactors,
    warnings: &mut WarnLimiter,
) -> Result<LinkCapacities, CapacityError> {
    let free_speed_travel_time = free_speed_travel_time(link_id, attrs)?;

    let flow_capacity_per_time_step =
        attrs.capacity_s() * factors.time_step_size as f64 * factors.flow_capacity_factor;
    check_capacity(link_id, "flow capacity", flow_capacity_per_time_step)?;

    let buffer_storage_capacity = flow_capacity_per_time_step.ceil();

    let mut storage_capacity = attrs.length * attrs.lanes / factors.effective_cell_size
        * factors.storage_capacity_factor;
    // a link must hold at least what leaves it in one time step
    storage_capacity = storage_capacity.max(buffer_storage_capacity);

    // on slow links vehicles in free flow occupy more space than the cells provide
    let free_flow_storage = free_speed_travel_time * flow_capacity_per_time_step;
    if storage_capacity < free_flow_storage {
        warnings.warn(WarningKind::StorageCapacityEnlarged, || {
            format!("Link {link_id} too small: enlarge storage capacity from: {storage_capacity} Vehicles to: {free_flow_storage} Vehicles. This is not fatal, but modifies the traffic flow dynamics.")
        });
        storage_capacity = free_flow_storage;
    }

    let n_holes_max = if factors.holes {
        let (enlarged, n_holes) = holes_for(link_id, attrs, storage_capacity, warnings);
        storage_capacity = enlarged;
        Some(n_holes)
    } else {
        None
    };
    check_capacity(link_id, "storage capacity", storage_capacity)?;

    Ok(LinkCapacities {
        free_speed_travel_time,
        flow_capacity_per_time_step,
        buffer_storage_capacity,
        storage_capacity,
        n_holes_max,
    })
}

/// Returns the possibly enlarged storage capacity and the number of holes for it.
fn holes_for(
    link_id: &Id<Link>,
    attrs: &LinkAttributes,
    storage_capacity: f64,
    warnings: &mut WarnLimiter,
) -> (f64, usize) {
    // vehicles per metre which leave at bottleneck flow while the gap travels upstream
    let wave_density = attrs.capacity_s() * 3600. / (CONGESTED_WAVE_SPEED_KMH * 1000.);
    let mut storage_capacity = storage_capacity;
    let mut congested_density = storage_capacity / attrs.length - wave_density;

    if congested_density > MAX_CONGESTED_DENSITY {
        warnings.warn(WarningKind::CongestedDensityTooHigh, || {
            format!("Congested density of link {link_id} is very large: {congested_density} veh/m. Does this make sense?")
        });
    }

    if congested_density < MIN_CONGESTED_DENSITY {
        warnings.warn(WarningKind::CongestedDensityTooLow, || {
            format!("Link {link_id} is not wide enough to process its flow capacity with holes. Increasing storage capacity.")
        });
        storage_capacity = (MIN_CONGESTED_DENSITY + wave_density) * attrs.length;
        congested_density = storage_capacity / attrs.length - wave_density;
    }

    let n_holes_max = (congested_density * attrs.length).ceil().max(0.) as usize;
    debug!(
        link = %link_id,
        n_holes_max,
        storage_capacity,
        length = attrs.length,
        congested_density,
        "Calculated holes"
    );
    (storage_capacity, n_holes_max)
}

/// Time after which space freed at the downstream end of the link becomes usable upstream.
pub fn hole_travel_time(length: f64) -> f64 {
    length * 3600. / CONGESTED_WAVE_SPEED_KMH / 1000.
}

fn check_capacity(link_id: &Id<Link>, what: &'static str, value: f64) -> Result<(), CapacityError> {
    if value.is_finite() && value >= 0. {
        Ok(())
    } else {
        Err(CapacityError::InvalidCapacity {
            link: link_id.external().to_string(),
            what,
            value,
        })
    }
}
