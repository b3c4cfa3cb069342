use crate::simulation::agents::RouteDriver;
use crate::simulation::config;
use crate::simulation::config::VehicleQueueType;
use crate::simulation::id::Id;
use crate::simulation::logging::WarnLimiter;
use crate::simulation::network::capacity::{CapacityFactors, LinkAttributes};
use crate::simulation::network::link::LinkQueue;
use crate::simulation::network::{Link, Network, Node};
use crate::simulation::vehicles::InternalVehicle;
use nohash_hasher::IntSet;

/// Unscaled capacities, 7.5m cells, 1s time steps and no holes.
pub fn factors() -> CapacityFactors {
    CapacityFactors {
        flow_capacity_factor: 1.,
        storage_capacity_factor: 1.,
        effective_cell_size: 7.5,
        time_step_size: 1,
        holes: false,
    }
}

pub fn create_link_queue(
    id: &str,
    length: f64,
    free_speed: f64,
    capacity_h: f64,
    lanes: f64,
) -> LinkQueue {
    LinkQueue::new(
        Id::create(id),
        Id::create(&format!("{id}-from")),
        Id::create(&format!("{id}-to")),
        LinkAttributes {
            length,
            free_speed,
            capacity_h,
            lanes,
        },
        factors(),
        VehicleQueueType::Fifo,
        &mut WarnLimiter::new(),
    )
    .unwrap()
}

/// A car with one pce and a high maximum velocity, so that the free speed of links decides its
/// travel times. Its driver follows `route` and starts on the first link.
pub fn create_vehicle(id: &str, route: Vec<&str>) -> InternalVehicle {
    let route = route.into_iter().map(Id::create).collect();
    let driver = RouteDriver::new(Id::create(id), Id::create("car"), route);
    InternalVehicle::new(Id::create(id), 200., 1., Box::new(driver))
}

pub fn create_link(id: &str, from: &str, to: &str, length: f64, capacity_h: f64) -> Link {
    let mut modes = IntSet::default();
    modes.insert(Id::create("car"));
    Link::new(
        Id::create(id),
        Id::create(from),
        Id::create(to),
        length,
        capacity_h,
        10.,
        1.,
        modes,
    )
}

/// node1 -link1-> node2 -link2-> node3 -link3-> node4
///
/// All links have a free speed of 10m/s and one vehicle per second of capacity. link1 and link3
/// are 100m long, link2 is 1000m long.
pub fn three_link_network() -> Network {
    let mut network = Network::new();
    for id in ["node1", "node2", "node3", "node4"] {
        network.add_node(Node::new(Id::create(id)));
    }
    network.add_link(create_link("link1", "node1", "node2", 100., 3600.));
    network.add_link(create_link("link2", "node2", "node3", 1000., 3600.));
    network.add_link(create_link("link3", "node3", "node4", 100., 3600.));
    network
}

/// Two links `big` and `small` merge at node `merge` into link `out`, which holds 10 vehicles.
pub fn two_into_one_network(big_capacity_h: f64, small_capacity_h: f64) -> Network {
    let mut network = Network::new();
    for id in ["big-start", "small-start", "merge", "end"] {
        network.add_node(Node::new(Id::create(id)));
    }
    network.add_link(create_link("big", "big-start", "merge", 100., big_capacity_h));
    network.add_link(create_link("small", "small-start", "merge", 100., small_capacity_h));
    network.add_link(create_link("out", "merge", "end", 75., 3600.));
    network
}

pub fn config() -> config::Simulation {
    config::Simulation {
        start_time: 0,
        end_time: 3600,
        ..config::Simulation::default()
    }
}
