use crate::simulation::agents::Person;
use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::vehicles::InternalVehicle;
use parking_lot::RwLock;
use std::sync::Arc;

/// Position of a vehicle on its link.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    pub vehicle: Id<InternalVehicle>,
    pub driver: Id<Person>,
    pub distance_from_from_node: f64,
    pub in_buffer: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkSnapshot {
    pub id: Id<Link>,
    pub used_storage: f64,
    pub storage_capacity: f64,
    pub buffer_len: usize,
    /// Vehicles in the buffer first, then the travelling vehicles, downstream to upstream.
    pub vehicles: Vec<VehicleSnapshot>,
}

/// State of all occupied links after a time step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkSnapshot {
    pub time: u32,
    pub links: Vec<LinkSnapshot>,
}

impl NetworkSnapshot {
    pub fn vehicle_count(&self) -> usize {
        self.links.iter().map(|l| l.vehicles.len()).sum()
    }

    pub fn link(&self, id: &Id<Link>) -> Option<&LinkSnapshot> {
        self.links.iter().find(|l| &l.id == id)
    }
}

/// Written by the thread advancing the simulation. Readers only ever see complete snapshots.
#[derive(Debug, Default)]
pub struct SnapshotPublisher {
    latest: Arc<RwLock<Arc<NetworkSnapshot>>>,
}

/// Read only handle to the latest published snapshot. It can be cloned and sent to other threads.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    latest: Arc<RwLock<Arc<NetworkSnapshot>>>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: NetworkSnapshot) {
        *self.latest.write() = Arc::new(snapshot);
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            latest: self.latest.clone(),
        }
    }
}

impl SnapshotReader {
    /// The lock is only held to clone the pointer, so readers never block the simulation for
    /// longer than that.
    pub fn latest(&self) -> Arc<NetworkSnapshot> {
        self.latest.read().clone()
    }
}
