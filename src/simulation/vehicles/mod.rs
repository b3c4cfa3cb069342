use crate::simulation::agents::{DriverAgent, Person};
use crate::simulation::id::Id;
use crate::simulation::network::Link;

/// A vehicle while it is on the network. The driver travels with the vehicle and decides where
/// it goes next.
#[derive(Debug)]
pub struct InternalVehicle {
    pub id: Id<InternalVehicle>,
    /// Maximum velocity in m/s.
    pub max_v: f64,
    /// Passenger car equivalents. Consumed from storage, buffer and flow capacity.
    pub pce: f64,
    pub earliest_exit_time: u32,
    pub curr_link: Option<Id<Link>>,
    pub driver: Box<dyn DriverAgent>,
}

impl InternalVehicle {
    pub fn new(id: Id<InternalVehicle>, max_v: f64, pce: f64, driver: Box<dyn DriverAgent>) -> Self {
        InternalVehicle {
            id,
            max_v,
            pce,
            earliest_exit_time: 0,
            curr_link: None,
            driver,
        }
    }

    pub fn driver(&self) -> &dyn DriverAgent {
        self.driver.as_ref()
    }

    pub fn driver_mut(&mut self) -> &mut dyn DriverAgent {
        self.driver.as_mut()
    }

    pub fn driver_id(&self) -> &Id<Person> {
        self.driver.id()
    }

    pub fn mode(&self) -> &Id<String> {
        self.driver.mode()
    }
}
