use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::vehicles::InternalVehicle;
use std::fmt::Debug;

/// Marker type for ids of persons driving vehicles.
#[derive(Debug)]
pub struct Person;

/// The part of a driver the network needs to know about. Plans, scoring and replanning live
/// elsewhere.
pub trait DriverAgent: Debug + Send {
    fn id(&self) -> &Id<Person>;

    fn mode(&self) -> &Id<String>;

    /// The link the driver is currently on.
    fn curr_link_id(&self) -> &Id<Link>;

    /// The link the driver wants to enter next. `None` means the driver wants to arrive on the
    /// current link.
    fn choose_next_link_id(&self) -> Option<&Id<Link>>;

    /// Called when the vehicle crossed the node and is about to enter `new_link`.
    fn notify_move_over_node(&mut self, new_link: &Id<Link>);
}

/// A driver following a fixed sequence of links.
#[derive(Debug, Clone)]
pub struct RouteDriver {
    id: Id<Person>,
    mode: Id<String>,
    route: Vec<Id<Link>>,
    route_index: usize,
}

impl RouteDriver {
    pub fn new(id: Id<Person>, mode: Id<String>, route: Vec<Id<Link>>) -> Self {
        assert!(
            !route.is_empty(),
            "The route of driver {id} must contain at least one link."
        );
        RouteDriver {
            id,
            mode,
            route,
            route_index: 0,
        }
    }

    pub fn route(&self) -> &[Id<Link>] {
        &self.route
    }
}

impl DriverAgent for RouteDriver {
    fn id(&self) -> &Id<Person> {
        &self.id
    }

    fn mode(&self) -> &Id<String> {
        &self.mode
    }

    fn curr_link_id(&self) -> &Id<Link> {
        &self.route[self.route_index]
    }

    fn choose_next_link_id(&self) -> Option<&Id<Link>> {
        self.route.get(self.route_index + 1)
    }

    fn notify_move_over_node(&mut self, new_link: &Id<Link>) {
        assert_eq!(
            Some(new_link),
            self.choose_next_link_id(),
            "Driver {} was moved onto link {new_link}, which is not the next link on its route.",
            self.id
        );
        self.route_index += 1;
    }
}

/// Outcome of offering a vehicle to the transit stop logic of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitStopResult {
    /// The vehicle stops. It is removed from the link and handed over with
    /// [`TransitStopHandler::accept`].
    Accepted,
    /// Offer the same vehicle again right away.
    Rehandle,
    /// No stop here, the vehicle drives on.
    ContinueDriving,
}

/// Serves transit stops located on links. Vehicles handed over via `accept` are owned by the
/// handler until it puts them back with
/// [`SimNetwork::add_transit_slightly_upstream_of_stop`](crate::simulation::network::sim_network::SimNetwork::add_transit_slightly_upstream_of_stop).
pub trait TransitStopHandler: Debug {
    fn handle_transit_stop(
        &mut self,
        now: u32,
        vehicle: &InternalVehicle,
        link: &Id<Link>,
    ) -> TransitStopResult;

    fn accept(&mut self, now: u32, vehicle: InternalVehicle, link: &Id<Link>);
}

#[cfg(test)]
mod tests {
    use crate::simulation::agents::{DriverAgent, RouteDriver};
    use crate::simulation::id::Id;
    use macros::integration_test;

    #[integration_test]
    fn follows_route() {
        let route = vec![Id::create("l1"), Id::create("l2"), Id::create("l3")];
        let mut driver = RouteDriver::new(Id::create("p"), Id::create("car"), route);

        assert_eq!("l1", driver.curr_link_id().external());
        assert_eq!("l2", driver.choose_next_link_id().unwrap().external());

        driver.notify_move_over_node(&Id::create("l2"));
        driver.notify_move_over_node(&Id::create("l3"));
        assert_eq!("l3", driver.curr_link_id().external());
        assert!(driver.choose_next_link_id().is_none());
    }

    #[integration_test]
    #[should_panic]
    fn rejects_off_route_move() {
        let route = vec![Id::create("l1"), Id::create("l2")];
        let mut driver = RouteDriver::new(Id::create("p"), Id::create("car"), route);
        driver.notify_move_over_node(&Id::create("other"));
    }
}
