pub mod local_controller;

use crate::simulation::agents::{TransitStopHandler, TransitStopResult};
use crate::simulation::events::EventsManager;
use crate::simulation::id::Id;
use crate::simulation::logging::WarnLimiter;
use crate::simulation::network::Link;
use crate::simulation::random::create_rnd;
use crate::simulation::vehicles::InternalVehicle;
use derive_builder::Builder;
use rand::rngs::SmallRng;
use std::cell::{RefCell, RefMut};
use std::rc::Rc;

/// This struct holds objects that are local to the thread advancing the simulation. They function
/// as a connector between the network and the "outside" computational context.
#[derive(Debug, Builder)]
#[builder(pattern = "owned")]
pub struct ThreadLocalComputationalEnvironment {
    // The value is of type Rc as this is a thread-local events publisher.
    #[builder(default)]
    events_publisher: Rc<RefCell<EventsManager>>,
    #[builder(default = "create_rnd(4711)")]
    rnd: SmallRng,
    #[builder(default)]
    warnings: WarnLimiter,
    #[builder(default, setter(strip_option))]
    transit_stop_handler: Option<Box<dyn TransitStopHandler>>,
}

impl Default for ThreadLocalComputationalEnvironment {
    fn default() -> Self {
        ThreadLocalComputationalEnvironment {
            events_publisher: Rc::new(RefCell::new(EventsManager::new())),
            rnd: create_rnd(4711),
            warnings: WarnLimiter::new(),
            transit_stop_handler: None,
        }
    }
}

impl ThreadLocalComputationalEnvironment {
    pub fn events_publisher_borrow_mut(&mut self) -> RefMut<'_, EventsManager> {
        self.events_publisher.borrow_mut()
    }

    pub fn events_publisher(&self) -> Rc<RefCell<EventsManager>> {
        self.events_publisher.clone()
    }

    pub fn rnd_mut(&mut self) -> &mut SmallRng {
        &mut self.rnd
    }

    pub fn warnings_mut(&mut self) -> &mut WarnLimiter {
        &mut self.warnings
    }

    /// Without a transit stop handler every vehicle continues driving.
    pub fn handle_transit_stop(
        &mut self,
        now: u32,
        vehicle: &InternalVehicle,
        link: &Id<Link>,
    ) -> TransitStopResult {
        match self.transit_stop_handler.as_mut() {
            Some(handler) => handler.handle_transit_stop(now, vehicle, link),
            None => TransitStopResult::ContinueDriving,
        }
    }

    pub fn accept_at_transit_stop(&mut self, now: u32, vehicle: InternalVehicle, link: &Id<Link>) {
        let handler = self.transit_stop_handler.as_mut().unwrap_or_else(|| {
            panic!(
                "Vehicle {} was accepted at a transit stop on link {link}, but there is no transit stop handler.",
                vehicle.id
            )
        });
        handler.accept(now, vehicle, link);
    }

    pub fn transit_stop_handler_mut(&mut self) -> Option<&mut Box<dyn TransitStopHandler>> {
        self.transit_stop_handler.as_mut()
    }
}
