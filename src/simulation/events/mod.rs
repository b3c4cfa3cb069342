pub mod utils;

use crate::simulation::agents::Person;
use crate::simulation::id::Id;
use crate::simulation::network::Link;
use crate::simulation::vehicles::InternalVehicle;
use derive_builder::Builder;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

pub trait EventTrait: Debug + Any {
    //This can't be a const, because traits with const fields are not dyn compatible.
    fn type_(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn time(&self) -> u32;
}

type OnEventFn = dyn Fn(&dyn EventTrait) + 'static;

/// The EventsManager holds call-backs for event processing. Rust has no reflection, so handlers
/// are registered per concrete event type, which keeps the event types checked at compile time.
/// Handlers registered with `on_any` see every event.
#[derive(Default)]
pub struct EventsManager {
    per_type: HashMap<TypeId, Vec<Rc<OnEventFn>>>,
    catch_all: Vec<Box<OnEventFn>>,
    finish: Vec<Box<dyn Fn() + 'static>>,
}

impl Debug for EventsManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EventsManager {{ per_type: {:?}, catch_all: {:?}, finish: {:?} }}",
            self.per_type.len(),
            self.catch_all.len(),
            self.finish.len()
        )
    }
}

impl EventsManager {
    pub fn new() -> Self {
        EventsManager::default()
    }

    pub fn publish_event(&mut self, event: &dyn EventTrait) {
        let tid = event.as_any().type_id();
        if let Some(list) = self.per_type.get(&tid) {
            for h in list {
                h(event);
            }
        }
        for h in &self.catch_all {
            h(event);
        }
    }

    pub fn finish(&mut self) {
        for f in self.finish.iter() {
            f()
        }
    }

    /// This function is used to register callbacks for specific event types.
    pub fn on<E, F>(&mut self, f: F)
    where
        E: EventTrait,
        F: Fn(&E) + 'static,
    {
        let entry = self.per_type.entry(TypeId::of::<E>()).or_default();
        entry.push(Rc::new(move |ev: &dyn EventTrait| {
            if let Some(e) = ev.as_any().downcast_ref::<E>() {
                f(e);
            }
        }));
    }

    /// This function is used to register callbacks for all event types.
    pub fn on_any<F>(&mut self, f: F)
    where
        F: Fn(&dyn EventTrait) + 'static,
    {
        self.catch_all.push(Box::new(f));
    }

    pub fn on_finish<F>(&mut self, f: F)
    where
        F: Fn() + 'static,
    {
        self.finish.push(Box::new(f));
    }
}

macro_rules! impl_event_trait {
    ($event:ty) => {
        impl EventTrait for $event {
            fn type_(&self) -> &'static str {
                Self::TYPE
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn time(&self) -> u32 {
                self.time
            }
        }
    };
}

#[derive(Builder, Debug, Clone, PartialEq)]
pub struct LinkEnterEvent {
    pub time: u32,
    pub link: Id<Link>,
    pub vehicle: Id<InternalVehicle>,
    pub driver: Id<Person>,
}

impl LinkEnterEvent {
    pub const TYPE: &'static str = "entered link";
}

impl_event_trait!(LinkEnterEvent);

#[derive(Builder, Debug, Clone, PartialEq)]
pub struct LinkLeaveEvent {
    pub time: u32,
    pub link: Id<Link>,
    pub vehicle: Id<InternalVehicle>,
    pub driver: Id<Person>,
}

impl LinkLeaveEvent {
    pub const TYPE: &'static str = "left link";
}

impl_event_trait!(LinkLeaveEvent);

#[derive(Builder, Debug, Clone, PartialEq)]
pub struct VehicleEntersTrafficEvent {
    pub time: u32,
    pub vehicle: Id<InternalVehicle>,
    pub link: Id<Link>,
    pub driver: Id<Person>,
    pub mode: Id<String>,
}

impl VehicleEntersTrafficEvent {
    pub const TYPE: &'static str = "vehicle enters traffic";
}

impl_event_trait!(VehicleEntersTrafficEvent);

#[derive(Builder, Debug, Clone, PartialEq)]
pub struct VehicleLeavesTrafficEvent {
    pub time: u32,
    pub vehicle: Id<InternalVehicle>,
    pub link: Id<Link>,
    pub driver: Id<Person>,
    pub mode: Id<String>,
}

impl VehicleLeavesTrafficEvent {
    pub const TYPE: &'static str = "vehicle leaves traffic";
}

impl_event_trait!(VehicleLeavesTrafficEvent);

/// Published for every vehicle which is removed from the network without reaching its
/// destination, either because it was blocked for too long or because the simulation ended.
#[derive(Builder, Debug, Clone, PartialEq)]
pub struct PersonStuckEvent {
    pub time: u32,
    pub person: Id<Person>,
    pub link: Id<Link>,
    pub vehicle: Id<InternalVehicle>,
    pub mode: Id<String>,
}

impl PersonStuckEvent {
    pub const TYPE: &'static str = "stuckAndAbort";
}

impl_event_trait!(PersonStuckEvent);
