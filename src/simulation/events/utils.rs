use crate::simulation::events::{
    EventsManager, LinkEnterEvent, LinkLeaveEvent, PersonStuckEvent, VehicleEntersTrafficEvent,
    VehicleLeavesTrafficEvent,
};
use std::cell::RefCell;
use std::rc::Rc;

/// A flattened view of a network event, holding external ids only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub time: u32,
    pub type_: &'static str,
    pub link: String,
    pub vehicle: String,
}

/// Records all network events published through an [`EventsManager`]. The collector shares its
/// storage with the registered handlers, so it can be inspected while the simulation is running.
#[derive(Debug, Clone, Default)]
pub struct EventsCollector {
    events: Rc<RefCell<Vec<RecordedEvent>>>,
}

macro_rules! record {
    ($manager:expr, $events:expr, $event:ty, $vehicle:ident) => {{
        let events = $events.clone();
        $manager.on::<$event, _>(move |e| {
            events.borrow_mut().push(RecordedEvent {
                time: e.time,
                type_: <$event>::TYPE,
                link: e.link.external().to_string(),
                vehicle: e.$vehicle.external().to_string(),
            })
        });
    }};
}

impl EventsCollector {
    pub fn register(manager: &mut EventsManager) -> Self {
        let collector = EventsCollector::default();
        record!(manager, collector.events, LinkEnterEvent, vehicle);
        record!(manager, collector.events, LinkLeaveEvent, vehicle);
        record!(manager, collector.events, VehicleEntersTrafficEvent, vehicle);
        record!(manager, collector.events, VehicleLeavesTrafficEvent, vehicle);
        record!(manager, collector.events, PersonStuckEvent, vehicle);
        collector
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.borrow().clone()
    }

    pub fn of_type(&self, type_: &str) -> Vec<RecordedEvent> {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.type_ == type_)
            .cloned()
            .collect()
    }

    pub fn count(&self, type_: &str) -> usize {
        self.events.borrow().iter().filter(|e| e.type_ == type_).count()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}
