use crate::simulation::agents::TransitStopHandler;
use crate::simulation::config;
use crate::simulation::controller::{
    ThreadLocalComputationalEnvironment, ThreadLocalComputationalEnvironmentBuilder,
    ThreadLocalComputationalEnvironmentBuilderError,
};
use crate::simulation::events::EventsManager;
use crate::simulation::id::Id;
use crate::simulation::network::capacity::CapacityError;
use crate::simulation::network::link::LinkChange;
use crate::simulation::network::sim_network::SimNetwork;
use crate::simulation::network::{Link, Network};
use crate::simulation::random::create_rnd;
use crate::simulation::snapshot::SnapshotPublisher;
use crate::simulation::time_queue::{EndTime, TimeQueue};
use crate::simulation::vehicles::InternalVehicle;
use derive_builder::Builder;
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Capacity(#[from] CapacityError),
    #[error("failed to set up the computational environment: {0}")]
    Environment(#[from] ThreadLocalComputationalEnvironmentBuilderError),
}

#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct ControllerArguments<'n> {
    network: &'n Network,
    config: config::Simulation,
    #[builder(default)]
    events: EventsManager,
    #[builder(default, setter(strip_option))]
    snapshot_publisher: Option<SnapshotPublisher>,
    #[builder(default, setter(strip_option))]
    transit_stop_handler: Option<Box<dyn TransitStopHandler>>,
}

/// A vehicle which starts its trip at `time` on the current link of its driver.
#[derive(Debug)]
struct Departure {
    time: u32,
    vehicle: InternalVehicle,
}

impl EndTime for Departure {
    fn end_time(&self, _now: u32) -> u32 {
        self.time
    }
}

#[derive(Debug)]
struct ScheduledChange {
    time: u32,
    link: Id<Link>,
    change: LinkChange,
}

impl EndTime for ScheduledChange {
    fn end_time(&self, _now: u32) -> u32 {
        self.time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Vehicles which reached the end of their route.
    pub arrived: usize,
    /// Vehicles removed by the stuck watchdog or by the final clean up.
    pub stuck: usize,
    pub last_tick: u32,
}

/// Runs the simulation of one network in the current thread.
pub struct Controller {
    network: SimNetwork,
    departures: TimeQueue<Departure>,
    link_changes: TimeQueue<ScheduledChange>,
    comp_env: ThreadLocalComputationalEnvironment,
    snapshot_publisher: Option<SnapshotPublisher>,
    config: config::Simulation,
}

impl Debug for Controller {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("departures", &self.departures.len())
            .field("link_changes", &self.link_changes.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Controller {
    pub fn new(args: ControllerArguments) -> Result<Self, ControllerError> {
        let mut builder = ThreadLocalComputationalEnvironmentBuilder::default()
            .events_publisher(Rc::new(RefCell::new(args.events)))
            .rnd(create_rnd(args.config.seed));
        if let Some(handler) = args.transit_stop_handler {
            builder = builder.transit_stop_handler(handler);
        }
        let mut comp_env = builder.build()?;

        let network = SimNetwork::from_network(args.network, &args.config, comp_env.warnings_mut())?;

        Ok(Controller {
            network,
            departures: TimeQueue::new(),
            link_changes: TimeQueue::new(),
            comp_env,
            snapshot_publisher: args.snapshot_publisher,
            config: args.config,
        })
    }

    /// The vehicle departs at `time` from the current link of its driver.
    pub fn schedule_departure(&mut self, time: u32, vehicle: InternalVehicle) {
        let start_link = vehicle.driver().curr_link_id();
        assert!(
            self.network.links.contains_key(start_link),
            "Vehicle {} departs on link {start_link}, which is not part of the network.",
            vehicle.id
        );
        self.departures
            .add(Departure { time, vehicle }, self.config.start_time);
    }

    /// Changes the attributes of `link` at `time`.
    pub fn schedule_link_change(&mut self, time: u32, link: Id<Link>, change: LinkChange) {
        self.link_changes.add(
            ScheduledChange { time, link, change },
            self.config.start_time,
        );
    }

    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut SimNetwork {
        &mut self.network
    }

    pub fn comp_env_mut(&mut self) -> &mut ThreadLocalComputationalEnvironment {
        &mut self.comp_env
    }

    /// Advances the simulation from start time until end time, or until all vehicles have left
    /// the network. Vehicles still on the network afterwards are removed as stuck.
    pub fn run(&mut self) -> RunSummary {
        let start_time = self.config.start_time;
        let end_time = self.config.end_time;
        let step = self.config.time_step_size.max(1);
        info!(
            "Starting simulation. Start time {start_time}, End time {end_time}, {} departures.",
            self.departures.len()
        );

        let mut summary = RunSummary {
            last_tick: start_time,
            ..RunSummary::default()
        };
        let mut now = start_time;
        while now <= end_time {
            if now % 3600 == 0 {
                let hour = now / 3600;
                info!(
                    "Simulation at {hour}:00. {} vehicles on the network.",
                    self.network.veh_on_net()
                );
            }

            self.do_sim_step(now, &mut summary);
            summary.last_tick = now;

            if self.departures.is_empty() && self.network.veh_on_net() == 0 {
                info!("All vehicles have left the network at {now}.");
                break;
            }
            match now.checked_add(step) {
                Some(next) => now = next,
                None => break,
            }
        }

        let removed = self.network.clear(summary.last_tick, &mut self.comp_env);
        if removed > 0 {
            info!("Removed {removed} vehicles remaining on the network at the end of the simulation.");
        }
        summary.stuck += removed;
        self.comp_env.events_publisher_borrow_mut().finish();

        info!(
            "Finished simulation at {}. {} vehicles arrived, {} vehicles got stuck.",
            summary.last_tick, summary.arrived, summary.stuck
        );
        summary
    }

    #[instrument(level = "trace", skip(self, summary))]
    fn do_sim_step(&mut self, now: u32, summary: &mut RunSummary) {
        for scheduled in self.link_changes.pop(now) {
            self.network
                .apply_change(now, &scheduled.link, &scheduled.change, &mut self.comp_env);
        }
        for departure in self.departures.pop(now) {
            self.network.send_veh_en_route(departure.vehicle);
        }

        summary.stuck += self.network.move_nodes(now, &mut self.comp_env);
        summary.arrived += self.network.move_links(now, &mut self.comp_env).len();

        if let Some(publisher) = &self.snapshot_publisher {
            publisher.publish(self.network.snapshot(now));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::config;
    use crate::simulation::controller::local_controller::{
        Controller, ControllerArgumentsBuilder, RunSummary,
    };
    use crate::simulation::events::utils::EventsCollector;
    use crate::simulation::events::{
        EventsManager, LinkEnterEvent, PersonStuckEvent, VehicleEntersTrafficEvent,
        VehicleLeavesTrafficEvent,
    };
    use crate::simulation::id::Id;
    use crate::simulation::network::link::LinkChange;
    use crate::simulation::snapshot::SnapshotPublisher;
    use crate::test_utils::{create_vehicle, three_link_network};
    use assert_approx_eq::assert_approx_eq;
    use macros::integration_test;

    fn sim_config(end_time: u32) -> config::Simulation {
        config::Simulation {
            end_time,
            ..config::Simulation::default()
        }
    }

    #[integration_test]
    fn runs_until_network_is_empty() {
        let network = three_link_network();
        let mut events = EventsManager::new();
        let collector = EventsCollector::register(&mut events);
        let args = ControllerArgumentsBuilder::default()
            .network(&network)
            .config(sim_config(86400))
            .events(events)
            .build()
            .unwrap();
        let mut controller = Controller::new(args).unwrap();
        controller.schedule_departure(5, create_vehicle("v1", vec!["link1", "link2", "link3"]));

        let summary = controller.run();

        assert_eq!(
            RunSummary {
                arrived: 1,
                stuck: 0,
                last_tick: 117
            },
            summary
        );
        assert_eq!(1, collector.count(VehicleEntersTrafficEvent::TYPE));
        assert_eq!(1, collector.count(VehicleLeavesTrafficEvent::TYPE));
        assert_eq!(2, collector.count(LinkEnterEvent::TYPE));
    }

    #[integration_test]
    fn vehicles_left_at_end_time_are_stuck() {
        let network = three_link_network();
        let mut events = EventsManager::new();
        let collector = EventsCollector::register(&mut events);
        let args = ControllerArgumentsBuilder::default()
            .network(&network)
            .config(sim_config(50))
            .events(events)
            .build()
            .unwrap();
        let mut controller = Controller::new(args).unwrap();
        controller.schedule_departure(0, create_vehicle("v1", vec!["link1", "link2", "link3"]));
        controller.schedule_departure(100, create_vehicle("v2", vec!["link1", "link2"]));

        let summary = controller.run();

        assert_eq!(0, summary.arrived);
        assert_eq!(1, summary.stuck);
        assert_eq!(50, summary.last_tick);
        let stuck = collector.of_type(PersonStuckEvent::TYPE);
        assert_eq!(1, stuck.len());
        assert_eq!("link2", stuck[0].link);
    }

    #[integration_test]
    fn scheduled_link_change() {
        let network = three_link_network();
        let args = ControllerArgumentsBuilder::default()
            .network(&network)
            .config(sim_config(86400))
            .build()
            .unwrap();
        let mut controller = Controller::new(args).unwrap();
        // link2 is 10 times faster
        controller.schedule_link_change(
            0,
            Id::create("link2"),
            LinkChange {
                free_speed: Some(100.),
                ..LinkChange::default()
            },
        );
        controller.schedule_departure(0, create_vehicle("v1", vec!["link1", "link2", "link3"]));

        let summary = controller.run();
        // link2 from 1 to 11, link3 from 12 to 22
        assert_eq!(22, summary.last_tick);
        assert_eq!(1, summary.arrived);
    }

    #[integration_test]
    fn pending_link_changes_do_not_extend_run() {
        let network = three_link_network();
        let args = ControllerArgumentsBuilder::default()
            .network(&network)
            .config(sim_config(86400))
            .build()
            .unwrap();
        let mut controller = Controller::new(args).unwrap();
        controller.schedule_departure(5, create_vehicle("v1", vec!["link1", "link2", "link3"]));
        controller.schedule_link_change(
            1000,
            Id::create("link2"),
            LinkChange {
                capacity: Some(1800.),
                ..LinkChange::default()
            },
        );

        let summary = controller.run();
        assert_eq!(117, summary.last_tick);
        assert_eq!(1, summary.arrived);
        // never reached
        let link2 = controller.network().get_link(&Id::create("link2"));
        assert_approx_eq!(1., link2.flow_capacity_per_time_step());
    }

    #[integration_test]
    fn publishes_snapshots() {
        let network = three_link_network();
        let publisher = SnapshotPublisher::new();
        let reader = publisher.reader();
        let args = ControllerArgumentsBuilder::default()
            .network(&network)
            .config(sim_config(50))
            .snapshot_publisher(publisher)
            .build()
            .unwrap();
        let mut controller = Controller::new(args).unwrap();
        controller.schedule_departure(0, create_vehicle("v1", vec!["link1", "link2", "link3"]));

        controller.run();

        let latest = reader.latest();
        assert_eq!(50, latest.time);
        assert_eq!(1, latest.vehicle_count());
        assert!(latest.link(&Id::create("link2")).is_some());
    }

    #[integration_test]
    #[should_panic]
    fn departure_on_unknown_link() {
        let network = three_link_network();
        let args = ControllerArgumentsBuilder::default()
            .network(&network)
            .config(sim_config(50))
            .build()
            .unwrap();
        let mut controller = Controller::new(args).unwrap();
        controller.schedule_departure(0, create_vehicle("v1", vec!["nowhere"]));
    }
}
