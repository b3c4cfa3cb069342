use clap::Parser;
use nohash_hasher::IntSet;
use rust_qsim_core::simulation::agents::RouteDriver;
use rust_qsim_core::simulation::config::{CommandLineArgs, Config};
use rust_qsim_core::simulation::controller::local_controller::{
    Controller, ControllerArgumentsBuilder,
};
use rust_qsim_core::simulation::events::{EventsManager, PersonStuckEvent};
use rust_qsim_core::simulation::id::Id;
use rust_qsim_core::simulation::logging::init_logging;
use rust_qsim_core::simulation::network::{Link, Network, Node};
use rust_qsim_core::simulation::vehicles::InternalVehicle;
use std::cell::Cell;
use std::rc::Rc;
use tracing::info;

/// Drives vehicles down a corridor of links with a bottleneck in the middle.
#[derive(Parser, Debug)]
struct CorridorArgs {
    #[command(flatten)]
    sim: CommandLineArgs,
    /// Number of links in the corridor.
    #[arg(long, default_value_t = 10)]
    links: usize,
    /// Number of vehicles. One departs every second.
    #[arg(long, default_value_t = 1000)]
    vehicles: usize,
    /// Capacity of the link in the middle of the corridor in vehicles per hour.
    #[arg(long, default_value_t = 900.)]
    bottleneck_capacity: f64,
}

fn create_corridor(links: usize, bottleneck_capacity: f64) -> Network {
    let mut network = Network::new();
    for i in 0..=links {
        network.add_node(Node::new(Id::create(&format!("n{i}"))));
    }

    let mut modes = IntSet::default();
    modes.insert(Id::create("car"));
    for i in 0..links {
        let capacity = if i == links / 2 {
            bottleneck_capacity
        } else {
            3600.
        };
        network.add_link(Link::new(
            Id::create(&format!("l{i}")),
            Id::create(&format!("n{i}")),
            Id::create(&format!("n{}", i + 1)),
            500.,
            capacity,
            13.89,
            1.,
            modes.clone(),
        ));
    }
    network
}

fn main() {
    let args = CorridorArgs::parse();
    let config = match Config::from_args(&args.sim) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let _guards = match init_logging(&config) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("Failed to set up logging: {e}");
            std::process::exit(1);
        }
    };
    info!("Started with args: {:?}", args);

    let links = args.links.max(1);
    let network = create_corridor(links, args.bottleneck_capacity);
    let route: Vec<Id<Link>> = network.links().iter().map(|l| l.id.clone()).collect();

    let mut events = EventsManager::new();
    let stuck = Rc::new(Cell::new(0));
    let stuck_counter = stuck.clone();
    events.on::<PersonStuckEvent, _>(move |_| stuck_counter.set(stuck_counter.get() + 1));

    let sim_config = config.simulation();
    let controller_args = ControllerArgumentsBuilder::default()
        .network(&network)
        .config(sim_config.clone())
        .events(events)
        .build();
    let mut controller = match controller_args
        .map_err(|e| e.to_string())
        .and_then(|args| Controller::new(args).map_err(|e| e.to_string()))
    {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("Failed to create the simulation: {e}");
            std::process::exit(1);
        }
    };

    for i in 0..args.vehicles {
        let driver = RouteDriver::new(
            Id::create(&format!("p{i}")),
            Id::create("car"),
            route.clone(),
        );
        let vehicle =
            InternalVehicle::new(Id::create(&format!("v{i}")), 13.89, 1., Box::new(driver));
        controller.schedule_departure(sim_config.start_time + i as u32, vehicle);
    }

    let summary = controller.run();
    info!(
        "{} vehicles arrived, {} vehicles got stuck ({} stuck events). Last time step {}.",
        summary.arrived,
        summary.stuck,
        stuck.get(),
        summary.last_tick
    );
}
