use super::link::{publish_stuck, LinkChange, LinkQueue};
use super::{Link, Network, Node};
use crate::simulation::config;
use crate::simulation::controller::ThreadLocalComputationalEnvironment;
use crate::simulation::id::Id;
use crate::simulation::logging::WarnLimiter;
use crate::simulation::network::capacity::{CapacityError, CapacityFactors};
use crate::simulation::network::signal::SignalGroupState;
use crate::simulation::snapshot::NetworkSnapshot;
use crate::simulation::vehicles::InternalVehicle;
use nohash_hasher::IntMap;
use rand::Rng;
use std::collections::BTreeSet;
use tracing::{debug, instrument};

/// Ids of links or nodes which need to be simulated. Ordered, so that links and nodes are always
/// processed in the same order and runs can be reproduced.
#[derive(Debug)]
struct ActiveCache<C> {
    active: BTreeSet<Id<C>>,
}

impl<C> Default for ActiveCache<C> {
    fn default() -> Self {
        ActiveCache {
            active: BTreeSet::new(),
        }
    }
}

impl<C> ActiveCache<C> {
    fn activate(&mut self, id: Id<C>) -> bool {
        self.active.insert(id)
    }

    fn deactivate(&mut self, id: &Id<C>) -> bool {
        self.active.remove(id)
    }

    fn len(&self) -> usize {
        self.active.len()
    }

    fn contains(&self, id: &Id<C>) -> bool {
        self.active.contains(id)
    }

    fn clear(&mut self) {
        self.active.clear()
    }
}

impl<'a, C> IntoIterator for &'a ActiveCache<C> {
    type Item = &'a Id<C>;
    type IntoIter = std::collections::btree_set::Iter<'a, Id<C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.active.iter()
    }
}

#[derive(Debug)]
pub struct SimNode {
    pub id: Id<Node>,
    pub in_links: Vec<Id<Link>>,
    pub out_links: Vec<Id<Link>>,
}

/// Moves vehicles through the network. Each time step, nodes move vehicles from the buffers of
/// their in-links onto the next links, then links move vehicles from their travelling part into
/// their buffers. Only active links and nodes are simulated.
#[derive(Debug)]
pub struct SimNetwork {
    pub nodes: IntMap<Id<Node>, SimNode>,
    // use int map as hash map variant with stable order
    pub links: IntMap<Id<Link>, LinkQueue>,
    active_nodes: ActiveCache<Node>,
    active_links: ActiveCache<Link>,
    stuck_time: u32,
    remove_stuck_vehicles: bool,
}

impl SimNetwork {
    pub fn from_network(
        network: &Network,
        config: &config::Simulation,
        warnings: &mut WarnLimiter,
    ) -> Result<Self, CapacityError> {
        let factors = CapacityFactors::from_config(config, network.effective_cell_size);

        let links = network
            .links()
            .iter()
            .map(|link| {
                LinkQueue::from_link(link, factors, config.vehicle_queue, warnings)
                    .map(|queue| (link.id.clone(), queue))
            })
            .collect::<Result<IntMap<_, _>, _>>()?;

        let nodes = network
            .nodes()
            .iter()
            .map(|node| {
                (
                    node.id.clone(),
                    SimNode {
                        id: node.id.clone(),
                        in_links: node.in_links.clone(),
                        out_links: node.out_links.clone(),
                    },
                )
            })
            .collect();

        debug!(
            links = network.links().len(),
            nodes = network.nodes().len(),
            "Created simulation network"
        );

        Ok(SimNetwork {
            nodes,
            links,
            active_nodes: ActiveCache::default(),
            active_links: ActiveCache::default(),
            stuck_time: config.stuck_time,
            remove_stuck_vehicles: config.remove_stuck_vehicles,
        })
    }

    pub fn active_nodes(&self) -> usize {
        self.active_nodes.len()
    }

    pub fn active_links(&self) -> usize {
        self.active_links.len()
    }

    pub fn is_link_active(&self, id: &Id<Link>) -> bool {
        self.active_links.contains(id)
    }

    pub fn is_node_active(&self, id: &Id<Node>) -> bool {
        self.active_nodes.contains(id)
    }

    /// Vehicles on links, including departing vehicles waiting to enter traffic. Links holding
    /// vehicles are always active.
    pub fn veh_on_net(&self) -> usize {
        self.active_links
            .into_iter()
            .map(|id| self.get_link(id).veh_count())
            .sum()
    }

    pub fn get_link(&self, id: &Id<Link>) -> &LinkQueue {
        self.links
            .get(id)
            .unwrap_or_else(|| panic!("Link {id} is not part of the simulation network."))
    }

    fn get_link_mut(&mut self, id: &Id<Link>) -> &mut LinkQueue {
        self.links
            .get_mut(id)
            .unwrap_or_else(|| panic!("Link {id} is not part of the simulation network."))
    }

    /// Puts a departing vehicle onto the waiting list of the link its driver is on.
    pub fn send_veh_en_route(&mut self, vehicle: InternalVehicle) {
        let link_id = vehicle.driver().curr_link_id().clone();
        self.get_link_mut(&link_id).add_departing_vehicle(vehicle);
        self.active_links.activate(link_id);
    }

    /// Puts a transit vehicle, which served a stop on the link, back onto it.
    pub fn add_transit_slightly_upstream_of_stop(
        &mut self,
        link_id: &Id<Link>,
        vehicle: InternalVehicle,
    ) {
        self.get_link_mut(link_id)
            .add_transit_slightly_upstream_of_stop(vehicle);
        self.active_links.activate(link_id.clone());
    }

    /// Returns the vehicles which arrived at the end of their trip.
    #[instrument(level = "trace", skip(self, comp_env))]
    pub fn move_links(
        &mut self,
        now: u32,
        comp_env: &mut ThreadLocalComputationalEnvironment,
    ) -> Vec<InternalVehicle> {
        let mut arrived = Vec::new();
        let mut deactivate = Vec::new();

        for id in &self.active_links {
            let link = self
                .links
                .get_mut(id)
                .unwrap_or_else(|| panic!("Active link {id} is not part of the network."));
            link.update_flow_capacity_credit();
            arrived.append(&mut link.advance_one_tick(now, comp_env));

            if link.is_offering_vehicle() {
                self.active_nodes.activate(link.to.clone());
            }
            if !link.is_active() {
                deactivate.push(id.clone());
            }
        }

        for id in deactivate {
            self.active_links.deactivate(&id);
        }

        arrived
    }

    /// Returns the number of vehicles removed because they were stuck.
    #[instrument(level = "trace", skip(self, comp_env))]
    pub fn move_nodes(
        &mut self,
        now: u32,
        comp_env: &mut ThreadLocalComputationalEnvironment,
    ) -> usize {
        let node_ids: Vec<_> = self.active_nodes.into_iter().cloned().collect();
        let mut stuck = 0;

        for node_id in node_ids {
            let in_links = self.offering_in_links(&node_id);
            let ordered = Self::capacity_weighted_order(in_links, &self.links, comp_env.rnd_mut());
            for in_link in &ordered {
                stuck += self.move_vehicles_over_node(in_link, now, comp_env);
            }

            // the node stays active while vehicles wait in front of it
            if !ordered.iter().any(|id| self.get_link(id).is_offering_vehicle()) {
                self.active_nodes.deactivate(&node_id);
            }
        }

        stuck
    }

    fn offering_in_links(&self, node_id: &Id<Node>) -> Vec<Id<Link>> {
        let node = self
            .nodes
            .get(node_id)
            .unwrap_or_else(|| panic!("Active node {node_id} is not part of the network."));
        node.in_links
            .iter()
            .filter(|id| self.get_link(id).is_offering_vehicle())
            .cloned()
            .collect()
    }

    /// Orders the in-links randomly. The larger the flow capacity of a link, the more likely it is
    /// served early.
    fn capacity_weighted_order(
        mut candidates: Vec<Id<Link>>,
        links: &IntMap<Id<Link>, LinkQueue>,
        rnd: &mut impl Rng,
    ) -> Vec<Id<Link>> {
        let capacity = |id: &Id<Link>| {
            links
                .get(id)
                .map_or(0., |l| l.flow_capacity_per_time_step())
        };
        let mut ordered = Vec::with_capacity(candidates.len());

        while !candidates.is_empty() {
            let total: f64 = candidates.iter().map(capacity).sum();
            let rnd_num = rnd.random::<f64>() * total;

            let mut selected_cap = 0.;
            let selected = candidates
                .iter()
                .position(|id| {
                    selected_cap += capacity(id);
                    selected_cap >= rnd_num
                })
                .unwrap_or(candidates.len() - 1);
            ordered.push(candidates.remove(selected));
        }

        ordered
    }

    /// Moves vehicles from the buffer of `in_link_id` onto their next links, until the first
    /// vehicle can't move. Vehicles waiting longer than the stuck time are removed, if configured.
    fn move_vehicles_over_node(
        &mut self,
        in_link_id: &Id<Link>,
        now: u32,
        comp_env: &mut ThreadLocalComputationalEnvironment,
    ) -> usize {
        let mut stuck = 0;

        loop {
            let next_link = {
                let in_link = self.get_link(in_link_id);
                let Some(vehicle) = in_link.first_vehicle() else {
                    break;
                };
                let next_id = vehicle.driver().choose_next_link_id().unwrap_or_else(|| {
                    panic!(
                        "Vehicle {} is in the buffer of link {in_link_id} but has no next link.",
                        vehicle.id
                    )
                });
                if !in_link.has_green_for_to_link(next_id) {
                    break;
                }

                let next_link = self.links.get(next_id).unwrap_or_else(|| {
                    panic!(
                        "Link {next_id} on the route of vehicle {} is not part of the network.",
                        vehicle.id
                    )
                });
                if next_link.is_accepting_from_upstream(now) {
                    Some(next_id.clone())
                } else if self.is_stuck(in_link, now) {
                    None
                } else {
                    break;
                }
            };

            let mut vehicle = self.get_link_mut(in_link_id).pop_first_vehicle(now, comp_env);
            match next_link {
                Some(next_id) => {
                    vehicle.driver_mut().notify_move_over_node(&next_id);
                    self.get_link_mut(&next_id)
                        .admit_from_upstream(vehicle, now, comp_env);
                    self.active_links.activate(next_id);
                }
                None => {
                    debug!(vehicle = %vehicle.id, link = %in_link_id, now, "Removing stuck vehicle");
                    publish_stuck(&vehicle, in_link_id, now, comp_env);
                    stuck += 1;
                }
            }
        }

        stuck
    }

    fn is_stuck(&self, in_link: &LinkQueue, now: u32) -> bool {
        self.remove_stuck_vehicles
            && now.saturating_sub(in_link.last_movement_time_of_first_vehicle()) >= self.stuck_time
    }

    /// Changes time variant attributes of a link. The new attributes must yield valid capacities.
    pub fn apply_change(
        &mut self,
        now: u32,
        link_id: &Id<Link>,
        change: &LinkChange,
        comp_env: &mut ThreadLocalComputationalEnvironment,
    ) {
        let link = self.get_link_mut(link_id);
        if let Err(e) = link.change_attributes(now, change, comp_env.warnings_mut()) {
            panic!("Could not apply change to link {link_id} at {now}: {e}");
        }
        // accumulation may start again with a new capacity
        self.active_links.activate(link_id.clone());
    }

    /// Signalizes `link_id` with one turning move per out-link of its downstream node.
    pub fn set_signalized(&mut self, link_id: &Id<Link>) {
        let to = self.get_link(link_id).to.clone();
        let out_links = self
            .nodes
            .get(&to)
            .map(|n| n.out_links.clone())
            .unwrap_or_default();
        self.get_link_mut(link_id).set_signalized(&out_links);
    }

    pub fn set_signal_state_all_turning_moves(&mut self, link_id: &Id<Link>, state: SignalGroupState) {
        self.get_link_mut(link_id)
            .set_signal_state_all_turning_moves(state);
        self.active_links.activate(link_id.clone());
    }

    pub fn set_signal_state_for_turning_move(
        &mut self,
        link_id: &Id<Link>,
        state: SignalGroupState,
        to_link: &Id<Link>,
    ) {
        self.get_link_mut(link_id)
            .set_signal_state_for_turning_move(state, to_link);
        self.active_links.activate(link_id.clone());
    }

    /// Removes all vehicles from the network. Returns the number of removed vehicles.
    pub fn clear(&mut self, now: u32, comp_env: &mut ThreadLocalComputationalEnvironment) -> usize {
        let mut removed = 0;
        for id in &self.active_links {
            if let Some(link) = self.links.get_mut(id) {
                removed += link.clear(now, comp_env);
            }
        }
        self.active_links.clear();
        self.active_nodes.clear();
        removed
    }

    /// Positions of all vehicles on the network.
    pub fn snapshot(&self, now: u32) -> NetworkSnapshot {
        let links = self
            .active_links
            .into_iter()
            .map(|id| self.get_link(id))
            .filter(|link| link.veh_in_queue_count() + link.buffer_len() > 0)
            .map(|link| link.snapshot(now))
            .collect();
        NetworkSnapshot { time: now, links }
    }
}

#[cfg(test)]
mod tests {
    use super::SimNetwork;
    use crate::simulation::config;
    use crate::simulation::controller::ThreadLocalComputationalEnvironment;
    use crate::simulation::events::utils::EventsCollector;
    use crate::simulation::events::{LinkEnterEvent, LinkLeaveEvent, PersonStuckEvent};
    use crate::simulation::id::Id;
    use crate::simulation::network::link::LinkChange;
    use crate::simulation::network::signal::SignalGroupState;
    use crate::simulation::network::{Link, Network};
    use crate::simulation::random::create_rnd;
    use crate::test_utils::{create_vehicle, three_link_network, two_into_one_network};
    use assert_approx_eq::assert_approx_eq;
    use macros::integration_test;

    fn sim_network(network: &Network, config: &config::Simulation) -> SimNetwork {
        let mut env = ThreadLocalComputationalEnvironment::default();
        SimNetwork::from_network(network, config, env.warnings_mut()).unwrap()
    }

    #[integration_test]
    fn from_network() {
        let network = three_link_network();
        let sim_net = sim_network(&network, &config::Simulation::default());

        assert_eq!(4, sim_net.nodes.len());
        assert_eq!(3, sim_net.links.len());
        assert_eq!(0, sim_net.active_links());
        assert_eq!(0, sim_net.veh_on_net());
    }

    #[integration_test]
    fn vehicle_travels() {
        let mut env = ThreadLocalComputationalEnvironment::default();
        let collector = EventsCollector::register(&mut env.events_publisher_borrow_mut());
        let network = three_link_network();
        let mut sim_net = sim_network(&network, &config::Simulation::default());

        sim_net.send_veh_en_route(create_vehicle("v1", vec!["link1", "link2", "link3"]));
        assert_eq!(1, sim_net.veh_on_net());

        let mut arrival = None;
        for now in 0..200 {
            sim_net.move_nodes(now, &mut env);
            let arrived = sim_net.move_links(now, &mut env);
            if !arrived.is_empty() {
                arrival = Some(now);
                assert_eq!(Some(Id::create("link3")), arrived[0].curr_link);
                break;
            }
        }

        // buffer of link1 at 0, link2 from 1 to 101, link3 from 102 to 112
        assert_eq!(Some(112), arrival);
        assert_eq!(0, sim_net.veh_on_net());
        assert_eq!(2, collector.count(LinkEnterEvent::TYPE));
        assert_eq!(2, collector.count(LinkLeaveEvent::TYPE));
        let enter_times: Vec<_> = collector
            .of_type(LinkEnterEvent::TYPE)
            .iter()
            .map(|e| e.time)
            .collect();
        assert_eq!(vec![1, 102], enter_times);
    }

    #[integration_test]
    fn links_deactivate() {
        let mut env = ThreadLocalComputationalEnvironment::default();
        let network = three_link_network();
        let mut sim_net = sim_network(&network, &config::Simulation::default());

        sim_net.send_veh_en_route(create_vehicle("v1", vec!["link1", "link2"]));
        sim_net.move_nodes(0, &mut env);
        sim_net.move_links(0, &mut env);
        assert_eq!(1, sim_net.active_nodes());

        sim_net.move_nodes(1, &mut env);
        assert!(sim_net.is_link_active(&Id::create("link2")));
        sim_net.move_links(1, &mut env);
        assert_eq!(0, sim_net.active_nodes());
        // link1 is empty and has an integer capacity
        assert!(!sim_net.is_link_active(&Id::create("link1")));
        assert_eq!(1, sim_net.active_links());
    }

    /// link2 holds 1 vehicle in its queue and 1 in its buffer. The buffer is blocked by a red
    /// light, so a third vehicle can't leave link1.
    fn blocked_corridor(
        config: &config::Simulation,
        env: &mut ThreadLocalComputationalEnvironment,
    ) -> SimNetwork {
        let network = three_link_network();
        let mut sim_net = sim_network(&network, config);
        let link2 = Id::create("link2");
        sim_net.apply_change(
            0,
            &link2,
            &LinkChange {
                length: Some(7.5),
                ..LinkChange::default()
            },
            env,
        );
        sim_net.set_signalized(&link2);
        sim_net.set_signal_state_all_turning_moves(&link2, SignalGroupState::Red);

        for id in ["blocker-1", "blocker-2", "waiting"] {
            sim_net.send_veh_en_route(create_vehicle(id, vec!["link1", "link2", "link3"]));
        }
        sim_net
    }

    #[integration_test]
    fn stuck_vehicle_removed() {
        let mut env = ThreadLocalComputationalEnvironment::default();
        let collector = EventsCollector::register(&mut env.events_publisher_borrow_mut());
        let config = config::Simulation {
            stuck_time: 5,
            ..config::Simulation::default()
        };
        let mut sim_net = blocked_corridor(&config, &mut env);

        let mut stuck = 0;
        for now in 0..20 {
            stuck += sim_net.move_nodes(now, &mut env);
            sim_net.move_links(now, &mut env);
            let link2 = sim_net.get_link(&Id::create("link2"));
            assert!(link2.used_storage() <= link2.storage_capacity());
        }

        assert_eq!(1, stuck);
        let stuck_events = collector.of_type(PersonStuckEvent::TYPE);
        assert_eq!(1, stuck_events.len());
        assert_eq!("waiting", stuck_events[0].vehicle);
        assert_eq!("link1", stuck_events[0].link);
        // first in the buffer since 2
        assert_eq!(7, stuck_events[0].time);
        assert_eq!(2, sim_net.veh_on_net());
    }

    #[integration_test]
    fn stuck_vehicle_kept() {
        let mut env = ThreadLocalComputationalEnvironment::default();
        let config = config::Simulation {
            stuck_time: 5,
            remove_stuck_vehicles: false,
            ..config::Simulation::default()
        };
        let mut sim_net = blocked_corridor(&config, &mut env);

        let mut stuck = 0;
        for now in 0..20 {
            stuck += sim_net.move_nodes(now, &mut env);
            sim_net.move_links(now, &mut env);
        }

        assert_eq!(0, stuck);
        assert_eq!(3, sim_net.veh_on_net());
        assert_eq!(1, sim_net.get_link(&Id::create("link1")).buffer_len());
        assert!(sim_net.is_node_active(&Id::create("node2")));
    }

    #[integration_test]
    fn red_light_holds_vehicles() {
        let mut env = ThreadLocalComputationalEnvironment::default();
        let network = three_link_network();
        let mut sim_net = sim_network(&network, &config::Simulation::default());
        let link1 = Id::create("link1");
        sim_net.set_signalized(&link1);
        sim_net.set_signal_state_for_turning_move(&link1, SignalGroupState::Red, &Id::create("link2"));

        sim_net.send_veh_en_route(create_vehicle("v1", vec!["link1", "link2"]));
        for now in 0..10 {
            sim_net.move_nodes(now, &mut env);
            sim_net.move_links(now, &mut env);
        }
        assert_eq!(1, sim_net.get_link(&link1).buffer_len());

        sim_net.set_signal_state_all_turning_moves(&link1, SignalGroupState::Green);
        sim_net.move_nodes(10, &mut env);
        assert_eq!(0, sim_net.get_link(&link1).buffer_len());
        assert_eq!(1, sim_net.get_link(&Id::create("link2")).veh_in_queue_count());
    }

    #[integration_test]
    fn capacity_weighted_order_prefers_large_links() {
        let network = two_into_one_network(3600., 360.);
        let sim_net = sim_network(&network, &config::Simulation::default());
        let big: Id<Link> = Id::create("big");
        let mut rnd = create_rnd(42);

        let mut big_first = 0;
        for _ in 0..1000 {
            let order = SimNetwork::capacity_weighted_order(
                vec![Id::create("small"), big.clone()],
                &sim_net.links,
                &mut rnd,
            );
            assert_eq!(2, order.len());
            if order[0] == big {
                big_first += 1;
            }
        }
        // 10 / 11 of the draws
        assert_approx_eq!(909., big_first as f64, 50.);
    }

    #[integration_test]
    fn merge_respects_downstream_storage() {
        let mut env = ThreadLocalComputationalEnvironment::default();
        let network = two_into_one_network(3600., 3600.);
        let mut sim_net = sim_network(&network, &config::Simulation::default());

        for i in 0..20 {
            sim_net.send_veh_en_route(create_vehicle(&format!("b{i}"), vec!["big", "out"]));
            sim_net.send_veh_en_route(create_vehicle(&format!("s{i}"), vec!["small", "out"]));
        }
        let mut arrived = 0;
        for now in 0..30 {
            sim_net.move_nodes(now, &mut env);
            arrived += sim_net.move_links(now, &mut env).len();
            let out = sim_net.get_link(&Id::create("out"));
            assert!(out.used_storage() <= out.storage_capacity(), "{now}");
        }
        assert!(arrived > 0);
        assert_eq!(40, arrived + sim_net.veh_on_net());
    }

    #[integration_test]
    fn clear_removes_everything() {
        let mut env = ThreadLocalComputationalEnvironment::default();
        let collector = EventsCollector::register(&mut env.events_publisher_borrow_mut());
        let network = three_link_network();
        let mut sim_net = sim_network(&network, &config::Simulation::default());

        for i in 0..3 {
            sim_net.send_veh_en_route(create_vehicle(&format!("v{i}"), vec!["link1", "link2"]));
        }
        for now in 0..5 {
            sim_net.move_nodes(now, &mut env);
            sim_net.move_links(now, &mut env);
        }

        assert_eq!(3, sim_net.clear(5, &mut env));
        assert_eq!(3, collector.count(PersonStuckEvent::TYPE));
        assert_eq!(0, sim_net.veh_on_net());
        assert_eq!(0, sim_net.active_links());
    }

    #[integration_test]
    fn snapshot_contains_vehicles() {
        let mut env = ThreadLocalComputationalEnvironment::default();
        let network = three_link_network();
        let mut sim_net = sim_network(&network, &config::Simulation::default());
        sim_net.send_veh_en_route(create_vehicle("v1", vec!["link1", "link2"]));
        for now in 0..3 {
            sim_net.move_nodes(now, &mut env);
            sim_net.move_links(now, &mut env);
        }

        let snapshot = sim_net.snapshot(2);
        assert_eq!(2, snapshot.time);
        assert_eq!(1, snapshot.vehicle_count());
        let link2 = snapshot.link(&Id::create("link2")).unwrap();
        assert!(!link2.vehicles[0].in_buffer);
    }
}
