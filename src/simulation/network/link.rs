use crate::simulation::agents::TransitStopResult;
use crate::simulation::config::VehicleQueueType;
use crate::simulation::controller::ThreadLocalComputationalEnvironment;
use crate::simulation::events::{
    LinkEnterEvent, LinkLeaveEvent, PersonStuckEvent, VehicleEntersTrafficEvent,
    VehicleLeavesTrafficEvent,
};
use crate::simulation::id::Id;
use crate::simulation::logging::WarnLimiter;
use crate::simulation::network::capacity::{
    self, CapacityError, CapacityFactors, LinkAttributes, LinkCapacities,
};
use crate::simulation::network::flow_cap::Flowcap;
use crate::simulation::network::holes::{HoleTracker, SpillbackModel};
use crate::simulation::network::signal::{SignalGate, SignalGroupState};
use crate::simulation::network::storage_cap::StorageCap;
use crate::simulation::network::vehicle_q::VehicleQueue;
use crate::simulation::network::{Link, Node};
use crate::simulation::snapshot::{LinkSnapshot, VehicleSnapshot};
use crate::simulation::vehicles::InternalVehicle;
use rand::Rng;
use std::collections::VecDeque;
use tracing::trace;

/// New values for time variant link attributes. Attributes which are `None` keep their value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkChange {
    pub free_speed: Option<f64>,
    /// vehicles per hour
    pub capacity: Option<f64>,
    pub lanes: Option<f64>,
    pub length: Option<f64>,
}

/// One directed road segment, modelled as a queue of travelling vehicles in front of an exit
/// buffer.
///
/// Vehicles enter the travelling part from upstream and leave it not before their earliest exit
/// time. They then move into the buffer, if flow capacity and buffer space allow. The node at the
/// downstream end takes vehicles out of the buffer. Departing vehicles wait in a waiting list and
/// enter the buffer directly.
#[derive(Debug)]
pub struct LinkQueue {
    pub id: Id<Link>,
    pub from: Id<Node>,
    pub to: Id<Node>,
    attributes: LinkAttributes,
    factors: CapacityFactors,
    capacities: LinkCapacities,
    queue: VehicleQueue,
    waiting_list: VecDeque<InternalVehicle>,
    buffer: VecDeque<InternalVehicle>,
    storage_cap: StorageCap,
    buffer_cap: StorageCap,
    flow_cap: Flowcap,
    signal: Option<SignalGate>,
    this_time_step_green: bool,
    spillback: SpillbackModel,
    buffer_last_moved_time: u32,
}

impl LinkQueue {
    pub fn from_link(
        link: &Link,
        factors: CapacityFactors,
        queue_type: VehicleQueueType,
        warnings: &mut WarnLimiter,
    ) -> Result<Self, CapacityError> {
        LinkQueue::new(
            link.id.clone(),
            link.from.clone(),
            link.to.clone(),
            LinkAttributes::from(link),
            factors,
            queue_type,
            warnings,
        )
    }

    pub fn new(
        id: Id<Link>,
        from: Id<Node>,
        to: Id<Node>,
        attributes: LinkAttributes,
        factors: CapacityFactors,
        queue_type: VehicleQueueType,
        warnings: &mut WarnLimiter,
    ) -> Result<Self, CapacityError> {
        let capacities = capacity::calculate(&id, &attributes, &factors, warnings)?;
        let spillback = match capacities.n_holes_max {
            Some(n_holes_max) => {
                SpillbackModel::Holes(HoleTracker::new(n_holes_max, attributes.length))
            }
            None => SpillbackModel::Queue,
        };

        Ok(LinkQueue {
            id,
            from,
            to,
            attributes,
            factors,
            capacities,
            queue: VehicleQueue::new(queue_type),
            waiting_list: VecDeque::new(),
            buffer: VecDeque::new(),
            storage_cap: StorageCap::new(capacities.storage_capacity),
            buffer_cap: StorageCap::new(capacities.buffer_storage_capacity),
            flow_cap: Flowcap::new(capacities.flow_capacity_per_time_step),
            signal: None,
            this_time_step_green: true,
            spillback,
            buffer_last_moved_time: 0,
        })
    }

    /// Resets the flow capacity for a new time step. Must be called once per time step before
    /// [`LinkQueue::advance_one_tick`].
    pub fn update_flow_capacity_credit(&mut self) {
        self.flow_cap
            .update(self.this_time_step_green, self.buffer.is_empty());
    }

    pub fn is_accepting_from_upstream(&self, now: u32) -> bool {
        self.storage_cap.is_available() && self.spillback.is_accepting(now)
    }

    /// Moves a vehicle coming from the upstream node onto the link. The caller must have checked
    /// [`LinkQueue::is_accepting_from_upstream`].
    pub fn admit_from_upstream(
        &mut self,
        mut vehicle: InternalVehicle,
        now: u32,
        comp_env: &mut ThreadLocalComputationalEnvironment,
    ) {
        assert!(
            self.storage_cap.is_available(),
            "Link {} has no storage capacity left, but vehicle {} was moved onto it.",
            self.id,
            vehicle.id
        );

        let vehicle_travel_time = self.attributes.length / vehicle.max_v;
        let travel_time = self
            .capacities
            .free_speed_travel_time
            .max(vehicle_travel_time);
        // saturates for vehicles which don't move at all
        vehicle.earliest_exit_time = (now as f64 + travel_time).floor() as u32;
        vehicle.curr_link = Some(self.id.clone());

        self.storage_cap.consume(vehicle.pce);
        let took_hole = self.spillback.on_enter();
        assert!(
            took_hole,
            "Link {} has no hole left, but vehicle {} was moved onto it.",
            self.id,
            vehicle.id
        );

        comp_env
            .events_publisher_borrow_mut()
            .publish_event(&LinkEnterEvent {
                time: now,
                link: self.id.clone(),
                vehicle: vehicle.id.clone(),
                driver: vehicle.driver_id().clone(),
            });

        self.queue.add(vehicle);
    }

    /// A vehicle starting its trip on this link. It waits until the buffer takes it.
    pub fn add_departing_vehicle(&mut self, mut vehicle: InternalVehicle) {
        vehicle.curr_link = Some(self.id.clone());
        self.waiting_list.push_back(vehicle);
    }

    /// Puts a transit vehicle back in front of all other travelling vehicles, so that it can serve
    /// another stop further down the link. The vehicle kept its storage and its hole while it was
    /// at the stop.
    pub fn add_transit_slightly_upstream_of_stop(&mut self, mut vehicle: InternalVehicle) {
        vehicle.curr_link = Some(self.id.clone());
        self.queue.add_first(vehicle);
    }

    /// Moves vehicles, which have reached the end of the link, into the buffer. Then departing
    /// vehicles from the waiting list follow. Both stop at the first vehicle the buffer can't take.
    ///
    /// Returns the vehicles that end their trip on this link.
    pub fn advance_one_tick(
        &mut self,
        now: u32,
        comp_env: &mut ThreadLocalComputationalEnvironment,
    ) -> Vec<InternalVehicle> {
        let mut arrived = self.move_queue_to_buffer(now, comp_env);
        arrived.append(&mut self.move_waiting_to_buffer(now, comp_env));

        for vehicle in &arrived {
            comp_env
                .events_publisher_borrow_mut()
                .publish_event(&VehicleLeavesTrafficEvent {
                    time: now,
                    vehicle: vehicle.id.clone(),
                    link: self.id.clone(),
                    driver: vehicle.driver_id().clone(),
                    mode: vehicle.mode().clone(),
                });
        }

        arrived
    }

    fn move_queue_to_buffer(
        &mut self,
        now: u32,
        comp_env: &mut ThreadLocalComputationalEnvironment,
    ) -> Vec<InternalVehicle> {
        let mut arrived = Vec::new();

        while let Some(vehicle) = self.queue.front() {
            if vehicle.earliest_exit_time > now {
                break;
            }

            match comp_env.handle_transit_stop(now, vehicle, &self.id) {
                TransitStopResult::Accepted => {
                    // still on the link: storage and hole stay taken
                    let vehicle = self
                        .queue
                        .pop()
                        .unwrap_or_else(|| panic!("The queue of link {} is empty.", self.id));
                    comp_env.accept_at_transit_stop(now, vehicle, &self.id);
                    continue;
                }
                TransitStopResult::Rehandle => continue,
                TransitStopResult::ContinueDriving => {}
            }

            if vehicle.driver().choose_next_link_id().is_none() {
                arrived.push(self.remove_from_queue(now, comp_env.rnd_mut()));
                continue;
            }

            // head of line blocking: nobody behind may pass
            if !self.has_flow_capacity_left_and_buffer_space() {
                break;
            }

            let vehicle = self.remove_from_queue(now, comp_env.rnd_mut());
            self.add_to_buffer(vehicle, now);
        }

        arrived
    }

    fn move_waiting_to_buffer(
        &mut self,
        now: u32,
        comp_env: &mut ThreadLocalComputationalEnvironment,
    ) -> Vec<InternalVehicle> {
        let mut arrived = Vec::new();

        while let Some(vehicle) = self.waiting_list.front() {
            let arrives = vehicle.driver().choose_next_link_id().is_none();
            if !arrives && !self.has_flow_capacity_left_and_buffer_space() {
                break;
            }

            let Some(vehicle) = self.waiting_list.pop_front() else {
                break;
            };
            comp_env
                .events_publisher_borrow_mut()
                .publish_event(&VehicleEntersTrafficEvent {
                    time: now,
                    vehicle: vehicle.id.clone(),
                    link: self.id.clone(),
                    driver: vehicle.driver_id().clone(),
                    mode: vehicle.mode().clone(),
                });

            if arrives {
                arrived.push(vehicle);
            } else {
                self.add_to_buffer(vehicle, now);
            }
        }

        arrived
    }

    fn has_flow_capacity_left_and_buffer_space(&self) -> bool {
        self.buffer_cap.is_available() && self.flow_cap.has_capacity_left()
    }

    fn add_to_buffer(&mut self, vehicle: InternalVehicle, now: u32) {
        self.flow_cap.consume(vehicle.pce, &self.id);
        self.buffer_cap.consume(vehicle.pce);
        self.buffer.push_back(vehicle);
        if self.buffer.len() == 1 {
            self.buffer_last_moved_time = now;
        }
    }

    fn remove_from_queue(&mut self, now: u32, rnd: &mut impl Rng) -> InternalVehicle {
        let vehicle = self
            .queue
            .pop()
            .unwrap_or_else(|| panic!("The queue of link {} is empty.", self.id));
        self.storage_cap.release(vehicle.pce);
        self.spillback.on_leave(now, rnd);
        vehicle
    }

    /// Takes the first vehicle out of the buffer. Called by the downstream node once it has
    /// decided the vehicle may leave.
    pub fn pop_first_vehicle(
        &mut self,
        now: u32,
        comp_env: &mut ThreadLocalComputationalEnvironment,
    ) -> InternalVehicle {
        let vehicle = self
            .buffer
            .pop_front()
            .unwrap_or_else(|| panic!("The buffer of link {} is empty.", self.id));
        self.buffer_cap.release(vehicle.pce);
        // the next vehicle in the buffer starts waiting now
        self.buffer_last_moved_time = now;

        comp_env
            .events_publisher_borrow_mut()
            .publish_event(&LinkLeaveEvent {
                time: now,
                link: self.id.clone(),
                vehicle: vehicle.id.clone(),
                driver: vehicle.driver_id().clone(),
            });
        vehicle
    }

    /// Removes all vehicles from the link and publishes a stuck event for each of them. Returns the
    /// number of removed vehicles.
    pub fn clear(&mut self, now: u32, comp_env: &mut ThreadLocalComputationalEnvironment) -> usize {
        let removed: Vec<_> = self
            .queue
            .drain()
            .into_iter()
            .chain(self.buffer.drain(..))
            .chain(self.waiting_list.drain(..))
            .collect();

        for vehicle in &removed {
            publish_stuck(vehicle, &self.id, now, comp_env);
        }

        self.storage_cap.reset();
        self.buffer_cap.reset();
        if let SpillbackModel::Holes(holes) = &mut self.spillback {
            holes.dimension(
                self.capacities.n_holes_max.unwrap_or_default(),
                self.attributes.length,
            );
        }

        if !removed.is_empty() {
            trace!(link = %self.id, removed = removed.len(), "Cleared link");
        }
        removed.len()
    }

    /// Derives the capacities from the current attributes again. Must be called whenever an
    /// attribute changes.
    pub fn recalc_time_variant_attributes(
        &mut self,
        now: u32,
        warnings: &mut WarnLimiter,
    ) -> Result<(), CapacityError> {
        let capacities = capacity::calculate(&self.id, &self.attributes, &self.factors, warnings)?;
        self.flow_cap
            .set_capacity_per_time_step(capacities.flow_capacity_per_time_step);
        self.storage_cap.set_max(capacities.storage_capacity);
        self.buffer_cap.set_max(capacities.buffer_storage_capacity);

        if let (SpillbackModel::Holes(holes), Some(n_holes_max)) =
            (&mut self.spillback, capacities.n_holes_max)
        {
            // vehicles on the link hold on to their holes
            holes.dimension(
                n_holes_max.saturating_sub(self.queue.len()),
                self.attributes.length,
            );
        }

        trace!(link = %self.id, now, ?capacities, "Recalculated capacities");
        self.capacities = capacities;
        Ok(())
    }

    pub fn change_attributes(
        &mut self,
        now: u32,
        change: &LinkChange,
        warnings: &mut WarnLimiter,
    ) -> Result<(), CapacityError> {
        if let Some(free_speed) = change.free_speed {
            self.attributes.free_speed = free_speed;
        }
        if let Some(capacity) = change.capacity {
            self.attributes.capacity_h = capacity;
        }
        if let Some(lanes) = change.lanes {
            self.attributes.lanes = lanes;
        }
        if let Some(length) = change.length {
            self.attributes.length = length;
        }
        self.recalc_time_variant_attributes(now, warnings)
    }

    /// Makes this link signalized. All turning moves start green.
    pub fn set_signalized(&mut self, to_links: &[Id<Link>]) {
        self.signal = Some(SignalGate::new(to_links));
        self.this_time_step_green = true;
    }

    pub fn set_signal_state_all_turning_moves(&mut self, state: SignalGroupState) {
        let signal = self.signal_mut();
        signal.set_state_all_turning_moves(state);
        let green = signal.is_link_green();
        self.this_time_step_green = green;
    }

    /// Panics if `to_link` can't be reached over the downstream node.
    pub fn set_signal_state_for_turning_move(&mut self, state: SignalGroupState, to_link: &Id<Link>) {
        let signal = self.signal_mut();
        signal.set_state_for_turning_move(state, to_link);
        // the link counts as green as soon as one turning move is green
        let green = signal.is_link_green();
        self.this_time_step_green = green;
    }

    fn signal_mut(&mut self) -> &mut SignalGate {
        let id = &self.id;
        self.signal
            .as_mut()
            .unwrap_or_else(|| panic!("Link {id} is not signalized."))
    }

    /// Links without signal are always green.
    pub fn has_green_for_to_link(&self, to_link: &Id<Link>) -> bool {
        self.signal
            .as_ref()
            .is_none_or(|s| s.is_green_for_to_link(to_link))
    }

    pub fn is_signalized(&self) -> bool {
        self.signal.is_some()
    }

    /// The link needs to be simulated in the next time step, because it holds vehicles or its flow
    /// capacity is still accumulating.
    pub fn is_active(&self) -> bool {
        !self.flow_cap.is_saturated()
            || !self.queue.is_empty()
            || !self.buffer.is_empty()
            || !self.waiting_list.is_empty()
    }

    pub fn is_offering_vehicle(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn first_vehicle(&self) -> Option<&InternalVehicle> {
        self.buffer.front()
    }

    pub fn last_movement_time_of_first_vehicle(&self) -> u32 {
        self.buffer_last_moved_time
    }

    pub fn veh_in_queue_count(&self) -> usize {
        self.queue.len()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn waiting_list_len(&self) -> usize {
        self.waiting_list.len()
    }

    pub fn veh_count(&self) -> usize {
        self.queue.len() + self.buffer.len() + self.waiting_list.len()
    }

    pub fn used_storage(&self) -> f64 {
        self.storage_cap.used()
    }

    pub fn storage_capacity(&self) -> f64 {
        self.storage_cap.max()
    }

    pub fn used_buffer_storage(&self) -> f64 {
        self.buffer_cap.used()
    }

    pub fn buffer_storage_capacity(&self) -> f64 {
        self.buffer_cap.max()
    }

    pub fn flow_capacity_per_time_step(&self) -> f64 {
        self.flow_cap.capacity_per_time_step()
    }

    pub fn flow_cap(&self) -> &Flowcap {
        &self.flow_cap
    }

    pub fn free_speed_travel_time(&self) -> f64 {
        self.capacities.free_speed_travel_time
    }

    pub fn attributes(&self) -> &LinkAttributes {
        &self.attributes
    }

    pub fn holes(&self) -> Option<&HoleTracker> {
        self.spillback.holes()
    }

    /// Vehicles in the travelling part and in the buffer.
    pub fn get_vehicle(&self, id: &Id<InternalVehicle>) -> Option<&InternalVehicle> {
        self.all_vehicles().find(|v| &v.id == id)
    }

    /// Vehicles in the travelling part and in the buffer. Departing vehicles are not yet on the
    /// link.
    pub fn all_vehicles(&self) -> impl Iterator<Item = &InternalVehicle> {
        self.queue.iter().chain(self.buffer.iter())
    }

    /// Positions of all vehicles on the link. Buffer vehicles stand at the end of the link. The
    /// others are placed according to their remaining travel time, but never closer than the
    /// spacing the storage capacity allows.
    pub fn snapshot(&self, now: u32) -> LinkSnapshot {
        let length = self.attributes.length;
        let count = self.queue.len() + self.buffer.len();
        let spacing = length / self.storage_cap.max().max(count as f64).max(1.);
        let fftt = self.capacities.free_speed_travel_time;

        let mut vehicles = Vec::with_capacity(count);
        let mut last_distance = f64::INFINITY;
        for (vehicle, in_buffer) in self
            .buffer
            .iter()
            .map(|v| (v, true))
            .chain(self.queue.iter().map(|v| (v, false)))
        {
            let free_flow_distance = if in_buffer || fftt <= 0. {
                length
            } else {
                let remaining = vehicle.earliest_exit_time.saturating_sub(now) as f64;
                length * (1. - remaining / fftt)
            };
            let distance = free_flow_distance
                .min(last_distance - spacing)
                .clamp(0., length);
            last_distance = distance;

            vehicles.push(VehicleSnapshot {
                vehicle: vehicle.id.clone(),
                driver: vehicle.driver_id().clone(),
                distance_from_from_node: distance,
                in_buffer,
            });
        }

        LinkSnapshot {
            id: self.id.clone(),
            used_storage: self.storage_cap.used(),
            storage_capacity: self.storage_cap.max(),
            buffer_len: self.buffer.len(),
            vehicles,
        }
    }
}

pub(super) fn publish_stuck(
    vehicle: &InternalVehicle,
    link: &Id<Link>,
    now: u32,
    comp_env: &mut ThreadLocalComputationalEnvironment,
) {
    comp_env
        .events_publisher_borrow_mut()
        .publish_event(&PersonStuckEvent {
            time: now,
            person: vehicle.driver_id().clone(),
            link: link.clone(),
            vehicle: vehicle.id.clone(),
            mode: vehicle.mode().clone(),
        });
}
