use crate::simulation::config::VehicleQueueType;
use crate::simulation::vehicles::InternalVehicle;
use itertools::{Either, Itertools};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

/// The travelling part of a link.
///
/// `Fifo` keeps vehicles in the order they entered, so a slow vehicle holds up everyone behind
/// it. `Passing` orders vehicles by earliest exit time and by entering order within the same
/// time, which lets fast vehicles overtake slow ones.
#[derive(Debug)]
pub enum VehicleQueue {
    Fifo(VecDeque<InternalVehicle>),
    Passing(PassingQueue),
}

impl VehicleQueue {
    pub fn new(queue_type: VehicleQueueType) -> Self {
        match queue_type {
            VehicleQueueType::Fifo => VehicleQueue::Fifo(VecDeque::new()),
            VehicleQueueType::Passing => VehicleQueue::Passing(PassingQueue::default()),
        }
    }

    pub fn add(&mut self, vehicle: InternalVehicle) {
        match self {
            VehicleQueue::Fifo(q) => q.push_back(vehicle),
            VehicleQueue::Passing(q) => q.add(vehicle),
        }
    }

    /// Puts the vehicle in front of all others.
    pub fn add_first(&mut self, vehicle: InternalVehicle) {
        match self {
            VehicleQueue::Fifo(q) => q.push_front(vehicle),
            VehicleQueue::Passing(q) => q.add_first(vehicle),
        }
    }

    pub fn front(&self) -> Option<&InternalVehicle> {
        match self {
            VehicleQueue::Fifo(q) => q.front(),
            VehicleQueue::Passing(q) => q.q.peek().map(|e| &e.vehicle),
        }
    }

    pub fn pop(&mut self) -> Option<InternalVehicle> {
        match self {
            VehicleQueue::Fifo(q) => q.pop_front(),
            VehicleQueue::Passing(q) => q.q.pop().map(|e| e.vehicle),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            VehicleQueue::Fifo(q) => q.len(),
            VehicleQueue::Passing(q) => q.q.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates the vehicles in the order they will leave the queue.
    pub fn iter(&self) -> impl Iterator<Item = &InternalVehicle> {
        match self {
            VehicleQueue::Fifo(q) => Either::Left(q.iter()),
            VehicleQueue::Passing(q) => Either::Right(
                q.q.iter()
                    .sorted_by(|a, b| b.cmp(a))
                    .map(|e| &e.vehicle),
            ),
        }
    }

    /// Removes all vehicles, in the order they would have left the queue.
    pub fn drain(&mut self) -> Vec<InternalVehicle> {
        let mut result = Vec::with_capacity(self.len());
        while let Some(vehicle) = self.pop() {
            result.push(vehicle);
        }
        result
    }
}

#[derive(Debug, Default)]
pub struct PassingQueue {
    q: BinaryHeap<Entry>,
    counter: i64,
    first_counter: i64,
}

impl PassingQueue {
    fn add(&mut self, vehicle: InternalVehicle) {
        self.counter += 1;
        self.q.push(Entry {
            exit_time: vehicle.earliest_exit_time,
            order: self.counter,
            vehicle,
        });
    }

    fn add_first(&mut self, vehicle: InternalVehicle) {
        self.first_counter -= 1;
        self.q.push(Entry {
            exit_time: 0,
            order: self.first_counter,
            vehicle,
        });
    }
}

#[derive(Debug)]
struct Entry {
    exit_time: u32,
    order: i64,
    vehicle: InternalVehicle,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed, so that the max heap pops the earliest exit time, first come first within
        // the same time
        other
            .exit_time
            .cmp(&self.exit_time)
            .then_with(|| other.order.cmp(&self.order))
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::config::VehicleQueueType;
    use crate::simulation::id::Id;
    use crate::simulation::network::vehicle_q::VehicleQueue;
    use crate::simulation::vehicles::InternalVehicle;
    use crate::test_utils::create_vehicle;
    use macros::integration_test;

    fn vehicle(id: &str, exit_time: u32) -> InternalVehicle {
        let mut vehicle = create_vehicle(id, vec!["l1", "l2"]);
        vehicle.earliest_exit_time = exit_time;
        vehicle
    }

    fn ids(q: &VehicleQueue) -> Vec<String> {
        q.iter().map(|v| v.id.external().to_string()).collect()
    }

    #[integration_test]
    fn fifo_keeps_entering_order() {
        let mut q = VehicleQueue::new(VehicleQueueType::Fifo);
        q.add(vehicle("slow", 20));
        q.add(vehicle("fast", 10));

        assert_eq!(vec!["slow", "fast"], ids(&q));
        assert_eq!(Id::create("slow"), q.pop().unwrap().id);
    }

    #[integration_test]
    fn passing_orders_by_exit_time() {
        let mut q = VehicleQueue::new(VehicleQueueType::Passing);
        q.add(vehicle("slow", 20));
        q.add(vehicle("fast", 10));
        q.add(vehicle("fast-2", 10));

        assert_eq!(vec!["fast", "fast-2", "slow"], ids(&q));
        assert_eq!(10, q.front().unwrap().earliest_exit_time);
        let order: Vec<_> = q
            .drain()
            .into_iter()
            .map(|v| v.id.external().to_string())
            .collect();
        assert_eq!(vec!["fast", "fast-2", "slow"], order);
        assert!(q.is_empty());
    }

    #[integration_test]
    fn add_first_goes_to_head() {
        for queue_type in [VehicleQueueType::Fifo, VehicleQueueType::Passing] {
            let mut q = VehicleQueue::new(queue_type);
            q.add(vehicle("a", 5));
            q.add_first(vehicle("bus", 30));
            q.add_first(vehicle("bus-2", 30));

            assert_eq!(vec!["bus-2", "bus", "a"], ids(&q), "{queue_type:?}");
            assert_eq!(Id::<InternalVehicle>::create("bus-2"), q.pop().unwrap().id);
        }
    }
}
