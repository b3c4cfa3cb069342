use crate::simulation::network::capacity::hole_travel_time;
use rand::Rng;
use std::collections::VecDeque;

/// Space one vehicle frees at the downstream end of a link. It becomes usable for vehicles
/// entering the link at `earliest_exit_time`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hole {
    pub earliest_exit_time: f64,
}

/// A fixed number of holes in circulation. Holes are consumed by entering vehicles and handed
/// back with a delay when a vehicle leaves the travelling part of the link.
#[derive(Debug, Clone)]
pub struct HoleTracker {
    holes: VecDeque<Hole>,
    hole_travel_time: f64,
}

impl HoleTracker {
    pub fn new(n_holes_max: usize, length: f64) -> Self {
        let mut tracker = HoleTracker {
            holes: VecDeque::with_capacity(n_holes_max),
            hole_travel_time: hole_travel_time(length),
        };
        tracker.dimension(n_holes_max, length);
        tracker
    }

    /// Replaces all holes by `n_holes_max` holes which are available right away.
    pub fn dimension(&mut self, n_holes_max: usize, length: f64) {
        self.hole_travel_time = hole_travel_time(length);
        self.holes.clear();
        self.holes
            .extend((0..n_holes_max).map(|_| Hole { earliest_exit_time: 0. }));
    }

    /// The first hole has reached the upstream end of the link.
    pub fn is_available(&self, now: u32) -> bool {
        self.holes
            .front()
            .is_some_and(|h| h.earliest_exit_time <= now as f64)
    }

    pub fn consume(&mut self) -> Option<Hole> {
        self.holes.pop_front()
    }

    /// Hands back a hole, which travels upstream for the hole travel time of the link, +-10%.
    pub fn release(&mut self, now: u32, rnd: &mut impl Rng) {
        let offset = self.hole_travel_time;
        let earliest_exit_time = now as f64 + 0.9 * offset + 0.2 * rnd.random::<f64>() * offset;
        self.holes.push_back(Hole { earliest_exit_time });
    }

    pub fn len(&self) -> usize {
        self.holes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holes.is_empty()
    }
}

/// How space freed by leaving vehicles becomes available to entering vehicles.
#[derive(Debug, Clone)]
pub enum SpillbackModel {
    /// Immediately.
    Queue,
    /// After the hole travelled upstream.
    Holes(HoleTracker),
}

impl SpillbackModel {
    pub fn is_accepting(&self, now: u32) -> bool {
        match self {
            SpillbackModel::Queue => true,
            SpillbackModel::Holes(holes) => holes.is_available(now),
        }
    }

    /// Takes a hole for an entering vehicle. Returns false if there was none.
    pub fn on_enter(&mut self) -> bool {
        match self {
            SpillbackModel::Queue => true,
            SpillbackModel::Holes(holes) => holes.consume().is_some(),
        }
    }

    pub fn on_leave(&mut self, now: u32, rnd: &mut impl Rng) {
        if let SpillbackModel::Holes(holes) = self {
            holes.release(now, rnd);
        }
    }

    pub fn holes(&self) -> Option<&HoleTracker> {
        match self {
            SpillbackModel::Queue => None,
            SpillbackModel::Holes(holes) => Some(holes),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::network::holes::{HoleTracker, SpillbackModel};
    use crate::simulation::random::create_rnd;

    #[test]
    fn all_holes_available_initially() {
        let mut tracker = HoleTracker::new(2, 100.);
        assert!(tracker.is_available(0));
        tracker.consume();
        assert!(tracker.is_available(0));
        tracker.consume();
        assert!(!tracker.is_available(0));
        assert!(tracker.is_empty());
    }

    #[test]
    fn enter_without_hole() {
        let mut model = SpillbackModel::Holes(HoleTracker::new(1, 15.));
        assert!(model.on_enter());
        assert!(!model.on_enter());
        assert_eq!(Some(0), model.holes().map(HoleTracker::len));
    }

    #[test]
    fn released_hole_travels_upstream() {
        let mut rnd = create_rnd(42);
        // 150m at 15km/h takes 36s
        let mut tracker = HoleTracker::new(1, 150.);
        tracker.consume();
        tracker.release(10, &mut rnd);

        let exit_time = tracker.holes.front().unwrap().earliest_exit_time;
        assert!((10. + 32.4..=10. + 39.6).contains(&exit_time), "{exit_time}");
        assert!(!tracker.is_available(42));
        assert!(tracker.is_available(50));
    }

    #[test]
    fn holes_are_recycled_in_order() {
        let mut rnd = create_rnd(42);
        let mut tracker = HoleTracker::new(3, 15.);
        for _ in 0..3 {
            tracker.consume();
        }
        tracker.release(5, &mut rnd);
        tracker.release(100, &mut rnd);
        assert_eq!(2, tracker.len());

        // 15m take 3.6s +-10%
        assert!(tracker.is_available(9));
        tracker.consume();
        assert!(!tracker.is_available(99));
    }

    #[test]
    fn queue_model_always_accepts() {
        let mut rnd = create_rnd(42);
        let mut model = SpillbackModel::Queue;
        assert!(model.on_enter());
        model.on_leave(0, &mut rnd);
        assert!(model.is_accepting(0));
        assert!(model.holes().is_none());
    }
}
