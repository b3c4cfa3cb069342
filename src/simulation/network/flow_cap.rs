/// Flow capacity credit of a link's buffer.
///
/// Every time step the integer pool `remaining` is reset to the full capacity per time step.
/// The fractional part of the capacity is collected in `accumulated`, which only grows while
/// the link is green, nothing is waiting in the buffer and less than one vehicle's worth is
/// collected. This way a capacity of 0.5 vehicles per time step lets one vehicle pass every
/// other time step, without losing or creating credit over time.
#[derive(Debug, Clone)]
pub struct Flowcap {
    capacity_per_time_step: f64,
    fractional_part: f64,
    remaining: f64,
    accumulated: f64,
}

impl Flowcap {
    pub(super) fn new(capacity_per_time_step: f64) -> Flowcap {
        let fractional_part = capacity_per_time_step.fract();
        Flowcap {
            capacity_per_time_step,
            fractional_part,
            remaining: capacity_per_time_step,
            accumulated: if fractional_part == 0. { 0. } else { 1. },
        }
    }

    /// Takes a new capacity per time step. The accumulated credit is kept.
    pub(super) fn set_capacity_per_time_step(&mut self, capacity_per_time_step: f64) {
        self.capacity_per_time_step = capacity_per_time_step;
        self.fractional_part = capacity_per_time_step.fract();
        self.remaining = self.remaining.min(capacity_per_time_step);
    }

    /// Called once at the beginning of each time step.
    pub(super) fn update(&mut self, green: bool, buffer_empty: bool) {
        self.remaining = self.capacity_per_time_step;
        if green && self.accumulated < 1. && buffer_empty {
            self.accumulated += self.fractional_part;
        }
    }

    pub(super) fn has_capacity_left(&self) -> bool {
        self.remaining >= 1. || self.accumulated >= 1.
    }

    /// Consumes credit for a vehicle of size `pce`. The integer pool is used first.
    pub(super) fn consume(&mut self, pce: f64, link: &impl std::fmt::Display) {
        if self.remaining >= 1. {
            self.remaining -= pce;
        } else if self.accumulated >= 1. {
            self.accumulated -= pce;
        } else {
            panic!("Buffer of link {link} has no flow capacity left.");
        }
    }

    /// The accumulator can't grow any further. Either it holds a full vehicle's worth or the
    /// capacity has no fractional part.
    pub(super) fn is_saturated(&self) -> bool {
        self.accumulated >= 1. || self.fractional_part == 0.
    }

    pub fn capacity_per_time_step(&self) -> f64 {
        self.capacity_per_time_step
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }
}
