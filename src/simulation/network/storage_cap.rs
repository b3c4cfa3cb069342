/// StorageCap tracks the space on a link, measured in passenger car equivalents. It is used for
/// the travelling part of a link as well as for its buffer.
///
/// Space is consumed when a vehicle enters and released when it leaves. Whether another vehicle
/// fits is decided on the used space only: a link with some space left accepts one more vehicle,
/// regardless of the vehicle's size.
#[derive(Debug, Clone)]
pub struct StorageCap {
    max: f64,
    used: f64,
}

impl StorageCap {
    pub fn new(max: f64) -> Self {
        Self { max, used: 0.0 }
    }

    pub fn used(&self) -> f64 {
        self.used
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Consumes capacity for a vehicle entering.
    pub fn consume(&mut self, value: f64) {
        self.used += value;
    }

    /// Releases capacity for a vehicle leaving.
    pub fn release(&mut self, value: f64) {
        self.used = (self.used - value).max(0.);
    }

    /// Tests whether there is capacity available.
    pub fn is_available(&self) -> bool {
        self.used < self.max
    }

    pub fn set_max(&mut self, max: f64) {
        self.max = max;
    }

    pub fn reset(&mut self) {
        self.used = 0.;
    }
}

#[cfg(test)]
mod test {
    use crate::simulation::network::storage_cap::StorageCap;

    #[test]
    fn one_more_fits_while_space_left() {
        let mut cap = StorageCap::new(2.);
        cap.consume(1.5);
        assert!(cap.is_available());

        cap.consume(1.5);
        assert!(!cap.is_available());
        assert_eq!(3., cap.used());

        cap.release(1.5);
        assert!(cap.is_available());
    }

    #[test]
    fn release_never_negative() {
        let mut cap = StorageCap::new(1.);
        cap.release(1.);
        assert_eq!(0., cap.used());
    }
}
