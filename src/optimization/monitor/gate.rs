/// Minimum trajectory time between two emissions of one monitor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateGate {
    rate: f64,
    last: f64,
}

impl RateGate {
    /// Gate that lets the first observation through.
    pub fn leading(rate: f64) -> Self {
        Self {
            rate,
            last: f64::NEG_INFINITY,
        }
    }

    /// Gate that first opens `rate` after job start.
    pub fn trailing(rate: f64) -> Self {
        Self { rate, last: 0.0 }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn is_open(&self, time: f64) -> bool {
        time >= self.last + self.rate
    }

    /// Pass through the gate if it is open, restarting the interval at `time`.
    pub fn try_pass(&mut self, time: f64) -> bool {
        if self.is_open(time) {
            self.last = time;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_gate_opens_immediately() {
        let mut gate = RateGate::leading(5.0);
        assert!(gate.try_pass(0.0));
        assert!(!gate.try_pass(4.9));
        assert!(gate.try_pass(5.0));
        assert!(!gate.try_pass(9.0));
    }

    #[test]
    fn trailing_gate_waits_one_interval() {
        let mut gate = RateGate::trailing(5.0);
        assert!(!gate.try_pass(1.0));
        assert!(gate.try_pass(5.5));
        assert!(!gate.try_pass(10.0));
        assert!(gate.try_pass(10.5));
    }

    #[test]
    fn zero_rate_always_open() {
        let mut gate = RateGate::leading(0.0);
        assert!(gate.try_pass(0.0));
        assert!(gate.try_pass(0.0));
        assert_eq!(gate.rate(), 0.0);
    }
}
