//! Learning-rate schedule for the adversarial stage.

/// Inverse-decay schedule, stepped once per iteration:
/// `lr = lr0 * (1 + gamma * step)^(-decay)`.
#[derive(Clone, Debug)]
pub struct InverseDecaySchedule {
    base_lr: f64,
    gamma: f64,
    decay: f64,
    step: usize,
}

impl InverseDecaySchedule {
    pub fn new(base_lr: f64, gamma: f64, decay: f64) -> Self {
        Self {
            base_lr,
            gamma,
            decay,
            step: 0,
        }
    }

    /// Learning rate for the current step, then advance.
    pub fn next_lr(&mut self) -> f64 {
        let lr = self.current_lr();
        self.step += 1;
        lr
    }

    pub fn current_lr(&self) -> f64 {
        self.base_lr * (1.0 + self.gamma * self.step as f64).powf(-self.decay)
    }

    pub fn step_count(&self) -> usize {
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_base_lr() {
        let mut sched = InverseDecaySchedule::new(0.001, 0.001, 0.75);
        assert!((sched.next_lr() - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_monotonic_decay() {
        let mut sched = InverseDecaySchedule::new(0.001, 0.001, 0.75);
        let mut prev = f64::INFINITY;
        for _ in 0..100 {
            let lr = sched.next_lr();
            assert!(lr < prev);
            assert!(lr > 0.0);
            prev = lr;
        }
    }

    #[test]
    fn test_closed_form() {
        let mut sched = InverseDecaySchedule::new(0.001, 0.001, 0.75);
        for _ in 0..1000 {
            sched.next_lr();
        }
        let expected = 0.001 * (1.0f64 + 0.001 * 1000.0).powf(-0.75);
        assert!((sched.current_lr() - expected).abs() < 1e-12);
    }
}
