//! Kinematic easing for view transitions: constant-magnitude acceleration
//! with symmetric speed-up and slow-down phases, so an animated value
//! arrives at its target with zero velocity.

/// Snap distance below which a nearly-arrived value is considered done.
const SETTLE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Animated {
    current: f64,
    target: f64,
    velocity: f64,
    /// Magnitude of acceleration, in units per second squared.
    acceleration: f64,
}

impl Animated {
    pub fn new(value: f64, acceleration: f64) -> Self {
        Animated {
            current: value,
            target: value,
            velocity: 0.0,
            acceleration,
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Move to `value` immediately, cancelling any transition in flight.
    pub fn jump_to(&mut self, value: f64) {
        self.current = value;
        self.target = value;
        self.velocity = 0.0;
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target && self.velocity == 0.0
    }

    /// Advance by `dt` seconds. Returns `true` while still in motion.
    ///
    /// Accelerates toward the target until the braking distance
    /// `v^2 / 2a` reaches the remaining distance, then decelerates.
    /// Crossing the target snaps onto it, which absorbs the residual
    /// velocity of the final partial frame and covers the case where a
    /// single frame's increment spans the whole remaining distance.
    pub fn step(&mut self, dt: f64) -> bool {
        if self.is_settled() {
            return false;
        }
        let remaining = self.target - self.current;
        if remaining.abs() < SETTLE_EPSILON && self.velocity.abs() * dt < SETTLE_EPSILON {
            self.jump_to(self.target);
            return false;
        }

        let direction = remaining.signum();
        let approaching = self.velocity * direction > 0.0;
        let braking_distance = self.velocity * self.velocity / (2.0 * self.acceleration);
        let applied = if approaching && braking_distance >= remaining.abs() {
            -direction * self.acceleration
        } else {
            direction * self.acceleration
        };

        self.velocity += applied * dt;
        self.current += self.velocity * dt;

        if (self.target - self.current) * direction <= 0.0 {
            self.jump_to(self.target);
            return false;
        }
        true
    }
}
