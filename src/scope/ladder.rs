/// Fixed, ascending set of values a quantized scope setting may take.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ladder {
    steps: &'static [f64],
}

pub const VOLTAGE_LADDER: Ladder = Ladder {
    steps: &[10.0, 20.0, 50.0, 100.0, 200.0, 500.0],
};
pub const CURRENT_LADDER: Ladder = Ladder {
    steps: &[0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0],
};
pub const TIMEBASE_LADDER: Ladder = Ladder {
    steps: &[0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0],
};

impl Ladder {
    pub fn steps(&self) -> &'static [f64] {
        self.steps
    }
    pub fn min(&self) -> f64 {
        self.steps[0]
    }
    pub fn max(&self) -> f64 {
        self.steps[self.steps.len() - 1]
    }
    pub fn contains(&self, value: f64) -> bool {
        self.steps.contains(&value)
    }
    /// Nearest entry by absolute difference; ties go to the smaller entry.
    pub fn snap(&self, value: f64) -> f64 {
        let mut best = self.steps[0];
        for &step in self.steps {
            if (step - value).abs() < (best - value).abs() {
                best = step;
            }
        }
        best
    }
    /// Smallest entry strictly greater than `current`, or the top entry.
    pub fn step_up(&self, current: f64) -> f64 {
        self.steps
            .iter()
            .copied()
            .find(|&s| s > current)
            .unwrap_or(self.max())
    }
    /// Largest entry strictly less than `current`, or the bottom entry.
    pub fn step_down(&self, current: f64) -> f64 {
        self.steps
            .iter()
            .rev()
            .copied()
            .find(|&s| s < current)
            .unwrap_or(self.min())
    }
}
