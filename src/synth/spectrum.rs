use rustfft::{num_complex::Complex64, FftPlanner};

use crate::synth::synthesizer::SamplePoint;

/// Harmonic content measured from a synthesized trace.
#[derive(Clone, Debug, PartialEq)]
pub struct HarmonicSpectrum {
    pub fundamental_peak: f64,
    /// (order, percent of fundamental) for orders 2..=max_order.
    pub orders: Vec<(u32, f64)>,
    /// Measured THD ratio; 0 when the fundamental is absent.
    pub thd: f64,
}
impl HarmonicSpectrum {
    pub fn percent_at(&self, order: u32) -> f64 {
        self.orders
            .iter()
            .find(|(o, _)| *o == order)
            .map(|(_, p)| *p)
            .unwrap_or(0.0)
    }
}

/// Helper that measures harmonics of a trace spanning a whole number of cycles.
pub struct SpectrumAnalyzer {
    cycles: usize,
    max_order: u32,
}
impl SpectrumAnalyzer {
    pub fn new(cycles: usize, max_order: u32) -> Self {
        Self {
            cycles: cycles.max(1),
            max_order: max_order.max(1),
        }
    }
    pub fn analyze(&self, trace: &[SamplePoint]) -> HarmonicSpectrum {
        let n = trace.len();
        if n == 0 {
            return HarmonicSpectrum {
                fundamental_peak: 0.0,
                orders: Vec::new(),
                thd: 0.0,
            };
        }
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(n);
        let mut buffer: Vec<Complex64> = trace.iter().map(|s| Complex64::new(s.y, 0.0)).collect();
        fft.process(&mut buffer);
        let peak_at = |order: u32| {
            let bin = order as usize * self.cycles;
            if bin == 0 || bin >= n / 2 {
                return 0.0;
            }
            2.0 * buffer[bin].norm() / n as f64
        };
        let fundamental_peak = peak_at(1);
        // below this the fundamental is numerical noise
        let floor = 1e-9;
        let orders: Vec<(u32, f64)> = (2..=self.max_order)
            .map(|order| {
                let pct = if fundamental_peak > floor {
                    peak_at(order) / fundamental_peak * 100.0
                } else {
                    0.0
                };
                (order, pct)
            })
            .collect();
        let thd = orders.iter().map(|(_, p)| p * p).sum::<f64>().sqrt() / 100.0;
        HarmonicSpectrum {
            fundamental_peak,
            orders,
            thd,
        }
    }
}
