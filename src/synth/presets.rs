use serde::{Deserialize, Serialize};

use crate::synth::model::{Harmonic, MAX_HARMONICS};

/// Waveform shapes approximated with odd harmonics (3, 5, 7, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
}
impl Waveform {
    pub const ALL: [Waveform; 3] = [Waveform::Sine, Waveform::Square, Waveform::Sawtooth];
    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
        }
    }
    /// Harmonic series for this shape, scaled by `amplitude_percent / 100`.
    /// `count` is capped at the synthesizer's harmonic slots.
    pub fn harmonics(self, count: usize, amplitude_percent: f64) -> Vec<Harmonic> {
        let numerator = match self {
            Waveform::Sine => return Vec::new(),
            Waveform::Square => 100.0,
            // reduced amplitude, the firmware only plays odd orders
            Waveform::Sawtooth => 50.0,
        };
        let scale = amplitude_percent.clamp(0.0, 100.0) / 100.0;
        (1..=count.min(MAX_HARMONICS) as u32)
            .map(|n| {
                let order = 2 * n + 1;
                Harmonic::new(n - 1, order, numerator / order as f64 * scale, 0.0)
            })
            .collect()
    }
}
