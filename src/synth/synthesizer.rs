//! Harmonic superposition of one channel into a sampled trace.
//!
//! Every harmonic is phase-locked to the fundamental: its argument carries its own
//! phase offset plus `order` times the fundamental phase, so rotating the
//! fundamental rotates the whole waveform shape with it.
use std::f64::consts::{PI, SQRT_2};

use crate::synth::model::Channel;

/// Width of the oscilloscope sweep in timebase divisions.
pub const TIME_DIVISIONS: f64 = 8.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplePoint {
    /// Seconds for windowed traces, fundamental cycles for cycle-normalized ones.
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampleMode {
    /// `x_i = (i / N) * cycles`, optionally shifted left by `cycles / 2`.
    CycleNormalized { cycles: f64, centered: bool },
    /// Absolute time axis of a scope sweep spanning `8 * timebase_ms`.
    Windowed { timebase_ms: f64, time_offset_ms: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleSpec {
    pub count: usize,
    pub mode: SampleMode,
}
impl SampleSpec {
    pub fn cycles(count: usize, cycles: f64) -> Self {
        Self {
            count,
            mode: SampleMode::CycleNormalized {
                cycles,
                centered: false,
            },
        }
    }
    pub fn windowed(count: usize, timebase_ms: f64, time_offset_ms: f64) -> Self {
        Self {
            count,
            mode: SampleMode::Windowed {
                timebase_ms,
                time_offset_ms,
            },
        }
    }
    /// Abscissa of sample `i`.
    pub fn x_at(&self, i: usize) -> f64 {
        let n = self.count as f64;
        match self.mode {
            SampleMode::CycleNormalized { cycles, centered } => {
                let shift = if centered { cycles / 2.0 } else { 0.0 };
                i as f64 / n * cycles - shift
            }
            SampleMode::Windowed {
                timebase_ms,
                time_offset_ms,
            } => {
                let total = TIME_DIVISIONS * timebase_ms / 1000.0;
                let denom = (self.count.saturating_sub(1)).max(1) as f64;
                i as f64 / denom * total - total / 2.0 + time_offset_ms / 1000.0
            }
        }
    }
    fn is_valid(&self) -> bool {
        match self.mode {
            SampleMode::CycleNormalized { cycles, .. } => cycles.is_finite(),
            SampleMode::Windowed {
                timebase_ms,
                time_offset_ms,
            } => timebase_ms.is_finite() && timebase_ms > 0.0 && time_offset_ms.is_finite(),
        }
    }
}

/// Peak value of the fundamental: `percent/100 * full_scale_rms * sqrt(2)`.
pub fn fundamental_peak(channel: &Channel, full_scale_rms: f64) -> f64 {
    channel.amplitude_rms_percent / 100.0 * full_scale_rms * SQRT_2
}

/// Instantaneous value at `t` seconds.
pub fn value_at(channel: &Channel, peak: f64, t: f64) -> f64 {
    let f = channel.frequency_hz;
    let mut y = peak * (2.0 * PI * f * t + channel.phase_deg.to_radians()).sin();
    for h in &channel.harmonics {
        let order = h.order as f64;
        let phase = (h.phase + order * channel.phase_deg) * PI / 180.0;
        y += peak * (h.amplitude / 100.0) * (2.0 * PI * order * f * t + phase).sin();
    }
    y
}

/// Samples `channel` according to `spec`. Returns `None` when the channel or the
/// spec carries a value that cannot be synthesized; callers show "no data".
pub fn synthesize(
    channel: &Channel,
    spec: &SampleSpec,
    full_scale_rms: f64,
) -> Option<Vec<SamplePoint>> {
    if !is_synthesizable(channel) || !full_scale_rms.is_finite() || !spec.is_valid() {
        return None;
    }
    let peak = fundamental_peak(channel, full_scale_rms);
    let samples = (0..spec.count)
        .map(|i| {
            let x = spec.x_at(i);
            let t = match spec.mode {
                SampleMode::CycleNormalized { .. } => x / channel.frequency_hz,
                SampleMode::Windowed { .. } => x,
            };
            SamplePoint {
                x,
                y: value_at(channel, peak, t),
            }
        })
        .collect();
    Some(samples)
}

/// Compact preview of a channel over `cycles` fundamental periods centered on zero.
pub fn channel_preview(
    channel: &Channel,
    cycles: f64,
    count: usize,
    full_scale_rms: f64,
) -> Option<Vec<SamplePoint>> {
    let spec = SampleSpec {
        count,
        mode: SampleMode::CycleNormalized {
            cycles,
            centered: true,
        },
    };
    synthesize(channel, &spec, full_scale_rms)
}

fn is_synthesizable(channel: &Channel) -> bool {
    channel.amplitude_rms_percent.is_finite()
        && channel.phase_deg.is_finite()
        && channel.frequency_hz.is_finite()
        && channel.frequency_hz > 0.0
        && channel
            .harmonics
            .iter()
            .all(|h| h.amplitude.is_finite() && h.phase.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::model::Harmonic;

    fn mains() -> Channel {
        Channel::new(100.0, 0.0, 50.0)
    }

    #[test]
    fn sample_count_is_independent_of_harmonics() {
        let spec = SampleSpec::windowed(321, 5.0, 0.0);
        for n in [0u32, 1, 4] {
            let harmonics = (0..n)
                .map(|i| Harmonic::new(i, 2 * i + 3, 20.0, 15.0))
                .collect();
            let ch = mains().with_harmonics(harmonics);
            assert_eq!(synthesize(&ch, &spec, 240.0).unwrap().len(), 321);
        }
    }

    #[test]
    fn one_cycle_hits_peak_and_zero_crossing() {
        let trace = synthesize(&mains(), &SampleSpec::cycles(200, 1.0), 240.0).unwrap();
        let peak = 240.0 * SQRT_2;
        assert!((trace[50].y - peak).abs() < 1e-9);
        assert!(trace[100].y.abs() < 1e-9);
        assert!(trace[99].y > 0.0);
        assert!(trace[101].y < 0.0);
    }

    #[test]
    fn harmonic_phase_follows_fundamental() {
        // Rotating the fundamental by 90 deg shifts the whole shape by a quarter period.
        let harmonics = vec![Harmonic::new(0, 3, 30.0, 10.0)];
        let base = mains().with_harmonics(harmonics.clone());
        let rotated = Channel::new(100.0, 90.0, 50.0).with_harmonics(harmonics);
        let quarter = 0.25 / 50.0;
        for i in 0..20 {
            let t = i as f64 * 1e-3;
            let a = value_at(&rotated, 1.0, t);
            let b = value_at(&base, 1.0, t + quarter);
            assert!((a - b).abs() < 1e-9, "t={t}: {a} vs {b}");
        }
    }

    #[test]
    fn windowed_axis_spans_eight_divisions() {
        let spec = SampleSpec::windowed(101, 2.0, 4.0);
        assert!((spec.x_at(0) - (-0.008 + 0.004)).abs() < 1e-12);
        assert!((spec.x_at(100) - (0.008 + 0.004)).abs() < 1e-12);
        assert!((spec.x_at(50) - 0.004).abs() < 1e-12);
    }

    #[test]
    fn undefined_fields_yield_no_data() {
        let mut ch = mains();
        ch.frequency_hz = f64::NAN;
        assert!(synthesize(&ch, &SampleSpec::cycles(10, 1.0), 240.0).is_none());
        ch.frequency_hz = 0.0;
        assert!(synthesize(&ch, &SampleSpec::cycles(10, 1.0), 240.0).is_none());
        assert!(synthesize(&mains(), &SampleSpec::windowed(10, 0.0, 0.0), 240.0).is_none());
    }

    #[test]
    fn degenerate_counts() {
        assert!(synthesize(&mains(), &SampleSpec::cycles(0, 1.0), 240.0)
            .unwrap()
            .is_empty());
        let single = synthesize(&mains(), &SampleSpec::windowed(1, 1.0, 0.0), 240.0).unwrap();
        assert_eq!(single.len(), 1);
        assert!((single[0].x + 0.004).abs() < 1e-12);
    }

    #[test]
    fn preview_is_centered() {
        let trace = channel_preview(&mains(), 2.0, 100, 240.0).unwrap();
        assert!((trace[0].x + 1.0).abs() < 1e-12);
        assert!((trace[50].x).abs() < 1e-12);
    }
}
