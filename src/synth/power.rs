//! Power-quality figures for one phase.
//!
//! THD of an empty (or all-zero) harmonic set is 0 on every path, and the
//! harmonic amplitudes are read as percent of the fundamental.
use serde::Serialize;

use crate::scope::InstrumentSettings;
use crate::synth::model::{Harmonic, PhaseId, PhaseUnit};

/// Displacement power factor: cosine of the fundamental phase angle.
pub fn dpf(phase_a_deg: f64, phase_b_deg: f64) -> f64 {
    ((phase_a_deg - phase_b_deg).to_radians()).cos().clamp(-1.0, 1.0)
}

/// Total harmonic distortion as a ratio (0.3 = 30 %), fundamental normalized to 100.
pub fn thd(harmonics: &[Harmonic]) -> f64 {
    let sum_sq: f64 = harmonics.iter().map(|h| h.amplitude * h.amplitude).sum();
    sum_sq.sqrt() / 100.0
}

fn distortion_factor(harmonics: &[Harmonic]) -> f64 {
    if harmonics.is_empty() {
        return 1.0;
    }
    let t = thd(harmonics);
    (1.0 / (1.0 + t * t)).sqrt()
}

pub fn true_pf(phase_a_deg: f64, phase_b_deg: f64, harmonics: &[Harmonic]) -> f64 {
    dpf(phase_a_deg, phase_b_deg) * distortion_factor(harmonics)
}

pub fn true_rms(fundamental_rms: f64, harmonics: &[Harmonic]) -> f64 {
    if harmonics.is_empty() {
        return fundamental_rms;
    }
    let t = thd(harmonics);
    fundamental_rms * (1.0 + t * t).sqrt()
}

pub fn apparent_power(v_rms: f64, i_rms: f64) -> f64 {
    if v_rms == 0.0 || i_rms == 0.0 {
        return 0.0;
    }
    v_rms * i_rms
}

pub fn reactive_power(apparent: f64, pf: f64) -> f64 {
    // |pf| can exceed 1 by an ulp after the product in true_pf
    apparent * (1.0 - pf * pf).max(0.0).sqrt()
}

pub fn active_power(apparent: f64, pf: f64) -> f64 {
    apparent * pf
}

/// Per-phase summary shown next to the scope traces.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PhaseMetrics {
    pub phase_id: PhaseId,
    pub voltage_rms: f64,
    pub current_rms: f64,
    pub voltage_true_rms: f64,
    pub current_true_rms: f64,
    pub thd_voltage: f64,
    pub thd_current: f64,
    pub dpf: f64,
    pub true_pf: f64,
    pub apparent_va: f64,
    pub active_w: f64,
    pub reactive_var: f64,
}
impl PhaseMetrics {
    /// `None` when either channel of the phase is unavailable.
    pub fn compute(phase: &PhaseUnit, instrument: &InstrumentSettings) -> Option<Self> {
        let voltage = phase.voltage.as_ref()?;
        let current = phase.current.as_ref()?;
        let voltage_rms = voltage.rms(instrument.full_scale_voltage_rms);
        let current_rms = current.rms(instrument.full_scale_current_rms);
        let voltage_true_rms = true_rms(voltage_rms, &voltage.harmonics);
        let current_true_rms = true_rms(current_rms, &current.harmonics);
        let pf = true_pf(voltage.phase_deg, current.phase_deg, &current.harmonics);
        let apparent = apparent_power(voltage_rms, current_rms);
        Some(Self {
            phase_id: phase.id,
            voltage_rms,
            current_rms,
            voltage_true_rms,
            current_true_rms,
            thd_voltage: thd(&voltage.harmonics),
            thd_current: thd(&current.harmonics),
            dpf: dpf(voltage.phase_deg, current.phase_deg),
            true_pf: pf,
            apparent_va: apparent,
            active_w: active_power(apparent, pf),
            reactive_var: reactive_power(apparent, pf),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::model::Channel;

    fn h(id: u32, order: u32, amplitude: f64) -> Harmonic {
        Harmonic::new(id, order, amplitude, 0.0)
    }

    #[test]
    fn dpf_identities() {
        for a in [-720.0, -33.3, 0.0, 12.5, 90.0, 359.9, 1000.0] {
            assert!((dpf(a, a) - 1.0).abs() < 1e-12);
            assert!((dpf(a, a + 180.0) + 1.0).abs() < 1e-12);
            for b in [0.0, 45.0, 271.0] {
                let v = dpf(a, b);
                assert!((-1.0..=1.0).contains(&v));
                assert_eq!(true_pf(a, b, &[]), v);
            }
        }
    }

    #[test]
    fn thd_degenerate_inputs_are_zero() {
        assert_eq!(thd(&[]), 0.0);
        assert_eq!(thd(&[h(0, 3, 0.0)]), thd(&[]));
    }

    #[test]
    fn thd_ignores_order() {
        let a = vec![h(0, 3, 30.0), h(1, 5, 40.0), h(2, 7, 12.0)];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(thd(&a), thd(&b));
        assert!((thd(&[h(0, 3, 30.0), h(1, 5, 40.0)]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn true_rms_identity_and_growth() {
        for r in [0.0, 1.0, 230.0, 1e6] {
            assert_eq!(true_rms(r, &[]), r);
        }
        let harmonics = [h(0, 3, 30.0), h(1, 5, 40.0)];
        assert!((true_rms(100.0, &harmonics) - 100.0 * 1.25f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn power_triangle() {
        assert_eq!(apparent_power(0.0, 5.0), 0.0);
        assert_eq!(apparent_power(230.0, 0.0), 0.0);
        let s = apparent_power(230.0, 10.0);
        let pf = dpf(0.0, 60.0);
        let p = active_power(s, pf);
        let q = reactive_power(s, pf);
        assert!((p - 1150.0).abs() < 1e-9);
        assert!((p * p + q * q - s * s).abs() < 1e-6);
        assert_eq!(reactive_power(s, 1.0 + 1e-16), 0.0);
    }

    #[test]
    fn metrics_use_scaled_rms() {
        let phase = PhaseUnit {
            id: 0,
            voltage: Some(Channel::new(92.0, 0.0, 50.0)),
            current: Some(
                Channel::new(50.0, 30.0, 50.0).with_harmonics(vec![h(0, 3, 30.0), h(1, 5, 40.0)]),
            ),
        };
        let instrument = InstrumentSettings::default();
        let m = PhaseMetrics::compute(&phase, &instrument).unwrap();
        assert!((m.voltage_rms - 0.92 * instrument.full_scale_voltage_rms).abs() < 1e-9);
        assert!((m.current_rms - 0.5 * instrument.full_scale_current_rms).abs() < 1e-9);
        assert_eq!(m.thd_voltage, 0.0);
        assert!((m.thd_current - 0.5).abs() < 1e-12);
        let expected_pf = dpf(0.0, 30.0) * (1.0 / 1.25f64).sqrt();
        assert!((m.true_pf - expected_pf).abs() < 1e-12);
        assert!((m.active_w - m.apparent_va * expected_pf).abs() < 1e-9);

        let missing = PhaseUnit {
            current: None,
            ..phase
        };
        assert!(PhaseMetrics::compute(&missing, &instrument).is_none());
    }

    #[test]
    fn apparent_power_ignores_voltage_harmonics() {
        let phase = PhaseUnit {
            id: 0,
            voltage: Some(
                Channel::new(100.0, 0.0, 50.0).with_harmonics(vec![h(0, 3, 30.0), h(1, 5, 40.0)]),
            ),
            current: Some(Channel::new(100.0, 0.0, 50.0)),
        };
        let m = PhaseMetrics::compute(&phase, &InstrumentSettings::default()).unwrap();
        // 250 V * 10 A full scale
        assert!((m.apparent_va - 2500.0).abs() < 1e-9);
        assert!((m.true_pf - 1.0).abs() < 1e-12);
        assert!((m.active_w - 2500.0).abs() < 1e-9);
        assert!(m.reactive_var.abs() < 1e-6);
        assert!(m.voltage_true_rms > m.voltage_rms);
    }
}
