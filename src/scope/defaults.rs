use std::path::Path;

use log::warn;
use serde::Deserialize;
use serde_json::Value;

use crate::synth::model::{ChannelField, ChannelKind, Harmonic};
use crate::synth::source::harmonics_from_value;
use crate::synth::ScopeError;

/// Default field values of one channel, used by reset operations.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelDefaults {
    pub amplitude: f64,
    pub frequency: f64,
    pub phase: f64,
    pub harmonics: Vec<Harmonic>,
}
impl ChannelDefaults {
    pub fn field(&self, field: ChannelField) -> f64 {
        match field {
            ChannelField::Amplitude => self.amplitude,
            ChannelField::Frequency => self.frequency,
            ChannelField::Phase => self.phase,
        }
    }
}

/// Supplies per-phase defaults to reset operations.
pub trait DefaultsProvider {
    fn channel_defaults(&self, phase_index: usize, kind: ChannelKind) -> ChannelDefaults;
}

#[derive(Clone, Debug, Default, Deserialize)]
struct SynthDefaults {
    amplitude_a: Option<f64>,
    amplitude_b: Option<f64>,
    frequency_a: Option<f64>,
    frequency_b: Option<f64>,
    phase_a: Option<f64>,
    phase_b: Option<f64>,
    #[serde(default)]
    harmonics_a: Value,
    #[serde(default)]
    harmonics_b: Value,
}

/// Per-synth defaults table. A phase without its own entry (or a field missing
/// from it) falls back to entry 0, then to the built-in values.
#[derive(Clone, Debug, Default)]
pub struct DefaultsTable {
    synths: Vec<SynthDefaults>,
}
impl DefaultsTable {
    /// Accepts a list of synth objects, `{"synths": [...]}`, or a single object.
    pub fn from_json(text: &str) -> Result<Self, ScopeError> {
        let value: Value = serde_json::from_str(text)?;
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("synths") {
                Some(Value::Array(items)) => items,
                Some(other) => vec![other],
                None => vec![Value::Object(map)],
            },
            other => vec![other],
        };
        let synths = items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<SynthDefaults>, _>>()?;
        Ok(Self { synths })
    }
    pub fn load_or_builtin(path: &Path) -> Self {
        match std::fs::read_to_string(path)
            .map_err(ScopeError::from)
            .and_then(|text| Self::from_json(&text))
        {
            Ok(table) => table,
            Err(err) => {
                warn!("defaults {}: {err}; using built-in defaults", path.display());
                Self::default()
            }
        }
    }
    fn lookup<T>(&self, idx: usize, pick: impl Fn(&SynthDefaults) -> Option<T>) -> Option<T> {
        self.synths
            .get(idx)
            .and_then(&pick)
            .or_else(|| self.synths.first().and_then(&pick))
    }
}
impl DefaultsProvider for DefaultsTable {
    fn channel_defaults(&self, phase_index: usize, kind: ChannelKind) -> ChannelDefaults {
        let builtin = builtin_defaults(kind);
        let (amplitude, frequency, phase) = match kind {
            ChannelKind::Voltage => (
                self.lookup(phase_index, |s| s.amplitude_a),
                self.lookup(phase_index, |s| s.frequency_a),
                self.lookup(phase_index, |s| s.phase_a),
            ),
            ChannelKind::Current => (
                self.lookup(phase_index, |s| s.amplitude_b),
                self.lookup(phase_index, |s| s.frequency_b),
                self.lookup(phase_index, |s| s.phase_b),
            ),
        };
        let harmonics = self
            .lookup(phase_index, |s| {
                let value = match kind {
                    ChannelKind::Voltage => &s.harmonics_a,
                    ChannelKind::Current => &s.harmonics_b,
                };
                harmonics_list(value)
            })
            .unwrap_or_default();
        ChannelDefaults {
            amplitude: amplitude.unwrap_or(builtin.amplitude),
            frequency: frequency.unwrap_or(builtin.frequency),
            phase: phase.unwrap_or(builtin.phase),
            harmonics,
        }
    }
}

fn harmonics_list(value: &Value) -> Option<Vec<Harmonic>> {
    value.is_array().then(|| harmonics_from_value(value))
}

pub fn builtin_defaults(kind: ChannelKind) -> ChannelDefaults {
    let amplitude = match kind {
        ChannelKind::Voltage => 100.0,
        ChannelKind::Current => 50.0,
    };
    ChannelDefaults {
        amplitude,
        frequency: 50.0,
        phase: 0.0,
        harmonics: Vec::new(),
    }
}
