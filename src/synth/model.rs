use log::warn;
use serde::{Deserialize, Serialize};

use crate::synth::ScopeError;

pub type PhaseId = u32;

/// Upper bound on phase units in one snapshot (L1, L2, L3).
pub const MAX_PHASES: usize = 3;
/// Frequency range accepted by the synthesizer firmware for direct entry.
pub const MIN_FREQUENCY_HZ: f64 = 20.0;
pub const MAX_FREQUENCY_HZ: f64 = 8000.0;
/// Harmonic slots available per synthesizer, shared by both channels.
pub const MAX_HARMONICS: usize = 8;
/// Highest harmonic order accepted from direct entry.
pub const MAX_HARMONIC_ORDER: u32 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Voltage,
    Current,
}
impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Voltage, ChannelKind::Current];
    pub fn label(self) -> &'static str {
        match self {
            ChannelKind::Voltage => "voltage",
            ChannelKind::Current => "current",
        }
    }
    pub fn unit(self) -> &'static str {
        match self {
            ChannelKind::Voltage => "V",
            ChannelKind::Current => "A",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Harmonic {
    pub id: u32,
    /// Multiple of the fundamental frequency, at least 1.
    pub order: u32,
    /// Percent of the fundamental peak, 0..=100.
    pub amplitude: f64,
    /// Degrees, normalized to [0, 360).
    pub phase: f64,
}
impl Harmonic {
    pub fn new(id: u32, order: u32, amplitude: f64, phase: f64) -> Self {
        Self {
            id,
            order: order.max(1),
            amplitude: clamp_percent(amplitude),
            phase: normalize_degrees(phase),
        }
    }
    /// Expects a value that already passed `HarmonicField::validate`.
    pub fn with_field(mut self, field: HarmonicField, value: f64) -> Self {
        match field {
            HarmonicField::Amplitude => self.amplitude = clamp_percent(value),
            HarmonicField::Phase => self.phase = normalize_degrees(value),
            HarmonicField::Order => self.order = (value as u32).max(1),
        }
        self
    }
    pub fn field(&self, field: HarmonicField) -> f64 {
        match field {
            HarmonicField::Amplitude => self.amplitude,
            HarmonicField::Phase => self.phase,
            HarmonicField::Order => self.order as f64,
        }
    }
}

/// One electrical quantity (voltage or current) of one phase.
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    pub amplitude_rms_percent: f64,
    pub phase_deg: f64,
    pub frequency_hz: f64,
    pub harmonics: Vec<Harmonic>,
}
impl Channel {
    pub fn new(amplitude_rms_percent: f64, phase_deg: f64, frequency_hz: f64) -> Self {
        Self {
            amplitude_rms_percent: clamp_percent(amplitude_rms_percent),
            phase_deg: normalize_degrees(phase_deg),
            frequency_hz,
            harmonics: Vec::new(),
        }
    }
    pub fn with_harmonics(mut self, harmonics: Vec<Harmonic>) -> Self {
        self.harmonics = harmonics;
        self
    }
    pub fn with_field(mut self, field: ChannelField, value: f64) -> Self {
        match field {
            ChannelField::Amplitude => self.amplitude_rms_percent = clamp_percent(value),
            ChannelField::Frequency => self.frequency_hz = value,
            ChannelField::Phase => self.phase_deg = normalize_degrees(value),
        }
        self
    }
    pub fn field(&self, field: ChannelField) -> f64 {
        match field {
            ChannelField::Amplitude => self.amplitude_rms_percent,
            ChannelField::Frequency => self.frequency_hz,
            ChannelField::Phase => self.phase_deg,
        }
    }
    /// Scaled fundamental RMS for the given instrument full scale.
    pub fn rms(&self, full_scale_rms: f64) -> f64 {
        self.amplitude_rms_percent / 100.0 * full_scale_rms
    }
}

/// Scalar channel fields that can be entered directly or reset to defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelField {
    Amplitude,
    Frequency,
    Phase,
}
impl ChannelField {
    pub fn name(self) -> &'static str {
        match self {
            ChannelField::Amplitude => "amplitude",
            ChannelField::Frequency => "frequency",
            ChannelField::Phase => "phase",
        }
    }
    /// Validates a directly entered value. Phase accepts any finite angle.
    pub fn validate(self, value: f64) -> Result<f64, ScopeError> {
        let (min, max) = match self {
            ChannelField::Amplitude => (0.0, 100.0),
            ChannelField::Frequency => (MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ),
            ChannelField::Phase => return Ok(normalize_degrees(value)),
        };
        if !(min..=max).contains(&value) {
            return Err(ScopeError::OutOfRange {
                field: self.name(),
                value,
                min,
                max,
            });
        }
        Ok(value)
    }
}

/// Per-harmonic fields editable one at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HarmonicField {
    Amplitude,
    Phase,
    Order,
}
impl HarmonicField {
    pub const ALL: [HarmonicField; 3] = [
        HarmonicField::Order,
        HarmonicField::Amplitude,
        HarmonicField::Phase,
    ];
    pub fn name(self) -> &'static str {
        match self {
            HarmonicField::Amplitude => "harmonic amplitude",
            HarmonicField::Phase => "harmonic phase",
            HarmonicField::Order => "harmonic order",
        }
    }
    /// Order must be a whole number in 1..=MAX_HARMONIC_ORDER.
    pub fn validate(self, value: f64) -> Result<f64, ScopeError> {
        let (min, max) = match self {
            HarmonicField::Amplitude => (0.0, 100.0),
            HarmonicField::Order => (1.0, MAX_HARMONIC_ORDER as f64),
            HarmonicField::Phase => return Ok(normalize_degrees(value)),
        };
        if !(min..=max).contains(&value) {
            return Err(ScopeError::OutOfRange {
                field: self.name(),
                value,
                min,
                max,
            });
        }
        if self == HarmonicField::Order && value.fract() != 0.0 {
            return Err(ScopeError::NotWholeNumber {
                field: self.name(),
                value,
            });
        }
        Ok(value)
    }
}

/// One synthesizer: the voltage and current channel of a single phase.
/// A channel is `None` when the feed left any of its fields undefined.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseUnit {
    pub id: PhaseId,
    pub voltage: Option<Channel>,
    pub current: Option<Channel>,
}
impl PhaseUnit {
    pub fn channel(&self, kind: ChannelKind) -> Option<&Channel> {
        match kind {
            ChannelKind::Voltage => self.voltage.as_ref(),
            ChannelKind::Current => self.current.as_ref(),
        }
    }
    fn channel_mut(&mut self, kind: ChannelKind) -> &mut Option<Channel> {
        match kind {
            ChannelKind::Voltage => &mut self.voltage,
            ChannelKind::Current => &mut self.current,
        }
    }
}

/// Point-in-time description of every phase unit. Treated as a value:
/// edits build a new snapshot instead of mutating the held one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SystemSnapshot {
    phases: Vec<PhaseUnit>,
}
impl SystemSnapshot {
    pub fn new(mut phases: Vec<PhaseUnit>) -> Self {
        if phases.len() > MAX_PHASES {
            warn!(
                "snapshot carries {} phase units, keeping the first {MAX_PHASES}",
                phases.len()
            );
            phases.truncate(MAX_PHASES);
        }
        Self { phases }
    }
    pub fn phases(&self) -> &[PhaseUnit] {
        &self.phases
    }
    pub fn phase(&self, index: usize) -> Option<&PhaseUnit> {
        self.phases.get(index)
    }
    pub fn len(&self) -> usize {
        self.phases.len()
    }
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
    /// Display position of the phase carrying `id`; labels follow this, not the id.
    pub fn position_of(&self, id: PhaseId) -> Option<usize> {
        self.phases.iter().position(|p| p.id == id)
    }
    /// Returns a copy of this snapshot with one channel replaced.
    pub fn with_channel(
        &self,
        index: usize,
        kind: ChannelKind,
        channel: Channel,
    ) -> Result<SystemSnapshot, ScopeError> {
        let mut phases = self.phases.clone();
        let phase = phases
            .get_mut(index)
            .ok_or(ScopeError::UnknownPhase(index))?;
        *phase.channel_mut(kind) = Some(channel);
        Ok(SystemSnapshot { phases })
    }
}

pub fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

pub fn normalize_degrees(value: f64) -> f64 {
    let wrapped = value.rem_euclid(360.0);
    // rem_euclid can round tiny negative inputs up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}
