use std::collections::BTreeMap;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::scope::ladder::{Ladder, CURRENT_LADDER, TIMEBASE_LADDER, VOLTAGE_LADDER};
use crate::synth::model::{ChannelKind, PhaseId};
use crate::synth::ScopeError;

/// Vertical divisions above and below the offset center.
pub const HALF_DIVISIONS: f64 = 5.0;
/// Guard margin added to the vertical span.
pub const RANGE_MARGIN: f64 = 1.1;
/// Offset steppers move by this fraction of one division.
pub const OFFSET_STEP_FRACTION: f64 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleAxis {
    Voltage,
    Current,
    Timebase,
}
impl ScaleAxis {
    pub fn ladder(self) -> Ladder {
        match self {
            ScaleAxis::Voltage => VOLTAGE_LADDER,
            ScaleAxis::Current => CURRENT_LADDER,
            ScaleAxis::Timebase => TIMEBASE_LADDER,
        }
    }
    pub fn name(self) -> &'static str {
        match self {
            ScaleAxis::Voltage => "V/div",
            ScaleAxis::Current => "A/div",
            ScaleAxis::Timebase => "ms/div",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetAxis {
    Time,
    Voltage,
    Current,
}
impl OffsetAxis {
    /// The scale whose division width sets this offset's step.
    pub fn scale_axis(self) -> ScaleAxis {
        match self {
            OffsetAxis::Time => ScaleAxis::Timebase,
            OffsetAxis::Voltage => ScaleAxis::Voltage,
            OffsetAxis::Current => ScaleAxis::Current,
        }
    }
    pub fn name(self) -> &'static str {
        match self {
            OffsetAxis::Time => "time offset",
            OffsetAxis::Voltage => "voltage offset",
            OffsetAxis::Current => "current offset",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Up,
    Down,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelVisibility {
    pub voltage: bool,
    pub current: bool,
}
impl Default for ChannelVisibility {
    fn default() -> Self {
        Self {
            voltage: true,
            current: true,
        }
    }
}
impl ChannelVisibility {
    pub fn get(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Voltage => self.voltage,
            ChannelKind::Current => self.current,
        }
    }
    pub fn set(&mut self, kind: ChannelKind, visible: bool) {
        match kind {
            ChannelKind::Voltage => self.voltage = visible,
            ChannelKind::Current => self.current = visible,
        }
    }
}

/// Durable oscilloscope view settings. Never carries live channel data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSettings {
    pub voltage_per_div: f64,
    pub current_per_div: f64,
    pub timebase_ms_per_div: f64,
    pub time_offset_ms: f64,
    pub voltage_offset_v: f64,
    pub current_offset_a: f64,
    #[serde(default)]
    pub phase_visibility: BTreeMap<PhaseId, ChannelVisibility>,
}
impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            voltage_per_div: 100.0,
            current_per_div: 2.0,
            timebase_ms_per_div: 5.0,
            time_offset_ms: 0.0,
            voltage_offset_v: 0.0,
            current_offset_a: 0.0,
            phase_visibility: BTreeMap::new(),
        }
    }
}
impl ViewSettings {
    pub fn scale(&self, axis: ScaleAxis) -> f64 {
        match axis {
            ScaleAxis::Voltage => self.voltage_per_div,
            ScaleAxis::Current => self.current_per_div,
            ScaleAxis::Timebase => self.timebase_ms_per_div,
        }
    }
    pub(crate) fn scale_mut(&mut self, axis: ScaleAxis) -> &mut f64 {
        match axis {
            ScaleAxis::Voltage => &mut self.voltage_per_div,
            ScaleAxis::Current => &mut self.current_per_div,
            ScaleAxis::Timebase => &mut self.timebase_ms_per_div,
        }
    }
    pub fn offset(&self, axis: OffsetAxis) -> f64 {
        match axis {
            OffsetAxis::Time => self.time_offset_ms,
            OffsetAxis::Voltage => self.voltage_offset_v,
            OffsetAxis::Current => self.current_offset_a,
        }
    }
    pub(crate) fn offset_mut(&mut self, axis: OffsetAxis) -> &mut f64 {
        match axis {
            OffsetAxis::Time => &mut self.time_offset_ms,
            OffsetAxis::Voltage => &mut self.voltage_offset_v,
            OffsetAxis::Current => &mut self.current_offset_a,
        }
    }
    pub fn visibility(&self, phase: PhaseId) -> ChannelVisibility {
        self.phase_visibility
            .get(&phase)
            .copied()
            .unwrap_or_default()
    }
    /// Snaps every ladder-backed field and zeroes non-finite offsets. Used on load,
    /// since a stored blob may have been edited by hand.
    pub fn sanitized(mut self) -> Self {
        for axis in [ScaleAxis::Voltage, ScaleAxis::Current, ScaleAxis::Timebase] {
            let value = self.scale(axis);
            let snapped = if value.is_finite() {
                axis.ladder().snap(value)
            } else {
                ViewSettings::default().scale(axis)
            };
            *self.scale_mut(axis) = snapped;
        }
        for axis in [OffsetAxis::Time, OffsetAxis::Voltage, OffsetAxis::Current] {
            if !self.offset(axis).is_finite() {
                *self.offset_mut(axis) = 0.0;
            }
        }
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Edits and resets apply to the active phase only.
    #[default]
    Single,
    /// Edits and resets apply to every phase.
    All,
}

/// Which phase and panel the operator is working on. Persisted next to the
/// view settings under its own key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiSelection {
    pub active_phase: usize,
    pub mode: SelectionMode,
    pub open_panel: Option<String>,
}

pub const REFRESH_INTERVALS_MS: [u64; 4] = [50, 100, 200, 500];

/// Instrument-level configuration: full-scale ranges and display cadence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstrumentSettings {
    /// RMS voltage at 100 % amplitude.
    #[serde(alias = "maxVoltage")]
    pub full_scale_voltage_rms: f64,
    /// RMS current at 100 % amplitude.
    #[serde(alias = "maxCurrent")]
    pub full_scale_current_rms: f64,
    /// Coalescing window for inbound snapshots.
    #[serde(alias = "chartRefreshRate")]
    pub refresh_interval_ms: u64,
    pub precision_digits: usize,
    pub samples_per_trace: usize,
}
impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            full_scale_voltage_rms: 250.0,
            full_scale_current_rms: 10.0,
            refresh_interval_ms: 100,
            precision_digits: 2,
            samples_per_trace: 400,
        }
    }
}
impl InstrumentSettings {
    pub fn full_scale(&self, kind: ChannelKind) -> f64 {
        match kind {
            ChannelKind::Voltage => self.full_scale_voltage_rms,
            ChannelKind::Current => self.full_scale_current_rms,
        }
    }
    pub fn validate(&self) -> Result<(), ScopeError> {
        let positive = |field: &'static str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ScopeError::OutOfRange {
                    field,
                    value,
                    min: f64::MIN_POSITIVE,
                    max: f64::MAX,
                })
            }
        };
        positive("full scale voltage", self.full_scale_voltage_rms)?;
        positive("full scale current", self.full_scale_current_rms)?;
        if !REFRESH_INTERVALS_MS.contains(&self.refresh_interval_ms) {
            return Err(ScopeError::OutOfRange {
                field: "refresh interval",
                value: self.refresh_interval_ms as f64,
                min: 50.0,
                max: 500.0,
            });
        }
        if !(1..=4).contains(&self.precision_digits) {
            return Err(ScopeError::OutOfRange {
                field: "precision digits",
                value: self.precision_digits as f64,
                min: 1.0,
                max: 4.0,
            });
        }
        if !(2..=10_000).contains(&self.samples_per_trace) {
            return Err(ScopeError::OutOfRange {
                field: "samples per trace",
                value: self.samples_per_trace as f64,
                min: 2.0,
                max: 10_000.0,
            });
        }
        Ok(())
    }
    /// Reads settings from a JSON file. Missing, unreadable or invalid files
    /// fall back to the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                warn!("instrument settings {}: {err}; using defaults", path.display());
                return Self::default();
            }
        };
        let parsed = serde_json::from_str::<InstrumentSettings>(&text)
            .map_err(ScopeError::from)
            .and_then(|s| s.validate().map(|_| s));
        match parsed {
            Ok(settings) => settings,
            Err(err) => {
                warn!("instrument settings {}: {err}; using defaults", path.display());
                Self::default()
            }
        }
    }
}
