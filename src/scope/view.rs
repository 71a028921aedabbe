use serde::Serialize;

use crate::scope::config::{HALF_DIVISIONS, RANGE_MARGIN};
use crate::synth::model::{ChannelKind, PhaseId};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Series {
    pub phase_id: PhaseId,
    pub channel_kind: ChannelKind,
    /// Values aligned with `PlotDescriptor::time_labels`; empty when unavailable.
    pub samples: Vec<f64>,
    /// Draw order, back to front.
    pub order: usize,
    pub visible: bool,
    /// False when the channel had undefined fields and produced no data.
    pub available: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AxisRanges {
    pub voltage: (f64, f64),
    pub current: (f64, f64),
    /// Seconds.
    pub time: (f64, f64),
}

/// Render-ready description of one scope frame. Independent of any plotting library.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlotDescriptor {
    /// Shared time axis in seconds.
    pub time_labels: Vec<f64>,
    pub series: Vec<Series>,
    pub ranges: AxisRanges,
}
impl PlotDescriptor {
    pub fn visible_series(&self) -> impl Iterator<Item = &Series> {
        self.series.iter().filter(|s| s.visible && s.available)
    }
    pub fn series_for(&self, phase_id: PhaseId, kind: ChannelKind) -> Option<&Series> {
        self.series
            .iter()
            .find(|s| s.phase_id == phase_id && s.channel_kind == kind)
    }
    pub fn range_for(&self, kind: ChannelKind) -> (f64, f64) {
        match kind {
            ChannelKind::Voltage => self.ranges.voltage,
            ChannelKind::Current => self.ranges.current,
        }
    }
    /// Maps a value onto the shared division grid, so voltage and current traces
    /// can be drawn against one vertical axis.
    pub fn to_divisions(&self, kind: ChannelKind, value: f64) -> f64 {
        let (lo, hi) = self.range_for(kind);
        let span = DIVISION_SPAN.1 - DIVISION_SPAN.0;
        DIVISION_SPAN.0 + (value - lo) / (hi - lo) * span
    }
}

/// Vertical extent of every range in divisions, margin included.
pub const DIVISION_SPAN: (f64, f64) = (-HALF_DIVISIONS * RANGE_MARGIN, HALF_DIVISIONS * RANGE_MARGIN);
