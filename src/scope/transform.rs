use crate::scope::config::{InstrumentSettings, ViewSettings, HALF_DIVISIONS, RANGE_MARGIN};
use crate::scope::view::{AxisRanges, PlotDescriptor, Series};
use crate::synth::model::{ChannelKind, SystemSnapshot};
use crate::synth::synthesizer::{synthesize, SampleSpec, TIME_DIVISIONS};

/// Vertical range for a scale/offset pair: five divisions each way plus margin.
pub fn vertical_range(per_div: f64, offset: f64) -> (f64, f64) {
    let half = per_div * HALF_DIVISIONS * RANGE_MARGIN;
    (-half + offset, half + offset)
}

/// Horizontal range in seconds for a timebase and offset in milliseconds.
pub fn time_range(timebase_ms: f64, time_offset_ms: f64) -> (f64, f64) {
    let half = TIME_DIVISIONS * timebase_ms / 2.0 / 1000.0;
    let shift = time_offset_ms / 1000.0;
    (-half + shift, half + shift)
}

pub fn axis_ranges(settings: &ViewSettings) -> AxisRanges {
    AxisRanges {
        voltage: vertical_range(settings.voltage_per_div, settings.voltage_offset_v),
        current: vertical_range(settings.current_per_div, settings.current_offset_a),
        time: time_range(settings.timebase_ms_per_div, settings.time_offset_ms),
    }
}

/// Composes synthesized traces with the view settings into a plot descriptor.
pub struct ViewportTransform {
    instrument: InstrumentSettings,
}
impl ViewportTransform {
    pub fn new(instrument: InstrumentSettings) -> Self {
        Self { instrument }
    }
    pub fn instrument(&self) -> &InstrumentSettings {
        &self.instrument
    }
    fn sample_spec(&self, settings: &ViewSettings) -> SampleSpec {
        SampleSpec::windowed(
            self.instrument.samples_per_trace,
            settings.timebase_ms_per_div,
            settings.time_offset_ms,
        )
    }
    /// Every series is synthesized whether or not it is visible; visibility only
    /// sets the flag.
    pub fn compute(&self, snapshot: &SystemSnapshot, settings: &ViewSettings) -> PlotDescriptor {
        let spec = self.sample_spec(settings);
        let time_labels = (0..spec.count).map(|i| spec.x_at(i)).collect();
        let mut series = Vec::with_capacity(snapshot.len() * 2);
        for phase in snapshot.phases() {
            let visibility = settings.visibility(phase.id);
            for kind in ChannelKind::ALL {
                let trace = phase
                    .channel(kind)
                    .and_then(|ch| synthesize(ch, &spec, self.instrument.full_scale(kind)));
                let available = trace.is_some();
                series.push(Series {
                    phase_id: phase.id,
                    channel_kind: kind,
                    samples: trace
                        .map(|t| t.into_iter().map(|p| p.y).collect())
                        .unwrap_or_default(),
                    order: series.len(),
                    visible: visibility.get(kind),
                    available,
                });
            }
        }
        PlotDescriptor {
            time_labels,
            series,
            ranges: axis_ranges(settings),
        }
    }
}
