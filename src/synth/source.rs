use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scope::state::{ChannelEdit, EditTarget};
use crate::synth::model::{
    Channel, ChannelField, ChannelKind, Harmonic, PhaseUnit, SystemSnapshot,
};
use crate::synth::ScopeError;

/// One harmonic as it arrives on the wire; every field may be missing.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct HarmonicRecord {
    pub id: Option<u32>,
    pub order: Option<f64>,
    pub amplitude: Option<f64>,
    pub phase: Option<f64>,
}

/// One synthesizer record of the live feed. Channel `a` is voltage, `b` is current.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SynthRecord {
    pub id: Option<u32>,
    pub amplitude_a: Option<f64>,
    pub frequency_a: Option<f64>,
    pub phase_a: Option<f64>,
    #[serde(default)]
    pub harmonics_a: Value,
    pub amplitude_b: Option<f64>,
    pub frequency_b: Option<f64>,
    pub phase_b: Option<f64>,
    #[serde(default)]
    pub harmonics_b: Value,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct FeedPayload {
    #[serde(default)]
    pub synths: Vec<SynthRecord>,
}
impl FeedPayload {
    pub fn from_json(text: &str) -> Result<Self, ScopeError> {
        Ok(serde_json::from_str(text)?)
    }
    /// Validates the records once; everything downstream assumes the checked shape.
    pub fn into_snapshot(self) -> SystemSnapshot {
        let phases = self
            .synths
            .iter()
            .enumerate()
            .map(|(idx, rec)| PhaseUnit {
                id: rec.id.unwrap_or(idx as u32),
                voltage: channel_from_fields(
                    rec.amplitude_a,
                    rec.frequency_a,
                    rec.phase_a,
                    &rec.harmonics_a,
                ),
                current: channel_from_fields(
                    rec.amplitude_b,
                    rec.frequency_b,
                    rec.phase_b,
                    &rec.harmonics_b,
                ),
            })
            .collect();
        SystemSnapshot::new(phases)
    }
}

fn channel_from_fields(
    amplitude: Option<f64>,
    frequency: Option<f64>,
    phase: Option<f64>,
    harmonics: &Value,
) -> Option<Channel> {
    let amplitude = amplitude.filter(|v| v.is_finite())?;
    let frequency = frequency.filter(|v| v.is_finite() && *v > 0.0)?;
    let phase = phase.filter(|v| v.is_finite())?;
    Some(Channel::new(amplitude, phase, frequency).with_harmonics(harmonics_from_value(harmonics)))
}

/// A non-list value (older state files store a bare `0.0`) means no harmonics.
pub(crate) fn harmonics_from_value(value: &Value) -> Vec<Harmonic> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let rec: HarmonicRecord = match serde_json::from_value(item.clone()) {
                Ok(rec) => rec,
                Err(err) => {
                    debug!("dropping malformed harmonic #{idx}: {err}");
                    return None;
                }
            };
            let order = rec.order.filter(|o| o.is_finite() && *o >= 1.0 && o.fract() == 0.0)?;
            let amplitude = rec.amplitude.filter(|a| a.is_finite())?;
            let phase = rec.phase.unwrap_or(0.0);
            if !phase.is_finite() {
                return None;
            }
            Some(Harmonic::new(
                rec.id.unwrap_or(idx as u32),
                order as u32,
                amplitude,
                phase,
            ))
        })
        .collect()
}

impl SynthRecord {
    /// Writes one operator edit into the record, in wire form.
    fn apply(&mut self, kind: ChannelKind, target: &EditTarget) {
        let (amplitude, frequency, phase, harmonics) = match kind {
            ChannelKind::Voltage => (
                &mut self.amplitude_a,
                &mut self.frequency_a,
                &mut self.phase_a,
                &mut self.harmonics_a,
            ),
            ChannelKind::Current => (
                &mut self.amplitude_b,
                &mut self.frequency_b,
                &mut self.phase_b,
                &mut self.harmonics_b,
            ),
        };
        match target {
            EditTarget::Field(ChannelField::Amplitude, value) => *amplitude = Some(*value),
            EditTarget::Field(ChannelField::Frequency, value) => *frequency = Some(*value),
            EditTarget::Field(ChannelField::Phase, value) => *phase = Some(*value),
            EditTarget::Harmonics(list) => match serde_json::to_value(list) {
                Ok(value) => *harmonics = value,
                Err(err) => debug!("dropping harmonics edit: {err}"),
            },
        }
    }
}

/// Trait representing something that pushes snapshots on demand.
pub trait SnapshotSource {
    fn next_snapshot(&mut self) -> Result<Option<SystemSnapshot>, ScopeError>;
    /// Sources that cannot pause ignore this.
    fn set_paused(&mut self, _paused: bool) {}
    /// Forwards operator edits to whatever produces the values, so later
    /// snapshots carry them. Playback sources ignore this.
    fn apply_edits(&mut self, _edits: &[ChannelEdit]) {}
}

/// In-memory source useful for tests and deterministic playback.
pub struct ManualSource {
    queue: VecDeque<SystemSnapshot>,
}
impl ManualSource {
    pub fn new(snapshots: impl IntoIterator<Item = SystemSnapshot>) -> Self {
        Self {
            queue: snapshots.into_iter().collect(),
        }
    }
}
impl SnapshotSource for ManualSource {
    fn next_snapshot(&mut self) -> Result<Option<SystemSnapshot>, ScopeError> {
        Ok(self.queue.pop_front())
    }
}

/// Three-phase test signal: a slowly rotating 3rd harmonic on the current with a
/// little amplitude jitter. While paused it keeps emitting identical values.
pub struct SimulatedSource {
    rng: StdRng,
    started_at: Instant,
    last_emit: Option<Instant>,
    interval: Duration,
    paused: bool,
    frozen: Option<FeedPayload>,
    // latest edit per synth, channel and field; later edits of a key win
    programmed: BTreeMap<(usize, ChannelKind, Option<ChannelField>), EditTarget>,
}
impl SimulatedSource {
    pub fn new(interval: Duration) -> Self {
        Self::with_rng(StdRng::from_entropy(), interval)
    }
    pub fn with_seed(seed: u64, interval: Duration) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), interval)
    }
    fn with_rng(rng: StdRng, interval: Duration) -> Self {
        Self {
            rng,
            started_at: Instant::now(),
            last_emit: None,
            interval,
            paused: false,
            frozen: None,
            programmed: BTreeMap::new(),
        }
    }
    /// Feed payload at `elapsed` seconds after start.
    pub fn payload_at(&mut self, elapsed: f64) -> FeedPayload {
        // 5 second sweep of the harmonic phase, -180..180
        let sweep = (elapsed * 360.0 / 5.0) % 360.0 - 180.0;
        let synths = (0..3u32)
            .map(|idx| {
                let offset = idx as f64 * 120.0;
                let jitter: f64 = self.rng.gen_range(-0.5..0.5);
                SynthRecord {
                    id: Some(idx),
                    amplitude_a: Some(92.0 + jitter),
                    frequency_a: Some(50.0),
                    phase_a: Some(offset),
                    harmonics_a: serde_json::json!([
                        {"id": 0, "order": 5, "amplitude": 3.0, "phase": 0.0}
                    ]),
                    amplitude_b: Some(50.0 + jitter),
                    frequency_b: Some(50.0),
                    phase_b: Some(offset + 30.0),
                    harmonics_b: serde_json::json!([
                        {"id": 0, "order": 3, "amplitude": 20.0, "phase": sweep},
                        {"id": 1, "order": 5, "amplitude": 8.0, "phase": 0.0}
                    ]),
                }
            })
            .collect();
        FeedPayload { synths }
    }
    fn program(&self, payload: &mut FeedPayload) {
        for ((index, kind, _), target) in &self.programmed {
            if let Some(record) = payload.synths.get_mut(*index) {
                record.apply(*kind, target);
            }
        }
    }
}
impl SnapshotSource for SimulatedSource {
    fn apply_edits(&mut self, edits: &[ChannelEdit]) {
        for edit in edits {
            let field = match edit.target {
                EditTarget::Field(field, _) => Some(field),
                EditTarget::Harmonics(_) => None,
            };
            self.programmed
                .insert((edit.phase_index, edit.kind, field), edit.target.clone());
        }
        if let Some(frozen) = self.frozen.as_mut() {
            for edit in edits {
                if let Some(record) = frozen.synths.get_mut(edit.phase_index) {
                    record.apply(edit.kind, &edit.target);
                }
            }
        }
        debug!("{} edit(s) programmed into the simulated feed", edits.len());
    }
    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        if !paused {
            self.frozen = None;
        }
    }
    fn next_snapshot(&mut self) -> Result<Option<SystemSnapshot>, ScopeError> {
        let now = Instant::now();
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < self.interval {
                return Ok(None);
            }
        }
        self.last_emit = Some(now);
        let payload = if self.paused {
            match &self.frozen {
                Some(frozen) => frozen.clone(),
                None => {
                    let elapsed = self.started_at.elapsed().as_secs_f64();
                    let mut payload = self.payload_at(elapsed);
                    self.program(&mut payload);
                    self.frozen = Some(payload.clone());
                    payload
                }
            }
        } else {
            let elapsed = self.started_at.elapsed().as_secs_f64();
            let mut payload = self.payload_at(elapsed);
            self.program(&mut payload);
            payload
        };
        Ok(Some(payload.into_snapshot()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::model::ChannelKind;

    const FEED: &str = r#"{
        "synths": [
            {"id": 7, "amplitude_a": 120, "frequency_a": 50, "phase_a": -90,
             "harmonics_a": [{"id": 3, "order": 3, "amplitude": 30, "phase": 400},
                             {"id": 4, "order": 0, "amplitude": 10},
                             {"id": 5, "order": 2.5, "amplitude": 10},
                             "garbage"],
             "amplitude_b": 50, "frequency_b": 50, "phase_b": 30, "harmonics_b": 0.0},
            {"amplitude_a": 100, "frequency_a": 50,
             "amplitude_b": 50, "frequency_b": 50, "phase_b": 0}
        ]
    }"#;

    #[test]
    fn feed_is_validated_at_the_boundary() {
        let snap = FeedPayload::from_json(FEED).unwrap().into_snapshot();
        assert_eq!(snap.len(), 2);
        let l1 = &snap.phases()[0];
        assert_eq!(l1.id, 7);
        let v = l1.channel(ChannelKind::Voltage).unwrap();
        assert_eq!(v.amplitude_rms_percent, 100.0);
        assert_eq!(v.phase_deg, 270.0);
        assert_eq!(v.harmonics.len(), 1);
        assert_eq!(v.harmonics[0].id, 3);
        assert!((v.harmonics[0].phase - 40.0).abs() < 1e-12);
        assert!(l1.current.as_ref().unwrap().harmonics.is_empty());
        // phase_a missing on the second synth
        let l2 = &snap.phases()[1];
        assert_eq!(l2.id, 1);
        assert!(l2.voltage.is_none());
        assert!(l2.current.is_some());
    }

    #[test]
    fn malformed_feed_is_an_error_not_a_panic() {
        assert!(FeedPayload::from_json("{\"synths\": 3}").is_err());
        assert!(FeedPayload::from_json("{}").unwrap().into_snapshot().is_empty());
    }

    #[test]
    fn equal_payloads_give_equal_snapshots() {
        let a = FeedPayload::from_json(FEED).unwrap().into_snapshot();
        let b = FeedPayload::from_json(FEED).unwrap().into_snapshot();
        assert_eq!(a, b);
    }

    #[test]
    fn manual_source_drains_in_order() {
        let a = FeedPayload::from_json(FEED).unwrap().into_snapshot();
        let mut source = ManualSource::new(vec![a.clone(), SystemSnapshot::default()]);
        assert_eq!(source.next_snapshot().unwrap(), Some(a));
        assert_eq!(source.next_snapshot().unwrap(), Some(SystemSnapshot::default()));
        assert_eq!(source.next_snapshot().unwrap(), None);
    }

    #[test]
    fn simulated_source_pauses_on_identical_values() {
        let mut source = SimulatedSource::with_seed(7, Duration::ZERO);
        let payload = source.payload_at(1.25);
        let snap = payload.into_snapshot();
        assert_eq!(snap.len(), 3);
        assert!(snap.phases().iter().all(|p| p.voltage.is_some() && p.current.is_some()));

        source.set_paused(true);
        let first = source.next_snapshot().unwrap().unwrap();
        let second = source.next_snapshot().unwrap().unwrap();
        assert_eq!(first, second);
    }

    fn edit(phase_index: usize, kind: ChannelKind, target: EditTarget) -> ChannelEdit {
        ChannelEdit {
            phase_index,
            phase_id: phase_index as u32,
            kind,
            target,
        }
    }

    fn voltage(snapshot: &SystemSnapshot, index: usize) -> Channel {
        snapshot.phases()[index].voltage.clone().unwrap()
    }

    #[test]
    fn edits_survive_the_next_paused_frame() {
        let mut source = SimulatedSource::with_seed(3, Duration::ZERO);
        source.set_paused(true);
        let before = source.next_snapshot().unwrap().unwrap();
        assert_ne!(voltage(&before, 0).amplitude_rms_percent, 10.0);

        source.apply_edits(&[edit(
            0,
            ChannelKind::Voltage,
            EditTarget::Field(ChannelField::Amplitude, 10.0),
        )]);
        for _ in 0..3 {
            let snap = source.next_snapshot().unwrap().unwrap();
            assert_eq!(voltage(&snap, 0).amplitude_rms_percent, 10.0);
            // untouched phases keep their frozen values
            assert_eq!(voltage(&snap, 1), voltage(&before, 1));
        }
    }

    #[test]
    fn edits_survive_resume_and_live_frames() {
        let mut source = SimulatedSource::with_seed(3, Duration::ZERO);
        let harmonics = vec![Harmonic::new(0, 7, 12.0, 45.0)];
        source.apply_edits(&[
            edit(2, ChannelKind::Current, EditTarget::Field(ChannelField::Frequency, 60.0)),
            edit(2, ChannelKind::Current, EditTarget::Harmonics(harmonics.clone())),
            edit(2, ChannelKind::Current, EditTarget::Field(ChannelField::Frequency, 400.0)),
            // no such synth, ignored
            edit(5, ChannelKind::Voltage, EditTarget::Field(ChannelField::Phase, 10.0)),
        ]);
        source.set_paused(true);
        source.next_snapshot().unwrap();
        source.set_paused(false);
        for _ in 0..3 {
            let snap = source.next_snapshot().unwrap().unwrap();
            let current = snap.phases()[2].current.clone().unwrap();
            assert_eq!(current.frequency_hz, 400.0);
            assert_eq!(current.harmonics, harmonics);
            assert_eq!(snap.phases()[0].current.as_ref().unwrap().frequency_hz, 50.0);
        }
    }
}
