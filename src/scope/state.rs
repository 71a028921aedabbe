use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::scope::config::{
    OffsetAxis, ScaleAxis, SelectionMode, Step, UiSelection, ViewSettings, OFFSET_STEP_FRACTION,
};
use crate::scope::defaults::{builtin_defaults, ChannelDefaults, DefaultsProvider};
use crate::scope::store::{SettingsStore, UI_SELECTION_KEY, VIEW_SETTINGS_KEY};
use crate::synth::model::{
    Channel, ChannelField, ChannelKind, Harmonic, HarmonicField, PhaseId, SystemSnapshot,
    MAX_HARMONICS, MAX_PHASES,
};
use crate::synth::presets::Waveform;
use crate::synth::ScopeError;

/// Parses a directly entered number. Rejects text that is not a finite number.
pub fn parse_entry(text: &str) -> Result<f64, ScopeError> {
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ScopeError::InvalidEntry(text.to_owned())),
    }
}

/// What changed on a channel, for whoever drives the synthesizers.
#[derive(Clone, Debug, PartialEq)]
pub enum EditTarget {
    Field(ChannelField, f64),
    Harmonics(Vec<Harmonic>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChannelEdit {
    pub phase_index: usize,
    pub phase_id: PhaseId,
    pub kind: ChannelKind,
    pub target: EditTarget,
}

/// Single owner of the view settings, the operator selection and the live
/// snapshot. Every mutator applies the change, persists the durable part and
/// marks the view dirty, in that order.
pub struct ViewState<S: SettingsStore> {
    store: S,
    settings: ViewSettings,
    selection: UiSelection,
    snapshot: Option<SystemSnapshot>,
    dirty: bool,
}

impl<S: SettingsStore> ViewState<S> {
    /// Loads the durable settings once. Store or parse failures are logged and
    /// fall back to defaults.
    pub fn load(store: S) -> Self {
        let settings = read_blob::<ViewSettings, S>(&store, VIEW_SETTINGS_KEY)
            .map(ViewSettings::sanitized)
            .unwrap_or_default();
        let selection = read_blob::<UiSelection, S>(&store, UI_SELECTION_KEY).unwrap_or_default();
        info!(
            "view state loaded: {} V/div, {} A/div, {} ms/div",
            settings.voltage_per_div, settings.current_per_div, settings.timebase_ms_per_div
        );
        Self {
            store,
            settings,
            selection,
            snapshot: None,
            dirty: true,
        }
    }
    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }
    pub fn selection(&self) -> &UiSelection {
        &self.selection
    }
    pub fn snapshot(&self) -> Option<&SystemSnapshot> {
        self.snapshot.as_ref()
    }
    pub fn store(&self) -> &S {
        &self.store
    }
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
    /// Clears the dirty flag, returning whether a recompute was due.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    fn commit(&mut self) {
        self.persist();
        self.dirty = true;
    }
    fn persist(&mut self) {
        write_blob(&mut self.store, VIEW_SETTINGS_KEY, &self.settings);
        write_blob(&mut self.store, UI_SELECTION_KEY, &self.selection);
    }

    // --- scales ---

    /// Snaps `value` to the axis ladder and returns the stored ladder member.
    pub fn set_scale(&mut self, axis: ScaleAxis, value: f64) -> Result<f64, ScopeError> {
        if !value.is_finite() {
            return Err(ScopeError::InvalidEntry(value.to_string()));
        }
        let snapped = axis.ladder().snap(value);
        *self.settings.scale_mut(axis) = snapped;
        self.commit();
        Ok(snapped)
    }
    pub fn step_scale(&mut self, axis: ScaleAxis, step: Step) -> f64 {
        let ladder = axis.ladder();
        let current = self.settings.scale(axis);
        let next = match step {
            Step::Up => ladder.step_up(current),
            Step::Down => ladder.step_down(current),
        };
        *self.settings.scale_mut(axis) = next;
        self.commit();
        next
    }
    pub fn enter_scale(&mut self, axis: ScaleAxis, text: &str) -> Result<f64, ScopeError> {
        let value = parse_entry(text)?;
        if value <= 0.0 {
            return Err(ScopeError::OutOfRange {
                field: axis.name(),
                value,
                min: axis.ladder().min(),
                max: axis.ladder().max(),
            });
        }
        self.set_scale(axis, value)
    }
    pub fn set_voltage_scale(&mut self, value: f64) -> Result<f64, ScopeError> {
        self.set_scale(ScaleAxis::Voltage, value)
    }
    pub fn step_voltage_scale_up(&mut self) -> f64 {
        self.step_scale(ScaleAxis::Voltage, Step::Up)
    }
    pub fn step_voltage_scale_down(&mut self) -> f64 {
        self.step_scale(ScaleAxis::Voltage, Step::Down)
    }
    pub fn set_current_scale(&mut self, value: f64) -> Result<f64, ScopeError> {
        self.set_scale(ScaleAxis::Current, value)
    }
    pub fn step_current_scale_up(&mut self) -> f64 {
        self.step_scale(ScaleAxis::Current, Step::Up)
    }
    pub fn step_current_scale_down(&mut self) -> f64 {
        self.step_scale(ScaleAxis::Current, Step::Down)
    }
    pub fn set_timebase(&mut self, value: f64) -> Result<f64, ScopeError> {
        self.set_scale(ScaleAxis::Timebase, value)
    }
    pub fn step_timebase_up(&mut self) -> f64 {
        self.step_scale(ScaleAxis::Timebase, Step::Up)
    }
    pub fn step_timebase_down(&mut self) -> f64 {
        self.step_scale(ScaleAxis::Timebase, Step::Down)
    }

    // --- offsets ---

    pub fn set_offset(&mut self, axis: OffsetAxis, value: f64) -> Result<f64, ScopeError> {
        if !value.is_finite() {
            return Err(ScopeError::InvalidEntry(value.to_string()));
        }
        *self.settings.offset_mut(axis) = value;
        self.commit();
        Ok(value)
    }
    /// Moves the offset by a quarter of the current division width.
    pub fn step_offset(&mut self, axis: OffsetAxis, step: Step) -> f64 {
        let delta = self.settings.scale(axis.scale_axis()) * OFFSET_STEP_FRACTION;
        let offset = self.settings.offset_mut(axis);
        match step {
            Step::Up => *offset += delta,
            Step::Down => *offset -= delta,
        }
        let value = *offset;
        self.commit();
        value
    }
    pub fn enter_offset(&mut self, axis: OffsetAxis, text: &str) -> Result<f64, ScopeError> {
        let value = parse_entry(text)?;
        self.set_offset(axis, value)
    }
    pub fn step_time_offset_up(&mut self) -> f64 {
        self.step_offset(OffsetAxis::Time, Step::Up)
    }
    pub fn step_time_offset_down(&mut self) -> f64 {
        self.step_offset(OffsetAxis::Time, Step::Down)
    }
    pub fn step_voltage_offset_up(&mut self) -> f64 {
        self.step_offset(OffsetAxis::Voltage, Step::Up)
    }
    pub fn step_voltage_offset_down(&mut self) -> f64 {
        self.step_offset(OffsetAxis::Voltage, Step::Down)
    }
    pub fn step_current_offset_up(&mut self) -> f64 {
        self.step_offset(OffsetAxis::Current, Step::Up)
    }
    pub fn step_current_offset_down(&mut self) -> f64 {
        self.step_offset(OffsetAxis::Current, Step::Down)
    }
    pub fn reset_offsets(&mut self) {
        for axis in [OffsetAxis::Time, OffsetAxis::Voltage, OffsetAxis::Current] {
            *self.settings.offset_mut(axis) = 0.0;
        }
        self.commit();
    }

    // --- visibility and selection ---

    pub fn set_visibility(&mut self, phase_id: PhaseId, kind: ChannelKind, visible: bool) {
        self.settings
            .phase_visibility
            .entry(phase_id)
            .or_default()
            .set(kind, visible);
        self.commit();
    }
    pub fn toggle_visibility(&mut self, phase_id: PhaseId, kind: ChannelKind) -> bool {
        let visible = !self.settings.visibility(phase_id).get(kind);
        self.set_visibility(phase_id, kind, visible);
        visible
    }
    pub fn select_phase(&mut self, index: usize) -> Result<(), ScopeError> {
        let limit = self.snapshot.as_ref().map_or(MAX_PHASES, |s| s.len());
        if index >= limit {
            return Err(ScopeError::UnknownPhase(index));
        }
        self.selection.active_phase = index;
        self.commit();
        Ok(())
    }
    pub fn set_selection_mode(&mut self, mode: SelectionMode) {
        self.selection.mode = mode;
        self.commit();
    }
    pub fn open_panel(&mut self, panel: Option<String>) {
        self.selection.open_panel = panel;
        self.commit();
    }

    // --- live data ---

    /// Replaces the held snapshot. Returns false, without marking dirty, when the
    /// new snapshot is value-equal to the current one.
    pub fn ingest_snapshot(&mut self, snapshot: SystemSnapshot) -> bool {
        if self.snapshot.as_ref() == Some(&snapshot) {
            debug!("discarding unchanged snapshot");
            return false;
        }
        self.snapshot = Some(snapshot);
        self.dirty = true;
        true
    }

    fn target_phases(&self) -> Result<Vec<usize>, ScopeError> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or(ScopeError::UnknownPhase(self.selection.active_phase))?;
        match self.selection.mode {
            SelectionMode::All => Ok((0..snapshot.len()).collect()),
            SelectionMode::Single if self.selection.active_phase < snapshot.len() => {
                Ok(vec![self.selection.active_phase])
            }
            SelectionMode::Single => Err(ScopeError::UnknownPhase(self.selection.active_phase)),
        }
    }

    /// Builds the edited snapshot first, so a failure leaves everything untouched.
    fn apply_edits(
        &mut self,
        edits: Vec<(usize, ChannelKind, Channel)>,
        targets: Vec<EditTarget>,
    ) -> Result<Vec<ChannelEdit>, ScopeError> {
        let mut snapshot = self
            .snapshot
            .clone()
            .ok_or(ScopeError::UnknownPhase(self.selection.active_phase))?;
        let mut applied = Vec::with_capacity(edits.len());
        for ((index, kind, channel), target) in edits.into_iter().zip(targets) {
            snapshot = snapshot.with_channel(index, kind, channel)?;
            let phase_id = snapshot
                .phase(index)
                .map(|p| p.id)
                .ok_or(ScopeError::UnknownPhase(index))?;
            applied.push(ChannelEdit {
                phase_index: index,
                phase_id,
                kind,
                target,
            });
        }
        self.snapshot = Some(snapshot);
        self.commit();
        Ok(applied)
    }

    fn existing_channel(&self, index: usize, kind: ChannelKind) -> Result<Channel, ScopeError> {
        let phase = self
            .snapshot
            .as_ref()
            .and_then(|s| s.phase(index))
            .ok_or(ScopeError::UnknownPhase(index))?;
        phase
            .channel(kind)
            .cloned()
            .ok_or(ScopeError::ChannelUnavailable(index, kind.label()))
    }

    /// Direct value entry on one channel of one phase.
    pub fn edit_channel(
        &mut self,
        index: usize,
        kind: ChannelKind,
        field: ChannelField,
        text: &str,
    ) -> Result<ChannelEdit, ScopeError> {
        let value = field.validate(parse_entry(text)?)?;
        let channel = self.existing_channel(index, kind)?.with_field(field, value);
        let stored = channel.field(field);
        let mut applied = self.apply_edits(
            vec![(index, kind, channel)],
            vec![EditTarget::Field(field, stored)],
        )?;
        applied.pop().ok_or(ScopeError::UnknownPhase(index))
    }

    /// Restores one field from the defaults table on the selected phase(s).
    /// A channel with no data is rebuilt entirely from its defaults.
    pub fn reset_field<D: DefaultsProvider>(
        &mut self,
        kind: ChannelKind,
        field: ChannelField,
        defaults: &D,
    ) -> Result<Vec<ChannelEdit>, ScopeError> {
        let mut edits = Vec::new();
        let mut targets = Vec::new();
        for index in self.target_phases()? {
            let d = checked_defaults(defaults.channel_defaults(index, kind), kind);
            let channel = match self.existing_channel(index, kind) {
                Ok(channel) => channel.with_field(field, d.field(field)),
                Err(_) => Channel::new(d.amplitude, d.phase, d.frequency).with_harmonics(d.harmonics),
            };
            targets.push(EditTarget::Field(field, channel.field(field)));
            edits.push((index, kind, channel));
        }
        info!("reset {} {} on {} phase(s)", kind.label(), field.name(), edits.len());
        self.apply_edits(edits, targets)
    }

    pub fn reset_harmonics<D: DefaultsProvider>(
        &mut self,
        kind: ChannelKind,
        defaults: &D,
    ) -> Result<Vec<ChannelEdit>, ScopeError> {
        let mut edits = Vec::new();
        let mut targets = Vec::new();
        for index in self.target_phases()? {
            let d = checked_defaults(defaults.channel_defaults(index, kind), kind);
            let channel = match self.existing_channel(index, kind) {
                Ok(channel) => channel.with_harmonics(d.harmonics.clone()),
                Err(_) => Channel::new(d.amplitude, d.phase, d.frequency)
                    .with_harmonics(d.harmonics.clone()),
            };
            targets.push(EditTarget::Harmonics(d.harmonics));
            edits.push((index, kind, channel));
        }
        self.apply_edits(edits, targets)
    }

    // --- single harmonics, addressed by id ---

    fn commit_harmonics(
        &mut self,
        index: usize,
        kind: ChannelKind,
        channel: Channel,
    ) -> Result<ChannelEdit, ScopeError> {
        let harmonics = channel.harmonics.clone();
        let mut applied = self.apply_edits(
            vec![(index, kind, channel)],
            vec![EditTarget::Harmonics(harmonics)],
        )?;
        applied.pop().ok_or(ScopeError::UnknownPhase(index))
    }

    /// Direct entry on one field of one harmonic.
    pub fn edit_harmonic(
        &mut self,
        index: usize,
        kind: ChannelKind,
        harmonic_id: u32,
        field: HarmonicField,
        text: &str,
    ) -> Result<ChannelEdit, ScopeError> {
        let value = field.validate(parse_entry(text)?)?;
        let mut channel = self.existing_channel(index, kind)?;
        let slot = channel
            .harmonics
            .iter_mut()
            .find(|h| h.id == harmonic_id)
            .ok_or(ScopeError::UnknownHarmonic(harmonic_id))?;
        *slot = slot.clone().with_field(field, value);
        self.commit_harmonics(index, kind, channel)
    }

    /// Appends a harmonic under the lowest free id.
    pub fn add_harmonic(
        &mut self,
        index: usize,
        kind: ChannelKind,
        order: u32,
        amplitude: f64,
        phase: f64,
    ) -> Result<ChannelEdit, ScopeError> {
        let order = HarmonicField::Order.validate(order as f64)? as u32;
        let amplitude = HarmonicField::Amplitude.validate(amplitude)?;
        if !phase.is_finite() {
            return Err(ScopeError::InvalidEntry(phase.to_string()));
        }
        let mut channel = self.existing_channel(index, kind)?;
        if channel.harmonics.len() >= MAX_HARMONICS {
            return Err(ScopeError::HarmonicSlotsFull(MAX_HARMONICS));
        }
        let id = (0u32..)
            .find(|id| channel.harmonics.iter().all(|h| h.id != *id))
            .unwrap_or_default();
        channel
            .harmonics
            .push(Harmonic::new(id, order, amplitude, phase));
        debug!("added harmonic {id} (order {order}) to {} of phase {index}", kind.label());
        self.commit_harmonics(index, kind, channel)
    }

    pub fn remove_harmonic(
        &mut self,
        index: usize,
        kind: ChannelKind,
        harmonic_id: u32,
    ) -> Result<ChannelEdit, ScopeError> {
        let mut channel = self.existing_channel(index, kind)?;
        let before = channel.harmonics.len();
        channel.harmonics.retain(|h| h.id != harmonic_id);
        if channel.harmonics.len() == before {
            return Err(ScopeError::UnknownHarmonic(harmonic_id));
        }
        self.commit_harmonics(index, kind, channel)
    }

    /// Restores the harmonic with `harmonic_id` from the defaults on the
    /// selected phase(s). Without a default for that id the harmonic is removed.
    pub fn reset_harmonic<D: DefaultsProvider>(
        &mut self,
        kind: ChannelKind,
        harmonic_id: u32,
        defaults: &D,
    ) -> Result<Vec<ChannelEdit>, ScopeError> {
        let mut edits = Vec::new();
        let mut targets = Vec::new();
        for index in self.target_phases()? {
            let d = checked_defaults(defaults.channel_defaults(index, kind), kind);
            let mut channel = match self.existing_channel(index, kind) {
                Ok(channel) => channel,
                Err(_) => Channel::new(d.amplitude, d.phase, d.frequency),
            };
            let default = d.harmonics.into_iter().find(|h| h.id == harmonic_id);
            let slot = channel.harmonics.iter().position(|h| h.id == harmonic_id);
            match (slot, default) {
                (Some(pos), Some(h)) => channel.harmonics[pos] = h,
                (Some(pos), None) => {
                    channel.harmonics.remove(pos);
                }
                (None, Some(h)) if channel.harmonics.len() < MAX_HARMONICS => {
                    channel.harmonics.push(h)
                }
                (None, Some(_)) => return Err(ScopeError::HarmonicSlotsFull(MAX_HARMONICS)),
                (None, None) => {}
            }
            targets.push(EditTarget::Harmonics(channel.harmonics.clone()));
            edits.push((index, kind, channel));
        }
        self.apply_edits(edits, targets)
    }

    /// Replaces a channel's harmonics with a waveform preset series.
    pub fn apply_preset(
        &mut self,
        index: usize,
        kind: ChannelKind,
        waveform: Waveform,
        count: usize,
        amplitude_percent: f64,
    ) -> Result<ChannelEdit, ScopeError> {
        let channel = self.existing_channel(index, kind)?;
        let harmonics = waveform.harmonics(count, amplitude_percent);
        let channel = channel.with_harmonics(harmonics.clone());
        let mut applied = self.apply_edits(
            vec![(index, kind, channel)],
            vec![EditTarget::Harmonics(harmonics)],
        )?;
        applied.pop().ok_or(ScopeError::UnknownPhase(index))
    }
}

/// Defaults come from an operator-editable file; anything outside the
/// direct-entry ranges is replaced by the built-in value.
fn checked_defaults(mut d: ChannelDefaults, kind: ChannelKind) -> ChannelDefaults {
    let builtin = builtin_defaults(kind);
    for field in [ChannelField::Amplitude, ChannelField::Frequency, ChannelField::Phase] {
        let value = match field.validate(d.field(field)) {
            Ok(value) => value,
            Err(err) => {
                warn!("default {} {}: {err}; using the built-in value", kind.label(), field.name());
                builtin.field(field)
            }
        };
        match field {
            ChannelField::Amplitude => d.amplitude = value,
            ChannelField::Frequency => d.frequency = value,
            ChannelField::Phase => d.phase = value,
        }
    }
    d
}

fn read_blob<T: DeserializeOwned, S: SettingsStore>(store: &S, key: &str) -> Option<T> {
    match store.get(key) {
        Ok(Some(text)) => match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("stored {key} is unreadable ({err}); using defaults");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            warn!("could not read {key}: {err}; using defaults");
            None
        }
    }
}

fn write_blob<T: Serialize, S: SettingsStore>(store: &mut S, key: &str, value: &T) {
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(err) => {
            warn!("could not serialize {key}: {err}");
            return;
        }
    };
    if let Err(err) = store.set(key, &text) {
        warn!("could not persist {key}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::defaults::DefaultsTable;
    use crate::scope::ladder::VOLTAGE_LADDER;
    use crate::scope::store::MemoryStore;
    use crate::synth::model::PhaseUnit;

    fn three_phase() -> SystemSnapshot {
        SystemSnapshot::new(
            (0..3)
                .map(|i| PhaseUnit {
                    id: i,
                    voltage: Some(Channel::new(92.0, i as f64 * 120.0, 50.0)),
                    current: Some(Channel::new(40.0, i as f64 * 120.0 + 30.0, 50.0)),
                })
                .collect(),
        )
    }

    fn loaded() -> ViewState<MemoryStore> {
        let mut state = ViewState::load(MemoryStore::new());
        state.ingest_snapshot(three_phase());
        state.take_dirty();
        state
    }

    #[test]
    fn scale_setters_always_land_on_the_ladder() {
        let mut state = loaded();
        for x in [0.0, 3.0, 74.9, 75.1, 333.0, 1e9, -50.0] {
            let v = state.set_voltage_scale(x).unwrap();
            assert!(VOLTAGE_LADDER.contains(v));
            assert_eq!(state.settings().voltage_per_div, v);
        }
        for _ in 0..10 {
            state.step_voltage_scale_up();
        }
        assert_eq!(state.step_voltage_scale_up(), 500.0);
        assert_eq!(state.settings().voltage_per_div, 500.0);
        for _ in 0..20 {
            state.step_timebase_down();
        }
        assert_eq!(state.settings().timebase_ms_per_div, 0.1);
        assert_eq!(state.step_current_scale_up(), 5.0);
        assert_eq!(state.step_current_scale_down(), 2.0);
        assert_eq!(state.set_timebase(7.0).unwrap(), 5.0);
        assert_eq!(state.set_current_scale(0.12).unwrap(), 0.1);
    }

    #[test]
    fn four_quarter_steps_make_one_division() {
        let mut state = loaded();
        state.set_voltage_scale(50.0).unwrap();
        state.set_offset(OffsetAxis::Voltage, 12.3).unwrap();
        for _ in 0..4 {
            state.step_voltage_offset_up();
        }
        assert!((state.settings().voltage_offset_v - (12.3 + 50.0)).abs() < 1e-9);
        state.step_time_offset_down();
        assert!((state.settings().time_offset_ms + 5.0 * 0.25).abs() < 1e-9);
        state.step_current_offset_up();
        state.step_current_offset_down();
        assert!(state.settings().current_offset_a.abs() < 1e-12);
        state.step_voltage_offset_down();
        state.step_time_offset_up();
        state.reset_offsets();
        assert_eq!(state.settings().voltage_offset_v, 0.0);
    }

    #[test]
    fn every_mutator_persists_then_marks_dirty() {
        let mut state = loaded();
        let before = state.store().writes();
        state.toggle_visibility(1, ChannelKind::Current);
        assert!(state.take_dirty());
        assert_eq!(state.store().writes(), before + 2);
        let saved: ViewSettings =
            serde_json::from_str(state.store().raw(VIEW_SETTINGS_KEY).unwrap()).unwrap();
        assert!(!saved.visibility(1).current);
        assert!(saved.visibility(1).voltage);

        state.select_phase(2).unwrap();
        state.open_panel(Some("harmonics".into()));
        let selection: UiSelection =
            serde_json::from_str(state.store().raw(UI_SELECTION_KEY).unwrap()).unwrap();
        assert_eq!(selection.active_phase, 2);
        assert_eq!(selection.open_panel.as_deref(), Some("harmonics"));
    }

    #[test]
    fn rejected_entry_changes_nothing() {
        let mut state = loaded();
        let settings = state.settings().clone();
        let writes = state.store().writes();
        assert!(state.enter_scale(ScaleAxis::Voltage, "abc").is_err());
        assert!(state.enter_scale(ScaleAxis::Voltage, "-5").is_err());
        assert!(state.enter_offset(OffsetAxis::Time, "NaN").is_err());
        assert!(state.set_offset(OffsetAxis::Current, f64::INFINITY).is_err());
        assert!(state
            .edit_channel(0, ChannelKind::Voltage, ChannelField::Amplitude, "101")
            .is_err());
        assert!(state
            .edit_channel(0, ChannelKind::Voltage, ChannelField::Frequency, "fast")
            .is_err());
        assert!(state.select_phase(3).is_err());
        assert_eq!(state.settings(), &settings);
        assert_eq!(state.snapshot(), Some(&three_phase()));
        assert_eq!(state.store().writes(), writes);
        assert!(!state.is_dirty());
    }

    #[test]
    fn equal_snapshot_is_discarded() {
        let mut state = loaded();
        assert!(!state.ingest_snapshot(three_phase()));
        assert!(!state.is_dirty());
        let edited = three_phase()
            .with_channel(0, ChannelKind::Voltage, Channel::new(10.0, 0.0, 50.0))
            .unwrap();
        assert!(state.ingest_snapshot(edited));
        assert!(state.is_dirty());
    }

    #[test]
    fn store_failures_are_not_fatal() {
        let mut state = ViewState::load(MemoryStore::failing());
        assert_eq!(state.settings(), &ViewSettings::default());
        assert_eq!(state.step_voltage_scale_up(), 200.0);
        assert!(state.is_dirty());
    }

    #[test]
    fn load_sanitizes_and_survives_garbage() {
        let store = MemoryStore::new()
            .with_entry(
                VIEW_SETTINGS_KEY,
                r#"{"voltagePerDiv": 260, "currentPerDiv": 1, "timebaseMsPerDiv": 10,
                    "timeOffsetMs": 2.5, "voltageOffsetV": 0, "currentOffsetA": 0}"#,
            )
            .with_entry(UI_SELECTION_KEY, "][");
        let state = ViewState::load(store);
        assert_eq!(state.settings().voltage_per_div, 200.0);
        assert_eq!(state.settings().time_offset_ms, 2.5);
        assert_eq!(state.selection(), &UiSelection::default());
        assert!(state.snapshot().is_none());
    }

    #[test]
    fn direct_channel_entry_builds_a_new_snapshot() {
        let mut state = loaded();
        let edit = state
            .edit_channel(1, ChannelKind::Current, ChannelField::Phase, " -60 ")
            .unwrap();
        assert_eq!(edit.target, EditTarget::Field(ChannelField::Phase, 300.0));
        assert_eq!(edit.phase_id, 1);
        let ch = state.snapshot().unwrap().phases()[1].current.clone().unwrap();
        assert_eq!(ch.phase_deg, 300.0);
        assert!(state.is_dirty());
        let persisted = state.store().raw(VIEW_SETTINGS_KEY).unwrap();
        assert!(!persisted.contains("phaseDeg") && !persisted.contains("harmonics"));
    }

    #[test]
    fn reset_follows_selection_mode() {
        let defaults = DefaultsTable::from_json(
            r#"[{"amplitude_a": 100, "phase_a": 0}, {"phase_a": 120}, {"phase_a": 240}]"#,
        )
        .unwrap();
        let mut state = loaded();
        for i in 0..3 {
            state
                .edit_channel(i, ChannelKind::Voltage, ChannelField::Amplitude, "10")
                .unwrap();
        }
        state.select_phase(1).unwrap();
        let edits = state
            .reset_field(ChannelKind::Voltage, ChannelField::Amplitude, &defaults)
            .unwrap();
        assert_eq!(edits.len(), 1);
        let amps: Vec<f64> = state
            .snapshot()
            .unwrap()
            .phases()
            .iter()
            .map(|p| p.voltage.as_ref().unwrap().amplitude_rms_percent)
            .collect();
        assert_eq!(amps, vec![10.0, 100.0, 10.0]);

        state.set_selection_mode(SelectionMode::All);
        let edits = state
            .reset_field(ChannelKind::Voltage, ChannelField::Amplitude, &defaults)
            .unwrap();
        assert_eq!(edits.len(), 3);
        assert!(state
            .snapshot()
            .unwrap()
            .phases()
            .iter()
            .all(|p| p.voltage.as_ref().unwrap().amplitude_rms_percent == 100.0));
    }

    #[test]
    fn reset_rebuilds_a_missing_channel() {
        let mut state = ViewState::load(MemoryStore::new());
        state.ingest_snapshot(SystemSnapshot::new(vec![PhaseUnit {
            id: 4,
            voltage: None,
            current: None,
        }]));
        let edits = state
            .reset_field(ChannelKind::Current, ChannelField::Frequency, &DefaultsTable::default())
            .unwrap();
        assert_eq!(edits[0].phase_id, 4);
        let current = state.snapshot().unwrap().phases()[0].current.clone().unwrap();
        assert_eq!(current.amplitude_rms_percent, 50.0);
        assert_eq!(current.frequency_hz, 50.0);
    }

    #[test]
    fn presets_and_harmonic_reset() {
        let mut state = loaded();
        let edit = state
            .apply_preset(0, ChannelKind::Current, Waveform::Square, 3, 100.0)
            .unwrap();
        let EditTarget::Harmonics(series) = edit.target else {
            panic!("expected a harmonics edit");
        };
        assert_eq!(series.len(), 3);
        state
            .reset_harmonics(ChannelKind::Current, &DefaultsTable::default())
            .unwrap();
        assert!(state.snapshot().unwrap().phases()[0]
            .current
            .as_ref()
            .unwrap()
            .harmonics
            .is_empty());
    }

    #[test]
    fn defaults_outside_the_entry_ranges_fall_back_to_builtins() {
        let defaults =
            DefaultsTable::from_json(r#"[{"frequency_a": 5, "amplitude_a": 250}]"#).unwrap();
        let mut state = loaded();
        state
            .reset_field(ChannelKind::Voltage, ChannelField::Frequency, &defaults)
            .unwrap();
        state
            .reset_field(ChannelKind::Voltage, ChannelField::Amplitude, &defaults)
            .unwrap();
        let v = state.snapshot().unwrap().phases()[0].voltage.clone().unwrap();
        assert_eq!(v.frequency_hz, 50.0);
        assert_eq!(v.amplitude_rms_percent, 100.0);

        let zero = DefaultsTable::from_json(r#"{"frequency_b": 0}"#).unwrap();
        let mut state = ViewState::load(MemoryStore::new());
        state.ingest_snapshot(SystemSnapshot::new(vec![PhaseUnit {
            id: 0,
            voltage: None,
            current: None,
        }]));
        state
            .reset_field(ChannelKind::Current, ChannelField::Phase, &zero)
            .unwrap();
        let current = state.snapshot().unwrap().phases()[0].current.clone().unwrap();
        assert_eq!(current.frequency_hz, 50.0);
    }

    #[test]
    fn single_harmonic_edits() {
        let mut state = loaded();
        state
            .apply_preset(1, ChannelKind::Voltage, Waveform::Square, 2, 100.0)
            .unwrap();
        let edit = state
            .edit_harmonic(1, ChannelKind::Voltage, 1, HarmonicField::Amplitude, "12.5")
            .unwrap();
        let EditTarget::Harmonics(list) = &edit.target else {
            panic!("expected a harmonics edit");
        };
        assert_eq!(list[1].amplitude, 12.5);
        state
            .edit_harmonic(1, ChannelKind::Voltage, 0, HarmonicField::Phase, "-90")
            .unwrap();
        state
            .edit_harmonic(1, ChannelKind::Voltage, 0, HarmonicField::Order, "7")
            .unwrap();
        let v = state.snapshot().unwrap().phases()[1].voltage.clone().unwrap();
        assert_eq!((v.harmonics[0].order, v.harmonics[0].phase), (7, 270.0));

        let snapshot = state.snapshot().cloned();
        let writes = state.store().writes();
        state.take_dirty();
        for (id, field, text) in [
            (0, HarmonicField::Amplitude, "120"),
            (0, HarmonicField::Order, "2.5"),
            (0, HarmonicField::Order, "0"),
            (9, HarmonicField::Phase, "10"),
        ] {
            assert!(state
                .edit_harmonic(1, ChannelKind::Voltage, id, field, text)
                .is_err());
        }
        assert!(matches!(
            state.remove_harmonic(1, ChannelKind::Voltage, 9),
            Err(ScopeError::UnknownHarmonic(9))
        ));
        assert_eq!(state.snapshot().cloned(), snapshot);
        assert_eq!(state.store().writes(), writes);
        assert!(!state.is_dirty());

        state.remove_harmonic(1, ChannelKind::Voltage, 0).unwrap();
        let edit = state
            .add_harmonic(1, ChannelKind::Voltage, 3, 20.0, 0.0)
            .unwrap();
        let EditTarget::Harmonics(list) = edit.target else {
            panic!("expected a harmonics edit");
        };
        // the freed id is reused
        assert_eq!(list.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1, 0]);
    }

    #[test]
    fn harmonic_slots_are_limited() {
        let mut state = loaded();
        for order in 0..MAX_HARMONICS as u32 {
            state
                .add_harmonic(0, ChannelKind::Current, 2 * order + 3, 1.0, 0.0)
                .unwrap();
        }
        assert!(matches!(
            state.add_harmonic(0, ChannelKind::Current, 3, 1.0, 0.0),
            Err(ScopeError::HarmonicSlotsFull(_))
        ));
        assert!(state
            .add_harmonic(0, ChannelKind::Voltage, 60, 1.0, 0.0)
            .is_err());
    }

    #[test]
    fn harmonic_reset_uses_the_default_with_the_same_id() {
        let defaults = DefaultsTable::from_json(
            r#"[{"harmonics_b": [{"id": 0, "order": 3, "amplitude": 25, "phase": 0}]}]"#,
        )
        .unwrap();
        let mut state = loaded();
        state
            .apply_preset(0, ChannelKind::Current, Waveform::Sawtooth, 2, 100.0)
            .unwrap();
        state
            .edit_harmonic(0, ChannelKind::Current, 0, HarmonicField::Amplitude, "1")
            .unwrap();
        state.reset_harmonic(ChannelKind::Current, 0, &defaults).unwrap();
        state.reset_harmonic(ChannelKind::Current, 1, &defaults).unwrap();
        let current = state.snapshot().unwrap().phases()[0].current.clone().unwrap();
        assert_eq!(current.harmonics, vec![Harmonic::new(0, 3, 25.0, 0.0)]);
        // other phases stay untouched in single mode
        assert!(state.snapshot().unwrap().phases()[1]
            .current
            .as_ref()
            .unwrap()
            .harmonics
            .is_empty());
    }
}
