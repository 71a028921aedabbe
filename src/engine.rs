// src/engine.rs
use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::scope::coalesce::SnapshotCoalescer;
use crate::scope::config::InstrumentSettings;
use crate::scope::defaults::DefaultsProvider;
use crate::scope::plot::{render_scope_png, render_spectrum_png, PlotStyle};
use crate::scope::state::{ChannelEdit, ViewState};
use crate::scope::store::SettingsStore;
use crate::scope::transform::ViewportTransform;
use crate::synth::model::{ChannelKind, PhaseId, SystemSnapshot};
use crate::synth::power::PhaseMetrics;
use crate::synth::source::SnapshotSource;
use crate::synth::spectrum::SpectrumAnalyzer;
use crate::synth::synthesizer::{synthesize, SampleSpec};
use crate::synth::ScopeError;
use crate::types::*;

/// Longest the loop sleeps before polling the source again.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

// 频谱测量: 整数个周期, 阶次 * 周期数 必须小于 采样点数 / 2
const SPECTRUM_CYCLES: usize = 4;
const SPECTRUM_SAMPLES: usize = 1024;
const SPECTRUM_MAX_ORDER: u32 = 25;

/// Receives every recomputed frame.
pub trait RenderSink {
    fn present(&mut self, frame: Arc<Frame>);
}

impl RenderSink for Sender<ScopeMessage> {
    fn present(&mut self, frame: Arc<Frame>) {
        // the GUI may already be gone during shutdown
        self.send(ScopeMessage::Frame(frame)).ok();
    }
}

/// Glue between inbound snapshots, operator commands and the render sink.
/// Recomputes at most once per tick, and only when something changed.
pub struct ScopeEngine<S: SettingsStore, D: DefaultsProvider, K: RenderSink> {
    state: ViewState<S>,
    coalescer: SnapshotCoalescer,
    transform: ViewportTransform,
    defaults: D,
    sink: K,
    analyzer: SpectrumAnalyzer,
    last_frame: Option<Arc<Frame>>,
    recomputes: usize,
}

impl<S: SettingsStore, D: DefaultsProvider, K: RenderSink> ScopeEngine<S, D, K> {
    pub fn new(state: ViewState<S>, instrument: InstrumentSettings, defaults: D, sink: K) -> Self {
        let window = Duration::from_millis(instrument.refresh_interval_ms);
        Self {
            state,
            coalescer: SnapshotCoalescer::new(window),
            transform: ViewportTransform::new(instrument),
            defaults,
            sink,
            analyzer: SpectrumAnalyzer::new(SPECTRUM_CYCLES, SPECTRUM_MAX_ORDER),
            last_frame: None,
            recomputes: 0,
        }
    }
    pub fn state(&self) -> &ViewState<S> {
        &self.state
    }
    pub fn sink(&self) -> &K {
        &self.sink
    }
    pub fn recompute_count(&self) -> usize {
        self.recomputes
    }
    pub fn next_deadline(&self) -> Option<Instant> {
        self.coalescer.deadline()
    }
    pub fn last_frame(&self) -> Option<&Arc<Frame>> {
        self.last_frame.as_ref()
    }

    pub fn push_snapshot(&mut self, snapshot: SystemSnapshot, now: Instant) {
        self.coalescer.offer(snapshot, now);
    }

    /// Applies one operator command. Returns the channel edits to forward, if any.
    pub fn handle_command(&mut self, cmd: GuiCommand) -> Result<Vec<ChannelEdit>, ScopeError> {
        let edits = self.apply_command(cmd)?;
        if !edits.is_empty() && self.coalescer.flush().is_some() {
            // the held snapshot predates the edit and would undo it
            debug!("dropped a pending snapshot older than {} edit(s)", edits.len());
        }
        Ok(edits)
    }

    fn apply_command(&mut self, cmd: GuiCommand) -> Result<Vec<ChannelEdit>, ScopeError> {
        let state = &mut self.state;
        match cmd {
            GuiCommand::StepScale(axis, step) => {
                state.step_scale(axis, step);
            }
            GuiCommand::EnterScale(axis, text) => {
                state.enter_scale(axis, &text)?;
            }
            GuiCommand::StepOffset(axis, step) => {
                state.step_offset(axis, step);
            }
            GuiCommand::EnterOffset(axis, text) => {
                state.enter_offset(axis, &text)?;
            }
            GuiCommand::ResetOffsets => state.reset_offsets(),
            GuiCommand::SetVisibility(id, kind, visible) => state.set_visibility(id, kind, visible),
            GuiCommand::ToggleVisibility(id, kind) => {
                state.toggle_visibility(id, kind);
            }
            GuiCommand::SelectPhase(index) => state.select_phase(index)?,
            GuiCommand::SetSelectionMode(mode) => state.set_selection_mode(mode),
            GuiCommand::OpenPanel(panel) => state.open_panel(panel),
            GuiCommand::EditChannel(index, kind, field, text) => {
                return Ok(vec![state.edit_channel(index, kind, field, &text)?]);
            }
            GuiCommand::ResetField(kind, field) => {
                return state.reset_field(kind, field, &self.defaults);
            }
            GuiCommand::ResetHarmonics(kind) => {
                return state.reset_harmonics(kind, &self.defaults);
            }
            GuiCommand::ApplyPreset(index, kind, waveform, count, amplitude) => {
                return Ok(vec![state.apply_preset(index, kind, waveform, count, amplitude)?]);
            }
            GuiCommand::EditHarmonic(index, kind, id, field, text) => {
                return Ok(vec![state.edit_harmonic(index, kind, id, field, &text)?]);
            }
            GuiCommand::AddHarmonic(index, kind, order, amplitude, phase) => {
                return Ok(vec![state.add_harmonic(index, kind, order, amplitude, phase)?]);
            }
            GuiCommand::RemoveHarmonic(index, kind, id) => {
                return Ok(vec![state.remove_harmonic(index, kind, id)?]);
            }
            GuiCommand::ResetHarmonic(kind, id) => {
                return state.reset_harmonic(kind, id, &self.defaults);
            }
            GuiCommand::SetPaused(_) => {
                debug!("pause is handled by the snapshot source");
            }
            GuiCommand::ExportScopePng(path) => self.export_scope_png(&path)?,
            GuiCommand::ExportSpectrumPng(path, id, kind) => {
                self.export_spectrum_png(&path, id, kind)?
            }
        }
        Ok(Vec::new())
    }

    fn latest_frame(&self) -> Result<&Arc<Frame>, ScopeError> {
        self.last_frame
            .as_ref()
            .ok_or_else(|| ScopeError::Plot("no frame rendered yet".into()))
    }

    /// Writes the most recent frame's traces as a PNG.
    pub fn export_scope_png(&self, path: &Path) -> Result<(), ScopeError> {
        let png = render_scope_png(&self.latest_frame()?.plot, &PlotStyle::default())?;
        std::fs::write(path, png)?;
        info!("scope exported to {}", path.display());
        Ok(())
    }

    pub fn export_spectrum_png(
        &self,
        path: &Path,
        phase_id: PhaseId,
        kind: ChannelKind,
    ) -> Result<(), ScopeError> {
        let frame = self.latest_frame()?;
        let spectrum = frame
            .spectrum(phase_id, kind)
            .ok_or_else(|| ScopeError::ChannelUnavailable(phase_id as usize, kind.label()))?;
        let png = render_spectrum_png(spectrum, &PlotStyle::default())?;
        std::fs::write(path, png)?;
        info!("{} spectrum of phase {phase_id} exported to {}", kind.label(), path.display());
        Ok(())
    }

    /// FFT of every channel with data, over a whole number of cycles.
    fn measure_spectra(&self, snapshot: &SystemSnapshot) -> Vec<ChannelSpectrum> {
        let instrument = self.transform.instrument();
        let spec = SampleSpec::cycles(SPECTRUM_SAMPLES, SPECTRUM_CYCLES as f64);
        snapshot
            .phases()
            .iter()
            .flat_map(|phase| ChannelKind::ALL.map(|kind| (phase, kind)))
            .filter_map(|(phase, kind)| {
                let channel = phase.channel(kind)?;
                let trace = synthesize(channel, &spec, instrument.full_scale(kind))?;
                Some(ChannelSpectrum {
                    phase_id: phase.id,
                    kind,
                    spectrum: self.analyzer.analyze(&trace),
                })
            })
            .collect()
    }

    /// Releases a due snapshot, then recomputes if anything is dirty.
    /// Returns whether a frame was presented.
    pub fn tick(&mut self, now: Instant) -> bool {
        if let Some(snapshot) = self.coalescer.poll(now) {
            self.state.ingest_snapshot(snapshot);
        }
        if !self.state.take_dirty() {
            return false;
        }
        let snapshot = self.state.snapshot().cloned().unwrap_or_default();
        let plot = self.transform.compute(&snapshot, self.state.settings());
        let metrics = snapshot
            .phases()
            .iter()
            .filter_map(|p| PhaseMetrics::compute(p, self.transform.instrument()))
            .collect();
        let spectra = self.measure_spectra(&snapshot);
        self.recomputes += 1;
        let frame = Arc::new(Frame {
            plot,
            metrics,
            spectra,
            snapshot,
        });
        self.last_frame = Some(frame.clone());
        self.sink.present(frame);
        true
    }
}

pub fn spawn_thread<S, D, Src>(
    tx: Sender<ScopeMessage>,
    rx: Receiver<ScopeInput>,
    store: S,
    defaults: D,
    instrument: InstrumentSettings,
    mut source: Src,
) -> JoinHandle<()>
where
    S: SettingsStore + Send + 'static,
    D: DefaultsProvider + Send + 'static,
    Src: SnapshotSource + Send + 'static,
{
    thread::spawn(move || {
        let state = ViewState::load(store);
        tx.send(ScopeMessage::Settings(
            state.settings().clone(),
            state.selection().clone(),
        ))
        .ok();
        let mut engine = ScopeEngine::new(state, instrument, defaults, tx.clone());
        tx.send(ScopeMessage::Log("Scope engine ready.".to_owned())).ok();
        info!("scope engine started");

        loop {
            // 1. 处理 GUI 命令与外部快照
            let now = Instant::now();
            let timeout = engine
                .next_deadline()
                .map_or(POLL_INTERVAL, |d| d.saturating_duration_since(now).min(POLL_INTERVAL));
            match rx.recv_timeout(timeout) {
                Ok(ScopeInput::Command(GuiCommand::SetPaused(paused))) => {
                    source.set_paused(paused);
                    let msg = if paused { "Feed paused" } else { "Feed resumed" };
                    tx.send(ScopeMessage::Log(msg.to_owned())).ok();
                }
                Ok(ScopeInput::Command(cmd)) => {
                    match engine.handle_command(cmd) {
                        Ok(edits) if !edits.is_empty() => {
                            // 修改写回数据源, 否则下一帧会覆盖
                            source.apply_edits(&edits);
                            tx.send(ScopeMessage::Edits(edits)).ok();
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!("command rejected: {err}");
                            tx.send(ScopeMessage::Rejected(err.to_string())).ok();
                        }
                    }
                    let state = engine.state();
                    tx.send(ScopeMessage::Settings(
                        state.settings().clone(),
                        state.selection().clone(),
                    ))
                    .ok();
                }
                Ok(ScopeInput::Snapshot(snapshot)) => engine.push_snapshot(snapshot, Instant::now()),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            // 2. 拉取数据源
            match source.next_snapshot() {
                Ok(Some(snapshot)) => engine.push_snapshot(snapshot, Instant::now()),
                Ok(None) => {}
                Err(err) => warn!("snapshot source failed: {err}"),
            }

            // 3. 渲染
            engine.tick(Instant::now());
        }
        info!("scope engine stopped after {} frames", engine.recompute_count());
    })
}
