// src/gui.rs
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use eframe::egui;
use egui::Color32;
use egui_plot::{Bar, BarChart, Line, Plot, PlotPoints};

use harmoscope::scope::config::{
    InstrumentSettings, OffsetAxis, ScaleAxis, SelectionMode, Step, UiSelection, ViewSettings,
};
use harmoscope::scope::view::DIVISION_SPAN;
use harmoscope::synth::model::{
    ChannelField, ChannelKind, HarmonicField, MAX_HARMONICS, MAX_HARMONIC_ORDER,
};
use harmoscope::synth::presets::Waveform;
use harmoscope::synth::synthesizer::channel_preview;
use harmoscope::types::*;

const SCALE_AXES: [ScaleAxis; 3] = [ScaleAxis::Voltage, ScaleAxis::Current, ScaleAxis::Timebase];
const OFFSET_AXES: [OffsetAxis; 3] = [OffsetAxis::Time, OffsetAxis::Voltage, OffsetAxis::Current];
const FIELDS: [ChannelField; 3] = [
    ChannelField::Amplitude,
    ChannelField::Frequency,
    ChannelField::Phase,
];

// 按快照中的位置命名, 与相位 id 无关
fn position_label(idx: usize) -> String {
    format!("L{}", idx + 1)
}

pub struct ScopeApp {
    instrument: InstrumentSettings,
    // 后台同步过来的状态
    settings: ViewSettings,
    selection: UiSelection,
    frame: Option<Arc<Frame>>,
    paused: bool,

    // 输入框缓存
    scale_entry: [String; 3],
    offset_entry: [String; 3],
    channel_entry: BTreeMap<(ChannelKind, ChannelField), String>,
    harmonic_entry: BTreeMap<(ChannelKind, u32, HarmonicField), String>,
    new_order: u32,
    new_amplitude: f64,
    preset: Waveform,
    preset_count: usize,
    export_dir: PathBuf,

    log_messages: Vec<String>,

    // 通讯管道
    rx: Receiver<ScopeMessage>,
    tx_cmd: Sender<ScopeInput>,
}

impl ScopeApp {
    pub fn new(
        tx_cmd: Sender<ScopeInput>,
        rx: Receiver<ScopeMessage>,
        instrument: InstrumentSettings,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            instrument,
            settings: ViewSettings::default(),
            selection: UiSelection::default(),
            frame: None,
            paused: false,
            scale_entry: Default::default(),
            offset_entry: Default::default(),
            channel_entry: BTreeMap::new(),
            harmonic_entry: BTreeMap::new(),
            new_order: 3,
            new_amplitude: 10.0,
            preset: Waveform::Square,
            preset_count: 3,
            export_dir,
            log_messages: vec!["Harmoscope ready.".to_owned()],
            rx,
            tx_cmd,
        }
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > 8 {
            self.log_messages.remove(0);
        }
    }

    fn send(&self, cmd: GuiCommand) {
        // the engine only stops once this side hangs up
        self.tx_cmd.send(ScopeInput::Command(cmd)).ok();
    }

    fn drain_messages(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                ScopeMessage::Log(s) => self.log(&s),
                ScopeMessage::Frame(frame) => self.frame = Some(frame),
                ScopeMessage::Settings(settings, selection) => {
                    self.settings = settings;
                    self.selection = selection;
                }
                ScopeMessage::Edits(edits) => {
                    for edit in edits {
                        self.log(&format!(
                            "{} {} updated",
                            position_label(edit.phase_index),
                            edit.kind.label()
                        ));
                    }
                }
                ScopeMessage::Rejected(reason) => self.log(&format!("rejected: {reason}")),
            }
        }
    }

    fn phase_color(position: usize, kind: ChannelKind) -> Color32 {
        let base = match position % 3 {
            0 => Color32::from_rgb(255, 200, 0),
            1 => Color32::from_rgb(0, 200, 255),
            _ => Color32::from_rgb(255, 80, 160),
        };
        match kind {
            ChannelKind::Voltage => base,
            ChannelKind::Current => base.gamma_multiply(0.6),
        }
    }

    fn scale_controls(&mut self, ui: &mut egui::Ui) {
        ui.label("SCALES");
        for (idx, axis) in SCALE_AXES.into_iter().enumerate() {
            ui.horizontal(|ui| {
                if ui.small_button("◀").clicked() {
                    self.send(GuiCommand::StepScale(axis, Step::Down));
                }
                ui.monospace(format!("{:>6} {}", self.settings.scale(axis), axis.name()));
                if ui.small_button("▶").clicked() {
                    self.send(GuiCommand::StepScale(axis, Step::Up));
                }
                let entry = ui.add(
                    egui::TextEdit::singleline(&mut self.scale_entry[idx]).desired_width(60.0),
                );
                if entry.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                    let text = std::mem::take(&mut self.scale_entry[idx]);
                    self.send(GuiCommand::EnterScale(axis, text));
                }
            });
        }
    }

    fn offset_controls(&mut self, ui: &mut egui::Ui) {
        ui.label("OFFSETS");
        for (idx, axis) in OFFSET_AXES.into_iter().enumerate() {
            ui.horizontal(|ui| {
                if ui.small_button("−").clicked() {
                    self.send(GuiCommand::StepOffset(axis, Step::Down));
                }
                ui.monospace(format!("{:>8.3} {}", self.settings.offset(axis), axis.name()));
                if ui.small_button("+").clicked() {
                    self.send(GuiCommand::StepOffset(axis, Step::Up));
                }
                let entry = ui.add(
                    egui::TextEdit::singleline(&mut self.offset_entry[idx]).desired_width(60.0),
                );
                if entry.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                    let text = std::mem::take(&mut self.offset_entry[idx]);
                    self.send(GuiCommand::EnterOffset(axis, text));
                }
            });
        }
        if ui.button("RESET OFFSETS").clicked() {
            self.send(GuiCommand::ResetOffsets);
        }
    }

    fn phase_controls(&mut self, ui: &mut egui::Ui) {
        let phase_count = self.frame.as_ref().map_or(0, |f| f.snapshot.len());
        ui.label("PHASES");
        ui.horizontal(|ui| {
            for idx in 0..phase_count {
                let active = self.selection.active_phase == idx;
                if ui.selectable_label(active, position_label(idx)).clicked() {
                    self.send(GuiCommand::SelectPhase(idx));
                }
            }
            ui.separator();
            let all = self.selection.mode == SelectionMode::All;
            if ui.selectable_label(!all, "SINGLE").clicked() {
                self.send(GuiCommand::SetSelectionMode(SelectionMode::Single));
            }
            if ui.selectable_label(all, "ALL").clicked() {
                self.send(GuiCommand::SetSelectionMode(SelectionMode::All));
            }
        });
        let ids: Vec<u32> = self
            .frame
            .as_ref()
            .map(|f| f.snapshot.phases().iter().map(|p| p.id).collect())
            .unwrap_or_default();
        for (idx, id) in ids.into_iter().enumerate() {
            ui.horizontal(|ui| {
                ui.label(position_label(idx));
                let vis = self.settings.visibility(id);
                for kind in ChannelKind::ALL {
                    let mut shown = vis.get(kind);
                    if ui.checkbox(&mut shown, kind.unit()).changed() {
                        self.send(GuiCommand::SetVisibility(id, kind, shown));
                    }
                }
            });
        }
    }

    fn channel_editor(&mut self, ui: &mut egui::Ui) {
        let open = self.selection.open_panel.as_deref() == Some("channels");
        let header = if open { "▼ CHANNELS" } else { "▶ CHANNELS" };
        if ui.button(header).clicked() {
            let panel = if open { None } else { Some("channels".to_owned()) };
            self.send(GuiCommand::OpenPanel(panel));
        }
        if !open {
            return;
        }
        let index = self.selection.active_phase;
        let phase = self
            .frame
            .as_ref()
            .and_then(|f| f.snapshot.phase(index).cloned());
        egui::Grid::new("channel_editor").striped(true).show(ui, |ui| {
            for kind in ChannelKind::ALL {
                for field in FIELDS {
                    let current = phase
                        .as_ref()
                        .and_then(|p| p.channel(kind))
                        .map(|c| c.field(field));
                    ui.label(format!("{} {}", kind.unit(), field.name()));
                    ui.monospace(match current {
                        Some(v) => format!("{:.*}", self.instrument.precision_digits, v),
                        None => "--".to_owned(),
                    });
                    let buf = self.channel_entry.entry((kind, field)).or_default();
                    let entry = ui.add(egui::TextEdit::singleline(buf).desired_width(60.0));
                    if entry.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                        let text = std::mem::take(buf);
                        self.send(GuiCommand::EditChannel(index, kind, field, text));
                    }
                    if ui.small_button("reset").clicked() {
                        self.send(GuiCommand::ResetField(kind, field));
                    }
                    ui.end_row();
                }
            }
        });
        ui.horizontal(|ui| {
            egui::ComboBox::from_id_source("preset")
                .selected_text(self.preset.name())
                .show_ui(ui, |ui| {
                    for w in Waveform::ALL {
                        ui.selectable_value(&mut self.preset, w, w.name());
                    }
                });
            ui.add(egui::Slider::new(&mut self.preset_count, 1..=MAX_HARMONICS));
        });
        ui.horizontal(|ui| {
            for kind in ChannelKind::ALL {
                if ui.button(format!("APPLY {}", kind.unit())).clicked() {
                    self.send(GuiCommand::ApplyPreset(
                        index,
                        kind,
                        self.preset,
                        self.preset_count,
                        100.0,
                    ));
                }
                if ui.button(format!("CLEAR {}", kind.unit())).clicked() {
                    self.send(GuiCommand::ResetHarmonics(kind));
                }
            }
        });
    }

    fn harmonics_editor(&mut self, ui: &mut egui::Ui) {
        let open = self.selection.open_panel.as_deref() == Some("harmonics");
        let header = if open { "▼ HARMONICS" } else { "▶ HARMONICS" };
        if ui.button(header).clicked() {
            let panel = if open { None } else { Some("harmonics".to_owned()) };
            self.send(GuiCommand::OpenPanel(panel));
        }
        if !open {
            return;
        }
        let index = self.selection.active_phase;
        let phase = self
            .frame
            .as_ref()
            .and_then(|f| f.snapshot.phase(index).cloned());
        for kind in ChannelKind::ALL {
            let harmonics = phase
                .as_ref()
                .and_then(|p| p.channel(kind))
                .map(|c| c.harmonics.clone())
                .unwrap_or_default();
            ui.label(format!("{} ({}/{MAX_HARMONICS})", kind.label(), harmonics.len()));
            egui::Grid::new(("harmonics", kind)).striped(true).show(ui, |ui| {
                for h in &harmonics {
                    ui.monospace(format!("#{}", h.id));
                    for field in HarmonicField::ALL {
                        let buf = self.harmonic_entry.entry((kind, h.id, field)).or_default();
                        let entry = ui.add(
                            egui::TextEdit::singleline(buf)
                                .hint_text(format!("{:.1}", h.field(field)))
                                .desired_width(48.0),
                        );
                        if entry.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                            let text = std::mem::take(buf);
                            self.send(GuiCommand::EditHarmonic(index, kind, h.id, field, text));
                        }
                    }
                    if ui.small_button("reset").clicked() {
                        self.send(GuiCommand::ResetHarmonic(kind, h.id));
                    }
                    if ui.small_button("✕").clicked() {
                        self.send(GuiCommand::RemoveHarmonic(index, kind, h.id));
                    }
                    ui.end_row();
                }
            });
        }
        ui.horizontal(|ui| {
            ui.add(
                egui::DragValue::new(&mut self.new_order)
                    .clamp_range(1..=MAX_HARMONIC_ORDER)
                    .prefix("n="),
            );
            ui.add(
                egui::DragValue::new(&mut self.new_amplitude)
                    .clamp_range(0.0..=100.0)
                    .suffix(" %"),
            );
            for kind in ChannelKind::ALL {
                if ui.button(format!("ADD {}", kind.unit())).clicked() {
                    self.send(GuiCommand::AddHarmonic(
                        index,
                        kind,
                        self.new_order,
                        self.new_amplitude,
                        0.0,
                    ));
                }
            }
        });
    }

    fn export_controls(&self, ui: &mut egui::Ui) {
        let Some(frame) = &self.frame else {
            return;
        };
        ui.horizontal(|ui| {
            if ui.button("EXPORT SCOPE PNG").clicked() {
                self.send(GuiCommand::ExportScopePng(self.export_dir.join("scope.png")));
            }
            let Some(phase) = frame.snapshot.phase(self.selection.active_phase) else {
                return;
            };
            for kind in ChannelKind::ALL {
                if ui.button(format!("EXPORT {} SPECTRUM", kind.unit())).clicked() {
                    let label = frame.phase_label(phase.id);
                    let name = format!("spectrum_{label}_{}.png", kind.label());
                    self.send(GuiCommand::ExportSpectrumPng(
                        self.export_dir.join(name),
                        phase.id,
                        kind,
                    ));
                }
            }
        });
    }

    fn spectrum_view(&self, ui: &mut egui::Ui) {
        let Some(frame) = &self.frame else {
            return;
        };
        let Some(phase) = frame.snapshot.phase(self.selection.active_phase) else {
            return;
        };
        let mut summary = Vec::new();
        Plot::new("spectrum")
            .height(140.0)
            .include_y(0.0)
            .allow_drag(false)
            .allow_zoom(false)
            .show(ui, |plot_ui| {
                for kind in ChannelKind::ALL {
                    let Some(spectrum) = frame.spectrum(phase.id, kind) else {
                        continue;
                    };
                    // 电压在阶次左侧, 电流在右侧
                    let shift = match kind {
                        ChannelKind::Voltage => -0.2,
                        ChannelKind::Current => 0.2,
                    };
                    let bars = spectrum
                        .orders
                        .iter()
                        .map(|&(order, pct)| Bar::new(order as f64 + shift, pct).width(0.35))
                        .collect();
                    plot_ui.bar_chart(
                        BarChart::new(bars)
                            .name(kind.unit())
                            .color(Self::phase_color(self.selection.active_phase, kind)),
                    );
                    summary.push(format!("THD {} {:.2} %", kind.unit(), spectrum.thd * 100.0));
                }
            });
        ui.monospace(summary.join("   "));
    }

    fn scope_plot(&self, ui: &mut egui::Ui) {
        let Some(frame) = &self.frame else {
            ui.label("Waiting for data...");
            return;
        };
        let plot = &frame.plot;
        let (t0, t1) = plot.ranges.time;
        Plot::new("scope")
            .view_aspect(2.0)
            .include_x(t0 * 1000.0)
            .include_x(t1 * 1000.0)
            .include_y(DIVISION_SPAN.0)
            .include_y(DIVISION_SPAN.1)
            .allow_drag(false)
            .allow_zoom(false)
            .allow_scroll(false)
            .show(ui, |plot_ui| {
                let mut series: Vec<_> = plot.visible_series().collect();
                series.sort_by_key(|s| s.order);
                for s in series {
                    let points: Vec<[f64; 2]> = plot
                        .time_labels
                        .iter()
                        .zip(&s.samples)
                        .map(|(&t, &v)| [t * 1000.0, plot.to_divisions(s.channel_kind, v)])
                        .collect();
                    let name =
                        format!("{} {}", frame.phase_label(s.phase_id), s.channel_kind.unit());
                    let position = frame.snapshot.position_of(s.phase_id).unwrap_or_default();
                    plot_ui.line(
                        Line::new(PlotPoints::new(points))
                            .name(name)
                            .color(Self::phase_color(position, s.channel_kind)),
                    );
                }
            });
    }

    fn metrics_table(&self, ui: &mut egui::Ui) {
        let Some(frame) = &self.frame else {
            return;
        };
        let p = self.instrument.precision_digits;
        egui::Grid::new("metrics").striped(true).show(ui, |ui| {
            for h in ["", "Vrms", "Irms", "THD V %", "THD I %", "DPF", "PF", "S VA", "P W", "Q var"] {
                ui.strong(h);
            }
            ui.end_row();
            // 缺通道的相没有指标, 行号不等于相位置
            for m in &frame.metrics {
                ui.label(frame.phase_label(m.phase_id));
                for v in [
                    m.voltage_true_rms,
                    m.current_true_rms,
                    m.thd_voltage * 100.0,
                    m.thd_current * 100.0,
                    m.dpf,
                    m.true_pf,
                    m.apparent_va,
                    m.active_w,
                    m.reactive_var,
                ] {
                    ui.monospace(format!("{:.*}", p, v));
                }
                ui.end_row();
            }
        });
    }

    fn preview(&self, ui: &mut egui::Ui) {
        let Some(phase) = self
            .frame
            .as_ref()
            .and_then(|f| f.snapshot.phase(self.selection.active_phase))
        else {
            return;
        };
        Plot::new("preview")
            .height(120.0)
            .allow_drag(false)
            .allow_zoom(false)
            .show(ui, |plot_ui| {
                for kind in ChannelKind::ALL {
                    let trace = phase.channel(kind).and_then(|ch| {
                        channel_preview(ch, 2.0, 200, self.instrument.full_scale(kind))
                    });
                    if let Some(trace) = trace {
                        let peak = trace.iter().fold(1e-12f64, |acc, s| acc.max(s.y.abs()));
                        let points: Vec<[f64; 2]> = trace.iter().map(|s| [s.x, s.y / peak]).collect();
                        plot_ui.line(
                            Line::new(PlotPoints::new(points))
                                .color(Self::phase_color(self.selection.active_phase, kind)),
                        );
                    }
                }
            });
    }
}

impl eframe::App for ScopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // 1. 消息处理
        self.drain_messages();

        // 2. UI 绘制
        egui::SidePanel::left("controls").min_width(320.0).show(ctx, |ui| {
            ui.add_space(10.0);
            ui.heading("Harmoscope");
            ui.label("Three-phase harmonic scope");
            ui.separator();
            let label = if self.paused { "▶ RESUME" } else { "⏸ PAUSE" };
            if ui.button(label).clicked() {
                self.paused = !self.paused;
                self.send(GuiCommand::SetPaused(self.paused));
            }
            ui.separator();
            self.scale_controls(ui);
            ui.separator();
            self.offset_controls(ui);
            ui.separator();
            self.phase_controls(ui);
            ui.separator();
            self.channel_editor(ui);
            ui.separator();
            self.harmonics_editor(ui);
            ui.add_space(10.0);
            egui::ScrollArea::vertical().max_height(120.0).show(ui, |ui| {
                for m in &self.log_messages {
                    ui.monospace(m);
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.scope_plot(ui);
            ui.separator();
            self.metrics_table(ui);
            ui.separator();
            self.preview(ui);
            ui.separator();
            self.spectrum_view(ui);
            self.export_controls(ui);
        });

        ctx.request_repaint_after(Duration::from_millis(self.instrument.refresh_interval_ms));
    }
}
