// src/types.rs
use std::path::PathBuf;
use std::sync::Arc;

use crate::scope::config::{OffsetAxis, ScaleAxis, SelectionMode, Step, UiSelection, ViewSettings};
use crate::scope::state::ChannelEdit;
use crate::scope::view::PlotDescriptor;
use crate::synth::model::{ChannelField, ChannelKind, HarmonicField, PhaseId, SystemSnapshot};
use crate::synth::power::PhaseMetrics;
use crate::synth::presets::Waveform;
use crate::synth::spectrum::HarmonicSpectrum;

// GUI 发给后台的命令
#[derive(Clone, Debug, PartialEq)]
pub enum GuiCommand {
    StepScale(ScaleAxis, Step),
    EnterScale(ScaleAxis, String),
    StepOffset(OffsetAxis, Step),
    EnterOffset(OffsetAxis, String),
    ResetOffsets,
    SetVisibility(PhaseId, ChannelKind, bool),
    ToggleVisibility(PhaseId, ChannelKind),
    SelectPhase(usize),
    SetSelectionMode(SelectionMode),
    OpenPanel(Option<String>),
    // 直接输入: 相位索引, 通道, 字段, 文本
    EditChannel(usize, ChannelKind, ChannelField, String),
    ResetField(ChannelKind, ChannelField),
    ResetHarmonics(ChannelKind),
    // 谐波预设: 相位索引, 通道, 波形, 数量, 幅度百分比
    ApplyPreset(usize, ChannelKind, Waveform, usize, f64),
    // 单个谐波: 相位索引, 通道, 谐波 id, 字段, 文本
    EditHarmonic(usize, ChannelKind, u32, HarmonicField, String),
    // 新增谐波: 相位索引, 通道, 次数, 幅度百分比, 相位
    AddHarmonic(usize, ChannelKind, u32, f64, f64),
    RemoveHarmonic(usize, ChannelKind, u32),
    ResetHarmonic(ChannelKind, u32),
    SetPaused(bool),
    // 导出最近一帧
    ExportScopePng(PathBuf),
    ExportSpectrumPng(PathBuf, PhaseId, ChannelKind),
}

// 后台的输入: 操作命令或新的快照
#[derive(Clone, Debug)]
pub enum ScopeInput {
    Command(GuiCommand),
    Snapshot(SystemSnapshot),
}

// 后台发给 GUI 的消息
#[derive(Clone, Debug)]
pub enum ScopeMessage {
    Log(String),
    Frame(Arc<Frame>),
    Settings(ViewSettings, UiSelection),
    // 需要下发到合成器的修改
    Edits(Vec<ChannelEdit>),
    Rejected(String),
}

// 实测频谱, 每个有数据的通道一份
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelSpectrum {
    pub phase_id: PhaseId,
    pub kind: ChannelKind,
    pub spectrum: HarmonicSpectrum,
}

// 一帧绘图数据: 曲线, 每相功率指标, 频谱, 以及生成它的快照 (用于面板显示)
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub plot: PlotDescriptor,
    pub metrics: Vec<PhaseMetrics>,
    pub spectra: Vec<ChannelSpectrum>,
    pub snapshot: SystemSnapshot,
}
impl Frame {
    /// L1..L3 by position in the snapshot. Ids are opaque and may skip.
    pub fn phase_label(&self, id: PhaseId) -> String {
        match self.snapshot.position_of(id) {
            Some(pos) => format!("L{}", pos + 1),
            None => format!("#{id}"),
        }
    }
    pub fn spectrum(&self, id: PhaseId, kind: ChannelKind) -> Option<&HarmonicSpectrum> {
        self.spectra
            .iter()
            .find(|s| s.phase_id == id && s.kind == kind)
            .map(|s| &s.spectrum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::view::AxisRanges;
    use crate::synth::model::{Channel, PhaseUnit};

    #[test]
    fn labels_follow_snapshot_position() {
        let phase = |id| PhaseUnit {
            id,
            voltage: Some(Channel::new(90.0, 0.0, 50.0)),
            current: None,
        };
        let frame = Frame {
            plot: PlotDescriptor {
                time_labels: Vec::new(),
                series: Vec::new(),
                ranges: AxisRanges {
                    voltage: (-1.0, 1.0),
                    current: (-1.0, 1.0),
                    time: (0.0, 1.0),
                },
            },
            metrics: Vec::new(),
            spectra: Vec::new(),
            snapshot: SystemSnapshot::new(vec![phase(4), phase(9)]),
        };
        assert_eq!(frame.phase_label(9), "L2");
        assert_eq!(frame.phase_label(4), "L1");
        assert_eq!(frame.phase_label(0), "#0");
        assert!(frame.spectrum(4, ChannelKind::Voltage).is_none());
    }
}
