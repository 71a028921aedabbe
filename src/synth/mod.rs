// src/synth/mod.rs
// 波形合成与功率计算
pub mod error;
pub mod model;
pub mod power;
pub mod presets;
pub mod source;
pub mod spectrum;
pub mod synthesizer;
// 公开导出常用类型
pub use error::ScopeError;
pub use model::{
    Channel, ChannelField, ChannelKind, Harmonic, HarmonicField, PhaseId, PhaseUnit, SystemSnapshot,
};
pub use power::PhaseMetrics;
pub use presets::Waveform;
pub use source::{FeedPayload, ManualSource, SimulatedSource, SnapshotSource};
pub use spectrum::{HarmonicSpectrum, SpectrumAnalyzer};
pub use synthesizer::{channel_preview, synthesize, SamplePoint, SampleSpec};
