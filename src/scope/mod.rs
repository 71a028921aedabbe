// src/scope/mod.rs
// 示波器视图: 设置, 持久化, 坐标变换, 渲染
pub mod coalesce;
pub mod config;
pub mod defaults;
pub mod ladder;
pub mod plot;
pub mod state;
pub mod store;
pub mod transform;
pub mod view;
pub use coalesce::SnapshotCoalescer;
pub use config::{
    InstrumentSettings, OffsetAxis, ScaleAxis, SelectionMode, Step, UiSelection, ViewSettings,
};
pub use defaults::{DefaultsProvider, DefaultsTable};
pub use ladder::Ladder;
pub use plot::{render_scope_png, render_spectrum_png, PlotStyle};
pub use state::{ChannelEdit, EditTarget, ViewState};
pub use store::{JsonFileStore, MemoryStore, SettingsStore};
pub use transform::ViewportTransform;
pub use view::{PlotDescriptor, Series};
