// src/main.rs
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
mod gui;

use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::time::Duration;

use anyhow::{anyhow, Context};
use eframe::egui;
use log::info;

use harmoscope::engine;
use harmoscope::scope::config::InstrumentSettings;
use harmoscope::scope::defaults::DefaultsTable;
use harmoscope::scope::store::JsonFileStore;
use harmoscope::synth::source::SimulatedSource;

// 配置目录: HARMOSCOPE_HOME, 默认为当前目录
fn config_dir() -> PathBuf {
    std::env::var_os("HARMOSCOPE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

// 入口函数
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let dir = config_dir();
    let instrument = InstrumentSettings::load_or_default(&dir.join("instrument.json"));
    instrument
        .validate()
        .context("instrument settings are not usable")?;
    let defaults = DefaultsTable::load_or_builtin(&dir.join("defaults.json"));
    let store = JsonFileStore::new(dir.join("view_state.json"));
    info!("configuration directory: {}", dir.display());

    // 启动后台引擎
    let (tx, rx) = channel();
    let (tx_cmd, rx_cmd) = channel();
    let source = SimulatedSource::new(Duration::from_millis(50));
    let handle = engine::spawn_thread(tx, rx_cmd, store, defaults, instrument.clone(), source);

    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1280.0, 820.0])
        .with_min_inner_size([960.0, 640.0])
        .with_title("Harmoscope");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "Harmoscope",
        options,
        Box::new(move |_cc| Box::new(gui::ScopeApp::new(tx_cmd, rx, instrument, dir))),
    )
    .map_err(|err| anyhow!("window failed: {err}"))?;

    handle
        .join()
        .map_err(|_| anyhow!("scope engine thread panicked"))?;
    Ok(())
}
