// src/lib.rs
pub mod engine;
pub mod scope;
pub mod synth;
pub mod types;
