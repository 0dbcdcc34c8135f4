//! # Overview
//!
//! Single-image document layout inference for [DiT](https://github.com/microsoft/unilm/tree/master/dit)
//! detection checkpoints exported to ONNX format, run through onnxruntime
//! (bindings via [ort](https://github.com/pykeio/ort)). The `dit-infer`
//! binary wires the full pipeline: layered configuration, model loading,
//! a single forward pass, and an annotated output image.

mod config;
mod error;
mod instance;
mod labels;
mod utils;
pub mod visualize;

pub use error::{Error, Result};

// re-exports
pub use geo_types;
pub use image;
pub use ort;

pub mod models;

pub use config::{add_dit_defaults, Device, InferenceConfig};
pub use instance::Instance;
pub use labels::{LabelMap, LabelTable, LAYOUT_CLASSES, TABLE_ONLY_DATASET};
pub use visualize::Visualizer;
