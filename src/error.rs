use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("ort (onnxruntime) error: {0}")]
    Ort(#[from] ort::Error),
    #[error("hf-hub: {0}")]
    HuggingFace(#[from] hf_hub::api::sync::ApiError),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config file {}: {source}", .path.display())]
    ConfigFile {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("unknown config key: {0}")]
    UnknownConfigKey(String),
    #[error("invalid value {value:?} for config key {key}")]
    InvalidConfigValue { key: String, value: String },
    #[error("--opts expects KEY VALUE pairs, got {0} trailing token(s)")]
    UnpairedOpts(usize),
    #[error("weights locator {0:?} does not name a model file")]
    InvalidWeights(String),
    #[error("model emitted label id {0} absent from the label map")]
    UnknownLabel(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
