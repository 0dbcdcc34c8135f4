//! Layered inference configuration.
//!
//! The configuration tree keeps the upper-case key names of the exported
//! model's training framework (`MODEL.DEVICE`, `DATASETS.TEST`, ...), so
//! config files written for the checkpoints parse unchanged. Resolution is
//! strictly layered:
//! defaults, then the DiT extension, then the YAML file, then `--opts`
//! pairs, each layer overwriting matching keys from the previous one.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use itertools::Itertools;
use ort::{CUDAExecutionProvider, ExecutionProvider};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Compute device for the forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Resolved to `cuda` or `cpu` by [`InferenceConfig::resolve_device`].
    Auto,
    Cpu,
    Cuda,
}

impl FromStr for Device {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Auto => write!(f, "auto"),
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(rename = "MODEL")]
    pub model: ModelConfig,
    #[serde(rename = "DATASETS")]
    pub datasets: DatasetsConfig,
    #[serde(rename = "INPUT")]
    pub input: InputConfig,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            datasets: DatasetsConfig::default(),
            input: InputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Filesystem path to an ONNX export, or an `hf://<repo>/<file>` hub
    /// locator resolved at load time.
    #[serde(rename = "WEIGHTS")]
    pub weights: String,
    #[serde(rename = "DEVICE")]
    pub device: Device,
    #[serde(rename = "ROI_HEADS")]
    pub roi_heads: RoiHeadsConfig,
    /// Backbone hyperparameters, present once the DiT extension ran.
    #[serde(rename = "VIT")]
    pub vit: Option<VitConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights: String::new(),
            device: Device::Auto,
            roi_heads: RoiHeadsConfig::default(),
            vit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiHeadsConfig {
    #[serde(rename = "SCORE_THRESH_TEST")]
    pub score_thresh_test: f32,
    /// Detectron2 ONNX exports differ in output ordering; this is the index
    /// of the output tensor carrying per-detection confidence scores.
    #[serde(rename = "SCORE_OUTPUT_INDEX")]
    pub score_output_index: usize,
}

impl Default for RoiHeadsConfig {
    fn default() -> Self {
        Self {
            score_thresh_test: 0.8,
            score_output_index: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitConfig {
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "OUT_FEATURES")]
    pub out_features: Vec<String>,
    #[serde(rename = "IMG_SIZE")]
    pub img_size: Vec<u32>,
    #[serde(rename = "POS_TYPE")]
    pub pos_type: String,
    #[serde(rename = "DROP_PATH")]
    pub drop_path: f32,
    #[serde(rename = "MODEL_KWARGS")]
    pub model_kwargs: String,
}

impl Default for VitConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            out_features: vec!["last_feat".to_string()],
            img_size: vec![224, 224],
            pos_type: "shared_rel".to_string(),
            drop_path: 0.0,
            model_kwargs: "{}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetsConfig {
    /// Evaluation datasets; the first entry selects the label vocabulary.
    #[serde(rename = "TEST")]
    pub test: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Channel order of the decoded image.
    #[serde(rename = "FORMAT")]
    pub format: String,
    #[serde(rename = "MIN_SIZE_TEST")]
    pub min_size_test: u32,
    #[serde(rename = "MAX_SIZE_TEST")]
    pub max_size_test: u32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            format: "RGB".to_string(),
            min_size_test: 800,
            max_size_test: 1333,
        }
    }
}

/// Extension hook for DiT checkpoints: injects the `MODEL.VIT` subtree.
/// Runs before any file or command-line merge and never overwrites a subtree
/// that is already present.
pub fn add_dit_defaults(cfg: &mut InferenceConfig) {
    if cfg.model.vit.is_none() {
        cfg.model.vit = Some(VitConfig::default());
    }
}

impl InferenceConfig {
    /// Overlay a partial YAML document onto this configuration. Keys present
    /// in the file win over current values; absent keys are left alone;
    /// unknown keys are a merge error.
    pub fn merge_from_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        let patch: ConfigPatch =
            serde_yaml::from_str(&text).map_err(|source| Error::ConfigFile {
                path: path.to_path_buf(),
                source,
            })?;
        patch.apply(self);
        Ok(())
    }

    /// Overlay trailing `KEY VALUE` override tokens. Applied last, so these
    /// win over both defaults and file contents.
    pub fn merge_from_opts(&mut self, tokens: &[String]) -> Result<()> {
        if tokens.len() % 2 != 0 {
            return Err(Error::UnpairedOpts(tokens.len() % 2));
        }

        for (key, value) in tokens.iter().tuples() {
            self.set_key(key, value)?;
        }
        Ok(())
    }

    fn set_key(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "MODEL.WEIGHTS" => self.model.weights = value.to_string(),
            "MODEL.DEVICE" => self.model.device = parse_value(key, value)?,
            "MODEL.ROI_HEADS.SCORE_THRESH_TEST" => {
                self.model.roi_heads.score_thresh_test = parse_value(key, value)?;
            }
            "MODEL.ROI_HEADS.SCORE_OUTPUT_INDEX" => {
                self.model.roi_heads.score_output_index = parse_value(key, value)?;
            }
            "MODEL.VIT.NAME" => self.vit_mut().name = value.to_string(),
            "MODEL.VIT.POS_TYPE" => self.vit_mut().pos_type = value.to_string(),
            "MODEL.VIT.DROP_PATH" => self.vit_mut().drop_path = parse_value(key, value)?,
            "MODEL.VIT.MODEL_KWARGS" => self.vit_mut().model_kwargs = value.to_string(),
            "DATASETS.TEST" => self.datasets.test = parse_dataset_list(value),
            "INPUT.FORMAT" => self.input.format = value.to_string(),
            "INPUT.MIN_SIZE_TEST" => self.input.min_size_test = parse_value(key, value)?,
            "INPUT.MAX_SIZE_TEST" => self.input.max_size_test = parse_value(key, value)?,
            _ => return Err(Error::UnknownConfigKey(key.to_string())),
        }
        Ok(())
    }

    fn vit_mut(&mut self) -> &mut VitConfig {
        self.model.vit.get_or_insert_with(VitConfig::default)
    }

    /// Resolve `auto` to a concrete device by probing accelerator
    /// availability. Explicit `cpu`/`cuda` settings are left untouched.
    pub fn resolve_device(&mut self) {
        if self.model.device == Device::Auto {
            let cuda = CUDAExecutionProvider::default()
                .is_available()
                .unwrap_or(false);
            self.model.device = if cuda { Device::Cuda } else { Device::Cpu };
            tracing::debug!(device = %self.model.device, "resolved auto device");
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| Error::InvalidConfigValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// `DATASETS.TEST` accepts either a YAML flow list (`[icdar2019_test]`) or a
/// bare dataset name.
fn parse_dataset_list(value: &str) -> Vec<String> {
    serde_yaml::from_str::<Vec<String>>(value).unwrap_or_else(|_| vec![value.to_string()])
}

// Overlay mirror of the config tree: every field optional, unknown keys
// rejected by serde at merge time.

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    #[serde(rename = "MODEL")]
    model: Option<ModelPatch>,
    #[serde(rename = "DATASETS")]
    datasets: Option<DatasetsPatch>,
    #[serde(rename = "INPUT")]
    input: Option<InputPatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelPatch {
    #[serde(rename = "WEIGHTS")]
    weights: Option<String>,
    #[serde(rename = "DEVICE")]
    device: Option<Device>,
    #[serde(rename = "ROI_HEADS")]
    roi_heads: Option<RoiHeadsPatch>,
    #[serde(rename = "VIT")]
    vit: Option<VitPatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RoiHeadsPatch {
    #[serde(rename = "SCORE_THRESH_TEST")]
    score_thresh_test: Option<f32>,
    #[serde(rename = "SCORE_OUTPUT_INDEX")]
    score_output_index: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct VitPatch {
    #[serde(rename = "NAME")]
    name: Option<String>,
    #[serde(rename = "OUT_FEATURES")]
    out_features: Option<Vec<String>>,
    #[serde(rename = "IMG_SIZE")]
    img_size: Option<Vec<u32>>,
    #[serde(rename = "POS_TYPE")]
    pos_type: Option<String>,
    #[serde(rename = "DROP_PATH")]
    drop_path: Option<f32>,
    #[serde(rename = "MODEL_KWARGS")]
    model_kwargs: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatasetsPatch {
    #[serde(rename = "TEST")]
    test: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct InputPatch {
    #[serde(rename = "FORMAT")]
    format: Option<String>,
    #[serde(rename = "MIN_SIZE_TEST")]
    min_size_test: Option<u32>,
    #[serde(rename = "MAX_SIZE_TEST")]
    max_size_test: Option<u32>,
}

impl ConfigPatch {
    fn apply(self, cfg: &mut InferenceConfig) {
        if let Some(model) = self.model {
            model.apply(&mut cfg.model);
        }
        if let Some(datasets) = self.datasets {
            if let Some(test) = datasets.test {
                cfg.datasets.test = test;
            }
        }
        if let Some(input) = self.input {
            if let Some(format) = input.format {
                cfg.input.format = format;
            }
            if let Some(min) = input.min_size_test {
                cfg.input.min_size_test = min;
            }
            if let Some(max) = input.max_size_test {
                cfg.input.max_size_test = max;
            }
        }
    }
}

impl ModelPatch {
    fn apply(self, model: &mut ModelConfig) {
        if let Some(weights) = self.weights {
            model.weights = weights;
        }
        if let Some(device) = self.device {
            model.device = device;
        }
        if let Some(roi_heads) = self.roi_heads {
            if let Some(thresh) = roi_heads.score_thresh_test {
                model.roi_heads.score_thresh_test = thresh;
            }
            if let Some(index) = roi_heads.score_output_index {
                model.roi_heads.score_output_index = index;
            }
        }
        if let Some(vit_patch) = self.vit {
            let vit = model.vit.get_or_insert_with(VitConfig::default);
            if let Some(name) = vit_patch.name {
                vit.name = name;
            }
            if let Some(out_features) = vit_patch.out_features {
                vit.out_features = out_features;
            }
            if let Some(img_size) = vit_patch.img_size {
                vit.img_size = img_size;
            }
            if let Some(pos_type) = vit_patch.pos_type {
                vit.pos_type = pos_type;
            }
            if let Some(drop_path) = vit_patch.drop_path {
                vit.drop_path = drop_path;
            }
            if let Some(model_kwargs) = vit_patch.model_kwargs {
                vit.model_kwargs = model_kwargs;
            }
        }
    }
}
