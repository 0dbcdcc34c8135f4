use std::path::PathBuf;

use image::imageops;
use ndarray::{Array, ArrayBase, ArrayViewD, Dim, OwnedRepr};
use ort::{CUDAExecutionProvider, ExecutionProvider, Session, SessionOutputs};

pub use crate::error::{Error, Result};
use crate::{
    config::{Device, InferenceConfig},
    labels::LabelMap,
    utils::vec_to_bbox,
    Instance,
};

/// A DiT detection checkpoint exported to ONNX, wrapped in an onnxruntime
/// session. Built once per run from the merged configuration; one
/// synchronous forward pass per call, no batching.
pub struct DitModel {
    model_name: String,
    session: ort::Session,
    confidence_threshold: f32,
    label_map: LabelMap,
    score_output_index: usize,
}

impl DitModel {
    pub const REQUIRED_WIDTH: u32 = 800;
    pub const REQUIRED_HEIGHT: u32 = 1035;

    /// Build the predictor from a resolved configuration. Weight resolution,
    /// session construction, or provider registration failures are fatal and
    /// propagate to the caller.
    pub fn from_config(cfg: &InferenceConfig, label_map: LabelMap) -> Result<Self> {
        let weights = resolve_weights(&cfg.model.weights)?;

        let mut session_builder = Session::builder()?;
        if cfg.model.device == Device::Cuda {
            session_builder = session_builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])?;
        }
        let session = session_builder.commit_from_file(&weights)?;

        tracing::info!(
            weights = %weights.display(),
            device = %cfg.model.device,
            "model loaded"
        );

        Ok(Self {
            model_name: weights
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "dit".to_string()),
            session,
            confidence_threshold: cfg.model.roi_heads.score_thresh_test,
            label_map,
            score_output_index: cfg.model.roi_heads.score_output_index,
        })
    }

    /// Predict layout [`Instance`]s from the image provided.
    pub fn predict(&self, img: &image::DynamicImage) -> Result<Vec<Instance>> {
        let (img_width, img_height, input) = self.preprocess(img);

        let input_name = &self.session.inputs[0].name;

        let run_result = self.session.run(ort::inputs![input_name => input]?);
        match run_result {
            Ok(outputs) => {
                let instances = self.postprocess(&outputs, img_width, img_height)?;
                Ok(instances)
            }
            Err(_err) => {
                tracing::warn!(
                    "Ignoring runtime error from onnx (likely due to encountering blank page)."
                );
                Ok(vec![])
            }
        }
    }

    fn preprocess(
        &self,
        img: &image::DynamicImage,
    ) -> (u32, u32, ArrayBase<OwnedRepr<f32>, Dim<[usize; 3]>>) {
        let (img_width, img_height) = (img.width(), img.height());
        let img = img.resize_exact(
            Self::REQUIRED_WIDTH,
            Self::REQUIRED_HEIGHT,
            imageops::FilterType::Triangle,
        );
        let img_rgb8 = img.into_rgba8();

        let mut input = Array::zeros((
            3,
            Self::REQUIRED_HEIGHT as usize,
            Self::REQUIRED_WIDTH as usize,
        ));

        for pixel in img_rgb8.enumerate_pixels() {
            let x = pixel.0 as _;
            let y = pixel.1 as _;
            let [r, g, b, _] = pixel.2 .0;
            input[[0, y, x]] = r as f32;
            input[[1, y, x]] = g as f32;
            input[[2, y, x]] = b as f32;
        }

        (img_width, img_height, input)
    }

    fn postprocess(
        &self,
        outputs: &SessionOutputs<'_>,
        img_width: u32,
        img_height: u32,
    ) -> Result<Vec<Instance>> {
        let bboxes = outputs[0].try_extract_tensor::<f32>()?;
        let labels = outputs[1].try_extract_tensor::<i64>()?;
        let scores = outputs[self.score_output_index].try_extract_tensor::<f32>()?;

        assemble_instances(
            bboxes.view(),
            labels.view(),
            scores.view(),
            &self.label_map,
            self.confidence_threshold,
            &self.model_name,
            img_width,
            img_height,
        )
    }
}

/// Turn raw box/label/score tensors into scaled, filtered, reading-order
/// sorted instances. Boxes arrive in the 800x1035 input plane and leave in
/// original image coordinates.
#[allow(clippy::too_many_arguments)]
fn assemble_instances(
    bboxes: ArrayViewD<'_, f32>,
    labels: ArrayViewD<'_, i64>,
    scores: ArrayViewD<'_, f32>,
    label_map: &LabelMap,
    confidence_threshold: f32,
    model_name: &str,
    img_width: u32,
    img_height: u32,
) -> Result<Vec<Instance>> {
    let width_conversion = img_width as f32 / DitModel::REQUIRED_WIDTH as f32;
    let height_conversion = img_height as f32 / DitModel::REQUIRED_HEIGHT as f32;

    let mut instances = vec![];

    for (bbox, (label, score)) in bboxes
        .rows()
        .into_iter()
        .zip(labels.iter().zip(scores.iter()))
    {
        let [x1, y1, x2, y2] = vec_to_bbox(bbox.iter().copied().collect());

        let detected_label = label_map
            .iter()
            .find(|(l_i, _)| l_i == label)
            .map(|(_, l)| l.as_str())
            .ok_or(Error::UnknownLabel(*label))?;

        if *score > confidence_threshold {
            instances.push(Instance::new(
                x1 * width_conversion,
                y1 * height_conversion,
                x2 * width_conversion,
                y2 * height_conversion,
                *label,
                detected_label,
                *score,
                model_name,
            ))
        }
    }

    instances.sort_by(|a, b| a.bbox.max().y.total_cmp(&b.bbox.max().y));

    Ok(instances)
}

fn resolve_weights(locator: &str) -> Result<PathBuf> {
    if locator.is_empty() {
        return Err(Error::InvalidWeights(locator.to_string()));
    }

    if let Some(rest) = locator.strip_prefix("hf://") {
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.len() < 3 {
            return Err(Error::InvalidWeights(locator.to_string()));
        }
        let repo = segments[..2].join("/");
        let filename = segments[2..].join("/");

        let api = hf_hub::api::sync::Api::new()?;
        let path = api.model(repo).get(&filename)?;
        return Ok(path);
    }

    Ok(PathBuf::from(locator))
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2};

    use super::*;
    use crate::labels::LabelTable;

    fn five_class_map() -> LabelMap {
        LabelTable::default().resolve("publaynet_val")
    }

    #[test]
    fn assemble_scales_boxes_to_image_coordinates() {
        // one detection spanning the full 800x1035 input plane
        let bboxes = Array2::from_shape_vec((1, 4), vec![0.0, 0.0, 800.0, 1035.0]).unwrap();
        let labels = Array1::from_vec(vec![0_i64]);
        let scores = Array1::from_vec(vec![0.99_f32]);

        let instances = assemble_instances(
            bboxes.into_dyn().view(),
            labels.into_dyn().view(),
            scores.into_dyn().view(),
            &five_class_map(),
            0.8,
            "dit",
            1600,
            2070,
        )
        .unwrap();

        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].label, "text");
        assert_eq!(instances[0].bbox.max().x, 1600.0);
        assert_eq!(instances[0].bbox.max().y, 2070.0);
    }

    #[test]
    fn assemble_filters_below_threshold() {
        let bboxes = Array2::from_shape_vec(
            (2, 4),
            vec![0.0, 0.0, 10.0, 10.0, 20.0, 20.0, 30.0, 30.0],
        )
        .unwrap();
        let labels = Array1::from_vec(vec![1_i64, 3]);
        let scores = Array1::from_vec(vec![0.5_f32, 0.9]);

        let instances = assemble_instances(
            bboxes.into_dyn().view(),
            labels.into_dyn().view(),
            scores.into_dyn().view(),
            &five_class_map(),
            0.8,
            "dit",
            800,
            1035,
        )
        .unwrap();

        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].label, "table");
    }

    #[test]
    fn assemble_sorts_by_bottom_edge() {
        let bboxes = Array2::from_shape_vec(
            (2, 4),
            vec![0.0, 500.0, 100.0, 600.0, 0.0, 10.0, 100.0, 90.0],
        )
        .unwrap();
        let labels = Array1::from_vec(vec![0_i64, 1]);
        let scores = Array1::from_vec(vec![0.9_f32, 0.9]);

        let instances = assemble_instances(
            bboxes.into_dyn().view(),
            labels.into_dyn().view(),
            scores.into_dyn().view(),
            &five_class_map(),
            0.8,
            "dit",
            800,
            1035,
        )
        .unwrap();

        assert_eq!(instances[0].label, "title");
        assert_eq!(instances[1].label, "text");
    }

    #[test]
    fn assemble_rejects_out_of_map_label() {
        let bboxes = Array2::from_shape_vec((1, 4), vec![0.0, 0.0, 10.0, 10.0]).unwrap();
        let labels = Array1::from_vec(vec![0_i64]);
        let scores = Array1::from_vec(vec![0.9_f32]);

        let table_only = LabelTable::default().resolve("icdar2019_test");
        let err = assemble_instances(
            Array2::from_shape_vec((1, 4), vec![0.0, 0.0, 10.0, 10.0])
                .unwrap()
                .into_dyn()
                .view(),
            Array1::from_vec(vec![4_i64]).into_dyn().view(),
            scores.into_dyn().view(),
            &table_only,
            0.8,
            "dit",
            800,
            1035,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownLabel(4)));

        // the five-class map accepts the same tensors
        assert!(assemble_instances(
            bboxes.into_dyn().view(),
            labels.into_dyn().view(),
            Array1::from_vec(vec![0.9_f32]).into_dyn().view(),
            &five_class_map(),
            0.8,
            "dit",
            800,
            1035,
        )
        .is_ok());
    }

    #[test]
    fn hf_locator_must_name_repo_and_file() {
        assert!(matches!(
            resolve_weights("hf://unstructuredio"),
            Err(Error::InvalidWeights(_))
        ));
        assert!(matches!(
            resolve_weights(""),
            Err(Error::InvalidWeights(_))
        ));
    }

    #[test]
    fn plain_path_passes_through() {
        let path = resolve_weights("weights/model.onnx").unwrap();
        assert_eq!(path, PathBuf::from("weights/model.onnx"));
    }
}
