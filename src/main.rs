use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use dit_ort::{
    add_dit_defaults, models::DitModel, visualize, InferenceConfig, LabelTable, Visualizer,
};

/// Run DiT document layout inference on a single image and write an
/// annotated copy of it.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the input image.
    #[arg(long = "image_path", value_name = "PATH")]
    image_path: PathBuf,

    /// Where to write the annotated image. Defaults to
    /// `<stem>_annotated.<ext>` next to the input.
    #[arg(long = "output_file_name", value_name = "PATH")]
    output_file_name: Option<PathBuf>,

    /// Path to the inference configuration file.
    #[arg(
        long = "config-file",
        value_name = "FILE",
        default_value = "configs/cascade_dit_base.yaml"
    )]
    config_file: PathBuf,

    /// Trailing KEY VALUE pairs merged last into the configuration,
    /// e.g. `--opts MODEL.DEVICE cpu DATASETS.TEST icdar2019_test`.
    #[arg(
        long = "opts",
        value_name = "KEY VALUE",
        num_args = 0..,
        allow_hyphen_values = true
    )]
    opts: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    run(&args)
}

fn run(args: &Args) -> Result<()> {
    // One read; the decoded image serves validation, inference, and drawing.
    let img = image::open(&args.image_path)
        .with_context(|| format!("failed to read image {}", args.image_path.display()))?;
    tracing::info!(
        path = %args.image_path.display(),
        width = img.width(),
        height = img.height(),
        "image loaded"
    );

    let mut cfg = InferenceConfig::default();
    add_dit_defaults(&mut cfg);
    cfg.merge_from_file(&args.config_file)
        .with_context(|| format!("failed to merge {}", args.config_file.display()))?;
    cfg.merge_from_opts(&args.opts)?;
    cfg.resolve_device();

    let dataset = cfg.datasets.test.first().cloned().unwrap_or_default();
    let label_map = LabelTable::default().resolve(&dataset);

    let model = DitModel::from_config(&cfg, label_map)?;
    let instances = model.predict(&img)?;
    tracing::info!(count = instances.len(), "inference complete");

    let annotated = Visualizer::default().annotate(&img, &instances);

    let output = args
        .output_file_name
        .clone()
        .unwrap_or_else(|| derive_output_path(&args.image_path));
    visualize::write_image(&annotated, &output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    Ok(())
}

fn derive_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match input.extension() {
        Some(ext) => format!("{stem}_annotated.{}", ext.to_string_lossy()),
        None => format!("{stem}_annotated.png"),
    };
    input.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_path_is_required() {
        assert!(Args::try_parse_from(["dit-infer"]).is_err());
        assert!(Args::try_parse_from(["dit-infer", "--image_path", "page.png"]).is_ok());
    }

    #[test]
    fn opts_capture_trailing_pairs() {
        let args = Args::try_parse_from([
            "dit-infer",
            "--image_path",
            "page.png",
            "--opts",
            "MODEL.DEVICE",
            "cpu",
            "MODEL.WEIGHTS",
            "model.onnx",
        ])
        .unwrap();
        assert_eq!(
            args.opts,
            vec!["MODEL.DEVICE", "cpu", "MODEL.WEIGHTS", "model.onnx"]
        );
    }

    #[test]
    fn config_file_has_a_bundled_default() {
        let args = Args::try_parse_from(["dit-infer", "--image_path", "page.png"]).unwrap();
        assert_eq!(
            args.config_file,
            PathBuf::from("configs/cascade_dit_base.yaml")
        );
    }

    #[test]
    fn output_path_is_derived_from_input() {
        assert_eq!(
            derive_output_path(Path::new("scans/page.png")),
            PathBuf::from("scans/page_annotated.png")
        );
        assert_eq!(
            derive_output_path(Path::new("page")),
            PathBuf::from("page_annotated.png")
        );
    }
}
