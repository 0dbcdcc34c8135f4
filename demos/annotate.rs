use std::path::Path;

use dit_ort::{
    add_dit_defaults, models::DitModel, visualize, InferenceConfig, LabelTable, Visualizer,
    Result,
};

fn main() -> Result<()> {
    let img = image::open("demos/data/paper-example.png").unwrap();

    let mut cfg = InferenceConfig::default();
    add_dit_defaults(&mut cfg);
    cfg.merge_from_file(Path::new("configs/cascade_dit_base.yaml"))?;
    cfg.resolve_device();

    let labels = LabelTable::default().resolve("publaynet_val");
    let model = DitModel::from_config(&cfg, labels)?;

    let predictions = model.predict(&img)?;

    let annotated = Visualizer::default().annotate(&img, &predictions);
    visualize::write_image(&annotated, Path::new("paper-example_annotated.png"))?;

    Ok(())
}
