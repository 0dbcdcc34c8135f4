use std::path::Path;

use dit_ort::{add_dit_defaults, models::DitModel, InferenceConfig, LabelTable, Result};

fn main() -> Result<()> {
    let img = image::open("demos/data/paper-example.png").unwrap();

    let mut cfg = InferenceConfig::default();
    add_dit_defaults(&mut cfg);
    cfg.merge_from_file(Path::new("configs/cascade_dit_base.yaml"))?;
    cfg.resolve_device();

    let labels = LabelTable::default().resolve("publaynet_val");
    let model = DitModel::from_config(&cfg, labels)?;

    let predictions = model.predict(&img)?;

    for pred in &predictions {
        println!(
            "Label: {}, Confidence: {}, Box: {:?}",
            pred.label, pred.score, pred.bbox
        );
    }

    Ok(())
}
