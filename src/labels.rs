//! Dataset-to-class-name resolution.
//!
//! The evaluation dataset named first in `DATASETS.TEST` decides which class
//! names the visualizer renders. The mapping is a plain lookup table; the
//! resolved list is handed to the model and visualizer directly and no
//! process-wide state is involved.

/// Index-to-name pairing consumed by the model and the visualizer.
pub type LabelMap = Vec<(i64, String)>;

/// The five-class document layout vocabulary (PubLayNet ordering).
pub const LAYOUT_CLASSES: [&str; 5] = ["text", "title", "list", "table", "figure"];

/// Dataset identifier whose runs detect tables only.
pub const TABLE_ONLY_DATASET: &str = "icdar2019_test";

#[derive(Debug, Clone)]
pub struct LabelTable {
    entries: Vec<(String, Vec<String>)>,
    fallback: Vec<String>,
}

impl Default for LabelTable {
    fn default() -> Self {
        Self {
            entries: vec![(TABLE_ONLY_DATASET.to_string(), vec!["table".to_string()])],
            fallback: LAYOUT_CLASSES.iter().map(|l| l.to_string()).collect(),
        }
    }
}

impl LabelTable {
    /// Register an additional dataset. Later entries shadow earlier ones.
    pub fn with_entry(mut self, dataset: &str, classes: &[&str]) -> Self {
        self.entries.insert(
            0,
            (
                dataset.to_string(),
                classes.iter().map(|l| l.to_string()).collect(),
            ),
        );
        self
    }

    /// Resolve a dataset identifier to its label map, falling back to the
    /// five-class layout vocabulary for anything unregistered.
    pub fn resolve(&self, dataset: &str) -> LabelMap {
        let classes = self
            .entries
            .iter()
            .find(|(d, _)| d == dataset)
            .map(|(_, c)| c)
            .unwrap_or(&self.fallback);

        classes
            .iter()
            .enumerate()
            .map(|(i, l)| (i as i64, l.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_only_dataset_resolves_to_single_class() {
        let map = LabelTable::default().resolve(TABLE_ONLY_DATASET);
        assert_eq!(map, vec![(0, "table".to_string())]);
    }

    #[test]
    fn unregistered_dataset_falls_back_to_layout_classes() {
        let map = LabelTable::default().resolve("publaynet_val");
        let names: Vec<_> = map.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(names, LAYOUT_CLASSES);
        assert_eq!(map[0].0, 0);
        assert_eq!(map[4].0, 4);
    }

    #[test]
    fn registered_entry_shadows_fallback() {
        let table = LabelTable::default().with_entry("prima_layout", &["region"]);
        assert_eq!(table.resolve("prima_layout"), vec![(0, "region".to_string())]);
        // the builtin table entry is untouched
        assert_eq!(
            table.resolve(TABLE_ONLY_DATASET),
            vec![(0, "table".to_string())]
        );
    }
}
