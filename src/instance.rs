use geo_types::{coord, Rect};

/// One detected region on a document page.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Instance {
    pub bbox: Rect<f32>,
    pub class_id: i64,
    pub label: String,
    pub score: f32,
    pub source: String,
}

impl Instance {
    pub fn new(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        class_id: i64,
        label: &str,
        score: f32,
        source: &str,
    ) -> Self {
        let bbox = Rect::new(coord! { x: x1, y: y1 }, coord! { x: x2, y: y2 });

        Self {
            bbox,
            class_id,
            label: label.to_string(),
            score,
            source: source.to_string(),
        }
    }

    pub fn width(&self) -> f32 {
        self.bbox.width()
    }

    pub fn height(&self) -> f32 {
        self.bbox.height()
    }

    /// Clamp the box into a `width` x `height` pixel plane.
    pub fn clamp_to(&mut self, width: u32, height: u32) {
        let max_x = (width.saturating_sub(1)) as f32;
        let max_y = (height.saturating_sub(1)) as f32;
        let min = self.bbox.min();
        let max = self.bbox.max();
        self.bbox = Rect::new(
            coord! {
                x: min.x.clamp(0.0, max_x),
                y: min.y.clamp(0.0, max_y),
            },
            coord! {
                x: max.x.clamp(0.0, max_x),
                y: max.y.clamp(0.0, max_y),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_accessors() {
        let inst = Instance::new(10.0, 20.0, 110.0, 70.0, 0, "text", 0.9, "dit");
        assert_eq!(inst.width(), 100.0);
        assert_eq!(inst.height(), 50.0);
    }

    #[test]
    fn clamp_keeps_box_inside_image() {
        let mut inst = Instance::new(-5.0, 10.0, 900.0, 2000.0, 3, "table", 0.95, "dit");
        inst.clamp_to(800, 1035);
        assert_eq!(inst.bbox.min().x, 0.0);
        assert_eq!(inst.bbox.min().y, 10.0);
        assert_eq!(inst.bbox.max().x, 799.0);
        assert_eq!(inst.bbox.max().y, 1034.0);
    }
}
