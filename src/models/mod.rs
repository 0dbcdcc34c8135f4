//! Implemented layout models.

mod detectron2;

pub use detectron2::DitModel;
