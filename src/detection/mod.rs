pub mod preprocessing;
pub mod reconstruct;
pub mod yolo;

use image::DynamicImage;

use crate::models::Detection;

pub use reconstruct::{DigitReconstructor, Reconstruction};
pub use yolo::{YoloDetector, YoloParams};

/// Finds digit and decimal-point glyphs on a photo of a scale display.
pub trait DigitDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<Detection>>;
}

/// Full photo-to-reading path: detect symbols, then rebuild the displayed number.
pub fn read_display<D: DigitDetector + ?Sized>(
    detector: &D,
    reconstructor: &DigitReconstructor,
    image: &DynamicImage,
) -> anyhow::Result<Reconstruction> {
    let detections = detector.detect(image)?;
    tracing::debug!(
        count = detections.len(),
        "Detector returned symbols for {}x{} image",
        image.width(),
        image.height()
    );
    Ok(reconstructor.reconstruct(&detections))
}
