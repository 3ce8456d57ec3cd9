use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, anyhow, bail};
use image::DynamicImage;
use ndarray::{ArrayView2, Axis, Ix2};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};

use crate::detection::DigitDetector;
use crate::detection::preprocessing::{Letterbox, letterbox};
use crate::models::{BoundingBox, CLASS_COUNT, Detection};

/// Values per prediction ahead of the class scores: center x, center y, width, height.
const CXYWH_OFFSET: usize = 4;

#[derive(Debug, Clone)]
pub struct YoloParams {
    pub input_size: u32,
    /// Candidates under this score are dropped before NMS.
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 32,
        }
    }
}

/// YOLOv8 digit detector backed by an ONNX Runtime session.
pub struct YoloDetector {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    params: YoloParams,
}

impl YoloDetector {
    pub fn load<P: AsRef<Path>>(model_path: P, params: YoloParams) -> anyhow::Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            bail!("Detector model not found at {}", model_path.display());
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level1)
            .context("Failed to set ONNX optimization level")?
            .with_intra_threads(4)
            .context("Failed to set ONNX intra threads")?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load detector model {}", model_path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .unwrap_or_else(|| "output0".to_string());

        tracing::info!(
            model = %model_path.display(),
            input = %input_name,
            output = %output_name,
            "Detector model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            params,
        })
    }
}

impl DigitDetector for YoloDetector {
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<Detection>> {
        let (input, lb) = letterbox(image, self.params.input_size);

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("Detector session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![
                self.input_name.as_str() => TensorRef::from_array_view(&input).context("Failed to build input tensor")?
            ])
            .context("Detector inference failed")?;

        let output = outputs
            .get(self.output_name.as_str())
            .with_context(|| format!("Detector output `{}` missing", self.output_name))?
            .try_extract_array::<f32>()
            .context("Failed to extract detector output")?;

        if output.ndim() != 3 {
            bail!("Unexpected detector output shape {:?}", output.shape());
        }
        let preds = output
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .context("Failed to reshape detector output")?;

        let candidates = decode_predictions(preds, &lb, self.params.conf_threshold)?;
        let mut detections = non_max_suppression(candidates, self.params.iou_threshold);
        detections.truncate(self.params.max_detections);

        tracing::debug!(count = detections.len(), "Detections after NMS");
        Ok(detections)
    }
}

/// Turn a `[4 + classes, N]` (or transposed `[N, 4 + classes]`) prediction matrix into
/// candidate detections in original image coordinates.
pub fn decode_predictions(
    preds: ArrayView2<f32>,
    lb: &Letterbox,
    conf_threshold: f32,
) -> anyhow::Result<Vec<Detection>> {
    let features = CXYWH_OFFSET + CLASS_COUNT;
    let preds = if preds.shape()[0] == features {
        preds
    } else if preds.shape()[1] == features {
        preds.reversed_axes()
    } else {
        bail!(
            "Detector output {:?} does not carry {} features per prediction",
            preds.shape(),
            features
        );
    };

    let mut detections = Vec::new();
    for prediction in preds.axis_iter(Axis(1)) {
        let (class_id, confidence) = prediction
            .iter()
            .skip(CXYWH_OFFSET)
            .copied()
            .enumerate()
            .fold((0usize, f32::MIN), |best, (idx, score)| {
                if score > best.1 { (idx, score) } else { best }
            });

        if confidence < conf_threshold {
            continue;
        }

        let (cx, cy) = lb.to_original(prediction[0], prediction[1]);
        let bbox = BoundingBox::from_center_size(
            cx,
            cy,
            prediction[2] / lb.scale,
            prediction[3] / lb.scale,
        )
        .clamp(lb.orig_width as f32, lb.orig_height as f32);

        detections.push(Detection::new(class_id as u32, confidence, bbox));
    }

    Ok(detections)
}

/// Class-agnostic NMS: one glyph position yields one symbol even if two classes fire on it.
/// Output is sorted by descending confidence.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        if kept
            .iter()
            .all(|k| k.bbox.iou(&candidate.bbox) <= iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}
