//! ONNX object detector with a YOLO-style output head.
//!
//! The model directory holds three artifacts:
//!
//! * `model.cfg` - JSON describing the network input and post-processing
//! * `model.weights` - the ONNX graph
//! * `model.meta` - class labels, one per line
//!
//! The graph takes a `[1, 3, H, W]` RGB tensor scaled to `[0, 1]` and
//! produces `[1, 4 + classes, anchors]` (or its transpose) where each anchor
//! is `cx, cy, w, h` in input pixels followed by per-class scores.

use image::imageops::{self, FilterType};
use ndarray::{Array4, ArrayViewD, Axis, Ix2};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::{
    bounding_box::{BoundingBox, non_maximum_suppression},
    decode::DecodedImage,
    detect::{DetectRequest, Detection},
    engine::InfernumModel,
};

pub const CONFIG_FILE: &str = "model.cfg";
pub const WEIGHTS_FILE: &str = "model.weights";
pub const META_FILE: &str = "model.meta";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model artifact not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid model config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("model metadata lists no class labels")]
    NoLabels,
    #[error("onnx runtime: {0}")]
    Runtime(String),
    #[error("unexpected output shape {shape:?} for {classes} classes")]
    OutputShape { shape: Vec<usize>, classes: usize },
}

fn runtime<E: std::fmt::Display>(e: E) -> ModelError {
    ModelError::Runtime(e.to_string())
}

/// Contents of `model.cfg`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub input_width: u32,
    pub input_height: u32,
    /// IoU above which a lower-scoring box of the same class is dropped.
    pub nms_threshold: f32,
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_width: 640,
            input_height: 640,
            nms_threshold: 0.45,
            intra_threads: 1,
        }
    }
}

impl ModelConfig {
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Reads class labels, skipping blank lines and `#` comments.
pub fn parse_labels(text: &str) -> Result<Vec<String>, ModelError> {
    let labels: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();

    if labels.is_empty() {
        return Err(ModelError::NoLabels);
    }
    Ok(labels)
}

fn read_artifact(path: &Path) -> Result<String, ModelError> {
    if !path.exists() {
        return Err(ModelError::NotFound(path.to_path_buf()));
    }
    std::fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// The loaded network plus everything needed to interpret its output.
pub struct YoloModel {
    session: Session,
    input_name: String,
    config: ModelConfig,
    labels: Vec<String>,
}

impl std::fmt::Debug for YoloModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloModel")
            .field("input_name", &self.input_name)
            .field("config", &self.config)
            .field("labels", &self.labels.len())
            .finish_non_exhaustive()
    }
}

impl YoloModel {
    /// Loads `model.cfg`, `model.weights` and `model.meta` from `model_dir`.
    pub fn load(model_dir: impl AsRef<Path>) -> Result<Self, ModelError> {
        let model_dir = model_dir.as_ref();

        let config = ModelConfig::parse(&read_artifact(&model_dir.join(CONFIG_FILE))?)?;
        let labels = parse_labels(&read_artifact(&model_dir.join(META_FILE))?)?;

        let weights = model_dir.join(WEIGHTS_FILE);
        if !weights.exists() {
            return Err(ModelError::NotFound(weights));
        }

        log::info!("Loading detection model from {}", weights.display());

        let session = Session::builder()
            .map_err(runtime)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(runtime)?
            .with_intra_threads(config.intra_threads)
            .map_err(runtime)?
            .commit_from_file(&weights)
            .map_err(runtime)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| ModelError::Runtime("model has no inputs".to_string()))?;

        log::info!(
            "Detection model ready: input '{}' {}x{}, {} classes",
            input_name,
            config.input_width,
            config.input_height,
            labels.len()
        );

        Ok(Self {
            session,
            input_name,
            config,
            labels,
        })
    }

    fn infer(&mut self, image: &DecodedImage, threshold: f32) -> Result<Vec<Detection>, ModelError> {
        let input = preprocess(image, self.config.input_width, self.config.input_height);
        let input = Tensor::from_array(input).map_err(runtime)?;

        let outputs = self
            .session
            .run(ort::inputs![&self.input_name => input])
            .map_err(runtime)?;

        let output = outputs[0].try_extract_array::<f32>().map_err(runtime)?;

        let scale = (
            image.width() as f32 / self.config.input_width as f32,
            image.height() as f32 / self.config.input_height as f32,
        );
        let candidates = postprocess(output.view(), &self.labels, threshold, scale)?;

        Ok(non_maximum_suppression(candidates, self.config.nms_threshold))
    }
}

impl InfernumModel for YoloModel {
    type Request = DetectRequest;
    type Response = Vec<Detection>;
    type Error = ModelError;

    fn run(&mut self, request: DetectRequest) -> Result<Vec<Detection>, ModelError> {
        self.infer(&request.image, request.threshold)
    }
}

/// Resizes to the network input and lays the pixels out as NCHW in `[0, 1]`.
pub fn preprocess(image: &DecodedImage, width: u32, height: u32) -> Array4<f32> {
    let resized = imageops::resize(image.as_rgb(), width, height, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

/// Turns the raw head into detections above `threshold`, in original image pixels.
///
/// `scale` maps input pixels back to the original image as `(sx, sy)`.
pub fn postprocess(
    output: ArrayViewD<'_, f32>,
    labels: &[String],
    threshold: f32,
    scale: (f32, f32),
) -> Result<Vec<Detection>, ModelError> {
    let classes = labels.len();
    let shape_error = || ModelError::OutputShape {
        shape: output.shape().to_vec(),
        classes,
    };

    // drop the batch axis, leaving one row per attribute or per anchor
    let head = match output.ndim() {
        3 => output.index_axis(Axis(0), 0),
        2 => output.view(),
        _ => return Err(shape_error()),
    };
    let head = head.into_dimensionality::<Ix2>().map_err(|_| shape_error())?;

    let attributes = 4 + classes;
    let head = if head.nrows() == attributes {
        head
    } else if head.ncols() == attributes {
        head.reversed_axes()
    } else {
        return Err(shape_error());
    };

    let (sx, sy) = scale;
    let mut detections = Vec::new();

    for anchor in head.axis_iter(Axis(1)) {
        let (class_id, confidence) = anchor
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, score)| {
                if score > best.1 { (i, score) } else { best }
            });

        if confidence <= threshold {
            continue;
        }

        detections.push(Detection {
            label: labels[class_id].clone(),
            confidence,
            bbox: BoundingBox {
                x: anchor[0] * sx,
                y: anchor[1] * sy,
                width: anchor[2] * sx,
                height: anchor[3] * sy,
            },
        });
    }

    Ok(detections)
}
