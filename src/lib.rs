//! Object detection over HTTP for remote JPEG images.
//!
//! A request to `GET /p/?img=<url>` walks a fixed pipeline: the image is
//! fetched under tight timeouts, its status and content type are checked, the
//! bytes are decoded to RGB and the pixels are handed to an [`InfernumEngine`],
//! which owns the detection model on a dedicated worker thread. Detections at or
//! below [`THRESHOLD`] are never returned.

pub mod bounding_box;
pub mod config;
pub mod decode;
pub mod detect;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod server;
pub mod validate;
pub mod yolo;

pub use bounding_box::BoundingBox;
pub use config::Config;
pub use decode::{DecodeError, DecodedImage};
pub use detect::{DetectRequest, Detection, DetectionModel, THRESHOLD};
pub use engine::{
    EngineError, InfernumEngine, InfernumEngineResponse, InfernumModel, RequestMetadata,
};
pub use error::AnalyzeError;
pub use fetch::{FetchConfig, FetchError, Fetcher};
pub use server::{AppState, router, serve};
pub use yolo::{ModelError, YoloModel};
