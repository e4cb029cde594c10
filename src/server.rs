use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::{
    decode::decode,
    detect::{DetectionModel, Detection, THRESHOLD, detect},
    engine::InfernumEngine,
    error::AnalyzeError,
    fetch::Fetcher,
    validate::validate,
};

/// Name of the query parameter carrying the image URL.
pub const IMAGE_PARAM: &str = "img";

#[derive(Debug, Serialize)]
pub struct DetectionsResponse {
    pub detections: Vec<Detection>,
}

/// Shared, read-only state handed to every request.
pub struct AppState<M: DetectionModel> {
    pub engine: Arc<InfernumEngine<M>>,
    pub fetcher: Fetcher,
    pub threshold: f32,
}

impl<M: DetectionModel> AppState<M> {
    pub fn new(engine: Arc<InfernumEngine<M>>, fetcher: Fetcher) -> Self {
        Self {
            engine,
            fetcher,
            threshold: THRESHOLD,
        }
    }
}

impl<M: DetectionModel> Clone for AppState<M> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            fetcher: self.fetcher.clone(),
            threshold: self.threshold,
        }
    }
}

pub fn router<M: DetectionModel>(state: AppState<M>) -> Router {
    Router::new()
        .route("/p/", get(analyze::<M>))
        .with_state(state)
}

/// Fetches the image named by `img`, runs detection on it and answers with the result.
pub async fn analyze<M: DetectionModel>(
    State(state): State<AppState<M>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<DetectionsResponse>, AnalyzeError> {
    log::debug!(">>>>>>>>>>>>>>>> NEW ANALYZE REQUEST >>>>>>>>>>>>>>>>");

    let url = image_url(params)
        .filter(|url| !url.is_empty())
        .ok_or(AnalyzeError::MissingParameter)?;

    log::debug!("Analyze URL: {}", url);

    let fetched = state.fetcher.fetch(&url).await?;

    log::debug!("Status code: {}", fetched.status().as_u16());
    log::debug!("Content type: {:?}", fetched.content_type());

    validate(fetched.status(), fetched.content_type())?;

    let body = fetched.body().await?;
    let image = decode(&body)?;
    let detections = detect(&state.engine, image, state.threshold).await?;

    log::debug!("Detections: {:?}", detections);

    Ok(Json(DetectionsResponse { detections }))
}

/// First `img` value of the query string. Repeats after it are ignored.
fn image_url(params: Vec<(String, String)>) -> Option<String> {
    params
        .into_iter()
        .find_map(|(key, value)| (key == IMAGE_PARAM).then_some(value))
}

/// Binds `addr` and serves the detection route until the process exits.
pub async fn serve<M: DetectionModel>(addr: &str, state: AppState<M>) -> std::io::Result<()> {
    let app = router(state);

    log::info!("Starting the server");
    log::info!("Listening on: {}", addr);
    log::info!("  GET /p/?img=<url>  - detect objects in a remote JPEG");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(query: &[(&str, &str)]) -> Vec<(String, String)> {
        query.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_image_url_takes_first_value() {
        let params = pairs(&[("foo", "bar"), ("img", "http://a/1.jpg"), ("img", "http://a/2.jpg")]);
        assert_eq!(image_url(params).as_deref(), Some("http://a/1.jpg"));
    }

    #[test]
    fn test_image_url_missing() {
        assert_eq!(image_url(pairs(&[("foo", "bar")])), None);
        assert_eq!(image_url(Vec::new()), None);
    }
}
