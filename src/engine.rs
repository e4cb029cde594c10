use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tokio::sync::oneshot;

/// Trait for implementing inference models that can be used with the [`InfernumEngine`].
///
/// The engine moves the model onto its worker thread, so `run` is only ever
/// called from one thread at a time.
pub trait InfernumModel {
    /// The request type that the model accepts for inference.
    type Request;
    /// The response type that the model returns after inference.
    type Response;
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs inference on the given request and returns a response or error.
    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error>;
}

/// Trait for extracting lightweight metadata from inference requests.
///
/// This allows the engine to report what was inferred (image size, threshold)
/// without cloning heavy data like pixel buffers.
pub trait RequestMetadata {
    /// The lightweight metadata type that represents the request.
    type Metadata: Send + 'static;

    /// Extracts lightweight metadata from the request.
    fn metadata(&self) -> Self::Metadata;
}

/// Errors reported by the engine for a single inference request.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The worker thread is gone, either stopped or never started.
    #[error("inference engine is not running")]
    Stopped,
    /// The model returned an error for this request.
    #[error("{0}")]
    Model(Box<dyn std::error::Error + Send + Sync + 'static>),
    /// The model panicked while handling this request.
    #[error("inference panicked: {0}")]
    Panicked(String),
}

/// Response returned by the engine containing both the model's response and telemetry data.
pub struct InfernumEngineResponse<Metadata, Res> {
    /// Unique identifier assigned when the request was scheduled.
    pub id: u64,
    /// Total time taken for the inference.
    pub duration: Duration,
    /// Lightweight metadata extracted from the original request.
    pub request_metadata: Metadata,
    /// The actual response from the model.
    pub response: Res,
}

type EngineResponse<M> = InfernumEngineResponse<
    <<M as InfernumModel>::Request as RequestMetadata>::Metadata,
    <M as InfernumModel>::Response,
>;

type EngineReply<M> = oneshot::Sender<Result<EngineResponse<M>, EngineError>>;

struct InfernumEngineRequest<M: InfernumModel>
where
    M::Request: RequestMetadata,
{
    id: u64,
    request: M::Request,
    reply: EngineReply<M>,
}

/// Inference engine that owns a model on a dedicated worker thread.
///
/// Requests are queued on a channel and served one at a time, so the model
/// never sees concurrent calls no matter how many HTTP handlers submit work.
/// Each request carries its own reply channel; a failing or panicking
/// inference is reported to that caller only and the worker keeps serving.
pub struct InfernumEngine<M: InfernumModel + Send + 'static>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    req_tx: Option<mpsc::Sender<InfernumEngineRequest<M>>>,
    inference_handle: Option<JoinHandle<()>>,
    id_counter: AtomicU64,
}

impl<M: InfernumModel + Send + 'static> InfernumEngine<M>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    /// Creates a new inference engine with the given model.
    ///
    /// The model is moved to a background thread which lives until the engine
    /// is stopped or dropped.
    pub fn new(mut model: M) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<InfernumEngineRequest<M>>();

        let inference_handle = std::thread::spawn(move || {
            while let Ok(req) = req_rx.recv() {
                log::debug!("Scheduling inference #{}", req.id);

                // Extract lightweight metadata before consuming the request
                let request_metadata = req.request.metadata();
                let start_time = Instant::now();

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| model.run(req.request)));

                let result = match outcome {
                    Ok(Ok(response)) => Ok(InfernumEngineResponse {
                        id: req.id,
                        duration: start_time.elapsed(),
                        request_metadata,
                        response,
                    }),
                    Ok(Err(e)) => Err(EngineError::Model(Box::new(e))),
                    Err(payload) => Err(EngineError::Panicked(panic_message(&*payload))),
                };

                match &result {
                    Ok(rep) => log::debug!("Inference #{} completed in {:?}", rep.id, rep.duration),
                    Err(e) => log::error!("Inference #{} failed: {}", req.id, e),
                }

                // the caller may have gone away; nothing to report to
                let _ = req.reply.send(result);
            }
            log::debug!("Inference worker exiting");
        });

        Self {
            req_tx: Some(req_tx),
            inference_handle: Some(inference_handle),
            id_counter: AtomicU64::new(0),
        }
    }

    /// Queues a request and waits for the worker to answer it.
    pub async fn infer(&self, request: M::Request) -> Result<EngineResponse<M>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.schedule_inference(request, reply)?;
        rx.await.map_err(|_| EngineError::Stopped)?
    }

    fn schedule_inference(&self, request: M::Request, reply: EngineReply<M>) -> Result<(), EngineError> {
        let tx = self.req_tx.as_ref().ok_or(EngineError::Stopped)?;
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        tx.send(InfernumEngineRequest { id, request, reply })
            .map_err(|_| EngineError::Stopped)
    }

    /// Stops the inference engine and shuts down the background thread.
    ///
    /// Requests already queued are still served before the thread exits.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.inference_handle.take() {
            let _ = handle.join();
        }
    }
}

impl<M: InfernumModel + Send + 'static> Drop for InfernumEngine<M>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("odd input {0}")]
    struct OddInput(u32);

    struct Doubler;

    impl RequestMetadata for u32 {
        type Metadata = u32;

        fn metadata(&self) -> u32 {
            *self
        }
    }

    impl InfernumModel for Doubler {
        type Request = u32;
        type Response = u32;
        type Error = OddInput;

        fn run(&mut self, request: u32) -> Result<u32, OddInput> {
            match request {
                13 => panic!("unlucky"),
                n if n % 2 == 1 => Err(OddInput(n)),
                n => Ok(n * 2),
            }
        }
    }

    #[tokio::test]
    async fn test_infer_returns_response_and_metadata() {
        let engine = InfernumEngine::new(Doubler);
        let rep = engine.infer(4).await.unwrap();
        assert_eq!(rep.response, 8);
        assert_eq!(rep.request_metadata, 4);
    }

    #[tokio::test]
    async fn test_ids_increase() {
        let engine = InfernumEngine::new(Doubler);
        let first = engine.infer(2).await.unwrap();
        let second = engine.infer(2).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_model_error_does_not_stop_worker() {
        let engine = InfernumEngine::new(Doubler);

        let err = engine.infer(3).await.err().unwrap();
        assert!(matches!(err, EngineError::Model(_)));
        assert_eq!(err.to_string(), "odd input 3");

        assert_eq!(engine.infer(6).await.unwrap().response, 12);
    }

    #[tokio::test]
    async fn test_panic_is_reported_and_worker_survives() {
        let engine = InfernumEngine::new(Doubler);

        let err = engine.infer(13).await.err().unwrap();
        assert!(matches!(err, EngineError::Panicked(ref msg) if msg == "unlucky"));

        assert_eq!(engine.infer(10).await.unwrap().response, 20);
    }

    #[tokio::test]
    async fn test_stopped_engine_rejects_requests() {
        let mut engine = InfernumEngine::new(Doubler);
        engine.stop();
        assert!(matches!(engine.infer(2).await, Err(EngineError::Stopped)));
    }
}
