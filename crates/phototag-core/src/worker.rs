//! Detection worker: a dedicated OS thread that owns the face detector.
//!
//! Async callers hand it one decoded image at a time and await the reply,
//! so inference never blocks the interactive side.

use crate::detector::{DetectorError, FaceDetect};
use image::DynamicImage;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("failed to spawn detection thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("detection thread exited")]
    ChannelClosed,
}

struct DetectRequest {
    image: Arc<DynamicImage>,
    reply: oneshot::Sender<Result<bool, DetectorError>>,
}

/// Clone-safe handle to the detection thread.
#[derive(Clone)]
pub struct DetectorHandle {
    tx: mpsc::Sender<DetectRequest>,
    backend: &'static str,
}

impl DetectorHandle {
    /// Name of the backend running on the worker.
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Ask the worker whether `image` contains at least one face.
    pub async fn contains_face(&self, image: Arc<DynamicImage>) -> Result<bool, WorkerError> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(DetectRequest { image, reply })
            .await
            .map_err(|_| WorkerError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| WorkerError::ChannelClosed)??)
    }
}

/// Move `detector` onto its own thread and return a handle to it.
///
/// The thread exits once every handle has been dropped.
pub fn spawn_detector(detector: Box<dyn FaceDetect>) -> Result<DetectorHandle, WorkerError> {
    let backend = detector.name();
    let (tx, mut rx) = mpsc::channel::<DetectRequest>(1);

    std::thread::Builder::new()
        .name("phototag-detect".into())
        .spawn(move || {
            let mut detector = detector;
            tracing::debug!(backend, "detection thread started");
            while let Some(DetectRequest { image, reply }) = rx.blocking_recv() {
                let result = detector.contains_face(&image);
                let _ = reply.send(result);
            }
            tracing::debug!(backend, "detection thread exiting");
        })?;

    Ok(DetectorHandle { tx, backend })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    struct CountingDetector {
        calls: usize,
    }

    impl FaceDetect for CountingDetector {
        fn name(&self) -> &'static str {
            "counting"
        }

        // Reports a face on every other call.
        fn detect(&mut self, _image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectorError> {
            self.calls += 1;
            if self.calls % 2 == 1 {
                Ok(vec![BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 1.0,
                    height: 1.0,
                    confidence: 0.9,
                }])
            } else {
                Ok(vec![])
            }
        }
    }

    #[tokio::test]
    async fn test_worker_keeps_detector_state_across_requests() {
        let handle = spawn_detector(Box::new(CountingDetector { calls: 0 })).unwrap();
        assert_eq!(handle.backend(), "counting");

        let image = Arc::new(DynamicImage::new_rgb8(8, 8));
        assert!(handle.contains_face(image.clone()).await.unwrap());
        assert!(!handle.contains_face(image.clone()).await.unwrap());
        assert!(handle.contains_face(image).await.unwrap());
    }

    #[tokio::test]
    async fn test_worker_forwards_detector_errors() {
        let detector = crate::detector::UnavailableDetector::new("test");
        let handle = spawn_detector(Box::new(detector)).unwrap();
        let image = Arc::new(DynamicImage::new_rgb8(8, 8));
        let err = handle.contains_face(image).await.unwrap_err();
        assert!(matches!(err, WorkerError::Detector(DetectorError::Unavailable(_))));
    }
}
