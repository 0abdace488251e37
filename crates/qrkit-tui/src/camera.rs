//! Camera capability for the scan tab.
//!
//! With the `camera` feature, frames come from `nokhwa` on a dedicated capture
//! thread that keeps only the newest frame; the scan controller samples it on
//! its own schedule. Without the feature the capability is unavailable and
//! every request is refused.

use async_trait::async_trait;
use qrkit_core::{CameraProvider, FacingMode, MediaStream, QrError, Result};
use std::sync::Arc;

/// Resolve the camera capability. Called once at startup.
pub fn detect(index: u32) -> Arc<dyn CameraProvider> {
    #[cfg(feature = "camera")]
    {
        tracing::info!("Camera support enabled (device {})", index);
        Arc::new(native::NativeCamera::new(index))
    }
    #[cfg(not(feature = "camera"))]
    {
        tracing::info!("Built without camera support; device {} ignored", index);
        Arc::new(NoCamera)
    }
}

/// Provider used when no camera backend is compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCamera;

#[async_trait]
impl CameraProvider for NoCamera {
    async fn request(&self, _facing: FacingMode) -> Result<Box<dyn MediaStream>> {
        Err(QrError::CameraUnavailable(
            "this build has no camera support (rebuild with --features camera)".to_string(),
        ))
    }
}

#[cfg(feature = "camera")]
mod native {
    use super::*;
    use nokhwa::Camera;
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    };
    use qrkit_core::PixelBuffer;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tokio::sync::oneshot;

    pub struct NativeCamera {
        index: u32,
    }

    impl NativeCamera {
        pub fn new(index: u32) -> Self {
            Self { index }
        }
    }

    #[async_trait]
    impl CameraProvider for NativeCamera {
        async fn request(&self, facing: FacingMode) -> Result<Box<dyn MediaStream>> {
            // Desktop backends expose no facing information; the hint is only logged.
            tracing::info!("Opening camera {} (preferred facing {:?})", self.index, facing);
            let stream = CaptureStream::open(self.index).await?;
            Ok(Box::new(stream))
        }
    }

    type LatestFrame = Arc<Mutex<Option<PixelBuffer>>>;

    struct CaptureStream {
        resolution: (u32, u32),
        latest: LatestFrame,
        stop: Arc<AtomicBool>,
        thread: Option<JoinHandle<()>>,
    }

    impl CaptureStream {
        async fn open(index: u32) -> Result<Self> {
            let (ready_tx, ready_rx) = oneshot::channel();
            let latest: LatestFrame = Arc::new(Mutex::new(None));
            let stop = Arc::new(AtomicBool::new(false));

            let thread_latest = latest.clone();
            let thread_stop = stop.clone();
            let thread = thread::Builder::new()
                .name("qrkit-camera".to_string())
                .spawn(move || capture_loop(index, ready_tx, thread_latest, thread_stop))
                .map_err(QrError::camera)?;

            let resolution = ready_rx
                .await
                .map_err(|_| QrError::camera("capture thread exited before opening"))??;

            Ok(Self {
                resolution,
                latest,
                stop,
                thread: Some(thread),
            })
        }
    }

    impl MediaStream for CaptureStream {
        fn resolution(&self) -> (u32, u32) {
            self.resolution
        }

        fn is_ready(&self) -> bool {
            self.latest.lock().map(|f| f.is_some()).unwrap_or(false)
        }

        fn sample(&mut self) -> Result<PixelBuffer> {
            self.latest
                .lock()
                .map_err(|_| QrError::camera("frame slot poisoned"))?
                .take()
                .ok_or_else(|| QrError::camera("no frame buffered"))
        }

        fn release(&mut self) {
            self.stop.store(true, Ordering::SeqCst);
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() {
                    tracing::warn!("Camera capture thread panicked");
                }
                tracing::info!("Camera released");
            }
        }
    }

    impl Drop for CaptureStream {
        fn drop(&mut self) {
            self.release();
        }
    }

    fn open_camera(index: u32) -> std::result::Result<Camera, String> {
        // Higher resolutions first; QR detection benefits from detail.
        let formats_to_try = [
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
                Resolution::new(1280, 720),
                FrameFormat::MJPEG,
                30,
            ))),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
                Resolution::new(1280, 720),
                FrameFormat::YUYV,
                30,
            ))),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
                Resolution::new(640, 480),
                FrameFormat::MJPEG,
                30,
            ))),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ];

        let mut last_error = String::new();
        for (i, requested) in formats_to_try.iter().enumerate() {
            match Camera::new(CameraIndex::Index(index), *requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => return Ok(camera),
                    Err(e) => last_error = format!("failed to start stream: {}", e),
                },
                Err(e) => {
                    tracing::debug!("Camera format {}/{} failed: {}", i + 1, formats_to_try.len(), e);
                    last_error = e.to_string();
                }
            }
        }
        Err(format!("could not open camera {}: {}", index, last_error))
    }

    fn capture_loop(
        index: u32,
        ready: oneshot::Sender<Result<(u32, u32)>>,
        latest: LatestFrame,
        stop: Arc<AtomicBool>,
    ) {
        let mut camera = match open_camera(index) {
            Ok(camera) => camera,
            Err(e) => {
                let _ = ready.send(Err(QrError::CameraUnavailable(e)));
                return;
            }
        };
        let res = camera.resolution();
        tracing::info!(
            "Camera opened: {} at {}x{}",
            camera.info().human_name(),
            res.width(),
            res.height()
        );
        if ready.send(Ok((res.width(), res.height()))).is_err() {
            // Requester went away; dropping the camera releases it.
            return;
        }

        while !stop.load(Ordering::SeqCst) {
            let frame = match camera.frame().and_then(|f| f.decode_image::<RgbFormat>()) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("Frame capture error: {}", e);
                    thread::sleep(Duration::from_millis(100));
                    continue;
                }
            };
            let (width, height) = frame.dimensions();
            match PixelBuffer::from_rgb(width, height, frame.as_raw()) {
                Ok(buffer) => {
                    if let Ok(mut slot) = latest.lock() {
                        *slot = Some(buffer);
                    }
                }
                Err(e) => tracing::warn!("Dropping malformed frame: {}", e),
            }
        }

        if let Err(e) = camera.stop_stream() {
            tracing::debug!("Stopping camera stream: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_camera_refuses() {
        let result = NoCamera.request(FacingMode::Environment).await;
        assert!(matches!(result, Err(QrError::CameraUnavailable(_))));
    }
}
