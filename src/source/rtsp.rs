use super::interface::SourceBackend;
use crate::error::SourceError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::{MessageType, Pipeline};
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// RTSP camera decoded to packed RGB through GStreamer.
///
/// The appsink callback overwrites a latest-only slot, so a slow reader
/// always gets the newest decoded frame and older ones are dropped.
pub struct RtspBackend {
    url: String,
    latency_ms: u32,
    pipeline: Option<Pipeline>,
    frames: Option<watch::Receiver<Option<FrameData>>>,
    frame_counter: Arc<AtomicU64>,
}

impl RtspBackend {
    pub fn new(url: impl Into<String>, latency_ms: u32) -> Self {
        Self {
            url: url.into(),
            latency_ms,
            pipeline: None,
            frames: None,
            frame_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    fn build_pipeline_string(&self) -> String {
        format!(
            "rtspsrc location={} latency={} ! \
             decodebin ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=sink sync=false max-buffers=1 drop=true emit-signals=false",
            self.url, self.latency_ms
        )
    }

    fn connect_error(&self, details: impl Into<String>) -> SourceError {
        SourceError::Connect {
            target: self.url.clone(),
            details: details.into(),
        }
    }

    /// Surface pipeline errors and end-of-stream posted since the last read
    fn check_bus(&self) -> Result<(), SourceError> {
        let Some(bus) = self.pipeline.as_ref().and_then(|p| p.bus()) else {
            return Ok(());
        };

        while let Some(msg) = bus.pop_filtered(&[MessageType::Error, MessageType::Eos]) {
            let details = match msg.view() {
                gstreamer::MessageView::Error(err) => {
                    format!("pipeline error: {} ({:?})", err.error(), err.debug())
                }
                gstreamer::MessageView::Eos(..) => "end of stream".to_string(),
                _ => continue,
            };
            return Err(SourceError::Dropped {
                target: self.url.clone(),
                details,
            });
        }
        Ok(())
    }

    fn teardown(&mut self) {
        self.frames = None;
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop RTSP pipeline: {}", e);
            }
        }
    }
}

/// Copy a decoded sample into a tightly packed RGB frame
fn sample_to_frame(sample: &gstreamer::Sample, id: u64) -> Result<FrameData, SourceError> {
    let invalid = |details: String| SourceError::InvalidFrame { details };

    let buffer = sample
        .buffer()
        .ok_or_else(|| invalid("no buffer in sample".to_string()))?;
    let caps = sample
        .caps()
        .ok_or_else(|| invalid("no caps in sample".to_string()))?;
    let info = VideoInfo::from_caps(caps).map_err(|e| invalid(format!("bad caps: {}", e)))?;
    let map = buffer
        .map_readable()
        .map_err(|e| invalid(format!("failed to map buffer: {}", e)))?;

    let width = info.width();
    let height = info.height();
    let row = width as usize * 3;
    let stride = info.stride().first().copied().unwrap_or(row as i32) as usize;
    let src = map.as_slice();

    let needed = stride * (height as usize).saturating_sub(1) + row;
    if stride < row || src.len() < needed {
        return Err(invalid(format!(
            "{} bytes for {}x{} with stride {}",
            src.len(),
            width,
            height,
            stride
        )));
    }

    let data = if stride == row {
        src[..row * height as usize].to_vec()
    } else {
        let mut packed = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            packed.extend_from_slice(&src[y * stride..y * stride + row]);
        }
        packed
    };

    Ok(FrameData::new(
        id,
        SystemTime::now(),
        data,
        width,
        height,
        FrameFormat::Rgb24,
    ))
}

#[async_trait]
impl SourceBackend for RtspBackend {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn connect(&mut self) -> Result<(), SourceError> {
        self.teardown();

        gstreamer::init().map_err(|e| self.connect_error(format!("GStreamer init failed: {}", e)))?;

        let desc = self.build_pipeline_string();
        debug!("Creating GStreamer pipeline: {}", desc);

        let pipeline = gstreamer::parse::launch(&desc)
            .map_err(|e| self.connect_error(format!("failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| self.connect_error("failed to downcast to Pipeline"))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| self.connect_error("pipeline has no appsink"))?
            .downcast::<AppSink>()
            .map_err(|_| self.connect_error("sink element is not an AppSink"))?;

        let (tx, rx) = watch::channel(None);
        let frame_counter = Arc::clone(&self.frame_counter);
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                    let id = frame_counter.fetch_add(1, Ordering::Relaxed);
                    match sample_to_frame(&sample, id) {
                        Ok(frame) => {
                            trace!("Decoded RTSP frame {} ({}x{})", id, frame.width, frame.height);
                            tx.send_replace(Some(frame));
                        }
                        Err(e) => warn!("Discarding RTSP sample: {}", e),
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(self.connect_error(format!("failed to start pipeline: {}", e)));
        }

        info!("RTSP pipeline playing for {}", self.url);
        self.pipeline = Some(pipeline);
        self.frames = Some(rx);
        Ok(())
    }

    async fn read_frame(&mut self, timeout: Duration) -> Result<Option<FrameData>, SourceError> {
        self.check_bus()?;

        let url = self.url.clone();
        let frames = self.frames.as_mut().ok_or_else(|| SourceError::Dropped {
            target: url.clone(),
            details: "not connected".to_string(),
        })?;

        match tokio::time::timeout(timeout, frames.changed()).await {
            Ok(Ok(())) => Ok(frames.borrow_and_update().clone()),
            Ok(Err(_)) => Err(SourceError::Dropped {
                target: url,
                details: "appsink closed".to_string(),
            }),
            Err(_) => {
                self.check_bus()?;
                Ok(None)
            }
        }
    }

    async fn disconnect(&mut self) {
        self.teardown();
        debug!("RTSP pipeline for {} stopped", self.url);
    }
}

impl Drop for RtspBackend {
    fn drop(&mut self) {
        self.teardown();
    }
}
