use super::interface::SourceBackend;
use crate::error::SourceError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use std::time::{Duration, SystemTime};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::trace;

/// Generates a moving RGB test pattern at a fixed rate
pub struct SyntheticBackend {
    width: u32,
    height: u32,
    fps: u32,
    ticker: Option<Interval>,
    next_id: u64,
}

impl SyntheticBackend {
    pub fn new(resolution: (u32, u32), fps: u32) -> Self {
        Self {
            width: resolution.0,
            height: resolution.1,
            fps: fps.max(1),
            ticker: None,
            next_id: 0,
        }
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.fps as u64)
    }

    /// Diagonal gradient with a bright bar sweeping left to right
    fn render(&self, id: u64) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let bar_x = (id as usize * 4) % w.max(1);
        let bar_w = (w / 16).max(1);
        let mut data = vec![0u8; w * h * 3];

        for (i, px) in data.chunks_exact_mut(3).enumerate() {
            let x = i % w;
            let y = i / w;
            if x >= bar_x && x < bar_x + bar_w {
                px.copy_from_slice(&[240, 240, 240]);
            } else {
                px[0] = ((x * 255) / w.max(1)) as u8;
                px[1] = ((y * 255) / h.max(1)) as u8;
                px[2] = (id % 256) as u8;
            }
        }
        data
    }
}

#[async_trait]
impl SourceBackend for SyntheticBackend {
    fn describe(&self) -> String {
        format!("synthetic {}x{}@{}fps", self.width, self.height, self.fps)
    }

    async fn connect(&mut self) -> Result<(), SourceError> {
        if self.width == 0 || self.height == 0 {
            return Err(SourceError::Connect {
                target: self.describe(),
                details: "resolution must be non-zero".to_string(),
            });
        }
        let mut ticker = tokio::time::interval(self.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        Ok(())
    }

    async fn read_frame(&mut self, timeout: Duration) -> Result<Option<FrameData>, SourceError> {
        let ticker = self.ticker.as_mut().ok_or_else(|| SourceError::Dropped {
            target: format!("synthetic {}x{}", self.width, self.height),
            details: "not connected".to_string(),
        })?;

        if tokio::time::timeout(timeout, ticker.tick()).await.is_err() {
            return Ok(None);
        }

        let id = self.next_id;
        self.next_id += 1;
        let data = self.render(id);
        trace!("Generated synthetic frame {}", id);

        Ok(Some(FrameData::new(
            id,
            SystemTime::now(),
            data,
            self.width,
            self.height,
            FrameFormat::Rgb24,
        )))
    }

    async fn disconnect(&mut self) {
        self.ticker = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_frames_are_paced_and_well_formed() {
        let mut backend = SyntheticBackend::new((32, 24), 10);
        backend.connect().await.unwrap();

        let first = backend.read_frame(Duration::from_secs(1)).await.unwrap().unwrap();
        let started = tokio::time::Instant::now();
        let second = backend.read_frame(Duration::from_secs(1)).await.unwrap().unwrap();

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!((first.id, second.id), (0, 1));
        assert!(second.validate_size());
        assert_ne!(first.data, second.data);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_timeout_reports_no_frame() {
        let mut backend = SyntheticBackend::new((8, 8), 1);
        backend.connect().await.unwrap();
        backend.read_frame(Duration::from_secs(1)).await.unwrap();

        let frame = backend.read_frame(Duration::from_millis(10)).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_read_without_connect_fails() {
        let mut backend = SyntheticBackend::new((8, 8), 5);
        assert!(backend.read_frame(Duration::from_millis(10)).await.is_err());
    }
}
