use std::{sync::Arc, time::Duration};

use anyhow::Context;
use chrono::Utc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error};

use crate::{hardware::Camera, scheduler::PeriodicTask};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub captured_at: i64,
    pub sequence: u64,
    pub image: Vec<u8>,
}

pub struct CaptureTask {
    camera: Arc<dyn Camera>,
    frames: mpsc::Sender<Frame>,
    period: Duration,
    sequence: u64,
}

impl CaptureTask {
    pub fn new(
        camera: Arc<dyn Camera>,
        period: Duration,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (frames, rx) = mpsc::channel(capacity.max(1));
        let task = Self {
            camera,
            frames,
            period,
            sequence: 0,
        };
        (task, rx)
    }
}

impl PeriodicTask for CaptureTask {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn run_once(&mut self) -> anyhow::Result<()> {
        let image = self.camera.capture().context("frame capture failed")?;
        self.sequence += 1;
        let frame = Frame {
            captured_at: Utc::now().timestamp(),
            sequence: self.sequence,
            image,
        };

        match self.frames.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                debug!("frame consumer is lagging, dropping frame {}", frame.sequence)
            }
            Err(TrySendError::Closed(_)) => error!("frame consumer has gone away"),
        }
        Ok(())
    }
}
