//! In-process provider fed through an mpsc channel

use super::PositionProvider;
use crate::domain::types::LocationResult;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Yields whatever is pushed into the paired sender; ends when it is dropped
pub struct ChannelProvider {
    rx: mpsc::Receiver<LocationResult>,
}

impl ChannelProvider {
    pub fn new(buffer: usize) -> (mpsc::Sender<LocationResult>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait]
impl PositionProvider for ChannelProvider {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn next_fix(&mut self) -> Option<LocationResult> {
        self.rx.recv().await
    }
}
