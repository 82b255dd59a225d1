//! Shared test utilities: in-memory devices and transport
//!
//! Each mock keeps its state behind an `Arc<Mutex<_>>` so tests can inspect
//! and steer it after the mock has moved into a controller.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;

use voice_duplex_client::audio::device::{BlockSender, RenderEventSender};
use voice_duplex_client::audio::{AudioBlock, CaptureDevice, PlaybackDevice, RenderEvent, RenderId};
use voice_duplex_client::codec::EncodedFrame;
use voice_duplex_client::config::AudioConfig;
use voice_duplex_client::error::{AudioError, NetworkError};
use voice_duplex_client::network::{FrameSink, Transport, TransportEvent, TransportEventSender};
use voice_duplex_client::protocol::InboundMessage;
use voice_duplex_client::session::{SessionController, SessionInbox};

pub type TestSession = SessionController<MockCapture, MockPlayback, MockTransport>;

#[derive(Default)]
pub struct MicState {
    pub fail: bool,
    pub acquired: bool,
    pub acquires: usize,
    pub releases: usize,
    /// Rate reported on acquisition; the target rate when unset
    pub rate: Option<u32>,
    pub blocks: Option<BlockSender>,
}

#[derive(Clone, Default)]
pub struct MockCapture(pub Arc<Mutex<MicState>>);

impl CaptureDevice for MockCapture {
    async fn acquire(&mut self, target_rate: u32, _block_size: usize, blocks: BlockSender) -> Result<u32, AudioError> {
        let mut mock = self.0.lock();
        mock.acquires += 1;
        if mock.fail {
            return Err(AudioError::DeviceUnavailable("permission denied".into()));
        }
        mock.acquired = true;
        mock.blocks = Some(blocks);
        Ok(mock.rate.unwrap_or(target_rate))
    }

    fn release(&mut self) {
        let mut mock = self.0.lock();
        if mock.acquired {
            mock.releases += 1;
        }
        mock.acquired = false;
        mock.blocks = None;
    }

    fn is_acquired(&self) -> bool {
        self.0.lock().acquired
    }
}

#[derive(Default)]
pub struct SpeakerState {
    pub fail: bool,
    pub ready: bool,
    pub acquires: usize,
    pub releases: usize,
    pub rendering: Option<RenderId>,
    pub started: Vec<(RenderId, usize)>,
    pub halts: usize,
    pub events: Option<RenderEventSender>,
}

#[derive(Clone, Default)]
pub struct MockPlayback(pub Arc<Mutex<SpeakerState>>);

impl MockPlayback {
    /// Report the active render as finished
    pub fn complete_current(&self) {
        let mut mock = self.0.lock();
        if let (Some(id), Some(events)) = (mock.rendering.take(), mock.events.as_ref()) {
            let _ = events.send(RenderEvent::Completed(id));
        }
    }
}

impl PlaybackDevice for MockPlayback {
    async fn acquire(&mut self, events: RenderEventSender) -> Result<(), AudioError> {
        let mut mock = self.0.lock();
        mock.acquires += 1;
        if mock.fail {
            return Err(AudioError::DeviceUnavailable("no output device".into()));
        }
        mock.ready = true;
        mock.events = Some(events);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.0.lock().ready
    }

    fn start_render(&mut self, id: RenderId, samples: Vec<f32>, _sample_rate: u32) -> Result<(), AudioError> {
        let mut mock = self.0.lock();
        mock.rendering = Some(id);
        mock.started.push((id, samples.len()));
        Ok(())
    }

    fn halt(&mut self) {
        let mut mock = self.0.lock();
        mock.rendering = None;
        mock.halts += 1;
    }

    fn release(&mut self) {
        let mut mock = self.0.lock();
        if mock.ready {
            mock.releases += 1;
        }
        mock.ready = false;
        mock.rendering = None;
        mock.events = None;
    }
}

#[derive(Default)]
pub struct LinkState {
    pub fail: bool,
    pub open: bool,
    pub connects: usize,
    pub closes: usize,
    pub sent: Vec<EncodedFrame>,
    pub events: Option<TransportEventSender>,
}

#[derive(Clone, Default)]
pub struct MockTransport(pub Arc<Mutex<LinkState>>);

impl MockTransport {
    /// Deliver a message as if it arrived from the service
    pub fn inbound(&self, message: InboundMessage) {
        if let Some(events) = self.0.lock().events.as_ref() {
            let _ = events.send(TransportEvent::Inbound(message));
        }
    }

    /// Drop the connection from the service side
    pub fn remote_close(&self, reason: &str) {
        let mut mock = self.0.lock();
        mock.open = false;
        if let Some(events) = mock.events.take() {
            let _ = events.send(TransportEvent::Closed {
                reason: Some(reason.to_string()),
            });
        }
    }
}

impl FrameSink for MockTransport {
    fn is_open(&self) -> bool {
        self.0.lock().open
    }

    fn send_frame(&mut self, frame: EncodedFrame) {
        let mut mock = self.0.lock();
        if mock.open {
            mock.sent.push(frame);
        }
    }
}

impl Transport for MockTransport {
    async fn connect(&mut self, events: TransportEventSender) -> Result<(), NetworkError> {
        let mut mock = self.0.lock();
        mock.connects += 1;
        if mock.fail {
            return Err(NetworkError::ConnectionFailed("connection refused".into()));
        }
        if !mock.open {
            mock.open = true;
            mock.events = Some(events);
        }
        Ok(())
    }

    fn close(&mut self) {
        let mut mock = self.0.lock();
        if mock.open {
            mock.closes += 1;
        }
        mock.open = false;
    }
}

/// Controller over fresh mocks, plus handles to each mock
pub fn test_session() -> (TestSession, SessionInbox, MockCapture, MockPlayback, MockTransport) {
    let capture = MockCapture::default();
    let playback = MockPlayback::default();
    let transport = MockTransport::default();
    let (session, inbox) = SessionController::new(
        capture.clone(),
        playback.clone(),
        transport.clone(),
        &AudioConfig::default(),
    );
    (session, inbox, capture, playback, transport)
}

/// Dispatch every event already waiting in the inbox
pub async fn drain(session: &mut TestSession, inbox: &mut SessionInbox) -> usize {
    let mut handled = 0;
    while let Some(event) = inbox.try_next() {
        session.dispatch(event).await;
        handled += 1;
    }
    handled
}

/// One block of mono audio at `rate`
pub fn tone_block(len: usize, rate: u32) -> AudioBlock {
    let samples = (0..len)
        .map(|i| (i as f32 * 0.05).sin() * 0.5)
        .collect();
    AudioBlock::new(samples, rate)
}

/// A 24 kHz response chunk of `samples` samples
pub fn response_frame(samples: usize) -> EncodedFrame {
    let pcm: Vec<i16> = (0..samples).map(|i| (i as i16).wrapping_mul(64)).collect();
    EncodedFrame::from_samples(&pcm, 24_000).expect("non-empty frame")
}
