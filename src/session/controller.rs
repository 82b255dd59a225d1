//! Session controller
//!
//! Owns the capture pipeline, the playback queue and the transport, and
//! sequences them through the session lifecycle. Every mutation happens on
//! the task calling [`SessionController::dispatch`] (normally
//! [`SessionController::run`]).

use tokio::sync::{broadcast, mpsc};
use tracing::Instrument;
use uuid::Uuid;

use super::event::{Command, Notice, SessionEvent, SessionInbox};
use super::state::SessionState;
use crate::audio::buffer::AudioBlock;
use crate::audio::capture::{BlockOutcome, CapturePipeline};
use crate::audio::device::{CaptureDevice, PlaybackDevice, RenderEvent, RenderEventSender};
use crate::audio::playback::PlaybackQueue;
use crate::config::AudioConfig;
use crate::error::SessionError;
use crate::network::{FrameSink, Transport, TransportEvent, TransportEventSender};
use crate::protocol::{ControlMessage, InboundMessage};

/// Notices buffered for slow subscribers before the oldest are dropped
const NOTICE_CAPACITY: usize = 64;

/// Orchestrates one user session
pub struct SessionController<C, P, T> {
    id: Uuid,
    state: SessionState,
    capture: CapturePipeline<C>,
    playback: PlaybackQueue<P>,
    transport: T,
    blocks_tx: mpsc::Sender<AudioBlock>,
    render_tx: RenderEventSender,
    transport_tx: TransportEventSender,
    notices: broadcast::Sender<Notice>,
    last_error: Option<String>,
}

impl<C, P, T> SessionController<C, P, T>
where
    C: CaptureDevice,
    P: PlaybackDevice,
    T: Transport,
{
    /// Build a controller in Idle and the inbox its event loop reads from
    pub fn new(capture: C, playback: P, transport: T, config: &AudioConfig) -> (Self, SessionInbox) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (render_tx, render_rx) = mpsc::unbounded_channel();
        let (blocks_tx, blocks_rx) = mpsc::channel(config.block_queue_capacity.max(1));
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let controller = Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            capture: CapturePipeline::new(capture, config.input_sample_rate, config.block_size),
            playback: PlaybackQueue::new(playback, config.output_sample_rate),
            transport,
            blocks_tx,
            render_tx,
            transport_tx,
            notices,
            last_error: None,
        };
        let inbox = SessionInbox {
            commands_tx,
            commands,
            transport: transport_rx,
            render: render_rx,
            blocks: blocks_rx,
        };
        (controller, inbox)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Cause of the most recent failed or aborted transition
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Receive state changes, text and errors as they happen
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn capture(&self) -> &CapturePipeline<C> {
        &self.capture
    }

    pub fn playback(&self) -> &PlaybackQueue<P> {
        &self.playback
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Idle → Connecting → Listening.
    ///
    /// Acquires the playback device, then the connection, then the
    /// microphone. On failure, whatever this call acquired is released and
    /// the session returns to Idle with the cause recorded.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Listening | SessionState::Connecting | SessionState::Stopping => {
                tracing::debug!(state = %self.state, "start ignored");
                return Ok(());
            }
            SessionState::Closed => return Err(SessionError::Closed),
            SessionState::Idle => {}
        }

        self.last_error = None;
        self.set_state(SessionState::Connecting);

        let playback_acquired = !self.playback.is_device_ready();
        if let Err(e) = self.playback.acquire_device(self.render_tx.clone()).await {
            return Err(self.abort_start(SessionError::PlaybackUnavailable(e), false, false));
        }

        let transport_opened = !self.transport.is_open();
        if let Err(e) = self.transport.connect(self.transport_tx.clone()).await {
            return Err(self.abort_start(SessionError::Connection(e), playback_acquired, false));
        }

        if let Err(e) = self.capture.start(self.blocks_tx.clone()).await {
            return Err(self.abort_start(
                SessionError::CaptureUnavailable(e),
                playback_acquired,
                transport_opened,
            ));
        }

        self.set_state(SessionState::Listening);
        // Frames held while the output device was down can play now
        self.playback.advance();
        Ok(())
    }

    /// Listening → Stopping → Idle.
    ///
    /// Only the microphone is released; the connection and playback stay up
    /// so an in-flight response still plays.
    pub fn stop(&mut self) {
        if !self.state.is_listening() {
            tracing::debug!(state = %self.state, "stop ignored");
            return;
        }
        self.set_state(SessionState::Stopping);
        self.capture.stop();
        self.set_state(SessionState::Idle);
    }

    /// Release everything and enter Closed. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        self.capture.stop();
        self.transport.close();
        self.playback.release_device();
        if self.state != SessionState::Closed {
            self.set_state(SessionState::Closed);
        }
    }

    /// Barge-in: discard queued response audio and silence the current render
    pub fn interrupt(&mut self) {
        let discarded = self.playback.len();
        let was_rendering = self.playback.is_rendering();
        self.playback.interrupt();
        if was_rendering || discarded > 0 {
            self.notify(Notice::Interrupted { discarded });
        }
    }

    /// Handle one event to completion
    pub async fn dispatch(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Command(command) => self.handle_command(command).await,
            SessionEvent::Transport(event) => self.handle_transport_event(event),
            SessionEvent::Render(event) => self.handle_render_event(event),
            SessionEvent::Captured(block) => {
                self.handle_captured(block);
            }
        }
    }

    /// Run the event loop until shutdown, then tear down
    pub async fn run(mut self, mut inbox: SessionInbox) {
        let span = tracing::info_span!("session", id = %self.id);
        async move {
            tracing::info!("session loop started");
            while let Some(event) = inbox.next().await {
                self.dispatch(event).await;
                if self.state == SessionState::Closed {
                    break;
                }
            }
            self.teardown();
            tracing::info!("session loop finished");
        }
        .instrument(span)
        .await
    }

    async fn handle_command(&mut self, command: Command) {
        tracing::debug!(?command, "command");
        match command {
            Command::Start => {
                // Failures are already reported as notices
                let _ = self.start().await;
            }
            Command::Stop => self.stop(),
            Command::Interrupt => self.interrupt(),
            Command::Shutdown => self.teardown(),
        }
    }

    /// Forward a captured block to the transport
    pub fn handle_captured(&mut self, block: AudioBlock) -> BlockOutcome {
        self.capture.process_block(block, &mut self.transport)
    }

    pub fn handle_render_event(&mut self, event: RenderEvent) {
        match event {
            RenderEvent::Completed(id) => {
                self.playback.on_render_complete(id);
            }
            RenderEvent::Failed { id, reason } => {
                self.playback.on_render_failed(id, &reason);
            }
            RenderEvent::DeviceReady => {
                self.playback.advance();
            }
        }
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Inbound(InboundMessage::Audio(frame)) => {
                if self.state == SessionState::Closed {
                    return;
                }
                self.playback.enqueue(frame);
            }
            TransportEvent::Inbound(InboundMessage::Control(ControlMessage::InterruptPlayback)) => {
                tracing::info!(queued = self.playback.len(), "interrupt requested by service");
                self.interrupt();
            }
            TransportEvent::Inbound(InboundMessage::Text(text)) => {
                tracing::info!(text = %text.text, structured = text.structured, "service message");
                self.notify(Notice::Text(text));
            }
            TransportEvent::Closed { reason } => self.on_transport_closed(reason),
        }
    }

    fn on_transport_closed(&mut self, reason: Option<String>) {
        if self.transport.is_open() {
            tracing::debug!("ignoring close of a previous connection");
            return;
        }
        if self.state == SessionState::Closed {
            return;
        }

        let cause = match reason {
            Some(reason) => format!("connection closed: {reason}"),
            None => "connection closed".to_string(),
        };
        tracing::warn!(state = %self.state, cause = %cause, "transport closed");

        self.capture.stop();
        if self.state != SessionState::Idle {
            self.set_state(SessionState::Idle);
        }
        self.record_error(cause);
    }

    fn abort_start(&mut self, cause: SessionError, release_playback: bool, close_transport: bool) -> SessionError {
        tracing::warn!(error = %cause, "start failed");
        self.capture.stop();
        if close_transport {
            self.transport.close();
        }
        if release_playback {
            self.playback.release_device();
        }
        self.set_state(SessionState::Idle);
        self.record_error(cause.to_string());
        cause
    }

    fn set_state(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "illegal state transition ignored");
            return;
        }
        tracing::info!(from = %self.state, to = %next, "state change");
        self.state = next;
        self.notify(Notice::State(next));
    }

    fn record_error(&mut self, cause: String) {
        self.last_error = Some(cause.clone());
        self.notify(Notice::Error(cause));
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }
}
