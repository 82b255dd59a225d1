//! Events consumed by the session loop and notices it publishes

use tokio::sync::mpsc;

use super::state::SessionState;
use crate::audio::buffer::AudioBlock;
use crate::audio::device::RenderEvent;
use crate::network::TransportEvent;
use crate::protocol::TextEvent;

/// Requests from whoever drives the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    /// Client-side barge-in; nothing is sent to the service
    Interrupt,
    Shutdown,
}

/// Everything the session loop reacts to
#[derive(Debug)]
pub enum SessionEvent {
    Command(Command),
    Transport(TransportEvent),
    Render(RenderEvent),
    Captured(AudioBlock),
}

/// Observable session output
#[derive(Debug, Clone)]
pub enum Notice {
    State(SessionState),
    /// Advisory text from the service
    Text(TextEvent),
    /// Human-readable cause of a failed or aborted transition
    Error(String),
    /// Playback was cut short by a barge-in
    Interrupted { discarded: usize },
}

/// Receiving ends of every channel feeding the session loop
pub struct SessionInbox {
    pub(crate) commands_tx: mpsc::UnboundedSender<Command>,
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
    pub(crate) transport: mpsc::UnboundedReceiver<TransportEvent>,
    pub(crate) render: mpsc::UnboundedReceiver<RenderEvent>,
    pub(crate) blocks: mpsc::Receiver<AudioBlock>,
}

impl SessionInbox {
    /// Handle for issuing commands to the loop
    pub fn commands(&self) -> mpsc::UnboundedSender<Command> {
        self.commands_tx.clone()
    }

    /// Wait for the next event.
    ///
    /// Commands and transport messages are preferred so an interrupt is
    /// never stuck behind captured audio.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        tokio::select! {
            biased;
            Some(command) = self.commands.recv() => Some(SessionEvent::Command(command)),
            Some(event) = self.transport.recv() => Some(SessionEvent::Transport(event)),
            Some(event) = self.render.recv() => Some(SessionEvent::Render(event)),
            Some(block) = self.blocks.recv() => Some(SessionEvent::Captured(block)),
            else => None,
        }
    }

    /// Take the next event if one is already waiting
    pub fn try_next(&mut self) -> Option<SessionEvent> {
        if let Ok(command) = self.commands.try_recv() {
            return Some(SessionEvent::Command(command));
        }
        if let Ok(event) = self.transport.try_recv() {
            return Some(SessionEvent::Transport(event));
        }
        if let Ok(event) = self.render.try_recv() {
            return Some(SessionEvent::Render(event));
        }
        self.blocks.try_recv().ok().map(SessionEvent::Captured)
    }
}
