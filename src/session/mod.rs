//! Session lifecycle: controller, events and states

pub mod controller;
pub mod event;
pub mod state;

pub use controller::SessionController;
pub use event::{Command, Notice, SessionEvent, SessionInbox};
pub use state::SessionState;
