//! Session actor: one queue, one task, one pairing.

mod event;
mod machine;
mod state;

pub use event::SessionEvent;
pub use machine::{CloseReason, SessionMachine};
pub use state::{NegotiationSession, Phase};
