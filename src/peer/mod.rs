//! WebRTC-backed media engine.

mod engine;

pub use engine::{WebRtcEngine, WebRtcEngineConfig};
