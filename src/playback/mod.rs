//! Agent audio playback
//!
//! The controller owns the single playback in progress and decides, when it
//! ends, whether the session should resume capture.

pub mod controller;
pub mod player;

pub use controller::{AfterPlayback, AgentResponse, PlaybackController, PlaybackOutcome};
pub use player::{detect_player, AudioPlayer, CommandPlayer, PlayableAudio, PlayerCommand};
