//! MPRIS metadata source.
//!
//! Reads the currently playing track from any media player exposing the
//! `org.mpris.MediaPlayer2` D-Bus interface, and pushes updates whenever the
//! player reports a property change.

#![cfg(target_os = "linux")]

pub mod error;
pub mod metadata;
pub mod source;

pub use error::MprisError;
pub use source::MprisSource;
