use thiserror::Error;
use vidify_core::CoreError;

#[derive(Debug, Error)]
pub enum MprisError {
    /// D-Bus connection or call failure.
    #[error("D-Bus error: {0}")]
    DBus(#[from] zbus::Error),

    /// Error returned by a standard D-Bus interface.
    #[error("D-Bus error: {0}")]
    Fdo(#[from] zbus::fdo::Error),

    /// No `org.mpris.MediaPlayer2.*` name on the session bus.
    #[error("no MPRIS player found on the session bus")]
    NoPlayer,

    /// The player left the bus.
    #[error("player {bus_name} disconnected")]
    PlayerGone { bus_name: String },
}

impl From<MprisError> for CoreError {
    fn from(error: MprisError) -> Self {
        Self::SourceUnavailable {
            source_name: crate::source::SOURCE_NAME.into(),
            reason: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MprisError>;
