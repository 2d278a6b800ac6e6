pub mod config;
pub mod error;
pub mod external;
#[cfg(unix)]
pub mod ipc;
#[cfg(unix)]
pub mod mpv;

pub use config::{MpvProviderConfig, CONFIG_TEMPLATE as MPV_CONFIG_TEMPLATE};
pub use error::MpvError;
pub use external::ExternalPlayer;
#[cfg(unix)]
pub use mpv::MpvPlayer;
