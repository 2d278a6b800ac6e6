use crate::error::{MprisError, Result};
use crate::metadata::{choose_player, is_playing, position_from_micros, status_from_properties};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vidify_core::{
    CoreError, MetadataSource, OffsetPolicy, PlaybackStatus, SourceCapability, SourceKind,
    SourceUpdate, StatusReceiver,
};
use zbus::fdo::{DBusProxy, PropertiesProxy};
use zbus::zvariant::OwnedValue;
use zbus::{CacheProperties, Connection};

/// Name reported by this source
pub const SOURCE_NAME: &str = "mpris";

/// Prefix of every MPRIS bus name
const MPRIS_BUS_PREFIX: &str = "org.mpris.MediaPlayer2.";

/// Object path of the MPRIS interfaces
const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";

/// Interface carrying the playback properties
const PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";

/// Players whose `Position` property is always zero or missing
const POSITION_BLACKLIST: &[&str] = &["org.mpris.MediaPlayer2.spotify"];

/// Buffered status updates per subscription
const SUBSCRIPTION_CAPACITY: usize = 16;

#[zbus::proxy(
    interface = "org.mpris.MediaPlayer2.Player",
    default_path = "/org/mpris/MediaPlayer2"
)]
trait MediaPlayer2Player {
    #[zbus(property)]
    fn metadata(&self) -> zbus::Result<HashMap<String, OwnedValue>>;

    #[zbus(property)]
    fn playback_status(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn position(&self) -> zbus::Result<i64>;
}

/// A connected MPRIS player
struct PlayerHandle {
    bus_name: String,
    proxy: MediaPlayer2PlayerProxy<'static>,
    reports_position: bool,
}

impl PlayerHandle {
    async fn connect(connection: &Connection, bus_name: String) -> Result<Self> {
        let proxy = MediaPlayer2PlayerProxy::builder(connection)
            .destination(bus_name.clone())?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;
        let reports_position = !POSITION_BLACKLIST.contains(&bus_name.as_str());
        Ok(Self {
            bus_name,
            proxy,
            reports_position,
        })
    }

    async fn read_status(&self) -> Result<Option<PlaybackStatus>> {
        let metadata = self.proxy.metadata().await?;
        let playback_status = self.proxy.playback_status().await?;
        let position = if self.reports_position {
            // Not every player implements Position
            self.proxy.position().await.ok().and_then(position_from_micros)
        } else {
            None
        };
        Ok(status_from_properties(&metadata, &playback_status, position))
    }
}

/// Push source following an MPRIS media player over the session bus
#[derive(Debug, Default)]
pub struct MprisSource;

impl MprisSource {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Find the player to follow on the session bus
    async fn find_player(connection: &Connection) -> Result<PlayerHandle> {
        let names = DBusProxy::new(connection).await?.list_names().await?;

        let mut candidates = Vec::new();
        for name in names {
            let name = name.to_string();
            if !name.starts_with(MPRIS_BUS_PREFIX) {
                continue;
            }
            match PlayerHandle::connect(connection, name.clone()).await {
                Ok(player) => match player.proxy.playback_status().await {
                    Ok(status) => candidates.push((name, is_playing(&status))),
                    Err(e) => debug!("Skipping {} because of error: {}", name, e),
                },
                Err(e) => debug!("Skipping {} because of error: {}", name, e),
            }
        }

        let bus_name = choose_player(&candidates).ok_or(MprisError::NoPlayer)?.to_string();
        debug!("Following MPRIS player {}", bus_name);
        PlayerHandle::connect(connection, bus_name).await
    }

    async fn current_status(&self) -> Result<Option<PlaybackStatus>> {
        let connection = Connection::session().await?;
        let player = Self::find_player(&connection).await?;
        player.read_status().await
    }

    async fn start_subscription(&self) -> Result<StatusReceiver> {
        let connection = Connection::session().await?;
        let player = Self::find_player(&connection).await?;

        let properties = PropertiesProxy::builder(&connection)
            .destination(player.bus_name.clone())?
            .path(MPRIS_PATH)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;
        let mut changes = properties.receive_properties_changed().await?;

        let dbus = DBusProxy::new(&connection).await?;
        let mut owner_changes = dbus
            .receive_name_owner_changed_with_args(&[(0, player.bus_name.as_str())])
            .await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        tx.send(player.read_status().await.map_err(CoreError::from))
            .await
            .map_err(|_| MprisError::NoPlayer)?;
        info!("Listening to MPRIS player {}", player.bus_name);

        tokio::spawn(async move {
            // Keeps the connection alive for the streams
            let _connection = connection;
            loop {
                tokio::select! {
                    () = tx.closed() => break,
                    change = changes.next() => {
                        let Some(change) = change else {
                            let _ = tx.send(Err(gone(&player.bus_name))).await;
                            break;
                        };
                        let relevant = change
                            .args()
                            .map_or(true, |args| args.interface_name().as_str() == PLAYER_INTERFACE);
                        if !relevant {
                            continue;
                        }
                        let update = player.read_status().await.map_err(CoreError::from);
                        if tx.send(update).await.is_err() {
                            break;
                        }
                    }
                    owner_change = owner_changes.next() => {
                        let vanished = owner_change
                            .as_ref()
                            .and_then(|signal| signal.args().ok())
                            .map_or(true, |args| args.new_owner().is_none());
                        if vanished {
                            warn!("MPRIS player {} left the bus", player.bus_name);
                            let _ = tx.send(Err(gone(&player.bus_name))).await;
                            break;
                        }
                    }
                }
            }
            debug!("MPRIS subscription to {} ended", player.bus_name);
        });

        Ok(rx)
    }
}

fn gone(bus_name: &str) -> CoreError {
    MprisError::PlayerGone {
        bus_name: bus_name.to_string(),
    }
    .into()
}

#[async_trait]
impl MetadataSource for MprisSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Mpris
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn capability(&self) -> SourceCapability {
        SourceCapability::Push
    }

    fn offset_policy(&self) -> OffsetPolicy {
        OffsetPolicy::Reported
    }

    async fn poll(&self) -> SourceUpdate {
        self.current_status().await.map_err(Into::into)
    }

    async fn subscribe(&self) -> vidify_core::Result<StatusReceiver> {
        self.start_subscription().await.map_err(Into::into)
    }

    async fn is_available(&self) -> bool {
        match Connection::session().await {
            Ok(connection) => Self::find_player(&connection).await.is_ok(),
            Err(_) => false,
        }
    }
}
