//! Values written by the domain transactions.
//!
//! Timestamps are epoch milliseconds. Player identifiers are UUIDs; the server
//! is identified by the host-supplied [`ServerUuid`].

use serde::{Deserialize, Serialize};
use tally_core::ServerUuid;
use uuid::Uuid;

/// A game server registering itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server identity.
    pub uuid: ServerUuid,
    /// Display name.
    pub name: String,
    /// Address of the web view, if any.
    pub web_address: Option<String>,
    /// Player cap; `-1` when unknown.
    pub max_players: i64,
}

/// A player seen for the first time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRegistration {
    /// Player identity.
    pub player: Uuid,
    /// Last known name.
    pub name: String,
    /// First seen, epoch millis.
    pub registered: i64,
}

/// Per-server player info.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Player identity.
    pub player: Uuid,
    /// Server the info applies to.
    pub server: ServerUuid,
    /// First seen on this server, epoch millis.
    pub registered: i64,
    /// Operator status.
    pub opped: bool,
    /// Ban status.
    pub banned: bool,
}

/// Time spent in each gamemode within one world.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldTime {
    /// World name.
    pub world: String,
    /// Milliseconds in survival.
    pub survival: i64,
    /// Milliseconds in creative.
    pub creative: i64,
    /// Milliseconds in adventure.
    pub adventure: i64,
    /// Milliseconds in spectator.
    pub spectator: i64,
}

/// A player killed by the session's player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerKill {
    /// Victim identity.
    pub victim: Uuid,
    /// Weapon name.
    pub weapon: String,
    /// Epoch millis.
    pub date: i64,
}

/// A finished play session with everything recorded during it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedSession {
    /// Player identity.
    pub player: Uuid,
    /// Server the session happened on.
    pub server: ServerUuid,
    /// Start, epoch millis.
    pub start: i64,
    /// End, epoch millis.
    pub end: i64,
    /// Mobs killed.
    pub mob_kills: i64,
    /// Times died.
    pub deaths: i64,
    /// Milliseconds spent away from keyboard.
    pub afk_time: i64,
    /// Per-world gamemode times.
    pub world_times: Vec<WorldTime>,
    /// Player kills.
    pub kills: Vec<PlayerKill>,
}

impl FinishedSession {
    /// Session length in milliseconds.
    pub fn length(&self) -> i64 {
        self.end - self.start
    }
}

/// One ping sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PingSample {
    /// Player identity.
    pub player: Uuid,
    /// Server.
    pub server: ServerUuid,
    /// Epoch millis.
    pub date: i64,
    /// Highest ping in the sample window.
    pub max_ping: i64,
    /// Lowest ping in the sample window.
    pub min_ping: i64,
    /// Mean ping.
    pub avg_ping: f64,
}

/// One server performance sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TpsSample {
    /// Server.
    pub server: ServerUuid,
    /// Epoch millis.
    pub date: i64,
    /// Ticks per second.
    pub tps: f64,
    /// Players online.
    pub players_online: i64,
    /// CPU usage percentage.
    pub cpu_usage: f64,
    /// RAM usage in MB.
    pub ram_usage: i64,
    /// Loaded entities.
    pub entities: i64,
    /// Loaded chunks.
    pub chunks_loaded: i64,
    /// Free disk space in MB.
    pub free_disk_space: i64,
}

/// A display name seen on a server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nickname {
    /// Player identity.
    pub player: Uuid,
    /// Server the name was seen on.
    pub server: ServerUuid,
    /// The name.
    pub nickname: String,
    /// Last seen, epoch millis.
    pub last_used: i64,
}

/// Where a player connected from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    /// Player identity.
    pub player: Uuid,
    /// Connecting address; only its hash is stored.
    pub ip: String,
    /// Resolved location name.
    pub geolocation: String,
    /// Last seen, epoch millis.
    pub last_used: i64,
}
