use uuid::Uuid;

use crate::records::{PlayerRegistration, UserInfo};
use crate::transaction::Transaction;

const UPDATE_USER_NAME: &str = "UPDATE plan_users SET name = ?2 WHERE uuid = ?1";

const INSERT_USER: &str = "INSERT INTO plan_users (uuid, name, registered) VALUES (?1, ?2, ?3)";

const UPDATE_USER_INFO: &str = "UPDATE plan_user_info SET opped = ?3, banned = ?4 \
     WHERE user_id = (SELECT id FROM plan_users WHERE uuid = ?1) \
     AND server_id = (SELECT id FROM plan_servers WHERE uuid = ?2)";

const INSERT_USER_INFO: &str = "INSERT INTO plan_user_info (user_id, server_id, opped, banned, registered) \
     VALUES ((SELECT id FROM plan_users WHERE uuid = ?1), \
             (SELECT id FROM plan_servers WHERE uuid = ?2), ?3, ?4, ?5)";

/// Register a player, or refresh the stored name of a known one.
///
/// The registration date of a known player is never changed.
pub fn register_user(registration: PlayerRegistration) -> Transaction {
    Transaction::new("register_user", move |ctx| {
        let uuid = registration.player.to_string();
        if !ctx.execute(UPDATE_USER_NAME, rusqlite::params![uuid, registration.name])? {
            let _ = ctx.execute(
                INSERT_USER,
                rusqlite::params![uuid, registration.name, registration.registered],
            )?;
        }
        Ok(())
    })
}

/// Store operator and ban status of a player on one server.
pub fn store_user_info(info: UserInfo) -> Transaction {
    Transaction::new("store_user_info", move |ctx| {
        let player = info.player.to_string();
        let server = info.server.to_string();
        if !ctx.execute(
            UPDATE_USER_INFO,
            rusqlite::params![player, server, info.opped, info.banned],
        )? {
            let _ = ctx.execute(
                INSERT_USER_INFO,
                rusqlite::params![player, server, info.opped, info.banned, info.registered],
            )?;
        }
        Ok(())
    })
}

/// Count one kick of `player`.
pub fn increment_kicks(player: Uuid) -> Transaction {
    Transaction::new("increment_kicks", move |ctx| {
        let _ = ctx.execute(
            "UPDATE plan_users SET times_kicked = times_kicked + 1 WHERE uuid = ?1",
            [player.to_string()],
        )?;
        Ok(())
    })
}
