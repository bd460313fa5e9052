use crate::records::Nickname;
use crate::transaction::Transaction;

const UPDATE_NICKNAME: &str = "UPDATE plan_nicknames SET last_used = ?4 \
     WHERE user_id = (SELECT id FROM plan_users WHERE uuid = ?1) \
     AND server_id = (SELECT id FROM plan_servers WHERE uuid = ?2) \
     AND nickname = ?3";

const INSERT_NICKNAME: &str = "INSERT INTO plan_nicknames (user_id, server_id, nickname, last_used) \
     VALUES ((SELECT id FROM plan_users WHERE uuid = ?1), \
             (SELECT id FROM plan_servers WHERE uuid = ?2), ?3, ?4)";

/// Record that `nickname` was seen; refreshes `last_used` if already known.
pub fn store_nickname(nickname: Nickname) -> Transaction {
    Transaction::new("store_nickname", move |ctx| {
        let player = nickname.player.to_string();
        let server = nickname.server.to_string();
        let params = rusqlite::params![player, server, nickname.nickname, nickname.last_used];
        if !ctx.execute(UPDATE_NICKNAME, params)? {
            let _ = ctx.execute(INSERT_NICKNAME, params)?;
        }
        Ok(())
    })
}
