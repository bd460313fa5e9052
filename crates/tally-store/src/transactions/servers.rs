use tally_core::ServerUuid;

use crate::records::ServerInfo;
use crate::transaction::Transaction;

const UPDATE_SERVER: &str = "UPDATE plan_servers \
     SET name = ?2, web_address = ?3, max_players = ?4, is_installed = 1 WHERE uuid = ?1";

const INSERT_SERVER: &str = "INSERT INTO plan_servers (uuid, name, web_address, max_players, is_installed) \
     VALUES (?1, ?2, ?3, ?4, 1)";

/// Register `info.uuid`, or refresh its name, address and player cap.
pub fn store_server(info: ServerInfo) -> Transaction {
    Transaction::new("store_server", move |ctx| {
        let uuid = info.uuid.to_string();
        let params = rusqlite::params![uuid, info.name, info.web_address, info.max_players];
        if !ctx.execute(UPDATE_SERVER, params)? {
            let _ = ctx.execute(INSERT_SERVER, params)?;
        }
        Ok(())
    })
}

/// Mark `server` as no longer installed. Its data stays.
pub fn mark_uninstalled(server: ServerUuid) -> Transaction {
    Transaction::new("mark_uninstalled", move |ctx| {
        let _ = ctx.execute(
            "UPDATE plan_servers SET is_installed = 0 WHERE uuid = ?1",
            [server.to_string()],
        )?;
        Ok(())
    })
}
