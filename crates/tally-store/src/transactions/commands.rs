use tally_core::ServerUuid;

use crate::transaction::Transaction;

/// Longest command name that is recorded. Longer names are skipped.
pub const MAX_COMMAND_LENGTH: usize = 20;

const UPDATE_USAGE: &str = "UPDATE plan_commandusages SET times_used = times_used + 1 \
     WHERE command_name = ?1 AND server_id = (SELECT id FROM plan_servers WHERE uuid = ?2)";

const INSERT_USAGE: &str = "INSERT INTO plan_commandusages (command_name, times_used, server_id) \
     VALUES (?1, 1, (SELECT id FROM plan_servers WHERE uuid = ?2))";

/// Count one use of `command` on `server`.
///
/// Guarded: names longer than [`MAX_COMMAND_LENGTH`] characters are skipped.
pub fn store_command_usage(server: ServerUuid, command: impl Into<String>) -> Transaction {
    let command = command.into();
    let checked = command.clone();
    Transaction::new("store_command_usage", move |ctx| {
        let server = server.to_string();
        let params = rusqlite::params![command, server];
        if !ctx.execute(UPDATE_USAGE, params)? {
            let _ = ctx.execute(INSERT_USAGE, params)?;
        }
        Ok(())
    })
    .with_guard(move || checked.chars().count() <= MAX_COMMAND_LENGTH)
}
