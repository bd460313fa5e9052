use crate::records::{PingSample, TpsSample};
use crate::transaction::Transaction;

const INSERT_PING: &str = "INSERT INTO plan_ping (user_id, server_id, date, max_ping, min_ping, avg_ping) \
     VALUES ((SELECT id FROM plan_users WHERE uuid = ?1), \
             (SELECT id FROM plan_servers WHERE uuid = ?2), ?3, ?4, ?5, ?6)";

const INSERT_TPS: &str = "INSERT INTO plan_tps \
     (server_id, date, tps, players_online, cpu_usage, ram_usage, entities, chunks_loaded, free_disk_space) \
     VALUES ((SELECT id FROM plan_servers WHERE uuid = ?1), ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

/// Store one ping sample.
///
/// Guarded: samples with a negative minimum are skipped.
pub fn store_ping(sample: PingSample) -> Transaction {
    let min_ping = sample.min_ping;
    Transaction::new("store_ping", move |ctx| {
        let _ = ctx.execute(
            INSERT_PING,
            rusqlite::params![
                sample.player.to_string(),
                sample.server.to_string(),
                sample.date,
                sample.max_ping,
                sample.min_ping,
                sample.avg_ping,
            ],
        )?;
        Ok(())
    })
    .with_guard(move || min_ping >= 0)
}

/// Store one server performance sample.
pub fn store_tps(sample: TpsSample) -> Transaction {
    Transaction::new("store_tps", move |ctx| {
        let _ = ctx.execute(
            INSERT_TPS,
            rusqlite::params![
                sample.server.to_string(),
                sample.date,
                sample.tps,
                sample.players_online,
                sample.cpu_usage,
                sample.ram_usage,
                sample.entities,
                sample.chunks_loaded,
                sample.free_disk_space,
            ],
        )?;
        Ok(())
    })
}
