use tally_core::ServerUuid;

use crate::errors::{DbOpError, Result};
use crate::records::FinishedSession;
use crate::transaction::{Transaction, TxContext};

const INSERT_WORLD: &str = "INSERT INTO plan_worlds (world_name, server_id) \
     SELECT ?1, s.id FROM plan_servers s WHERE s.uuid = ?2 AND NOT EXISTS ( \
         SELECT 1 FROM plan_worlds w WHERE w.world_name = ?1 AND w.server_id = s.id)";

const INSERT_SESSION: &str = "INSERT INTO plan_sessions \
     (user_id, server_id, session_start, session_end, mob_kills, deaths, afk_time) \
     VALUES ((SELECT id FROM plan_users WHERE uuid = ?1), \
             (SELECT id FROM plan_servers WHERE uuid = ?2), ?3, ?4, ?5, ?6, ?7)";

const INSERT_WORLD_TIME: &str = "INSERT INTO plan_world_times \
     (user_id, world_id, server_id, session_id, \
      survival_time, creative_time, adventure_time, spectator_time) \
     SELECT s.user_id, w.id, s.server_id, s.id, ?3, ?4, ?5, ?6 \
     FROM plan_sessions s JOIN plan_worlds w ON w.server_id = s.server_id AND w.world_name = ?2 \
     WHERE s.id = ?1";

const INSERT_KILL: &str = "INSERT INTO plan_kills \
     (killer_id, victim_id, server_id, session_id, weapon, date) \
     SELECT s.user_id, (SELECT id FROM plan_users WHERE uuid = ?2), s.server_id, s.id, ?3, ?4 \
     FROM plan_sessions s WHERE s.id = ?1";

/// Make sure `world` is known for `server`.
pub fn store_world(server: ServerUuid, world: impl Into<String>) -> Transaction {
    let world = world.into();
    Transaction::new("store_world", move |ctx| {
        insert_world(ctx, &server.to_string(), &world)
    })
}

/// Store a finished session together with its world times and kills.
///
/// Guarded: sessions ending before they start are skipped. Either everything
/// is stored or nothing is.
pub fn store_session(session: FinishedSession) -> Transaction {
    let end = session.end;
    let start = session.start;
    Transaction::new("store_session", move |ctx| insert_session(ctx, &session))
        .with_guard(move || end >= start)
}

fn insert_world(ctx: &TxContext<'_>, server: &str, world: &str) -> Result<()> {
    let _ = ctx.execute_with(INSERT_WORLD, |stmt| {
        stmt.raw_bind_parameter(1, world)?;
        stmt.raw_bind_parameter(2, server)
    })?;
    Ok(())
}

fn insert_session(ctx: &TxContext<'_>, session: &FinishedSession) -> Result<()> {
    let server = session.server.to_string();
    let player = session.player.to_string();

    for world_time in &session.world_times {
        insert_world(ctx, &server, &world_time.world)?;
    }

    let _ = ctx.execute_with(INSERT_SESSION, |stmt| {
        stmt.raw_bind_parameter(1, &player)?;
        stmt.raw_bind_parameter(2, &server)?;
        stmt.raw_bind_parameter(3, session.start)?;
        stmt.raw_bind_parameter(4, session.end)?;
        stmt.raw_bind_parameter(5, session.mob_kills)?;
        stmt.raw_bind_parameter(6, session.deaths)?;
        stmt.raw_bind_parameter(7, session.afk_time)
    })?;
    let session_id = ctx.last_insert_rowid();

    let stored = ctx.execute_batch(INSERT_WORLD_TIME, &session.world_times, |stmt, wt| {
        stmt.raw_bind_parameter(1, session_id)?;
        stmt.raw_bind_parameter(2, &wt.world)?;
        stmt.raw_bind_parameter(3, wt.survival)?;
        stmt.raw_bind_parameter(4, wt.creative)?;
        stmt.raw_bind_parameter(5, wt.adventure)?;
        stmt.raw_bind_parameter(6, wt.spectator)
    })?;
    if stored != session.world_times.len() {
        return Err(DbOpError::InvalidData(format!(
            "stored {stored} of {} world times for session {session_id}",
            session.world_times.len()
        )));
    }

    let _ = ctx.execute_batch(INSERT_KILL, &session.kills, |stmt, kill| {
        stmt.raw_bind_parameter(1, session_id)?;
        stmt.raw_bind_parameter(2, kill.victim.to_string())?;
        stmt.raw_bind_parameter(3, &kill.weapon)?;
        stmt.raw_bind_parameter(4, kill.date)
    })?;
    Ok(())
}
