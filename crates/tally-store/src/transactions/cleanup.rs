use std::time::Duration;

use tracing::info;

use crate::sqlite::schema::TABLES_IN_DEPENDENCY_ORDER;
use crate::transaction::Transaction;

/// Players whose latest activity (last session end, or registration when they
/// have no sessions) is older than `?1`.
const STALE_USERS: &str = "SELECT u.id FROM plan_users u \
     WHERE COALESCE((SELECT MAX(s.session_end) FROM plan_sessions s WHERE s.user_id = u.id), \
                    u.registered) < ?1";

/// Per-player deletes, children before parents.
const DELETE_PLAYER_ROWS: &[&str] = &[
    "DELETE FROM plan_world_times WHERE user_id = ?1",
    "DELETE FROM plan_kills WHERE killer_id = ?1 OR victim_id = ?1",
    "DELETE FROM plan_sessions WHERE user_id = ?1",
    "DELETE FROM plan_ping WHERE user_id = ?1",
    "DELETE FROM plan_geolocations WHERE user_id = ?1",
    "DELETE FROM plan_nicknames WHERE user_id = ?1",
    "DELETE FROM plan_user_info WHERE user_id = ?1",
    "DELETE FROM plan_users WHERE id = ?1",
];

/// Remove every player inactive for longer than `keep_inactive` before `now_ms`,
/// together with all of their rows.
pub fn remove_old_players(now_ms: i64, keep_inactive: Duration) -> Transaction {
    let window = i64::try_from(keep_inactive.as_millis()).unwrap_or(i64::MAX);
    let cutoff = now_ms.saturating_sub(window);
    Transaction::new("remove_old_players", move |ctx| {
        let stale: Vec<i64> = ctx.query_map(STALE_USERS, [cutoff], |row| row.get(0))?;
        if stale.is_empty() {
            return Ok(());
        }
        for sql in DELETE_PLAYER_ROWS {
            let _ = ctx.execute_batch(sql, &stale, |stmt, id| stmt.raw_bind_parameter(1, id))?;
        }
        info!(players = stale.len(), cutoff, "removed inactive players");
        Ok(())
    })
}

/// Delete every row of every data table, children before parents.
pub fn remove_everything() -> Transaction {
    Transaction::new("remove_everything", |ctx| {
        for table in TABLES_IN_DEPENDENCY_ORDER.iter().rev() {
            let _ = ctx.execute(&format!("DELETE FROM {table}"), [])?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use tally_core::ServerUuid;
    use uuid::Uuid;

    use super::*;
    use crate::Database;
    use crate::queries;
    use crate::records::{FinishedSession, PlayerKill};
    use crate::transactions::{fixtures, store_session};

    const DAY_MS: i64 = 86_400_000;

    fn play(db: &Database, player: Uuid, server: ServerUuid, end: i64, victim: Option<Uuid>) {
        let _ = db
            .execute(&store_session(FinishedSession {
                player,
                server,
                start: end - 1_000,
                end,
                mob_kills: 0,
                deaths: 0,
                afk_time: 0,
                world_times: Vec::new(),
                kills: victim
                    .map(|victim| PlayerKill {
                        victim,
                        weapon: "Bow".into(),
                        date: end,
                    })
                    .into_iter()
                    .collect(),
            }))
            .unwrap();
    }

    #[test]
    fn removes_only_inactive_players() {
        let db = Database::in_memory().unwrap();
        let server = fixtures::server(&db);
        let now = 400 * DAY_MS;
        let stale = fixtures::player(&db, "Old", 0);
        let active = fixtures::player(&db, "New", 0);
        let fresh = fixtures::player(&db, "Joined", now - DAY_MS);
        play(&db, stale, server, 10 * DAY_MS, Some(active));
        play(&db, active, server, now - DAY_MS, Some(stale));

        let keep = Duration::from_secs(180 * 86_400);
        let _ = db.execute(&remove_old_players(now, keep)).unwrap();

        assert_eq!(db.query(&queries::user_count()).unwrap(), 2);
        assert!(db.query(&queries::user_id_of(stale)).unwrap().is_none());
        assert!(db.query(&queries::user_id_of(active)).unwrap().is_some());
        assert!(db.query(&queries::user_id_of(fresh)).unwrap().is_some());
        assert_eq!(db.query(&queries::session_count()).unwrap(), 1);
        assert_eq!(fixtures::count(&db, "plan_kills"), 0);
    }

    #[test]
    fn nothing_stale_is_a_no_op() {
        let db = Database::in_memory().unwrap();
        let _ = fixtures::player(&db, "New", 1_000);
        let _ = db
            .execute(&remove_old_players(2_000, Duration::from_secs(60)))
            .unwrap();
        assert_eq!(db.query(&queries::user_count()).unwrap(), 1);
    }

    #[test]
    fn remove_everything_empties_all_tables() {
        let db = Database::in_memory().unwrap();
        let server = fixtures::server(&db);
        let a = fixtures::player(&db, "A", 0);
        let b = fixtures::player(&db, "B", 0);
        play(&db, a, server, 5_000, Some(b));

        let _ = db.execute(&remove_everything()).unwrap();
        for (table, rows) in db.query(&queries::row_counts()).unwrap() {
            assert_eq!(rows, 0, "{table} not emptied");
        }
    }
}
