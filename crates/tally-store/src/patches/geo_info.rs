//! Geolocation patches: hash stored addresses, then drop the plaintext column.

use rusqlite::Connection;
use tracing::info;

use super::{Patch, TableRebuild};
use crate::capability::sha256_hex;
use crate::errors::Result;
use crate::sqlite::schema::{CREATE_GEOLOCATIONS, has_column, has_table, tables};

const KEPT_COLUMNS: &[&str] = &["id", "user_id", "geolocation", "ip_hash", "last_used"];

/// Adds `ip_hash` and fills it from the legacy `ip` column.
#[derive(Clone, Copy, Debug, Default)]
pub struct GeoInfoIpHashPatch;

impl Patch for GeoInfoIpHashPatch {
    fn name(&self) -> &'static str {
        "geo_info_ip_hash"
    }

    fn has_been_applied(&self, conn: &Connection) -> Result<bool> {
        has_column(conn, tables::GEOLOCATIONS, "ip_hash")
    }

    fn apply(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch("ALTER TABLE plan_geolocations ADD COLUMN ip_hash TEXT")?;
        if !has_column(conn, tables::GEOLOCATIONS, "ip")? {
            return Ok(());
        }

        let rows: Vec<(i64, String)> = {
            let mut stmt =
                conn.prepare("SELECT id, ip FROM plan_geolocations WHERE ip IS NOT NULL")?;
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<_>>()?
        };
        let mut update = conn.prepare("UPDATE plan_geolocations SET ip_hash = ?1 WHERE id = ?2")?;
        for (id, ip) in &rows {
            let _ = update.execute(rusqlite::params![sha256_hex(ip), id])?;
        }
        info!(rows = rows.len(), "hashed stored geolocation addresses");
        Ok(())
    }
}

/// Rebuilds `plan_geolocations` without the plaintext `ip` column.
///
/// Must run after the `last_used` and `ip_hash` columns exist, since the
/// rebuild copies them.
#[derive(Clone, Copy, Debug, Default)]
pub struct GeoInfoIpRemovalPatch;

impl GeoInfoIpRemovalPatch {
    fn rebuild() -> TableRebuild<'static> {
        TableRebuild::new(tables::GEOLOCATIONS, CREATE_GEOLOCATIONS, KEPT_COLUMNS)
    }
}

impl Patch for GeoInfoIpRemovalPatch {
    fn name(&self) -> &'static str {
        "geo_info_ip_removal"
    }

    fn has_been_applied(&self, conn: &Connection) -> Result<bool> {
        let rebuild = Self::rebuild();
        Ok(has_table(conn, tables::GEOLOCATIONS)?
            && !has_column(conn, tables::GEOLOCATIONS, "ip")?
            && !rebuild.is_interrupted(conn)?)
    }

    fn apply(&self, conn: &Connection) -> Result<()> {
        Self::rebuild().run(conn)
    }
}
