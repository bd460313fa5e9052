use std::sync::Arc;

use crate::capability::HashCapability;
use crate::errors::DbOpError;
use crate::records::GeoInfo;
use crate::transaction::Transaction;

const UPDATE_GEO: &str = "UPDATE plan_geolocations SET last_used = ?4 \
     WHERE user_id = (SELECT id FROM plan_users WHERE uuid = ?1) \
     AND ip_hash = ?2 AND geolocation = ?3";

const INSERT_GEO: &str = "INSERT INTO plan_geolocations (user_id, ip_hash, geolocation, last_used) \
     VALUES ((SELECT id FROM plan_users WHERE uuid = ?1), ?2, ?3, ?4)";

/// Record where a player connected from. Only a hash of the address is stored.
///
/// Guarded by `capability`: once hashing has failed on that instance, every
/// geolocation write it guards is skipped.
pub fn store_geo_info(info: GeoInfo, capability: Arc<HashCapability>) -> Transaction {
    let guard = Arc::clone(&capability);
    Transaction::new("store_geo_info", move |ctx| {
        let hash = capability
            .hash(&info.ip)
            .ok_or_else(|| DbOpError::InvalidData("ip hashing unavailable".into()))?;
        let player = info.player.to_string();
        let params = rusqlite::params![player, hash, info.geolocation, info.last_used];
        if !ctx.execute(UPDATE_GEO, params)? {
            let _ = ctx.execute(INSERT_GEO, params)?;
        }
        Ok(())
    })
    .with_guard(move || guard.is_available())
}
