//! Domain transactions.
//!
//! Every function here builds a [`Transaction`](crate::Transaction) value; nothing
//! touches the database until it is executed. Rows that may already exist are
//! written with update-then-insert: an `UPDATE` runs first and the `INSERT`
//! only when it affected no rows. Two concurrent writers of the same new key
//! can both see zero updated rows; the loser's insert then fails with a
//! constraint violation (see [`DbOpError::is_constraint_violation`]).
//!
//! [`DbOpError::is_constraint_violation`]: crate::DbOpError::is_constraint_violation

mod cleanup;
mod commands;
mod geo;
mod names;
mod samples;
mod servers;
mod sessions;
mod users;

pub use cleanup::{remove_everything, remove_old_players};
pub use commands::{MAX_COMMAND_LENGTH, store_command_usage};
pub use geo::store_geo_info;
pub use names::store_nickname;
pub use samples::{store_ping, store_tps};
pub use servers::{mark_uninstalled, store_server};
pub use sessions::{store_session, store_world};
pub use users::{increment_kicks, register_user, store_user_info};
