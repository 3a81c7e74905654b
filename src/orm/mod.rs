//! SeaORM entities backing [`crate::store::DbStore`].

pub mod polls;
pub mod users;
pub mod votes;
