//! SeaORM entities.

pub mod email;
