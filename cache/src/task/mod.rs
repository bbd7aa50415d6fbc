//! Background maintenance for the cache: the janitor that periodically
//! sweeps expired entries and abandoned pending loads.

pub(crate) mod janitor;
