//! Test fixture modules for database rows and source records.
//!
//! - `station` - country, receiver and mountpoint rows plus the flat station records they
//!   are imported from

pub mod station;
