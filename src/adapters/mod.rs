//! Adapters: concrete implementations of the `domain::ports` traits.

pub mod sqlite;
