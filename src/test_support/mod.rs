//! Helpers shared by unit tests inside the crate.

pub mod fake_sessions;
pub mod socket_guard;
