//! Operations exposed to the binary and any embedding UI.

pub mod admin;
pub mod search;
