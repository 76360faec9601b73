//! Shared error type and text helpers for the Fantabase demo.

pub mod error;
pub mod text;
