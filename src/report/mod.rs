//! Renderers for dashboard data: padded text tables for the terminal and
//! pretty JSON for anything downstream.

pub mod text;

use serde::Serialize;

pub fn to_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}
