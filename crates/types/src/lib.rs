//! Public API types shared by the winplan IR and planner crates.

pub mod aggregate;
pub mod changelog;
pub mod config;
pub mod error;
pub mod schema;
pub mod time;
pub mod window;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
