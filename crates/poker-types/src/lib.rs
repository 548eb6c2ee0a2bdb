//! Shared types for the planning poker server.

mod issue;
mod ws;

pub use issue::*;
pub use ws::*;
