//! API request handlers

mod auth;
mod elections;
mod gateway;
mod system;

pub use elections::*;
pub use gateway::*;
pub use system::*;
