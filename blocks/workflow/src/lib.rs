//! Flows that span several entities: the task workflow and its joins,
//! review submission, delivery, user approval and the leaderboard.
//!
//! Every function here takes the caller's [`Principal`](bughunt_shared::Principal)
//! and checks roles before touching storage.

pub mod delivery;
pub mod docs;
pub mod files;
pub mod leaderboard;
pub mod reports;
pub mod reviews;
pub mod tasks;
pub mod types;
pub mod users;

pub use types::*;
