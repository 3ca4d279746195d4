pub mod model;
pub mod service;

pub use model::{LoginPayload, PendingUser, RegisterPayload, Role, User, UserActionPayload};
pub use service::*;
