pub mod model;
pub mod service;

pub use model::{Notification, NotificationKind};
pub use service::*;
