pub mod model;
pub mod service;

pub use model::DeliveredTask;
pub use service::*;
