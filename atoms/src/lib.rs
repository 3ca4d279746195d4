//! Entity models and single-entity storage services.
//!
//! Atoms take AWS clients and the table/bucket names as arguments and never
//! reach into shared state; cross-entity flows live in the blocks.

pub mod error;
pub mod feedback;
pub mod http;
pub mod item;
pub mod tx;

pub mod delivered;
pub mod docs;
pub mod files;
pub mod notify;
pub mod reports;
pub mod reviews;
pub mod tasks;
pub mod users;

pub use error::{ServiceError, ServiceResult};
