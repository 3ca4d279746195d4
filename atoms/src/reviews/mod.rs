pub mod model;
pub mod service;

pub use model::{CreateReviewPayload, FeedbackPayload, Review};
pub use service::*;
