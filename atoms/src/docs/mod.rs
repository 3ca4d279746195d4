pub mod model;
pub mod service;

pub use model::{CreateDocPayload, Doc, DocKind};
pub use service::*;
