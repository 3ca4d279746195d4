pub mod model;
pub mod service;

pub use model::{CreateUploadPayload, FilePurpose, StoredFile, UploadTicket};
pub use service::*;
