pub mod model;
pub mod service;

pub use model::{Difficulty, FinalReport, UpsertFinalReportPayload};
pub use service::*;
