//! Kernel module - job engine infrastructure, collaborator traits and their
//! HTTP implementations.

pub mod intake_api;
pub mod jobs;
pub mod openai;
pub mod test_dependencies;
pub mod traits;

pub use intake_api::IntakeApiClient;
pub use openai::OpenAIClient;
pub use test_dependencies::{
    MockAI, MockDocumentExtractor, MockDocumentRepository, MockReportRenderer,
};
pub use traits::*;
