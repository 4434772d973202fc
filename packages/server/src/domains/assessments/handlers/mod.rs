// Job handlers for the assessment intake pipeline
pub mod ai_preview;
pub mod gap_detection;
pub mod parse_document;
pub mod report_generation;
pub mod risk_analysis;

use std::sync::Arc;

pub use ai_preview::AiPreviewHandler;
pub use gap_detection::{missing_fields, GapDetectionHandler, REQUIRED_FIELDS};
pub use parse_document::ParseDocumentHandler;
pub use report_generation::ReportGenerationHandler;
pub use risk_analysis::RiskAnalysisHandler;

use super::services::AssessmentServices;
use crate::kernel::jobs::{HandlerRegistry, JobType};

/// Register a handler for every assessment job type.
pub fn register_handlers(registry: &mut HandlerRegistry, services: Arc<AssessmentServices>) {
    registry
        .register(JobType::ParseDocument, ParseDocumentHandler::new(services.clone()))
        .register(JobType::GapDetection, GapDetectionHandler::new(services.clone()))
        .register(JobType::RiskAnalysis, RiskAnalysisHandler::new(services.clone()))
        .register(JobType::ReportGeneration, ReportGenerationHandler::new(services.clone()))
        .register(JobType::AiPreview, AiPreviewHandler::new(services));
}
