pub mod handlers;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use handlers::register_handlers;
pub use models::{InputError, ParseDocumentInput};
pub use services::AssessmentServices;
