// Business domains
pub mod assessments;
