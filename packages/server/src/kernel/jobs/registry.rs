//! Job handler registry.
//!
//! Maps each [`JobType`] to the handler that executes it. Domains register
//! their handlers once at startup; the processor resolves a handler per
//! attempt without knowing the concrete types.

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::JobHandler;
use super::job::JobType;

/// Registry that maps job types to handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for a job type, replacing any previous one.
    pub fn register<H>(&mut self, job_type: JobType, handler: H) -> &mut Self
    where
        H: JobHandler + 'static,
    {
        self.handlers.insert(job_type, Arc::new(handler));
        self
    }

    /// Register an already shared handler.
    pub fn register_arc(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) -> &mut Self {
        self.handlers.insert(job_type, handler);
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    pub fn is_registered(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    pub fn registered_types(&self) -> Vec<JobType> {
        self.handlers.keys().copied().collect()
    }
}

/// Thread-safe registry wrapped in Arc.
pub type SharedHandlerRegistry = Arc<HandlerRegistry>;
