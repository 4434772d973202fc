//! Job infrastructure for asynchronous intake work.
//!
//! Long-running, unreliable operations (document parsing, LLM calls, report
//! rendering) run as persisted jobs that callers poll:
//! - [`JobDispatcher`] - creates jobs and routes them to local or remote execution
//! - [`JobProcessor`] - owns the job state machine and chains follow-up jobs
//! - [`HandlerRegistry`] - maps each [`JobType`] to its [`JobHandler`]
//! - [`JobStore`] - durable job state ([`PostgresJobStore`], [`InMemoryJobStore`])
//!
//! # Architecture
//!
//! ```text
//! JobDispatcher.create(type, input, owner)
//!     │
//!     ├─► JobStore.insert (PENDING)
//!     └─► route
//!           ├─► local: tokio::spawn(JobProcessor.process_job)
//!           └─► remote: JobInvoker.invoke({ jobId }) ─► worker endpoint
//!                                                        └─► JobProcessor.process_job
//! ```
//!
//! Retries are caller-driven: a failed attempt leaves the job PENDING until
//! [`JobDispatcher::redispatch_pending`] routes it again. The same sweep picks
//! up jobs whose hand-off was lost (PENDING, never claimed past the dispatch
//! grace) and jobs whose worker died mid-attempt (PROCESSING past the lease).

mod chain;
mod dispatcher;
mod handler;
mod invoker;
mod job;
mod postgres;
mod processor;
mod registry;
mod store;
pub mod testing;

pub use chain::{ChainRule, ChainRules, ASSESSMENT_ID_KEY};
pub use dispatcher::{ExecutionRoute, JobDispatcher, JobLookupError};
pub use handler::{handler_fn, FnHandler, JobHandler};
pub use invoker::{HttpJobInvoker, JobEnvelope, JobInvoker};
pub use job::{
    cutoff, Job, JobStatus, JobType, NewJob, NewJobError, StaleCutoffs, DEFAULT_DISPATCH_GRACE,
    DEFAULT_LEASE_TIMEOUT, DEFAULT_MAX_ATTEMPTS, POLL_INTERVAL,
};
pub use postgres::PostgresJobStore;
pub use processor::{JobProcessor, ProcessOutcome, DEFAULT_MAX_CHAIN_DEPTH};
pub use registry::{HandlerRegistry, SharedHandlerRegistry};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
