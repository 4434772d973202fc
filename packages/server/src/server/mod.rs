// HTTP server setup (Axum job worker)
pub mod app;
pub mod routes;

pub use app::*;
pub use routes::{spawn_redispatch_loop, WorkerResponse, REDISPATCH_BATCH_SIZE};
