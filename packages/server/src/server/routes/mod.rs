// HTTP routes
pub mod health;
pub mod worker;

pub use health::*;
pub use worker::*;
