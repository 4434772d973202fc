// Risk Intake - Job Engine Core
//
// This crate provides the asynchronous job engine behind document intake,
// gap detection, risk scoring and report generation, plus the resilience
// primitives that protect calls to external services.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
