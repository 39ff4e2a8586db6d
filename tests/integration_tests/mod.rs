//! Integration tests module
//!
//! End-to-end tests for the herald broadcast engine, including:
//! - Notice lifecycle and bounded history
//! - Global and per-account list filtering
//! - Paced, single-flight push runs
//! - Daily scheduler trigger decisions
//! - Webhook transport

pub mod filter_test;
pub mod notice_lifecycle_test;
pub mod push_test;
pub mod scheduler_test;
pub mod webhook_test;
