//! Concurrent batch execution with a bounded worker pool.
//!
//! This module takes a catalog of experiment descriptors and runs them with
//! at most `max_concurrent` engine processes alive at once:
//!
//! - **Scheduler**: admits jobs under a semaphore and collects results
//! - **RunState**: shared experiment log plus in-flight gauge and counters
//! - **BatchStats**: snapshot of a batch's progress
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │   Catalog    │
//!                      └──────┬───────┘
//!                             │
//!                      ┌──────▼───────┐
//!                      │  Semaphore   │
//!                      │ (k permits)  │
//!                      └──────┬───────┘
//!                             │
//!         ┌───────────────────┼───────────────────┐
//!         │                   │                   │
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │  Job 1  │         │  Job 2  │         │  Job k  │
//!    └────┬────┘         └────┬────┘         └────┬────┘
//!         └───────────────────┼───────────────────┘
//!                             ▼
//!                      ┌──────────────┐
//!                      │Experiment log│
//!                      └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use formsweep::scheduler::Scheduler;
//! use std::sync::Arc;
//!
//! let scheduler = Scheduler::new(config, Arc::new(engine), Arc::new(log));
//! let results = scheduler.run_all(catalog, 2).await?;
//! println!("peak in flight: {}", scheduler.stats().peak_in_flight);
//! ```

pub mod worker_pool;

pub use worker_pool::{run_all, BatchStats, RunState, Scheduler, SchedulerError};
