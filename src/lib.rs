//! ResQ Relay - offline-tolerant emergency report delivery.
//!
//! # Overview
//!
//! A citizen must be able to report an emergency even when the device has
//! no connectivity. The relay accepts reports, sends them immediately when
//! the dispatch API is reachable, and otherwise stores them durably on the
//! device. When connectivity returns, queued reports get a fresh location
//! and are replayed; whatever the server does not acknowledge stays queued
//! for the next pass.
//!
//! # Delivery Guarantees
//!
//! - A queued report is removed only after the server acknowledged it
//! - Each report carries its own identity, so replays never confuse two reports
//! - Reconciliation passes never overlap, and a report queued during a pass is kept
//! - Delivery is best effort while the process runs: no backoff, no attempt limit
//!
//! # Modules
//!
//! - [`model`]: Report types and form validation
//! - [`storage`]: SQLite key/value storage
//! - [`queue`]: Durable local report queue
//! - [`location`]: Position sources and the reconnect-time refresh
//! - [`submitter`]: Remote API client
//! - [`reconciler`]: Queue replay passes
//! - [`connectivity`]: Online/offline tracking and pass triggers
//! - [`intake`]: Report form handoff
//! - [`api`]: Local HTTP API handlers
//! - [`config`]: Environment configuration

pub mod api;
pub mod config;
pub mod connectivity;
pub mod intake;
pub mod location;
pub mod model;
pub mod queue;
pub mod reconciler;
pub mod storage;
pub mod submitter;
