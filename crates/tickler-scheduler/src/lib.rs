//! `tickler-scheduler`: reminder scheduling and delivery engine with SQLite
//! persistence.
//!
//! # Overview
//!
//! A reminder is persisted by the [`store::ReminderStore`], then armed once by
//! the [`dispatch::DispatchSelector`]. Whatever fires it goes through the
//! [`consumer::QueueConsumer`] guard and the [`executor::DeliveryExecutor`],
//! which sends the mail and records the outcome. After a restart the
//! [`recovery::RecoveryManager`] re-arms everything still pending.
//! [`service::ReminderService`] wires these together for the API layer.
//!
//! # Dispatch mechanisms
//!
//! | Reminder                         | Mechanism                                  |
//! |----------------------------------|--------------------------------------------|
//! | `once`, due now or earlier       | Delivered immediately                      |
//! | `once`, within `max_timeout_ms`  | Durable queue entry (or timer, if chosen)  |
//! | `once`, beyond `max_timeout_ms`  | Durable queue entry                        |
//! | any recurring pattern            | Cron task, re-armed on every restart       |
//!
//! Timers and cron tasks live in the [`registry::JobRegistry`] under
//! `reminder-timeout-{id}` / `reminder-cron-{id}`; queue jobs are named
//! `reminder-queue-{id}`.

pub mod consumer;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod queue;
pub mod recovery;
pub mod recurrence;
pub mod registry;
pub mod service;
pub mod store;
pub mod types;
pub mod worker;

pub use consumer::{Consumed, QueueConsumer};
pub use dispatch::{DispatchSelector, DispatchSettings};
pub use error::{Result, SchedulerError};
pub use executor::DeliveryExecutor;
pub use queue::{DelayedQueue, EnqueueOptions, QueuedJob, SqliteQueue};
pub use recovery::{RecoveryManager, RecoveryReport};
pub use recurrence::{compile, compile_recurrence, CronExpression};
pub use registry::{JobRegistry, JobToken};
pub use service::ReminderService;
pub use store::{ReminderStore, SqliteReminderStore};
pub use types::{Armed, DeliveryOutcome, DeliveryResult, JobPayload};
pub use worker::QueueWorker;
