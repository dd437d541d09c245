// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod classifier;
pub mod dispatcher;
pub mod libre;
pub mod pipeline;
pub mod push;
pub mod retry;
pub mod scheduler;
pub mod source;

pub use classifier::classify;
pub use dispatcher::{DispatchSummary, NotificationDispatcher};
pub use libre::LibreLinkUpClient;
pub use pipeline::{AlertPolicy, CycleOutcome, Evaluation, MonitorPipeline};
pub use push::{ExpoPushClient, PushError, PushMessage, PushProvider, PushTicket};
pub use retry::RetryPolicy;
pub use scheduler::{MonitorScheduler, SessionInfo, StartOutcome, TickReport};
pub use source::{ReadingSource, SourceError, SourceReading, UnavailableSource};
