//! htsprobe harness
//!
//! Drives an external htsget server end to end:
//! - Supervises the server process (spawn, readiness, output relay, teardown)
//! - Issues protocol queries and parses tickets
//! - Resolves tickets into payloads, segment by segment, in order
//! - Decodes payloads into bounded summaries and checks YAML scenarios
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  ProcessSupervisor                                           │
//! │    ├── start() ── spawn ── HealthProbe loop ──► Running      │
//! │    ├── LogRelay ×2 (stdout, stderr) ──► broadcast<Event>     │
//! │    └── stop()  ── SIGTERM ── grace period ── kill            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  HtsgetClient::query() ──► Ticket                            │
//! │  TicketResolver::resolve() ── SegmentFetcher ×N (in order)   │
//! │                           ──► ResolvedPayload                │
//! │  htsprobe_common::decode() ──► DecodedSummary                │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner: Scenario (YAML) ──► SuiteResult (JSON)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fixtures;
pub mod health;
pub mod inspect;
pub mod relay;
pub mod resolver;
pub mod runner;
pub mod scenario;
pub mod server;

pub use client::{HtsgetClient, QueryParams};
pub use config::HarnessConfig;
pub use error::{
    ErrorLayer, FetchError, HarnessError, HarnessResult, QueryError, ResolveError,
    SupervisorError,
};
pub use fetch::{HttpTransport, SegmentBody, SegmentFetcher, SegmentTransport};
pub use fixtures::scan_fixtures;
pub use health::{HealthProbe, HttpHealthProbe};
pub use inspect::{inspect_segment, SegmentInspection, SegmentPreview};
pub use relay::{LogLine, ServerEvent, StreamKind};
pub use resolver::TicketResolver;
pub use runner::{write_results, ScenarioResult, ScenarioRunner, SuiteResult};
pub use scenario::{Expectations, Scenario, ScenarioQuery};
pub use server::{ProcessSupervisor, ReadinessPolicy, ServerConfig, ServerHandle, StopOutcome};
