//! Minor-report lifecycle
//!
//! This module implements the minor-safety review workflow: report creation,
//! reviewer adjudication, parental-consent verification, and the scheduled
//! sweep that reconciles roles and bans as reports age out.

pub mod age;
mod card;
mod consent;
mod error;
mod record;
mod store;
mod sweep;
mod workflow;

pub use card::{
    CUSTOM_ID_APPROVE, CUSTOM_ID_APPROVE_MODAL, CUSTOM_ID_DENY, CUSTOM_ID_DENY_MODAL,
    CUSTOM_ID_RECHECK, approve_modal, build_report_embed, deny_modal, report_components,
};
pub use consent::ConsentVerifier;
pub use error::{ReportError, ReportResult};
pub use record::{MinorReport, ReportStatus};
pub use store::{FlagOutcome, ReportStore, Reviewer, ReviewerRegistry, ReviewerStore};
pub use sweep::{SweepService, SweepStats, request_sweep};
pub use workflow::{
    ApproveOutcome, BAN_DISCLOSURE, ConsentCheck, FlagDecision, RecheckOutcome, ReportService,
};

/// Request type for the sweep task
#[derive(Debug, Clone)]
pub enum SweepRequest {
    /// Run a full sweep cycle immediately
    RunAll,
    /// Shutdown the sweep task
    Shutdown,
}
