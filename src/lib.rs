pub mod commands;
pub mod config;
pub mod data;
pub mod gateway;
pub mod handlers;
pub mod logging;
pub mod minor_report;
pub mod moderation;

// Named targets for structured log routing
pub const BOT_NAME: &str = "minor_watch";
pub const COMMAND_TARGET: &str = "minor_watch::command";
pub const ERROR_TARGET: &str = "minor_watch::error";
pub const EVENT_TARGET: &str = "minor_watch::handlers";
pub const SWEEP_TARGET: &str = "minor_watch::sweep";
pub const CONSOLE_TARGET: &str = "minor_watch";

pub use config::BotConfig;
pub use data::Data;
pub use minor_report::{MinorReport, ReportError, ReportResult, ReportStatus};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
