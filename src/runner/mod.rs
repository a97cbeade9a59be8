pub mod events;
pub mod prepare;
pub mod reporter;
pub mod service;
pub mod types;

pub use events::{ListenerId, ProgressCallback, RunEvent, RunListener};
pub use reporter::TestReporter;
pub use service::RunnerService;
pub use types::{
    RequestLabel, RequestResult, RequestStatus, RunOptions, RunRecord, RunStatus, RunSummary,
    RunnerDefinition, RunnerItem, SKIP_DISABLED, SKIP_PREVIOUS_ERROR, SKIP_STOPPED,
};
