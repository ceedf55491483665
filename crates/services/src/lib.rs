pub mod archive;
pub mod document;
pub mod error;
pub mod history;
pub mod markdown;
pub mod orchestrator;
pub mod pipeline;
pub mod template;

pub use archive::{ArchiveOutcome, ArchiveService, MinuteRecord};
pub use error::{ServiceError, ServiceResult};
pub use history::{HistoryMode, HistoryOutcome, HistoryRequest, HistoryService};
pub use orchestrator::LlmOrchestrator;
pub use pipeline::{
    AudioSource, FileError, InputKind, PipelineController, ProcessOutcome, ProcessRequest,
};
pub use template::{ResolvedTemplate, TemplateResolver};
