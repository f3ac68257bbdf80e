//! Conversion orchestration engine.
//!
//! Turns a file in one format into another by running an external tool
//! (ffmpeg, pandoc, xelatex) in an isolated scratch directory, with bounded
//! concurrency, deadlines and cancellation.

pub mod config;
pub mod format;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod supervisor;
pub mod testing;
pub mod workspace;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config, ConfigError,
    SchedulerConfig, ScratchConfig, ServerConfig, SupervisorConfig, ToolsConfig,
};
pub use format::{detect_format, Format, FormatError, FormatFamily};
pub use orchestrator::{
    CallerId, ConversionError, ConversionOrchestrator, ConversionOutput, ConversionRequest,
    ConversionResult, FailureKind,
};
pub use registry::{FormatRegistry, Recipe, RegistryError, ToolKind};
pub use scheduler::{JobHandle, JobId, JobScheduler, JobState, JobSummary, PoolStatus, SchedulerError};
pub use supervisor::{probe_tool, ProcessOutcome, ProcessSupervisor, Supervisor, SupervisorError};
pub use workspace::{SourceData, Workspace, WorkspaceError, WorkspaceManager};
