use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::format::Format;
use crate::registry::{Recipe, ToolKind};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scratch: ScratchConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// HTTP adapter configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted upload, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024
}

/// Scratch directory configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScratchConfig {
    /// Root under which per-job workspaces are created.
    #[serde(default = "default_scratch_root")]
    pub root: PathBuf,
    /// Remove leftovers from previous runs on startup.
    #[serde(default = "default_true")]
    pub sweep_on_startup: bool,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            root: default_scratch_root(),
            sweep_on_startup: true,
        }
    }
}

fn default_scratch_root() -> PathBuf {
    std::env::temp_dir().join("filemorph")
}

fn default_true() -> bool {
    true
}

/// Job scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Number of external processes allowed to run at once.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// How many finished jobs are remembered for status queries.
    #[serde(default = "default_finished_retention")]
    pub finished_retention: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            finished_retention: default_finished_retention(),
        }
    }
}

impl SchedulerConfig {
    /// Sets the number of execution slots.
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }
}

fn default_max_concurrent_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, 4)
}

fn default_finished_retention() -> usize {
    1024
}

/// Process supervision configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupervisorConfig {
    /// Time between SIGTERM and SIGKILL when tearing down a tool.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    /// Bytes of stderr kept for diagnostics.
    #[serde(default = "default_stderr_tail_bytes")]
    pub stderr_tail_bytes: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            kill_grace_ms: default_kill_grace_ms(),
            stderr_tail_bytes: default_stderr_tail_bytes(),
        }
    }
}

impl SupervisorConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

fn default_kill_grace_ms() -> u64 {
    2000
}

fn default_stderr_tail_bytes() -> usize {
    8 * 1024
}

/// External tool locations and budgets
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_transcoder")]
    pub transcoder: ToolConfig,
    #[serde(default = "default_markup")]
    pub markup: ToolConfig,
    #[serde(default = "default_typesetter")]
    pub typesetter: ToolConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            transcoder: default_transcoder(),
            markup: default_markup(),
            typesetter: default_typesetter(),
        }
    }
}

impl ToolsConfig {
    pub fn get(&self, kind: ToolKind) -> &ToolConfig {
        match kind {
            ToolKind::Transcoder => &self.transcoder,
            ToolKind::Markup => &self.markup,
            ToolKind::Typesetter => &self.typesetter,
        }
    }
}

/// A single external tool
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolConfig {
    pub program: PathBuf,
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

impl ToolConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout_secs: default_tool_timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_transcoder() -> ToolConfig {
    ToolConfig::new("ffmpeg")
}

fn default_markup() -> ToolConfig {
    ToolConfig::new("pandoc")
}

fn default_typesetter() -> ToolConfig {
    ToolConfig::new("xelatex")
}

fn default_tool_timeout() -> u64 {
    300
}

/// Format registry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Register the built-in recipe table.
    #[serde(default = "default_true")]
    pub include_builtin: bool,
    /// Extra recipes; a pair that already has a recipe is rejected.
    #[serde(default)]
    pub recipes: Vec<RecipeConfig>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            include_builtin: true,
            recipes: Vec::new(),
        }
    }
}

/// A recipe declared in configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecipeConfig {
    pub source: Format,
    pub target: Format,
    pub tool: ToolKind,
    /// Overrides the tool's configured program.
    #[serde(default)]
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
    #[serde(default)]
    pub output_extension: Option<String>,
    /// Overrides the tool's configured timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl RecipeConfig {
    /// Builds the recipe, filling gaps from the tool configuration.
    pub fn to_recipe(&self, tools: &ToolsConfig) -> Recipe {
        let tool = tools.get(self.tool);
        let program = self.program.clone().unwrap_or_else(|| tool.program.clone());
        let timeout = self
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| tool.timeout());

        let recipe = Recipe::new(self.source, self.target, self.tool, program, self.args.clone())
            .with_max_duration(timeout);
        match &self.output_extension {
            Some(ext) => recipe.with_output_extension(ext.clone()),
            None => recipe,
        }
    }
}
