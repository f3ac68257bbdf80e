//! Conversion recipes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::format::Format;

/// Placeholder replaced by the materialized input path.
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder replaced by `<workspace>/output.<ext>`.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";
/// Placeholder replaced by the workspace directory.
pub const OUTPUT_DIR_PLACEHOLDER: &str = "{output_dir}";

/// Default execution budget for recipes built without an explicit one.
const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(120);

/// Family of external tool a recipe runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Audio/video/image transcoder (ffmpeg).
    Transcoder,
    /// Markup-to-document converter (pandoc).
    Markup,
    /// Document typesetting engine producing PDF (xelatex).
    Typesetter,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcoder => "transcoder",
            Self::Markup => "markup",
            Self::Typesetter => "typesetter",
        }
    }

    /// Argument that makes the tool print its version and exit.
    pub fn version_arg(&self) -> &'static str {
        match self {
            Self::Transcoder => "-version",
            Self::Markup | Self::Typesetter => "--version",
        }
    }
}

/// Declarative description of how to turn `source` into `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipe {
    pub source: Format,
    pub target: Format,
    pub tool: ToolKind,
    /// Executable to launch.
    pub program: PathBuf,
    /// Argument template, one entry per argv token.
    pub args: Vec<String>,
    /// Extension of the file the tool is expected to produce.
    pub output_extension: String,
    /// Wall-clock budget for a single run.
    pub max_duration: Duration,
}

impl Recipe {
    /// Creates a recipe producing a file with the target's canonical extension.
    pub fn new<I, S>(
        source: Format,
        target: Format,
        tool: ToolKind,
        program: impl Into<PathBuf>,
        args: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source,
            target,
            tool,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            output_extension: target.extension().to_string(),
            max_duration: DEFAULT_MAX_DURATION,
        }
    }

    /// Sets the wall-clock budget.
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    /// Sets the expected output extension.
    pub fn with_output_extension(mut self, ext: impl Into<String>) -> Self {
        self.output_extension = ext.into().trim_start_matches('.').to_ascii_lowercase();
        self
    }

    /// Whether the template references the input file.
    pub fn has_input_placeholder(&self) -> bool {
        self.args.iter().any(|a| a.contains(INPUT_PLACEHOLDER))
    }

    /// Name of the file the tool is told to write inside the workspace.
    pub fn output_file_name(&self) -> String {
        format!("output.{}", self.output_extension)
    }

    /// Substitutes the placeholders, producing the concrete argv.
    ///
    /// Each template entry stays one argument, so paths are never re-split or
    /// interpreted by a shell.
    pub fn render_args(&self, input: &Path, output_dir: &Path) -> Vec<String> {
        let input_str = input.to_string_lossy();
        let output_str = output_dir.join(self.output_file_name());
        let output_str = output_str.to_string_lossy();
        let output_dir_str = output_dir.to_string_lossy();

        self.args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input_str)
                    .replace(OUTPUT_DIR_PLACEHOLDER, &output_dir_str)
                    .replace(OUTPUT_PLACEHOLDER, &output_str)
            })
            .collect()
    }
}
