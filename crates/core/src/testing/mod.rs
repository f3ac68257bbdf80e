//! Testing utilities and mock implementations.
//!
//! This module provides a mock [`Supervisor`](crate::supervisor::Supervisor)
//! and fixtures, so the orchestrator can be exercised without ffmpeg, pandoc
//! or xelatex installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use filemorph_core::testing::{fixtures, MockSupervisor};
//!
//! let supervisor = MockSupervisor::new();
//! let registry = fixtures::registry();
//! // Build a ConversionOrchestrator around them...
//! ```

mod mock_supervisor;

pub use mock_supervisor::{MockBehavior, MockSupervisor, RecordedRun};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::config::ToolsConfig;
    use crate::format::Format;
    use crate::orchestrator::{CallerId, ConversionRequest};
    use crate::registry::{FormatRegistry, Recipe, ToolKind};

    /// Registry holding the built-in recipe table with default tools.
    pub fn registry() -> FormatRegistry {
        FormatRegistry::builtin(&ToolsConfig::default()).expect("built-in recipes are consistent")
    }

    /// Recipe that copies its input to `output.<ext>` with `/bin/sh`.
    pub fn copy_recipe(source: Format, target: Format) -> Recipe {
        Recipe::new(
            source,
            target,
            ToolKind::Markup,
            "/bin/sh",
            ["-c", "cp \"$0\" \"$1\"", "{input}", "{output}"],
        )
    }

    /// Markdown document request.
    pub fn markdown_request(target: Format) -> ConversionRequest {
        ConversionRequest::from_bytes(
            b"# Quarterly report\n\nAll figures are final.\n".to_vec(),
            target,
            CallerId::new("test-caller"),
        )
        .with_file_name("report.md")
    }
}
