//! Real process conversions using `/bin/sh` stand-ins for the tools.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use filemorph_core::{
    registry::Recipe, testing::fixtures, CallerId, ConversionError, ConversionOrchestrator,
    ConversionRequest, Format, FormatRegistry, JobScheduler, JobState, ProcessSupervisor,
    SchedulerConfig, SupervisorConfig, ToolKind, ToolsConfig, WorkspaceManager,
};

/// pandoc stand-in: checks the reader and input, writes a PDF to `-o`.
const MARKUP_SHIM: &str = r#"#!/bin/sh
out=""; reader=""; input=""; engine=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    -f) reader="$2"; shift 2 ;;
    --pdf-engine=*) engine="${1#--pdf-engine=}"; shift ;;
    -*) shift ;;
    *) input="$1"; shift ;;
  esac
done
[ "$reader" = markdown ] || { echo "unexpected reader: $reader" >&2; exit 2; }
[ -n "$engine" ] || { echo "no pdf engine" >&2; exit 2; }
[ -s "$input" ] || { echo "missing input: $input" >&2; exit 3; }
{ printf '%%PDF-1.7\n'; cat "$input"; } > "$out"
"#;

/// xelatex stand-in: writes `<output-directory>/<jobname>.pdf`, the job
/// name defaulting to the source file's stem.
const TYPESETTER_SHIM: &str = r#"#!/bin/sh
outdir="."; jobname=""; src=""
for arg in "$@"; do
  case "$arg" in
    -output-directory=*) outdir="${arg#-output-directory=}" ;;
    -jobname=*) jobname="${arg#-jobname=}" ;;
    -*) ;;
    *) src="$arg" ;;
  esac
done
case "$src" in
  \\*) [ -n "$jobname" ] || { echo "inline source needs -jobname" >&2; exit 2; } ;;
  *) [ -s "$src" ] || { echo "missing input: $src" >&2; exit 3; }
     [ -n "$jobname" ] || jobname=$(basename "$src" .tex) ;;
esac
printf '%%PDF-1.7\n' > "$outdir/$jobname.pdf"
"#;

fn write_shim(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn supervisor() -> ProcessSupervisor {
    ProcessSupervisor::new(SupervisorConfig {
        kill_grace_ms: 200,
        ..Default::default()
    })
}

async fn orchestrator_with(
    scratch_root: PathBuf,
    registry: FormatRegistry,
) -> ConversionOrchestrator<ProcessSupervisor> {
    let (workspaces, _) = WorkspaceManager::init(scratch_root, true)
        .await
        .expect("Failed to init scratch root");

    ConversionOrchestrator::new(
        Arc::new(registry),
        JobScheduler::new(&SchedulerConfig::default().with_max_concurrent_jobs(2)),
        workspaces,
        supervisor(),
    )
}

async fn orchestrator(
    temp_dir: &TempDir,
    recipes: Vec<Recipe>,
) -> ConversionOrchestrator<ProcessSupervisor> {
    let mut registry = FormatRegistry::new();
    for recipe in recipes {
        registry.register(recipe).expect("Failed to register recipe");
    }
    orchestrator_with(temp_dir.path().join("scratch"), registry).await
}

/// Built-in recipe table with the markup and typesetter tools replaced by
/// shell stand-ins.
async fn builtin_orchestrator(temp_dir: &TempDir) -> ConversionOrchestrator<ProcessSupervisor> {
    let bin = temp_dir.path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();

    let mut tools = ToolsConfig::default();
    tools.markup.program = write_shim(&bin, "pandoc", MARKUP_SHIM);
    tools.typesetter.program = write_shim(&bin, "xelatex", TYPESETTER_SHIM);

    let registry = FormatRegistry::builtin(&tools).expect("Failed to build registry");
    orchestrator_with(temp_dir.path().join("scratch"), registry).await
}

#[tokio::test]
async fn test_markdown_to_pdf_with_real_process() {
    let temp_dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(
        &temp_dir,
        vec![fixtures::copy_recipe(Format::Markdown, Format::Pdf)],
    )
    .await;

    let handle = orchestrator
        .submit(fixtures::markdown_request(Format::Pdf))
        .await
        .unwrap();
    let job_id = handle.job_id();
    let output = handle.wait().await.unwrap();

    assert_eq!(orchestrator.status(job_id).await, Some(JobState::Succeeded));
    assert_eq!(output.format(), Format::Pdf);
    assert_eq!(
        output.path().extension().and_then(|e| e.to_str()),
        Some("pdf")
    );
    assert!(output.size_bytes() > 0);
    assert!(output
        .read_bytes()
        .await
        .unwrap()
        .starts_with(b"# Quarterly report"));
    assert!(!orchestrator.workspaces().workspace_path(job_id).exists());
}

#[tokio::test]
async fn test_failing_tool_reports_sanitized_stderr() {
    let temp_dir = TempDir::new().unwrap();
    let recipe = Recipe::new(
        Format::Markdown,
        Format::Pdf,
        ToolKind::Markup,
        "/bin/sh",
        ["-c", "echo \"cannot read $0\" >&2; exit 43", "{input}"],
    );
    let orchestrator = orchestrator(&temp_dir, vec![recipe]).await;

    let err = orchestrator
        .convert(fixtures::markdown_request(Format::Pdf))
        .await
        .unwrap_err();

    match err {
        ConversionError::ToolError {
            exit_code,
            stderr_tail,
        } => {
            assert_eq!(exit_code, Some(43));
            assert!(stderr_tail.starts_with("cannot read"));
            assert!(!stderr_tail.contains(&temp_dir.path().to_string_lossy().into_owned()));
        }
        other => panic!("expected ToolError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_hanging_tool_is_killed_at_deadline() {
    let temp_dir = TempDir::new().unwrap();
    let recipe = Recipe::new(
        Format::Markdown,
        Format::Pdf,
        ToolKind::Markup,
        "/bin/sh",
        ["-c", "sleep 30", "{input}"],
    )
    .with_max_duration(Duration::from_millis(200));
    let orchestrator = orchestrator(&temp_dir, vec![recipe]).await;

    let started = std::time::Instant::now();
    let err = orchestrator
        .convert(fixtures::markdown_request(Format::Pdf))
        .await
        .unwrap_err();

    assert!(matches!(err, ConversionError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_builtin_markdown_to_pdf_recipe() {
    let temp_dir = TempDir::new().unwrap();
    let orchestrator = builtin_orchestrator(&temp_dir).await;

    let handle = orchestrator
        .submit(fixtures::markdown_request(Format::Pdf))
        .await
        .unwrap();
    let job_id = handle.job_id();
    let output = handle.wait().await.unwrap();

    assert_eq!(orchestrator.status(job_id).await, Some(JobState::Succeeded));
    assert_eq!(output.format(), Format::Pdf);
    assert_eq!(
        output.path().extension().and_then(|e| e.to_str()),
        Some("pdf")
    );
    let bytes = output.read_bytes().await.unwrap();
    assert!(bytes.starts_with(b"%PDF-1.7\n# Quarterly report"));
    assert!(!orchestrator.workspaces().workspace_path(job_id).exists());
}

#[tokio::test]
async fn test_builtin_latex_to_pdf_recipe() {
    let temp_dir = TempDir::new().unwrap();
    let orchestrator = builtin_orchestrator(&temp_dir).await;

    let request = ConversionRequest::from_bytes(
        b"\\documentclass{article}\n\\begin{document}Hi\\end{document}\n".to_vec(),
        Format::Pdf,
        CallerId::new("test-caller"),
    )
    .with_file_name("paper.tex");

    let output = orchestrator.convert(request).await.unwrap();

    assert_eq!(output.format(), Format::Pdf);
    assert_eq!(
        output.path().extension().and_then(|e| e.to_str()),
        Some("pdf")
    );
    assert!(output.read_bytes().await.unwrap().starts_with(b"%PDF"));
}

#[tokio::test]
async fn test_builtin_png_to_pdf_recipe() {
    let temp_dir = TempDir::new().unwrap();
    let orchestrator = builtin_orchestrator(&temp_dir).await;

    let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
    png.extend_from_slice(&[0u8; 32]);
    let request = ConversionRequest::from_bytes(png, Format::Pdf, CallerId::new("test-caller"))
        .with_file_name("scan.png");

    let output = orchestrator.convert(request).await.unwrap();

    assert_eq!(output.format(), Format::Pdf);
    assert!(output.size_bytes() > 0);
}

#[tokio::test]
async fn test_relative_scratch_root() {
    let temp_dir = TempDir::new_in(".").unwrap();
    let relative = Path::new(temp_dir.path().file_name().unwrap()).join("scratch");
    assert!(relative.is_relative());

    let mut registry = FormatRegistry::new();
    registry
        .register(fixtures::copy_recipe(Format::Markdown, Format::Pdf))
        .unwrap();
    let orchestrator = orchestrator_with(relative, registry).await;

    let output = orchestrator
        .convert(fixtures::markdown_request(Format::Pdf))
        .await
        .unwrap();

    assert!(output
        .read_bytes()
        .await
        .unwrap()
        .starts_with(b"# Quarterly report"));
}

#[tokio::test]
async fn test_shutdown_stops_running_tool_and_helpers() {
    let temp_dir = TempDir::new().unwrap();
    let pid_file = temp_dir.path().join("helper.pid");
    let script = format!(
        "sleep 30 & echo $! > '{}'; wait",
        pid_file.display()
    );
    let recipe = Recipe::new(
        Format::Markdown,
        Format::Pdf,
        ToolKind::Markup,
        "/bin/sh",
        ["-c".to_string(), script, "{input}".to_string()],
    );
    let orchestrator = orchestrator(&temp_dir, vec![recipe]).await;

    let handle = orchestrator
        .submit(fixtures::markdown_request(Format::Pdf))
        .await
        .unwrap();
    let job_id = handle.job_id();

    let pid: u32 = loop {
        if let Ok(text) = std::fs::read_to_string(&pid_file) {
            if let Ok(pid) = text.trim().parse() {
                break pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    assert_eq!(orchestrator.shutdown(Duration::from_secs(5)).await, Ok(1));
    assert!(matches!(handle.wait().await, Err(ConversionError::Cancelled)));
    assert!(!orchestrator.workspaces().workspace_path(job_id).exists());

    #[cfg(target_os = "linux")]
    {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).unwrap_or_default();
        let state = stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next());
        assert!(
            matches!(state, None | Some('Z') | Some('X')),
            "helper {} survived",
            pid
        );
    }
    #[cfg(not(target_os = "linux"))]
    let _ = pid;
}
