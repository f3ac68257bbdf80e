//! Scratch root and per-job workspaces.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::format::Format;
use crate::metrics;
use crate::scheduler::JobId;

use super::error::WorkspaceError;

const JOB_DIR_PREFIX: &str = "job-";
const OUTBOX_DIR: &str = "outbox";
const INPUT_STEM: &str = "input";
const OUTPUT_STEM: &str = "output";

/// Input file handed to a job.
#[derive(Debug, Clone)]
pub enum SourceData {
    /// File content held in memory.
    Bytes(Vec<u8>),
    /// An already downloaded file, copied into the workspace.
    Path(PathBuf),
}

impl SourceData {
    /// Reads up to `limit` leading bytes for format sniffing.
    pub async fn head(&self, limit: usize) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes[..bytes.len().min(limit)].to_vec()),
            Self::Path(path) => {
                use tokio::io::AsyncReadExt;

                let file = tokio::fs::File::open(path).await?;
                let mut head = Vec::with_capacity(limit.min(8192));
                file.take(limit as u64).read_to_end(&mut head).await?;
                Ok(head)
            }
        }
    }
}

/// Owner of the process-wide scratch root.
///
/// Every job gets its own `job-<id>` directory under the root. Verified
/// outputs are moved to `<root>/outbox` before the job directory is removed.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    outbox: PathBuf,
}

impl WorkspaceManager {
    /// Prepares the scratch root.
    ///
    /// Creates the root if needed, checks that it is writable and, when
    /// `sweep` is set, removes workspaces and outputs left behind by a
    /// previous run. Returns the manager and the number of swept entries.
    pub async fn init(
        root: impl Into<PathBuf>,
        sweep: bool,
    ) -> Result<(Self, usize), WorkspaceError> {
        let requested = root.into();
        let not_writable = |source| WorkspaceError::NotWritable {
            path: requested.clone(),
            source,
        };

        tokio::fs::create_dir_all(&requested)
            .await
            .map_err(not_writable)?;
        // Tools run with the job directory as cwd, so every path handed to
        // them must be absolute.
        let root = tokio::fs::canonicalize(&requested)
            .await
            .map_err(not_writable)?;

        let probe = root.join(format!(".probe-{}", JobId::new()));
        tokio::fs::write(&probe, b"probe").await.map_err(not_writable)?;
        tokio::fs::remove_file(&probe).await.map_err(not_writable)?;

        let outbox = root.join(OUTBOX_DIR);
        let manager = Self { root, outbox };

        let swept = if sweep { manager.sweep().await? } else { 0 };

        tokio::fs::create_dir_all(&manager.outbox)
            .await
            .map_err(|e| WorkspaceError::io(&manager.outbox, e))?;

        info!(root = %manager.root.display(), swept, "Scratch root ready");
        Ok((manager, swept))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding verified outputs awaiting pickup.
    pub fn outbox(&self) -> &Path {
        &self.outbox
    }

    /// Path of the workspace a job would use.
    pub fn workspace_path(&self, job_id: JobId) -> PathBuf {
        self.root.join(format!("{}{}", JOB_DIR_PREFIX, job_id))
    }

    /// Removes stale job directories and outbox entries.
    pub async fn sweep(&self) -> Result<usize, WorkspaceError> {
        let mut swept = 0;

        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| WorkspaceError::io(&self.root, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkspaceError::io(&self.root, e))?
        {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(JOB_DIR_PREFIX) {
                continue;
            }
            let path = entry.path();
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => swept += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to sweep stale workspace"),
            }
        }

        if let Ok(mut entries) = tokio::fs::read_dir(&self.outbox).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => swept += 1,
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to sweep stale output"),
                }
            }
        }

        if swept > 0 {
            metrics::WORKSPACE_SWEEPS.inc_by(swept as u64);
        }
        Ok(swept)
    }

    /// Creates a fresh workspace for `job_id`.
    pub async fn open(&self, job_id: JobId) -> Result<Workspace, WorkspaceError> {
        let dir = self.workspace_path(job_id);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(WorkspaceError::Collision { path: dir });
            }
            Err(e) => return Err(WorkspaceError::io(dir, e)),
        }

        debug!(job_id = %job_id, path = %dir.display(), "Workspace opened");
        Ok(Workspace {
            job_id,
            dir,
            outbox: self.outbox.clone(),
            input_name: None,
            released: false,
        })
    }
}

/// A job's private directory.
///
/// Removed by [`Workspace::close`], or on drop if `close` was never reached.
#[derive(Debug)]
pub struct Workspace {
    job_id: JobId,
    dir: PathBuf,
    outbox: PathBuf,
    input_name: Option<String>,
    released: bool,
}

impl Workspace {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Writes the job input as `input.<ext>`.
    ///
    /// The caller's file name is never used on disk; the extension is the
    /// canonical one for `format` since some tools pick their mode from it.
    pub async fn materialize(
        &mut self,
        source: &SourceData,
        format: Format,
    ) -> Result<PathBuf, WorkspaceError> {
        let name = format!("{}.{}", INPUT_STEM, format.extension());
        let path = self.dir.join(&name);

        match source {
            SourceData::Bytes(bytes) => tokio::fs::write(&path, bytes)
                .await
                .map_err(|e| WorkspaceError::io(&path, e))?,
            SourceData::Path(from) => {
                tokio::fs::copy(from, &path)
                    .await
                    .map_err(|e| WorkspaceError::io(from, e))?;
            }
        }

        self.input_name = Some(name);
        Ok(path)
    }

    /// Finds the tool's output.
    ///
    /// `output.<ext>` is preferred; otherwise any other file with that
    /// extension is accepted, since some tools name their output after the
    /// input. The file must not be empty.
    pub async fn locate_output(&self, extension: &str) -> Result<PathBuf, WorkspaceError> {
        let missing = || WorkspaceError::MissingOutput {
            extension: extension.to_string(),
        };

        let preferred = self.dir.join(format!("{}.{}", OUTPUT_STEM, extension));
        if let Ok(meta) = tokio::fs::metadata(&preferred).await {
            return if meta.is_file() && meta.len() > 0 {
                Ok(preferred)
            } else {
                Err(missing())
            };
        }

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| WorkspaceError::io(&self.dir, e))?;
        let mut candidates = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkspaceError::io(&self.dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.input_name.as_deref() == Some(name.as_str()) {
                continue;
            }
            let matches_ext = Path::new(&name)
                .extension()
                .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
                .unwrap_or(false);
            if !matches_ext {
                continue;
            }
            if let Ok(meta) = entry.metadata().await {
                if meta.is_file() && meta.len() > 0 {
                    candidates.push(entry.path());
                }
            }
        }

        candidates.sort();
        candidates.into_iter().next().ok_or_else(missing)
    }

    /// Moves a verified output out of the workspace into the outbox.
    pub async fn export(&self, output: &Path) -> Result<PathBuf, WorkspaceError> {
        let extension = output
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dest = self.outbox.join(format!("{}.{}", self.job_id, extension));

        if tokio::fs::rename(output, &dest).await.is_err() {
            // Outbox on a different filesystem.
            tokio::fs::copy(output, &dest)
                .await
                .map_err(|e| WorkspaceError::io(&dest, e))?;
        }
        Ok(dest)
    }

    /// Removes the workspace directory and everything in it.
    pub async fn close(mut self) -> Result<(), WorkspaceError> {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                debug!(job_id = %self.job_id, "Workspace released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkspaceError::io(&self.dir, e)),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = std::fs::remove_dir_all(&self.dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(job_id = %self.job_id, error = %e, "Failed to remove abandoned workspace");
                }
            }
        }
    }
}
