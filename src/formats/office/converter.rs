//! External office converter
//!
//! Each call spawns exactly one converter process:
//!
//! ```text
//! <binary> -env:UserInstallation=file://<profile> --headless --norestore \
//!          --convert-to pdf --outdir <workspace>/output <input>
//! ```
//!
//! The converter can exit 0 without writing anything, so success is decided
//! by the presence of `<input stem>.pdf` in the output directory, not by the
//! exit code alone.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::config::OfficeConfig;
use crate::convert::{ConversionFailure, ConversionResult, Diagnostics, FailureCause, PdfArtifact};
use crate::process::{run_bounded, ProcessError, ProcessOutput};
use crate::workspace::Workspace;

/// Drives the headless office converter for PPT/PPTX input
#[derive(Debug, Clone)]
pub struct ExternalPdfConverter {
    config: OfficeConfig,
    permits: Arc<Semaphore>,
}

impl ExternalPdfConverter {
    pub fn new(config: OfficeConfig) -> Self {
        // A shared profile directory tolerates one user at a time
        let permits = if config.shared_profile.is_some() {
            1
        } else {
            config.max_concurrent.max(1)
        };

        Self {
            config,
            permits: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Build the conversion command line
    pub fn command(&self, input: &Path, output_dir: &Path, profile: &Path) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.arg(format!("-env:UserInstallation={}", profile_url(profile)))
            .arg("--headless")
            .arg("--norestore")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(output_dir)
            .arg(input);
        cmd
    }

    /// Convert `input` into the workspace output directory
    pub async fn convert(&self, input: &Path, workspace: &Workspace) -> ConversionResult {
        let _permit = self.permits.acquire().await.map_err(|e| {
            ConversionFailure::new(FailureCause::Internal, format!("converter pool closed: {}", e))
        })?;

        let profile = self.profile_for(workspace)?;
        let output_dir = workspace.output_dir();
        let expected = output_dir.join(expected_output_name(input));

        tracing::debug!(
            workspace = %workspace.id(),
            binary = %self.config.binary.display(),
            input = %input.display(),
            profile = %profile.display(),
            "Starting office conversion"
        );

        let output = run_bounded(self.command(input, &output_dir, &profile), self.config.timeout)
            .await
            .map_err(|e| process_failure(e, &output_dir))?;

        if !output.success() {
            let code = output
                .exit_code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(ConversionFailure::new(
                FailureCause::NonZeroExit,
                format!("converter exited with {}", code),
            )
            .with_diagnostics(diagnostics(&output, &output_dir)));
        }

        if !expected.is_file() {
            return Err(ConversionFailure::new(
                FailureCause::MissingOutput,
                format!(
                    "converter reported success but {} was not produced",
                    expected.display()
                ),
            )
            .with_diagnostics(diagnostics(&output, &output_dir)));
        }

        tracing::debug!(
            workspace = %workspace.id(),
            stdout = %output.stdout.trim(),
            elapsed_ms = output.elapsed.as_millis() as u64,
            "Office conversion finished"
        );

        PdfArtifact::from_path(&expected).map_err(|e| {
            ConversionFailure::new(FailureCause::Io, format!("failed to stat output: {}", e))
        })
    }

    fn profile_for(&self, workspace: &Workspace) -> Result<PathBuf, ConversionFailure> {
        match &self.config.shared_profile {
            Some(shared) => {
                std::fs::create_dir_all(shared).map_err(|e| {
                    ConversionFailure::new(
                        FailureCause::Io,
                        format!("failed to prepare profile {}: {}", shared.display(), e),
                    )
                })?;
                Ok(shared.clone())
            }
            None => workspace
                .profile_dir()
                .map_err(|e| ConversionFailure::new(FailureCause::Io, e.to_string())),
        }
    }
}

/// `file://` URL for a profile directory, path segments percent-encoded
pub fn profile_url(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let encoded: Vec<String> = absolute
        .to_string_lossy()
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    let joined = encoded.join("/");

    if joined.starts_with('/') {
        format!("file://{}", joined)
    } else {
        format!("file:///{}", joined)
    }
}

/// The converter names its output after the input stem
fn expected_output_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}.pdf", stem)
}

fn process_failure(err: ProcessError, output_dir: &Path) -> ConversionFailure {
    match err {
        ProcessError::Launch { .. } => {
            ConversionFailure::new(FailureCause::LaunchFailed, err.to_string())
        }
        ProcessError::TimedOut {
            ref stdout,
            ref stderr,
            limit,
            ..
        } => {
            let diagnostics = Diagnostics {
                exit_code: None,
                stdout: stdout.clone(),
                stderr: stderr.clone(),
                output_listing: list_dir(output_dir),
                elapsed: Some(limit),
            };
            ConversionFailure::new(FailureCause::Timeout, err.to_string())
                .with_diagnostics(diagnostics)
        }
        ProcessError::Wait { .. } => {
            ConversionFailure::new(FailureCause::Internal, err.to_string())
        }
    }
}

fn diagnostics(output: &ProcessOutput, output_dir: &Path) -> Diagnostics {
    Diagnostics {
        exit_code: output.exit_code(),
        stdout: output.stdout.clone(),
        stderr: output.stderr.clone(),
        output_listing: list_dir(output_dir),
        elapsed: Some(output.elapsed),
    }
}

fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(e) => vec![format!("<unreadable: {}>", e)],
    };
    names.sort();
    names
}
