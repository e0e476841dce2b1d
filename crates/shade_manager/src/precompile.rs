//! Batch compilation to warm the cache ahead of first use.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use shade_common::ShaderType;
use shade_config::{load_manifest, ManifestRequest};
use walkdir::WalkDir;

use crate::error::ManagerError;
use crate::manager::ShaderManager;

/// Outcome of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrecompileReport {
    /// Requests compiled.
    pub attempted: usize,
    /// Requests that compiled successfully.
    pub succeeded: usize,
    /// Sources of the requests that failed.
    pub failed: Vec<PathBuf>,
}

impl PrecompileReport {
    /// `true` when nothing failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

const SHADER_EXTENSIONS: &[&str] = &["hlsl", "fx"];

/// Stage encoded in a file name: the suffix after the stem's last `.` or
/// `_`, as in `blur.ps.hlsl` or `sky_vs.hlsl`.
pub fn infer_stage(path: &Path) -> Option<ShaderType> {
    let stem = path.file_stem()?.to_str()?;
    let suffix = stem.rsplit(['.', '_']).next()?;
    if suffix == stem {
        return None;
    }
    suffix.parse().ok()
}

impl ShaderManager {
    /// Compiles every request on the thread pool. Individual failures are
    /// logged and do not stop the batch.
    pub fn precompile(&self, requests: &[ManifestRequest]) -> PrecompileReport {
        if !self.config().precompilation {
            log::info!("precompilation disabled, skipping {} shaders", requests.len());
            return PrecompileReport::default();
        }
        let outcomes: Vec<(PathBuf, bool)> = self.pool().install(|| {
            requests
                .par_iter()
                .map(|req| {
                    let result = self.compile_shader_from_file(&req.path, &req.entry, req.stage, &req.options);
                    if !result.success {
                        log::warn!(
                            "precompile of {} ({}) failed:\n{}",
                            req.path.display(),
                            req.entry,
                            result.error_text()
                        );
                    }
                    (req.path.clone(), result.success)
                })
                .collect()
        });

        let mut report = PrecompileReport {
            attempted: outcomes.len(),
            ..PrecompileReport::default()
        };
        for (path, ok) in outcomes {
            if ok {
                report.succeeded += 1;
            } else {
                report.failed.push(path);
            }
        }
        log::info!("precompiled {}/{} shaders", report.succeeded, report.attempted);
        report
    }

    /// Compiles every `*.hlsl`/`*.fx` file under `dir` whose name carries a
    /// stage suffix, with entry point `main` and the default options.
    /// Include files (`*.hlsli`) are skipped.
    ///
    /// Symbolic links are followed. Only an unreadable `dir` is an error;
    /// entries below it that cannot be read are logged and skipped.
    pub fn precompile_directory(&self, dir: &Path, recursive: bool) -> Result<PrecompileReport, ManagerError> {
        let walker = WalkDir::new(dir)
            .follow_links(true)
            .max_depth(if recursive { usize::MAX } else { 1 });
        let options = self.default_options();
        let mut requests = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(ManagerError::Scan {
                        path: dir.to_path_buf(),
                        reason: err.to_string(),
                    })
                }
                Err(err) => {
                    log::warn!("skipping unreadable entry under {}: {err}", dir.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_shader = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| SHADER_EXTENSIONS.contains(&e));
            if !is_shader {
                continue;
            }
            let Some(stage) = infer_stage(path) else {
                log::debug!("skipping {}: no stage suffix", path.display());
                continue;
            };
            requests.push(ManifestRequest {
                path: path.to_path_buf(),
                entry: "main".to_string(),
                stage,
                options: options.clone(),
            });
        }
        requests.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(self.precompile(&requests))
    }

    /// Compiles the configured shader directory recursively.
    pub fn precompile_shader_directory(&self) -> Result<PrecompileReport, ManagerError> {
        let dir = self.config().shader_directory;
        self.precompile_directory(&dir, true)
    }

    /// Compiles the `[[shader]]` entries of a manifest. Relative paths are
    /// resolved against the manifest's directory.
    pub fn precompile_from_manifest(&self, manifest_path: &Path) -> Result<PrecompileReport, ManagerError> {
        let manifest = load_manifest(manifest_path)?;
        let base = manifest_path.parent().unwrap_or(Path::new("."));
        let requests = manifest.requests(base, self.config().default_model);
        Ok(self.precompile(&requests))
    }
}
