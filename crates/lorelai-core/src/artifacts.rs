//! Local artifact store backing `dragonfly data upload|download`.

use crate::errors::LorelaiError;
use anyhow::Context;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const AREA: &str = "benchmark";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCopy {
    pub from: PathBuf,
    pub to: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub direction: Direction,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub files: Vec<PlannedCopy>,
}

impl TransferPlan {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }
}

pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: artifact_dir.into().join(AREA),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Plans copying `path` (file or directory) into the store.
    pub fn plan_upload(&self, path: &Path) -> anyhow::Result<TransferPlan> {
        if !path.exists() {
            return Err(LorelaiError::validation(format!(
                "upload path {} does not exist",
                path.display()
            ))
            .into());
        }
        let files = if path.is_file() {
            let name = path.file_name().ok_or_else(|| {
                LorelaiError::validation(format!("invalid upload path {}", path.display()))
            })?;
            vec![PlannedCopy {
                from: path.to_path_buf(),
                to: self.root.join(name),
                bytes: std::fs::metadata(path)?.len(),
            }]
        } else {
            collect(path, &self.root)?
        };
        if files.is_empty() {
            return Err(LorelaiError::validation(format!(
                "nothing to upload under {}",
                path.display()
            ))
            .into());
        }
        check_disjoint(path, &self.root)?;
        check_writable(&self.root)?;
        Ok(TransferPlan {
            direction: Direction::Upload,
            source: path.to_path_buf(),
            destination: self.root.clone(),
            files,
        })
    }

    /// Plans copying the whole store into `path`.
    pub fn plan_download(&self, path: &Path) -> anyhow::Result<TransferPlan> {
        if path.is_file() {
            return Err(LorelaiError::validation(format!(
                "download path {} is a file, expected a directory",
                path.display()
            ))
            .into());
        }
        if !self.root.is_dir() {
            return Err(LorelaiError::not_found(format!(
                "no artifacts stored under {}",
                self.root.display()
            ))
            .into());
        }
        check_disjoint(&self.root, path)?;
        let files = collect(&self.root, path)?;
        check_writable(path)?;
        Ok(TransferPlan {
            direction: Direction::Download,
            source: self.root.clone(),
            destination: path.to_path_buf(),
            files,
        })
    }

    pub fn execute(&self, plan: &TransferPlan) -> anyhow::Result<()> {
        for f in &plan.files {
            if let Some(parent) = f.to.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::copy(&f.from, &f.to).with_context(|| {
                format!("failed to copy {} to {}", f.from.display(), f.to.display())
            })?;
        }
        tracing::info!(
            event = "artifacts_transferred",
            direction = ?plan.direction,
            files = plan.files.len(),
            bytes = plan.total_bytes()
        );
        Ok(())
    }
}

fn collect(src_root: &Path, dst_root: &Path) -> anyhow::Result<Vec<PlannedCopy>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(src_root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", src_root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(src_root)?;
        files.push(PlannedCopy {
            from: entry.path().to_path_buf(),
            to: dst_root.join(rel),
            bytes: entry.metadata()?.len(),
        });
    }
    Ok(files)
}

/// `path` with symlinks and `..` resolved. Components below the nearest
/// existing ancestor are appended unchanged.
fn resolve(path: &Path) -> anyhow::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut rest = Vec::new();
    let mut cursor = absolute.as_path();
    loop {
        if cursor.exists() {
            let mut out = cursor
                .canonicalize()
                .with_context(|| format!("failed to resolve {}", cursor.display()))?;
            for c in rest.iter().rev() {
                out.push(c);
            }
            return Ok(out);
        }
        match (cursor.parent(), cursor.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                cursor = parent;
            }
            _ => return Ok(absolute),
        }
    }
}

/// Copying between overlapping trees would overwrite files with themselves
/// (truncating them) or recurse into its own output.
fn check_disjoint(source: &Path, destination: &Path) -> anyhow::Result<()> {
    let src = resolve(source)?;
    let dst = resolve(destination)?;
    if src.starts_with(&dst) || dst.starts_with(&src) {
        return Err(LorelaiError::validation(format!(
            "{} and {} overlap; source and destination must be separate",
            source.display(),
            destination.display()
        ))
        .into());
    }
    Ok(())
}

/// The nearest existing ancestor of `dir` must be a directory the current
/// user can create files in.
fn check_writable(dir: &Path) -> anyhow::Result<()> {
    let mut cursor = Some(dir);
    while let Some(p) = cursor {
        if p.exists() {
            if !p.is_dir() {
                return Err(LorelaiError::validation(format!(
                    "{} is not a directory",
                    p.display()
                ))
                .into());
            }
            tempfile::NamedTempFile::new_in(p).map_err(|e| {
                LorelaiError::validation(format!("{} is not writable: {}", p.display(), e))
            })?;
            return Ok(());
        }
        cursor = p.parent().filter(|p| !p.as_os_str().is_empty());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_then_download_directory_tree() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("datasets");
        std::fs::create_dir_all(src.join("nightly"))?;
        std::fs::write(src.join("qa.jsonl"), "{}\n")?;
        std::fs::write(src.join("nightly/trace.jsonl"), "{}\n{}\n")?;

        let store = ArtifactStore::new(tmp.path().join("artifacts"));
        let plan = store.plan_upload(&src)?;
        assert_eq!(plan.files.len(), 2);
        assert!(!store.root().exists());
        store.execute(&plan)?;
        assert!(store.root().join("nightly/trace.jsonl").is_file());

        let out = tmp.path().join("restore");
        let plan = store.plan_download(&out)?;
        store.execute(&plan)?;
        assert_eq!(std::fs::read_to_string(out.join("qa.jsonl"))?, "{}\n");
        Ok(())
    }

    #[test]
    fn missing_upload_path_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let err = store.plan_upload(&tmp.path().join("nope")).unwrap_err();
        assert_eq!(
            crate::errors::classify(&err),
            crate::errors::ErrorKind::Validation
        );
    }

    #[test]
    fn reupload_of_stored_file_is_rejected_and_file_kept() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("qa.jsonl");
        std::fs::write(&src, "{\"id\": \"1\"}\n")?;
        let store = ArtifactStore::new(tmp.path().join("artifacts"));
        store.execute(&store.plan_upload(&src)?)?;

        let stored = store.root().join("qa.jsonl");
        let err = store.plan_upload(&stored).unwrap_err();
        assert_eq!(
            crate::errors::classify(&err),
            crate::errors::ErrorKind::Validation
        );
        assert!(err.to_string().contains("overlap"));

        // The store's parent contains the store itself.
        assert!(store.plan_upload(&tmp.path().join("artifacts")).is_err());
        assert_eq!(std::fs::read_to_string(&stored)?, "{\"id\": \"1\"}\n");
        Ok(())
    }

    #[test]
    fn download_into_the_store_is_rejected() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("qa.jsonl");
        std::fs::write(&src, "{}\n")?;
        let store = ArtifactStore::new(tmp.path().join("artifacts"));
        store.execute(&store.plan_upload(&src)?)?;

        for target in [
            store.root().to_path_buf(),
            store.root().join("restore"),
            tmp.path().join("artifacts/benchmark/../benchmark"),
        ] {
            let err = store.plan_download(&target).unwrap_err();
            assert_eq!(
                crate::errors::classify(&err),
                crate::errors::ErrorKind::Validation
            );
        }
        assert_eq!(std::fs::read_to_string(store.root().join("qa.jsonl"))?, "{}\n");
        Ok(())
    }

    #[test]
    fn destination_under_a_file_is_not_writable() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = tmp.path().join("blocker");
        std::fs::write(&file, "x")?;
        let err = check_writable(&file.join("nested/out")).unwrap_err();
        assert!(err.to_string().contains("is not a directory"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn read_only_destination_fails_the_dry_run() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("qa.jsonl");
        std::fs::write(&src, "{}\n")?;
        let store = ArtifactStore::new(tmp.path().join("artifacts"));
        store.execute(&store.plan_upload(&src)?)?;

        let locked = tmp.path().join("locked");
        std::fs::create_dir(&locked)?;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555))?;
        // Privileged users write through the mode bits; nothing to check then.
        let privileged = std::fs::File::create(locked.join("canary")).is_ok();
        let result = store.plan_download(&locked.join("restore"));
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755))?;
        if privileged {
            return Ok(());
        }

        let err = result.unwrap_err();
        assert_eq!(
            crate::errors::classify(&err),
            crate::errors::ErrorKind::Validation
        );
        assert!(err.to_string().contains("not writable"));
        Ok(())
    }

    #[test]
    fn download_into_a_file_is_rejected() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = tmp.path().join("x.txt");
        std::fs::write(&file, "x")?;
        let store = ArtifactStore::new(tmp.path());
        assert!(store.plan_download(&file).is_err());
        Ok(())
    }
}
