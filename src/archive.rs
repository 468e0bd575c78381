//! Materializing a server home from its distribution archive.
//!
//! Each extraction gets a fresh directory named after the current time, so
//! parallel runs from the same archive never clobber each other.
use crate::error::{Error, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Extract the zip archive at `zip_path` into `dest`.
///
/// Extraction runs on the blocking thread pool.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the archive cannot be opened and
/// [`Error::Archive`] when it is corrupt or cannot be written out.
pub async fn extract(zip_path: &Path, dest: &Path) -> Result<()> {
    let zip_path = zip_path.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = File::open(&zip_path).map_err(|e| {
            Error::NotFound(format!("Cannot open {}: {}", zip_path.display(), e))
        })?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| {
            Error::Archive(format!("{} is not a valid zip archive: {}", zip_path.display(), e))
        })?;

        std::fs::create_dir_all(&dest)
            .map_err(|e| Error::Archive(format!("Cannot create {}: {}", dest.display(), e)))?;
        archive.extract(&dest).map_err(|e| {
            Error::Archive(format!(
                "Failed to extract {} into {}: {}",
                zip_path.display(),
                dest.display(),
                e
            ))
        })
    })
    .await
    .map_err(|e| Error::Other(format!("Extraction task failed: {}", e)))?
}

/// Extract a server distribution below `base_dir` and return its home.
///
/// The archive is unpacked into `<base_dir>/servertmp<millis>`; the home is
/// the directory inside it named after the archive without its `.zip`
/// extension, which is where distributions keep their top-level folder.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when `zip_path` is not a `.zip` file or does
/// not exist, plus any error of [`extract`].
#[tracing::instrument(skip_all, fields(zip = %zip_path.display(), base_dir = %base_dir.display()))]
pub async fn prepare_server_home(zip_path: &Path, base_dir: &Path) -> Result<PathBuf> {
    let is_zip = zip_path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if !is_zip {
        return Err(Error::NotFound(format!(
            "{} is not a zip file",
            zip_path.display()
        )));
    }
    if !zip_path.is_file() {
        return Err(Error::NotFound(format!(
            "Distribution {} does not exist",
            zip_path.display()
        )));
    }

    let distribution = zip_path
        .file_stem()
        .ok_or_else(|| Error::NotFound(format!("{} has no file name", zip_path.display())))?
        .to_os_string();

    let base_dir = std::path::absolute(base_dir)
        .map_err(|e| Error::Other(format!("Cannot resolve {}: {}", base_dir.display(), e)))?;
    let extract_dir = unique_extract_dir(&base_dir);

    tracing::info!(dest = %extract_dir.display(), "Extracting server distribution");
    extract(zip_path, &extract_dir).await?;

    Ok(extract_dir.join(distribution))
}

fn unique_extract_dir(base_dir: &Path) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();

    let candidate = base_dir.join(format!("servertmp{}", millis));
    if candidate.exists() {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        return base_dir.join(format!("servertmp{}-{}", millis, &suffix[..8]));
    }
    candidate
}
