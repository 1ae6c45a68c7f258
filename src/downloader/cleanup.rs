// Scratch directory housekeeping

use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

/// Delete regular files in `dir` older than `max_age`. Returns how many were
/// removed; a missing directory counts as already clean.
pub async fn sweep_scratch_dir(dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "cannot stat scratch entry");
                continue;
            }
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or(Duration::ZERO);
        if age < max_age {
            continue;
        }

        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %entry.path().display(), error = %e, "could not remove stale file"),
        }
    }

    if removed > 0 {
        info!(dir = %dir.display(), removed, "swept scratch directory");
    }
    Ok(removed)
}
