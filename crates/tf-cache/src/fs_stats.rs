use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

/// Size and file count of a directory tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub size_bytes: u64,
    pub file_count: u64,
}

/// Walk `root` and sum the sizes of regular files. Entries that cannot be
/// read are skipped. `.git` is descended into unless `skip_git` is set.
pub fn tree_stats(root: &Path, skip_git: bool) -> TreeStats {
    let mut stats = TreeStats::default();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !(skip_git && e.depth() == 1 && e.file_name() == ".git"));

    for entry in walker.flatten() {
        if entry.file_type().is_file() {
            stats.file_count += 1;
            stats.size_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    stats
}

/// Up to `limit` regular files outside `.git`, for permission sampling.
pub fn sample_files(root: &Path, limit: usize) -> Vec<std::path::PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && e.file_name() == ".git"))
        .flatten()
        .filter(|e| e.file_type().is_file())
        .take(limit)
        .map(|e| e.into_path())
        .collect()
}

/// True when the directory has at least one entry.
pub fn is_non_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

pub fn to_utc(time: std::io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

/// Inode change time on unix, creation time elsewhere.
pub fn changed_at(meta: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        DateTime::<Utc>::from_timestamp(meta.ctime(), meta.ctime_nsec() as u32)
    }
    #[cfg(not(unix))]
    {
        to_utc(meta.created())
    }
}
