use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tf_cache::keys::cache_key;
use tf_cache::lock::{lock_path, EntryLock};
use tf_cache::template::{get_default_task_list_template, validate_template_format};
use tf_cache::{CloneStatus, FetchStatus, RepositoryCache, ValidationStatus};
use tf_core::error::ErrorKind;
use tf_core::git::{GitOutput, GitRunError, GitRunner};

const URL: &str = "https://github.com/acme/widgets.git";

// ---------------------------------------------------------------------------
// Mock git runner
// ---------------------------------------------------------------------------

/// Records every invocation and answers from a closure keyed on the args.
struct MockGitRunner {
    calls: Mutex<Vec<Vec<String>>>,
    respond: Box<dyn Fn(&Path, &[&str]) -> Result<GitOutput, GitRunError> + Send + Sync>,
}

impl MockGitRunner {
    fn new(
        respond: impl Fn(&Path, &[&str]) -> Result<GitOutput, GitRunError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    fn commands(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn ran(&self, first: &str) -> bool {
        self.commands().iter().any(|c| c.first().map(String::as_str) == Some(first))
    }
}

#[async_trait]
impl GitRunner for MockGitRunner {
    async fn run_git(
        &self,
        dir: &Path,
        args: &[&str],
        _timeout: Duration,
    ) -> Result<GitOutput, GitRunError> {
        self.calls
            .lock()
            .unwrap()
            .push(args.iter().map(|s| s.to_string()).collect());
        (self.respond)(dir, args)
    }
}

/// Lay down a minimal repository with two tracked files at `target`.
fn write_fixture_repo(target: &Path) {
    std::fs::create_dir_all(target.join(".git/objects")).unwrap();
    std::fs::create_dir_all(target.join(".git/refs/heads")).unwrap();
    std::fs::write(target.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
    std::fs::write(target.join("README.md"), "# widgets\n").unwrap();
    std::fs::write(target.join("index.js"), "module.exports = 1;\n").unwrap();
}

fn cloning_runner() -> Arc<MockGitRunner> {
    MockGitRunner::new(|_dir, args| {
        if args.first() == Some(&"clone") {
            write_fixture_repo(&PathBuf::from(args[2]));
        }
        Ok(GitOutput::ok(""))
    })
}

fn set_mtime(path: &Path, age: Duration) {
    let when = SystemTime::now() - age;
    File::open(path).unwrap().set_modified(when).unwrap();
}

// ---------------------------------------------------------------------------
// Directory lifecycle
// ---------------------------------------------------------------------------

#[test]
fn get_cache_directory_matches_key() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = RepositoryCache::new(tmp.path());
    let path = cache.get_cache_directory(URL).unwrap();
    assert_eq!(path, tmp.path().join(cache_key(URL).unwrap()));
    assert!(!path.exists());
}

#[test]
fn invalid_url_is_repository_error() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = RepositoryCache::new(tmp.path());
    let err = cache.create_cache_directory("file:///etc").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Repository);
    let err = cache
        .create_cache_directory("https://example.com/a/../b")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Repository);
}

#[test]
fn check_existence_reports_hit_and_miss() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = RepositoryCache::new(tmp.path());

    let miss = cache.check_repository_existence(URL).unwrap();
    assert!(!miss.exists_in_cache);
    assert!(miss.size_bytes.is_none());

    let dir = cache.create_cache_directory(URL).unwrap();
    std::fs::write(dir.join("f.txt"), "12345").unwrap();
    let hit = cache.check_repository_existence(URL).unwrap();
    assert!(hit.exists_in_cache);
    assert_eq!(hit.size_bytes, Some(5));
    assert!(hit.modified_at.is_some());
    assert_eq!(
        serde_json::to_value(hit.validation_status).unwrap(),
        "cache_hit"
    );
}

#[test]
fn cache_info_none_when_absent() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = RepositoryCache::new(tmp.path());
    assert!(cache.get_repository_cache_info(URL).unwrap().is_none());

    let dir = cache.create_cache_directory(URL).unwrap();
    write_fixture_repo(&dir);
    let info = cache.get_repository_cache_info(URL).unwrap().unwrap();
    assert!(info.is_git_repository);
    assert!(info.is_valid);
    assert_eq!(info.file_count, 3);
}

#[test]
fn remove_returns_false_when_absent() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = RepositoryCache::new(tmp.path());
    assert!(!cache.remove_cache_directory(URL).unwrap());
    cache.create_cache_directory(URL).unwrap();
    assert!(cache.remove_cache_directory(URL).unwrap());
    assert!(!cache.directory_exists(URL));
}

#[test]
fn statistics_aggregate_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = RepositoryCache::new(tmp.path());
    let a = cache.create_cache_directory(URL).unwrap();
    write_fixture_repo(&a);
    let b = cache
        .create_cache_directory("https://github.com/acme/gadgets.git")
        .unwrap();
    std::fs::write(b.join("notes.txt"), "x").unwrap();

    let stats = cache.get_cache_statistics().unwrap();
    assert!(stats.root_exists);
    assert_eq!(stats.total_directories, 2);
    assert_eq!(stats.git_repositories, 1);
    assert_eq!(stats.total_files, 4);
    assert!(stats.oldest_modified_at <= stats.newest_modified_at);
}

#[test]
fn statistics_on_missing_root() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = RepositoryCache::new(tmp.path().join("absent"));
    let stats = cache.get_cache_statistics().unwrap();
    assert!(!stats.root_exists);
    assert_eq!(stats.total_directories, 0);
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

#[test]
fn cleanup_removes_only_stale_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = RepositoryCache::new(tmp.path());

    let old = cache.create_cache_directory(URL).unwrap();
    std::fs::write(old.join("data.bin"), vec![0u8; 128]).unwrap();
    let fresh = cache
        .create_cache_directory("https://github.com/acme/fresh.git")
        .unwrap();

    set_mtime(&old, Duration::from_secs(25 * 3600));
    set_mtime(&fresh, Duration::from_secs(3600));

    let report = cache.cleanup_old_directories(24).unwrap();
    assert_eq!(report.directories_checked, 2);
    assert_eq!(report.directories_removed, 1);
    assert!(report.bytes_freed > 0);
    assert_eq!(report.errors, 0);
    assert!(!old.exists());
    assert!(fresh.exists());
}

#[test]
fn cleanup_ignores_plain_files_in_root() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("stray.txt"), "x").unwrap();
    let cache = RepositoryCache::new(tmp.path());
    let report = cache.cleanup_old_directories(0).unwrap();
    assert_eq!(report.directories_checked, 0);
    assert!(tmp.path().join("stray.txt").exists());
}

#[test]
fn cleanup_with_huge_age_keeps_everything() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = RepositoryCache::new(tmp.path());
    let old = cache.create_cache_directory(URL).unwrap();
    set_mtime(&old, Duration::from_secs(10 * 365 * 24 * 3600));

    for hours in [u64::MAX / 1000, u64::MAX] {
        let report = cache.cleanup_old_directories(hours).unwrap();
        assert_eq!(report.directories_checked, 1);
        assert_eq!(report.directories_removed, 0);
    }
    assert!(old.exists());
}

// ---------------------------------------------------------------------------
// Clone
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clone_fresh_url_counts_files() {
    let tmp = tempfile::tempdir().unwrap();
    let git = cloning_runner();
    let cache = RepositoryCache::with_git_runner(tmp.path(), git.clone());

    let outcome = cache.clone_repository(URL, None, None).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.clone_status, CloneStatus::Cloned);
    assert_eq!(outcome.files_cloned, 2);
    assert!(outcome.repository_size_bytes > 0);
    assert!(git.ran("clone"));
}

#[tokio::test]
async fn clone_short_circuits_when_cached() {
    let tmp = tempfile::tempdir().unwrap();
    let git = cloning_runner();
    let cache = RepositoryCache::with_git_runner(tmp.path(), git.clone());

    cache.clone_repository(URL, None, None).await.unwrap();
    let again = cache.clone_repository(URL, None, None).await.unwrap();
    assert_eq!(again.clone_status, CloneStatus::AlreadyExists);
    let clones = git
        .commands()
        .iter()
        .filter(|c| c[0] == "clone")
        .count();
    assert_eq!(clones, 1);
}

#[tokio::test]
async fn clone_injects_token_and_resets_origin() {
    let tmp = tempfile::tempdir().unwrap();
    let git = cloning_runner();
    let cache = RepositoryCache::with_git_runner(tmp.path(), git.clone());

    cache
        .clone_repository(URL, Some("s3cret"), None)
        .await
        .unwrap();
    let cmds = git.commands();
    assert_eq!(cmds[0][1], "https://s3cret@github.com/acme/widgets.git");
    assert_eq!(cmds[1], vec!["remote", "set-url", "origin", URL]);
}

#[tokio::test]
async fn failed_clone_removes_partial_dir_and_redacts() {
    let tmp = tempfile::tempdir().unwrap();
    let git = MockGitRunner::new(|_dir, args| {
        let target = PathBuf::from(args[2]);
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("half"), "x").unwrap();
        Ok(GitOutput::failed(
            128,
            "fatal: could not read from https://s3cret@github.com",
        ))
    });
    let cache = RepositoryCache::with_git_runner(tmp.path(), git);

    let err = cache
        .clone_repository(URL, Some("s3cret"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Repository);
    assert!(!err.message().contains("s3cret"));
    assert!(!cache.directory_exists(URL));
}

#[tokio::test]
async fn clone_timeout_is_repository_error() {
    let tmp = tempfile::tempdir().unwrap();
    let git = MockGitRunner::new(|_dir, _args| {
        Err(GitRunError::Timeout {
            command: "clone".into(),
            timeout_secs: 1,
        })
    });
    let cache = RepositoryCache::with_git_runner(tmp.path(), git);
    let err = cache
        .clone_repository(URL, None, Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Repository);
    assert!(err.message().contains("timed out"));
}

#[tokio::test]
async fn clone_leaves_locked_entry_alone() {
    let tmp = tempfile::tempdir().unwrap();
    let git = cloning_runner();
    let cache = RepositoryCache::with_git_runner(tmp.path(), git.clone());

    // another process is mid-clone: directory exists, no .git yet
    let key = cache_key(URL).unwrap();
    let in_progress = tmp.path().join(&key);
    std::fs::create_dir_all(&in_progress).unwrap();
    std::fs::write(in_progress.join("pack.tmp"), "partial").unwrap();
    let holder = EntryLock::acquire(tmp.path(), &key, Duration::from_secs(60)).unwrap();

    let err = cache.clone_repository(URL, None, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Repository);
    assert!(in_progress.join("pack.tmp").exists());
    assert!(!git.ran("clone"));

    drop(holder);
    let outcome = cache.clone_repository(URL, None, None).await.unwrap();
    assert_eq!(outcome.clone_status, CloneStatus::Cloned);
    assert!(!lock_path(tmp.path(), &key).exists());
}

#[tokio::test]
async fn clone_producing_empty_dir_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let git = MockGitRunner::new(|_dir, args| {
        std::fs::create_dir_all(args[2]).unwrap();
        Ok(GitOutput::ok(""))
    });
    let cache = RepositoryCache::with_git_runner(tmp.path(), git);
    assert!(cache.clone_repository(URL, None, None).await.is_err());
    assert!(!cache.directory_exists(URL));
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_without_entry_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let git = cloning_runner();
    let cache = RepositoryCache::with_git_runner(tmp.path(), git.clone());
    let outcome = cache.fetch_latest_changes(URL, None, None).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.fetch_status, FetchStatus::NotFound);
    assert!(git.commands().is_empty());
}

#[tokio::test]
async fn fetch_behind_pulls_and_counts_files() {
    let tmp = tempfile::tempdir().unwrap();
    let git = MockGitRunner::new(|_dir, args| match args[0] {
        "clone" => {
            write_fixture_repo(&PathBuf::from(args[2]));
            Ok(GitOutput::ok(""))
        }
        "rev-list" => Ok(GitOutput::ok("1\t3\n")),
        "pull" => Ok(GitOutput::ok(
            "Updating a..b\nFast-forward\n 4 files changed, 20 insertions(+)\n",
        )),
        _ => Ok(GitOutput::ok("")),
    });
    let cache = RepositoryCache::with_git_runner(tmp.path(), git.clone());
    cache.clone_repository(URL, None, None).await.unwrap();

    let outcome = cache.fetch_latest_changes(URL, None, None).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.fetch_status, FetchStatus::Updated);
    assert!(outcome.changes_fetched);
    assert_eq!(outcome.commits_ahead, 1);
    assert_eq!(outcome.commits_behind, 3);
    assert_eq!(outcome.files_changed, 4);
    assert!(git
        .commands()
        .contains(&vec!["pull".to_string(), "origin".into(), "HEAD".into()]));
}

#[tokio::test]
async fn fetch_level_with_origin_is_no_changes() {
    let tmp = tempfile::tempdir().unwrap();
    let git = MockGitRunner::new(|_dir, args| match args[0] {
        "clone" => {
            write_fixture_repo(&PathBuf::from(args[2]));
            Ok(GitOutput::ok(""))
        }
        "rev-list" => Ok(GitOutput::ok("0\t0\n")),
        _ => Ok(GitOutput::ok("")),
    });
    let cache = RepositoryCache::with_git_runner(tmp.path(), git.clone());
    cache.clone_repository(URL, None, None).await.unwrap();

    let outcome = cache.fetch_latest_changes(URL, None, None).await.unwrap();
    assert_eq!(outcome.fetch_status, FetchStatus::NoChanges);
    assert!(!outcome.changes_fetched);
    assert!(!git.ran("pull"));
}

#[tokio::test]
async fn fetch_with_ref_updates_but_not_behind_is_up_to_date() {
    let tmp = tempfile::tempdir().unwrap();
    let git = MockGitRunner::new(|_dir, args| match args[0] {
        "clone" => {
            write_fixture_repo(&PathBuf::from(args[2]));
            Ok(GitOutput::ok(""))
        }
        "fetch" => Ok(GitOutput {
            stderr: "From github.com:acme/widgets\n   a1b2c3d..e4f5a6b  feature -> origin/feature\n"
                .into(),
            ..GitOutput::ok("")
        }),
        "rev-list" => Ok(GitOutput::ok("2\t0\n")),
        _ => Ok(GitOutput::ok("")),
    });
    let cache = RepositoryCache::with_git_runner(tmp.path(), git.clone());
    cache.clone_repository(URL, None, None).await.unwrap();

    let outcome = cache.fetch_latest_changes(URL, None, None).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.fetch_status, FetchStatus::UpToDate);
    assert!(!outcome.changes_fetched);
    assert_eq!(outcome.commits_ahead, 2);
    assert_eq!(outcome.commits_behind, 0);
    assert!(!git.ran("pull"));
}

#[tokio::test]
async fn fetch_with_token_uses_authenticated_refspec() {
    let tmp = tempfile::tempdir().unwrap();
    let git = MockGitRunner::new(|_dir, args| match args[0] {
        "clone" => {
            write_fixture_repo(&PathBuf::from(args[2]));
            Ok(GitOutput::ok(""))
        }
        "rev-list" => Ok(GitOutput::ok("0\t1\n")),
        "pull" => Ok(GitOutput::ok(" 1 file changed, 2 insertions(+)\n")),
        _ => Ok(GitOutput::ok("")),
    });
    let cache = RepositoryCache::with_git_runner(tmp.path(), git.clone());
    cache.clone_repository(URL, None, None).await.unwrap();

    let outcome = cache
        .fetch_latest_changes(URL, Some("s3cret"), None)
        .await
        .unwrap();
    assert_eq!(outcome.fetch_status, FetchStatus::Updated);
    assert_eq!(outcome.files_changed, 1);

    let auth_url = "https://s3cret@github.com/acme/widgets.git".to_string();
    let cmds = git.commands();
    assert!(cmds.contains(&vec![
        "fetch".to_string(),
        auth_url.clone(),
        "+refs/heads/*:refs/remotes/origin/*".into(),
    ]));
    assert!(cmds.contains(&vec!["pull".to_string(), auth_url, "HEAD".into()]));
    assert!(!cmds.iter().any(|c| c == &vec!["fetch".to_string(), "origin".into()]));
}

#[tokio::test]
async fn failed_fetch_is_repository_error_without_token() {
    let tmp = tempfile::tempdir().unwrap();
    let git = MockGitRunner::new(|_dir, args| match args[0] {
        "clone" => {
            write_fixture_repo(&PathBuf::from(args[2]));
            Ok(GitOutput::ok(""))
        }
        "fetch" => Ok(GitOutput::failed(
            128,
            "fatal: unable to access 'https://s3cret@github.com/acme/widgets.git/': 403",
        )),
        _ => Ok(GitOutput::ok("")),
    });
    let cache = RepositoryCache::with_git_runner(tmp.path(), git.clone());
    cache.clone_repository(URL, None, None).await.unwrap();

    let err = cache
        .fetch_latest_changes(URL, Some("s3cret"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Repository);
    assert!(err.message().contains("git fetch failed"));
    assert!(!err.message().contains("s3cret"));
    assert!(!git.ran("rev-list"));
}

#[tokio::test]
async fn failed_pull_is_repository_error_without_token() {
    let tmp = tempfile::tempdir().unwrap();
    let git = MockGitRunner::new(|_dir, args| match args[0] {
        "clone" => {
            write_fixture_repo(&PathBuf::from(args[2]));
            Ok(GitOutput::ok(""))
        }
        "rev-list" => Ok(GitOutput::ok("0\t2\n")),
        "pull" => Ok(GitOutput::failed(
            1,
            "fatal: Not possible to fast-forward, pulling from https://s3cret@github.com",
        )),
        _ => Ok(GitOutput::ok("")),
    });
    let cache = RepositoryCache::with_git_runner(tmp.path(), git);
    cache.clone_repository(URL, None, None).await.unwrap();

    let err = cache
        .fetch_latest_changes(URL, Some("s3cret"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Repository);
    assert!(err.message().contains("git pull failed"));
    assert!(!err.message().contains("s3cret"));
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn healthy_runner() -> Arc<MockGitRunner> {
    MockGitRunner::new(|_dir, args| match args[0] {
        "clone" => {
            write_fixture_repo(&PathBuf::from(args[2]));
            Ok(GitOutput::ok(""))
        }
        "remote" if args.get(1) == Some(&"get-url") => Ok(GitOutput::ok(format!("{URL}\n"))),
        "rev-list" => Ok(GitOutput::ok("0\t0\n")),
        _ => Ok(GitOutput::ok("")),
    })
}

#[tokio::test]
async fn validate_fetch_on_synchronized_clean_repo_is_valid() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = RepositoryCache::with_git_runner(tmp.path(), healthy_runner());
    cache.clone_repository(URL, None, None).await.unwrap();

    let report = cache.validate_fetch_operation(URL, None).await.unwrap();
    assert!(report.is_valid, "{:?}", report.errors);
    assert_eq!(report.validation_status, ValidationStatus::Valid);
    assert!(report.fetch_checks.repository_synchronized);
    assert!(report.fetch_checks.working_directory_clean);
    let info = report.fetch_validation.unwrap();
    assert!(!info.fetch_head_exists);
    assert!(!info.fetched_within_24h);
}

#[tokio::test]
async fn validate_fetch_behind_is_valid_with_warnings() {
    let tmp = tempfile::tempdir().unwrap();
    let git = MockGitRunner::new(|_dir, args| match args[0] {
        "clone" => {
            write_fixture_repo(&PathBuf::from(args[2]));
            Ok(GitOutput::ok(""))
        }
        "remote" if args.get(1) == Some(&"get-url") => Ok(GitOutput::ok(URL)),
        "rev-list" => Ok(GitOutput::ok("0\t2\n")),
        "status" => Ok(GitOutput::ok(" M index.js\n")),
        _ => Ok(GitOutput::ok("")),
    });
    let cache = RepositoryCache::with_git_runner(tmp.path(), git);
    cache.clone_repository(URL, None, None).await.unwrap();

    let report = cache.validate_fetch_operation(URL, None).await.unwrap();
    assert!(report.is_valid);
    assert_eq!(report.validation_status, ValidationStatus::ValidWithWarnings);
    assert!(!report.fetch_checks.repository_synchronized);
    assert!(!report.fetch_checks.working_directory_clean);
}

#[tokio::test]
async fn validate_clone_flags_remote_mismatch() {
    let tmp = tempfile::tempdir().unwrap();
    let git = MockGitRunner::new(|_dir, args| match args[0] {
        "clone" => {
            write_fixture_repo(&PathBuf::from(args[2]));
            Ok(GitOutput::ok(""))
        }
        "remote" if args.get(1) == Some(&"get-url") => {
            Ok(GitOutput::ok("https://github.com/someone/else.git"))
        }
        _ => Ok(GitOutput::ok("")),
    });
    let cache = RepositoryCache::with_git_runner(tmp.path(), git);
    cache.clone_repository(URL, None, None).await.unwrap();

    let report = cache.validate_clone(URL, None).await.unwrap();
    assert!(!report.is_valid);
    assert_eq!(report.validation_status, ValidationStatus::Invalid);
    assert!(!report.validation_checks.remote_origin_configured);
    assert!(report.validation_checks.git_status_works);
}

#[tokio::test]
async fn validate_clone_missing_entry_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = RepositoryCache::with_git_runner(tmp.path(), healthy_runner());
    let report = cache.validate_clone(URL, None).await.unwrap();
    assert_eq!(report.validation_status, ValidationStatus::NotFound);
    assert!(!report.is_valid);
}

#[tokio::test]
async fn validate_clone_ignores_embedded_credentials() {
    let tmp = tempfile::tempdir().unwrap();
    let git = MockGitRunner::new(|_dir, args| match args[0] {
        "clone" => {
            write_fixture_repo(&PathBuf::from(args[2]));
            Ok(GitOutput::ok(""))
        }
        "remote" => Ok(GitOutput::ok("https://tok@GitHub.com/acme/widgets.git\n")),
        _ => Ok(GitOutput::ok("")),
    });
    let cache = RepositoryCache::with_git_runner(tmp.path(), git);
    cache.clone_repository(URL, None, None).await.unwrap();
    let report = cache.validate_clone(URL, None).await.unwrap();
    assert!(report.validation_checks.remote_origin_configured);
    assert_eq!(report.validation_status, ValidationStatus::Valid);
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

#[test]
fn template_hard_errors() {
    assert!(!validate_template_format("").is_valid);
    assert!(!validate_template_format("# short").is_valid);
    assert!(!validate_template_format(&"x".repeat(50_001)).is_valid);

    let script = format!(
        "{}\n<SCRIPT>alert(1)</script>",
        get_default_task_list_template()
    );
    let report = validate_template_format(&script);
    assert!(!report.is_valid);
    assert!(report.errors.iter().any(|e| e.contains("<script")));

    let js = format!("{}\n[x](JavaScript:void(0))", get_default_task_list_template());
    assert!(!validate_template_format(&js).is_valid);
}

#[test]
fn template_soft_warnings_keep_it_valid() {
    let body = "plain prose without structure ".repeat(5);
    let report = validate_template_format(&body);
    assert!(report.is_valid);
    assert!(report.warnings.iter().any(|w| w.contains("headers")));
    assert!(report.warnings.iter().any(|w| w.contains("task ids")));
    assert!(report.warnings.iter().any(|w| w.contains("description")));
}
