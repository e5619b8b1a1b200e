use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::StagingResult;
use crate::STAGING_PREFIX;

/// Schedule for the background staging sweep.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Seconds between passes.
    pub interval_secs: u64,
    /// Staging files older than this many seconds are reclaimed.
    pub max_age_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            max_age_secs: 3600,
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// Outcome of one sweep pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
    pub bytes_reclaimed: u64,
}

/// Reclaims staging files that were never committed.
///
/// Runs apart from the upload path; a slow commit never waits on it. Only
/// files carrying the staging prefix are considered, so a misconfigured
/// directory cannot cost unrelated files.
#[derive(Clone, Debug)]
pub struct CleanupSweep {
    dir: PathBuf,
    max_age: Duration,
}

impl CleanupSweep {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// One pass against the current wall clock.
    pub async fn run_once(&self) -> StagingResult<SweepReport> {
        self.sweep_at(SystemTime::now()).await
    }

    /// One pass, treating `now` as the current time.
    pub async fn sweep_at(&self, now: SystemTime) -> StagingResult<SweepReport> {
        let mut report = SweepReport::default();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(STAGING_PREFIX) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                // Committed and removed between listing and stat.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "cannot stat staging file");
                    report.failed += 1;
                    continue;
                }
            };
            report.scanned += 1;

            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age <= self.max_age {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    debug!(path = %entry.path().display(), age_secs = age.as_secs(), "stale staging file reclaimed");
                    report.removed += 1;
                    report.bytes_reclaimed += meta.len();
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "failed to reclaim staging file");
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(
                dir = %self.dir.display(),
                removed = report.removed,
                failed = report.failed,
                bytes = report.bytes_reclaimed,
                "staging sweep finished"
            );
        }
        Ok(report)
    }

    /// Run passes every `interval` until `cancel` fires.
    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("staging sweep stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            warn!(dir = %self.dir.display(), error = %e, "staging sweep failed");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stager::{Stager, StagingConfig};
    use bytes::Bytes;

    const HOUR: Duration = Duration::from_secs(3600);

    async fn staged(stager: &Stager, body: &'static [u8]) -> crate::StagingHandle {
        stager.stage("a.txt", None, Bytes::from_static(body)).await.unwrap()
    }

    fn stager(dir: &std::path::Path) -> Stager {
        Stager::new(StagingConfig {
            dir: dir.to_path_buf(),
            ..StagingConfig::default()
        })
    }

    #[tokio::test]
    async fn missing_directory_is_an_empty_pass() {
        let tmp = tempfile::tempdir().unwrap();
        let sweep = CleanupSweep::new(tmp.path().join("nope"), HOUR);
        assert_eq!(sweep.run_once().await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn fresh_files_are_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = staged(&stager(tmp.path()), b"fresh").await;

        let report = CleanupSweep::new(tmp.path(), HOUR).run_once().await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.removed, 0);
        assert!(handle.path().exists());
    }

    #[tokio::test]
    async fn stale_files_are_reclaimed() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = stager(tmp.path());
        let a = staged(&stager, b"abandoned").await;
        let b = staged(&stager, b"crashed").await;

        let later = SystemTime::now() + 2 * HOUR;
        let report = CleanupSweep::new(tmp.path(), HOUR).sweep_at(later).await.unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(report.bytes_reclaimed, 16);
        assert!(!a.path().exists());
        assert!(!b.path().exists());
    }

    #[tokio::test]
    async fn foreign_files_are_never_touched() {
        let tmp = tempfile::tempdir().unwrap();
        let foreign = tmp.path().join("keep-me.txt");
        std::fs::write(&foreign, b"not ours").unwrap();

        let later = SystemTime::now() + 2 * HOUR;
        let report = CleanupSweep::new(tmp.path(), HOUR).sweep_at(later).await.unwrap();
        assert_eq!(report.scanned, 0);
        assert!(foreign.exists());
    }

    #[tokio::test]
    async fn spawned_sweep_runs_and_stops_on_cancel() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = staged(&stager(tmp.path()), b"old").await;

        let cancel = CancellationToken::new();
        let task = CleanupSweep::new(tmp.path(), Duration::ZERO)
            .spawn(Duration::from_millis(10), cancel.clone());

        let mut waited = Duration::ZERO;
        while handle.path().exists() && waited < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += Duration::from_millis(20);
        }
        assert!(!handle.path().exists());

        cancel.cancel();
        task.await.unwrap();
    }
}
