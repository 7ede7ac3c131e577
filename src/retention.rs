use crate::db::Db;

/// Interval between update-log retention sweeps (seconds).
const RETENTION_INTERVAL_SECS: u64 = 60;

/// Spawns a background task that bounds update-log retention.
///
/// Flushed batches stay replayable for `retention_hours` so any live
/// session's gap request can be served; older rows are dropped. Reconnects
/// further behind than the horizon fall back to a full refetch.
pub fn spawn_retention_task(db: Db, retention_hours: i64) {
    tokio::spawn(async move {
        // Initial delay: let the server start up before the first sweep.
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;

        loop {
            let cutoff = chrono::Utc::now() - chrono::Duration::hours(retention_hours);
            match db.prune_update_log(&cutoff.to_rfc3339()) {
                Ok(pruned) if pruned > 0 => {
                    eprintln!("🧹 Retention: pruned {pruned} update batches");
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("⚠️ Retention sweep failed: {e}");
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs(RETENTION_INTERVAL_SECS)).await;
        }
    });
}
