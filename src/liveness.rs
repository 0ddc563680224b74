use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;

/// A robot counts as active while its heartbeat is younger than this.
pub const ACTIVE_WINDOW_SECS: i64 = 300;

/// Relative path of the heartbeat sentinel inside a robot folder.
/// Robots touch this file from their onboard sync script.
const HEARTBEAT_FILE: &str = "script/last_seen.txt";

/// Liveness snapshot for one robot at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessStatus {
    pub is_active: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Probe a robot's heartbeat sentinel under `root`.
///
/// Only the file's mtime matters, never its contents. A missing
/// sentinel (or one whose metadata cannot be read) reports inactive
/// with no last-seen time. A stale sentinel still reports its mtime,
/// so callers can show when the robot was last alive. The window
/// comparison is strict: an age of exactly `ACTIVE_WINDOW_SECS` is
/// already inactive.
pub fn probe(root: &Path, robot_folder: &str, now: DateTime<Utc>) -> LivenessStatus {
    let sentinel = root.join(robot_folder).join(HEARTBEAT_FILE);

    let modified = fs::metadata(&sentinel)
        .and_then(|meta| meta.modified())
        .ok();

    match modified {
        Some(mtime) => {
            let last_seen = DateTime::<Utc>::from(mtime);
            let age = now.signed_duration_since(last_seen);
            LivenessStatus {
                is_active: age.num_seconds() < ACTIVE_WINDOW_SECS,
                last_seen: Some(last_seen),
            }
        }
        None => LivenessStatus {
            is_active: false,
            last_seen: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn write_heartbeat(root: &Path, folder: &str) -> DateTime<Utc> {
        let script = root.join(folder).join("script");
        fs::create_dir_all(&script).unwrap();
        let sentinel = script.join("last_seen.txt");
        fs::write(&sentinel, b"2024-01-01").unwrap();
        DateTime::<Utc>::from(fs::metadata(&sentinel).unwrap().modified().unwrap())
    }

    #[test]
    fn test_missing_sentinel_is_inactive() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("robot-1")).unwrap();

        let status = probe(tmp.path(), "robot-1", Utc::now());
        assert!(!status.is_active);
        assert_eq!(status.last_seen, None);
    }

    #[test]
    fn test_fresh_heartbeat_is_active() {
        let tmp = TempDir::new().unwrap();
        let mtime = write_heartbeat(tmp.path(), "robot-1");

        let status = probe(tmp.path(), "robot-1", mtime + Duration::seconds(10));
        assert!(status.is_active);
        assert_eq!(status.last_seen, Some(mtime));
    }

    #[test]
    fn test_window_boundary_is_strict() {
        let tmp = TempDir::new().unwrap();
        let mtime = write_heartbeat(tmp.path(), "robot-1");

        let just_inside = probe(tmp.path(), "robot-1", mtime + Duration::seconds(299));
        assert!(just_inside.is_active);

        let at_window = probe(tmp.path(), "robot-1", mtime + Duration::seconds(300));
        assert!(!at_window.is_active);

        let past_window = probe(tmp.path(), "robot-1", mtime + Duration::seconds(301));
        assert!(!past_window.is_active);
    }

    #[test]
    fn test_stale_heartbeat_keeps_last_seen() {
        let tmp = TempDir::new().unwrap();
        let mtime = write_heartbeat(tmp.path(), "robot-1");

        let status = probe(tmp.path(), "robot-1", mtime + Duration::seconds(3600));
        assert!(!status.is_active);
        assert_eq!(status.last_seen, Some(mtime));
    }

    #[test]
    fn test_heartbeat_contents_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let mtime = write_heartbeat(tmp.path(), "robot-1");
        // Sentinel holds garbage; only the mtime counts
        assert_eq!(
            probe(tmp.path(), "robot-1", mtime + Duration::seconds(1)).last_seen,
            Some(mtime)
        );
    }
}
