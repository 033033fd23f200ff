//! Integration tests for btrack
//!
//! Drives real directory trees through scan/commit cycles. Modification
//! times are pinned with `filetime` so the timestamp signal is exact.

use ::btrack::*;
use filetime::{set_file_mtime, FileTime};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Base modification time used for pinned files
pub const T1: i64 = 1_600_000_000;

/// A tracked temporary tree
pub struct BtrackTestHarness {
    pub temp_dir: TempDir,
    pub tracker: Tracker,
}

impl BtrackTestHarness {
    /// Create an empty tracked tree
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let tracker = TrackerBuilder::new()
            .parallel_workers(2)
            .init(temp_dir.path().to_path_buf())
            .unwrap();
        Self { temp_dir, tracker }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    fn full(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// Write `content` to `rel` and pin its mtime to `secs`
    pub fn write(&self, rel: &str, content: &[u8], secs: i64) {
        let path = self.full(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        self.set_mtime(rel, secs);
    }

    pub fn set_mtime(&self, rel: &str, secs: i64) {
        set_file_mtime(self.full(rel), FileTime::from_unix_time(secs, 0)).unwrap();
    }

    pub fn rename(&self, from: &str, to: &str) {
        let target = self.full(to);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::rename(self.full(from), target).unwrap();
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.full(rel)).unwrap();
    }

    /// Scan and commit everything, returning the committed delta
    pub fn commit(&mut self) -> Delta {
        let delta = self.tracker.scan().unwrap();
        self.tracker.commit(&delta).unwrap();
        delta
    }

    pub fn scan(&self) -> Delta {
        self.tracker.scan().unwrap()
    }

    /// All paths currently in the snapshot
    pub fn snapshot_paths(&self) -> BTreeSet<String> {
        self.tracker.store().all_paths().unwrap().into_iter().collect()
    }
}

impl Default for BtrackTestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn paths(files: &[ObservedFile]) -> Vec<&str> {
    files.iter().map(|f| f.path.as_str()).collect()
}

#[test]
fn test_scenario_deterioration() {
    let mut h = BtrackTestHarness::new();
    h.write("a.txt", b"original bytes", T1);
    h.commit();

    // Same length, different bytes, timestamp restored
    h.write("a.txt", b"original bytez", T1);

    let delta = h.scan();
    assert_eq!(paths(&delta.deteriorated), vec!["a.txt"]);
    assert!(delta.modified.is_empty());
    assert!(delta.touched.is_empty());
    assert!(delta.has_deterioration());
}

#[test]
fn test_scenario_move() {
    let mut h = BtrackTestHarness::new();
    h.write("old.txt", b"moving content", T1);
    h.commit();

    h.rename("old.txt", "new.txt");

    let delta = h.scan();
    assert_eq!(delta.moved, vec![FileMovement::new("old.txt", "new.txt")]);
    assert_eq!(delta.summary().total_changes(), 1);
}

#[test]
fn test_scenario_creation() {
    let mut h = BtrackTestHarness::new();
    h.write("a.txt", b"a", T1);
    h.commit();

    h.write("b.txt", b"brand new", T1 + 10);

    let delta = h.scan();
    assert_eq!(paths(&delta.created), vec!["b.txt"]);
    assert_eq!(delta.summary().total_changes(), 1);
}

#[test]
fn test_modified_vs_touched_vs_deteriorated() {
    let mut h = BtrackTestHarness::new();
    h.write("edit.txt", b"v1", T1);
    h.write("touch.txt", b"same", T1);
    h.write("rot.txt", b"good", T1);
    h.write("calm.txt", b"calm", T1);
    h.commit();

    h.write("edit.txt", b"v2", T1 + 60);
    h.set_mtime("touch.txt", T1 + 60);
    h.write("rot.txt", b"bad!", T1);

    let delta = h.scan();
    assert_eq!(paths(&delta.modified), vec!["edit.txt"]);
    assert_eq!(paths(&delta.touched), vec!["touch.txt"]);
    assert_eq!(paths(&delta.deteriorated), vec!["rot.txt"]);
    assert!(delta.created.is_empty());
    assert!(delta.deleted.is_empty());
    assert!(delta.moved.is_empty());
}

#[test]
fn test_subsecond_mtime_change_is_not_a_change() {
    let mut h = BtrackTestHarness::new();
    h.write("a.txt", b"content", T1);
    h.commit();

    set_file_mtime(h.root().join("a.txt"), FileTime::from_unix_time(T1, 500_000_000)).unwrap();
    assert!(h.scan().is_empty());
}

#[test]
fn test_move_with_new_mtime_is_moved_and_touched() {
    let mut h = BtrackTestHarness::new();
    h.write("docs/report.pdf", b"%PDF-1.7 report", T1);
    h.commit();

    h.rename("docs/report.pdf", "archive/2024/report.pdf");
    h.set_mtime("archive/2024/report.pdf", T1 + 3600);

    let delta = h.scan();
    assert_eq!(
        delta.moved,
        vec![FileMovement::new("docs/report.pdf", "archive/2024/report.pdf")]
    );
    assert_eq!(paths(&delta.touched), vec!["archive/2024/report.pdf"]);
    assert!(delta.created.is_empty());
    assert!(delta.deleted.is_empty());
}

#[test]
fn test_deleted_paths_are_sorted() {
    let mut h = BtrackTestHarness::new();
    for name in ["z.txt", "a.txt", "m/inner.txt"] {
        h.write(name, name.as_bytes(), T1);
    }
    h.commit();
    for name in ["z.txt", "a.txt", "m/inner.txt"] {
        h.remove(name);
    }

    let delta = h.scan();
    assert_eq!(delta.deleted, vec!["a.txt", "m/inner.txt", "z.txt"]);
}

#[test]
fn test_commit_is_idempotent() {
    let mut h = BtrackTestHarness::new();
    h.write("one.txt", b"1", T1);
    h.write("two/two.txt", b"2", T1);
    h.write("three.txt", b"3", T1);
    h.commit();

    h.write("one.txt", b"1b", T1 + 5);
    h.rename("two/two.txt", "two.txt");
    h.remove("three.txt");
    h.write("four.txt", b"4", T1);
    h.set_mtime("two.txt", T1 + 7);

    let delta = h.commit();
    assert!(!delta.is_empty());
    assert!(h.scan().is_empty());
    assert_eq!(
        h.snapshot_paths(),
        ["four.txt", "one.txt", "two.txt"].iter().map(|s| s.to_string()).collect()
    );
}

#[test]
fn test_deterioration_persists_until_rebaselined() {
    let mut h = BtrackTestHarness::new();
    h.write("photo.jpg", b"\xff\xd8\xff\xe0 jpeg", T1);
    h.commit();
    let before = h.tracker.store().record_by_path("photo.jpg").unwrap().unwrap();

    h.write("photo.jpg", b"\xff\xd8\xff\xe1 jpeg", T1);

    // Commit leaves the record alone, so the alarm repeats
    h.commit();
    let after = h.tracker.store().record_by_path("photo.jpg").unwrap().unwrap();
    assert_eq!(before, after);
    assert_eq!(h.scan().deteriorated.len(), 1);

    let delta = h.scan();
    let stats = h.tracker.rebaseline_deteriorated(&delta).unwrap();
    assert_eq!(stats.rehashed, 1);
    assert!(h.scan().is_empty());
}

#[test]
fn test_backup_copy_does_not_hide_rot_in_original() {
    let mut h = BtrackTestHarness::new();
    h.write("photo.jpg", b"good pixels", T1);
    h.commit();
    let before = h.tracker.store().record_by_path("photo.jpg").unwrap().unwrap();

    // The copy sorts ahead of the original, which rotted in place
    h.write("a_backup.jpg", b"good pixels", T1);
    h.write("photo.jpg", b"bad! pixels", T1);

    let delta = h.scan();
    assert_eq!(paths(&delta.deteriorated), vec!["photo.jpg"]);
    assert_eq!(paths(&delta.created), vec!["a_backup.jpg"]);
    assert!(delta.moved.is_empty());
    assert!(delta.deleted.is_empty());

    h.commit();
    let after = h.tracker.store().record_by_path("photo.jpg").unwrap().unwrap();
    assert_eq!(after.content_hash, before.content_hash);
    assert_eq!(h.scan().deteriorated.len(), 1);
}

#[test]
fn test_partition_invariant() {
    let mut h = BtrackTestHarness::new();
    for i in 0..12 {
        h.write(&format!("f{:02}.dat", i), format!("payload {}", i).as_bytes(), T1);
    }
    h.commit();
    let prior = h.snapshot_paths();

    h.write("f00.dat", b"edited", T1 + 1);
    h.write("f01.dat", b"rotted", T1);
    h.set_mtime("f02.dat", T1 + 2);
    h.rename("f03.dat", "moved/f03.dat");
    h.remove("f04.dat");
    h.write("fresh.dat", b"fresh", T1);

    let delta = h.scan();

    // Every file now in the tree, counted once
    let mut current: Vec<String> = Vec::new();
    current.extend(delta.created.iter().map(|f| f.path.clone()));
    current.extend(delta.modified.iter().map(|f| f.path.clone()));
    current.extend(delta.deteriorated.iter().map(|f| f.path.clone()));
    current.extend(delta.moved.iter().map(|m| m.new_path.clone()));
    let movers: BTreeSet<_> = delta.moved.iter().map(|m| m.new_path.clone()).collect();
    current.extend(
        delta
            .touched
            .iter()
            .filter(|f| !movers.contains(&f.path))
            .map(|f| f.path.clone()),
    );
    let changed: BTreeSet<_> = current.iter().cloned().collect();
    assert_eq!(changed.len(), current.len(), "a path was classified twice");

    let tree: BTreeSet<String> = fs::read_dir(h.root())
        .unwrap()
        .flat_map(|e| {
            let e = e.unwrap();
            if e.path().is_dir() {
                fs::read_dir(e.path())
                    .unwrap()
                    .map(|inner| {
                        format!(
                            "{}/{}",
                            e.file_name().to_string_lossy(),
                            inner.unwrap().file_name().to_string_lossy()
                        )
                    })
                    .collect::<Vec<_>>()
            } else {
                vec![e.file_name().to_string_lossy().into_owned()]
            }
        })
        .filter(|p| !p.starts_with(".btrack.db"))
        .collect();

    let unchanged: BTreeSet<_> = tree.difference(&changed).cloned().collect();
    assert_eq!(unchanged.len(), 7);
    assert!(changed.is_subset(&tree));

    // Every prior path is deleted, moved away or still present under its name
    let mut accounted: BTreeSet<String> = delta.deleted.iter().cloned().collect();
    accounted.extend(delta.moved.iter().map(|m| m.old_path.clone()));
    accounted.extend(prior.intersection(&tree).cloned());
    assert_eq!(accounted, prior);
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_skipped_not_deleted() {
    use std::os::unix::fs::PermissionsExt;

    let mut h = BtrackTestHarness::new();
    h.write("secret.txt", b"secret", T1);
    h.write("open.txt", b"open", T1);
    h.commit();

    let secret = h.root().join("secret.txt");
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read(&secret).is_ok() {
        // Running as root; permissions are not enforced
        return;
    }

    let delta = h.scan();
    assert!(delta.deleted.is_empty());
    assert_eq!(delta.skipped.len(), 1);
    assert_eq!(delta.skipped[0].path, "secret.txt");

    fs::set_permissions(&secret, fs::Permissions::from_mode(0o644)).unwrap();
}

#[test]
fn test_reopen_after_relocation() {
    let mut h = BtrackTestHarness::new();
    h.write("keep/a.txt", b"a", T1);
    h.commit();
    let db = h.tracker.config().db_path.clone();
    drop(h.tracker);

    let moved_root = TempDir::new().unwrap();
    let new_root = moved_root.path().join("relocated");
    fs::rename(h.temp_dir.path(), &new_root).unwrap();
    assert!(!db.exists());

    let tracker = Tracker::open(new_root.clone()).unwrap();
    assert_eq!(tracker.root_path(), new_root.as_path());
    assert!(tracker.scan().unwrap().is_empty());
}
