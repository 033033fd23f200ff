//! Main test module for btrack
//!
//! This module includes all test suites:
//! - Integration tests for realistic tree histories
//! - Property-based tests for the classification invariants
//! - Edge cases below

pub mod integration;

#[cfg(test)]
mod edge_cases {
    use ::btrack::*;
    use filetime::{set_file_mtime, FileTime};
    use std::fs;
    use tempfile::TempDir;

    fn pinned(path: &std::path::Path, content: &str, secs: i64) {
        fs::write(path, content).unwrap();
        set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let mut tracker = Tracker::init(temp_dir.path().to_path_buf()).unwrap();

        let delta = tracker.scan().unwrap();
        assert!(delta.is_empty());
        assert_eq!(tracker.commit(&delta).unwrap().total_rows(), 0);

        fs::write(temp_dir.path().join("file.txt"), "content").unwrap();
        let delta = tracker.scan().unwrap();
        assert_eq!(delta.created.len(), 1);
    }

    #[test]
    fn test_special_filenames() {
        let temp_dir = TempDir::new().unwrap();
        let names = [
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file_with_underscores.txt",
            "file.multiple.dots.txt",
            "日本語.txt",
            "émoji-🦀.txt",
        ];
        for name in &names {
            fs::write(temp_dir.path().join(name), name).unwrap();
        }

        let mut tracker = Tracker::init(temp_dir.path().to_path_buf()).unwrap();
        let delta = tracker.scan().unwrap();
        assert_eq!(delta.created.len(), names.len());
        tracker.commit(&delta).unwrap();

        for name in &names {
            assert!(
                tracker.store().record_by_path(name).unwrap().is_some(),
                "missing record for {}",
                name
            );
        }
        assert!(tracker.scan().unwrap().is_empty());
    }

    #[test]
    fn test_empty_file_content() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("empty"), "").unwrap();

        let tracker = Tracker::init(temp_dir.path().to_path_buf()).unwrap();
        let delta = tracker.scan().unwrap();
        assert_eq!(
            delta.created[0].content_hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_two_empty_files_renamed_together() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        pinned(&root.join("a"), "", 1_000);
        pinned(&root.join("b"), "", 1_000);

        let mut tracker = Tracker::init(root.to_path_buf()).unwrap();
        let delta = tracker.scan().unwrap();
        tracker.commit(&delta).unwrap();

        fs::rename(root.join("a"), root.join("c")).unwrap();
        fs::rename(root.join("b"), root.join("d")).unwrap();

        let delta = tracker.scan().unwrap();
        assert_eq!(delta.moved.len(), 2);
        assert!(delta.created.is_empty());
        assert!(delta.deleted.is_empty());

        // Same content everywhere: the lowest unmatched path is taken first
        assert_eq!(delta.moved[0], FileMovement::new("a", "c"));
        assert_eq!(delta.moved[1], FileMovement::new("b", "d"));
    }

    #[test]
    fn test_deeply_nested_paths() {
        let temp_dir = TempDir::new().unwrap();
        let mut dir = temp_dir.path().to_path_buf();
        for level in 0..20 {
            dir = dir.join(format!("level{}", level));
        }
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("deep.txt"), "deep").unwrap();

        let tracker = Tracker::init(temp_dir.path().to_path_buf()).unwrap();
        let delta = tracker.scan().unwrap();
        assert_eq!(delta.created.len(), 1);
        assert!(delta.created[0].path.starts_with("level0/level1/"));
        assert!(delta.created[0].path.ends_with("/level19/deep.txt"));
    }

    #[test]
    fn test_database_never_tracks_itself() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("data.bin"), [0u8; 64]).unwrap();

        let mut tracker = Tracker::init(temp_dir.path().to_path_buf()).unwrap();
        for _ in 0..3 {
            let delta = tracker.scan().unwrap();
            tracker.commit(&delta).unwrap();
        }

        let records = tracker.store().all_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, "data.bin");
    }

    #[test]
    fn test_btrackignore_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join(".btrackignore"), "*.log\n").unwrap();
        fs::write(root.join("keep.txt"), "keep").unwrap();
        fs::write(root.join("noise.log"), "noise").unwrap();

        let tracker = Tracker::init(root.to_path_buf()).unwrap();
        let delta = tracker.scan().unwrap();
        let paths: Vec<_> = delta.created.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec![".btrackignore", "keep.txt"]);
    }

    #[test]
    fn test_max_file_size_skips_large_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("small"), [1u8; 10]).unwrap();
        fs::write(root.join("large"), [1u8; 4096]).unwrap();

        let tracker = TrackerBuilder::new()
            .max_file_size(1024)
            .init(root.to_path_buf())
            .unwrap();
        let delta = tracker.scan().unwrap();
        assert_eq!(delta.created.len(), 1);
        assert_eq!(delta.created[0].path, "small");
        assert_eq!(delta.skipped.len(), 1);
        assert_eq!(delta.skipped[0].path, "large");
    }

    #[test]
    fn test_tracked_file_growing_past_limit_is_not_deleted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        pinned(&root.join("log.bin"), "0123456789", 1_000);

        let mut tracker = TrackerBuilder::new()
            .max_file_size(100)
            .init(root.to_path_buf())
            .unwrap();
        let delta = tracker.scan().unwrap();
        tracker.commit(&delta).unwrap();

        pinned(&root.join("log.bin"), &"x".repeat(200), 2_000);
        let delta = tracker.scan().unwrap();
        assert!(delta.deleted.is_empty());
        assert_eq!(delta.skipped.len(), 1);
        assert_eq!(delta.skipped[0].path, "log.bin");

        tracker.commit(&delta).unwrap();
        assert!(tracker.store().record_by_path("log.bin").unwrap().is_some());
    }

    #[test]
    fn test_delta_serializes_to_json() {
        let temp_dir = TempDir::new().unwrap();
        pinned(&temp_dir.path().join("a.txt"), "a", 1_700_000_000);

        let tracker = Tracker::init(temp_dir.path().to_path_buf()).unwrap();
        let delta = tracker.scan().unwrap();

        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(json["created"][0]["path"], "a.txt");
        assert_eq!(json["created"][0]["file_mod_time"], "2023-11-14 22:13:20");

        let back: Delta = serde_json::from_value(json).unwrap();
        assert_eq!(back, delta);
    }
}
