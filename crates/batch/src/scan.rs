//! Source directory scanning
//!
//! Turns a directory into an ordered source list: every media file beneath it,
//! filtered by kind and sorted so repeated runs see the same order.

use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Video file extensions (case-insensitive matching).
pub const VIDEO_EXTENSIONS: &[&str] = &[".mkv", ".mp4", ".avi", ".mov", ".m4v", ".ts", ".webm"];

/// Image file extensions (case-insensitive matching).
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".bmp"];

/// Which files a scan keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    fn extensions(self) -> &'static [&'static str] {
        match self {
            MediaKind::Video => VIDEO_EXTENSIONS,
            MediaKind::Image => IMAGE_EXTENSIONS,
        }
    }

    /// Checks if `path` has one of this kind's extensions.
    pub fn matches(self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext_lower = format!(".{}", ext.to_lowercase());
                self.extensions().contains(&ext_lower.as_str())
            })
            .unwrap_or(false)
    }
}

/// Scans `dir` recursively for files of `kind`.
///
/// - Skips hidden directories (names starting with `.`) below the root
/// - Filters by extension, case-insensitive
/// - Returns paths sorted lexicographically
///
/// # Errors
/// Returns `NotFound` if `dir` is not a directory. Unreadable entries below
/// the root are skipped.
pub fn scan_sources(dir: &Path, kind: MediaKind) -> Result<Vec<PathBuf>, io::Error> {
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source directory not found: {}", dir.display()),
        ));
    }

    let walker = WalkDir::new(dir).into_iter().filter_entry(|entry| {
        if entry.depth() > 0 && entry.file_type().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                return !name.starts_with('.');
            }
        }
        true
    });

    let mut paths: Vec<PathBuf> = walker
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file() && kind.matches(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    #[test]
    fn test_kind_matching() {
        assert!(MediaKind::Video.matches(Path::new("/media/clip.MP4")));
        assert!(MediaKind::Video.matches(Path::new("/media/clip.webm")));
        assert!(!MediaKind::Video.matches(Path::new("/media/cover.png")));
        assert!(MediaKind::Image.matches(Path::new("/media/cover.JPG")));
        assert!(!MediaKind::Image.matches(Path::new("/media/clip.mkv")));
        assert!(!MediaKind::Image.matches(Path::new("/media/noext")));
    }

    #[test]
    fn test_scan_sorts_and_filters() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("b")).unwrap();
        File::create(root.join("b/02.mp4")).unwrap();
        File::create(root.join("b/01.mov")).unwrap();
        File::create(root.join("a.mkv")).unwrap();
        File::create(root.join("notes.txt")).unwrap();
        File::create(root.join("cover.png")).unwrap();

        let videos = scan_sources(root, MediaKind::Video).unwrap();
        assert_eq!(
            videos,
            vec![root.join("a.mkv"), root.join("b/01.mov"), root.join("b/02.mp4")]
        );

        let images = scan_sources(root, MediaKind::Image).unwrap();
        assert_eq!(images, vec![root.join("cover.png")]);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = scan_sources(&temp_dir.path().join("missing"), MediaKind::Video).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_hidden_root_is_scanned() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join(".clips");
        fs::create_dir_all(&root).unwrap();
        File::create(root.join("x.mp4")).unwrap();

        assert_eq!(scan_sources(&root, MediaKind::Video).unwrap().len(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_hidden_directory_exclusion(
            visible_dir in "[a-zA-Z0-9]{1,10}",
            hidden_dir in "\\.[a-zA-Z0-9]{1,10}",
            filename in "[a-zA-Z0-9]{1,10}",
        ) {
            let temp_dir = TempDir::new().unwrap();
            let root = temp_dir.path();

            let visible_path = root.join(&visible_dir);
            fs::create_dir_all(&visible_path).unwrap();
            let visible_video = visible_path.join(format!("{}.mp4", filename));
            File::create(&visible_video).unwrap();

            let hidden_path = root.join(&hidden_dir);
            fs::create_dir_all(&hidden_path).unwrap();
            let hidden_video = hidden_path.join(format!("{}.mp4", filename));
            File::create(&hidden_video).unwrap();

            let found = scan_sources(root, MediaKind::Video).unwrap();

            prop_assert!(found.contains(&visible_video));
            prop_assert!(!found.contains(&hidden_video));
        }
    }
}
