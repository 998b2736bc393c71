use super::plan::PlannedSegment;
use std::path::{Path, PathBuf};

/// A segment materialised on local disk, waiting for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFile {
    pub index: usize,
    pub path: PathBuf,
    /// Stable name, also used as the uploaded object's name
    pub name: String,
}

/// `{base}_{index:03}.{ext}`
pub fn segment_name(base: &str, index: usize, ext: &str) -> String {
    format!("{}_{:03}.{}", base, index, ext)
}

impl SegmentFile {
    pub fn planned(dir: &Path, base: &str, ext: &str, segment: &PlannedSegment) -> Self {
        let name = segment_name(base, segment.index, ext);
        Self {
            index: segment.index,
            path: dir.join(&name),
            name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_name_is_zero_padded() {
        assert_eq!(segment_name("rec42", 0, "mp4"), "rec42_000.mp4");
        assert_eq!(segment_name("rec42", 7, "mov"), "rec42_007.mov");
        assert_eq!(segment_name("rec42", 1234, "mp4"), "rec42_1234.mp4");
    }

    #[test]
    fn test_planned_file_lives_in_dir() {
        let seg = PlannedSegment {
            index: 3,
            start: 180.0,
            length: 60.0,
        };
        let file = SegmentFile::planned(Path::new("/scratch"), "recA", "mp4", &seg);
        assert_eq!(file.path, PathBuf::from("/scratch/recA_003.mp4"));
        assert_eq!(file.name, "recA_003.mp4");
        assert_eq!(file.index, 3);
    }
}
