use std::path::{Path, PathBuf};

/// Host collaborator deciding whether a directory belongs to a project.
pub trait ProjectDetector: Send + Sync {
    /// The project root containing `dir`, if any.
    fn detect(&self, dir: &Path) -> Option<PathBuf>;
}

/// Finds the nearest ancestor (or `dir` itself) holding a marker file.
#[derive(Debug, Clone)]
pub struct MarkerFileDetector {
    marker: String,
}

impl MarkerFileDetector {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl ProjectDetector for MarkerFileDetector {
    fn detect(&self, dir: &Path) -> Option<PathBuf> {
        dir.ancestors()
            .find(|candidate| candidate.join(&self.marker).is_file())
            .map(Path::to_path_buf)
    }
}

/// Treats every directory as a project, or none.
#[derive(Debug, Clone, Copy)]
pub struct FixedProject(pub bool);

impl ProjectDetector for FixedProject {
    fn detect(&self, dir: &Path) -> Option<PathBuf> {
        self.0.then(|| dir.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_marker_in_ancestor() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("stratus.toml"), "").unwrap();
        let nested = root.path().join("src").join("pages");
        fs::create_dir_all(&nested).unwrap();

        let detector = MarkerFileDetector::new("stratus.toml");
        assert_eq!(detector.detect(&nested), Some(root.path().to_path_buf()));
    }

    #[test]
    fn test_no_marker() {
        let dir = tempfile::tempdir().unwrap();
        let detector = MarkerFileDetector::new("definitely-not-here.marker");
        assert_eq!(detector.detect(dir.path()), None);
    }

    #[test]
    fn test_marker_directory_does_not_count() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("stratus.toml")).unwrap();
        let detector = MarkerFileDetector::new("stratus.toml");
        assert_eq!(detector.detect(dir.path()), None);
    }
}
