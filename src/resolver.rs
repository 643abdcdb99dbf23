//! Locate a file by name across an ordered list of directories

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::common::{Result, TrapError};

/// Ordered set of directories searched for a bare file name
///
/// The first directory containing a regular file with the requested name
/// wins. The default order is `videos/`, `data/`, then the current directory;
/// a preferred directory can be put in front of those.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResolver {
    search_dirs: Vec<PathBuf>,
}

impl FileResolver {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// Default search order with `preferred` tried first when given
    pub fn with_preferred(preferred: Option<&Path>) -> Self {
        let mut search_dirs = Vec::with_capacity(4);
        if let Some(dir) = preferred {
            search_dirs.push(dir.to_path_buf());
        }
        search_dirs.extend([PathBuf::from("videos"), PathBuf::from("data"), PathBuf::from(".")]);
        Self { search_dirs }
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Find `name` in the first directory that has it
    ///
    /// Names that could escape the search directories (path separators,
    /// `.` or `..`, empty) are reported as not found.
    #[instrument(skip(self))]
    pub fn locate(&self, name: &str) -> Result<PathBuf> {
        if !is_plain_file_name(name) {
            debug!("Rejected file name {:?}", name);
            return Err(TrapError::not_found(name));
        }

        self.search_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .inspect(|found| debug!("Resolved {} -> {}", name, found.display()))
            .ok_or_else(|| TrapError::not_found(name))
    }
}

impl Default for FileResolver {
    fn default() -> Self {
        Self::with_preferred(None)
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_search_order() {
        let resolver = FileResolver::default();
        assert_eq!(
            resolver.search_dirs(),
            &[PathBuf::from("videos"), PathBuf::from("data"), PathBuf::from(".")]
        );

        let resolver = FileResolver::with_preferred(Some(Path::new("/srv/clips")));
        assert_eq!(resolver.search_dirs()[0], PathBuf::from("/srv/clips"));
        assert_eq!(resolver.search_dirs().len(), 4);
    }

    #[test]
    fn test_first_match_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("a.mp4"), b"first").unwrap();
        fs::write(second.path().join("a.mp4"), b"second").unwrap();
        fs::write(second.path().join("b.mp4"), b"only second").unwrap();

        let resolver = FileResolver::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);

        assert_eq!(resolver.locate("a.mp4").unwrap(), first.path().join("a.mp4"));
        assert_eq!(resolver.locate("b.mp4").unwrap(), second.path().join("b.mp4"));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FileResolver::new(vec![dir.path().to_path_buf()]);

        let err = resolver.locate("nothing.mp4").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_directories_are_not_matches() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("clip.mp4")).unwrap();
        let resolver = FileResolver::new(vec![dir.path().to_path_buf()]);

        assert!(resolver.locate("clip.mp4").is_err());
    }

    #[test]
    fn test_traversal_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FileResolver::new(vec![dir.path().join("inner")]);

        for name in ["", "..", "../secret.mp4", "a/b.mp4", "a\\b.mp4"] {
            assert!(resolver.locate(name).unwrap_err().is_not_found(), "{:?}", name);
        }
    }

    #[test]
    fn test_double_dots_inside_name_allowed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("fox..night.mp4"), b"clip").unwrap();
        let resolver = FileResolver::new(vec![dir.path().to_path_buf()]);

        assert_eq!(resolver.locate("fox..night.mp4").unwrap(), dir.path().join("fox..night.mp4"));
        assert!(resolver.locate("../fox..night.mp4").is_err());
    }
}
