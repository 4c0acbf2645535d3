//! Where `.INCLUDE` and `.IMPORT` find their files.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub trait SourceProvider {
  /// The canonical path for `name`. Two names for the same file must resolve equal.
  fn resolve(&self, name: &str) -> PathBuf;
  fn load(&self, path: &Path) -> io::Result<String>;
}

/// Reads from disk, trying each search directory in order before the working directory.
#[derive(Clone, Debug, Default)]
pub struct FileSystemSources {
  search_paths: Vec<PathBuf>
}

impl FileSystemSources {
  pub fn new() -> FileSystemSources {
    FileSystemSources::default()
  }

  pub fn with_search_path<P: Into<PathBuf>>(mut self, directory: P) -> FileSystemSources {
    self.search_paths.push(directory.into());
    self
  }

  pub fn add_search_path<P: Into<PathBuf>>(&mut self, directory: P) {
    self.search_paths.push(directory.into());
  }
}

impl SourceProvider for FileSystemSources {
  fn resolve(&self, name: &str) -> PathBuf {
    let candidate = Path::new(name);
    let found = match candidate.is_absolute() {
      true  => candidate.to_path_buf(),
      false => {
        self.search_paths
            .iter()
            .map(|directory| directory.join(candidate))
            .find(|path| path.is_file())
            .unwrap_or_else(|| candidate.to_path_buf())
      }
    };
    fs::canonicalize(&found).unwrap_or(found)
  }

  fn load(&self, path: &Path) -> io::Result<String> {
    fs::read_to_string(path)
  }
}

/// Sources held in memory, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct MemorySources {
  files: HashMap<PathBuf, String>
}

impl MemorySources {
  pub fn new() -> MemorySources {
    MemorySources::default()
  }

  pub fn with_file(mut self, name: &str, text: &str) -> MemorySources {
    self.insert(name, text);
    self
  }

  pub fn insert(&mut self, name: &str, text: &str) {
    self.files.insert(PathBuf::from(name.trim()), text.to_string());
  }
}

impl SourceProvider for MemorySources {
  fn resolve(&self, name: &str) -> PathBuf {
    PathBuf::from(name.trim())
  }

  fn load(&self, path: &Path) -> io::Result<String> {
    self.files
        .get(path)
        .cloned()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no source named {}", path.display())))
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn memory_sources(){
    let sources = MemorySources::new().with_file("macros.inc", ".SET ONE, 1");
    let path = sources.resolve(" macros.inc ");
    assert_eq!(sources.load(&path).unwrap(), ".SET ONE, 1");
    assert!(sources.load(Path::new("missing.inc")).is_err());
  }

  #[test]
  fn search_paths_are_tried_in_order(){
    let directory = std::env::temp_dir().join(format!("wordcpu-sources-{}", std::process::id()));
    fs::create_dir_all(&directory).unwrap();
    fs::write(directory.join("lib.asm"), "LEAVE\n").unwrap();

    let sources = FileSystemSources::new().with_search_path("/nonexistent").with_search_path(&directory);
    let path = sources.resolve("lib.asm");
    assert_eq!(path, fs::canonicalize(directory.join("lib.asm")).unwrap());
    assert_eq!(sources.load(&path).unwrap(), "LEAVE\n");

    fs::remove_dir_all(&directory).unwrap();
  }
}
