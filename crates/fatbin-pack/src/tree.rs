//! In-memory model of a packaged directory tree.
//!
//! A [`Directory`] mirrors a real filesystem subtree. Every name stored in
//! the tree is relative to the packaged root and uses `/` as separator, so
//! the same string serves as archive key and as on-disk path at extraction
//! time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};
use walkdir::WalkDir;

use crate::{PackError, Result};

/// A directory of the packaged tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    /// Path relative to the tree root (empty for the root itself).
    pub name: String,

    /// Files keyed by their base name.
    #[serde(default)]
    pub files: BTreeMap<String, FileEntry>,

    /// Subdirectories keyed by their base name.
    #[serde(default)]
    pub directories: BTreeMap<String, Directory>,

    /// Unix mode as an octal string (advisory).
    #[serde(default)]
    pub perm: String,
}

/// A file of the packaged tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the tree root.
    pub name: String,

    /// Unix mode as an octal string (advisory, only the executable bits are honored).
    #[serde(default)]
    pub perm: String,

    /// Payload size in bytes.
    #[serde(default)]
    pub size: u64,
}

impl FileEntry {
    /// Create an entry with no permission information.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            perm: String::new(),
            size: 0,
        }
    }

    /// Whether any executable bit is set in `perm`.
    pub fn is_executable(&self) -> bool {
        u32::from_str_radix(&self.perm, 8)
            .map(|mode| mode & 0o111 != 0)
            .unwrap_or(false)
    }
}

impl Directory {
    /// Create an empty directory.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Scan a directory on disk into a tree.
    ///
    /// Entries are visited in file name order. Symbolic links are followed;
    /// anything that is neither a regular file nor a directory is skipped.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(PackError::NotADirectory(root.to_path_buf()));
        }

        let mut tree = Directory::new("");
        tree.perm = perm_string(&fs::metadata(root)?);

        for entry in WalkDir::new(root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                PackError::FileReadFailure {
                    path,
                    source: e.into(),
                }
            })?;

            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let components = relative_components(relative).ok_or_else(|| {
                PackError::FileReadFailure {
                    path: entry.path().to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "path is not valid UTF-8",
                    ),
                }
            })?;
            let Some((base, parents)) = components.split_last() else {
                continue;
            };

            let metadata = entry.metadata().map_err(|e| PackError::FileReadFailure {
                path: entry.path().to_path_buf(),
                source: e.into(),
            })?;

            // Parents are always visited before their children.
            let parent = tree.subdirectory_mut(parents).ok_or_else(|| {
                PackError::FileReadFailure {
                    path: entry.path().to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "parent directory was not scanned",
                    ),
                }
            })?;
            let name = components.join("/");

            if metadata.is_dir() {
                let mut dir = Directory::new(name);
                dir.perm = perm_string(&metadata);
                parent.directories.insert(base.to_string(), dir);
            } else if metadata.is_file() {
                parent.files.insert(
                    base.to_string(),
                    FileEntry {
                        name,
                        perm: perm_string(&metadata),
                        size: metadata.len(),
                    },
                );
            } else {
                tracing::debug!(path = %entry.path().display(), "skipping special file");
            }
        }

        Ok(tree)
    }

    fn subdirectory_mut(&mut self, components: &[String]) -> Option<&mut Directory> {
        let mut dir = self;
        for component in components {
            dir = dir.directories.get_mut(component)?;
        }
        Some(dir)
    }

    /// All files of the tree, depth-first, files of a directory before its subdirectories.
    pub fn walk_files(&self) -> Vec<&FileEntry> {
        let mut files = Vec::new();
        self.collect_files(&mut files);
        files
    }

    fn collect_files<'a>(&'a self, out: &mut Vec<&'a FileEntry>) {
        out.extend(self.files.values());
        for dir in self.directories.values() {
            dir.collect_files(out);
        }
    }

    /// Number of files in the whole tree.
    pub fn file_count(&self) -> usize {
        self.files.len()
            + self
                .directories
                .values()
                .map(Directory::file_count)
                .sum::<usize>()
    }

    /// Number of directories below this one.
    pub fn directory_count(&self) -> usize {
        self.directories.len()
            + self
                .directories
                .values()
                .map(Directory::directory_count)
                .sum::<usize>()
    }
}

fn relative_components(path: &Path) -> Option<Vec<String>> {
    path.components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str().map(str::to_string),
            _ => None,
        })
        .collect()
}

#[cfg(unix)]
fn perm_string(metadata: &fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:o}", metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn perm_string(_metadata: &fs::Metadata) -> String {
    String::new()
}
