//! Small standalone helpers: directory creation and indented printing
//!
//! These are used by tools that write generated output to disk and by the
//! bridge's human-readable state dump.

use std::fmt;
use std::fs;
use std::io;

/// Make sure `path` exists as a directory, creating missing ancestors.
///
/// Both `/` and `\` separate path segments. If the path has a drive prefix
/// (`C:`), scanning for ancestors starts at the colon. Failures while creating
/// ancestors are ignored; only the creation of `path` itself decides the
/// result, with "already exists" counted as success. Ancestors created before
/// a failure are left in place.
pub fn make_directory(path: &str) -> bool {
    let dir = path.replace('\\', "/");

    let mut pos = dir.find(':').unwrap_or(0);
    while let Some(found) = dir[pos..].find('/') {
        let slash = pos + found;
        let ancestor = &dir[..slash];
        if !ancestor.is_empty() {
            if let Err(e) = fs::create_dir(ancestor) {
                if e.kind() != io::ErrorKind::AlreadyExists {
                    log::trace!("Could not create ancestor {:?}: {}", ancestor, e);
                }
            }
        }
        pos = slash + 1;
    }

    match fs::create_dir(&dir) {
        Ok(()) => {
            log::debug!("Created directory {:?}", dir);
            true
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => true,
        Err(e) => {
            log::debug!("Failed to create directory {:?}: {}", dir, e);
            false
        }
    }
}

/// Indentation level for nested, human-readable dumps
///
/// Displays as `level` spaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Indent(usize);

impl Indent {
    pub const fn new(level: usize) -> Self {
        Self(level)
    }

    pub fn level(&self) -> usize {
        self.0
    }

    /// The indentation for nested content
    pub fn next(self) -> Self {
        Self(self.0 + 2)
    }
}

impl fmt::Display for Indent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const BLOCK: &str = "        ";
        for _ in 0..self.0 / BLOCK.len() {
            f.write_str(BLOCK)?;
        }
        for _ in 0..self.0 % BLOCK.len() {
            f.write_str(" ")?;
        }
        Ok(())
    }
}
