//! The pair of synchronized roots and root-relative path translation
//!
//! Paths are translated between the two roots by stripping the origin root
//! and joining the remainder onto the other root. This is component-wise:
//! `/data/in` never matches `/data/input/file.txt`.

use std::{
    fmt,
    path::{Component, Path, PathBuf},
};

use super::{errors::DomainError, mode::SyncMode};

/// Which of the two roots a path belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The priority root
    Input,
    /// The mirror root
    Output,
}

impl Side {
    /// The other side
    pub fn opposite(self) -> Side {
        match self {
            Side::Input => Side::Output,
            Side::Output => Side::Input,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Input => f.write_str("input"),
            Side::Output => f.write_str("output"),
        }
    }
}

/// Input and output roots, resolved from two configured folders and a mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPair {
    input: PathBuf,
    output: PathBuf,
}

impl RootPair {
    /// Resolves the input/output roots for `mode`
    ///
    /// Both folders are made absolute (relative paths are taken from the
    /// current directory) and lexically normalized. They must be non-blank
    /// and must not overlap.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidPath`] for blank paths and
    /// [`DomainError::OverlappingRoots`] when one root contains the other.
    pub fn new(
        folder1: impl AsRef<Path>,
        folder2: impl AsRef<Path>,
        mode: SyncMode,
    ) -> Result<Self, DomainError> {
        let first = absolutize(folder1.as_ref())?;
        let second = absolutize(folder2.as_ref())?;

        if first.starts_with(&second) || second.starts_with(&first) {
            return Err(DomainError::OverlappingRoots {
                first: first.display().to_string(),
                second: second.display().to_string(),
            });
        }

        let (input, output) = if mode.second_is_input() {
            (second, first)
        } else {
            (first, second)
        };

        Ok(Self { input, output })
    }

    /// The priority root
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// The mirror root
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Root for the given side
    pub fn root(&self, side: Side) -> &Path {
        match side {
            Side::Input => &self.input,
            Side::Output => &self.output,
        }
    }

    /// Determines which root `path` lives under
    pub fn side_of(&self, path: &Path) -> Option<Side> {
        if path.starts_with(&self.input) {
            Some(Side::Input)
        } else if path.starts_with(&self.output) {
            Some(Side::Output)
        } else {
            None
        }
    }

    /// Path relative to whichever root contains it
    pub fn relative(&self, path: &Path) -> Option<PathBuf> {
        let side = self.side_of(path)?;
        path.strip_prefix(self.root(side))
            .ok()
            .map(Path::to_path_buf)
    }

    /// Location of `path` under the opposite root
    ///
    /// # Errors
    /// Returns [`DomainError::PathNotInRoot`] when `path` is under neither root.
    pub fn counterpart(&self, path: &Path) -> Result<PathBuf, DomainError> {
        let side = self
            .side_of(path)
            .ok_or_else(|| DomainError::PathNotInRoot(path.display().to_string()))?;
        self.translate(path, side.opposite())
    }

    /// Location of `path` under the root for `side`
    ///
    /// A path already under `side` is returned unchanged.
    ///
    /// # Errors
    /// Returns [`DomainError::PathNotInRoot`] when `path` is under neither root.
    pub fn translate(&self, path: &Path, side: Side) -> Result<PathBuf, DomainError> {
        let origin = self
            .side_of(path)
            .ok_or_else(|| DomainError::PathNotInRoot(path.display().to_string()))?;
        if origin == side {
            return Ok(path.to_path_buf());
        }
        let relative = path
            .strip_prefix(self.root(origin))
            .map_err(|_| DomainError::PathNotInRoot(path.display().to_string()))?;
        if relative.as_os_str().is_empty() {
            Ok(self.root(side).to_path_buf())
        } else {
            Ok(self.root(side).join(relative))
        }
    }

    /// Returns a pair with both roots replaced by their canonical forms
    ///
    /// Both roots must exist. Notification backends report canonical paths on
    /// some platforms, so the service canonicalizes once the roots are created.
    pub fn canonicalized(&self) -> std::io::Result<Self> {
        Ok(Self {
            input: std::fs::canonicalize(&self.input)?,
            output: std::fs::canonicalize(&self.output)?,
        })
    }
}

/// Makes `path` absolute and resolves `.` / `..` lexically
fn absolutize(path: &Path) -> Result<PathBuf, DomainError> {
    if path.as_os_str().is_empty() || path.to_string_lossy().trim().is_empty() {
        return Err(DomainError::InvalidPath("path must not be blank".to_string()));
    }

    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(|e| {
            DomainError::InvalidPath(format!(
                "cannot resolve relative path {}: {e}",
                path.display()
            ))
        })?;
        cwd.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::Prefix(p) => normalized.push(p.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(DomainError::InvalidPath(format!(
                        "path escapes the filesystem root: {}",
                        path.display()
                    )));
                }
            }
            Component::Normal(c) => normalized.push(c),
        }
    }

    Ok(normalized)
}
