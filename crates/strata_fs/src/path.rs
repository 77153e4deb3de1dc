//! Backend-independent path model.
//!
//! A [`VfsPath`] is always absolute within one filesystem root. `.` segments
//! and empty segments are dropped, `..` is resolved at construction and may
//! never climb above the root.

use std::fmt;
use std::str::FromStr;

use crate::spec::PathError;

/// Canonical slash-delimited path inside a filesystem root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VfsPath {
    l_segments: Vec<String>,
}

impl VfsPath {
    /// The root path, rendered as `/`.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse and normalize a path string.
    ///
    /// A leading `/` is optional: every path is interpreted from the root.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let mut l_segments: Vec<String> = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if l_segments.pop().is_none() {
                        return Err(PathError::EscapesRoot {
                            path: raw.to_string(),
                        });
                    }
                }
                _ => {
                    validate_segment(raw, segment)?;
                    l_segments.push(segment.to_string());
                }
            }
        }
        Ok(Self { l_segments })
    }

    /// Append one entry name. The name must be a single valid segment.
    pub fn child(&self, name: &str) -> Result<Self, PathError> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(PathError::InvalidSegment {
                path: self.to_string(),
                segment: name.to_string(),
            });
        }
        validate_segment(name, name)?;
        let mut l_segments = self.l_segments.clone();
        l_segments.push(name.to_string());
        Ok(Self { l_segments })
    }

    /// Resolve a relative path string against `self`.
    ///
    /// `..` may walk back up to, but never above, the filesystem root.
    pub fn join_str(&self, relative: &str) -> Result<Self, PathError> {
        let mut l_segments = self.l_segments.clone();
        for segment in relative.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if l_segments.pop().is_none() {
                        return Err(PathError::EscapesRoot {
                            path: format!("{self}/{relative}"),
                        });
                    }
                }
                _ => {
                    validate_segment(relative, segment)?;
                    l_segments.push(segment.to_string());
                }
            }
        }
        Ok(Self { l_segments })
    }

    /// Concatenate a normalized path below `self`.
    pub fn join(&self, relative: &VfsPath) -> Self {
        let mut l_segments = Vec::with_capacity(self.l_segments.len() + relative.l_segments.len());
        l_segments.extend(self.l_segments.iter().cloned());
        l_segments.extend(relative.l_segments.iter().cloned());
        Self { l_segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.l_segments
    }

    /// Number of segments below the root.
    pub fn depth(&self) -> usize {
        self.l_segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.l_segments.is_empty()
    }

    /// Last segment, `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.l_segments.last().map(String::as_str)
    }

    /// Parent directory, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.l_segments.is_empty() {
            return None;
        }
        Some(Self {
            l_segments: self.l_segments[..self.l_segments.len() - 1].to_vec(),
        })
    }

    /// All proper ancestors from the root downwards, excluding `self`.
    pub fn ancestors(&self) -> Vec<Self> {
        (0..self.l_segments.len())
            .map(|n_len| Self {
                l_segments: self.l_segments[..n_len].to_vec(),
            })
            .collect()
    }

    /// Segment-wise prefix test; every path starts with the root.
    pub fn starts_with(&self, base: &VfsPath) -> bool {
        self.l_segments.starts_with(&base.l_segments)
    }

    /// Path of `self` relative to `base`, if `base` is an ancestor or equal.
    pub fn strip_prefix(&self, base: &VfsPath) -> Option<Self> {
        if !self.starts_with(base) {
            return None;
        }
        Some(Self {
            l_segments: self.l_segments[base.l_segments.len()..].to_vec(),
        })
    }

    /// `true` when either path contains the other.
    pub fn is_overlapping(&self, other: &VfsPath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

fn validate_segment(raw: &str, segment: &str) -> Result<(), PathError> {
    if segment.contains('\0') {
        return Err(PathError::InvalidSegment {
            path: raw.to_string(),
            segment: segment.to_string(),
        });
    }
    Ok(())
}

/// Normalize a path string into its canonical rendering.
pub fn normalize(raw: &str) -> Result<String, PathError> {
    VfsPath::parse(raw).map(|path| path.to_string())
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.l_segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.l_segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for VfsPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for VfsPath {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}
