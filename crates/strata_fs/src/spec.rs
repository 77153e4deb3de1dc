//! Traversal/copy/mirror option models, policy enums and error types.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::info::SpecNamespaces;
use crate::path::VfsPath;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Pattern matching mode for include/exclude lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumPatternMode {
    /// Shell-like wildcards (`*`, `?`, character classes).
    Glob,
    /// Regular expression pattern.
    Regex,
    /// Substring match.
    Literal,
}

/// Order in which the walker visits directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumWalkOrder {
    /// A directory is emitted before any of its descendants.
    DepthFirst,
    /// All directories of one level are emitted before the next level.
    BreadthFirst,
    /// A directory is emitted after all of its descendants.
    DepthFirstPostOrder,
}

/// What to do when a backend call fails mid-traversal or mid-copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumErrorPolicy {
    /// Abort the whole operation with the first error.
    Raise,
    /// Skip the failing entry or subtree silently.
    Ignore,
    /// Record the error and continue.
    Collect,
}

/// Existing destination file conflict policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumCopyFileConflictStrategy {
    /// Keep destination file and skip current source file.
    Skip,
    /// Replace destination file with source file.
    Overwrite,
    /// Replace destination file only when the source was modified later.
    OverwriteIfNewer,
    /// Record an error and skip this file.
    Error,
}

/// Existing destination directory conflict policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumCopyDirectoryConflictStrategy {
    /// Do not descend/copy into an already existing destination directory.
    Skip,
    /// Reuse destination directory and continue copying children into it.
    Merge,
    /// Record an error when destination directory already exists.
    Error,
}

/// How the mirror engine decides that a file present on both sides is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumMirrorCompareRule {
    /// Size differs, or modified times differ by more than the tolerance.
    Exact,
    /// Size differs, or destination is older than source by more than the tolerance.
    DestinationOlder,
    /// Size differs.
    SizeOnly,
}

/// Mirror operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumDiffKind {
    CreateDir,
    CreateFile,
    UpdateFile,
    DeleteDir,
    DeleteFile,
}

/// Why the mirror engine produced a diff entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumDiffReason {
    MissingOnDestination,
    SizeMismatch,
    ModifiedTimeMismatch,
    DestinationOlder,
    MissingOnSource,
    /// A file on one side has the name of a directory on the other.
    KindMismatch,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Options

/// Walker options.
#[derive(Debug, Clone)]
pub struct SpecWalkOptions {
    /// Directories deeper than this many levels below the root are not listed.
    pub depth_limit: Option<usize>,
    /// Directory visiting order.
    pub rule_order: EnumWalkOrder,
    /// Patterns applied to directory names; matches are never descended into.
    pub patterns_exclude_dirs: Option<Vec<String>>,
    /// Patterns applied to file names; matches are not yielded.
    pub patterns_exclude_files: Option<Vec<String>>,
    /// When set, only file names matching one of these are yielded.
    pub patterns_include_files: Option<Vec<String>>,
    /// Pattern interpretation mode.
    pub rule_pattern: EnumPatternMode,
    /// Case-insensitive pattern matching.
    pub if_ignore_case: bool,
    /// Listing failure behavior.
    pub rule_on_error: EnumErrorPolicy,
    /// Metadata namespaces requested for every listing.
    pub namespaces: SpecNamespaces,
}

impl Default for SpecWalkOptions {
    fn default() -> Self {
        Self {
            depth_limit: None,
            rule_order: EnumWalkOrder::DepthFirst,
            patterns_exclude_dirs: None,
            patterns_exclude_files: None,
            patterns_include_files: None,
            rule_pattern: EnumPatternMode::Glob,
            if_ignore_case: false,
            rule_on_error: EnumErrorPolicy::Raise,
            namespaces: SpecNamespaces::basic(),
        }
    }
}

/// Glob compile options.
#[derive(Debug, Clone, Default)]
pub struct SpecGlobOptions {
    /// Case-insensitive segment matching.
    pub if_ignore_case: bool,
    /// Names starting with `.` only match segments that start with `.` literally.
    pub if_exclude_hidden: bool,
}

/// Input options for `copy_file` / `copy_dir`.
#[derive(Debug, Clone)]
pub struct SpecCopyOptions {
    /// Traversal options for directory copies. `rule_on_error` is replaced by
    /// [`SpecCopyOptions::rule_on_error`] so listing and copy errors compose.
    pub spec_walk_options: SpecWalkOptions,
    /// Per-entry failure behavior.
    pub rule_on_error: EnumErrorPolicy,
    /// Conflict behavior for destination files.
    pub rule_conflict_file: EnumCopyFileConflictStrategy,
    /// Conflict behavior for destination directories.
    pub rule_conflict_dir: EnumCopyDirectoryConflictStrategy,
    /// Create missing destination parents instead of failing with `ParentNotFound`.
    pub if_create_parents: bool,
    /// Copy the source modified time onto the destination.
    pub if_preserve_time: bool,
    /// Streaming buffer size for the fallback copy.
    pub n_buffer_size: usize,
    /// Maximum worker threads for file-copy stage.
    pub num_workers_max: Option<usize>,
    /// Do not mutate the destination; record what would happen.
    pub if_dry_run: bool,
    /// Cooperative cancellation, checked at directory and file boundaries.
    pub cancel: Option<CancelToken>,
}

impl Default for SpecCopyOptions {
    fn default() -> Self {
        Self {
            spec_walk_options: SpecWalkOptions::default(),
            rule_on_error: EnumErrorPolicy::Collect,
            rule_conflict_file: EnumCopyFileConflictStrategy::Overwrite,
            rule_conflict_dir: EnumCopyDirectoryConflictStrategy::Merge,
            if_create_parents: false,
            if_preserve_time: false,
            n_buffer_size: N_BUFFER_SIZE_DEFAULT,
            num_workers_max: None,
            if_dry_run: false,
            cancel: None,
        }
    }
}

/// Input options for `mirror` / `plan_mirror`.
#[derive(Debug, Clone)]
pub struct SpecMirrorOptions {
    /// Exclude/include patterns and depth limit, applied to both trees.
    pub spec_walk_options: SpecWalkOptions,
    /// Staleness rule for files present on both sides.
    pub rule_compare: EnumMirrorCompareRule,
    /// Modified-time differences up to this window count as equal.
    pub duration_mtime_tolerance: Duration,
    /// Delete destination-only entries (sync mode). `false` is copy-only mode.
    pub if_delete: bool,
    /// Stop at the first failing diff entry.
    pub if_fail_fast: bool,
    /// Copy the source modified time onto created/updated files.
    pub if_preserve_time: bool,
    /// Streaming buffer size for fallback copies.
    pub n_buffer_size: usize,
    /// Maximum worker threads for the file transfer stage.
    pub num_workers_max: Option<usize>,
    /// Plan only.
    pub if_dry_run: bool,
    /// Cooperative cancellation, checked between diff entries.
    pub cancel: Option<CancelToken>,
}

impl Default for SpecMirrorOptions {
    fn default() -> Self {
        Self {
            spec_walk_options: SpecWalkOptions::default(),
            rule_compare: EnumMirrorCompareRule::DestinationOlder,
            duration_mtime_tolerance: Duration::ZERO,
            if_delete: true,
            if_fail_fast: false,
            if_preserve_time: true,
            n_buffer_size: N_BUFFER_SIZE_DEFAULT,
            num_workers_max: None,
            if_dry_run: false,
            cancel: None,
        }
    }
}

/// Default fallback copy chunk.
pub const N_BUFFER_SIZE_DEFAULT: usize = 1024 * 1024;

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsAndErrors

/// One planned mirror operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecDiffEntry {
    /// Path relative to the mirror roots.
    pub path: VfsPath,
    pub kind: EnumDiffKind,
    pub reason: EnumDiffReason,
}

/// One failure item with path + error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecFsFailure {
    /// Failed source or destination path.
    pub path: VfsPath,
    pub error: FsError,
}

/// Malformed path input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("Path escapes the filesystem root: {path}")]
    EscapesRoot { path: String },
    #[error("Invalid path segment `{segment}` in {path}")]
    InvalidSegment { path: String, segment: String },
}

/// Malformed glob pattern, reported at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GlobError {
    #[error("Malformed glob pattern `{pattern}`: {reason}")]
    MalformedPattern { pattern: String, reason: String },
}

/// Error taxonomy every backend reports through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("Resource not found: {path}")]
    ResourceNotFound { path: VfsPath },
    #[error("Directory exists: {path}")]
    DirectoryExists { path: VfsPath },
    #[error("File exists: {path}")]
    FileExists { path: VfsPath },
    #[error("Directory not empty: {path}")]
    DirectoryNotEmpty { path: VfsPath },
    #[error("Expected a file, found a directory: {path}")]
    FileExpected { path: VfsPath },
    #[error("Expected a directory, found a file: {path}")]
    DirExpected { path: VfsPath },
    #[error("Parent directory not found: {path}")]
    ParentNotFound { path: VfsPath },
    #[error("Resource is read-only: {path}")]
    ResourceReadOnly { path: VfsPath },
    #[error("Filesystem is closed")]
    FilesystemClosed,
    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },
    #[error(transparent)]
    InvalidPath(#[from] PathError),
    #[error("Backend operation failed on {path} ({kind:?}): {message}")]
    Io {
        path: VfsPath,
        kind: io::ErrorKind,
        message: String,
    },
}

impl FsError {
    pub fn unsupported(operation: &str) -> Self {
        Self::Unsupported {
            operation: operation.to_string(),
        }
    }

    /// Opaque backend failure.
    pub fn from_io(path: &VfsPath, error: &io::Error) -> Self {
        Self::Io {
            path: path.clone(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Path the error refers to, when it carries one.
    pub fn path(&self) -> Option<&VfsPath> {
        match self {
            Self::ResourceNotFound { path }
            | Self::DirectoryExists { path }
            | Self::FileExists { path }
            | Self::DirectoryNotEmpty { path }
            | Self::FileExpected { path }
            | Self::DirExpected { path }
            | Self::ParentNotFound { path }
            | Self::ResourceReadOnly { path }
            | Self::Io { path, .. } => Some(path),
            Self::FilesystemClosed | Self::Unsupported { .. } | Self::InvalidPath(_) => None,
        }
    }
}

/// "Top-level call failed" errors (validation, setup, or fail-fast abort).
#[derive(Debug, Error)]
pub enum TreeError {
    /// Invalid depth combination or value.
    #[error("{0}")]
    InvalidDepthLimit(String),
    /// Invalid include/exclude pattern.
    #[error("{0}")]
    InvalidPattern(String),
    /// Invalid option combination.
    #[error("{0}")]
    InvalidOption(String),
    /// Source path is not a directory.
    #[error("Source is not a directory: {0}")]
    SourceNotDirectory(VfsPath),
    /// Source and destination overlap on the same backend instance.
    #[error("Source and destination directories overlap: {path_source} <-> {path_destination}")]
    SourceDestinationOverlap {
        path_source: VfsPath,
        path_destination: VfsPath,
    },
    /// Destination root initialization failed.
    #[error("Failed to initialize destination {path}: {error}")]
    DestinationInitFailed {
        path: VfsPath,
        #[source]
        error: FsError,
    },
    /// First unrecoverable error under a fail-fast policy.
    #[error("Aborted at {path}: {error}")]
    Aborted {
        path: VfsPath,
        #[source]
        error: FsError,
    },
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<GlobError> for TreeError {
    fn from(error: GlobError) -> Self {
        Self::InvalidPattern(error.to_string())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
