//! `strata_fs` v1:
//! Backend-agnostic filesystem layer with traversal, copy and mirror engines.
//!
//! Modules:
//! - `path`    : canonical slash-delimited paths
//! - `info`    : namespaced resource metadata
//! - `base`    : the `FileSystem` contract and scoped acquisition
//! - `backend` : memory, host-directory, sub-view and read-only backends
//! - `walk`    : lazy tree traversal
//! - `glob`    : wildcard matching with walk pruning
//! - `copy`    : single-resource and tree copy/move orchestration
//! - `mirror`  : tree reconciliation
//! - `spec`    : enums/options/errors
//! - `report`  : run-time report models
//! - `util`    : shared helper functions

pub mod backend;
pub mod base;
pub mod copy;
pub mod glob;
pub mod info;
pub mod mirror;
pub mod path;
pub mod report;
pub mod spec;
mod util;
pub mod walk;

pub use backend::{MemoryFs, OsFs, ReadOnlyFs, SubFs, make_dir, open_dir};
pub use base::{
    FileSystem, FileWriter, ScopedFs, is_same_instance, resolve_delegate, resolve_storage, with_fs,
};
pub use copy::{
    EnumCopyOutcome, copy_dir, copy_file, copy_fs, copy_structure, move_dir, move_file,
};
pub use glob::{GlobIter, GlobPattern, SpecGlobCount, SpecGlobMatch, glob};
pub use info::{EnumNamespace, ResourceInfo, SpecInfoAccess, SpecInfoDetails, SpecNamespaces};
pub use mirror::{SpecMirrorPlan, mirror, plan_mirror};
pub use path::VfsPath;
pub use report::{
    ReportCopy, ReportCopyBuilder, ReportMirror, ReportMirrorBuilder, SpecMirrorFailure,
};
pub use spec::{
    CancelToken, EnumCopyDirectoryConflictStrategy, EnumCopyFileConflictStrategy, EnumDiffKind,
    EnumDiffReason, EnumErrorPolicy, EnumMirrorCompareRule, EnumPatternMode, EnumWalkOrder,
    FsError, GlobError, PathError, SpecCopyOptions, SpecDiffEntry, SpecFsFailure,
    SpecGlobOptions, SpecMirrorOptions, SpecWalkOptions, TreeError,
};
pub use walk::{SpecWalkEvent, TypeDescendFilter, WalkIter, Walker};
