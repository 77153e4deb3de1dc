//! Single-resource and tree copy/move orchestration across backends.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::base::{FileSystem, is_same_instance, resolve_delegate, resolve_storage};
use crate::info::SpecNamespaces;
use crate::path::VfsPath;
use crate::report::{ReportCopy, ReportCopyBuilder};
use crate::spec::{
    EnumCopyDirectoryConflictStrategy, EnumCopyFileConflictStrategy, EnumErrorPolicy,
    EnumWalkOrder, FsError, SpecCopyOptions, SpecFsFailure, TreeError,
};
use crate::util::{calculate_worker_limit, run_tasks};
use crate::walk::Walker;

/// File tasks buffered before a flush to the worker pool.
const N_TASK_BATCH: usize = 512;

/// Result of a single-file copy or move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumCopyOutcome {
    /// Bytes were streamed through the fallback path.
    Copied,
    /// A backend-native fast path handled the transfer.
    FastPath,
    /// Nothing was written: conflict strategy or dry-run.
    Skipped,
}

#[derive(Debug, Clone)]
struct SpecCopyTaskFile {
    path_file_src: VfsPath,
    path_file_dst: VfsPath,
}

enum EnumTaskOutcome {
    Done { if_fast_path: bool },
    Failed(FsError),
    Cancelled,
}

struct SpecCopyContext<'a> {
    fs_src: &'a dyn FileSystem,
    fs_dst: &'a dyn FileSystem,
    path_dir_src: VfsPath,
    path_dir_dst: VfsPath,
    spec_cp_options: &'a SpecCopyOptions,
    n_workers_max: usize,
    if_dirs_only: bool,
    builder_cp_report: ReportCopyBuilder,
    set_pruned_dirs: Arc<Mutex<HashSet<VfsPath>>>,
    l_tasks_file_copy: Vec<SpecCopyTaskFile>,
}

////////////////////////////////////////////////////////////////////////////////
// #region SingleFile

/// Move bytes of one file, preferring a native fast path.
///
/// Both sides are resolved through [`FileSystem::delegate`] first, so
/// sub-views of one backend still reach its native copy. Returns `true` when
/// the fast path was used. The destination writer is committed before the
/// source reader is released.
pub(crate) fn transfer_file(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
    n_buffer_size: usize,
    if_preserve_time: bool,
) -> Result<bool, FsError> {
    let (fs_src_resolved, path_src_resolved) = resolve_delegate(fs_src, path_src);
    let (fs_dst_resolved, path_dst_resolved) = resolve_delegate(fs_dst, path_dst);

    let if_fast_path =
        match fs_src_resolved.copy_resource(&path_src_resolved, fs_dst_resolved, &path_dst_resolved)
        {
            Ok(()) => {
                debug!(src = %path_src, dst = %path_dst, "Native copy accepted");
                true
            }
            Err(e) if e.is_unsupported() => {
                stream_file(fs_src, path_src, fs_dst, path_dst, n_buffer_size)?;
                false
            }
            Err(e) => return Err(e),
        };

    if if_preserve_time {
        preserve_modified(fs_src, path_src, fs_dst, path_dst)?;
    }
    Ok(if_fast_path)
}

fn stream_file(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
    n_buffer_size: usize,
) -> Result<(), FsError> {
    let mut reader = fs_src.open_read(path_src)?;
    let mut writer = fs_dst.open_write(path_dst, true)?;
    let mut buf = vec![0u8; n_buffer_size.max(1)];
    loop {
        let n_read = reader
            .read(&mut buf)
            .map_err(|e| FsError::from_io(path_src, &e))?;
        if n_read == 0 {
            break;
        }
        writer
            .write_all(&buf[..n_read])
            .map_err(|e| FsError::from_io(path_dst, &e))?;
    }
    writer.commit()?;
    drop(reader);
    Ok(())
}

/// Copy the source modified time. Backends without `set_modified` are skipped.
fn preserve_modified(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
) -> Result<(), FsError> {
    let Some(time_modified) = fs_src
        .get_info(path_src, SpecNamespaces::details())?
        .modified()
    else {
        return Ok(());
    };
    match fs_dst.set_modified(path_dst, time_modified) {
        Err(e) if e.is_unsupported() => Ok(()),
        res => res,
    }
}

/// Decide whether an existing destination file may be replaced.
///
/// `Ok(false)` means skip. With `OverwriteIfNewer`, a missing modified time on
/// either side counts as newer.
fn should_write_file(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
    rule_conflict: EnumCopyFileConflictStrategy,
) -> Result<bool, FsError> {
    let namespaces = if rule_conflict == EnumCopyFileConflictStrategy::OverwriteIfNewer {
        SpecNamespaces::details()
    } else {
        SpecNamespaces::basic()
    };
    let info_dst = match fs_dst.get_info(path_dst, namespaces) {
        Ok(v) => v,
        Err(FsError::ResourceNotFound { .. }) => return Ok(true),
        Err(e) => return Err(e),
    };
    if info_dst.is_dir() {
        return Err(FsError::FileExpected {
            path: path_dst.clone(),
        });
    }

    match rule_conflict {
        EnumCopyFileConflictStrategy::Skip => Ok(false),
        EnumCopyFileConflictStrategy::Error => Err(FsError::FileExists {
            path: path_dst.clone(),
        }),
        EnumCopyFileConflictStrategy::Overwrite => Ok(true),
        EnumCopyFileConflictStrategy::OverwriteIfNewer => {
            let info_src = fs_src.get_info(path_src, SpecNamespaces::details())?;
            match (info_src.modified(), info_dst.modified()) {
                (Some(time_src), Some(time_dst)) => Ok(time_src > time_dst),
                _ => Ok(true),
            }
        }
    }
}

fn ensure_parent(
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
    spec_cp_options: &SpecCopyOptions,
) -> Result<(), FsError> {
    if !spec_cp_options.if_create_parents {
        return Ok(());
    }
    match path_dst.parent() {
        Some(path_parent) => fs_dst.make_dirs(&path_parent),
        None => Ok(()),
    }
}

fn check_source_file(fs_src: &dyn FileSystem, path_src: &VfsPath) -> Result<(), FsError> {
    if fs_src.get_info(path_src, SpecNamespaces::basic())?.is_dir() {
        return Err(FsError::FileExpected {
            path: path_src.clone(),
        });
    }
    Ok(())
}

/// Copy one file between (possibly different) backends.
///
/// A missing destination parent fails with `ParentNotFound` unless
/// `if_create_parents` is set.
pub fn copy_file(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
    spec_cp_options: &SpecCopyOptions,
) -> Result<EnumCopyOutcome, FsError> {
    check_source_file(fs_src, path_src)?;
    if !should_write_file(
        fs_src,
        path_src,
        fs_dst,
        path_dst,
        spec_cp_options.rule_conflict_file,
    )? {
        return Ok(EnumCopyOutcome::Skipped);
    }
    if spec_cp_options.if_dry_run {
        return Ok(EnumCopyOutcome::Skipped);
    }
    ensure_parent(fs_dst, path_dst, spec_cp_options)?;

    let if_fast_path = transfer_file(
        fs_src,
        path_src,
        fs_dst,
        path_dst,
        spec_cp_options.n_buffer_size,
        spec_cp_options.if_preserve_time,
    )?;
    Ok(if if_fast_path {
        EnumCopyOutcome::FastPath
    } else {
        EnumCopyOutcome::Copied
    })
}

/// Move one file: native rename when the backends allow it, otherwise copy
/// then remove the source.
pub fn move_file(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
    spec_cp_options: &SpecCopyOptions,
) -> Result<EnumCopyOutcome, FsError> {
    check_source_file(fs_src, path_src)?;
    if !should_write_file(
        fs_src,
        path_src,
        fs_dst,
        path_dst,
        spec_cp_options.rule_conflict_file,
    )? {
        return Ok(EnumCopyOutcome::Skipped);
    }
    if spec_cp_options.if_dry_run {
        return Ok(EnumCopyOutcome::Skipped);
    }
    ensure_parent(fs_dst, path_dst, spec_cp_options)?;

    let (fs_src_resolved, path_src_resolved) = resolve_delegate(fs_src, path_src);
    let (fs_dst_resolved, path_dst_resolved) = resolve_delegate(fs_dst, path_dst);
    match fs_src_resolved.move_resource(&path_src_resolved, fs_dst_resolved, &path_dst_resolved) {
        Ok(()) => {
            debug!(src = %path_src, dst = %path_dst, "Native move accepted");
            return Ok(EnumCopyOutcome::FastPath);
        }
        Err(e) if e.is_unsupported() => {}
        Err(e) => return Err(e),
    }

    transfer_file(
        fs_src,
        path_src,
        fs_dst,
        path_dst,
        spec_cp_options.n_buffer_size,
        spec_cp_options.if_preserve_time,
    )?;
    fs_src.remove(path_src)?;
    Ok(EnumCopyOutcome::Copied)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Tree

fn is_cancelled(spec_cp_options: &SpecCopyOptions) -> bool {
    spec_cp_options
        .cancel
        .as_ref()
        .is_some_and(|c| c.is_cancelled())
}

/// Reject copies whose source and destination trees share storage.
///
/// Both sides are resolved through [`FileSystem::storage`], so sub-views and
/// read-only wrappers of one instance compare equal.
pub(crate) fn check_overlap(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
) -> Result<(), TreeError> {
    let (fs_src_resolved, path_src_resolved) = resolve_storage(fs_src, path_src);
    let (fs_dst_resolved, path_dst_resolved) = resolve_storage(fs_dst, path_dst);
    if is_same_instance(fs_src_resolved, fs_dst_resolved)
        && path_src_resolved.is_overlapping(&path_dst_resolved)
    {
        return Err(TreeError::SourceDestinationOverlap {
            path_source: path_src.clone(),
            path_destination: path_dst.clone(),
        });
    }
    Ok(())
}

fn check_source_dir(fs_src: &dyn FileSystem, path_src: &VfsPath) -> Result<(), TreeError> {
    match fs_src.get_info(path_src, SpecNamespaces::basic()) {
        Ok(info) if info.is_dir() => Ok(()),
        Ok(_) | Err(FsError::ResourceNotFound { .. }) => {
            Err(TreeError::SourceNotDirectory(path_src.clone()))
        }
        Err(e) => Err(TreeError::Aborted {
            path: path_src.clone(),
            error: e,
        }),
    }
}

/// Make sure the destination root is a directory, creating it when absent.
fn init_destination(
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
    if_dry_run: bool,
) -> Result<(), TreeError> {
    let into_init_error = |e: FsError| TreeError::DestinationInitFailed {
        path: path_dst.clone(),
        error: e,
    };
    match fs_dst.get_info(path_dst, SpecNamespaces::basic()) {
        Ok(info) if info.is_dir() => Ok(()),
        Ok(_) => Err(into_init_error(FsError::DirExpected {
            path: path_dst.clone(),
        })),
        Err(FsError::ResourceNotFound { .. }) if if_dry_run => Ok(()),
        Err(FsError::ResourceNotFound { .. }) => fs_dst.make_dirs(path_dst).map_err(into_init_error),
        Err(e) => Err(into_init_error(e)),
    }
}

fn validate_options(spec_cp_options: &SpecCopyOptions) -> Result<Walker, TreeError> {
    if spec_cp_options.n_buffer_size == 0 {
        return Err(TreeError::InvalidOption(
            "Arg `n_buffer_size` must be >= 1.".to_string(),
        ));
    }
    let mut spec_walk_options = spec_cp_options.spec_walk_options.clone();
    spec_walk_options.rule_on_error = spec_cp_options.rule_on_error;
    // Parents must be created before their children.
    if spec_walk_options.rule_order == EnumWalkOrder::DepthFirstPostOrder {
        spec_walk_options.rule_order = EnumWalkOrder::DepthFirst;
    }
    Walker::new(spec_walk_options)
}

/// Copy the directory tree under `path_src` into `path_dst`.
///
/// Returns [`ReportCopy`] when the run completes (with possible per-entry
/// errors stored in the report). Returns [`TreeError`] for setup and
/// validation failures, for the first error under
/// [`EnumErrorPolicy::Raise`], and on cancellation.
pub fn copy_dir(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
    spec_cp_options: &SpecCopyOptions,
) -> Result<ReportCopy, TreeError> {
    run_copy_tree(fs_src, path_src, fs_dst, path_dst, spec_cp_options, false)
}

/// Recreate the directory structure under `path_src` without any files.
pub fn copy_structure(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
    spec_cp_options: &SpecCopyOptions,
) -> Result<ReportCopy, TreeError> {
    run_copy_tree(fs_src, path_src, fs_dst, path_dst, spec_cp_options, true)
}

/// Copy one whole filesystem onto another, root to root.
pub fn copy_fs(
    fs_src: &dyn FileSystem,
    fs_dst: &dyn FileSystem,
    spec_cp_options: &SpecCopyOptions,
) -> Result<ReportCopy, TreeError> {
    copy_dir(
        fs_src,
        &VfsPath::root(),
        fs_dst,
        &VfsPath::root(),
        spec_cp_options,
    )
}

/// Move a directory tree.
///
/// A native `move_resource` is tried when the destination does not exist
/// yet. Otherwise the tree is copied and, only if that produced no errors,
/// the source is removed. A missing destination parent fails with
/// `ParentNotFound` unless `if_create_parents` is set.
pub fn move_dir(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
    spec_cp_options: &SpecCopyOptions,
) -> Result<ReportCopy, TreeError> {
    validate_options(spec_cp_options)?;
    check_source_dir(fs_src, path_src)?;
    check_overlap(fs_src, path_src, fs_dst, path_dst)?;

    let into_init_error = |e: FsError| TreeError::DestinationInitFailed {
        path: path_dst.clone(),
        error: e,
    };
    let b_dst_exists = fs_dst.exists(path_dst).map_err(into_init_error)?;
    if !b_dst_exists
        && !spec_cp_options.if_create_parents
        && let Some(path_parent) = path_dst.parent()
        && !fs_dst.is_dir(&path_parent).map_err(into_init_error)?
    {
        return Err(into_init_error(FsError::ParentNotFound {
            path: path_dst.clone(),
        }));
    }
    if !b_dst_exists && !spec_cp_options.if_dry_run && !path_src.is_root() {
        if let Some(path_parent) = path_dst.parent()
            && spec_cp_options.if_create_parents
        {
            fs_dst.make_dirs(&path_parent).map_err(into_init_error)?;
        }
        let (fs_src_resolved, path_src_resolved) = resolve_delegate(fs_src, path_src);
        let (fs_dst_resolved, path_dst_resolved) = resolve_delegate(fs_dst, path_dst);
        match fs_src_resolved.move_resource(&path_src_resolved, fs_dst_resolved, &path_dst_resolved)
        {
            Ok(()) => {
                debug!(src = %path_src, dst = %path_dst, "Native directory move accepted");
                let mut builder_cp_report = ReportCopyBuilder::default();
                builder_cp_report.add_counts(&["cnt_scanned", "cnt_matched"], 1);
                builder_cp_report.add_fast_path();
                let report = builder_cp_report.build();
                info!("{}", report.format("[MOVE]"));
                return Ok(report);
            }
            Err(e) if e.is_unsupported() => {}
            Err(e) => {
                debug!(src = %path_src, error = %e, "Native directory move failed; copying");
            }
        }
    }

    let mut report = copy_dir(fs_src, path_src, fs_dst, path_dst, spec_cp_options)?;
    if spec_cp_options.if_dry_run {
        return Ok(report);
    }
    if report.error_count() > 0 {
        report.warnings.push(format!(
            "Source kept after incomplete copy: {path_src} ({} errors)",
            report.error_count()
        ));
        return Ok(report);
    }
    if let Err(e) = fs_src.remove_tree(path_src) {
        report.errors.push(SpecFsFailure {
            path: path_src.clone(),
            error: e,
        });
    }
    Ok(report)
}

fn run_copy_tree(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
    spec_cp_options: &SpecCopyOptions,
    if_dirs_only: bool,
) -> Result<ReportCopy, TreeError> {
    let walker = validate_options(spec_cp_options)?;
    check_source_dir(fs_src, path_src)?;
    check_overlap(fs_src, path_src, fs_dst, path_dst)?;
    if is_cancelled(spec_cp_options) {
        return Err(TreeError::Cancelled);
    }
    init_destination(fs_dst, path_dst, spec_cp_options.if_dry_run)?;

    let mut spec_cp_ctx = SpecCopyContext {
        fs_src,
        fs_dst,
        path_dir_src: path_src.clone(),
        path_dir_dst: path_dst.clone(),
        spec_cp_options,
        n_workers_max: calculate_worker_limit(spec_cp_options.num_workers_max),
        if_dirs_only,
        builder_cp_report: ReportCopyBuilder::default(),
        set_pruned_dirs: Arc::new(Mutex::new(HashSet::new())),
        l_tasks_file_copy: Vec::new(),
    };

    let set_pruned_filter = Arc::clone(&spec_cp_ctx.set_pruned_dirs);
    let iter_walk = walker.walk_filtered(
        fs_src,
        path_src,
        Box::new(move |path_dir: &VfsPath| {
            !set_pruned_filter
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(path_dir)
        }),
    );

    for res_event in iter_walk {
        if is_cancelled(spec_cp_options) {
            return Err(TreeError::Cancelled);
        }
        let event = match res_event {
            Ok(v) => v,
            Err(e) => {
                return Err(TreeError::Aborted {
                    path: e.path().cloned().unwrap_or_else(|| path_src.clone()),
                    error: e,
                });
            }
        };
        if let Some(e) = event.error {
            spec_cp_ctx.builder_cp_report.add_error(event.path, e);
            continue;
        }

        for info_dir in &event.l_dirs {
            let Ok(path_dir_src_sub) = event.path.child(info_dir.name()) else {
                continue;
            };
            handle_dir_entry(&path_dir_src_sub, &mut spec_cp_ctx)?;
        }
        if spec_cp_ctx.if_dirs_only {
            continue;
        }
        for info_file in &event.l_files {
            let Ok(path_file_src) = event.path.child(info_file.name()) else {
                continue;
            };
            handle_file_entry(path_file_src, &mut spec_cp_ctx)?;
            if spec_cp_ctx.l_tasks_file_copy.len() >= N_TASK_BATCH {
                flush_file_copy_tasks(&mut spec_cp_ctx)?;
            }
        }
    }
    flush_file_copy_tasks(&mut spec_cp_ctx)?;

    let report = spec_cp_ctx.builder_cp_report.build();
    info!("{report}");
    Ok(report)
}

fn derive_destination_path(path_src: &VfsPath, spec_cp_ctx: &SpecCopyContext<'_>) -> VfsPath {
    let path_rel = path_src
        .strip_prefix(&spec_cp_ctx.path_dir_src)
        .unwrap_or_default();
    spec_cp_ctx.path_dir_dst.join(&path_rel)
}

/// Apply the error policy to one failed entry.
fn record_entry_error(
    path: VfsPath,
    error: FsError,
    spec_cp_ctx: &mut SpecCopyContext<'_>,
) -> Result<(), TreeError> {
    match spec_cp_ctx.spec_cp_options.rule_on_error {
        EnumErrorPolicy::Raise => Err(TreeError::Aborted { path, error }),
        EnumErrorPolicy::Ignore => {
            spec_cp_ctx.builder_cp_report.add_skipped();
            Ok(())
        }
        EnumErrorPolicy::Collect => {
            spec_cp_ctx.builder_cp_report.add_error(path, error);
            Ok(())
        }
    }
}

fn prune_dir(path_dir_src: &VfsPath, spec_cp_ctx: &SpecCopyContext<'_>) {
    spec_cp_ctx
        .set_pruned_dirs
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(path_dir_src.clone());
}

fn handle_dir_entry(
    path_dir_src_sub: &VfsPath,
    spec_cp_ctx: &mut SpecCopyContext<'_>,
) -> Result<(), TreeError> {
    spec_cp_ctx
        .builder_cp_report
        .add_counts(&["cnt_scanned", "cnt_matched"], 1);
    let path_dir_dst_sub = derive_destination_path(path_dir_src_sub, spec_cp_ctx);
    let fs_dst = spec_cp_ctx.fs_dst;

    match fs_dst.get_info(&path_dir_dst_sub, SpecNamespaces::basic()) {
        Ok(info) if info.is_dir() => match spec_cp_ctx.spec_cp_options.rule_conflict_dir {
            EnumCopyDirectoryConflictStrategy::Merge => Ok(()),
            EnumCopyDirectoryConflictStrategy::Skip => {
                prune_dir(path_dir_src_sub, spec_cp_ctx);
                spec_cp_ctx.builder_cp_report.add_skipped();
                Ok(())
            }
            EnumCopyDirectoryConflictStrategy::Error => {
                prune_dir(path_dir_src_sub, spec_cp_ctx);
                record_entry_error(
                    path_dir_dst_sub.clone(),
                    FsError::DirectoryExists {
                        path: path_dir_dst_sub,
                    },
                    spec_cp_ctx,
                )
            }
        },
        Ok(_) => {
            prune_dir(path_dir_src_sub, spec_cp_ctx);
            record_entry_error(
                path_dir_dst_sub.clone(),
                FsError::DirExpected {
                    path: path_dir_dst_sub,
                },
                spec_cp_ctx,
            )
        }
        Err(FsError::ResourceNotFound { .. }) => {
            if spec_cp_ctx.spec_cp_options.if_dry_run {
                spec_cp_ctx.builder_cp_report.add_skipped();
                return Ok(());
            }
            match fs_dst.create_dir(&path_dir_dst_sub, true) {
                Ok(()) => {
                    spec_cp_ctx.builder_cp_report.add_copied();
                    Ok(())
                }
                Err(e) => {
                    prune_dir(path_dir_src_sub, spec_cp_ctx);
                    record_entry_error(path_dir_dst_sub, e, spec_cp_ctx)
                }
            }
        }
        Err(e) => {
            prune_dir(path_dir_src_sub, spec_cp_ctx);
            record_entry_error(path_dir_dst_sub, e, spec_cp_ctx)
        }
    }
}

fn handle_file_entry(
    path_file_src: VfsPath,
    spec_cp_ctx: &mut SpecCopyContext<'_>,
) -> Result<(), TreeError> {
    spec_cp_ctx
        .builder_cp_report
        .add_counts(&["cnt_scanned", "cnt_matched"], 1);
    let path_file_dst = derive_destination_path(&path_file_src, spec_cp_ctx);

    match should_write_file(
        spec_cp_ctx.fs_src,
        &path_file_src,
        spec_cp_ctx.fs_dst,
        &path_file_dst,
        spec_cp_ctx.spec_cp_options.rule_conflict_file,
    ) {
        Ok(true) => {}
        Ok(false) => {
            spec_cp_ctx.builder_cp_report.add_skipped();
            return Ok(());
        }
        Err(e) => return record_entry_error(path_file_dst, e, spec_cp_ctx),
    }

    if spec_cp_ctx.spec_cp_options.if_dry_run {
        spec_cp_ctx.builder_cp_report.add_skipped();
        return Ok(());
    }

    spec_cp_ctx.l_tasks_file_copy.push(SpecCopyTaskFile {
        path_file_src,
        path_file_dst,
    });
    Ok(())
}

fn flush_file_copy_tasks(spec_cp_ctx: &mut SpecCopyContext<'_>) -> Result<(), TreeError> {
    let l_tasks_file_copy = std::mem::take(&mut spec_cp_ctx.l_tasks_file_copy);
    if l_tasks_file_copy.is_empty() {
        return Ok(());
    }

    let fs_src = spec_cp_ctx.fs_src;
    let fs_dst = spec_cp_ctx.fs_dst;
    let spec_cp_options = spec_cp_ctx.spec_cp_options;
    let l_results = run_tasks(
        l_tasks_file_copy,
        spec_cp_ctx.n_workers_max,
        |spec_task: SpecCopyTaskFile| {
            if is_cancelled(spec_cp_options) {
                return (spec_task.path_file_dst, EnumTaskOutcome::Cancelled);
            }
            let enum_outcome = match transfer_file(
                fs_src,
                &spec_task.path_file_src,
                fs_dst,
                &spec_task.path_file_dst,
                spec_cp_options.n_buffer_size,
                spec_cp_options.if_preserve_time,
            ) {
                Ok(if_fast_path) => EnumTaskOutcome::Done { if_fast_path },
                Err(e) => EnumTaskOutcome::Failed(e),
            };
            (spec_task.path_file_dst, enum_outcome)
        },
        &mut spec_cp_ctx.builder_cp_report.warnings,
    );

    let mut b_cancelled = false;
    let mut err_first: Option<TreeError> = None;
    for (path_file_dst, enum_outcome) in l_results {
        match enum_outcome {
            EnumTaskOutcome::Done { if_fast_path: true } => {
                spec_cp_ctx.builder_cp_report.add_fast_path();
            }
            EnumTaskOutcome::Done {
                if_fast_path: false,
            } => spec_cp_ctx.builder_cp_report.add_copied(),
            EnumTaskOutcome::Cancelled => b_cancelled = true,
            EnumTaskOutcome::Failed(e) => {
                if let Err(err_tree) = record_entry_error(path_file_dst, e, spec_cp_ctx)
                    && err_first.is_none()
                {
                    err_first = Some(err_tree);
                }
            }
        }
    }
    if let Some(err_tree) = err_first {
        return Err(err_tree);
    }
    if b_cancelled {
        return Err(TreeError::Cancelled);
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::io::Read;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use super::{
        EnumCopyOutcome, copy_dir, copy_file, copy_fs, copy_structure, move_dir, move_file,
    };
    use crate::backend::{MemoryFs, OsFs, ReadOnlyFs, SubFs};
    use crate::base::{FileSystem, FileWriter};
    use crate::info::{ResourceInfo, SpecNamespaces};
    use crate::path::VfsPath;
    use crate::spec::{
        CancelToken, EnumCopyDirectoryConflictStrategy, EnumCopyFileConflictStrategy,
        EnumErrorPolicy, FsError, SpecCopyOptions, SpecWalkOptions, TreeError,
    };

    struct TestDir {
        path: PathBuf,
    }

    impl TestDir {
        fn new() -> Self {
            let n = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos();
            let path = std::env::temp_dir().join(format!("strata_fs_copy_test_{n}"));
            std::fs::create_dir_all(&path).expect("create test dir");
            Self { path }
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for TestDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    fn p(raw: &str) -> VfsPath {
        VfsPath::parse(raw).expect("path")
    }

    fn write_text(fs: &dyn FileSystem, raw: &str, txt: &str) {
        let path = p(raw);
        if let Some(path_parent) = path.parent() {
            fs.make_dirs(&path_parent).expect("create parent");
        }
        fs.write_bytes(&path, txt.as_bytes()).expect("write text");
    }

    fn read_text(fs: &dyn FileSystem, raw: &str) -> String {
        String::from_utf8(fs.read_bytes(&p(raw)).expect("read")).expect("utf8")
    }

    /// Counts streamed reads; native copies go straight to the inner store.
    struct InstrumentedFs {
        fs_inner: MemoryFs,
        n_open_read: AtomicUsize,
    }

    impl InstrumentedFs {
        fn new() -> Self {
            Self {
                fs_inner: MemoryFs::new(),
                n_open_read: AtomicUsize::new(0),
            }
        }
    }

    impl FileSystem for InstrumentedFs {
        fn list_info(
            &self,
            path: &VfsPath,
            namespaces: SpecNamespaces,
        ) -> Result<Vec<ResourceInfo>, FsError> {
            self.fs_inner.list_info(path, namespaces)
        }

        fn get_info(
            &self,
            path: &VfsPath,
            namespaces: SpecNamespaces,
        ) -> Result<ResourceInfo, FsError> {
            self.fs_inner.get_info(path, namespaces)
        }

        fn open_read(&self, path: &VfsPath) -> Result<Box<dyn Read + Send + '_>, FsError> {
            self.n_open_read.fetch_add(1, Ordering::SeqCst);
            self.fs_inner.open_read(path)
        }

        fn open_write(
            &self,
            path: &VfsPath,
            if_overwrite: bool,
        ) -> Result<Box<dyn FileWriter + '_>, FsError> {
            self.fs_inner.open_write(path, if_overwrite)
        }

        fn create_dir(&self, path: &VfsPath, if_recreate: bool) -> Result<(), FsError> {
            self.fs_inner.create_dir(path, if_recreate)
        }

        fn remove(&self, path: &VfsPath) -> Result<(), FsError> {
            self.fs_inner.remove(path)
        }

        fn remove_dir(&self, path: &VfsPath) -> Result<(), FsError> {
            self.fs_inner.remove_dir(path)
        }

        fn close(&self) -> Result<(), FsError> {
            self.fs_inner.close()
        }

        fn is_closed(&self) -> bool {
            self.fs_inner.is_closed()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn copy_resource(
            &self,
            path_src: &VfsPath,
            fs_dst: &dyn FileSystem,
            path_dst: &VfsPath,
        ) -> Result<(), FsError> {
            self.fs_inner.copy_resource(path_src, fs_dst, path_dst)
        }
    }

    #[test]
    fn fast_path_takes_precedence_over_streaming() {
        let fs_src = InstrumentedFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src.fs_inner, "/big.bin", "payload");

        let enum_outcome = copy_file(
            &fs_src,
            &p("/big.bin"),
            &fs_dst,
            &p("/big.bin"),
            &SpecCopyOptions::default(),
        )
        .expect("copy");
        assert_eq!(enum_outcome, EnumCopyOutcome::FastPath);
        assert_eq!(fs_src.n_open_read.load(Ordering::SeqCst), 0);
        assert_eq!(read_text(&fs_dst, "/big.bin"), "payload");
    }

    #[test]
    fn unsupported_fast_path_falls_back_to_streaming() {
        let fs_src = InstrumentedFs::new();
        let fs_dst = ReadOnlyFs::new(Arc::new(MemoryFs::new()));
        write_text(&fs_src.fs_inner, "/a.txt", "a");

        let err = copy_file(
            &fs_src,
            &p("/a.txt"),
            &fs_dst,
            &p("/a.txt"),
            &SpecCopyOptions::default(),
        )
        .expect_err("read-only destination");
        assert!(matches!(err, FsError::ResourceReadOnly { .. }));
        assert_eq!(fs_src.n_open_read.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cross_backend_copy_is_byte_identical() {
        let tmp = TestDir::new();
        let fs_src = MemoryFs::new();
        let fs_dst = OsFs::new(tmp.path()).expect("open");
        let l_payload: Vec<u8> = (0..10_000u32).map(|n| (n % 251) as u8).collect();
        fs_src.write_bytes(&p("/blob.bin"), &l_payload).expect("write");

        let spec_cp_options = SpecCopyOptions {
            n_buffer_size: 333,
            ..SpecCopyOptions::default()
        };
        let enum_outcome = copy_file(
            &fs_src,
            &p("/blob.bin"),
            &fs_dst,
            &p("/blob.bin"),
            &spec_cp_options,
        )
        .expect("copy");
        assert_eq!(enum_outcome, EnumCopyOutcome::Copied);
        assert_eq!(
            std::fs::read(tmp.path().join("blob.bin")).expect("read"),
            l_payload
        );
    }

    #[test]
    fn missing_parent_needs_opt_in() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/a.txt", "a");

        let err = copy_file(
            &fs_src,
            &p("/a.txt"),
            &fs_dst,
            &p("/x/y/a.txt"),
            &SpecCopyOptions::default(),
        )
        .expect_err("no parent");
        assert!(matches!(err, FsError::ParentNotFound { .. }));

        let spec_cp_options = SpecCopyOptions {
            if_create_parents: true,
            ..SpecCopyOptions::default()
        };
        copy_file(&fs_src, &p("/a.txt"), &fs_dst, &p("/x/y/a.txt"), &spec_cp_options)
            .expect("copy");
        assert_eq!(read_text(&fs_dst, "/x/y/a.txt"), "a");
    }

    #[test]
    fn file_conflict_strategies() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/a.txt", "new");
        write_text(&fs_dst, "/a.txt", "old");

        let options_for = |rule_conflict_file| SpecCopyOptions {
            rule_conflict_file,
            ..SpecCopyOptions::default()
        };

        let enum_outcome = copy_file(
            &fs_src,
            &p("/a.txt"),
            &fs_dst,
            &p("/a.txt"),
            &options_for(EnumCopyFileConflictStrategy::Skip),
        )
        .expect("skip");
        assert_eq!(enum_outcome, EnumCopyOutcome::Skipped);
        assert_eq!(read_text(&fs_dst, "/a.txt"), "old");

        assert!(matches!(
            copy_file(
                &fs_src,
                &p("/a.txt"),
                &fs_dst,
                &p("/a.txt"),
                &options_for(EnumCopyFileConflictStrategy::Error),
            ),
            Err(FsError::FileExists { .. })
        ));

        let t_old = UNIX_EPOCH + Duration::from_secs(1_000);
        fs_src.set_modified(&p("/a.txt"), t_old).expect("set modified");
        let enum_outcome = copy_file(
            &fs_src,
            &p("/a.txt"),
            &fs_dst,
            &p("/a.txt"),
            &options_for(EnumCopyFileConflictStrategy::OverwriteIfNewer),
        )
        .expect("if newer");
        assert_eq!(enum_outcome, EnumCopyOutcome::Skipped);

        copy_file(
            &fs_src,
            &p("/a.txt"),
            &fs_dst,
            &p("/a.txt"),
            &options_for(EnumCopyFileConflictStrategy::Overwrite),
        )
        .expect("overwrite");
        assert_eq!(read_text(&fs_dst, "/a.txt"), "new");
    }

    #[test]
    fn preserve_time_copies_modified() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/a.txt", "a");
        let t = UNIX_EPOCH + Duration::from_secs(1_234_567);
        fs_src.set_modified(&p("/a.txt"), t).expect("set modified");

        let spec_cp_options = SpecCopyOptions {
            if_preserve_time: true,
            ..SpecCopyOptions::default()
        };
        copy_file(&fs_src, &p("/a.txt"), &fs_dst, &p("/a.txt"), &spec_cp_options)
            .expect("copy");
        let info = fs_dst
            .get_info(&p("/a.txt"), SpecNamespaces::details())
            .expect("info");
        assert_eq!(info.modified(), Some(t));
    }

    #[test]
    fn copy_dir_smoke_basic() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/root.txt", "root");
        write_text(&fs_src, "/a/file1.txt", "a");
        write_text(&fs_src, "/b/sub/file2.txt", "b");
        fs_src.make_dirs(&p("/empty")).expect("mkdirs");

        let report = copy_dir(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &p("/out"),
            &SpecCopyOptions::default(),
        )
        .expect("copy dir");
        assert_eq!(report.error_count(), 0);
        assert_eq!(read_text(&fs_dst, "/out/root.txt"), "root");
        assert_eq!(read_text(&fs_dst, "/out/a/file1.txt"), "a");
        assert_eq!(read_text(&fs_dst, "/out/b/sub/file2.txt"), "b");
        assert!(fs_dst.is_dir(&p("/out/empty")).expect("is_dir"));
        assert_eq!(report.cnt_fast_path, 3);
    }

    #[test]
    fn empty_source_yields_empty_destination() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        fs_src.make_dirs(&p("/src")).expect("mkdirs");
        let report = copy_dir(
            &fs_src,
            &p("/src"),
            &fs_dst,
            &p("/dst"),
            &SpecCopyOptions::default(),
        )
        .expect("copy dir");
        assert_eq!(report.cnt_copied, 0);
        assert!(fs_dst.is_dir(&p("/dst")).expect("is_dir"));
        assert!(
            fs_dst
                .list_info(&p("/dst"), SpecNamespaces::basic())
                .expect("list")
                .is_empty()
        );
    }

    #[test]
    fn copy_dir_filters_and_structure() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/keep/a.txt", "a");
        write_text(&fs_src, "/keep/a.md", "a");
        write_text(&fs_src, "/.git/HEAD", "h");

        let spec_cp_options = SpecCopyOptions {
            spec_walk_options: SpecWalkOptions {
                patterns_exclude_dirs: Some(vec![".git".to_string()]),
                patterns_include_files: Some(vec!["*.txt".to_string()]),
                ..SpecWalkOptions::default()
            },
            ..SpecCopyOptions::default()
        };
        copy_dir(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &p("/filtered"),
            &spec_cp_options,
        )
        .expect("copy dir");
        assert!(fs_dst.exists(&p("/filtered/keep/a.txt")).expect("exists"));
        assert!(!fs_dst.exists(&p("/filtered/keep/a.md")).expect("exists"));
        assert!(!fs_dst.exists(&p("/filtered/.git")).expect("exists"));

        copy_structure(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &p("/skeleton"),
            &SpecCopyOptions::default(),
        )
        .expect("copy structure");
        assert!(fs_dst.is_dir(&p("/skeleton/keep")).expect("is_dir"));
        assert!(fs_dst.is_dir(&p("/skeleton/.git")).expect("is_dir"));
        assert!(!fs_dst.exists(&p("/skeleton/keep/a.txt")).expect("exists"));
    }

    #[test]
    fn dir_conflict_skip_prunes_subtree() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/a/new.txt", "n");
        write_text(&fs_src, "/b/new.txt", "n");
        fs_dst.make_dirs(&p("/a")).expect("mkdirs");

        let spec_cp_options = SpecCopyOptions {
            rule_conflict_dir: EnumCopyDirectoryConflictStrategy::Skip,
            ..SpecCopyOptions::default()
        };
        let report = copy_dir(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &spec_cp_options,
        )
        .expect("copy dir");
        assert!(!fs_dst.exists(&p("/a/new.txt")).expect("exists"));
        assert!(fs_dst.exists(&p("/b/new.txt")).expect("exists"));
        assert_eq!(report.cnt_skipped, 1);
    }

    #[test]
    fn setup_errors_fail_immediately() {
        let fs = MemoryFs::new();
        write_text(&fs, "/src/a.txt", "a");

        assert!(matches!(
            copy_dir(&fs, &p("/src"), &fs, &p("/src/inner"), &SpecCopyOptions::default()),
            Err(TreeError::SourceDestinationOverlap { .. })
        ));
        assert!(matches!(
            copy_dir(&fs, &p("/src/a.txt"), &fs, &p("/out"), &SpecCopyOptions::default()),
            Err(TreeError::SourceNotDirectory(_))
        ));
        assert!(matches!(
            copy_dir(&fs, &p("/src"), &fs, &p("/src/a.txt"), &SpecCopyOptions::default()),
            Err(TreeError::SourceDestinationOverlap { .. })
        ));
        write_text(&fs, "/file", "f");
        assert!(matches!(
            copy_dir(&fs, &p("/src"), &fs, &p("/file"), &SpecCopyOptions::default()),
            Err(TreeError::DestinationInitFailed { .. })
        ));
        assert!(matches!(
            copy_fs(&fs, &fs, &SpecCopyOptions::default()),
            Err(TreeError::SourceDestinationOverlap { .. })
        ));
    }

    #[test]
    fn overlap_is_detected_through_sub_views() {
        let fs: Arc<dyn FileSystem> = Arc::new(MemoryFs::new());
        write_text(&*fs, "/data/a.txt", "a");
        let fs_sub = SubFs::open(Arc::clone(&fs), &p("/data")).expect("sub");
        assert!(matches!(
            copy_dir(&*fs, &p("/data"), &fs_sub, &p("/backup"), &SpecCopyOptions::default()),
            Err(TreeError::SourceDestinationOverlap { .. })
        ));
    }

    #[test]
    fn overlap_is_detected_through_read_only_wrappers() {
        let fs_mem = Arc::new(MemoryFs::new());
        write_text(&*fs_mem, "/a/x.txt", "x");
        let fs_ro = ReadOnlyFs::new(fs_mem.clone());

        assert!(matches!(
            copy_dir(&fs_ro, &p("/a"), &*fs_mem, &p("/a/b"), &SpecCopyOptions::default()),
            Err(TreeError::SourceDestinationOverlap { .. })
        ));
        assert!(!fs_mem.exists(&p("/a/b")).expect("exists"));

        let fs_ro: Arc<dyn FileSystem> = Arc::new(fs_ro);
        let fs_sub = SubFs::open(fs_ro, &p("/a")).expect("sub");
        assert!(matches!(
            copy_dir(&*fs_mem, &p("/"), &fs_sub, &p("/"), &SpecCopyOptions::default()),
            Err(TreeError::SourceDestinationOverlap { .. })
        ));
    }

    #[test]
    fn move_dir_missing_parent_needs_opt_in() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/tree/a.txt", "a");

        let err = move_dir(
            &fs_src,
            &p("/tree"),
            &fs_dst,
            &p("/no/such/moved"),
            &SpecCopyOptions::default(),
        )
        .expect_err("missing parent");
        assert!(matches!(
            err,
            TreeError::DestinationInitFailed {
                error: FsError::ParentNotFound { .. },
                ..
            }
        ));
        assert!(!fs_dst.exists(&p("/no")).expect("exists"));
        assert!(fs_src.exists(&p("/tree/a.txt")).expect("exists"));

        let spec_cp_options = SpecCopyOptions {
            if_create_parents: true,
            ..SpecCopyOptions::default()
        };
        let report = move_dir(
            &fs_src,
            &p("/tree"),
            &fs_dst,
            &p("/no/such/moved"),
            &spec_cp_options,
        )
        .expect("move dir");
        assert_eq!(report.error_count(), 0);
        assert_eq!(read_text(&fs_dst, "/no/such/moved/a.txt"), "a");
        assert!(!fs_src.exists(&p("/tree")).expect("exists"));
    }

    #[test]
    fn error_policy_applies_to_file_copies() {
        let fs_src = MemoryFs::new();
        write_text(&fs_src, "/a.txt", "a");
        write_text(&fs_src, "/b.txt", "b");
        let fs_inner = Arc::new(MemoryFs::new());
        let fs_dst = ReadOnlyFs::new(fs_inner);

        let report = copy_dir(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &SpecCopyOptions::default(),
        )
        .expect("collect");
        assert_eq!(report.error_count(), 2);
        assert_eq!(report.cnt_copied, 0);

        let spec_cp_options = SpecCopyOptions {
            rule_on_error: EnumErrorPolicy::Raise,
            ..SpecCopyOptions::default()
        };
        assert!(matches!(
            copy_dir(
                &fs_src,
                &VfsPath::root(),
                &fs_dst,
                &VfsPath::root(),
                &spec_cp_options
            ),
            Err(TreeError::Aborted { .. })
        ));

        let spec_cp_options = SpecCopyOptions {
            rule_on_error: EnumErrorPolicy::Ignore,
            ..SpecCopyOptions::default()
        };
        let report = copy_dir(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &spec_cp_options,
        )
        .expect("ignore");
        assert_eq!(report.error_count(), 0);
        assert_eq!(report.cnt_skipped, 2);
    }

    #[test]
    fn dry_run_and_cancel_leave_destination_untouched() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/d/a.txt", "a");

        let spec_cp_options = SpecCopyOptions {
            if_dry_run: true,
            ..SpecCopyOptions::default()
        };
        let report = copy_dir(&fs_src, &VfsPath::root(), &fs_dst, &p("/out"), &spec_cp_options)
            .expect("dry run");
        assert_eq!(report.cnt_skipped, 2);
        assert!(!fs_dst.exists(&p("/out")).expect("exists"));

        let cancel = CancelToken::new();
        cancel.cancel();
        let spec_cp_options = SpecCopyOptions {
            cancel: Some(cancel),
            ..SpecCopyOptions::default()
        };
        assert!(matches!(
            copy_dir(&fs_src, &VfsPath::root(), &fs_dst, &p("/out"), &spec_cp_options),
            Err(TreeError::Cancelled)
        ));
        assert!(!fs_dst.exists(&p("/out/d/a.txt")).expect("exists"));
    }

    #[test]
    fn sub_view_copies_reach_native_path() {
        let fs: Arc<dyn FileSystem> = Arc::new(MemoryFs::new());
        write_text(&*fs, "/project/src/main.rs", "fn main() {}");
        let fs_sub = SubFs::open(Arc::clone(&fs), &p("/project")).expect("sub");
        let fs_dst = MemoryFs::new();

        let report = copy_dir(
            &fs_sub,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &SpecCopyOptions::default(),
        )
        .expect("copy dir");
        assert_eq!(report.cnt_fast_path, 1);
        assert_eq!(read_text(&fs_dst, "/src/main.rs"), "fn main() {}");
    }

    #[test]
    fn move_file_and_dir() {
        let fs = MemoryFs::new();
        write_text(&fs, "/a.txt", "a");
        let enum_outcome = move_file(
            &fs,
            &p("/a.txt"),
            &fs,
            &p("/b.txt"),
            &SpecCopyOptions::default(),
        )
        .expect("move file");
        assert_eq!(enum_outcome, EnumCopyOutcome::FastPath);
        assert!(!fs.exists(&p("/a.txt")).expect("exists"));
        assert_eq!(read_text(&fs, "/b.txt"), "a");

        let tmp = TestDir::new();
        let fs_os = OsFs::new(tmp.path()).expect("open");
        write_text(&fs, "/tree/x/y.txt", "y");
        let report = move_dir(
            &fs,
            &p("/tree"),
            &fs_os,
            &p("/moved"),
            &SpecCopyOptions::default(),
        )
        .expect("move dir");
        assert_eq!(report.error_count(), 0);
        assert!(!fs.exists(&p("/tree")).expect("exists"));
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("moved/x/y.txt")).expect("read"),
            "y"
        );

        write_text(&fs, "/local/z.txt", "z");
        let report = move_dir(
            &fs,
            &p("/local"),
            &fs,
            &p("/renamed"),
            &SpecCopyOptions::default(),
        )
        .expect("native move dir");
        assert_eq!(report.cnt_fast_path, 1);
        assert_eq!(read_text(&fs, "/renamed/z.txt"), "z");
    }
}
