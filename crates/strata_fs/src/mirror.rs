//! Tree reconciliation: diff two trees, then apply the minimal ordered set of
//! create/update/delete operations.

use std::collections::HashSet;
use std::time::{Duration, SystemTime};

use tracing::{debug, info};

use crate::base::FileSystem;
use crate::copy::{check_overlap, transfer_file};
use crate::info::{ResourceInfo, SpecNamespaces};
use crate::path::VfsPath;
use crate::report::{ReportMirror, ReportMirrorBuilder};
use crate::spec::{
    EnumDiffKind, EnumDiffReason, EnumErrorPolicy, EnumMirrorCompareRule, EnumWalkOrder, FsError,
    SpecDiffEntry, SpecFsFailure, SpecMirrorOptions, SpecWalkOptions, TreeError,
};
use crate::util::{calculate_worker_limit, run_tasks};
use crate::walk::Walker;

/// Output of the planning stage.
#[derive(Debug, Clone, Default)]
pub struct SpecMirrorPlan {
    /// Entries in execution order.
    pub l_diffs: Vec<SpecDiffEntry>,
    /// Files present on both sides that need no transfer.
    pub cnt_unchanged: u64,
    /// Listing failures; the affected level was left out of the plan.
    pub errors: Vec<SpecFsFailure>,
}

struct SpecPlanContext<'a> {
    fs_src: &'a dyn FileSystem,
    fs_dst: &'a dyn FileSystem,
    path_root_src: &'a VfsPath,
    path_root_dst: &'a VfsPath,
    spec_mr_options: &'a SpecMirrorOptions,
    walker: Walker,
    /// Destination-only subtrees, same filters, no depth limit.
    walker_delete: Walker,
    /// Kind-mismatch subtrees, unfiltered.
    walker_purge: Walker,
    l_diffs: Vec<SpecDiffEntry>,
    cnt_unchanged: u64,
    errors: Vec<SpecFsFailure>,
}

////////////////////////////////////////////////////////////////////////////////
// #region Compare

/// Staleness check for a file present on both sides. `None` means unchanged.
///
/// Missing details on either side always count as a size mismatch. Unless
/// the rule is `SizeOnly`, a missing modified time on either side counts as
/// stale.
fn compare_files(
    info_src: &ResourceInfo,
    info_dst: &ResourceInfo,
    rule_compare: EnumMirrorCompareRule,
    duration_tolerance: Duration,
) -> Option<EnumDiffReason> {
    let (Some(n_size_src), Some(n_size_dst)) = (info_src.size(), info_dst.size()) else {
        return Some(EnumDiffReason::SizeMismatch);
    };
    if n_size_src != n_size_dst {
        return Some(EnumDiffReason::SizeMismatch);
    }
    if rule_compare == EnumMirrorCompareRule::SizeOnly {
        return None;
    }
    let (Some(time_src), Some(time_dst)) = (info_src.modified(), info_dst.modified()) else {
        return Some(EnumDiffReason::ModifiedTimeMismatch);
    };

    match rule_compare {
        EnumMirrorCompareRule::SizeOnly => None,
        EnumMirrorCompareRule::Exact => {
            (abs_diff(time_src, time_dst) > duration_tolerance)
                .then_some(EnumDiffReason::ModifiedTimeMismatch)
        }
        EnumMirrorCompareRule::DestinationOlder => {
            let b_older = time_src
                .duration_since(time_dst)
                .is_ok_and(|d| d > duration_tolerance);
            b_older.then_some(EnumDiffReason::DestinationOlder)
        }
    }
}

fn abs_diff(time_a: SystemTime, time_b: SystemTime) -> Duration {
    time_a
        .duration_since(time_b)
        .or_else(|_| time_b.duration_since(time_a))
        .unwrap_or_default()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Plan

fn validate_options(spec_mr_options: &SpecMirrorOptions) -> Result<Walker, TreeError> {
    if spec_mr_options.n_buffer_size == 0 {
        return Err(TreeError::InvalidOption(
            "Arg `n_buffer_size` must be >= 1.".to_string(),
        ));
    }
    let mut spec_walk_options = spec_mr_options.spec_walk_options.clone();
    spec_walk_options.rule_order = EnumWalkOrder::DepthFirst;
    spec_walk_options.rule_on_error = EnumErrorPolicy::Collect;
    spec_walk_options.namespaces = SpecNamespaces::details();
    Walker::new(spec_walk_options)
}

/// `Ok(true)` when the destination root already exists as a directory.
fn check_roots(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
) -> Result<bool, TreeError> {
    match fs_src.get_info(path_src, SpecNamespaces::basic()) {
        Ok(info) if info.is_dir() => {}
        Ok(_) | Err(FsError::ResourceNotFound { .. }) => {
            return Err(TreeError::SourceNotDirectory(path_src.clone()));
        }
        Err(e) => {
            return Err(TreeError::Aborted {
                path: path_src.clone(),
                error: e,
            });
        }
    }
    check_overlap(fs_src, path_src, fs_dst, path_dst)?;

    match fs_dst.get_info(path_dst, SpecNamespaces::basic()) {
        Ok(info) if info.is_dir() => Ok(true),
        Ok(_) => Err(TreeError::DestinationInitFailed {
            path: path_dst.clone(),
            error: FsError::DirExpected {
                path: path_dst.clone(),
            },
        }),
        Err(FsError::ResourceNotFound { .. }) => Ok(false),
        Err(e) => Err(TreeError::DestinationInitFailed {
            path: path_dst.clone(),
            error: e,
        }),
    }
}

/// Compute the diff between two trees without touching either of them.
///
/// Entries come back in execution order: kind-mismatch deletes, directory
/// creation top-down, file transfers, file deletes, then directory deletes
/// deepest first.
pub fn plan_mirror(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
    spec_mr_options: &SpecMirrorOptions,
) -> Result<SpecMirrorPlan, TreeError> {
    let walker = validate_options(spec_mr_options)?;
    let b_dst_exists = check_roots(fs_src, path_src, fs_dst, path_dst)?;
    build_plan(
        fs_src,
        path_src,
        fs_dst,
        path_dst,
        spec_mr_options,
        walker,
        b_dst_exists,
    )
}

fn build_plan(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
    spec_mr_options: &SpecMirrorOptions,
    walker: Walker,
    b_dst_exists: bool,
) -> Result<SpecMirrorPlan, TreeError> {
    let mut spec_walk_options = walker.options().clone();
    spec_walk_options.depth_limit = None;
    spec_walk_options.namespaces = SpecNamespaces::basic();
    let walker_delete = Walker::new(spec_walk_options)?;
    let walker_purge = Walker::new(SpecWalkOptions::default())?;

    let mut spec_plan_ctx = SpecPlanContext {
        fs_src,
        fs_dst,
        path_root_src: path_src,
        path_root_dst: path_dst,
        spec_mr_options,
        walker,
        walker_delete,
        walker_purge,
        l_diffs: Vec::new(),
        cnt_unchanged: 0,
        errors: Vec::new(),
    };

    // (relative dir, destination counterpart exists)
    let mut l_stack: Vec<(VfsPath, bool)> = vec![(VfsPath::root(), b_dst_exists)];
    while let Some((path_rel, b_dst_dir_exists)) = l_stack.pop() {
        if is_cancelled(spec_mr_options) {
            return Err(TreeError::Cancelled);
        }
        if !spec_plan_ctx.walker.is_listed_depth(path_rel.depth()) {
            continue;
        }
        let l_children = plan_level(&path_rel, b_dst_dir_exists, &mut spec_plan_ctx)?;
        l_stack.extend(l_children.into_iter().rev());
    }

    let l_diffs = order_for_execution(spec_plan_ctx.l_diffs);
    Ok(SpecMirrorPlan {
        l_diffs,
        cnt_unchanged: spec_plan_ctx.cnt_unchanged,
        errors: spec_plan_ctx.errors,
    })
}

fn record_listing_error(
    path: VfsPath,
    error: FsError,
    spec_plan_ctx: &mut SpecPlanContext<'_>,
) -> Result<(), TreeError> {
    if spec_plan_ctx.spec_mr_options.if_fail_fast {
        return Err(TreeError::Aborted { path, error });
    }
    debug!(path = %path, error = %error, "Listing failed; level left out of the plan");
    spec_plan_ctx.errors.push(SpecFsFailure { path, error });
    Ok(())
}

fn push_diff(
    spec_plan_ctx: &mut SpecPlanContext<'_>,
    path: VfsPath,
    kind: EnumDiffKind,
    reason: EnumDiffReason,
) {
    spec_plan_ctx
        .l_diffs
        .push(SpecDiffEntry { path, kind, reason });
}

/// Diff one directory level and return the sub-directories to visit next.
fn plan_level(
    path_rel: &VfsPath,
    b_dst_dir_exists: bool,
    spec_plan_ctx: &mut SpecPlanContext<'_>,
) -> Result<Vec<(VfsPath, bool)>, TreeError> {
    let path_dir_src = spec_plan_ctx.path_root_src.join(path_rel);
    let (l_dirs_src, l_files_src) =
        match spec_plan_ctx.walker.scan_dir(spec_plan_ctx.fs_src, &path_dir_src) {
            Ok(v) => v,
            Err(e) => {
                record_listing_error(path_dir_src, e, spec_plan_ctx)?;
                return Ok(Vec::new());
            }
        };

    let (l_dirs_dst, l_files_dst) = if b_dst_dir_exists {
        let path_dir_dst = spec_plan_ctx.path_root_dst.join(path_rel);
        match spec_plan_ctx.walker.scan_dir(spec_plan_ctx.fs_dst, &path_dir_dst) {
            Ok(v) => v,
            Err(e) => {
                record_listing_error(path_dir_dst, e, spec_plan_ctx)?;
                return Ok(Vec::new());
            }
        }
    } else {
        (Vec::new(), Vec::new())
    };

    let set_dirs_dst: HashSet<&str> = l_dirs_dst.iter().map(|v| v.name()).collect();
    let set_dirs_src: HashSet<&str> = l_dirs_src.iter().map(|v| v.name()).collect();
    let set_files_src: HashSet<&str> = l_files_src.iter().map(|v| v.name()).collect();

    let mut l_children = Vec::new();

    for info_dir in &l_dirs_src {
        let Ok(path_child) = path_rel.child(info_dir.name()) else {
            continue;
        };
        if set_dirs_dst.contains(info_dir.name()) {
            l_children.push((path_child, true));
            continue;
        }
        let reason = if l_files_dst.iter().any(|v| v.name() == info_dir.name()) {
            push_diff(
                spec_plan_ctx,
                path_child.clone(),
                EnumDiffKind::DeleteFile,
                EnumDiffReason::KindMismatch,
            );
            EnumDiffReason::KindMismatch
        } else {
            EnumDiffReason::MissingOnDestination
        };
        push_diff(
            spec_plan_ctx,
            path_child.clone(),
            EnumDiffKind::CreateDir,
            reason,
        );
        l_children.push((path_child, false));
    }

    for info_file in &l_files_src {
        let Ok(path_child) = path_rel.child(info_file.name()) else {
            continue;
        };
        if set_dirs_dst.contains(info_file.name()) {
            plan_delete_subtree(&path_child, EnumDiffReason::KindMismatch, spec_plan_ctx)?;
            push_diff(
                spec_plan_ctx,
                path_child,
                EnumDiffKind::CreateFile,
                EnumDiffReason::KindMismatch,
            );
            continue;
        }
        match l_files_dst.iter().find(|v| v.name() == info_file.name()) {
            None => push_diff(
                spec_plan_ctx,
                path_child,
                EnumDiffKind::CreateFile,
                EnumDiffReason::MissingOnDestination,
            ),
            Some(info_dst) => match compare_files(
                info_file,
                info_dst,
                spec_plan_ctx.spec_mr_options.rule_compare,
                spec_plan_ctx.spec_mr_options.duration_mtime_tolerance,
            ) {
                Some(reason) => {
                    push_diff(spec_plan_ctx, path_child, EnumDiffKind::UpdateFile, reason)
                }
                None => spec_plan_ctx.cnt_unchanged += 1,
            },
        }
    }

    if spec_plan_ctx.spec_mr_options.if_delete {
        for info_file in &l_files_dst {
            let name = info_file.name();
            if set_files_src.contains(name) || set_dirs_src.contains(name) {
                continue;
            }
            if let Ok(path_child) = path_rel.child(name) {
                push_diff(
                    spec_plan_ctx,
                    path_child,
                    EnumDiffKind::DeleteFile,
                    EnumDiffReason::MissingOnSource,
                );
            }
        }
        for info_dir in &l_dirs_dst {
            let name = info_dir.name();
            if set_dirs_src.contains(name) || set_files_src.contains(name) {
                continue;
            }
            if let Ok(path_child) = path_rel.child(name) {
                plan_delete_subtree(&path_child, EnumDiffReason::MissingOnSource, spec_plan_ctx)?;
            }
        }
    }

    Ok(l_children)
}

/// Deletes for a destination-only subtree, contents before their directory.
///
/// Entries the filters leave out are kept on `MissingOnSource`, along with
/// every ancestor holding one. A kind mismatch clears the whole subtree so
/// the source kind can take the name.
fn plan_delete_subtree(
    path_rel: &VfsPath,
    reason: EnumDiffReason,
    spec_plan_ctx: &mut SpecPlanContext<'_>,
) -> Result<(), TreeError> {
    let walker_delete = if reason == EnumDiffReason::KindMismatch {
        spec_plan_ctx.walker_purge.clone()
    } else {
        spec_plan_ctx.walker_delete.clone()
    };
    plan_delete_dir(path_rel, reason, &walker_delete, spec_plan_ctx)?;
    Ok(())
}

/// `Ok(true)` when the directory itself was planned for deletion.
fn plan_delete_dir(
    path_rel: &VfsPath,
    reason: EnumDiffReason,
    walker_delete: &Walker,
    spec_plan_ctx: &mut SpecPlanContext<'_>,
) -> Result<bool, TreeError> {
    let path_dir_dst = spec_plan_ctx.path_root_dst.join(path_rel);
    let (l_dirs, l_files, n_filtered) =
        match walker_delete.scan_dir_counted(spec_plan_ctx.fs_dst, &path_dir_dst) {
            Ok(v) => v,
            Err(e) => {
                record_listing_error(path_dir_dst, e, spec_plan_ctx)?;
                return Ok(false);
            }
        };

    let mut b_emptied = n_filtered == 0;
    for info_dir in &l_dirs {
        match path_rel.child(info_dir.name()) {
            Ok(path_child) => {
                b_emptied &= plan_delete_dir(&path_child, reason, walker_delete, spec_plan_ctx)?;
            }
            Err(_) => b_emptied = false,
        }
    }
    for info_file in &l_files {
        match path_rel.child(info_file.name()) {
            Ok(path_child) => {
                push_diff(spec_plan_ctx, path_child, EnumDiffKind::DeleteFile, reason)
            }
            Err(_) => b_emptied = false,
        }
    }

    if b_emptied {
        push_diff(spec_plan_ctx, path_rel.clone(), EnumDiffKind::DeleteDir, reason);
    } else {
        debug!(path = %path_dir_dst, "Directory kept; it holds filtered-out entries");
    }
    Ok(b_emptied)
}

fn phase_of(diff: &SpecDiffEntry) -> u8 {
    match (diff.kind, diff.reason) {
        (EnumDiffKind::DeleteFile | EnumDiffKind::DeleteDir, EnumDiffReason::KindMismatch) => 0,
        (EnumDiffKind::CreateDir, _) => 1,
        (EnumDiffKind::CreateFile | EnumDiffKind::UpdateFile, _) => 2,
        (EnumDiffKind::DeleteFile, _) => 3,
        (EnumDiffKind::DeleteDir, _) => 4,
    }
}

fn order_for_execution(mut l_diffs: Vec<SpecDiffEntry>) -> Vec<SpecDiffEntry> {
    l_diffs.sort_by(|a, b| {
        let key_a = (phase_of(a), a.kind == EnumDiffKind::DeleteDir);
        let key_b = (phase_of(b), b.kind == EnumDiffKind::DeleteDir);
        key_a.cmp(&key_b).then_with(|| {
            if a.kind == EnumDiffKind::DeleteDir {
                b.path
                    .depth()
                    .cmp(&a.path.depth())
                    .then_with(|| a.path.cmp(&b.path))
            } else {
                a.path.cmp(&b.path)
            }
        })
    });
    l_diffs
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Apply

fn is_cancelled(spec_mr_options: &SpecMirrorOptions) -> bool {
    spec_mr_options
        .cancel
        .as_ref()
        .is_some_and(|c| c.is_cancelled())
}

enum EnumTransferOutcome {
    Done,
    Failed(FsError),
    Cancelled,
}

/// Make the destination tree match the source tree.
///
/// Failures are recorded per diff entry in the returned report; entries
/// beneath a directory that could not be created are skipped. With
/// `if_fail_fast` the first failure aborts the run.
pub fn mirror(
    fs_src: &dyn FileSystem,
    path_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_dst: &VfsPath,
    spec_mr_options: &SpecMirrorOptions,
) -> Result<ReportMirror, TreeError> {
    let walker = validate_options(spec_mr_options)?;
    let b_dst_exists = check_roots(fs_src, path_src, fs_dst, path_dst)?;
    let spec_plan = build_plan(
        fs_src,
        path_src,
        fs_dst,
        path_dst,
        spec_mr_options,
        walker,
        b_dst_exists,
    )?;

    let mut builder_mr_report = ReportMirrorBuilder {
        cnt_unchanged: spec_plan.cnt_unchanged,
        errors: spec_plan.errors,
        ..ReportMirrorBuilder::default()
    };

    if spec_mr_options.if_dry_run {
        builder_mr_report.cnt_skipped = spec_plan.l_diffs.len() as u64;
        builder_mr_report.l_diffs = spec_plan.l_diffs;
        let report = builder_mr_report.build();
        info!("{}", report.format("[MIRROR][DRY-RUN]"));
        return Ok(report);
    }

    if !b_dst_exists {
        fs_dst
            .make_dirs(path_dst)
            .map_err(|e| TreeError::DestinationInitFailed {
                path: path_dst.clone(),
                error: e,
            })?;
    }

    apply_plan(
        fs_src,
        path_src,
        fs_dst,
        path_dst,
        spec_mr_options,
        &spec_plan.l_diffs,
        &mut builder_mr_report,
    )?;
    builder_mr_report.l_diffs = spec_plan.l_diffs;

    let report = builder_mr_report.build();
    info!("{report}");
    Ok(report)
}

fn is_under_failed_dir(path: &VfsPath, set_failed_dirs: &HashSet<VfsPath>) -> bool {
    !set_failed_dirs.is_empty() && path.ancestors().iter().any(|v| set_failed_dirs.contains(v))
}

fn record_failure(
    diff: &SpecDiffEntry,
    path_dst: &VfsPath,
    error: FsError,
    spec_mr_options: &SpecMirrorOptions,
    builder_mr_report: &mut ReportMirrorBuilder,
) -> Result<(), TreeError> {
    if spec_mr_options.if_fail_fast {
        return Err(TreeError::Aborted {
            path: path_dst.clone(),
            error,
        });
    }
    builder_mr_report.add_failure(diff.clone(), error);
    Ok(())
}

fn apply_plan(
    fs_src: &dyn FileSystem,
    path_root_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_root_dst: &VfsPath,
    spec_mr_options: &SpecMirrorOptions,
    l_diffs: &[SpecDiffEntry],
    builder_mr_report: &mut ReportMirrorBuilder,
) -> Result<(), TreeError> {
    let mut set_failed_dirs: HashSet<VfsPath> = HashSet::new();
    let mut l_transfers: Vec<&SpecDiffEntry> = Vec::new();

    for diff in l_diffs {
        if is_cancelled(spec_mr_options) {
            return Err(TreeError::Cancelled);
        }
        if matches!(diff.kind, EnumDiffKind::CreateFile | EnumDiffKind::UpdateFile) {
            l_transfers.push(diff);
            continue;
        }
        // Transfers run as one batch once every directory exists.
        if matches!(diff.kind, EnumDiffKind::DeleteFile | EnumDiffKind::DeleteDir)
            && diff.reason != EnumDiffReason::KindMismatch
            && !l_transfers.is_empty()
        {
            apply_transfers(
                fs_src,
                path_root_src,
                fs_dst,
                path_root_dst,
                spec_mr_options,
                std::mem::take(&mut l_transfers),
                &set_failed_dirs,
                builder_mr_report,
            )?;
        }

        let path_dst = path_root_dst.join(&diff.path);
        if diff.kind == EnumDiffKind::CreateDir && is_under_failed_dir(&diff.path, &set_failed_dirs)
        {
            debug!(path = %path_dst, "Skipped below a directory that failed to create");
            set_failed_dirs.insert(diff.path.clone());
            builder_mr_report.add_skipped();
            continue;
        }
        let res_apply = match diff.kind {
            EnumDiffKind::CreateDir => fs_dst.create_dir(&path_dst, true),
            EnumDiffKind::DeleteFile => fs_dst.remove(&path_dst),
            EnumDiffKind::DeleteDir => fs_dst.remove_dir(&path_dst),
            EnumDiffKind::CreateFile | EnumDiffKind::UpdateFile => continue,
        };
        match res_apply {
            Ok(()) => builder_mr_report.add_applied(diff.kind),
            Err(e) => {
                if diff.kind == EnumDiffKind::CreateDir {
                    set_failed_dirs.insert(diff.path.clone());
                }
                record_failure(diff, &path_dst, e, spec_mr_options, builder_mr_report)?;
            }
        }
    }

    apply_transfers(
        fs_src,
        path_root_src,
        fs_dst,
        path_root_dst,
        spec_mr_options,
        l_transfers,
        &set_failed_dirs,
        builder_mr_report,
    )
}

#[allow(clippy::too_many_arguments)]
fn apply_transfers(
    fs_src: &dyn FileSystem,
    path_root_src: &VfsPath,
    fs_dst: &dyn FileSystem,
    path_root_dst: &VfsPath,
    spec_mr_options: &SpecMirrorOptions,
    l_transfers: Vec<&SpecDiffEntry>,
    set_failed_dirs: &HashSet<VfsPath>,
    builder_mr_report: &mut ReportMirrorBuilder,
) -> Result<(), TreeError> {
    let mut l_tasks = Vec::with_capacity(l_transfers.len());
    for diff in l_transfers {
        if is_under_failed_dir(&diff.path, set_failed_dirs) {
            builder_mr_report.add_skipped();
        } else {
            l_tasks.push(diff);
        }
    }
    if l_tasks.is_empty() {
        return Ok(());
    }

    let n_workers_max = calculate_worker_limit(spec_mr_options.num_workers_max);
    let l_results = run_tasks(
        l_tasks,
        n_workers_max,
        |diff| {
            if is_cancelled(spec_mr_options) {
                return (diff, EnumTransferOutcome::Cancelled);
            }
            let enum_outcome = match transfer_file(
                fs_src,
                &path_root_src.join(&diff.path),
                fs_dst,
                &path_root_dst.join(&diff.path),
                spec_mr_options.n_buffer_size,
                spec_mr_options.if_preserve_time,
            ) {
                Ok(_) => EnumTransferOutcome::Done,
                Err(e) => EnumTransferOutcome::Failed(e),
            };
            (diff, enum_outcome)
        },
        &mut builder_mr_report.warnings,
    );

    let mut b_cancelled = false;
    for (diff, enum_outcome) in l_results {
        match enum_outcome {
            EnumTransferOutcome::Done => builder_mr_report.add_applied(diff.kind),
            EnumTransferOutcome::Cancelled => b_cancelled = true,
            EnumTransferOutcome::Failed(e) => {
                let path_dst = path_root_dst.join(&diff.path);
                record_failure(diff, &path_dst, e, spec_mr_options, builder_mr_report)?;
            }
        }
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
    use std::sync::Arc;
    use std::time::{Duration, UNIX_EPOCH};

    use super::{compare_files, mirror, plan_mirror};
    use crate::backend::{MemoryFs, ReadOnlyFs};
    use crate::base::FileSystem;
    use crate::info::{ResourceInfo, SpecInfoDetails};
    use crate::path::VfsPath;
    use crate::spec::{
        CancelToken, EnumDiffKind, EnumDiffReason, EnumMirrorCompareRule, SpecMirrorOptions,
        SpecWalkOptions, TreeError,
    };

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

    fn diff_pairs(l_diffs: &[crate::spec::SpecDiffEntry]) -> Vec<(String, EnumDiffKind)> {
        l_diffs
            .iter()
            .map(|v| (v.path.to_string(), v.kind))
            .collect()
    }

    #[test]
    fn basic_scenario_creates_missing_entries_in_order() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/a.txt", "a");
        write_text(&fs_src, "/sub/b.txt", "b");

        let report = mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &SpecMirrorOptions::default(),
        )
        .expect("mirror");
        assert_eq!(
            diff_pairs(&report.l_diffs),
            vec![
                ("/sub".to_string(), EnumDiffKind::CreateDir),
                ("/a.txt".to_string(), EnumDiffKind::CreateFile),
                ("/sub/b.txt".to_string(), EnumDiffKind::CreateFile),
            ]
        );
        assert_eq!(report.cnt_created_dirs, 1);
        assert_eq!(report.cnt_created_files, 2);
        assert_eq!(report.error_count(), 0);
        assert_eq!(read_text(&fs_dst, "/sub/b.txt"), "b");
    }

    #[test]
    fn second_run_is_empty() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/x/y/z.txt", "z");
        write_text(&fs_src, "/top.txt", "t");

        let spec_mr_options = SpecMirrorOptions::default();
        mirror(&fs_src, &VfsPath::root(), &fs_dst, &p("/copy"), &spec_mr_options)
            .expect("first run");
        let report = mirror(&fs_src, &VfsPath::root(), &fs_dst, &p("/copy"), &spec_mr_options)
            .expect("second run");
        assert!(report.is_noop());
        assert_eq!(report.cnt_unchanged, 2);

        let spec_mr_options = SpecMirrorOptions {
            rule_compare: EnumMirrorCompareRule::Exact,
            ..SpecMirrorOptions::default()
        };
        let spec_plan = plan_mirror(&fs_src, &VfsPath::root(), &fs_dst, &p("/copy"), &spec_mr_options)
            .expect("plan");
        assert!(spec_plan.l_diffs.is_empty());
    }

    #[test]
    fn directories_precede_their_contents() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/x/y/z.txt", "z");

        let spec_plan = plan_mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &SpecMirrorOptions::default(),
        )
        .expect("plan");
        assert_eq!(
            diff_pairs(&spec_plan.l_diffs),
            vec![
                ("/x".to_string(), EnumDiffKind::CreateDir),
                ("/x/y".to_string(), EnumDiffKind::CreateDir),
                ("/x/y/z.txt".to_string(), EnumDiffKind::CreateFile),
            ]
        );
    }

    #[test]
    fn only_stale_files_are_updated() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/same.txt", "same");
        write_text(&fs_src, "/grown.txt", "longer");
        write_text(&fs_src, "/touched.txt", "abc");
        mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &SpecMirrorOptions::default(),
        )
        .expect("first run");

        write_text(&fs_src, "/grown.txt", "longer still");
        let t_future = UNIX_EPOCH + Duration::from_secs(4_000_000_000);
        fs_src
            .set_modified(&p("/touched.txt"), t_future)
            .expect("set modified");

        let spec_plan = plan_mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &SpecMirrorOptions::default(),
        )
        .expect("plan");
        let l_reasons: Vec<_> = spec_plan
            .l_diffs
            .iter()
            .map(|v| (v.path.to_string(), v.reason))
            .collect();
        assert_eq!(
            l_reasons,
            vec![
                ("/grown.txt".to_string(), EnumDiffReason::SizeMismatch),
                ("/touched.txt".to_string(), EnumDiffReason::DestinationOlder),
            ]
        );
        assert_eq!(spec_plan.cnt_unchanged, 1);

        let spec_mr_options = SpecMirrorOptions {
            rule_compare: EnumMirrorCompareRule::SizeOnly,
            ..SpecMirrorOptions::default()
        };
        let spec_plan = plan_mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &spec_mr_options,
        )
        .expect("plan");
        assert_eq!(spec_plan.l_diffs.len(), 1);
    }

    #[test]
    fn tolerance_absorbs_small_time_skew() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/a.txt", "a");
        write_text(&fs_dst, "/a.txt", "a");
        let t_base = UNIX_EPOCH + Duration::from_secs(1_000_000);
        fs_dst.set_modified(&p("/a.txt"), t_base).expect("set");
        fs_src
            .set_modified(&p("/a.txt"), t_base + Duration::from_secs(1))
            .expect("set");

        let spec_mr_options = SpecMirrorOptions {
            rule_compare: EnumMirrorCompareRule::Exact,
            duration_mtime_tolerance: Duration::from_secs(2),
            ..SpecMirrorOptions::default()
        };
        let spec_plan = plan_mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &spec_mr_options,
        )
        .expect("plan");
        assert!(spec_plan.l_diffs.is_empty());

        let spec_mr_options = SpecMirrorOptions {
            rule_compare: EnumMirrorCompareRule::Exact,
            ..SpecMirrorOptions::default()
        };
        let spec_plan = plan_mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &spec_mr_options,
        )
        .expect("plan");
        assert_eq!(
            spec_plan.l_diffs[0].reason,
            EnumDiffReason::ModifiedTimeMismatch
        );
    }

    #[test]
    fn copy_only_mode_keeps_extra_entries() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/keep.txt", "k");
        write_text(&fs_dst, "/extra/nested/deep.txt", "d");
        write_text(&fs_dst, "/stray.txt", "s");

        let spec_mr_options = SpecMirrorOptions {
            if_delete: false,
            ..SpecMirrorOptions::default()
        };
        let report = mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &spec_mr_options,
        )
        .expect("mirror");
        assert_eq!(report.cnt_deleted_files + report.cnt_deleted_dirs, 0);
        assert_eq!(read_text(&fs_dst, "/extra/nested/deep.txt"), "d");
        assert!(fs_dst.exists(&p("/stray.txt")).expect("exists"));
    }

    #[test]
    fn sync_mode_deletes_bottom_up() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/keep.txt", "k");
        write_text(&fs_dst, "/extra/nested/deep.txt", "d");

        let report = mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &SpecMirrorOptions::default(),
        )
        .expect("mirror");
        assert_eq!(
            diff_pairs(&report.l_diffs),
            vec![
                ("/keep.txt".to_string(), EnumDiffKind::CreateFile),
                ("/extra/nested/deep.txt".to_string(), EnumDiffKind::DeleteFile),
                ("/extra/nested".to_string(), EnumDiffKind::DeleteDir),
                ("/extra".to_string(), EnumDiffKind::DeleteDir),
            ]
        );
        assert_eq!(report.error_count(), 0);
        assert!(!fs_dst.exists(&p("/extra")).expect("exists"));
    }

    #[test]
    fn excluded_destination_entries_survive() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/a.txt", "a");
        write_text(&fs_dst, "/.cache/blob", "b");

        let spec_mr_options = SpecMirrorOptions {
            spec_walk_options: SpecWalkOptions {
                patterns_exclude_dirs: Some(vec![".cache".to_string()]),
                ..SpecWalkOptions::default()
            },
            ..SpecMirrorOptions::default()
        };
        mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &spec_mr_options,
        )
        .expect("mirror");
        assert!(fs_dst.exists(&p("/.cache/blob")).expect("exists"));
    }

    #[test]
    fn destination_only_dir_with_filtered_files_is_kept() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/a.txt", "a");
        write_text(&fs_dst, "/old/x.md", "x");
        write_text(&fs_dst, "/old/y.txt", "y");
        write_text(&fs_dst, "/gone/z.txt", "z");

        let spec_mr_options = SpecMirrorOptions {
            spec_walk_options: SpecWalkOptions {
                patterns_include_files: Some(vec!["*.txt".to_string()]),
                ..SpecWalkOptions::default()
            },
            ..SpecMirrorOptions::default()
        };
        let report = mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &spec_mr_options,
        )
        .expect("first run");
        assert_eq!(
            diff_pairs(&report.l_diffs),
            vec![
                ("/a.txt".to_string(), EnumDiffKind::CreateFile),
                ("/gone/z.txt".to_string(), EnumDiffKind::DeleteFile),
                ("/old/y.txt".to_string(), EnumDiffKind::DeleteFile),
                ("/gone".to_string(), EnumDiffKind::DeleteDir),
            ]
        );
        assert_eq!(report.error_count(), 0);
        assert_eq!(read_text(&fs_dst, "/old/x.md"), "x");
        assert!(!fs_dst.exists(&p("/gone")).expect("exists"));

        let report = mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &spec_mr_options,
        )
        .expect("second run");
        assert!(report.is_noop());
        assert_eq!(report.error_count(), 0);
    }

    #[test]
    fn kind_mismatch_clears_filtered_entries() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/thing.txt", "file");
        write_text(&fs_dst, "/thing.txt/hidden.md", "h");

        let spec_mr_options = SpecMirrorOptions {
            spec_walk_options: SpecWalkOptions {
                patterns_include_files: Some(vec!["*.txt".to_string()]),
                ..SpecWalkOptions::default()
            },
            ..SpecMirrorOptions::default()
        };
        let report = mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &spec_mr_options,
        )
        .expect("mirror");
        assert_eq!(report.error_count(), 0);
        assert_eq!(read_text(&fs_dst, "/thing.txt"), "file");
    }

    #[test]
    fn missing_modified_time_counts_as_stale() {
        let details = SpecInfoDetails {
            size: 3,
            ..SpecInfoDetails::default()
        };
        let info_src = ResourceInfo::new("f", false).with_details(SpecInfoDetails {
            modified: Some(UNIX_EPOCH),
            ..details
        });
        let info_dst = ResourceInfo::new("f", false).with_details(details);

        assert_eq!(
            compare_files(
                &info_src,
                &info_dst,
                EnumMirrorCompareRule::DestinationOlder,
                Duration::ZERO
            ),
            Some(EnumDiffReason::ModifiedTimeMismatch)
        );
        assert_eq!(
            compare_files(&info_dst, &info_dst, EnumMirrorCompareRule::Exact, Duration::ZERO),
            Some(EnumDiffReason::ModifiedTimeMismatch)
        );
        assert_eq!(
            compare_files(&info_src, &info_dst, EnumMirrorCompareRule::SizeOnly, Duration::ZERO),
            None
        );
    }

    #[test]
    fn kind_mismatch_replaces_destination_entry() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/thing/inner.txt", "i");
        write_text(&fs_src, "/other", "o");
        write_text(&fs_dst, "/thing", "file");
        write_text(&fs_dst, "/other/leftover.txt", "l");

        let report = mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &SpecMirrorOptions::default(),
        )
        .expect("mirror");
        assert_eq!(report.error_count(), 0);
        assert!(fs_dst.is_dir(&p("/thing")).expect("is_dir"));
        assert_eq!(read_text(&fs_dst, "/thing/inner.txt"), "i");
        assert_eq!(read_text(&fs_dst, "/other"), "o");
        assert!(
            report
                .l_diffs
                .iter()
                .take(3)
                .all(|v| v.reason == EnumDiffReason::KindMismatch)
        );
    }

    #[test]
    fn dry_run_plans_without_writing() {
        let fs_src = MemoryFs::new();
        let fs_dst = MemoryFs::new();
        write_text(&fs_src, "/a.txt", "a");

        let spec_mr_options = SpecMirrorOptions {
            if_dry_run: true,
            ..SpecMirrorOptions::default()
        };
        let report = mirror(&fs_src, &VfsPath::root(), &fs_dst, &p("/out"), &spec_mr_options)
            .expect("dry run");
        assert_eq!(report.l_diffs.len(), 1);
        assert_eq!(report.cnt_skipped, 1);
        assert!(!fs_dst.exists(&p("/out")).expect("exists"));
    }

    #[test]
    fn failures_are_recorded_or_abort() {
        let fs_src = MemoryFs::new();
        write_text(&fs_src, "/d/a.txt", "a");
        write_text(&fs_src, "/b.txt", "b");
        let fs_dst = ReadOnlyFs::new(Arc::new(MemoryFs::new()));

        let report = mirror(
            &fs_src,
            &VfsPath::root(),
            &fs_dst,
            &VfsPath::root(),
            &SpecMirrorOptions::default(),
        )
        .expect("mirror");
        // `/d` fails; `/d/a.txt` is skipped; `/b.txt` fails.
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.cnt_skipped, 1);

        let spec_mr_options = SpecMirrorOptions {
            if_fail_fast: true,
            ..SpecMirrorOptions::default()
        };
        assert!(matches!(
            mirror(
                &fs_src,
                &VfsPath::root(),
                &fs_dst,
                &VfsPath::root(),
                &spec_mr_options
            ),
            Err(TreeError::Aborted { .. })
        ));
    }

    #[test]
    fn setup_errors_and_cancel() {
        let fs = MemoryFs::new();
        write_text(&fs, "/src/a.txt", "a");
        write_text(&fs, "/file", "f");

        assert!(matches!(
            plan_mirror(&fs, &p("/src"), &fs, &p("/src/mirror"), &SpecMirrorOptions::default()),
            Err(TreeError::SourceDestinationOverlap { .. })
        ));
        assert!(matches!(
            plan_mirror(&fs, &p("/missing"), &fs, &p("/out"), &SpecMirrorOptions::default()),
            Err(TreeError::SourceNotDirectory(_))
        ));
        assert!(matches!(
            plan_mirror(&fs, &p("/src"), &fs, &p("/file"), &SpecMirrorOptions::default()),
            Err(TreeError::DestinationInitFailed { .. })
        ));

        let cancel = CancelToken::new();
        cancel.cancel();
        let spec_mr_options = SpecMirrorOptions {
            cancel: Some(cancel),
            ..SpecMirrorOptions::default()
        };
        assert!(matches!(
            mirror(&fs, &p("/src"), &fs, &p("/out"), &spec_mr_options),
            Err(TreeError::Cancelled)
        ));
        assert!(!fs.exists(&p("/out")).expect("exists"));
    }
}
