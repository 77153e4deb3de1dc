//! Copy/mirror report models and mutable report builders.

use std::collections::BTreeMap;
use std::fmt;

use crate::path::VfsPath;
use crate::spec::{EnumDiffKind, FsError, SpecDiffEntry, SpecFsFailure};

////////////////////////////////////////////////////////////////////////////////
// #region ReportCopy

/// Aggregate counters and diagnostics for one copy/move run.
#[derive(Debug, Default, Clone)]
pub struct ReportCopy {
    /// Number of scanned entries that matched filters.
    pub cnt_matched: u64,
    /// Total scanned directory/file entries.
    pub cnt_scanned: u64,
    /// Number of entries successfully committed.
    pub cnt_copied: u64,
    /// Number of entries skipped by strategy, policy or dry-run.
    pub cnt_skipped: u64,
    /// Subset of `cnt_copied` handled by a backend-native fast path.
    pub cnt_fast_path: u64,
    /// Non-fatal warnings collected during traversal/copy.
    pub warnings: Vec<String>,
    /// Per-entry failures.
    pub errors: Vec<SpecFsFailure>,
}

impl ReportCopy {
    /// Number of collected hard errors.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_matched".to_string(), self.cnt_matched);
        dict_counts.insert("cnt_scanned".to_string(), self.cnt_scanned);
        dict_counts.insert("cnt_copied".to_string(), self.cnt_copied);
        dict_counts.insert("cnt_skipped".to_string(), self.cnt_skipped);
        dict_counts.insert("cnt_fast_path".to_string(), self.cnt_fast_path);
        dict_counts.insert("cnt_errors".to_string(), self.error_count() as u64);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} matched={} scanned={} copied={} skipped={} fast_path={} errors={} warnings={}",
            dict_counts["cnt_matched"],
            dict_counts["cnt_scanned"],
            dict_counts["cnt_copied"],
            dict_counts["cnt_skipped"],
            dict_counts["cnt_fast_path"],
            dict_counts["cnt_errors"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[COPY]"))
    }
}

/// Mutable accumulator for copy statistics.
#[derive(Debug, Default, Clone)]
pub struct ReportCopyBuilder {
    pub cnt_matched: u64,
    pub cnt_scanned: u64,
    pub cnt_copied: u64,
    pub cnt_skipped: u64,
    pub cnt_fast_path: u64,
    pub errors: Vec<SpecFsFailure>,
    pub warnings: Vec<String>,
}

impl ReportCopyBuilder {
    /// Increment one or more named counters by `value`.
    ///
    /// Unknown names are ignored.
    pub fn add_counts(&mut self, field_names: &[&str], value: u64) {
        for field_name in field_names {
            match *field_name {
                "cnt_matched" => self.cnt_matched += value,
                "cnt_scanned" => self.cnt_scanned += value,
                "cnt_copied" => self.cnt_copied += value,
                "cnt_skipped" => self.cnt_skipped += value,
                "cnt_fast_path" => self.cnt_fast_path += value,
                _ => {}
            }
        }
    }

    pub fn add_copied(&mut self) {
        self.cnt_copied += 1;
    }

    pub fn add_skipped(&mut self) {
        self.cnt_skipped += 1;
    }

    /// Record one file committed through a native fast path.
    pub fn add_fast_path(&mut self) {
        self.cnt_copied += 1;
        self.cnt_fast_path += 1;
    }

    /// Add one path-scoped error.
    pub fn add_error(&mut self, path: VfsPath, error: FsError) {
        self.errors.push(SpecFsFailure { path, error });
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportCopy {
        ReportCopy {
            cnt_matched: self.cnt_matched,
            cnt_scanned: self.cnt_scanned,
            cnt_copied: self.cnt_copied,
            cnt_skipped: self.cnt_skipped,
            cnt_fast_path: self.cnt_fast_path,
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportMirror

/// One diff entry that failed to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecMirrorFailure {
    pub diff: SpecDiffEntry,
    pub error: FsError,
}

/// Outcome of one mirror run.
#[derive(Debug, Default, Clone)]
pub struct ReportMirror {
    /// Planned entries in execution order. In dry-run mode nothing was applied.
    pub l_diffs: Vec<SpecDiffEntry>,
    pub cnt_created_dirs: u64,
    pub cnt_created_files: u64,
    pub cnt_updated_files: u64,
    pub cnt_deleted_files: u64,
    pub cnt_deleted_dirs: u64,
    /// Entries not applied because of dry-run or a failed dependency.
    pub cnt_skipped: u64,
    /// Source files equal to their destination counterpart.
    pub cnt_unchanged: u64,
    /// Failed diff entries.
    pub failures: Vec<SpecMirrorFailure>,
    /// Listing failures on either side.
    pub errors: Vec<SpecFsFailure>,
    pub warnings: Vec<String>,
}

impl ReportMirror {
    pub fn error_count(&self) -> usize {
        self.failures.len() + self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Whether the destination needed no change at all.
    pub fn is_noop(&self) -> bool {
        self.l_diffs.is_empty()
    }

    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_diffs".to_string(), self.l_diffs.len() as u64);
        dict_counts.insert("cnt_created_dirs".to_string(), self.cnt_created_dirs);
        dict_counts.insert("cnt_created_files".to_string(), self.cnt_created_files);
        dict_counts.insert("cnt_updated_files".to_string(), self.cnt_updated_files);
        dict_counts.insert("cnt_deleted_files".to_string(), self.cnt_deleted_files);
        dict_counts.insert("cnt_deleted_dirs".to_string(), self.cnt_deleted_dirs);
        dict_counts.insert("cnt_skipped".to_string(), self.cnt_skipped);
        dict_counts.insert("cnt_unchanged".to_string(), self.cnt_unchanged);
        dict_counts.insert("cnt_errors".to_string(), self.error_count() as u64);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} diffs={} created_dirs={} created_files={} updated={} deleted_files={} deleted_dirs={} unchanged={} skipped={} errors={} warnings={}",
            dict_counts["cnt_diffs"],
            dict_counts["cnt_created_dirs"],
            dict_counts["cnt_created_files"],
            dict_counts["cnt_updated_files"],
            dict_counts["cnt_deleted_files"],
            dict_counts["cnt_deleted_dirs"],
            dict_counts["cnt_unchanged"],
            dict_counts["cnt_skipped"],
            dict_counts["cnt_errors"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[MIRROR]"))
    }
}

/// Mutable accumulator for mirror statistics.
#[derive(Debug, Default, Clone)]
pub struct ReportMirrorBuilder {
    pub l_diffs: Vec<SpecDiffEntry>,
    pub cnt_created_dirs: u64,
    pub cnt_created_files: u64,
    pub cnt_updated_files: u64,
    pub cnt_deleted_files: u64,
    pub cnt_deleted_dirs: u64,
    pub cnt_skipped: u64,
    pub cnt_unchanged: u64,
    pub failures: Vec<SpecMirrorFailure>,
    pub errors: Vec<SpecFsFailure>,
    pub warnings: Vec<String>,
}

impl ReportMirrorBuilder {
    /// Count one successfully applied entry under its kind.
    pub fn add_applied(&mut self, enum_kind: EnumDiffKind) {
        match enum_kind {
            EnumDiffKind::CreateDir => self.cnt_created_dirs += 1,
            EnumDiffKind::CreateFile => self.cnt_created_files += 1,
            EnumDiffKind::UpdateFile => self.cnt_updated_files += 1,
            EnumDiffKind::DeleteFile => self.cnt_deleted_files += 1,
            EnumDiffKind::DeleteDir => self.cnt_deleted_dirs += 1,
        }
    }

    pub fn add_skipped(&mut self) {
        self.cnt_skipped += 1;
    }

    pub fn add_failure(&mut self, diff: SpecDiffEntry, error: FsError) {
        self.failures.push(SpecMirrorFailure { diff, error });
    }

    pub fn build(self) -> ReportMirror {
        ReportMirror {
            l_diffs: self.l_diffs,
            cnt_created_dirs: self.cnt_created_dirs,
            cnt_created_files: self.cnt_created_files,
            cnt_updated_files: self.cnt_updated_files,
            cnt_deleted_files: self.cnt_deleted_files,
            cnt_deleted_dirs: self.cnt_deleted_dirs,
            cnt_skipped: self.cnt_skipped,
            cnt_unchanged: self.cnt_unchanged,
            failures: self.failures,
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
