//! Wildcard matching over filesystem trees.
//!
//! Patterns are `/`-separated and evaluated relative to a search root:
//! `*` matches a run of characters within one segment, `?` one character,
//! `[...]` a class, and a whole-segment `**` any number of segments
//! (including none). A trailing `/` restricts matches to directories.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};

use crate::base::FileSystem;
use crate::info::{ResourceInfo, SpecNamespaces};
use crate::path::VfsPath;
use crate::spec::{EnumErrorPolicy, FsError, GlobError, SpecGlobOptions, SpecWalkOptions};
use crate::walk::{WalkIter, Walker};

#[derive(Debug, Clone)]
enum EnumGlobSegment {
    /// `**`
    Recursive,
    Match {
        matcher: GlobMatcher,
        /// Segment text starts with a literal `.`.
        if_dot_literal: bool,
    },
}

/// Compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    c_pattern: String,
    l_segments: Vec<EnumGlobSegment>,
    if_dirs_only: bool,
    if_exclude_hidden: bool,
    /// Depth-bounded walk every search starts from.
    walker: Walker,
}

/// One glob match.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecGlobMatch {
    /// Absolute path within the searched filesystem.
    pub path: VfsPath,
    pub info: ResourceInfo,
}

/// Totals over every match of a pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecGlobCount {
    pub n_files: u64,
    pub n_dirs: u64,
    /// Sum of matched file sizes.
    pub n_bytes: u64,
}

fn malformed(c_pattern: &str, reason: impl Into<String>) -> GlobError {
    GlobError::MalformedPattern {
        pattern: c_pattern.to_string(),
        reason: reason.into(),
    }
}

impl GlobPattern {
    pub fn new(c_pattern: &str, spec_glob_options: &SpecGlobOptions) -> Result<Self, GlobError> {
        let if_dirs_only = c_pattern.ends_with('/');
        let mut l_segments = Vec::new();
        for c_segment in c_pattern.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if c_segment == ".." {
                return Err(malformed(c_pattern, "`..` is not allowed"));
            }
            if c_segment == "**" {
                // Consecutive `**` are equivalent to one.
                if !matches!(l_segments.last(), Some(EnumGlobSegment::Recursive)) {
                    l_segments.push(EnumGlobSegment::Recursive);
                }
                continue;
            }
            if c_segment.contains("**") {
                return Err(malformed(
                    c_pattern,
                    format!("`**` must be a whole segment, found `{c_segment}`"),
                ));
            }
            let matcher = GlobBuilder::new(c_segment)
                .literal_separator(true)
                .case_insensitive(spec_glob_options.if_ignore_case)
                .build()
                .map_err(|e| malformed(c_pattern, e.to_string()))?
                .compile_matcher();
            l_segments.push(EnumGlobSegment::Match {
                matcher,
                if_dot_literal: c_segment.starts_with('.'),
            });
        }
        if l_segments.is_empty() {
            return Err(malformed(c_pattern, "empty pattern"));
        }
        let n_depth_max = if l_segments
            .iter()
            .any(|s| matches!(s, EnumGlobSegment::Recursive))
        {
            None
        } else {
            Some(l_segments.len())
        };
        let walker = Walker::new(SpecWalkOptions {
            depth_limit: n_depth_max,
            rule_on_error: EnumErrorPolicy::Raise,
            ..SpecWalkOptions::default()
        })
        .map_err(|e| malformed(c_pattern, e.to_string()))?;
        Ok(Self {
            c_pattern: c_pattern.to_string(),
            l_segments,
            if_dirs_only,
            if_exclude_hidden: spec_glob_options.if_exclude_hidden,
            walker,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.c_pattern
    }

    /// Deepest level a match can sit at, `None` when the pattern has `**`.
    pub fn max_depth(&self) -> Option<usize> {
        self.walker.options().depth_limit
    }

    fn closure(&self, set_states: &mut BTreeSet<usize>) {
        // `**` can match zero segments: each recursive position also admits
        // the position after it.
        let mut l_todo: Vec<usize> = set_states.iter().copied().collect();
        while let Some(n_pos) = l_todo.pop() {
            if let Some(EnumGlobSegment::Recursive) = self.l_segments.get(n_pos)
                && set_states.insert(n_pos + 1)
            {
                l_todo.push(n_pos + 1);
            }
        }
    }

    fn step(&self, set_states: &BTreeSet<usize>, name: &str) -> BTreeSet<usize> {
        let b_hidden = self.if_exclude_hidden && name.starts_with('.');
        let mut set_next = BTreeSet::new();
        for &n_pos in set_states {
            match self.l_segments.get(n_pos) {
                Some(EnumGlobSegment::Recursive) => {
                    if !b_hidden {
                        set_next.insert(n_pos);
                    }
                }
                Some(EnumGlobSegment::Match {
                    matcher,
                    if_dot_literal,
                }) => {
                    if (!b_hidden || *if_dot_literal) && matcher.is_match(name) {
                        set_next.insert(n_pos + 1);
                    }
                }
                None => {}
            }
        }
        self.closure(&mut set_next);
        set_next
    }

    fn states_after(&self, path_rel: &VfsPath) -> BTreeSet<usize> {
        let mut set_states = BTreeSet::from([0]);
        self.closure(&mut set_states);
        for c_segment in path_rel.segments() {
            if set_states.is_empty() {
                break;
            }
            set_states = self.step(&set_states, c_segment);
        }
        set_states
    }

    /// Whether a path relative to the search root matches.
    pub fn is_match(&self, path_rel: &VfsPath, is_dir: bool) -> bool {
        if self.if_dirs_only && !is_dir {
            return false;
        }
        if path_rel.is_root() {
            return false;
        }
        self.states_after(path_rel)
            .contains(&self.l_segments.len())
    }

    /// Whether anything beneath the directory `path_rel` could still match.
    pub fn could_descend(&self, path_rel: &VfsPath) -> bool {
        let n_len = self.l_segments.len();
        self.states_after(path_rel).iter().any(|&n_pos| n_pos < n_len)
    }

    /// Lazily yield every match under `path`, in depth-first listing order.
    pub fn iter<'a>(
        &self,
        fs: &'a dyn FileSystem,
        path: &VfsPath,
        namespaces: SpecNamespaces,
    ) -> GlobIter<'a> {
        let pattern = Arc::new(self.clone());
        let path_root = path.clone();
        let pattern_filter = Arc::clone(&pattern);
        let path_root_filter = path_root.clone();
        let iter_walk = self.walker.clone().with_namespaces(namespaces).walk_filtered(
            fs,
            path,
            Box::new(move |path_dir: &VfsPath| {
                path_dir
                    .strip_prefix(&path_root_filter)
                    .is_some_and(|path_rel| pattern_filter.could_descend(&path_rel))
            }),
        );
        GlobIter {
            iter_walk,
            pattern,
            path_root,
            dq_ready: VecDeque::new(),
        }
    }

    /// Count matched files, directories and file bytes.
    pub fn count(&self, fs: &dyn FileSystem, path: &VfsPath) -> Result<SpecGlobCount, FsError> {
        let mut spec_count = SpecGlobCount::default();
        for res_match in self.iter(fs, path, SpecNamespaces::details()) {
            let spec_match = res_match?;
            if spec_match.info.is_dir() {
                spec_count.n_dirs += 1;
            } else {
                spec_count.n_files += 1;
                spec_count.n_bytes += spec_match.info.size().unwrap_or(0);
            }
        }
        Ok(spec_count)
    }

    /// Delete every match, directories with their contents. Returns the
    /// number of matches removed.
    pub fn remove(&self, fs: &dyn FileSystem, path: &VfsPath) -> Result<usize, FsError> {
        let mut l_matches = self
            .iter(fs, path, SpecNamespaces::basic())
            .collect::<Result<Vec<_>, _>>()?;
        // Deepest first so nested matches go before the directories holding them.
        l_matches.sort_by(|a, b| b.path.depth().cmp(&a.path.depth()));

        let mut n_removed = 0;
        for spec_match in l_matches {
            let res_remove = if spec_match.info.is_dir() {
                fs.remove_tree(&spec_match.path)
            } else {
                fs.remove(&spec_match.path)
            };
            match res_remove {
                Ok(()) => n_removed += 1,
                Err(FsError::ResourceNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(n_removed)
    }
}

/// Compile `c_pattern` and iterate its matches under `path`.
pub fn glob<'a>(
    fs: &'a dyn FileSystem,
    path: &VfsPath,
    c_pattern: &str,
    spec_glob_options: &SpecGlobOptions,
) -> Result<GlobIter<'a>, GlobError> {
    let pattern = GlobPattern::new(c_pattern, spec_glob_options)?;
    Ok(pattern.iter(fs, path, SpecNamespaces::basic()))
}

/// Pull-based match sequence. The first listing error is yielded and ends
/// the sequence.
pub struct GlobIter<'a> {
    iter_walk: WalkIter<'a>,
    pattern: Arc<GlobPattern>,
    path_root: VfsPath,
    dq_ready: VecDeque<SpecGlobMatch>,
}

impl GlobIter<'_> {
    fn push_matches(&mut self, path_dir: &VfsPath, l_infos: Vec<ResourceInfo>) {
        for info in l_infos {
            let Ok(path) = path_dir.child(info.name()) else {
                continue;
            };
            let Some(path_rel) = path.strip_prefix(&self.path_root) else {
                continue;
            };
            if self.pattern.is_match(&path_rel, info.is_dir()) {
                self.dq_ready.push_back(SpecGlobMatch { path, info });
            }
        }
    }
}

impl Iterator for GlobIter<'_> {
    type Item = Result<SpecGlobMatch, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(spec_match) = self.dq_ready.pop_front() {
                return Some(Ok(spec_match));
            }
            let event = match self.iter_walk.next()? {
                Ok(event) => event,
                Err(e) => return Some(Err(e)),
            };
            self.push_matches(&event.path, event.l_dirs);
            if !self.pattern.if_dirs_only {
                self.push_matches(&event.path, event.l_files);
            }
        }
    }
}
