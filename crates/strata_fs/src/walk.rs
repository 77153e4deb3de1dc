//! Lazy directory tree traversal.

use std::collections::VecDeque;

use tracing::debug;

use crate::base::FileSystem;
use crate::info::{ResourceInfo, SpecNamespaces};
use crate::path::VfsPath;
use crate::spec::{EnumErrorPolicy, EnumWalkOrder, FsError, SpecWalkOptions, TreeError};
use crate::util::SpecWalkPatterns;

/// One visited directory.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecWalkEvent {
    /// Absolute path of the directory within its filesystem.
    pub path: VfsPath,
    /// Sub-directories surviving the exclude filters, in listing order.
    pub l_dirs: Vec<ResourceInfo>,
    /// Files surviving the include/exclude filters, in listing order.
    pub l_files: Vec<ResourceInfo>,
    /// Listing failure recorded under [`EnumErrorPolicy::Collect`].
    pub error: Option<FsError>,
}

impl SpecWalkEvent {
    fn failed(path: VfsPath, error: FsError) -> Self {
        Self {
            path,
            l_dirs: Vec::new(),
            l_files: Vec::new(),
            error: Some(error),
        }
    }
}

/// Predicate deciding whether the walker descends into a sub-directory.
pub type TypeDescendFilter<'a> = Box<dyn Fn(&VfsPath) -> bool + Send + 'a>;

/// Validated walk configuration.
///
/// Cheap to clone; every [`WalkIter`] carries its own copy so iterators only
/// borrow the filesystem.
#[derive(Debug, Clone)]
pub struct Walker {
    spec_walk_options: SpecWalkOptions,
    spec_patterns: SpecWalkPatterns,
}

impl Walker {
    pub fn new(spec_walk_options: SpecWalkOptions) -> Result<Self, TreeError> {
        if spec_walk_options.depth_limit == Some(0) {
            return Err(TreeError::InvalidDepthLimit(
                "Arg `depth_limit` must be >= 1 or None.".to_string(),
            ));
        }
        let spec_patterns = SpecWalkPatterns::from_options(&spec_walk_options)?;
        Ok(Self {
            spec_walk_options,
            spec_patterns,
        })
    }

    pub fn options(&self) -> &SpecWalkOptions {
        &self.spec_walk_options
    }

    /// Same walk, requesting other metadata namespaces.
    pub(crate) fn with_namespaces(mut self, namespaces: SpecNamespaces) -> Self {
        self.spec_walk_options.namespaces = namespaces;
        self
    }

    /// Walk the tree under `path`. Nothing is listed until the first item
    /// is pulled.
    pub fn walk<'a>(&self, fs: &'a dyn FileSystem, path: &VfsPath) -> WalkIter<'a> {
        WalkIter::new(self.clone(), fs, path.clone(), None)
    }

    /// Same as [`Walker::walk`], with an extra descent predicate.
    ///
    /// The predicate runs against each sub-directory path right before it
    /// would be listed, so a consumer may still update what it checks while
    /// handling the parent's event.
    pub fn walk_filtered<'a>(
        &self,
        fs: &'a dyn FileSystem,
        path: &VfsPath,
        filter_descend: TypeDescendFilter<'a>,
    ) -> WalkIter<'a> {
        WalkIter::new(self.clone(), fs, path.clone(), Some(filter_descend))
    }

    /// Every file under `path` as `(path, info)`.
    pub fn files<'a>(
        &self,
        fs: &'a dyn FileSystem,
        path: &VfsPath,
    ) -> impl Iterator<Item = Result<(VfsPath, ResourceInfo), FsError>> + use<'a> {
        self.walk(fs, path)
            .flat_map(|res_event| flatten_event(res_event, false, true))
    }

    /// Every directory under `path` (the root excluded) as `(path, info)`.
    pub fn dirs<'a>(
        &self,
        fs: &'a dyn FileSystem,
        path: &VfsPath,
    ) -> impl Iterator<Item = Result<(VfsPath, ResourceInfo), FsError>> + use<'a> {
        self.walk(fs, path)
            .flat_map(|res_event| flatten_event(res_event, true, false))
    }

    /// Every entry under `path`, directories of each level before its files.
    pub fn info<'a>(
        &self,
        fs: &'a dyn FileSystem,
        path: &VfsPath,
    ) -> impl Iterator<Item = Result<(VfsPath, ResourceInfo), FsError>> + use<'a> {
        self.walk(fs, path)
            .flat_map(|res_event| flatten_event(res_event, true, true))
    }

    /// List one directory with the configured filters applied.
    pub(crate) fn scan_dir(
        &self,
        fs: &dyn FileSystem,
        path: &VfsPath,
    ) -> Result<(Vec<ResourceInfo>, Vec<ResourceInfo>), FsError> {
        let (l_dirs, l_files, _) = self.scan_dir_counted(fs, path)?;
        Ok((l_dirs, l_files))
    }

    /// [`Walker::scan_dir`] plus the number of entries the filters dropped.
    pub(crate) fn scan_dir_counted(
        &self,
        fs: &dyn FileSystem,
        path: &VfsPath,
    ) -> Result<(Vec<ResourceInfo>, Vec<ResourceInfo>, usize), FsError> {
        let l_infos = fs.list_info(path, self.spec_walk_options.namespaces)?;
        let mut l_dirs = Vec::new();
        let mut l_files = Vec::new();
        let mut n_filtered = 0;
        for info in l_infos {
            if info.is_dir() {
                if self.spec_patterns.is_dir_excluded(info.name()) {
                    n_filtered += 1;
                } else {
                    l_dirs.push(info);
                }
            } else if self.spec_patterns.is_file_excluded(info.name()) {
                n_filtered += 1;
            } else {
                l_files.push(info);
            }
        }
        Ok((l_dirs, l_files, n_filtered))
    }

    /// Whether a directory at `n_depth` levels below the walk root is listed.
    pub(crate) fn is_listed_depth(&self, n_depth: usize) -> bool {
        self.spec_walk_options
            .depth_limit
            .is_none_or(|n_limit| n_depth < n_limit)
    }
}

fn flatten_event(
    res_event: Result<SpecWalkEvent, FsError>,
    if_dirs: bool,
    if_files: bool,
) -> Vec<Result<(VfsPath, ResourceInfo), FsError>> {
    let event = match res_event {
        Ok(event) => event,
        Err(e) => return vec![Err(e)],
    };
    if let Some(e) = event.error {
        return vec![Err(e)];
    }

    let mut l_out = Vec::new();
    let l_infos = if_dirs
        .then_some(event.l_dirs)
        .into_iter()
        .flatten()
        .chain(if_files.then_some(event.l_files).into_iter().flatten());
    for info in l_infos {
        match event.path.child(info.name()) {
            Ok(path_child) => l_out.push(Ok((path_child, info))),
            Err(e) => l_out.push(Err(FsError::from(e))),
        }
    }
    l_out
}

struct SpecPostFrame {
    event: SpecWalkEvent,
    /// Children still to visit, in reverse listing order.
    l_pending: Vec<VfsPath>,
}

/// Pull-based walk over one tree.
///
/// Holds only pending paths (and, for post-order, the ancestor events).
/// Under [`EnumErrorPolicy::Raise`] the first listing error is yielded and
/// the iterator ends.
pub struct WalkIter<'a> {
    walker: Walker,
    fs: &'a dyn FileSystem,
    path_root: VfsPath,
    filter_descend: Option<TypeDescendFilter<'a>>,
    dq_pending: VecDeque<VfsPath>,
    l_post_frames: Vec<SpecPostFrame>,
    b_started: bool,
    b_done: bool,
}

impl<'a> WalkIter<'a> {
    fn new(
        walker: Walker,
        fs: &'a dyn FileSystem,
        path_root: VfsPath,
        filter_descend: Option<TypeDescendFilter<'a>>,
    ) -> Self {
        let mut dq_pending = VecDeque::new();
        dq_pending.push_back(path_root.clone());
        Self {
            walker,
            fs,
            path_root,
            filter_descend,
            dq_pending,
            l_post_frames: Vec::new(),
            b_started: false,
            b_done: false,
        }
    }

    fn relative_depth(&self, path: &VfsPath) -> usize {
        path.depth().saturating_sub(self.path_root.depth())
    }

    fn scan(&self, path: &VfsPath) -> Result<SpecWalkEvent, FsError> {
        let (l_dirs, l_files) = self.walker.scan_dir(self.fs, path)?;
        Ok(SpecWalkEvent {
            path: path.clone(),
            l_dirs,
            l_files,
            error: None,
        })
    }

    /// Sub-directory paths to visit, in listing order.
    fn children(&self, event: &SpecWalkEvent) -> Vec<VfsPath> {
        if !self.walker.is_listed_depth(self.relative_depth(&event.path) + 1) {
            return Vec::new();
        }
        let mut l_children = Vec::with_capacity(event.l_dirs.len());
        for info in &event.l_dirs {
            let path_child = match event.path.child(info.name()) {
                Ok(v) => v,
                Err(e) => {
                    debug!(dir = %event.path, error = %e, "Skipping unaddressable entry");
                    continue;
                }
            };
            l_children.push(path_child);
        }
        l_children
    }

    fn is_descend_allowed(&self, path: &VfsPath) -> bool {
        if *path == self.path_root {
            return true;
        }
        self.filter_descend
            .as_ref()
            .is_none_or(|filter_descend| filter_descend(path))
    }

    /// Apply the error policy to a failed listing. `None` means skip.
    fn on_error(
        &mut self,
        path: VfsPath,
        error: FsError,
    ) -> Option<Result<SpecWalkEvent, FsError>> {
        match self.walker.spec_walk_options.rule_on_error {
            EnumErrorPolicy::Raise => {
                self.b_done = true;
                Some(Err(error))
            }
            EnumErrorPolicy::Ignore => {
                debug!(dir = %path, error = %error, "Ignoring listing failure");
                None
            }
            EnumErrorPolicy::Collect => {
                debug!(dir = %path, error = %error, "Collecting listing failure");
                Some(Ok(SpecWalkEvent::failed(path, error)))
            }
        }
    }

    fn next_pre_or_breadth(&mut self) -> Option<Result<SpecWalkEvent, FsError>> {
        loop {
            let path = match self.walker.spec_walk_options.rule_order {
                EnumWalkOrder::BreadthFirst => self.dq_pending.pop_front(),
                _ => self.dq_pending.pop_back(),
            };
            let Some(path) = path else {
                self.b_done = true;
                return None;
            };
            if !self.is_descend_allowed(&path) {
                continue;
            }
            match Self::scan(self, &path) {
                Ok(event) => {
                    let l_children = self.children(&event);
                    match self.walker.spec_walk_options.rule_order {
                        EnumWalkOrder::BreadthFirst => self.dq_pending.extend(l_children),
                        _ => self.dq_pending.extend(l_children.into_iter().rev()),
                    }
                    return Some(Ok(event));
                }
                Err(e) => {
                    if let Some(item) = self.on_error(path, e) {
                        return Some(item);
                    }
                }
            }
        }
    }

    fn next_post(&mut self) -> Option<Result<SpecWalkEvent, FsError>> {
        loop {
            let path_next = if !self.b_started {
                self.b_started = true;
                Some(self.path_root.clone())
            } else {
                let frame = self.l_post_frames.last_mut()?;
                frame.l_pending.pop()
            };

            let Some(path) = path_next else {
                // Every child of the top frame has been emitted.
                let frame = self.l_post_frames.pop()?;
                return Some(Ok(frame.event));
            };
            if !self.is_descend_allowed(&path) {
                continue;
            }

            match Self::scan(self, &path) {
                Ok(event) => {
                    let mut l_pending = self.children(&event);
                    l_pending.reverse();
                    self.l_post_frames.push(SpecPostFrame { event, l_pending });
                }
                Err(e) => {
                    if let Some(item) = self.on_error(path, e) {
                        return Some(item);
                    }
                }
            }
        }
    }
}

impl Iterator for WalkIter<'_> {
    type Item = Result<SpecWalkEvent, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.b_done {
            return None;
        }
        let item = match self.walker.spec_walk_options.rule_order {
            EnumWalkOrder::DepthFirstPostOrder => self.next_post(),
            EnumWalkOrder::DepthFirst | EnumWalkOrder::BreadthFirst => self.next_pre_or_breadth(),
        };
        if item.is_none() {
            self.b_done = true;
        }
        item
    }
}
