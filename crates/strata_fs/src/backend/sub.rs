//! Path-rebasing sub-view.

use std::any::Any;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use crate::base::{FileSystem, FileWriter};
use crate::info::{ResourceInfo, SpecNamespaces};
use crate::path::VfsPath;
use crate::spec::FsError;

/// View of a directory of another filesystem as if it were a root.
///
/// Closing the view does not close the parent. Native fast paths see through
/// the view via [`FileSystem::delegate`].
pub struct SubFs {
    fs_inner: Arc<dyn FileSystem>,
    path_root: VfsPath,
    b_closed: AtomicBool,
}

impl std::fmt::Debug for SubFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubFs")
            .field("path_root", &self.path_root)
            .field("b_closed", &self.b_closed)
            .finish_non_exhaustive()
    }
}

impl SubFs {
    /// Open an existing directory of `fs_inner` as a view.
    pub fn open(fs_inner: Arc<dyn FileSystem>, path: &VfsPath) -> Result<Self, FsError> {
        let info = fs_inner.get_info(path, SpecNamespaces::basic())?;
        if !info.is_dir() {
            return Err(FsError::DirExpected { path: path.clone() });
        }
        Ok(Self {
            fs_inner,
            path_root: path.clone(),
            b_closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<(), FsError> {
        if self.b_closed.load(Ordering::SeqCst) {
            return Err(FsError::FilesystemClosed);
        }
        Ok(())
    }

    fn to_inner(&self, path: &VfsPath) -> VfsPath {
        self.path_root.join(path)
    }

    /// Rewrite paths in parent errors so they read relative to the view.
    fn rebase_error(&self, error: FsError) -> FsError {
        let rebase = |path: VfsPath| path.strip_prefix(&self.path_root).unwrap_or(path);
        match error {
            FsError::ResourceNotFound { path } => FsError::ResourceNotFound { path: rebase(path) },
            FsError::DirectoryExists { path } => FsError::DirectoryExists { path: rebase(path) },
            FsError::FileExists { path } => FsError::FileExists { path: rebase(path) },
            FsError::DirectoryNotEmpty { path } => FsError::DirectoryNotEmpty { path: rebase(path) },
            FsError::FileExpected { path } => FsError::FileExpected { path: rebase(path) },
            FsError::DirExpected { path } => FsError::DirExpected { path: rebase(path) },
            FsError::ParentNotFound { path } => FsError::ParentNotFound { path: rebase(path) },
            FsError::ResourceReadOnly { path } => FsError::ResourceReadOnly { path: rebase(path) },
            FsError::Io {
                path,
                kind,
                message,
            } => FsError::Io {
                path: rebase(path),
                kind,
                message,
            },
            other => other,
        }
    }
}

/// Create `path` on `fs` and return a view rooted there.
pub fn make_dir(
    fs: &Arc<dyn FileSystem>,
    path: &VfsPath,
    if_recreate: bool,
) -> Result<SubFs, FsError> {
    fs.create_dir(path, if_recreate)?;
    SubFs::open(Arc::clone(fs), path)
}

/// Return a view rooted at an existing directory of `fs`.
pub fn open_dir(fs: &Arc<dyn FileSystem>, path: &VfsPath) -> Result<SubFs, FsError> {
    SubFs::open(Arc::clone(fs), path)
}

impl FileSystem for SubFs {
    fn list_info(
        &self,
        path: &VfsPath,
        namespaces: SpecNamespaces,
    ) -> Result<Vec<ResourceInfo>, FsError> {
        self.check_open()?;
        self.fs_inner
            .list_info(&self.to_inner(path), namespaces)
            .map_err(|e| self.rebase_error(e))
    }

    fn get_info(
        &self,
        path: &VfsPath,
        namespaces: SpecNamespaces,
    ) -> Result<ResourceInfo, FsError> {
        self.check_open()?;
        let info = self
            .fs_inner
            .get_info(&self.to_inner(path), namespaces)
            .map_err(|e| self.rebase_error(e))?;
        if !path.is_root() {
            return Ok(info);
        }
        let mut info_root = ResourceInfo::new("", info.is_dir());
        if let Some(details) = info.details() {
            info_root = info_root.with_details(*details);
        }
        if let Some(access) = info.access() {
            info_root = info_root.with_access(*access);
        }
        Ok(info_root)
    }

    fn open_read(&self, path: &VfsPath) -> Result<Box<dyn Read + Send + '_>, FsError> {
        self.check_open()?;
        self.fs_inner
            .open_read(&self.to_inner(path))
            .map_err(|e| self.rebase_error(e))
    }

    fn open_write(
        &self,
        path: &VfsPath,
        if_overwrite: bool,
    ) -> Result<Box<dyn FileWriter + '_>, FsError> {
        self.check_open()?;
        self.fs_inner
            .open_write(&self.to_inner(path), if_overwrite)
            .map_err(|e| self.rebase_error(e))
    }

    fn create_dir(&self, path: &VfsPath, if_recreate: bool) -> Result<(), FsError> {
        self.check_open()?;
        self.fs_inner
            .create_dir(&self.to_inner(path), if_recreate)
            .map_err(|e| self.rebase_error(e))
    }

    fn remove(&self, path: &VfsPath) -> Result<(), FsError> {
        self.check_open()?;
        self.fs_inner
            .remove(&self.to_inner(path))
            .map_err(|e| self.rebase_error(e))
    }

    fn remove_dir(&self, path: &VfsPath) -> Result<(), FsError> {
        self.check_open()?;
        if path.is_root() {
            return Err(FsError::unsupported("remove_dir on the root"));
        }
        self.fs_inner
            .remove_dir(&self.to_inner(path))
            .map_err(|e| self.rebase_error(e))
    }

    fn close(&self) -> Result<(), FsError> {
        self.b_closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.b_closed.load(Ordering::SeqCst) || self.fs_inner.is_closed()
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
        self.check_open()?;
        self.fs_inner
            .copy_resource(&self.to_inner(path_src), fs_dst, path_dst)
            .map_err(|e| self.rebase_error(e))
    }

    fn move_resource(
        &self,
        path_src: &VfsPath,
        fs_dst: &dyn FileSystem,
        path_dst: &VfsPath,
    ) -> Result<(), FsError> {
        self.check_open()?;
        self.fs_inner
            .move_resource(&self.to_inner(path_src), fs_dst, path_dst)
            .map_err(|e| self.rebase_error(e))
    }

    fn set_modified(&self, path: &VfsPath, modified: SystemTime) -> Result<(), FsError> {
        self.check_open()?;
        self.fs_inner
            .set_modified(&self.to_inner(path), modified)
            .map_err(|e| self.rebase_error(e))
    }

    fn delegate(&self, path: &VfsPath) -> Option<(&dyn FileSystem, VfsPath)> {
        if self.b_closed.load(Ordering::SeqCst) {
            return None;
        }
        Some((&*self.fs_inner, self.to_inner(path)))
    }
}
