//! Read-only wrapper.

use std::any::Any;
use std::io::Read;
use std::sync::Arc;
use std::time::SystemTime;

use crate::base::{FileSystem, FileWriter};
use crate::info::{ResourceInfo, SpecNamespaces};
use crate::path::VfsPath;
use crate::spec::FsError;

/// Wraps a filesystem and rejects every mutation with `ResourceReadOnly`.
///
/// Reads forward unchanged. `copy_resource` still forwards since it only
/// reads this side. No delegate is exposed, so callers never reach the
/// writable inner instance through it; [`FileSystem::storage`] still names
/// it for identity checks.
pub struct ReadOnlyFs {
    fs_inner: Arc<dyn FileSystem>,
}

impl std::fmt::Debug for ReadOnlyFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOnlyFs").finish_non_exhaustive()
    }
}

impl ReadOnlyFs {
    pub fn new(fs_inner: Arc<dyn FileSystem>) -> Self {
        Self { fs_inner }
    }
}

impl FileSystem for ReadOnlyFs {
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
        self.fs_inner.open_read(path)
    }

    fn open_write(
        &self,
        path: &VfsPath,
        _if_overwrite: bool,
    ) -> Result<Box<dyn FileWriter + '_>, FsError> {
        Err(FsError::ResourceReadOnly { path: path.clone() })
    }

    fn create_dir(&self, path: &VfsPath, _if_recreate: bool) -> Result<(), FsError> {
        Err(FsError::ResourceReadOnly { path: path.clone() })
    }

    fn remove(&self, path: &VfsPath) -> Result<(), FsError> {
        Err(FsError::ResourceReadOnly { path: path.clone() })
    }

    fn remove_dir(&self, path: &VfsPath) -> Result<(), FsError> {
        Err(FsError::ResourceReadOnly { path: path.clone() })
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

    fn move_resource(
        &self,
        path_src: &VfsPath,
        _fs_dst: &dyn FileSystem,
        _path_dst: &VfsPath,
    ) -> Result<(), FsError> {
        Err(FsError::ResourceReadOnly {
            path: path_src.clone(),
        })
    }

    fn set_modified(&self, path: &VfsPath, _modified: SystemTime) -> Result<(), FsError> {
        Err(FsError::ResourceReadOnly { path: path.clone() })
    }

    fn storage(&self, path: &VfsPath) -> Option<(&dyn FileSystem, VfsPath)> {
        Some((&*self.fs_inner, path.clone()))
    }
}
