//! Filesystem capability contract.
//!
//! Every backend implements [`FileSystem`]. The walker, glob, copy and mirror
//! engines are written against this trait only.

use std::any::Any;
use std::io::{Read, Write};
use std::ops::Deref;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::warn;

use crate::info::{ResourceInfo, SpecNamespaces};
use crate::path::VfsPath;
use crate::spec::FsError;

/// Transactional write handle.
///
/// Bytes written are only visible at the target path after [`FileWriter::commit`].
/// Dropping a writer without committing discards everything written.
pub trait FileWriter: Write + Send {
    fn commit(self: Box<Self>) -> Result<(), FsError>;
}

/// Operations every backend variant provides.
///
/// Methods take `&self`; backends that mutate state use interior locking.
/// Instances are not required to tolerate racing writers on overlapping
/// paths: engines serialize such calls themselves.
pub trait FileSystem: Send + Sync {
    /// List a directory, ordered by entry name.
    ///
    /// Fails with `ResourceNotFound` when absent and `DirExpected` on a file.
    fn list_info(
        &self,
        path: &VfsPath,
        namespaces: SpecNamespaces,
    ) -> Result<Vec<ResourceInfo>, FsError>;

    /// Stat one resource. The root reports an empty name.
    fn get_info(&self, path: &VfsPath, namespaces: SpecNamespaces)
    -> Result<ResourceInfo, FsError>;

    fn open_read(&self, path: &VfsPath) -> Result<Box<dyn Read + Send + '_>, FsError>;

    /// Open a transactional writer.
    ///
    /// Fails with `FileExists` when the file exists and `if_overwrite` is not
    /// set, `FileExpected` on a directory, `ParentNotFound` when the parent is
    /// missing and `ResourceReadOnly` on read-only backends.
    fn open_write(
        &self,
        path: &VfsPath,
        if_overwrite: bool,
    ) -> Result<Box<dyn FileWriter + '_>, FsError>;

    /// Create one directory level.
    ///
    /// An existing directory is an error unless `if_recreate` is set.
    fn create_dir(&self, path: &VfsPath, if_recreate: bool) -> Result<(), FsError>;

    /// Remove a file.
    fn remove(&self, path: &VfsPath) -> Result<(), FsError>;

    /// Remove an empty directory.
    fn remove_dir(&self, path: &VfsPath) -> Result<(), FsError>;

    /// Flush buffered state and refuse further operations. Idempotent.
    fn close(&self) -> Result<(), FsError>;

    fn is_closed(&self) -> bool;

    /// Identity/downcast hook; implementations return `self`.
    fn as_any(&self) -> &dyn Any;

    /// Native copy of one file into `fs_dst`.
    ///
    /// Backends that cannot do this natively for the given destination must
    /// return `FsError::Unsupported` so the caller can stream bytes instead.
    fn copy_resource(
        &self,
        _path_src: &VfsPath,
        _fs_dst: &dyn FileSystem,
        _path_dst: &VfsPath,
    ) -> Result<(), FsError> {
        Err(FsError::unsupported("copy_resource"))
    }

    /// Native move of one resource into `fs_dst`, same contract as
    /// [`FileSystem::copy_resource`].
    fn move_resource(
        &self,
        _path_src: &VfsPath,
        _fs_dst: &dyn FileSystem,
        _path_dst: &VfsPath,
    ) -> Result<(), FsError> {
        Err(FsError::unsupported("move_resource"))
    }

    fn set_modified(&self, _path: &VfsPath, _modified: SystemTime) -> Result<(), FsError> {
        Err(FsError::unsupported("set_modified"))
    }

    /// Backing instance and path for path-rebasing views, `None` otherwise.
    fn delegate(&self, _path: &VfsPath) -> Option<(&dyn FileSystem, VfsPath)> {
        None
    }

    /// Instance whose storage `path` lives in, for identity checks only.
    ///
    /// Wrappers that hide their inner instance from [`FileSystem::delegate`]
    /// still expose it here.
    fn storage(&self, path: &VfsPath) -> Option<(&dyn FileSystem, VfsPath)> {
        self.delegate(path)
    }

    fn exists(&self, path: &VfsPath) -> Result<bool, FsError> {
        match self.get_info(path, SpecNamespaces::basic()) {
            Ok(_) => Ok(true),
            Err(FsError::ResourceNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_dir(&self, path: &VfsPath) -> Result<bool, FsError> {
        match self.get_info(path, SpecNamespaces::basic()) {
            Ok(info) => Ok(info.is_dir()),
            Err(FsError::ResourceNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_file(&self, path: &VfsPath) -> Result<bool, FsError> {
        match self.get_info(path, SpecNamespaces::basic()) {
            Ok(info) => Ok(info.is_file()),
            Err(FsError::ResourceNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create `path` and any missing ancestors.
    fn make_dirs(&self, path: &VfsPath) -> Result<(), FsError> {
        for path_dir in path.ancestors().into_iter().skip(1) {
            self.create_dir(&path_dir, true)?;
        }
        if path.is_root() {
            return Ok(());
        }
        self.create_dir(path, true)
    }

    fn read_bytes(&self, path: &VfsPath) -> Result<Vec<u8>, FsError> {
        let mut reader = self.open_read(path)?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| FsError::from_io(path, &e))?;
        Ok(buf)
    }

    fn write_bytes(&self, path: &VfsPath, data: &[u8]) -> Result<(), FsError> {
        let mut writer = self.open_write(path, true)?;
        writer
            .write_all(data)
            .map_err(|e| FsError::from_io(path, &e))?;
        writer.commit()
    }

    /// Remove a directory and everything below it. On the root only the
    /// contents are removed.
    fn remove_tree(&self, path: &VfsPath) -> Result<(), FsError> {
        for info in self.list_info(path, SpecNamespaces::basic())? {
            let path_child = path.child(info.name())?;
            if info.is_dir() {
                self.remove_tree(&path_child)?;
            } else {
                self.remove(&path_child)?;
            }
        }
        if path.is_root() {
            return Ok(());
        }
        self.remove_dir(path)
    }
}

impl<T: FileSystem + ?Sized> FileSystem for Arc<T> {
    fn list_info(
        &self,
        path: &VfsPath,
        namespaces: SpecNamespaces,
    ) -> Result<Vec<ResourceInfo>, FsError> {
        (**self).list_info(path, namespaces)
    }

    fn get_info(
        &self,
        path: &VfsPath,
        namespaces: SpecNamespaces,
    ) -> Result<ResourceInfo, FsError> {
        (**self).get_info(path, namespaces)
    }

    fn open_read(&self, path: &VfsPath) -> Result<Box<dyn Read + Send + '_>, FsError> {
        (**self).open_read(path)
    }

    fn open_write(
        &self,
        path: &VfsPath,
        if_overwrite: bool,
    ) -> Result<Box<dyn FileWriter + '_>, FsError> {
        (**self).open_write(path, if_overwrite)
    }

    fn create_dir(&self, path: &VfsPath, if_recreate: bool) -> Result<(), FsError> {
        (**self).create_dir(path, if_recreate)
    }

    fn remove(&self, path: &VfsPath) -> Result<(), FsError> {
        (**self).remove(path)
    }

    fn remove_dir(&self, path: &VfsPath) -> Result<(), FsError> {
        (**self).remove_dir(path)
    }

    fn close(&self) -> Result<(), FsError> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn as_any(&self) -> &dyn Any {
        (**self).as_any()
    }

    fn copy_resource(
        &self,
        path_src: &VfsPath,
        fs_dst: &dyn FileSystem,
        path_dst: &VfsPath,
    ) -> Result<(), FsError> {
        (**self).copy_resource(path_src, fs_dst, path_dst)
    }

    fn move_resource(
        &self,
        path_src: &VfsPath,
        fs_dst: &dyn FileSystem,
        path_dst: &VfsPath,
    ) -> Result<(), FsError> {
        (**self).move_resource(path_src, fs_dst, path_dst)
    }

    fn set_modified(&self, path: &VfsPath, modified: SystemTime) -> Result<(), FsError> {
        (**self).set_modified(path, modified)
    }

    fn delegate(&self, path: &VfsPath) -> Option<(&dyn FileSystem, VfsPath)> {
        (**self).delegate(path)
    }

    fn storage(&self, path: &VfsPath) -> Option<(&dyn FileSystem, VfsPath)> {
        (**self).storage(path)
    }
}

/// Follow [`FileSystem::delegate`] until the concrete backend is reached.
pub fn resolve_delegate<'a>(fs: &'a dyn FileSystem, path: &VfsPath) -> (&'a dyn FileSystem, VfsPath) {
    let mut fs_cur = fs;
    let mut path_cur = path.clone();
    while let Some((fs_next, path_next)) = fs_cur.delegate(&path_cur) {
        fs_cur = fs_next;
        path_cur = path_next;
    }
    (fs_cur, path_cur)
}

/// Follow [`FileSystem::storage`] down to the instance that owns the bytes.
pub fn resolve_storage<'a>(fs: &'a dyn FileSystem, path: &VfsPath) -> (&'a dyn FileSystem, VfsPath) {
    let mut fs_cur = fs;
    let mut path_cur = path.clone();
    while let Some((fs_next, path_next)) = fs_cur.storage(&path_cur) {
        fs_cur = fs_next;
        path_cur = path_next;
    }
    (fs_cur, path_cur)
}

/// `true` when both references point at the same backend instance.
pub fn is_same_instance(fs_a: &dyn FileSystem, fs_b: &dyn FileSystem) -> bool {
    std::ptr::addr_eq(fs_a.as_any(), fs_b.as_any())
}

/// Scoped acquisition: closes the filesystem when dropped.
///
/// Use [`ScopedFs::close`] to observe the close result; a failure during
/// drop is only logged.
pub struct ScopedFs<F: FileSystem> {
    fs: F,
}

impl<F: FileSystem> ScopedFs<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    pub fn close(self) -> Result<(), FsError> {
        self.fs.close()
    }
}

impl<F: FileSystem> Deref for ScopedFs<F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.fs
    }
}

impl<F: FileSystem> Drop for ScopedFs<F> {
    fn drop(&mut self) {
        if let Err(e) = self.fs.close() {
            warn!("failed to close filesystem on scope exit: {e}");
        }
    }
}

/// Run `op` against `fs` and close it on every exit path.
///
/// A close failure is reported only when `op` itself succeeded.
pub fn with_fs<F, T, E, O>(fs: F, op: O) -> Result<T, E>
where
    F: FileSystem,
    E: From<FsError>,
    O: FnOnce(&F) -> Result<T, E>,
{
    let scoped_fs = ScopedFs::new(fs);
    let value = op(&scoped_fs)?;
    scoped_fs.close()?;
    Ok(value)
}
