//! In-memory backend.

use std::any::Any;
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use bytes::Bytes;

use crate::base::{FileSystem, FileWriter, is_same_instance};
use crate::info::{ResourceInfo, SpecInfoAccess, SpecInfoDetails, SpecNamespaces};
use crate::path::VfsPath;
use crate::spec::FsError;

#[derive(Debug, Clone)]
enum EnumMemoryNode {
    Dir,
    File(Bytes),
}

#[derive(Debug, Clone)]
struct SpecMemoryEntry {
    node: EnumMemoryNode,
    time_created: SystemTime,
    time_modified: SystemTime,
    time_accessed: SystemTime,
}

impl SpecMemoryEntry {
    fn new(node: EnumMemoryNode) -> Self {
        let now = SystemTime::now();
        Self {
            node,
            time_created: now,
            time_modified: now,
            time_accessed: now,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.node, EnumMemoryNode::Dir)
    }
}

type TypeMemoryMap = BTreeMap<VfsPath, SpecMemoryEntry>;

/// Filesystem held entirely in process memory.
///
/// Entries are keyed by normalized path; since [`VfsPath`] orders by segment
/// sequence, every directory's descendants form one contiguous key range.
/// The root entry always exists and is a directory.
#[derive(Debug)]
pub struct MemoryFs {
    map_entries: RwLock<TypeMemoryMap>,
    b_closed: AtomicBool,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    pub fn new() -> Self {
        let mut map_entries = BTreeMap::new();
        map_entries.insert(VfsPath::root(), SpecMemoryEntry::new(EnumMemoryNode::Dir));
        Self {
            map_entries: RwLock::new(map_entries),
            b_closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<(), FsError> {
        if self.b_closed.load(Ordering::SeqCst) {
            return Err(FsError::FilesystemClosed);
        }
        Ok(())
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, TypeMemoryMap> {
        self.map_entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, TypeMemoryMap> {
        self.map_entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn file_bytes(&self, path: &VfsPath) -> Result<Bytes, FsError> {
        let map_entries = self.read_map();
        match map_entries.get(path) {
            None => Err(FsError::ResourceNotFound { path: path.clone() }),
            Some(entry) => match &entry.node {
                EnumMemoryNode::Dir => Err(FsError::FileExpected { path: path.clone() }),
                EnumMemoryNode::File(data) => Ok(data.clone()),
            },
        }
    }
}

fn check_parent_dir(map_entries: &TypeMemoryMap, path: &VfsPath) -> Result<(), FsError> {
    let Some(path_parent) = path.parent() else {
        return Ok(());
    };
    match map_entries.get(&path_parent) {
        Some(entry) if entry.is_dir() => Ok(()),
        _ => Err(FsError::ParentNotFound { path: path.clone() }),
    }
}

fn check_writable_file(
    map_entries: &TypeMemoryMap,
    path: &VfsPath,
    if_overwrite: bool,
) -> Result<(), FsError> {
    if path.is_root() {
        return Err(FsError::FileExpected { path: path.clone() });
    }
    check_parent_dir(map_entries, path)?;
    match map_entries.get(path) {
        Some(entry) if entry.is_dir() => Err(FsError::FileExpected { path: path.clone() }),
        Some(_) if !if_overwrite => Err(FsError::FileExists { path: path.clone() }),
        _ => Ok(()),
    }
}

fn insert_file(
    map_entries: &mut TypeMemoryMap,
    path: &VfsPath,
    data: Bytes,
    if_overwrite: bool,
) -> Result<(), FsError> {
    check_writable_file(map_entries, path, if_overwrite)?;
    let now = SystemTime::now();
    match map_entries.get_mut(path) {
        Some(entry) => {
            entry.node = EnumMemoryNode::File(data);
            entry.time_modified = now;
            entry.time_accessed = now;
        }
        None => {
            map_entries.insert(path.clone(), SpecMemoryEntry::new(EnumMemoryNode::File(data)));
        }
    }
    Ok(())
}

fn derive_info(name: &str, entry: &SpecMemoryEntry, namespaces: SpecNamespaces) -> ResourceInfo {
    let mut info = ResourceInfo::new(name, entry.is_dir());
    if namespaces.if_details {
        let size = match &entry.node {
            EnumMemoryNode::Dir => 0,
            EnumMemoryNode::File(data) => data.len() as u64,
        };
        info = info.with_details(SpecInfoDetails {
            size,
            modified: Some(entry.time_modified),
            created: Some(entry.time_created),
            accessed: Some(entry.time_accessed),
        });
    }
    if namespaces.if_access {
        info = info.with_access(SpecInfoAccess::default());
    }
    info
}

fn collect_subtree(map_entries: &TypeMemoryMap, path: &VfsPath) -> Vec<VfsPath> {
    map_entries
        .range((Bound::Included(path.clone()), Bound::Unbounded))
        .take_while(|(k, _)| k.starts_with(path))
        .map(|(k, _)| k.clone())
        .collect()
}

struct MemoryWriter<'a> {
    fs: &'a MemoryFs,
    path: VfsPath,
    if_overwrite: bool,
    buf: Vec<u8>,
}

impl Write for MemoryWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl FileWriter for MemoryWriter<'_> {
    fn commit(self: Box<Self>) -> Result<(), FsError> {
        self.fs.check_open()?;
        let mut map_entries = self.fs.write_map();
        insert_file(
            &mut map_entries,
            &self.path,
            Bytes::from(self.buf),
            self.if_overwrite,
        )
    }
}

impl FileSystem for MemoryFs {
    fn list_info(
        &self,
        path: &VfsPath,
        namespaces: SpecNamespaces,
    ) -> Result<Vec<ResourceInfo>, FsError> {
        self.check_open()?;
        let map_entries = self.read_map();
        match map_entries.get(path) {
            None => return Err(FsError::ResourceNotFound { path: path.clone() }),
            Some(entry) if !entry.is_dir() => {
                return Err(FsError::DirExpected { path: path.clone() });
            }
            Some(_) => {}
        }

        let n_depth_child = path.depth() + 1;
        Ok(map_entries
            .range((Bound::Excluded(path.clone()), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(path))
            .filter(|(k, _)| k.depth() == n_depth_child)
            .map(|(k, entry)| derive_info(k.name().unwrap_or_default(), entry, namespaces))
            .collect())
    }

    fn get_info(
        &self,
        path: &VfsPath,
        namespaces: SpecNamespaces,
    ) -> Result<ResourceInfo, FsError> {
        self.check_open()?;
        let map_entries = self.read_map();
        let entry = map_entries
            .get(path)
            .ok_or_else(|| FsError::ResourceNotFound { path: path.clone() })?;
        Ok(derive_info(path.name().unwrap_or_default(), entry, namespaces))
    }

    fn open_read(&self, path: &VfsPath) -> Result<Box<dyn Read + Send + '_>, FsError> {
        self.check_open()?;
        let data = self.file_bytes(path)?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn open_write(
        &self,
        path: &VfsPath,
        if_overwrite: bool,
    ) -> Result<Box<dyn FileWriter + '_>, FsError> {
        self.check_open()?;
        check_writable_file(&self.read_map(), path, if_overwrite)?;
        Ok(Box::new(MemoryWriter {
            fs: self,
            path: path.clone(),
            if_overwrite,
            buf: Vec::new(),
        }))
    }

    fn create_dir(&self, path: &VfsPath, if_recreate: bool) -> Result<(), FsError> {
        self.check_open()?;
        let mut map_entries = self.write_map();
        match map_entries.get(path) {
            Some(entry) if entry.is_dir() => {
                if if_recreate {
                    return Ok(());
                }
                return Err(FsError::DirectoryExists { path: path.clone() });
            }
            Some(_) => return Err(FsError::DirExpected { path: path.clone() }),
            None => {}
        }
        if let Some(path_parent) = path.parent() {
            match map_entries.get(&path_parent) {
                None => return Err(FsError::ResourceNotFound { path: path_parent }),
                Some(entry) if !entry.is_dir() => {
                    return Err(FsError::DirExpected { path: path_parent });
                }
                Some(_) => {}
            }
        }
        map_entries.insert(path.clone(), SpecMemoryEntry::new(EnumMemoryNode::Dir));
        Ok(())
    }

    fn remove(&self, path: &VfsPath) -> Result<(), FsError> {
        self.check_open()?;
        let mut map_entries = self.write_map();
        match map_entries.get(path) {
            None => Err(FsError::ResourceNotFound { path: path.clone() }),
            Some(entry) if entry.is_dir() => Err(FsError::FileExpected { path: path.clone() }),
            Some(_) => {
                map_entries.remove(path);
                Ok(())
            }
        }
    }

    fn remove_dir(&self, path: &VfsPath) -> Result<(), FsError> {
        self.check_open()?;
        if path.is_root() {
            return Err(FsError::unsupported("remove_dir on the root"));
        }
        let mut map_entries = self.write_map();
        match map_entries.get(path) {
            None => return Err(FsError::ResourceNotFound { path: path.clone() }),
            Some(entry) if !entry.is_dir() => {
                return Err(FsError::DirExpected { path: path.clone() });
            }
            Some(_) => {}
        }
        let b_has_children = map_entries
            .range((Bound::Excluded(path.clone()), Bound::Unbounded))
            .next()
            .is_some_and(|(k, _)| k.starts_with(path));
        if b_has_children {
            return Err(FsError::DirectoryNotEmpty { path: path.clone() });
        }
        map_entries.remove(path);
        Ok(())
    }

    fn close(&self) -> Result<(), FsError> {
        self.b_closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.b_closed.load(Ordering::SeqCst)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    /// Native copy into any `MemoryFs`: the destination shares the source
    /// buffer, no bytes are streamed.
    fn copy_resource(
        &self,
        path_src: &VfsPath,
        fs_dst: &dyn FileSystem,
        path_dst: &VfsPath,
    ) -> Result<(), FsError> {
        self.check_open()?;
        let Some(fs_dst_mem) = fs_dst.as_any().downcast_ref::<MemoryFs>() else {
            return Err(FsError::unsupported("copy_resource to a foreign backend"));
        };
        fs_dst_mem.check_open()?;
        let data = self.file_bytes(path_src)?;
        let mut map_entries = fs_dst_mem.write_map();
        insert_file(&mut map_entries, path_dst, data, true)
    }

    /// Native rename within the same instance, for files and whole subtrees.
    fn move_resource(
        &self,
        path_src: &VfsPath,
        fs_dst: &dyn FileSystem,
        path_dst: &VfsPath,
    ) -> Result<(), FsError> {
        self.check_open()?;
        if !is_same_instance(self, fs_dst) {
            return Err(FsError::unsupported("move_resource across instances"));
        }
        if path_src.is_root() || path_dst.starts_with(path_src) {
            return Err(FsError::unsupported("move_resource into itself"));
        }

        let mut map_entries = self.write_map();
        let b_src_is_dir = match map_entries.get(path_src) {
            None => return Err(FsError::ResourceNotFound { path: path_src.clone() }),
            Some(entry) => entry.is_dir(),
        };
        check_parent_dir(&map_entries, path_dst)?;
        match map_entries.get(path_dst) {
            Some(entry) if entry.is_dir() => {
                return Err(FsError::DirectoryExists { path: path_dst.clone() });
            }
            Some(_) if b_src_is_dir => {
                return Err(FsError::DirExpected { path: path_dst.clone() });
            }
            _ => {}
        }

        for path_old in collect_subtree(&map_entries, path_src) {
            let Some(entry) = map_entries.remove(&path_old) else {
                continue;
            };
            let path_rel = path_old.strip_prefix(path_src).unwrap_or_default();
            map_entries.insert(path_dst.join(&path_rel), entry);
        }
        Ok(())
    }

    fn set_modified(&self, path: &VfsPath, modified: SystemTime) -> Result<(), FsError> {
        self.check_open()?;
        let mut map_entries = self.write_map();
        let entry = map_entries
            .get_mut(path)
            .ok_or_else(|| FsError::ResourceNotFound { path: path.clone() })?;
        entry.time_modified = modified;
        Ok(())
    }
}
