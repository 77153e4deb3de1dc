//! Host-directory backend.

use std::any::Any;
use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use filetime::FileTime;
use tracing::debug;

use crate::base::{FileSystem, FileWriter};
use crate::info::{ResourceInfo, SpecInfoAccess, SpecInfoDetails, SpecNamespaces};
use crate::path::VfsPath;
use crate::spec::FsError;

static N_PARTIAL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filesystem rooted at a directory of the host.
///
/// Writes land in a hidden sibling file and are renamed into place on
/// commit. Listings are sorted by name. Entries whose names are not valid
/// UTF-8 are skipped.
#[derive(Debug)]
pub struct OsFs {
    path_root: PathBuf,
    b_closed: AtomicBool,
}

impl OsFs {
    /// Root the backend at an existing host directory.
    pub fn new(path_root: impl AsRef<Path>) -> Result<Self, FsError> {
        let path_root = path_root.as_ref().to_path_buf();
        let meta =
            fs::metadata(&path_root).map_err(|e| map_io_error(&VfsPath::root(), &e))?;
        if !meta.is_dir() {
            return Err(FsError::DirExpected {
                path: VfsPath::root(),
            });
        }
        Ok(Self {
            path_root,
            b_closed: AtomicBool::new(false),
        })
    }

    /// Create the host directory (and its ancestors) if needed, then root
    /// the backend there.
    pub fn create(path_root: impl AsRef<Path>) -> Result<Self, FsError> {
        fs::create_dir_all(path_root.as_ref())
            .map_err(|e| map_io_error(&VfsPath::root(), &e))?;
        Self::new(path_root)
    }

    pub fn host_root(&self) -> &Path {
        &self.path_root
    }

    /// Host path backing `path`.
    pub fn host_path(&self, path: &VfsPath) -> PathBuf {
        let mut path_host = self.path_root.clone();
        for segment in path.segments() {
            path_host.push(segment);
        }
        path_host
    }

    fn check_open(&self) -> Result<(), FsError> {
        if self.b_closed.load(Ordering::SeqCst) {
            return Err(FsError::FilesystemClosed);
        }
        Ok(())
    }

    fn metadata(&self, path: &VfsPath) -> Result<Metadata, FsError> {
        fs::metadata(self.host_path(path)).map_err(|e| map_io_error(path, &e))
    }

    /// `Ok(None)` when absent.
    fn metadata_opt(&self, path: &VfsPath) -> Result<Option<Metadata>, FsError> {
        match fs::metadata(self.host_path(path)) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io_error(path, &e)),
        }
    }

    fn check_parent_dir(&self, path: &VfsPath) -> Result<(), FsError> {
        let Some(path_parent) = path.parent() else {
            return Ok(());
        };
        match self.metadata_opt(&path_parent)? {
            Some(meta) if meta.is_dir() => Ok(()),
            _ => Err(FsError::ParentNotFound { path: path.clone() }),
        }
    }

    fn check_writable_file(&self, path: &VfsPath, if_overwrite: bool) -> Result<(), FsError> {
        if path.is_root() {
            return Err(FsError::FileExpected { path: path.clone() });
        }
        self.check_parent_dir(path)?;
        match self.metadata_opt(path)? {
            Some(meta) if meta.is_dir() => Err(FsError::FileExpected { path: path.clone() }),
            Some(_) if !if_overwrite => Err(FsError::FileExists { path: path.clone() }),
            _ => Ok(()),
        }
    }

    /// Fixed-length temp name next to the target of a transactional write.
    fn partial_path(&self, path: &VfsPath) -> PathBuf {
        let path_final = self.host_path(path);
        let n_counter = N_PARTIAL_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = format!(".strata-partial-{}-{n_counter}", std::process::id());
        path_final.with_file_name(name)
    }
}

/// Map host I/O errors onto the backend error taxonomy.
fn map_io_error(path: &VfsPath, error: &io::Error) -> FsError {
    match error.kind() {
        ErrorKind::NotFound => FsError::ResourceNotFound { path: path.clone() },
        ErrorKind::AlreadyExists => FsError::FileExists { path: path.clone() },
        ErrorKind::DirectoryNotEmpty => FsError::DirectoryNotEmpty { path: path.clone() },
        ErrorKind::IsADirectory => FsError::FileExpected { path: path.clone() },
        ErrorKind::NotADirectory => FsError::DirExpected { path: path.clone() },
        _ => FsError::from_io(path, error),
    }
}

fn derive_info(name: &str, meta: &Metadata, namespaces: SpecNamespaces) -> ResourceInfo {
    let mut info = ResourceInfo::new(name, meta.is_dir());
    if namespaces.if_details {
        info = info.with_details(SpecInfoDetails {
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok(),
            created: meta.created().ok(),
            accessed: meta.accessed().ok(),
        });
    }
    if namespaces.if_access {
        info = info.with_access(derive_access(meta));
    }
    info
}

#[cfg(unix)]
fn derive_access(meta: &Metadata) -> SpecInfoAccess {
    use std::os::unix::fs::MetadataExt;
    SpecInfoAccess {
        uid: Some(meta.uid()),
        gid: Some(meta.gid()),
        permissions: Some(meta.mode() & 0o777),
    }
}

#[cfg(not(unix))]
fn derive_access(meta: &Metadata) -> SpecInfoAccess {
    SpecInfoAccess {
        uid: None,
        gid: None,
        permissions: Some(if meta.permissions().readonly() {
            0o444
        } else {
            0o666
        }),
    }
}

struct OsWriter {
    file: Option<File>,
    path: VfsPath,
    path_partial: PathBuf,
    path_final: PathBuf,
    if_overwrite: bool,
}

impl Write for OsWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(data),
            None => Err(io::Error::other("writer already committed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl FileWriter for OsWriter {
    fn commit(mut self: Box<Self>) -> Result<(), FsError> {
        if let Some(mut file) = self.file.take() {
            file.flush().map_err(|e| map_io_error(&self.path, &e))?;
        }
        if !self.if_overwrite && self.path_final.exists() {
            return Err(FsError::FileExists {
                path: self.path.clone(),
            });
        }
        if self.path_final.is_dir() {
            return Err(FsError::FileExpected {
                path: self.path.clone(),
            });
        }
        fs::rename(&self.path_partial, &self.path_final)
            .map_err(|e| map_io_error(&self.path, &e))
    }
}

impl Drop for OsWriter {
    fn drop(&mut self) {
        self.file.take();
        // Renamed away on a successful commit; otherwise discard.
        if self.path_partial.exists() {
            let _ = fs::remove_file(&self.path_partial);
        }
    }
}

impl FileSystem for OsFs {
    fn list_info(
        &self,
        path: &VfsPath,
        namespaces: SpecNamespaces,
    ) -> Result<Vec<ResourceInfo>, FsError> {
        self.check_open()?;
        let meta = self.metadata(path)?;
        if !meta.is_dir() {
            return Err(FsError::DirExpected { path: path.clone() });
        }

        let read_dir = fs::read_dir(self.host_path(path)).map_err(|e| map_io_error(path, &e))?;
        let mut l_infos = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| map_io_error(path, &e))?;
            let Ok(name) = entry.file_name().into_string() else {
                debug!(dir = %path, "Skipping entry with a non UTF-8 name");
                continue;
            };
            // Follows symlinks; dangling links are skipped.
            let meta = match fs::metadata(entry.path()) {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(dir = %path, name = %name, "Skipping dangling entry");
                    continue;
                }
                Err(e) => return Err(map_io_error(path, &e)),
            };
            l_infos.push(derive_info(&name, &meta, namespaces));
        }
        l_infos.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(l_infos)
    }

    fn get_info(
        &self,
        path: &VfsPath,
        namespaces: SpecNamespaces,
    ) -> Result<ResourceInfo, FsError> {
        self.check_open()?;
        let meta = self.metadata(path)?;
        Ok(derive_info(path.name().unwrap_or_default(), &meta, namespaces))
    }

    fn open_read(&self, path: &VfsPath) -> Result<Box<dyn Read + Send + '_>, FsError> {
        self.check_open()?;
        if self.metadata(path)?.is_dir() {
            return Err(FsError::FileExpected { path: path.clone() });
        }
        let file = File::open(self.host_path(path)).map_err(|e| map_io_error(path, &e))?;
        Ok(Box::new(file))
    }

    fn open_write(
        &self,
        path: &VfsPath,
        if_overwrite: bool,
    ) -> Result<Box<dyn FileWriter + '_>, FsError> {
        self.check_open()?;
        self.check_writable_file(path, if_overwrite)?;
        let path_partial = self.partial_path(path);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path_partial)
            .map_err(|e| map_io_error(path, &e))?;
        Ok(Box::new(OsWriter {
            file: Some(file),
            path: path.clone(),
            path_partial,
            path_final: self.host_path(path),
            if_overwrite,
        }))
    }

    fn create_dir(&self, path: &VfsPath, if_recreate: bool) -> Result<(), FsError> {
        self.check_open()?;
        match self.metadata_opt(path)? {
            Some(meta) if meta.is_dir() => {
                if if_recreate {
                    return Ok(());
                }
                return Err(FsError::DirectoryExists { path: path.clone() });
            }
            Some(_) => return Err(FsError::DirExpected { path: path.clone() }),
            None => {}
        }
        if let Some(path_parent) = path.parent() {
            match self.metadata_opt(&path_parent)? {
                None => return Err(FsError::ResourceNotFound { path: path_parent }),
                Some(meta) if !meta.is_dir() => {
                    return Err(FsError::DirExpected { path: path_parent });
                }
                Some(_) => {}
            }
        }
        match fs::create_dir(self.host_path(path)) {
            Ok(()) => Ok(()),
            // Lost a race against another creator.
            Err(e) if e.kind() == ErrorKind::AlreadyExists && if_recreate => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(FsError::DirectoryExists { path: path.clone() })
            }
            Err(e) => Err(map_io_error(path, &e)),
        }
    }

    fn remove(&self, path: &VfsPath) -> Result<(), FsError> {
        self.check_open()?;
        if self.metadata(path)?.is_dir() {
            return Err(FsError::FileExpected { path: path.clone() });
        }
        fs::remove_file(self.host_path(path)).map_err(|e| map_io_error(path, &e))
    }

    fn remove_dir(&self, path: &VfsPath) -> Result<(), FsError> {
        self.check_open()?;
        if path.is_root() {
            return Err(FsError::unsupported("remove_dir on the root"));
        }
        if !self.metadata(path)?.is_dir() {
            return Err(FsError::DirExpected { path: path.clone() });
        }
        let path_host = self.host_path(path);
        let b_has_children = fs::read_dir(&path_host)
            .map_err(|e| map_io_error(path, &e))?
            .next()
            .is_some();
        if b_has_children {
            return Err(FsError::DirectoryNotEmpty { path: path.clone() });
        }
        fs::remove_dir(&path_host).map_err(|e| map_io_error(path, &e))
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

    /// Host-level copy into any `OsFs`, published with the same rename as
    /// regular writes.
    fn copy_resource(
        &self,
        path_src: &VfsPath,
        fs_dst: &dyn FileSystem,
        path_dst: &VfsPath,
    ) -> Result<(), FsError> {
        self.check_open()?;
        let Some(fs_dst_os) = fs_dst.as_any().downcast_ref::<OsFs>() else {
            return Err(FsError::unsupported("copy_resource to a foreign backend"));
        };
        fs_dst_os.check_open()?;
        if self.metadata(path_src)?.is_dir() {
            return Err(FsError::FileExpected {
                path: path_src.clone(),
            });
        }
        fs_dst_os.check_writable_file(path_dst, true)?;

        let path_partial = fs_dst_os.partial_path(path_dst);
        if let Err(e) = fs::copy(self.host_path(path_src), &path_partial) {
            let _ = fs::remove_file(&path_partial);
            return Err(map_io_error(path_src, &e));
        }
        if let Err(e) = fs::rename(&path_partial, fs_dst_os.host_path(path_dst)) {
            let _ = fs::remove_file(&path_partial);
            return Err(map_io_error(path_dst, &e));
        }
        Ok(())
    }

    /// Host rename. Moves across devices report `Unsupported` so callers
    /// fall back to copy + delete.
    fn move_resource(
        &self,
        path_src: &VfsPath,
        fs_dst: &dyn FileSystem,
        path_dst: &VfsPath,
    ) -> Result<(), FsError> {
        self.check_open()?;
        let Some(fs_dst_os) = fs_dst.as_any().downcast_ref::<OsFs>() else {
            return Err(FsError::unsupported("move_resource to a foreign backend"));
        };
        fs_dst_os.check_open()?;
        let b_src_is_dir = self.metadata(path_src)?.is_dir();
        fs_dst_os.check_parent_dir(path_dst)?;
        match fs_dst_os.metadata_opt(path_dst)? {
            Some(meta) if meta.is_dir() => {
                return Err(FsError::DirectoryExists {
                    path: path_dst.clone(),
                });
            }
            Some(_) if b_src_is_dir => {
                return Err(FsError::DirExpected {
                    path: path_dst.clone(),
                });
            }
            _ => {}
        }
        match fs::rename(self.host_path(path_src), fs_dst_os.host_path(path_dst)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                Err(FsError::unsupported("move_resource across devices"))
            }
            Err(e) => Err(map_io_error(path_src, &e)),
        }
    }

    fn set_modified(&self, path: &VfsPath, modified: SystemTime) -> Result<(), FsError> {
        self.check_open()?;
        filetime::set_file_mtime(self.host_path(path), FileTime::from_system_time(modified))
            .map_err(|e| map_io_error(path, &e))
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use super::OsFs;
    use crate::backend::MemoryFs;
    use crate::base::FileSystem;
    use crate::info::SpecNamespaces;
    use crate::path::VfsPath;
    use crate::spec::FsError;

    struct TestDir {
        path: PathBuf,
    }

    impl TestDir {
        fn new() -> Self {
            let n = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos();
            let path = std::env::temp_dir().join(format!("strata_fs_os_test_{n}"));
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

    #[test]
    fn write_list_and_read_back() {
        let tmp = TestDir::new();
        let fs = OsFs::new(tmp.path()).expect("open");
        fs.make_dirs(&p("/a/b")).expect("mkdirs");
        fs.write_bytes(&p("/a/b/c.txt"), b"hello").expect("write");
        fs.write_bytes(&p("/a/0.txt"), b"").expect("write");

        assert!(tmp.path().join("a/b/c.txt").is_file());
        let l_infos = fs.list_info(&p("/a"), SpecNamespaces::details()).expect("list");
        let l_names: Vec<_> = l_infos.iter().map(|i| i.name().to_string()).collect();
        assert_eq!(l_names, vec!["0.txt", "b"]);
        assert_eq!(fs.read_bytes(&p("/a/b/c.txt")).expect("read"), b"hello");
        assert_eq!(
            fs.get_info(&p("/a/b/c.txt"), SpecNamespaces::details())
                .expect("info")
                .size(),
            Some(5)
        );
    }

    #[test]
    fn uncommitted_write_leaves_no_trace() {
        let tmp = TestDir::new();
        let fs = OsFs::new(tmp.path()).expect("open");
        {
            let mut writer = fs.open_write(&p("/x.bin"), true).expect("open");
            std::io::Write::write_all(&mut writer, b"partial").expect("write");
        }
        let n_entries = std::fs::read_dir(tmp.path()).expect("read dir").count();
        assert_eq!(n_entries, 0);
    }

    #[test]
    fn long_names_are_writable() {
        let tmp = TestDir::new();
        let fs = OsFs::new(tmp.path()).expect("open");
        let name = "n".repeat(240);
        let path = VfsPath::root().child(&name).expect("path");

        fs.write_bytes(&path, b"long").expect("write");
        assert_eq!(fs.read_bytes(&path).expect("read"), b"long");

        let path_copy = VfsPath::root().child(&"c".repeat(240)).expect("path");
        fs.copy_resource(&path, &fs, &path_copy).expect("native copy");
        assert_eq!(
            std::fs::read(tmp.path().join("c".repeat(240))).expect("read"),
            b"long"
        );
        let n_entries = std::fs::read_dir(tmp.path()).expect("read dir").count();
        assert_eq!(n_entries, 2);
    }

    #[test]
    fn errors_map_to_taxonomy() {
        let tmp = TestDir::new();
        let fs = OsFs::new(tmp.path()).expect("open");
        fs.write_bytes(&p("/f"), b"1").expect("write");
        fs.create_dir(&p("/d"), false).expect("mkdir");
        fs.write_bytes(&p("/d/inner"), b"1").expect("write");

        assert!(matches!(
            fs.open_read(&p("/nope")),
            Err(FsError::ResourceNotFound { .. })
        ));
        assert!(matches!(
            fs.list_info(&p("/f"), SpecNamespaces::basic()),
            Err(FsError::DirExpected { .. })
        ));
        assert!(matches!(
            fs.open_write(&p("/f"), false),
            Err(FsError::FileExists { .. })
        ));
        assert!(matches!(
            fs.open_write(&p("/missing/f"), true),
            Err(FsError::ParentNotFound { .. })
        ));
        assert!(matches!(
            fs.remove_dir(&p("/d")),
            Err(FsError::DirectoryNotEmpty { .. })
        ));
        assert!(matches!(
            fs.create_dir(&p("/d"), false),
            Err(FsError::DirectoryExists { .. })
        ));
    }

    #[test]
    fn native_copy_and_set_modified() {
        let tmp = TestDir::new();
        std::fs::create_dir_all(tmp.path().join("left")).expect("mkdir");
        std::fs::create_dir_all(tmp.path().join("right")).expect("mkdir");
        let fs_left = OsFs::new(tmp.path().join("left")).expect("open");
        let fs_right = OsFs::new(tmp.path().join("right")).expect("open");
        fs_left.write_bytes(&p("/a.txt"), b"abc").expect("write");

        fs_left
            .copy_resource(&p("/a.txt"), &fs_right, &p("/b.txt"))
            .expect("native copy");
        assert_eq!(fs_right.read_bytes(&p("/b.txt")).expect("read"), b"abc");

        let fs_mem = MemoryFs::new();
        assert!(
            fs_left
                .copy_resource(&p("/a.txt"), &fs_mem, &p("/a.txt"))
                .expect_err("foreign")
                .is_unsupported()
        );

        let t = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        fs_right.set_modified(&p("/b.txt"), t).expect("set modified");
        let info = fs_right
            .get_info(&p("/b.txt"), SpecNamespaces::details())
            .expect("info");
        assert_eq!(info.modified(), Some(t));
    }

    #[test]
    fn rename_within_backend() {
        let tmp = TestDir::new();
        let fs = OsFs::new(tmp.path()).expect("open");
        fs.make_dirs(&p("/src/inner")).expect("mkdirs");
        fs.write_bytes(&p("/src/inner/f"), b"z").expect("write");
        fs.move_resource(&p("/src"), &fs, &p("/dst")).expect("move");
        assert!(!tmp.path().join("src").exists());
        assert_eq!(fs.read_bytes(&p("/dst/inner/f")).expect("read"), b"z");
    }

    #[test]
    fn root_must_be_existing_directory() {
        let tmp = TestDir::new();
        assert!(matches!(
            OsFs::new(tmp.path().join("missing")),
            Err(FsError::ResourceNotFound { .. })
        ));
        let fs = OsFs::create(tmp.path().join("made/here")).expect("create");
        assert!(fs.host_root().is_dir());
    }
}
