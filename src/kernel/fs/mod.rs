// src/kernel/fs/mod.rs
//! Read-only filesystem abstraction
//!
//! The kernel reads program images and directory listings through the
//! [`FileSystem`] trait. A concrete backend (built from the boot
//! module outside this crate) is installed once with [`mount`].

use alloc::boxed::Box;
use spin::Mutex;

use crate::errors::{KernelError, KernelResult};

/// Maximum length of a file name, in bytes
pub const MAX_NAME_LEN: usize = 32;

/// File type tags carried by directory entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Clock device node
    Clock,
    /// The (single, flat) directory
    Directory,
    /// Regular file backed by an inode
    Regular,
}

impl FileKind {
    /// Decode the on-disk type field.
    #[must_use]
    pub const fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Clock),
            1 => Some(Self::Directory),
            2 => Some(Self::Regular),
            _ => None,
        }
    }
}

/// Directory entry: fixed-size name, type tag, inode number
#[derive(Debug, Clone, Copy)]
pub struct Dentry {
    pub name: [u8; MAX_NAME_LEN],
    pub name_len: usize,
    pub kind: FileKind,
    pub inode: u32,
}

impl Dentry {
    /// Entry name as a string slice (names are ASCII).
    #[must_use]
    pub fn name_str(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("")
    }
}

/// Backend interface for the flat read-only filesystem.
pub trait FileSystem: Send + Sync {
    /// Look up a directory entry by exact name.
    fn lookup(&self, name: &str) -> Option<Dentry>;

    /// Directory entry at `index`, in listing order.
    fn dentry_by_index(&self, index: usize) -> Option<Dentry>;

    /// Copy file data from `offset` into `buf`, returning bytes copied.
    /// Reads past end of file return 0.
    fn read_bytes(&self, inode: u32, offset: usize, buf: &mut [u8]) -> usize;
}

static FILE_SYSTEM: Mutex<Option<Box<dyn FileSystem>>> = Mutex::new(None);

/// Install the filesystem backend. Replaces any previous mount.
pub fn mount(fs: Box<dyn FileSystem>) {
    *FILE_SYSTEM.lock() = Some(fs);
}

/// Run `f` against the mounted filesystem.
pub fn with<R>(f: impl FnOnce(&dyn FileSystem) -> R) -> KernelResult<R> {
    let guard = FILE_SYSTEM.lock();
    match guard.as_ref() {
        Some(fs) => Ok(f(fs.as_ref())),
        None => Err(KernelError::NotFound),
    }
}

#[cfg(all(test, feature = "std-tests"))]
pub(crate) mod fixtures {
    use super::*;
    use alloc::vec::Vec;

    /// In-memory backend used by unit tests across the kernel.
    pub struct RamFs {
        entries: Vec<Dentry>,
        files: Vec<Vec<u8>>,
    }

    impl RamFs {
        pub fn new() -> Self {
            Self { entries: Vec::new(), files: Vec::new() }
        }

        pub fn add_special(&mut self, name: &str, kind: FileKind) {
            self.entries.push(make_dentry(name, kind, 0));
        }

        pub fn add_file(&mut self, name: &str, data: &[u8]) {
            let inode = self.files.len() as u32;
            self.files.push(data.to_vec());
            self.entries.push(make_dentry(name, FileKind::Regular, inode));
        }

        /// A regular file whose first bytes form a valid program image
        /// with the given entry point.
        pub fn add_program(&mut self, name: &str, entry: u32) {
            let mut image = [0u8; 32];
            image[..4].copy_from_slice(&crate::kernel::process::exec::EXEC_MAGIC);
            image[24..28].copy_from_slice(&entry.to_le_bytes());
            self.add_file(name, &image);
        }
    }

    impl FileSystem for RamFs {
        fn lookup(&self, name: &str) -> Option<Dentry> {
            self.entries.iter().find(|d| d.name_str() == name).copied()
        }

        fn dentry_by_index(&self, index: usize) -> Option<Dentry> {
            self.entries.get(index).copied()
        }

        fn read_bytes(&self, inode: u32, offset: usize, buf: &mut [u8]) -> usize {
            let Some(data) = self.files.get(inode as usize) else {
                return 0;
            };
            if offset >= data.len() {
                return 0;
            }
            let n = buf.len().min(data.len() - offset);
            buf[..n].copy_from_slice(&data[offset..offset + n]);
            n
        }
    }

    fn make_dentry(name: &str, kind: FileKind, inode: u32) -> Dentry {
        let mut buf = [0u8; MAX_NAME_LEN];
        let bytes = name.as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);
        Dentry { name: buf, name_len: bytes.len(), kind, inode }
    }

    /// Mount a fresh RamFs with the standard test contents.
    pub fn mount_standard() {
        let mut fs = RamFs::new();
        fs.add_special(".", FileKind::Directory);
        fs.add_special("clock", FileKind::Clock);
        fs.add_program("shell", 0x0804_8000);
        fs.add_program("prog", 0x0804_9000);
        fs.add_file("notes.txt", b"hello from the test fs\n");
        super::mount(Box::new(fs));
    }
}

#[cfg(all(test, feature = "std-tests"))]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_exact_names_only() {
        fixtures::mount_standard();
        with(|fs| {
            assert!(fs.lookup("shell").is_some());
            assert!(fs.lookup("shel").is_none());
            assert!(fs.lookup("shell ").is_none());
        })
        .unwrap();
    }

    #[test]
    fn reads_clamp_to_file_length() {
        fixtures::mount_standard();
        with(|fs| {
            let dentry = fs.lookup("notes.txt").unwrap();
            let mut buf = [0u8; 64];
            let n = fs.read_bytes(dentry.inode, 0, &mut buf);
            assert_eq!(&buf[..n], b"hello from the test fs\n");
            assert_eq!(fs.read_bytes(dentry.inode, n, &mut buf), 0);
        })
        .unwrap();
    }

    #[test]
    fn kind_decodes_known_wire_values() {
        assert_eq!(FileKind::from_wire(0), Some(FileKind::Clock));
        assert_eq!(FileKind::from_wire(2), Some(FileKind::Regular));
        assert_eq!(FileKind::from_wire(3), None);
    }
}
