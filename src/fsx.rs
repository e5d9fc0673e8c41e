//! Filesystem abstraction
//!
//! The engine touches disk only through [`FileSystem`]. Two contracts
//! matter beyond the obvious:
//!
//! - `atomic_write` stages a temp file in the destination directory and
//!   renames over the target, so readers never observe a partial file.
//! - `lstat` and `readlink` do not follow symlinks; mode validation in
//!   the planner depends on seeing the link itself.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// What an `lstat` found at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Symlink,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::File => "file",
            FileKind::Dir => "directory",
            FileKind::Symlink => "symlink",
        }
    }
}

/// Symlink-aware stat result.
#[derive(Debug, Clone, Copy)]
pub struct Lstat {
    pub kind: FileKind,
    pub len: u64,
}

/// Capability object for all disk access.
pub trait FileSystem: Send + Sync {
    /// Whether anything (including a dangling symlink) exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Stat without following symlinks. `None` when nothing is there.
    fn lstat(&self, path: &Path) -> Result<Option<Lstat>>;

    /// Read a symlink target. Errors if `path` is not a symlink.
    fn readlink(&self, path: &Path) -> Result<PathBuf>;

    fn mkdir_all(&self, path: &Path) -> Result<()>;

    /// Remove whatever is at `path`: file, symlink, or directory tree.
    /// Missing paths are not an error.
    fn remove(&self, path: &Path) -> Result<()>;

    /// Create a symlink at `new` pointing to `old`.
    fn symlink(&self, old: &Path, new: &Path) -> Result<()>;

    /// Copy `src` to `dst`, recursively for directories. Unix file
    /// permissions are preserved.
    fn copy(&self, src: &Path, dst: &Path) -> Result<()>;

    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// List directory entries, sorted by file name.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Write via temp file + rename in the same directory.
    fn atomic_write(&self, path: &Path, data: &[u8], perm: Option<u32>) -> Result<()>;
}

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    fn dangling_aware_exists(path: &Path) -> bool {
        // Path::exists follows symlinks; a dangling link reports false.
        path.symlink_metadata().is_ok()
    }
}

impl FileSystem for RealFs {
    fn exists(&self, path: &Path) -> bool {
        Self::dangling_aware_exists(path)
    }

    fn lstat(&self, path: &Path) -> Result<Option<Lstat>> {
        match path.symlink_metadata() {
            Ok(meta) => {
                let kind = if meta.file_type().is_symlink() {
                    FileKind::Symlink
                } else if meta.is_dir() {
                    FileKind::Dir
                } else {
                    FileKind::File
                };
                Ok(Some(Lstat {
                    kind,
                    len: meta.len(),
                }))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io(path, err)),
        }
    }

    fn readlink(&self, path: &Path) -> Result<PathBuf> {
        fs::read_link(path).map_err(|err| Error::io(path, err))
    }

    fn mkdir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|err| Error::io(path, err))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let meta = match path.symlink_metadata() {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(Error::io(path, err)),
        };

        let result = if meta.file_type().is_symlink() || meta.is_file() {
            fs::remove_file(path)
        } else {
            fs::remove_dir_all(path)
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::io(path, err)),
        }
    }

    #[cfg(unix)]
    fn symlink(&self, old: &Path, new: &Path) -> Result<()> {
        std::os::unix::fs::symlink(old, new).map_err(|err| Error::io(new, err))
    }

    #[cfg(windows)]
    fn symlink(&self, old: &Path, new: &Path) -> Result<()> {
        if old.is_dir() {
            std::os::windows::fs::symlink_dir(old, new).map_err(|err| Error::io(new, err))
        } else {
            std::os::windows::fs::symlink_file(old, new).map_err(|err| Error::io(new, err))
        }
    }

    fn copy(&self, src: &Path, dst: &Path) -> Result<()> {
        let meta = src.symlink_metadata().map_err(|err| Error::io(src, err))?;

        if meta.is_dir() {
            fs::create_dir_all(dst).map_err(|err| Error::io(dst, err))?;
            for entry in self.read_dir(src)? {
                let name = entry
                    .file_name()
                    .ok_or_else(|| Error::OperationFailed(format!(
                        "unnameable entry under {}",
                        src.display()
                    )))?
                    .to_os_string();
                self.copy(&entry, &dst.join(name))?;
            }
            copy_permissions(&meta, dst)?;
            return Ok(());
        }

        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
        }
        fs::copy(src, dst).map_err(|err| Error::io(dst, err))?;
        Ok(())
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|err| Error::io(path, err))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).map_err(|err| Error::io(path, err))? {
            let entry = entry.map_err(|err| Error::io(path, err))?;
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn atomic_write(&self, path: &Path, data: &[u8], perm: Option<u32>) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
        }

        // Temp file lives next to the target so the rename stays on one
        // filesystem and is atomic.
        let temp_path = temp_sibling(path);

        let mut file = File::create(&temp_path).map_err(|err| Error::io(&temp_path, err))?;
        file.write_all(data)
            .and_then(|()| file.sync_all())
            .map_err(|err| Error::io(&temp_path, err))?;
        drop(file);

        #[cfg(unix)]
        if let Some(mode) = perm {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(mode))
                .map_err(|err| Error::io(&temp_path, err))?;
        }
        #[cfg(not(unix))]
        let _ = perm;

        fs::rename(&temp_path, path).map_err(|err| Error::io(path, err))?;
        Ok(())
    }
}

/// SHA-256 digest of a path's content, lower hex. Files hash their
/// bytes; directories hash the sorted relative names and digests of
/// their leaf files, so two trees with equal content digest equally.
pub fn checksum(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};

    let stat = fs
        .lstat(path)?
        .ok_or_else(|| Error::io(path, io::Error::new(io::ErrorKind::NotFound, "missing")))?;

    if stat.kind != FileKind::Dir {
        let bytes = fs.read_file(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        return Ok(hex(&hasher.finalize()));
    }

    let mut leaves: Vec<(String, String)> = Vec::new();
    collect_leaf_digests(fs, path, path, &mut leaves)?;
    leaves.sort();

    let mut hasher = Sha256::new();
    for (rel, digest) in leaves {
        hasher.update(rel.as_bytes());
        hasher.update(b"\0");
        hasher.update(digest.as_bytes());
        hasher.update(b"\n");
    }
    Ok(hex(&hasher.finalize()))
}

fn collect_leaf_digests(
    fs: &dyn FileSystem,
    root: &Path,
    dir: &Path,
    out: &mut Vec<(String, String)>,
) -> Result<()> {
    for entry in fs.read_dir(dir)? {
        let Some(stat) = fs.lstat(&entry)? else {
            continue;
        };
        if stat.kind == FileKind::Dir {
            collect_leaf_digests(fs, root, &entry, out)?;
        } else {
            let rel = entry
                .strip_prefix(root)
                .unwrap_or(&entry)
                .to_string_lossy()
                .replace('\\', "/");
            out.push((rel, checksum(fs, &entry)?));
        }
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn temp_sibling(path: &Path) -> PathBuf {
    let pid = std::process::id();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!("{name}.tmp.{pid}"))
}

#[cfg(unix)]
fn copy_permissions(meta: &fs::Metadata, dst: &Path) -> Result<()> {
    fs::set_permissions(dst, meta.permissions()).map_err(|err| Error::io(dst, err))
}

#[cfg(not(unix))]
fn copy_permissions(_meta: &fs::Metadata, _dst: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let fs_ = RealFs;
        let target = temp.path().join("nested/dir/out.json");

        fs_.atomic_write(&target, b"{}", None).unwrap();

        assert_eq!(fs_.read_file(&target).unwrap(), b"{}");
        let siblings = fs_.read_dir(target.parent().unwrap()).unwrap();
        assert_eq!(siblings, vec![target.clone()]);
    }

    #[test]
    fn lstat_reports_kind_without_following() {
        let temp = TempDir::new().unwrap();
        let fs_ = RealFs;

        let file = temp.path().join("a.txt");
        fs_.atomic_write(&file, b"hi", None).unwrap();
        let link = temp.path().join("a.link");
        fs_.symlink(&file, &link).unwrap();

        assert_eq!(fs_.lstat(&file).unwrap().unwrap().kind, FileKind::File);
        assert_eq!(fs_.lstat(&link).unwrap().unwrap().kind, FileKind::Symlink);
        assert!(fs_.lstat(&temp.path().join("missing")).unwrap().is_none());
    }

    #[test]
    fn exists_sees_dangling_symlinks() {
        let temp = TempDir::new().unwrap();
        let fs_ = RealFs;

        let target = temp.path().join("gone.txt");
        let link = temp.path().join("dangling");
        fs_.atomic_write(&target, b"x", None).unwrap();
        fs_.symlink(&target, &link).unwrap();
        fs_.remove(&target).unwrap();

        assert!(fs_.exists(&link));
        assert_eq!(fs_.lstat(&link).unwrap().unwrap().kind, FileKind::Symlink);
    }

    #[test]
    fn remove_handles_every_kind_and_missing() {
        let temp = TempDir::new().unwrap();
        let fs_ = RealFs;

        let file = temp.path().join("f");
        fs_.atomic_write(&file, b"x", None).unwrap();
        fs_.remove(&file).unwrap();
        assert!(!fs_.exists(&file));

        let dir = temp.path().join("d/e");
        fs_.mkdir_all(&dir).unwrap();
        fs_.atomic_write(&dir.join("inner"), b"x", None).unwrap();
        fs_.remove(&temp.path().join("d")).unwrap();
        assert!(!fs_.exists(&temp.path().join("d")));

        // Idempotent on missing paths
        fs_.remove(&temp.path().join("never")).unwrap();
    }

    #[test]
    fn checksum_matches_across_equal_trees() {
        let temp = TempDir::new().unwrap();
        let fs_ = RealFs;

        for root in ["one", "two"] {
            let dir = temp.path().join(root);
            fs_.mkdir_all(&dir.join("sub")).unwrap();
            fs_.atomic_write(&dir.join("a.txt"), b"alpha", None).unwrap();
            fs_.atomic_write(&dir.join("sub/b.txt"), b"beta", None)
                .unwrap();
        }

        let one = checksum(&fs_, &temp.path().join("one")).unwrap();
        let two = checksum(&fs_, &temp.path().join("two")).unwrap();
        assert_eq!(one, two);

        fs_.atomic_write(&temp.path().join("two/a.txt"), b"ALPHA", None)
            .unwrap();
        let changed = checksum(&fs_, &temp.path().join("two")).unwrap();
        assert_ne!(one, changed);
    }

    #[test]
    fn copy_recurses_and_preserves_structure() {
        let temp = TempDir::new().unwrap();
        let fs_ = RealFs;

        let src = temp.path().join("src");
        fs_.mkdir_all(&src.join("sub")).unwrap();
        fs_.atomic_write(&src.join("top.txt"), b"top", None).unwrap();
        fs_.atomic_write(&src.join("sub/leaf.txt"), b"leaf", None)
            .unwrap();

        let dst = temp.path().join("dst");
        fs_.copy(&src, &dst).unwrap();

        assert_eq!(fs_.read_file(&dst.join("top.txt")).unwrap(), b"top");
        assert_eq!(fs_.read_file(&dst.join("sub/leaf.txt")).unwrap(), b"leaf");
    }
}
