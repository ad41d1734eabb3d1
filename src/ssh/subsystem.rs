//! SFTP subsystem handler serving file operations under the configured root.
//!
//! Client paths are virtual absolute paths; they are normalized component by
//! component and joined onto the root directory, so a client can never name
//! anything outside it.  `..` segments that would climb past the virtual
//! root are clamped to it, matching OpenSSH chroot behaviour.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Handler state
// ---------------------------------------------------------------------------

enum HandleState {
    /// Directory listing produced at opendir time, drained by one readdir.
    Dir { entries: Vec<File>, done: bool },
    /// An open file plus its real path (needed for fsetstat).
    File {
        file: tokio::fs::File,
        path: PathBuf,
    },
}

/// Per-channel SFTP subsystem state.
pub struct SftpSubsystem {
    root: PathBuf,
    handles: HashMap<String, HandleState>,
    next_handle: u64,
}

impl SftpSubsystem {
    pub fn new(root_dir: &str) -> Self {
        Self {
            root: PathBuf::from(root_dir),
            handles: HashMap::new(),
            next_handle: 0,
        }
    }

    fn issue_handle(&mut self, state: HandleState) -> String {
        self.next_handle += 1;
        let handle = format!("h{}", self.next_handle);
        self.handles.insert(handle.clone(), state);
        handle
    }

    /// Map a client path onto the real filesystem, inside the root.
    fn resolve(&self, client_path: &str) -> PathBuf {
        self.root.join(normalize_virtual(client_path))
    }
}

// ---------------------------------------------------------------------------
// Path and attribute helpers
// ---------------------------------------------------------------------------

/// Normalize a virtual client path to a relative path under the root.
/// Leading slashes and `.` vanish; `..` pops at most back to the root.
fn normalize_virtual(client_path: &str) -> PathBuf {
    let mut out = PathBuf::new();
    for component in Path::new(client_path).components() {
        match component {
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// The virtual absolute form of a client path, as returned by realpath.
fn virtual_absolute(client_path: &str) -> String {
    let normalized = normalize_virtual(client_path);
    let joined = normalized.to_string_lossy();
    if joined.is_empty() {
        "/".to_string()
    } else {
        format!("/{joined}")
    }
}

fn attrs_of(meta: &std::fs::Metadata) -> FileAttributes {
    let mut attrs = FileAttributes {
        size: Some(meta.len()),
        ..Default::default()
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        attrs.uid = Some(meta.uid());
        attrs.gid = Some(meta.gid());
        attrs.permissions = Some(meta.mode());
        attrs.atime = Some(meta.atime() as u32);
        attrs.mtime = Some(meta.mtime() as u32);
    }
    attrs
}

fn io_status(e: &std::io::Error) -> StatusCode {
    match e.kind() {
        std::io::ErrorKind::NotFound => StatusCode::NoSuchFile,
        std::io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        _ => StatusCode::Failure,
    }
}

fn ok_status(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Handler implementation
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl russh_sftp::server::Handler for SftpSubsystem {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        debug!(version, ?extensions, "SFTP init");
        Ok(Version::new())
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        Ok(Name {
            id,
            files: vec![File::dummy(virtual_absolute(&path))],
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let real = self.resolve(&path);
        let meta = tokio::fs::metadata(&real).await.map_err(|e| io_status(&e))?;
        Ok(Attrs {
            id,
            attrs: attrs_of(&meta),
        })
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let real = self.resolve(&path);
        let meta = tokio::fs::symlink_metadata(&real)
            .await
            .map_err(|e| io_status(&e))?;
        Ok(Attrs {
            id,
            attrs: attrs_of(&meta),
        })
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        match self.handles.get(&handle) {
            Some(HandleState::File { file, .. }) => {
                let meta = file.metadata().await.map_err(|e| io_status(&e))?;
                Ok(Attrs {
                    id,
                    attrs: attrs_of(&meta),
                })
            }
            _ => Err(StatusCode::Failure),
        }
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let real = self.resolve(&path);
        apply_permissions(&real, &attrs).await?;
        Ok(ok_status(id))
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        handle: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        match self.handles.get(&handle) {
            Some(HandleState::File { path, .. }) => {
                let path = path.clone();
                apply_permissions(&path, &attrs).await?;
                Ok(ok_status(id))
            }
            _ => Err(StatusCode::Failure),
        }
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let real = self.resolve(&path);
        debug!(path = %path, real = %real.display(), "opendir");

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&real).await.map_err(|e| io_status(&e))?;
        while let Some(entry) = dir.next_entry().await.map_err(|e| io_status(&e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let attrs = match entry.metadata().await {
                Ok(meta) => attrs_of(&meta),
                Err(_) => FileAttributes::default(),
            };
            entries.push(File::new(name, attrs));
        }

        let handle = self.issue_handle(HandleState::Dir {
            entries,
            done: false,
        });
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        match self.handles.get_mut(&handle) {
            Some(HandleState::Dir { entries, done }) => {
                if *done {
                    return Err(StatusCode::Eof);
                }
                *done = true;
                Ok(Name {
                    id,
                    files: std::mem::take(entries),
                })
            }
            _ => Err(StatusCode::Failure),
        }
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let real = self.resolve(&filename);
        debug!(path = %filename, real = %real.display(), ?pflags, "open");

        let mut options = tokio::fs::OpenOptions::new();
        options
            .read(pflags.contains(OpenFlags::READ))
            .write(pflags.contains(OpenFlags::WRITE))
            .append(pflags.contains(OpenFlags::APPEND))
            .create(pflags.contains(OpenFlags::CREATE))
            .truncate(pflags.contains(OpenFlags::TRUNCATE));
        if pflags.contains(OpenFlags::EXCLUDE) {
            options.create_new(true);
        }

        let file = options.open(&real).await.map_err(|e| io_status(&e))?;
        let handle = self.issue_handle(HandleState::File { file, path: real });
        Ok(Handle { id, handle })
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        match self.handles.get_mut(&handle) {
            Some(HandleState::File { file, .. }) => {
                file.seek(SeekFrom::Start(offset))
                    .await
                    .map_err(|e| io_status(&e))?;
                let mut data = vec![0u8; len as usize];
                let n = file.read(&mut data).await.map_err(|e| io_status(&e))?;
                if n == 0 {
                    return Err(StatusCode::Eof);
                }
                data.truncate(n);
                Ok(Data { id, data })
            }
            _ => Err(StatusCode::Failure),
        }
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        match self.handles.get_mut(&handle) {
            Some(HandleState::File { file, .. }) => {
                file.seek(SeekFrom::Start(offset))
                    .await
                    .map_err(|e| io_status(&e))?;
                file.write_all(&data).await.map_err(|e| io_status(&e))?;
                Ok(ok_status(id))
            }
            _ => Err(StatusCode::Failure),
        }
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        if self.handles.remove(&handle).is_none() {
            warn!(handle = %handle, "close on unknown handle");
        }
        Ok(ok_status(id))
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        let real = self.resolve(&filename);
        tokio::fs::remove_file(&real)
            .await
            .map_err(|e| io_status(&e))?;
        Ok(ok_status(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let real = self.resolve(&path);
        tokio::fs::create_dir(&real)
            .await
            .map_err(|e| io_status(&e))?;
        Ok(ok_status(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        let real = self.resolve(&path);
        tokio::fs::remove_dir(&real)
            .await
            .map_err(|e| io_status(&e))?;
        Ok(ok_status(id))
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        let old = self.resolve(&oldpath);
        let new = self.resolve(&newpath);
        tokio::fs::rename(&old, &new)
            .await
            .map_err(|e| io_status(&e))?;
        Ok(ok_status(id))
    }
}

/// Apply the permission bits of a setstat/fsetstat request; other attribute
/// fields are accepted and ignored.
async fn apply_permissions(path: &Path, attrs: &FileAttributes) -> Result<(), StatusCode> {
    #[cfg(unix)]
    if let Some(mode) = attrs.permissions {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
            .await
            .map_err(|e| io_status(&e))?;
    }
    #[cfg(not(unix))]
    let _ = (path, attrs);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_root_and_current_dir() {
        assert_eq!(normalize_virtual("/upload/a.txt"), PathBuf::from("upload/a.txt"));
        assert_eq!(normalize_virtual("./a.txt"), PathBuf::from("a.txt"));
        assert_eq!(normalize_virtual("/"), PathBuf::new());
    }

    #[test]
    fn parent_dir_cannot_escape_root() {
        assert_eq!(normalize_virtual("/../../etc/passwd"), PathBuf::from("etc/passwd"));
        assert_eq!(normalize_virtual("/a/../../b"), PathBuf::from("b"));
        assert_eq!(normalize_virtual(".."), PathBuf::new());
    }

    #[test]
    fn parent_dir_pops_within_the_tree() {
        assert_eq!(normalize_virtual("/a/b/../c"), PathBuf::from("a/c"));
    }

    #[test]
    fn resolve_stays_under_root() {
        let subsystem = SftpSubsystem::new("/srv/sftp");
        assert_eq!(
            subsystem.resolve("/../escape"),
            PathBuf::from("/srv/sftp/escape")
        );
        assert_eq!(subsystem.resolve("/"), PathBuf::from("/srv/sftp"));
    }

    #[test]
    fn virtual_absolute_is_normalized() {
        assert_eq!(virtual_absolute("."), "/");
        assert_eq!(virtual_absolute("/"), "/");
        assert_eq!(virtual_absolute("/a/./b/../c"), "/a/c");
    }
}
