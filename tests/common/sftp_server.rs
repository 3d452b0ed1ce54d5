//! In-memory SFTP server.
//!
//! `MockTransport::open_subsystem("sftp")` hands the client one end of a
//! `tokio::io::duplex` pipe and runs this handler on the other end through
//! `russh_sftp::server::run`, so `SftpHandler` talks real SFTP v3 packets.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode,
};
use russh_sftp::server::Handler;

use shellmaster_core::ssh::BoxedStream;

/// Home directory reported for `realpath(".")`
pub const HOME: &str = "/home/alice";

const DIR_MODE: u32 = 0o040755;
const FILE_MODE: u32 = 0o100644;

#[derive(Clone, Debug)]
enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Default)]
struct FsState {
    nodes: BTreeMap<String, Node>,
    /// Paths the server refuses to touch
    denied: HashSet<String>,
}

/// Shared file tree; clones see the same state
#[derive(Clone)]
pub struct MemoryFs {
    state: Arc<Mutex<FsState>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Tree with `/`, `/home` and the home directory
    pub fn new() -> Self {
        let fs = Self {
            state: Arc::new(Mutex::new(FsState::default())),
        };
        fs.add_dir("/");
        fs.add_dir("/home");
        fs.add_dir(HOME);
        fs
    }

    pub fn add_dir(&self, path: &str) {
        self.state.lock().nodes.insert(normalize(path), Node::Dir);
    }

    pub fn add_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .nodes
            .insert(normalize(path), Node::File(data.into()));
    }

    /// Every request on `path` fails with PermissionDenied
    pub fn deny(&self, path: &str) {
        self.state.lock().denied.insert(normalize(path));
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.state.lock().nodes.get(&normalize(path)) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().nodes.contains_key(&normalize(path))
    }

    /// Start a server task and return the client end of the pipe
    pub async fn serve(&self) -> BoxedStream {
        let (client, server) = tokio::io::duplex(256 * 1024);
        russh_sftp::server::run(server, SftpServer::new(self.clone())).await;
        Box::new(client)
    }

    fn check(&self, path: &str) -> Result<(), StatusCode> {
        if self.state.lock().denied.contains(path) {
            return Err(StatusCode::PermissionDenied);
        }
        Ok(())
    }

    fn attrs(&self, path: &str) -> Result<FileAttributes, StatusCode> {
        self.check(path)?;
        let state = self.state.lock();
        let node = state.nodes.get(path).ok_or(StatusCode::NoSuchFile)?;
        Ok(attrs_of(node))
    }

    fn children(&self, dir: &str) -> Vec<File> {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        let state = self.state.lock();
        state
            .nodes
            .iter()
            .filter_map(|(path, node)| {
                let name = path.strip_prefix(&prefix)?;
                if name.is_empty() || name.contains('/') {
                    return None;
                }
                Some(File::new(name, attrs_of(node)))
            })
            .collect()
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/{}", HOME, trimmed)
    }
}

fn parent(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => path[..pos].to_string(),
    }
}

fn attrs_of(node: &Node) -> FileAttributes {
    let mut attrs = FileAttributes::empty();
    attrs.uid = Some(1000);
    attrs.gid = Some(1000);
    attrs.mtime = Some(1_700_000_000);
    match node {
        Node::Dir => {
            attrs.permissions = Some(DIR_MODE);
            attrs.size = Some(4096);
        }
        Node::File(data) => {
            attrs.permissions = Some(FILE_MODE);
            attrs.size = Some(data.len() as u64);
        }
    }
    attrs
}

fn ok(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

enum OpenHandle {
    File(String),
    Dir { path: String, listed: bool },
}

/// One handler per client connection
struct SftpServer {
    fs: MemoryFs,
    handles: HashMap<String, OpenHandle>,
    next_handle: u64,
}

impl SftpServer {
    fn new(fs: MemoryFs) -> Self {
        Self {
            fs,
            handles: HashMap::new(),
            next_handle: 0,
        }
    }

    fn register(&mut self, handle: OpenHandle) -> String {
        self.next_handle += 1;
        let name = format!("h{}", self.next_handle);
        self.handles.insert(name.clone(), handle);
        name
    }

    fn file_path(&self, handle: &str) -> Result<String, StatusCode> {
        match self.handles.get(handle) {
            Some(OpenHandle::File(path)) => Ok(path.clone()),
            _ => Err(StatusCode::Failure),
        }
    }
}

impl Handler for SftpServer {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let resolved = match path.as_str() {
            "" | "." => HOME.to_string(),
            other => normalize(other),
        };
        Ok(Name {
            id,
            files: vec![File::dummy(resolved)],
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let attrs = self.fs.attrs(&normalize(&path))?;
        Ok(Attrs { id, attrs })
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        self.stat(id, path).await
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let path = self.file_path(&handle)?;
        let attrs = self.fs.attrs(&path)?;
        Ok(Attrs { id, attrs })
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let path = normalize(&path);
        self.fs.check(&path)?;
        match self.fs.state.lock().nodes.get(&path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => return Err(StatusCode::Failure),
            None => return Err(StatusCode::NoSuchFile),
        }
        let handle = self.register(OpenHandle::Dir {
            path,
            listed: false,
        });
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let path = match self.handles.get_mut(&handle) {
            Some(OpenHandle::Dir { listed: true, .. }) => return Err(StatusCode::Eof),
            Some(OpenHandle::Dir { path, listed }) => {
                *listed = true;
                path.clone()
            }
            _ => return Err(StatusCode::Failure),
        };

        // real servers include the dot entries
        let mut files = vec![
            File::new(".", attrs_of(&Node::Dir)),
            File::new("..", attrs_of(&Node::Dir)),
        ];
        files.extend(self.fs.children(&path));
        Ok(Name { id, files })
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let path = normalize(&filename);
        self.fs.check(&path)?;
        {
            let mut state = self.fs.state.lock();
            if !matches!(state.nodes.get(&parent(&path)), Some(Node::Dir)) {
                return Err(StatusCode::NoSuchFile);
            }
            match state.nodes.get(&path) {
                Some(Node::Dir) => return Err(StatusCode::Failure),
                Some(Node::File(_)) if pflags.contains(OpenFlags::TRUNCATE) => {
                    state.nodes.insert(path.clone(), Node::File(Vec::new()));
                }
                Some(Node::File(_)) => {}
                None if pflags.contains(OpenFlags::CREATE) => {
                    state.nodes.insert(path.clone(), Node::File(Vec::new()));
                }
                None => return Err(StatusCode::NoSuchFile),
            }
        }
        let handle = self.register(OpenHandle::File(path));
        Ok(Handle { id, handle })
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let path = self.file_path(&handle)?;
        let state = self.fs.state.lock();
        let Some(Node::File(content)) = state.nodes.get(&path) else {
            return Err(StatusCode::NoSuchFile);
        };
        let start = offset as usize;
        if start >= content.len() {
            return Err(StatusCode::Eof);
        }
        let end = (start + len as usize).min(content.len());
        Ok(Data {
            id,
            data: content[start..end].to_vec(),
        })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let path = self.file_path(&handle)?;
        let mut state = self.fs.state.lock();
        let Some(Node::File(content)) = state.nodes.get_mut(&path) else {
            return Err(StatusCode::NoSuchFile);
        };
        let start = offset as usize;
        let end = start + data.len();
        if content.len() < end {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(&data);
        Ok(ok(id))
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        self.handles.remove(&handle);
        Ok(ok(id))
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        let path = normalize(&filename);
        self.fs.check(&path)?;
        let mut state = self.fs.state.lock();
        match state.nodes.get(&path) {
            Some(Node::File(_)) => {
                state.nodes.remove(&path);
                Ok(ok(id))
            }
            Some(Node::Dir) => Err(StatusCode::Failure),
            None => Err(StatusCode::NoSuchFile),
        }
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let path = normalize(&path);
        self.fs.check(&path)?;
        self.fs.check(&parent(&path))?;
        let mut state = self.fs.state.lock();
        if state.nodes.contains_key(&path) {
            return Err(StatusCode::Failure);
        }
        if !matches!(state.nodes.get(&parent(&path)), Some(Node::Dir)) {
            return Err(StatusCode::NoSuchFile);
        }
        state.nodes.insert(path, Node::Dir);
        Ok(ok(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        let path = normalize(&path);
        self.fs.check(&path)?;
        if !self.fs.children(&path).is_empty() {
            return Err(StatusCode::Failure);
        }
        let mut state = self.fs.state.lock();
        match state.nodes.get(&path) {
            Some(Node::Dir) => {
                state.nodes.remove(&path);
                Ok(ok(id))
            }
            Some(Node::File(_)) => Err(StatusCode::Failure),
            None => Err(StatusCode::NoSuchFile),
        }
    }
}
