//! SFTP integration tests.
//!
//! `MockTransport` serves the sftp subsystem from an in-memory tree, so
//! these run the real russh-sftp client against a real packet handler.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use common::{add_test_host, MockConnector, TestEnv, HOME};
use shellmaster_core::models::sftp::FileType;
use shellmaster_core::models::{OutputKind, SessionStatus};
use shellmaster_core::sftp::SftpError;
use shellmaster_core::{RegistryError, SessionRegistry, SessionSftp};

const CHUNK: usize = 1024;

struct Fixture {
    _env: TestEnv,
    connector: Arc<MockConnector>,
    registry: SessionRegistry,
    session_id: String,
}

/// Connected session with a small transfer chunk size
async fn connected() -> Fixture {
    let env = TestEnv::new();
    let connector = MockConnector::new();
    let mut settings = TestEnv::settings();
    settings.sftp.chunk_size = CHUNK;
    let registry = env.registry_with(connector.clone(), settings);
    let host = add_test_host(&registry);
    let session = registry.create_session(&host.id, "files").unwrap();
    registry.connect(&session.id).await.unwrap();
    registry.clear_output(&session.id).unwrap();

    Fixture {
        _env: env,
        connector,
        registry,
        session_id: session.id,
    }
}

impl Fixture {
    async fn sftp(&self) -> SessionSftp {
        self.registry.open_sftp(&self.session_id).await.unwrap()
    }

    fn last_output(&self) -> (OutputKind, String) {
        let output = self.registry.output(&self.session_id).unwrap();
        let last = output.last().expect("an output entry");
        (last.kind, last.content.clone())
    }
}

fn sftp_error(err: &RegistryError) -> &SftpError {
    err.sftp_source().expect("an SFTP error")
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ============================================================================
// Browsing
// ============================================================================

#[tokio::test]
async fn test_list_skips_dot_entries_and_puts_dirs_first() {
    let fx = connected().await;
    let fs = fx.connector.fs();
    fs.add_file("/home/alice/b.txt", "bbb");
    fs.add_file("/home/alice/a.txt", "a");
    fs.add_dir("/home/alice/zdir");
    fs.add_dir("/home/alice/adir");

    let sftp = fx.sftp().await;
    assert_eq!(sftp.session_id(), fx.session_id);
    assert_eq!(sftp.home_dir().await.unwrap(), HOME);

    let entries = sftp.list(HOME).await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["adir", "zdir", "a.txt", "b.txt"]);

    let b = &entries[3];
    assert_eq!(b.path, "/home/alice/b.txt");
    assert_eq!(b.file_type, FileType::File);
    assert_eq!(b.size, 3);
    assert_eq!(b.permission_string(), "-rw-r--r--");
    assert_eq!(b.owner, "1000");
    assert!(entries[0].is_dir());

    // successful operations leave the log alone
    assert!(fx.registry.output(&fx.session_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_stat_reports_file_details() {
    let fx = connected().await;
    fx.connector.fs().add_file("/home/alice/notes.md", "hello");

    let sftp = fx.sftp().await;
    let entry = sftp.stat("/home/alice/notes.md").await.unwrap();
    assert_eq!(entry.name, "notes.md");
    assert_eq!(entry.size, 5);
    assert!(entry.modified.is_some());

    let root = sftp.stat("/").await.unwrap();
    assert_eq!(root.name, "/");
    assert!(root.is_dir());
}

#[tokio::test]
async fn test_missing_path_is_not_found_and_logged() {
    let fx = connected().await;
    let sftp = fx.sftp().await;

    let err = sftp.list("/nope").await.unwrap_err();
    assert!(matches!(
        &err,
        RegistryError::Sftp { session_id, .. } if session_id == &fx.session_id
    ));
    assert_eq!(sftp_error(&err), &SftpError::NotFound("/nope".into()));

    let (kind, content) = fx.last_output();
    assert_eq!(kind, OutputKind::Error);
    assert!(content.contains("/nope"));

    // SFTP failures never touch the connection status
    assert_eq!(
        fx.registry.status(&fx.session_id),
        Some(SessionStatus::Connected)
    );
}

#[tokio::test]
async fn test_denied_path_is_permission_error() {
    let fx = connected().await;
    let fs = fx.connector.fs();
    fs.add_dir("/root");
    fs.deny("/root");

    let sftp = fx.sftp().await;
    let err = sftp.list("/root").await.unwrap_err();
    assert_eq!(sftp_error(&err), &SftpError::Permission("/root".into()));

    let err = sftp.stat("/root").await.unwrap_err();
    assert_eq!(sftp_error(&err), &SftpError::Permission("/root".into()));
    assert_eq!(fx.last_output().0, OutputKind::Error);
}

// ============================================================================
// Directory & File Management
// ============================================================================

#[tokio::test]
async fn test_mkdir_then_existing_is_rejected() {
    let fx = connected().await;
    let fs = fx.connector.fs();
    let sftp = fx.sftp().await;

    let path = sftp.mkdir(HOME, "docs").await.unwrap();
    assert_eq!(path, "/home/alice/docs");
    assert!(fs.exists("/home/alice/docs"));

    let err = sftp.mkdir(HOME, "docs").await.unwrap_err();
    assert_eq!(
        sftp_error(&err),
        &SftpError::AlreadyExists("/home/alice/docs".into())
    );

    let err = sftp.mkdir(HOME, "a/b").await.unwrap_err();
    assert_eq!(sftp_error(&err), &SftpError::InvalidPath("a/b".into()));
}

#[tokio::test]
async fn test_delete_files_and_empty_dirs() {
    let fx = connected().await;
    let fs = fx.connector.fs();
    fs.add_file("/home/alice/old.log", "x");
    fs.add_dir("/home/alice/empty");

    let sftp = fx.sftp().await;
    sftp.delete("/home/alice/old.log").await.unwrap();
    sftp.delete("/home/alice/empty").await.unwrap();
    assert!(!fs.exists("/home/alice/old.log"));
    assert!(!fs.exists("/home/alice/empty"));

    let err = sftp.delete("/home/alice/old.log").await.unwrap_err();
    assert_eq!(
        sftp_error(&err),
        &SftpError::NotFound("/home/alice/old.log".into())
    );
}

// ============================================================================
// Transfers
// ============================================================================

#[tokio::test]
async fn test_upload_and_download_in_chunks() {
    let fx = connected().await;
    let fs = fx.connector.fs();
    let sftp = fx.sftp().await;
    let data = pattern(10 * CHUNK + 17);

    let uploads = Arc::new(Mutex::new(Vec::new()));
    let seen = uploads.clone();
    let written = sftp
        .upload(
            &mut data.as_slice(),
            "/home/alice/blob.bin",
            &CancellationToken::new(),
            move |n| seen.lock().push(n),
        )
        .await
        .unwrap();
    assert_eq!(written, data.len() as u64);
    assert_eq!(fs.file("/home/alice/blob.bin").unwrap(), data);

    // one progress report per chunk, never more than a chunk at a time
    let uploads = uploads.lock().clone();
    assert_eq!(uploads.len(), 11);
    assert_eq!(uploads.last().copied(), Some(data.len() as u64));
    assert!(uploads.windows(2).all(|w| w[1] - w[0] <= CHUNK as u64));

    let mut sink = Vec::new();
    let mut last = 0;
    let read = sftp
        .download(
            "/home/alice/blob.bin",
            &mut sink,
            &CancellationToken::new(),
            |n| last = n,
        )
        .await
        .unwrap();
    assert_eq!(read, data.len() as u64);
    assert_eq!(last, data.len() as u64);
    assert_eq!(sink, data);
}

#[tokio::test]
async fn test_download_missing_file_is_not_found() {
    let fx = connected().await;
    let sftp = fx.sftp().await;

    let mut sink = Vec::new();
    let err = sftp
        .download("/home/alice/gone", &mut sink, &CancellationToken::new(), |_| {})
        .await
        .unwrap_err();
    assert_eq!(
        sftp_error(&err),
        &SftpError::NotFound("/home/alice/gone".into())
    );
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_upload_cancelled_mid_transfer() {
    let fx = connected().await;
    let sftp = fx.sftp().await;

    // endless source: only cancellation ends the transfer
    let mut source = tokio::io::repeat(b'x');
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let err = sftp
        .upload(&mut source, "/home/alice/big.bin", &cancel, move |n| {
            if n >= 4 * CHUNK as u64 {
                trigger.cancel();
            }
        })
        .await
        .unwrap_err();
    assert_eq!(sftp_error(&err), &SftpError::Cancelled);

    let (kind, content) = fx.last_output();
    assert_eq!(kind, OutputKind::System);
    assert!(content.contains("cancelled"));

    // only the transfer stopped; the handler keeps working
    assert!(sftp.list(HOME).await.is_ok());
}

// ============================================================================
// Session Ownership
// ============================================================================

#[tokio::test]
async fn test_open_sftp_requires_connection() {
    let env = TestEnv::new();
    let registry = env.registry(MockConnector::new());
    let host = add_test_host(&registry);
    let session = registry.create_session(&host.id, "files").unwrap();

    let err = registry.open_sftp(&session.id).await.err().unwrap();
    assert_eq!(err, RegistryError::NotConnected(session.id.clone()));

    let output = registry.output(&session.id).unwrap();
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].kind, OutputKind::Error);
}

#[tokio::test]
async fn test_disconnect_cancels_sftp_operations() {
    let fx = connected().await;
    let sftp = fx.sftp().await;
    assert!(sftp.list(HOME).await.is_ok());

    fx.registry.disconnect(&fx.session_id).await.unwrap();

    let err = sftp.list(HOME).await.unwrap_err();
    assert_eq!(sftp_error(&err), &SftpError::Cancelled);

    // a reconnect gets a fresh token, so a new handler works again
    fx.registry.connect(&fx.session_id).await.unwrap();
    let sftp = fx.sftp().await;
    assert!(sftp.list(HOME).await.is_ok());
}
