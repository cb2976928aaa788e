use rouilleftp::core_auth::{Authorizer, CredentialRecord, Permission, PermissionSet};
use rouilleftp::core_client::{ClientConfig, ControlSession, DataMode, EntryKind};
use rouilleftp::core_network::pasv::parse_epsv_reply;
use rouilleftp::core_network::{start_server, ServerHandle};
use rouilleftp::core_reply::Reply;
use rouilleftp::session::SessionSettings;
use rouilleftp::FtpError;
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;

struct TestServer {
    handle: ServerHandle,
    root: TempDir,
}

impl TestServer {
    fn port(&self) -> u16 {
        self.handle.local_addr().port()
    }
}

fn settings() -> SessionSettings {
    SessionSettings {
        data_timeout: Duration::from_secs(5),
        stall_timeout: Duration::from_secs(5),
        idle_timeout: Duration::from_secs(30),
        ..SessionSettings::default()
    }
}

async fn start_with(users: &[(&str, &str, PermissionSet)], settings: SessionSettings) -> TestServer {
    let root = tempfile::tempdir().unwrap();
    let authorizer = Authorizer::new(
        users
            .iter()
            .map(|(name, secret, perms)| CredentialRecord::new(*name, *secret, root.path(), perms.clone())),
    );
    let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let handle = start_server("test", bind, authorizer, settings).await.unwrap();
    TestServer { handle, root }
}

async fn start_default() -> TestServer {
    start_with(
        &[
            ("alice", "secret", PermissionSet::all()),
            ("guest", "guest", PermissionSet::read_only()),
        ],
        settings(),
    )
    .await
}

fn client_config(mode: DataMode) -> ClientConfig {
    ClientConfig {
        connect_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_secs(10),
        data_timeout: Duration::from_secs(5),
        data_mode: mode,
        ..ClientConfig::default()
    }
}

async fn login(server: &TestServer, user: &str, password: &str, mode: DataMode) -> ControlSession {
    let mut session = ControlSession::connect("127.0.0.1", server.port(), client_config(mode))
        .await
        .unwrap();
    session.login(user, password).await.unwrap();
    session
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn reply_code(err: &FtpError) -> Option<u16> {
    err.reply().map(|r| r.code)
}

#[tokio::test]
async fn test_round_trip_preserves_bytes() {
    let server = start_default().await;
    let mut session = login(&server, "alice", "secret", DataMode::Passive).await;

    for len in [0usize, 1, 65536, 10_000_000] {
        let data = payload(len);
        let name = format!("file-{}.bin", len);

        let report = session.store_from(&mut data.as_slice(), &name).await.unwrap();
        assert_eq!(report.bytes, len as u64);
        assert_eq!(report.reply.code, 226);
        assert_eq!(std::fs::read(server.root.path().join(&name)).unwrap(), data);

        let mut downloaded = Vec::new();
        let report = session.retrieve_into(&name, &mut downloaded).await.unwrap();
        assert_eq!(report.bytes, len as u64);
        assert_eq!(downloaded, data, "{} bytes", len);
    }

    session.quit().await.unwrap();
    server.handle.stop().await;
}

#[tokio::test]
async fn test_active_mode_round_trip() {
    let server = start_default().await;
    let mut session = login(&server, "alice", "secret", DataMode::Active).await;

    let data = payload(300_000);
    session.store_from(&mut data.as_slice(), "active.bin").await.unwrap();
    let mut downloaded = Vec::new();
    session.retrieve_into("active.bin", &mut downloaded).await.unwrap();
    assert_eq!(downloaded, data);

    let names = session.nlst(None).await.unwrap();
    assert_eq!(names, vec!["active.bin".to_string()]);

    session.quit().await.unwrap();
    server.handle.stop().await;
}

#[tokio::test]
async fn test_file_transfer_through_local_paths() {
    let server = start_default().await;
    let local = tempfile::tempdir().unwrap();
    let source = local.path().join("upload.txt");
    std::fs::write(&source, b"hello over ftp").unwrap();

    let mut session = login(&server, "alice", "secret", DataMode::Passive).await;
    session.upload(&source, "remote.txt").await.unwrap();
    let target = local.path().join("download.txt");
    let report = session.download("remote.txt", &target).await.unwrap();
    assert_eq!(report.bytes, 14);
    assert_eq!(std::fs::read(&target).unwrap(), b"hello over ftp");

    let missing = session
        .download("nope.txt", &local.path().join("nope.txt"))
        .await
        .unwrap_err();
    assert_eq!(reply_code(&missing), Some(550));
    assert!(session.is_connected());

    server.handle.stop().await;
}

#[tokio::test]
async fn test_permission_denied_leaves_filesystem_untouched() {
    let server = start_default().await;
    std::fs::write(server.root.path().join("keep.txt"), b"keep").unwrap();
    let mut session = login(&server, "guest", "guest", DataMode::Passive).await;

    let err = session
        .store_from(&mut &b"data"[..], "new.txt")
        .await
        .unwrap_err();
    assert_eq!(reply_code(&err), Some(550));
    assert!(!server.root.path().join("new.txt").exists());

    let err = session.delete("keep.txt").await.unwrap_err();
    assert_eq!(reply_code(&err), Some(550));
    assert!(server.root.path().join("keep.txt").exists());

    let err = session.mkdir("sub").await.unwrap_err();
    assert_eq!(reply_code(&err), Some(550));
    assert!(!server.root.path().join("sub").exists());

    // Reading is still allowed.
    let mut out = Vec::new();
    session.retrieve_into("keep.txt", &mut out).await.unwrap();
    assert_eq!(out, b"keep");

    server.handle.stop().await;
}

#[tokio::test]
async fn test_overwrite_needs_its_own_permission() {
    let perms = PermissionSet::all().without(Permission::Overwrite);
    let server = start_with(&[("bob", "pw", perms)], settings()).await;
    let mut session = login(&server, "bob", "pw", DataMode::Passive).await;

    session.store_from(&mut &b"first"[..], "f.txt").await.unwrap();
    let err = session
        .store_from(&mut &b"second"[..], "f.txt")
        .await
        .unwrap_err();
    assert_eq!(reply_code(&err), Some(550));
    assert_eq!(std::fs::read(server.root.path().join("f.txt")).unwrap(), b"first");

    server.handle.stop().await;
}

#[tokio::test]
async fn test_commands_before_login_are_rejected() {
    let server = start_default().await;
    std::fs::write(server.root.path().join("secret.txt"), b"x").unwrap();
    let mut session = ControlSession::connect("127.0.0.1", server.port(), client_config(DataMode::Passive))
        .await
        .unwrap();

    for line in ["LIST", "RETR secret.txt", "STOR x", "CWD /", "PASV", "DELE secret.txt"] {
        let reply = session.raw_command(line).await.unwrap();
        assert_eq!(reply.code, 530, "{}", line);
    }
    assert!(server.root.path().join("secret.txt").exists());

    let reply = session.raw_command("PASS secret").await.unwrap();
    assert_eq!(reply.code, 503);

    // The session survives the bad sequence and can still log in.
    session.login("alice", "secret").await.unwrap();
    assert_eq!(session.pwd().await.unwrap(), "/");
    let names = session.nlst(None).await.unwrap();
    assert_eq!(names, vec!["secret.txt"]);

    server.handle.stop().await;
}

#[tokio::test]
async fn test_retrieve_needs_its_own_permission() {
    let perms = PermissionSet::all().without(Permission::Retrieve);
    let server = start_with(&[("carol", "pw", perms)], settings()).await;
    std::fs::write(server.root.path().join("report.pdf"), b"confidential").unwrap();
    let local = tempfile::tempdir().unwrap();
    let target = local.path().join("report.pdf");

    for mode in [DataMode::Active, DataMode::Passive] {
        let mut session = login(&server, "carol", "pw", mode).await;
        let err = session.download("report.pdf", &target).await.unwrap_err();
        assert_eq!(reply_code(&err), Some(550));
        // Rejected on the RETR itself, never a 150.
        assert_eq!(session.last_reply().map(|r| r.code), Some(550));
        assert!(!target.exists());

        // Listing is still allowed and the session stays usable.
        assert_eq!(session.nlst(None).await.unwrap(), vec!["report.pdf"]);
        session.quit().await.unwrap();
    }

    server.handle.stop().await;
}

#[tokio::test]
async fn test_quit_during_upload_is_answered_immediately() {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    let server = start_with(&[("alice", "secret", PermissionSet::all())], settings()).await;
    let control = TcpStream::connect(("127.0.0.1", server.port())).await.unwrap();
    let (read, mut write) = control.into_split();
    let mut lines = BufReader::new(read).lines();
    assert!(lines.next_line().await.unwrap().unwrap().starts_with("220 "));

    let mut replies = Vec::new();
    for command in ["USER alice", "PASS secret", "EPSV"] {
        write.write_all(format!("{}\r\n", command).as_bytes()).await.unwrap();
        replies.push(lines.next_line().await.unwrap().unwrap());
    }
    let epsv = Reply::new(229, &replies[2][4..]);
    let data_port = parse_epsv_reply(&epsv).unwrap();
    let _data = TcpStream::connect(("127.0.0.1", data_port)).await.unwrap();

    write.write_all(b"STOR big.bin\r\n").await.unwrap();
    assert!(lines.next_line().await.unwrap().unwrap().starts_with("150 "));

    let started = std::time::Instant::now();
    write.write_all(b"QUIT\r\n").await.unwrap();
    let aborted = lines.next_line().await.unwrap().unwrap();
    let goodbye = lines.next_line().await.unwrap().unwrap();
    assert!(aborted.starts_with("426 "), "{}", aborted);
    assert!(goodbye.starts_with("221 "), "{}", goodbye);
    // Well under the 5s stall timeout of the test settings.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(lines.next_line().await.unwrap().is_none());

    server.handle.stop().await;
}

#[tokio::test]
async fn test_paths_cannot_escape_root() {
    let server = start_default().await;
    let mut session = login(&server, "alice", "secret", DataMode::Passive).await;

    let err = session.cwd("..").await.unwrap_err();
    assert_eq!(reply_code(&err), Some(550));
    let err = session.size("../../etc/passwd").await.unwrap_err();
    assert_eq!(reply_code(&err), Some(550));
    let mut sink = Vec::new();
    let err = session.retrieve_into("/../etc/passwd", &mut sink).await.unwrap_err();
    assert_eq!(reply_code(&err), Some(550));
    assert_eq!(session.pwd().await.unwrap(), "/");

    session.mkdir("sub").await.unwrap();
    session.cwd("sub").await.unwrap();
    assert_eq!(session.pwd().await.unwrap(), "/sub");
    let err = session.cwd("../..").await.unwrap_err();
    assert_eq!(reply_code(&err), Some(550));
    assert_eq!(session.pwd().await.unwrap(), "/sub");

    server.handle.stop().await;
}

#[tokio::test]
async fn test_listing_and_namespace_operations() {
    let server = start_default().await;
    let mut session = login(&server, "alice", "secret", DataMode::Passive).await;

    session.mkdir("docs").await.unwrap();
    session.store_from(&mut &b"12345"[..], "a.txt").await.unwrap();

    let mut entries = session.list(None).await.unwrap();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "a.txt");
    assert_eq!(entries[0].kind, EntryKind::File);
    assert_eq!(entries[0].size, Some(5));
    assert_eq!(entries[1].name, "docs");
    assert_eq!(entries[1].kind, EntryKind::Directory);

    let long = session.list_long(None).await.unwrap();
    assert!(long.iter().any(|e| e.name == "docs" && e.kind == EntryKind::Directory));
    assert!(long.iter().any(|e| e.name == "a.txt" && e.size == Some(5)));

    session.rename("a.txt", "docs/b.txt").await.unwrap();
    assert!(server.root.path().join("docs").join("b.txt").exists());
    let reply = session.raw_command("RNTO c.txt").await.unwrap();
    assert_eq!(reply.code, 503);

    let err = session.rmdir("docs").await.unwrap_err();
    assert_eq!(reply_code(&err), Some(550));
    session.delete("docs/b.txt").await.unwrap();
    session.rmdir("docs").await.unwrap();
    assert!(session.list(None).await.unwrap().is_empty());

    session.noop().await.unwrap();
    server.handle.stop().await;
}

#[tokio::test]
async fn test_transfer_without_data_negotiation_is_425() {
    let server = start_default().await;
    std::fs::write(server.root.path().join("a.txt"), b"a").unwrap();
    let mut session = login(&server, "alice", "secret", DataMode::Passive).await;

    let reply = session.raw_command("RETR a.txt").await.unwrap();
    assert_eq!(reply.code, 425);
    let reply = session.raw_command("LIST").await.unwrap();
    assert_eq!(reply.code, 425);
    let reply = session.raw_command("FROB").await.unwrap();
    assert_eq!(reply.code, 502);
    session.noop().await.unwrap();

    server.handle.stop().await;
}

#[tokio::test]
async fn test_concurrent_uploads() {
    let server = start_default().await;
    let port = server.port();
    let mut tasks = Vec::new();

    for i in 0..4u8 {
        tasks.push(tokio::spawn(async move {
            let mut session = ControlSession::connect("127.0.0.1", port, client_config(DataMode::Passive))
                .await
                .unwrap();
            session.login("alice", "secret").await.unwrap();
            let data: Vec<u8> = (0..5_000_000usize).map(|j| (j as u8).wrapping_add(i)).collect();
            let name = format!("upload-{}.bin", i);
            session.store_from(&mut data.as_slice(), &name).await.unwrap();
            session.quit().await.unwrap();
            (name, data)
        }));
    }

    for task in tasks {
        let (name, data) = task.await.unwrap();
        assert_eq!(std::fs::read(server.root.path().join(name)).unwrap(), data);
    }
    server.handle.stop().await;
}

#[tokio::test]
async fn test_repeated_login_failures_disconnect() {
    let settings = SessionSettings {
        max_login_failures: 2,
        ..settings()
    };
    let server = start_with(&[("alice", "secret", PermissionSet::all())], settings).await;
    let mut session = ControlSession::connect("127.0.0.1", server.port(), client_config(DataMode::Passive))
        .await
        .unwrap();

    let first = session.login("alice", "wrong").await.unwrap_err();
    assert!(matches!(first, FtpError::AuthenticationRejected(_)));
    assert_eq!(session.last_reply().unwrap().code, 530);

    let second = session.login("alice", "wrong").await.unwrap_err();
    assert!(matches!(second, FtpError::AuthenticationRejected(_)));
    assert_eq!(session.last_reply().unwrap().code, 421);

    assert!(session.noop().await.is_err());
    assert!(matches!(session.noop().await, Err(FtpError::NotConnected)));
    server.handle.stop().await;
}

#[tokio::test]
async fn test_multiple_instances_and_stop() {
    let a = start_with(&[("alice", "a", PermissionSet::all())], settings()).await;
    let b = start_with(&[("bob", "b", PermissionSet::all())], settings()).await;
    assert_ne!(a.port(), b.port());

    let mut on_a = login(&a, "alice", "a", DataMode::Passive).await;
    let mut wrong = ControlSession::connect("127.0.0.1", b.port(), client_config(DataMode::Passive))
        .await
        .unwrap();
    assert!(wrong.login("alice", "a").await.is_err());
    let mut on_b = login(&b, "bob", "b", DataMode::Passive).await;

    // Stopping waits for connected sessions, which are told to go away.
    let port_a = a.port();
    tokio::time::timeout(Duration::from_secs(10), a.handle.stop())
        .await
        .unwrap();
    assert!(on_a.noop().await.is_err());
    assert!(matches!(
        ControlSession::connect("127.0.0.1", port_a, client_config(DataMode::Passive)).await,
        Err(FtpError::ConnectionRefused { .. })
    ));

    // The other instance is unaffected.
    on_b.noop().await.unwrap();
    on_b.quit().await.unwrap();
    wrong.quit().await.unwrap();
    b.handle.stop().await;
}
