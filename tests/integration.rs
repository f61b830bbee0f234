//! End-to-end tests against a loopback mock FTP server.
//!
//! Each test spins up a `TcpListener` on an ephemeral port and drives the
//! control (and, where relevant, data) connection from a background thread
//! following a fixed script, while the main thread exercises `Session`
//! against it. This follows the teacher's preference for direct assertions
//! over a mocking framework — there is no mock FTP server crate in scope,
//! so a real loopback socket stands in for one.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ftpclient::session::{DownloadOptions, UploadOptions};
use ftpclient::{FtpError, Session, TransferType};

fn write_line(stream: &mut TcpStream, line: &str) {
    stream.write_all(line.as_bytes()).unwrap();
    stream.write_all(b"\r\n").unwrap();
    stream.flush().unwrap();
}

fn read_command(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line.trim_end_matches(['\r', '\n']).to_string()
}

fn expect_prefix(reader: &mut BufReader<TcpStream>, prefix: &str) -> String {
    let line = read_command(reader);
    assert!(
        line.starts_with(prefix),
        "expected a command starting with {prefix:?}, got {line:?}"
    );
    line
}

/// `USER anonymous` -> `230`, then an empty `FEAT` (no `UTF8`) — the
/// shortest path to an authenticated, non-UTF-8 session.
fn perform_anonymous_login(reader: &mut BufReader<TcpStream>, writer: &mut TcpStream) {
    expect_prefix(reader, "USER anonymous");
    write_line(writer, "230 logged in");
    expect_prefix(reader, "FEAT");
    write_line(writer, "211 End");
}

fn passive_reply_for(port: u16) -> String {
    format!(
        "227 Entering Passive Mode (127,0,0,1,{},{})",
        port / 256,
        port % 256
    )
}

/// Scenario 1: a multi-line welcome is framed correctly and `connected`
/// flips to `true`.
#[test]
fn connect_reads_multiline_welcome() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        write_line(&mut stream, "220-hello");
        write_line(&mut stream, "220 ready");
    });

    let session = Session::new();
    let welcome = session.connect(&addr.ip().to_string(), addr.port()).unwrap();
    assert_eq!(welcome.lines, vec!["hello", "ready"]);
    assert!(session.is_connected());

    server.join().unwrap();
}

/// Scenario 3: `USER u -> 331`, `PASS p -> 332`, `ACCT a -> 230` leaves the
/// session authenticated.
#[test]
fn login_with_account_sequence_authenticates() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        write_line(&mut writer, "220 welcome");
        expect_prefix(&mut reader, "USER u");
        write_line(&mut writer, "331 need password");
        expect_prefix(&mut reader, "PASS p");
        write_line(&mut writer, "332 need account");
        expect_prefix(&mut reader, "ACCT a");
        write_line(&mut writer, "230 logged in");
        expect_prefix(&mut reader, "FEAT");
        write_line(&mut writer, "211 End");
    });

    let session = Session::new();
    session.connect(&addr.ip().to_string(), addr.port()).unwrap();
    session.login("u", Some("p"), Some("a")).unwrap();
    assert!(session.is_authenticated());

    server.join().unwrap();
}

/// Scenario 3's negative half: `ACCT a -> 530` raises `ServerError{530}`.
#[test]
fn login_account_refused_surfaces_server_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        write_line(&mut writer, "220 welcome");
        expect_prefix(&mut reader, "USER u");
        write_line(&mut writer, "331 need password");
        expect_prefix(&mut reader, "PASS p");
        write_line(&mut writer, "332 need account");
        expect_prefix(&mut reader, "ACCT a");
        write_line(&mut writer, "530 invalid account");
    });

    let session = Session::new();
    session.connect(&addr.ip().to_string(), addr.port()).unwrap();
    let err = session.login("u", Some("p"), Some("a")).unwrap_err();
    assert!(matches!(err, FtpError::ServerError { code: 530, .. }));

    server.join().unwrap();
}

/// Scenario 5: a `FEAT` reply advertising `UTF8` switches the control
/// channel's charset and triggers `OPTS UTF8 ON`.
#[test]
fn feat_with_utf8_switches_charset_and_sends_opts() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        write_line(&mut writer, "220 welcome");
        expect_prefix(&mut reader, "USER anonymous");
        write_line(&mut writer, "230 logged in");
        expect_prefix(&mut reader, "FEAT");
        write_line(&mut writer, "211-Feat");
        write_line(&mut writer, " UTF8");
        write_line(&mut writer, "211 End");
        expect_prefix(&mut reader, "OPTS UTF8 ON");
        write_line(&mut writer, "200 UTF8 set to on");
    });

    let session = Session::new();
    session.connect(&addr.ip().to_string(), addr.port()).unwrap();
    session
        .login("anonymous", Some("guest@example.com"), None)
        .unwrap();
    assert!(session.utf8_supported());

    server.join().unwrap();
}

/// Scenario 4: requesting a restart the server refuses (`REST -> 502`)
/// must fail with the fixed "resume not supported" message before `RETR`
/// is ever sent.
#[test]
fn resume_with_unsupported_rest_translates_502_before_retr() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        write_line(&mut writer, "220 welcome");
        perform_anonymous_login(&mut reader, &mut writer);

        expect_prefix(&mut reader, "PASV");
        let data_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = data_listener.local_addr().unwrap().port();
        write_line(&mut writer, &passive_reply_for(port));

        expect_prefix(&mut reader, "TYPE I");
        write_line(&mut writer, "200 Type set to I");

        expect_prefix(&mut reader, "REST 100");
        write_line(&mut writer, "502 Command not implemented");
        // No RETR should ever arrive — the engine must give up first.
    });

    let session = Session::new();
    session.connect(&addr.ip().to_string(), addr.port()).unwrap();
    session
        .login("anonymous", Some("guest@example.com"), None)
        .unwrap();
    session.set_transfer_type(TransferType::Binary);

    let mut sink = Vec::new();
    let err = session
        .download(
            "archive.bin",
            &mut sink,
            DownloadOptions {
                restart_at: 100,
                ..Default::default()
            },
        )
        .unwrap_err();
    match err {
        FtpError::ServerError { code: 502, lines } => {
            assert_eq!(lines, vec!["Resume is not supported by this server"]);
        }
        other => panic!("expected ServerError{{502}}, got {other:?}"),
    }

    server.join().unwrap();
}

/// Scenario 6: the first `list()` succeeds via a DOS-dialect listing; a
/// second listing (also DOS) parses correctly through the same registry.
#[test]
fn list_parses_dos_dialect_listings() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        write_line(&mut writer, "220 welcome");
        perform_anonymous_login(&mut reader, &mut writer);

        let listings = [
            "01-15-26  10:32AM       <DIR>          subdir\r\n\
             01-15-26  10:32AM             1234 readme.txt\r\n",
            "01-16-26  09:00AM               42 second.txt\r\n",
        ];
        for listing in listings {
            expect_prefix(&mut reader, "PASV");
            let data_listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = data_listener.local_addr().unwrap().port();
            write_line(&mut writer, &passive_reply_for(port));

            expect_prefix(&mut reader, "TYPE A");
            write_line(&mut writer, "200 Type set to A");

            expect_prefix(&mut reader, "LIST");
            write_line(&mut writer, "150 opening data connection");
            let (mut data_stream, _) = data_listener.accept().unwrap();
            data_stream.write_all(listing.as_bytes()).unwrap();
            drop(data_stream);
            write_line(&mut writer, "226 transfer complete");
        }
    });

    let session = Session::new();
    session.connect(&addr.ip().to_string(), addr.port()).unwrap();
    session
        .login("anonymous", Some("guest@example.com"), None)
        .unwrap();

    let first = session.list(None).unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].name, "subdir");
    assert_eq!(first[1].name, "readme.txt");
    assert_eq!(first[1].size, 1234);

    let second = session.list(None).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].name, "second.txt");
    assert_eq!(second[0].size, 42);

    server.join().unwrap();
}

/// Scenario 7: aborting an in-progress download from another thread
/// unblocks the pump with `Aborted`, and the session is still usable for a
/// subsequent command.
#[test]
fn abort_during_download_unblocks_pump_and_session_recovers() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        write_line(&mut writer, "220 welcome");
        perform_anonymous_login(&mut reader, &mut writer);

        expect_prefix(&mut reader, "PASV");
        let data_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let data_port = data_listener.local_addr().unwrap().port();
        write_line(&mut writer, &passive_reply_for(data_port));

        expect_prefix(&mut reader, "TYPE I");
        write_line(&mut writer, "200 Type set to I");

        expect_prefix(&mut reader, "RETR");
        write_line(&mut writer, "150 opening data connection");

        let data_thread = thread::spawn(move || {
            let (mut data_stream, _) = data_listener.accept().unwrap();
            let _ = data_stream.write_all(b"partial-bytes-before-abort");
            let _ = data_stream.flush();
            let mut buf = [0u8; 16];
            // Blocks here until the client's abort path shuts the socket
            // down, at which point this read returns (EOF or an error).
            let _ = data_stream.read(&mut buf);
        });

        expect_prefix(&mut reader, "ABOR");
        write_line(&mut writer, "426 Connection closed; transfer aborted");
        write_line(&mut writer, "226 ABOR command successful");

        data_thread.join().unwrap();

        expect_prefix(&mut reader, "NOOP");
        write_line(&mut writer, "200 NOOP ok");
    });

    let session = Arc::new(Session::new());
    session.connect(&addr.ip().to_string(), addr.port()).unwrap();
    session
        .login("anonymous", Some("guest@example.com"), None)
        .unwrap();
    session.set_transfer_type(TransferType::Binary);

    let download_session = Arc::clone(&session);
    let download_thread = thread::spawn(move || {
        let mut sink = Vec::new();
        download_session.download("big.bin", &mut sink, DownloadOptions::default())
    });

    // Give the download thread time to reach the blocked pump read before
    // aborting it.
    thread::sleep(Duration::from_millis(200));
    session.abort_current_transfer(true).unwrap();

    let result = download_thread.join().unwrap();
    assert!(matches!(result, Err(FtpError::Aborted)));

    session.noop().unwrap();

    server.join().unwrap();
}

/// Upload specifics: `stream_offset`/`stream_length` bound what's read
/// from the local source independently of `restart_at`, which is only a
/// hint sent to the server via `REST`.
#[test]
fn upload_sends_only_the_bounded_slice_of_the_local_source() {
    use std::io::Seek;

    let mut source = tempfile::NamedTempFile::new().unwrap();
    source.write_all(b"0123456789ABCDEFGHIJ").unwrap();
    source.rewind().unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        write_line(&mut writer, "220 welcome");
        perform_anonymous_login(&mut reader, &mut writer);

        expect_prefix(&mut reader, "PASV");
        let data_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = data_listener.local_addr().unwrap().port();
        write_line(&mut writer, &passive_reply_for(port));

        expect_prefix(&mut reader, "TYPE I");
        write_line(&mut writer, "200 Type set to I");

        expect_prefix(&mut reader, "STOR upload.bin");
        write_line(&mut writer, "150 opening data connection");

        let (mut data_stream, _) = data_listener.accept().unwrap();
        let mut received = Vec::new();
        data_stream.read_to_end(&mut received).unwrap();
        assert_eq!(received, b"56789ABCDE");

        write_line(&mut writer, "226 transfer complete");
    });

    let session = Session::new();
    session.connect(&addr.ip().to_string(), addr.port()).unwrap();
    session
        .login("anonymous", Some("guest@example.com"), None)
        .unwrap();
    session.set_transfer_type(TransferType::Binary);

    let bytes = session
        .upload(
            "upload.bin",
            &mut source,
            UploadOptions {
                stream_offset: 5,
                stream_length: Some(10),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(bytes, 10);

    server.join().unwrap();
}
