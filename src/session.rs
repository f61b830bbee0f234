//! The session controller: connection lifecycle, login,
//! post-login feature probe, and every command method, all mediated by
//! the session lock so at most one command is ever in flight.
//!
//! The session lock is the private `Mutex<SessionState>` below — held for
//! the *entire* duration of a command, including a transfer's data pump.
//! The control channel handle is kept in its own, much smaller mutex so
//! `abort_current_transfer` can reach the channel (to send `ABOR`) and
//! the abort-state lock without ever contending with the session lock a
//! blocked transfer is holding.

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;

use crate::config::ClientConfig;
use crate::connector::Connector;
use crate::control::{Charset, ControlChannel, ProtocolListener};
use crate::data_endpoint::DataEndpoint;
use crate::error::{FtpError, FtpResult};
use crate::listing::ListParserRegistry;
use crate::reply::Reply;
use crate::transfer_engine::{
    self, AbortState, ProgressListener, TransferDirection, TransferRequest,
};
use crate::type_selector::{self, DefaultTextExtensionRecognizer, TextExtensionRecognizer, TransferType};
use crate::types::RemoteFileEntry;

/// Everything the session lock guards: connection/auth flags, the
/// session's configured defaults, and the cached list-parser index
///.
struct SessionState {
    connected: bool,
    authenticated: bool,
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    passive: bool,
    transfer_type: TransferType,
    utf8_supported: bool,
    cached_parser: Option<usize>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            connected: false,
            authenticated: false,
            host: None,
            port: None,
            username: None,
            password: None,
            passive: true,
            transfer_type: TransferType::Auto,
            utf8_supported: false,
            cached_parser: None,
        }
    }
}

/// An FTP client session. Not reusable concurrently — commands are
/// mutually exclusive, though [`Session::abort_current_transfer`]
/// and [`Session::abruptly_close_communication`] are deliberately exempt so
/// they work while another thread is blocked inside a transfer.
pub struct Session {
    connector: Arc<dyn Connector>,
    config: ClientConfig,
    registry: ListParserRegistry,
    recognizer: Box<dyn TextExtensionRecognizer>,
    listeners: Mutex<Vec<Arc<dyn ProtocolListener>>>,
    control: Mutex<Option<Arc<ControlChannel>>>,
    abort_state: Arc<Mutex<AbortState>>,
    state: Mutex<SessionState>,
}

/// Options accepted by [`Session::download`]; everything has a sensible
/// default so most callers only set `restart_at` or `listener`.
#[derive(Default)]
pub struct DownloadOptions {
    /// `REST` offset to request before `RETR`. `0` means no restart.
    pub restart_at: u64,
    pub listener: Option<Arc<dyn ProgressListener>>,
    /// Size to report to `ProgressListener::started`, if already known
    /// (e.g. from a prior `SIZE` call).
    pub total_size: Option<u64>,
}

/// Options accepted by [`Session::upload`]; `stream_offset`/`stream_length`
/// are independent of `restart_at`.
#[derive(Default)]
pub struct UploadOptions {
    pub restart_at: u64,
    pub stream_offset: u64,
    pub stream_length: Option<u64>,
    pub listener: Option<Arc<dyn ProgressListener>>,
    pub total_size: Option<u64>,
}

impl Session {
    /// Build a new, not-yet-connected session using the default
    /// [`crate::connector::TcpConnector`] and the process environment for
    /// configuration.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(crate::connector::TcpConnector::new()))
    }

    /// Build a session with an explicit connector (e.g. the `tls` feature's
    /// `LegacySslConnector`, or a caller-supplied SOCKS/HTTP proxy
    /// connector) and default configuration read from the environment.
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self::with_connector_and_config(connector, ClientConfig::from_env())
    }

    /// Build a session with both an explicit connector and an explicit
    /// configuration, bypassing the process environment entirely — what
    /// tests should use to inject config values without mutating global
    /// state.
    pub fn with_connector_and_config(connector: Arc<dyn Connector>, config: ClientConfig) -> Self {
        Self {
            connector,
            config,
            registry: ListParserRegistry::with_builtins(),
            recognizer: Box::new(DefaultTextExtensionRecognizer),
            listeners: Mutex::new(Vec::new()),
            control: Mutex::new(None),
            abort_state: Arc::new(Mutex::new(AbortState::new())),
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Register a parser tried after the four built-ins when probing a
    /// listing's dialect.
    pub fn register_list_parser(&mut self, parser: Box<dyn crate::listing::ListParser>) {
        self.registry.register(parser);
    }

    /// Install a custom extension-to-type recognizer for `TransferType::Auto`.
    pub fn set_text_extension_recognizer(&mut self, recognizer: Box<dyn TextExtensionRecognizer>) {
        self.recognizer = recognizer;
    }

    /// Register a listener notified of every command sent and reply
    /// received, for the lifetime of the session. Applies
    /// immediately if already connected, and to every future connection.
    pub fn register_listener(&self, listener: Arc<dyn ProtocolListener>) {
        if let Some(control) = self.control.lock().unwrap().as_ref() {
            control.register_listener(Arc::clone(&listener));
        }
        self.listeners.lock().unwrap().push(listener);
    }

    /// Switch between passive (`PASV`, the default) and active (`PORT`)
    /// data-connection negotiation for subsequent transfers.
    pub fn set_passive(&self, passive: bool) {
        self.state.lock().unwrap().passive = passive;
    }

    /// Set the session-wide default transfer type; `Auto` resolves
    /// per-transfer from the remote filename.
    pub fn set_transfer_type(&self, transfer_type: TransferType) {
        self.state.lock().unwrap().transfer_type = transfer_type;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().unwrap().authenticated
    }

    pub fn utf8_supported(&self) -> bool {
        self.state.lock().unwrap().utf8_supported
    }

    // ---- connection lifecycle -------------------------------------------------

    /// Dial the control connection, read the welcome reply, and return it.
    /// Requires `!connected`.
    pub fn connect(&self, host: &str, port: u16) -> FtpResult<Reply> {
        let mut state = self.state.lock().unwrap();
        if state.connected {
            return Err(FtpError::illegal_state("already connected"));
        }

        let conn = self.connector.connect_for_command(host, port)?;
        let channel = Arc::new(ControlChannel::new(conn)?);
        for listener in self.listeners.lock().unwrap().iter() {
            channel.register_listener(Arc::clone(listener));
        }

        let welcome = match channel.receive_only() {
            Ok(reply) => reply,
            Err(e) => {
                let _ = channel.abruptly_close();
                return Err(e);
            }
        };
        if !welcome.is_success() {
            let _ = channel.abruptly_close();
            return Err(FtpError::server_error(welcome.code, welcome.lines));
        }

        *self.control.lock().unwrap() = Some(channel);
        state.connected = true;
        state.authenticated = false;
        state.host = Some(host.to_string());
        state.port = Some(port);
        state.utf8_supported = false;
        state.cached_parser = None;
        Ok(welcome)
    }

    /// `USER`, then `PASS`/`ACCT` as the server's replies demand. On
    /// success, runs the post-login `FEAT`/UTF-8 probe.
    pub fn login(&self, user: &str, password: Option<&str>, account: Option<&str>) -> FtpResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(FtpError::illegal_state("not connected"));
        }
        let control = self.control_handle()?;

        let user_reply = control.execute(&format!("USER {user}"))?;
        match user_reply.code {
            230 => {}
            331 => {
                let password = password.ok_or_else(|| {
                    FtpError::illegal_state("server requires a password (331) but none was given")
                })?;
                let pass_reply = control.execute(&format!("PASS {password}"))?;
                match pass_reply.code {
                    230 => {}
                    332 => self.send_account(&control, account)?,
                    _ => return Err(FtpError::server_error(pass_reply.code, pass_reply.lines)),
                }
            }
            332 => self.send_account(&control, account)?,
            _ => return Err(FtpError::server_error(user_reply.code, user_reply.lines)),
        }

        state.authenticated = true;
        state.username = Some(user.to_string());
        state.password = password.map(str::to_string);
        self.post_login(&control, &mut state);
        Ok(())
    }

    fn send_account(&self, control: &ControlChannel, account: Option<&str>) -> FtpResult<()> {
        let account = account.ok_or_else(|| {
            FtpError::illegal_state("server requires an account (332) but none was given")
        })?;
        let reply = control.execute(&format!("ACCT {account}"))?;
        if reply.code != 230 {
            return Err(FtpError::server_error(reply.code, reply.lines));
        }
        Ok(())
    }

    /// `FEAT`; scan for `UTF8` among the middle lines (excluding the
    /// first and last banner lines) and, if present, switch the control
    /// channel to UTF-8 and send `OPTS UTF8 ON`. Any
    /// failure here is swallowed — login still succeeds without UTF-8
    ///.
    fn post_login(&self, control: &ControlChannel, state: &mut SessionState) {
        let reply = match control.execute("FEAT") {
            Ok(r) => r,
            Err(e) => {
                log::warn!("FEAT probe failed (continuing without UTF-8): {e}");
                return;
            }
        };
        if reply.code != 211 {
            return;
        }
        let middle = if reply.lines.len() >= 2 {
            &reply.lines[1..reply.lines.len() - 1]
        } else {
            &[][..]
        };
        let supports_utf8 = middle
            .iter()
            .any(|line| line.to_ascii_uppercase().contains("UTF8"));
        if !supports_utf8 {
            return;
        }
        state.utf8_supported = true;
        control.set_charset(Charset::Utf8);
        if let Err(e) = control.execute("OPTS UTF8 ON") {
            log::warn!("OPTS UTF8 ON failed (ignored): {e}");
        }
    }

    /// `REIN`; on success clears authentication state but leaves
    /// `connected` true.
    pub fn logout(&self) -> FtpResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(FtpError::illegal_state("not connected"));
        }
        let control = self.control_handle()?;
        control.execute_expect_success("REIN")?;
        state.authenticated = false;
        state.username = None;
        state.password = None;
        state.utf8_supported = false;
        state.cached_parser = None;
        Ok(())
    }

    /// If `send_quit`, sends `QUIT` and expects 2xx; always closes the
    /// control connection and clears `connected`, even if `QUIT` itself
    /// failed.
    pub fn disconnect(&self, send_quit: bool) -> FtpResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(FtpError::illegal_state("not connected"));
        }
        let control = self.control_handle()?;

        let result = if send_quit {
            match control.execute("QUIT") {
                Ok(reply) if reply.is_success() => Ok(()),
                Ok(reply) => Err(FtpError::server_error(reply.code, reply.lines)),
                Err(e) => Err(e),
            }
        } else {
            Ok(())
        };

        let _ = control.abruptly_close();
        *self.control.lock().unwrap() = None;
        state.connected = false;
        state.authenticated = false;
        state.host = None;
        state.port = None;
        state.utf8_supported = false;
        state.cached_parser = None;
        result
    }

    /// Non-locking emergency shutdown: closes the control socket without
    /// taking the session lock, so it works even while another thread is
    /// blocked holding it. Subsequent commands observe
    /// `IOError`.
    pub fn abruptly_close_communication(&self) -> FtpResult<()> {
        if let Some(control) = self.control.lock().unwrap().as_ref() {
            control.abruptly_close()?;
        }
        Ok(())
    }

    fn control_handle(&self) -> FtpResult<Arc<ControlChannel>> {
        self.control
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| FtpError::illegal_state("not connected"))
    }

    fn require_connected_execute(&self, command: &str) -> FtpResult<Reply> {
        let state = self.state.lock().unwrap();
        if !state.connected {
            return Err(FtpError::illegal_state("not connected"));
        }
        let control = self.control_handle()?;
        drop(state);
        control.execute_expect_success(command)
    }

    // ---- single-round-trip commands -------------------------------------------

    pub fn noop(&self) -> FtpResult<()> {
        self.require_connected_execute("NOOP").map(|_| ())
    }

    pub fn help(&self) -> FtpResult<Reply> {
        self.require_connected_execute("HELP")
    }

    pub fn server_status(&self) -> FtpResult<Reply> {
        self.require_connected_execute("STAT")
    }

    pub fn send_custom(&self, command: &str) -> FtpResult<Reply> {
        self.require_connected_execute(command)
    }

    pub fn send_site(&self, args: &str) -> FtpResult<Reply> {
        self.require_connected_execute(&format!("SITE {args}"))
    }

    pub fn change_account(&self, account: &str) -> FtpResult<()> {
        self.require_connected_execute(&format!("ACCT {account}"))
            .map(|_| ())
    }

    /// `PWD`; unwraps the quoted absolute path from the single-line reply
    ///.
    pub fn current_directory(&self) -> FtpResult<String> {
        let reply = self.require_connected_execute("PWD")?;
        parse_quoted_path(&reply.text())
    }

    pub fn change_directory(&self, path: &str) -> FtpResult<()> {
        self.require_connected_execute(&format!("CWD {path}"))
            .map(|_| ())
    }

    pub fn change_directory_up(&self) -> FtpResult<()> {
        self.require_connected_execute("CDUP").map(|_| ())
    }

    /// `MDTM`; parses the `YYYYMMDDHHMMSS` reply as a server-reported UTC
    /// timestamp.
    pub fn modified_date(&self, path: &str) -> FtpResult<NaiveDateTime> {
        let reply = self.require_connected_execute(&format!("MDTM {path}"))?;
        let raw = reply
            .text()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        NaiveDateTime::parse_from_str(&raw, "%Y%m%d%H%M%S")
            .map_err(|e| FtpError::illegal_reply(format!("bad MDTM timestamp {raw:?}: {e}")))
    }

    /// `SIZE`; parses the reply as an unsigned 64-bit integer.
    pub fn file_size(&self, path: &str) -> FtpResult<u64> {
        let reply = self.require_connected_execute(&format!("SIZE {path}"))?;
        let raw = reply.text();
        let raw = raw.trim();
        raw.parse::<u64>()
            .map_err(|_| FtpError::illegal_reply(format!("bad SIZE reply: {raw:?}")))
    }

    /// `RNFR` (expecting `350`) then `RNTO` (expecting 2xx).
    pub fn rename(&self, from: &str, to: &str) -> FtpResult<()> {
        let state = self.state.lock().unwrap();
        if !state.connected {
            return Err(FtpError::illegal_state("not connected"));
        }
        let control = self.control_handle()?;
        drop(state);

        let rnfr = control.execute(&format!("RNFR {from}"))?;
        if rnfr.code != 350 {
            return Err(FtpError::server_error(rnfr.code, rnfr.lines));
        }
        control.execute_expect_success(&format!("RNTO {to}"))?;
        Ok(())
    }

    pub fn delete_file(&self, path: &str) -> FtpResult<()> {
        self.require_connected_execute(&format!("DELE {path}"))
            .map(|_| ())
    }

    pub fn delete_directory(&self, path: &str) -> FtpResult<()> {
        self.require_connected_execute(&format!("RMD {path}"))
            .map(|_| ())
    }

    pub fn create_directory(&self, path: &str) -> FtpResult<()> {
        self.require_connected_execute(&format!("MKD {path}"))
            .map(|_| ())
    }

    // ---- data-connection negotiation -------------------------------------------

    fn negotiate_endpoint(&self, control: &Arc<ControlChannel>, passive: bool) -> FtpResult<DataEndpoint> {
        if passive {
            DataEndpoint::negotiate_passive(control.as_ref(), Arc::clone(&self.connector))
        } else {
            let advertise = self.resolve_active_address(control)?;
            DataEndpoint::negotiate_active(control.as_ref(), advertise, None)
        }
    }

    /// `ACTIVE_DT_HOST_ADDRESS` override if configured, else the control
    /// connection's own local address.
    fn resolve_active_address(&self, control: &ControlChannel) -> FtpResult<Ipv4Addr> {
        if let Some(addr) = self.config.active_dt_host_address {
            return Ok(addr);
        }
        match control.local_addr()?.ip() {
            IpAddr::V4(v4) => Ok(v4),
            IpAddr::V6(_) => Err(FtpError::illegal_state(
                "active mode requires an IPv4 local address; IPv6/EPRT is out of scope",
            )),
        }
    }

    // ---- listings ---------------------------------------------------------------

    /// `LIST [spec]` in download mode with `TYPE A`, then feed the
    /// collected lines to the parser registry, using (and updating) the
    /// session's cached dialect.
    pub fn list(&self, spec: Option<&str>) -> FtpResult<Vec<RemoteFileEntry>> {
        let command = match spec {
            Some(s) => format!("LIST {s}"),
            None => "LIST".to_string(),
        };
        self.with_listing(command, |lines, state| {
            self.registry.parse(lines, &mut state.cached_parser)
        })
    }

    /// `NLST` in download mode with `TYPE A`; returns the collected
    /// non-empty lines verbatim.
    pub fn list_names(&self) -> FtpResult<Vec<String>> {
        self.with_listing("NLST".to_string(), |lines, _state| Ok(lines.to_vec()))
    }

    fn with_listing<T>(
        &self,
        command: String,
        finish: impl FnOnce(&[String], &mut SessionState) -> FtpResult<T>,
    ) -> FtpResult<T> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(FtpError::illegal_state("not connected"));
        }
        let control = self.control_handle()?;
        let endpoint = self.negotiate_endpoint(&control, state.passive)?;

        let mut buffer: Vec<u8> = Vec::new();
        let request = TransferRequest {
            direction: TransferDirection::Download,
            command,
            effective_type: crate::type_selector::EffectiveType::Textual,
            restart_at: None,
            endpoint,
            upload_source: None,
            download_sink: Some(&mut buffer),
            stream_offset: 0,
            stream_length: None,
            listener: None,
            total_size: None,
        };
        transfer_engine::run_transfer(&control, &self.config, &self.abort_state, request)?;

        let text = String::from_utf8_lossy(&buffer).into_owned();
        let lines: Vec<String> = text
            .lines()
            .map(str::to_string)
            .filter(|l| !l.is_empty())
            .collect();
        finish(&lines, &mut state)
    }

    // ---- transfers ----------------------------------------------------------------

    /// `RETR`, writing the transferred bytes to `sink`. The session's
    /// configured transfer type resolves to `TYPE A`/`TYPE I` based on
    /// `remote_path`'s extension unless overridden.
    pub fn download(
        &self,
        remote_path: &str,
        sink: &mut dyn Write,
        options: DownloadOptions,
    ) -> FtpResult<u64> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(FtpError::illegal_state("not connected"));
        }
        let control = self.control_handle()?;
        let endpoint = self.negotiate_endpoint(&control, state.passive)?;
        let effective_type =
            type_selector::effective_type(state.transfer_type, remote_path, self.recognizer.as_ref());

        let request = TransferRequest {
            direction: TransferDirection::Download,
            command: format!("RETR {remote_path}"),
            effective_type,
            restart_at: non_zero(options.restart_at),
            endpoint,
            upload_source: None,
            download_sink: Some(sink),
            stream_offset: 0,
            stream_length: None,
            listener: options.listener,
            total_size: options.total_size,
        };
        let bytes = transfer_engine::run_transfer(&control, &self.config, &self.abort_state, request)?;
        drop(state);
        Ok(bytes)
    }

    /// `STOR`, reading transferred bytes from `source` (after skipping
    /// `options.stream_offset` bytes and capping at `options.stream_length`).
    pub fn upload(
        &self,
        remote_path: &str,
        source: &mut dyn Read,
        options: UploadOptions,
    ) -> FtpResult<u64> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(FtpError::illegal_state("not connected"));
        }
        let control = self.control_handle()?;
        let endpoint = self.negotiate_endpoint(&control, state.passive)?;
        let effective_type =
            type_selector::effective_type(state.transfer_type, remote_path, self.recognizer.as_ref());

        let request = TransferRequest {
            direction: TransferDirection::Upload,
            command: format!("STOR {remote_path}"),
            effective_type,
            restart_at: non_zero(options.restart_at),
            endpoint,
            upload_source: Some(source),
            download_sink: None,
            stream_offset: options.stream_offset,
            stream_length: options.stream_length,
            listener: options.listener,
            total_size: options.total_size,
        };
        let bytes = transfer_engine::run_transfer(&control, &self.config, &self.abort_state, request)?;
        drop(state);
        Ok(bytes)
    }

    /// End the currently-running transfer from another thread of control
    ///. Deliberately does not take the
    /// session lock, so it works while a transfer is blocked holding it.
    pub fn abort_current_transfer(&self, send_abor: bool) -> FtpResult<()> {
        let control = self.control_handle()?;
        transfer_engine::abort_current_transfer(&control, &self.abort_state, send_abor)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn non_zero(offset: u64) -> Option<u64> {
    if offset == 0 {
        None
    } else {
        Some(offset)
    }
}

/// Unwrap a `257 "/some/path"`-style reply's quoted absolute path
///.
fn parse_quoted_path(text: &str) -> FtpResult<String> {
    let start = text
        .find('"')
        .ok_or_else(|| FtpError::illegal_reply(format!("PWD reply has no quoted path: {text:?}")))?;
    let rest = &text[start + 1..];
    let end = rest
        .find('"')
        .ok_or_else(|| FtpError::illegal_reply(format!("PWD reply missing closing quote: {text:?}")))?;
    let path = &rest[..end];
    if !path.starts_with('/') {
        return Err(FtpError::illegal_reply(format!(
            "PWD path is not absolute: {path:?}"
        )));
    }
    Ok(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_pwd_path() {
        assert_eq!(
            parse_quoted_path(r#""/home/user" is current directory"#).unwrap(),
            "/home/user"
        );
    }

    #[test]
    fn rejects_pwd_reply_without_quotes() {
        assert!(parse_quoted_path("no quotes here").is_err());
    }

    #[test]
    fn rejects_non_absolute_pwd_path() {
        assert!(parse_quoted_path(r#""relative/path" is current directory"#).is_err());
    }

    #[test]
    fn new_session_defaults_to_passive_and_auto_type() {
        let session = Session::new();
        let state = session.state.lock().unwrap();
        assert!(state.passive);
        assert_eq!(state.transfer_type, TransferType::Auto);
        assert!(!state.connected);
        assert!(!state.authenticated);
    }

    #[test]
    fn commands_before_connect_are_illegal_state() {
        let session = Session::new();
        assert!(matches!(session.noop(), Err(FtpError::IllegalState(_))));
        assert!(matches!(
            session.current_directory(),
            Err(FtpError::IllegalState(_))
        ));
    }

    #[test]
    fn non_zero_helper_maps_zero_to_none() {
        assert_eq!(non_zero(0), None);
        assert_eq!(non_zero(42), Some(42));
    }
}
