//! Command transports
//!
//! One trait covers "run a command on a target and stream its output".
//! `LocalTransport` shells out on this machine; `SshTransport` holds an
//! open ssh2 session to a remote host. Both report the external exit
//! status as data, never as an error: callers inspect the code themselves.
//! Output is echoed line by line under the target prefix so concurrent
//! workers stay attributable.

use crate::error::{ExecError, ExecResult};
use colored::Colorize;
use ssh2::Session;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A command-execution channel to one target.
///
/// `run` resolves to the command's exit code; `transfer` copies a local
/// file onto the target. Sessions release their resources in `close` and
/// again on drop, so every exit path lets go of the connection.
pub trait Transport {
    fn run(&mut self, command: &str, env: &[(String, String)]) -> ExecResult<i32>;
    fn transfer(&mut self, local: &Path, remote: &str) -> ExecResult<()>;
    fn close(&mut self) {}
}

/// Runs commands on the machine armada itself runs on.
pub struct LocalTransport {
    prefix: String,
}

impl LocalTransport {
    pub fn new(prefix: &str) -> Self {
        LocalTransport {
            prefix: prefix.to_string(),
        }
    }
}

impl Transport for LocalTransport {
    fn run(&mut self, command: &str, env: &[(String, String)]) -> ExecResult<i32> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecError::Spawn {
                command: command.to_string(),
                error: e.to_string(),
            })?;

        let stderr = child.stderr.take();
        let err_prefix = self.prefix.clone();
        let err_thread = stderr.map(|pipe| {
            std::thread::spawn(move || {
                for line in BufReader::new(pipe).lines().map_while(|l| l.ok()) {
                    eprintln!("{} {}", err_prefix.cyan(), line);
                }
            })
        });

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines().map_while(|l| l.ok()) {
                println!("{} {}", self.prefix.cyan(), line);
            }
        }
        if let Some(handle) = err_thread {
            let _ = handle.join();
        }

        let status = child.wait().map_err(|e| ExecError::Spawn {
            command: command.to_string(),
            error: e.to_string(),
        })?;
        Ok(status.code().unwrap_or(-1))
    }

    fn transfer(&mut self, local: &Path, remote: &str) -> ExecResult<()> {
        let dest = Path::new(remote);
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ExecError::Transfer {
                    path: remote.to_string(),
                    error: e.to_string(),
                })?;
            }
        }
        fs::copy(local, dest).map_err(|e| ExecError::Transfer {
            path: remote.to_string(),
            error: e.to_string(),
        })?;
        Ok(())
    }
}

/// An open ssh2 session to a remote host.
pub struct SshTransport {
    session: Session,
    prefix: String,
}

impl SshTransport {
    /// Open a session: TCP connect, handshake, then agent auth with a
    /// key-file fallback.
    pub fn connect(
        user: Option<&str>,
        host: &str,
        port: u16,
        prefix: &str,
    ) -> ExecResult<Self> {
        let addr = format!("{host}:{port}");
        let tcp = TcpStream::connect(addr.as_str())
            .map_err(|e| ExecError::Connection(format!("{addr}: {e}")))?;

        let mut session =
            Session::new().map_err(|e| ExecError::Connection(e.to_string()))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| ExecError::Connection(format!("{addr}: {e}")))?;

        let user = user
            .map(String::from)
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "root".to_string());
        authenticate(&session, &user)?;

        Ok(SshTransport {
            session,
            prefix: prefix.to_string(),
        })
    }
}

fn authenticate(session: &Session, user: &str) -> ExecResult<()> {
    if session.userauth_agent(user).is_ok() && session.authenticated() {
        return Ok(());
    }
    for key_name in ["id_ed25519", "id_rsa"] {
        let Some(key) = home_dir().map(|h| h.join(".ssh").join(key_name)) else {
            break;
        };
        if key.is_file()
            && session.userauth_pubkey_file(user, None, &key, None).is_ok()
            && session.authenticated()
        {
            return Ok(());
        }
    }
    Err(ExecError::Connection(format!(
        "authentication failed for user '{user}'"
    )))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

impl Transport for SshTransport {
    fn run(&mut self, command: &str, env: &[(String, String)]) -> ExecResult<i32> {
        // Remote processes get task-local variables as export prefixes;
        // there is no cross-command environment on the channel.
        let mut full = String::new();
        for (key, value) in env {
            let quoted = shlex::try_quote(value)
                .map(|q| q.into_owned())
                .unwrap_or_else(|_| value.clone());
            full.push_str(&format!("export {key}={quoted}; "));
        }
        full.push_str(command);

        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| ExecError::Session(e.to_string()))?;
        // A pty merges stderr into the stream, like an interactive login.
        channel
            .request_pty("xterm", None, None)
            .map_err(|e| ExecError::Session(e.to_string()))?;
        channel
            .exec(&full)
            .map_err(|e| ExecError::Session(e.to_string()))?;

        for line in BufReader::new(&mut channel).lines().map_while(|l| l.ok()) {
            println!("{} {}", self.prefix.cyan(), line);
        }

        channel
            .wait_close()
            .map_err(|e| ExecError::Session(e.to_string()))?;
        channel
            .exit_status()
            .map_err(|e| ExecError::Session(e.to_string()))
    }

    fn transfer(&mut self, local: &Path, remote: &str) -> ExecResult<()> {
        let bytes = fs::read(local).map_err(|e| ExecError::Transfer {
            path: local.display().to_string(),
            error: e.to_string(),
        })?;
        let mut channel = self
            .session
            .scp_send(Path::new(remote), 0o644, bytes.len() as u64, None)
            .map_err(|e| ExecError::Transfer {
                path: remote.to_string(),
                error: e.to_string(),
            })?;
        channel.write_all(&bytes).map_err(|e| ExecError::Transfer {
            path: remote.to_string(),
            error: e.to_string(),
        })?;
        channel.send_eof().ok();
        channel.wait_eof().ok();
        channel.close().ok();
        channel.wait_close().ok();
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.session.disconnect(None, "done", None);
    }
}
