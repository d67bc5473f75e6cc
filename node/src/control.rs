//! Node control socket.
//!
//! Accepts one command per line:
//!
//! ```text
//! seed <rid> <all|followed> <true|false>
//! unseed <rid>
//! follow <nid> [<alias>]
//! unfollow <nid>
//! register <rid> <public|private>
//! ```
//!
//! The node replies `ok` once every command of a connection was applied, or
//! `error: <reason>` at the first failing command.
use std::io::prelude::*;
use std::io::BufReader;
use std::os::unix::net::UnixListener;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::{fs, io, net};

use shared::{NodeId, RepoId};

use crate::handle;
use crate::handle::traits::PolicyAPI;
use crate::policy::{Scope, Visibility};

/// Default name for control socket file.
pub const DEFAULT_SOCKET_NAME: &str = "radicle.sock";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to bind control socket listener: {0}")]
    Bind(io::Error),
}

/// Listen for commands on the control socket, and process them.
pub fn listen<P: AsRef<Path>, H: PolicyAPI>(path: P, handle: H) -> Result<(), Error> {
    // Remove the socket file on startup before rebinding.
    fs::remove_file(&path).ok();

    let listener = UnixListener::bind(&path).map_err(Error::Bind)?;
    log::info!("Listening on control socket {}", path.as_ref().display());

    for incoming in listener.incoming() {
        match incoming {
            Ok(mut stream) => {
                if let Err(e) = drain(&stream, &handle) {
                    log::error!("Received {} on control socket", e);

                    writeln!(stream, "error: {}", e).ok();

                    stream.flush().ok();
                    stream.shutdown(net::Shutdown::Both).ok();
                } else {
                    writeln!(stream, "ok").ok();
                }
            }
            Err(e) => log::error!("Failed to open control socket stream: {}", e),
        }
    }

    Ok(())
}

#[derive(thiserror::Error, Debug)]
enum DrainError {
    #[error("invalid command argument `{0}`")]
    InvalidCommandArg(String),
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("invalid command")]
    InvalidCommand,
    #[error("node error: {0}")]
    Node(#[from] handle::Error),
}

fn pop_record(rec: &csv::StringRecord) -> (Option<&str>, csv::StringRecord) {
    let mut ret = csv::StringRecord::new();
    for field in rec.iter().skip(1) {
        ret.push_field(field);
    }
    (rec.get(0), ret)
}

fn invalid_arg(args: &csv::StringRecord) -> DrainError {
    DrainError::InvalidCommandArg(args.iter().collect::<Vec<_>>().join(" "))
}

fn drain<H: PolicyAPI>(stream: &UnixStream, node: &H) -> Result<(), DrainError> {
    let no_csv_header = None;

    let reader = BufReader::new(stream);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(b' ')
        .from_reader(reader);

    for record in reader.records() {
        let record = if let Ok(v) = record {
            v
        } else {
            // parse error
            continue;
        };

        let (cmd, args) = pop_record(&record);
        match cmd {
            Some("seed") => {
                let (rid, scope, fetch): (RepoId, Scope, bool) = args
                    .deserialize(no_csv_header)
                    .map_err(|_| invalid_arg(&args))?;

                node.seed(rid, scope, fetch)?;
            }
            Some("unseed") => {
                let (rid,): (RepoId,) = args
                    .deserialize(no_csv_header)
                    .map_err(|_| invalid_arg(&args))?;

                node.unseed(rid)?;
            }
            Some("follow") => {
                let nid: NodeId = args
                    .get(0)
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| invalid_arg(&args))?;
                let alias = args.iter().skip(1).collect::<Vec<_>>().join(" ");
                let alias = if alias.is_empty() { None } else { Some(alias) };

                node.follow(nid, alias)?;
            }
            Some("unfollow") => {
                let (nid,): (NodeId,) = args
                    .deserialize(no_csv_header)
                    .map_err(|_| invalid_arg(&args))?;

                node.unfollow(nid)?;
            }
            Some("register") => {
                let (rid, visibility): (RepoId, Visibility) = args
                    .deserialize(no_csv_header)
                    .map_err(|_| invalid_arg(&args))?;

                node.register(rid, visibility)?;
            }
            Some(cmd) => return Err(DrainError::UnknownCommand(cmd.to_owned())),
            None => return Err(DrainError::InvalidCommand),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::prelude::*;
    use std::os::unix::net::UnixStream;
    use std::{net, thread};

    use std::sync::Arc;

    use super::*;
    use crate::handle::Handle;
    use crate::policy::Policies;
    use crate::test;
    use crate::test::handle::Command;

    fn connect(socket: &Path) -> UnixStream {
        loop {
            if let Ok(stream) = UnixStream::connect(socket) {
                break stream;
            }
        }
    }

    fn reply(mut stream: UnixStream) -> String {
        let mut buf = String::new();
        stream.shutdown(net::Shutdown::Write).unwrap();
        stream.read_to_string(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_control_socket() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = test::handle::Handle::default();
        let socket = tmp.path().join("alice.sock");
        let repos = test::arbitrary::set::<RepoId>(1..3);
        let nid = test::arbitrary::gen::<NodeId>(1);

        thread::spawn({
            let socket = socket.clone();
            let handle = handle.clone();

            move || listen(socket, handle)
        });

        let stream = connect(&socket);
        for rid in &repos {
            writeln!(&stream, "seed {} followed true", rid).unwrap();
        }
        writeln!(&stream, "follow {} alice", nid).unwrap();
        writeln!(&stream, "unfollow {}", nid).unwrap();
        for rid in &repos {
            writeln!(&stream, "register {} private", rid).unwrap();
        }
        for rid in &repos {
            writeln!(&stream, "unseed {}", rid).unwrap();
        }
        assert_eq!(reply(stream), "ok\n");

        let commands = handle.commands.lock().unwrap().clone();
        let mut expected = repos
            .iter()
            .map(|rid| Command::Seed(*rid, Scope::Followed, true))
            .collect::<Vec<_>>();
        expected.push(Command::Follow(nid, Some(String::from("alice"))));
        expected.push(Command::Unfollow(nid));
        expected.extend(
            repos
                .iter()
                .map(|rid| Command::Register(*rid, Visibility::Private)),
        );
        expected.extend(repos.iter().map(|rid| Command::Unseed(*rid)));

        assert_eq!(commands, expected);
    }

    #[test]
    fn test_control_socket_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = test::handle::Handle::default();
        let socket = tmp.path().join("bob.sock");

        thread::spawn({
            let socket = socket.clone();
            let handle = handle.clone();

            move || listen(socket, handle)
        });

        let stream = connect(&socket);
        writeln!(&stream, "seed rad:nope all true").unwrap();
        assert!(reply(stream).starts_with("error: invalid command argument"));

        let stream = connect(&socket);
        writeln!(&stream, "register {} hidden", test::arbitrary::gen::<RepoId>(1)).unwrap();
        assert!(reply(stream).starts_with("error: invalid command argument"));

        let stream = connect(&socket);
        writeln!(&stream, "reboot now").unwrap();
        assert_eq!(reply(stream), "error: unknown command `reboot`\n");

        assert!(handle.commands.lock().unwrap().is_empty());
    }

    #[test]
    fn test_control_socket_policies() {
        let tmp = tempfile::tempdir().unwrap();
        let policies = Arc::new(Policies::memory());
        let socket = tmp.path().join("carol.sock");
        let rid = test::arbitrary::gen::<RepoId>(1);

        thread::spawn({
            let socket = socket.clone();
            let handle = Handle::new(policies.clone());

            move || listen(socket, handle)
        });

        let stream = connect(&socket);
        writeln!(&stream, "register {} private", rid).unwrap();
        writeln!(&stream, "seed {} all true", rid).unwrap();
        assert_eq!(reply(stream), "ok\n");

        assert_eq!(policies.visibility(&rid), Some(Visibility::Private));
        assert_eq!(policies.list_inventory().into_iter().collect::<Vec<_>>(), vec![rid]);
    }
}
