//! Stream readers and the exit watcher of a running job.
//!
//! The watcher joins both readers before reporting the exit, so every line of
//! a run reaches the event loop ahead of its terminal status.

use std::io::{BufRead, BufReader, Read};
use std::process::Child;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use log::{debug, error};

use crate::models::message::ProcessMessage;

pub const ERROR_PREFIX: &str = "ERROR: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    fn tag(self, line: &str) -> String {
        match self {
            StreamKind::Stdout => line.to_string(),
            StreamKind::Stderr => format!("{}{}", ERROR_PREFIX, line),
        }
    }
}

/// Calls `emit` for each line; `\n` and `\r\n` terminators are stripped and
/// invalid UTF-8 is replaced.
pub fn read_lines<R: BufRead>(mut reader: R, mut emit: impl FnMut(String)) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                emit(String::from_utf8_lossy(&buf).into_owned());
            }
            Err(e) => {
                debug!("Output stream closed with error: {}", e);
                break;
            }
        }
    }
}

pub fn spawn_stream_reader<R>(
    id: String,
    stream: R,
    kind: StreamKind,
    sender: Sender<ProcessMessage>,
) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        read_lines(BufReader::new(stream), |line| {
            let _ = sender.send(ProcessMessage::WriteOutput(id.clone(), kind.tag(&line)));
        });
    })
}

/// Wires the child's pipes to the event loop and reports its exit.
pub fn collect(id: &str, mut child: Child, sender: &Sender<ProcessMessage>) {
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_stream_reader(
            id.to_string(),
            stdout,
            StreamKind::Stdout,
            sender.clone(),
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_stream_reader(
            id.to_string(),
            stderr,
            StreamKind::Stderr,
            sender.clone(),
        ));
    }

    let id = id.to_string();
    let sender = sender.clone();
    thread::spawn(move || {
        let waited = child.wait();
        for reader in readers {
            if reader.join().is_err() {
                error!("Output reader for '{}' panicked", id);
            }
        }
        let message = match waited {
            Ok(status) => ProcessMessage::Exited(id, status.code()),
            Err(e) => {
                error!("Failed to wait for process '{}': {}", id, e);
                ProcessMessage::WaitFailed(id, e.to_string())
            }
        };
        let _ = sender.send(message);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::io::Cursor;
    use std::process::{Command, Stdio};
    use std::time::Duration;

    #[test]
    fn splits_lines_and_strips_terminators() {
        let mut lines = Vec::new();
        read_lines(Cursor::new(b"one\r\ntwo\n\nthree".to_vec()), |line| {
            lines.push(line)
        });
        assert_eq!(lines, vec!["one", "two", "", "three"]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut lines = Vec::new();
        read_lines(Cursor::new(vec![b'o', 0xff, b'k', b'\n']), |line| lines.push(line));
        assert_eq!(lines, vec!["o\u{fffd}k"]);
    }

    #[test]
    fn stderr_lines_are_prefixed() {
        let (sender, receiver) = unbounded();
        spawn_stream_reader(
            "job".into(),
            Cursor::new(b"boom\n".to_vec()),
            StreamKind::Stderr,
            sender,
        )
        .join()
        .unwrap();
        match receiver.try_recv().unwrap() {
            ProcessMessage::WriteOutput(id, line) => {
                assert_eq!(id, "job");
                assert_eq!(line, "ERROR: boom");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn exit_is_reported_after_all_output() {
        let (sender, receiver) = unbounded();
        let child = Command::new("sh")
            .arg("-c")
            .arg("echo out; echo err >&2; echo more; exit 3")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        collect("job", child, &sender);

        let mut lines = Vec::new();
        loop {
            match receiver.recv_timeout(Duration::from_secs(10)).unwrap() {
                ProcessMessage::WriteOutput(_, line) => lines.push(line),
                ProcessMessage::Exited(id, code) => {
                    assert_eq!(id, "job");
                    assert_eq!(code, Some(3));
                    break;
                }
                other => panic!("unexpected message {other:?}"),
            }
        }
        lines.sort();
        assert_eq!(lines, vec!["ERROR: err", "more", "out"]);
    }
}
