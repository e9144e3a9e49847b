//! External process execution with live output scanning.

use crate::loudnorm::LoudnormStats;
use crate::progress::{Marker, MarkerGrammar, ProgressTracker};
use crate::{Error, Result};
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

/// Outcome of one external process invocation.
///
/// A non-zero exit code is reported here rather than raised; the caller
/// decides whether it is fatal for the job.
#[derive(Debug)]
pub struct ExecutionResult {
    pub exit_code: i32,
    /// Loudness-analysis blocks collected from the side channel, ordered
    /// by the stream index in their filter labels.
    pub analysis: Vec<LoudnormStats>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a command, feeding every output line through the grammar.
///
/// stdout and stderr are captured and scanned as one merged line stream;
/// the call blocks until the process exits, after which the tracker is
/// flushed to its total.
pub fn run(
    mut command: Command,
    grammar: &mut dyn MarkerGrammar,
    tracker: &mut ProgressTracker,
) -> Result<ExecutionResult> {
    let tool = command.get_program().to_string_lossy().to_string();

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(&tool)
            } else {
                Error::Io(e)
            }
        })?;

    let (tx, rx) = mpsc::channel::<String>();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut pumps = Vec::new();
    if let Some(stream) = stdout {
        pumps.push(spawn_pump(stream, tx.clone()));
    }
    if let Some(stream) = stderr {
        pumps.push(spawn_pump(stream, tx.clone()));
    }
    drop(tx);

    let mut analysis: Vec<(usize, LoudnormStats)> = Vec::new();
    for line in rx {
        match grammar.scan(&line) {
            Some(Marker::Fraction(fraction)) => tracker.apply_fraction(fraction),
            Some(Marker::Analysis { stream, stats }) => analysis.push((stream, stats)),
            None => {}
        }
    }

    for pump in pumps {
        let _ = pump.join();
    }

    let status = child.wait()?;
    tracker.finish();

    let exit_code = status.code().unwrap_or(-1);
    if exit_code != 0 {
        tracing::debug!(tool = %tool, exit_code, "process exited non-zero");
    }

    // Blocks may interleave on the merged stream; their filter labels fix
    // the stream order.
    analysis.sort_by_key(|(stream, _)| *stream);

    Ok(ExecutionResult {
        exit_code,
        analysis: analysis.into_iter().map(|(_, stats)| stats).collect(),
    })
}

/// Pump one output stream into the line channel.
///
/// The transcode tool rewrites its progress line with a bare carriage
/// return, so both `\r` and `\n` terminate a line.
fn spawn_pump(
    mut stream: impl Read + Send + 'static,
    tx: mpsc::Sender<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut pending = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let read = match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => break,
            };
            pending.extend_from_slice(&buf[..read]);

            while let Some(pos) = pending.iter().position(|b| *b == b'\n' || *b == b'\r') {
                let segment: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&segment[..segment.len() - 1]);
                if tx.send(line.into_owned()).is_err() {
                    return;
                }
            }
        }
        if !pending.is_empty() {
            let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
        }
    })
}
