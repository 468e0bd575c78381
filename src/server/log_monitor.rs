use crate::readiness::retry_until;
use futures_lite::io::{AsyncBufReadExt, AsyncRead, BufReader};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

/// What a monitor does with the lines it reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRole {
    /// Keep every line for marker lookups
    Reader,
    /// Trace and discard, only so the child never blocks on a full pipe
    Drain,
}

/// Log stream monitor
///
/// Reads a child process stream line by line on its own task. A
/// [`StreamRole::Reader`] accumulates everything it reads; the buffer is
/// never truncated while the monitor lives. Marker queries look at whatever
/// has been read so far and never block.
pub struct LogMonitor {
    /// Stream name, used in traces
    name: String,
    /// Role
    role: StreamRole,
    /// Everything read so far
    buffer: Arc<RwLock<String>>,
    /// Number of lines read
    lines_read: Arc<AtomicU64>,
    /// Running flag, checked at every line boundary
    running: Arc<AtomicBool>,
    /// Reader task
    task: Option<JoinHandle<()>>,
}

impl LogMonitor {
    /// Start monitoring `reader`
    pub fn spawn<R>(name: impl Into<String>, role: StreamRole, reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let name = name.into();
        let buffer = Arc::new(RwLock::new(String::new()));
        let lines_read = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(read_lines(
            name.clone(),
            role,
            reader,
            Arc::clone(&buffer),
            Arc::clone(&lines_read),
            Arc::clone(&running),
        ));

        Self {
            name,
            role,
            buffer,
            lines_read,
            running,
            task: Some(task),
        }
    }

    /// Stream name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Role
    pub fn role(&self) -> StreamRole {
        self.role
    }

    /// Whether the output read so far contains `marker`
    pub fn contains(&self, marker: &str) -> bool {
        self.buffer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(marker)
    }

    /// Copy of the output read so far
    pub fn snapshot(&self) -> String {
        self.buffer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Current end of the output, for use with [`Self::contains_since`]
    pub fn position(&self) -> usize {
        self.buffer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Whether the output read after `position` contains `marker`
    pub fn contains_since(&self, position: usize, marker: &str) -> bool {
        self.buffer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(position..)
            .is_some_and(|tail| tail.contains(marker))
    }

    /// Number of lines read so far, kept or not
    pub fn lines_read(&self) -> u64 {
        self.lines_read.load(Ordering::SeqCst)
    }

    /// Whether the reader task is still going
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Poll for `marker` every `interval` until it shows up or `timeout`
    /// elapses. Returns whether it was seen.
    pub async fn wait_for(&self, marker: &str, interval: Duration, timeout: Duration) -> bool {
        self.wait_for_since(0, marker, interval, timeout).await
    }

    /// Like [`Self::wait_for`], ignoring output read before `position`.
    ///
    /// Gives up early once the reader has stopped, since the buffer is then
    /// final.
    pub async fn wait_for_since(
        &self,
        position: usize,
        marker: &str,
        interval: Duration,
        timeout: Duration,
    ) -> bool {
        let what = format!("marker '{}' on {}", marker, self.name);
        let settled = retry_until(&what, interval, timeout, || {
            let settled = self.contains_since(position, marker) || !self.is_running();
            async move { Ok(settled) }
        })
        .await
        .is_ok();

        // A finished reader appended its last line before clearing the flag
        settled && self.contains_since(position, marker)
    }

    /// Ask the reader task to exit.
    ///
    /// The task notices at its next line boundary; a read that is blocked
    /// keeps waiting until a line arrives or the stream closes.
    pub fn stop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::debug!(stream = %self.name, "Stopping log monitor");
        }
        self.task.take();
    }
}

async fn read_lines<R>(
    name: String,
    role: StreamRole,
    reader: R,
    buffer: Arc<RwLock<String>>,
    lines_read: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();

    loop {
        raw.clear();
        let read = reader.read_until(b'\n', &mut raw).await;
        if !running.load(Ordering::SeqCst) {
            tracing::debug!(stream = %name, "Log monitor stopped");
            break;
        }

        match read {
            Ok(0) => {
                tracing::debug!(stream = %name, "Stream closed");
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim_end_matches(['\n', '\r']);
                lines_read.fetch_add(1, Ordering::SeqCst);

                match role {
                    StreamRole::Reader => {
                        tracing::debug!(stream = %name, "{}", line);
                        let mut buffer = buffer
                            .write()
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        buffer.push_str(line);
                        buffer.push('\n');
                    }
                    StreamRole::Drain => {
                        tracing::trace!(stream = %name, "{}", line);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(stream = %name, error = %e, "Error reading stream");
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
}
