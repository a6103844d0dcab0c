//! Line-oriented channel over the process's stdin and stdout.
//!
//! Each input line becomes a text event from the `stdin` identity; replies
//! are written to stdout, one line per event.
//!
//! Input is read on a detached OS thread that forwards lines into an mpsc
//! queue. A blocking read on that thread is never awaited by the runtime,
//! so the process can shut down while stdin is still open. The queue is
//! created once in `start()` and shared across reconnects so no buffered
//! input is dropped when the dispatch loop reopens the stream.

use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock, mpsc};

use crate::channels::{Channel, ChannelConn, Event, Identity};
use crate::config::BotConfig;
use crate::error::ChannelError;

const NAME: &str = "stdio";

/// Lines buffered between the reader thread and the dispatch loop.
const LINE_BUFFER: usize = 64;

type Input = Box<dyn Read + Send>;
type Output = Box<dyn AsyncWrite + Send + Unpin>;
type LineQueue = mpsc::Receiver<std::io::Result<String>>;

/// Channel reading commands from stdin and replying on stdout.
pub struct StdioChannel {
    bot: RwLock<Identity>,
    input: std::sync::Mutex<Option<Input>>,
    lines: Arc<Mutex<Option<LineQueue>>>,
    output: Arc<Mutex<Output>>,
    eof: Arc<AtomicBool>,
}

impl StdioChannel {
    pub fn new() -> Self {
        Self::with_io(std::io::stdin(), tokio::io::stdout())
    }

    /// Build over arbitrary input and output streams.
    pub fn with_io(
        input: impl Read + Send + 'static,
        output: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            bot: RwLock::new(Identity::new("bridge")),
            input: std::sync::Mutex::new(Some(Box::new(input))),
            lines: Arc::new(Mutex::new(None)),
            output: Arc::new(Mutex::new(Box::new(output))),
            eof: Arc::new(AtomicBool::new(false)),
        }
    }

    fn take_input(&self) -> Result<Input, ChannelError> {
        let mut input = self.input.lock().map_err(|_| ChannelError::StartupFailed {
            name: NAME.to_string(),
            reason: "input lock poisoned".to_string(),
        })?;
        input.take().ok_or_else(|| ChannelError::StartupFailed {
            name: NAME.to_string(),
            reason: "input already consumed".to_string(),
        })
    }
}

impl Default for StdioChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward lines until the input ends, fails, or the queue is dropped.
fn read_lines(input: Input, tx: mpsc::Sender<std::io::Result<String>>) {
    for line in BufReader::new(input).lines() {
        let failed = line.is_err();
        if tx.blocking_send(line).is_err() || failed {
            return;
        }
    }
}

#[async_trait]
impl Channel for StdioChannel {
    fn name(&self) -> &str {
        NAME
    }

    async fn init(&self, config: &BotConfig) -> Result<(), ChannelError> {
        *self.bot.write().await = Identity::new(config.namespace.clone());
        Ok(())
    }

    async fn start(&self) -> Result<(), ChannelError> {
        let mut lines = self.lines.lock().await;
        if lines.is_some() {
            return Ok(());
        }

        let input = self.take_input()?;
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        std::thread::Builder::new()
            .name("stdio-reader".to_string())
            .spawn(move || read_lines(input, tx))
            .map_err(|e| ChannelError::StartupFailed {
                name: NAME.to_string(),
                reason: e.to_string(),
            })?;
        *lines = Some(rx);
        Ok(())
    }

    async fn stream(&self) -> Result<Box<dyn ChannelConn>, ChannelError> {
        if self.lines.lock().await.is_none() {
            return Err(ChannelError::StreamFailed {
                name: NAME.to_string(),
                reason: "channel not started".to_string(),
            });
        }
        Ok(Box::new(StdioConn {
            bot: self.bot.read().await.clone(),
            lines: Arc::clone(&self.lines),
            output: Arc::clone(&self.output),
            eof: Arc::clone(&self.eof),
            closed: AtomicBool::new(false),
        }))
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        // Dropping the queue lets the reader thread exit after its next line.
        self.lines.lock().await.take();
        self.output
            .lock()
            .await
            .flush()
            .await
            .map_err(|e| ChannelError::StopFailed {
                name: NAME.to_string(),
                reason: e.to_string(),
            })
    }
}

struct StdioConn {
    bot: Identity,
    lines: Arc<Mutex<Option<LineQueue>>>,
    output: Arc<Mutex<Output>>,
    eof: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl StdioConn {
    fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Closed {
                name: NAME.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelConn for StdioConn {
    async fn recv(&self) -> Result<Event, ChannelError> {
        self.ensure_open()?;
        // Once input is exhausted there is nothing to reconnect to; park until
        // the dispatch loop is cancelled by shutdown.
        if self.eof.load(Ordering::Acquire) {
            return futures::future::pending().await;
        }

        let mut guard = self.lines.lock().await;
        let lines = guard.as_mut().ok_or_else(|| ChannelError::Closed {
            name: NAME.to_string(),
        })?;

        // `mpsc::Receiver::recv` is cancel-safe.
        match lines.recv().await {
            Some(Ok(line)) => Ok(Event::text(
                Identity::new("stdin"),
                self.bot.clone(),
                line.into_bytes(),
            )
            .with_meta("channel", NAME)),
            Some(Err(e)) => Err(ChannelError::RecvFailed {
                name: NAME.to_string(),
                reason: e.to_string(),
            }),
            None => {
                drop(guard);
                self.eof.store(true, Ordering::Release);
                tracing::info!(channel = NAME, "stdin closed; waiting for shutdown");
                futures::future::pending().await
            }
        }
    }

    async fn send(&self, event: Event) -> Result<(), ChannelError> {
        self.ensure_open()?;
        let mut line = event.payload.to_vec();
        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }
        let mut output = self.output.lock().await;
        output
            .write_all(&line)
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: NAME.to_string(),
                reason: e.to_string(),
            })?;
        output.flush().await.map_err(|e| ChannelError::SendFailed {
            name: NAME.to_string(),
            reason: e.to_string(),
        })
    }

    async fn close(&self) -> Result<(), ChannelError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
