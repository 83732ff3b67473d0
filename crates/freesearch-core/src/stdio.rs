//! Newline-delimited JSON-RPC over stdin/stdout
//!
//! Each input line is dispatched on its own task, so a slow search never
//! blocks a `ping`. Responses funnel through a single writer task and may
//! come back out of order; clients match them by id.

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::rpc::Dispatcher;

/// Serve the process's own stdin/stdout until stdin closes
pub async fn run_stdio(dispatcher: Arc<Dispatcher>) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve_lines(dispatcher, stdin, tokio::io::stdout()).await?;
    Ok(())
}

/// Serve line-delimited requests from `reader`, writing responses to `writer`.
/// Returns the writer once every in-flight request has been answered.
pub async fn serve_lines<R, W>(dispatcher: Arc<Dispatcher>, reader: R, writer: W) -> Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(100);

    let writer_handle = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(line) = rx.recv().await {
            if let Err(e) = write_line(&mut writer, &line).await {
                error!("Failed to write response: {}", e);
                break;
            }
        }
        writer
    });

    let mut in_flight = RequestTasks::default();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        debug!("Received: {}", line);
        in_flight.reap();

        let dispatcher = dispatcher.clone();
        let tx = tx.clone();
        in_flight.spawn(async move {
            let Some(response) = dispatcher.handle_text(&line).await else {
                return;
            };
            match serde_json::to_string(&response) {
                Ok(json) => {
                    if tx.send(json).await.is_err() {
                        warn!("Writer closed before response {} was sent", response.id);
                    }
                }
                Err(e) => error!("Failed to serialize response: {}", e),
            }
        });
    }

    info!("stdin closed, draining {} pending requests", in_flight.len());
    in_flight.drain().await;
    drop(tx);

    Ok(writer_handle.await?)
}

/// Per-request tasks. Finished ones are reaped as new lines arrive so a
/// long-lived session does not accumulate completed entries.
#[derive(Default)]
struct RequestTasks {
    set: JoinSet<()>,
}

impl RequestTasks {
    fn spawn<F>(&mut self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.set.spawn(task);
    }

    fn len(&self) -> usize {
        self.set.len()
    }

    fn reap(&mut self) {
        while let Some(joined) = self.set.try_join_next() {
            log_join(joined);
        }
    }

    async fn drain(&mut self) {
        while let Some(joined) = self.set.join_next().await {
            log_join(joined);
        }
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!("Request task failed: {}", e);
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
