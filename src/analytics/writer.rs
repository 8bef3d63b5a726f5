//! Background ClickHouse writer thread.
//!
//! Events arrive over a blocking `std::sync::mpsc` channel from the v4/v6
//! worker threads (analytics is best-effort: a full or dropped channel
//! never blocks or fails a client's request). The writer itself still
//! needs an async runtime because the `clickhouse` client is async; it
//! gets a small single-threaded one of its own rather than pulling the
//! whole server onto tokio.

use std::sync::mpsc::Receiver;
use std::time::Duration;

use clickhouse::{Client, Row};
use serde::Serialize;
use tracing::{debug, error, info};

use super::events::{DhcpEvent, DhcpEventV4, DhcpEventV6};

const BATCH_SIZE: usize = 1000;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

pub struct ClickHouseWriter {
    client: Client,
    receiver: Receiver<DhcpEvent>,
    table_v4: String,
    table_v6: String,
}

impl ClickHouseWriter {
    pub fn new(
        client: Client,
        receiver: Receiver<DhcpEvent>,
        table_v4: impl Into<String>,
        table_v6: impl Into<String>,
    ) -> Self {
        Self {
            client,
            receiver,
            table_v4: table_v4.into(),
            table_v6: table_v6.into(),
        }
    }

    /// Spawns the writer on a dedicated OS thread with its own
    /// single-threaded tokio runtime, and returns the thread handle.
    pub fn spawn(self) -> std::thread::JoinHandle<()> {
        std::thread::Builder::new()
            .name("clickhouse-writer".to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build analytics writer runtime");
                rt.block_on(self.run());
            })
            .expect("failed to spawn analytics writer thread")
    }

    async fn run(mut self) {
        let mut batch_v4: Vec<DhcpEventV4> = Vec::with_capacity(BATCH_SIZE);
        let mut batch_v6: Vec<DhcpEventV6> = Vec::with_capacity(BATCH_SIZE);
        let mut last_flush = std::time::Instant::now();

        loop {
            match self.receiver.recv_timeout(FLUSH_INTERVAL) {
                Ok(DhcpEvent::V4(e)) => batch_v4.push(e),
                Ok(DhcpEvent::V6(e)) => batch_v6.push(e),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    self.flush_v4(&mut batch_v4).await;
                    self.flush_v6(&mut batch_v6).await;
                    info!("analytics writer shutting down, channel closed");
                    return;
                }
            }

            if batch_v4.len() >= BATCH_SIZE {
                self.flush_v4(&mut batch_v4).await;
            }
            if batch_v6.len() >= BATCH_SIZE {
                self.flush_v6(&mut batch_v6).await;
            }
            if last_flush.elapsed() >= FLUSH_INTERVAL {
                if !batch_v4.is_empty() {
                    self.flush_v4(&mut batch_v4).await;
                }
                if !batch_v6.is_empty() {
                    self.flush_v6(&mut batch_v6).await;
                }
                last_flush = std::time::Instant::now();
            }
        }
    }

    async fn flush_v4(&self, batch: &mut Vec<DhcpEventV4>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        match self.insert_batch(&self.table_v4, batch.drain(..).collect()).await {
            Ok(()) => debug!(count, "flushed v4 analytics events"),
            Err(e) => error!(%e, "failed to flush v4 analytics events"),
        }
    }

    async fn flush_v6(&self, batch: &mut Vec<DhcpEventV6>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        match self.insert_batch(&self.table_v6, batch.drain(..).collect()).await {
            Ok(()) => debug!(count, "flushed v6 analytics events"),
            Err(e) => error!(%e, "failed to flush v6 analytics events"),
        }
    }

    async fn insert_batch<T: Row + Serialize>(
        &self,
        table: &str,
        rows: Vec<T>,
    ) -> Result<(), clickhouse::error::Error> {
        let mut insert = self.client.insert(table)?;
        for row in &rows {
            insert.write(row).await?;
        }
        insert.end().await
    }
}
