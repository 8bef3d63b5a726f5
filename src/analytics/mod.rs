//! ClickHouse event shapes and the background writer thread that flushes
//! them. Events are produced by `v4::worker`/`v6::worker` on a best-effort
//! `std::sync::mpsc` channel; a dropped or full channel never blocks or
//! fails a client's request.

pub mod events;
pub mod writer;
