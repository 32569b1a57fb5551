//! Helpers over live drops.

use super::object::{DropRef, DEFAULT_CHUNK_SIZE};
use crate::error::{DropflowError, Result};
use crate::types::{DropStatus, Oid};
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::sync::watch;

/// Read a completed drop's whole content.
pub fn all_drop_contents(drop: &DropRef) -> Result<Bytes> {
    let mut out = BytesMut::with_capacity(usize::try_from(drop.size()).unwrap_or(0));
    for chunk in drop.open()? {
        out.extend_from_slice(&chunk?);
    }
    Ok(out.freeze())
}

/// Copy a completed drop's content into another drop, `bufsize` bytes at a
/// time. Returns the number of bytes copied.
pub fn copy_drop_contents(src: &DropRef, dst: &DropRef, bufsize: usize) -> Result<u64> {
    let reader = src.open()?.with_chunk_size(if bufsize == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        bufsize
    });
    let mut copied = 0u64;
    for chunk in reader {
        let chunk = chunk?;
        dst.write(&chunk)?;
        copied += chunk.len() as u64;
    }
    Ok(copied)
}

/// Drops this drop waits on: producers, inputs (streaming included) and
/// container children.
pub fn upstream_drops(drop: &DropRef) -> Vec<DropRef> {
    let mut up = drop.producers();
    up.extend(drop.inputs());
    up.extend(drop.streaming_inputs());
    up.extend(drop.children());
    up
}

/// Drops that wait on this drop: consumers (streaming included), outputs
/// and the parent container.
pub fn downstream_drops(drop: &DropRef) -> Vec<DropRef> {
    let mut down = drop.consumers();
    down.extend(drop.streaming_consumers());
    down.extend(drop.outputs());
    down.extend(drop.parent());
    down
}

/// Waits until a set of drops reach a terminal status.
pub struct DropWaiter {
    watches: Vec<(Oid, watch::Receiver<DropStatus>)>,
    timeout: Option<Duration>,
}

impl DropWaiter {
    /// Wait on `drops`.
    pub fn new<'a>(drops: impl IntoIterator<Item = &'a DropRef>) -> Self {
        Self {
            watches: drops
                .into_iter()
                .map(|d| (d.oid().clone(), d.subscribe()))
                .collect(),
            timeout: None,
        }
    }

    /// Give up after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait, returning each drop's final status in the order given.
    pub async fn wait(self) -> Result<Vec<(Oid, DropStatus)>> {
        let Self { watches, timeout } = self;
        let count = watches.len();
        let fut = async move {
            let mut out = Vec::with_capacity(count);
            for (oid, mut rx) in watches {
                let reached = match rx.wait_for(|s| s.is_terminal()).await {
                    Ok(s) => Some(*s),
                    Err(_) => None,
                };
                // A closed channel means the drop is gone; report what it last was.
                let status = reached.unwrap_or_else(|| *rx.borrow());
                out.push((oid, status));
            }
            out
        };
        match timeout {
            None => Ok(fut.await),
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                DropflowError::Timeout {
                    what: format!("{count} drop(s) to finish"),
                    waited_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }
            }),
        }
    }
}
