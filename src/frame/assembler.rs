//! Inbound helper that collects chunk frames until their batch is complete.
//!
//! [`ChunkAssembler`] mirrors [`FrameCodec`](crate::frame::FrameCodec) on the
//! receiving side. Chunks may arrive in any order; each batch is buffered
//! under its [`BatchId`] until every index is present, then decoded with
//! [`decode_batch`](crate::frame::decode_batch). A size cap guards against
//! unbounded buffering and batches that stall longer than the configured
//! timeout are evicted.

use std::{
    collections::{BTreeMap, HashMap, hash_map::Entry},
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use tracing::debug;

use super::{AssemblyError, BatchId, ChunkHeader, Frame, FrameError, decode_batch};

#[derive(Debug)]
struct PartialBatch {
    total_chunks: u32,
    chunks: BTreeMap<u32, Frame>,
    buffered: usize,
    started_at: Instant,
}

impl PartialBatch {
    fn new(total_chunks: u32, started_at: Instant) -> Self {
        Self {
            total_chunks,
            chunks: BTreeMap::new(),
            buffered: 0,
            started_at,
        }
    }

    fn is_complete(&self) -> bool { self.chunks.len() as u64 == u64::from(self.total_chunks) }
}

/// Stateful chunk re-assembler with timeout-based eviction.
#[derive(Debug)]
pub struct ChunkAssembler {
    max_message_size: NonZeroUsize,
    timeout: Duration,
    batches: HashMap<BatchId, PartialBatch>,
}

impl ChunkAssembler {
    /// Create an assembler capping reassembled payloads at
    /// `max_message_size` bytes and evicting batches older than `timeout`.
    #[must_use]
    pub fn new(max_message_size: NonZeroUsize, timeout: Duration) -> Self {
        Self {
            max_message_size,
            timeout,
            batches: HashMap::new(),
        }
    }

    /// Feed a chunk frame using the current time.
    ///
    /// Returns `Ok(Some(text))` once the batch is complete and `Ok(None)`
    /// while chunks are still outstanding.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError`] when the frame is malformed, conflicts with
    /// chunks already buffered, or would exceed the size cap. The offending
    /// batch is discarded.
    pub fn push(&mut self, frame: Frame) -> Result<Option<String>, AssemblyError> {
        self.push_at(frame, Instant::now())
    }

    /// Feed a chunk frame using an explicit clock reading.
    ///
    /// # Errors
    ///
    /// See [`ChunkAssembler::push`].
    pub fn push_at(&mut self, frame: Frame, now: Instant) -> Result<Option<String>, AssemblyError> {
        self.purge_expired_at(now);

        let header = frame.chunk_header()?;
        let limit = self.max_message_size;

        let mut entry = match self.batches.entry(header.batch_id()) {
            Entry::Occupied(occupied) => occupied,
            Entry::Vacant(vacant) => {
                vacant.insert_entry(PartialBatch::new(header.total_chunks(), now))
            }
        };

        if let Err(err) = Self::accept(limit, entry.get_mut(), header, frame) {
            entry.remove();
            return Err(err);
        }
        if !entry.get().is_complete() {
            return Ok(None);
        }

        let partial = entry.remove();
        let frames: Vec<Frame> = partial.chunks.into_values().collect();
        Ok(Some(decode_batch(&frames)?))
    }

    fn accept(
        limit: NonZeroUsize,
        partial: &mut PartialBatch,
        header: ChunkHeader,
        frame: Frame,
    ) -> Result<(), AssemblyError> {
        if header.total_chunks() != partial.total_chunks {
            return Err(FrameError::TotalMismatch {
                expected: partial.total_chunks,
                found: header.total_chunks(),
            }
            .into());
        }
        if header.index() >= partial.total_chunks {
            return Err(FrameError::IndexOutOfRange {
                index: header.index(),
                total: partial.total_chunks,
            }
            .into());
        }
        if partial.chunks.contains_key(&header.index()) {
            return Err(FrameError::DuplicateChunk {
                index: header.index(),
            }
            .into());
        }

        let attempted = partial
            .buffered
            .checked_add(frame.payload().len())
            .unwrap_or(usize::MAX);
        if attempted > limit.get() {
            return Err(AssemblyError::MessageTooLarge {
                batch_id: header.batch_id(),
                attempted,
                limit,
            });
        }

        partial.buffered = attempted;
        partial.chunks.insert(header.index(), frame);
        Ok(())
    }

    /// Remove batches that exceeded the configured timeout.
    ///
    /// Returns the identifiers of evicted batches.
    pub fn purge_expired(&mut self) -> Vec<BatchId> { self.purge_expired_at(Instant::now()) }

    /// Remove batches that exceeded the timeout using an explicit clock
    /// reading.
    pub fn purge_expired_at(&mut self, now: Instant) -> Vec<BatchId> {
        let mut evicted = Vec::new();
        let timeout = self.timeout;

        self.batches.retain(|batch_id, partial| {
            let expired = now.saturating_duration_since(partial.started_at) >= timeout;
            if expired {
                debug!(%batch_id, received = partial.chunks.len(), "evicting stale chunk batch");
                evicted.push(*batch_id);
            }
            !expired
        });

        evicted
    }

    /// Number of incomplete batches currently buffered.
    #[must_use]
    pub fn buffered_len(&self) -> usize { self.batches.len() }
}
