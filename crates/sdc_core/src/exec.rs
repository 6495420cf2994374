//! Execution contexts for lock-step batched work.
//!
//! The integrator never loops over lanes itself. Every phase is expressed as a
//! body applied to each element (or each lane-sized chunk) of a flat buffer, and
//! the context decides how that work is spread over workers:
//! - [`Sequential`]: a plain loop the compiler can vectorize.
//! - [`Threaded`]: rayon's work-stealing pool.
//!
//! Bodies only ever write the element or chunk they are handed, so no locking
//! is needed. `barrier` marks the points where every worker's writes must be
//! visible before a reduction starts or its result is read.

use rayon::prelude::*;

/// Pluggable data-parallel backend.
pub trait ExecutionContext: Sync {
    /// Runs `body(index, &mut data[index])` for every element.
    fn for_each<T, F>(&self, data: &mut [T], body: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send;

    /// Runs `body(chunk_index, chunk)` over consecutive chunks of `chunk_len` elements.
    fn for_each_chunk<T, F>(&self, data: &mut [T], chunk_len: usize, body: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync + Send;

    /// Fallible variant of [`ExecutionContext::for_each_chunk`]; the first error wins.
    fn try_for_each_chunk<T, E, F>(&self, data: &mut [T], chunk_len: usize, body: F) -> Result<(), E>
    where
        T: Send,
        E: Send,
        F: Fn(usize, &mut [T]) -> Result<(), E> + Sync + Send;

    /// Synchronization point between dependent phases.
    fn barrier(&self) {}
}

/// Single-worker context.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl ExecutionContext for Sequential {
    fn for_each<T, F>(&self, data: &mut [T], body: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        for (i, item) in data.iter_mut().enumerate() {
            body(i, item);
        }
    }

    fn for_each_chunk<T, F>(&self, data: &mut [T], chunk_len: usize, body: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync + Send,
    {
        if chunk_len == 0 {
            return;
        }
        for (i, chunk) in data.chunks_mut(chunk_len).enumerate() {
            body(i, chunk);
        }
    }

    fn try_for_each_chunk<T, E, F>(&self, data: &mut [T], chunk_len: usize, body: F) -> Result<(), E>
    where
        T: Send,
        E: Send,
        F: Fn(usize, &mut [T]) -> Result<(), E> + Sync + Send,
    {
        if chunk_len == 0 {
            return Ok(());
        }
        data.chunks_mut(chunk_len)
            .enumerate()
            .try_for_each(|(i, chunk)| body(i, chunk))
    }
}

/// Multi-threaded context backed by the global rayon pool.
///
/// Buffers shorter than `min_len` are processed sequentially, where spawning
/// tasks costs more than it saves.
#[derive(Debug, Clone, Copy)]
pub struct Threaded {
    pub min_len: usize,
}

impl Default for Threaded {
    fn default() -> Self {
        Self { min_len: 64 }
    }
}

impl Threaded {
    pub fn with_min_len(min_len: usize) -> Self {
        Self { min_len }
    }

    fn is_parallel(&self, len: usize) -> bool {
        len >= self.min_len && rayon::current_num_threads() > 1
    }
}

impl ExecutionContext for Threaded {
    fn for_each<T, F>(&self, data: &mut [T], body: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        if !self.is_parallel(data.len()) {
            return Sequential.for_each(data, body);
        }
        data.par_iter_mut()
            .enumerate()
            .for_each(|(i, item)| body(i, item));
    }

    fn for_each_chunk<T, F>(&self, data: &mut [T], chunk_len: usize, body: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync + Send,
    {
        if chunk_len == 0 {
            return;
        }
        if !self.is_parallel(data.len() / chunk_len) {
            return Sequential.for_each_chunk(data, chunk_len, body);
        }
        data.par_chunks_mut(chunk_len)
            .enumerate()
            .for_each(|(i, chunk)| body(i, chunk));
    }

    fn try_for_each_chunk<T, E, F>(&self, data: &mut [T], chunk_len: usize, body: F) -> Result<(), E>
    where
        T: Send,
        E: Send,
        F: Fn(usize, &mut [T]) -> Result<(), E> + Sync + Send,
    {
        if chunk_len == 0 {
            return Ok(());
        }
        if !self.is_parallel(data.len() / chunk_len) {
            return Sequential.try_for_each_chunk(data, chunk_len, body);
        }
        data.par_chunks_mut(chunk_len)
            .enumerate()
            .try_for_each(|(i, chunk)| body(i, chunk))
    }

    // Every call above returns only after rayon has joined all of its tasks.
}
