use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::warn;
use tokio::time::Instant;

use crate::core::BLOCK_SIZE;

/// Fixed number of block sized buffers shared by every transfer of a session.
///
/// Cloning the pool is cheap, all clones share the same buffers.
#[derive(Clone)]
pub struct BufferPool {
    state: Arc<Mutex<PoolState>>,
}

struct PoolState {
    capacity: usize,
    in_use: usize,
    free: Vec<(Vec<u8>, Instant)>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        let state = PoolState {
            capacity,
            in_use: 0,
            free: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Hands out an empty buffer, or `None` when every buffer is in use
    pub fn allocate(&self) -> Option<Buffer> {
        let mut state = lock(&self.state);
        if state.in_use >= state.capacity {
            return None;
        }
        state.in_use += 1;
        let data = state
            .free
            .pop()
            .map(|(data, _)| data)
            .unwrap_or_else(|| Vec::with_capacity(BLOCK_SIZE as usize));
        Some(Buffer {
            data,
            pool: Some(Arc::clone(&self.state)),
        })
    }

    pub fn deallocate(&self, mut buffer: Buffer, now: Instant) {
        buffer.release(now);
    }

    pub fn capacity(&self) -> usize {
        lock(&self.state).capacity
    }

    pub fn in_use(&self) -> usize {
        lock(&self.state).in_use
    }

    /// Frees buffers that were not handed out for at least `idle`. Returns how many were freed.
    pub fn trim(&self, now: Instant, idle: Duration) -> usize {
        let mut state = lock(&self.state);
        let before = state.free.len();
        state
            .free
            .retain(|(_, released)| now.saturating_duration_since(*released) < idle);
        before - state.free.len()
    }
}

/// A buffer taken from a `BufferPool`. Goes back to the pool when dropped.
pub struct Buffer {
    data: Vec<u8>,
    pool: Option<Arc<Mutex<PoolState>>>,
}

impl Buffer {
    fn release(&mut self, now: Instant) {
        if let Some(pool) = self.pool.take() {
            let mut data = std::mem::take(&mut self.data);
            data.clear();
            let mut state = lock(&pool);
            state.in_use -= 1;
            state.free.push((data, now));
        }
    }
}

impl Deref for Buffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Buffer({} bytes)", self.data.len())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.release(Instant::now());
    }
}

fn lock(state: &Mutex<PoolState>) -> MutexGuard<'_, PoolState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("buffer pool lock poisoned; continuing with recovered state");
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_until_exhausted() {
        let pool = BufferPool::new(2);

        let first = pool.allocate();
        let second = pool.allocate();

        assert!(first.is_some());
        assert!(second.is_some());
        assert!(pool.allocate().is_none());
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn deallocated_buffer_is_reused_empty() {
        let pool = BufferPool::new(1);
        let mut buffer = pool.allocate().unwrap();
        buffer.extend_from_slice(b"foo");

        pool.deallocate(buffer, Instant::now());

        assert_eq!(pool.in_use(), 0);
        let buffer = pool.allocate().unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn dropped_buffer_returns_to_pool() {
        let pool = BufferPool::new(1);
        {
            let _buffer = pool.allocate().unwrap();
            assert!(pool.allocate().is_none());
        }
        assert_eq!(pool.in_use(), 0);
        assert!(pool.allocate().is_some());
    }

    #[test]
    fn trim_idle_buffers() {
        let pool = BufferPool::new(3);
        let now = Instant::now();
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        pool.deallocate(a, now);
        pool.deallocate(b, now + Duration::from_secs(30));

        let freed = pool.trim(now + Duration::from_secs(60), Duration::from_secs(60));

        assert_eq!(freed, 1);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.capacity(), 3);
    }
}
