//! Critical-Section Ring Buffer Implementation

use core::cell::RefCell;
use critical_section::Mutex;
use thiserror::Error;

/// Errors raised when constructing a ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    /// One slot is always kept free, so a ring needs at least two
    #[error("Ring capacity {0} is too small (minimum 2)")]
    CapacityTooSmall(usize),
}

/// Indices and storage, only ever touched inside a critical section
struct RingState<T> {
    /// Pre-allocated storage
    storage: Box<[T]>,
    /// Write position
    w_ptr: usize,
    /// Read position
    r_ptr: usize,
    /// Pushes rejected because the ring was full
    rejected: u64,
}

impl<T> RingState<T> {
    fn advance(&self, ptr: usize) -> usize {
        if ptr + 1 == self.storage.len() {
            0
        } else {
            ptr + 1
        }
    }

    fn len(&self) -> usize {
        if self.w_ptr >= self.r_ptr {
            self.w_ptr - self.r_ptr
        } else {
            self.storage.len() - self.r_ptr + self.w_ptr
        }
    }
}

/// Bounded FIFO shared between one interrupt-context side and one
/// foreground side.
///
/// The ring is empty when `w_ptr == r_ptr` and full when advancing `w_ptr`
/// would land on `r_ptr`, so a ring of `capacity` slots holds at most
/// `capacity - 1` items. A full ring rejects new items instead of
/// overwriting old ones: FIFO order of accepted items is always preserved.
pub struct CanRing<T> {
    state: Mutex<RefCell<RingState<T>>>,
    capacity: usize,
}

impl<T: Copy + Default> CanRing<T> {
    /// Create a ring with `capacity` slots (`capacity - 1` usable)
    pub fn new(capacity: usize) -> Result<Self, RingError> {
        if capacity < 2 {
            return Err(RingError::CapacityTooSmall(capacity));
        }
        let storage: Vec<T> = vec![T::default(); capacity];
        Ok(Self {
            state: Mutex::new(RefCell::new(RingState {
                storage: storage.into_boxed_slice(),
                w_ptr: 0,
                r_ptr: 0,
                rejected: 0,
            })),
            capacity,
        })
    }

    /// Append an item.
    ///
    /// Returns `false` without touching the ring when it is full. The caller
    /// owns overflow accounting; this never blocks.
    pub fn push(&self, item: T) -> bool {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let next_w_ptr = state.advance(state.w_ptr);
            if next_w_ptr == state.r_ptr {
                state.rejected += 1;
                return false;
            }
            let w_ptr = state.w_ptr;
            state.storage[w_ptr] = item;
            state.w_ptr = next_w_ptr;
            true
        })
    }

    /// Remove and return the oldest item, if any
    pub fn pop(&self) -> Option<T> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if state.w_ptr == state.r_ptr {
                return None;
            }
            let item = state.storage[state.r_ptr];
            state.r_ptr = state.advance(state.r_ptr);
            Some(item)
        })
    }

    /// Discard all contents by resetting both indices to zero
    pub fn clear(&self) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.w_ptr = 0;
            state.r_ptr = 0;
        });
    }

    /// Number of items currently queued
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.state.borrow_ref(cs).len())
    }

    /// Check if the ring is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the next push would be rejected
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity - 1
    }

    /// Number of slots, including the one that is always kept free
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items that can still be pushed
    pub fn free_slots(&self) -> usize {
        self.capacity - 1 - self.len()
    }

    /// Total pushes rejected since construction (not reset by `clear`)
    pub fn rejected(&self) -> u64 {
        critical_section::with(|cs| self.state.borrow_ref(cs).rejected)
    }
}

impl<T> core::fmt::Debug for CanRing<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (w_ptr, r_ptr) = critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            (state.w_ptr, state.r_ptr)
        });
        f.debug_struct("CanRing")
            .field("capacity", &self.capacity)
            .field("w_ptr", &w_ptr)
            .field("r_ptr", &r_ptr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_pop_fifo() {
        let ring = CanRing::new(10).unwrap();

        for i in 0..5u32 {
            assert!(ring.push(i));
        }
        assert_eq!(ring.len(), 5);

        for i in 0..5u32 {
            assert_eq!(ring.pop(), Some(i));
        }
        assert_eq!(ring.pop(), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_full_ring_rejects() {
        let ring = CanRing::new(5).unwrap();

        for i in 0..4u32 {
            assert!(ring.push(i));
        }
        assert!(ring.is_full());
        assert!(!ring.push(99));
        assert_eq!(ring.rejected(), 1);

        // Oldest item is untouched by the rejected push
        assert_eq!(ring.pop(), Some(0));
        assert!(ring.push(4));
        assert_eq!(ring.free_slots(), 0);
    }

    #[test]
    fn test_wraparound() {
        let ring = CanRing::new(4).unwrap();

        for round in 0..10u32 {
            assert!(ring.push(round));
            assert!(ring.push(round + 100));
            assert_eq!(ring.pop(), Some(round));
            assert_eq!(ring.pop(), Some(round + 100));
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let ring = CanRing::new(8).unwrap();
        for i in 0..6u32 {
            ring.push(i);
        }

        ring.clear();
        assert!(ring.is_empty());
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.pop(), None);
        assert_eq!(ring.free_slots(), 7);
    }

    #[test]
    fn test_capacity_too_small() {
        assert_eq!(
            CanRing::<u32>::new(1).unwrap_err(),
            RingError::CapacityTooSmall(1)
        );
        assert!(CanRing::<u32>::new(2).is_ok());
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        use std::sync::Arc;

        let ring = Arc::new(CanRing::new(64).unwrap());
        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                let mut next = 0u32;
                while next < 10_000 {
                    if ring.push(next) {
                        next += 1;
                    }
                }
            })
        };

        let mut expected = 0u32;
        while expected < 10_000 {
            if let Some(item) = ring.pop() {
                assert_eq!(item, expected);
                expected += 1;
            }
        }
        producer.join().unwrap();
        assert!(ring.is_empty());
    }
}
