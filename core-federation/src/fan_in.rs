//! Exactly-once join over a fixed number of producers.
//!
//! A [`FanIn`] owns one slot per producer and a countdown of slots still
//! outstanding. Every producer gets a [`SlotHandle`]; completing the handle
//! stores the list and decrements the countdown with a single
//! `fetch_sub`. Only the producer that takes the countdown from one to zero
//! runs the completion, so it fires once no matter how deliveries interleave.
//!
//! A handle dropped without completing (a panicking or cancelled producer)
//! delivers an empty list, so a failed producer can never stall the join.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

type Completion<T> = Box<dyn FnOnce(Vec<Vec<T>>) + Send>;

pub struct FanIn<T> {
    slots: Vec<Mutex<Option<Vec<T>>>>,
    remaining: AtomicUsize,
    on_complete: Mutex<Option<Completion<T>>>,
}

impl<T: Send + 'static> FanIn<T> {
    /// Creates the join and one handle per slot, in slot order.
    ///
    /// With zero slots the completion runs immediately with no lists.
    pub fn new<F>(slots: usize, on_complete: F) -> Vec<SlotHandle<T>>
    where
        F: FnOnce(Vec<Vec<T>>) + Send + 'static,
    {
        if slots == 0 {
            on_complete(Vec::new());
            return Vec::new();
        }

        let join = Arc::new(Self {
            slots: (0..slots).map(|_| Mutex::new(None)).collect(),
            remaining: AtomicUsize::new(slots),
            on_complete: Mutex::new(Some(Box::new(on_complete))),
        });

        (0..slots)
            .map(|index| SlotHandle {
                join: Some(Arc::clone(&join)),
                index,
            })
            .collect()
    }

    fn deliver(&self, index: usize, items: Vec<T>) {
        *self.slots[index].lock() = Some(items);

        // AcqRel: the zero-taker must observe every slot written before it.
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            trace!(slot = index, "Fan-in slot filled");
            return;
        }

        let lists = self
            .slots
            .iter()
            .map(|slot| slot.lock().take().unwrap_or_default())
            .collect();
        if let Some(complete) = self.on_complete.lock().take() {
            complete(lists);
        }
    }

    fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}

/// The right to fill exactly one slot of a [`FanIn`].
pub struct SlotHandle<T: Send + 'static> {
    join: Option<Arc<FanIn<T>>>,
    index: usize,
}

impl<T: Send + 'static> SlotHandle<T> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Slots of the shared join that are still outstanding.
    pub fn outstanding(&self) -> usize {
        self.join.as_ref().map_or(0, |join| join.remaining())
    }

    pub fn complete(mut self, items: Vec<T>) {
        if let Some(join) = self.join.take() {
            join.deliver(self.index, items);
        }
    }
}

impl<T: Send + 'static> Drop for SlotHandle<T> {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            trace!(slot = self.index, "Fan-in slot abandoned; delivering empty list");
            join.deliver(self.index, Vec::new());
        }
    }
}

impl<T: Send + 'static> fmt::Debug for SlotHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotHandle")
            .field("index", &self.index)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_completion_sees_slot_order_not_delivery_order() {
        let result = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&result);
        let mut handles = FanIn::new(3, move |lists: Vec<Vec<u32>>| {
            *sink.lock() = Some(lists);
        });

        let third = handles.pop().unwrap();
        let second = handles.pop().unwrap();
        let first = handles.pop().unwrap();
        third.complete(vec![3]);
        first.complete(vec![1]);
        assert!(result.lock().is_none());
        second.complete(vec![2]);

        assert_eq!(result.lock().take(), Some(vec![vec![1], vec![2], vec![3]]));
    }

    #[test]
    fn test_dropped_handle_counts_as_empty() {
        let result = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&result);
        let mut handles = FanIn::new(2, move |lists: Vec<Vec<u32>>| {
            *sink.lock() = Some(lists);
        });

        drop(handles.pop());
        handles.pop().unwrap().complete(vec![7]);

        assert_eq!(result.lock().take(), Some(vec![vec![7], vec![]]));
    }

    #[test]
    fn test_zero_slots_completes_immediately() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let handles = FanIn::<u32>::new(0, move |lists| {
            assert!(lists.is_empty());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(handles.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_deliveries_fire_once() {
        for _ in 0..200 {
            let fired = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&fired);
            let handles = FanIn::new(8, move |lists: Vec<Vec<usize>>| {
                assert_eq!(lists.len(), 8);
                counter.fetch_add(1, Ordering::SeqCst);
            });

            let threads: Vec<_> = handles
                .into_iter()
                .map(|handle| {
                    thread::spawn(move || {
                        let index = handle.index();
                        handle.complete(vec![index]);
                    })
                })
                .collect();
            for thread in threads {
                thread.join().unwrap();
            }

            assert_eq!(fired.load(Ordering::SeqCst), 1);
        }
    }
}
