//! Demultiplexer
//!
//! Splits one source iterator into several child iterators using a
//! per-item classifier. Items routed to a child that is not currently
//! pulling are queued until that child asks for them.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::Result;

struct DemuxState<I: Iterator, F> {
    source: I,
    classifier: F,
    queues: Vec<VecDeque<<I as Iterator>::Item>>,
    queued: QueueDepth,
    exhausted: bool,
    dropped: u64,
}

/// Total items queued across all children of one [`demux`] call
#[derive(Debug, Clone, Default)]
pub struct QueueDepth(Arc<AtomicUsize>);

impl QueueDepth {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// One output stream of a [`demux`] call
pub struct DemuxChild<I: Iterator, F> {
    index: usize,
    state: Arc<Mutex<DemuxState<I, F>>>,
}

/// Split `source` into `n` children.
///
/// `classifier` returns the child index for an item, or `None` to drop it.
/// Buffering is unbounded. Source errors are delivered to whichever child
/// pulled them.
pub fn demux<T, I, F>(source: I, n: usize, classifier: F) -> Vec<DemuxChild<I, F>>
where
    I: Iterator<Item = Result<T>>,
    F: FnMut(&T) -> Option<usize>,
{
    let state = Arc::new(Mutex::new(DemuxState {
        source,
        classifier,
        queues: (0..n).map(|_| VecDeque::new()).collect(),
        queued: QueueDepth::default(),
        exhausted: false,
        dropped: 0,
    }));

    (0..n)
        .map(|index| DemuxChild {
            index,
            state: state.clone(),
        })
        .collect()
}

impl<T, I, F> DemuxChild<I, F>
where
    I: Iterator<Item = Result<T>>,
    F: FnMut(&T) -> Option<usize>,
{
    /// Items queued for this child but not yet pulled
    pub fn pending(&self) -> usize {
        self.state.lock().queues[self.index].len()
    }

    /// Shared handle on the number of items queued for any child
    pub fn queue_depth(&self) -> QueueDepth {
        self.state.lock().queued.clone()
    }

    /// Items the classifier dropped so far (shared across children)
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }
}

impl<T, I, F> Iterator for DemuxChild<I, F>
where
    I: Iterator<Item = Result<T>>,
    F: FnMut(&T) -> Option<usize>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut state = self.state.lock();
        if let Some(item) = state.queues[self.index].pop_front() {
            state.queued.0.fetch_sub(1, Ordering::Relaxed);
            return Some(item);
        }

        while !state.exhausted {
            let item = match state.source.next() {
                Some(Ok(item)) => item,
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    state.exhausted = true;
                    break;
                }
            };

            match (state.classifier)(&item) {
                Some(target) if target == self.index => return Some(Ok(item)),
                Some(target) if target < state.queues.len() => {
                    state.queues[target].push_back(Ok(item));
                    state.queued.0.fetch_add(1, Ordering::Relaxed);
                }
                _ => state.dropped += 1,
            }
        }

        None
    }
}
