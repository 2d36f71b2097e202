//! Key-based inner join
//!
//! The left iterator drives. For each left item the zipper looks for a
//! right item with the same key, pulling from the right side and buffering
//! every non-matching item under its own key until a later left item asks
//! for it. Left items whose key never shows up are dropped.
//!
//! Duplicate keys: buffered right items are kept per key in arrival order
//! and each left item claims the oldest one. A second right item with the
//! same key therefore only matches a second left item with that key;
//! otherwise it is dropped with the rest of the unmatched buffer.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use tracing::debug;

use crate::error::Result;

/// Inner join of two fallible iterators on a derived key
pub struct KeyZipper<L, R, K, KL, KR>
where
    L: Iterator,
    R: Iterator,
{
    left: L,
    right: R,
    left_key: KL,
    right_key: KR,
    /// Right-side items waiting for their left partner
    buffer: HashMap<K, VecDeque<<R as Iterator>::Item>>,
    buffered: usize,
    /// Left item whose search was interrupted by a right-side error
    pending: Option<(K, <L as Iterator>::Item)>,
    right_exhausted: bool,
    unmatched_left: u64,
    finished: bool,
}

impl<A, B, K, L, R, KL, KR> KeyZipper<L, R, K, KL, KR>
where
    L: Iterator<Item = Result<A>>,
    R: Iterator<Item = Result<B>>,
    K: Eq + Hash,
    KL: FnMut(&A) -> K,
    KR: FnMut(&B) -> K,
{
    /// Join `left` and `right`, matching `left_key(a) == right_key(b)`
    pub fn new(left: L, right: R, left_key: KL, right_key: KR) -> Self {
        Self {
            left,
            right,
            left_key,
            right_key,
            buffer: HashMap::new(),
            buffered: 0,
            pending: None,
            right_exhausted: false,
            unmatched_left: 0,
            finished: false,
        }
    }

    /// Number of right-side items currently held
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Number of left-side items dropped for lack of a partner
    pub fn unmatched_left(&self) -> u64 {
        self.unmatched_left
    }

    /// The driving iterator (e.g. an inner join in a chain)
    pub fn left(&self) -> &L {
        &self.left
    }

    fn take_buffered(&mut self, key: &K) -> Option<B> {
        let queue = self.buffer.get_mut(key)?;
        let item = queue.pop_front();
        if queue.is_empty() {
            self.buffer.remove(key);
        }
        match item {
            Some(Ok(b)) => {
                self.buffered -= 1;
                Some(b)
            }
            // Only Ok items are buffered
            _ => None,
        }
    }

    /// Search the right side for `key`. `Ok(None)` means the right side ran dry.
    fn find_right(&mut self, key: &K) -> Result<Option<B>> {
        if let Some(b) = self.take_buffered(key) {
            return Ok(Some(b));
        }

        while !self.right_exhausted {
            match self.right.next() {
                Some(Ok(b)) => {
                    let right_key = (self.right_key)(&b);
                    if right_key == *key {
                        return Ok(Some(b));
                    }
                    self.buffer.entry(right_key).or_default().push_back(Ok(b));
                    self.buffered += 1;
                }
                Some(Err(e)) => return Err(e),
                None => self.right_exhausted = true,
            }
        }

        Ok(None)
    }
}

impl<A, B, K, L, R, KL, KR> Iterator for KeyZipper<L, R, K, KL, KR>
where
    L: Iterator<Item = Result<A>>,
    R: Iterator<Item = Result<B>>,
    K: Eq + Hash,
    KL: FnMut(&A) -> K,
    KR: FnMut(&B) -> K,
{
    type Item = Result<(A, B)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let (key, a) = match self.pending.take() {
                Some((key, Ok(a))) => (key, a),
                Some((_, Err(e))) => return Some(Err(e)),
                None => match self.left.next() {
                    Some(Ok(a)) => ((self.left_key)(&a), a),
                    Some(Err(e)) => return Some(Err(e)),
                    None => {
                        self.finished = true;
                        if self.buffered > 0 || self.unmatched_left > 0 {
                            debug!(
                                "Join finished: {} right items and {} left items unmatched",
                                self.buffered, self.unmatched_left
                            );
                        }
                        return None;
                    }
                },
            };

            match self.find_right(&key) {
                Ok(Some(b)) => return Some(Ok((a, b))),
                Ok(None) => self.unmatched_left += 1,
                Err(e) => {
                    self.pending = Some((key, Ok(a)));
                    return Some(Err(e));
                }
            }
        }
    }
}
