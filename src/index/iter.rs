//! Lazy entry iterators
//!
//! Both iterators read one slot per step and stop at the first I/O error.
//! They are restartable by offset: asking again with `start_from = n`
//! resumes after the first `n` results.

use crate::error::Result;

use super::bucket::BucketFile;
use super::layout::IndexEntry;

/// Paging state shared by both iterators
struct Window {
    skip: usize,
    remaining: Option<usize>,
}

impl Window {
    fn new(start_from: usize, limit: Option<usize>) -> Self {
        Self {
            skip: start_from,
            remaining: limit,
        }
    }

    fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// True if the match should be yielded
    fn admit(&mut self) -> bool {
        if self.skip > 0 {
            self.skip -= 1;
            return false;
        }
        if let Some(n) = self.remaining.as_mut() {
            *n -= 1;
        }
        true
    }
}

/// Walks one key's probe chain, yielding its live entries
pub struct ProbeIter<'a> {
    bucket: &'a mut BucketFile,
    key: Vec<u8>,
    home: u64,
    step: u64,
    done: bool,
    window: Window,
}

impl<'a> ProbeIter<'a> {
    pub(crate) fn new(
        bucket: &'a mut BucketFile,
        key: &[u8],
        home: u64,
        start_from: usize,
        limit: Option<usize>,
    ) -> Self {
        Self {
            bucket,
            key: key.to_vec(),
            home,
            step: 0,
            done: false,
            window: Window::new(start_from, limit),
        }
    }
}

impl<'a> Iterator for ProbeIter<'a> {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let lim = self.bucket.hash_lim();
        while !self.done && !self.window.exhausted() && self.step < lim {
            let slot = (self.home + self.step) % lim;
            self.step += 1;

            match self.bucket.read_slot(slot) {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                // An empty slot ends the chain
                Ok(None) => self.done = true,
                Ok(Some(entry)) => {
                    if entry.status.is_live() && entry.key == self.key && self.window.admit() {
                        return Some(Ok(entry));
                    }
                }
            }
        }
        None
    }
}

/// Scans the slot array in order, yielding live entries
pub struct ScanIter<'a> {
    bucket: &'a mut BucketFile,
    slot: u64,
    done: bool,
    window: Window,
}

impl<'a> ScanIter<'a> {
    pub(crate) fn new(bucket: &'a mut BucketFile, start_from: usize, limit: Option<usize>) -> Self {
        Self {
            bucket,
            slot: 0,
            done: false,
            window: Window::new(start_from, limit),
        }
    }
}

impl<'a> Iterator for ScanIter<'a> {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let lim = self.bucket.hash_lim();
        while !self.done && !self.window.exhausted() && self.slot < lim {
            let slot = self.slot;
            self.slot += 1;

            match self.bucket.read_slot(slot) {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok(Some(entry)) if entry.status.is_live() => {
                    if self.window.admit() {
                        return Some(Ok(entry));
                    }
                }
                Ok(_) => {}
            }
        }
        None
    }
}
