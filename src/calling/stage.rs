// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;

use crate::variants::VariantLocus;

/// A unit of the calling pipeline.
///
/// A stage receives loci in non-decreasing position order and forwards zero
/// or more loci to its downstream stage, again in position order.
pub trait VariantStage {
    /// Consume one locus. The stage may forward it, buffer it, or drop it.
    fn process(&mut self, locus: VariantLocus) -> Result<()>;

    /// Forward all buffered loci and flush the downstream stage once.
    /// Calling flush again without processing in between is a no-op.
    fn flush(&mut self) -> Result<()>;
}

impl<S: VariantStage + ?Sized> VariantStage for Box<S> {
    fn process(&mut self, locus: VariantLocus) -> Result<()> {
        (**self).process(locus)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Tracks whether a stage was flushed since it last processed a locus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushState {
    flushed: bool,
}

impl FlushState {
    pub fn mark_active(&mut self) {
        self.flushed = false;
    }

    /// Returns true if the caller has to perform the flush, false if the stage
    /// is already flushed.
    pub fn begin_flush(&mut self) -> bool {
        !std::mem::replace(&mut self.flushed, true)
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }
}

#[derive(Debug)]
struct SharedInner<S> {
    stage: S,
    holders: usize,
    // live handles flushed since they last processed a locus
    flushed_holders: usize,
    // number of times the inner stage was flushed
    round: u64,
    flush_state: FlushState,
}

impl<S: VariantStage> SharedInner<S> {
    fn is_complete(&self) -> bool {
        self.flushed_holders == self.holders && !self.flush_state.is_flushed()
    }

    fn flush_round(&mut self) -> Result<()> {
        self.flush_state.begin_flush();
        self.round += 1;
        self.stage.flush()
    }
}

/// A downstream stage shared by several upstream stages (fan-in).
///
/// Each upstream stage gets its own `SharedStageHandle`. The inner stage is
/// flushed once when every live handle has been flushed, and again only after
/// some handle processed further loci. Dropping the last unflushed handle
/// completes a pending flush. The inner stage lives as long as the
/// longest-lived handle.
#[derive(Debug)]
pub struct SharedStage<S> {
    inner: Rc<RefCell<SharedInner<S>>>,
}

impl<S: VariantStage> SharedStage<S> {
    pub fn new(stage: S) -> Self {
        SharedStage {
            inner: Rc::new(RefCell::new(SharedInner {
                stage,
                holders: 0,
                flushed_holders: 0,
                round: 0,
                flush_state: FlushState::default(),
            })),
        }
    }

    /// Register a new upstream holder.
    pub fn handle(&self) -> SharedStageHandle<S> {
        self.inner.borrow_mut().holders += 1;
        SharedStageHandle {
            inner: Rc::clone(&self.inner),
            flush_state: FlushState::default(),
        }
    }

    /// Number of live handles.
    pub fn holders(&self) -> usize {
        self.inner.borrow().holders
    }

    /// Number of times the inner stage has been flushed.
    pub fn flush_rounds(&self) -> u64 {
        self.inner.borrow().round
    }

    /// Apply `f` to the inner stage.
    pub fn with_stage<R, F: FnOnce(&S) -> R>(&self, f: F) -> R {
        f(&self.inner.borrow().stage)
    }
}

#[derive(Debug)]
pub struct SharedStageHandle<S: VariantStage> {
    inner: Rc<RefCell<SharedInner<S>>>,
    flush_state: FlushState,
}

impl<S: VariantStage> VariantStage for SharedStageHandle<S> {
    fn process(&mut self, locus: VariantLocus) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if self.flush_state.is_flushed() {
            inner.flushed_holders -= 1;
        }
        self.flush_state.mark_active();
        inner.flush_state.mark_active();
        inner.stage.process(locus)
    }

    fn flush(&mut self) -> Result<()> {
        if !self.flush_state.begin_flush() {
            return Ok(());
        }
        let mut inner = self.inner.borrow_mut();
        inner.flushed_holders += 1;
        if inner.is_complete() {
            debug!(
                "All {} upstream stages flushed, flushing shared stage.",
                inner.holders
            );
            inner.flush_round()?;
        }
        Ok(())
    }
}

impl<S: VariantStage> Drop for SharedStageHandle<S> {
    fn drop(&mut self) {
        let mut inner = self.inner.borrow_mut();
        if self.flush_state.is_flushed() {
            inner.flushed_holders -= 1;
        }
        inner.holders -= 1;
        if inner.is_complete() {
            debug!(
                "Last unflushed upstream stage dropped, flushing shared stage ({} left).",
                inner.holders
            );
            if let Err(e) = inner.flush_round() {
                warn!("Failed to flush shared stage: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variants::{Genotyping, LocusInfo, SiteLocus};

    #[derive(Default)]
    struct Counter {
        processed: usize,
        flushes: usize,
    }

    impl VariantStage for Counter {
        fn process(&mut self, _: VariantLocus) -> Result<()> {
            self.processed += 1;
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    fn locus(pos: i64) -> VariantLocus {
        SiteLocus::new(
            LocusInfo::new(pos, vec![], Genotyping::Diploid),
            "A".to_owned(),
            vec!["C".to_owned()],
        )
        .into()
    }

    #[test]
    fn test_flush_state() {
        let mut state = FlushState::default();
        assert!(state.begin_flush());
        assert!(!state.begin_flush());
        state.mark_active();
        assert!(!state.is_flushed());
        assert!(state.begin_flush());
    }

    #[test]
    fn test_shared_stage_flushes_once() {
        let shared = SharedStage::new(Counter::default());
        let mut a = shared.handle();
        let mut b = shared.handle();
        assert_eq!(shared.holders(), 2);

        a.process(locus(1)).unwrap();
        b.process(locus(2)).unwrap();
        a.flush().unwrap();
        a.flush().unwrap();
        assert_eq!(shared.with_stage(|s| s.flushes), 0);
        b.flush().unwrap();
        assert_eq!(shared.with_stage(|s| s.flushes), 1);
        b.flush().unwrap();
        assert_eq!(shared.with_stage(|s| (s.processed, s.flushes)), (2, 1));
        assert_eq!(shared.flush_rounds(), 1);
    }

    #[test]
    fn test_shared_stage_rearm_and_drop() {
        let shared = SharedStage::new(Counter::default());
        let mut a = shared.handle();
        let mut b = shared.handle();
        a.flush().unwrap();
        // processing after a flush re-arms the handle
        a.process(locus(3)).unwrap();
        b.flush().unwrap();
        assert_eq!(shared.with_stage(|s| s.flushes), 0);
        drop(b);
        assert_eq!(shared.holders(), 1);
        a.flush().unwrap();
        assert_eq!(shared.with_stage(|s| s.flushes), 1);
    }

    #[test]
    fn test_shared_stage_repeated_flush_is_noop() {
        let shared = SharedStage::new(Counter::default());
        let mut a = shared.handle();
        let mut b = shared.handle();
        a.process(locus(1)).unwrap();
        a.flush().unwrap();
        b.flush().unwrap();
        a.flush().unwrap();
        b.flush().unwrap();
        assert_eq!(shared.with_stage(|s| s.flushes), 1);

        // new loci from one holder open a new round for that holder only
        b.process(locus(4)).unwrap();
        b.flush().unwrap();
        assert_eq!(shared.with_stage(|s| (s.processed, s.flushes)), (2, 2));
        assert_eq!(shared.flush_rounds(), 2);
    }

    #[test]
    fn test_shared_stage_flushed_when_unflushed_holder_dropped() {
        let shared = SharedStage::new(Counter::default());
        let mut a = shared.handle();
        let b = shared.handle();
        a.process(locus(1)).unwrap();
        a.flush().unwrap();
        assert_eq!(shared.with_stage(|s| s.flushes), 0);
        drop(b);
        assert_eq!(shared.holders(), 1);
        assert_eq!(shared.with_stage(|s| s.flushes), 1);
        a.flush().unwrap();
        drop(a);
        assert_eq!(shared.with_stage(|s| s.flushes), 1);
    }

    #[test]
    fn test_shared_stage_flushed_when_last_holder_dropped() {
        let shared = SharedStage::new(Counter::default());
        let mut a = shared.handle();
        a.process(locus(1)).unwrap();
        drop(a);
        assert_eq!(shared.holders(), 0);
        assert_eq!(shared.with_stage(|s| (s.processed, s.flushes)), (1, 1));
    }
}
