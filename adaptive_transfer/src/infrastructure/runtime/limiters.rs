// /////////////////////////////////////////////////////////////////////////////
// Adaptive Transfer RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Admission Limiters
//!
//! Layered admission control in front of the chunk execution pipeline.
//! Admission acquires, strictly in this order:
//!
//! 1. **queue slot** - bounded wait (the only suspension point); refusal is
//!    `queue-full`
//! 2. **global inflight** - immediate refusal `global-full`
//! 3. **per-upload inflight** - immediate refusal `per-upload-full`
//! 4. **fair-share** - checked only when the global pool is contended;
//!    refusal `fair-share-full`
//!
//! Any refusal releases what was already acquired in reverse order. Each
//! level has its own synchronization (a semaphore and per-level atomics),
//! never one mutex region across all of them.
//!
//! The returned [`AdmissionPermit`] releases on drop; the queue slot can be
//! handed back early when the task leaves the queue for a worker. Release
//! is guarded so a permit can terminate exactly once - counters cannot go
//! negative or double-release.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use adaptive_transfer_domain::{BackpressureReason, TransferError, UploadId};

/// Layered inflight counters guarding the worker pipeline.
#[derive(Debug)]
pub struct AdmissionController {
    /// Waiting-room bound; sized to the task queue.
    queue_slots: Arc<Semaphore>,
    queue_capacity: usize,

    global_cap: usize,
    global_in_use: AtomicUsize,

    per_upload_cap: usize,
    per_upload: Mutex<HashMap<UploadId, Arc<AtomicUsize>>>,

    /// Fair-share cap; updated by the worker pool on resize when the cap is
    /// auto-derived.
    fair_share_cap: AtomicUsize,
}

impl AdmissionController {
    pub fn new(queue_capacity: usize, global_cap: usize, per_upload_cap: usize, fair_share_cap: usize) -> Arc<Self> {
        Arc::new(Self {
            queue_slots: Arc::new(Semaphore::new(queue_capacity.max(1))),
            queue_capacity: queue_capacity.max(1),
            global_cap: global_cap.max(1),
            global_in_use: AtomicUsize::new(0),
            per_upload_cap: per_upload_cap.max(1),
            per_upload: Mutex::new(HashMap::new()),
            fair_share_cap: AtomicUsize::new(fair_share_cap.max(1)),
        })
    }

    /// Admits one chunk task for `upload_id`, waiting up to `queue_timeout`
    /// for a queue slot. Refusals are typed `Backpressure` errors.
    pub async fn admit(
        self: &Arc<Self>,
        upload_id: UploadId,
        queue_timeout: Duration,
    ) -> Result<AdmissionPermit, TransferError> {
        // 1. queue slot (bounded wait)
        let queue_permit = match tokio::time::timeout(queue_timeout, Arc::clone(&self.queue_slots).acquire_owned()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(TransferError::internal("queue slot semaphore closed")),
            Err(_) => return Err(TransferError::Backpressure(BackpressureReason::QueueFull)),
        };

        // 2. global inflight
        let global_now = match Self::try_increment(&self.global_in_use, self.global_cap) {
            Some(now) => now,
            None => {
                drop(queue_permit);
                return Err(TransferError::Backpressure(BackpressureReason::GlobalFull));
            }
        };

        // 3. per-upload inflight
        let upload_counter = self.upload_counter(upload_id);
        let upload_now = match Self::try_increment(&upload_counter, self.per_upload_cap) {
            Some(now) => now,
            None => {
                self.decrement_global();
                self.maybe_drop_counter(upload_id, &upload_counter);
                drop(queue_permit);
                return Err(TransferError::Backpressure(BackpressureReason::PerUploadFull));
            }
        };

        // 4. fair-share: with global headroom left, fair-share never
        // rejects; under contention it caps any single upload.
        let contended = global_now == self.global_cap;
        if contended && upload_now > self.fair_share_cap.load(Ordering::Acquire) {
            upload_counter.fetch_sub(1, Ordering::AcqRel);
            self.maybe_drop_counter(upload_id, &upload_counter);
            self.decrement_global();
            drop(queue_permit);
            return Err(TransferError::Backpressure(BackpressureReason::FairShareFull));
        }

        Ok(AdmissionPermit {
            controller: Arc::clone(self),
            upload_id,
            upload_counter,
            queue_permit: Some(queue_permit),
            released: AtomicBool::new(false),
        })
    }

    /// Bounded increment; returns the post-increment value on success.
    fn try_increment(counter: &AtomicUsize, cap: usize) -> Option<usize> {
        let mut current = counter.load(Ordering::Acquire);
        loop {
            if current >= cap {
                return None;
            }
            match counter.compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Some(current + 1),
                Err(observed) => current = observed,
            }
        }
    }

    fn decrement_global(&self) {
        let previous = self.global_in_use.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "global inflight counter underflow");
    }

    fn upload_counter(&self, upload_id: UploadId) -> Arc<AtomicUsize> {
        let mut map = self.per_upload.lock();
        Arc::clone(map.entry(upload_id).or_insert_with(|| Arc::new(AtomicUsize::new(0))))
    }

    /// Drops the map entry once an upload has no inflight work, keeping the
    /// table proportional to active uploads.
    fn maybe_drop_counter(&self, upload_id: UploadId, counter: &Arc<AtomicUsize>) {
        if counter.load(Ordering::Acquire) == 0 {
            let mut map = self.per_upload.lock();
            if let Some(existing) = map.get(&upload_id) {
                if existing.load(Ordering::Acquire) == 0 {
                    map.remove(&upload_id);
                }
            }
        }
    }

    /// Updates the fair-share cap (auto mode follows the worker count).
    pub fn set_fair_share_cap(&self, cap: usize) {
        self.fair_share_cap.store(cap.max(1), Ordering::Release);
    }

    pub fn fair_share_cap(&self) -> usize {
        self.fair_share_cap.load(Ordering::Acquire)
    }

    pub fn global_in_use(&self) -> usize {
        self.global_in_use.load(Ordering::Acquire)
    }

    pub fn global_cap(&self) -> usize {
        self.global_cap
    }

    pub fn queue_slots_in_use(&self) -> usize {
        self.queue_capacity - self.queue_slots.available_permits()
    }

    pub fn inflight_for(&self, upload_id: UploadId) -> usize {
        self.per_upload
            .lock()
            .get(&upload_id)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn tracked_uploads(&self) -> usize {
        self.per_upload.lock().len()
    }
}

/// Inflight token for one admitted chunk task.
///
/// Dropping the permit releases everything still held, in reverse
/// acquisition order. Terminal paths (success, retry exhaustion,
/// cancellation) all end in exactly one release.
#[derive(Debug)]
pub struct AdmissionPermit {
    controller: Arc<AdmissionController>,
    upload_id: UploadId,
    upload_counter: Arc<AtomicUsize>,
    queue_permit: Option<OwnedSemaphorePermit>,
    released: AtomicBool,
}

impl AdmissionPermit {
    /// Frees the queue slot once the task left the queue for a worker; the
    /// inflight counters stay held until the task terminates.
    pub fn release_queue_slot(&mut self) {
        self.queue_permit.take();
    }

    pub fn upload_id(&self) -> UploadId {
        self.upload_id
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        // reverse order: per-upload, then global, then the queue slot
        let previous = self.upload_counter.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "per-upload inflight counter underflow");
        self.controller.maybe_drop_counter(self.upload_id, &self.upload_counter);
        self.controller.decrement_global();
        self.queue_permit.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_admission_and_release() {
        let controller = AdmissionController::new(16, 4, 2, 2);
        let upload = UploadId::new();

        let permit = controller.admit(upload, T).await.unwrap();
        assert_eq!(controller.global_in_use(), 1);
        assert_eq!(controller.inflight_for(upload), 1);

        drop(permit);
        assert_eq!(controller.global_in_use(), 0);
        assert_eq!(controller.inflight_for(upload), 0);
        assert_eq!(controller.tracked_uploads(), 0);
    }

    #[tokio::test]
    async fn test_global_cap_refuses() {
        let controller = AdmissionController::new(16, 2, 8, 8);
        let a = UploadId::new();
        let b = UploadId::new();
        let c = UploadId::new();

        let _p1 = controller.admit(a, T).await.unwrap();
        let _p2 = controller.admit(b, T).await.unwrap();

        let err = controller.admit(c, T).await.unwrap_err();
        assert_eq!(err.backpressure_reason(), Some(BackpressureReason::GlobalFull));
        // refusal must not leak anything
        assert_eq!(controller.global_in_use(), 2);
        assert_eq!(controller.inflight_for(c), 0);
    }

    #[tokio::test]
    async fn test_per_upload_cap_refuses() {
        let controller = AdmissionController::new(16, 8, 2, 8);
        let upload = UploadId::new();

        let _p1 = controller.admit(upload, T).await.unwrap();
        let _p2 = controller.admit(upload, T).await.unwrap();

        let err = controller.admit(upload, T).await.unwrap_err();
        assert_eq!(err.backpressure_reason(), Some(BackpressureReason::PerUploadFull));
        assert_eq!(controller.global_in_use(), 2);
        assert_eq!(controller.inflight_for(upload), 2);
    }

    #[tokio::test]
    async fn test_fair_share_only_under_contention() {
        // fair-share cap 1, but global headroom: the second admit passes
        let controller = AdmissionController::new(16, 8, 4, 1);
        let upload = UploadId::new();
        let _p1 = controller.admit(upload, T).await.unwrap();
        let _p2 = controller.admit(upload, T).await.unwrap();
        assert_eq!(controller.inflight_for(upload), 2);
    }

    #[tokio::test]
    async fn test_fair_share_caps_under_contention() {
        // global cap 2: the admit that takes the last slot is over its
        // fair share of 1 and must be refused
        let controller = AdmissionController::new(16, 2, 4, 1);
        let greedy = UploadId::new();
        let other = UploadId::new();

        let _p1 = controller.admit(greedy, T).await.unwrap();
        let err = controller.admit(greedy, T).await.unwrap_err();
        assert_eq!(err.backpressure_reason(), Some(BackpressureReason::FairShareFull));

        // the refusal released the global slot, so another upload fits
        let _p2 = controller.admit(other, T).await.unwrap();
        assert_eq!(controller.global_in_use(), 2);
    }

    #[tokio::test]
    async fn test_queue_slot_timeout() {
        let controller = AdmissionController::new(1, 8, 8, 8);
        let a = UploadId::new();
        let _p1 = controller.admit(a, T).await.unwrap();

        let err = controller.admit(a, T).await.unwrap_err();
        assert_eq!(err.backpressure_reason(), Some(BackpressureReason::QueueFull));
    }

    #[tokio::test]
    async fn test_early_queue_slot_release() {
        let controller = AdmissionController::new(1, 8, 8, 8);
        let upload = UploadId::new();

        let mut permit = controller.admit(upload, T).await.unwrap();
        permit.release_queue_slot();
        assert_eq!(controller.queue_slots_in_use(), 0);
        // inflight still held
        assert_eq!(controller.global_in_use(), 1);

        // another task can use the freed queue slot
        let _second = controller.admit(upload, T).await.unwrap();

        drop(permit);
        assert_eq!(controller.global_in_use(), 1);
    }

    #[tokio::test]
    async fn test_fair_share_cap_update() {
        let controller = AdmissionController::new(16, 2, 8, 1);
        controller.set_fair_share_cap(2);
        let upload = UploadId::new();
        let _p1 = controller.admit(upload, T).await.unwrap();
        // takes the last global slot; now within the raised fair share
        let _p2 = controller.admit(upload, T).await.unwrap();
        assert_eq!(controller.inflight_for(upload), 2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Random admit/release interleavings keep every counter within
        /// its cap and return to zero after all permits drop.
        #[test]
        fn prop_counters_stay_bounded() {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();

            proptest!(ProptestConfig::with_cases(64), |(ops in proptest::collection::vec(0u8..4, 1..120))| {
                runtime.block_on(async {
                    let controller = AdmissionController::new(8, 4, 3, 2);
                    let uploads = [UploadId::new(), UploadId::new()];
                    let mut held: Vec<AdmissionPermit> = Vec::new();

                    for op in ops {
                        match op {
                            0 | 1 => {
                                let upload = uploads[op as usize];
                                if let Ok(permit) =
                                    controller.admit(upload, Duration::from_millis(1)).await
                                {
                                    held.push(permit);
                                }
                            }
                            2 => {
                                if !held.is_empty() {
                                    held.remove(0);
                                }
                            }
                            _ => {
                                if let Some(permit) = held.last_mut() {
                                    permit.release_queue_slot();
                                }
                            }
                        }

                        prop_assert!(controller.global_in_use() <= controller.global_cap());
                        prop_assert_eq!(controller.global_in_use(), held.len());
                        for upload in uploads {
                            prop_assert!(controller.inflight_for(upload) <= 3);
                        }
                    }

                    held.clear();
                    prop_assert_eq!(controller.global_in_use(), 0);
                    prop_assert_eq!(controller.queue_slots_in_use(), 0);
                    prop_assert_eq!(controller.tracked_uploads(), 0);
                    Ok(())
                })?;
            });
        }
    }
}
