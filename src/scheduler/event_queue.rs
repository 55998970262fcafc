/*
 * Copyright (c) 2021, TU Dresden.
 *
 * Redistribution and use in source and binary forms, with or without modification,
 * are permitted provided that the following conditions are met:
 *
 * 1. Redistributions of source code must retain the above copyright notice,
 *    this list of conditions and the following disclaimer.
 *
 * 2. Redistributions in binary form must reproduce the above copyright notice,
 *    this list of conditions and the following disclaimer in the documentation
 *    and/or other materials provided with the distribution.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY
 * EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF
 * MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL
 * THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
 * SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO,
 * PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS
 * INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT,
 * STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF
 * THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.
 */

use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex};

use smallvec::SmallVec;

use crate::{Tag, TriggerId};

/// The actions that fired events for one tag. Events for the
/// same action at the same tag are merged; the latest staged
/// payload wins.
pub(crate) type EventBucket = SmallVec<[TriggerId; 4]>;

#[derive(Default)]
pub(crate) struct QueueState {
    /// Events ordered by tag. The scheduler always takes the
    /// minimum tag.
    pub queue: BTreeMap<Tag, EventBucket>,
    /// Set when a shutdown has been requested. The scheduler
    /// processes one final microstep tag and discards the rest.
    pub stop: bool,
}

/// The event queue shared between the scheduler thread and
/// asynchronous producers (physical action schedulers and
/// [async_shutdown](crate::AppHandle::async_shutdown)). A single
/// mutex protects insertion; the condition variable wakes the
/// scheduler when it is idle or waiting for physical time.
#[derive(Default)]
pub(crate) struct EventQueue {
    pub(crate) state: Mutex<QueueState>,
    pub(crate) cond: Condvar,
}

impl EventQueue {
    /// Enqueue an event for the given action at the given tag.
    pub fn push(&self, tag: Tag, trigger: TriggerId) {
        let mut state = self.state.lock().unwrap();
        Self::insert(&mut state, tag, trigger);
        self.cond.notify_one();
    }

    pub(crate) fn insert(state: &mut QueueState, tag: Tag, trigger: TriggerId) {
        let bucket = state.queue.entry(tag).or_default();
        if !bucket.contains(&trigger) {
            bucket.push(trigger);
        }
    }

    /// Request that the scheduler stop. No further events will be
    /// processed past the final microstep tag.
    pub fn request_stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.stop = true;
        self.cond.notify_one();
    }
}
