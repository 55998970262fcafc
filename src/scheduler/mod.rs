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

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use rayon::prelude::*;
use smallvec::SmallVec;

use crate::actions::{ActionKind, ActionStore, ErasedActionStore};
use crate::environment::TriggerKind;
use crate::{
    get_physical_time, ActionKey, Duration, Environment, LogicalTime, Offset, PhysicalActionKey, PhysicalInstant,
    ReactionId, Tag, TriggerId, TriggerLike, TypedActionKey, TypedPortKey, ValidationError,
};

pub(crate) mod depgraph;
pub(crate) mod event_queue;

use self::event_queue::{EventBucket, EventQueue};

/// The execution context handed to reaction bodies. It gives
/// access to the values of the current tag (ports and action
/// payloads), lets the reaction write its declared
/// antidependencies and schedule its declared logical actions,
/// and exposes the clocks.
///
/// Everything a reaction produces (set ports, newly triggered
/// reactions, future events, stop requests) is collected here
/// and merged into the scheduler after the reaction completes.
pub struct ReactionCtx<'a> {
    env: &'a Environment,
    tag: Tag,
    t0: PhysicalInstant,
    current_reaction: ReactionId,
    out: CtxOutput,
}

/// What executing reactions need to make known to the scheduler.
#[derive(Default)]
pub(crate) struct CtxOutput {
    /// Ports set during this tag; cleared when the tag ends.
    pub set_ports: SmallVec<[TriggerId; 4]>,
    /// Reactions triggered by port writes. Necessarily at a
    /// strictly greater level than the writing reaction.
    pub triggered: SmallVec<[ReactionId; 8]>,
    /// Events produced for a strictly greater tag.
    pub future_events: SmallVec<[(Tag, TriggerId); 4]>,
    pub stop_requested: bool,
}

impl CtxOutput {
    fn absorb(&mut self, mut other: CtxOutput) {
        self.set_ports.append(&mut other.set_ports);
        self.triggered.append(&mut other.triggered);
        self.future_events.append(&mut other.future_events);
        self.stop_requested |= other.stop_requested;
    }
}

impl<'a> ReactionCtx<'a> {
    fn new(env: &'a Environment, tag: Tag, t0: PhysicalInstant, current_reaction: ReactionId) -> Self {
        Self { env, tag, t0, current_reaction, out: CtxOutput::default() }
    }

    /// Copy the value of the port out, if it is present at the
    /// current tag. Bound ports mirror the value of the source of
    /// their binding chain.
    pub fn get<T: Clone + Send + Sync + 'static>(&self, port: TypedPortKey<T>) -> Option<T> {
        self.use_ref(port, |v| v.cloned())
    }

    /// Execute a closure on the current value of the port. The
    /// closure is called even if the value is absent.
    pub fn use_ref<T: Send + Sync + 'static, O>(
        &self,
        port: TypedPortKey<T>,
        f: impl FnOnce(Option<&T>) -> O,
    ) -> O {
        let id = port.trigger_id();
        debug_assert!(
            self.env.reactions[self.current_reaction].may_read(id),
            "reaction did not declare read access to {}",
            self.env.trigger_fqn(id)
        );
        let source = self.env.source_of(id);
        let cell = self.env.expect_port(source).typed_cell::<T>();
        let value = cell.value.borrow();
        f(value.as_ref())
    }

    /// Set the value of the port for the current tag. The value
    /// propagates along the outward bindings of the port,
    /// logically instantaneously, and the reactions triggered by
    /// any port of that chain become ready at the current tag.
    pub fn set<T: Send + Sync + 'static>(&mut self, port: TypedPortKey<T>, value: T) {
        let id = port.trigger_id();
        let data = self.env.expect_port(id);
        debug_assert!(
            !data.has_inward_binding(),
            "set() may only be called on a port without an inward binding ({})",
            self.env.trigger_fqn(id)
        );
        debug_assert!(
            self.env.reactions[self.current_reaction].may_write(id),
            "reaction did not declare {} as an antidependency",
            self.env.trigger_fqn(id)
        );
        *data.typed_cell::<T>().value.borrow_mut() = Some(value);
        self.out.set_ports.push(id);

        let mut stack: SmallVec<[TriggerId; 8]> = smallvec::smallvec![id];
        while let Some(p) = stack.pop() {
            let port = self.env.expect_port(p);
            self.out.triggered.extend(port.triggers.iter().copied());
            stack.extend(port.outward_bindings.iter().copied());
        }
    }

    /// Whether the given trigger (port or action) is present at
    /// the current tag.
    pub fn is_present(&self, trigger: &impl TriggerLike) -> bool {
        let id = trigger.trigger_id();
        debug_assert!(
            self.env.reactions[self.current_reaction].may_read(id),
            "reaction did not declare read access to {}",
            self.env.trigger_fqn(id)
        );
        match &self.env.triggers[id].kind {
            TriggerKind::Port(_) => {
                let source = self.env.source_of(id);
                self.env.expect_port(source).cell.is_present()
            }
            TriggerKind::Action(a) => a.store.is_present(),
        }
    }

    /// Copy the payload of the action out, if the action fired at
    /// the current tag with a payload.
    pub fn get_action<T: Clone + Send + Sync + 'static>(&self, action: &impl ActionKey<T>) -> Option<T> {
        let id = action.trigger_id();
        debug_assert!(
            self.env.reactions[self.current_reaction].may_read(id),
            "reaction did not declare read access to {}",
            self.env.trigger_fqn(id)
        );
        self.env.expect_action(id).typed_store::<T>().get_value()
    }

    /// Schedule the logical action without a payload. The event
    /// fires at `tag.delay(max(min_delay, offset))`, at the
    /// earliest one microstep after the current tag.
    pub fn schedule<T: Send + Sync + 'static>(&mut self, action: TypedActionKey<T>, offset: Offset) {
        self.schedule_with(action, None, offset)
    }

    /// Schedule the logical action with a payload. Several
    /// schedulings of the same action for the same tag overwrite
    /// each other; the latest payload wins.
    pub fn schedule_with<T: Send + Sync + 'static>(
        &mut self,
        action: TypedActionKey<T>,
        value: Option<T>,
        offset: Offset,
    ) {
        let id = action.trigger_id();
        debug_assert!(
            self.env.reactions[self.current_reaction].may_schedule(id),
            "reaction did not declare {} as schedulable",
            self.env.trigger_fqn(id)
        );
        let data = self.env.expect_action(id);
        let min_delay = match data.kind {
            ActionKind::Logical { min_delay } => min_delay,
            _ => unreachable!("key of a logical action refers to another kind"),
        };
        let eta = self.tag.delay(min_delay.max(offset.to_duration()));
        data.typed_store::<T>().stage(eta, value);
        trace!("Schedule action {} at {}", self.env.trigger_fqn(id), eta.display_since(self.t0));
        self.out.future_events.push((eta, id));
    }

    /// Schedule a physical action from within a reaction. The tag
    /// is derived from the current physical time, and is strictly
    /// greater than the current logical tag.
    pub fn schedule_physical_with<T: Send + Sync + 'static>(
        &mut self,
        action: PhysicalActionKey<T>,
        value: Option<T>,
        offset: Offset,
    ) {
        let id = action.trigger_id();
        let data = self.env.expect_action(id);
        debug_assert!(data.kind.is_physical(), "key of a physical action refers to another kind");
        let eta = physical_event_tag(self.tag, offset.to_duration());
        data.typed_store::<T>().stage(eta, value);
        self.out.future_events.push((eta, id));
    }

    /// Request that the application shut down. The request takes
    /// effect once the current tag has been fully processed; the
    /// shutdown actions then fire at the next microstep.
    pub fn request_stop(&mut self) {
        self.out.stop_requested = true;
    }

    /// The tag being processed.
    #[inline]
    pub fn get_tag(&self) -> Tag {
        self.tag
    }

    /// The physical instant captured when the program started.
    #[inline]
    pub fn get_start_time(&self) -> PhysicalInstant {
        self.t0
    }

    #[inline]
    pub fn get_physical_time(&self) -> PhysicalInstant {
        get_physical_time()
    }

    /// Logical time elapsed since the start of the program.
    #[inline]
    pub fn get_elapsed_logical_time(&self) -> Duration {
        self.tag.time_point().saturating_duration_since(self.t0)
    }

    /// Physical time elapsed since the start of the program.
    #[inline]
    pub fn get_elapsed_physical_time(&self) -> Duration {
        get_physical_time().saturating_duration_since(self.t0)
    }
}

/// The tag of a physical event: derived from the current
/// physical time, with a microstep chosen so that the result is
/// strictly greater than the current logical tag.
fn physical_event_tag(current: Tag, offset: Duration) -> Tag {
    Tag::from_physical_time(get_physical_time() + offset).max(current.next_microstep())
}

/// Shared parts of a tag execution, borrowed by every worker
/// dispatching a reaction of that tag.
struct ExecCtx<'a> {
    env: &'a Environment,
    tag: Tag,
    t0: PhysicalInstant,
    pool: &'a Option<rayon::ThreadPool>,
}

impl ExecCtx<'_> {
    /// Run one level batch. Reactions of the same level have no
    /// dependencies among each other and may run in parallel on
    /// the worker pool; this call is a barrier, it returns once
    /// every reaction of the batch has completed.
    fn run_batch(&self, batch: &[ReactionId]) -> CtxOutput {
        match self.pool {
            Some(pool) if batch.len() > 1 => pool.install(|| {
                batch
                    .par_iter()
                    .map(|&rid| self.run_reaction(rid))
                    .reduce(CtxOutput::default, |mut a, b| {
                        a.absorb(b);
                        a
                    })
            }),
            _ => batch.iter().fold(CtxOutput::default(), |mut acc, &rid| {
                acc.absorb(self.run_reaction(rid));
                acc
            }),
        }
    }

    fn run_reaction(&self, rid: ReactionId) -> CtxOutput {
        let entry = &self.env.reactions[rid];
        trace!("  - Executing {} (level {})", entry.fqn, entry.level);

        let mut ctx = ReactionCtx::new(self.env, self.tag, self.t0, rid);
        let missed_deadline = entry.deadline.as_ref().map_or(false, |d| {
            let lag = get_physical_time().saturating_duration_since(self.tag.time_point());
            lag > d.duration
        });

        let mut state = self.env.states[entry.container].lock().unwrap();
        match &entry.deadline {
            Some(d) if missed_deadline => {
                debug!("Deadline of {} was missed", entry.fqn);
                (d.handler)(state.as_mut(), &mut ctx)
            }
            _ => (entry.body)(state.as_mut(), &mut ctx),
        }
        drop(state);
        ctx.out
    }
}

/// The discrete-event scheduler. It owns the environment for the
/// whole execution, advances logical time to the smallest tag in
/// the event queue, and dispatches the triggered reactions
/// grouped by topological level.
pub(crate) struct Scheduler {
    env: Environment,
    queue: Arc<EventQueue>,
    time: Arc<Mutex<LogicalTime>>,
    t0: PhysicalInstant,
    pool: Option<rayon::ThreadPool>,
    /// Tag bounding the execution when a timeout was configured.
    shutdown_tag: Option<Tag>,
    /// Actions that fired at the tag being processed; their
    /// stores are cleaned up when the tag ends, and timers
    /// re-enqueue themselves then.
    fired_actions: Vec<TriggerId>,
    /// Ports set at the tag being processed; their presence is
    /// cleared when the tag ends.
    set_ports: Vec<TriggerId>,
}

impl Scheduler {
    pub(crate) fn new(
        env: Environment,
        queue: Arc<EventQueue>,
        time: Arc<Mutex<LogicalTime>>,
        t0: PhysicalInstant,
    ) -> Self {
        let pool = if env.options.worker_pool_size > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(env.options.worker_pool_size)
                    .build()
                    .expect("could not create the worker pool"),
            )
        } else {
            None
        };
        let shutdown_tag = env.options.timeout.map(|timeout| Tag::from_physical_time(t0).delay(timeout));
        Self {
            env,
            queue,
            time,
            t0,
            pool,
            shutdown_tag,
            fired_actions: Vec::new(),
            set_ports: Vec::new(),
        }
    }

    /// The main event loop. Returns once a stop has been observed
    /// and all in-flight reactions have completed; pending events
    /// beyond the final microstep tag are discarded.
    pub(crate) fn run(mut self) {
        debug!("Starting the scheduler");
        loop {
            self.cleanup_tag();

            let mut guard = self.queue.state.lock().unwrap();
            let next = loop {
                if guard.stop {
                    break None;
                }
                let head = guard.queue.keys().next().copied();
                let tag = match head {
                    None if self.env.options.keep_alive => {
                        debug!("Waiting for asynchronous events");
                        guard = self.queue.cond.wait(guard).unwrap();
                        continue;
                    }
                    None => {
                        debug!("No more events in queue, terminating");
                        guard.stop = true;
                        break None;
                    }
                    Some(tag) => tag,
                };
                if self.shutdown_tag.map_or(false, |limit| tag > limit) {
                    debug!("Timeout reached, terminating");
                    guard.stop = true;
                    break None;
                }
                if !self.env.options.fast_forward_logical_time {
                    let now = get_physical_time();
                    if tag.time_point() > now {
                        // Wait until physical time catches up with the
                        // tag, or until an asynchronous insertion or a
                        // stop request changes the picture.
                        let (g, _) = self.queue.cond.wait_timeout(guard, tag.time_point() - now).unwrap();
                        guard = g;
                        continue;
                    }
                }
                let bucket = guard.queue.remove(&tag).unwrap();
                // Advancing under the queue lock serializes the
                // clock with asynchronous producers, which derive
                // their tags from it.
                self.time.lock().unwrap().advance_to(tag);
                break Some((tag, bucket));
            };
            drop(guard);

            match next {
                Some((tag, bucket)) => self.process_tag(tag, bucket),
                None => {
                    self.process_final_tag();
                    break;
                }
            }
        }
        debug!("Scheduler terminated");
    }

    /// A stop was requested. Advance to the timeout tag if one
    /// bounds the execution, run the shutdown hooks, and process
    /// the final microstep tag, which carries the shutdown-action
    /// events and everything else already scheduled for it.
    fn process_final_tag(&mut self) {
        let current = {
            let mut time = self.time.lock().unwrap();
            if let Some(limit) = self.shutdown_tag {
                if time.to_tag() < limit {
                    time.advance_to(limit);
                }
            }
            time.to_tag()
        };

        self.env.sync_shutdown(current, &self.queue);

        let final_tag = current.next_microstep();
        let bucket = self.queue.state.lock().unwrap().queue.remove(&final_tag);
        if let Some(bucket) = bucket {
            self.time.lock().unwrap().advance_to(final_tag);
            self.process_tag(final_tag, bucket);
            self.cleanup_tag();
        }
    }

    /// Dispatch all reactions triggered at the given tag, level
    /// by level. The logical clock has already been advanced.
    fn process_tag(&mut self, tag: Tag, bucket: EventBucket) {
        debug!("advance logical time to tag {}", tag.display_since(self.t0));

        let mut levels: Vec<Vec<ReactionId>> = vec![Vec::new(); self.env.max_reaction_index.index() + 1];

        for &trigger in &bucket {
            let action = self.env.expect_action(trigger);
            action.store.activate(&tag);
            self.fired_actions.push(trigger);
            for &rid in &action.triggers {
                levels[self.env.reactions[rid].level.index()].push(rid);
            }
        }

        let exec = ExecCtx { env: &self.env, tag, t0: self.t0, pool: &self.pool };
        let mut pos = 0;
        while pos < levels.len() {
            let mut batch = std::mem::take(&mut levels[pos]);
            if batch.is_empty() {
                pos += 1;
                continue;
            }
            // A reaction triggered through several ports must
            // only execute once.
            batch.sort_unstable();
            batch.dedup();
            trace!("Processing {} reactions at level {}", batch.len(), pos);

            let out = exec.run_batch(&batch);

            self.set_ports.extend(out.set_ports);
            for rid in out.triggered {
                let level = self.env.reactions[rid].level.index();
                debug_assert!(level > pos, "a triggered reaction must be downstream of the writer");
                levels[level].push(rid);
            }
            for (eta, trigger) in out.future_events {
                self.queue.push(eta, trigger);
            }
            if out.stop_requested {
                self.queue.request_stop();
            }
            pos += 1;
        }
    }

    /// End-of-tag cleanup: fired actions clear their payload (and
    /// periodic timers re-enqueue themselves), set ports clear
    /// their presence flag.
    fn cleanup_tag(&mut self) {
        if self.fired_actions.is_empty() && self.set_ports.is_empty() {
            return;
        }
        let current = self.time.lock().unwrap().to_tag();
        for &trigger in &self.fired_actions {
            let action = self.env.expect_action(trigger);
            action.store.cleanup();
            if let ActionKind::Timer { period, .. } = action.kind {
                if !period.is_zero() {
                    self.queue.push(current.delay(period), trigger);
                }
            }
        }
        self.fired_actions.clear();

        for &port in &self.set_ports {
            self.env.expect_port(port).cell.clear();
        }
        self.set_ports.clear();
    }
}

/// A handle on a running reactor program, returned by
/// [Environment::startup]. Owns the scheduler thread.
pub struct AppHandle {
    thread: JoinHandle<()>,
    link: SchedulerLink,
}

impl std::fmt::Debug for AppHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppHandle").finish_non_exhaustive()
    }
}

impl AppHandle {
    pub(crate) fn new(thread: JoinHandle<()>, link: SchedulerLink) -> Self {
        Self { thread, link }
    }

    /// Wait until the program has terminated.
    pub fn join(self) -> std::thread::Result<()> {
        self.thread.join()
    }

    /// Request a shutdown from outside the scheduler thread. The
    /// request is made under the event-queue lock; the scheduler
    /// runs the shutdown sequence and processes one final
    /// microstep tag.
    pub fn async_shutdown(&self) {
        self.link.request_stop()
    }

    /// A clonable link for scheduling physical actions and
    /// requesting shutdown from any thread.
    pub fn scheduler_link(&self) -> SchedulerLink {
        self.link.clone()
    }
}

/// A link to the event queue of a running program, usable from
/// any thread. This is the only way the outside world may
/// communicate with the scheduler.
#[derive(Clone)]
pub struct SchedulerLink {
    pub(crate) queue: Arc<EventQueue>,
    pub(crate) time: Arc<Mutex<LogicalTime>>,
    pub(crate) physical_stores: Arc<HashMap<TriggerId, Arc<dyn ErasedActionStore>>>,
}

impl SchedulerLink {
    /// Schedule a physical action without a payload.
    pub fn schedule_physical<T: Send + Sync + 'static>(
        &self,
        action: PhysicalActionKey<T>,
    ) -> Result<(), ValidationError> {
        self.schedule_physical_with(action, None)
    }

    /// Schedule a physical action. The event tag is derived from
    /// the current physical time and is strictly greater than the
    /// current logical tag; insertion takes the queue lock.
    pub fn schedule_physical_with<T: Send + Sync + 'static>(
        &self,
        action: PhysicalActionKey<T>,
        value: Option<T>,
    ) -> Result<(), ValidationError> {
        let id = action.trigger_id();
        let store = self
            .physical_stores
            .get(&id)
            .ok_or_else(|| ValidationError::new("only physical actions may be scheduled from outside a reaction"))?;
        let store = store
            .as_any()
            .downcast_ref::<ActionStore<T>>()
            .expect("action store has the wrong payload type");

        // Queue lock first, then the clock, same order as the
        // scheduler: the tag stays strictly greater than any tag
        // the scheduler may still advance to.
        let mut state = self.queue.state.lock().unwrap();
        let tag = {
            let time = self.time.lock().unwrap();
            physical_event_tag(time.to_tag(), Duration::ZERO)
        };
        store.stage(tag, value);
        EventQueue::insert(&mut state, tag, id);
        drop(state);
        self.queue.cond.notify_one();
        Ok(())
    }

    /// Same effect as [AppHandle::async_shutdown].
    pub fn request_stop(&self) {
        self.queue.request_stop();
    }
}
