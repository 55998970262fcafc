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

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Arc, Mutex};

use index_vec::IndexVec;

use crate::actions::{ActionData, ActionKind, ErasedActionStore};
use crate::assembly::{register_reactor_impl, AssembleFn, ReactorType};
use crate::ports::PortData;
use crate::reactions::ReactionEntry;
use crate::reactor::ReactorEntry;
use crate::scheduler::depgraph::DepGraph;
use crate::scheduler::event_queue::EventQueue;
use crate::scheduler::{AppHandle, Scheduler, SchedulerLink};
use crate::{
    get_physical_time, Duration, LevelIx, LogicalTime, PhysicalInstant, ReactionId, ReactorId, Tag, TriggerId,
    ValidationError,
};

/// The lifecycle state of the environment. Transitions are
/// monotonic along the declaration order; every topology-mutating
/// operation is restricted to a specific phase.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub enum Phase {
    Construction,
    Assembly,
    Startup,
    Execution,
    Shutdown,
    Deconstruction,
}

/// Options read once at environment construction.
#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    /// When false, the structural validation checks of the
    /// construction and assembly APIs are skipped.
    pub validate_runtime: bool,
    /// Number of worker threads used to dispatch reactions of
    /// the same topological level. A value of 1 dispatches
    /// sequentially on the scheduler thread.
    pub worker_pool_size: usize,
    /// When true, the scheduler does not wait for physical time
    /// to catch up with the tag of the next event.
    pub fast_forward_logical_time: bool,
    /// When true, an empty event queue makes the scheduler wait
    /// for asynchronous events instead of shutting down.
    pub keep_alive: bool,
    /// Bound on the logical time of the execution, measured from
    /// the start tag.
    pub timeout: Option<Duration>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            validate_runtime: true,
            worker_pool_size: 1,
            fast_forward_logical_time: false,
            keep_alive: false,
            timeout: None,
        }
    }
}

/// A trigger component: a port, or an action (including timers
/// and the startup/shutdown variants). They share one ID space.
pub(crate) struct TriggerEntry {
    #[allow(unused)]
    pub name: String,
    pub fqn: String,
    pub container: ReactorId,
    pub kind: TriggerKind,
}

pub(crate) enum TriggerKind {
    Port(PortData),
    Action(ActionData),
}

pub(crate) type ReactorState = Mutex<Box<dyn Any + Send>>;

/// The top-level coordinator of a reactor program. It owns the
/// whole topology: reactor instances, their elements and their
/// user-defined state, all cross-referenced by IDs. It is also
/// the owner of the current [Phase], which gates every mutation.
///
/// The lifecycle is: create reactors ([Self::register_reactor],
/// `Construction`), declare reactions and bindings
/// ([Self::assemble], `Assembly`), then hand off to the scheduler
/// ([Self::startup], `Execution`).
pub struct Environment {
    pub(crate) options: RuntimeOptions,
    pub(crate) phase: Phase,
    pub(crate) reactors: IndexVec<ReactorId, ReactorEntry>,
    pub(crate) triggers: IndexVec<TriggerId, TriggerEntry>,
    pub(crate) reactions: IndexVec<ReactionId, ReactionEntry>,
    /// User state of each reactor, locked during the dispatch of
    /// its reactions.
    pub(crate) states: IndexVec<ReactorId, ReactorState>,
    pub(crate) assemblers: IndexVec<ReactorId, Option<AssembleFn>>,
    pub(crate) top_level: Vec<ReactorId>,
    pub(crate) top_level_names: HashSet<String>,
    pub(crate) start_time: Option<PhysicalInstant>,
    pub(crate) max_reaction_index: LevelIx,
}

impl Environment {
    pub fn new(options: RuntimeOptions) -> Self {
        Self {
            options,
            phase: Phase::Construction,
            reactors: IndexVec::new(),
            triggers: IndexVec::new(),
            reactions: IndexVec::new(),
            states: IndexVec::new(),
            assemblers: IndexVec::new(),
            top_level: Vec::new(),
            top_level_names: HashSet::new(),
            start_time: None,
            max_reaction_index: LevelIx::ZERO,
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub fn start_time(&self) -> Option<PhysicalInstant> {
        self.start_time
    }

    /// The largest topological index assigned to a reaction.
    /// Only meaningful after [Self::startup].
    #[inline]
    pub fn max_reaction_index(&self) -> LevelIx {
        self.max_reaction_index
    }

    /// Create a top-level reactor and register it with this
    /// environment. The reactor's `construct` hook runs
    /// immediately and may create nested reactors.
    pub fn register_reactor<R: ReactorType>(&mut self, name: &str, params: R::Params) -> Result<(), ValidationError> {
        register_reactor_impl::<R, ()>(self, name, params, None, |_| ()).map(|_| ())
    }

    /// Transition to the `Assembly` phase and run the `assemble`
    /// hook of every reactor, containers before their children.
    /// This is where reactions, their dependencies, and port
    /// bindings are declared.
    pub fn assemble(&mut self) -> Result<(), ValidationError> {
        self.validate_phase(Phase::Construction, "assemble() may only be called during construction phase!")?;
        self.advance_phase(Phase::Assembly);

        // Registration order is a pre-order traversal of the
        // composition tree, so containers assemble first.
        let assemblers = std::mem::take(&mut self.assemblers);
        for (rid, assembler) in assemblers.into_iter_enumerated() {
            let assembler = assembler.expect("reactor was registered without an assembler");
            assembler(self, rid)?;
            let entry = &self.reactors[rid];
            debug!(
                "Assembled {} ({} inputs, {} outputs, {} reactions)",
                entry.fqn,
                entry.inputs.len(),
                entry.outputs.len(),
                entry.reactions.len()
            );
        }
        Ok(())
    }

    /// Build the dependency graph and assign topological indices,
    /// capture the start time, run the startup hooks (timers and
    /// startup actions schedule their first events), and hand off
    /// execution to the scheduler on a dedicated thread.
    ///
    /// Fails with [ValidationError] if reaction priorities are
    /// not unique per reactor or the dependency graph is cyclic;
    /// in the latter case the graph is written in DOT form to a
    /// well-known temp path first.
    pub fn startup(mut self) -> Result<AppHandle, ValidationError> {
        self.validate_phase(Phase::Assembly, "startup() may only be called during assembly phase!")?;

        let graph = DepGraph::build(&self)?;
        match graph.number_reactions_by_level() {
            Ok((levels, max)) => {
                for (rid, level) in levels.into_iter_enumerated() {
                    self.reactions[rid].level = level;
                }
                self.max_reaction_index = max;
            }
            Err(_) => {
                let path = std::env::temp_dir().join("reactor_dependency_graph.dot");
                let zeros: IndexVec<ReactionId, LevelIx> =
                    self.reactions.iter().map(|_| LevelIx::ZERO).collect();
                if let Ok(file) = File::create(&path) {
                    let _ = graph.write_dot(&self, &zeros, &mut BufWriter::new(file));
                    info!("Reaction graph was written to {}", path.display());
                }
                return Err(ValidationError::new(format!(
                    "There is a loop in the dependency graph. Graph was written to {}",
                    path.display()
                )));
            }
        }

        info!("Starting the execution");
        self.advance_phase(Phase::Startup);

        let t0 = get_physical_time();
        self.start_time = Some(t0);
        let start_tag = Tag::from_physical_time(t0);

        let queue = Arc::new(EventQueue::default());
        let time = Arc::new(Mutex::new(LogicalTime::new(t0)));
        self.startup_walk(&queue, start_tag);

        self.advance_phase(Phase::Execution);

        let link = SchedulerLink {
            queue: queue.clone(),
            time: time.clone(),
            physical_stores: Arc::new(self.collect_physical_stores()),
        };
        let scheduler = Scheduler::new(self, queue, time, t0);
        let thread = std::thread::spawn(move || scheduler.run());
        Ok(AppHandle::new(thread, link))
    }

    /// Write the reaction graph in DOT format to the given path.
    /// Reactions are clustered by topological level; on a cyclic
    /// graph all reactions end up in a single cluster, and the
    /// edges still reproduce the graph.
    pub fn export_dependency_graph(&self, path: impl AsRef<Path>) -> Result<(), ValidationError> {
        let path = path.as_ref();
        let graph = DepGraph::build(self)?;
        let levels = graph
            .number_reactions_by_level()
            .map(|(levels, _)| levels)
            .unwrap_or_else(|_| self.reactions.iter().map(|_| LevelIx::ZERO).collect());

        let file = File::create(path)
            .map_err(|e| ValidationError::new(format!("cannot write dependency graph to {}: {}", path.display(), e)))?;
        graph
            .write_dot(self, &levels, &mut BufWriter::new(file))
            .map_err(|e| ValidationError::new(format!("cannot write dependency graph to {}: {}", path.display(), e)))?;
        info!("Reaction graph was written to {}", path.display());
        Ok(())
    }

    /// Transition to `Shutdown`, run the shutdown hooks (shutdown
    /// actions schedule themselves at the microstep following the
    /// current tag), and transition to `Deconstruction`. Called by
    /// the scheduler when a stop has been requested; the final
    /// microstep tag is then the last one processed.
    pub(crate) fn sync_shutdown(&mut self, current: Tag, queue: &EventQueue) {
        if self.phase != Phase::Execution {
            return;
        }
        self.advance_phase(Phase::Shutdown);
        info!("Terminating the execution");
        self.shutdown_walk(queue, current.next_microstep());
        self.advance_phase(Phase::Deconstruction);
    }

    /// Startup recursion, in the order: actions, inputs, outputs,
    /// reactions, contained reactors. Only actions have startup
    /// behavior; timers schedule their first event, startup
    /// actions fire at the start tag itself.
    fn startup_walk(&self, queue: &EventQueue, start_tag: Tag) {
        fn walk(env: &Environment, rid: ReactorId, queue: &EventQueue, start_tag: Tag) {
            debug!("Starting up reactor {}", env.reactors[rid].fqn);
            for &t in &env.reactors[rid].actions {
                if let TriggerKind::Action(action) = &env.triggers[t].kind {
                    match action.kind {
                        ActionKind::Timer { offset, .. } => {
                            let tag = if offset.is_zero() { start_tag } else { start_tag.delay(offset) };
                            queue.push(tag, t);
                        }
                        ActionKind::Startup => queue.push(start_tag, t),
                        _ => {}
                    }
                }
            }
            // inputs, outputs and reactions have no startup hooks
            for &child in &env.reactors[rid].children {
                walk(env, child, queue, start_tag);
            }
        }
        for &top in &self.top_level {
            debug_assert!(self.reactors[top].is_top_level());
            walk(self, top, queue, start_tag);
        }
    }

    /// Shutdown recursion, in the same element order as startup.
    fn shutdown_walk(&self, queue: &EventQueue, shutdown_tag: Tag) {
        fn walk(env: &Environment, rid: ReactorId, queue: &EventQueue, shutdown_tag: Tag) {
            debug!("Terminating reactor {}", env.reactors[rid].fqn);
            for &t in &env.reactors[rid].actions {
                if let TriggerKind::Action(action) = &env.triggers[t].kind {
                    if matches!(action.kind, ActionKind::Shutdown) {
                        queue.push(shutdown_tag, t);
                    }
                }
            }
            for &child in &env.reactors[rid].children {
                walk(env, child, queue, shutdown_tag);
            }
        }
        for &top in &self.top_level {
            walk(self, top, queue, shutdown_tag);
        }
    }

    fn collect_physical_stores(&self) -> HashMap<TriggerId, Arc<dyn ErasedActionStore>> {
        self.triggers
            .iter_enumerated()
            .filter_map(|(id, entry)| match &entry.kind {
                TriggerKind::Action(a) if a.kind.is_physical() => Some((id, a.store.clone())),
                _ => None,
            })
            .collect()
    }
}

/// Validation and lookup helpers.
impl Environment {
    /// Check a structural rule, failing with [ValidationError]
    /// unless validation was disabled in the options.
    pub(crate) fn validate(&self, condition: bool, message: &str) -> Result<(), ValidationError> {
        if self.options.validate_runtime && !condition {
            Err(ValidationError::new(message))
        } else {
            Ok(())
        }
    }

    pub(crate) fn validate_phase(&self, expected: Phase, message: &str) -> Result<(), ValidationError> {
        self.validate(self.phase == expected, message)
    }

    pub(crate) fn advance_phase(&mut self, to: Phase) {
        debug_assert!(self.phase < to, "phase changes are monotonic");
        self.phase = to;
    }

    pub(crate) fn trigger_fqn(&self, id: TriggerId) -> &str {
        &self.triggers[id].fqn
    }

    pub(crate) fn expect_port(&self, id: TriggerId) -> &PortData {
        match &self.triggers[id].kind {
            TriggerKind::Port(p) => p,
            TriggerKind::Action(_) => panic!("{} is not a port", self.triggers[id].fqn),
        }
    }

    pub(crate) fn expect_port_mut(&mut self, id: TriggerId) -> &mut PortData {
        match &mut self.triggers[id].kind {
            TriggerKind::Port(p) => p,
            TriggerKind::Action(_) => panic!("not a port"),
        }
    }

    pub(crate) fn expect_action(&self, id: TriggerId) -> &ActionData {
        match &self.triggers[id].kind {
            TriggerKind::Action(a) => a,
            TriggerKind::Port(_) => panic!("{} is not an action", self.triggers[id].fqn),
        }
    }

    pub(crate) fn expect_action_mut(&mut self, id: TriggerId) -> &mut ActionData {
        match &mut self.triggers[id].kind {
            TriggerKind::Action(a) => a,
            TriggerKind::Port(_) => panic!("not an action"),
        }
    }

    /// Follow the inward-binding chain of a port to the source
    /// port that actually holds the value.
    pub(crate) fn source_of(&self, mut id: TriggerId) -> TriggerId {
        while let TriggerKind::Port(p) = &self.triggers[id].kind {
            match p.inward_binding {
                Some(up) => id = up,
                None => break,
            }
        }
        id
    }
}
