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
use std::fmt::{Debug, Formatter};

use crate::scheduler::ReactionCtx;
use crate::{Duration, LevelIx, ReactionId, ReactorId, TriggerId};

/// A reference to a reaction, handed out when the reaction is
/// created and used for the declarations of the assembly phase.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ReactionKey {
    pub(crate) id: ReactionId,
}

impl ReactionKey {
    pub(crate) fn new(id: ReactionId) -> Self {
        Self { id }
    }
}

impl Debug for ReactionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Reaction({})", self.id)
    }
}

/// Type-erased reaction body. The first parameter is the state
/// of the owning reactor; the wrapper created at registration
/// downcasts it to the concrete reactor type.
pub(crate) type BodyFn = Box<dyn Fn(&mut dyn Any, &mut ReactionCtx<'_>) + Send + Sync>;

/// A deadline constrains how far physical time may lag behind
/// the logical time of a reaction's dispatch. When violated, the
/// handler runs in place of the body. Missed deadlines are not
/// errors.
pub(crate) struct Deadline {
    pub duration: Duration,
    pub handler: BodyFn,
}

/// The unit of scheduling. Bodies are user code; everything else
/// here is structural data used to build the dependency graph
/// and order dispatch.
pub(crate) struct ReactionEntry {
    #[allow(unused)]
    pub name: String,
    pub fqn: String,
    pub container: ReactorId,
    /// User-chosen priority, unique among the reactions of the
    /// containing reactor, and never zero.
    pub priority: u32,
    /// Topological index assigned at startup. Reactions at a
    /// lower level complete before any higher-level reaction of
    /// the same tag starts.
    pub level: LevelIx,
    pub body: BodyFn,
    pub deadline: Option<Deadline>,
    pub action_triggers: Vec<TriggerId>,
    pub port_triggers: Vec<TriggerId>,
    /// Ports this reaction reads, including the port triggers.
    pub dependencies: Vec<TriggerId>,
    /// Ports this reaction writes.
    pub antidependencies: Vec<TriggerId>,
    pub schedulable_actions: Vec<TriggerId>,
}

impl ReactionEntry {
    pub fn new(name: String, fqn: String, container: ReactorId, priority: u32, body: BodyFn) -> Self {
        Self {
            name,
            fqn,
            container,
            priority,
            level: LevelIx::ZERO,
            body,
            deadline: None,
            action_triggers: Vec::new(),
            port_triggers: Vec::new(),
            dependencies: Vec::new(),
            antidependencies: Vec::new(),
            schedulable_actions: Vec::new(),
        }
    }

    /// Whether this reaction declared read access to the trigger.
    pub fn may_read(&self, trigger: TriggerId) -> bool {
        self.port_triggers.contains(&trigger)
            || self.action_triggers.contains(&trigger)
            || self.dependencies.contains(&trigger)
            || self.schedulable_actions.contains(&trigger)
    }

    /// Whether this reaction declared the port as an
    /// antidependency.
    pub fn may_write(&self, port: TriggerId) -> bool {
        self.antidependencies.contains(&port)
    }

    /// Whether this reaction declared the action as schedulable.
    pub fn may_schedule(&self, action: TriggerId) -> bool {
        self.schedulable_actions.contains(&action)
    }
}
