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
use std::marker::PhantomData;
use std::sync::Mutex;

use crate::actions::{ActionData, ActionKind};
use crate::environment::{TriggerEntry, TriggerKind};
use crate::ports::{PortData, PortDirection};
use crate::reactions::{BodyFn, Deadline, ReactionEntry};
use crate::reactor::ReactorEntry;
use crate::scheduler::ReactionCtx;
use crate::{
    Duration, Environment, Phase, PhysicalActionKey, ReactionKey, ReactorId, ShutdownActionKey, StartupActionKey,
    TimerKey, TriggerId, TriggerLike, TypedActionKey, TypedPortKey, ValidationError,
};

/// A user-defined reactor class. The two hooks are driven by the
/// [Environment](crate::Environment): `construct` runs in the
/// `Construction` phase and creates the components of the
/// reactor (including child reactors); `assemble` runs in the
/// `Assembly` phase and declares reactions and port bindings.
///
/// State variables are ordinary fields of the implementing type;
/// reaction bodies receive `&mut self` together with a
/// [ReactionCtx] to read ports, write ports, and schedule
/// actions.
pub trait ReactorType: Send + 'static {
    /// Construction parameters, supplied on registration and
    /// passed to [Self::construct].
    type Params;

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, params: Self::Params) -> Result<Self, ValidationError>
    where
        Self: Sized;

    fn assemble(&mut self, ctx: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError>
    where
        Self: Sized;
}

/// Type-erased `assemble` hook, stored at registration and
/// drained by [Environment::assemble].
pub(crate) type AssembleFn =
    Box<dyn FnOnce(&mut Environment, ReactorId) -> Result<(), ValidationError> + Send + Sync>;

fn erase_body<R: ReactorType>(f: impl Fn(&mut R, &mut ReactionCtx<'_>) + Send + Sync + 'static) -> BodyFn {
    Box::new(move |state, ctx| {
        let state = state.downcast_mut::<R>().expect("reactor state has the wrong type");
        f(state, ctx)
    })
}

/// Create a reactor entry, run the class's `construct` hook, and
/// attach the resulting state. Children are registered before
/// their construct hook returns, so the arena order is a
/// pre-order traversal of the composition tree.
pub(crate) fn register_reactor_impl<R: ReactorType, K>(
    env: &mut Environment,
    name: &str,
    params: R::Params,
    container: Option<ReactorId>,
    extract: impl FnOnce(&R) -> K,
) -> Result<K, ValidationError> {
    env.validate_phase(Phase::Construction, "Reactors may only be registered during construction phase!")?;

    let fqn = match container {
        Some(parent) => {
            let unique = env.reactors[parent].element_names.insert(name.to_string());
            env.validate(unique, "element names must be unique within their container")?;
            format!("{}.{}", env.reactors[parent].fqn, name)
        }
        None => {
            let unique = env.top_level_names.insert(name.to_string());
            env.validate(unique, "top-level reactor names must be unique")?;
            name.to_string()
        }
    };

    let id = env.reactors.push(ReactorEntry::new(name.to_string(), fqn, container));
    let state_id = env.states.push(Mutex::new(Box::new(()) as Box<dyn Any + Send>));
    let asm_id = env.assemblers.push(None);
    debug_assert_eq!(id, state_id);
    debug_assert_eq!(id, asm_id);

    match container {
        Some(parent) => env.reactors[parent].children.push(id),
        None => env.top_level.push(id),
    }

    let mut ctx = ConstructionCtx { env: &mut *env, reactor: id, _marker: PhantomData };
    let state = R::construct(&mut ctx, params)?;
    let result = extract(&state);

    *env.states[id].get_mut().unwrap() = Box::new(state);
    env.assemblers[id] = Some(Box::new(move |env: &mut Environment, rid: ReactorId| {
        let mut state = std::mem::replace(
            env.states[rid].get_mut().unwrap(),
            Box::new(()) as Box<dyn Any + Send>,
        );
        let result = {
            let typed = state.downcast_mut::<R>().expect("reactor state has the wrong type");
            let mut ctx = AssemblyCtx { env: &mut *env, reactor: rid, _marker: PhantomData };
            typed.assemble(&mut ctx)
        };
        *env.states[rid].get_mut().unwrap() = state;
        result
    }));
    Ok(result)
}

/// The API available to [ReactorType::construct]. Registers
/// components with the reactor under construction; all operations
/// require the `Construction` phase.
pub struct ConstructionCtx<'x, R: ?Sized> {
    env: &'x mut Environment,
    reactor: ReactorId,
    _marker: PhantomData<fn(&mut R)>,
}

impl<R: ReactorType> ConstructionCtx<'_, R> {
    /// The ID of the reactor under construction.
    pub fn reactor_id(&self) -> ReactorId {
        self.reactor
    }

    pub fn new_input_port<T: Send + Sync + 'static>(&mut self, name: &str) -> Result<TypedPortKey<T>, ValidationError> {
        self.new_port_impl::<T>(name, PortDirection::Input).map(TypedPortKey::new)
    }

    pub fn new_output_port<T: Send + Sync + 'static>(&mut self, name: &str) -> Result<TypedPortKey<T>, ValidationError> {
        self.new_port_impl::<T>(name, PortDirection::Output).map(TypedPortKey::new)
    }

    /// Create a logical action with the given minimum delay.
    /// Scheduling it from a reaction at tag `t` produces an event
    /// at `t.delay(max(min_delay, requested_delay))`.
    pub fn new_logical_action<T: Send + Sync + 'static>(
        &mut self,
        name: &str,
        min_delay: Option<Duration>,
    ) -> Result<TypedActionKey<T>, ValidationError> {
        let kind = ActionKind::Logical { min_delay: min_delay.unwrap_or(Duration::ZERO) };
        self.new_action_impl::<T>(name, kind).map(TypedActionKey::new)
    }

    /// Create a physical action, schedulable from any thread
    /// through a [SchedulerLink](crate::SchedulerLink).
    pub fn new_physical_action<T: Send + Sync + 'static>(
        &mut self,
        name: &str,
    ) -> Result<PhysicalActionKey<T>, ValidationError> {
        self.new_action_impl::<T>(name, ActionKind::Physical).map(PhysicalActionKey::new)
    }

    /// Create a timer. It first fires at `start_tag.delay(offset)`
    /// (at the start tag itself for a zero offset), then again
    /// every `period`, unless the period is zero.
    pub fn new_timer(&mut self, name: &str, offset: Duration, period: Duration) -> Result<TimerKey, ValidationError> {
        self.new_action_impl::<()>(name, ActionKind::Timer { offset, period }).map(TimerKey::new)
    }

    /// Create a startup action, which fires once at the start tag.
    pub fn new_startup_action(&mut self, name: &str) -> Result<StartupActionKey, ValidationError> {
        self.new_action_impl::<()>(name, ActionKind::Startup).map(StartupActionKey::new)
    }

    /// Create a shutdown action, which fires once at the microstep
    /// following the shutdown request.
    pub fn new_shutdown_action(&mut self, name: &str) -> Result<ShutdownActionKey, ValidationError> {
        self.new_action_impl::<()>(name, ActionKind::Shutdown).map(ShutdownActionKey::new)
    }

    /// Create a reaction with the given user priority and body.
    /// Priorities are positive and unique among the reactions of
    /// one reactor. Triggers and dependencies are declared later,
    /// in [ReactorType::assemble].
    pub fn new_reaction(
        &mut self,
        name: &str,
        priority: u32,
        body: impl Fn(&mut R, &mut ReactionCtx<'_>) + Send + Sync + 'static,
    ) -> Result<ReactionKey, ValidationError> {
        let fqn = self.register_element_name(name)?;
        self.env.validate(priority != 0, "reaction priorities must not be zero")?;
        let duplicate = self.env.reactors[self.reactor]
            .reactions
            .iter()
            .any(|&r| self.env.reactions[r].priority == priority);
        self.env
            .validate(!duplicate, "priorities must be unique for all reactions of the same reactor")?;

        let id = self.env.reactions.push(ReactionEntry::new(
            name.to_string(),
            fqn,
            self.reactor,
            priority,
            erase_body::<R>(body),
        ));
        self.env.reactors[self.reactor].reactions.push(id);
        Ok(ReactionKey::new(id))
    }

    /// Construct a child reactor of class `Sub` and register it
    /// with the reactor under construction. The parent keeps no
    /// ownership of the child's state; `extract` lets it copy out
    /// the child's public keys (they are all `Copy`) so that it
    /// can bind ports or declare triggers on them later.
    pub fn with_child<Sub: ReactorType, K>(
        &mut self,
        name: &str,
        params: Sub::Params,
        extract: impl FnOnce(&Sub) -> K,
    ) -> Result<K, ValidationError> {
        info!("Assembling {}", name);
        register_reactor_impl::<Sub, K>(self.env, name, params, Some(self.reactor), extract)
    }

    fn new_port_impl<T: Send + Sync + 'static>(
        &mut self,
        name: &str,
        direction: PortDirection,
    ) -> Result<TriggerId, ValidationError> {
        let fqn = self.register_element_name(name)?;
        let id = self.env.triggers.push(TriggerEntry {
            name: name.to_string(),
            fqn,
            container: self.reactor,
            kind: TriggerKind::Port(PortData::new::<T>(direction)),
        });
        let reactor = &mut self.env.reactors[self.reactor];
        match direction {
            PortDirection::Input => reactor.inputs.push(id),
            PortDirection::Output => reactor.outputs.push(id),
        }
        Ok(id)
    }

    fn new_action_impl<T: Send + Sync + 'static>(
        &mut self,
        name: &str,
        kind: ActionKind,
    ) -> Result<TriggerId, ValidationError> {
        let fqn = self.register_element_name(name)?;
        let id = self.env.triggers.push(TriggerEntry {
            name: name.to_string(),
            fqn,
            container: self.reactor,
            kind: TriggerKind::Action(ActionData::new::<T>(kind)),
        });
        self.env.reactors[self.reactor].actions.push(id);
        Ok(id)
    }

    /// Common element registration: phase check, name uniqueness
    /// within the container, FQN derivation.
    fn register_element_name(&mut self, name: &str) -> Result<String, ValidationError> {
        self.env
            .validate_phase(Phase::Construction, "Reactor elements can only be created during construction phase!")?;
        let reactor = &mut self.env.reactors[self.reactor];
        let unique = reactor.element_names.insert(name.to_string());
        self.env.validate(unique, "element names must be unique within their container")?;
        Ok(format!("{}.{}", self.env.reactors[self.reactor].fqn, name))
    }
}

/// The API available to [ReactorType::assemble]. Declarations
/// attach edges to the dependency graph; all operations require
/// the `Assembly` phase.
pub struct AssemblyCtx<'x, R: ?Sized> {
    env: &'x mut Environment,
    reactor: ReactorId,
    _marker: PhantomData<fn(&mut R)>,
}

impl<R: ReactorType> AssemblyCtx<'_, R> {
    /// Declare that the reaction fires when the given trigger
    /// (action or port) becomes present.
    ///
    /// Actions must belong to the same reactor as the reaction.
    /// Port triggers follow the dependency containment rule: an
    /// input of the same reactor, or an output of a contained
    /// reactor.
    pub fn declare_trigger(&mut self, reaction: ReactionKey, trigger: &impl TriggerLike) -> Result<(), ValidationError> {
        let rid = reaction.id;
        let tid = trigger.trigger_id();
        self.check_reaction(reaction)?;
        if matches!(self.env.triggers[tid].kind, TriggerKind::Action(_)) {
            self.env
                .validate_phase(Phase::Assembly, "Triggers may only be declared during assembly phase!")?;
            self.env.validate(
                self.env.triggers[tid].container == self.reactor,
                "Action triggers must belong to the same reactor as the triggered reaction",
            )?;
            self.env.reactions[rid].action_triggers.push(tid);
            self.env.expect_action_mut(tid).triggers.push(rid);
        } else {
            self.register_port_dependency(rid, tid, true)?;
            self.env.reactions[rid].port_triggers.push(tid);
        }
        Ok(())
    }

    /// Declare that the reaction reads the given port, without
    /// firing when it is set.
    pub fn declare_dependency<T>(
        &mut self,
        reaction: ReactionKey,
        port: TypedPortKey<T>,
    ) -> Result<(), ValidationError> {
        self.check_reaction(reaction)?;
        self.register_port_dependency(reaction.id, port.trigger_id(), false)
    }

    /// Declare that the reaction writes the given port: an output
    /// of the same reactor, or an input of a contained reactor.
    pub fn declare_antidependency<T>(
        &mut self,
        reaction: ReactionKey,
        port: TypedPortKey<T>,
    ) -> Result<(), ValidationError> {
        self.check_reaction(reaction)?;
        let rid = reaction.id;
        let tid = port.trigger_id();
        self.env
            .validate_phase(Phase::Assembly, "Antidependencies may only be declared during assembly phase!")?;
        let data = self.env.expect_port(tid);
        let container = self.env.triggers[tid].container;
        self.env.validate(
            !data.has_inward_binding(),
            "Antidependencies may not be declared on ports with an inward binding!",
        )?;
        if data.is_input() {
            self.env.validate(
                self.env.reactors[container].container == Some(self.reactor),
                "Antidependent input ports must belong to a contained reactor",
            )?;
        } else {
            self.env.validate(
                container == self.reactor,
                "Antidependent output ports must belong to the same reactor as the reaction",
            )?;
        }
        self.env.reactions[rid].antidependencies.push(tid);
        self.env.expect_port_mut(tid).antidependencies.push(rid);
        Ok(())
    }

    /// Declare that the reaction may schedule the given action.
    /// Only logical actions of the same reactor qualify.
    pub fn declare_schedulable_action<T>(
        &mut self,
        reaction: ReactionKey,
        action: TypedActionKey<T>,
    ) -> Result<(), ValidationError> {
        self.check_reaction(reaction)?;
        let rid = reaction.id;
        let tid = action.trigger_id();
        self.env
            .validate_phase(Phase::Assembly, "Schedulable actions may only be declared during assembly phase!")?;
        let data = self.env.expect_action(tid);
        self.env
            .validate(data.kind.is_logical(), "only logical actions can be scheduled by a reaction!")?;
        self.env.validate(
            self.env.triggers[tid].container == self.reactor,
            "Schedulable actions must belong to the same reactor as the scheduling reaction",
        )?;
        self.env.reactions[rid].schedulable_actions.push(tid);
        self.env.expect_action_mut(tid).schedulers.push(rid);
        Ok(())
    }

    /// Attach a deadline to the reaction. At dispatch, if physical
    /// time lags behind the logical time point by more than the
    /// given duration, the handler runs in place of the body.
    pub fn set_deadline(
        &mut self,
        reaction: ReactionKey,
        duration: Duration,
        handler: impl Fn(&mut R, &mut ReactionCtx<'_>) + Send + Sync + 'static,
    ) -> Result<(), ValidationError> {
        self.check_reaction(reaction)?;
        self.env
            .validate_phase(Phase::Assembly, "Deadlines may only be declared during assembly phase!")?;
        let entry = &mut self.env.reactions[reaction.id];
        debug_assert!(entry.deadline.is_none(), "deadline is already set");
        entry.deadline = Some(Deadline { duration, handler: erase_body::<R>(handler) });
        Ok(())
    }

    /// Bind two ports: the downstream port mirrors the value of
    /// the upstream port, logically instantaneously. A port may
    /// have at most one inward binding, and binding chains may
    /// not form cycles.
    ///
    /// The legal shapes, relative to the reactor hierarchy, are:
    /// output to input of sibling reactors, input of a reactor to
    /// an input of one of its children, and output of a child to
    /// an output of its parent.
    pub fn bind_ports<T>(&mut self, upstream: TypedPortKey<T>, downstream: TypedPortKey<T>) -> Result<(), ValidationError> {
        let up = upstream.trigger_id();
        let down = downstream.trigger_id();
        let env = &mut *self.env;
        env.validate_phase(Phase::Assembly, "Ports may only be bound during assembly phase!")?;
        env.validate(up != down, "a port may not be bound to itself")?;

        let up_data = env.expect_port(up);
        let down_data = env.expect_port(down);
        env.validate(!down_data.has_inward_binding(), "Ports may only be connected once")?;

        let up_container = env.triggers[up].container;
        let down_container = env.triggers[down].container;
        if !up_data.is_input() && down_data.is_input() {
            env.validate(
                env.reactors[up_container].container == env.reactors[down_container].container,
                "An output port can only be bound to an input port if both ports belong to reactors in the same hierarchical level",
            )?;
            env.validate(
                up_container != down_container,
                "An output port can only be bound to an input port if both ports belong to different reactors!",
            )?;
        } else if up_data.is_input() && down_data.is_input() {
            env.validate(
                env.reactors[down_container].container == Some(up_container),
                "An input port A may only be bound to another input port B if B is contained by a reactor that in turn is contained by the reactor of A",
            )?;
        } else if !up_data.is_input() && !down_data.is_input() {
            env.validate(
                env.reactors[up_container].container == Some(down_container),
                "An output port A may only be bound to another output port B if A is contained by a reactor that in turn is contained by the reactor of B",
            )?;
        } else {
            return Err(ValidationError::new("An input port may not be bound to an output port"));
        }

        // A cycle would make the inward chain of `up` pass
        // through `down`.
        let mut probe = up;
        loop {
            env.validate(probe != down, "port bindings may not form a cycle")?;
            match env.expect_port(probe).inward_binding {
                Some(next) => probe = next,
                None => break,
            }
        }

        env.expect_port_mut(down).inward_binding = Some(up);
        env.expect_port_mut(up).outward_bindings.push(down);
        Ok(())
    }

    /// Shared path of [Self::declare_trigger] (for ports) and
    /// [Self::declare_dependency].
    fn register_port_dependency(
        &mut self,
        rid: crate::ReactionId,
        tid: TriggerId,
        is_trigger: bool,
    ) -> Result<(), ValidationError> {
        self.env
            .validate_phase(Phase::Assembly, "Dependencies may only be declared during assembly phase!")?;
        let data = self.env.expect_port(tid);
        let container = self.env.triggers[tid].container;
        if data.is_input() {
            self.env.validate(
                container == self.reactor,
                "Dependent input ports must belong to the same reactor as the reaction",
            )?;
        } else {
            self.env.validate(
                self.env.reactors[container].container == Some(self.reactor),
                "Dependent output ports must belong to a contained reactor",
            )?;
        }
        self.env.reactions[rid].dependencies.push(tid);
        let port = self.env.expect_port_mut(tid);
        port.dependencies.push(rid);
        if is_trigger {
            port.triggers.push(rid);
        }
        Ok(())
    }

    fn check_reaction(&self, reaction: ReactionKey) -> Result<(), ValidationError> {
        self.env.validate(
            self.env.reactions[reaction.id].container == self.reactor,
            "declarations may only be made on reactions of the assembling reactor",
        )
    }
}
