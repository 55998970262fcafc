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

use std::sync::{Arc, Mutex};

use crate::{
    AssemblyCtx, ConstructionCtx, Duration, Offset, ReactionKey, ReactorType, RuntimeOptions, StartupActionKey,
    TypedPortKey, ValidationError,
};

/// A log shared between reaction bodies and the test harness,
/// used to assert on execution order.
pub type SharedLog<T> = Arc<Mutex<Vec<T>>>;

pub fn new_log<T>() -> SharedLog<T> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn push<T>(log: &SharedLog<T>, value: T) {
    log.lock().unwrap().push(value)
}

pub fn snapshot<T: Clone>(log: &SharedLog<T>) -> Vec<T> {
    log.lock().unwrap().clone()
}

/// Options for tests that simulate logical time: don't wait for
/// physical time, and bound the execution.
pub fn fast_options(timeout: Duration) -> RuntimeOptions {
    RuntimeOptions {
        fast_forward_logical_time: true,
        timeout: Some(timeout),
        ..RuntimeOptions::default()
    }
}

/// Writes a fixed value to its output when the program starts.
pub struct Producer {
    pub out: TypedPortKey<i32>,
    pub emit: ReactionKey,
    startup: StartupActionKey,
    value: i32,
}

impl ReactorType for Producer {
    type Params = i32;

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, value: i32) -> Result<Self, ValidationError> {
        Ok(Self {
            out: ctx.new_output_port("out")?,
            startup: ctx.new_startup_action("startup")?,
            emit: ctx.new_reaction("emit", 1, |me: &mut Self, ctx| ctx.set(me.out, me.value))?,
            value,
        })
    }

    fn assemble(&mut self, ctx: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        ctx.declare_trigger(self.emit, &self.startup)?;
        ctx.declare_antidependency(self.emit, self.out)
    }
}

/// Appends every value observed on its input to a shared log.
pub struct Consumer {
    pub input: TypedPortKey<i32>,
    pub recv: ReactionKey,
    log: SharedLog<i32>,
}

impl ReactorType for Consumer {
    type Params = SharedLog<i32>;

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, log: SharedLog<i32>) -> Result<Self, ValidationError> {
        Ok(Self {
            input: ctx.new_input_port("input")?,
            recv: ctx.new_reaction("recv", 1, |me: &mut Self, ctx| {
                if let Some(v) = ctx.get(me.input) {
                    push(&me.log, v);
                }
            })?,
            log,
        })
    }

    fn assemble(&mut self, ctx: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        ctx.declare_trigger(self.recv, &self.input)
    }
}

/// A [Producer] bound into a [Consumer]: the zero-delay chain.
pub struct ChainApp {
    pub p_out: TypedPortKey<i32>,
    pub p_emit: ReactionKey,
    pub c_in: TypedPortKey<i32>,
    pub c_recv: ReactionKey,
}

impl ReactorType for ChainApp {
    type Params = SharedLog<i32>;

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, log: Self::Params) -> Result<Self, ValidationError> {
        let (p_out, p_emit) = ctx.with_child::<Producer, _>("producer", 42, |p| (p.out, p.emit))?;
        let (c_in, c_recv) = ctx.with_child::<Consumer, _>("consumer", log, |c| (c.input, c.recv))?;
        Ok(Self { p_out, p_emit, c_in, c_recv })
    }

    fn assemble(&mut self, ctx: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        ctx.bind_ports(self.p_out, self.c_in)
    }
}

/// Two reactions triggered by the same startup action. The
/// priority-edge rule makes the reaction with the greater
/// priority value fire first.
pub struct PriorityPair {
    startup: StartupActionKey,
    pub r1: ReactionKey,
    pub r2: ReactionKey,
    log: SharedLog<&'static str>,
}

impl ReactorType for PriorityPair {
    type Params = SharedLog<&'static str>;

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, log: Self::Params) -> Result<Self, ValidationError> {
        Ok(Self {
            startup: ctx.new_startup_action("startup")?,
            r1: ctx.new_reaction("r1", 1, |me: &mut Self, _| push(&me.log, "R1"))?,
            r2: ctx.new_reaction("r2", 2, |me: &mut Self, _| push(&me.log, "R2"))?,
            log,
        })
    }

    fn assemble(&mut self, ctx: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        ctx.declare_trigger(self.r1, &self.startup)?;
        ctx.declare_trigger(self.r2, &self.startup)
    }
}

/// Forwards its input to its output through a reaction. Three of
/// these bound in a ring make the dependency graph cyclic.
pub struct RingNode {
    pub input: TypedPortKey<i32>,
    pub out: TypedPortKey<i32>,
    pub relay: ReactionKey,
}

impl ReactorType for RingNode {
    type Params = ();

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, _: ()) -> Result<Self, ValidationError> {
        Ok(Self {
            input: ctx.new_input_port("input")?,
            out: ctx.new_output_port("out")?,
            relay: ctx.new_reaction("relay", 1, |me: &mut Self, ctx| {
                if let Some(v) = ctx.get(me.input) {
                    ctx.set(me.out, v);
                }
            })?,
        })
    }

    fn assemble(&mut self, ctx: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        ctx.declare_trigger(self.relay, &self.input)?;
        ctx.declare_antidependency(self.relay, self.out)
    }
}

/// Three [RingNode]s bound in a cycle: a -> b -> c -> a.
pub struct RingApp {
    ports: [(TypedPortKey<i32>, TypedPortKey<i32>); 3],
}

impl ReactorType for RingApp {
    type Params = ();

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, _: ()) -> Result<Self, ValidationError> {
        let a = ctx.with_child::<RingNode, _>("a", (), |n| (n.input, n.out))?;
        let b = ctx.with_child::<RingNode, _>("b", (), |n| (n.input, n.out))?;
        let c = ctx.with_child::<RingNode, _>("c", (), |n| (n.input, n.out))?;
        Ok(Self { ports: [a, b, c] })
    }

    fn assemble(&mut self, ctx: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        let [(a_in, a_out), (b_in, b_out), (c_in, c_out)] = self.ports;
        ctx.bind_ports(a_out, b_in)?;
        ctx.bind_ports(b_out, c_in)?;
        ctx.bind_ports(c_out, a_in)
    }
}

/// Schedules a logical action in a loop, one microstep at a
/// time, logging the payload and microstep of every firing.
pub struct MicrostepCounter {
    startup: StartupActionKey,
    act: crate::TypedActionKey<u32>,
    kick: ReactionKey,
    count: ReactionKey,
    pub log: SharedLog<(u32, crate::MicroStep)>,
    limit: u32,
}

impl ReactorType for MicrostepCounter {
    type Params = (SharedLog<(u32, crate::MicroStep)>, u32);

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, (log, limit): Self::Params) -> Result<Self, ValidationError> {
        Ok(Self {
            startup: ctx.new_startup_action("startup")?,
            act: ctx.new_logical_action("act", None)?,
            kick: ctx.new_reaction("kick", 1, |me: &mut Self, ctx| {
                ctx.schedule_with(me.act, Some(0), Offset::Asap)
            })?,
            count: ctx.new_reaction("count", 2, |me: &mut Self, ctx| {
                if let Some(n) = ctx.get_action(&me.act) {
                    push(&me.log, (n, ctx.get_tag().microstep()));
                    if n + 1 < me.limit {
                        ctx.schedule_with(me.act, Some(n + 1), Offset::Asap);
                    }
                }
            })?,
            log,
            limit,
        })
    }

    fn assemble(&mut self, ctx: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        ctx.declare_trigger(self.kick, &self.startup)?;
        ctx.declare_schedulable_action(self.kick, self.act)?;
        ctx.declare_trigger(self.count, &self.act)?;
        ctx.declare_schedulable_action(self.count, self.act)
    }
}
