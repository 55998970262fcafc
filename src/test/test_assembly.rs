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

use super::testutil::*;
use crate::*;

struct Empty;

impl ReactorType for Empty {
    type Params = ();

    fn construct(_: &mut ConstructionCtx<'_, Self>, _: ()) -> Result<Self, ValidationError> {
        Ok(Empty)
    }

    fn assemble(&mut self, _: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        Ok(())
    }
}

fn new_env() -> Environment {
    Environment::new(RuntimeOptions::default())
}

#[test]
fn registration_is_gated_to_the_construction_phase() {
    let mut env = new_env();
    env.register_reactor::<Empty>("a", ()).unwrap();
    env.assemble().unwrap();

    let err = env.register_reactor::<Empty>("b", ()).unwrap_err();
    assert!(err.message().contains("construction phase"), "{}", err);
}

#[test]
fn assemble_is_gated_to_the_construction_phase() {
    let mut env = new_env();
    env.register_reactor::<Empty>("a", ()).unwrap();
    env.assemble().unwrap();

    let err = env.assemble().unwrap_err();
    assert!(err.message().contains("construction phase"), "{}", err);
}

#[test]
fn startup_requires_the_assembly_phase() {
    let mut env = new_env();
    env.register_reactor::<Empty>("a", ()).unwrap();

    let err = env.startup().unwrap_err();
    assert!(err.message().contains("assembly phase"), "{}", err);
}

#[test]
fn top_level_names_are_unique() {
    let mut env = new_env();
    env.register_reactor::<Empty>("a", ()).unwrap();

    let err = env.register_reactor::<Empty>("a", ()).unwrap_err();
    assert!(err.message().contains("unique"), "{}", err);
}

struct DupPorts;

impl ReactorType for DupPorts {
    type Params = ();

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, _: ()) -> Result<Self, ValidationError> {
        ctx.new_input_port::<i32>("p")?;
        ctx.new_output_port::<i32>("p")?;
        Ok(DupPorts)
    }

    fn assemble(&mut self, _: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        Ok(())
    }
}

#[test]
fn element_names_are_unique_within_a_container() {
    let mut env = new_env();
    let err = env.register_reactor::<DupPorts>("a", ()).unwrap_err();
    assert!(err.message().contains("unique"), "{}", err);
}

#[test]
fn duplicate_names_pass_when_validation_is_disabled() {
    let mut env = Environment::new(RuntimeOptions { validate_runtime: false, ..RuntimeOptions::default() });
    assert!(env.register_reactor::<DupPorts>("a", ()).is_ok());
}

struct ZeroPriority;

impl ReactorType for ZeroPriority {
    type Params = ();

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, _: ()) -> Result<Self, ValidationError> {
        ctx.new_reaction("r", 0, |_: &mut Self, _| {})?;
        Ok(ZeroPriority)
    }

    fn assemble(&mut self, _: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        Ok(())
    }
}

#[test]
fn reaction_priority_may_not_be_zero() {
    let mut env = new_env();
    let err = env.register_reactor::<ZeroPriority>("a", ()).unwrap_err();
    assert!(err.message().contains("zero"), "{}", err);
}

struct DupPriority;

impl ReactorType for DupPriority {
    type Params = ();

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, _: ()) -> Result<Self, ValidationError> {
        ctx.new_reaction("r1", 1, |_: &mut Self, _| {})?;
        ctx.new_reaction("r2", 1, |_: &mut Self, _| {})?;
        Ok(DupPriority)
    }

    fn assemble(&mut self, _: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        Ok(())
    }
}

#[test]
fn reaction_priorities_are_unique_within_a_reactor() {
    let mut env = new_env();
    let err = env.register_reactor::<DupPriority>("a", ()).unwrap_err();
    assert!(err.message().contains("unique"), "{}", err);
}

/// Two producers bound into the same consumer input.
struct DoubleBind {
    p1: TypedPortKey<i32>,
    p2: TypedPortKey<i32>,
    c: TypedPortKey<i32>,
}

impl ReactorType for DoubleBind {
    type Params = SharedLog<i32>;

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, log: Self::Params) -> Result<Self, ValidationError> {
        Ok(Self {
            p1: ctx.with_child::<Producer, _>("p1", 1, |p| p.out)?,
            p2: ctx.with_child::<Producer, _>("p2", 2, |p| p.out)?,
            c: ctx.with_child::<Consumer, _>("c", log, |c| c.input)?,
        })
    }

    fn assemble(&mut self, ctx: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        ctx.bind_ports(self.p1, self.c)?;
        ctx.bind_ports(self.p2, self.c)
    }
}

#[test]
fn a_port_may_only_be_bound_once() {
    let mut env = new_env();
    env.register_reactor::<DoubleBind>("app", new_log()).unwrap();
    let err = env.assemble().unwrap_err();
    assert!(err.message().contains("connected once"), "{}", err);
}

/// Binds an output of a child to an input of the same child.
struct SelfLevelBind {
    node: (TypedPortKey<i32>, TypedPortKey<i32>),
}

impl ReactorType for SelfLevelBind {
    type Params = ();

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, _: ()) -> Result<Self, ValidationError> {
        Ok(Self { node: ctx.with_child::<RingNode, _>("n", (), |n| (n.input, n.out))? })
    }

    fn assemble(&mut self, ctx: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        let (input, out) = self.node;
        ctx.bind_ports(out, input)
    }
}

#[test]
fn an_output_may_not_be_bound_to_an_input_of_the_same_reactor() {
    let mut env = new_env();
    env.register_reactor::<SelfLevelBind>("app", ()).unwrap();
    let err = env.assemble().unwrap_err();
    assert!(err.message().contains("different reactors"), "{}", err);
}

/// Binds an input to an output, which is never legal.
struct BackwardsBind {
    a: (TypedPortKey<i32>, TypedPortKey<i32>),
    b: (TypedPortKey<i32>, TypedPortKey<i32>),
}

impl ReactorType for BackwardsBind {
    type Params = ();

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, _: ()) -> Result<Self, ValidationError> {
        Ok(Self {
            a: ctx.with_child::<RingNode, _>("a", (), |n| (n.input, n.out))?,
            b: ctx.with_child::<RingNode, _>("b", (), |n| (n.input, n.out))?,
        })
    }

    fn assemble(&mut self, ctx: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        let (a_in, _) = self.a;
        let (_, b_out) = self.b;
        ctx.bind_ports(a_in, b_out)
    }
}

#[test]
fn an_input_may_not_be_bound_to_an_output() {
    let mut env = new_env();
    env.register_reactor::<BackwardsBind>("app", ()).unwrap();
    let err = env.assemble().unwrap_err();
    assert!(err.message().contains("may not be bound"), "{}", err);
}

/// A reaction of one child declares a trigger on the output of a
/// sibling, which violates the containment rule.
struct ForeignTriggerApp;

impl ReactorType for ForeignTriggerApp {
    type Params = ();

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, _: ()) -> Result<Self, ValidationError> {
        let out = ctx.with_child::<Producer, _>("p", 1, |p| p.out)?;
        ctx.with_child::<Sibling, _>("s", out, |_| ())?;
        Ok(ForeignTriggerApp)
    }

    fn assemble(&mut self, _: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        Ok(())
    }
}

struct Sibling {
    r: ReactionKey,
    foreign: TypedPortKey<i32>,
}

impl ReactorType for Sibling {
    type Params = TypedPortKey<i32>;

    fn construct(ctx: &mut ConstructionCtx<'_, Self>, foreign: Self::Params) -> Result<Self, ValidationError> {
        Ok(Self { r: ctx.new_reaction("r", 1, |_: &mut Self, _| {})?, foreign })
    }

    fn assemble(&mut self, ctx: &mut AssemblyCtx<'_, Self>) -> Result<(), ValidationError> {
        ctx.declare_trigger(self.r, &self.foreign)
    }
}

#[test]
fn triggers_respect_the_containment_rules() {
    let mut env = new_env();
    env.register_reactor::<ForeignTriggerApp>("app", ()).unwrap();
    let err = env.assemble().unwrap_err();
    assert!(err.message().contains("contained reactor"), "{}", err);
}
