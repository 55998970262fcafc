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

//! A deterministic, reactor-oriented discrete-event runtime.
//!
//! A program is a hierarchy of *reactors*: stateful components
//! containing *ports*, *actions*, and *reactions*. Reactions fire
//! in response to events on their declared triggers, read and
//! write ports, and schedule new events on logical actions; the
//! scheduler orders everything on a logical timeline of [Tag]s.
//! Given the same external stimuli, reactions fire at the same
//! tags and in the same relative order across runs.
//!
//! Unlike runtimes backed by a code generator, the topology here
//! is assembled at runtime: reactor classes implement
//! [ReactorType], create their components in `construct`, and
//! declare reactions and port bindings in `assemble`. The
//! [Environment] owns the whole topology and drives the lifecycle
//! phases; [Environment::startup] hands execution off to the
//! scheduler on a dedicated thread.

#[macro_use]
extern crate index_vec;
#[macro_use]
extern crate log;

#[cfg(test)]
pub mod test;

pub use self::actions::{
    ActionKey, PhysicalActionKey, ShutdownActionKey, StartupActionKey, TimerKey, TypedActionKey,
};
pub use self::assembly::{AssemblyCtx, ConstructionCtx, ReactorType};
pub use self::environment::{Environment, Phase, RuntimeOptions};
pub use self::error::ValidationError;
pub use self::ids::{LevelIx, ReactionId, ReactorId, TriggerId};
pub use self::ports::{PortDirection, TriggerLike, TypedPortKey};
pub use self::reactions::ReactionKey;
pub use self::scheduler::{AppHandle, ReactionCtx, SchedulerLink};
pub use self::time::{get_physical_time, LogicalTime, MicroStep, Tag};
pub use self::util::Offset;

// reexported to complement our logical time primitives
pub use std::time::Duration;
pub use std::time::Instant as PhysicalInstant;

mod actions;
mod assembly;
mod environment;
mod error;
mod ids;
mod ports;
mod reactions;
mod reactor;
mod scheduler;
mod time;
mod util;
