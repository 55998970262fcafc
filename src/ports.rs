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
use std::marker::PhantomData;
use std::sync::Arc;

use atomic_refcell::AtomicRefCell;

use crate::{ReactionId, TriggerId};

/// Something on which a reaction may declare a trigger
/// dependency: a port, an action, or a timer.
pub trait TriggerLike {
    fn trigger_id(&self) -> TriggerId;
}

/// A typed reference to a port. This is a plain copyable key;
/// the port itself, including its value slot and its bindings,
/// is owned by the [Environment](crate::Environment).
pub struct TypedPortKey<T> {
    id: TriggerId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedPortKey<T> {
    pub(crate) fn new(id: TriggerId) -> Self {
        Self { id, _marker: PhantomData }
    }
}

impl<T> TriggerLike for TypedPortKey<T> {
    fn trigger_id(&self) -> TriggerId {
        self.id
    }
}

impl<T> Clone for TypedPortKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypedPortKey<T> {}

impl<T> Debug for TypedPortKey<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Port({})", self.id)
    }
}

/// The value slot shared between a port and the reactions that
/// read it. Mutation only happens during reaction dispatch within
/// the tag that owns the value; the topological order precludes
/// concurrent writer/reader pairs, so an [AtomicRefCell] suffices.
pub(crate) struct PortCell<T> {
    pub(crate) value: AtomicRefCell<Option<T>>,
}

impl<T> Default for PortCell<T> {
    fn default() -> Self {
        Self { value: AtomicRefCell::new(None) }
    }
}

pub(crate) trait ErasedPortCell: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn is_present(&self) -> bool;

    /// Called at the end of a tag to clear the presence flag.
    fn clear(&self);
}

impl<T: Send + Sync + 'static> ErasedPortCell for PortCell<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_present(&self) -> bool {
        self.value.borrow().is_some()
    }

    fn clear(&self) {
        *self.value.borrow_mut() = None;
    }
}

/// Direction of a port, relative to its owning reactor.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PortDirection {
    Input,
    Output,
}

/// Structural data of a port. The inward binding is the port
/// whose value this port mirrors; chains of bindings terminate
/// at a source port, which is the only writable one.
pub(crate) struct PortData {
    pub direction: PortDirection,
    pub inward_binding: Option<TriggerId>,
    pub outward_bindings: Vec<TriggerId>,
    /// Reactions that read this port.
    #[allow(unused)]
    pub dependencies: Vec<ReactionId>,
    /// The subset of dependencies that fire when the port is set.
    pub triggers: Vec<ReactionId>,
    /// Reactions that write this port.
    pub antidependencies: Vec<ReactionId>,
    pub cell: Arc<dyn ErasedPortCell>,
}

impl PortData {
    pub fn new<T: Send + Sync + 'static>(direction: PortDirection) -> Self {
        Self {
            direction,
            inward_binding: None,
            outward_bindings: Vec::new(),
            dependencies: Vec::new(),
            triggers: Vec::new(),
            antidependencies: Vec::new(),
            cell: Arc::new(PortCell::<T>::default()),
        }
    }

    #[inline]
    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }

    #[inline]
    pub fn has_inward_binding(&self) -> bool {
        self.inward_binding.is_some()
    }

    pub(crate) fn typed_cell<T: Send + Sync + 'static>(&self) -> &PortCell<T> {
        self.cell
            .as_any()
            .downcast_ref::<PortCell<T>>()
            .expect("port cell has the wrong payload type")
    }
}
