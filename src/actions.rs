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
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use atomic_refcell::AtomicRefCell;

use crate::{Duration, ReactionId, Tag, TriggerId, TriggerLike};

/// The different kinds of event sources. Logical actions are
/// scheduled by reactions, physical actions by arbitrary threads,
/// and the remaining variants by the environment lifecycle.
#[derive(Clone, Debug)]
pub(crate) enum ActionKind {
    Logical { min_delay: Duration },
    Physical,
    Timer { offset: Duration, period: Duration },
    Startup,
    Shutdown,
}

impl ActionKind {
    #[inline]
    pub fn is_logical(&self) -> bool {
        matches!(self, ActionKind::Logical { .. })
    }

    #[inline]
    pub fn is_physical(&self) -> bool {
        matches!(self, ActionKind::Physical)
    }
}

/// Structural data of an action.
pub(crate) struct ActionData {
    pub kind: ActionKind,
    /// Reactions that fire when this action does.
    pub triggers: Vec<ReactionId>,
    /// Reactions that may schedule this action. Only meaningful
    /// for the logical variant.
    #[allow(unused)]
    pub schedulers: Vec<ReactionId>,
    pub store: Arc<dyn ErasedActionStore>,
}

impl ActionData {
    pub fn new<T: Send + Sync + 'static>(kind: ActionKind) -> Self {
        Self {
            kind,
            triggers: Vec::new(),
            schedulers: Vec::new(),
            store: Arc::new(ActionStore::<T>::default()),
        }
    }

    pub(crate) fn typed_store<T: Send + Sync + 'static>(&self) -> &ActionStore<T> {
        self.store
            .as_any()
            .downcast_ref::<ActionStore<T>>()
            .expect("action store has the wrong payload type")
    }
}

/// Payload storage of an action. Scheduling stages a payload
/// under the target tag; when the scheduler processes that tag
/// the staged payload becomes the current value, and the action
/// is present until the end of the tag. Several schedulings for
/// the same tag overwrite each other, the latest payload wins.
pub(crate) struct ActionStore<T> {
    present: AtomicBool,
    value: AtomicRefCell<Option<T>>,
    /// Staging may happen concurrently, from parallel workers or
    /// from external threads for physical actions.
    staged: Mutex<BTreeMap<Tag, Option<T>>>,
}

impl<T> Default for ActionStore<T> {
    fn default() -> Self {
        Self {
            present: AtomicBool::new(false),
            value: AtomicRefCell::new(None),
            staged: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<T> ActionStore<T> {
    pub fn stage(&self, tag: Tag, value: Option<T>) {
        self.staged.lock().unwrap().insert(tag, value);
    }

    pub fn get_value(&self) -> Option<T>
    where
        T: Clone,
    {
        self.value.borrow().clone()
    }
}

pub(crate) trait ErasedActionStore: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Make the payload staged for the given tag current, and
    /// mark the action present.
    fn activate(&self, tag: &Tag);

    /// Called at the end of a tag in which the action fired.
    fn cleanup(&self);

    fn is_present(&self) -> bool;
}

impl<T: Send + Sync + 'static> ErasedActionStore for ActionStore<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn activate(&self, tag: &Tag) {
        let staged = self.staged.lock().unwrap().remove(tag).flatten();
        *self.value.borrow_mut() = staged;
        self.present.store(true, Ordering::Release);
    }

    fn cleanup(&self) {
        self.present.store(false, Ordering::Release);
        *self.value.borrow_mut() = None;
    }

    fn is_present(&self) -> bool {
        self.present.load(Ordering::Acquire)
    }
}

macro_rules! action_key {
    ($(#[$doc:meta])* $name:ident < T >) => {
        $(#[$doc])*
        pub struct $name<T> {
            id: TriggerId,
            _marker: PhantomData<fn() -> T>,
        }

        impl<T> $name<T> {
            pub(crate) fn new(id: TriggerId) -> Self {
                Self { id, _marker: PhantomData }
            }
        }

        impl<T> TriggerLike for $name<T> {
            fn trigger_id(&self) -> TriggerId {
                self.id
            }
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $name<T> {}

        impl<T> Debug for $name<T> {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.id)
            }
        }
    };
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Copy, Clone)]
        pub struct $name {
            id: TriggerId,
        }

        impl $name {
            pub(crate) fn new(id: TriggerId) -> Self {
                Self { id }
            }
        }

        impl TriggerLike for $name {
            fn trigger_id(&self) -> TriggerId {
                self.id
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.id)
            }
        }
    };
}

action_key! {
    /// A typed reference to a logical action. Logical actions are
    /// scheduled from within reactions and produce events on the
    /// logical timeline.
    TypedActionKey<T>
}

action_key! {
    /// A typed reference to a physical action. Physical actions
    /// may be scheduled from any thread, through a
    /// [SchedulerLink](crate::SchedulerLink) or from a reaction.
    PhysicalActionKey<T>
}

action_key! {
    /// A reference to a timer: a periodic event source with an
    /// offset from the start tag.
    TimerKey
}

action_key! {
    /// A reference to a startup action, which fires once at the
    /// start tag.
    StartupActionKey
}

action_key! {
    /// A reference to a shutdown action, which fires once at the
    /// microstep following the shutdown request.
    ShutdownActionKey
}

/// Marker for action keys whose payload may be read with
/// [ReactionCtx::get_action](crate::ReactionCtx::get_action).
pub trait ActionKey<T>: TriggerLike {}

impl<T> ActionKey<T> for TypedActionKey<T> {}
impl<T> ActionKey<T> for PhysicalActionKey<T> {}
