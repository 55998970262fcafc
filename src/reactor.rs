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

use std::collections::HashSet;

use crate::{ReactionId, ReactorId, TriggerId};

/// Structural data of a reactor instance: its place in the
/// composition tree and the elements it exclusively owns, in
/// registration order. The user-defined state lives in a
/// separate arena of the [Environment](crate::Environment).
pub(crate) struct ReactorEntry {
    #[allow(unused)]
    pub name: String,
    pub fqn: String,
    /// Absent only for top-level reactors, which are owned by
    /// the environment.
    pub container: Option<ReactorId>,
    pub children: Vec<ReactorId>,
    pub actions: Vec<TriggerId>,
    pub inputs: Vec<TriggerId>,
    pub outputs: Vec<TriggerId>,
    pub reactions: Vec<ReactionId>,
    /// Simple names of all elements registered with this
    /// container, for the uniqueness check.
    pub element_names: HashSet<String>,
}

impl ReactorEntry {
    pub fn new(name: String, fqn: String, container: Option<ReactorId>) -> Self {
        Self {
            name,
            fqn,
            container,
            children: Vec::new(),
            actions: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            reactions: Vec::new(),
            element_names: HashSet::new(),
        }
    }

    #[inline]
    pub fn is_top_level(&self) -> bool {
        self.container.is_none()
    }
}
