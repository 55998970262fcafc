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

use std::collections::BTreeMap;
use std::io;

use index_vec::IndexVec;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction::{Incoming, Outgoing};

use crate::{Environment, LevelIx, ReactionId, ValidationError};

type GraphIx = NodeIndex<u32>;

/// Marker for a failed topological sort.
pub(crate) struct CyclicDependencyGraph;

/// The reaction dependency graph. An edge `X -> Y` means that X
/// must complete before Y may start, when both fire at the same
/// tag. Two edge families exist:
///
/// - binding-induced edges: for a reaction R reading a port P,
///   the inward-binding chain of P is followed to its source S,
///   and an edge is added from every writer of S to R (producers
///   complete before consumers);
/// - priority edges: within one reactor, for reactions sorted by
///   ascending priority, an edge from each reaction to its
///   predecessor, so the reaction with the greater priority
///   value fires first.
///
/// The graph must be acyclic; levels are assigned by Kahn-style
/// peeling of the zero-in-degree layer.
pub(crate) struct DepGraph {
    dataflow: DiGraph<ReactionId, (), u32>,
}

impl DepGraph {
    #[inline]
    fn ix(rid: ReactionId) -> GraphIx {
        NodeIndex::new(rid.index())
    }

    pub fn build(env: &Environment) -> Result<Self, ValidationError> {
        let mut dataflow = DiGraph::default();
        for (rid, _) in env.reactions.iter_enumerated() {
            let ix = dataflow.add_node(rid);
            debug_assert_eq!(ix.index(), rid.index());
        }

        // priority edges, and the unique-priority invariant
        for reactor in env.reactors.iter() {
            let mut by_priority = BTreeMap::<u32, ReactionId>::new();
            for &rid in &reactor.reactions {
                if by_priority.insert(env.reactions[rid].priority, rid).is_some() {
                    return Err(ValidationError::new(
                        "priorities must be unique for all reactions of the same reactor",
                    ));
                }
            }
            let sorted: Vec<ReactionId> = by_priority.into_values().collect();
            for pair in sorted.windows(2) {
                dataflow.update_edge(Self::ix(pair[1]), Self::ix(pair[0]), ());
            }
        }

        // binding-induced edges
        for (rid, entry) in env.reactions.iter_enumerated() {
            for &port in &entry.dependencies {
                let source = env.source_of(port);
                for &writer in &env.expect_port(source).antidependencies {
                    if writer != rid {
                        dataflow.update_edge(Self::ix(writer), Self::ix(rid), ());
                    }
                }
            }
        }

        Ok(Self { dataflow })
    }

    /// Assign a level to each reaction by peeling layers of
    /// zero-in-degree nodes. Reactions at the same level are
    /// mutually concurrent; a reaction only gets its level once
    /// all its predecessors have a lower one. Fails if the graph
    /// has a cycle.
    pub fn number_reactions_by_level(
        &self,
    ) -> Result<(IndexVec<ReactionId, LevelIx>, LevelIx), CyclicDependencyGraph> {
        let n = self.dataflow.node_count();
        let mut levels: IndexVec<ReactionId, LevelIx> = index_vec![LevelIx::ZERO; n];
        let mut in_degree: Vec<usize> = self
            .dataflow
            .node_indices()
            .map(|ix| self.dataflow.edges_directed(ix, Incoming).count())
            .collect();

        let mut frontier: Vec<GraphIx> = self
            .dataflow
            .node_indices()
            .filter(|ix| in_degree[ix.index()] == 0)
            .collect();

        let mut remaining = n;
        let mut level = LevelIx::ZERO;
        let mut max_level = LevelIx::ZERO;
        while remaining > 0 {
            if frontier.is_empty() {
                return Err(CyclicDependencyGraph);
            }
            debug!("Reactions at level {}: {}", level, frontier.len());
            let mut next_frontier = Vec::new();
            for &ix in &frontier {
                levels[self.dataflow[ix]] = level;
                max_level = level;
                for succ in self.dataflow.neighbors_directed(ix, Outgoing) {
                    let deg = &mut in_degree[succ.index()];
                    *deg -= 1;
                    if *deg == 0 {
                        next_frontier.push(succ);
                    }
                }
            }
            remaining -= frontier.len();
            frontier = next_frontier;
            level = level.next();
        }

        Ok((levels, max_level))
    }

    /// Write the graph in DOT format. Reactions of the same level
    /// are clustered into `rank=same` subgraphs; invisible edges
    /// between the first reaction of each level order the
    /// clusters; all dependency edges follow.
    pub fn write_dot(
        &self,
        env: &Environment,
        levels: &IndexVec<ReactionId, LevelIx>,
        out: &mut impl io::Write,
    ) -> io::Result<()> {
        let mut by_level = BTreeMap::<LevelIx, Vec<ReactionId>>::new();
        for (rid, &level) in levels.iter_enumerated() {
            by_level.entry(level).or_default().push(rid);
        }

        writeln!(out, "digraph {{")?;
        writeln!(out, "rankdir=LR;")?;

        for reactions in by_level.values() {
            writeln!(out, "subgraph {{")?;
            writeln!(out, "rank=same;")?;
            for &rid in reactions {
                let fqn = &env.reactions[rid].fqn;
                writeln!(out, "{} [label=\"{}\"];", dot_name(fqn), fqn)?;
            }
            writeln!(out, "}}")?;
        }

        let mut previous: Option<ReactionId> = None;
        for reactions in by_level.values() {
            let first = reactions[0];
            if let Some(prev) = previous {
                writeln!(
                    out,
                    "{} -> {} [style=invis];",
                    dot_name(&env.reactions[prev].fqn),
                    dot_name(&env.reactions[first].fqn)
                )?;
            }
            previous = Some(first);
        }

        for edge in self.dataflow.edge_references() {
            let from = self.dataflow[edge.source()];
            let to = self.dataflow[edge.target()];
            writeln!(
                out,
                "{} -> {}",
                dot_name(&env.reactions[from].fqn),
                dot_name(&env.reactions[to].fqn)
            )?;
        }
        writeln!(out, "}}")
    }
}

fn dot_name(fqn: &str) -> String {
    fqn.replace('.', "_")
}
