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
use crate::assembly::register_reactor_impl;
use crate::scheduler::depgraph::DepGraph;
use crate::*;

#[test]
fn binding_orders_producer_before_consumer() {
    let mut env = Environment::new(RuntimeOptions::default());
    let (emit, recv) =
        register_reactor_impl::<ChainApp, _>(&mut env, "app", new_log(), None, |a| (a.p_emit, a.c_recv)).unwrap();
    env.assemble().unwrap();

    let graph = DepGraph::build(&env).unwrap();
    let (levels, max) = graph.number_reactions_by_level().ok().expect("graph is acyclic");

    assert!(levels[emit.id] < levels[recv.id]);
    assert_eq!(max, levels[recv.id]);
}

#[test]
fn priority_edges_order_higher_priority_first() {
    let mut env = Environment::new(RuntimeOptions::default());
    let (r1, r2) =
        register_reactor_impl::<PriorityPair, _>(&mut env, "app", new_log(), None, |a| (a.r1, a.r2)).unwrap();
    env.assemble().unwrap();

    let graph = DepGraph::build(&env).unwrap();
    let (levels, _) = graph.number_reactions_by_level().ok().expect("graph is acyclic");

    // the reaction with the greater priority value fires first
    assert!(levels[r2.id] < levels[r1.id]);
}

#[test]
fn reactions_of_a_ring_have_no_level_assignment() {
    let mut env = Environment::new(RuntimeOptions::default());
    env.register_reactor::<RingApp>("app", ()).unwrap();
    env.assemble().unwrap();

    let graph = DepGraph::build(&env).unwrap();
    assert!(graph.number_reactions_by_level().is_err());
}

#[test]
fn dot_output_clusters_reactions_by_level() {
    let mut env = Environment::new(RuntimeOptions::default());
    env.register_reactor::<ChainApp>("app", new_log()).unwrap();
    env.assemble().unwrap();

    let graph = DepGraph::build(&env).unwrap();
    let (levels, _) = graph.number_reactions_by_level().ok().expect("graph is acyclic");
    let mut out = Vec::new();
    graph.write_dot(&env, &levels, &mut out).unwrap();
    let dot = String::from_utf8(out).unwrap();

    assert!(dot.starts_with("digraph {\nrankdir=LR;\n"), "{}", dot);
    assert!(dot.contains("rank=same;"), "{}", dot);
    assert!(dot.contains("app_producer_emit [label=\"app.producer.emit\"];"), "{}", dot);
    assert!(dot.contains("app_consumer_recv [label=\"app.consumer.recv\"];"), "{}", dot);
    assert!(dot.contains("app_producer_emit -> app_consumer_recv"), "{}", dot);
    assert!(dot.contains("[style=invis];"), "{}", dot);
}

#[test]
fn export_writes_the_graph_to_a_file() {
    let mut env = Environment::new(RuntimeOptions::default());
    env.register_reactor::<ChainApp>("app", new_log()).unwrap();
    env.assemble().unwrap();

    let path = std::env::temp_dir().join("reactor_dyn_export_test.dot");
    env.export_dependency_graph(&path).unwrap();
    let dot = std::fs::read_to_string(&path).unwrap();
    assert!(dot.contains("digraph {"), "{}", dot);
    assert!(dot.contains("app_producer_emit -> app_consumer_recv"), "{}", dot);
}

#[test]
fn cycle_dot_reproduces_all_edges() {
    let mut env = Environment::new(RuntimeOptions::default());
    env.register_reactor::<RingApp>("app", ()).unwrap();
    env.assemble().unwrap();

    let graph = DepGraph::build(&env).unwrap();
    let levels = env.reactions.iter().map(|_| LevelIx::ZERO).collect();
    let mut out = Vec::new();
    graph.write_dot(&env, &levels, &mut out).unwrap();
    let dot = String::from_utf8(out).unwrap();

    assert!(dot.contains("app_a_relay -> app_b_relay"), "{}", dot);
    assert!(dot.contains("app_b_relay -> app_c_relay"), "{}", dot);
    assert!(dot.contains("app_c_relay -> app_a_relay"), "{}", dot);
}
