//! Static firing schedule of a TDF cluster.
//!
//! Modules are first ordered topologically over zero-delay connections; a
//! cycle in that graph cannot be evaluated and is rejected. The firing
//! sequence for one period is then produced by simulating sample tokens:
//! repeatedly fire the first module in topological order that has enough
//! input samples and calls left.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::{AmsError, Result};
use crate::tdf::graph::TdfGraph;
use crate::tdf::port::PortKind;
use crate::types::ModuleId;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Schedule {
    /// Topological priority of modules.
    pub order: Vec<ModuleId>,
    /// Module of every firing in one period.
    pub firings: Vec<ModuleId>,
}

impl Schedule {
    pub fn len(&self) -> usize {
        self.firings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.firings.is_empty()
    }
}

fn names(graph: &TdfGraph, modules: impl IntoIterator<Item = ModuleId>) -> String {
    modules
        .into_iter()
        .map(|m| graph.modules[m].name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Kahn's algorithm over connections whose output and input delays are both zero.
pub(crate) fn topological_order(graph: &TdfGraph) -> Result<Vec<ModuleId>> {
    let n = graph.modules.len();
    let mut successors: Vec<Vec<ModuleId>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];

    for links in &graph.links {
        let Some(writer) = links.writer else { continue };
        let out = &graph.ports[writer];
        for &reader in &links.readers {
            let inp = &graph.ports[reader];
            if out.delay + inp.delay == 0 {
                successors[out.module].push(inp.module);
                indegree[inp.module] += 1;
            }
        }
    }

    let mut ready: BTreeSet<ModuleId> = (0..n).filter(|&m| indegree[m] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(m) = ready.pop_first() {
        order.push(m);
        for &next in &successors[m] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() < n {
        let stuck = (0..n).filter(|m| indegree[*m] > 0);
        return Err(AmsError::AlgebraicLoop {
            modules: names(graph, stuck),
        });
    }
    Ok(order)
}

/// Builds the firing sequence of one period from the solved calls per period.
pub(crate) fn build(graph: &TdfGraph) -> Result<Schedule> {
    let order = topological_order(graph)?;

    // Samples produced on each signal, starting with the writer's delayed samples.
    let mut produced: Vec<u64> = graph
        .links
        .iter()
        .map(|l| l.writer.map(|w| graph.ports[w].delay as u64).unwrap_or(0))
        .collect();
    let mut consumed = vec![0u64; graph.ports.len()];
    let mut done = vec![0u64; graph.modules.len()];
    let total: u64 = graph.modules.iter().map(|m| m.calls).sum();
    let mut firings = Vec::with_capacity(total as usize);

    let can_fire = |m: ModuleId, produced: &[u64], consumed: &[u64], done: &[u64]| {
        done[m] < graph.modules[m].calls
            && graph.modules[m].ports.iter().all(|&p| {
                let port = &graph.ports[p];
                match (port.kind, port.signal) {
                    (PortKind::In, Some(s)) => {
                        produced[s] + port.delay as u64 >= consumed[p] + port.rate as u64
                    }
                    _ => true,
                }
            })
    };

    while (firings.len() as u64) < total {
        let Some(m) = order
            .iter()
            .copied()
            .find(|&m| can_fire(m, &produced, &consumed, &done))
        else {
            let waiting = (0..graph.modules.len()).filter(|&m| done[m] < graph.modules[m].calls);
            return Err(AmsError::AlgebraicLoop {
                modules: names(graph, waiting),
            });
        };
        for &p in &graph.modules[m].ports {
            let port = &graph.ports[p];
            match (port.kind, port.signal) {
                (PortKind::In, Some(_)) => consumed[p] += port.rate as u64,
                (PortKind::Out, Some(s)) => produced[s] += port.rate as u64,
                _ => {}
            }
        }
        done[m] += 1;
        firings.push(m);
    }

    tracing::debug!(firings = firings.len(), order = ?order, "schedule built");
    Ok(Schedule { order, firings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tdf::propagate::solve_rates;

    fn connect(g: &mut TdfGraph, from: ModuleId, to: ModuleId, out_rate: usize, in_rate: usize, delay: usize) {
        let s = g.add_signal::<f64>(format!("s{}", g.links.len()));
        let out = g.add_port::<f64>(from, &format!("out{}", s), PortKind::Out);
        let inp = g.add_port::<f64>(to, &format!("in{}", s), PortKind::In);
        g.bind(out, s).unwrap();
        g.bind(inp, s).unwrap();
        g.ports[out].rate = out_rate;
        g.ports[inp].rate = in_rate;
        g.ports[out].delay = delay;
    }

    #[test]
    fn test_multirate_firings() {
        let mut g = TdfGraph::new();
        let a = g.add_module("a".into());
        let b = g.add_module("b".into());
        let c = g.add_module("c".into());
        connect(&mut g, a, b, 2, 1, 0);
        connect(&mut g, b, c, 1, 3, 0);
        solve_rates(&mut g).unwrap();
        let schedule = build(&g).unwrap();
        assert_eq!(schedule.order, vec![a, b, c]);
        assert_eq!(schedule.len(), 11);
        assert_eq!(schedule.firings, vec![a, a, a, b, b, b, b, b, b, c, c]);
    }

    #[test]
    fn test_zero_delay_cycle_rejected() {
        let mut g = TdfGraph::new();
        let a = g.add_module("a".into());
        let b = g.add_module("b".into());
        connect(&mut g, a, b, 1, 1, 0);
        connect(&mut g, b, a, 1, 1, 0);
        solve_rates(&mut g).unwrap();
        let err = build(&g).unwrap_err();
        assert!(matches!(err, AmsError::AlgebraicLoop { ref modules } if modules == "a, b"));
    }

    #[test]
    fn test_delayed_feedback() {
        let mut g = TdfGraph::new();
        let a = g.add_module("a".into());
        let b = g.add_module("b".into());
        connect(&mut g, a, b, 1, 1, 0);
        connect(&mut g, b, a, 1, 1, 1);
        solve_rates(&mut g).unwrap();
        let schedule = build(&g).unwrap();
        assert_eq!(schedule.firings, vec![a, b]);
    }

    #[test]
    fn test_insufficient_delay_deadlocks() {
        let mut g = TdfGraph::new();
        let a = g.add_module("a".into());
        let b = g.add_module("b".into());
        // a consumes 2 per call from b but the loop only carries 1 initial sample
        connect(&mut g, a, b, 2, 2, 0);
        connect(&mut g, b, a, 2, 2, 1);
        solve_rates(&mut g).unwrap();
        assert!(matches!(build(&g), Err(AmsError::AlgebraicLoop { .. })));
    }
}
