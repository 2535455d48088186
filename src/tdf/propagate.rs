//! Rate and timestep propagation.
//!
//! Rates fix how many times each module runs per cluster period: for every
//! signal, `calls(writer) * rate(out) == calls(reader) * rate(in)`. The
//! smallest positive integer solution is used.
//!
//! Timesteps flow in both directions until every port and module has one:
//! a module timestep is `rate(p) * timestep(p)` for each of its ports `p`,
//! and all ports on one signal share a timestep.

use std::collections::VecDeque;

use crate::error::{AmsError, Result};
use crate::network::UnionFind;
use crate::tdf::graph::TdfGraph;
use crate::types::{ModuleId, PortId, SimTime};

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn lcm(a: u128, b: u128) -> u128 {
    a / gcd(a, b) * b
}

/// Positive rational `num / den` in lowest terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Ratio {
    num: u128,
    den: u128,
}

impl Ratio {
    fn new(num: u128, den: u128) -> Self {
        let g = gcd(num, den).max(1);
        Self {
            num: num / g,
            den: den / g,
        }
    }

    fn scale(self, mul: u128, div: u128) -> Self {
        Self::new(self.num * mul, self.den * div)
    }
}

/// Fails unless all modules are connected through signals.
pub(crate) fn check_connected(graph: &TdfGraph, cluster: &str) -> Result<()> {
    let n = graph.modules.len();
    if n == 0 {
        return Err(AmsError::Elaboration {
            component: cluster.to_string(),
            message: "cluster has no modules".to_string(),
        });
    }
    let mut uf = UnionFind::new(n);
    for links in &graph.links {
        let mut modules = links.ports().map(|p| graph.ports[p].module);
        if let Some(first) = modules.next() {
            for m in modules {
                uf.union(first, m);
            }
        }
    }
    let root = uf.find(0);
    if let Some(stray) = (1..n).find(|&m| uf.find(m) != root) {
        return Err(AmsError::Elaboration {
            component: cluster.to_string(),
            message: format!(
                "module `{}` is not connected to `{}`; use one cluster per connected set",
                graph.modules[stray].name, graph.modules[0].name
            ),
        });
    }
    Ok(())
}

/// Computes calls per period for every module.
pub(crate) fn solve_rates(graph: &mut TdfGraph) -> Result<()> {
    let n = graph.modules.len();
    let mut ratio: Vec<Option<Ratio>> = vec![None; n];

    for start in 0..n {
        if ratio[start].is_some() {
            continue;
        }
        ratio[start] = Some(Ratio::new(1, 1));
        let mut component = vec![start];
        let mut queue = VecDeque::from([start]);

        while let Some(m) = queue.pop_front() {
            let Some(current) = ratio[m] else { continue };
            for &p in &graph.modules[m].ports {
                let Some(signal) = graph.ports[p].signal else { continue };
                let rate_p = graph.ports[p].rate as u128;
                for q in graph.links[signal].ports().filter(|&q| q != p) {
                    let other = graph.ports[q].module;
                    let rate_q = graph.ports[q].rate as u128;
                    let expected = current.scale(rate_p, rate_q);
                    match ratio[other] {
                        None => {
                            ratio[other] = Some(expected);
                            component.push(other);
                            queue.push_back(other);
                        }
                        Some(found) if found != expected => {
                            return Err(AmsError::RateInconsistent {
                                location: graph.signal_name(signal).to_string(),
                                message: format!(
                                    "`{}` (rate {}) and `{}` (rate {}) cannot be balanced",
                                    graph.ports[p].name, rate_p, graph.ports[q].name, rate_q
                                ),
                            });
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        let common_den = component
            .iter()
            .filter_map(|&m| ratio[m])
            .fold(1u128, |acc, r| lcm(acc, r.den));
        let scaled: Vec<(ModuleId, u128)> = component
            .iter()
            .filter_map(|&m| ratio[m].map(|r| (m, r.num * (common_den / r.den))))
            .collect();
        let common_num = scaled.iter().fold(0u128, |acc, &(_, v)| gcd(acc, v)).max(1);
        for (m, v) in scaled {
            let calls = u64::try_from(v / common_num).map_err(|_| AmsError::RateInconsistent {
                location: graph.modules[m].name.clone(),
                message: "calls per period overflow".to_string(),
            })?;
            graph.modules[m].calls = calls;
        }
    }

    tracing::debug!(
        calls = ?graph.modules.iter().map(|m| m.calls).collect::<Vec<_>>(),
        "rates solved"
    );
    Ok(())
}

#[derive(Clone, Copy, Debug)]
enum Item {
    Module(ModuleId),
    Port(PortId),
}

struct Timesteps<'g> {
    graph: &'g TdfGraph,
    modules: Vec<Option<SimTime>>,
    ports: Vec<Option<SimTime>>,
    work: Vec<Item>,
}

impl Timesteps<'_> {
    fn assign_module(&mut self, m: ModuleId, t: SimTime, origin: &str) -> Result<()> {
        match self.modules[m] {
            None => {
                self.modules[m] = Some(t);
                self.work.push(Item::Module(m));
                Ok(())
            }
            Some(existing) if existing != t => Err(AmsError::TimestepInconsistent {
                location: self.graph.modules[m].name.clone(),
                message: format!("module timestep {} conflicts with {} derived from `{}`", existing, t, origin),
            }),
            Some(_) => Ok(()),
        }
    }

    fn assign_port(&mut self, p: PortId, t: SimTime, origin: &str) -> Result<()> {
        match self.ports[p] {
            None => {
                self.ports[p] = Some(t);
                self.work.push(Item::Port(p));
                Ok(())
            }
            Some(existing) if existing != t => Err(AmsError::TimestepInconsistent {
                location: self.graph.ports[p].name.clone(),
                message: format!("port timestep {} conflicts with {} derived from `{}`", existing, t, origin),
            }),
            Some(_) => Ok(()),
        }
    }

    fn run(&mut self) -> Result<()> {
        let graph = self.graph;
        while let Some(item) = self.work.pop() {
            match item {
                Item::Module(m) => {
                    let Some(tm) = self.modules[m] else { continue };
                    let origin = &graph.modules[m].name;
                    for &p in &graph.modules[m].ports {
                        let rate = graph.ports[p].rate as u64;
                        let tp = tm.checked_div_exact(rate).ok_or_else(|| AmsError::TimestepInconsistent {
                            location: graph.ports[p].name.clone(),
                            message: format!("module timestep {} is not divisible by rate {}", tm, rate),
                        })?;
                        self.assign_port(p, tp, origin)?;
                    }
                }
                Item::Port(p) => {
                    let Some(tp) = self.ports[p] else { continue };
                    let info = &graph.ports[p];
                    let tm = tp.checked_mul(info.rate as u64).ok_or_else(|| AmsError::TimestepInconsistent {
                        location: info.name.clone(),
                        message: "module timestep overflows".to_string(),
                    })?;
                    self.assign_module(info.module, tm, &info.name)?;
                    if let Some(signal) = info.signal {
                        for q in graph.links[signal].ports().filter(|&q| q != p) {
                            self.assign_port(q, tp, &info.name)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Derives every module and port timestep from the assigned ones.
pub(crate) fn propagate_timesteps(graph: &mut TdfGraph) -> Result<()> {
    let mut state = Timesteps {
        graph: &*graph,
        modules: vec![None; graph.modules.len()],
        ports: vec![None; graph.ports.len()],
        work: Vec::new(),
    };
    for (m, module) in graph.modules.iter().enumerate() {
        if let Some(t) = module.assigned_timestep {
            state.assign_module(m, t, "assignment")?;
        }
    }
    for (p, port) in graph.ports.iter().enumerate() {
        if let Some(t) = port.assigned_timestep {
            state.assign_port(p, t, "assignment")?;
        }
    }
    state.run()?;
    let Timesteps { modules, ports, .. } = state;

    for (m, t) in modules.iter().enumerate() {
        match t {
            Some(t) if !t.is_zero() => {}
            Some(_) => {
                return Err(AmsError::TimestepInconsistent {
                    location: graph.modules[m].name.clone(),
                    message: "timestep must be positive".to_string(),
                })
            }
            None => {
                return Err(AmsError::TimestepInconsistent {
                    location: graph.modules[m].name.clone(),
                    message: "no timestep assigned or propagated".to_string(),
                })
            }
        }
    }

    for (m, t) in modules.into_iter().enumerate() {
        graph.modules[m].timestep = t.unwrap_or(SimTime::ZERO);
    }
    for (p, t) in ports.into_iter().enumerate() {
        let port = &mut graph.ports[p];
        port.timestep = t.unwrap_or(SimTime::ZERO);
        if port.timeoffset >= port.timestep {
            return Err(AmsError::TimestepInconsistent {
                location: port.name.clone(),
                message: format!(
                    "time offset {} must be smaller than the timestep {}",
                    port.timeoffset, port.timestep
                ),
            });
        }
    }

    let period = graph.modules[0].timestep * graph.modules[0].calls;
    if let Some(module) = graph.modules.iter().find(|m| m.timestep * m.calls != period) {
        return Err(AmsError::TimestepInconsistent {
            location: module.name.clone(),
            message: format!(
                "{} calls of {} do not fill the cluster period {}",
                module.calls, module.timestep, period
            ),
        });
    }
    Ok(())
}
