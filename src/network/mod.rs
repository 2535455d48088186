//! Networks of ELN and LSF primitives.
//!
//! A [`Network`] owns nodes and primitives. Elaboration partitions it into
//! [`Cluster`]s with union-find; every cluster then owns its primitives and
//! a [`LinearSolver`](crate::eqn::LinearSolver) and is solved on its own.
//!
//! # Example
//!
//! ```
//! use mixsig::config::AmsConfig;
//! use mixsig::eln::{Resistor, Vsource};
//! use mixsig::network::Network;
//! use mixsig::report::Diagnostics;
//! use mixsig::types::SimTime;
//!
//! let mut net = Network::new("divider", &AmsConfig::default(), Diagnostics::new());
//! let gnd = net.ground();
//! let top = net.add_node("top");
//! let mid = net.add_node("mid");
//! net.add_primitive(Box::new(Vsource::dc("v1", top, gnd, 2.0)));
//! net.add_primitive(Box::new(Resistor::new("r1", top, mid, 100.0)));
//! net.add_primitive(Box::new(Resistor::new("r2", mid, gnd, 100.0)));
//!
//! net.dc(SimTime::ZERO).unwrap();
//! assert!((net.node_value(mid) - 1.0).abs() < 1e-12);
//! ```

pub mod cluster;
pub mod executor;

use serde::Serialize;
use serde_json::json;

use crate::config::AmsConfig;
use crate::eqn::{ContributesEquations, IntegrationMethod, LinearSolver};
use crate::error::{AmsError, Result};
use crate::report::Diagnostics;
use crate::types::{CScalar, ClusterId, NodeId, PrimitiveId, SimTime};

pub use cluster::{Cluster, UnionFind};
pub use executor::NetworkExecutor;

/// Node id that no network ever hands out. Primitives left with it fail elaboration.
pub const UNBOUND: NodeId = NodeId::MAX;

/// Conservative electrical node or non-conservative signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Electrical,
    SignalFlow,
}

#[derive(Clone, Debug, Serialize)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    /// Potential fixed at zero, never an unknown.
    pub reference: bool,
    pub ignore_for_clustering: bool,
    /// Assigned at elaboration.
    pub cluster: Option<ClusterId>,
}

/// Counters exported with [`Network::export_stats`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct NetworkStats {
    pub elaborations: u64,
    pub dc_solves: u64,
    pub steps: u64,
    pub ac_solves: u64,
    pub failures: u64,
}

pub struct Network {
    name: String,
    method: IntegrationMethod,
    tolerance: f64,
    ignore_reference: bool,
    diagnostics: Diagnostics,
    nodes: Vec<Node>,
    ground: Option<NodeId>,
    /// Primitives added since the last elaboration.
    unplaced: Vec<(PrimitiveId, Box<dyn ContributesEquations>)>,
    /// Cluster and slot of each placed primitive, by primitive id.
    locations: Vec<Option<(ClusterId, usize)>>,
    clusters: Vec<Cluster>,
    dirty: bool,
    time: SimTime,
    stats: NetworkStats,
}

impl Network {
    pub fn new(name: impl Into<String>, config: &AmsConfig, diagnostics: Diagnostics) -> Self {
        Self {
            name: name.into(),
            method: config.integration_method,
            tolerance: config.singular_tolerance,
            ignore_reference: config.ignore_reference_for_clustering,
            diagnostics,
            nodes: Vec::new(),
            ground: None,
            unplaced: Vec::new(),
            locations: Vec::new(),
            clusters: Vec::new(),
            dirty: true,
            time: SimTime::ZERO,
            stats: NetworkStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Time of the most recent solve.
    pub fn time(&self) -> SimTime {
        self.time
    }

    fn push_node(&mut self, name: String, kind: NodeKind, reference: bool) -> NodeId {
        self.nodes.push(Node {
            name,
            kind,
            reference,
            ignore_for_clustering: reference && self.ignore_reference,
            cluster: None,
        });
        self.dirty = true;
        self.nodes.len() - 1
    }

    /// Adds an electrical node.
    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        self.push_node(name.into(), NodeKind::Electrical, false)
    }

    /// Adds an LSF signal.
    pub fn add_signal(&mut self, name: impl Into<String>) -> NodeId {
        self.push_node(name.into(), NodeKind::SignalFlow, false)
    }

    /// Adds an electrical reference node.
    pub fn add_reference(&mut self, name: impl Into<String>) -> NodeId {
        self.push_node(name.into(), NodeKind::Electrical, true)
    }

    /// The shared ground node, created on first use.
    pub fn ground(&mut self) -> NodeId {
        match self.ground {
            Some(gnd) => gnd,
            None => {
                let gnd = self.add_reference("gnd");
                self.ground = Some(gnd);
                gnd
            }
        }
    }

    /// Lets a reference node take part in clustering, or opts it out.
    pub fn set_ignore_for_clustering(&mut self, node: NodeId, ignore: bool) -> Result<()> {
        let entry = self.nodes.get_mut(node).ok_or(AmsError::UnknownId { kind: "node", id: node })?;
        if !entry.reference && ignore {
            return Err(AmsError::Elaboration {
                component: entry.name.clone(),
                message: "only reference nodes can be ignored for clustering".to_string(),
            });
        }
        entry.ignore_for_clustering = ignore;
        self.dirty = true;
        Ok(())
    }

    pub fn node(&self, node: NodeId) -> Option<&Node> {
        self.nodes.get(node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Adds a primitive. The network re-elaborates before its next solve.
    pub fn add_primitive(&mut self, primitive: Box<dyn ContributesEquations>) -> PrimitiveId {
        let id = self.locations.len();
        self.locations.push(None);
        self.unplaced.push((id, primitive));
        self.dirty = true;
        id
    }

    pub fn primitive_count(&self) -> usize {
        self.locations.len()
    }

    pub fn set_integration_method(&mut self, method: IntegrationMethod) {
        self.method = method;
        for cluster in &mut self.clusters {
            cluster.solver.set_method(method);
        }
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn cluster_of(&self, node: NodeId) -> Option<ClusterId> {
        self.nodes.get(node).and_then(|n| n.cluster)
    }

    pub fn is_elaborated(&self) -> bool {
        !self.dirty
    }

    fn collect_primitives(&mut self) -> Vec<(PrimitiveId, Box<dyn ContributesEquations>)> {
        let mut slots: Vec<Option<Box<dyn ContributesEquations>>> =
            (0..self.locations.len()).map(|_| None).collect();
        for cluster in self.clusters.drain(..) {
            for (id, primitive) in cluster.primitive_ids.into_iter().zip(cluster.primitives) {
                slots[id] = Some(primitive);
            }
        }
        for (id, primitive) in self.unplaced.drain(..) {
            slots[id] = Some(primitive);
        }
        self.locations.iter_mut().for_each(|l| *l = None);
        slots
            .into_iter()
            .enumerate()
            .filter_map(|(id, p)| p.map(|p| (id, p)))
            .collect()
    }

    fn check_terminals(&self, primitive: &dyn ContributesEquations) -> Result<Vec<NodeId>> {
        primitive
            .terminals()
            .into_iter()
            .map(|(terminal, node)| {
                if node < self.nodes.len() {
                    Ok(node)
                } else {
                    Err(AmsError::UnboundTerminal {
                        component: format!("{}.{}", self.name, primitive.name()),
                        terminal: terminal.to_string(),
                    })
                }
            })
            .collect()
    }

    /// Partitions nodes and primitives into clusters.
    ///
    /// Runs automatically before a solve after any structural change. On an
    /// unbound terminal the network keeps its primitives and stays unelaborated.
    pub fn elaborate(&mut self) -> Result<()> {
        let primitives = self.collect_primitives();

        let mut terminals = Vec::with_capacity(primitives.len());
        let mut failure = None;
        for (_, primitive) in &primitives {
            match self.check_terminals(primitive.as_ref()) {
                Ok(nodes) => terminals.push(nodes),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        if let Some(err) = failure {
            self.unplaced = primitives;
            self.dirty = true;
            self.diagnostics.report_error(self.name.clone(), &err, None);
            return Err(err);
        }

        let clustered: Vec<bool> = self.nodes.iter().map(|n| !n.ignore_for_clustering).collect();
        let unknown: Vec<bool> = self.nodes.iter().map(|n| !n.reference).collect();
        let partition = cluster::partition(&clustered, &unknown, &terminals);

        let mut clusters: Vec<Cluster> = (0..partition.cluster_count)
            .map(|id| Cluster::new(id, self.method, self.tolerance))
            .collect();
        for (node, cluster) in partition.node_cluster.iter().enumerate() {
            self.nodes[node].cluster = *cluster;
            if let Some(cid) = cluster {
                clusters[*cid].nodes.push(node);
            }
        }
        for ((id, primitive), &cid) in primitives.into_iter().zip(&partition.primitive_cluster) {
            let cluster = &mut clusters[cid];
            self.locations[id] = Some((cid, cluster.primitives.len()));
            cluster.primitive_ids.push(id);
            cluster.primitives.push(primitive);
        }
        for cluster in &mut clusters {
            cluster.solver = LinearSolver::new(
                cluster.id,
                cluster.nodes.clone(),
                self.method,
                self.tolerance,
            );
            if cluster.primitives.is_empty() {
                self.diagnostics.warning(
                    self.name.clone(),
                    format!("nodes {:?} are not connected to any primitive", cluster.nodes),
                );
            }
        }

        self.clusters = clusters;
        self.dirty = false;
        self.stats.elaborations += 1;
        tracing::info!(
            network = %self.name,
            nodes = self.nodes.len(),
            primitives = self.locations.len(),
            clusters = self.clusters.len(),
            "network elaborated"
        );
        Ok(())
    }

    fn ensure_elaborated(&mut self) -> Result<()> {
        if self.dirty {
            self.elaborate()?;
        }
        Ok(())
    }

    fn check_outcome(&mut self, outcome: Result<()>) -> Result<()> {
        if let Err(err) = &outcome {
            self.stats.failures += 1;
            self.diagnostics.report_error(self.name.clone(), err, Some(self.time));
        }
        outcome
    }

    /// Solves the DC operating point of every cluster.
    pub fn dc(&mut self, time: SimTime) -> Result<()> {
        self.ensure_elaborated()?;
        self.time = time;
        let outcome = self.for_each_cluster(|c| c.solver.solve_dc(&mut c.primitives, time));
        self.stats.dc_solves += 1;
        self.check_outcome(outcome)
    }

    /// Advances every cluster by one step of size `h` ending at `time`.
    pub fn step(&mut self, time: SimTime, h: SimTime) -> Result<()> {
        self.ensure_elaborated()?;
        self.time = time;
        let outcome = self.for_each_cluster(|c| c.solver.step(&mut c.primitives, time, h));
        self.stats.steps += 1;
        self.check_outcome(outcome)
    }

    /// Small-signal solve of every cluster at angular frequency `omega`.
    pub fn ac(&mut self, omega: f64) -> Result<()> {
        self.ensure_elaborated()?;
        let outcome = self.for_each_cluster(|c| c.solver.solve_ac(&mut c.primitives, omega).map(|_| ()));
        self.stats.ac_solves += 1;
        self.check_outcome(outcome)
    }

    #[cfg(not(feature = "parallel"))]
    fn for_each_cluster<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(&mut Cluster) -> Result<()>,
    {
        self.clusters.iter_mut().try_for_each(f)
    }

    #[cfg(feature = "parallel")]
    fn for_each_cluster<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(&mut Cluster) -> Result<()> + Sync + Send,
    {
        use rayon::prelude::*;
        self.clusters.par_iter_mut().try_for_each(f)
    }

    /// Drops integration history so the next step starts with Euler.
    pub fn reset_history(&mut self) {
        for cluster in &mut self.clusters {
            cluster.solver.reset_history();
        }
    }

    /// Potential or signal value of a node. Reference nodes read as zero.
    pub fn node_value(&self, node: NodeId) -> f64 {
        self.cluster_of(node)
            .and_then(|cid| self.clusters.get(cid))
            .map(|c| c.solver.value(node))
            .unwrap_or(0.0)
    }

    /// Small-signal phasor of a node from the last AC solve.
    pub fn ac_value(&self, node: NodeId) -> Option<CScalar> {
        let cluster = self.clusters.get(self.cluster_of(node)?)?;
        cluster.solver.ac_value(node)
    }

    fn primitive_dyn(&self, id: PrimitiveId) -> Option<&dyn ContributesEquations> {
        match self.locations.get(id)? {
            Some((cid, slot)) => self.clusters.get(*cid)?.primitives.get(*slot).map(|b| b.as_ref()),
            None => self
                .unplaced
                .iter()
                .find(|(pid, _)| *pid == id)
                .map(|(_, b)| b.as_ref()),
        }
    }

    fn primitive_dyn_mut(&mut self, id: PrimitiveId) -> Option<&mut Box<dyn ContributesEquations>> {
        match *self.locations.get(id)? {
            Some((cid, slot)) => self.clusters.get_mut(cid)?.primitives.get_mut(slot),
            None => self
                .unplaced
                .iter_mut()
                .find(|(pid, _)| *pid == id)
                .map(|(_, b)| b),
        }
    }

    /// Typed access to a primitive.
    pub fn primitive<P: ContributesEquations>(&self, id: PrimitiveId) -> Option<&P> {
        self.primitive_dyn(id)?.as_any().downcast_ref::<P>()
    }

    /// Runs `f` on a primitive of type `P`, e.g. to change a parameter.
    pub fn with_primitive<P, R>(&mut self, id: PrimitiveId, f: impl FnOnce(&mut P) -> R) -> Result<R>
    where
        P: ContributesEquations,
    {
        let primitive = self
            .primitive_dyn_mut(id)
            .ok_or(AmsError::UnknownId { kind: "primitive", id })?;
        let name = primitive.name().to_string();
        match primitive.as_mut().as_any_mut().downcast_mut::<P>() {
            Some(p) => Ok(f(p)),
            None => Err(AmsError::TypeMismatch {
                port: name,
                expected: std::any::type_name::<P>(),
                found: "another primitive type",
            }),
        }
    }

    /// Feeds a TDF-controlled primitive.
    pub fn set_primitive_input(&mut self, id: PrimitiveId, value: f64) -> Result<()> {
        let primitive = self
            .primitive_dyn_mut(id)
            .ok_or(AmsError::UnknownId { kind: "primitive", id })?;
        if primitive.set_tdf_input(value) {
            Ok(())
        } else {
            Err(AmsError::Elaboration {
                component: primitive.name().to_string(),
                message: "primitive has no TDF input".to_string(),
            })
        }
    }

    /// Latest sample of a TDF sink primitive.
    pub fn primitive_output(&self, id: PrimitiveId) -> Option<f64> {
        self.primitive_dyn(id)?.tdf_output()
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn export_stats(&self) -> serde_json::Value {
        let clusters: Vec<serde_json::Value> = self
            .clusters
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "nodes": c.nodes.len(),
                    "primitives": c.primitives.len(),
                    "solver": c.solver.stats(),
                })
            })
            .collect();
        json!({
            "name": self.name,
            "time": self.time,
            "nodes": self.nodes.len(),
            "primitives": self.locations.len(),
            "stats": self.stats,
            "clusters": clusters,
        })
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("name", &self.name)
            .field("nodes", &self.nodes)
            .field("clusters", &self.clusters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eln::{Capacitor, Resistor, Vsource};
    use crate::lsf;
    use approx::assert_relative_eq;

    fn network() -> Network {
        Network::new("net", &AmsConfig::default(), Diagnostics::new())
    }

    #[test]
    fn test_disjoint_subcircuits() {
        let mut net = network();
        let gnd = net.ground();
        let a = net.add_node("a");
        let b = net.add_node("b");
        net.add_primitive(Box::new(Vsource::dc("va", a, gnd, 1.0)));
        net.add_primitive(Box::new(Resistor::new("ra", a, gnd, 10.0)));
        net.add_primitive(Box::new(Vsource::dc("vb", b, gnd, 2.0)));
        net.add_primitive(Box::new(Resistor::new("rb", b, gnd, 20.0)));
        net.dc(SimTime::ZERO).unwrap();

        assert_eq!(net.cluster_count(), 2);
        assert_ne!(net.cluster_of(a), net.cluster_of(b));
        assert_eq!(net.cluster_of(gnd), None);
        assert_relative_eq!(net.node_value(a), 1.0);
        assert_relative_eq!(net.node_value(b), 2.0);
    }

    #[test]
    fn test_reference_clustering_can_be_enabled() {
        let config = crate::config::AmsConfigBuilder::new()
            .ignore_reference_for_clustering(false)
            .build()
            .unwrap();
        let mut net = Network::new("net", &config, Diagnostics::new());
        let gnd = net.ground();
        let a = net.add_node("a");
        let b = net.add_node("b");
        net.add_primitive(Box::new(Vsource::dc("va", a, gnd, 1.0)));
        net.add_primitive(Box::new(Vsource::dc("vb", b, gnd, 2.0)));
        net.elaborate().unwrap();
        assert_eq!(net.cluster_count(), 1);
    }

    #[test]
    fn test_unbound_terminal() {
        let mut net = network();
        let gnd = net.ground();
        net.add_primitive(Box::new(Resistor::new("r1", UNBOUND, gnd, 1.0)));
        let err = net.elaborate().unwrap_err();
        assert!(matches!(err, AmsError::UnboundTerminal { ref terminal, .. } if terminal == "p"));
        assert!(net.diagnostics().has_errors());
        assert!(!net.is_elaborated());
    }

    #[test]
    fn test_late_primitive_reelaborates() {
        let mut net = network();
        let gnd = net.ground();
        let a = net.add_node("a");
        let b = net.add_node("b");
        net.add_primitive(Box::new(Vsource::dc("va", a, gnd, 4.0)));
        net.add_primitive(Box::new(Resistor::new("ra", a, gnd, 10.0)));
        net.add_primitive(Box::new(Vsource::dc("vb", b, gnd, 1.0)));
        net.dc(SimTime::ZERO).unwrap();
        assert_eq!(net.cluster_count(), 2);

        net.add_primitive(Box::new(Resistor::new("rab", a, b, 10.0)));
        net.dc(SimTime::ZERO).unwrap();
        assert_eq!(net.cluster_count(), 1);
        assert_relative_eq!(net.node_value(b), 1.0);
    }

    #[test]
    fn test_parameter_change_through_handle() {
        let mut net = network();
        let gnd = net.ground();
        let a = net.add_node("a");
        let b = net.add_node("b");
        net.add_primitive(Box::new(Vsource::dc("v", a, gnd, 2.0)));
        let r1 = net.add_primitive(Box::new(Resistor::new("r1", a, b, 100.0)));
        net.add_primitive(Box::new(Resistor::new("r2", b, gnd, 100.0)));
        net.dc(SimTime::ZERO).unwrap();
        assert_relative_eq!(net.node_value(b), 1.0, epsilon = 1e-12);

        net.with_primitive::<Resistor, _>(r1, |r| r.set_resistance(300.0))
            .unwrap()
            .unwrap();
        net.dc(SimTime::ZERO).unwrap();
        assert_relative_eq!(net.node_value(b), 0.5, epsilon = 1e-12);
        assert!(net.with_primitive::<Capacitor, _>(r1, |_| ()).is_err());
    }

    #[test]
    fn test_lsf_gain_chain() {
        let mut net = network();
        let x = net.add_signal("x");
        let y = net.add_signal("y");
        let z = net.add_signal("z");
        net.add_primitive(Box::new(lsf::Source::new("src", x, crate::eln::Waveform::Dc(1.5))));
        net.add_primitive(Box::new(lsf::Gain::new("g", x, y, 2.0)));
        net.add_primitive(Box::new(lsf::Add::sub("d", y, x, z)));
        net.dc(SimTime::ZERO).unwrap();
        assert_relative_eq!(net.node_value(y), 3.0);
        assert_relative_eq!(net.node_value(z), 1.5);
    }

    #[test]
    fn test_lsf_integrator_ramp() {
        let mut net = network();
        let x = net.add_signal("x");
        let y = net.add_signal("y");
        net.add_primitive(Box::new(lsf::Source::new("one", x, crate::eln::Waveform::Dc(1.0))));
        net.add_primitive(Box::new(lsf::Integ::new("int", x, y, 1000.0)));
        net.set_integration_method(IntegrationMethod::Euler);
        net.dc(SimTime::ZERO).unwrap();
        assert_relative_eq!(net.node_value(y), 0.0);

        let h = SimTime::from_us(10);
        let mut t = SimTime::ZERO;
        for _ in 0..100 {
            t += h;
            net.step(t, h).unwrap();
        }
        // 1000 * 1 ms
        assert_relative_eq!(net.node_value(y), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_lsf_delay() {
        let mut net = network();
        let x = net.add_signal("x");
        let y = net.add_signal("y");
        let step = crate::eln::Waveform::Step {
            before: 0.0,
            after: 1.0,
            at: SimTime::from_us(10),
        };
        net.add_primitive(Box::new(lsf::Source::new("s", x, step)));
        net.add_primitive(Box::new(lsf::Delay::new("d", x, y, SimTime::from_us(20)).with_initial(-1.0)));
        net.dc(SimTime::ZERO).unwrap();
        assert_relative_eq!(net.node_value(y), -1.0);

        let h = SimTime::from_us(5);
        let mut t = SimTime::ZERO;
        let mut seen = Vec::new();
        for _ in 0..8 {
            t += h;
            net.step(t, h).unwrap();
            seen.push(net.node_value(y));
        }
        // y(t) = x(t - 20us); the step at 10 us shows up at 30 us.
        assert_eq!(seen, vec![-1.0, -1.0, -1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_export_stats() {
        let mut net = network();
        let gnd = net.ground();
        let a = net.add_node("a");
        net.add_primitive(Box::new(Vsource::dc("v", a, gnd, 1.0)));
        net.add_primitive(Box::new(Resistor::new("r", a, gnd, 1.0)));
        net.dc(SimTime::ZERO).unwrap();
        let stats = net.export_stats();
        assert_eq!(stats["stats"]["dc_solves"], 1);
        assert_eq!(stats["clusters"][0]["solver"]["factorizations"], 1);
    }
}
