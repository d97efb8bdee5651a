//! Graph builder / dependency resolver.
//!
//! Turns the declared nodes and the single present node into a validated [Dag]. Dependencies are resolved by name.
//! A graph that references unknown nodes, contains a cycle, or has anything but exactly one present node is rejected,
//! never silently repaired: reordering GPU work behind the caller's back would hide synchronisation bugs.
//!
//! The present node is always the last node of the DAG and its only sink. It depends on exactly the nodes the caller
//! wired into it, nothing is inferred from resource usage.

use std::{
    collections::{BTreeSet, VecDeque},
    fmt::Display,
};

use ahash::{AHashMap, AHashSet};
use frameloom::{QueueType, ResourceKey};
use smallvec::SmallVec;

use crate::{
    BuildError,
    barrier::sort_usages,
    node::{NodeDesc, NodeResourceUsage, PRESENT_NODE_NAME, PresentNodeDesc},
};

type NodeList = SmallVec<[usize; 4]>;

///Fixed size bit set over node indices.
#[derive(Clone, Debug, PartialEq, Eq)]
struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    fn new(len: usize) -> Self {
        BitSet {
            words: vec![0; len.div_ceil(64)],
        }
    }

    fn insert(&mut self, idx: usize) {
        self.words[idx / 64] |= 1 << (idx % 64);
    }

    fn contains(&self, idx: usize) -> bool {
        self.words[idx / 64] & (1 << (idx % 64)) != 0
    }

    fn union_with(&mut self, other: &BitSet) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= *b;
        }
    }
}

///What the builder needs to know about command list availability.
#[derive(Debug, Clone)]
pub(crate) struct ListBudget {
    ///Lists usable by user nodes, per queue. The present node's list is not part of this.
    pub(crate) available: AHashMap<QueueType, usize>,
}

///The resolved, validated graph. Read only while frames execute.
#[derive(Debug, Clone)]
pub struct Dag {
    pub(crate) names: Vec<String>,
    pub(crate) queues: Vec<QueueType>,
    ///Declared usages per node, deduplicated and sorted into lock order.
    pub(crate) usages: Vec<Vec<NodeResourceUsage>>,
    pub(crate) predecessors: Vec<NodeList>,
    pub(crate) successors: Vec<NodeList>,
    ///`(from, to)` pairs. The position of an edge is its semaphore index.
    pub(crate) edges: Vec<(usize, usize)>,
    pub(crate) incoming_edges: Vec<NodeList>,
    pub(crate) outgoing_edges: Vec<NodeList>,
    pub(crate) order: Vec<usize>,
    pub(crate) batches: Vec<Vec<usize>>,
    ///Command list `(queue, index)` of every node within a frame slot's pools.
    pub(crate) command_lists: Vec<(QueueType, usize)>,
    ///`reach[a]` holds every node that transitively depends on `a`.
    reach: Vec<BitSet>,
}

impl Dag {
    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    ///Index of the present node. Always the last node.
    pub fn present_index(&self) -> usize {
        self.names.len() - 1
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    ///All `(dependency, dependent)` edges by name. The present node is called [PRESENT_NODE_NAME].
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.edges
            .iter()
            .map(|(from, to)| (self.names[*from].as_str(), self.names[*to].as_str()))
    }

    ///Edge set, suitable to compare the structure of two builds.
    pub fn edge_set(&self) -> BTreeSet<(String, String)> {
        self.edges()
            .map(|(a, b)| (a.to_owned(), b.to_owned()))
            .collect()
    }

    ///Direct predecessors of `node`.
    pub fn predecessors(&self, node: &str) -> Option<Vec<&str>> {
        let idx = self.index_of(node)?;
        Some(
            self.predecessors[idx]
                .iter()
                .map(|p| self.names[*p].as_str())
                .collect(),
        )
    }

    pub fn present_predecessors(&self) -> Vec<&str> {
        self.predecessors[self.present_index()]
            .iter()
            .map(|p| self.names[*p].as_str())
            .collect()
    }

    ///Order in which node tasks become eligible when no task takes time.
    pub fn topological_order(&self) -> Vec<&str> {
        self.order.iter().map(|i| self.names[*i].as_str()).collect()
    }

    ///Submission batches. Every node's predecessors are in earlier batches.
    pub fn batches(&self) -> Vec<Vec<&str>> {
        self.batches
            .iter()
            .map(|b| b.iter().map(|i| self.names[*i].as_str()).collect())
            .collect()
    }

    ///True if `to` transitively depends on `from`.
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        match (self.index_of(from), self.index_of(to)) {
            (Some(f), Some(t)) => self.reach[f].contains(t),
            _ => false,
        }
    }

    pub(crate) fn ordered(&self, a: usize, b: usize) -> bool {
        self.reach[a].contains(b) || self.reach[b].contains(a)
    }

    pub fn command_list_of(&self, node: &str) -> Option<(QueueType, usize)> {
        self.index_of(node).map(|i| self.command_lists[i])
    }

    pub fn queue_of(&self, node: &str) -> Option<QueueType> {
        self.index_of(node).map(|i| self.queues[i])
    }
}

impl Display for Dag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Dag[{} nodes, {} edges, {} batches]",
            self.node_count(),
            self.edge_count(),
            self.batches.len()
        )?;
        for (level, batch) in self.batches.iter().enumerate() {
            write!(f, "  {}:", level)?;
            for node in batch {
                let (queue, list) = self.command_lists[*node];
                write!(f, " {}[{}#{}]", self.names[*node], queue, list)?;
                if !self.predecessors[*node].is_empty() {
                    write!(f, " <-")?;
                    for p in self.predecessors[*node].iter() {
                        write!(f, " {}", self.names[*p])?;
                    }
                }
                write!(f, ";")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub(crate) struct BuildInput<'a> {
    pub(crate) nodes: &'a [NodeDesc],
    pub(crate) present: &'a [PresentNodeDesc],
    pub(crate) budget: &'a ListBudget,
    pub(crate) detect_races: bool,
}

pub(crate) fn build(input: BuildInput<'_>) -> Result<Dag, BuildError> {
    let BuildInput {
        nodes,
        present,
        budget,
        detect_races,
    } = input;

    //names
    let mut lookup: AHashMap<&str, usize> = AHashMap::with_capacity(nodes.len());
    for (idx, node) in nodes.iter().enumerate() {
        if node.name.is_empty() {
            return Err(BuildError::EmptyNodeName);
        }
        if node.name == PRESENT_NODE_NAME {
            return Err(BuildError::ReservedName(node.name.clone()));
        }
        if lookup.insert(node.name.as_str(), idx).is_some() {
            return Err(BuildError::DuplicateNode(node.name.clone()));
        }
    }

    let present = match present {
        [] => return Err(BuildError::MissingPresentNode),
        [present] => present,
        more => return Err(BuildError::DuplicatePresentNode(more.len())),
    };

    let node_count = nodes.len() + 1;
    let present_index = nodes.len();

    //dependencies, by name
    let resolve = |node: &str, deps: &[String]| -> Result<NodeList, BuildError> {
        let mut resolved = NodeList::new();
        for dep in deps {
            if dep == PRESENT_NODE_NAME {
                return Err(BuildError::DependsOnPresent(node.to_owned()));
            }
            let Some(idx) = lookup.get(dep.as_str()) else {
                return Err(BuildError::MissingDependency {
                    node: node.to_owned(),
                    dependency: dep.clone(),
                });
            };
            if !resolved.contains(idx) {
                resolved.push(*idx);
            }
        }
        Ok(resolved)
    };

    let mut predecessors = Vec::with_capacity(node_count);
    for node in nodes {
        predecessors.push(resolve(&node.name, &node.dependencies)?);
    }
    predecessors.push(resolve(PRESENT_NODE_NAME, &present.dependencies)?);

    let mut names: Vec<String> = nodes.iter().map(|n| n.name.clone()).collect();
    names.push(PRESENT_NODE_NAME.to_owned());
    let mut queues: Vec<QueueType> = nodes.iter().map(|n| n.queue).collect();
    queues.push(QueueType::Graphics);

    //usages
    let mut usages = Vec::with_capacity(node_count);
    for (name, declared) in nodes
        .iter()
        .map(|n| (n.name.as_str(), &n.usages))
        .chain(std::iter::once((PRESENT_NODE_NAME, &present.usages)))
    {
        usages.push(normalize_usages(name, declared)?);
    }

    let mut successors = vec![NodeList::new(); node_count];
    let mut edges = Vec::new();
    let mut incoming_edges = vec![NodeList::new(); node_count];
    let mut outgoing_edges = vec![NodeList::new(); node_count];
    for (to, preds) in predecessors.iter().enumerate() {
        for from in preds.iter() {
            let edge = edges.len();
            edges.push((*from, to));
            successors[*from].push(to);
            incoming_edges[to].push(edge);
            outgoing_edges[*from].push(edge);
        }
    }

    let order = topological_order(&predecessors, &successors).map_err(|remaining| {
        let on_cycle = remaining
            .iter()
            .copied()
            .find(|n| lies_on_cycle(*n, &successors))
            .unwrap_or(remaining[0]);
        BuildError::Cycle {
            node: names[on_cycle].clone(),
        }
    })?;

    //every node must lead to the present node
    let mut feeds_present = vec![false; node_count];
    let mut stack = vec![present_index];
    feeds_present[present_index] = true;
    while let Some(n) = stack.pop() {
        for p in predecessors[n].iter() {
            if !feeds_present[*p] {
                feeds_present[*p] = true;
                stack.push(*p);
            }
        }
    }
    if let Some(disconnected) = feeds_present.iter().position(|f| !f) {
        return Err(BuildError::DisconnectedNode(names[disconnected].clone()));
    }

    let command_lists = assign_command_lists(&queues, present_index, budget)?;

    //transitive closure, in reverse launch order
    let mut reach = vec![BitSet::new(node_count); node_count];
    for n in order.iter().rev() {
        let mut set = BitSet::new(node_count);
        for s in successors[*n].iter() {
            set.insert(*s);
            set.union_with(&reach[*s]);
        }
        reach[*n] = set;
    }

    //submission batches
    let mut level = vec![0usize; node_count];
    for n in order.iter() {
        level[*n] = predecessors[*n]
            .iter()
            .map(|p| level[*p] + 1)
            .max()
            .unwrap_or(0);
    }
    let batch_count = level.iter().max().map(|l| l + 1).unwrap_or(0);
    let mut batches = vec![Vec::new(); batch_count];
    for (n, l) in level.iter().enumerate() {
        batches[*l].push(n);
    }

    let dag = Dag {
        names,
        queues,
        usages,
        predecessors,
        successors,
        edges,
        incoming_edges,
        outgoing_edges,
        order,
        batches,
        command_lists,
        reach,
    };

    if detect_races {
        find_unordered_access(&dag)?;
    }

    #[cfg(feature = "log_reasoning")]
    log::trace!("Schedule:\n{}", dag);

    Ok(dag)
}

///Drops duplicated declarations and sorts into lock order. Fails if the node wants one resource in two states in the
/// same frame slot.
fn normalize_usages(
    node: &str,
    declared: &[NodeResourceUsage],
) -> Result<Vec<NodeResourceUsage>, BuildError> {
    let mut usages: Vec<NodeResourceUsage> = Vec::with_capacity(declared.len());
    for usage in declared {
        let mut duplicate = false;
        for known in usages.iter().filter(|k| k.key() == usage.key()) {
            if !known.overlaps(usage) {
                continue;
            }
            if known.state() != usage.state() {
                return Err(BuildError::ConflictingStates {
                    node: node.to_owned(),
                    resource: usage.resource_name().to_owned(),
                });
            }
            if known.frame() == usage.frame() {
                duplicate = true;
            }
        }
        if !duplicate {
            usages.push(usage.clone());
        }
    }
    //a usage for every frame covers the per-frame ones of the same resource
    let everywhere: Vec<_> = usages
        .iter()
        .filter(|u| u.frame().is_none())
        .map(|u| u.key())
        .collect();
    usages.retain(|u| u.frame().is_none() || !everywhere.contains(&u.key()));
    sort_usages(&mut usages);
    Ok(usages)
}

///Kahn's algorithm. Roots are seeded in insertion order. On a cycle, returns the nodes that could not be ordered.
fn topological_order(predecessors: &[NodeList], successors: &[NodeList]) -> Result<Vec<usize>, Vec<usize>> {
    let mut in_degree: Vec<usize> = predecessors.iter().map(|p| p.len()).collect();
    let mut queue: VecDeque<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| n)
        .collect();

    let mut order = Vec::with_capacity(predecessors.len());
    while let Some(n) = queue.pop_front() {
        order.push(n);
        for s in successors[n].iter() {
            in_degree[*s] -= 1;
            if in_degree[*s] == 0 {
                queue.push_back(*s);
            }
        }
    }

    if order.len() == predecessors.len() {
        Ok(order)
    } else {
        Err(in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d > 0)
            .map(|(n, _)| n)
            .collect())
    }
}

fn lies_on_cycle(node: usize, successors: &[NodeList]) -> bool {
    let mut seen = vec![false; successors.len()];
    let mut stack: Vec<usize> = successors[node].to_vec();
    while let Some(n) = stack.pop() {
        if n == node {
            return true;
        }
        if !seen[n] {
            seen[n] = true;
            stack.extend(successors[n].iter().copied());
        }
    }
    false
}

fn assign_command_lists(
    queues: &[QueueType],
    present_index: usize,
    budget: &ListBudget,
) -> Result<Vec<(QueueType, usize)>, BuildError> {
    //graphics list 0 belongs to the present node
    let mut next: AHashMap<QueueType, usize> = AHashMap::new();
    next.insert(QueueType::Graphics, 1);

    let mut lists = Vec::with_capacity(queues.len());
    for (idx, queue) in queues.iter().enumerate() {
        if idx == present_index {
            lists.push((QueueType::Graphics, 0));
            continue;
        }
        let offset = if *queue == QueueType::Graphics { 1 } else { 0 };
        let slot = next.entry(*queue).or_insert(0);
        lists.push((*queue, *slot));
        *slot += 1;

        let requested = *slot - offset;
        let available = budget.available.get(queue).copied().unwrap_or(0);
        if requested > available {
            return Err(BuildError::OutOfCommandLists {
                queue: *queue,
                requested: queues[..present_index]
                    .iter()
                    .filter(|q| *q == queue)
                    .count(),
                available,
            });
        }
    }
    Ok(lists)
}

///Rejects node pairs without ordering that touch one resource where at least one writes, or that need different
/// states.
fn find_unordered_access(dag: &Dag) -> Result<(), BuildError> {
    let mut users: AHashMap<ResourceKey, Vec<(usize, &NodeResourceUsage)>> = AHashMap::new();
    for (node, usages) in dag.usages.iter().enumerate() {
        for usage in usages {
            users.entry(usage.key()).or_default().push((node, usage));
        }
    }

    let mut reported: AHashSet<(usize, usize)> = AHashSet::new();
    let mut conflicts = Vec::new();
    for list in users.values() {
        for (i, (a, ua)) in list.iter().enumerate() {
            for (b, ub) in list[i + 1..].iter() {
                if a == b || dag.ordered(*a, *b) || !ua.overlaps(ub) {
                    continue;
                }
                let conflicting = ua.state() != ub.state()
                    || ua.state().is_write()
                    || ub.state().is_write();
                if conflicting && reported.insert(((*a).min(*b), (*a).max(*b))) {
                    conflicts.push(((*a).min(*b), (*a).max(*b), ua.resource_name()));
                }
            }
        }
    }

    //deterministic report regardless of map order
    conflicts.sort_by(|x, y| (x.0, x.1, x.2).cmp(&(y.0, y.1, y.2)));
    if let Some((first, second, resource)) = conflicts.first() {
        #[cfg(feature = "logging")]
        log::error!(
            "{} unordered resource access(es), first: {} between \"{}\" and \"{}\"",
            conflicts.len(),
            resource,
            dag.names[*first],
            dag.names[*second]
        );
        return Err(BuildError::UnorderedResourceAccess {
            resource: (*resource).to_owned(),
            first: dag.names[*first].clone(),
            second: dag.names[*second].clone(),
        });
    }
    Ok(())
}
