//! 依存グラフ
//!
//! エッジ `A -> B` は「B を A より先にプロビジョニングする」ことを表します。
//! トポロジカル順序は Kahn のアルゴリズムで求め、順序制約のないノード同士は
//! 宣言順で並べるため、同じグラフからは常に同じ順序が得られます。

use crate::error::{Result, StackError};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 宣言順のノードID
    ids: Vec<String>,
    index: HashMap<String, usize>,
    /// ノードごとの依存先 (宣言インデックス)
    dependencies: Vec<BTreeSet<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// 宣言順のノードID
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn add_node(&mut self, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(StackError::DuplicateNode(id));
        }
        self.index.insert(id.clone(), self.ids.len());
        self.ids.push(id);
        self.dependencies.push(BTreeSet::new());
        Ok(())
    }

    /// `dependent` が `dependency` に依存するエッジを追加
    ///
    /// 既に存在するエッジの追加は何もしません。新規に追加された場合 `true` を返します。
    pub fn add_edge(&mut self, dependent: &str, dependency: &str) -> Result<bool> {
        let from = self.position(dependent)?;
        let to = self
            .index
            .get(dependency)
            .copied()
            .ok_or_else(|| StackError::UnknownDependency(dependency.to_string()))?;
        Ok(self.dependencies[from].insert(to))
    }

    pub fn has_edge(&self, dependent: &str, dependency: &str) -> bool {
        match (self.index.get(dependent), self.index.get(dependency)) {
            (Some(&from), Some(&to)) => self.dependencies[from].contains(&to),
            _ => false,
        }
    }

    /// 直接の依存先 (宣言順)
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        match self.index.get(id) {
            Some(&i) => self.dependencies[i]
                .iter()
                .map(|&d| self.ids[d].as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// 直接の依存元 (宣言順)
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        let Some(&target) = self.index.get(id) else {
            return Vec::new();
        };
        self.dependencies
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.contains(&target))
            .map(|(i, _)| self.ids[i].as_str())
            .collect()
    }

    /// 推移的な依存先 (自身を含まない)
    pub fn transitive_dependencies(&self, id: &str) -> BTreeSet<String> {
        self.closure(id, |graph, node| graph.dependencies_of(node))
    }

    /// 推移的な依存元 (自身を含まない)
    pub fn transitive_dependents(&self, id: &str) -> BTreeSet<String> {
        self.closure(id, |graph, node| graph.dependents_of(node))
    }

    fn closure<'a>(
        &'a self,
        id: &str,
        next: impl Fn(&'a Self, &str) -> Vec<&'a str>,
    ) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = next(self, id);
        while let Some(node) = stack.pop() {
            if node != id && seen.insert(node.to_string()) {
                stack.extend(next(self, node));
            }
        }
        seen
    }

    /// トポロジカル順序
    ///
    /// 全てのエッジについて依存先が依存元より前に来る順列を返します。
    /// 循環がある場合は部分的な順序を返さず、循環に含まれるノードを
    /// `CyclicDependency` で報告します。
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let n = self.ids.len();
        let mut remaining: Vec<usize> = self.dependencies.iter().map(BTreeSet::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (node, deps) in self.dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(node);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(node)) = ready.pop() {
            order.push(self.ids[node].clone());
            for &dependent in &dependents[node] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() == n {
            return Ok(order);
        }

        let cycle = self.find_cycle(&remaining);
        tracing::debug!(cycle = ?cycle, "Dependency cycle detected");
        Err(StackError::CyclicDependency(cycle))
    }

    /// 未処理ノードから循環を一つ取り出す
    ///
    /// 未処理ノードはいずれも未処理の依存先を持つため、依存先を辿れば
    /// 必ず既に通過したノードに戻ります。
    fn find_cycle(&self, remaining: &[usize]) -> Vec<String> {
        let pending = |i: usize| remaining[i] > 0;
        let Some(start) = (0..self.ids.len()).find(|&i| pending(i)) else {
            return Vec::new();
        };

        let mut path: Vec<usize> = Vec::new();
        let mut visited_at: HashMap<usize, usize> = HashMap::new();
        let mut current = start;
        loop {
            if let Some(&pos) = visited_at.get(&current) {
                let mut cycle: Vec<String> =
                    path[pos..].iter().map(|&i| self.ids[i].clone()).collect();
                cycle.push(self.ids[current].clone());
                return cycle;
            }
            visited_at.insert(current, path.len());
            path.push(current);
            match self.dependencies[current].iter().copied().find(|&d| pending(d)) {
                Some(next) => current = next,
                None => return path.iter().map(|&i| self.ids[i].clone()).collect(),
            }
        }
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| StackError::UnknownNode(id.to_string()))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn name(i: usize) -> String {
        format!("n{}", i)
    }

    /// ノード数、各ノードの位相ランク、ランクの高い側から低い側へのエッジ
    fn arb_dag() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
        (1..24usize).prop_flat_map(|n| {
            (
                Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
                prop::collection::vec((0..n, 0..n), 0..n * 3),
            )
                .prop_map(move |(rank, pairs)| {
                    let edges = pairs
                        .into_iter()
                        .filter(|(a, b)| rank[*a] > rank[*b])
                        .collect();
                    (n, edges)
                })
        })
    }

    /// 任意のエッジに加えて必ず一つの循環を含むグラフ
    fn arb_cyclic() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
        (1..16usize).prop_flat_map(|n| {
            (
                Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
                1..=n,
                prop::collection::vec((0..n, 0..n), 0..n * 2),
            )
                .prop_map(move |(members, len, mut edges)| {
                    let ring = &members[..len];
                    for i in 0..len {
                        edges.push((ring[i], ring[(i + 1) % len]));
                    }
                    (n, edges)
                })
        })
    }

    fn build(n: usize, edges: &[(usize, usize)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for i in 0..n {
            g.add_node(name(i)).unwrap();
        }
        for (from, to) in edges {
            g.add_edge(&name(*from), &name(*to)).unwrap();
        }
        g
    }

    proptest! {
        #[test]
        fn prop_order_is_permutation_respecting_edges((n, edges) in arb_dag()) {
            let g = build(n, &edges);
            let order = g.topological_order().unwrap();

            let mut sorted = order.clone();
            sorted.sort();
            let mut expected: Vec<String> = (0..n).map(name).collect();
            expected.sort();
            prop_assert_eq!(sorted, expected);

            let pos = |id: &str| order.iter().position(|o| o == id).unwrap();
            for (from, to) in &edges {
                prop_assert!(pos(&name(*to)) < pos(&name(*from)));
            }
        }

        #[test]
        fn prop_order_is_deterministic((n, edges) in arb_dag()) {
            let first = build(n, &edges).topological_order().unwrap();
            let again = build(n, &edges).topological_order().unwrap();
            let reversed: Vec<_> = edges.iter().rev().copied().collect();
            let reordered = build(n, &reversed).topological_order().unwrap();

            prop_assert_eq!(&first, &again);
            prop_assert_eq!(&first, &reordered);
        }

        #[test]
        fn prop_cycle_is_reported_as_closed_chain((n, edges) in arb_cyclic()) {
            let g = build(n, &edges);
            match g.topological_order() {
                Err(StackError::CyclicDependency(cycle)) => {
                    prop_assert!(cycle.len() >= 2);
                    prop_assert_eq!(cycle.first(), cycle.last());
                    for pair in cycle.windows(2) {
                        prop_assert!(g.has_edge(&pair[0], &pair[1]), "{} -> {} is not an edge", pair[0], pair[1]);
                    }
                    let mut members = cycle[..cycle.len() - 1].to_vec();
                    members.sort();
                    members.dedup();
                    prop_assert_eq!(members.len(), cycle.len() - 1);
                }
                other => prop_assert!(false, "Expected CyclicDependency, got {:?}", other),
            }
        }
    }
}
