//! # Fusão de Intervalos
//!
//! O reconhecimento devolve candidatos que se sobrepõem ("breast cancer" e
//! "cancer"; "ATP" como Gene e como Chemical). Aqui eles viram um conjunto
//! **sem sobreposição**, ordenado por offset.
//!
//! ## Algoritmo
//!
//! 1. Ordena os candidatos por `(lo, hi)` numa [`IntervalTree`]. O(n log n).
//! 2. Varre o array ordenado ([`IntervalTree::into_clusters`]) agrupando
//!    intervalos que se sobrepõem **ou se tocam** (`a.hi == b.lo`) em
//!    grupos maximais. Varredura O(n).
//! 3. Cada grupo produz exatamente um vencedor:
//!
//! | Critério | Vence                                   |
//! |----------|-----------------------------------------|
//! | 1        | maior comprimento `hi - lo`             |
//! | 2        | maior precedência configurada do tipo   |
//! | 3        | menor `lo`                              |
//! | 4        | tipo declarado antes em [`EntityType`]  |
//! | 5        | menor id                                |
//!
//! Como o vencedor é escolhido sobre o grupo inteiro, o resultado não
//! depende da ordem de entrada.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;

use crate::config::AnnotatorConfig;
use crate::entity::EntityType;
use crate::recognition::CandidateAnnotation;

#[derive(Debug, Clone)]
struct Node<T> {
    lo: usize,
    hi: usize,
    /// Maior `hi` da subárvore enraizada neste nó.
    max_hi: usize,
    value: T,
}

/// Árvore de intervalos `[lo, hi)` estática.
///
/// Array ordenado por `lo`, visto como árvore binária implícita em que cada
/// nó guarda o maior `hi` da sua subárvore. O `max_hi` só serve às consultas
/// de [`IntervalTree::overlapping`] (inclusões do usuário contra anotações
/// automáticas); a fusão usa apenas a ordem.
#[derive(Debug, Clone)]
pub struct IntervalTree<T> {
    nodes: Vec<Node<T>>,
}

impl<T> IntervalTree<T> {
    pub fn new(items: impl IntoIterator<Item = (usize, usize, T)>) -> Self {
        let mut nodes: Vec<Node<T>> = items
            .into_iter()
            .map(|(lo, hi, value)| Node { lo, hi, max_hi: hi, value })
            .collect();
        nodes.sort_by_key(|n| (n.lo, n.hi));
        let len = nodes.len();
        Self::augment(&mut nodes, 0, len);
        Self { nodes }
    }

    /// Preenche `max_hi` da subárvore `[l, r)`, cuja raiz é o meio.
    fn augment(nodes: &mut [Node<T>], l: usize, r: usize) -> usize {
        if l >= r {
            return 0;
        }
        let mid = l + (r - l) / 2;
        let left = Self::augment(nodes, l, mid);
        let right = Self::augment(nodes, mid + 1, r);
        let max_hi = nodes[mid].hi.max(left).max(right);
        nodes[mid].max_hi = max_hi;
        max_hi
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Valores cujo intervalo cruza `[lo, hi)`.
    pub fn overlapping(&self, lo: usize, hi: usize) -> Vec<&T> {
        let mut found = Vec::new();
        self.search(0, self.nodes.len(), lo, hi, &mut found);
        found
    }

    fn search<'a>(&'a self, l: usize, r: usize, lo: usize, hi: usize, found: &mut Vec<&'a T>) {
        if l >= r {
            return;
        }
        let mid = l + (r - l) / 2;
        let node = &self.nodes[mid];
        if node.max_hi <= lo {
            return;
        }
        self.search(l, mid, lo, hi, found);
        if node.lo < hi && lo < node.hi {
            found.push(&node.value);
        }
        // à direita todos começam em `node.lo` ou depois
        if node.lo < hi {
            self.search(mid + 1, r, lo, hi, found);
        }
    }

    /// Grupos maximais de intervalos que se sobrepõem ou se tocam, em ordem.
    pub fn into_clusters(self) -> Vec<Vec<T>> {
        let mut clusters: Vec<Vec<T>> = Vec::new();
        let mut end = 0;
        for node in self.nodes {
            match clusters.last_mut() {
                Some(cluster) if node.lo <= end => {
                    cluster.push(node.value);
                    end = end.max(node.hi);
                }
                _ => {
                    end = node.hi;
                    clusters.push(vec![node.value]);
                }
            }
        }
        clusters
    }
}

/// Resolve sobreposições entre candidatos.
#[derive(Debug, Clone)]
pub struct IntervalMerger {
    precedence: BTreeMap<EntityType, u32>,
}

impl IntervalMerger {
    pub fn new(precedence: BTreeMap<EntityType, u32>) -> Self {
        Self { precedence }
    }

    pub fn from_config(config: &AnnotatorConfig) -> Self {
        Self::new(config.precedence.clone())
    }

    fn precedence_of(&self, entity_type: EntityType) -> u32 {
        self.precedence.get(&entity_type).copied().unwrap_or(0)
    }

    /// Ordem total entre candidatos: `Greater` vence.
    pub fn compare(&self, a: &CandidateAnnotation, b: &CandidateAnnotation) -> Ordering {
        let key = |c: &CandidateAnnotation| {
            (
                c.span_len(),
                self.precedence_of(c.entity_type),
                Reverse(c.lo),
                Reverse(c.entity_type),
            )
        };
        key(a)
            .cmp(&key(b))
            .then_with(|| b.entry.id.cmp(&a.entry.id))
    }

    /// Conjunto sem sobreposição, ordenado por `lo`.
    pub fn merge(&self, candidates: Vec<CandidateAnnotation>) -> Vec<CandidateAnnotation> {
        let tree = IntervalTree::new(candidates.into_iter().map(|c| (c.lo, c.hi, c)));
        tree.into_clusters()
            .into_iter()
            .filter_map(|cluster| cluster.into_iter().max_by(|a, b| self.compare(a, b)))
            .collect()
    }
}

impl Default for IntervalMerger {
    fn default() -> Self {
        Self::from_config(&AnnotatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::entry;
    use proptest::prelude::*;

    fn candidate(entity_type: EntityType, lo: usize, hi: usize, text: &str) -> CandidateAnnotation {
        CandidateAnnotation {
            entity_type,
            text: text.to_string(),
            lo,
            hi,
            page_number: 1,
            rects: vec![],
            entry: entry(&format!("{entity_type}-{lo}-{hi}"), "MESH", text, text),
            alternatives: vec![],
            global_inclusion: false,
        }
    }

    #[test]
    fn test_adjacent_same_type_keeps_longer() {
        let merger = IntervalMerger::default();
        let merged = merger.merge(vec![
            candidate(EntityType::Chemical, 17, 22, "word a"),
            candidate(EntityType::Chemical, 22, 32, "a long word"),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "a long word");
        assert_eq!((merged[0].lo, merged[0].hi), (22, 32));
    }

    #[test]
    fn test_same_span_uses_precedence() {
        let merger = IntervalMerger::default();
        let merged = merger.merge(vec![
            candidate(EntityType::Chemical, 17, 22, "word a"),
            candidate(EntityType::Gene, 17, 22, "word a"),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].entity_type, EntityType::Gene);
    }

    #[test]
    fn test_length_beats_precedence() {
        let merger = IntervalMerger::default();
        let merged = merger.merge(vec![
            candidate(EntityType::Species, 0, 6, "breast"),
            candidate(EntityType::Disease, 0, 13, "breast cancer"),
        ]);
        assert_eq!(merged[0].entity_type, EntityType::Disease);
    }

    #[test]
    fn test_precedence_table_is_configurable() {
        let mut table = BTreeMap::new();
        table.insert(EntityType::Chemical, 50);
        let merger = IntervalMerger::new(table);
        let merged = merger.merge(vec![
            candidate(EntityType::Gene, 0, 3, "ATP"),
            candidate(EntityType::Chemical, 0, 3, "ATP"),
        ]);
        assert_eq!(merged[0].entity_type, EntityType::Chemical);
    }

    #[test]
    fn test_disjoint_are_kept_in_order() {
        let merger = IntervalMerger::default();
        let merged = merger.merge(vec![
            candidate(EntityType::Disease, 30, 36, "cancer"),
            candidate(EntityType::Chemical, 0, 3, "ATP"),
        ]);
        let spans: Vec<(usize, usize)> = merged.iter().map(|c| (c.lo, c.hi)).collect();
        assert_eq!(spans, vec![(0, 3), (30, 36)]);
    }

    #[test]
    fn test_tree_overlapping_query() {
        let tree = IntervalTree::new(vec![(0, 5, "a"), (3, 8, "b"), (10, 12, "c"), (20, 30, "d")]);
        let mut found = tree.overlapping(4, 11);
        found.sort();
        assert_eq!(found, vec![&"a", &"b", &"c"]);
        // Tocar não é sobrepor
        assert!(tree.overlapping(8, 10).is_empty());
        assert_eq!(tree.overlapping(25, 26), vec![&"d"]);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_tree_clusters() {
        let tree = IntervalTree::new(vec![(0, 5, 1), (5, 7, 2), (9, 12, 3), (10, 11, 4)]);
        let clusters = tree.into_clusters();
        assert_eq!(clusters, vec![vec![1, 2], vec![3, 4]]);
    }

    fn arb_candidates() -> impl Strategy<Value = Vec<CandidateAnnotation>> {
        prop::collection::vec((0usize..80, 1usize..12, 0usize..14), 0..25).prop_map(|specs| {
            specs
                .into_iter()
                .map(|(lo, len, t)| candidate(EntityType::ALL[t], lo, lo + len, "x"))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_no_overlap(candidates in arb_candidates()) {
            let merged = IntervalMerger::default().merge(candidates);
            for pair in merged.windows(2) {
                prop_assert!(pair[0].hi < pair[1].lo, "{:?} e {:?} se sobrepõem", (pair[0].lo, pair[0].hi), (pair[1].lo, pair[1].hi));
            }
        }

        #[test]
        fn prop_idempotent(candidates in arb_candidates()) {
            let merger = IntervalMerger::default();
            let once = merger.merge(candidates);
            let twice = merger.merge(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_order_independent(candidates in arb_candidates()) {
            let merger = IntervalMerger::default();
            let mut reversed = candidates.clone();
            reversed.reverse();
            prop_assert_eq!(merger.merge(candidates), merger.merge(reversed));
        }

        #[test]
        fn prop_pairwise_tie_break(
            lo_a in 0usize..20, len_a in 1usize..10, ta in 0usize..14,
            lo_b in 0usize..20, len_b in 1usize..10, tb in 0usize..14,
        ) {
            let a = candidate(EntityType::ALL[ta], lo_a, lo_a + len_a, "a");
            let b = candidate(EntityType::ALL[tb], lo_b, lo_b + len_b, "b");
            prop_assume!(a.overlaps(&b));
            let merged = IntervalMerger::default().merge(vec![a.clone(), b.clone()]);
            prop_assert_eq!(merged.len(), 1);
            let winner = &merged[0];
            if a.span_len() != b.span_len() {
                prop_assert_eq!(winner.span_len(), a.span_len().max(b.span_len()));
            } else {
                let pa = a.entity_type.default_precedence();
                let pb = b.entity_type.default_precedence();
                prop_assert_eq!(winner.entity_type.default_precedence(), pa.max(pb));
            }
        }
    }
}
