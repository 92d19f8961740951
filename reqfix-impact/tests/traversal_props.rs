use proptest::prelude::*;
use reqfix_impact::{ImpactAnalyzer, estimate_effort};
use reqfix_types::graph::RequirementGraph;
use reqfix_types::requirement::{Priority, Requirement};
use std::collections::BTreeSet;

fn graph_from_edges(n: usize, edges: &[(usize, usize)]) -> RequirementGraph {
    let mut reqs: Vec<Requirement> = (0..n)
        .map(|i| Requirement::new(format!("R{i}"), format!("r{i}"), "system"))
        .collect();
    for (from, to) in edges {
        let to_id = format!("R{}", to % n);
        reqs[from % n].depends_on.insert(to_id);
    }
    RequirementGraph::from(reqs)
}

proptest! {
    #[test]
    fn impact_terminates_and_never_repeats(
        n in 1usize..12,
        edges in prop::collection::vec((0usize..12, 0usize..12), 0..40),
    ) {
        let graph = graph_from_edges(n, &edges);
        let analyzer = ImpactAnalyzer::new(&graph);
        let report = analyzer.analyze_impact("R0", None).expect("R0 exists");

        let ids: Vec<_> = report.affected.iter().map(|a| a.id.clone()).collect();
        let unique: BTreeSet<_> = ids.iter().cloned().collect();
        prop_assert_eq!(ids.len(), unique.len());
        prop_assert!(!unique.contains("R0"));
        prop_assert!(ids.len() < n.max(1));
    }

    #[test]
    fn dependency_graph_visits_each_node_once(
        n in 1usize..12,
        edges in prop::collection::vec((0usize..12, 0usize..12), 0..40),
    ) {
        let graph = graph_from_edges(n, &edges);
        let dg = ImpactAnalyzer::new(&graph).dependency_graph("R0").expect("R0 exists");

        let ids: Vec<_> = dg.nodes.iter().map(|node| node.id.clone()).collect();
        let unique: BTreeSet<_> = ids.iter().cloned().collect();
        prop_assert_eq!(ids.len(), unique.len());
        prop_assert!(ids.len() <= n);
    }

    #[test]
    fn effort_grows_with_affected_count(affected in 0usize..200) {
        for p in [Priority::Critical, Priority::High, Priority::Medium, Priority::Low] {
            let a = estimate_effort(p, affected);
            let b = estimate_effort(p, affected + 1);
            prop_assert!(b.hours >= a.hours);
        }
    }
}
