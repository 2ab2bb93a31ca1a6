use bnstructure::constraint::{estimate_skeleton, pdag_to_dag, skeleton_to_pdag};
use bnstructure::{
    ConstraintEstimator, DSeparationOracle, Dag, DatasetBuilder, OrientationRules, PcConfig,
    PcVariant, VariableSet,
};

type Edges = &'static [(usize, usize)];

macro_rules! check_round_trip {
    ($($name:ident: $nodes:expr, $edges:expr => directed $directed:expr, undirected $undirected:expr;)*) => {
        $(
        #[test]
        fn $name() {
            check($nodes, $edges, $directed, $undirected);
        }
        )*
    }
}

check_round_trip! {
    chain: 3, &[(0, 1), (1, 2)]
        => directed &[], undirected &[(0, 1), (1, 2)];
    collider: 3, &[(0, 2), (1, 2)]
        => directed &[(0, 2), (1, 2)], undirected &[];
    collider_with_tail: 4, &[(0, 2), (1, 2), (2, 3)]
        => directed &[(0, 2), (1, 2), (2, 3)], undirected &[];
    diamond: 4, &[(0, 1), (0, 2), (1, 3), (2, 3)]
        => directed &[(1, 3), (2, 3)], undirected &[(0, 1), (0, 2)];
    triangle: 3, &[(0, 1), (1, 2), (0, 2)]
        => directed &[], undirected &[(0, 1), (0, 2), (1, 2)];
    two_colliders: 5, &[(0, 2), (1, 2), (2, 3), (3, 4), (1, 4)]
        => directed &[(0, 2), (1, 2), (1, 4), (2, 3), (3, 4)], undirected &[];
    disconnected: 4, &[(0, 1)]
        => directed &[], undirected &[(0, 1)];
}

/// Runs PC on the exact independencies of a DAG and checks that exactly the compelled edges come
/// out directed, under both skeleton variants.
fn check(nodes: usize, edges: Edges, directed: Edges, undirected: Edges) {
    let dag = Dag::from_edges(nodes, edges.iter().copied()).unwrap();
    let oracle = DSeparationOracle::new(&dag);

    for &variant in &[PcVariant::Stable, PcVariant::Original] {
        let config = PcConfig::default().variant(variant);
        let (skeleton, separating_sets) = estimate_skeleton(&oracle, &config).unwrap();
        assert_eq!(skeleton, dag.skeleton(), "{:?}", variant);
        for a in 0..nodes {
            for b in a + 1..nodes {
                match separating_sets.get(a, b) {
                    Some(separator) => assert!(dag.is_d_separated(a, b, separator)),
                    None => assert!(dag.is_adjacent(a, b)),
                }
            }
        }

        let pdag = skeleton_to_pdag(&skeleton, &separating_sets, OrientationRules::Meek);
        assert_eq!(pdag.directed_edges(), directed, "{:?}", variant);
        assert_eq!(pdag.undirected_edges(), undirected, "{:?}", variant);

        // Any extension is Markov equivalent to the original.
        let extension = pdag_to_dag(&pdag, OrientationRules::Meek);
        assert_eq!(extension.skeleton(), dag.skeleton());
        assert_eq!(extension.v_structures(), dag.v_structures());
    }
}

#[test]
fn separating_sets_are_minimal() {
    let dag = Dag::from_edges(4, vec![(0, 1), (1, 2), (2, 3)]).unwrap();
    let (_, separating_sets) =
        estimate_skeleton(&DSeparationOracle::new(&dag), &PcConfig::default()).unwrap();
    assert_eq!(separating_sets.len(), 3);
    assert_eq!(separating_sets.get(2, 0), Some(&VariableSet::new(&[1])));
    assert_eq!(separating_sets.get(0, 3).map(VariableSet::len), Some(1));
}

#[test]
fn conditioning_cap_keeps_untestable_edges() {
    // 0 and 3 are only separated by conditioning on both 1 and 2.
    let dag = Dag::from_edges(4, vec![(0, 1), (0, 2), (1, 3), (2, 3)]).unwrap();
    let config = PcConfig::default().max_cond_vars(1);
    let (skeleton, _) = estimate_skeleton(&DSeparationOracle::new(&dag), &config).unwrap();
    assert!(skeleton.is_adjacent(0, 3));
    assert!(!skeleton.is_adjacent(1, 2));
}

#[test]
fn data_driven_pc_orients_a_collider() {
    // x and y cycle through every combination; z is their OR, flipped in one record of seven.
    let mut builder = DatasetBuilder::new(&["x", "y", "z"]).unwrap();
    for i in 0..1400 {
        let x = i % 2 == 1;
        let y = (i / 2) % 2 == 1;
        let z = (x || y) ^ (i % 7 == 0);
        let record: Vec<&str> = [x, y, z]
            .iter()
            .map(|&b| if b { "1" } else { "0" })
            .collect();
        builder.push_record(&record).unwrap();
    }
    let data = builder.build();

    let estimator = ConstraintEstimator::new(&data, PcConfig::default()).unwrap();
    let pdag = estimator.estimate_pdag().unwrap();
    assert_eq!(pdag.directed_edges(), vec![(0, 2), (1, 2)]);
    assert!(pdag.undirected_edges().is_empty());

    let dag = estimator.estimate().unwrap();
    assert_eq!(dag.edges().collect::<Vec<_>>(), vec![(0, 2), (1, 2)]);
}
