mod common;

use bnstructure::search::all_dags;
use bnstructure::{Dag, ScoreMethod, Scorer, VariableSet};
use common::close;

macro_rules! check_method {
    ($($name:ident => $method:expr,)*) => {
        $(
        mod $name {
            use super::*;

            #[test]
            fn graph_score_decomposes() {
                check_decomposes($method);
            }

            #[test]
            fn parity_needs_both_parents() {
                check_parity($method);
            }
        }
        )*
    }
}

check_method! {
    k2 => ScoreMethod::K2,
    bdeu => ScoreMethod::default(),
    bdeu_weak_prior => ScoreMethod::BDeu { equivalent_sample_size: 0.5 },
    bic => ScoreMethod::Bic,
}

fn check_decomposes(method: ScoreMethod) {
    let truth = Dag::from_edges(3, vec![(0, 1), (1, 2)]).unwrap();
    let data = common::sample(&truth, 500, 0.1, 1);
    let scorer = Scorer::new(&data, method).unwrap();

    for dag in all_dags(3) {
        let total = scorer.score(&dag).unwrap();
        let sum: f64 = (0..3)
            .map(|v| scorer.local_score(v, dag.parents(v)).unwrap())
            .sum();
        assert!(close(total, sum), "{:?}: {} != {}", dag, total, sum);

        // One more edge changes only the child's term.
        for from in 0..3 {
            for to in 0..3 {
                let mut next = dag.clone();
                if from == to || next.add_edge(from, to).is_err() {
                    continue;
                }
                let expected = total - scorer.local_score(to, dag.parents(to)).unwrap()
                    + scorer.local_score(to, next.parents(to)).unwrap();
                assert!(close(scorer.score(&next).unwrap(), expected));
            }
        }
    }
}

fn check_parity(method: ScoreMethod) {
    let data = common::xor(2000, 0.05, 7);
    let scorer = Scorer::new(&data, method).unwrap();
    let both = Dag::from_edges(3, vec![(0, 2), (1, 2)]).unwrap();
    let best = scorer.score(&both).unwrap();

    for dag in all_dags(3).filter(|dag| dag.num_edges() <= 1) {
        let score = scorer.score(&dag).unwrap();
        assert!(best > score, "{:?} scored {} against {}", dag, score, best);
    }

    let z = 2;
    let full = scorer.local_score(z, &VariableSet::new(&[0, 1])).unwrap();
    for parents in &[VariableSet::empty(), VariableSet::new(&[0]), VariableSet::new(&[1])] {
        assert!(full > scorer.local_score(z, parents).unwrap());
    }
}

#[test]
fn bdeu_and_bic_are_score_equivalent() {
    let truth = Dag::from_edges(2, vec![(0, 1)]).unwrap();
    let data = common::sample(&truth, 300, 0.2, 2);
    for &method in &[ScoreMethod::default(), ScoreMethod::Bic] {
        let scorer = Scorer::new(&data, method).unwrap();
        let forward = scorer.score(&truth).unwrap();
        let backward = scorer
            .score(&Dag::from_edges(2, vec![(1, 0)]).unwrap())
            .unwrap();
        assert!(close(forward, backward), "{:?}", method);
    }
}

#[test]
fn unobserved_configurations_do_not_change_scores() {
    // An extra parent state that never occurs adds only empty rows, and K2's prior is per cell.
    let mut narrow = bnstructure::DatasetBuilder::new(&["a", "b"]).unwrap();
    let mut wide = bnstructure::DatasetBuilder::new(&["a", "b"]).unwrap();
    wide.declare_states("a", &["0", "1", "2"]).unwrap();
    for record in &[["0", "0"], ["0", "1"], ["1", "1"], ["1", "1"], ["0", "0"]] {
        narrow.push_record(record).unwrap();
        wide.push_record(record).unwrap();
    }
    let (narrow, wide) = (narrow.build(), wide.build());

    let parents = VariableSet::new(&[0]);
    let k2 = |data| {
        Scorer::new(data, ScoreMethod::K2)
            .unwrap()
            .local_score(1, &parents)
            .unwrap()
    };
    assert!(close(k2(&narrow), k2(&wide)));
}
