mod common;

use bnstructure::{
    ChiSquareOracle, ChiSquareTest, Dag, Dataset, DatasetBuilder, Error, IndependenceOracle,
    VariableSet,
};

/// `x` and `y` cycle through every combination and `z = x + y`.
fn sum_of_coins(records: usize) -> Dataset {
    let mut builder = DatasetBuilder::new(&["x", "y", "z"]).unwrap();
    for i in 0..records {
        let x = i % 2;
        let y = (i / 2) % 2;
        builder
            .push_record(&[x.to_string(), y.to_string(), (x + y).to_string()])
            .unwrap();
    }
    builder.build()
}

#[test]
fn independent_coins_are_usually_accepted() {
    let trials = 100;
    let mut accepted = 0;
    let mut p_total = 0.0;
    for seed in 0..trials {
        let data = common::sample(&Dag::new(2), 500, 0.0, seed);
        let result = ChiSquareTest::new(&data)
            .test(0, 1, &VariableSet::empty())
            .unwrap();
        assert!(result.sufficient_data);
        assert_eq!(result.degrees_of_freedom, 1.0);
        if result.is_independent(0.05) {
            accepted += 1;
        }
        p_total += result.p_value;
    }

    assert!(accepted >= 85, "only {} of {} accepted", accepted, trials);
    let mean = p_total / trials as f64;
    assert!(mean > 0.35 && mean < 0.65, "mean p-value {}", mean);
}

#[test]
fn conditioning_on_a_common_effect_creates_dependence() {
    let data = sum_of_coins(400);
    let tester = ChiSquareTest::new(&data);
    let none = VariableSet::empty();

    let x_z = tester.test(0, 2, &none).unwrap();
    assert!(x_z.p_value < 1e-6);
    assert_eq!(x_z.degrees_of_freedom, 2.0);

    let x_y = tester.test(0, 1, &none).unwrap();
    assert_eq!(x_y.statistic, 0.0);
    assert!(x_y.is_independent(0.05));

    let x_y_given_z = tester.test(0, 1, &VariableSet::new(&[2])).unwrap();
    assert!(!x_y_given_z.is_independent(0.05));
    assert_eq!(x_y_given_z.degrees_of_freedom, 3.0);
}

#[test]
fn conditioning_on_a_mediator_removes_dependence() {
    // 0 -> 1 -> 2 with little noise: the ends depend on each other only through the middle.
    let chain = Dag::from_edges(3, vec![(0, 1), (1, 2)]).unwrap();
    let data = common::sample(&chain, 2000, 0.1, 42);
    let oracle = ChiSquareOracle::new(&data, 0.001).unwrap();

    assert!(!oracle.is_independent(0, 2, &VariableSet::empty()).unwrap());
    assert!(oracle.is_independent(0, 2, &VariableSet::new(&[1])).unwrap());
    assert_eq!(oracle.num_variables(), 3);
}

#[test]
fn oracle_validates_significance_level() {
    let data = sum_of_coins(4);
    for &alpha in &[0.0, 1.0, 2.0] {
        assert!(matches!(
            ChiSquareOracle::new(&data, alpha),
            Err(Error::InvalidSignificanceLevel(_))
        ));
    }
}
