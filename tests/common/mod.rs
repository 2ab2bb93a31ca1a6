#![allow(dead_code)]

use bnstructure::{Dag, Dataset, DatasetBuilder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const STATES: [&str; 2] = ["0", "1"];

fn binary_builder(names: &[String]) -> DatasetBuilder {
    let mut builder = DatasetBuilder::new(names).unwrap();
    for name in names {
        builder.declare_states(name, &STATES).unwrap();
    }
    builder
}

fn labels(values: &[bool]) -> Vec<&'static str> {
    values.iter().map(|&b| STATES[b as usize]).collect()
}

/// `x` and `y` are fair coins and `z` is their exclusive or, flipped with probability `noise`.
pub fn xor(records: usize, noise: f64, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let names: Vec<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
    let mut builder = binary_builder(&names);
    for _ in 0..records {
        let x = rng.gen_bool(0.5);
        let y = rng.gen_bool(0.5);
        let z = (x ^ y) ^ rng.gen_bool(noise);
        builder.push_record(&labels(&[x, y, z])).unwrap();
    }
    builder.build()
}

/// Forward-samples binary data from `dag`. Roots are fair coins; every other node is the OR of
/// its parents, flipped with probability `noise`. Variables are named `v0`, `v1`, and so on.
pub fn sample(dag: &Dag, records: usize, noise: f64, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = dag.num_nodes();
    let names: Vec<String> = (0..n).map(|v| format!("v{}", v)).collect();
    let mut builder = binary_builder(&names);
    let order = dag.topological_order();
    let mut values = vec![false; n];
    for _ in 0..records {
        for &node in &order {
            let parents = dag.parents(node);
            let value = if parents.is_empty() {
                rng.gen_bool(0.5)
            } else {
                parents.iter().any(|p| values[p]) ^ rng.gen_bool(noise)
            };
            values[node] = value;
        }
        builder.push_record(&labels(&values)).unwrap();
    }
    builder.build()
}

/// `x` and `y` cycle through all four combinations in turn and `z` is exactly their exclusive
/// or, so every marginal is perfectly balanced.
pub fn balanced_xor(records: usize) -> Dataset {
    let names: Vec<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
    let mut builder = binary_builder(&names);
    for i in 0..records {
        let x = i % 2 == 1;
        let y = (i / 2) % 2 == 1;
        builder.push_record(&labels(&[x, y, x ^ y])).unwrap();
    }
    builder.build()
}

pub fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9 * a.abs().max(b.abs()).max(1.0)
}
