use anyhow::{anyhow, bail, Context, Result};
use bnstructure::*;
use clap::{Parser, Subcommand, ValueEnum};
use csv_core::{ReadFieldResult, ReaderBuilder};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::str;

/// Learn the structure of a discrete Bayesian network from tab-separated data.
///
/// The first line names the variables; every later line is one fully observed record.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Data file to read; standard input if omitted.
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    /// Scoring function for score-based searches.
    #[arg(long, value_enum, default_value_t = ScoreKind::Bdeu, global = true)]
    score: ScoreKind,

    /// Equivalent sample size for BDeu.
    #[arg(long, default_value_t = 5.0, global = true)]
    ess: f64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScoreKind {
    K2,
    Bdeu,
    Bic,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Greedy search over single-edge edits.
    HillClimb {
        #[arg(long, default_value_t = 0)]
        tabu_length: usize,
        #[arg(long)]
        max_indegree: Option<usize>,
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Only allow this edge, written FROM:TO. May be repeated.
        #[arg(long = "allow", value_name = "FROM:TO")]
        white_list: Vec<String>,
        /// Never allow this edge, written FROM:TO. May be repeated.
        #[arg(long = "forbid", value_name = "FROM:TO")]
        black_list: Vec<String>,
    },

    /// Score every DAG over a handful of variables.
    Exhaustive {
        #[arg(long, default_value_t = 5)]
        max_variables: usize,
        /// How many of the best graphs to print.
        #[arg(long, default_value_t = 1)]
        top: usize,
    },

    /// The PC algorithm with chi-square tests.
    Pc {
        #[arg(long, default_value_t = 0.05)]
        significance_level: f64,
        #[arg(long)]
        max_cond_vars: Option<usize>,
        /// Use live adjacencies instead of freezing them per level.
        #[arg(long)]
        original: bool,
        /// Also apply Meek's fourth rule.
        #[arg(long)]
        rule4: bool,
        /// Stop at the partially directed graph.
        #[arg(long)]
        pdag: bool,
    },

    /// Max-min hill climbing.
    Mmhc {
        #[arg(long, default_value_t = 0.05)]
        significance_level: f64,
        #[arg(long, default_value_t = 10)]
        tabu_length: usize,
        #[arg(long)]
        max_indegree: Option<usize>,
        #[arg(long)]
        max_iterations: Option<usize>,
        #[arg(long)]
        max_cond_vars: Option<usize>,
    },
}

fn load_data<I: io::Read>(mut input: I) -> Result<Dataset> {
    let mut inputbuf = [0; 16384];
    let mut fieldbuf = [0; 1024];
    let mut fieldlen = 0;
    let mut record = Vec::new();
    let mut builder: Option<DatasetBuilder> = None;
    let mut tsv = ReaderBuilder::new().delimiter(b'\t').build();

    loop {
        let read = input.read(&mut inputbuf)?;
        let mut bytes = &inputbuf[..read];
        loop {
            let (result, nin, nout) = tsv.read_field(bytes, &mut fieldbuf[fieldlen..]);
            bytes = &bytes[nin..];
            fieldlen += nout;
            match result {
                ReadFieldResult::InputEmpty => break,
                ReadFieldResult::OutputFull => {
                    bail!("field too long on line {}", tsv.line());
                }
                ReadFieldResult::Field { record_end } => {
                    let field = str::from_utf8(&fieldbuf[..fieldlen])
                        .with_context(|| format!("invalid UTF-8 on line {}", tsv.line()))?;
                    record.push(field.to_owned());
                    fieldlen = 0;

                    if record_end {
                        if let Some(builder) = builder.as_mut() {
                            builder
                                .push_record(&record[..])
                                .with_context(|| format!("on line {}", tsv.line()))?;
                        } else {
                            builder = Some(DatasetBuilder::new(&record[..])?);
                        }
                        record.clear();
                    }
                }
                ReadFieldResult::End => {
                    let builder = builder.ok_or_else(|| anyhow!("no header line"))?;
                    return Ok(builder.build());
                }
            }
        }
    }
}

fn edge_names(data: &Dataset, edges: &[String]) -> Result<Vec<(Variable, Variable)>> {
    edges
        .iter()
        .map(|edge| -> Result<(Variable, Variable)> {
            let (from, to) = edge
                .split_once(':')
                .ok_or_else(|| anyhow!("edge {:?} should be written FROM:TO", edge))?;
            Ok((data.variable(from)?, data.variable(to)?))
        })
        .collect()
}

fn print_dag(data: &Dataset, dag: &Dag) {
    for (from, to) in dag.edges() {
        println!("{} -> {}", data.name(from), data.name(to));
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let data = match &cli.input {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("can't open {}", path.display()))?;
            load_data(io::BufReader::new(file))?
        }
        None => load_data(io::stdin().lock())?,
    };
    log::info!(
        "read {} records of {} variables",
        data.len(),
        data.num_variables()
    );

    let method = match cli.score {
        ScoreKind::K2 => ScoreMethod::K2,
        ScoreKind::Bdeu => ScoreMethod::bdeu(cli.ess)?,
        ScoreKind::Bic => ScoreMethod::Bic,
    };

    match cli.command {
        Command::HillClimb {
            tabu_length,
            max_indegree,
            max_iterations,
            white_list,
            black_list,
        } => {
            let scorer = Scorer::new(&data, method)?;
            let mut config = HillClimbConfig::default()
                .tabu_length(tabu_length)
                .black_list(edge_names(&data, &black_list)?);
            if !white_list.is_empty() {
                config = config.white_list(edge_names(&data, &white_list)?);
            }
            if let Some(max_indegree) = max_indegree {
                config = config.max_indegree(max_indegree);
            }
            if let Some(max_iterations) = max_iterations {
                config = config.max_iterations(max_iterations);
            }

            let outcome = HillClimbSearch::new(&scorer, config)?.climb()?;
            print_dag(&data, &outcome.dag);
            println!("score: {:.5}", outcome.score);
        }

        Command::Exhaustive { max_variables, top } => {
            let scorer = Scorer::new(&data, method)?;
            let ranked = ExhaustiveSearch::new(&scorer)
                .max_variables(max_variables)
                .all_scores()?;
            for (rank, (score, dag)) in ranked.iter().take(top).enumerate() {
                println!();
                println!("#{} score: {:.5}", rank + 1, score);
                print_dag(&data, dag);
            }
        }

        Command::Pc {
            significance_level,
            max_cond_vars,
            original,
            rule4,
            pdag,
        } => {
            let mut config = PcConfig::default().significance_level(significance_level);
            if let Some(max_cond_vars) = max_cond_vars {
                config = config.max_cond_vars(max_cond_vars);
            }
            if original {
                config = config.variant(PcVariant::Original);
            }
            if rule4 {
                config = config.rules(OrientationRules::WithRule4);
            }

            let estimator = ConstraintEstimator::new(&data, config)?;
            if pdag {
                let pdag = estimator.estimate_pdag()?;
                for (from, to) in pdag.directed_edges() {
                    println!("{} -> {}", data.name(from), data.name(to));
                }
                for (a, b) in pdag.undirected_edges() {
                    println!("{} -- {}", data.name(a), data.name(b));
                }
            } else {
                print_dag(&data, &estimator.estimate()?);
            }
        }

        Command::Mmhc {
            significance_level,
            tabu_length,
            max_indegree,
            max_iterations,
            max_cond_vars,
        } => {
            let scorer = Scorer::new(&data, method)?;
            let mut config = MmhcConfig::default()
                .significance_level(significance_level)
                .tabu_length(tabu_length);
            if let Some(max_indegree) = max_indegree {
                config = config.max_indegree(max_indegree);
            }
            if let Some(max_iterations) = max_iterations {
                config = config.max_iterations(max_iterations);
            }
            if let Some(max_cond_vars) = max_cond_vars {
                config = config.max_cond_vars(max_cond_vars);
            }

            let outcome = MmhcEstimator::new(&scorer, config)?.search()?;
            print_dag(&data, &outcome.dag);
            println!("score: {:.5}", outcome.score);
        }
    }

    Ok(())
}
