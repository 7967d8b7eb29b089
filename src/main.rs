//! Command-line demo for `scalarflow`: builds and solves the seed scenarios
//! (polynomial fit, circle fit, Rosenbrock) from the command line, printing
//! the computation graph and the optimizer's result record.

use anyhow::Result;
use clap::{Parser, ValueEnum};

use scalarflow::optim::{nonlinear_least_squares, LbfgsOptions, LmOptions};
use scalarflow::{backward, compile, Value};

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[arg(value_enum)]
    scenario: Scenario,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Scenario {
    Polynomial,
    Circle,
    Rosenbrock,
    Graph,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match args.scenario {
        Scenario::Polynomial => run_polynomial(args.verbose)?,
        Scenario::Circle => run_circle(args.verbose)?,
        Scenario::Rosenbrock => run_rosenbrock(args.verbose)?,
        Scenario::Graph => run_graph_demo()?,
    }
    Ok(())
}

fn run_polynomial(verbose: bool) -> Result<()> {
    let w = Value::param(0.5, "w");
    let b = Value::param(0.5, "b");
    let residuals = vec![&w * 2.0 - 4.0, &b * 3.0 - 9.0];
    let compiled = compile(&[w, b], |_| residuals.clone())?;

    let options = LmOptions::default().with_verbose(verbose);
    let result = nonlinear_least_squares(&[0.5, 0.5], &compiled, &options, None);
    println!(
        "polynomial fit: w = {:.6}, b = {:.6}, cost = {:.3e}, reason = {}",
        result.params[0],
        result.params[1],
        result.final_cost,
        result.convergence_reason.as_str()
    );
    Ok(())
}

fn run_circle(verbose: bool) -> Result<()> {
    let cx = Value::param(0.0, "cx");
    let cy = Value::param(0.0, "cy");
    let r = Value::param(1.0, "r");
    let points = [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)];
    let residuals: Vec<Value> = points
        .iter()
        .map(|&(x, y)| {
            let dx = &cx - x;
            let dy = &cy - y;
            (&dx.square() + &dy.square()).sqrt() - &r
        })
        .collect();
    let compiled = compile(&[cx, cy, r], |_| residuals.clone())?;

    let options = LmOptions::default().with_max_iterations(200).with_verbose(verbose);
    let result = nonlinear_least_squares(&[0.0, 0.0, 1.0], &compiled, &options, None);
    println!(
        "circle fit: cx = {:.6}, cy = {:.6}, r = {:.6}, reason = {}",
        result.params[0],
        result.params[1],
        result.params[2],
        result.convergence_reason.as_str()
    );
    Ok(())
}

fn run_rosenbrock(verbose: bool) -> Result<()> {
    let options = LbfgsOptions::default().with_max_iterations(200).with_verbose(verbose);
    let result = lbfgs_with_rosenbrock(&options);
    println!(
        "rosenbrock: x = {:.6}, y = {:.6}, cost = {:.3e}, iterations = {}, reason = {}",
        result.params[0],
        result.params[1],
        result.final_cost,
        result.iterations,
        result.convergence_reason.as_str()
    );
    Ok(())
}

fn lbfgs_with_rosenbrock(options: &LbfgsOptions) -> scalarflow::optim::OptimizeResult {
    scalarflow::optim::lbfgs_with_eval(
        &[-1.2, 1.0],
        options,
        |p| {
            let (x, y) = (p[0], p[1]);
            let f = (1.0 - x).powi(2) + 100.0 * (y - x * x).powi(2);
            let df_dx = -2.0 * (1.0 - x) - 400.0 * x * (y - x * x);
            let df_dy = 200.0 * (y - x * x);
            (f, vec![df_dx, df_dy])
        },
        None,
    )
}

fn run_graph_demo() -> Result<()> {
    let x1 = Value::weight(2.0, Some("x1"));
    let x2 = Value::weight(0.0, Some("x2"));
    let w1 = Value::weight(-3.0, Some("w1"));
    let w2 = Value::weight(1.0, Some("w2"));
    let b = Value::weight(6.8813735870195432, Some("b"));

    let x1w1 = &x1 * &w1;
    x1w1.set_label("x1*w1");
    let x2w2 = &x2 * &w2;
    x2w2.set_label("x2*w2");
    let sum = &x1w1 + &x2w2;
    sum.set_label("x1w1 + x2w2");
    let n = &sum + &b;
    n.set_label("n");
    let o = n.tanh();
    o.set_label("o");

    println!("Before backprop:");
    println!("{}", o.describe());

    backward(&o, true);

    println!("After backprop:");
    println!("{}", o.describe());
    Ok(())
}
