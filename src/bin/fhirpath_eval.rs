//! CLI front-end: evaluate a FHIRPath expression against a FHIR resource file.

use std::fs;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use fhirpath_eval::evaluator::EvaluationOptions;
use fhirpath_eval::model::{Collection, FhirPathValue};

#[derive(Parser, Debug)]
#[command(name = "fhirpath-eval", about = "Evaluate a FHIRPath 2.0 expression against a FHIR resource")]
struct Cli {
    /// The FHIRPath expression to evaluate.
    #[arg(short, long)]
    expression: String,

    /// Path to a JSON file containing the FHIR resource.
    #[arg(short, long)]
    resource: String,

    /// Wall-clock evaluation timeout, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Maximum AST-walk recursion depth.
    #[arg(long)]
    max_depth: Option<usize>,

    /// An external variable binding in `name=value` form; repeatable.
    #[arg(long = "variable", value_name = "name=value")]
    variables: Vec<String>,

    /// Pretty-print the resulting collection, one value per line.
    #[arg(long)]
    pretty: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.resource) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: could not read resource file '{}': {e}", cli.resource);
            return ExitCode::FAILURE;
        }
    };

    let expr = match fhirpath_eval::compile(&cli.expression) {
        Ok(e) => e,
        Err(e) => {
            let err = fhirpath_eval::Error::Parse(e);
            eprintln!("{}", fhirpath_eval::diagnostics::render(&cli.expression, &err));
            return ExitCode::FAILURE;
        }
    };

    let mut options = EvaluationOptions { timeout: Some(Duration::from_millis(cli.timeout_ms)), ..Default::default() };
    options.max_depth = cli.max_depth;
    for binding in &cli.variables {
        let Some((name, value)) = binding.split_once('=') else {
            eprintln!("error: --variable must be name=value, got '{binding}'");
            return ExitCode::FAILURE;
        };
        options.variables.insert(name.to_string(), Collection::single(FhirPathValue::String(value.to_string())));
    }

    match expr.evaluate_with(source.as_bytes(), &options) {
        Ok(result) => {
            if cli.pretty {
                for v in result.iter() {
                    println!("{}", v.display_string());
                }
            } else {
                println!("{result}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", fhirpath_eval::diagnostics::render(&cli.expression, &e));
            ExitCode::FAILURE
        }
    }
}
