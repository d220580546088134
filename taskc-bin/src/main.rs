use anyhow::Result;
use clap::Args;
use clap::Command;
use parking_lot::RwLock;
use std::io::Read;
use std::sync::Arc;
use taskc::frontend::Parser;
use taskc::shared::Shared;
use taskc::shared::SharedExt;
use taskc::transform;
use taskc::DefaultTransformDispatch;
use taskc::Passes;
use taskc::TransformOptions;
use tracing::debug;

/// Lower `#pragma omp` task and parallel directives in C code to parallel
/// runtime calls
#[derive(Args, Debug)]
#[command(version, about)]
struct TaskcArgs {
    /// The input files (- is interpreted as stdin)
    #[arg(default_value = "-")]
    inputs: Vec<String>,
    /// Print debug information
    #[arg(long, name = "debug")]
    debug: bool,
}

fn cli() -> Command {
    let cli = Command::new("taskc").args(taskc::default_arguments());
    TaskcArgs::augment_args(cli)
}

/// The result of lowering one input.
#[derive(Debug, Default)]
struct Lowered {
    output: String,
    /// Rendered as `<input>:<line>:<column>: <severity>: <message>`.
    diagnostics: Vec<String>,
    has_errors: bool,
}

fn lower_source(name: &str, src: &str, options: &TransformOptions) -> Result<Lowered> {
    let mut unit = Parser::parse(src).map_err(|e| anyhow::anyhow!("{name}:{e}"))?;
    transform::<DefaultTransformDispatch>(&mut unit, options)
        .map_err(|e| anyhow::anyhow!("{name}:{e}"))?;
    let diagnostics = unit
        .diagnostics
        .iter()
        .map(|diagnostic| format!("{name}:{diagnostic}"))
        .collect();
    Ok(Lowered {
        output: unit.to_string(),
        diagnostics,
        has_errors: unit.diagnostics.has_errors(),
    })
}

/// Lower every source on its own thread, with its own translation unit.
///
/// The results are in the order of `sources`.
fn lower_all(sources: &[(String, String)], options: &TransformOptions) -> Vec<Result<Lowered>> {
    let results: Shared<Vec<Option<Result<Lowered>>>> =
        Arc::new(RwLock::new(sources.iter().map(|_| None).collect()));
    std::thread::scope(|scope| {
        for (index, (name, src)) in sources.iter().enumerate() {
            let results = results.clone();
            scope.spawn(move || {
                debug!("Lowering {name}");
                let lowered = lower_source(name, src, options);
                results.wr()[index] = Some(lowered);
            });
        }
    });
    let mut results = results.wr();
    results
        .iter_mut()
        .zip(sources)
        .map(|(result, (name, _))| {
            result
                .take()
                .unwrap_or_else(|| Err(anyhow::anyhow!("{name}: lowering did not finish")))
        })
        .collect()
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(input).map_err(|e| anyhow::anyhow!("{input}: {e}"))
    }
}

/// Print the lowered inputs and return whether all of them succeeded.
fn run(inputs: &[String], options: &TransformOptions) -> Result<bool> {
    let sources = inputs
        .iter()
        .map(|input| Ok((input.clone(), read_input(input)?)))
        .collect::<Result<Vec<(String, String)>>>()?;
    let mut success = true;
    for result in lower_all(&sources, options) {
        match result {
            Ok(lowered) => {
                for diagnostic in &lowered.diagnostics {
                    eprintln!("{diagnostic}");
                }
                success &= !lowered.has_errors;
                print!("{}", lowered.output);
            }
            Err(e) => {
                eprintln!("error: {e}");
                success = false;
            }
        }
    }
    Ok(success)
}

fn init_tracing(level: tracing::Level) {
    match taskc::init_subscriber(level) {
        Ok(_) => (),
        Err(_e) => (),
    }
}

fn main() {
    let cli = cli();
    let args = std::env::args_os();
    let passes = Passes::from_args(args);
    let matches = cli.get_matches();

    let level = if matches.get_flag("debug") {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    init_tracing(level);

    let inputs: Vec<String> = matches
        .get_many::<String>("inputs")
        .map(|values| values.cloned().collect())
        .unwrap_or_else(|| vec!["-".to_string()]);
    let options = TransformOptions::from_args(matches, passes);
    match run(&inputs, &options) {
        Ok(true) => (),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
