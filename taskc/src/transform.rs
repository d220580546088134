use crate::config::parse_interface;
use crate::config::LowerOptions;
use crate::ir::TranslationUnit;
use crate::lower::LowerOmpToKmp;
use crate::lower::LowerOmpToNanos;
use crate::lower::Pass;
use crate::lower::RewriteResult;
use anyhow::Result;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use std::env::ArgsOs;
use std::fmt;
use std::fmt::Display;
use tracing::debug;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;

/// A lowering pass (e.g., `--lower-omp-to-nanos`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinglePass {
    pass: String,
}

impl Display for SinglePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pass)
    }
}

impl SinglePass {
    pub fn new(pass: &str) -> SinglePass {
        let pass = pass.strip_prefix("--").unwrap_or(pass);
        SinglePass {
            pass: pass.to_string(),
        }
    }
    pub fn name(&self) -> &str {
        &self.pass
    }
}

fn is_pass_flag(arg: &str) -> bool {
    arg.starts_with("--lower-")
}

/// A collection of [SinglePass]es, in the order in which they run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Passes {
    passes: Vec<SinglePass>,
}

impl Display for Passes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.passes
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<String>>()
                .join(" ")
        )
    }
}

impl Passes {
    pub fn from_vec(passes: Vec<&str>) -> Passes {
        Passes {
            passes: passes.iter().map(|p| SinglePass::new(p)).collect(),
        }
    }
    /// Keep only the pass flags (starting with `--lower-`) of `args`.
    pub fn from_lower_vec(args: Vec<&str>) -> Passes {
        let passes = args.into_iter().filter(|arg| is_pass_flag(arg)).collect();
        Passes::from_vec(passes)
    }
    /// Extract passes (starting with `--lower-`) from the given args.
    pub fn from_args(args: ArgsOs) -> Passes {
        let mut passes = vec![];
        for arg in args {
            let arg = arg.to_string_lossy();
            if is_pass_flag(&arg) {
                passes.push(SinglePass::new(&arg));
            }
        }
        Passes { passes }
    }
    pub fn vec(&self) -> &Vec<SinglePass> {
        &self.passes
    }
}

/// Everything [transform] needs besides the translation unit.
#[derive(Clone, Debug, Default)]
pub struct TransformOptions {
    passes: Passes,
    print_ir_before_all: bool,
    lower: LowerOptions,
}

impl TransformOptions {
    pub fn from_passes(passes: Passes) -> Self {
        Self {
            passes,
            ..Self::default()
        }
    }
    /// Read the options of [default_arguments] from `matches`.
    pub fn from_args(matches: ArgMatches, passes: Passes) -> Self {
        let mut lower = LowerOptions::default();
        if let Ok(Some(values)) = matches.try_get_many::<(String, u32)>("interface") {
            for (component, version) in values {
                lower.interface.set(component, *version);
            }
        }
        let print_ir_before_all = matches!(matches.try_get_one::<bool>("print-ir-before-all"), Ok(Some(true)));
        Self {
            passes,
            print_ir_before_all,
            lower,
        }
    }
    pub fn passes(&self) -> &Passes {
        &self.passes
    }
    pub fn lower(&self) -> &LowerOptions {
        &self.lower
    }
    pub fn set_lower(&mut self, lower: LowerOptions) {
        self.lower = lower;
    }
    pub fn print_ir_before_all(&self) -> bool {
        self.print_ir_before_all
    }
    pub fn set_print_ir_before_all(&mut self, value: bool) {
        self.print_ir_before_all = value;
    }
}

/// Interface to add custom passes to the compiler.
pub trait TransformDispatch {
    fn dispatch(
        unit: &mut TranslationUnit,
        pass: &SinglePass,
        options: &LowerOptions,
    ) -> Result<RewriteResult<()>>;
}

/// Default implementation of [TransformDispatch].
///
/// This default implementation knows only the lowering passes of taskc.
pub struct DefaultTransformDispatch;

/// Initialize logging with the given level.
pub fn init_subscriber(level: Level) -> Result<(), SetGlobalDefaultError> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_test_writer()
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}

impl TransformDispatch for DefaultTransformDispatch {
    fn dispatch(
        unit: &mut TranslationUnit,
        pass: &SinglePass,
        options: &LowerOptions,
    ) -> Result<RewriteResult<()>> {
        match pass.name() {
            LowerOmpToKmp::NAME => LowerOmpToKmp::convert(unit, options),
            LowerOmpToNanos::NAME => LowerOmpToNanos::convert(unit, options),
            _ => Err(anyhow::anyhow!("Unknown pass: {}", pass)),
        }
    }
}

/// Default arguments that are available in taskc.
///
/// This includes options such as `--print-ir-before-all`, but also the
/// lowering passes. `--debug` is not included to allow drivers to handle the
/// logging differently.
pub fn default_arguments() -> Vec<Arg> {
    vec![
        Arg::new("lower-omp-to-kmp")
            .long("lower-omp-to-kmp")
            .help("Lower task and parallel constructs to the kmp runtime")
            .action(ArgAction::SetTrue),
        Arg::new("lower-omp-to-nanos")
            .long("lower-omp-to-nanos")
            .help("Lower task and parallel constructs to the nanos runtime")
            .action(ArgAction::SetTrue),
        Arg::new("interface")
            .long("interface")
            .value_name("COMPONENT=VERSION")
            .help("Version of a runtime interface component (e.g., deps_api=1000)")
            .action(ArgAction::Append)
            .value_parser(|s: &str| parse_interface(s).map_err(|e| e.to_string())),
        Arg::new("print-ir-before-all")
            .long("print-ir-before-all")
            .help("Print the IR before each pass")
            .action(ArgAction::SetTrue),
    ]
}

/// Run the passes of `options` over `unit`, in order.
///
/// Returns [RewriteResult::Changed] when any pass changed the unit.
pub fn transform<T: TransformDispatch>(
    unit: &mut TranslationUnit,
    options: &TransformOptions,
) -> Result<RewriteResult<()>> {
    let mut result = RewriteResult::Unchanged;
    for pass in options.passes().vec() {
        if options.print_ir_before_all() {
            eprintln!("// ----- // IR Dump Before {pass} // ----- //\n{unit}");
        }
        debug!("Running pass {pass}");
        let new_result = T::dispatch(unit, pass, options.lower())?;
        if let RewriteResult::Changed(_) = new_result {
            result = new_result;
        }
    }
    Ok(result)
}
