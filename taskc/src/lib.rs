//! taskc lowers `#pragma omp` task and parallel directives in C code to calls
//! into a parallel runtime.
//!
//! A translation unit is parsed into a small IR (see [ir]), and the lowering
//! passes in [lower] replace every construct by runtime calls:
//!
//! - `--lower-omp-to-kmp` targets the explicit task object runtime
//!   (`__kmpc_omp_task_alloc` and friends).
//! - `--lower-omp-to-nanos` targets the work descriptor runtime
//!   (`nanos_create_wd` and friends).
//!
//! For each construct, the pass decides how every variable reaches the
//! outlined code (captured, shared, or private), synthesizes an argument
//! structure, serializes the dependencies of tasks, and emits the outlined
//! function together with the code that creates and submits the work.
//!
//! Functions annotated with `#pragma omp task` become task functions: every
//! call to them is turned into a task over copies of its arguments.
//!
//! The output is printed as C again, so that a regular C compiler can take
//! over from there.

pub mod config;
pub mod diagnostic;
pub mod frontend;
pub mod ir;
pub mod lower;
pub mod shared;
#[cfg(feature = "test-utils")]
pub mod tester;
mod transform;

pub use transform::default_arguments;
pub use transform::init_subscriber;
pub use transform::transform;
pub use transform::DefaultTransformDispatch;
pub use transform::Passes;
pub use transform::SinglePass;
pub use transform::TransformDispatch;
pub use transform::TransformOptions;
