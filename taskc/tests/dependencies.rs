extern crate taskc;

use indoc::indoc;
use std::panic::Location;
use taskc::config::LowerOptions;
use taskc::tester::Tester;
use taskc::Passes;
use taskc::TransformOptions;

const SRC: &str = indoc! {"
void f(int n) {
  int m2[4][8];
  #pragma omp task depend(out: m2[1:2][0:n]) depend(in: n)
  m2[1][0] = n;
}
"};

fn options(deps_api: Option<u32>) -> TransformOptions {
    let passes = Passes::from_vec(vec!["--lower-omp-to-nanos"]);
    let mut options = TransformOptions::from_passes(passes);
    if let Some(version) = deps_api {
        options.set_lower(LowerOptions::default().with_interface("deps_api", version));
    }
    options
}

#[test]
fn test_region_dependencies() {
    Tester::init_tracing();
    let expected = indoc! {"
    nanos_region_dimension_t dimensions_0[2] = {{n * 4, 0, n * 4}, {32, 1, 2}};
    nanos_region_dimension_t dimensions_1[1] = {{4, 0, 4}};
    nanos_data_access_t dependences[2] = {{(void *) &m2, {0, 1, 0, 0, 0}, 2, dimensions_0, 0}, {(void *) &n, {1, 0, 0, 0, 0}, 1, dimensions_1, 0}};
    err = nanos_submit(wd, 2, dependences, (nanos_team_t) 0);
    "};
    let (_unit, actual) = Tester::lower_with(options(None), SRC);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn test_flat_dependencies() {
    Tester::init_tracing();
    let expected = indoc! {"
    nanos_dependence_t dependences[2];
    dependences[0].address = (void *) &m2;
    dependences[0].offset = 32;
    dependences[0].size = 2 * n * 4;
    dependences[0].flags.input = 1;
    dependences[0].flags.output = 1;
    dependences[0].flags.can_rename = 0;
    dependences[0].flags.concurrent = 0;
    dependences[1].address = (void *) &n;
    dependences[1].offset = 0;
    dependences[1].size = 4;
    dependences[1].flags.input = 1;
    dependences[1].flags.output = 0;
    "};
    let (_unit, actual) = Tester::lower_with(options(Some(1000)), SRC);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    Tester::check_lines_absent(&actual, "nanos_region_dimension_t", Location::caller());
}

#[test]
fn test_concurrent_dependency() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int *acc, int n) {
      #pragma omp task concurrent(*acc)
      *acc = *acc + n;
    }
    "};
    let expected = indoc! {"
    nanos_region_dimension_t dimensions_0[1] = {{4, 0, 4}};
    nanos_data_access_t dependences[1] = {{(void *) acc, {1, 1, 0, 1, 0}, 1, dimensions_0, 0}};
    "};
    let (_unit, actual) = Tester::lower_with(options(None), src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn test_unsupported_dependency() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int *p) {
      #pragma omp task depend(in: p[1:])
      p[1] = 0;
    }
    "};
    let mut unit = taskc::frontend::Parser::parse(src).unwrap();
    let options = options(None);
    let result = taskc::transform::<taskc::DefaultTransformDispatch>(&mut unit, &options);
    let err = match result {
        Ok(_) => panic!("Expected an error"),
        Err(e) => e.to_string(),
    };
    assert!(err.starts_with("2:"));
    assert!(err.contains("length"));
}

#[test]
fn test_pointer_row_dependency() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(float **pp, int i, int n) {
      #pragma omp task depend(inout: pp[i][0:n])
      n = 0;
    }
    "};
    let expected = indoc! {"
    nanos_region_dimension_t dimensions_0[1] = {{n * 4, 0, n * 4}};
    nanos_data_access_t dependences[1] = {{(void *) pp[i], {1, 1, 0, 0, 0}, 1, dimensions_0, 0}};
    "};
    let (_unit, actual) = Tester::lower_with(options(None), src);
    Tester::check_lines_contain(&actual, expected, Location::caller());

    let expected = indoc! {"
    kmp_depend_info_t _deps[1];
    _deps[0].base_addr = (kmp_intptr_t) pp[i];
    _deps[0].len = n * 4;
    _deps[0].flags.in = 1;
    _deps[0].flags.out = 1;
    "};
    let (_unit, actual) = Tester::lower(vec!["--lower-omp-to-kmp"], src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn test_generated_names_avoid_dependencies() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int n) {
      int dependences[4];
      #pragma omp task depend(out: dependences[0:n])
      dependences[0] = n;
    }
    "};
    let expected = indoc! {"
    nanos_data_access_t dependences_1[1] = {{(void *) &dependences, {0, 1, 0, 0, 0}, 1, dimensions_0, 0}};
    err = nanos_submit(wd, 1, dependences_1, (nanos_team_t) 0);
    "};
    let (_unit, actual) = Tester::lower_with(options(None), src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    Tester::check_lines_absent(&actual, "dependences[1] =", Location::caller());

    let src = indoc! {"
    void f(int n) {
      int _deps[4];
      #pragma omp task depend(out: _deps[0:n])
      _deps[0] = n;
    }
    "};
    let expected = indoc! {"
    kmp_depend_info_t _deps_1[1];
    _deps_1[0].base_addr = (kmp_intptr_t) &_deps;
    __kmpc_omp_task_with_deps(&_loc_task_f_0, _gtid, _ret, 1, _deps_1, 0, 0);
    "};
    let (_unit, actual) = Tester::lower(vec!["--lower-omp-to-kmp"], src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn test_kmp_dependency_order() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int *a, int *b, int *c) {
      #pragma omp task depend(inout: *c) depend(out: *b) depend(in: *a)
      *c = *a + *b;
    }
    "};
    let expected = indoc! {"
    kmp_depend_info_t _deps[3];
    _deps[0].base_addr = (kmp_intptr_t) a;
    _deps[0].flags.in = 1;
    _deps[0].flags.out = 0;
    _deps[1].base_addr = (kmp_intptr_t) b;
    _deps[1].flags.out = 1;
    _deps[2].base_addr = (kmp_intptr_t) c;
    _deps[2].flags.out = 1;
    "};
    let (_unit, actual) = Tester::lower(vec!["--lower-omp-to-kmp"], src);
    Tester::check_lines_contain(&actual, expected, Location::caller());

    // Other runtimes keep the clause order.
    let expected = indoc! {"
    nanos_data_access_t dependences[3] = {{(void *) c,
    "};
    let (_unit, actual) = Tester::lower_with(options(None), src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}
