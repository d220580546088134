extern crate taskc;

use indoc::indoc;
use std::panic::Location;
use taskc::tester::Tester;

const FLAGS_KMP: &[&str] = &["--lower-omp-to-kmp"];
const FLAGS_NANOS: &[&str] = &["--lower-omp-to-nanos"];

#[test]
fn test_parallel_kmp() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int n) {
      int s;
      #pragma omp parallel num_threads(4)
      s = n;
    }
    "};
    let expected = indoc! {"
    static ident_t _loc_parallel_f_0 = {0, 2, 0, 0, \";unknown;f;3;3;;\"};

    static void _parallel_f_0(kmp_int32 *_global_tid, kmp_int32 *_bound_tid, struct _args_parallel_f_0 *_args) {
    }

    void f(int n) {
      int s;
      {
        struct _args_parallel_f_0 _args;
        kmp_int32 _gtid = __kmpc_global_thread_num(&_loc_parallel_f_0);
        __kmpc_push_num_threads(&_loc_parallel_f_0, _gtid, 4);
        __kmpc_fork_call(&_loc_parallel_f_0, 1, (kmpc_micro) _parallel_f_0, &_args);
      }
    }
    "};
    let (_unit, actual) = Tester::lower(FLAGS_KMP.to_vec(), src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    // Variables are shared by default.
    let outline = indoc! {"
    int *s = _args->s;
    int *n = _args->n;
    *s = *n;
    "};
    Tester::check_lines_contain(&actual, outline, Location::caller());
    Tester::check_lines_contain(&actual, "_args.s = &s;", Location::caller());
    Tester::check_lines_contain(&actual, "_args.n = &n;", Location::caller());
}

#[test]
fn test_parallel_kmp_if() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int n) {
      #pragma omp parallel if(n > 1)
      n = 0;
    }
    "};
    let expected = indoc! {"
    if (n > 1) {
      __kmpc_fork_call(&_loc_parallel_f_0, 1, (kmpc_micro) _parallel_f_0, &_args);
    } else {
      kmp_int32 _btid = 0;
      __kmpc_serialized_parallel(&_loc_parallel_f_0, _gtid);
      _parallel_f_0(&_gtid, &_btid, &_args);
      __kmpc_end_serialized_parallel(&_loc_parallel_f_0, _gtid);
    }
    "};
    let (_unit, actual) = Tester::lower(FLAGS_KMP.to_vec(), src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    Tester::check_lines_absent(&actual, "__kmpc_push_num_threads", Location::caller());
}

#[test]
fn test_parallel_nanos() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int n) {
      #pragma omp parallel
      n = 0;
    }
    "};
    let expected = indoc! {"
    static void ol_f_0(struct nanos_args_0_t *args) {
      nanos_err_t err = nanos_omp_set_implicit(nanos_current_wd());
      if (err != NANOS_OK)
      err = nanos_enter_team();
      int *n = args->n;
      *n = 0;
      err = nanos_omp_barrier();
      err = nanos_leave_team();
    }

    void f(int n) {
      {
        unsigned int nanos_num_threads = nanos_omp_get_max_threads();
        nanos_team_t nanos_team = (nanos_team_t) 0;
        nanos_thread_t nanos_team_threads[nanos_num_threads];
        /* SMP device descriptor */
        props.tied = 1;
        nanos_err_t err = nanos_create_team(&nanos_team, (nanos_sched_t) 0, &nanos_num_threads,
        nanos_data_access_t dependences[1];
        nanos_i = 1; nanos_i < nanos_num_threads; nanos_i++) {
          props.tie_to = nanos_team_threads[nanos_i];
          err = nanos_create_wd(&wd,
          ol_args->n = &n;
          err = nanos_submit(wd, 0, dependences, (nanos_team_t) 0);
        }
        props.tie_to = nanos_team_threads[0];
        imm_args.n = &n;
        err = nanos_create_wd_and_run(
        err = nanos_end_team(nanos_team);
      }
    }
    "};
    let (_unit, actual) = Tester::lower(FLAGS_NANOS.to_vec(), src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn test_parallel_nanos_threads() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int n) {
      #pragma omp parallel num_threads(n) if(n > 2) final(n)
      n = 0;
    }
    "};
    let (unit, actual) = Tester::lower(FLAGS_NANOS.to_vec(), src);
    let expected = "unsigned int nanos_num_threads = n > 2 ? n : 1;";
    Tester::check_lines_contain(&actual, expected, Location::caller());
    Tester::check_lines_absent(&actual, "is_final", Location::caller());
    assert!(unit
        .diagnostics
        .contains("`final` does not apply to a parallel construct"));
}

#[test]
fn test_task_in_parallel() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int n) {
      #pragma omp parallel
      {
        #pragma omp task
        n = 1;
      }
    }
    "};
    let (_unit, actual) = Tester::lower(FLAGS_KMP.to_vec(), src);
    // The lowered task declares `_args` and `_gtid`, so the parallel
    // construct picks other names.
    let expected = indoc! {"
    static kmp_int32 _task_f_0(kmp_int32 _global_tid, kmp_task_t *_task) {
    static void _parallel_f_0(kmp_int32 *_global_tid, kmp_int32 *_bound_tid, struct _args_parallel_f_0 *_args_1) {
      int *n = _args_1->n;
      _args->n = *n;
      __kmpc_omp_task(&_loc_task_f_0, _gtid, _ret);
    void f(int n) {
      kmp_int32 _gtid_1 = __kmpc_global_thread_num(&_loc_parallel_f_0);
      __kmpc_fork_call(&_loc_parallel_f_0, 1, (kmpc_micro) _parallel_f_0, &_args_1);
    "};
    Tester::check_lines_contain(&actual, expected, Location::caller());
}
