extern crate taskc;

use indoc::indoc;
use std::panic::Location;
use taskc::tester::Tester;

const FLAGS_KMP: &[&str] = &["--lower-omp-to-kmp"];
const FLAGS_NANOS: &[&str] = &["--lower-omp-to-nanos"];

#[test]
fn test_task_kmp() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int n) {
      #pragma omp task
      n = 1;
    }
    "};
    let expected = indoc! {"
    struct _args_task_f_0 {
      int n;
    };

    static ident_t _loc_task_f_0 = {0, 2, 0, 0, \";unknown;f;2;3;;\"};

    static kmp_int32 _task_f_0(kmp_int32 _global_tid, kmp_task_t *_task) {
      struct _args_task_f_0 *_args = (struct _args_task_f_0 *) _task->shareds;
      int n = _args->n;
      n = 1;
      return 0;
    }

    void f(int n) {
      {
        kmp_int32 _gtid = __kmpc_global_thread_num(&_loc_task_f_0);
        kmp_task_t *_ret = __kmpc_omp_task_alloc(&_loc_task_f_0, _gtid, 1, sizeof(kmp_task_t), sizeof(struct _args_task_f_0), (kmp_routine_entry_t) &_task_f_0);
        struct _args_task_f_0 *_args = (struct _args_task_f_0 *) _ret->shareds;
        _args->n = n;
        __kmpc_omp_task(&_loc_task_f_0, _gtid, _ret);
      }
    }
    "};
    let (_unit, actual) = Tester::lower(FLAGS_KMP.to_vec(), src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    Tester::check_lines_absent(&actual, "#pragma omp", Location::caller());
}

#[test]
fn test_task_kmp_if() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int *p, int n) {
      #pragma omp task depend(out: p[0:n]) if(n > 8)
      p[0] = n;
    }
    "};
    let expected = indoc! {"
    void f(int *p, int n) {
      kmp_depend_info_t _deps[1];
      _deps[0].base_addr = (kmp_intptr_t) p;
      _deps[0].len = n * 4;
      _deps[0].flags.in = 1;
      _deps[0].flags.out = 1;
      if (n > 8) {
        __kmpc_omp_task_with_deps(&_loc_task_f_0, _gtid, _ret, 1, _deps, 0, 0);
      } else {
        __kmpc_omp_wait_deps(&_loc_task_f_0, _gtid, 1, _deps, 0, 0);
        __kmpc_omp_task_begin_if0(&_loc_task_f_0, _gtid, _ret);
        _task_f_0(_gtid, _ret);
        __kmpc_omp_task_complete_if0(&_loc_task_f_0, _gtid, _ret);
      }
    "};
    let (_unit, actual) = Tester::lower(FLAGS_KMP.to_vec(), src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn test_task_nanos() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int n) {
      #pragma omp task
      n = 1;
    }
    "};
    let expected = indoc! {"
    struct nanos_args_0_t {
      int n;
    };

    static void ol_f_0(struct nanos_args_0_t *args) {
      int n = args->n;
      n = 1;
    }

    void f(int n) {
      {
        struct nanos_args_0_t *ol_args = (struct nanos_args_0_t *) 0;
        nanos_wd_t wd = (nanos_wd_t) 0;
        /* SMP device descriptor */
        nanos_smp_args_t ol_f_0_smp_args = {(void (*)(void *)) ol_f_0};
        nanos_device_t ol_f_0_devices[1] = {{nanos_smp_factory, nanos_smp_dd_size, &ol_f_0_smp_args}};
        nanos_wd_props_t props;
        __builtin_memset(&props, 0, sizeof(props));
        props.tied = 1;
        nanos_err_t err;
        nanos_data_access_t dependences[1];
        err = nanos_create_wd(&wd, 1, ol_f_0_devices, sizeof(struct nanos_args_0_t),
        if (err != NANOS_OK)
        if (wd != (nanos_wd_t) 0) {
          ol_args->n = n;
          err = nanos_submit(wd, 0, dependences, (nanos_team_t) 0);
        } else {
          struct nanos_args_0_t imm_args;
          imm_args.n = n;
          err = nanos_create_wd_and_run(1, ol_f_0_devices, sizeof(struct nanos_args_0_t),
        }
      }
    }
    "};
    let (_unit, actual) = Tester::lower(FLAGS_NANOS.to_vec(), src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn test_task_nanos_clauses() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int n, int k) {
      #pragma omp task untied final(k > 2) priority(k) if(n)
      n = k;
    }
    "};
    let expected = indoc! {"
    props.priority = k;
    props.flags.is_final = k > 2 ? 1 : 0;
    if (n) {
      err = nanos_create_wd(&wd,
    }
    if (wd != (nanos_wd_t) 0) {
    } else {
      err = nanos_create_wd_and_run(
    }
    "};
    let (_unit, actual) = Tester::lower(FLAGS_NANOS.to_vec(), src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    Tester::check_lines_absent(&actual, "props.tied", Location::caller());
    Tester::check_lines_absent(&actual, "nanos_wait_on", Location::caller());
}

#[test]
fn test_nested_tasks() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int n) {
      #pragma omp task
      {
        #pragma omp task
        n = 2;
      }
    }
    "};
    let (_unit, actual) = Tester::lower(FLAGS_NANOS.to_vec(), src);
    // The inner task is lowered first and ends up inside the outer outline.
    let expected = indoc! {"
    struct nanos_args_0_t {
    static void ol_f_0(struct nanos_args_0_t *args) {
    struct nanos_args_1_t {
    static void ol_f_1(struct nanos_args_1_t *args) {
      nanos_smp_args_t ol_f_0_smp_args = {(void (*)(void *)) ol_f_0};
    void f(int n) {
      nanos_smp_args_t ol_f_1_smp_args = {(void (*)(void *)) ol_f_1};
    "};
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn test_misplaced_clause() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int n) {
      #pragma omp task num_threads(4)
      n = 1;
    }
    "};
    let (unit, actual) = Tester::lower(FLAGS_KMP.to_vec(), src);
    assert!(unit
        .diagnostics
        .contains("`num_threads` does not apply to a task construct"));
    Tester::check_lines_absent(&actual, "num_threads", Location::caller());
}
