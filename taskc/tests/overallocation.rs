extern crate taskc;

use indoc::indoc;
use std::panic::Location;
use taskc::tester::Tester;

#[test]
fn test_vla_task_nanos_if() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int n, int *out) {
      float v[n];
      #pragma omp task firstprivate(v) depend(out: *out) if(n > 4)
      v[0] = 1;
    }
    "};
    // The deferred and the immediate block each walk their own cursor and
    // are allocated with the same size.
    let expected = indoc! {"
    if (n > 4) {
      err = nanos_create_wd(&wd, 1, ol_f_0_devices, sizeof(struct nanos_args_0_t) + (sizeof(v) + 7 & ~7), __alignof__(struct nanos_args_0_t),
    }
    if (wd != (nanos_wd_t) 0) {
      char *ol_args_cursor = (char *) (ol_args + 1);
      ol_args_cursor = (char *) ((uintptr_t) ol_args_cursor + 7 & ~7);
      ol_args->v = ol_args_cursor;
      __builtin_memcpy(ol_args->v, &v, sizeof(v));
      ol_args_cursor += sizeof(v);
      err = nanos_submit(wd, 1, dependences, (nanos_team_t) 0);
    } else {
      struct nanos_args_0_t *imm_args = (struct nanos_args_0_t *) __builtin_alloca(sizeof(struct nanos_args_0_t) + (sizeof(v) + 7 & ~7));
      char *imm_args_cursor = (char *) (imm_args + 1);
      imm_args_cursor = (char *) ((uintptr_t) imm_args_cursor + 7 & ~7);
      imm_args->v = imm_args_cursor;
      __builtin_memcpy(imm_args->v, &v, sizeof(v));
      imm_args_cursor += sizeof(v);
      err = nanos_wait_on(1, dependences);
      err = nanos_create_wd_and_run(1, ol_f_0_devices, sizeof(struct nanos_args_0_t) + (sizeof(v) + 7 & ~7), __alignof__(struct nanos_args_0_t), imm_args, 1, dependences,
    }
    "};
    let (_unit, actual) = Tester::lower(vec!["--lower-omp-to-nanos"], src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn test_vla_task_kmp_if() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int n, int *out) {
      float v[n];
      #pragma omp task firstprivate(v) depend(out: *out) if(n > 4)
      v[0] = 1;
    }
    "};
    let expected = indoc! {"
    kmp_task_t *_ret = __kmpc_omp_task_alloc(&_loc_task_f_0, _gtid, 1, sizeof(kmp_task_t), sizeof(struct _args_task_f_0) + (sizeof(v) + 7 & ~7), (kmp_routine_entry_t) &_task_f_0);
    char *_args_cursor = (char *) (_args + 1);
    _args_cursor = (char *) ((uintptr_t) _args_cursor + 7 & ~7);
    _args->v = _args_cursor;
    __builtin_memcpy(_args->v, &v, sizeof(v));
    _args_cursor += sizeof(v);
    __kmpc_omp_wait_deps(&_loc_task_f_0, _gtid, 1, _deps, 0, 0);
    "};
    let (_unit, actual) = Tester::lower(vec!["--lower-omp-to-kmp"], src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}

#[test]
fn test_vla_parallel_kmp_if() {
    Tester::init_tracing();
    let src = indoc! {"
    void f(int n) {
      float v[n];
      #pragma omp parallel firstprivate(v) if(n > 4)
      v[0] = 1;
    }
    "};
    let expected = indoc! {"
    struct _args_parallel_f_0 *_args = (struct _args_parallel_f_0 *) __builtin_alloca(sizeof(struct _args_parallel_f_0) + (sizeof(v) + 7 & ~7));
    char *_args_cursor = (char *) (_args + 1);
    _args_cursor = (char *) ((uintptr_t) _args_cursor + 7 & ~7);
    _args->v = _args_cursor;
    __builtin_memcpy(_args->v, &v, sizeof(v));
    _args_cursor += sizeof(v);
    kmp_int32 _gtid = __kmpc_global_thread_num(&_loc_parallel_f_0);
    if (n > 4) {
      __kmpc_fork_call(&_loc_parallel_f_0, 1, (kmpc_micro) _parallel_f_0, _args);
    } else {
      __kmpc_serialized_parallel(&_loc_parallel_f_0, _gtid);
    "};
    let (_unit, actual) = Tester::lower(vec!["--lower-omp-to-kmp"], src);
    Tester::check_lines_contain(&actual, expected, Location::caller());
}
