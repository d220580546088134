use crate::frontend::Parser;
use crate::init_subscriber;
use crate::ir::TranslationUnit;
use crate::lower::RewriteResult;
use crate::transform;
use crate::DefaultTransformDispatch;
use crate::Passes;
use crate::TransformOptions;
use std::cmp::max;
use std::panic::Location;
use tracing::info;

pub struct Tester;

impl Tester {
    /// Initialize the subscriber for the tests.
    ///
    /// Cannot pass options, since the tests run concurrently.
    pub fn init_tracing() {
        let level = tracing::Level::INFO;
        match init_subscriber(level) {
            Ok(_) => (),
            Err(_e) => (),
        }
    }
    fn point_to_missing_line(expected: &str, index: usize) -> String {
        let mut result = String::new();
        result.push_str("A line is missing from the output:\n");
        result.push_str("```");
        for (i, line) in expected.lines().enumerate() {
            if i == index {
                result.push_str(&format!("\n{line}   <== missing"));
            } else {
                result.push_str(&format!("\n{line}"));
            }
        }
        result.push_str("\n```");
        result
    }
    pub fn check_lines_exact(actual: &str, expected: &str, caller: &Location<'_>) {
        let actual = actual.trim();
        let expected = expected.trim();
        let l = max(actual.lines().count(), expected.lines().count());
        for i in 0..l {
            let Some(actual_line) = actual.lines().nth(i) else {
                panic!("Line {i} not found in output: called from {caller}");
            };
            let Some(expected_line) = expected.lines().nth(i) else {
                panic!("Unexpected line {i} in output: called from {caller}\n{actual}");
            };
            assert_eq!(actual_line, expected_line, "called from {}", caller);
        }
    }
    /// Check whether the expected lines are present in the actual output.
    ///
    /// The actual output may contain additional lines that are not in the
    /// expected output. Leading and trailing whitespace of the expected
    /// lines is ignored.
    pub fn check_lines_contain(actual: &str, expected: &str, caller: &Location<'_>) {
        let actual = actual.trim();
        let expected = expected.trim();
        let mut actual_index = 0;
        'outer: for (i, expected_line) in expected.lines().enumerate() {
            let expected_line = expected_line.trim();
            // An empty line would match any line.
            if expected_line.is_empty() {
                continue;
            }
            for (j, actual_line) in actual.lines().enumerate().skip(actual_index) {
                if actual_line.contains(expected_line) {
                    actual_index = j + 1;
                    continue 'outer;
                }
            }
            let msg = Self::point_to_missing_line(expected, i);
            panic!("{msg}\nwhen called from {caller}\n\nactual:\n{actual}");
        }
    }
    /// Check that `actual` does not contain `unexpected` anywhere.
    pub fn check_lines_absent(actual: &str, unexpected: &str, caller: &Location<'_>) {
        if let Some(line) = actual.lines().find(|line| line.contains(unexpected)) {
            panic!("Unexpected `{unexpected}` in line `{line}`\nwhen called from {caller}");
        }
    }
    fn print_heading(msg: &str, src: &str) {
        info!("{msg}:\n```\n{src}\n```\n");
    }
    pub fn parse(src: &str) -> (TranslationUnit, String) {
        let src = src.trim();
        Self::print_heading("Before parse", src);
        let unit = Parser::parse(src).unwrap();
        let actual = unit.to_string();
        Self::print_heading("After parse", &actual);
        (unit, actual)
    }
    /// Lower `src` with the passes in `arguments` and the default options.
    pub fn lower(arguments: Vec<&str>, src: &str) -> (TranslationUnit, String) {
        let passes = Passes::from_lower_vec(arguments);
        Self::lower_with(TransformOptions::from_passes(passes), src)
    }
    pub fn lower_with(options: TransformOptions, src: &str) -> (TranslationUnit, String) {
        let src = src.trim();
        let mut unit = Parser::parse(src).unwrap();
        let msg = format!("Before (lower {})", options.passes());
        Self::print_heading(&msg, src);

        let result = transform::<DefaultTransformDispatch>(&mut unit, &options).unwrap();
        if let RewriteResult::Unchanged = result {
            panic!("Expected changes");
        }
        let actual = unit.to_string();
        let msg = format!("After (lower {})", options.passes());
        Self::print_heading(&msg, &actual);
        (unit, actual)
    }
}
