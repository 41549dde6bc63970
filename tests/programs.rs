use obsolete::parser::ParserError;
use obsolete::repl::{run_str, Repl, ReplError};
use obsolete::vm::{OperationError, RunError};

macro_rules! program_test {
    ($name:ident, $file:literal) => {
        #[test]
        fn $name() {
            let input = include_str!(concat!("programs/", $file, ".in"));
            let expected = include_str!(concat!("programs/", $file, ".out"));
            match run_str(input) {
                Ok(output) => assert_eq!(output, expected),
                Err(err) => panic!("{} failed: {err}", $file),
            }
        }
    };
}

program_test!(arithmetic, "01-arithmetic");
program_test!(stack_manipulations, "02-stack-manipulations");
program_test!(logic, "03-logic");
program_test!(square, "04-square");
program_test!(function_and_test, "05-function-and-test");
program_test!(nested_calls_and_conditionals, "06-nested-calls-and-conditionals");
program_test!(factorial, "07-factorial");
program_test!(iteration, "08-iteration");
program_test!(fibonacci, "09-fibonacci");
program_test!(integer_square_root, "10-integer-square-root");

fn run_with_output(input: &str) -> (Result<(), ReplError>, String) {
    let mut out = Vec::new();
    let result = Repl::new(&mut out).connect_with(input.as_bytes());
    (result, String::from_utf8(out).unwrap())
}

#[test]
fn pop_on_empty_stack_fails() {
    let (result, out) = run_with_output("1\nPOP\n");
    match result {
        Err(ReplError::Run { line: 1, error }) => assert!(error.operation_error().unwrap().is_stack_underflow()),
        other => panic!("Unexpected result {other:?}"),
    }
    assert_eq!(out, "");
}

#[test]
fn division_by_zero_fails() {
    let (result, out) = run_with_output("2\n5 OUT\n5 0 DIV\n");
    assert!(matches!(
        result,
        Err(ReplError::Run { line: 2, error: RunError::InstructionFailed { error: OperationError::DivisionByZero, .. } })
    ));
    assert_eq!(out, "5\n");
}

#[test]
fn unterminated_definition_fails() {
    let (result, out) = run_with_output("2\nDEF F 1\nF\n");
    assert!(matches!(result, Err(ReplError::Parse { line: 1, error: ParserError::Unterminated { .. } })));
    assert_eq!(out, "");
}

#[test]
fn literal_then_out_round_trip() {
    for value in [0, 1, -1, 123456, -987654, i32::MAX, i32::MIN] {
        assert_eq!(run_str(&format!("1\n{value} OUT\n")).unwrap(), format!("{value}\n"));
    }
}

#[test]
fn error_messages() {
    let err = run_str("1\n1 BAR\n").unwrap_err();
    assert_eq!(err.to_string(), "Line 1: Unknown token `BAR` at line 1, column 3.");

    let err = run_str("1\n1 0 MOD\n").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Line 1: Instruction MOD failed (call depth 0, instruction counter 2): Division by zero"
    );
}
