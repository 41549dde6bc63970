//! Running whole programs: a line count followed by that many lines of source.
use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::{
    config::get_config,
    ops::format_line,
    parser::{FunctionTable, Parser, ParserError},
    vm::{NoStats, RunError, Tracer, VMOptions, Vm},
};

/// An error that stopped a program. Line numbers are 1-based and count
/// program lines only, not the line holding the count.
#[derive(Debug, Error)]
pub enum ReplError {
    #[error("Line {line}: {error}")]
    Parse { line: usize, error: ParserError },
    #[error("Line {line}: {error}")]
    Run { line: usize, error: RunError },
    #[error("The input does not start with a line count.")]
    MissingLineCount,
    #[error("Invalid line count `{0}`.")]
    InvalidLineCount(String),
    #[error("Expected {expected} program lines, but the input ended after {read}.")]
    MissingLines { expected: usize, read: usize },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// One interpreter run: the function table, the stack and the output sink.
///
/// # Example
/// ```
/// use obsolete::repl::Repl;
///
/// let mut out = Vec::<u8>::new();
/// let mut repl = Repl::new(&mut out);
/// repl.connect_with("2\nDEF SQ DUP MUL END\n7 SQ OUT\n".as_bytes()).unwrap();
/// assert_eq!(out, b"49\n");
/// ```
pub struct Repl<W: Write, T: Tracer = NoStats> {
    parser: Parser,
    vm: Vm<T>,
    out: W,
    lines_run: usize,
    dump_ir: bool,
}

impl<W: Write> Repl<W> {
    pub fn new(out: W) -> Self {
        Self::with_options(out, VMOptions::default(), NoStats::default())
    }
}

impl<W: Write, T: Tracer> Repl<W, T> {
    pub fn with_options(out: W, options: VMOptions, tracer: T) -> Self {
        Repl { parser: Parser::new(), vm: Vm::with_tracer(options, tracer), out, lines_run: 0, dump_ir: false }
    }

    /// Print every parsed line back to stderr before running it.
    pub fn set_dump_ir(&mut self, enabled: bool) {
        self.dump_ir = enabled;
    }

    pub fn stack(&self) -> &[i32] {
        self.vm.stack()
    }

    pub fn functions(&self) -> &FunctionTable {
        self.parser.functions()
    }

    pub fn tracer(&self) -> &T {
        self.vm.tracer()
    }

    pub fn instruction_counter(&self) -> u64 {
        self.vm.instruction_counter()
    }

    pub fn into_parts(self) -> (W, T) {
        (self.out, self.vm.into_tracer())
    }

    /// Parses and runs one line. Nothing from the line runs if it does not parse.
    pub fn exec_line(&mut self, line: &str) -> Result<(), ReplError> {
        self.lines_run += 1;
        let line_number = self.lines_run;

        let instructions = self.parser.parse(line).map_err(|error| ReplError::Parse { line: line_number, error })?;
        if self.dump_ir {
            eprintln!("{line_number}: {}", format_line(&instructions));
        }
        if get_config().should_log(10) {
            eprintln!("Running line {line_number} ({} instructions), stack {}", instructions.len(), self.vm.stack().len());
        }

        self.vm
            .run(&instructions, self.parser.functions(), &mut self.out)
            .map_err(|error| ReplError::Run { line: line_number, error })
    }

    /// Reads the line count and then runs that many lines from `input`.
    ///
    /// The output is flushed whether or not the program succeeds, so that
    /// everything printed before an error is kept.
    pub fn connect_with<R: BufRead>(&mut self, input: R) -> Result<(), ReplError> {
        let result = self.run_lines(input);
        let flushed = self.out.flush();
        result?;
        flushed?;
        Ok(())
    }

    fn run_lines<R: BufRead>(&mut self, input: R) -> Result<(), ReplError> {
        let mut lines = input.lines();
        // The count is the first word of the first non-blank line, the rest of that line is ignored.
        let count = loop {
            let line = lines.next().ok_or(ReplError::MissingLineCount)??;
            if let Some(word) = line.split_whitespace().next() {
                break word.parse::<usize>().map_err(|_| ReplError::InvalidLineCount(word.to_string()))?;
            }
        };

        for read in 0..count {
            let line = lines.next().ok_or(ReplError::MissingLines { expected: count, read })??;
            self.exec_line(&line)?;
        }
        Ok(())
    }
}

/// Runs a complete program from a string and returns its output.
pub fn run_str(input: &str) -> Result<String, ReplError> {
    let mut out = Vec::<u8>::new();
    Repl::new(&mut out).connect_with(input.as_bytes())?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{OperationError, Stats};

    fn run_with_output(input: &str) -> (Result<(), ReplError>, String) {
        let mut out = Vec::new();
        let result = Repl::new(&mut out).connect_with(input.as_bytes());
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_connect_with() {
        let (result, out) = run_with_output("3\nDEF SQ DUP MUL END\n5 SQ OUT\n2 3 SUB OUT\n");
        result.unwrap();
        assert_eq!(out, "25\n-1\n");
    }

    #[test]
    fn test_count_line() {
        assert_eq!(run_str("\n  \n2 trailing words\n1 OUT\n2 OUT\n").unwrap(), "1\n2\n");
        assert_eq!(run_str("0\n").unwrap(), "");
        // Lines after the counted ones are ignored, even if they would fail.
        assert_eq!(run_str("1\n4 OUT\nPOP\n").unwrap(), "4\n");
        // Windows line endings.
        assert_eq!(run_str("1\r\n4 OUT\r\n").unwrap(), "4\n");
    }

    #[test]
    fn test_bad_count() {
        assert!(matches!(run_str(""), Err(ReplError::MissingLineCount)));
        assert!(matches!(run_str("\n\n"), Err(ReplError::MissingLineCount)));
        assert!(matches!(run_str("x\n1 OUT\n"), Err(ReplError::InvalidLineCount(word)) if word == "x"));
        assert!(matches!(run_str("-1\n"), Err(ReplError::InvalidLineCount(_))));
    }

    #[test]
    fn test_missing_lines() {
        let (result, out) = run_with_output("3\n1 OUT\n2 OUT");
        assert!(matches!(result, Err(ReplError::MissingLines { expected: 3, read: 2 })));
        assert_eq!(out, "1\n2\n");
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let (result, out) = run_with_output("3\n1 OUT\n2 FOO\n3 OUT\n");
        match result {
            Err(ReplError::Parse { line: 2, error: ParserError::UnknownToken { token, column: 3, .. } }) => {
                assert_eq!(token, "FOO")
            }
            other => panic!("Unexpected result {other:?}"),
        }
        // The failing line did not run at all.
        assert_eq!(out, "1\n");

        let (result, out) = run_with_output("2\n7 OUT\n1 OUT POP\n");
        match result {
            Err(ReplError::Run { line: 2, error }) => {
                assert_eq!(error.operation_error(), Some(&OperationError::PopFailed))
            }
            other => panic!("Unexpected result {other:?}"),
        }
        assert_eq!(out, "7\n1\n");
    }

    #[test]
    fn test_state_between_lines() {
        let mut repl = Repl::new(io::sink());
        repl.exec_line("1 2").unwrap();
        repl.exec_line("DEF INC 1 ADD END").unwrap();
        repl.exec_line("INC").unwrap();
        assert_eq!(repl.stack(), [1, 3]);
        assert_eq!(repl.functions().names(), vec!["INC"]);
    }

    #[test]
    fn test_dump_ir_keeps_output_clean() {
        let mut repl = Repl::new(Vec::<u8>::new());
        repl.set_dump_ir(true);
        repl.connect_with("2\nDEF F IF 1 ELS 2 FI END\n0 F OUT 1 F OUT\n".as_bytes()).unwrap();
        let (out, _) = repl.into_parts();
        assert_eq!(out, b"2\n1\n");
    }

    #[test]
    fn test_stats_tracer() {
        let mut repl = Repl::with_options(Vec::<u8>::new(), VMOptions::default(), Stats::default());
        repl.connect_with("2\n1 2 ADD\nOUT\n".as_bytes()).unwrap();
        assert_eq!(repl.instruction_counter(), 4);
        let (out, stats) = repl.into_parts();
        assert_eq!(out, b"3\n");
        assert_eq!(stats.instructions, 4);
        assert_eq!(stats.outputs, 1);
        assert_eq!(stats.max_stack_len, 2);
    }

    #[test]
    fn test_limits_reach_the_vm() {
        let mut repl = Repl::with_options(io::sink(), VMOptions::new(&[], 1, u64::MAX, usize::MAX), NoStats::default());
        let result = repl.exec_line("1 2");
        assert!(matches!(
            result,
            Err(ReplError::Run { line: 1, error: RunError::InstructionFailed { error: OperationError::PushFailed, .. } })
        ));
    }
}
