//! Functions for executing parsed instructions.
use std::io::Write;

use thiserror::Error;

use crate::{
    config::get_config,
    ops::{BinaryOp, Instruction, UnaryOp},
    parser::FunctionTable,
};


/// An implementation of [`Tracer`] that does not track anything.
///
/// This is the best choice if you do not need statistics while the
/// program is executed.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoStats {}

impl Tracer for NoStats {
    #[inline(always)]
    fn push(&mut self, _: i32) {}
    #[inline(always)]
    fn pop(&mut self) {}
    #[inline(always)]
    fn call(&mut self, _name: &str, _depth: usize) {}
    #[inline(always)]
    fn instruction(&mut self, _: &Instruction, _stack_len: usize, _: Option<&OperationError>) {}
}

/// A trait for observing the VM while it runs.
///
/// You can implement this trait to track any statistics you need.
pub trait Tracer {
    fn push(&mut self, value: i32);
    fn pop(&mut self);
    /// Called when a function body is entered, `depth` is 1 for a call from top level.
    fn call(&mut self, name: &str, depth: usize);
    /// Called after every executed instruction with the resulting stack length
    /// and the error, if the instruction failed.
    fn instruction(&mut self, instruction: &Instruction, stack_len: usize, error: Option<&OperationError>);
}

/// Counters collected over a run.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub instructions: u64,
    pub pushes: u64,
    pub pops: u64,
    pub calls: u64,
    pub outputs: u64,
    pub max_stack_len: usize,
    pub max_call_depth: usize,
}

impl Tracer for Stats {
    fn push(&mut self, _: i32) {
        self.pushes += 1;
    }

    fn pop(&mut self) {
        self.pops += 1;
    }

    fn call(&mut self, _name: &str, depth: usize) {
        self.calls += 1;
        self.max_call_depth = self.max_call_depth.max(depth);
    }

    fn instruction(&mut self, instruction: &Instruction, stack_len: usize, error: Option<&OperationError>) {
        self.instructions += 1;
        self.max_stack_len = self.max_stack_len.max(stack_len);
        if error.is_none() && *instruction == Instruction::Out {
            self.outputs += 1;
        }
    }
}

/// An error that can occur during the execution of a single instruction.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationError {
    #[error("Removing from an empty stack")]
    PopFailed,
    #[error("Adding to a full stack")]
    PushFailed,
    #[error("Not enough elements on the stack: {stack_len} elements, {required} required")]
    NotEnoughElements { stack_len: usize, required: usize },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Call to undefined function `{name}`")]
    UnknownFunction { name: String },
    #[error("Call depth limit exceeded ({limit} nested calls)")]
    CallDepthExceeded { limit: usize },
}

impl OperationError {
    /// Whether the stack held fewer values than the instruction needed.
    pub fn is_stack_underflow(&self) -> bool {
        matches!(self, Self::PopFailed | Self::NotEnoughElements { .. })
    }
}

/// An error that happened while running a program.
#[derive(Debug, Error)]
pub enum RunError {
    /// A specific instruction failed.
    #[error("Instruction {instruction} failed (call depth {call_depth}, instruction counter {instruction_counter}): {error}")]
    InstructionFailed {
        /// The failed instruction as written in the source.
        instruction: String,
        /// How many function calls deep the instruction was, 0 at top level.
        call_depth: usize,
        /// The number of instructions which have been run before this one.
        instruction_counter: u64,
        /// The specific error within the instruction.
        error: OperationError,
    },
    /// The program executed more instructions than the limit specified within [`VMOptions`].
    #[error("The program ran for too long ({instruction_counter} instructions had been run).")]
    RunTooLong {
        /// The number of instructions which have been run
        instruction_counter: u64,
    },
    /// Writing to the output sink failed.
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl RunError {
    /// The instruction-level error, if this is one.
    pub fn operation_error(&self) -> Option<&OperationError> {
        match self {
            RunError::InstructionFailed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// What the VM has to do after an instruction updated the stack.
#[derive(Debug)]
enum Effect<'a> {
    None,
    Output(i32),
    Call(&'a str, &'a [Instruction]),
    Branch(&'a [Instruction]),
}

/// Options for the virtual machine. All limits are disabled by default.
#[derive(Debug, Clone)]
pub struct VMOptions<'a> {
    /// The initial stack of the program.
    initial_stack: &'a [i32],
    /// The maximum size of the stack.
    max_stack_size: usize,
    /// The maximum number of instructions to run, if this is reached,
    /// the program will stop with an error.
    ///
    /// Set to [`u64::MAX`] to disable this limit.
    max_op_count: u64,
    /// The maximum number of nested function calls.
    ///
    /// Set to [`usize::MAX`] to disable this limit, in which case unbounded
    /// recursion exhausts the native stack.
    max_call_depth: usize,
}

impl<'a> VMOptions<'a> {
    /// Create a new set of VM options.
    pub fn new(stack: &'a [i32], max_stack_size: usize, max_op_count: u64, max_call_depth: usize) -> Self {
        Self { initial_stack: stack, max_stack_size, max_op_count, max_call_depth }
    }
}

impl<'a> Default for VMOptions<'a> {
    fn default() -> Self {
        Self {
            initial_stack: &[],
            max_stack_size: usize::MAX,
            max_op_count: u64::MAX,
            max_call_depth: usize::MAX,
        }
    }
}

/// The evaluation stack together with everything needed to run instructions on it.
///
/// The stack survives between calls to [`Vm::run`], so consecutive lines of a
/// program see each other's values.
#[derive(Clone, Debug)]
pub struct Vm<T: Tracer = NoStats> {
    stack: Vec<i32>,
    max_stack_size: usize,
    max_op_count: u64,
    max_call_depth: usize,
    instructions_run: u64,
    call_depth: usize,
    tracer: T,
}

/// The successful result of running a program.
#[derive(Debug, Clone)]
pub struct RunResult<T: Tracer> {
    /// The resulting stack after the program has finished.
    pub stack: Vec<i32>,
    /// The number of instructions which have been run.
    pub instruction_counter: u64,
    /// The tracer, with whatever it collected.
    pub tracer: T,
}

impl<T: Tracer> From<Vm<T>> for RunResult<T> {
    fn from(vm: Vm<T>) -> Self {
        RunResult { stack: vm.stack, instruction_counter: vm.instructions_run, tracer: vm.tracer }
    }
}

impl Vm<NoStats> {
    pub fn new(options: VMOptions) -> Self {
        Self::with_tracer(options, NoStats::default())
    }
}

impl Default for Vm<NoStats> {
    fn default() -> Self {
        Self::new(VMOptions::default())
    }
}

fn apply_binary(op: BinaryOp, first: i32, second: i32) -> Result<i32, OperationError> {
    Ok(match op {
        BinaryOp::Add => first.wrapping_add(second),
        BinaryOp::Sub => first.wrapping_sub(second),
        BinaryOp::Mul => first.wrapping_mul(second),
        BinaryOp::Div => {
            if second == 0 {
                return Err(OperationError::DivisionByZero);
            }
            first.wrapping_div(second)
        }
        BinaryOp::Mod => {
            if second == 0 {
                return Err(OperationError::DivisionByZero);
            }
            first.wrapping_rem(second)
        }
    })
}

fn apply_unary(op: UnaryOp, value: i32) -> i32 {
    let result = match op {
        UnaryOp::Pos => value >= 0,
        UnaryOp::Not => value == 0,
    };
    result as i32
}

impl<T: Tracer> Vm<T> {
    pub fn with_tracer(options: VMOptions, tracer: T) -> Self {
        Vm {
            stack: options.initial_stack.to_vec(),
            max_stack_size: options.max_stack_size,
            max_op_count: options.max_op_count,
            max_call_depth: options.max_call_depth,
            instructions_run: 0,
            call_depth: 0,
            tracer,
        }
    }

    pub fn stack(&self) -> &[i32] {
        &self.stack
    }

    pub fn instruction_counter(&self) -> u64 {
        self.instructions_run
    }

    pub fn tracer(&self) -> &T {
        &self.tracer
    }

    pub fn into_tracer(self) -> T {
        self.tracer
    }

    /// Runs `instructions` in order, resolving calls through `functions` and
    /// writing one line to `out` for every `OUT`.
    ///
    /// Stops at the first failing instruction. Anything written before it
    /// stays written.
    pub fn run<W: Write>(
        &mut self,
        instructions: &[Instruction],
        functions: &FunctionTable,
        out: &mut W,
    ) -> Result<(), RunError> {
        for instruction in instructions {
            self.exec(instruction, functions, out)?;
        }
        Ok(())
    }

    fn exec<W: Write>(
        &mut self,
        instruction: &Instruction,
        functions: &FunctionTable,
        out: &mut W,
    ) -> Result<(), RunError> {
        if self.instructions_run >= self.max_op_count {
            return Err(RunError::RunTooLong { instruction_counter: self.instructions_run });
        }
        let conf = get_config();
        if conf.should_log(30) {
            eprintln!(
                "Executing {} at depth {}, stack {}, top3: {:?}",
                instruction.mnemonic(),
                self.call_depth,
                self.stack.len(),
                self.stack.iter().rev().copied().take(3).collect::<Vec<i32>>()
            );
        }

        let instruction_counter = self.instructions_run;
        let result = self.apply(instruction, functions);
        self.tracer.instruction(instruction, self.stack.len(), result.as_ref().err());
        self.instructions_run += 1;

        match result {
            Err(error) => Err(RunError::InstructionFailed {
                instruction: instruction.mnemonic(),
                call_depth: self.call_depth,
                instruction_counter,
                error,
            }),
            Ok(Effect::None) => Ok(()),
            Ok(Effect::Output(value)) => {
                writeln!(out, "{value}")?;
                Ok(())
            }
            // Bodies run here directly, not through `run`: one native frame per nesting level.
            Ok(Effect::Branch(branch)) => {
                for instruction in branch {
                    self.exec(instruction, functions, out)?;
                }
                Ok(())
            }
            Ok(Effect::Call(name, body)) => {
                self.call_depth += 1;
                self.tracer.call(name, self.call_depth);
                if conf.should_log(20) {
                    eprintln!("Calling {name} at depth {}, stack {}", self.call_depth, self.stack.len());
                }
                for instruction in body {
                    if let Err(error) = self.exec(instruction, functions, out) {
                        self.call_depth -= 1;
                        return Err(error);
                    }
                }
                self.call_depth -= 1;
                Ok(())
            }
        }
    }

    fn pop(&mut self) -> Result<i32, OperationError> {
        let value = self.stack.pop().ok_or(OperationError::PopFailed)?;
        self.tracer.pop();
        Ok(value)
    }

    fn push(&mut self, value: i32) -> Result<(), OperationError> {
        if self.stack.len() >= self.max_stack_size {
            return Err(OperationError::PushFailed);
        }

        self.stack.push(value);
        self.tracer.push(value);
        Ok(())
    }

    /// Checks that at least `count` values are present, so that an instruction
    /// never fails halfway through changing the stack.
    fn require(&self, count: usize) -> Result<(), OperationError> {
        if self.stack.len() < count {
            return Err(OperationError::NotEnoughElements { stack_len: self.stack.len(), required: count });
        }
        Ok(())
    }

    /// The value `n` positions below the top, which must exist.
    fn peek_n(&self, n: usize) -> i32 {
        self.stack[self.stack.len() - 1 - n]
    }

    fn apply<'a>(&mut self, instruction: &'a Instruction, functions: &'a FunctionTable) -> Result<Effect<'a>, OperationError> {
        match instruction {
            Instruction::Number(value) => {
                self.push(*value)?;
            }
            Instruction::Binary(op) => {
                self.require(2)?;
                let result = apply_binary(*op, self.peek_n(1), self.peek_n(0))?;
                self.pop()?;
                self.pop()?;
                self.push(result)?;
            }
            Instruction::Unary(op) => {
                let value = self.pop()?;
                self.push(apply_unary(*op, value))?;
            }
            Instruction::Out => {
                let value = self.pop()?;
                return Ok(Effect::Output(value));
            }
            Instruction::Pop => {
                self.pop()?;
            }
            Instruction::Dup => {
                self.require(1)?;
                self.push(self.peek_n(0))?;
            }
            Instruction::Swp => {
                self.require(2)?;
                let first = self.pop()?;
                let second = self.pop()?;
                self.push(first)?;
                self.push(second)?;
            }
            Instruction::Rot => {
                self.require(3)?;
                let first = self.pop()?;
                let second = self.pop()?;
                let third = self.pop()?;
                self.push(second)?;
                self.push(first)?;
                self.push(third)?;
            }
            Instruction::Ovr => {
                self.require(2)?;
                self.push(self.peek_n(1))?;
            }
            Instruction::FunctionDefinition { .. } => {}
            Instruction::FunctionCall(name) => {
                let body = functions
                    .get(name)
                    .ok_or_else(|| OperationError::UnknownFunction { name: name.to_string() })?;
                if self.call_depth >= self.max_call_depth {
                    return Err(OperationError::CallDepthExceeded { limit: self.max_call_depth });
                }
                return Ok(Effect::Call(name, body));
            }
            Instruction::Conditional { then_branch, else_branch } => {
                let condition = self.pop()?;
                let branch = if condition != 0 { then_branch } else { else_branch };
                return Ok(Effect::Branch(branch));
            }
        }

        Ok(Effect::None)
    }
}

/// Run instructions on a fresh VM with the given options.
///
/// # Example
/// ```
/// use obsolete::parser::Parser;
/// use obsolete::vm::{run, VMOptions};
///
/// let mut parser = Parser::new();
/// let ops = parser.parse("5 2 SUB DUP OUT").unwrap();
/// let mut out = Vec::<u8>::new();
/// let result = run(&ops, parser.functions(), VMOptions::default(), &mut out).unwrap();
/// assert_eq!(result.stack, vec![3]);
/// assert_eq!(out, b"3\n");
/// ```
pub fn run<W: Write>(
    instructions: &[Instruction],
    functions: &FunctionTable,
    options: VMOptions,
    out: &mut W,
) -> Result<RunResult<NoStats>, RunError> {
    run_with_stats(instructions, functions, options, NoStats::default(), out)
}

/// Run instructions with the given options and collect statistics.
/// If you do not need statistics, use the [`run`] function instead.
pub fn run_with_stats<T: Tracer, W: Write>(
    instructions: &[Instruction],
    functions: &FunctionTable,
    options: VMOptions,
    tracer: T,
    out: &mut W,
) -> Result<RunResult<T>, RunError> {
    let mut vm = Vm::with_tracer(options, tracer);
    vm.run(instructions, functions, out)?;
    Ok(vm.into())
}
