//! # obsolete
//! An interpreter for a small postfix language working on a single stack of
//! 32-bit integers.
//!
//! ## The language
//! A program is a sequence of lines. Each line is split on whitespace into
//! tokens, and every token is a number literal, an opcode or the name of a
//! function defined earlier. The stack is shared by all lines of a program.
//!
//! | Token        | Effect |
//! |--------------|--------|
//! | `-?[0-9]+`   | Push the number. |
//! | `ADD` `SUB` `MUL` `DIV` `MOD` | Pop `b`, pop `a`, push `a op b`. Division truncates, the remainder takes the sign of `a`. |
//! | `POS`        | Pop `a`, push 1 if `a >= 0`, else 0. |
//! | `NOT`        | Pop `a`, push 1 if `a == 0`, else 0. |
//! | `OUT`        | Pop `a` and print it on its own line. |
//! | `POP`        | Pop and discard. |
//! | `DUP`        | Push a copy of the top. |
//! | `SWP`        | Swap the two topmost values. |
//! | `ROT`        | `( c b a -- b a c )`: the third value moves to the top. |
//! | `OVR`        | Push a copy of the second value. |
//! | `DEF name … END` | Define a function. |
//! | `IF … ELS … FI`  | Inside a function only: pop, run the first part if non-zero, the second part otherwise. `ELS` is optional. |
//!
//! A function may call itself, which together with `IF` is the only way to loop:
//! ```text
//! 2
//! DEF SUM DUP IF DUP 1 SUB SUM ADD FI END
//! 5 SUM OUT
//! ```
//! prints `15`.
//!
//! ## Running programs
//! [`repl::Repl`] runs a whole program: a line count followed by that many lines.
//! For finer control, [`parser::Parser`] turns lines into [`ops::Instruction`]s and
//! [`vm::Vm`] executes them.
pub mod config;
pub mod ops;
pub mod parser;
pub mod repl;
pub mod vm;
