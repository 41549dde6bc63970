//! Instructions of the language.
use std::fmt;
use std::rc::Rc;

/// Arithmetic operators taking two operands.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Tests taking one operand and producing 0 or 1.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum UnaryOp {
    /// 1 if the value is non-negative.
    Pos,
    /// 1 if the value is zero.
    Not,
}

/// A single parsed instruction.
///
/// Function bodies are shared between the [`Instruction::FunctionDefinition`]
/// and the function table, so cloning an instruction is cheap.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Instruction {
    Number(i32),
    Binary(BinaryOp),
    Unary(UnaryOp),
    Out,
    Pop,
    Dup,
    Swp,
    Rot,
    Ovr,
    /// Registers a function while parsing; a no-op when executed.
    FunctionDefinition { name: Rc<str>, body: Rc<[Instruction]> },
    /// Calls a function by name. The name is looked up when the call runs.
    FunctionCall(Rc<str>),
    /// Pops a value and runs `then_branch` if it is non-zero, `else_branch` otherwise.
    Conditional { then_branch: Vec<Instruction>, else_branch: Vec<Instruction> },
}

impl BinaryOp {
    pub fn keyword(self) -> &'static str {
        match self {
            BinaryOp::Add => "ADD",
            BinaryOp::Sub => "SUB",
            BinaryOp::Mul => "MUL",
            BinaryOp::Div => "DIV",
            BinaryOp::Mod => "MOD",
        }
    }
}

impl UnaryOp {
    pub fn keyword(self) -> &'static str {
        match self {
            UnaryOp::Pos => "POS",
            UnaryOp::Not => "NOT",
        }
    }
}

impl Instruction {
    /// Returns the instruction for a fixed opcode keyword, or `None` if
    /// `word` is not one. `DEF` and the conditional keywords are structural
    /// and handled by the parser.
    pub fn by_keyword(word: &str) -> Option<Instruction> {
        Some(match word {
            "ADD" => Instruction::Binary(BinaryOp::Add),
            "SUB" => Instruction::Binary(BinaryOp::Sub),
            "MUL" => Instruction::Binary(BinaryOp::Mul),
            "DIV" => Instruction::Binary(BinaryOp::Div),
            "MOD" => Instruction::Binary(BinaryOp::Mod),
            "POS" => Instruction::Unary(UnaryOp::Pos),
            "NOT" => Instruction::Unary(UnaryOp::Not),
            "OUT" => Instruction::Out,
            "POP" => Instruction::Pop,
            "DUP" => Instruction::Dup,
            "SWP" => Instruction::Swp,
            "ROT" => Instruction::Rot,
            "OVR" => Instruction::Ovr,
            _ => return None,
        })
    }

    /// A short name used in error messages and traces. Unlike [`fmt::Display`],
    /// this does not include function bodies or branches.
    pub fn mnemonic(&self) -> String {
        match self {
            Instruction::Number(value) => value.to_string(),
            Instruction::Binary(op) => op.keyword().to_string(),
            Instruction::Unary(op) => op.keyword().to_string(),
            Instruction::Out => "OUT".to_string(),
            Instruction::Pop => "POP".to_string(),
            Instruction::Dup => "DUP".to_string(),
            Instruction::Swp => "SWP".to_string(),
            Instruction::Rot => "ROT".to_string(),
            Instruction::Ovr => "OVR".to_string(),
            Instruction::FunctionDefinition { name, .. } => format!("DEF {name}"),
            Instruction::FunctionCall(name) => name.to_string(),
            Instruction::Conditional { .. } => "IF".to_string(),
        }
    }
}

fn write_sequence(f: &mut fmt::Formatter<'_>, instructions: &[Instruction]) -> fmt::Result {
    for instruction in instructions {
        write!(f, " {instruction}")?;
    }
    Ok(())
}

/// Renders an instruction back to source text.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::FunctionDefinition { name, body } => {
                write!(f, "DEF {name}")?;
                write_sequence(f, body)?;
                write!(f, " END")
            }
            Instruction::Conditional { then_branch, else_branch } => {
                write!(f, "IF")?;
                write_sequence(f, then_branch)?;
                if !else_branch.is_empty() {
                    write!(f, " ELS")?;
                    write_sequence(f, else_branch)?;
                }
                write!(f, " FI")
            }
            other => f.write_str(&other.mnemonic()),
        }
    }
}

/// Renders a whole line of instructions, separated by spaces.
pub fn format_line(instructions: &[Instruction]) -> String {
    instructions.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_keyword() {
        assert_eq!(Instruction::by_keyword("ADD"), Some(Instruction::Binary(BinaryOp::Add)));
        assert_eq!(Instruction::by_keyword("NOT"), Some(Instruction::Unary(UnaryOp::Not)));
        assert_eq!(Instruction::by_keyword("OVR"), Some(Instruction::Ovr));
        assert_eq!(Instruction::by_keyword("DEF"), None);
        assert_eq!(Instruction::by_keyword("IF"), None);
        assert_eq!(Instruction::by_keyword("add"), None);
    }

    #[test]
    fn test_display() {
        let body: Rc<[Instruction]> = vec![
            Instruction::Conditional {
                then_branch: vec![Instruction::Number(1)],
                else_branch: vec![Instruction::Number(-2), Instruction::FunctionCall("F".into())],
            },
            Instruction::Out,
        ]
        .into();
        let def = Instruction::FunctionDefinition { name: "F".into(), body };
        assert_eq!(def.to_string(), "DEF F IF 1 ELS -2 F FI OUT END");
        assert_eq!(def.mnemonic(), "DEF F");

        let no_else = Instruction::Conditional { then_branch: vec![], else_branch: vec![] };
        assert_eq!(no_else.to_string(), "IF FI");

        assert_eq!(format_line(&[Instruction::Number(5), Instruction::Dup, Instruction::Binary(BinaryOp::Mul)]), "5 DUP MUL");
    }
}
