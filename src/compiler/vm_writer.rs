//! Serialization of VM instructions. Nothing outside this module knows the
//! textual syntax of the instruction stream.

use core::fmt::{self, Write};

use super::symbol_table::Kind;

/// Named memory regions addressable by `push`/`pop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Constant,
    Argument,
    Local,
    Static,
    This,
    That,
    Pointer,
    Temp,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Constant => "constant",
            Self::Argument => "argument",
            Self::Local => "local",
            Self::Static => "static",
            Self::This => "this",
            Self::That => "that",
            Self::Pointer => "pointer",
            Self::Temp => "temp",
        })
    }
}

impl From<Kind> for Segment {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Static => Self::Static,
            // fields are addressed through the current instance
            Kind::Field => Self::This,
            Kind::Argument => Self::Argument,
            Kind::Local => Self::Local,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Neg => "neg",
            Self::Eq => "eq",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
        })
    }
}

/// One line of VM code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction<'a> {
    Push(Segment, u32),
    Pop(Segment, u32),
    Arithmetic(Command),
    Label(&'a str),
    Goto(&'a str),
    IfGoto(&'a str),
    Call(&'a str, u16),
    Function(&'a str, u16),
    Return,
}

impl fmt::Display for Instruction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push(segment, index) => write!(f, "push {segment} {index}"),
            Self::Pop(segment, index) => write!(f, "pop {segment} {index}"),
            Self::Arithmetic(command) => write!(f, "{command}"),
            Self::Label(label) => write!(f, "label {label}"),
            Self::Goto(label) => write!(f, "goto {label}"),
            Self::IfGoto(label) => write!(f, "if-goto {label}"),
            Self::Call(name, n_args) => write!(f, "call {name} {n_args}"),
            Self::Function(name, n_locals) => write!(f, "function {name} {n_locals}"),
            Self::Return => write!(f, "return"),
        }
    }
}

/// Ordered, in-memory sink for a single compiled unit.
///
/// Output is only handed out through [`VmWriter::finish`], so a unit that
/// fails halfway never leaks partial code.
#[derive(Debug, Default)]
pub struct VmWriter {
    out: String,
}

impl VmWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&mut self, instruction: Instruction) {
        log::trace!("emit {instruction}");
        // Writing into a String cannot fail
        _ = writeln!(self.out, "{instruction}");
    }

    pub fn write_push(&mut self, segment: Segment, index: u32) {
        self.write(Instruction::Push(segment, index));
    }

    pub fn write_pop(&mut self, segment: Segment, index: u32) {
        self.write(Instruction::Pop(segment, index));
    }

    pub fn write_arithmetic(&mut self, command: Command) {
        self.write(Instruction::Arithmetic(command));
    }

    pub fn write_label(&mut self, label: &str) {
        self.write(Instruction::Label(label));
    }

    pub fn write_goto(&mut self, label: &str) {
        self.write(Instruction::Goto(label));
    }

    pub fn write_if(&mut self, label: &str) {
        self.write(Instruction::IfGoto(label));
    }

    pub fn write_call(&mut self, name: &str, n_args: u16) {
        self.write(Instruction::Call(name, n_args));
    }

    pub fn write_function(&mut self, name: &str, n_locals: u16) {
        self.write(Instruction::Function(name, n_locals));
    }

    pub fn write_return(&mut self) {
        self.write(Instruction::Return);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, Segment, VmWriter};
    use crate::compiler::symbol_table::Kind;
    use assert2::check;

    #[test]
    fn one_instruction_per_line() {
        let mut writer = VmWriter::new();
        writer.write_function("Main.main", 2);
        writer.write_push(Segment::Constant, 7);
        writer.write_pop(Segment::Temp, 0);
        writer.write_arithmetic(Command::Neg);
        writer.write_label("L0");
        writer.write_if("L0");
        writer.write_goto("L1");
        writer.write_call("Math.multiply", 2);
        writer.write_return();

        check!(
            writer.finish()
                == "function Main.main 2\n\
                    push constant 7\n\
                    pop temp 0\n\
                    neg\n\
                    label L0\n\
                    if-goto L0\n\
                    goto L1\n\
                    call Math.multiply 2\n\
                    return\n"
        );
    }

    #[test]
    fn kinds_map_to_segments() {
        check!(Segment::from(Kind::Static) == Segment::Static);
        check!(Segment::from(Kind::Field) == Segment::This);
        check!(Segment::from(Kind::Argument) == Segment::Argument);
        check!(Segment::from(Kind::Local) == Segment::Local);
        check!(Segment::Pointer.to_string() == "pointer");
        check!(Segment::That.to_string() == "that");
    }
}
