//! Expressions, terms and subroutine calls.

use super::{
    symbol_table::Resolution,
    vm_writer::{Command, Segment},
    CompilationEngine, CompileError, Expected,
};
use crate::lexer::{Keyword, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Lt,
    Gt,
    Eq,
}

impl BinaryOp {
    fn from_symbol(symbol: char) -> Option<Self> {
        Some(match symbol {
            '+' => Self::Add,
            '-' => Self::Sub,
            '*' => Self::Mul,
            '/' => Self::Div,
            '&' => Self::And,
            '|' => Self::Or,
            '<' => Self::Lt,
            '>' => Self::Gt,
            '=' => Self::Eq,
            _ => return None,
        })
    }
}

impl CompilationEngine {
    /// `term (op term)*`
    ///
    /// Each operator is written right after its right-hand term, so
    /// evaluation is strictly left to right.
    pub(super) fn compile_expression(&mut self) -> Result<(), CompileError> {
        self.compile_term()?;
        while let Some(op) = self.tokens.symbol().and_then(BinaryOp::from_symbol) {
            self.tokens.advance();
            self.compile_term()?;
            match op {
                BinaryOp::Add => self.writer.write_arithmetic(Command::Add),
                BinaryOp::Sub => self.writer.write_arithmetic(Command::Sub),
                // no native multiply/divide in the VM
                BinaryOp::Mul => self.writer.write_call("Math.multiply", 2),
                BinaryOp::Div => self.writer.write_call("Math.divide", 2),
                BinaryOp::And => self.writer.write_arithmetic(Command::And),
                BinaryOp::Or => self.writer.write_arithmetic(Command::Or),
                BinaryOp::Lt => self.writer.write_arithmetic(Command::Lt),
                BinaryOp::Gt => self.writer.write_arithmetic(Command::Gt),
                BinaryOp::Eq => self.writer.write_arithmetic(Command::Eq),
            }
        }
        Ok(())
    }

    /// ```text
    /// integerConstant | stringConstant | keywordConstant | varName
    /// | varName '[' expression ']' | subroutineCall | '(' expression ')'
    /// | unaryOp term
    /// ```
    pub(super) fn compile_term(&mut self) -> Result<(), CompileError> {
        match self.tokens.current_token().cloned() {
            Some(Token::IntegerConstant(n)) => {
                self.tokens.advance();
                self.writer.write_push(Segment::Constant, n);
            }
            Some(Token::StringConstant(s)) => {
                self.tokens.advance();
                self.compile_string(&s);
            }
            Some(Token::Keyword(Keyword::True)) => {
                self.tokens.advance();
                self.writer.write_push(Segment::Constant, 0);
                self.writer.write_arithmetic(Command::Not);
            }
            Some(Token::Keyword(Keyword::False | Keyword::Null)) => {
                self.tokens.advance();
                self.writer.write_push(Segment::Constant, 0);
            }
            Some(Token::Keyword(Keyword::This)) => {
                self.tokens.advance();
                self.writer.write_push(Segment::Pointer, 0);
            }
            Some(Token::Symbol('(')) => {
                self.tokens.advance();
                self.compile_expression()?;
                self.expect_symbol(')')?;
            }
            Some(Token::Symbol(op @ ('-' | '~'))) => {
                self.tokens.advance();
                self.compile_term()?;
                self.writer.write_arithmetic(if op == '-' {
                    Command::Neg
                } else {
                    Command::Not
                });
            }
            Some(Token::Identifier(_)) => match self.tokens.peek_next() {
                Some(Token::Symbol('[')) => self.compile_array_read()?,
                Some(Token::Symbol('(' | '.')) => self.compile_subroutine_call()?,
                _ => {
                    let span = self.tokens.current_span();
                    let name = self.expect_identifier()?;
                    let (segment, index) = self.variable(&name, span)?;
                    self.writer.write_push(segment, index);
                }
            },
            _ => return Err(self.unexpected(Expected::Term)),
        }
        Ok(())
    }

    /// Strings are built at runtime one character at a time.
    fn compile_string(&mut self, s: &str) {
        self.writer
            .write_push(Segment::Constant, s.chars().count() as u32);
        self.writer.write_call("String.new", 1);
        for c in s.chars() {
            self.writer.write_push(Segment::Constant, c as u32);
            self.writer.write_call("String.appendChar", 2);
        }
    }

    /// `varName '[' expression ']'`, read through `that`
    fn compile_array_read(&mut self) -> Result<(), CompileError> {
        let span = self.tokens.current_span();
        let name = self.expect_identifier()?;
        let (segment, index) = self.variable(&name, span)?;

        self.expect_symbol('[')?;
        self.compile_expression()?;
        self.expect_symbol(']')?;

        self.writer.write_push(segment, index);
        self.writer.write_arithmetic(Command::Add);
        self.writer.write_pop(Segment::Pointer, 1);
        self.writer.write_push(Segment::That, 0);
        Ok(())
    }

    /// ```text
    /// subroutineName '(' expressionList ')'
    /// | (className | varName) '.' subroutineName '(' expressionList ')'
    /// ```
    ///
    /// Calling through a variable passes it as the receiver and dispatches on
    /// its declared type. An undeclared qualifier is a class name, and the call
    /// gets no receiver. An unqualified call goes to the current class with
    /// the current instance as receiver.
    pub(super) fn compile_subroutine_call(&mut self) -> Result<(), CompileError> {
        let first = self.expect_identifier()?;

        let (callee, receivers) = if self.at_symbol('.') {
            self.tokens.advance();
            let member = self.expect_identifier()?;
            match self.symbols.resolve(&first) {
                Resolution::Variable(receiver) => {
                    let callee = format!("{}.{member}", receiver.ty);
                    self.writer
                        .write_push(receiver.kind.into(), receiver.index.into());
                    (callee, 1)
                }
                Resolution::ClassReference => (format!("{first}.{member}"), 0),
            }
        } else {
            self.writer.write_push(Segment::Pointer, 0);
            (format!("{}.{first}", self.class_name), 1)
        };

        self.expect_symbol('(')?;
        let n_args = self.compile_expression_list(receivers)?;
        self.expect_symbol(')')?;

        self.writer.write_call(&callee, n_args);
        Ok(())
    }

    /// `(expression (',' expression)*)?`, returning `count` plus how many were
    /// compiled
    fn compile_expression_list(&mut self, mut count: u16) -> Result<u16, CompileError> {
        if self.at_symbol(')') {
            return Ok(count);
        }
        loop {
            let span = self.tokens.current_span();
            count = count
                .checked_add(1)
                .ok_or(CompileError::TooManyArguments { span })?;
            self.compile_expression()?;
            if !self.at_symbol(',') {
                return Ok(count);
            }
            self.tokens.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::{compile, CompileError};
    use assert2::{check, let_assert};

    /// Compiles `expression` as the value of `return` in a method of `class T`
    /// with fields `a`, `b` and locals `x`, `arr`.
    fn compile_expression(expression: &str) -> Vec<String> {
        let source = format!(
            "class T {{
                field int a, b;
                method int f(Ball ball) {{
                    var int x;
                    var Array arr;
                    return {expression};
                }}
            }}"
        );
        let unit = compile(&source).unwrap();
        let lines: Vec<String> = unit.code.lines().map(String::from).collect();
        // drop header, method prologue and the trailing return
        lines[3..lines.len() - 1].to_vec()
    }

    #[test]
    fn every_binary_operator() {
        check!(
            compile_expression("1+2-3*4/5&6|7<8>9=10")
                == [
                    "push constant 1",
                    "push constant 2",
                    "add",
                    "push constant 3",
                    "sub",
                    "push constant 4",
                    "call Math.multiply 2",
                    "push constant 5",
                    "call Math.divide 2",
                    "push constant 6",
                    "and",
                    "push constant 7",
                    "or",
                    "push constant 8",
                    "lt",
                    "push constant 9",
                    "gt",
                    "push constant 10",
                    "eq",
                ]
        );
    }

    #[test]
    fn parentheses_group() {
        check!(
            compile_expression("2+(3*4)")
                == [
                    "push constant 2",
                    "push constant 3",
                    "push constant 4",
                    "call Math.multiply 2",
                    "add",
                ]
        );
    }

    #[test]
    fn unary_operators_wrap_one_term() {
        check!(
            compile_expression("-x+~a")
                == ["push local 0", "neg", "push this 0", "not", "add"]
        );
        check!(compile_expression("--1") == ["push constant 1", "neg", "neg"]);
    }

    #[test]
    fn keyword_constants() {
        check!(compile_expression("true") == ["push constant 0", "not"]);
        check!(compile_expression("false") == ["push constant 0"]);
        check!(compile_expression("null") == ["push constant 0"]);
        check!(compile_expression("this") == ["push pointer 0"]);
    }

    #[test]
    fn string_constants_are_built_char_by_char() {
        check!(
            compile_expression(r#""Hi""#)
                == [
                    "push constant 2",
                    "call String.new 1",
                    "push constant 72",
                    "call String.appendChar 2",
                    "push constant 105",
                    "call String.appendChar 2",
                ]
        );
        check!(compile_expression(r#""""#) == ["push constant 0", "call String.new 1"]);
    }

    #[test]
    fn array_reads_go_through_that() {
        check!(
            compile_expression("arr[b+1]")
                == [
                    "push this 1",
                    "push constant 1",
                    "add",
                    "push local 1",
                    "add",
                    "pop pointer 1",
                    "push that 0",
                ]
        );
    }

    #[test]
    fn variables_use_their_segments() {
        check!(compile_expression("a") == ["push this 0"]);
        check!(compile_expression("b") == ["push this 1"]);
        check!(compile_expression("ball") == ["push argument 1"]);
        check!(compile_expression("x") == ["push local 0"]);
    }

    #[test]
    fn calls_through_a_variable_pass_it_as_receiver() {
        check!(
            compile_expression("ball.distance(x, 3)")
                == [
                    "push argument 1",
                    "push local 0",
                    "push constant 3",
                    "call Ball.distance 3",
                ]
        );
    }

    #[test]
    fn calls_through_a_class_have_no_receiver() {
        check!(
            compile_expression("Math.max(a, b)")
                == ["push this 0", "push this 1", "call Math.max 2"]
        );
        check!(compile_expression("Keyboard.readChar()") == ["call Keyboard.readChar 0"]);
    }

    #[test]
    fn unqualified_calls_target_the_current_instance() {
        check!(
            compile_expression("f(ball)")
                == ["push pointer 0", "push argument 1", "call T.f 2"]
        );
    }

    #[test]
    fn nested_calls_count_their_own_arguments() {
        check!(
            compile_expression("Math.min(Math.abs(x), 1)")
                == [
                    "push local 0",
                    "call Math.abs 1",
                    "push constant 1",
                    "call Math.min 2",
                ]
        );
    }

    #[test]
    fn array_writes_bind_that_after_the_value() {
        let source = "class T {
            function void f(Array a, Array b) {
                let a[1] = b[2];
                return;
            }
        }";
        let code = compile(source).unwrap().code;
        check!(
            code.lines().collect::<Vec<_>>()
                == [
                    "function T.f 0",
                    "push constant 1",
                    "push argument 0",
                    "add",
                    "push constant 2",
                    "push argument 1",
                    "add",
                    "pop pointer 1",
                    "push that 0",
                    "pop temp 0",
                    "pop pointer 1",
                    "push temp 0",
                    "pop that 0",
                    "push constant 0",
                    "return",
                ]
        );
    }

    #[test]
    fn undeclared_names_are_only_errors_outside_call_targets() {
        let_assert!(Err(CompileError::UndeclaredVariable { name, .. }) = compile(
            "class T { function int f() { return nope; } }"
        ));
        check!(name.as_ref() == "nope");

        let_assert!(Err(CompileError::UndeclaredVariable { name, .. }) = compile(
            "class T { function int f() { return nope[0]; } }"
        ));
        check!(name.as_ref() == "nope");

        check!(compile("class T { function int f() { return Nope.f(); } }").is_ok());
    }

    #[test]
    fn argument_count_must_fit_the_call() {
        let args = |n: u32| vec!["1"; n as usize].join(",");

        let code = compile_expression(&format!("Foo.g({})", args(u16::MAX.into())));
        check!(code.last().map(String::as_str) == Some("call Foo.g 65535"));

        let source = format!(
            "class T {{ function void f() {{ do Foo.g({}); return; }} }}",
            args(u32::from(u16::MAX) + 1)
        );
        let_assert!(Err(CompileError::TooManyArguments { span }) = compile(&source));
        check!(span.start == source.rfind('1').unwrap());

        // the receiver takes one of the slots
        let source = format!(
            "class T {{ method void f() {{ do g({}); return; }} }}",
            args(u16::MAX.into())
        );
        let_assert!(Err(CompileError::TooManyArguments { .. }) = compile(&source));
    }
}
