//! Compile a single class into VM code in one pass.
//!
//! There is no syntax tree: every grammar routine consumes exactly the tokens
//! of its production and writes the VM instructions for it as it goes. For
//! example
//!
//! ```text
//! class Main {
//!     function int twice(int x) {
//!         return x + x;
//!     }
//! }
//! ```
//!
//! compiles to
//!
//! ```text
//! function Main.twice 0
//! push argument 0
//! push argument 0
//! add
//! return
//! ```
//!
//! Expressions have no operator precedence, `a + b * c` is `(a + b) * c`.

use core::fmt;

use crate::lexer::{Keyword, LexerError, Span, Token, Tokenizer};

mod expression;
pub mod symbol_table;
pub mod vm_writer;

pub use symbol_table::Kind;
use symbol_table::{Resolution, SymbolTable};
use vm_writer::{Command, Segment, VmWriter};

/// What a grammar routine wanted to see when it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    Symbol(char),
    Keyword(Keyword),
    OneOf(&'static [Keyword]),
    Identifier,
    /// `int`, `char`, `boolean` or a class name
    Type,
    Term,
    EndOfInput,
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(c) => write!(f, "`{c}`"),
            Self::Keyword(k) => write!(f, "`{k}`"),
            Self::OneOf(keywords) => {
                write!(f, "one of ")?;
                for (i, k) in keywords.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "`{k}`")?;
                }
                Ok(())
            }
            Self::Identifier => write!(f, "an identifier"),
            Self::Type => write!(f, "a type"),
            Self::Term => write!(f, "a term"),
            Self::EndOfInput => write!(f, "end of input"),
        }
    }
}

/// Anything that stops a unit from compiling. The first error aborts the
/// whole unit.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("{error}")]
    Lexical { error: LexerError, span: Span },
    #[error("expected {expected}, found {found}")]
    Syntax {
        expected: Expected,
        found: Box<str>,
        span: Span,
    },
    #[error("use of undeclared variable `{name}`")]
    UndeclaredVariable { name: Box<str>, span: Span },
    #[error("too many {kind} variables, at most {} fit in one subroutine or class", u16::MAX)]
    TooManyVariables { kind: Kind, span: Span },
    #[error("too many arguments in call, at most {} can be passed", u16::MAX)]
    TooManyArguments { span: Span },
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            Self::Lexical { span, .. }
            | Self::Syntax { span, .. }
            | Self::UndeclaredVariable { span, .. }
            | Self::TooManyVariables { span, .. }
            | Self::TooManyArguments { span } => span.clone(),
        }
    }
}

/// VM code for one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    pub class_name: Box<str>,
    pub code: String,
}

/// Compiles the class in `source`. Nothing is returned unless the whole unit
/// compiles.
pub fn compile(source: &str) -> Result<CompiledUnit, CompileError> {
    let mut engine = CompilationEngine::new(source)?;
    engine.compile_class()?;
    Ok(engine.finish())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubroutineKind {
    Constructor,
    Function,
    Method,
}

const SUBROUTINE_KEYWORDS: &[Keyword] = &[Keyword::Constructor, Keyword::Function, Keyword::Method];
const CLASS_VAR_KEYWORDS: &[Keyword] = &[Keyword::Static, Keyword::Field];

/// Per-unit compiler state. Label numbering lives here, so independent units
/// never share counters.
pub struct CompilationEngine {
    tokens: Tokenizer,
    symbols: SymbolTable,
    writer: VmWriter,
    class_name: Box<str>,
    label_counter: usize,
}

impl CompilationEngine {
    pub fn new(source: &str) -> Result<Self, CompileError> {
        let mut tokens =
            Tokenizer::new(source).map_err(|(error, span)| CompileError::Lexical { error, span })?;
        tokens.advance();
        Ok(Self {
            tokens,
            symbols: SymbolTable::new(),
            writer: VmWriter::new(),
            class_name: Box::from(""),
            label_counter: 0,
        })
    }

    pub fn finish(self) -> CompiledUnit {
        CompiledUnit {
            class_name: self.class_name,
            code: self.writer.finish(),
        }
    }

    fn new_label(&mut self) -> String {
        let label = format!("L{}", self.label_counter);
        self.label_counter += 1;
        label
    }

    // Token helpers

    fn unexpected(&self, expected: Expected) -> CompileError {
        let found: Box<str> = match self.tokens.current_token() {
            Some(token) => Box::from(token.to_string()),
            None => Box::from("end of input"),
        };
        CompileError::Syntax {
            expected,
            found,
            span: self.tokens.current_span(),
        }
    }

    fn at_symbol(&self, symbol: char) -> bool {
        self.tokens.symbol() == Some(symbol)
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        self.tokens.keyword() == Some(keyword)
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<(), CompileError> {
        if !self.at_symbol(symbol) {
            return Err(self.unexpected(Expected::Symbol(symbol)));
        }
        self.tokens.advance();
        Ok(())
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<(), CompileError> {
        if !self.at_keyword(keyword) {
            return Err(self.unexpected(Expected::Keyword(keyword)));
        }
        self.tokens.advance();
        Ok(())
    }

    fn expect_identifier(&mut self) -> Result<Box<str>, CompileError> {
        let Some(name) = self.tokens.identifier().map(Box::from) else {
            return Err(self.unexpected(Expected::Identifier));
        };
        self.tokens.advance();
        Ok(name)
    }

    fn expect_type(&mut self) -> Result<Box<str>, CompileError> {
        let ty = match self.tokens.current_token() {
            Some(Token::Keyword(k @ (Keyword::Int | Keyword::Char | Keyword::Boolean))) => {
                Box::from(k.as_str())
            }
            Some(Token::Identifier(class_name)) => class_name.clone(),
            _ => return Err(self.unexpected(Expected::Type)),
        };
        self.tokens.advance();
        Ok(ty)
    }

    /// Where a variable lives. Only declared names are variables.
    fn variable(&self, name: &str, span: Span) -> Result<(Segment, u32), CompileError> {
        match self.symbols.resolve(name) {
            Resolution::Variable(var) => Ok((var.kind.into(), var.index.into())),
            Resolution::ClassReference => Err(CompileError::UndeclaredVariable {
                name: Box::from(name),
                span,
            }),
        }
    }

    /// Declares `name` in the symbol table, with `span` blamed if `kind` is
    /// out of indices.
    fn declare(&mut self, name: &str, ty: &str, kind: Kind, span: Span) -> Result<(), CompileError> {
        match self.symbols.define(name, ty, kind) {
            Some(_) => Ok(()),
            None => Err(CompileError::TooManyVariables { kind, span }),
        }
    }

    // Program structure

    /// `'class' className '{' classVarDec* subroutineDec* '}'`
    pub fn compile_class(&mut self) -> Result<(), CompileError> {
        self.expect_keyword(Keyword::Class)?;
        self.class_name = self.expect_identifier()?;
        log::debug!("compiling class {}", self.class_name);
        self.expect_symbol('{')?;

        while matches!(self.tokens.keyword(), Some(Keyword::Static | Keyword::Field)) {
            self.compile_class_var_dec()?;
        }
        while matches!(
            self.tokens.keyword(),
            Some(Keyword::Constructor | Keyword::Function | Keyword::Method)
        ) {
            self.compile_subroutine()?;
        }

        self.expect_symbol('}')?;
        if self.tokens.current().is_some() {
            return Err(self.unexpected(Expected::EndOfInput));
        }
        Ok(())
    }

    /// `('static' | 'field') type varName (',' varName)* ';'`
    fn compile_class_var_dec(&mut self) -> Result<(), CompileError> {
        let kind = match self.tokens.keyword() {
            Some(Keyword::Static) => Kind::Static,
            Some(Keyword::Field) => Kind::Field,
            _ => return Err(self.unexpected(Expected::OneOf(CLASS_VAR_KEYWORDS))),
        };
        self.tokens.advance();
        self.compile_var_names(kind)
    }

    /// `type varName (',' varName)* ';'`, shared by class and local declarations
    fn compile_var_names(&mut self, kind: Kind) -> Result<(), CompileError> {
        let ty = self.expect_type()?;
        loop {
            let span = self.tokens.current_span();
            let name = self.expect_identifier()?;
            self.declare(&name, &ty, kind, span)?;
            if !self.at_symbol(',') {
                break;
            }
            self.tokens.advance();
        }
        self.expect_symbol(';')
    }

    /// `('constructor' | 'function' | 'method') ('void' | type) subroutineName
    /// '(' parameterList ')' subroutineBody`
    fn compile_subroutine(&mut self) -> Result<(), CompileError> {
        let kind = match self.tokens.keyword() {
            Some(Keyword::Constructor) => SubroutineKind::Constructor,
            Some(Keyword::Function) => SubroutineKind::Function,
            Some(Keyword::Method) => SubroutineKind::Method,
            _ => return Err(self.unexpected(Expected::OneOf(SUBROUTINE_KEYWORDS))),
        };
        self.tokens.advance();

        self.symbols.start_subroutine();
        if kind == SubroutineKind::Method {
            // the receiver is always argument 0
            let class_name = self.class_name.clone();
            self.declare("this", &class_name, Kind::Argument, self.tokens.current_span())?;
        }

        if self.at_keyword(Keyword::Void) {
            self.tokens.advance();
        } else {
            self.expect_type()?;
        }
        let subroutine_name = self.expect_identifier()?;
        let name = format!("{}.{subroutine_name}", self.class_name);

        self.expect_symbol('(')?;
        self.compile_parameter_list()?;
        self.expect_symbol(')')?;

        self.compile_subroutine_body(&name, kind)
    }

    /// `((type varName) (',' type varName)*)?`
    fn compile_parameter_list(&mut self) -> Result<(), CompileError> {
        if self.at_symbol(')') {
            return Ok(());
        }
        loop {
            let ty = self.expect_type()?;
            let span = self.tokens.current_span();
            let name = self.expect_identifier()?;
            self.declare(&name, &ty, Kind::Argument, span)?;
            if !self.at_symbol(',') {
                return Ok(());
            }
            self.tokens.advance();
        }
    }

    /// `'{' varDec* statements '}'`
    ///
    /// The function header needs the final local count, so it is written
    /// only after every `var` declaration has been read.
    fn compile_subroutine_body(&mut self, name: &str, kind: SubroutineKind) -> Result<(), CompileError> {
        self.expect_symbol('{')?;
        while self.at_keyword(Keyword::Var) {
            self.compile_var_dec()?;
        }

        let n_locals = self.symbols.var_count(Kind::Local);
        log::debug!("compiling {kind:?} {name} with {n_locals} locals");
        self.writer.write_function(name, n_locals);

        match kind {
            SubroutineKind::Constructor => {
                let size = self.symbols.var_count(Kind::Field);
                self.writer.write_push(Segment::Constant, size.into());
                self.writer.write_call("Memory.alloc", 1);
                self.writer.write_pop(Segment::Pointer, 0);
            }
            SubroutineKind::Method => {
                self.writer.write_push(Segment::Argument, 0);
                self.writer.write_pop(Segment::Pointer, 0);
            }
            SubroutineKind::Function => {}
        }

        self.compile_statements()?;
        self.expect_symbol('}')
    }

    /// `'var' type varName (',' varName)* ';'`
    fn compile_var_dec(&mut self) -> Result<(), CompileError> {
        self.expect_keyword(Keyword::Var)?;
        self.compile_var_names(Kind::Local)
    }

    // Statements

    fn compile_statements(&mut self) -> Result<(), CompileError> {
        loop {
            match self.tokens.keyword() {
                Some(Keyword::Let) => self.compile_let()?,
                Some(Keyword::If) => self.compile_if()?,
                Some(Keyword::While) => self.compile_while()?,
                Some(Keyword::Do) => self.compile_do()?,
                Some(Keyword::Return) => self.compile_return()?,
                _ => return Ok(()),
            }
        }
    }

    /// `'let' varName ('[' expression ']')? '=' expression ';'`
    fn compile_let(&mut self) -> Result<(), CompileError> {
        self.expect_keyword(Keyword::Let)?;
        let span = self.tokens.current_span();
        let name = self.expect_identifier()?;
        let (segment, index) = self.variable(&name, span)?;

        if self.at_symbol('[') {
            self.tokens.advance();
            self.compile_expression()?;
            self.expect_symbol(']')?;
            self.writer.write_push(segment, index);
            self.writer.write_arithmetic(Command::Add);

            self.expect_symbol('=')?;
            self.compile_expression()?;
            self.expect_symbol(';')?;

            // The value may itself have used `that`, so the target address
            // is only bound once the value is parked in temp 0
            self.writer.write_pop(Segment::Temp, 0);
            self.writer.write_pop(Segment::Pointer, 1);
            self.writer.write_push(Segment::Temp, 0);
            self.writer.write_pop(Segment::That, 0);
        } else {
            self.expect_symbol('=')?;
            self.compile_expression()?;
            self.expect_symbol(';')?;
            self.writer.write_pop(segment, index);
        }
        Ok(())
    }

    /// `'if' '(' expression ')' '{' statements '}' ('else' '{' statements '}')?`
    fn compile_if(&mut self) -> Result<(), CompileError> {
        let else_label = self.new_label();
        let end_label = self.new_label();

        self.expect_keyword(Keyword::If)?;
        self.expect_symbol('(')?;
        self.compile_expression()?;
        self.expect_symbol(')')?;
        self.writer.write_arithmetic(Command::Not);
        self.writer.write_if(&else_label);

        self.expect_symbol('{')?;
        self.compile_statements()?;
        self.expect_symbol('}')?;
        self.writer.write_goto(&end_label);

        self.writer.write_label(&else_label);
        if self.at_keyword(Keyword::Else) {
            self.tokens.advance();
            self.expect_symbol('{')?;
            self.compile_statements()?;
            self.expect_symbol('}')?;
        }
        self.writer.write_label(&end_label);
        Ok(())
    }

    /// `'while' '(' expression ')' '{' statements '}'`
    fn compile_while(&mut self) -> Result<(), CompileError> {
        let start_label = self.new_label();
        let end_label = self.new_label();

        self.expect_keyword(Keyword::While)?;
        self.writer.write_label(&start_label);
        self.expect_symbol('(')?;
        self.compile_expression()?;
        self.expect_symbol(')')?;
        self.writer.write_arithmetic(Command::Not);
        self.writer.write_if(&end_label);

        self.expect_symbol('{')?;
        self.compile_statements()?;
        self.expect_symbol('}')?;
        self.writer.write_goto(&start_label);
        self.writer.write_label(&end_label);
        Ok(())
    }

    /// `'do' subroutineCall ';'`
    ///
    /// Every subroutine returns exactly one value (void ones return 0), so
    /// there is always one value to throw away.
    fn compile_do(&mut self) -> Result<(), CompileError> {
        self.expect_keyword(Keyword::Do)?;
        self.compile_subroutine_call()?;
        self.expect_symbol(';')?;
        self.writer.write_pop(Segment::Temp, 0);
        Ok(())
    }

    /// `'return' expression? ';'`
    fn compile_return(&mut self) -> Result<(), CompileError> {
        self.expect_keyword(Keyword::Return)?;
        if self.at_symbol(';') {
            self.writer.write_push(Segment::Constant, 0);
        } else {
            self.compile_expression()?;
        }
        self.expect_symbol(';')?;
        self.writer.write_return();
        Ok(())
    }
}
