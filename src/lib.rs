pub mod compiler;
pub mod lexer;

pub use compiler::{compile, CompilationEngine, CompileError, CompiledUnit, Expected};
pub use lexer::{Keyword, LexerError, Span, Token, Tokenizer};
