use core::fmt;

pub use logos::Span;
use logos::{Lexer, Logos};

mod tokenizer;
pub use tokenizer::{Spanned, Tokenizer};

fn process_string(lexer: &mut Lexer<Token>) -> Box<str> {
    // Strip the surrounding quotes
    let slice = lexer.slice();
    Box::from(&slice[1..slice.len() - 1])
}

fn process_integer(lexer: &mut Lexer<Token>) -> Result<u32, LexerError> {
    lexer
        .slice()
        .parse()
        .map_err(|_| LexerError::IntegerTooBig(Box::from(lexer.slice())))
}

#[derive(thiserror::Error, Debug, PartialEq, Clone, Default)]
pub enum LexerError {
    #[default]
    #[error("invalid token encountered")]
    Invalid,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("unterminated string constant")]
    UnterminatedString,
    #[error("integer constant too big: {0}")]
    IntegerTooBig(Box<str>),
}

/// The closed set of reserved words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Class,
    Constructor,
    Function,
    Method,
    Field,
    Static,
    Var,
    Int,
    Char,
    Boolean,
    Void,
    True,
    False,
    Null,
    This,
    Let,
    Do,
    If,
    Else,
    While,
    Return,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Constructor => "constructor",
            Self::Function => "function",
            Self::Method => "method",
            Self::Field => "field",
            Self::Static => "static",
            Self::Var => "var",
            Self::Int => "int",
            Self::Char => "char",
            Self::Boolean => "boolean",
            Self::Void => "void",
            Self::True => "true",
            Self::False => "false",
            Self::Null => "null",
            Self::This => "this",
            Self::Let => "let",
            Self::Do => "do",
            Self::If => "if",
            Self::Else => "else",
            Self::While => "while",
            Self::Return => "return",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tokens are lexed from a class source file. Whitespace and both comment
/// styles are skipped, so every produced token is significant.
#[derive(Debug, Clone, PartialEq, Logos)]
#[logos(error = LexerError)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    // A terminated block comment is always the longer match
    #[token("/*", |_| { Err::<(), _>(LexerError::UnterminatedComment) })]
    UnterminatedComment,

    #[token("class", |_| Keyword::Class)]
    #[token("constructor", |_| Keyword::Constructor)]
    #[token("function", |_| Keyword::Function)]
    #[token("method", |_| Keyword::Method)]
    #[token("field", |_| Keyword::Field)]
    #[token("static", |_| Keyword::Static)]
    #[token("var", |_| Keyword::Var)]
    #[token("int", |_| Keyword::Int)]
    #[token("char", |_| Keyword::Char)]
    #[token("boolean", |_| Keyword::Boolean)]
    #[token("void", |_| Keyword::Void)]
    #[token("true", |_| Keyword::True)]
    #[token("false", |_| Keyword::False)]
    #[token("null", |_| Keyword::Null)]
    #[token("this", |_| Keyword::This)]
    #[token("let", |_| Keyword::Let)]
    #[token("do", |_| Keyword::Do)]
    #[token("if", |_| Keyword::If)]
    #[token("else", |_| Keyword::Else)]
    #[token("while", |_| Keyword::While)]
    #[token("return", |_| Keyword::Return)]
    Keyword(Keyword),

    #[regex(r"[{}()\[\].,;+\-*/&|<>=~]", |l| l.slice().chars().next())]
    Symbol(char),

    #[regex("[0-9]+", process_integer)]
    IntegerConstant(u32),

    #[regex(r#""[^"\n]*""#, process_string)]
    #[regex(r#""[^"\n]*"#, |_| { Err::<Box<str>, _>(LexerError::UnterminatedString) })]
    StringConstant(Box<str>),

    #[regex("[a-zA-Z_][a-zA-Z0-9_]*", |l| Box::from(l.slice()))]
    Identifier(Box<str>),
}

impl Token {
    pub fn lexer(source: &str) -> Lexer<Self> {
        <Self as Logos>::lexer(source)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedComment => write!(f, "unterminated comment"),
            Self::Keyword(k) => write!(f, "keyword `{k}`"),
            Self::Symbol(c) => write!(f, "symbol `{c}`"),
            Self::IntegerConstant(n) => write!(f, "integer constant `{n}`"),
            Self::StringConstant(s) => write!(f, "string constant \"{s}\""),
            Self::Identifier(id) => write!(f, "identifier `{id}`"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Keyword, LexerError, Token};
    use assert2::{check, let_assert};

    fn lex_all(source: &str) -> Vec<Result<Token, LexerError>> {
        Token::lexer(source).collect()
    }

    #[test]
    fn keywords_take_precedence_over_identifiers() {
        check!(Token::lexer("class").next() == Some(Ok(Token::Keyword(Keyword::Class))));
        check!(Token::lexer("return").next() == Some(Ok(Token::Keyword(Keyword::Return))));
        // ...but only on an exact spelling
        check!(Token::lexer("classy").next() == Some(Ok(Token::Identifier("classy".into()))));
        check!(Token::lexer("do_it").next() == Some(Ok(Token::Identifier("do_it".into()))));
        check!(Token::lexer("_this").next() == Some(Ok(Token::Identifier("_this".into()))));
    }

    #[test]
    fn every_symbol_is_a_single_character() {
        let symbols = "{}()[].,;+-*/&|<>=~";
        let lexed = lex_all(symbols);
        check!(lexed.len() == symbols.len());
        for (token, expected) in lexed.into_iter().zip(symbols.chars()) {
            check!(token == Ok(Token::Symbol(expected)));
        }
    }

    #[test]
    fn comments_and_whitespace_are_stripped() {
        let source = "/** doc\n * comment */ let x // trailing\n = 1; /* inline */ return";
        check!(
            lex_all(source)
                == vec![
                    Ok(Token::Keyword(Keyword::Let)),
                    Ok(Token::Identifier("x".into())),
                    Ok(Token::Symbol('=')),
                    Ok(Token::IntegerConstant(1)),
                    Ok(Token::Symbol(';')),
                    Ok(Token::Keyword(Keyword::Return)),
                ]
        );
    }

    #[test]
    fn division_is_not_a_comment() {
        check!(
            lex_all("a/b")
                == vec![
                    Ok(Token::Identifier("a".into())),
                    Ok(Token::Symbol('/')),
                    Ok(Token::Identifier("b".into())),
                ]
        );
    }

    #[test]
    fn string_constants_drop_their_quotes() {
        let_assert!(Some(Ok(Token::StringConstant(s))) = Token::lexer(r#""HELLO, world""#).next());
        check!(s.as_ref() == "HELLO, world");
        let_assert!(Some(Ok(Token::StringConstant(empty))) = Token::lexer(r#""""#).next());
        check!(empty.as_ref() == "");
    }

    #[test]
    fn integer_constants() {
        check!(Token::lexer("32767").next() == Some(Ok(Token::IntegerConstant(32767))));
        // Word range is not the lexer's concern
        check!(Token::lexer("40000").next() == Some(Ok(Token::IntegerConstant(40000))));
        check!(
            Token::lexer("99999999999").next()
                == Some(Err(LexerError::IntegerTooBig("99999999999".into())))
        );
    }

    #[test]
    fn malformed_input() {
        check!(Token::lexer("#").next() == Some(Err(LexerError::Invalid)));
        check!(Token::lexer("/* never closed").next() == Some(Err(LexerError::UnterminatedComment)));
        check!(Token::lexer("\"no end\nx").next() == Some(Err(LexerError::UnterminatedString)));
    }
}
