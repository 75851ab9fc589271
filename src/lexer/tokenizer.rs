//! An eagerly lexed, index-addressable token stream with one token of lookahead.
//!
//! The grammar routines only ever look at the *current* token and the one
//! after it, so the whole unit is lexed up front and the stream is just a
//! cursor over the resulting buffer. Lexing errors surface here, before any
//! code is generated.

use super::{Keyword, LexerError, Span, Token};

/// A token together with where it was found in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    tokens: Box<[Spanned]>,
    /// `None` until the first [`Tokenizer::advance`]
    cursor: Option<usize>,
    source_len: usize,
}

impl Tokenizer {
    /// Lex the whole source, failing on the first unrecognized unit.
    pub fn new(source: &str) -> Result<Self, (LexerError, Span)> {
        let tokens = Token::lexer(source)
            .spanned()
            .map(|(token, span)| match token {
                Ok(token) => Ok(Spanned { token, span }),
                Err(err) => Err((err, span)),
            })
            .collect::<Result<Box<[_]>, _>>()?;

        log::trace!("lexed {} tokens", tokens.len());
        Ok(Self {
            tokens,
            cursor: None,
            source_len: source.len(),
        })
    }

    fn next_index(&self) -> usize {
        self.cursor.map_or(0, |idx| idx + 1)
    }

    pub fn has_next(&self) -> bool {
        self.next_index() < self.tokens.len()
    }

    /// Makes the next token current. Past the last token the stream is
    /// exhausted and [`Tokenizer::current`] returns `None`.
    pub fn advance(&mut self) {
        self.cursor = Some(self.next_index().min(self.tokens.len()));
    }

    pub fn current(&self) -> Option<&Spanned> {
        self.cursor.and_then(|idx| self.tokens.get(idx))
    }

    pub fn current_token(&self) -> Option<&Token> {
        self.current().map(|s| &s.token)
    }

    /// The token after the current one, without consuming anything.
    pub fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.next_index()).map(|s| &s.token)
    }

    /// Span of the current token, or an empty span at the end of the source
    /// once the stream is exhausted.
    pub fn current_span(&self) -> Span {
        self.current()
            .map(|s| s.span.clone())
            .unwrap_or(self.source_len..self.source_len)
    }

    /// Index of the current token, `None` before the first advance.
    pub fn position(&self) -> Option<usize> {
        self.cursor
    }

    /// Makes the token at `index` current.
    pub fn seek(&mut self, index: usize) {
        self.cursor = Some(index.min(self.tokens.len()));
    }

    /// Returns to the state right after construction.
    pub fn rewind(&mut self) {
        self.cursor = None;
    }

    pub fn keyword(&self) -> Option<Keyword> {
        match self.current_token()? {
            Token::Keyword(k) => Some(*k),
            _ => None,
        }
    }

    pub fn symbol(&self) -> Option<char> {
        match self.current_token()? {
            Token::Symbol(c) => Some(*c),
            _ => None,
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        match self.current_token()? {
            Token::Identifier(id) => Some(id.as_ref()),
            _ => None,
        }
    }

    pub fn int_val(&self) -> Option<u32> {
        match self.current_token()? {
            Token::IntegerConstant(n) => Some(*n),
            _ => None,
        }
    }

    pub fn string_val(&self) -> Option<&str> {
        match self.current_token()? {
            Token::StringConstant(s) => Some(s.as_ref()),
            _ => None,
        }
    }
}
