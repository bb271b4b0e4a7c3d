use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::mem;

use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    self as html, BufferQueue, TagKind, TokenSink, TokenSinkResult, TokenizerOpts,
};
use log::{debug, trace};
use tendril::fmt::UTF8;
use tendril::stream::{TendrilSink, Utf8LossyDecoder};
use tendril::{ByteTendril, StrTendril};

/// Bytes handed to the tokenizer at a time by [`tokens`].
const CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    /// Attributes in document order. A repeated attribute name keeps only
    /// its first occurrence, as HTML tokenizers do.
    pub attributes: Vec<Attribute>,
    pub self_closing: bool,
}

impl From<html::Tag> for Tag {
    fn from(tag: html::Tag) -> Self {
        Self {
            name: tag.name.to_string(),
            attributes: tag
                .attrs
                .into_iter()
                .map(|attribute| {
                    Attribute::new(attribute.name.local.to_string(), attribute.value.to_string())
                })
                .collect(),
            self_closing: tag.self_closing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    StartTag(Tag),
    EndTag(String),
    Text(String),
    Comment(String),
    Doctype(String),
}

/// Elements whose contents are never tokenized as markup.
fn raw_kind(name: &str) -> Option<RawKind> {
    match name {
        "script" => Some(RawKind::ScriptData),
        "style" => Some(RawKind::Rawtext),
        "title" | "textarea" => Some(RawKind::Rcdata),
        _ => None,
    }
}

/// Turns html5ever tokens into ours, merging adjacent character runs.
#[derive(Default)]
struct Collector {
    text: RefCell<String>,
    tokens: RefCell<VecDeque<Token>>,
}

impl Collector {
    fn flush_text(&self) {
        let text = mem::take(&mut *self.text.borrow_mut());
        if !text.is_empty() {
            self.tokens.borrow_mut().push_back(Token::Text(text));
        }
    }

    fn push(&self, token: Token) {
        self.flush_text();
        self.tokens.borrow_mut().push_back(token);
    }
}

impl TokenSink for Collector {
    type Handle = ();

    fn process_token(&self, token: html::Token, line_number: u64) -> TokenSinkResult<()> {
        match token {
            html::Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => {
                    let raw = raw_kind(&tag.name);
                    self.push(Token::StartTag(tag.into()));
                    if let Some(kind) = raw {
                        return TokenSinkResult::RawData(kind);
                    }
                }
                TagKind::EndTag => self.push(Token::EndTag(tag.name.to_string())),
            },
            html::Token::CharacterTokens(text) => self.text.borrow_mut().push_str(&text),
            html::Token::NullCharacterToken => self.text.borrow_mut().push('\0'),
            html::Token::CommentToken(text) => self.push(Token::Comment(text.to_string())),
            html::Token::DoctypeToken(doctype) => {
                let name = doctype.name.map(|name| name.to_string());
                self.push(Token::Doctype(name.unwrap_or_default()));
            }
            html::Token::EOFToken => self.flush_text(),
            html::Token::ParseError(err) => trace!("line {}: {}", line_number, err),
        }
        TokenSinkResult::Continue
    }
}

/// Text input of the html5ever tokenizer, fed by the UTF-8 decoder.
struct Document {
    tokenizer: html::Tokenizer<Collector>,
    input: BufferQueue,
}

impl TendrilSink<UTF8> for Document {
    fn process(&mut self, text: StrTendril) {
        self.input.push_back(text);
        let _ = self.tokenizer.feed(&self.input);
    }

    fn error(&mut self, desc: Cow<'static, str>) {
        debug!("replacing invalid input: {}", desc);
    }

    type Output = VecDeque<Token>;

    fn finish(self) -> VecDeque<Token> {
        self.tokenizer.end();
        self.tokenizer.sink.tokens.take()
    }
}

/// A permissive, flat HTML tokenizer fed one chunk of bytes at a time.
///
/// Tokenizing follows HTML5 without tree construction and never fails:
/// invalid UTF-8 is replaced, markup errors are only traced, and an
/// incomplete tag at the end of input is dropped. Chunks may split UTF-8
/// sequences and markup anywhere.
pub struct Tokenizer {
    decoder: Utf8LossyDecoder<Document>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        let document = Document {
            tokenizer: html::Tokenizer::new(Collector::default(), TokenizerOpts::default()),
            input: BufferQueue::default(),
        };
        Self {
            decoder: Utf8LossyDecoder::new(document),
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.decoder.process(ByteTendril::from_slice(chunk));
    }

    pub fn next_token(&mut self) -> Option<Token> {
        self.decoder
            .inner_sink
            .tokenizer
            .sink
            .tokens
            .borrow_mut()
            .pop_front()
    }

    /// Ends the input and returns every token not yet taken.
    pub fn finish(self) -> impl Iterator<Item = Token> {
        self.decoder.finish().into_iter()
    }
}

/// Lazily tokenizes `input`, starting over on every call.
pub fn tokens(input: &[u8]) -> Tokens<'_> {
    Tokens {
        input,
        tokenizer: Some(Tokenizer::new()),
        finished: VecDeque::new(),
    }
}

pub struct Tokens<'a> {
    input: &'a [u8],
    tokenizer: Option<Tokenizer>,
    finished: VecDeque<Token>,
}

impl Iterator for Tokens<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.finished.pop_front() {
                return Some(token);
            }
            let tokenizer = self.tokenizer.as_mut()?;
            if let Some(token) = tokenizer.next_token() {
                return Some(token);
            }
            if self.input.is_empty() {
                if let Some(tokenizer) = self.tokenizer.take() {
                    self.finished.extend(tokenizer.finish());
                }
            } else {
                let (chunk, rest) = self.input.split_at(self.input.len().min(CHUNK_SIZE));
                tokenizer.feed(chunk);
                self.input = rest;
            }
        }
    }
}
