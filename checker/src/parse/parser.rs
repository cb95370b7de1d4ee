use crate::diagnostics::{Diagnostic, ErrorClass};
use crate::globals::GlobalState;
use crate::names::NameRef;
use crate::parse::lexer::{Lexed, Lexer};
use crate::parse::token::Token;
use crate::span::{FileId, Loc};

/// Concrete syntax nodes. Identifier spellings are interned during
/// parsing; constant names are entered as constant-kind names.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Class {
        loc: Loc,
        decl_loc: Loc,
        name: Box<Node>,
        superclass: Option<Box<Node>>,
        body: Vec<Node>,
    },
    SingletonClass {
        loc: Loc,
        decl_loc: Loc,
        body: Vec<Node>,
    },
    Module {
        loc: Loc,
        decl_loc: Loc,
        name: Box<Node>,
        body: Vec<Node>,
    },
    DefMethod {
        loc: Loc,
        decl_loc: Loc,
        name: NameRef,
        is_self: bool,
        args: Vec<Node>,
        body: Vec<Node>,
    },
    Arg {
        loc: Loc,
        name: NameRef,
    },
    OptArg {
        loc: Loc,
        name: NameRef,
        default: Box<Node>,
    },
    RestArg {
        loc: Loc,
        name: Option<NameRef>,
    },
    KwArg {
        loc: Loc,
        name: NameRef,
    },
    KwOptArg {
        loc: Loc,
        name: NameRef,
        default: Box<Node>,
    },
    BlockParam {
        loc: Loc,
        name: NameRef,
    },
    ShadowParam {
        loc: Loc,
        name: NameRef,
    },
    Send {
        loc: Loc,
        recv: Option<Box<Node>>,
        method: NameRef,
        args: Vec<Node>,
        block: Option<Box<BlockNode>>,
    },
    Const {
        loc: Loc,
        scope: Option<Box<Node>>,
        name: NameRef,
    },
    Cbase {
        loc: Loc,
    },
    SelfNode {
        loc: Loc,
    },
    Ident {
        loc: Loc,
        name: NameRef,
    },
    InstanceVar {
        loc: Loc,
        name: NameRef,
    },
    ClassVar {
        loc: Loc,
        name: NameRef,
    },
    GlobalVar {
        loc: Loc,
        name: NameRef,
    },
    Assign {
        loc: Loc,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Sym {
        loc: Loc,
        name: NameRef,
    },
    Str {
        loc: Loc,
        name: NameRef,
    },
    Int {
        loc: Loc,
        value: i64,
    },
    Nil {
        loc: Loc,
    },
    True {
        loc: Loc,
    },
    False {
        loc: Loc,
    },
    /// Trailing `key: value` pairs of a call, grouped into one argument.
    KwPairs {
        loc: Loc,
        pairs: Vec<(Node, Node)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub loc: Loc,
    pub args: Vec<Node>,
    pub body: Vec<Node>,
}

impl Node {
    pub fn loc(&self) -> Loc {
        match self {
            Node::Class { loc, .. }
            | Node::SingletonClass { loc, .. }
            | Node::Module { loc, .. }
            | Node::DefMethod { loc, .. }
            | Node::Arg { loc, .. }
            | Node::OptArg { loc, .. }
            | Node::RestArg { loc, .. }
            | Node::KwArg { loc, .. }
            | Node::KwOptArg { loc, .. }
            | Node::BlockParam { loc, .. }
            | Node::ShadowParam { loc, .. }
            | Node::Send { loc, .. }
            | Node::Const { loc, .. }
            | Node::Cbase { loc }
            | Node::SelfNode { loc }
            | Node::Ident { loc, .. }
            | Node::InstanceVar { loc, .. }
            | Node::ClassVar { loc, .. }
            | Node::GlobalVar { loc, .. }
            | Node::Assign { loc, .. }
            | Node::Sym { loc, .. }
            | Node::Str { loc, .. }
            | Node::Int { loc, .. }
            | Node::Nil { loc }
            | Node::True { loc }
            | Node::False { loc }
            | Node::KwPairs { loc, .. } => *loc,
        }
    }
}

struct ParseError {
    loc: Loc,
    message: String,
}

type ParseResult<T> = Result<T, ParseError>;

/// Parse one file into a statement list. On any parse error a
/// `ParserError` diagnostic is queued and `None` is returned; the caller
/// indexes the file to an empty tree.
pub fn run(gs: &mut GlobalState, file: FileId) -> Option<Vec<Node>> {
    let source = gs.files[file].source.clone();
    let tokens = match Lexer::new(&source, file).tokenize() {
        Ok(tokens) => tokens,
        Err(err) => {
            gs.error(Diagnostic::new(ErrorClass::ParserError, err.loc, err.message));
            return None;
        }
    };
    let mut parser = Parser { gs, tokens, pos: 0 };
    match parser.parse_program() {
        Ok(stmts) => Some(stmts),
        Err(err) => {
            parser
                .gs
                .error(Diagnostic::new(ErrorClass::ParserError, err.loc, err.message));
            None
        }
    }
}

struct Parser<'gs> {
    gs: &'gs mut GlobalState,
    tokens: Vec<Lexed>,
    pos: usize,
}

impl<'gs> Parser<'gs> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        self.tokens
            .get(self.pos + ahead)
            .map(|lexed| &lexed.token)
            .unwrap_or(&Token::Eof)
    }

    fn loc(&self) -> Loc {
        self.tokens[self.pos].loc
    }

    fn prev_loc(&self) -> Loc {
        self.tokens[self.pos.saturating_sub(1)].loc
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> ParseResult<Loc> {
        if self.peek() == token {
            let loc = self.loc();
            self.bump();
            Ok(loc)
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> ParseError {
        ParseError {
            loc: self.loc(),
            message: format!("unexpected {:?}, expected {}", self.peek(), what),
        }
    }

    fn at_separator(&self) -> bool {
        matches!(self.peek(), Token::Newline | Token::Semicolon | Token::Eof)
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Token::Newline | Token::Semicolon) {
            self.bump();
        }
    }

    // --- entry -------------------------------------------------------------

    fn parse_program(&mut self) -> ParseResult<Vec<Node>> {
        let stmts = self.parse_stmts(&[Token::Eof])?;
        self.expect(&Token::Eof, "end of file")?;
        Ok(stmts)
    }

    fn parse_stmts(&mut self, terminators: &[Token]) -> ParseResult<Vec<Node>> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if terminators.contains(self.peek()) {
                return Ok(stmts);
            }
            stmts.push(self.parse_stmt()?);
            if !self.at_separator() && !terminators.contains(self.peek()) {
                return Err(self.unexpected("end of statement"));
            }
        }
    }

    fn parse_stmt(&mut self) -> ParseResult<Node> {
        let expr = self.parse_expr()?;
        if self.peek() == &Token::Assign {
            let assign_loc = self.loc();
            match expr {
                Node::Ident { .. }
                | Node::Const { .. }
                | Node::InstanceVar { .. }
                | Node::ClassVar { .. }
                | Node::GlobalVar { .. } => {}
                _ => {
                    return Err(ParseError {
                        loc: assign_loc,
                        message: "cannot assign to this expression".to_string(),
                    })
                }
            }
            self.bump();
            let rhs = self.parse_expr()?;
            let loc = expr.loc().to(rhs.loc());
            return Ok(Node::Assign {
                loc,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            });
        }
        Ok(expr)
    }

    fn parse_expr(&mut self) -> ParseResult<Node> {
        match self.peek() {
            Token::KwClass => self.parse_class(),
            Token::KwModule => self.parse_module(),
            Token::KwDef => self.parse_def(),
            _ => self.parse_send_chain(true),
        }
    }

    // --- definitions -------------------------------------------------------

    fn parse_class(&mut self) -> ParseResult<Node> {
        let start = self.expect(&Token::KwClass, "`class`")?;
        if self.eat(&Token::Shl) {
            let self_loc = self.expect(&Token::KwSelf, "`self`")?;
            let decl_loc = start.to(self_loc);
            let body = self.parse_stmts(&[Token::KwEnd])?;
            let end = self.expect(&Token::KwEnd, "`end`")?;
            return Ok(Node::SingletonClass {
                loc: start.to(end),
                decl_loc,
                body,
            });
        }
        let name = self.parse_const_path()?;
        let superclass = if self.eat(&Token::Lt) {
            Some(Box::new(self.parse_send_chain(false)?))
        } else {
            None
        };
        let decl_loc = start.to(self.prev_loc());
        let body = self.parse_stmts(&[Token::KwEnd])?;
        let end = self.expect(&Token::KwEnd, "`end`")?;
        Ok(Node::Class {
            loc: start.to(end),
            decl_loc,
            name: Box::new(name),
            superclass,
            body,
        })
    }

    fn parse_module(&mut self) -> ParseResult<Node> {
        let start = self.expect(&Token::KwModule, "`module`")?;
        let name = self.parse_const_path()?;
        let decl_loc = start.to(self.prev_loc());
        let body = self.parse_stmts(&[Token::KwEnd])?;
        let end = self.expect(&Token::KwEnd, "`end`")?;
        Ok(Node::Module {
            loc: start.to(end),
            decl_loc,
            name: Box::new(name),
            body,
        })
    }

    fn parse_def(&mut self) -> ParseResult<Node> {
        let start = self.expect(&Token::KwDef, "`def`")?;
        let is_self = if self.peek() == &Token::KwSelf && self.peek_at(1) == &Token::Dot {
            self.bump();
            self.bump();
            true
        } else {
            false
        };
        let mut name = match self.bump() {
            Token::Identifier { value } => value,
            _ => return Err(self.unexpected("method name")),
        };
        // Setter definitions: `def name=(value)`.
        if self.peek() == &Token::Assign {
            self.bump();
            name = format!("{}=", name).into();
        }
        let name = self.gs.enter_name_utf8(&name);
        let mut args = Vec::new();
        if self.eat(&Token::LParen) {
            if !self.eat(&Token::RParen) {
                loop {
                    args.push(self.parse_def_arg()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RParen, "`)`")?;
            }
        } else if matches!(
            self.peek(),
            Token::Identifier { .. } | Token::Star | Token::Amp | Token::Label { .. }
        ) {
            loop {
                args.push(self.parse_def_arg()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        let decl_loc = start.to(self.prev_loc());
        let body = self.parse_stmts(&[Token::KwEnd])?;
        let end = self.expect(&Token::KwEnd, "`end`")?;
        Ok(Node::DefMethod {
            loc: start.to(end),
            decl_loc,
            name,
            is_self,
            args,
            body,
        })
    }

    fn parse_def_arg(&mut self) -> ParseResult<Node> {
        let loc = self.loc();
        match self.bump() {
            Token::Star => match self.peek().clone() {
                Token::Identifier { value } => {
                    self.bump();
                    let name = self.gs.enter_name_utf8(&value);
                    Ok(Node::RestArg {
                        loc: loc.to(self.prev_loc()),
                        name: Some(name),
                    })
                }
                _ => Ok(Node::RestArg { loc, name: None }),
            },
            Token::Amp => match self.bump() {
                Token::Identifier { value } => {
                    let name = self.gs.enter_name_utf8(&value);
                    Ok(Node::BlockParam {
                        loc: loc.to(self.prev_loc()),
                        name,
                    })
                }
                _ => Err(self.unexpected("block argument name")),
            },
            Token::Label { value } => {
                let name = self.gs.enter_name_utf8(&value);
                if matches!(
                    self.peek(),
                    Token::Comma | Token::RParen | Token::Newline | Token::Semicolon | Token::Eof
                ) {
                    Ok(Node::KwArg { loc, name })
                } else {
                    let default = self.parse_send_chain(false)?;
                    Ok(Node::KwOptArg {
                        loc: loc.to(default.loc()),
                        name,
                        default: Box::new(default),
                    })
                }
            }
            Token::Identifier { value } => {
                let name = self.gs.enter_name_utf8(&value);
                if self.eat(&Token::Assign) {
                    let default = self.parse_send_chain(false)?;
                    Ok(Node::OptArg {
                        loc: loc.to(default.loc()),
                        name,
                        default: Box::new(default),
                    })
                } else {
                    Ok(Node::Arg { loc, name })
                }
            }
            _ => Err(self.unexpected("method argument")),
        }
    }

    // --- calls and primaries ----------------------------------------------

    fn parse_send_chain(&mut self, allow_command: bool) -> ParseResult<Node> {
        let mut node = self.parse_primary(allow_command)?;
        loop {
            if self.eat(&Token::Dot) {
                let name_loc = self.loc();
                let method = match self.bump() {
                    Token::Identifier { value } => self.gs.enter_name_utf8(&value),
                    _ => return Err(self.unexpected("method name after `.`")),
                };
                let mut args = Vec::new();
                if self.eat(&Token::LParen) {
                    args = self.parse_call_args(&Token::RParen)?;
                    self.expect(&Token::RParen, "`)`")?;
                }
                let block = self.maybe_block()?;
                node = Node::Send {
                    loc: node.loc().to(name_loc.to(self.prev_loc())),
                    recv: Some(Box::new(node)),
                    method,
                    args,
                    block,
                };
                continue;
            }
            // `self::Foo` and other expression-scoped constants.
            if self.peek() == &Token::Scope && matches!(self.peek_at(1), Token::Constant { .. }) {
                self.bump();
                let loc = self.loc();
                let name = match self.bump() {
                    Token::Constant { value } => {
                        let utf8 = self.gs.enter_name_utf8(&value);
                        self.gs.enter_name_constant(utf8)
                    }
                    _ => unreachable!("peeked a constant"),
                };
                node = Node::Const {
                    loc: node.loc().to(loc),
                    scope: Some(Box::new(node)),
                    name,
                };
                continue;
            }
            return Ok(node);
        }
    }

    fn parse_primary(&mut self, allow_command: bool) -> ParseResult<Node> {
        let loc = self.loc();
        match self.peek().clone() {
            Token::KwSelf => {
                self.bump();
                Ok(Node::SelfNode { loc })
            }
            Token::KwNil => {
                self.bump();
                Ok(Node::Nil { loc })
            }
            Token::KwTrue => {
                self.bump();
                Ok(Node::True { loc })
            }
            Token::KwFalse => {
                self.bump();
                Ok(Node::False { loc })
            }
            Token::Integer { value } => {
                self.bump();
                Ok(Node::Int { loc, value })
            }
            Token::String { value } => {
                self.bump();
                let name = self.gs.enter_name_utf8(&value);
                Ok(Node::Str { loc, name })
            }
            Token::Symbol { value } => {
                self.bump();
                let name = self.gs.enter_name_utf8(&value);
                Ok(Node::Sym { loc, name })
            }
            Token::InstanceVar { value } => {
                self.bump();
                let name = self.gs.enter_name_utf8(&value);
                Ok(Node::InstanceVar { loc, name })
            }
            Token::ClassVar { value } => {
                self.bump();
                let name = self.gs.enter_name_utf8(&value);
                Ok(Node::ClassVar { loc, name })
            }
            Token::GlobalVar { value } => {
                self.bump();
                let name = self.gs.enter_name_utf8(&value);
                Ok(Node::GlobalVar { loc, name })
            }
            Token::Scope | Token::Constant { .. } => self.parse_const_path(),
            Token::KwDef => self.parse_def(),
            Token::Identifier { value } => {
                self.bump();
                let name = self.gs.enter_name_utf8(&value);
                if self.eat(&Token::LParen) {
                    let args = self.parse_call_args(&Token::RParen)?;
                    self.expect(&Token::RParen, "`)`")?;
                    let block = self.maybe_block()?;
                    return Ok(Node::Send {
                        loc: loc.to(self.prev_loc()),
                        recv: None,
                        method: name,
                        args,
                        block,
                    });
                }
                if allow_command && self.peek().starts_command_arg() {
                    let args = self.parse_command_args()?;
                    let block = self.maybe_block()?;
                    return Ok(Node::Send {
                        loc: loc.to(self.prev_loc()),
                        recv: None,
                        method: name,
                        args,
                        block,
                    });
                }
                if matches!(self.peek(), Token::KwDo | Token::LBrace) {
                    let block = self.maybe_block()?;
                    return Ok(Node::Send {
                        loc: loc.to(self.prev_loc()),
                        recv: None,
                        method: name,
                        args: Vec::new(),
                        block,
                    });
                }
                Ok(Node::Ident { loc, name })
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_const_path(&mut self) -> ParseResult<Node> {
        let start = self.loc();
        let mut scope: Option<Box<Node>> = if self.eat(&Token::Scope) {
            Some(Box::new(Node::Cbase { loc: start }))
        } else {
            None
        };
        loop {
            let loc = self.loc();
            let name = match self.bump() {
                Token::Constant { value } => {
                    let utf8 = self.gs.enter_name_utf8(&value);
                    self.gs.enter_name_constant(utf8)
                }
                _ => return Err(self.unexpected("constant name")),
            };
            let node = Node::Const {
                loc: start.to(loc),
                scope,
                name,
            };
            if self.peek() == &Token::Scope && matches!(self.peek_at(1), Token::Constant { .. }) {
                self.bump();
                scope = Some(Box::new(node));
            } else {
                return Ok(node);
            }
        }
    }

    fn parse_call_args(&mut self, terminator: &Token) -> ParseResult<Vec<Node>> {
        let mut args = Vec::new();
        if self.peek() == terminator {
            return Ok(args);
        }
        loop {
            if matches!(self.peek(), Token::Label { .. }) {
                args.push(self.parse_kw_pairs()?);
                return Ok(args);
            }
            args.push(self.parse_call_arg()?);
            if !self.eat(&Token::Comma) {
                return Ok(args);
            }
        }
    }

    fn parse_command_args(&mut self) -> ParseResult<Vec<Node>> {
        let mut args = Vec::new();
        loop {
            if matches!(self.peek(), Token::Label { .. }) {
                args.push(self.parse_kw_pairs()?);
                return Ok(args);
            }
            args.push(self.parse_call_arg()?);
            if !self.eat(&Token::Comma) {
                return Ok(args);
            }
        }
    }

    fn parse_call_arg(&mut self) -> ParseResult<Node> {
        match self.peek() {
            Token::KwDef => self.parse_def(),
            _ => self.parse_send_chain(false),
        }
    }

    /// `key: value {, key: value}` — the trailing keyword hash of a call.
    fn parse_kw_pairs(&mut self) -> ParseResult<Node> {
        let start = self.loc();
        let mut pairs = Vec::new();
        loop {
            let loc = self.loc();
            let key = match self.bump() {
                Token::Label { value } => {
                    let name = self.gs.enter_name_utf8(&value);
                    Node::Sym { loc, name }
                }
                _ => return Err(self.unexpected("keyword argument")),
            };
            let value = self.parse_send_chain(false)?;
            pairs.push((key, value));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Node::KwPairs {
            loc: start.to(self.prev_loc()),
            pairs,
        })
    }

    fn maybe_block(&mut self) -> ParseResult<Option<Box<BlockNode>>> {
        let (terminator, start) = match self.peek() {
            Token::KwDo => (Token::KwEnd, self.loc()),
            Token::LBrace => (Token::RBrace, self.loc()),
            _ => return Ok(None),
        };
        self.bump();
        let mut args = Vec::new();
        if self.eat(&Token::Bar) {
            let mut shadow = false;
            loop {
                if self.eat(&Token::Bar) {
                    break;
                }
                if self.eat(&Token::Semicolon) {
                    shadow = true;
                    continue;
                }
                let loc = self.loc();
                match self.bump() {
                    Token::Identifier { value } => {
                        let name = self.gs.enter_name_utf8(&value);
                        if shadow {
                            args.push(Node::ShadowParam { loc, name });
                        } else {
                            args.push(Node::BlockParam { loc, name });
                        }
                    }
                    Token::Comma => continue,
                    _ => return Err(self.unexpected("block parameter")),
                }
            }
        }
        let body = self.parse_stmts(&[terminator.clone()])?;
        self.expect(&terminator, "end of block")?;
        Ok(Some(Box::new(BlockNode {
            loc: start.to(self.prev_loc()),
            args,
            body,
        })))
    }
}
