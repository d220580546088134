use crate::frontend::scanner::Scanner;
use crate::frontend::token::Location;
use crate::frontend::token::Token;
use crate::frontend::token::TokenKind;
use crate::ir::ArraySize;
use crate::ir::Construct;
use crate::ir::DeferredCall;
use crate::ir::Directive;
use crate::ir::Expr;
use crate::ir::Field;
use crate::ir::FunctionDecl;
use crate::ir::FunctionDef;
use crate::ir::GlobalVar;
use crate::ir::Item;
use crate::ir::Primitive;
use crate::ir::Scope;
use crate::ir::Stmt;
use crate::ir::StructDef;
use crate::ir::Symbol;
use crate::ir::SymbolId;
use crate::ir::SymbolKind;
use crate::ir::TaskFunction;
use crate::ir::TranslationUnit;
use crate::ir::Type;
use crate::ir::VarDecl;
use crate::shared::SharedExt;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

const TYPE_KEYWORDS: &[&str] = &[
    "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned", "_Bool",
];

/// Words that may appear in a declaration but do not change the type.
const QUALIFIERS: &[&str] = &[
    "const", "volatile", "restrict", "inline", "register", "auto", "extern",
];

/// Typedef names from the standard headers that are known without parsing
/// the headers.
const HEADER_TYPES: &[&str] = &[
    "size_t",
    "ssize_t",
    "ptrdiff_t",
    "intptr_t",
    "uintptr_t",
    "int8_t",
    "int16_t",
    "int32_t",
    "int64_t",
    "uint8_t",
    "uint16_t",
    "uint32_t",
    "uint64_t",
];

/// Parser for the C subset.
///
/// Declarations are resolved while parsing, so every identifier in the
/// resulting IR is either a [Symbol] or an undeclared [Expr::Name].
pub struct Parser {
    src: String,
    tokens: Vec<Token>,
    current: usize,
    unit: TranslationUnit,
    scopes: Vec<Scope>,
    typedefs: HashMap<String, Type>,
    structs: HashMap<String, Arc<StructDef>>,
    tasks: HashMap<SymbolId, Arc<TaskFunction>>,
}

struct Specifiers {
    typ: Type,
    is_static: bool,
    is_typedef: bool,
}

enum Suffix {
    Array(ArraySize),
    Function(Vec<Symbol>),
}

/// A declarator such as `*a[10]` or `(*f)(int)`.
struct Declarator {
    name: Option<Token>,
    pointers: usize,
    suffixes: Vec<Suffix>,
    inner: Option<Box<Declarator>>,
}

impl Declarator {
    fn apply(&self, base: Type) -> Type {
        let mut typ = base;
        for _ in 0..self.pointers {
            typ = typ.pointer();
        }
        for suffix in self.suffixes.iter().rev() {
            typ = match suffix {
                Suffix::Array(size) => typ.array(size.clone()),
                Suffix::Function(params) => Type::Function {
                    ret: Box::new(typ),
                    params: params.iter().map(|param| param.typ().clone()).collect(),
                },
            };
        }
        match &self.inner {
            Some(inner) => inner.apply(typ),
            None => typ,
        }
    }
    fn name(&self) -> Option<&Token> {
        match &self.inner {
            Some(inner) => inner.name(),
            None => self.name.as_ref(),
        }
    }
    /// The parameters when this declares a function (not a function pointer).
    fn params(&self) -> Option<&Vec<Symbol>> {
        if self.inner.is_some() {
            return None;
        }
        match self.suffixes.first() {
            Some(Suffix::Function(params)) => Some(params),
            _ => None,
        }
    }
}

/// A `#pragma omp task` line in front of a function declaration.
///
/// The clauses name the parameters, so they are parsed only after the
/// declarator has been seen.
struct TaskPragma {
    loc: Location,
    clauses: usize,
}

fn primitive(words: &[String]) -> Type {
    let count = |word: &str| words.iter().filter(|w| w.as_str() == word).count();
    let unsigned = count("unsigned") > 0;
    let longs = count("long");
    let primitive = if count("void") > 0 {
        return Type::Void;
    } else if count("_Bool") > 0 {
        Primitive::Bool
    } else if count("char") > 0 {
        if unsigned {
            Primitive::UnsignedChar
        } else if count("signed") > 0 {
            Primitive::SignedChar
        } else {
            Primitive::Char
        }
    } else if count("short") > 0 {
        if unsigned {
            Primitive::UnsignedShort
        } else {
            Primitive::Short
        }
    } else if count("float") > 0 {
        Primitive::Float
    } else if count("double") > 0 {
        if longs > 0 {
            Primitive::LongDouble
        } else {
            Primitive::Double
        }
    } else if longs >= 2 {
        if unsigned {
            Primitive::UnsignedLongLong
        } else {
            Primitive::LongLong
        }
    } else if longs == 1 {
        if unsigned {
            Primitive::UnsignedLong
        } else {
            Primitive::Long
        }
    } else if unsigned {
        Primitive::UnsignedInt
    } else {
        Primitive::Int
    };
    Type::Primitive(primitive)
}

impl Parser {
    pub fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }
    pub fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }
    pub fn peek(&self) -> &Token {
        self.peek_n(0)
    }
    /// Look ahead; past the end this keeps returning the end-of-file token.
    pub fn peek_n(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.current + n).min(last)]
    }
    pub(super) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }
    pub fn check(&self, kind: TokenKind) -> bool {
        if self.is_at_end() {
            return false;
        }
        self.peek().kind == kind
    }
    pub(super) fn check_word(&self, word: &str) -> bool {
        self.peek().is_identifier(word)
    }
    pub(super) fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }
    pub fn error(&self, token: &Token, msg: &str) -> String {
        let msg = Scanner::error(&self.src, &token.location, msg);
        format!("\n\n{msg}\n")
    }
    pub(super) fn fail<T>(&self, token: &Token, msg: &str) -> Result<T> {
        Err(anyhow::anyhow!(self.error(token, msg)))
    }
    pub fn report_token_error(&self, token: &Token, expected: TokenKind) -> Result<Token> {
        let msg = format!(
            "Expected {:?}, but got \"{}\" of kind {:?}",
            expected, token.lexeme, token.kind
        );
        self.fail(token, &msg)
    }
    pub fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.check(kind) {
            self.advance();
            Ok(self.previous().clone())
        } else {
            self.report_token_error(self.peek(), kind)
        }
    }
    pub(super) fn expect_word(&mut self, word: &str) -> Result<Token> {
        if self.check_word(word) {
            self.advance();
            Ok(self.previous().clone())
        } else {
            self.fail(self.peek(), &format!("Expected `{word}`"))
        }
    }
    pub(super) fn lookup(&self, name: &str) -> Option<Symbol> {
        for scope in self.scopes.iter().rev() {
            if let Some(symbol) = scope.lookup(name) {
                return Some(symbol.clone());
            }
        }
        self.unit.lookup(name)
    }
    fn declare(&mut self, name: &str, typ: Type, kind: SymbolKind) -> Symbol {
        let symbol = self.unit.symbols.new_symbol(name, typ, kind);
        if !name.is_empty() {
            match self.scopes.last_mut() {
                Some(scope) => {
                    scope.insert(symbol.clone());
                }
                None => {
                    self.unit.global.wr().insert(symbol.clone());
                }
            }
        }
        symbol
    }
    /// Reuse the symbol of an earlier prototype so calls and definitions
    /// agree on identity.
    fn function_symbol(&mut self, name: &str, typ: Type) -> Symbol {
        match self.unit.lookup(name) {
            Some(symbol) if symbol.kind() == SymbolKind::Function => symbol,
            _ => self.declare(name, typ, SymbolKind::Function),
        }
    }
    pub(super) fn is_type_start(&self, token: &Token) -> bool {
        if token.kind != TokenKind::Identifier {
            return false;
        }
        let word = token.lexeme.as_str();
        TYPE_KEYWORDS.contains(&word)
            || QUALIFIERS.contains(&word)
            || HEADER_TYPES.contains(&word)
            || matches!(word, "struct" | "static" | "typedef")
            || self.typedefs.contains_key(word)
    }
    fn specifiers(&mut self) -> Result<Specifiers> {
        let start = self.peek().clone();
        let mut is_static = false;
        let mut is_typedef = false;
        let mut words: Vec<String> = vec![];
        let mut typ: Option<Type> = None;
        loop {
            let token = self.peek().clone();
            if token.kind != TokenKind::Identifier {
                break;
            }
            let word = token.lexeme.as_str();
            let base_allowed = typ.is_none() && words.is_empty();
            if word == "static" {
                is_static = true;
            } else if word == "typedef" {
                is_typedef = true;
            } else if QUALIFIERS.contains(&word) {
            } else if TYPE_KEYWORDS.contains(&word) && typ.is_none() {
                words.push(word.to_string());
            } else if base_allowed && word == "struct" {
                self.advance();
                typ = Some(self.struct_specifier()?);
                continue;
            } else if base_allowed && HEADER_TYPES.contains(&word) {
                typ = Some(Type::named(word));
            } else if base_allowed && self.typedefs.contains_key(word) {
                typ = self.typedefs.get(word).cloned();
            } else {
                break;
            }
            self.advance();
        }
        let typ = match typ {
            Some(typ) => typ,
            None if words.is_empty() => return self.fail(&start, "Expected a type"),
            None => primitive(&words),
        };
        Ok(Specifiers {
            typ,
            is_static,
            is_typedef,
        })
    }
    /// Parse what follows `struct`.
    fn struct_specifier(&mut self) -> Result<Type> {
        let tag = self.expect(TokenKind::Identifier)?;
        if !self.matches(TokenKind::LBrace) {
            return match self.structs.get(&tag.lexeme) {
                Some(def) => Ok(Type::Struct(def.clone())),
                None => self.fail(&tag, "Unknown struct"),
            };
        }
        if !self.scopes.is_empty() {
            return self.fail(&tag, "Struct definitions are only supported at file scope");
        }
        let mut fields = vec![];
        while !self.check(TokenKind::RBrace) {
            let specifiers = self.specifiers()?;
            loop {
                let declarator = self.declarator()?;
                let name = match declarator.name() {
                    Some(name) => name.lexeme.clone(),
                    None => return self.fail(self.peek(), "Expected a field name"),
                };
                let typ = declarator.apply(specifiers.typ.clone());
                fields.push(Field { name, typ });
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Semicolon)?;
        }
        self.expect(TokenKind::RBrace)?;
        let def = Arc::new(StructDef::new(&tag.lexeme, fields));
        self.structs.insert(tag.lexeme.clone(), def.clone());
        self.unit.items.push(Item::Struct(def.clone()));
        Ok(Type::Struct(def))
    }
    fn declarator(&mut self) -> Result<Declarator> {
        let mut pointers = 0;
        loop {
            if self.matches(TokenKind::Star) {
                pointers += 1;
            } else if self.check(TokenKind::Identifier)
                && QUALIFIERS.contains(&self.peek().lexeme.as_str())
            {
                self.advance();
            } else {
                break;
            }
        }
        let mut name = None;
        let mut inner = None;
        if self.check(TokenKind::LParen) && self.peek_n(1).kind == TokenKind::Star {
            self.advance();
            inner = Some(Box::new(self.declarator()?));
            self.expect(TokenKind::RParen)?;
        } else if self.check(TokenKind::Identifier) && !self.is_type_start(self.peek()) {
            name = Some(self.advance().clone());
        }
        let mut suffixes = vec![];
        loop {
            if self.matches(TokenKind::LBracket) {
                let size = if self.check(TokenKind::RBracket) {
                    ArraySize::Unknown
                } else {
                    let expr = self.expression()?;
                    match expr.constant() {
                        Some(n) if n >= 0 => ArraySize::Fixed(n as u64),
                        _ => ArraySize::Variable(expr),
                    }
                };
                self.expect(TokenKind::RBracket)?;
                suffixes.push(Suffix::Array(size));
            } else if self.matches(TokenKind::LParen) {
                suffixes.push(Suffix::Function(self.parameters()?));
            } else {
                break;
            }
        }
        Ok(Declarator {
            name,
            pointers,
            suffixes,
            inner,
        })
    }
    /// Parse a parameter list after its `(`.
    ///
    /// Array parameters decay to pointers. Earlier parameters are in scope
    /// for the extents of later ones, as in `int n, float a[n]`.
    fn parameters(&mut self) -> Result<Vec<Symbol>> {
        let mut params = vec![];
        if self.check_word("void") && self.peek_n(1).kind == TokenKind::RParen {
            self.advance();
        }
        self.scopes.push(Scope::new());
        while !self.check(TokenKind::RParen) {
            let specifiers = self.specifiers()?;
            let declarator = self.declarator()?;
            let typ = declarator.apply(specifiers.typ).decay();
            let name = declarator
                .name()
                .map(|token| token.lexeme.clone())
                .unwrap_or_default();
            params.push(self.declare(&name, typ, SymbolKind::Parameter));
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.scopes.pop();
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }
    /// Parse a type in a cast, `sizeof` or `__alignof__`.
    pub(super) fn type_name(&mut self) -> Result<Type> {
        let specifiers = self.specifiers()?;
        let declarator = self.declarator()?;
        if let Some(name) = declarator.name() {
            return self.fail(name, "Expected a type without a name");
        }
        Ok(declarator.apply(specifiers.typ))
    }
    fn task_pragma(&mut self) -> Result<TaskPragma> {
        let pragma = self.expect(TokenKind::PragmaOmp)?;
        self.expect_word("task")?;
        let clauses = self.current;
        while !self.check(TokenKind::PragmaEnd) && !self.is_at_end() {
            self.advance();
        }
        self.expect(TokenKind::PragmaEnd)?;
        Ok(TaskPragma {
            loc: pragma.location,
            clauses,
        })
    }
    /// Rewind to the clauses of `pragma` and parse them with the parameters
    /// in scope.
    fn task_function(
        &mut self,
        pragma: &TaskPragma,
        function: &Symbol,
        params: &[Symbol],
    ) -> Result<Arc<TaskFunction>> {
        let resume = self.current;
        self.current = pragma.clauses;
        let mut scope = Scope::new();
        for param in params {
            scope.insert(param.clone());
        }
        self.scopes.push(scope);
        let clauses = self.clauses()?;
        self.scopes.pop();
        self.current = resume;
        let task = Arc::new(TaskFunction {
            function: function.clone(),
            params: params.to_vec(),
            clauses,
            loc: pragma.loc,
        });
        self.tasks.insert(function.id(), task.clone());
        Ok(task)
    }
    fn external_declaration(&mut self) -> Result<()> {
        if self.check(TokenKind::Directive) {
            let line = self.advance().lexeme.clone();
            self.unit.items.push(Item::Directive(line));
            return Ok(());
        }
        if self.matches(TokenKind::Semicolon) {
            return Ok(());
        }
        let pragma = if self.check(TokenKind::PragmaOmp) {
            Some(self.task_pragma()?)
        } else {
            None
        };
        let specifiers = self.specifiers()?;
        if self.check(TokenKind::Semicolon) && pragma.is_none() {
            self.advance();
            return Ok(());
        }
        loop {
            let declarator = self.declarator()?;
            let name = match declarator.name() {
                Some(name) => name.clone(),
                None => return self.fail(self.peek(), "Expected a name"),
            };
            let typ = declarator.apply(specifiers.typ.clone());
            if specifiers.is_typedef {
                self.typedefs.insert(name.lexeme.clone(), typ.clone());
                self.unit.items.push(Item::Typedef {
                    name: name.lexeme,
                    typ,
                });
            } else if let Some(params) = declarator.params() {
                let params = params.clone();
                let ret = match &typ {
                    Type::Function { ret, .. } => ret.as_ref().clone(),
                    _ => return self.fail(&name, "Expected a function"),
                };
                let symbol = self.function_symbol(&name.lexeme, typ);
                let task = match &pragma {
                    Some(pragma) => Some(self.task_function(pragma, &symbol, &params)?),
                    None => None,
                };
                let decl = FunctionDecl {
                    symbol,
                    ret,
                    params,
                    is_static: specifiers.is_static,
                    task,
                };
                if self.check(TokenKind::LBrace) {
                    let body = self.function_body(&decl.params)?;
                    self.unit.items.push(Item::Function(FunctionDef { decl, body }));
                    return Ok(());
                }
                self.unit.items.push(Item::Prototype(decl));
            } else {
                if pragma.is_some() {
                    return self.fail(&name, "Expected a function declaration after the task pragma");
                }
                let symbol = self.declare(&name.lexeme, typ, SymbolKind::Global);
                let init = if self.matches(TokenKind::Equal) {
                    Some(self.initializer()?)
                } else {
                    None
                };
                self.unit.items.push(Item::Global(GlobalVar {
                    symbol,
                    is_static: specifiers.is_static,
                    init,
                }));
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }
    fn function_body(&mut self, params: &[Symbol]) -> Result<Vec<Stmt>> {
        let mut scope = Scope::new();
        for param in params {
            if !param.name().is_empty() {
                scope.insert(param.clone());
            }
        }
        self.scopes.push(scope);
        self.expect(TokenKind::LBrace)?;
        let body = self.block_items()?;
        self.expect(TokenKind::RBrace)?;
        self.scopes.pop();
        Ok(body)
    }
    fn block_items(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = vec![];
        while !self.check(TokenKind::RBrace) {
            if self.is_at_end() {
                return self.fail(self.peek(), "Expected `}` before the end of the file");
            }
            if self.is_type_start(self.peek()) {
                stmts.extend(self.local_declaration()?);
            } else {
                stmts.push(self.statement()?);
            }
        }
        Ok(stmts)
    }
    fn local_declaration(&mut self) -> Result<Vec<Stmt>> {
        let start = self.peek().clone();
        let specifiers = self.specifiers()?;
        if specifiers.is_static || specifiers.is_typedef {
            return self.fail(&start, "Static locals and local typedefs are not supported");
        }
        let mut stmts = vec![];
        if self.matches(TokenKind::Semicolon) {
            return Ok(stmts);
        }
        loop {
            let declarator = self.declarator()?;
            let name = match declarator.name() {
                Some(name) => name.clone(),
                None => return self.fail(self.peek(), "Expected a name"),
            };
            let typ = declarator.apply(specifiers.typ.clone());
            let symbol = self.declare(&name.lexeme, typ, SymbolKind::Local);
            let init = if self.matches(TokenKind::Equal) {
                Some(self.initializer()?)
            } else {
                None
            };
            stmts.push(Stmt::Decl(VarDecl::new(&symbol, init)));
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(stmts)
    }
    pub(super) fn statement(&mut self) -> Result<Stmt> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::LBrace => {
                self.advance();
                self.scopes.push(Scope::new());
                let stmts = self.block_items()?;
                self.expect(TokenKind::RBrace)?;
                self.scopes.pop();
                Ok(Stmt::Compound(stmts))
            }
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Empty)
            }
            TokenKind::PragmaOmp => self.construct(),
            TokenKind::Identifier => match token.lexeme.as_str() {
                "if" => {
                    self.advance();
                    self.expect(TokenKind::LParen)?;
                    let cond = self.expression()?;
                    self.expect(TokenKind::RParen)?;
                    let then = Box::new(self.statement()?);
                    let otherwise = if self.check_word("else") {
                        self.advance();
                        Some(Box::new(self.statement()?))
                    } else {
                        None
                    };
                    Ok(Stmt::If {
                        cond,
                        then,
                        otherwise,
                    })
                }
                "for" => self.for_statement(),
                "while" => {
                    self.advance();
                    self.expect(TokenKind::LParen)?;
                    let cond = self.expression()?;
                    self.expect(TokenKind::RParen)?;
                    let body = Box::new(self.statement()?);
                    Ok(Stmt::While { cond, body })
                }
                "return" => {
                    self.advance();
                    let value = if self.check(TokenKind::Semicolon) {
                        None
                    } else {
                        Some(self.expression()?)
                    };
                    self.expect(TokenKind::Semicolon)?;
                    Ok(Stmt::Return(value))
                }
                "break" => {
                    self.advance();
                    self.expect(TokenKind::Semicolon)?;
                    Ok(Stmt::Break)
                }
                "continue" => {
                    self.advance();
                    self.expect(TokenKind::Semicolon)?;
                    Ok(Stmt::Continue)
                }
                _ => self.expression_statement(),
            },
            _ => self.expression_statement(),
        }
    }
    fn for_statement(&mut self) -> Result<Stmt> {
        self.advance();
        self.expect(TokenKind::LParen)?;
        self.scopes.push(Scope::new());
        let init = if self.matches(TokenKind::Semicolon) {
            None
        } else if self.is_type_start(self.peek()) {
            let start = self.peek().clone();
            let mut decls = self.local_declaration()?;
            if decls.len() != 1 {
                return self.fail(&start, "Expected exactly one declaration");
            }
            decls.pop().map(Box::new)
        } else {
            Some(Box::new(self.expression_statement()?))
        };
        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::Semicolon)?;
        let step = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.statement()?);
        self.scopes.pop();
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }
    /// An expression statement, or a deferred call when it calls a task
    /// function.
    fn expression_statement(&mut self) -> Result<Stmt> {
        let start = self.peek().clone();
        let expr = self.expression()?;
        self.expect(TokenKind::Semicolon)?;
        if let Expr::Call { callee, args } = expr.as_ref() {
            let task = callee
                .as_symbol()
                .and_then(|symbol| self.tasks.get(&symbol.id()));
            if let Some(task) = task {
                let call = DeferredCall {
                    task: task.clone(),
                    args: args.clone(),
                    loc: start.location,
                };
                return Ok(Stmt::Construct(Box::new(Construct::DeferredCall(call))));
            }
        }
        Ok(Stmt::Expr(expr))
    }
    fn construct(&mut self) -> Result<Stmt> {
        let pragma = self.expect(TokenKind::PragmaOmp)?;
        let name = self.expect(TokenKind::Identifier)?;
        if name.lexeme != "task" && name.lexeme != "parallel" {
            return self.fail(&name, "Unsupported directive");
        }
        let clauses = self.clauses()?;
        let body = self.statement()?;
        let directive = Directive {
            clauses,
            body,
            loc: pragma.location,
        };
        let construct = if name.lexeme == "task" {
            Construct::Task(directive)
        } else {
            Construct::Parallel(directive)
        };
        Ok(Stmt::Construct(Box::new(construct)))
    }
    pub fn parse(src: &str) -> Result<TranslationUnit> {
        let mut parser = Parser {
            src: src.to_string(),
            tokens: Scanner::scan(src)?,
            current: 0,
            unit: TranslationUnit::new(),
            scopes: vec![],
            typedefs: HashMap::new(),
            structs: HashMap::new(),
            tasks: HashMap::new(),
        };
        while !parser.is_at_end() {
            parser.external_declaration()?;
        }
        Ok(parser.unit)
    }
}
