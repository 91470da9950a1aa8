//! Statement and block parser.
//!
//! Works over merged logical lines: each statement starts on its own
//! logical line, suites are recognized purely by indentation. Every suite
//! is parsed against a cloned copy of the enclosing scope, so bindings made
//! inside a nested block never leak outward.

use crate::convert::ConvertCtx;
use crate::east::*;
use crate::errors::{BuildError, Result};
use crate::expr::{range_plan, ExprParser};
use crate::lexer::Lexer;
use crate::lines::LogicalLine;
use crate::token::{Span, Token, TokenKind};
use crate::types;
use crate::usage;
use std::collections::HashMap;

/// Name→type bindings for one lexical scope, plus the return/yield types
/// observed while parsing a function body.
#[derive(Debug, Default, Clone)]
pub struct Scope {
    pub vars: HashMap<String, String>,
}

/// Accumulates types flowing out of a function body.
#[derive(Debug, Default)]
pub struct FlowTypes {
    pub returns: Vec<String>,
    pub yields: Vec<String>,
    pub bare_return: bool,
}

pub struct BlockParser<'a> {
    lines: &'a [LogicalLine],
    pub idx: usize,
    ctx: &'a ConvertCtx,
    /// Name of the class whose method body is being parsed, if any.
    enclosing_class: Option<String>,
}

impl<'a> BlockParser<'a> {
    pub fn new(lines: &'a [LogicalLine], ctx: &'a ConvertCtx) -> Self {
        Self {
            lines,
            idx: 0,
            ctx,
            enclosing_class: None,
        }
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.enclosing_class = Some(class.to_string());
        self
    }

    fn line(&self) -> &LogicalLine {
        &self.lines[self.idx]
    }

    fn done(&self) -> bool {
        self.idx >= self.lines.len()
    }

    /// Parse consecutive statements at exactly `indent`. Stops at a dedent;
    /// a deeper indent here means the input skipped a suite header.
    pub fn parse_block(
        &mut self,
        indent: usize,
        scope: &mut Scope,
        flow: &mut FlowTypes,
    ) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.done() {
            let line = self.line();
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(BuildError::invalid(
                    "unexpected indentation".to_string(),
                    Some(Span::point(line.start_line, line.indent + 1)),
                    "Indent only the body of a compound statement.",
                ));
            }
            stmts.push(self.parse_statement(scope, flow)?);
        }
        Ok(stmts)
    }

    /// Parse the indented suite following a header line at `header_indent`.
    /// The suite scope is a clone; bindings inside do not escape.
    fn parse_suite(
        &mut self,
        header_indent: usize,
        header_line: usize,
        scope: &Scope,
        flow: &mut FlowTypes,
    ) -> Result<Vec<Stmt>> {
        let body_indent = match self.lines.get(self.idx) {
            Some(line) if line.indent > header_indent => line.indent,
            _ => {
                return Err(BuildError::invalid(
                    "expected an indented block".to_string(),
                    Some(Span::point(header_line, 1)),
                    "Indent the statements that belong to this suite.",
                ));
            }
        };
        let mut inner = scope.clone();
        self.parse_block(body_indent, &mut inner, flow)
    }

    /// Parse exactly one statement (with its suite, if compound) at the
    /// current position.
    pub fn parse_one(&mut self, scope: &mut Scope, flow: &mut FlowTypes) -> Result<Stmt> {
        self.parse_statement(scope, flow)
    }

    fn parse_statement(&mut self, scope: &mut Scope, flow: &mut FlowTypes) -> Result<Stmt> {
        let line = self.line().clone();
        let tokens = Lexer::new(&line.text, line.start_line).tokenize()?;
        reject_semicolons(&tokens)?;
        let span = statement_span(&tokens);

        let stmt = match tokens[0].kind {
            TokenKind::If => self.parse_if(&line, &tokens, scope, flow)?,
            TokenKind::While => self.parse_while(&line, &tokens, scope, flow)?,
            TokenKind::For => self.parse_for(&line, &tokens, scope, flow)?,
            TokenKind::Try => self.parse_try(&line, &tokens, scope, flow)?,
            TokenKind::With => self.parse_with(&line, &tokens, scope, flow)?,
            TokenKind::Def => self.parse_function(&line, &tokens, scope)?,
            TokenKind::Class => {
                return Err(BuildError::unsupported(
                    "class definitions are only supported at module level".to_string(),
                    Some(span),
                    "Move the class to the top level of the file.",
                ));
            }
            TokenKind::Elif | TokenKind::Else | TokenKind::Except | TokenKind::Finally => {
                return Err(BuildError::invalid(
                    format!("'{}' without a matching statement", tokens[0].literal),
                    Some(span),
                    "This clause must follow its opening statement at the same indentation.",
                ));
            }
            TokenKind::Global | TokenKind::Nonlocal | TokenKind::Del | TokenKind::Assert => {
                return Err(BuildError::unsupported(
                    format!("'{}' statements are not supported", tokens[0].literal),
                    Some(span),
                    "Rewrite without this statement; explicit data flow only.",
                ));
            }
            TokenKind::Import | TokenKind::From => {
                return Err(BuildError::unsupported(
                    "imports are only supported at module level".to_string(),
                    Some(span),
                    "Move the import to the top of the file.",
                ));
            }
            _ => {
                self.idx += 1;
                self.parse_simple(&line, &tokens, scope, flow)?
            }
        };
        Ok(stmt.with_trivia(line.trivia.clone()))
    }

    // ---- compound statements --------------------------------------------

    fn parse_if(
        &mut self,
        line: &LogicalLine,
        tokens: &[Token],
        scope: &mut Scope,
        flow: &mut FlowTypes,
    ) -> Result<Stmt> {
        let span = statement_span(tokens);
        let mut p = self.expr_parser(tokens, scope);
        p.expect(TokenKind::If)?;
        let test = p.parse_expression()?;
        self.finish_header(&mut p)?;
        self.idx += 1;
        let body = self.parse_suite(line.indent, line.start_line, scope, flow)?;
        let orelse = self.parse_else_chain(line.indent, scope, flow)?;
        Ok(Stmt::new(StmtKind::If { test, body, orelse }, span))
    }

    /// `elif`/`else` clauses following an `if` at the same indentation.
    fn parse_else_chain(
        &mut self,
        indent: usize,
        scope: &mut Scope,
        flow: &mut FlowTypes,
    ) -> Result<Vec<Stmt>> {
        let Some(line) = self.lines.get(self.idx).cloned() else {
            return Ok(Vec::new());
        };
        if line.indent != indent {
            return Ok(Vec::new());
        }
        let tokens = Lexer::new(&line.text, line.start_line).tokenize()?;
        match tokens[0].kind {
            TokenKind::Elif => {
                let span = statement_span(&tokens);
                let mut p = self.expr_parser(&tokens, scope);
                p.expect(TokenKind::Elif)?;
                let test = p.parse_expression()?;
                self.finish_header(&mut p)?;
                self.idx += 1;
                let body = self.parse_suite(line.indent, line.start_line, scope, flow)?;
                let orelse = self.parse_else_chain(indent, scope, flow)?;
                Ok(vec![
                    Stmt::new(StmtKind::If { test, body, orelse }, span)
                        .with_trivia(line.trivia.clone()),
                ])
            }
            TokenKind::Else => {
                let mut p = self.expr_parser(&tokens, scope);
                p.expect(TokenKind::Else)?;
                self.finish_header(&mut p)?;
                self.idx += 1;
                self.parse_suite(line.indent, line.start_line, scope, flow)
            }
            _ => Ok(Vec::new()),
        }
    }

    fn parse_while(
        &mut self,
        line: &LogicalLine,
        tokens: &[Token],
        scope: &mut Scope,
        flow: &mut FlowTypes,
    ) -> Result<Stmt> {
        let span = statement_span(tokens);
        let mut p = self.expr_parser(tokens, scope);
        p.expect(TokenKind::While)?;
        let test = p.parse_expression()?;
        self.finish_header(&mut p)?;
        self.idx += 1;
        let body = self.parse_suite(line.indent, line.start_line, scope, flow)?;
        self.reject_loop_else(line.indent)?;
        Ok(Stmt::new(StmtKind::While { test, body }, span))
    }

    fn parse_for(
        &mut self,
        line: &LogicalLine,
        tokens: &[Token],
        scope: &mut Scope,
        flow: &mut FlowTypes,
    ) -> Result<Stmt> {
        let span = statement_span(tokens);
        let mut p = self.expr_parser(tokens, scope);
        p.expect(TokenKind::For)?;

        // Loop target: a name or a comma-separated list of names.
        let mut names = Vec::new();
        loop {
            names.push(p.expect(TokenKind::Ident)?.literal);
            if !p.consume(TokenKind::Comma) {
                break;
            }
        }
        p.expect(TokenKind::In)?;
        let iter = p.parse_expression()?;
        self.finish_header(&mut p)?;
        self.idx += 1;

        // Literal range(...) iterables get a static plan.
        let is_range_call = matches!(
            &iter.kind,
            ExprKind::Call { func, .. }
                if func.as_name() == Some("range") && !scope.vars.contains_key("range")
        );
        if is_range_call {
            if names.len() != 1 {
                return Err(BuildError::conflict(
                    "range iteration binds exactly one loop variable".to_string(),
                    Some(span),
                    "Use a single loop variable with range().",
                ));
            }
            let (args, iter_span) = match iter.kind {
                ExprKind::Call { args, .. } => (args, iter.source_span),
                _ => unreachable!(),
            };
            let (start, stop, step, range_mode) = range_plan(args, iter_span)?;
            let target = Expr::synthesized(
                ExprKind::Name {
                    id: names[0].clone(),
                },
                "int64",
                &names[0],
            );
            let mut inner = scope.clone();
            inner.vars.insert(names[0].clone(), "int64".to_string());
            let body = self.suite_with_scope(line.indent, line.start_line, inner, flow)?;
            self.reject_loop_else(line.indent)?;
            return Ok(Stmt::new(
                StmtKind::ForRange {
                    target,
                    target_type: "int64".to_string(),
                    start,
                    stop,
                    step,
                    range_mode,
                    body,
                },
                span,
            ));
        }

        let elem = match types::element_type(&iter.resolved_type) {
            Some(e) => e,
            None if iter.resolved_type == types::UNKNOWN => types::UNKNOWN.to_string(),
            None => {
                return Err(BuildError::inference(
                    format!("cannot iterate a value of type {}", iter.resolved_type),
                    iter.source_span.or(Some(span)),
                    "Iterate a list, set, dict, str, bytes, or range.",
                ));
            }
        };

        let mut inner = scope.clone();
        let target = if names.len() == 1 {
            inner.vars.insert(names[0].clone(), elem.clone());
            Expr::synthesized(
                ExprKind::Name {
                    id: names[0].clone(),
                },
                elem.clone(),
                &names[0],
            )
        } else {
            let parts = types::tuple_elements(&elem).unwrap_or_default();
            let mut elts = Vec::new();
            for (i, name) in names.iter().enumerate() {
                let ty = parts
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| types::UNKNOWN.to_string());
                inner.vars.insert(name.clone(), ty.clone());
                elts.push(Expr::synthesized(
                    ExprKind::Name { id: name.clone() },
                    ty,
                    name,
                ));
            }
            let repr = names.join(", ");
            Expr::synthesized(ExprKind::Tuple { elts }, elem.clone(), &repr)
        };
        let target_type = elem;
        let body = self.suite_with_scope(line.indent, line.start_line, inner, flow)?;
        self.reject_loop_else(line.indent)?;
        Ok(Stmt::new(
            StmtKind::For {
                target,
                target_type,
                iter,
                body,
            },
            span,
        ))
    }

    fn suite_with_scope(
        &mut self,
        header_indent: usize,
        header_line: usize,
        mut scope: Scope,
        flow: &mut FlowTypes,
    ) -> Result<Vec<Stmt>> {
        let body_indent = match self.lines.get(self.idx) {
            Some(line) if line.indent > header_indent => line.indent,
            _ => {
                return Err(BuildError::invalid(
                    "expected an indented block".to_string(),
                    Some(Span::point(header_line, 1)),
                    "Indent the statements that belong to this suite.",
                ));
            }
        };
        self.parse_block(body_indent, &mut scope, flow)
    }

    fn reject_loop_else(&self, indent: usize) -> Result<()> {
        let Some(line) = self.lines.get(self.idx) else {
            return Ok(());
        };
        if line.indent == indent && line.text.trim_start().starts_with("else") {
            return Err(BuildError::unsupported(
                "'else' clauses on loops are not supported".to_string(),
                Some(Span::point(line.start_line, 1)),
                "Track completion with a flag variable instead.",
            ));
        }
        Ok(())
    }

    fn parse_try(
        &mut self,
        line: &LogicalLine,
        tokens: &[Token],
        scope: &mut Scope,
        flow: &mut FlowTypes,
    ) -> Result<Stmt> {
        let span = statement_span(tokens);
        let mut p = self.expr_parser(tokens, scope);
        p.expect(TokenKind::Try)?;
        self.finish_header(&mut p)?;
        self.idx += 1;
        let body = self.parse_suite(line.indent, line.start_line, scope, flow)?;

        let mut handlers = Vec::new();
        let mut finalbody = Vec::new();
        while let Some(next) = self.lines.get(self.idx).cloned() {
            if next.indent != line.indent {
                break;
            }
            let next_tokens = Lexer::new(&next.text, next.start_line).tokenize()?;
            match next_tokens[0].kind {
                TokenKind::Except => {
                    let mut hp = self.expr_parser(&next_tokens, scope);
                    hp.expect(TokenKind::Except)?;
                    let exc_type = if hp.curr_kind() == TokenKind::Ident {
                        Some(hp.expect(TokenKind::Ident)?.literal)
                    } else {
                        None
                    };
                    let name = if hp.consume(TokenKind::As) {
                        Some(hp.expect(TokenKind::Ident)?.literal)
                    } else {
                        None
                    };
                    self.finish_header(&mut hp)?;
                    self.idx += 1;
                    let mut handler_scope = scope.clone();
                    if let Some(n) = &name {
                        handler_scope.vars.insert(n.clone(), "Exception".to_string());
                    }
                    let handler_body =
                        self.suite_with_scope(next.indent, next.start_line, handler_scope, flow)?;
                    handlers.push(ExceptHandler {
                        exc_type,
                        name,
                        body: handler_body,
                    });
                }
                TokenKind::Finally => {
                    let mut fp = self.expr_parser(&next_tokens, scope);
                    fp.expect(TokenKind::Finally)?;
                    self.finish_header(&mut fp)?;
                    self.idx += 1;
                    finalbody = self.parse_suite(next.indent, next.start_line, scope, flow)?;
                    break;
                }
                TokenKind::Else => {
                    return Err(BuildError::unsupported(
                        "'else' clauses on try are not supported".to_string(),
                        Some(Span::point(next.start_line, 1)),
                        "Move the code into the try body after the risky statement.",
                    ));
                }
                _ => break,
            }
        }
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(BuildError::invalid(
                "try without except or finally".to_string(),
                Some(span),
                "Add an except or finally clause.",
            ));
        }
        Ok(Stmt::new(
            StmtKind::Try {
                body,
                handlers,
                finalbody,
            },
            span,
        ))
    }

    /// `with EXPR as NAME:` lowers to an assignment plus try/finally that
    /// closes the resource.
    fn parse_with(
        &mut self,
        line: &LogicalLine,
        tokens: &[Token],
        scope: &mut Scope,
        flow: &mut FlowTypes,
    ) -> Result<Stmt> {
        let span = statement_span(tokens);
        let mut p = self.expr_parser(tokens, scope);
        p.expect(TokenKind::With)?;
        let resource = p.parse_expression()?;
        if p.curr_kind() == TokenKind::Comma {
            return Err(BuildError::unsupported(
                "multiple context managers in one with statement".to_string(),
                Some(span),
                "Use one with statement per resource.",
            ));
        }
        p.expect(TokenKind::As)?;
        let name = p.expect(TokenKind::Ident)?.literal;
        self.finish_header(&mut p)?;
        self.idx += 1;

        let resource_ty = resource.resolved_type.clone();
        let mut inner = scope.clone();
        inner.vars.insert(name.clone(), resource_ty.clone());
        let body = self.suite_with_scope(line.indent, line.start_line, inner, flow)?;

        let target = Expr::synthesized(ExprKind::Name { id: name.clone() }, resource_ty.clone(), &name);
        let assign = Stmt::new(
            StmtKind::Assign {
                target: target.clone(),
                value: resource,
                declare: true,
                decl_type: Some(resource_ty.clone()),
            },
            span,
        );

        let close_call = Expr::synthesized(
            ExprKind::Call {
                func: Box::new(Expr::synthesized(
                    ExprKind::Attribute {
                        value: Box::new(target),
                        attr: "close".to_string(),
                    },
                    types::UNKNOWN,
                    &format!("{}.close", name),
                )),
                args: Vec::new(),
                keywords: Vec::new(),
                lowering: Some(BuiltinLowering::call("close", "py_file_close")),
            },
            "None",
            &format!("{}.close()", name),
        );
        let finalbody = vec![Stmt::synthesized(StmtKind::Expr { value: close_call })];

        // The assignment plus guarded body travel as one statement pair;
        // the try carries the original span.
        Ok(Stmt::new(
            StmtKind::Try {
                body: {
                    let mut b = vec![assign];
                    b.extend(body);
                    b
                },
                handlers: Vec::new(),
                finalbody,
            },
            span,
        ))
    }

    // ---- function definitions -------------------------------------------

    pub fn parse_function(
        &mut self,
        line: &LogicalLine,
        tokens: &[Token],
        scope: &Scope,
    ) -> Result<Stmt> {
        let span = statement_span(tokens);
        let mut p = self.expr_parser(tokens, scope);
        p.expect(TokenKind::Def)?;
        let name = p.expect(TokenKind::Ident)?.literal;
        p.expect(TokenKind::LParen)?;

        let mut params: Vec<Param> = Vec::new();
        let mut saw_default = false;
        while p.curr_kind() != TokenKind::RParen {
            match p.curr_kind() {
                TokenKind::Star => {
                    // A bare '*' only marks keyword-only parameters.
                    p.advance();
                    if p.curr_kind() == TokenKind::Ident {
                        return Err(BuildError::unsupported(
                            "*args parameters are not supported".to_string(),
                            Some(p.curr_span()),
                            "Accept an explicit list parameter instead.",
                        ));
                    }
                }
                TokenKind::StarStar => {
                    return Err(BuildError::unsupported(
                        "**kwargs parameters are not supported".to_string(),
                        Some(p.curr_span()),
                        "Accept an explicit dict parameter instead.",
                    ));
                }
                TokenKind::Slash => {
                    return Err(BuildError::unsupported(
                        "positional-only markers are not supported".to_string(),
                        Some(p.curr_span()),
                        "Remove the '/' from the parameter list.",
                    ));
                }
                _ => {
                    let pname = p.expect(TokenKind::Ident)?.literal;
                    let ty = if p.consume(TokenKind::Colon) {
                        let text = self.annotation_text(line, tokens, &mut p, true)?;
                        types::normalize(&text)
                    } else if pname == "self" && params.is_empty() {
                        self.enclosing_class
                            .clone()
                            .unwrap_or_else(|| types::UNKNOWN.to_string())
                    } else {
                        types::UNKNOWN.to_string()
                    };
                    let default = if p.consume(TokenKind::Eq) {
                        saw_default = true;
                        Some(p.parse_expression()?)
                    } else {
                        if saw_default {
                            return Err(BuildError::unsupported(
                                format!(
                                    "parameter '{}' without default follows a defaulted parameter",
                                    pname
                                ),
                                Some(span),
                                "Give the parameter a default value or reorder the parameters.",
                            ));
                        }
                        None
                    };
                    params.push(Param {
                        name: pname,
                        ty,
                        default,
                    });
                }
            }
            if !p.consume(TokenKind::Comma) {
                break;
            }
        }
        p.expect(TokenKind::RParen)?;

        let annotated_return = if p.consume(TokenKind::Arrow) {
            let text = self.annotation_text(line, tokens, &mut p, false)?;
            Some(types::normalize(&text))
        } else {
            None
        };
        self.finish_header(&mut p)?;
        self.idx += 1;

        // Function scope: parameters only; module symbols resolve via ctx.
        let mut fn_scope = Scope::default();
        for param in &params {
            fn_scope.vars.insert(param.name.clone(), param.ty.clone());
        }
        let mut fn_flow = FlowTypes::default();
        let mut body = self.parse_suite(line.indent, line.start_line, &fn_scope, &mut fn_flow)?;
        let docstring = extract_docstring(&mut body);

        let is_generator = !fn_flow.yields.is_empty();
        let (return_type, yield_type) = if is_generator {
            let mut elem = types::UNKNOWN.to_string();
            for y in &fn_flow.yields {
                elem = types::unify(&elem, y);
            }
            (format!("list[{}]", elem), Some(elem))
        } else {
            let inferred = infer_return(&fn_flow);
            let ret = match &annotated_return {
                Some(annotated) => {
                    if !types::compatible(annotated, &inferred) {
                        return Err(BuildError::conflict(
                            format!(
                                "function '{}' is annotated to return {} but returns {}",
                                name, annotated, inferred
                            ),
                            Some(span),
                            "Align the return annotation with the returned values.",
                        ));
                    }
                    annotated.clone()
                }
                None => inferred,
            };
            (ret, None)
        };

        let arg_usage = usage::classify(&params, &body);
        Ok(Stmt::new(
            StmtKind::FunctionDef {
                name: name.clone(),
                original_name: name,
                params,
                return_type,
                arg_usage,
                is_generator,
                yield_type,
                docstring,
                body,
            },
            span,
        ))
    }

    /// Slice the source text of a type annotation: tokens up to a top-level
    /// `=`, or `,`/`)` inside parameter lists, or `:`/end in return and
    /// annotated-assignment position.
    fn annotation_text(
        &self,
        line: &LogicalLine,
        tokens: &[Token],
        p: &mut ExprParser,
        in_params: bool,
    ) -> Result<String> {
        let start = p.pos();
        let mut depth = 0usize;
        let mut end = start;
        let mut pos = start;
        loop {
            let tok = &tokens[pos.min(tokens.len() - 1)];
            match tok.kind {
                TokenKind::LParen | TokenKind::LBrack | TokenKind::LBrace => depth += 1,
                TokenKind::RParen if depth == 0 && in_params => break,
                TokenKind::RParen | TokenKind::RBrack | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1)
                }
                TokenKind::Eq if depth == 0 => break,
                TokenKind::Comma if depth == 0 && in_params => break,
                TokenKind::Colon if depth == 0 && !in_params => break,
                TokenKind::Eof => break,
                _ => {}
            }
            end = pos + 1;
            pos += 1;
        }
        if end == start {
            return Err(BuildError::invalid(
                "missing type annotation".to_string(),
                Some(p.curr_span()),
                "Write a type after the ':'.",
            ));
        }
        let text = line.text[tokens[start].start..tokens[end - 1].end].to_string();
        p.set_pos(end);
        Ok(text)
    }

    // ---- simple statements ----------------------------------------------

    fn parse_simple(
        &mut self,
        line: &LogicalLine,
        tokens: &[Token],
        scope: &mut Scope,
        flow: &mut FlowTypes,
    ) -> Result<Stmt> {
        let span = statement_span(tokens);
        match tokens[0].kind {
            TokenKind::Pass => return Ok(Stmt::new(StmtKind::Pass {}, span)),
            TokenKind::Break => return Ok(Stmt::new(StmtKind::Break {}, span)),
            TokenKind::Continue => return Ok(Stmt::new(StmtKind::Continue {}, span)),
            TokenKind::Return => {
                let mut p = self.expr_parser(tokens, scope);
                p.expect(TokenKind::Return)?;
                if p.at_end() {
                    flow.bare_return = true;
                    return Ok(Stmt::new(StmtKind::Return { value: None }, span));
                }
                let value = p.parse_expression_list()?;
                p.expect_end()?;
                flow.returns.push(value.resolved_type.clone());
                return Ok(Stmt::new(StmtKind::Return { value: Some(value) }, span));
            }
            TokenKind::Yield => {
                let mut p = self.expr_parser(tokens, scope);
                p.expect(TokenKind::Yield)?;
                if p.at_end() {
                    flow.yields.push(types::UNKNOWN.to_string());
                    return Ok(Stmt::new(StmtKind::Yield { value: None }, span));
                }
                let value = p.parse_expression()?;
                p.expect_end()?;
                flow.yields.push(value.resolved_type.clone());
                return Ok(Stmt::new(StmtKind::Yield { value: Some(value) }, span));
            }
            TokenKind::Raise => {
                let mut p = self.expr_parser(tokens, scope);
                p.expect(TokenKind::Raise)?;
                if p.at_end() {
                    return Ok(Stmt::new(StmtKind::Raise { exc: None, cause: None }, span));
                }
                let exc = p.parse_expression()?;
                let cause = if p.consume(TokenKind::From) {
                    Some(p.parse_expression()?)
                } else {
                    None
                };
                p.expect_end()?;
                return Ok(Stmt::new(
                    StmtKind::Raise {
                        exc: Some(exc),
                        cause,
                    },
                    span,
                ));
            }
            _ => {}
        }

        // Assignment forms, detected from the token shape before committing.
        let mut p = self.expr_parser(tokens, scope);
        let target = p.parse_expression_list()?;

        if p.curr_kind() == TokenKind::Colon {
            // Annotated assignment: `name: type = value` or a declaration.
            p.advance();
            let ann_text = self.annotation_text(line, tokens, &mut p, false)?;
            let annotation = types::normalize(&ann_text);
            let target = self.check_simple_target(target, span)?;
            let value = if p.consume(TokenKind::Eq) {
                let mut value = p.parse_expression_list()?;
                p.expect_end()?;
                adopt_annotation(&mut value, &annotation);
                if !types::compatible(&annotation, &value.resolved_type) {
                    return Err(BuildError::conflict(
                        format!(
                            "'{}' is annotated as {} but assigned a {}",
                            target.repr, annotation, value.resolved_type
                        ),
                        Some(span),
                        "Make the value match the annotated type.",
                    ));
                }
                Some(value)
            } else {
                None
            };
            self.bind(scope, &target, &annotation, span)?;
            return Ok(Stmt::new(
                StmtKind::AnnAssign {
                    target: retyped(target, &annotation),
                    annotation,
                    value,
                },
                span,
            ));
        }

        if p.curr_kind().is_aug_assign() {
            let op = aug_op(p.curr_kind());
            p.advance();
            let value = p.parse_expression_list()?;
            p.expect_end()?;
            let target = self.check_simple_target(target, span)?;
            if !types::compatible(&target.resolved_type, &value.resolved_type) {
                return Err(BuildError::conflict(
                    format!(
                        "cannot apply '{}=' with {} to '{}' of type {}",
                        op.symbol(),
                        value.resolved_type,
                        target.repr,
                        target.resolved_type
                    ),
                    Some(span),
                    "Make both sides of the augmented assignment the same type.",
                ));
            }
            let mut target = target;
            target.borrow_kind = BorrowKind::MutableRef;
            return Ok(Stmt::new(StmtKind::AugAssign { target, op, value }, span));
        }

        if p.consume(TokenKind::Eq) {
            let value = p.parse_expression_list()?;
            if p.curr_kind() == TokenKind::Eq {
                return Err(BuildError::unsupported(
                    "chained assignment is not supported".to_string(),
                    Some(span),
                    "Assign each name on its own line.",
                ));
            }
            p.expect_end()?;
            return self.finish_assign(target, value, scope, span);
        }

        p.expect_end()?;
        Ok(Stmt::new(StmtKind::Expr { value: target }, span))
    }

    /// Plain `target = value`, including tuple targets and swap detection.
    fn finish_assign(
        &mut self,
        target: Expr,
        value: Expr,
        scope: &mut Scope,
        span: Span,
    ) -> Result<Stmt> {
        // `a, b = b, a` becomes an explicit swap.
        if let (ExprKind::Tuple { elts: t }, ExprKind::Tuple { elts: v }) =
            (&target.kind, &value.kind)
        {
            if t.len() == 2 && v.len() == 2 {
                let names: Vec<Option<&str>> = t.iter().map(|e| e.as_name()).collect();
                let vals: Vec<Option<&str>> = v.iter().map(|e| e.as_name()).collect();
                if let (Some(a), Some(b), Some(x), Some(y)) =
                    (names[0], names[1], vals[0], vals[1])
                {
                    if a == y && b == x {
                        let mut left = t[0].clone();
                        let mut right = t[1].clone();
                        left.borrow_kind = BorrowKind::MutableRef;
                        right.borrow_kind = BorrowKind::MutableRef;
                        return Ok(Stmt::new(StmtKind::Swap { left, right }, span));
                    }
                }
            }
        }

        // Tuple unpacking: bind each name to the matching element type.
        if let ExprKind::Tuple { elts } = &target.kind {
            let parts = types::tuple_elements(&value.resolved_type).unwrap_or_default();
            let mut new_elts = Vec::new();
            for (i, elt) in elts.iter().enumerate() {
                let name = elt.as_name().ok_or_else(|| {
                    BuildError::unsupported(
                        "unpacking targets must be plain names".to_string(),
                        elt.source_span.or(Some(span)),
                        "Unpack into simple variables, then index into structures.",
                    )
                })?;
                let ty = parts
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| types::UNKNOWN.to_string());
                let named = Expr::synthesized(
                    ExprKind::Name {
                        id: name.to_string(),
                    },
                    ty.clone(),
                    name,
                );
                self.bind(scope, &named, &ty, span)?;
                new_elts.push(named);
            }
            let mut target = target.clone();
            if let ExprKind::Tuple { elts } = &mut target.kind {
                *elts = new_elts;
            }
            target.resolved_type = value.resolved_type.clone();
            return Ok(Stmt::new(
                StmtKind::Assign {
                    target,
                    value,
                    declare: false,
                    decl_type: None,
                },
                span,
            ));
        }

        let target = self.check_simple_target(target, span)?;
        let value_ty = value.resolved_type.clone();

        if let Some(name) = target.as_name() {
            let declare = !scope.vars.contains_key(name);
            let named = Expr::synthesized(
                ExprKind::Name {
                    id: name.to_string(),
                },
                value_ty.clone(),
                name,
            );
            self.bind(scope, &named, &value_ty, span)?;
            let decl_type = if declare { Some(value_ty) } else { None };
            let mut target = target;
            target.resolved_type = named.resolved_type.clone();
            if !declare {
                target.borrow_kind = BorrowKind::MutableRef;
            }
            return Ok(Stmt::new(
                StmtKind::Assign {
                    target,
                    value,
                    declare,
                    decl_type,
                },
                span,
            ));
        }

        // Attribute or subscript store.
        let mut target = target;
        target.borrow_kind = BorrowKind::MutableRef;
        if target.resolved_type != types::UNKNOWN
            && !types::compatible(&target.resolved_type, &value_ty)
        {
            return Err(BuildError::conflict(
                format!(
                    "cannot store {} into '{}' of type {}",
                    value_ty, target.repr, target.resolved_type
                ),
                Some(span),
                "Make the value match the target's type.",
            ));
        }
        Ok(Stmt::new(
            StmtKind::Assign {
                target,
                value,
                declare: false,
                decl_type: None,
            },
            span,
        ))
    }

    /// Bind or rebind one name; a rebinding must keep a compatible type.
    fn bind(&self, scope: &mut Scope, target: &Expr, ty: &str, span: Span) -> Result<()> {
        let Some(name) = target.as_name() else {
            return Ok(());
        };
        if let Some(existing) = scope.vars.get(name) {
            if !types::compatible(existing, ty) {
                return Err(BuildError::conflict(
                    format!(
                        "'{}' was bound as {} and cannot be rebound as {}",
                        name, existing, ty
                    ),
                    Some(span),
                    "Use a new variable for the differently-typed value.",
                ));
            }
            let unified = types::unify(existing, ty);
            scope.vars.insert(name.to_string(), unified);
        } else {
            scope.vars.insert(name.to_string(), ty.to_string());
        }
        Ok(())
    }

    fn check_simple_target(&self, target: Expr, span: Span) -> Result<Expr> {
        match &target.kind {
            ExprKind::Name { .. } | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => {
                Ok(target)
            }
            _ => Err(BuildError::unsupported(
                format!("'{}' cannot be assigned to", target.repr),
                Some(span),
                "Assign to a name, attribute, or subscript.",
            )),
        }
    }

    // ---- helpers --------------------------------------------------------

    fn expr_parser<'t>(&self, tokens: &'t [Token], scope: &Scope) -> ExprParser<'t>
    where
        'a: 't,
    {
        ExprParser::new(tokens, self.ctx, scope.vars.clone())
    }

    /// Consume the ':' closing a compound-statement header and require the
    /// line to end there.
    fn finish_header(&self, p: &mut ExprParser) -> Result<()> {
        p.expect(TokenKind::Colon)?;
        if !p.at_end() {
            return Err(BuildError::unsupported(
                "statements on the same line as a suite header".to_string(),
                Some(p.curr_span()),
                "Put the suite body on its own indented line.",
            ));
        }
        Ok(())
    }
}

fn statement_span(tokens: &[Token]) -> Span {
    let first = tokens.first().map(|t| t.span).unwrap_or_default();
    let last = tokens
        .iter()
        .rev()
        .find(|t| t.kind != TokenKind::Eof)
        .map(|t| t.span)
        .unwrap_or(first);
    first.to(last)
}

fn reject_semicolons(tokens: &[Token]) -> Result<()> {
    if let Some(tok) = tokens.iter().find(|t| t.kind == TokenKind::Semi) {
        return Err(BuildError::invalid(
            "';' separators are not supported".to_string(),
            Some(tok.span),
            "Write one statement per line without trailing semicolons.",
        ));
    }
    Ok(())
}

fn aug_op(kind: TokenKind) -> BinOpKind {
    match kind {
        TokenKind::PlusEq => BinOpKind::Add,
        TokenKind::MinusEq => BinOpKind::Sub,
        TokenKind::StarEq => BinOpKind::Mult,
        TokenKind::SlashEq => BinOpKind::Div,
        TokenKind::SlashSlashEq => BinOpKind::FloorDiv,
        TokenKind::PercentEq => BinOpKind::Mod,
        TokenKind::AmpEq => BinOpKind::BitAnd,
        TokenKind::PipeEq => BinOpKind::BitOr,
        TokenKind::CaretEq => BinOpKind::BitXor,
        TokenKind::ShlEq => BinOpKind::LShift,
        TokenKind::ShrEq => BinOpKind::RShift,
        _ => unreachable!("not an augmented assignment operator"),
    }
}

/// A leading string-constant expression statement is the docstring.
pub fn extract_docstring(body: &mut Vec<Stmt>) -> Option<String> {
    let is_doc = matches!(
        body.first(),
        Some(Stmt {
            kind: StmtKind::Expr {
                value: Expr {
                    kind: ExprKind::Constant {
                        value: ConstValue::Str(_)
                    },
                    ..
                }
            },
            ..
        })
    );
    if !is_doc {
        return None;
    }
    match body.remove(0).kind {
        StmtKind::Expr {
            value:
                Expr {
                    kind:
                        ExprKind::Constant {
                            value: ConstValue::Str(s),
                        },
                    ..
                },
        } => Some(s),
        _ => None,
    }
}

/// Empty container literals take their type from the annotation.
fn adopt_annotation(value: &mut Expr, annotation: &str) {
    let empty = match &value.kind {
        ExprKind::List { elts } | ExprKind::Set { elts } => elts.is_empty(),
        ExprKind::Dict { keys, .. } => keys.is_empty(),
        _ => false,
    };
    if empty {
        value.resolved_type = annotation.to_string();
    }
}

fn retyped(mut expr: Expr, ty: &str) -> Expr {
    expr.resolved_type = ty.to_string();
    expr
}

/// Unify observed return types; a function with no value-returning paths
/// returns None.
fn infer_return(flow: &FlowTypes) -> String {
    if flow.returns.is_empty() {
        return "None".to_string();
    }
    let mut ty = flow.returns[0].clone();
    for t in &flow.returns[1..] {
        ty = types::unify(&ty, t);
    }
    if flow.bare_return && ty != "None" {
        // Mixed bare and valued returns degrade to unknown.
        return types::UNKNOWN.to_string();
    }
    ty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConvertCtx;
    use crate::lines;

    fn parse_body(src: &str) -> Vec<Stmt> {
        try_parse_body(src).unwrap()
    }

    fn try_parse_body(src: &str) -> Result<Vec<Stmt>> {
        let (logical, _) = lines::merge(src);
        let ctx = ConvertCtx::default();
        let mut parser = BlockParser::new(&logical, &ctx);
        let mut scope = Scope::default();
        let mut flow = FlowTypes::default();
        parser.parse_block(0, &mut scope, &mut flow)
    }

    #[test]
    fn typed_function_signature() {
        let stmts = parse_body("def add(a: int, b: int) -> int:\n    return a + b\n");
        assert_eq!(stmts.len(), 1);
        match &stmts[0].kind {
            StmtKind::FunctionDef {
                name,
                params,
                return_type,
                body,
                is_generator,
                ..
            } => {
                assert_eq!(name, "add");
                assert_eq!(params[0].ty, "int64");
                assert_eq!(params[1].ty, "int64");
                assert_eq!(return_type, "int64");
                assert!(!is_generator);
                match &body[0].kind {
                    StmtKind::Return { value: Some(v) } => {
                        assert_eq!(v.resolved_type, "int64");
                        assert!(v.casts.is_empty());
                    }
                    other => panic!("expected Return, got {:?}", other),
                }
            }
            other => panic!("expected FunctionDef, got {:?}", other),
        }
    }

    #[test]
    fn annotated_division_gets_promotion_casts() {
        let stmts = parse_body("x: float = 1 / 2\n");
        match &stmts[0].kind {
            StmtKind::AnnAssign {
                annotation,
                value: Some(v),
                ..
            } => {
                assert_eq!(annotation, "float64");
                assert_eq!(v.resolved_type, "float64");
                assert_eq!(v.casts.len(), 2);
            }
            other => panic!("expected AnnAssign, got {:?}", other),
        }
    }

    #[test]
    fn literal_range_loop_gets_static_plan() {
        let stmts = parse_body("for i in range(5):\n    pass\n");
        match &stmts[0].kind {
            StmtKind::ForRange {
                start,
                stop,
                step,
                range_mode,
                target_type,
                ..
            } => {
                assert_eq!(start.is_literal_int(), Some(0));
                assert_eq!(stop.is_literal_int(), Some(5));
                assert_eq!(step.is_literal_int(), Some(1));
                assert_eq!(*range_mode, RangeMode::Ascending);
                assert_eq!(target_type, "int64");
            }
            other => panic!("expected ForRange, got {:?}", other),
        }
    }

    #[test]
    fn zero_step_range_loop_conflicts() {
        let err = try_parse_body("for i in range(10, 0, 0):\n    pass\n").unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::SemanticConflict);
    }

    #[test]
    fn iterator_loop_infers_element_type() {
        let stmts = parse_body("names = [\"a\", \"b\"]\nfor n in names:\n    pass\n");
        match &stmts[1].kind {
            StmtKind::For { target_type, .. } => assert_eq!(target_type, "str"),
            other => panic!("expected For, got {:?}", other),
        }
    }

    #[test]
    fn dynamic_step_range_loop() {
        let stmts = parse_body("step = 2\nfor i in range(0, 10, step):\n    pass\n");
        match &stmts[1].kind {
            StmtKind::ForRange { range_mode, .. } => {
                assert_eq!(*range_mode, RangeMode::Dynamic)
            }
            other => panic!("expected ForRange, got {:?}", other),
        }
    }

    #[test]
    fn swap_is_detected() {
        let stmts = parse_body("a = 1\nb = 2\na, b = b, a\n");
        match &stmts[2].kind {
            StmtKind::Swap { left, right } => {
                assert_eq!(left.as_name(), Some("a"));
                assert_eq!(right.as_name(), Some("b"));
                assert_eq!(left.borrow_kind, BorrowKind::MutableRef);
            }
            other => panic!("expected Swap, got {:?}", other),
        }
    }

    #[test]
    fn first_assignment_declares() {
        let stmts = parse_body("total = 0\ntotal = total + 1\n");
        match &stmts[0].kind {
            StmtKind::Assign {
                declare, decl_type, ..
            } => {
                assert!(*declare);
                assert_eq!(decl_type.as_deref(), Some("int64"));
            }
            other => panic!("expected Assign, got {:?}", other),
        }
        match &stmts[1].kind {
            StmtKind::Assign { declare, .. } => assert!(!declare),
            other => panic!("expected Assign, got {:?}", other),
        }
    }

    #[test]
    fn incompatible_rebinding_conflicts() {
        let err = try_parse_body("x = 1\nx = \"a\"\n").unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::SemanticConflict);
    }

    #[test]
    fn suite_bindings_do_not_leak() {
        // `y` is bound only inside the if body, so the later use fails to
        // bind it at the outer level and stays unknown rather than typed.
        let stmts = parse_body("flag = True\nif flag:\n    y = 1\nz = 1\n");
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn with_statement_lowers_to_try_finally() {
        let stmts = parse_body("with open(\"f.txt\") as f:\n    pass\n");
        match &stmts[0].kind {
            StmtKind::Try {
                body, finalbody, ..
            } => {
                assert!(matches!(body[0].kind, StmtKind::Assign { declare: true, .. }));
                assert_eq!(finalbody.len(), 1);
            }
            other => panic!("expected Try, got {:?}", other),
        }
    }

    #[test]
    fn star_args_rejected() {
        let err = try_parse_body("def f(*args):\n    pass\n").unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::UnsupportedSyntax);
        let err = try_parse_body("def f(**kw):\n    pass\n").unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::UnsupportedSyntax);
    }

    #[test]
    fn keyword_only_marker_accepted() {
        let stmts = parse_body("def f(a: int, *, b: int = 0) -> int:\n    return a\n");
        match &stmts[0].kind {
            StmtKind::FunctionDef { params, .. } => {
                assert_eq!(params.len(), 2);
                assert!(params[1].default.is_some());
            }
            other => panic!("expected FunctionDef, got {:?}", other),
        }
    }

    #[test]
    fn trailing_semicolon_is_invalid() {
        let err = try_parse_body("x = 1;\n").unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::InputInvalid);
    }

    #[test]
    fn generator_infers_list_return() {
        let stmts = parse_body("def gen(n: int) -> int:\n    yield n\n");
        match &stmts[0].kind {
            StmtKind::FunctionDef {
                is_generator,
                yield_type,
                return_type,
                ..
            } => {
                assert!(is_generator);
                assert_eq!(yield_type.as_deref(), Some("int64"));
                assert_eq!(return_type, "list[int64]");
            }
            other => panic!("expected FunctionDef, got {:?}", other),
        }
    }

    #[test]
    fn docstring_is_extracted() {
        let stmts = parse_body("def f() -> None:\n    \"\"\"Does nothing.\"\"\"\n    pass\n");
        match &stmts[0].kind {
            StmtKind::FunctionDef {
                docstring, body, ..
            } => {
                assert_eq!(docstring.as_deref(), Some("Does nothing."));
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected FunctionDef, got {:?}", other),
        }
    }

    #[test]
    fn raise_from_is_parsed() {
        let stmts = parse_body(
            "err = RuntimeError(\"boom\")\nraise RuntimeError(\"outer\") from err\n",
        );
        match &stmts[1].kind {
            StmtKind::Raise {
                exc: Some(_),
                cause: Some(_),
            } => {}
            other => panic!("expected Raise with cause, got {:?}", other),
        }
    }

    #[test]
    fn aug_assign_full_set() {
        let src = "x = 1\nx += 1\nx -= 1\nx *= 2\nx //= 2\nx %= 2\nx <<= 1\nx >>= 1\nx &= 1\nx |= 1\nx ^= 1\n";
        let stmts = parse_body(src);
        assert_eq!(stmts.len(), 11);
        match &stmts[6].kind {
            StmtKind::AugAssign { op, .. } => assert_eq!(*op, BinOpKind::LShift),
            other => panic!("expected AugAssign, got {:?}", other),
        }
    }

    #[test]
    fn try_except_finally() {
        let src = "try:\n    x = 1\nexcept ValueError as e:\n    pass\nfinally:\n    pass\n";
        let stmts = parse_body(src);
        match &stmts[0].kind {
            StmtKind::Try {
                handlers,
                finalbody,
                ..
            } => {
                assert_eq!(handlers.len(), 1);
                assert_eq!(handlers[0].exc_type.as_deref(), Some("ValueError"));
                assert_eq!(handlers[0].name.as_deref(), Some("e"));
                assert_eq!(finalbody.len(), 1);
            }
            other => panic!("expected Try, got {:?}", other),
        }
    }

    #[test]
    fn annotated_empty_list_takes_annotation() {
        let stmts = parse_body("xs: list[int] = []\n");
        match &stmts[0].kind {
            StmtKind::AnnAssign {
                annotation,
                value: Some(v),
                ..
            } => {
                assert_eq!(annotation, "list[int64]");
                assert_eq!(v.resolved_type, "list[int64]");
            }
            other => panic!("expected AnnAssign, got {:?}", other),
        }
    }

    #[test]
    fn tuple_unpacking_binds_each_name() {
        let stmts = parse_body("pair = (1, \"a\")\nx, y = pair\nz = x + 1\n");
        match &stmts[2].kind {
            StmtKind::Assign { value, .. } => assert_eq!(value.resolved_type, "int64"),
            other => panic!("expected Assign, got {:?}", other),
        }
    }
}
