//! Token-based expression parser.
//!
//! One `ExprParser` is constructed per logical line (or per embedded
//! expression such as an f-string placeholder). It owns a copy of the
//! enclosing name→type scope, so comprehension bindings never leak out.
//! Every produced node is fully typed; numeric promotion casts are attached
//! at construction time.

use crate::convert::ConvertCtx;
use crate::east::*;
use crate::errors::{BuildError, Result};
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};
use crate::types;
use std::collections::HashMap;

pub struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    last_span: Span,
    ctx: &'a ConvertCtx,
    pub scope: HashMap<String, String>,
}

impl<'a> ExprParser<'a> {
    pub fn new(tokens: &'a [Token], ctx: &'a ConvertCtx, scope: HashMap<String, String>) -> Self {
        let last_span = tokens.first().map(|t| t.span).unwrap_or_default();
        Self {
            tokens,
            pos: 0,
            last_span,
            ctx,
            scope,
        }
    }

    /// Lex and parse a standalone expression (used for f-string placeholders
    /// and default values).
    pub fn parse_text(
        text: &str,
        start_line: usize,
        ctx: &ConvertCtx,
        scope: &HashMap<String, String>,
    ) -> Result<Expr> {
        let tokens = Lexer::new(text, start_line).tokenize()?;
        let mut parser = ExprParser::new(&tokens, ctx, scope.clone());
        let expr = parser.parse_expression()?;
        parser.expect_end()?;
        Ok(expr)
    }

    // ---- cursor helpers -------------------------------------------------

    pub fn curr(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub fn curr_kind(&self) -> TokenKind {
        self.curr().kind
    }

    pub fn peek_kind(&self) -> TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    pub fn curr_span(&self) -> Span {
        self.curr().span
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.tokens.len() - 1);
    }

    pub fn advance(&mut self) {
        self.last_span = self.curr().span;
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    pub fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.curr_kind() == kind {
            let tok = self.curr().clone();
            self.advance();
            Ok(tok)
        } else {
            Err(BuildError::expected(
                self.curr_span(),
                kind.description(),
                &self.describe_curr(),
            ))
        }
    }

    pub fn consume(&mut self, kind: TokenKind) -> bool {
        if self.curr_kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn at_end(&self) -> bool {
        self.curr_kind() == TokenKind::Eof
    }

    pub fn expect_end(&mut self) -> Result<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(BuildError::invalid(
                format!("unexpected trailing input '{}'", self.describe_curr()),
                Some(self.curr_span()),
                "Only one statement per line is supported.",
            ))
        }
    }

    fn describe_curr(&self) -> String {
        if self.curr().literal.is_empty() {
            self.curr_kind().description().to_string()
        } else {
            self.curr().literal.clone()
        }
    }

    fn span_from(&self, start: Span) -> Span {
        start.to(self.last_span)
    }

    // ---- precedence ladder ----------------------------------------------

    // Expression = Lambda | Conditional
    pub fn parse_expression(&mut self) -> Result<Expr> {
        if self.curr_kind() == TokenKind::Lambda {
            return self.parse_lambda();
        }
        self.parse_conditional()
    }

    /// An expression list: `a, b, c` becomes a Tuple, a single expression
    /// passes through. Used for return values and assignment right sides.
    pub fn parse_expression_list(&mut self) -> Result<Expr> {
        let start = self.curr_span();
        let first = self.parse_expression()?;
        if self.curr_kind() != TokenKind::Comma {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.consume(TokenKind::Comma) {
            if self.at_end() || self.curr_kind() == TokenKind::RParen {
                break;
            }
            elts.push(self.parse_expression()?);
        }
        Ok(self.tuple_expr(elts, self.span_from(start)))
    }

    // Lambda = "lambda" [ Params ] ":" Expression
    fn parse_lambda(&mut self) -> Result<Expr> {
        let start = self.curr_span();
        self.expect(TokenKind::Lambda)?;

        let mut params: Vec<LambdaParam> = Vec::new();
        let mut saw_default = false;
        while self.curr_kind() != TokenKind::Colon {
            let name = self.expect(TokenKind::Ident)?.literal;
            let default = if self.consume(TokenKind::Eq) {
                saw_default = true;
                Some(self.parse_expression()?)
            } else {
                if saw_default {
                    return Err(BuildError::unsupported(
                        format!("parameter '{}' without default follows a defaulted parameter", name),
                        Some(self.last_span),
                        "Give the parameter a default value or reorder the parameters.",
                    ));
                }
                None
            };
            params.push(LambdaParam { name, default });
            if !self.consume(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Colon)?;

        let mut inner = self.scope.clone();
        for p in &params {
            inner.insert(p.name.clone(), types::UNKNOWN.to_string());
        }
        let body = {
            let mut sub = ExprParser::new(&self.tokens[self.pos..], self.ctx, inner);
            let body = sub.parse_expression()?;
            self.pos += sub.pos;
            self.last_span = sub.last_span;
            body
        };

        let param_types: Vec<&str> = params.iter().map(|_| types::UNKNOWN).collect();
        let ty = format!(
            "callable[{}->{}]",
            param_types.join(", "),
            body.resolved_type
        );
        let names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        let repr = format!("lambda {}: {}", names.join(", "), body.repr);
        Ok(Expr::new(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            self.span_from(start),
            ty,
            &repr,
        ))
    }

    // Conditional = Or [ "if" Or "else" Expression ]
    fn parse_conditional(&mut self) -> Result<Expr> {
        let start = self.curr_span();
        let body = self.parse_or()?;
        if !self.consume(TokenKind::If) {
            return Ok(body);
        }
        let test = self.parse_or()?;
        self.expect(TokenKind::Else)?;
        let orelse = self.parse_expression()?;

        let mut casts = Vec::new();
        let ty = if body.resolved_type == orelse.resolved_type {
            body.resolved_type.clone()
        } else if types::is_numeric(&body.resolved_type) && types::is_numeric(&orelse.resolved_type)
        {
            let unified = types::unify(&body.resolved_type, &orelse.resolved_type);
            if body.resolved_type != unified {
                casts.push(CastRecord::promotion("body", &body.resolved_type, &unified));
            }
            if orelse.resolved_type != unified {
                casts.push(CastRecord::promotion("orelse", &orelse.resolved_type, &unified));
            }
            unified
        } else {
            types::unify(&body.resolved_type, &orelse.resolved_type)
        };

        let repr = format!("{} if {} else {}", body.repr, test.repr, orelse.repr);
        let mut expr = Expr::new(
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            self.span_from(start),
            ty,
            &repr,
        );
        expr.casts = casts;
        Ok(expr)
    }

    // Or = And { "or" And }
    fn parse_or(&mut self) -> Result<Expr> {
        let start = self.curr_span();
        let first = self.parse_and()?;
        if self.curr_kind() != TokenKind::Or {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.consume(TokenKind::Or) {
            values.push(self.parse_and()?);
        }
        let repr = join_reprs(&values, " or ");
        Ok(Expr::new(
            ExprKind::BoolOp {
                op: BoolOpKind::Or,
                values,
            },
            self.span_from(start),
            "bool",
            &repr,
        ))
    }

    // And = Not { "and" Not }
    fn parse_and(&mut self) -> Result<Expr> {
        let start = self.curr_span();
        let first = self.parse_not()?;
        if self.curr_kind() != TokenKind::And {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.consume(TokenKind::And) {
            values.push(self.parse_not()?);
        }
        let repr = join_reprs(&values, " and ");
        Ok(Expr::new(
            ExprKind::BoolOp {
                op: BoolOpKind::And,
                values,
            },
            self.span_from(start),
            "bool",
            &repr,
        ))
    }

    // Not = "not" Not | Comparison
    fn parse_not(&mut self) -> Result<Expr> {
        let start = self.curr_span();
        if self.consume(TokenKind::Not) {
            let operand = self.parse_not()?;
            let repr = format!("not {}", operand.repr);
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op: UnaryOpKind::Not,
                    operand: Box::new(operand),
                },
                self.span_from(start),
                "bool",
                &repr,
            ));
        }
        self.parse_comparison()
    }

    // Comparison = BitOr { cmp_op BitOr }   (chained)
    fn parse_comparison(&mut self) -> Result<Expr> {
        let start = self.curr_span();
        let left = self.parse_bitor()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.match_cmp_op() {
            comparators.push(self.parse_bitor()?);
            ops.push(op);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        let mut repr = left.repr.clone();
        for (op, cmp) in ops.iter().zip(&comparators) {
            repr.push_str(&format!(" {} {}", cmp_symbol(*op), cmp.repr));
        }
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                ops,
                comparators,
            },
            self.span_from(start),
            "bool",
            &repr,
        ))
    }

    /// Consume a comparison operator if one is next. `not in` and `is not`
    /// are two-token forms.
    fn match_cmp_op(&mut self) -> Option<CmpOpKind> {
        let op = match self.curr_kind() {
            TokenKind::EqEq => CmpOpKind::Eq,
            TokenKind::NotEq => CmpOpKind::NotEq,
            TokenKind::Lt => CmpOpKind::Lt,
            TokenKind::LtEq => CmpOpKind::LtE,
            TokenKind::Gt => CmpOpKind::Gt,
            TokenKind::GtEq => CmpOpKind::GtE,
            TokenKind::In => CmpOpKind::In,
            TokenKind::Not => {
                if self.peek_kind() == TokenKind::In {
                    self.advance();
                    self.advance();
                    return Some(CmpOpKind::NotIn);
                }
                return None;
            }
            TokenKind::Is => {
                self.advance();
                if self.consume(TokenKind::Not) {
                    return Some(CmpOpKind::IsNot);
                }
                return Some(CmpOpKind::Is);
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    // BitOr = BitXor { "|" BitXor }
    fn parse_bitor(&mut self) -> Result<Expr> {
        let mut left = self.parse_bitxor()?;
        while self.curr_kind() == TokenKind::Pipe {
            self.advance();
            let right = self.parse_bitxor()?;
            left = self.make_binary(BinOpKind::BitOr, left, right)?;
        }
        Ok(left)
    }

    // BitXor = BitAnd { "^" BitAnd }
    fn parse_bitxor(&mut self) -> Result<Expr> {
        let mut left = self.parse_bitand()?;
        while self.curr_kind() == TokenKind::Caret {
            self.advance();
            let right = self.parse_bitand()?;
            left = self.make_binary(BinOpKind::BitXor, left, right)?;
        }
        Ok(left)
    }

    // BitAnd = Shift { "&" Shift }
    fn parse_bitand(&mut self) -> Result<Expr> {
        let mut left = self.parse_shift()?;
        while self.curr_kind() == TokenKind::Amp {
            self.advance();
            let right = self.parse_shift()?;
            left = self.make_binary(BinOpKind::BitAnd, left, right)?;
        }
        Ok(left)
    }

    // Shift = Additive { ("<<" | ">>") Additive }
    fn parse_shift(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.curr_kind() {
                TokenKind::Shl => BinOpKind::LShift,
                TokenKind::Shr => BinOpKind::RShift,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = self.make_binary(op, left, right)?;
        }
        Ok(left)
    }

    // Additive = Term { ("+" | "-") Term }
    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.curr_kind() {
                TokenKind::Plus => BinOpKind::Add,
                TokenKind::Minus => BinOpKind::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = self.make_binary(op, left, right)?;
        }
        Ok(left)
    }

    // Term = Factor { ("*" | "/" | "//" | "%") Factor }
    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.curr_kind() {
                TokenKind::Star => BinOpKind::Mult,
                TokenKind::Slash => BinOpKind::Div,
                TokenKind::SlashSlash => BinOpKind::FloorDiv,
                TokenKind::Percent => BinOpKind::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = self.make_binary(op, left, right)?;
        }
        Ok(left)
    }

    // Factor = ("+" | "-" | "~") Factor | Power
    fn parse_factor(&mut self) -> Result<Expr> {
        let start = self.curr_span();
        let op = match self.curr_kind() {
            TokenKind::Plus => Some(UnaryOpKind::UAdd),
            TokenKind::Minus => Some(UnaryOpKind::USub),
            TokenKind::Tilde => Some(UnaryOpKind::Invert),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_factor()?;
            let ty = match op {
                UnaryOpKind::Invert => "int64".to_string(),
                _ if types::is_numeric(&operand.resolved_type) => operand.resolved_type.clone(),
                _ => types::UNKNOWN.to_string(),
            };
            let sym = match op {
                UnaryOpKind::UAdd => "+",
                UnaryOpKind::USub => "-",
                UnaryOpKind::Invert => "~",
                UnaryOpKind::Not => "not ",
            };
            let repr = format!("{}{}", sym, operand.repr);
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op,
                    operand: Box::new(operand),
                },
                self.span_from(start),
                ty,
                &repr,
            ));
        }
        self.parse_power()
    }

    // Power = Postfix [ "**" Factor ]   (right associative)
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_postfix()?;
        if self.curr_kind() == TokenKind::StarStar {
            self.advance();
            let exp = self.parse_factor()?;
            return self.make_binary(BinOpKind::Pow, base, exp);
        }
        Ok(base)
    }

    // Postfix = Primary { "." attr | Call | Subscript }
    fn parse_postfix(&mut self) -> Result<Expr> {
        let start = self.curr_span();
        let mut expr = self.parse_primary()?;
        loop {
            match self.curr_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect(TokenKind::Ident)?.literal;
                    expr = self.attribute_expr(expr, attr, start)?;
                }
                TokenKind::LParen => {
                    expr = self.call_expr(expr, start)?;
                }
                TokenKind::LBrack => {
                    expr = self.subscript_expr(expr, start)?;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn attribute_expr(&mut self, value: Expr, attr: String, start: Span) -> Result<Expr> {
        let recv = value.resolved_type.clone();
        let ty = if recv == "Path" {
            match attr.as_str() {
                "name" | "stem" | "suffix" => "str".to_string(),
                "parent" => "Path".to_string(),
                _ => types::UNKNOWN.to_string(),
            }
        } else if value.as_name() == Some("math") && self.ctx.is_imported_module("math") {
            match attr.as_str() {
                "pi" | "e" | "tau" | "inf" | "nan" => "float64".to_string(),
                _ => types::UNKNOWN.to_string(),
            }
        } else if self.ctx.is_class(&recv) {
            self.ctx
                .field_type(&recv, &attr)
                .unwrap_or_else(|| types::UNKNOWN.to_string())
        } else {
            types::UNKNOWN.to_string()
        };
        let repr = format!("{}.{}", value.repr, attr);
        Ok(Expr::new(
            ExprKind::Attribute {
                value: Box::new(value),
                attr,
            },
            self.span_from(start),
            ty,
            &repr,
        ))
    }

    // Call = "(" [ Args ] ")"  with keyword args and generator-expression
    // arguments (normalized to a list comprehension).
    fn call_expr(&mut self, func: Expr, start: Span) -> Result<Expr> {
        self.expect(TokenKind::LParen)?;
        let mut args: Vec<Expr> = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();

        while self.curr_kind() != TokenKind::RParen {
            if self.curr_kind() == TokenKind::Ident && self.peek_kind() == TokenKind::Eq {
                let arg = self.expect(TokenKind::Ident)?.literal;
                self.expect(TokenKind::Eq)?;
                let value = self.parse_expression()?;
                keywords.push(Keyword { arg, value });
            } else {
                let arg_start = self.pos;
                let expr = self.parse_expression()?;
                if self.curr_kind() == TokenKind::For && args.is_empty() && keywords.is_empty() {
                    // f(x for y in xs) is treated as f([x for y in xs]).
                    let comp = self.finish_comprehension_call_arg(expr, arg_start)?;
                    args.push(comp);
                    break;
                }
                args.push(expr);
            }
            if !self.consume(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;

        let (ty, lowering) = self.resolve_call(&func, &args)?;
        let arg_reprs: Vec<&str> = args.iter().map(|a| a.repr.as_str()).collect();
        let repr = format!("{}({})", func.repr, arg_reprs.join(", "));
        Ok(Expr::new(
            ExprKind::Call {
                func: Box::new(func),
                args,
                keywords,
                lowering,
            },
            self.span_from(start),
            ty,
            &repr,
        ))
    }

    /// A generator expression appearing as the sole call argument. The
    /// clauses are parsed, the element is re-parsed under their bindings,
    /// and the whole thing becomes a ListComp.
    fn finish_comprehension_call_arg(&mut self, first: Expr, elt_start: usize) -> Result<Expr> {
        let generators = self.parse_comp_clauses()?;
        let elt = self.reparse_with_bindings(elt_start, &generators)?;
        let ty = format!("list[{}]", elt.resolved_type);
        let repr = format!("[{} ...]", elt.repr);
        let mut expr = Expr::synthesized(
            ExprKind::ListComp {
                elt: Box::new(elt),
                generators,
            },
            ty,
            &repr,
        );
        expr.source_span = first.source_span;
        Ok(expr)
    }

    fn subscript_expr(&mut self, value: Expr, start: Span) -> Result<Expr> {
        self.expect(TokenKind::LBrack)?;

        let lower = if matches!(self.curr_kind(), TokenKind::Colon) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        if self.consume(TokenKind::Colon) {
            let upper = if matches!(self.curr_kind(), TokenKind::RBrack | TokenKind::Colon) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            let step = if self.consume(TokenKind::Colon) && self.curr_kind() != TokenKind::RBrack {
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.expect(TokenKind::RBrack)?;
            let ty = types::slice_result(&value.resolved_type);
            let repr = format!(
                "{}[{}:{}]",
                value.repr,
                lower.as_ref().map(|e| e.repr.as_str()).unwrap_or(""),
                upper.as_ref().map(|e| e.repr.as_str()).unwrap_or("")
            );
            return Ok(Expr::new(
                ExprKind::Slice {
                    value: Box::new(value),
                    lower: lower.map(Box::new),
                    upper: upper.map(Box::new),
                    step: step.map(Box::new),
                },
                self.span_from(start),
                ty,
                &repr,
            ));
        }

        let index = match lower {
            Some(e) => e,
            None => {
                return Err(BuildError::invalid(
                    "empty subscript".to_string(),
                    Some(self.curr_span()),
                    "Provide an index or slice bounds.",
                ));
            }
        };
        self.expect(TokenKind::RBrack)?;
        let ty = types::subscript_result(&value.resolved_type);
        let repr = format!("{}[{}]", value.repr, index.repr);
        Ok(Expr::new(
            ExprKind::Subscript {
                value: Box::new(value),
                index: Box::new(index),
            },
            self.span_from(start),
            ty,
            &repr,
        ))
    }

    // Primary = literal | Name | "(" ... ")" | "[" ... "]" | "{" ... "}"
    fn parse_primary(&mut self) -> Result<Expr> {
        let start = self.curr_span();
        match self.curr_kind() {
            TokenKind::IntLit => {
                let tok = self.curr().clone();
                self.advance();
                let value = parse_int_literal(&tok)?;
                Ok(Expr::new(
                    ExprKind::Constant {
                        value: ConstValue::Int(value),
                    },
                    tok.span,
                    "int64",
                    &tok.literal,
                ))
            }
            TokenKind::FloatLit => {
                let tok = self.curr().clone();
                self.advance();
                let value: f64 = tok.literal.replace('_', "").parse().map_err(|_| {
                    BuildError::invalid(
                        format!("malformed float literal '{}'", tok.literal),
                        Some(tok.span),
                        "Use a decimal float literal, optionally with an exponent.",
                    )
                })?;
                Ok(Expr::new(
                    ExprKind::Constant {
                        value: ConstValue::Float(value),
                    },
                    tok.span,
                    "float64",
                    &tok.literal,
                ))
            }
            TokenKind::StringLit => {
                let tok = self.curr().clone();
                self.advance();
                self.string_expr(&tok)
            }
            TokenKind::True | TokenKind::False => {
                let tok = self.curr().clone();
                self.advance();
                Ok(Expr::new(
                    ExprKind::Constant {
                        value: ConstValue::Bool(tok.kind == TokenKind::True),
                    },
                    tok.span,
                    "bool",
                    &tok.literal,
                ))
            }
            TokenKind::None => {
                let tok = self.curr().clone();
                self.advance();
                Ok(Expr::new(
                    ExprKind::Constant {
                        value: ConstValue::None,
                    },
                    tok.span,
                    "None",
                    "None",
                ))
            }
            TokenKind::Ident => {
                let tok = self.curr().clone();
                self.advance();
                Ok(self.name_expr(&tok))
            }
            TokenKind::LParen => self.parse_paren_form(start),
            TokenKind::LBrack => self.parse_list_display(start),
            TokenKind::LBrace => self.parse_brace_display(start),
            TokenKind::Lambda => self.parse_lambda(),
            _ => Err(BuildError::invalid(
                format!("unexpected '{}' in expression", self.describe_curr()),
                Some(start),
                "Check the expression against the supported subset.",
            )),
        }
    }

    fn name_expr(&self, tok: &Token) -> Expr {
        let id = tok.literal.clone();
        let ty = self
            .scope
            .get(&id)
            .cloned()
            .unwrap_or_else(|| types::UNKNOWN.to_string());
        let mut expr = Expr::new(ExprKind::Name { id: id.clone() }, tok.span, ty, &id);
        if self.scope.contains_key(&id) {
            expr.borrow_kind = BorrowKind::ReadonlyRef;
        }
        expr
    }

    // "(" ")" | "(" Expression ")" | "(" Expression "," ... ")"
    fn parse_paren_form(&mut self, start: Span) -> Result<Expr> {
        self.expect(TokenKind::LParen)?;
        if self.consume(TokenKind::RParen) {
            return Ok(Expr::new(
                ExprKind::Tuple { elts: Vec::new() },
                self.span_from(start),
                "tuple[]",
                "()",
            ));
        }
        let elt_start = self.pos;
        let first = self.parse_expression()?;
        if self.curr_kind() == TokenKind::For {
            // Parenthesized generator expression, normalized like a list comp.
            let comp = self.finish_comprehension_call_arg(first, elt_start)?;
            self.expect(TokenKind::RParen)?;
            return Ok(comp);
        }
        if self.curr_kind() == TokenKind::Comma {
            let mut elts = vec![first];
            while self.consume(TokenKind::Comma) {
                if self.curr_kind() == TokenKind::RParen {
                    break;
                }
                elts.push(self.parse_expression()?);
            }
            self.expect(TokenKind::RParen)?;
            return Ok(self.tuple_expr(elts, self.span_from(start)));
        }
        self.expect(TokenKind::RParen)?;
        Ok(first)
    }

    fn tuple_expr(&self, elts: Vec<Expr>, span: Span) -> Expr {
        let parts: Vec<&str> = elts.iter().map(|e| e.resolved_type.as_str()).collect();
        let ty = format!("tuple[{}]", parts.join(", "));
        let reprs: Vec<&str> = elts.iter().map(|e| e.repr.as_str()).collect();
        let repr = format!("({})", reprs.join(", "));
        Expr::new(ExprKind::Tuple { elts }, span, ty, &repr)
    }

    // "[" "]" | "[" Expression ("," Expression)* "]" | "[" Expression Comp "]"
    fn parse_list_display(&mut self, start: Span) -> Result<Expr> {
        self.expect(TokenKind::LBrack)?;
        if self.consume(TokenKind::RBrack) {
            return Ok(Expr::new(
                ExprKind::List { elts: Vec::new() },
                self.span_from(start),
                "list[unknown]",
                "[]",
            ));
        }

        let elt_start = self.pos;
        let first = self.parse_expression()?;

        if self.curr_kind() == TokenKind::For {
            let generators = self.parse_comp_clauses()?;
            let elt = self.reparse_with_bindings(elt_start, &generators)?;
            self.expect(TokenKind::RBrack)?;
            let ty = format!("list[{}]", elt.resolved_type);
            let repr = format!("[{} for ...]", elt.repr);
            return Ok(Expr::new(
                ExprKind::ListComp {
                    elt: Box::new(elt),
                    generators,
                },
                self.span_from(start),
                ty,
                &repr,
            ));
        }

        let mut elts = vec![first];
        while self.consume(TokenKind::Comma) {
            if self.curr_kind() == TokenKind::RBrack {
                break;
            }
            elts.push(self.parse_expression()?);
        }
        self.expect(TokenKind::RBrack)?;

        let elem = unify_element_types(&elts);
        let reprs: Vec<&str> = elts.iter().map(|e| e.repr.as_str()).collect();
        let repr = format!("[{}]", reprs.join(", "));
        Ok(Expr::new(
            ExprKind::List { elts },
            self.span_from(start),
            format!("list[{}]", elem),
            &repr,
        ))
    }

    // "{" "}" | dict display | set display | dict comp | set comp
    fn parse_brace_display(&mut self, start: Span) -> Result<Expr> {
        self.expect(TokenKind::LBrace)?;
        if self.consume(TokenKind::RBrace) {
            return Ok(Expr::new(
                ExprKind::Dict {
                    keys: Vec::new(),
                    values: Vec::new(),
                },
                self.span_from(start),
                "dict[unknown, unknown]",
                "{}",
            ));
        }

        let key_start = self.pos;
        let first = self.parse_expression()?;

        if self.consume(TokenKind::Colon) {
            let value_start = self.pos;
            let first_value = self.parse_expression()?;

            if self.curr_kind() == TokenKind::For {
                let generators = self.parse_comp_clauses()?;
                let key = self.reparse_with_bindings(key_start, &generators)?;
                let value = self.reparse_with_bindings(value_start, &generators)?;
                self.expect(TokenKind::RBrace)?;
                let ty = format!("dict[{}, {}]", key.resolved_type, value.resolved_type);
                let repr = format!("{{{}: {} for ...}}", key.repr, value.repr);
                return Ok(Expr::new(
                    ExprKind::DictComp {
                        key: Box::new(key),
                        value: Box::new(value),
                        generators,
                    },
                    self.span_from(start),
                    ty,
                    &repr,
                ));
            }

            let mut keys = vec![first];
            let mut values = vec![first_value];
            while self.consume(TokenKind::Comma) {
                if self.curr_kind() == TokenKind::RBrace {
                    break;
                }
                keys.push(self.parse_expression()?);
                self.expect(TokenKind::Colon)?;
                values.push(self.parse_expression()?);
            }
            self.expect(TokenKind::RBrace)?;
            let kt = unify_element_types(&keys);
            let vt = unify_element_types(&values);
            let pairs: Vec<String> = keys
                .iter()
                .zip(&values)
                .map(|(k, v)| format!("{}: {}", k.repr, v.repr))
                .collect();
            let repr = format!("{{{}}}", pairs.join(", "));
            return Ok(Expr::new(
                ExprKind::Dict { keys, values },
                self.span_from(start),
                format!("dict[{}, {}]", kt, vt),
                &repr,
            ));
        }

        if self.curr_kind() == TokenKind::For {
            let generators = self.parse_comp_clauses()?;
            let elt = self.reparse_with_bindings(key_start, &generators)?;
            self.expect(TokenKind::RBrace)?;
            let ty = format!("set[{}]", elt.resolved_type);
            let repr = format!("{{{} for ...}}", elt.repr);
            return Ok(Expr::new(
                ExprKind::SetComp {
                    elt: Box::new(elt),
                    generators,
                },
                self.span_from(start),
                ty,
                &repr,
            ));
        }

        let mut elts = vec![first];
        while self.consume(TokenKind::Comma) {
            if self.curr_kind() == TokenKind::RBrace {
                break;
            }
            elts.push(self.parse_expression()?);
        }
        self.expect(TokenKind::RBrace)?;
        let elem = unify_element_types(&elts);
        let reprs: Vec<&str> = elts.iter().map(|e| e.repr.as_str()).collect();
        let repr = format!("{{{}}}", reprs.join(", "));
        Ok(Expr::new(
            ExprKind::Set { elts },
            self.span_from(start),
            format!("set[{}]", elem),
            &repr,
        ))
    }

    // ---- comprehensions -------------------------------------------------

    /// Parse `for target in iter [if cond]*` clauses. Each clause's target
    /// bindings are inserted into the scope before its filters (and any
    /// following clause) are parsed, so nested clauses are fully typed.
    fn parse_comp_clauses(&mut self) -> Result<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while self.curr_kind() == TokenKind::For {
            self.advance();
            let (mut target, target_names) = self.parse_comp_target()?;
            self.expect(TokenKind::In)?;
            let iter = self.parse_or()?;
            let iter = self.maybe_lower_range(iter)?;

            self.bind_comp_target(&mut target, &target_names, &iter.resolved_type)?;

            let mut ifs = Vec::new();
            while self.curr_kind() == TokenKind::If {
                self.advance();
                ifs.push(self.parse_or()?);
            }
            generators.push(Comprehension { target, iter, ifs });
        }
        Ok(generators)
    }

    /// Comprehension target: a name or a (possibly parenthesized) tuple of
    /// names.
    fn parse_comp_target(&mut self) -> Result<(Expr, Vec<String>)> {
        let start = self.curr_span();
        let parens = self.consume(TokenKind::LParen);
        let mut names = Vec::new();
        loop {
            let tok = self.expect(TokenKind::Ident)?;
            names.push(tok.literal);
            if !self.consume(TokenKind::Comma) {
                break;
            }
        }
        if parens {
            self.expect(TokenKind::RParen)?;
        }
        let expr = if names.len() == 1 {
            Expr::new(
                ExprKind::Name {
                    id: names[0].clone(),
                },
                self.span_from(start),
                types::UNKNOWN,
                &names[0],
            )
        } else {
            let elts: Vec<Expr> = names
                .iter()
                .map(|n| Expr::synthesized(ExprKind::Name { id: n.clone() }, types::UNKNOWN, n))
                .collect();
            let repr = names.join(", ");
            Expr::new(
                ExprKind::Tuple { elts },
                self.span_from(start),
                types::UNKNOWN,
                &repr,
            )
        };
        Ok((expr, names))
    }

    /// Bind comprehension target names to the iterable's element type and
    /// retype the target expression accordingly.
    fn bind_comp_target(
        &mut self,
        target: &mut Expr,
        names: &[String],
        iter_ty: &str,
    ) -> Result<()> {
        let elem = types::element_type(iter_ty);
        if names.len() == 1 {
            let ty = elem.unwrap_or_else(|| types::UNKNOWN.to_string());
            self.scope.insert(names[0].clone(), ty.clone());
            target.resolved_type = ty;
            return Ok(());
        }

        let elem_ty = elem.unwrap_or_else(|| types::UNKNOWN.to_string());
        let per_name = types::tuple_elements(&elem_ty).unwrap_or_default();
        let mut parts = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let ty = per_name
                .get(i)
                .cloned()
                .unwrap_or_else(|| types::UNKNOWN.to_string());
            self.scope.insert(name.clone(), ty.clone());
            parts.push(ty.clone());
            if let ExprKind::Tuple { elts } = &mut target.kind {
                if let Some(e) = elts.get_mut(i) {
                    e.resolved_type = ty;
                }
            }
        }
        target.resolved_type = format!("tuple[{}]", parts.join(", "));
        Ok(())
    }

    /// Re-parse the token range beginning at `from_pos` now that the
    /// comprehension bindings are in scope. The range was already parsed
    /// once, so this cannot fail differently; position is restored from the
    /// first parse.
    fn reparse_with_bindings(
        &mut self,
        from_pos: usize,
        _generators: &[Comprehension],
    ) -> Result<Expr> {
        let save = self.pos;
        let save_span = self.last_span;
        self.pos = from_pos;
        let expr = self.parse_expression()?;
        self.pos = save;
        self.last_span = save_span;
        Ok(expr)
    }

    /// Replace `range(...)` iterables with an explicit RangeExpr plan.
    pub fn maybe_lower_range(&self, iter: Expr) -> Result<Expr> {
        let is_range = matches!(
            &iter.kind,
            ExprKind::Call { func, .. } if func.as_name() == Some("range")
        );
        if !is_range {
            return Ok(iter);
        }
        let (args, span, repr) = match iter.kind {
            ExprKind::Call { args, .. } => (args, iter.source_span, iter.repr),
            _ => unreachable!(),
        };
        let (start, stop, step, mode) = range_plan(args, span)?;
        let mut expr = Expr::synthesized(
            ExprKind::RangeExpr {
                start: Box::new(start),
                stop: Box::new(stop),
                step: Box::new(step),
                range_mode: mode,
            },
            "range",
            &repr,
        );
        expr.source_span = span;
        Ok(expr)
    }

    // ---- strings --------------------------------------------------------

    fn string_expr(&mut self, tok: &Token) -> Result<Expr> {
        let (prefix, body) = split_string_token(&tok.literal);
        let raw = prefix.contains('r');
        let is_bytes = prefix.contains('b');
        let is_fstring = prefix.contains('f');

        if is_fstring {
            return self.fstring_expr(tok, body, raw);
        }

        if is_bytes {
            // \xNN in a bytes literal is a raw byte, not a Unicode scalar.
            let data = if raw {
                body.as_bytes().to_vec()
            } else {
                decode_byte_escapes(body)
            };
            return Ok(Expr::new(
                ExprKind::Constant {
                    value: ConstValue::Bytes(data),
                },
                tok.span,
                "bytes",
                &tok.literal,
            ));
        }

        let decoded = if raw {
            body.to_string()
        } else {
            decode_escapes(body)
        };
        Ok(Expr::new(
            ExprKind::Constant {
                value: ConstValue::Str(decoded),
            },
            tok.span,
            "str",
            &tok.literal,
        ))
    }

    /// Explode an f-string body into literal and FormattedValue segments.
    fn fstring_expr(&mut self, tok: &Token, body: &str, raw: bool) -> Result<Expr> {
        let mut values: Vec<Expr> = Vec::new();
        let mut literal = String::new();
        let chars: Vec<char> = body.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let ch = chars[i];
            if ch == '{' && chars.get(i + 1) == Some(&'{') {
                literal.push('{');
                i += 2;
                continue;
            }
            if ch == '}' && chars.get(i + 1) == Some(&'}') {
                literal.push('}');
                i += 2;
                continue;
            }
            if ch == '}' {
                return Err(BuildError::invalid(
                    "single '}' in f-string".to_string(),
                    Some(tok.span),
                    "Escape it as '}}'.",
                ));
            }
            if ch == '{' {
                if !literal.is_empty() {
                    let text = std::mem::take(&mut literal);
                    let text = if raw { text } else { decode_escapes(&text) };
                    values.push(fstring_literal(text, tok.span));
                }
                let (placeholder, consumed) = scan_placeholder(&chars[i + 1..], tok.span)?;
                i += 1 + consumed;
                values.push(self.formatted_value(&placeholder, tok.span)?);
                continue;
            }
            literal.push(ch);
            i += 1;
        }
        if !literal.is_empty() {
            let text = if raw { literal } else { decode_escapes(&literal) };
            values.push(fstring_literal(text, tok.span));
        }

        Ok(Expr::new(
            ExprKind::JoinedStr { values },
            tok.span,
            "str",
            &tok.literal,
        ))
    }

    /// Parse one `{expr[!conv][:spec]}` placeholder body.
    fn formatted_value(&mut self, body: &str, span: Span) -> Result<Expr> {
        let (expr_text, conversion, format_spec) = split_placeholder(body);
        if expr_text.trim().is_empty() {
            return Err(BuildError::invalid(
                "empty f-string placeholder".to_string(),
                Some(span),
                "Put an expression between the braces.",
            ));
        }
        let value = ExprParser::parse_text(expr_text, span.lineno, self.ctx, &self.scope)?;
        let repr = format!("{{{}}}", body);
        let mut expr = Expr::new(
            ExprKind::FormattedValue {
                value: Box::new(value),
                conversion,
                format_spec,
            },
            span,
            "str",
            &repr,
        );
        expr.source_span = Some(span);
        Ok(expr)
    }

    // ---- binary construction with promotion -----------------------------

    fn make_binary(&self, op: BinOpKind, left: Expr, right: Expr) -> Result<Expr> {
        let lt = left.resolved_type.clone();
        let rt = right.resolved_type.clone();
        let span = left
            .source_span
            .unwrap_or(self.last_span)
            .to(right.source_span.unwrap_or(self.last_span));
        let repr = format!("{} {} {}", left.repr, op.symbol(), right.repr);

        // Non-numeric operator overloads handled before numeric promotion.
        let special = match op {
            BinOpKind::Add => {
                if lt == "str" && rt == "str" {
                    // Literal/f-string concatenation folds into one JoinedStr.
                    if let Some(folded) = fold_str_concat(&left, &right) {
                        return Ok(folded);
                    }
                    Some("str".to_string())
                } else if lt == "bytes" && rt == "bytes" {
                    Some("bytes".to_string())
                } else if types::generic_head(&lt) == "list" && lt == rt {
                    Some(lt.clone())
                } else {
                    None
                }
            }
            BinOpKind::Mult => {
                if lt == "str" && types::is_int(&rt) {
                    Some("str".to_string())
                } else if rt == "str" && types::is_int(&lt) {
                    Some("str".to_string())
                } else if types::generic_head(&lt) == "list" && types::is_int(&rt) {
                    Some(lt.clone())
                } else {
                    None
                }
            }
            BinOpKind::Div => {
                if lt == "Path" && (rt == "str" || rt == "Path") {
                    Some("Path".to_string())
                } else {
                    None
                }
            }
            BinOpKind::Mod => {
                // printf-style string formatting
                if lt == "str" {
                    Some("str".to_string())
                } else {
                    None
                }
            }
            _ => None,
        };

        let (ty, casts) = match special {
            Some(ty) => (ty, Vec::new()),
            None => types::promote_binary(op, &lt, &rt),
        };

        if ty == types::UNKNOWN
            && lt != types::UNKNOWN
            && rt != types::UNKNOWN
            && !(types::is_numeric(&lt) && types::is_numeric(&rt))
        {
            return Err(BuildError::conflict(
                format!("operator '{}' is not defined for {} and {}", op.symbol(), lt, rt),
                Some(span),
                "Convert one operand so both sides have a compatible type.",
            ));
        }

        let mut expr = Expr::new(
            ExprKind::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
            ty,
            &repr,
        );
        expr.casts = casts;
        Ok(expr)
    }

    // ---- call resolution ------------------------------------------------

    /// Determine a call's result type and, for recognized builtins and
    /// methods, its runtime lowering.
    fn resolve_call(
        &self,
        func: &Expr,
        args: &[Expr],
    ) -> Result<(String, Option<BuiltinLowering>)> {
        if let Some(name) = func.as_name() {
            if !self.scope.contains_key(name) {
                if let Some((ty, runtime)) = builtin_call(name, args) {
                    return Ok((ty, Some(BuiltinLowering::call(name, &runtime))));
                }
                if self.ctx.is_class(name) {
                    return Ok((name.to_string(), None));
                }
                if let Some(ret) = self.ctx.fn_return(name) {
                    return Ok((ret, None));
                }
            }
            if let Some(ty) = self.scope.get(name) {
                if let Some(ret) = types::callable_return(ty) {
                    return Ok((ret, None));
                }
            }
            return Ok((types::UNKNOWN.to_string(), None));
        }

        if let ExprKind::Attribute { value, attr } = &func.kind {
            let recv = value.resolved_type.as_str();
            if let Some((ty, runtime)) = method_call(recv, attr) {
                return Ok((ty, Some(BuiltinLowering::call(attr, &runtime))));
            }
            if self.ctx.is_class(recv) {
                if let Some(ret) = self.ctx.method_return(recv, attr) {
                    return Ok((ret, None));
                }
            }
            // Module-qualified calls: math.sqrt(x) and friends.
            if let Some(module) = value.as_name() {
                if self.ctx.is_imported_module(module) {
                    if module == "math" {
                        let runtime = format!("py_math_{}", attr);
                        return Ok(("float64".to_string(), Some(BuiltinLowering::call(attr, &runtime))));
                    }
                    return Ok((types::UNKNOWN.to_string(), None));
                }
            }
            return Ok((types::UNKNOWN.to_string(), None));
        }

        Ok((types::UNKNOWN.to_string(), None))
    }
}

/// Result type and runtime symbol for recognized builtin calls.
fn builtin_call(name: &str, args: &[Expr]) -> Option<(String, String)> {
    let arg_ty = |i: usize| -> String {
        args.get(i)
            .map(|a| a.resolved_type.clone())
            .unwrap_or_else(|| types::UNKNOWN.to_string())
    };
    let elem = |i: usize| -> String {
        args.get(i)
            .and_then(|a| types::element_type(&a.resolved_type))
            .unwrap_or_else(|| types::UNKNOWN.to_string())
    };
    let ty = match name {
        "print" => "None".to_string(),
        "len" => "int64".to_string(),
        "range" => "range".to_string(),
        "int" => "int64".to_string(),
        "float" => "float64".to_string(),
        "str" | "repr" | "hex" | "chr" | "input" => "str".to_string(),
        "bool" => "bool".to_string(),
        "ord" => "int64".to_string(),
        "abs" => {
            let t = arg_ty(0);
            if types::is_numeric(&t) {
                t
            } else {
                types::UNKNOWN.to_string()
            }
        }
        "min" | "max" => {
            if args.len() == 1 {
                elem(0)
            } else {
                let mut t = arg_ty(0);
                for a in &args[1..] {
                    t = types::unify(&t, &a.resolved_type);
                }
                t
            }
        }
        "sum" => {
            let e = elem(0);
            if types::is_float(&e) {
                "float64".to_string()
            } else {
                "int64".to_string()
            }
        }
        "any" | "all" => "bool".to_string(),
        "sorted" | "reversed" => {
            let t = arg_ty(0);
            if types::generic_head(&t) == "list" {
                t
            } else {
                format!("list[{}]", elem(0))
            }
        }
        "iter" => format!("iterator[{}]", elem(0)),
        "next" => elem(0),
        "enumerate" => format!("list[tuple[int64, {}]]", elem(0)),
        "zip" => format!("list[tuple[{}, {}]]", elem(0), elem(1)),
        "list" => {
            if args.is_empty() {
                "list[unknown]".to_string()
            } else {
                format!("list[{}]", elem(0))
            }
        }
        "set" => {
            if args.is_empty() {
                "set[unknown]".to_string()
            } else {
                format!("set[{}]", elem(0))
            }
        }
        "dict" => "dict[unknown, unknown]".to_string(),
        "tuple" => format!("tuple[{}]", elem(0)),
        "bytes" => "bytes".to_string(),
        "bytearray" => "bytearray".to_string(),
        "round" => {
            if args.len() >= 2 {
                "float64".to_string()
            } else {
                "int64".to_string()
            }
        }
        "divmod" => "tuple[int64, int64]".to_string(),
        "isinstance" => "bool".to_string(),
        "open" => "PyFile".to_string(),
        "Path" => "Path".to_string(),
        "Exception" | "RuntimeError" | "ValueError" | "TypeError" | "KeyError" | "IndexError"
        | "NotImplementedError" => "Exception".to_string(),
        _ => return None,
    };
    let runtime = match name {
        "Path" => "py_path_new".to_string(),
        "Exception" | "RuntimeError" | "ValueError" | "TypeError" | "KeyError" | "IndexError"
        | "NotImplementedError" => "py_exception_new".to_string(),
        _ => format!("py_{}", name),
    };
    Some((ty, runtime))
}

/// Result type and runtime symbol for recognized method calls, keyed by the
/// receiver's resolved type head.
fn method_call(recv: &str, attr: &str) -> Option<(String, String)> {
    let head = types::generic_head(recv);
    let elem = || {
        types::element_type(recv).unwrap_or_else(|| types::UNKNOWN.to_string())
    };
    let ty = match (head, attr) {
        ("str", "strip" | "lstrip" | "rstrip" | "upper" | "lower" | "replace" | "zfill"
            | "format" | "join" | "title" | "capitalize") => "str".to_string(),
        ("str", "startswith" | "endswith" | "isdigit" | "isalpha" | "isspace" | "isupper"
            | "islower") => "bool".to_string(),
        ("str", "split" | "rsplit" | "splitlines") => "list[str]".to_string(),
        ("str", "find" | "rfind" | "index" | "count") => "int64".to_string(),
        ("str", "encode") => "bytes".to_string(),

        ("list", "append" | "extend" | "insert" | "clear" | "reverse" | "sort" | "remove") => {
            "None".to_string()
        }
        ("list", "pop") => elem(),
        ("list", "index" | "count") => "int64".to_string(),
        ("list", "copy") => recv.to_string(),

        ("set", "add" | "discard" | "remove" | "clear" | "update") => "None".to_string(),
        ("set", "pop") => elem(),

        ("dict", "get" | "pop" | "setdefault") => {
            types::dict_value_type(recv).unwrap_or_else(|| types::UNKNOWN.to_string())
        }
        ("dict", "keys") => format!(
            "list[{}]",
            types::element_type(recv).unwrap_or_else(|| types::UNKNOWN.to_string())
        ),
        ("dict", "values") => format!(
            "list[{}]",
            types::dict_value_type(recv).unwrap_or_else(|| types::UNKNOWN.to_string())
        ),
        ("dict", "items") => {
            let k = types::element_type(recv).unwrap_or_else(|| types::UNKNOWN.to_string());
            let v = types::dict_value_type(recv).unwrap_or_else(|| types::UNKNOWN.to_string());
            format!("list[tuple[{}, {}]]", k, v)
        }
        ("dict", "clear" | "update") => "None".to_string(),

        ("Path", "exists" | "is_file" | "is_dir") => "bool".to_string(),
        ("Path", "read_text") => "str".to_string(),
        ("Path", "read_bytes") => "bytes".to_string(),
        ("Path", "write_text" | "write_bytes" | "mkdir" | "unlink") => "None".to_string(),
        ("Path", "glob" | "iterdir") => "list[Path]".to_string(),
        ("Path", "with_suffix" | "joinpath" | "resolve" | "absolute") => "Path".to_string(),

        ("bytes" | "bytearray", "decode") => "str".to_string(),
        ("bytes" | "bytearray", "hex") => "str".to_string(),
        ("bytearray", "append" | "extend") => "None".to_string(),

        ("int64" | "uint64" | "int32" | "uint32" | "int16" | "uint16" | "int8" | "uint8", "to_bytes") => {
            "bytes".to_string()
        }

        ("PyFile", "read" | "readline") => "str".to_string(),
        ("PyFile", "readlines") => "list[str]".to_string(),
        ("PyFile", "write" | "close") => "None".to_string(),

        _ => return None,
    };
    let runtime = match head {
        "str" => format!("py_str_{}", attr),
        "list" => format!("py_list_{}", attr),
        "set" => format!("py_set_{}", attr),
        "dict" => format!("py_dict_{}", attr),
        "Path" => format!("py_path_{}", attr),
        "bytes" | "bytearray" => format!("py_bytes_{}", attr),
        "PyFile" => format!("py_file_{}", attr),
        _ => format!("py_int_{}", attr),
    };
    Some((ty, runtime))
}

/// Fold `"a" + f"b{x}"`-style concatenations of string parts into a single
/// JoinedStr so downstream consumers see one formatting unit.
fn fold_str_concat(left: &Expr, right: &Expr) -> Option<Expr> {
    let is_part = |e: &Expr| {
        matches!(
            e.kind,
            ExprKind::JoinedStr { .. } | ExprKind::Constant { value: ConstValue::Str(_) }
        )
    };
    if !is_part(left) || !is_part(right) {
        return None;
    }
    if !matches!(left.kind, ExprKind::JoinedStr { .. })
        && !matches!(right.kind, ExprKind::JoinedStr { .. })
    {
        return None;
    }
    let mut values = Vec::new();
    for side in [left, right] {
        match &side.kind {
            ExprKind::JoinedStr { values: vs } => values.extend(vs.iter().cloned()),
            _ => values.push(side.clone()),
        }
    }
    let repr = format!("{} + {}", left.repr, right.repr);
    let mut expr = Expr::synthesized(ExprKind::JoinedStr { values }, "str", &repr);
    expr.source_span = left.source_span;
    Some(expr)
}

fn join_reprs(values: &[Expr], sep: &str) -> String {
    values
        .iter()
        .map(|v| v.repr.as_str())
        .collect::<Vec<_>>()
        .join(sep)
}

fn cmp_symbol(op: CmpOpKind) -> &'static str {
    match op {
        CmpOpKind::Eq => "==",
        CmpOpKind::NotEq => "!=",
        CmpOpKind::Lt => "<",
        CmpOpKind::LtE => "<=",
        CmpOpKind::Gt => ">",
        CmpOpKind::GtE => ">=",
        CmpOpKind::In => "in",
        CmpOpKind::NotIn => "not in",
        CmpOpKind::Is => "is",
        CmpOpKind::IsNot => "is not",
    }
}

fn unify_element_types(elts: &[Expr]) -> String {
    let mut iter = elts.iter();
    let first = match iter.next() {
        Some(e) => e.resolved_type.clone(),
        None => return types::UNKNOWN.to_string(),
    };
    for e in iter {
        if e.resolved_type != first {
            return types::UNKNOWN.to_string();
        }
    }
    first
}

fn fstring_literal(text: String, span: Span) -> Expr {
    let repr = text.clone();
    Expr::new(
        ExprKind::Constant {
            value: ConstValue::Str(text),
        },
        span,
        "str",
        &repr,
    )
}

fn parse_int_literal(tok: &Token) -> Result<i64> {
    let text = tok.literal.replace('_', "");
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8)
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2)
    } else {
        text.parse()
    };
    parsed.map_err(|_| {
        BuildError::invalid(
            format!("malformed integer literal '{}'", tok.literal),
            Some(tok.span),
            "Integer literals must fit in a signed 64-bit value.",
        )
    })
}

/// Split a raw string token into (prefix, body-without-quotes).
fn split_string_token(literal: &str) -> (String, &str) {
    let prefix_len = literal.find(|c| c == '"' || c == '\'').unwrap_or(0);
    let prefix: String = literal[..prefix_len].to_ascii_lowercase();
    let rest = &literal[prefix_len..];
    let body = if rest.len() >= 6 && (rest.starts_with("\"\"\"") || rest.starts_with("'''")) {
        &rest[3..rest.len() - 3]
    } else if rest.len() >= 2 {
        &rest[1..rest.len() - 1]
    } else {
        ""
    };
    (prefix, body)
}

fn decode_escapes(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '\\' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let esc = chars[i + 1];
        i += 2;
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'x' => {
                let hex: String = chars[i..].iter().take(2).collect();
                if hex.len() == 2 {
                    if let Ok(v) = u8::from_str_radix(&hex, 16) {
                        out.push(v as char);
                        i += 2;
                        continue;
                    }
                }
                out.push('\\');
                out.push('x');
            }
            'u' => {
                let hex: String = chars[i..].iter().take(4).collect();
                let decoded = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32);
                match decoded {
                    Some(c) if hex.len() == 4 => {
                        out.push(c);
                        i += 4;
                    }
                    _ => {
                        out.push('\\');
                        out.push('u');
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

fn decode_byte_escapes(body: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 >= bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let esc = bytes[i + 1];
        i += 2;
        match esc {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'0' => out.push(0),
            b'\\' => out.push(b'\\'),
            b'\'' => out.push(b'\''),
            b'"' => out.push(b'"'),
            b'x' => {
                let hex = bytes.get(i..i + 2).and_then(|h| std::str::from_utf8(h).ok());
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(v) => {
                        out.push(v);
                        i += 2;
                    }
                    None => out.extend_from_slice(b"\\x"),
                }
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
    }
    out
}

/// Scan an f-string placeholder from just after `{` to its matching `}`.
/// Returns the body text and the number of chars consumed including the
/// closing brace.
fn scan_placeholder(chars: &[char], span: Span) -> Result<(String, usize)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut body = String::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if let Some(q) = quote {
            body.push(ch);
            if ch == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                body.push(ch);
            }
            '(' | '[' | '{' => {
                depth += 1;
                body.push(ch);
            }
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                body.push(ch);
            }
            '}' => {
                if depth == 0 {
                    return Ok((body, i + 1));
                }
                depth -= 1;
                body.push(ch);
            }
            _ => body.push(ch),
        }
        i += 1;
    }
    Err(BuildError::invalid(
        "unclosed f-string placeholder".to_string(),
        Some(span),
        "Add the closing '}'.",
    ))
}

/// Split a placeholder body into (expr, !conversion, :format_spec).
fn split_placeholder(body: &str) -> (&str, Option<String>, Option<String>) {
    let chars: Vec<char> = body.chars().collect();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut colon = None;
    let mut bang = None;
    for (i, &ch) in chars.iter().enumerate() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 && colon.is_none() => colon = Some(i),
            '!' if depth == 0
                && bang.is_none()
                && colon.is_none()
                && chars.get(i + 1) != Some(&'=') =>
            {
                bang = Some(i)
            }
            _ => {}
        }
    }
    let spec = colon.map(|c| body[c + 1..].to_string());
    let expr_end = bang.or(colon).unwrap_or(body.len());
    let conversion = bang.map(|b| {
        let end = colon.unwrap_or(body.len());
        body[b + 1..end].to_string()
    });
    (&body[..expr_end], conversion, spec)
}

pub(crate) fn expr_children_mut(expr: &mut Expr) -> Vec<&mut Expr> {
    match &mut expr.kind {
        ExprKind::Name { .. } | ExprKind::Constant { .. } => Vec::new(),
        ExprKind::BinOp { left, right, .. } => vec![left, right],
        ExprKind::UnaryOp { operand, .. } => vec![operand],
        ExprKind::BoolOp { values, .. } => values.iter_mut().collect(),
        ExprKind::Compare {
            left, comparators, ..
        } => {
            let mut v: Vec<&mut Expr> = vec![left];
            v.extend(comparators.iter_mut());
            v
        }
        ExprKind::Call {
            func,
            args,
            keywords,
            ..
        } => {
            let mut v: Vec<&mut Expr> = vec![func];
            v.extend(args.iter_mut());
            v.extend(keywords.iter_mut().map(|k| &mut k.value));
            v
        }
        ExprKind::Attribute { value, .. } => vec![value],
        ExprKind::Subscript { value, index } => vec![value, index],
        ExprKind::Slice {
            value,
            lower,
            upper,
            step,
        } => {
            let mut v: Vec<&mut Expr> = vec![value];
            v.extend(lower.iter_mut().map(|b| b.as_mut()));
            v.extend(upper.iter_mut().map(|b| b.as_mut()));
            v.extend(step.iter_mut().map(|b| b.as_mut()));
            v
        }
        ExprKind::List { elts } | ExprKind::Set { elts } | ExprKind::Tuple { elts } => {
            elts.iter_mut().collect()
        }
        ExprKind::Dict { keys, values } => keys.iter_mut().chain(values.iter_mut()).collect(),
        ExprKind::Lambda { params, body } => {
            let mut v: Vec<&mut Expr> = params
                .iter_mut()
                .filter_map(|p| p.default.as_mut())
                .collect();
            v.push(body);
            v
        }
        ExprKind::IfExp { test, body, orelse } => vec![test, body, orelse],
        ExprKind::JoinedStr { values } => values.iter_mut().collect(),
        ExprKind::FormattedValue { value, .. } => vec![value],
        ExprKind::ListComp { elt, generators } | ExprKind::SetComp { elt, generators } => {
            let mut v: Vec<&mut Expr> = vec![elt];
            for g in generators.iter_mut() {
                v.push(&mut g.target);
                v.push(&mut g.iter);
                v.extend(g.ifs.iter_mut());
            }
            v
        }
        ExprKind::DictComp {
            key,
            value,
            generators,
        } => {
            let mut v: Vec<&mut Expr> = vec![key, value];
            for g in generators.iter_mut() {
                v.push(&mut g.target);
                v.push(&mut g.iter);
                v.extend(g.ifs.iter_mut());
            }
            v
        }
        ExprKind::RangeExpr { start, stop, step, .. } => vec![start, stop, step],
    }
}

/// Normalize `range(...)` call arguments into a (start, stop, step) plan.
pub fn range_plan(
    mut args: Vec<Expr>,
    span: Option<Span>,
) -> Result<(Expr, Expr, Expr, RangeMode)> {
    if args.is_empty() || args.len() > 3 {
        return Err(BuildError::unsupported(
            format!("range() takes 1 to 3 positional arguments, got {}", args.len()),
            span,
            "Call range with (stop), (start, stop), or (start, stop, step).",
        ));
    }
    let (start, stop, step) = match args.len() {
        1 => {
            let stop = args.remove(0);
            (int_const(0), stop, int_const(1))
        }
        2 => {
            let stop = args.remove(1);
            let start = args.remove(0);
            (start, stop, int_const(1))
        }
        _ => {
            let step = args.remove(2);
            let stop = args.remove(1);
            let start = args.remove(0);
            (start, stop, step)
        }
    };

    let mode = match step.is_literal_int() {
        Some(0) => {
            return Err(BuildError::conflict(
                "range() step must not be zero".to_string(),
                step.source_span.or(span),
                "Use a positive step to count up or a negative step to count down.",
            ));
        }
        Some(v) if v > 0 => RangeMode::Ascending,
        Some(_) => RangeMode::Descending,
        None => RangeMode::Dynamic,
    };
    Ok((start, stop, step, mode))
}

fn int_const(v: i64) -> Expr {
    Expr::synthesized(
        ExprKind::Constant {
            value: ConstValue::Int(v),
        },
        "int64",
        &v.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConvertCtx;

    fn parse_with(src: &str, scope: &[(&str, &str)]) -> Result<Expr> {
        let ctx = ConvertCtx::default();
        let scope: HashMap<String, String> = scope
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ExprParser::parse_text(src, 1, &ctx, &scope)
    }

    fn parse(src: &str) -> Expr {
        parse_with(src, &[]).unwrap()
    }

    #[test]
    fn division_always_produces_float64() {
        let expr = parse("1 / 2");
        assert_eq!(expr.resolved_type, "float64");
        assert_eq!(expr.casts.len(), 2);
        assert_eq!(expr.casts[0].on, "left");
        assert_eq!(expr.casts[0].from, "int64");
        assert_eq!(expr.casts[0].to, "float64");
        assert_eq!(expr.casts[0].reason, "numeric_promotion");
        assert_eq!(expr.casts[1].on, "right");
    }

    #[test]
    fn int_addition_needs_no_casts() {
        let expr = parse_with("a + b", &[("a", "int64"), ("b", "int64")]).unwrap();
        assert_eq!(expr.resolved_type, "int64");
        assert!(expr.casts.is_empty());
    }

    #[test]
    fn floor_division_stays_integral_only_for_ints() {
        assert_eq!(parse("7 // 2").resolved_type, "int64");
        assert_eq!(parse("7.0 // 2").resolved_type, "float64");
    }

    #[test]
    fn mixed_width_ints_widen() {
        let expr = parse_with("a + b", &[("a", "int32"), ("b", "int64")]).unwrap();
        assert_eq!(expr.resolved_type, "int64");
        assert_eq!(expr.casts.len(), 1);
        assert_eq!(expr.casts[0].on, "left");
    }

    #[test]
    fn power_is_right_associative() {
        let expr = parse("2 ** 3 ** 2");
        match expr.kind {
            ExprKind::BinOp { op, right, .. } => {
                assert_eq!(op, BinOpKind::Pow);
                assert!(matches!(
                    right.kind,
                    ExprKind::BinOp {
                        op: BinOpKind::Pow,
                        ..
                    }
                ));
            }
            other => panic!("expected BinOp, got {:?}", other),
        }
    }

    #[test]
    fn chained_comparison_is_one_node() {
        let expr = parse_with("1 < x < 10", &[("x", "int64")]).unwrap();
        assert_eq!(expr.resolved_type, "bool");
        match expr.kind {
            ExprKind::Compare {
                ops, comparators, ..
            } => {
                assert_eq!(ops, vec![CmpOpKind::Lt, CmpOpKind::Lt]);
                assert_eq!(comparators.len(), 2);
            }
            other => panic!("expected Compare, got {:?}", other),
        }
    }

    #[test]
    fn membership_and_identity_operators() {
        let expr = parse_with("x not in xs", &[("x", "int64"), ("xs", "list[int64]")]).unwrap();
        match expr.kind {
            ExprKind::Compare { ops, .. } => assert_eq!(ops, vec![CmpOpKind::NotIn]),
            other => panic!("expected Compare, got {:?}", other),
        }
        let expr = parse_with("x is not y", &[("x", "str"), ("y", "str")]).unwrap();
        match expr.kind {
            ExprKind::Compare { ops, .. } => assert_eq!(ops, vec![CmpOpKind::IsNot]),
            other => panic!("expected Compare, got {:?}", other),
        }
    }

    #[test]
    fn string_concat_has_no_casts() {
        let expr = parse("\"a\" + \"b\"");
        assert_eq!(expr.resolved_type, "str");
        assert!(expr.casts.is_empty());
    }

    #[test]
    fn string_repetition() {
        assert_eq!(parse("\"ab\" * 3").resolved_type, "str");
    }

    #[test]
    fn mismatched_operands_conflict() {
        let err = parse_with("x + \"a\"", &[("x", "int64")]).unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::SemanticConflict);
    }

    #[test]
    fn conditional_promotes_branches() {
        let expr = parse_with(
            "a if c else b",
            &[("a", "int64"), ("b", "float64"), ("c", "bool")],
        )
        .unwrap();
        assert_eq!(expr.resolved_type, "float64");
        assert_eq!(expr.casts.len(), 1);
        assert_eq!(expr.casts[0].on, "body");
    }

    #[test]
    fn builtin_call_is_lowered() {
        let expr = parse_with("len(xs)", &[("xs", "list[str]")]).unwrap();
        assert_eq!(expr.resolved_type, "int64");
        match expr.kind {
            ExprKind::Call { lowering, .. } => {
                let lowering = lowering.unwrap();
                assert_eq!(lowering.lowered_kind, "BuiltinCall");
                assert_eq!(lowering.builtin_name, "len");
                assert_eq!(lowering.runtime_call, "py_len");
            }
            other => panic!("expected Call, got {:?}", other),
        }
    }

    #[test]
    fn iter_and_next_are_lowered() {
        let expr = parse_with("next(iter(xs))", &[("xs", "list[int64]")]).unwrap();
        assert_eq!(expr.resolved_type, "int64");
        match expr.kind {
            ExprKind::Call { args, lowering, .. } => {
                assert_eq!(lowering.unwrap().runtime_call, "py_next");
                assert_eq!(args[0].resolved_type, "iterator[int64]");
                match &args[0].kind {
                    ExprKind::Call { lowering, .. } => {
                        assert_eq!(lowering.as_ref().unwrap().runtime_call, "py_iter")
                    }
                    other => panic!("expected Call, got {:?}", other),
                }
            }
            other => panic!("expected Call, got {:?}", other),
        }
    }

    #[test]
    fn method_call_is_lowered() {
        let expr = parse_with("s.upper()", &[("s", "str")]).unwrap();
        assert_eq!(expr.resolved_type, "str");
        match expr.kind {
            ExprKind::Call { lowering, .. } => {
                assert_eq!(lowering.unwrap().runtime_call, "py_str_upper");
            }
            other => panic!("expected Call, got {:?}", other),
        }
    }

    #[test]
    fn list_comprehension_binds_loop_variable() {
        let expr = parse("[i * 2 for i in range(5)]");
        assert_eq!(expr.resolved_type, "list[int64]");
        match expr.kind {
            ExprKind::ListComp { elt, generators } => {
                assert_eq!(elt.resolved_type, "int64");
                assert_eq!(generators.len(), 1);
                match &generators[0].iter.kind {
                    ExprKind::RangeExpr { range_mode, .. } => {
                        assert_eq!(*range_mode, RangeMode::Ascending)
                    }
                    other => panic!("expected RangeExpr, got {:?}", other),
                }
            }
            other => panic!("expected ListComp, got {:?}", other),
        }
    }

    #[test]
    fn dict_comprehension_types_keys_and_values() {
        let expr = parse_with("{k: len(k) for k in names}", &[("names", "list[str]")]).unwrap();
        assert_eq!(expr.resolved_type, "dict[str, int64]");
    }

    #[test]
    fn comprehension_filter_sees_binding() {
        let expr = parse_with("[c for c in s if c != \" \"]", &[("s", "str")]).unwrap();
        assert_eq!(expr.resolved_type, "list[str]");
    }

    #[test]
    fn generator_argument_element_sees_binding() {
        let expr = parse_with("sum(x * 2 for x in xs)", &[("xs", "list[int64]")]).unwrap();
        assert_eq!(expr.resolved_type, "int64");
        match expr.kind {
            ExprKind::Call { args, .. } => {
                assert_eq!(args.len(), 1);
                assert_eq!(args[0].resolved_type, "list[int64]");
                match &args[0].kind {
                    ExprKind::ListComp { elt, .. } => {
                        assert_eq!(elt.resolved_type, "int64");
                        assert!(matches!(elt.kind, ExprKind::BinOp { .. }));
                    }
                    other => panic!("expected ListComp argument, got {:?}", other),
                }
            }
            other => panic!("expected Call, got {:?}", other),
        }
    }

    #[test]
    fn zero_step_range_error_kind() {
        let ctx = ConvertCtx::default();
        let scope = HashMap::new();
        let err = ExprParser::parse_text("[i for i in range(0, 10, 0)]", 1, &ctx, &scope)
            .unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::SemanticConflict);
    }

    #[test]
    fn descending_range_mode() {
        let expr = parse("[i for i in range(10, 0, -1)]");
        match expr.kind {
            ExprKind::ListComp { generators, .. } => match &generators[0].iter.kind {
                ExprKind::RangeExpr { range_mode, .. } => {
                    assert_eq!(*range_mode, RangeMode::Descending)
                }
                other => panic!("expected RangeExpr, got {:?}", other),
            },
            other => panic!("expected ListComp, got {:?}", other),
        }
    }

    #[test]
    fn fstring_explodes_into_segments() {
        let expr = parse_with("f\"x={x:>4}!\"", &[("x", "int64")]).unwrap();
        assert_eq!(expr.resolved_type, "str");
        match expr.kind {
            ExprKind::JoinedStr { values } => {
                assert_eq!(values.len(), 3);
                assert!(matches!(values[0].kind, ExprKind::Constant { .. }));
                match &values[1].kind {
                    ExprKind::FormattedValue {
                        value, format_spec, ..
                    } => {
                        assert_eq!(value.resolved_type, "int64");
                        assert_eq!(format_spec.as_deref(), Some(">4"));
                    }
                    other => panic!("expected FormattedValue, got {:?}", other),
                }
            }
            other => panic!("expected JoinedStr, got {:?}", other),
        }
    }

    #[test]
    fn fstring_brace_escapes() {
        let expr = parse("f\"{{literal}}\"");
        match expr.kind {
            ExprKind::JoinedStr { values } => {
                assert_eq!(values.len(), 1);
                match &values[0].kind {
                    ExprKind::Constant {
                        value: ConstValue::Str(s),
                    } => assert_eq!(s, "{literal}"),
                    other => panic!("expected Constant, got {:?}", other),
                }
            }
            other => panic!("expected JoinedStr, got {:?}", other),
        }
    }

    #[test]
    fn literal_and_fstring_concat_folds() {
        let expr = parse_with("\"a=\" + f\"{a}\"", &[("a", "int64")]).unwrap();
        match expr.kind {
            ExprKind::JoinedStr { values } => assert_eq!(values.len(), 2),
            other => panic!("expected JoinedStr, got {:?}", other),
        }
    }

    #[test]
    fn lambda_gets_callable_type() {
        let expr = parse("lambda a, b: a");
        assert!(expr.resolved_type.starts_with("callable["));
        assert!(matches!(expr.kind, ExprKind::Lambda { .. }));
    }

    #[test]
    fn subscript_and_slice_results() {
        let expr = parse_with("xs[0]", &[("xs", "list[float64]")]).unwrap();
        assert_eq!(expr.resolved_type, "float64");
        let expr = parse_with("xs[1:3]", &[("xs", "list[float64]")]).unwrap();
        assert_eq!(expr.resolved_type, "list[float64]");
        let expr = parse_with("s[::2]", &[("s", "str")]).unwrap();
        assert_eq!(expr.resolved_type, "str");
    }

    #[test]
    fn path_join_with_slash() {
        let expr = parse_with("base / \"out.txt\"", &[("base", "Path")]).unwrap();
        assert_eq!(expr.resolved_type, "Path");
        assert!(expr.casts.is_empty());
    }

    #[test]
    fn bytes_literal_type() {
        let expr = parse("b\"\\x00\\x01\"");
        assert_eq!(expr.resolved_type, "bytes");
        match expr.kind {
            ExprKind::Constant {
                value: ConstValue::Bytes(bytes),
            } => assert_eq!(bytes, vec![0, 1]),
            other => panic!("expected bytes constant, got {:?}", other),
        }
    }

    #[test]
    fn bytes_hex_escape_is_a_single_byte() {
        let expr = parse("b\"\\xff\\n\"");
        match expr.kind {
            ExprKind::Constant {
                value: ConstValue::Bytes(bytes),
            } => assert_eq!(bytes, vec![0xff, b'\n']),
            other => panic!("expected bytes constant, got {:?}", other),
        }
    }

    #[test]
    fn tuple_display_types_per_element() {
        let expr = parse("(1, \"a\", 2.0)");
        assert_eq!(expr.resolved_type, "tuple[int64, str, float64]");
    }
}
