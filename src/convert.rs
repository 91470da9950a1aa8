//! Module-level conversion driver.
//!
//! Orchestrates the whole pipeline for one input file: merge physical lines,
//! pre-scan top-level signatures so forward references resolve, then parse
//! every top-level form into the typed tree. All conversion state lives in
//! an explicit `ConvertCtx` owned by this pass.

use crate::east::*;
use crate::errors::{BuildError, Result};
use crate::expr;
use crate::lexer::Lexer;
use crate::lines::{self, LogicalLine};
use crate::stmt::{extract_docstring, BlockParser, FlowTypes, Scope};
use crate::token::{Span, Token, TokenKind};
use crate::types;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Cross-statement knowledge for one conversion: function return types,
/// class layouts, imported module names. Built by the signature pre-pass
/// and refined while classes are converted.
#[derive(Debug, Default)]
pub struct ConvertCtx {
    pub fn_returns: HashMap<String, String>,
    pub class_bases: HashMap<String, Option<String>>,
    pub class_fields: HashMap<String, BTreeMap<String, String>>,
    pub class_method_returns: HashMap<String, HashMap<String, String>>,
    pub imported_modules: HashSet<String>,
}

impl ConvertCtx {
    pub fn is_class(&self, name: &str) -> bool {
        self.class_bases.contains_key(name)
    }

    pub fn fn_return(&self, name: &str) -> Option<String> {
        self.fn_returns.get(name).cloned()
    }

    pub fn is_imported_module(&self, name: &str) -> bool {
        self.imported_modules.contains(name)
    }

    /// Field type lookup walking the single-inheritance chain.
    pub fn field_type(&self, class: &str, field: &str) -> Option<String> {
        let mut current = Some(class.to_string());
        while let Some(c) = current {
            if let Some(ty) = self.class_fields.get(&c).and_then(|f| f.get(field)) {
                return Some(ty.clone());
            }
            current = self.class_bases.get(&c).cloned().flatten();
        }
        None
    }

    /// Method return type lookup walking the single-inheritance chain.
    pub fn method_return(&self, class: &str, method: &str) -> Option<String> {
        let mut current = Some(class.to_string());
        while let Some(c) = current {
            if let Some(ty) = self
                .class_method_returns
                .get(&c)
                .and_then(|m| m.get(method))
            {
                return Some(ty.clone());
            }
            current = self.class_bases.get(&c).cloned().flatten();
        }
        None
    }
}

/// Convert one source file into a typed module tree. The first error aborts
/// the conversion.
pub fn convert_source(source: &str, source_path: &str) -> Result<Module> {
    let (logical, trailing_trivia) = lines::merge(source);
    let mut ctx = ConvertCtx::default();
    prescan_signatures(&logical, &mut ctx)?;

    let mut module = Module::new(source_path);
    module.trailing_trivia = trailing_trivia;
    let mut scope = Scope::default();
    let mut flow = FlowTypes::default();
    let mut import_bindings: Vec<ImportBinding> = Vec::new();
    let mut pending_decorator: Option<(String, Vec<crate::lines::Trivia>)> = None;

    let mut idx = 0usize;
    while idx < logical.len() {
        let line = logical[idx].clone();
        if line.indent != 0 {
            return Err(BuildError::invalid(
                "unexpected indentation at module level".to_string(),
                Some(Span::point(line.start_line, line.indent + 1)),
                "Top-level statements must start in column one.",
            ));
        }
        let tokens = Lexer::new(&line.text, line.start_line).tokenize()?;

        match tokens[0].kind {
            TokenKind::At => {
                if pending_decorator.is_some() {
                    return Err(BuildError::unsupported(
                        "stacked decorators are not supported".to_string(),
                        Some(tokens[0].span),
                        "Use at most one decorator per definition.",
                    ));
                }
                let name = decorator_name(&tokens)?;
                pending_decorator = Some((name, line.trivia.clone()));
                idx += 1;
            }
            TokenKind::Import | TokenKind::From => {
                let stmt = parse_import(&tokens, &mut import_bindings, &mut ctx)?;
                module.body.push(stmt.with_trivia(line.trivia.clone()));
                idx += 1;
            }
            TokenKind::Def => {
                if let Some((deco, _)) = &pending_decorator {
                    return Err(BuildError::unsupported(
                        format!("decorator '@{}' is not supported on functions", deco),
                        Some(tokens[0].span),
                        "Only @dataclass on classes is recognized.",
                    ));
                }
                let mut parser = BlockParser::new(&logical, &ctx);
                parser.idx = idx;
                let func = parser.parse_function(&line, &tokens, &Scope::default())?;
                idx = parser.idx;

                let stmt = rename_if_main(func, &mut module);
                register_function(&stmt, &mut ctx);
                module.body.push(stmt.with_trivia(line.trivia.clone()));
            }
            TokenKind::Class => {
                let decorator = pending_decorator.take();
                let (stmt, next) = parse_class(&logical, idx, &line, &tokens, &mut ctx, decorator)?;
                module.body.push(stmt);
                idx = next;
            }
            TokenKind::If if is_main_guard(&tokens) => {
                let mut parser = BlockParser::new(&logical, &ctx);
                parser.idx = idx + 1;
                let body_indent = match logical.get(idx + 1) {
                    Some(next) if next.indent > 0 => next.indent,
                    _ => {
                        return Err(BuildError::invalid(
                            "expected an indented block".to_string(),
                            Some(Span::point(line.start_line, 1)),
                            "Indent the statements that belong to this suite.",
                        ));
                    }
                };
                let mut guard_scope = scope.clone();
                let mut body = parser.parse_block(body_indent, &mut guard_scope, &mut flow)?;
                idx = parser.idx;
                for (original, renamed) in module.renamed_symbols.clone() {
                    rename_in_stmts(&mut body, &original, &renamed);
                }
                module.main_guard_body = body;
            }
            _ => {
                if pending_decorator.is_some() {
                    return Err(BuildError::invalid(
                        "decorator not followed by a definition".to_string(),
                        Some(tokens[0].span),
                        "Put the decorated def or class directly below the decorator.",
                    ));
                }
                let mut parser = BlockParser::new(&logical, &ctx);
                parser.idx = idx;
                let stmt = parser.parse_one(&mut scope, &mut flow)?;
                idx = parser.idx;
                module.body.push(stmt);
            }
        }
    }

    if let Some((deco, _)) = pending_decorator {
        return Err(BuildError::invalid(
            format!("decorator '@{}' not followed by a definition", deco),
            None,
            "Put the decorated def or class directly below the decorator.",
        ));
    }

    if module.docstring.is_none() {
        module.docstring = extract_docstring(&mut module.body);
    }
    module.meta.import_bindings = import_bindings;
    module.meta.qualified_symbol_refs = collect_qualified_refs(&mut module, &ctx);
    Ok(module)
}

/// Pre-scan all top-level headers so later statements can reference
/// functions and classes defined further down the file.
fn prescan_signatures(lines: &[LogicalLine], ctx: &mut ConvertCtx) -> Result<()> {
    let mut i = 0usize;
    while i < lines.len() {
        let line = &lines[i];
        if line.indent != 0 {
            i += 1;
            continue;
        }
        let tokens = match Lexer::new(&line.text, line.start_line).tokenize() {
            Ok(t) => t,
            // Lexical errors surface during the real parse with full context.
            Err(_) => {
                i += 1;
                continue;
            }
        };
        match tokens[0].kind {
            TokenKind::Def => {
                if let Some((name, ret)) = scan_def_header(&line.text, &tokens) {
                    ctx.fn_returns.insert(name, ret);
                }
                i += 1;
            }
            TokenKind::Class => {
                let (name, base) = scan_class_header(&tokens)?;
                let base = base.filter(|b| !matches!(b.as_str(), "Enum" | "IntEnum" | "IntFlag"));
                ctx.class_bases.insert(name.clone(), base);
                let mut fields = BTreeMap::new();
                let mut methods = HashMap::new();
                // Scan the class suite for annotated fields and method headers.
                let mut j = i + 1;
                let body_indent = lines.get(j).map(|l| l.indent).unwrap_or(0);
                while j < lines.len() && lines[j].indent > 0 {
                    let inner = &lines[j];
                    if inner.indent == body_indent {
                        if let Ok(inner_tokens) =
                            Lexer::new(&inner.text, inner.start_line).tokenize()
                        {
                            match inner_tokens[0].kind {
                                TokenKind::Def => {
                                    if let Some((m, ret)) =
                                        scan_def_header(&inner.text, &inner_tokens)
                                    {
                                        methods.insert(m, ret);
                                    }
                                }
                                TokenKind::Ident
                                    if inner_tokens[1].kind == TokenKind::Colon =>
                                {
                                    if let Some(ty) = scan_field_annotation(&inner.text, &inner_tokens)
                                    {
                                        fields.insert(inner_tokens[0].literal.clone(), ty);
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                    j += 1;
                }
                ctx.class_fields.insert(name.clone(), fields);
                ctx.class_method_returns.insert(name, methods);
                i = j;
            }
            TokenKind::Import | TokenKind::From => {
                scan_import_modules(&tokens, ctx);
                i += 1;
            }
            _ => i += 1,
        }
    }
    Ok(())
}

/// `def NAME(...) -> RET:` header scan; returns the annotated (or unknown)
/// return type without touching the body.
fn scan_def_header(text: &str, tokens: &[Token]) -> Option<(String, String)> {
    if tokens.len() < 2 || tokens[1].kind != TokenKind::Ident {
        return None;
    }
    let name = tokens[1].literal.clone();
    let arrow = tokens.iter().position(|t| t.kind == TokenKind::Arrow)?;
    let colon = tokens
        .iter()
        .skip(arrow)
        .position(|t| t.kind == TokenKind::Colon)
        .map(|p| p + arrow);
    let ret = match colon {
        Some(colon) if colon > arrow + 1 => {
            let ann = &text[tokens[arrow + 1].start..tokens[colon - 1].end];
            types::normalize(ann)
        }
        _ => types::UNKNOWN.to_string(),
    };
    Some((name, ret))
}

/// Registered return types for functions without an annotation come from
/// the real parse; refresh the entry afterwards.
fn register_function(stmt: &Stmt, ctx: &mut ConvertCtx) {
    if let StmtKind::FunctionDef {
        original_name,
        return_type,
        ..
    } = &stmt.kind
    {
        ctx.fn_returns
            .insert(original_name.clone(), return_type.clone());
    }
}

fn scan_class_header(tokens: &[Token]) -> Result<(String, Option<String>)> {
    let name = tokens
        .get(1)
        .filter(|t| t.kind == TokenKind::Ident)
        .map(|t| t.literal.clone())
        .ok_or_else(|| {
            BuildError::invalid(
                "malformed class header".to_string(),
                tokens.first().map(|t| t.span),
                "Write 'class Name:' or 'class Name(Base):'.",
            )
        })?;
    let mut base = None;
    if tokens.get(2).map(|t| t.kind) == Some(TokenKind::LParen) {
        let mut bases = Vec::new();
        let mut k = 3;
        while let Some(tok) = tokens.get(k) {
            match tok.kind {
                TokenKind::Ident => bases.push(tok.literal.clone()),
                TokenKind::RParen => break,
                _ => {}
            }
            k += 1;
        }
        if bases.len() > 1 {
            return Err(BuildError::unsupported(
                format!("class '{}' uses multiple inheritance", name),
                tokens.first().map(|t| t.span),
                "Only single inheritance is supported; keep one base class.",
            ));
        }
        base = bases.into_iter().next();
    }
    Ok((name, base))
}

fn scan_field_annotation(text: &str, tokens: &[Token]) -> Option<String> {
    // NAME ':' ann ['=' default]
    let end = tokens
        .iter()
        .position(|t| t.kind == TokenKind::Eq || t.kind == TokenKind::Eof)?;
    if end <= 2 {
        return None;
    }
    let ann = &text[tokens[2].start..tokens[end - 1].end];
    Some(types::normalize(ann))
}

fn decorator_name(tokens: &[Token]) -> Result<String> {
    match tokens.get(1) {
        Some(tok) if tok.kind == TokenKind::Ident && tokens.get(2).map(|t| t.kind) == Some(TokenKind::Eof) => {
            Ok(tok.literal.clone())
        }
        _ => Err(BuildError::unsupported(
            "only bare-name decorators are supported".to_string(),
            tokens.first().map(|t| t.span),
            "Write the decorator as '@name' with no arguments.",
        )),
    }
}

fn scan_import_modules(tokens: &[Token], ctx: &mut ConvertCtx) {
    match tokens[0].kind {
        TokenKind::Import => {
            // `import a.b.c [as n]` makes the head (or alias) referenceable.
            let mut k = 1;
            let mut head = None;
            while let Some(tok) = tokens.get(k) {
                match tok.kind {
                    TokenKind::Ident if head.is_none() => head = Some(tok.literal.clone()),
                    TokenKind::As => {
                        if let Some(alias) = tokens.get(k + 1) {
                            head = Some(alias.literal.clone());
                        }
                        break;
                    }
                    TokenKind::Eof => break,
                    _ => {}
                }
                k += 1;
            }
            if let Some(h) = head {
                ctx.imported_modules.insert(h);
            }
        }
        _ => {}
    }
}

// ---- imports ------------------------------------------------------------

fn parse_import(
    tokens: &[Token],
    all_bindings: &mut Vec<ImportBinding>,
    ctx: &mut ConvertCtx,
) -> Result<Stmt> {
    let span = tokens[0].span;
    let mut bindings = Vec::new();

    if tokens[0].kind == TokenKind::Import {
        // import MODULE[.SUB]* [as NAME] {"," ...}
        let mut k = 1;
        loop {
            let (module_id, next) = read_dotted(tokens, k)?;
            let mut local = module_id
                .split('.')
                .next()
                .unwrap_or(&module_id)
                .to_string();
            k = next;
            if tokens.get(k).map(|t| t.kind) == Some(TokenKind::As) {
                local = expect_ident(tokens, k + 1)?;
                k += 2;
            }
            bindings.push(ImportBinding {
                module_id: module_id.clone(),
                export_name: String::new(),
                local_name: local.clone(),
                binding_kind: BindingKind::Module,
            });
            ctx.imported_modules.insert(local);
            match tokens.get(k).map(|t| t.kind) {
                Some(TokenKind::Comma) => k += 1,
                _ => break,
            }
        }
        check_duplicate_locals(&bindings, all_bindings, span)?;
        all_bindings.extend(bindings.clone());
        return Ok(Stmt::new(StmtKind::Import { bindings }, span));
    }

    // from MODULE import NAME [as ALIAS] {"," ...}
    if tokens.get(1).map(|t| t.kind) == Some(TokenKind::Dot) {
        return Err(BuildError::unsupported(
            "relative imports are not supported".to_string(),
            Some(span),
            "Import the module by its absolute name.",
        ));
    }
    let (module_id, mut k) = read_dotted(tokens, 1)?;
    if tokens.get(k).map(|t| t.kind) != Some(TokenKind::Import) {
        return Err(BuildError::invalid(
            "malformed from-import".to_string(),
            Some(span),
            "Write 'from module import name'.",
        ));
    }
    k += 1;
    if tokens.get(k).map(|t| t.kind) == Some(TokenKind::Star) {
        return Err(BuildError::unsupported(
            "wildcard imports are not supported".to_string(),
            Some(span),
            "Import each needed name explicitly.",
        ));
    }
    loop {
        let export = expect_ident(tokens, k)?;
        k += 1;
        let mut local = export.clone();
        if tokens.get(k).map(|t| t.kind) == Some(TokenKind::As) {
            local = expect_ident(tokens, k + 1)?;
            k += 2;
        }
        bindings.push(ImportBinding {
            module_id: module_id.clone(),
            export_name: export,
            local_name: local,
            binding_kind: BindingKind::Symbol,
        });
        match tokens.get(k).map(|t| t.kind) {
            Some(TokenKind::Comma) => k += 1,
            _ => break,
        }
    }
    check_duplicate_locals(&bindings, all_bindings, span)?;
    all_bindings.extend(bindings.clone());
    Ok(Stmt::new(
        StmtKind::ImportFrom {
            module: module_id,
            bindings,
        },
        span,
    ))
}

fn read_dotted(tokens: &[Token], mut k: usize) -> Result<(String, usize)> {
    let mut parts = vec![expect_ident(tokens, k)?];
    k += 1;
    while tokens.get(k).map(|t| t.kind) == Some(TokenKind::Dot) {
        parts.push(expect_ident(tokens, k + 1)?);
        k += 2;
    }
    Ok((parts.join("."), k))
}

fn expect_ident(tokens: &[Token], k: usize) -> Result<String> {
    match tokens.get(k) {
        Some(tok) if tok.kind == TokenKind::Ident => Ok(tok.literal.clone()),
        Some(tok) => Err(BuildError::invalid(
            format!("expected a name in import, found '{}'", tok.literal),
            Some(tok.span),
            "Import plain module or symbol names.",
        )),
        None => Err(BuildError::invalid(
            "truncated import statement".to_string(),
            None,
            "Complete the import statement.",
        )),
    }
}

fn check_duplicate_locals(
    new: &[ImportBinding],
    existing: &[ImportBinding],
    span: Span,
) -> Result<()> {
    let mut seen: BTreeSet<&str> = existing.iter().map(|b| b.local_name.as_str()).collect();
    for b in new {
        if !seen.insert(&b.local_name) {
            return Err(BuildError::conflict(
                format!("'{}' is already bound by an earlier import", b.local_name),
                Some(span),
                "Use 'as' to give one of the imports a different local name.",
            ));
        }
    }
    Ok(())
}

// ---- classes ------------------------------------------------------------

fn parse_class(
    logical: &[LogicalLine],
    idx: usize,
    line: &LogicalLine,
    tokens: &[Token],
    ctx: &mut ConvertCtx,
    decorator: Option<(String, Vec<crate::lines::Trivia>)>,
) -> Result<(Stmt, usize)> {
    let span = tokens[0].span;
    let (name, base) = scan_class_header(tokens)?;
    let is_enum = matches!(base.as_deref(), Some("Enum" | "IntEnum" | "IntFlag"));
    let (is_dataclass, mut trivia) = match decorator {
        Some((deco, trivia)) if deco == "dataclass" => (true, trivia),
        Some((deco, _)) => {
            return Err(BuildError::unsupported(
                format!("decorator '@{}' is not supported", deco),
                Some(span),
                "Only @dataclass is recognized on classes.",
            ));
        }
        None => (false, Vec::new()),
    };
    trivia.extend(line.trivia.clone());

    // An Enum base is a marker, not a user class to resolve fields through.
    let stored_base = if is_enum { None } else { base.clone() };
    ctx.class_bases.insert(name.clone(), stored_base.clone());
    if let Some(b) = &stored_base {
        if !ctx.is_class(b) {
            return Err(BuildError::inference(
                format!("base class '{}' of '{}' is not defined", b, name),
                Some(span),
                "Define the base class earlier in the file.",
            ));
        }
    }

    // Locate the class suite.
    let body_indent = match logical.get(idx + 1) {
        Some(next) if next.indent > line.indent => next.indent,
        _ => {
            return Err(BuildError::invalid(
                "expected an indented class body".to_string(),
                Some(span),
                "Indent the class members.",
            ));
        }
    };
    let mut end = idx + 1;
    while end < logical.len() && logical[end].indent > line.indent {
        end += 1;
    }

    let mut fields: BTreeMap<String, String> = ctx
        .class_fields
        .get(&name)
        .cloned()
        .unwrap_or_default();
    let mut docstring = None;
    let mut body = Vec::new();

    // First pass: simple members (annotated fields, enum members, docstring)
    // and field harvesting from __init__.
    let mut method_lines: Vec<usize> = Vec::new();
    let mut j = idx + 1;
    while j < end {
        let member = &logical[j];
        if member.indent != body_indent {
            return Err(BuildError::invalid(
                "unexpected indentation in class body".to_string(),
                Some(Span::point(member.start_line, member.indent + 1)),
                "Class members must share one indentation level.",
            ));
        }
        let member_tokens = Lexer::new(&member.text, member.start_line).tokenize()?;
        match member_tokens[0].kind {
            TokenKind::Def => {
                method_lines.push(j);
                j += 1;
                while j < end && logical[j].indent > body_indent {
                    j += 1;
                }
            }
            TokenKind::Pass => {
                j += 1;
            }
            TokenKind::StringLit
                if member_tokens[1].kind == TokenKind::Eof && docstring.is_none() =>
            {
                let mut p = crate::expr::ExprParser::new(&member_tokens, ctx, HashMap::new());
                let doc = p.parse_expression()?;
                if let ExprKind::Constant {
                    value: ConstValue::Str(s),
                } = doc.kind
                {
                    docstring = Some(s);
                }
                j += 1;
            }
            TokenKind::Ident => {
                let stmt = parse_class_member(member, &member_tokens, ctx, is_enum, &mut fields)?;
                body.push(stmt.with_trivia(member.trivia.clone()));
                j += 1;
            }
            _ => {
                return Err(BuildError::unsupported(
                    "unsupported statement in class body".to_string(),
                    Some(member_tokens[0].span),
                    "Class bodies may contain fields, methods, and a docstring.",
                ));
            }
        }
    }
    ctx.class_fields.insert(name.clone(), fields.clone());

    // Harvest `self.x = ...` field types from __init__ before the real
    // method parse, so sibling methods see every field.
    if let Some(&init_line) = method_lines.iter().find(|&&j| {
        logical[j].text.trim_start().starts_with("def __init__")
    }) {
        let member = logical[init_line].clone();
        let member_tokens = Lexer::new(&member.text, member.start_line).tokenize()?;
        let mut parser = BlockParser::new(logical, ctx).with_class(&name);
        parser.idx = init_line;
        let init = parser.parse_function(&member, &member_tokens, &Scope::default())?;
        if let StmtKind::FunctionDef { body, .. } = &init.kind {
            harvest_self_fields(body, &mut fields);
        }
        ctx.class_fields.insert(name.clone(), fields.clone());
    }

    // Second pass: parse every method with the complete field table.
    for &method_line in &method_lines {
        let member = logical[method_line].clone();
        let member_tokens = Lexer::new(&member.text, member.start_line).tokenize()?;
        let mut parser = BlockParser::new(logical, ctx).with_class(&name);
        parser.idx = method_line;
        let method = parser.parse_function(&member, &member_tokens, &Scope::default())?;
        if let StmtKind::FunctionDef {
            original_name,
            return_type,
            ..
        } = &method.kind
        {
            ctx.class_method_returns
                .entry(name.clone())
                .or_default()
                .insert(original_name.clone(), return_type.clone());
        }
        body.push(method.with_trivia(member.trivia.clone()));
    }

    let storage_hint = if is_enum || is_dataclass {
        StorageHint::Value
    } else {
        StorageHint::Ref
    };

    let stmt = Stmt::new(
        StmtKind::ClassDef {
            name,
            base: stored_base,
            fields,
            storage_hint,
            is_enum,
            is_dataclass,
            docstring,
            body,
        },
        span,
    )
    .with_trivia(trivia);
    Ok((stmt, end))
}

/// One non-def, name-led class member line: an annotated field or an enum
/// member assignment.
fn parse_class_member(
    line: &LogicalLine,
    tokens: &[Token],
    ctx: &ConvertCtx,
    is_enum: bool,
    fields: &mut BTreeMap<String, String>,
) -> Result<Stmt> {
    let span = tokens[0].span;
    let name = tokens[0].literal.clone();

    if tokens[1].kind == TokenKind::Colon {
        // Annotated field, optionally with a default value.
        let eq = tokens.iter().position(|t| t.kind == TokenKind::Eq);
        let ann_end = eq.unwrap_or(tokens.len() - 1);
        if ann_end <= 2 {
            return Err(BuildError::invalid(
                format!("field '{}' is missing its type annotation", name),
                Some(span),
                "Write a type after the ':'.",
            ));
        }
        let ann = &line.text[tokens[2].start..tokens[ann_end - 1].end];
        let annotation = types::normalize(ann);
        fields.insert(name.clone(), annotation.clone());

        let value = match eq {
            Some(eq_pos) => {
                let mut p = crate::expr::ExprParser::new(&tokens[eq_pos + 1..], ctx, HashMap::new());
                let mut v = p.parse_expression()?;
                p.expect_end()?;
                if v.resolved_type == types::UNKNOWN {
                    v.resolved_type = annotation.clone();
                }
                Some(v)
            }
            None => None,
        };
        let target = Expr::new(ExprKind::Name { id: name }, span, annotation.clone(), &tokens[0].literal);
        return Ok(Stmt::new(
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            },
            span,
        ));
    }

    if tokens[1].kind == TokenKind::Eq {
        if !is_enum {
            return Err(BuildError::unsupported(
                "unannotated class attributes are not supported".to_string(),
                Some(span),
                "Annotate the field with its type.",
            ));
        }
        let mut p = crate::expr::ExprParser::new(&tokens[2..], ctx, HashMap::new());
        let value = p.parse_expression()?;
        p.expect_end()?;
        fields.insert(name.clone(), value.resolved_type.clone());
        let target = Expr::new(
            ExprKind::Name { id: name },
            span,
            value.resolved_type.clone(),
            &tokens[0].literal,
        );
        return Ok(Stmt::new(
            StmtKind::Assign {
                target,
                value,
                declare: true,
                decl_type: None,
            },
            span,
        ));
    }

    Err(BuildError::unsupported(
        "unsupported statement in class body".to_string(),
        Some(span),
        "Class bodies may contain fields, methods, and a docstring.",
    ))
}

/// Collect `self.NAME = value` assignments into the field table.
fn harvest_self_fields(body: &[Stmt], fields: &mut BTreeMap<String, String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Assign { target, value, .. } => {
                if let ExprKind::Attribute { value: recv, attr } = &target.kind {
                    if recv.as_name() == Some("self") && !fields.contains_key(attr) {
                        fields.insert(attr.clone(), value.resolved_type.clone());
                    }
                }
            }
            StmtKind::AnnAssign { target, annotation, .. } => {
                if let ExprKind::Attribute { value: recv, attr } = &target.kind {
                    if recv.as_name() == Some("self") {
                        fields.insert(attr.clone(), annotation.clone());
                    }
                }
            }
            StmtKind::If { body, orelse, .. } => {
                harvest_self_fields(body, fields);
                harvest_self_fields(orelse, fields);
            }
            _ => {}
        }
    }
}

// ---- main guard and renames ---------------------------------------------

fn is_main_guard(tokens: &[Token]) -> bool {
    matches!(
        (tokens.first(), tokens.get(1), tokens.get(2), tokens.get(3)),
        (Some(a), Some(b), Some(c), Some(d))
            if a.kind == TokenKind::If
                && b.kind == TokenKind::Ident
                && b.literal == "__name__"
                && c.kind == TokenKind::EqEq
                && d.kind == TokenKind::StringLit
                && d.literal.contains("__main__")
    )
}

/// The entry function is renamed so generated code can own the real `main`.
fn rename_if_main(stmt: Stmt, module: &mut Module) -> Stmt {
    let mut stmt = stmt;
    if let StmtKind::FunctionDef { name, .. } = &mut stmt.kind {
        if name == "main" {
            *name = "__east_main".to_string();
            module
                .renamed_symbols
                .insert("main".to_string(), "__east_main".to_string());
        }
    }
    stmt
}

fn rename_in_stmts(stmts: &mut [Stmt], from: &str, to: &str) {
    for stmt in stmts {
        for expr in stmt_exprs_mut(stmt) {
            rename_in_expr(expr, from, to);
        }
        match &mut stmt.kind {
            StmtKind::If { body, orelse, .. } => {
                rename_in_stmts(body, from, to);
                rename_in_stmts(orelse, from, to);
            }
            StmtKind::While { body, .. }
            | StmtKind::For { body, .. }
            | StmtKind::ForRange { body, .. } => rename_in_stmts(body, from, to),
            StmtKind::Try {
                body,
                handlers,
                finalbody,
            } => {
                rename_in_stmts(body, from, to);
                for h in handlers {
                    rename_in_stmts(&mut h.body, from, to);
                }
                rename_in_stmts(finalbody, from, to);
            }
            _ => {}
        }
    }
}

fn rename_in_expr(expr: &mut Expr, from: &str, to: &str) {
    if let ExprKind::Name { id } = &mut expr.kind {
        if id == from {
            *id = to.to_string();
            expr.repr = to.to_string();
        }
    }
    for child in expr::expr_children_mut(expr) {
        rename_in_expr(child, from, to);
    }
}

/// Direct expressions of one statement (not those in nested suites).
fn stmt_exprs_mut(stmt: &mut Stmt) -> Vec<&mut Expr> {
    match &mut stmt.kind {
        StmtKind::Return { value } | StmtKind::Yield { value } => {
            value.iter_mut().collect()
        }
        StmtKind::Assign { target, value, .. } => vec![target, value],
        StmtKind::AnnAssign { target, value, .. } => {
            let mut v: Vec<&mut Expr> = vec![target];
            v.extend(value.iter_mut());
            v
        }
        StmtKind::AugAssign { target, value, .. } => vec![target, value],
        StmtKind::Swap { left, right } => vec![left, right],
        StmtKind::If { test, .. } => vec![test],
        StmtKind::While { test, .. } => vec![test],
        StmtKind::ForRange {
            target,
            start,
            stop,
            step,
            ..
        } => vec![target, start, stop, step],
        StmtKind::For { target, iter, .. } => vec![target, iter],
        StmtKind::Raise { exc, cause } => {
            exc.iter_mut().chain(cause.iter_mut()).collect()
        }
        StmtKind::Expr { value } => vec![value],
        _ => Vec::new(),
    }
}

/// `module.symbol` references made through module imports, deduplicated.
fn collect_qualified_refs(module: &mut Module, ctx: &ConvertCtx) -> Vec<String> {
    let mut refs = BTreeSet::new();
    let mut stmts: Vec<&mut Stmt> = Vec::new();
    stmts.extend(module.body.iter_mut());
    stmts.extend(module.main_guard_body.iter_mut());
    for stmt in stmts {
        collect_refs_in_stmt(stmt, ctx, &mut refs);
    }
    refs.into_iter().collect()
}

fn collect_refs_in_stmt(stmt: &mut Stmt, ctx: &ConvertCtx, refs: &mut BTreeSet<String>) {
    for expr in stmt_exprs_mut(stmt) {
        collect_refs_in_expr(expr, ctx, refs);
    }
    match &mut stmt.kind {
        StmtKind::FunctionDef { body, .. } | StmtKind::ClassDef { body, .. } => {
            for s in body {
                collect_refs_in_stmt(s, ctx, refs);
            }
        }
        StmtKind::If { body, orelse, .. } => {
            for s in body.iter_mut().chain(orelse.iter_mut()) {
                collect_refs_in_stmt(s, ctx, refs);
            }
        }
        StmtKind::While { body, .. }
        | StmtKind::For { body, .. }
        | StmtKind::ForRange { body, .. } => {
            for s in body {
                collect_refs_in_stmt(s, ctx, refs);
            }
        }
        StmtKind::Try {
            body,
            handlers,
            finalbody,
        } => {
            for s in body.iter_mut().chain(finalbody.iter_mut()) {
                collect_refs_in_stmt(s, ctx, refs);
            }
            for h in handlers {
                for s in &mut h.body {
                    collect_refs_in_stmt(s, ctx, refs);
                }
            }
        }
        _ => {}
    }
}

fn collect_refs_in_expr(expr: &mut Expr, ctx: &ConvertCtx, refs: &mut BTreeSet<String>) {
    if let ExprKind::Attribute { value, attr } = &expr.kind {
        if let Some(module) = value.as_name() {
            if ctx.is_imported_module(module) {
                refs.insert(format!("{}.{}", module, attr));
            }
        }
    }
    for child in expr::expr_children_mut(expr) {
        collect_refs_in_expr(child, ctx, refs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(src: &str) -> Module {
        convert_source(src, "test.py").unwrap()
    }

    fn convert_err(src: &str) -> BuildError {
        convert_source(src, "test.py").unwrap_err()
    }

    #[test]
    fn simple_function_module() {
        let module = convert("def add(a: int, b: int) -> int:\n    return a + b\n");
        assert_eq!(module.body.len(), 1);
        match &module.body[0].kind {
            StmtKind::FunctionDef {
                name, return_type, ..
            } => {
                assert_eq!(name, "add");
                assert_eq!(return_type, "int64");
            }
            other => panic!("expected FunctionDef, got {:?}", other),
        }
    }

    #[test]
    fn multiple_inheritance_is_rejected() {
        let err = convert_err("class C(A, B):\n    pass\n");
        assert_eq!(err.kind, crate::errors::ErrorKind::UnsupportedSyntax);
        assert!(err.message.contains("multiple inheritance"));
        assert!(err.hint.contains("single inheritance"));
    }

    #[test]
    fn forward_reference_resolves() {
        let module = convert(
            "def caller() -> int:\n    return helper()\n\ndef helper() -> int:\n    return 1\n",
        );
        match &module.body[0].kind {
            StmtKind::FunctionDef { body, .. } => match &body[0].kind {
                StmtKind::Return { value: Some(v) } => assert_eq!(v.resolved_type, "int64"),
                other => panic!("expected Return, got {:?}", other),
            },
            other => panic!("expected FunctionDef, got {:?}", other),
        }
    }

    #[test]
    fn main_function_is_renamed() {
        let module = convert(
            "def main() -> None:\n    pass\n\nif __name__ == \"__main__\":\n    main()\n",
        );
        assert_eq!(
            module.renamed_symbols.get("main").map(String::as_str),
            Some("__east_main")
        );
        match &module.body[0].kind {
            StmtKind::FunctionDef {
                name, original_name, ..
            } => {
                assert_eq!(name, "__east_main");
                assert_eq!(original_name, "main");
            }
            other => panic!("expected FunctionDef, got {:?}", other),
        }
        match &module.main_guard_body[0].kind {
            StmtKind::Expr { value } => match &value.kind {
                ExprKind::Call { func, .. } => {
                    assert_eq!(func.as_name(), Some("__east_main"))
                }
                other => panic!("expected Call, got {:?}", other),
            },
            other => panic!("expected Expr, got {:?}", other),
        }
    }

    #[test]
    fn module_docstring_is_lifted() {
        let module = convert("\"\"\"Utility module.\"\"\"\nx = 1\n");
        assert_eq!(module.docstring.as_deref(), Some("Utility module."));
        assert_eq!(module.body.len(), 1);
    }

    #[test]
    fn class_fields_from_init() {
        let module = convert(
            "class Point:\n    def __init__(self, x: int, y: int) -> None:\n        self.x = x\n        self.y = y\n    def total(self) -> int:\n        return self.x + self.y\n",
        );
        match &module.body[0].kind {
            StmtKind::ClassDef { fields, body, .. } => {
                assert_eq!(fields.get("x").map(String::as_str), Some("int64"));
                assert_eq!(fields.get("y").map(String::as_str), Some("int64"));
                // total() resolves self.x through the harvested fields.
                match &body[1].kind {
                    StmtKind::FunctionDef { return_type, .. } => {
                        assert_eq!(return_type, "int64")
                    }
                    other => panic!("expected FunctionDef, got {:?}", other),
                }
            }
            other => panic!("expected ClassDef, got {:?}", other),
        }
    }

    #[test]
    fn enum_class_is_flagged() {
        let module = convert(
            "from enum import Enum\n\nclass Color(Enum):\n    RED = 1\n    GREEN = 2\n",
        );
        match &module.body[1].kind {
            StmtKind::ClassDef {
                is_enum,
                base,
                fields,
                storage_hint,
                ..
            } => {
                assert!(*is_enum);
                assert!(base.is_none());
                assert_eq!(fields.get("RED").map(String::as_str), Some("int64"));
                assert_eq!(*storage_hint, StorageHint::Value);
            }
            other => panic!("expected ClassDef, got {:?}", other),
        }
    }

    #[test]
    fn int_enum_base_also_marks_enum() {
        let module = convert(
            "from enum import IntEnum\n\nclass Level(IntEnum):\n    LOW = 0\n    HIGH = 1\n",
        );
        match &module.body[1].kind {
            StmtKind::ClassDef { is_enum, base, .. } => {
                assert!(*is_enum);
                assert!(base.is_none());
            }
            other => panic!("expected ClassDef, got {:?}", other),
        }
    }

    #[test]
    fn dataclass_decorator_is_recognized() {
        let module = convert(
            "@dataclass\nclass Pair:\n    a: int\n    b: int\n",
        );
        match &module.body[0].kind {
            StmtKind::ClassDef {
                is_dataclass,
                fields,
                ..
            } => {
                assert!(*is_dataclass);
                assert_eq!(fields.len(), 2);
            }
            other => panic!("expected ClassDef, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_import_local_conflicts() {
        let err = convert_err("from a import x\nfrom b import x\n");
        assert_eq!(err.kind, crate::errors::ErrorKind::SemanticConflict);
    }

    #[test]
    fn wildcard_import_rejected() {
        let err = convert_err("from os import *\n");
        assert_eq!(err.kind, crate::errors::ErrorKind::UnsupportedSyntax);
    }

    #[test]
    fn relative_import_rejected() {
        let err = convert_err("from . import helpers\n");
        assert_eq!(err.kind, crate::errors::ErrorKind::UnsupportedSyntax);
    }

    #[test]
    fn qualified_refs_are_collected() {
        let module = convert(
            "import math\n\ndef area(r: float) -> float:\n    return math.pi * r * r\n",
        );
        assert_eq!(module.meta.qualified_symbol_refs, vec!["math.pi".to_string()]);
    }

    #[test]
    fn inheritance_chain_field_lookup() {
        let module = convert(
            "class Base:\n    tag: str\n\nclass Child(Base):\n    def label(self) -> str:\n        return self.tag\n",
        );
        match &module.body[1].kind {
            StmtKind::ClassDef { base, body, .. } => {
                assert_eq!(base.as_deref(), Some("Base"));
                match &body[0].kind {
                    StmtKind::FunctionDef { return_type, .. } => {
                        assert_eq!(return_type, "str")
                    }
                    other => panic!("expected FunctionDef, got {:?}", other),
                }
            }
            other => panic!("expected ClassDef, got {:?}", other),
        }
    }
}
