//! The EAST tree: a statically typed, serializable intermediate form.
//!
//! Every expression carries a resolved type, a borrow kind, and any numeric
//! promotion casts inserted by the resolver, so backends never re-derive
//! typing decisions.

use crate::lines::Trivia;
use crate::token::Span;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BorrowKind {
    Value,
    ReadonlyRef,
    MutableRef,
}

/// Explicit numeric conversion demanded on one operand of an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CastRecord {
    pub on: String,
    pub from: String,
    pub to: String,
    pub reason: String,
}

impl CastRecord {
    pub fn promotion(on: &str, from: &str, to: &str) -> Self {
        Self {
            on: on.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            reason: "numeric_promotion".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConstValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOpKind {
    Add,
    Sub,
    Mult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
}

impl BinOpKind {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mult => "*",
            BinOpKind::Div => "/",
            BinOpKind::FloorDiv => "//",
            BinOpKind::Mod => "%",
            BinOpKind::Pow => "**",
            BinOpKind::LShift => "<<",
            BinOpKind::RShift => ">>",
            BinOpKind::BitOr => "|",
            BinOpKind::BitXor => "^",
            BinOpKind::BitAnd => "&",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOpKind {
    UAdd,
    USub,
    Not,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BoolOpKind {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CmpOpKind {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeMode {
    Ascending,
    Descending,
    Dynamic,
}

#[derive(Debug, Clone, Serialize)]
pub struct Keyword {
    pub arg: String,
    pub value: Expr,
}

/// Builtin-call annotation: the canonical runtime symbol every backend maps
/// this call to.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltinLowering {
    pub lowered_kind: String,
    pub builtin_name: String,
    pub runtime_call: String,
}

impl BuiltinLowering {
    pub fn call(builtin_name: &str, runtime_call: &str) -> Self {
        Self {
            lowered_kind: "BuiltinCall".to_string(),
            builtin_name: builtin_name.to_string(),
            runtime_call: runtime_call.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LambdaParam {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Expr>,
}

/// One `for target in iter [if cond]*` clause of a comprehension.
#[derive(Debug, Clone, Serialize)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum ExprKind {
    Name {
        id: String,
    },
    Constant {
        value: ConstValue,
    },
    BinOp {
        op: BinOpKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<Expr>,
    },
    BoolOp {
        op: BoolOpKind,
        values: Vec<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOpKind>,
        comparators: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        keywords: Vec<Keyword>,
        #[serde(flatten)]
        lowering: Option<BuiltinLowering>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        value: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    List {
        elts: Vec<Expr>,
    },
    Set {
        elts: Vec<Expr>,
    },
    Tuple {
        elts: Vec<Expr>,
    },
    Dict {
        keys: Vec<Expr>,
        values: Vec<Expr>,
    },
    Lambda {
        params: Vec<LambdaParam>,
        body: Box<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    JoinedStr {
        values: Vec<Expr>,
    },
    FormattedValue {
        value: Box<Expr>,
        #[serde(skip_serializing_if = "Option::is_none")]
        conversion: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        format_spec: Option<String>,
    },
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    RangeExpr {
        start: Box<Expr>,
        stop: Box<Expr>,
        step: Box<Expr>,
        range_mode: RangeMode,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Expr {
    #[serde(flatten)]
    pub kind: ExprKind,
    pub source_span: Option<Span>,
    pub resolved_type: String,
    pub borrow_kind: BorrowKind,
    pub casts: Vec<CastRecord>,
    pub repr: String,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span, resolved_type: impl Into<String>, repr: &str) -> Self {
        Self {
            kind,
            source_span: Some(span),
            resolved_type: resolved_type.into(),
            borrow_kind: BorrowKind::Value,
            casts: Vec::new(),
            repr: repr.to_string(),
        }
    }

    /// A node invented by lowering, with no direct source text.
    pub fn synthesized(kind: ExprKind, resolved_type: impl Into<String>, repr: &str) -> Self {
        Self {
            kind,
            source_span: None,
            resolved_type: resolved_type.into(),
            borrow_kind: BorrowKind::Value,
            casts: Vec::new(),
            repr: repr.to_string(),
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name { id } => Some(id),
            _ => None,
        }
    }

    pub fn is_literal_int(&self) -> Option<i64> {
        match &self.kind {
            ExprKind::Constant {
                value: ConstValue::Int(v),
            } => Some(*v),
            ExprKind::UnaryOp {
                op: UnaryOpKind::USub,
                operand,
            } => operand.is_literal_int().map(|v| -v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgUsage {
    Readonly,
    Reassigned,
}

#[derive(Debug, Clone, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageHint {
    Value,
    Ref,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExceptHandler {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exc_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    Module,
    Symbol,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportBinding {
    pub module_id: String,
    pub export_name: String,
    pub local_name: String,
    pub binding_kind: BindingKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum StmtKind {
    FunctionDef {
        name: String,
        original_name: String,
        params: Vec<Param>,
        return_type: String,
        arg_usage: BTreeMap<String, ArgUsage>,
        is_generator: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        yield_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        docstring: Option<String>,
        body: Vec<Stmt>,
    },
    ClassDef {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        base: Option<String>,
        fields: BTreeMap<String, String>,
        storage_hint: StorageHint,
        is_enum: bool,
        is_dataclass: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        docstring: Option<String>,
        body: Vec<Stmt>,
    },
    Return {
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Expr>,
    },
    Assign {
        target: Expr,
        value: Expr,
        declare: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        decl_type: Option<String>,
    },
    AnnAssign {
        target: Expr,
        annotation: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Expr>,
    },
    AugAssign {
        target: Expr,
        op: BinOpKind,
        value: Expr,
    },
    Swap {
        left: Expr,
        right: Expr,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    /// Static-range iteration plan: the iterable was a literal `range(...)`.
    ForRange {
        target: Expr,
        target_type: String,
        start: Expr,
        stop: Expr,
        step: Expr,
        range_mode: RangeMode,
        body: Vec<Stmt>,
    },
    /// Runtime-iterator plan: the backend drives a generic init/next protocol.
    For {
        target: Expr,
        target_type: String,
        iter: Expr,
        body: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        finalbody: Vec<Stmt>,
    },
    Raise {
        #[serde(skip_serializing_if = "Option::is_none")]
        exc: Option<Expr>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<Expr>,
    },
    Yield {
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Expr>,
    },
    Import {
        bindings: Vec<ImportBinding>,
    },
    ImportFrom {
        module: String,
        bindings: Vec<ImportBinding>,
    },
    Expr {
        value: Expr,
    },
    Pass {},
    Break {},
    Continue {},
}

#[derive(Debug, Clone, Serialize)]
pub struct Stmt {
    #[serde(flatten)]
    pub kind: StmtKind,
    pub source_span: Option<Span>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub leading_trivia: Vec<Trivia>,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self {
            kind,
            source_span: Some(span),
            leading_trivia: Vec::new(),
        }
    }

    pub fn synthesized(kind: StmtKind) -> Self {
        Self {
            kind,
            source_span: None,
            leading_trivia: Vec::new(),
        }
    }

    pub fn with_trivia(mut self, trivia: Vec<Trivia>) -> Self {
        self.leading_trivia = trivia;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModuleMeta {
    pub import_bindings: Vec<ImportBinding>,
    pub qualified_symbol_refs: Vec<String>,
}

/// Root of the IR document for one input file.
#[derive(Debug, Clone, Serialize)]
pub struct Module {
    pub kind: &'static str,
    pub source_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    pub body: Vec<Stmt>,
    pub main_guard_body: Vec<Stmt>,
    pub renamed_symbols: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trailing_trivia: Vec<Trivia>,
    pub meta: ModuleMeta,
}

impl Module {
    pub fn new(source_path: &str) -> Self {
        Self {
            kind: "Module",
            source_path: source_path.to_string(),
            docstring: None,
            body: Vec::new(),
            main_guard_body: Vec::new(),
            renamed_symbols: BTreeMap::new(),
            trailing_trivia: Vec::new(),
            meta: ModuleMeta::default(),
        }
    }
}
