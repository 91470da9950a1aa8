//! Operations over the string-shaped type descriptors used throughout the
//! tree: canonical scalars (`int64`, `float64`, ...), composites
//! (`list[T]`, `dict[K,V]`, `tuple[...]`, `callable[...->R]`), declared class
//! names, and the universal escape hatch `unknown`.

use crate::east::{BinOpKind, CastRecord};

pub const UNKNOWN: &str = "unknown";

/// Canonicalize a source annotation: `int` → `int64`, `float` → `float64`,
/// recursively through generic arguments. Unrecognized identifiers are kept
/// as declared class names.
pub fn normalize(ann: &str) -> String {
    let ann = ann.trim();
    match ann {
        "int" => return "int64".to_string(),
        "float" => return "float64".to_string(),
        "byte" => return "uint8".to_string(),
        "object" | "Any" | "any" => return UNKNOWN.to_string(),
        "bool" | "str" | "None" | "bytes" | "bytearray" | "Path" | "Exception" | "int8"
        | "int16" | "int32" | "int64" | "uint8" | "uint16" | "uint32" | "uint64" | "float32"
        | "float64" | "unknown" | "range" => return ann.to_string(),
        "List" => return "list[unknown]".to_string(),
        "Set" => return "set[unknown]".to_string(),
        "Dict" => return "dict[unknown, unknown]".to_string(),
        _ => {}
    }

    if let Some((head, args)) = split_generic(ann) {
        let head = match head {
            "List" => "list",
            "Set" => "set",
            "Dict" => "dict",
            "Tuple" => "tuple",
            other => other,
        };
        if head == "Callable" || head == "callable" {
            return normalize_callable(&args);
        }
        let parts: Vec<String> = args.iter().map(|a| normalize(a)).collect();
        return format!("{}[{}]", head, parts.join(", "));
    }

    ann.to_string()
}

/// `Callable[[A, B], R]` → `callable[A, B->R]`.
fn normalize_callable(args: &[String]) -> String {
    if args.len() == 2 && args[0].starts_with('[') && args[0].ends_with(']') {
        let inner = &args[0][1..args[0].len() - 1];
        let params: Vec<String> = if inner.trim().is_empty() {
            Vec::new()
        } else {
            split_top_commas(inner).iter().map(|p| normalize(p)).collect()
        };
        let ret = normalize(&args[1]);
        return format!("callable[{}->{}]", params.join(", "), ret);
    }
    format!("callable[->{}]", UNKNOWN)
}

/// Split `head[a, b, ...]` into its head and top-level arguments.
pub fn split_generic(ty: &str) -> Option<(&str, Vec<String>)> {
    let open = ty.find('[')?;
    if !ty.ends_with(']') || open == 0 {
        return None;
    }
    let head = &ty[..open];
    if !head.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let inner = &ty[open + 1..ty.len() - 1];
    Some((head, split_top_commas(inner)))
}

/// Split on commas that sit outside any bracket nesting.
pub fn split_top_commas(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in s.chars() {
        match ch {
            '[' | '(' => {
                depth += 1;
                current.push(ch);
            }
            ']' | ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

pub fn generic_head(ty: &str) -> &str {
    match ty.find('[') {
        Some(i) if ty.ends_with(']') => &ty[..i],
        _ => ty,
    }
}

pub fn is_signed_int(ty: &str) -> bool {
    matches!(ty, "int8" | "int16" | "int32" | "int64")
}

pub fn is_unsigned_int(ty: &str) -> bool {
    matches!(ty, "uint8" | "uint16" | "uint32" | "uint64")
}

pub fn is_int(ty: &str) -> bool {
    is_signed_int(ty) || is_unsigned_int(ty) || ty == "bool"
}

pub fn is_float(ty: &str) -> bool {
    matches!(ty, "float32" | "float64")
}

pub fn is_numeric(ty: &str) -> bool {
    is_int(ty) || is_float(ty)
}

fn wider_float(a: &str, b: &str) -> &'static str {
    if a == "float64" || b == "float64" {
        "float64"
    } else {
        "float32"
    }
}

/// Integer unification across signedness/width: `int64` when either side is
/// signed, else `uint64`. Equal types stay put.
fn unify_ints(a: &str, b: &str) -> String {
    if a == b {
        return a.to_string();
    }
    if is_signed_int(a) || is_signed_int(b) {
        "int64".to_string()
    } else {
        "uint64".to_string()
    }
}

/// Best shared type of two descriptors; `unknown` absorbs nothing and
/// everything.
pub fn unify(a: &str, b: &str) -> String {
    if a == b {
        return a.to_string();
    }
    if a == UNKNOWN {
        return b.to_string();
    }
    if b == UNKNOWN {
        return a.to_string();
    }
    if is_numeric(a) && is_numeric(b) {
        if is_float(a) || is_float(b) {
            let fa = if is_float(a) { a } else { "float32" };
            let fb = if is_float(b) { b } else { "float32" };
            return wider_float(fa, fb).to_string();
        }
        return unify_ints(a, b);
    }
    UNKNOWN.to_string()
}

/// Whether a rebinding from `a` to `b` in one scope is allowed: equal, one
/// side `unknown`, or both numeric.
pub fn compatible(a: &str, b: &str) -> bool {
    a == b || a == UNKNOWN || b == UNKNOWN || (is_numeric(a) && is_numeric(b))
}

/// Element type bound when iterating a value of the given type. `dict`
/// iterates keys; `bytes` yields `uint8`. `None` means the runtime iterator
/// protocol with an unknown element.
pub fn element_type(iter_ty: &str) -> Option<String> {
    match iter_ty {
        "str" => return Some("str".to_string()),
        "bytes" | "bytearray" => return Some("uint8".to_string()),
        "range" => return Some("int64".to_string()),
        _ => {}
    }
    let (head, args) = split_generic(iter_ty)?;
    match head {
        "list" | "set" | "iterator" => args.first().cloned(),
        "dict" => args.first().cloned(),
        "tuple" => {
            let mut unified = args.first().cloned()?;
            for a in &args[1..] {
                unified = unify(&unified, a);
            }
            Some(unified)
        }
        _ => None,
    }
}

/// Value type of a `dict[K, V]` descriptor.
pub fn dict_value_type(ty: &str) -> Option<String> {
    match split_generic(ty) {
        Some(("dict", args)) => args.get(1).cloned(),
        _ => None,
    }
}

/// Return type of a `callable[A, B->R]` descriptor.
pub fn callable_return(ty: &str) -> Option<String> {
    let inner = ty.strip_prefix("callable[")?.strip_suffix(']')?;
    let arrow = inner.rfind("->")?;
    Some(inner[arrow + 2..].trim().to_string())
}

/// Per-position element types for a tuple descriptor.
pub fn tuple_elements(ty: &str) -> Option<Vec<String>> {
    match split_generic(ty) {
        Some(("tuple", args)) => Some(args),
        _ => None,
    }
}

/// Result type of `base[index]`.
pub fn subscript_result(base: &str) -> String {
    match base {
        "str" => return "str".to_string(),
        "bytes" | "bytearray" => return "uint8".to_string(),
        _ => {}
    }
    match split_generic(base) {
        Some(("list", args)) => args.first().cloned().unwrap_or_else(|| UNKNOWN.to_string()),
        Some(("dict", args)) => args.get(1).cloned().unwrap_or_else(|| UNKNOWN.to_string()),
        Some(("tuple", args)) => {
            let mut unified = args.first().cloned().unwrap_or_else(|| UNKNOWN.to_string());
            for a in args.iter().skip(1) {
                unified = unify(&unified, a);
            }
            unified
        }
        _ => UNKNOWN.to_string(),
    }
}

/// Result type of `base[a:b]`: slicing keeps the container type.
pub fn slice_result(base: &str) -> String {
    match generic_head(base) {
        "list" | "str" | "bytes" | "bytearray" | "tuple" => base.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Numeric promotion for a binary arithmetic/bitwise operation. Returns the
/// result type and the cast records for operands whose type changed.
/// Non-numeric special cases (`str + str`, `Path / x`, ...) are decided by
/// the caller before reaching here.
pub fn promote_binary(op: BinOpKind, lt: &str, rt: &str) -> (String, Vec<CastRecord>) {
    if lt == UNKNOWN || rt == UNKNOWN {
        return (UNKNOWN.to_string(), Vec::new());
    }
    if !is_numeric(lt) || !is_numeric(rt) {
        return (UNKNOWN.to_string(), Vec::new());
    }

    let result = match op {
        // True division: always float64.
        BinOpKind::Div => "float64".to_string(),
        BinOpKind::FloorDiv => {
            if is_int(lt) && is_int(rt) {
                "int64".to_string()
            } else {
                "float64".to_string()
            }
        }
        BinOpKind::LShift | BinOpKind::RShift | BinOpKind::BitOr | BinOpKind::BitXor
        | BinOpKind::BitAnd => "int64".to_string(),
        BinOpKind::Add | BinOpKind::Sub | BinOpKind::Mult | BinOpKind::Mod | BinOpKind::Pow => {
            if is_float(lt) || is_float(rt) {
                let fl = if is_float(lt) { lt } else { "float32" };
                let fr = if is_float(rt) { rt } else { "float32" };
                wider_float(fl, fr).to_string()
            } else {
                unify_ints(lt, rt)
            }
        }
    };

    let mut casts = Vec::new();
    if lt != result {
        casts.push(CastRecord::promotion("left", lt, &result));
    }
    if rt != result {
        casts.push(CastRecord::promotion("right", rt, &result));
    }
    (result, casts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_scalars_and_generics() {
        assert_eq!(normalize("int"), "int64");
        assert_eq!(normalize("float"), "float64");
        assert_eq!(normalize("list[int]"), "list[int64]");
        assert_eq!(normalize("dict[str, list[int]]"), "dict[str, list[int64]]");
        assert_eq!(normalize("MyClass"), "MyClass");
        assert_eq!(normalize("object"), "unknown");
    }

    #[test]
    fn normalize_callable() {
        assert_eq!(
            normalize("Callable[[int, str], bool]"),
            "callable[int64, str->bool]"
        );
    }

    #[test]
    fn division_is_always_float64() {
        let (ty, casts) = promote_binary(BinOpKind::Div, "int64", "int64");
        assert_eq!(ty, "float64");
        assert_eq!(casts.len(), 2);
        assert_eq!(casts[0].reason, "numeric_promotion");

        let (ty, _) = promote_binary(BinOpKind::Div, "float64", "float64");
        assert_eq!(ty, "float64");
    }

    #[test]
    fn floor_division_type() {
        assert_eq!(promote_binary(BinOpKind::FloorDiv, "int64", "int64").0, "int64");
        assert_eq!(
            promote_binary(BinOpKind::FloorDiv, "int64", "float64").0,
            "float64"
        );
    }

    #[test]
    fn mixed_int_float_promotes_int_side() {
        let (ty, casts) = promote_binary(BinOpKind::Add, "int64", "float64");
        assert_eq!(ty, "float64");
        assert_eq!(casts.len(), 1);
        assert_eq!(casts[0].on, "left");
        assert_eq!(casts[0].from, "int64");
        assert_eq!(casts[0].to, "float64");
    }

    #[test]
    fn differing_int_widths_unify() {
        assert_eq!(promote_binary(BinOpKind::Add, "int8", "uint32").0, "int64");
        assert_eq!(promote_binary(BinOpKind::Add, "uint8", "uint32").0, "uint64");
        assert_eq!(promote_binary(BinOpKind::Add, "int32", "int32").0, "int32");
    }

    #[test]
    fn unknown_operand_stays_unknown() {
        let (ty, casts) = promote_binary(BinOpKind::Add, "unknown", "int64");
        assert_eq!(ty, "unknown");
        assert!(casts.is_empty());
    }

    #[test]
    fn element_types() {
        assert_eq!(element_type("list[str]").as_deref(), Some("str"));
        assert_eq!(element_type("dict[str, int64]").as_deref(), Some("str"));
        assert_eq!(element_type("bytes").as_deref(), Some("uint8"));
        assert_eq!(element_type("range").as_deref(), Some("int64"));
        assert_eq!(element_type("MyClass"), None);
    }

    #[test]
    fn subscript_and_slice() {
        assert_eq!(subscript_result("dict[str, int64]"), "int64");
        assert_eq!(subscript_result("list[float64]"), "float64");
        assert_eq!(slice_result("list[float64]"), "list[float64]");
        assert_eq!(slice_result("str"), "str");
    }

    #[test]
    fn compatibility_rules() {
        assert!(compatible("int64", "float64"));
        assert!(compatible("unknown", "str"));
        assert!(!compatible("str", "int64"));
        assert!(!compatible("list[str]", "list[int64]"));
    }
}
