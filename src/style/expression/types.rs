//! Static types of the style expression language.

use std::fmt;

/// The static type of an expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Null,
    Number,
    String,
    Boolean,
    Color,
    Object,
    Value,
    Error,
    Collator,
    Formatted,
    Padding,
    ResolvedImage,
    /// Array with an item type and an optional fixed length.
    Array { item: Box<Type>, n: Option<usize> },
}

/// Discriminant of a [`Type`], used where the item type of arrays is irrelevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Null,
    Number,
    String,
    Boolean,
    Color,
    Object,
    Value,
    Error,
    Collator,
    Formatted,
    Padding,
    ResolvedImage,
    Array,
}

impl Type {
    pub fn array(item: Type) -> Self {
        Type::Array {
            item: Box::new(item),
            n: None,
        }
    }

    pub fn array_n(item: Type, n: usize) -> Self {
        Type::Array {
            item: Box::new(item),
            n: Some(n),
        }
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            Type::Null => TypeKind::Null,
            Type::Number => TypeKind::Number,
            Type::String => TypeKind::String,
            Type::Boolean => TypeKind::Boolean,
            Type::Color => TypeKind::Color,
            Type::Object => TypeKind::Object,
            Type::Value => TypeKind::Value,
            Type::Error => TypeKind::Error,
            Type::Collator => TypeKind::Collator,
            Type::Formatted => TypeKind::Formatted,
            Type::Padding => TypeKind::Padding,
            Type::ResolvedImage => TypeKind::ResolvedImage,
            Type::Array { .. } => TypeKind::Array,
        }
    }

    /// Item type for arrays, `None` otherwise.
    pub fn item_type(&self) -> Option<&Type> {
        match self {
            Type::Array { item, .. } => Some(item),
            _ => None,
        }
    }

    /// Name used by `typeof` and in error messages for the kind alone.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Type::Null => "null",
            Type::Number => "number",
            Type::String => "string",
            Type::Boolean => "boolean",
            Type::Color => "color",
            Type::Object => "object",
            Type::Value => "value",
            Type::Error => "error",
            Type::Collator => "collator",
            Type::Formatted => "formatted",
            Type::Padding => "padding",
            Type::ResolvedImage => "resolvedImage",
            Type::Array { .. } => "array",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Array { item, n } => {
                if **item == Type::Value && n.is_none() {
                    // `array` alone means array<value>
                    return write!(f, "array");
                }
                match n {
                    Some(n) => write!(f, "array<{}, {}>", item, n),
                    None => write!(f, "array<{}>", item),
                }
            }
            other => write!(f, "{}", other.kind_name()),
        }
    }
}

/// Types that a `value`-typed expression may hold at runtime.
fn value_member_types() -> [Type; 10] {
    [
        Type::Null,
        Type::Number,
        Type::String,
        Type::Boolean,
        Type::Color,
        Type::Formatted,
        Type::Object,
        Type::array(Type::Value),
        Type::Padding,
        Type::ResolvedImage,
    ]
}

/// Returns `None` if `actual` is a subtype of `expected`, or an error message.
pub fn check_subtype(expected: &Type, actual: &Type) -> Option<String> {
    if is_subtype(expected, actual) {
        None
    } else {
        Some(format!(
            "Expected {} but found {} instead.",
            expected, actual
        ))
    }
}

fn is_subtype(expected: &Type, actual: &Type) -> bool {
    if let Type::Error = actual {
        return true;
    }
    match expected {
        Type::Array { item, n } => {
            if let Type::Array {
                item: actual_item,
                n: actual_n,
            } = actual
            {
                let item_ok = (*actual_n == Some(0) && **actual_item == Type::Value)
                    || is_subtype(item, actual_item);
                let len_ok = match n {
                    Some(n) => *actual_n == Some(*n),
                    None => true,
                };
                item_ok && len_ok
            } else {
                false
            }
        }
        Type::Value => {
            if actual.kind() == TypeKind::Value {
                return true;
            }
            value_member_types()
                .iter()
                .any(|member| is_subtype(member, actual))
        }
        _ => expected.kind() == actual.kind(),
    }
}

/// Whether the kind of `provided` is one of `allowed`.
pub fn is_valid_type(provided: &Type, allowed: &[TypeKind]) -> bool {
    allowed.contains(&provided.kind())
}
