use string_interner::symbol::SymbolUsize;

use crate::compiler::Interner;

/// A type as written in source. Resolution is name-based and happens through
/// the scope chain; two `Type`s are never compared structurally for identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Path { name: SymbolUsize, args: Vec<Type> },
    Pointer { inner: Box<Type>, mutable: bool, is_ref: bool },
    Array { inner: Box<Type>, len: u64 },
    FunctionPointer { params: Vec<Type>, ret: Box<Type> },
    /// `Self` inside a trait declaration.
    Trait(SymbolUsize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Void,
}

impl Primitive {
    pub fn from_name(name: &str) -> Option<Self> {
        use Primitive::*;
        Some(match name {
            "i8" => I8,
            "i16" => I16,
            "i32" => I32,
            "i64" => I64,
            "u8" => U8,
            "u16" => U16,
            "u32" => U32,
            "u64" => U64,
            "f32" => F32,
            "f64" => F64,
            "bool" => Bool,
            "void" => Void,
            _ => return None,
        })
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, Primitive::F32 | Primitive::F64 | Primitive::Bool | Primitive::Void)
    }
}

impl Type {
    pub fn path(name: SymbolUsize) -> Self {
        Type::Path { name, args: Vec::new() }
    }

    pub fn primitive(interner: &mut Interner, name: &str) -> Self {
        Type::path(interner.get_or_intern(name))
    }

    pub fn pointer_to(inner: Type) -> Self {
        Type::Pointer {
            inner: Box::new(inner),
            mutable: true,
            is_ref: false,
        }
    }

    pub fn as_primitive(&self, interner: &Interner) -> Option<Primitive> {
        match self {
            Type::Path { name, args } if args.is_empty() => Primitive::from_name(interner.resolve(*name)?),
            _ => None,
        }
    }

    pub fn is_void(&self, interner: &Interner) -> bool {
        self.as_primitive(interner) == Some(Primitive::Void)
    }

    /// Replaces every occurrence of a generic parameter by its argument.
    pub fn substitute(&self, params: &[SymbolUsize], args: &[Type]) -> Type {
        match self {
            Type::Path { name, args: own } if own.is_empty() => match params.iter().position(|p| p == name) {
                Some(i) => args.get(i).cloned().unwrap_or_else(|| self.clone()),
                None => self.clone(),
            },
            Type::Path { name, args: own } => Type::Path {
                name: *name,
                args: own.iter().map(|a| a.substitute(params, args)).collect(),
            },
            Type::Pointer { inner, mutable, is_ref } => Type::Pointer {
                inner: Box::new(inner.substitute(params, args)),
                mutable: *mutable,
                is_ref: *is_ref,
            },
            Type::Array { inner, len } => Type::Array {
                inner: Box::new(inner.substitute(params, args)),
                len: *len,
            },
            Type::FunctionPointer { params: ps, ret } => Type::FunctionPointer {
                params: ps.iter().map(|p| p.substitute(params, args)).collect(),
                ret: Box::new(ret.substitute(params, args)),
            },
            Type::Trait(name) => Type::Trait(*name),
        }
    }

    /// Whether the generic parameter `param` occurs anywhere in this type.
    pub fn mentions(&self, param: SymbolUsize) -> bool {
        match self {
            Type::Path { name, args } => (args.is_empty() && *name == param) || args.iter().any(|a| a.mentions(param)),
            Type::Pointer { inner, .. } | Type::Array { inner, .. } => inner.mentions(param),
            Type::FunctionPointer { params, ret } => params.iter().any(|p| p.mentions(param)) || ret.mentions(param),
            Type::Trait(_) => false,
        }
    }

    pub fn display(&self, interner: &Interner) -> String {
        let name = |sym: &SymbolUsize| interner.resolve(*sym).unwrap_or("<?>").to_string();
        match self {
            Type::Path { name: n, args } if args.is_empty() => name(n),
            Type::Path { name: n, args } => format!(
                "{}<{}>",
                name(n),
                args.iter().map(|a| a.display(interner)).collect::<Vec<_>>().join(", ")
            ),
            Type::Pointer { inner, mutable, is_ref } => format!(
                "{}{}{}",
                if *is_ref { "&" } else { "*" },
                if *mutable { "mut " } else { "" },
                inner.display(interner)
            ),
            Type::Array { inner, len } => format!("[{}; {}]", inner.display(interner), len),
            Type::FunctionPointer { params, ret } => format!(
                "fn({}) -> {}",
                params.iter().map(|p| p.display(interner)).collect::<Vec<_>>().join(", "),
                ret.display(interner)
            ),
            Type::Trait(_) => "Self".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_reaches_nested_positions() {
        let mut interner = Interner::new();
        let t = interner.get_or_intern("T");
        let pair = interner.get_or_intern("Pair");
        let i32_ = Type::primitive(&mut interner, "i32");

        let field = Type::Array {
            inner: Box::new(Type::pointer_to(Type::Path {
                name: pair,
                args: vec![Type::path(t)],
            })),
            len: 2,
        };
        let substituted = field.substitute(&[t], &[i32_]);
        assert_eq!(substituted.display(&interner), "[*mut Pair<i32>; 2]");
    }

    #[test]
    fn test_primitive_lookup() {
        let mut interner = Interner::new();
        let u8_ = Type::primitive(&mut interner, "u8");
        let point = Type::primitive(&mut interner, "Point");
        assert_eq!(u8_.as_primitive(&interner), Some(Primitive::U8));
        assert_eq!(point.as_primitive(&interner), None);
    }
}
