use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use cranelift::{codegen::ir::StackSlot, module::DataId, prelude::Value};
use generational_arena::{Arena, Index};
use string_interner::symbol::SymbolUsize;

use crate::compiler::{
    Interner,
    codegen::types::Aggregate,
    error::{CompileError, CompileResult, SymbolClass},
    parser::{
        node::{Field, MacroArm},
        types::Type,
    },
    tokens::Span,
};

pub type ScopeId = Index;

/// Where a variable lives at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Stack(StackSlot),
    Global(DataId),
    /// Memory owned by the caller, e.g. the hidden struct-return pointer.
    Address(Value),
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub ty: Type,
    pub storage: Storage,
}

#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub node: Index,
    pub params: Vec<Type>,
    pub ret: Type,
}

#[derive(Debug)]
pub struct StructType {
    pub name: SymbolUsize,
    pub fields: Vec<Field>,
    pub generics: Vec<SymbolUsize>,
    /// method name -> mangled function name
    pub methods: HashMap<SymbolUsize, SymbolUsize>,
    pub traits: HashSet<SymbolUsize>,
    /// Materialised layouts keyed by monomorphised name.
    pub variants: RefCell<HashMap<String, Rc<Aggregate>>>,
}

impl StructType {
    pub fn new(name: SymbolUsize, fields: Vec<Field>, generics: Vec<SymbolUsize>) -> Self {
        Self {
            name,
            fields,
            generics,
            methods: HashMap::new(),
            traits: HashSet::new(),
            variants: RefCell::new(HashMap::new()),
        }
    }

    pub fn field_index(&self, name: SymbolUsize) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct EnumType {
    pub name: SymbolUsize,
    pub variants: Vec<SymbolUsize>,
    pub backing: Type,
}

impl EnumType {
    pub fn ordinal(&self, variant: SymbolUsize) -> Option<usize> {
        self.variants.iter().position(|v| *v == variant)
    }
}

#[derive(Debug, Clone)]
pub struct Macro {
    pub name: SymbolUsize,
    pub arms: Vec<MacroArm>,
}

#[derive(Debug, Clone)]
pub struct TraitDef {
    pub name: SymbolUsize,
    /// method name and parameter count
    pub methods: Vec<(SymbolUsize, usize)>,
}

#[derive(Debug, Clone)]
pub struct ReturnSlot {
    pub ty: Type,
    pub storage: Storage,
}

#[derive(Debug, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    vars: HashMap<SymbolUsize, Variable>,
    functions: HashMap<SymbolUsize, FunctionSig>,
    structs: HashMap<SymbolUsize, StructType>,
    enums: HashMap<SymbolUsize, EnumType>,
    aliases: HashMap<SymbolUsize, Type>,
    macros: HashMap<SymbolUsize, Macro>,
    traits: HashMap<SymbolUsize, TraitDef>,
    return_slot: Option<ReturnSlot>,
    /// Outermost scope of a function body. Locals declared outside it are
    /// out of reach.
    function_root: bool,
}

pub struct ScopeTree {
    scopes: Arena<Scope>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

fn name_of(interner: &Interner, name: SymbolUsize) -> String {
    interner.resolve(name).unwrap_or("<?>").to_string()
}

/// Generates the declare/lookup/resolve triple for one symbol class, plus a
/// mutable lookup when one is named after the resolver.
macro_rules! symbol_table {
    ($map:ident, $ty:ty, $class:expr, $declare:ident, $lookup:ident, $resolve:ident, $lookup_mut:ident) => {
        symbol_table!($map, $ty, $class, $declare, $lookup, $resolve);

        pub fn $lookup_mut(&mut self, scope: ScopeId, name: SymbolUsize) -> Option<&mut $ty> {
            let owner = self.owner(scope, |s| s.$map.contains_key(&name))?;
            self.scopes[owner].$map.get_mut(&name)
        }
    };
    ($map:ident, $ty:ty, $class:expr, $declare:ident, $lookup:ident, $resolve:ident) => {
        pub fn $declare(
            &mut self,
            scope: ScopeId,
            name: SymbolUsize,
            value: $ty,
            span: Span,
            interner: &Interner,
        ) -> CompileResult<()> {
            let table = &mut self.scopes[scope].$map;
            if table.contains_key(&name) {
                return Err(CompileError::DuplicateDeclaration {
                    class: $class,
                    name: name_of(interner, name),
                    span: Some(span.to_display(interner)),
                });
            }
            table.insert(name, value);
            Ok(())
        }

        pub fn $lookup(&self, scope: ScopeId, name: SymbolUsize) -> Option<&$ty> {
            let owner = self.owner(scope, |s| s.$map.contains_key(&name))?;
            self.scopes[owner].$map.get(&name)
        }

        pub fn $resolve(&self, scope: ScopeId, name: SymbolUsize, span: Span, interner: &Interner) -> CompileResult<&$ty> {
            self.$lookup(scope, name).ok_or_else(|| CompileError::UnresolvedSymbol {
                class: $class,
                name: name_of(interner, name),
                span: Some(span.to_display(interner)),
            })
        }
    };
}

impl ScopeTree {
    pub fn new() -> Self {
        Self { scopes: Arena::new() }
    }

    pub fn new_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.insert(Scope {
            parent,
            ..Default::default()
        })
    }

    pub fn set_parent(&mut self, scope: ScopeId, parent: ScopeId) {
        if scope != parent {
            self.scopes[scope].parent = Some(parent);
        }
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(scope).and_then(|s| s.parent)
    }

    /// Walks outwards from `scope` and returns the first scope matching `owns`.
    fn owner(&self, scope: ScopeId, owns: impl Fn(&Scope) -> bool) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scopes.get(id)?;
            if owns(s) {
                return Some(id);
            }
            current = s.parent;
        }
        None
    }

    pub fn declare_var(
        &mut self,
        scope: ScopeId,
        name: SymbolUsize,
        var: Variable,
        span: Span,
        interner: &Interner,
    ) -> CompileResult<()> {
        let table = &mut self.scopes[scope].vars;
        if table.contains_key(&name) {
            return Err(CompileError::DuplicateDeclaration {
                class: SymbolClass::Variable,
                name: name_of(interner, name),
                span: Some(span.to_display(interner)),
            });
        }
        table.insert(name, var);
        Ok(())
    }

    pub fn mark_function_root(&mut self, scope: ScopeId) {
        self.scopes[scope].function_root = true;
    }

    /// Like the other lookups, except that once the walk leaves a function
    /// body only statics still resolve.
    pub fn lookup_var(&self, scope: ScopeId, name: SymbolUsize) -> Option<&Variable> {
        let mut current = Some(scope);
        let mut left_function = false;
        while let Some(id) = current {
            let s = self.scopes.get(id)?;
            if let Some(var) = s.vars.get(&name) {
                if !left_function || matches!(var.storage, Storage::Global(_)) {
                    return Some(var);
                }
            }
            left_function |= s.function_root;
            current = s.parent;
        }
        None
    }

    pub fn resolve_var(&self, scope: ScopeId, name: SymbolUsize, span: Span, interner: &Interner) -> CompileResult<&Variable> {
        self.lookup_var(scope, name).ok_or_else(|| CompileError::UnresolvedSymbol {
            class: SymbolClass::Variable,
            name: name_of(interner, name),
            span: Some(span.to_display(interner)),
        })
    }

    symbol_table!(
        functions,
        FunctionSig,
        SymbolClass::Function,
        register_function,
        lookup_function,
        resolve_function
    );
    symbol_table!(
        structs,
        StructType,
        SymbolClass::Struct,
        add_struct_type,
        lookup_struct,
        resolve_struct,
        lookup_struct_mut
    );
    symbol_table!(enums, EnumType, SymbolClass::Enum, add_enum_type, lookup_enum, resolve_enum);
    symbol_table!(
        aliases,
        Type,
        SymbolClass::TypeAlias,
        add_type_alias,
        lookup_alias,
        resolve_alias
    );
    symbol_table!(macros, Macro, SymbolClass::Macro, declare_macro, lookup_macro, resolve_macro);
    symbol_table!(traits, TraitDef, SymbolClass::Trait, declare_trait, lookup_trait, resolve_trait);

    pub fn set_return_slot(&mut self, scope: ScopeId, slot: ReturnSlot) {
        self.scopes[scope].return_slot = Some(slot);
    }

    /// A nested scope without its own slot inherits its parent's.
    pub fn return_slot(&self, scope: ScopeId) -> Option<&ReturnSlot> {
        let owner = self.owner(scope, |s| s.return_slot.is_some())?;
        self.scopes[owner].return_slot.as_ref()
    }

    /// Moves every item-level symbol of `from` into `to`. Used after a macro
    /// expansion or include has been lowered in its temporary root.
    pub fn merge_items(&mut self, from: ScopeId, to: ScopeId, span: Span, interner: &Interner) -> CompileResult<()> {
        if from == to {
            return Ok(());
        }
        let Some(source) = self.scopes.get_mut(from) else {
            return Ok(());
        };
        let functions = std::mem::take(&mut source.functions);
        let structs = std::mem::take(&mut source.structs);
        let enums = std::mem::take(&mut source.enums);
        let aliases = std::mem::take(&mut source.aliases);
        let macros = std::mem::take(&mut source.macros);
        let traits = std::mem::take(&mut source.traits);

        for (name, value) in functions {
            self.register_function(to, name, value, span, interner)?;
        }
        for (name, value) in structs {
            self.add_struct_type(to, name, value, span, interner)?;
        }
        for (name, value) in enums {
            self.add_enum_type(to, name, value, span, interner)?;
        }
        for (name, value) in aliases {
            self.add_type_alias(to, name, value, span, interner)?;
        }
        for (name, value) in macros {
            self.declare_macro(to, name, value, span, interner)?;
        }
        for (name, value) in traits {
            self.declare_trait(to, name, value, span, interner)?;
        }
        Ok(())
    }

    /// Resolves through type aliases until a non-alias type is reached.
    pub fn unalias(&self, scope: ScopeId, ty: &Type) -> Type {
        let mut current = ty.clone();
        // alias chains are finite unless they are cyclic
        for _ in 0..64 {
            let next = match &current {
                Type::Path { name, args } if args.is_empty() => match self.lookup_alias(scope, *name) {
                    Some(aliased) => aliased.clone(),
                    None => return current,
                },
                _ => return current,
            };
            current = next;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ScopeTree, Interner, Span) {
        let mut interner = Interner::new();
        let file = interner.get_or_intern("test.ly");
        (ScopeTree::new(), interner, Span::new(file, 1, 1, 1, 1))
    }

    fn var(interner: &mut Interner, ty: &str, n: u32) -> Variable {
        Variable {
            ty: Type::primitive(interner, ty),
            storage: Storage::Stack(StackSlot::from_u32(n)),
        }
    }

    #[test]
    fn test_shadowing_across_scopes() {
        let (mut tree, mut interner, span) = setup();
        let x = interner.get_or_intern("x");
        let outer = tree.new_scope(None);
        let inner = tree.new_scope(Some(outer));

        let outer_var = var(&mut interner, "i32", 0);
        let inner_var = var(&mut interner, "f64", 1);
        tree.declare_var(outer, x, outer_var, span, &interner).unwrap();
        tree.declare_var(inner, x, inner_var, span, &interner).unwrap();

        let found = tree.lookup_var(inner, x).unwrap();
        assert_eq!(found.storage, Storage::Stack(StackSlot::from_u32(1)));
        let found = tree.lookup_var(outer, x).unwrap();
        assert_eq!(found.storage, Storage::Stack(StackSlot::from_u32(0)));
    }

    #[test]
    fn test_enclosing_function_locals_are_hidden() {
        let (mut tree, mut interner, span) = setup();
        let x = interner.get_or_intern("x");
        let g = interner.get_or_intern("g");
        let root = tree.new_scope(None);
        let outer_fn = tree.new_scope(Some(root));
        let inner_fn = tree.new_scope(Some(outer_fn));
        tree.mark_function_root(outer_fn);
        tree.mark_function_root(inner_fn);

        let local = var(&mut interner, "i32", 0);
        tree.declare_var(outer_fn, x, local, span, &interner).unwrap();
        let global = Variable {
            ty: Type::primitive(&mut interner, "i32"),
            storage: Storage::Global(DataId::from_u32(0)),
        };
        tree.declare_var(root, g, global, span, &interner).unwrap();

        assert!(tree.lookup_var(outer_fn, x).is_some());
        assert!(tree.lookup_var(inner_fn, x).is_none());
        assert!(tree.lookup_var(inner_fn, g).is_some());
    }

    #[test]
    fn test_redeclaration_in_same_scope_fails() {
        let (mut tree, mut interner, span) = setup();
        let x = interner.get_or_intern("x");
        let scope = tree.new_scope(None);

        let first = var(&mut interner, "i32", 0);
        let second = var(&mut interner, "i32", 1);
        tree.declare_var(scope, x, first, span, &interner).unwrap();
        let err = tree.declare_var(scope, x, second, span, &interner).unwrap_err();
        assert!(matches!(
            err,
            CompileError::DuplicateDeclaration {
                class: SymbolClass::Variable,
                ..
            }
        ));
    }

    #[test]
    fn test_unresolved_reports_name() {
        let (tree, mut interner, span) = setup();
        let mut tree = tree;
        let scope = tree.new_scope(None);
        let missing = interner.get_or_intern("missing");
        let err = tree.resolve_function(scope, missing, span, &interner).unwrap_err();
        match err {
            CompileError::UnresolvedSymbol { class, name, .. } => {
                assert_eq!(class, SymbolClass::Function);
                assert_eq!(name, "missing");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_return_slot_is_inherited() {
        let (mut tree, mut interner, _) = setup();
        let fn_scope = tree.new_scope(None);
        let body = tree.new_scope(Some(fn_scope));
        let nested = tree.new_scope(Some(body));
        tree.set_return_slot(
            fn_scope,
            ReturnSlot {
                ty: Type::primitive(&mut interner, "i32"),
                storage: Storage::Stack(StackSlot::from_u32(7)),
            },
        );
        let slot = tree.return_slot(nested).unwrap();
        assert_eq!(slot.storage, Storage::Stack(StackSlot::from_u32(7)));
    }

    #[test]
    fn test_merge_items_moves_symbols_and_detects_clashes() {
        let (mut tree, mut interner, span) = setup();
        let root = tree.new_scope(None);
        let temp = tree.new_scope(Some(root));
        let name = interner.get_or_intern("Color");
        let u32_ = Type::primitive(&mut interner, "u32");

        let color = EnumType {
            name,
            variants: vec![],
            backing: u32_.clone(),
        };
        tree.add_enum_type(temp, name, color.clone(), span, &interner).unwrap();
        tree.merge_items(temp, root, span, &interner).unwrap();
        assert!(tree.lookup_enum(root, name).is_some());

        tree.add_enum_type(temp, name, color, span, &interner).unwrap();
        assert!(tree.merge_items(temp, root, span, &interner).is_err());
    }

    #[test]
    fn test_unalias_follows_chains() {
        let (mut tree, mut interner, span) = setup();
        let scope = tree.new_scope(None);
        let a = interner.get_or_intern("A");
        let b = interner.get_or_intern("B");
        let i64_ = Type::primitive(&mut interner, "i64");
        tree.add_type_alias(scope, a, Type::path(b), span, &interner).unwrap();
        tree.add_type_alias(scope, b, i64_.clone(), span, &interner).unwrap();
        assert_eq!(tree.unalias(scope, &Type::path(a)), i64_);
    }

    #[test]
    fn test_struct_is_updated_in_its_declaring_scope() {
        let (mut tree, mut interner, span) = setup();
        let root = tree.new_scope(None);
        let inner = tree.new_scope(Some(root));
        let p = interner.get_or_intern("P");
        let get = interner.get_or_intern("get");
        let mangled = interner.get_or_intern("P_get");
        tree.add_struct_type(root, p, StructType::new(p, vec![], vec![]), span, &interner).unwrap();

        tree.lookup_struct_mut(inner, p).unwrap().methods.insert(get, mangled);
        assert_eq!(tree.lookup_struct(root, p).unwrap().methods.get(&get), Some(&mangled));
        assert!(tree.lookup_struct_mut(inner, get).is_none());
    }
}
