use std::cmp::Ordering;

use cranelift::prelude::{FunctionBuilder, InstBuilder, Value};

use super::{ptr_width, types::BackendType};

/// How a value of one backend type becomes another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    /// Same representation.
    Identity,
    IntResize { signed: bool },
    IntToFloat { signed: bool },
    FloatToInt { signed: bool },
    FloatResize,
    /// An array's address used as a pointer to its first element.
    Decay,
}

fn pointer_like(ty: &BackendType) -> bool {
    matches!(ty, BackendType::Pointer | BackendType::FnPointer)
}

/// The conversion table shared by explicit casts and implicit coercions.
/// `None` means the conversion is not allowed.
pub fn cast_kind(from: &BackendType, to: &BackendType) -> Option<CastKind> {
    use BackendType::*;

    if from == to {
        return Some(CastKind::Identity);
    }
    let signed = from.is_signed();
    Some(match (from, to) {
        (Int { .. } | Bool, Int { .. }) => CastKind::IntResize { signed },
        (Int { .. }, Float { .. }) => CastKind::IntToFloat { signed },
        (Float { .. }, Int { .. }) => CastKind::FloatToInt { signed: to.is_signed() },
        (Float { .. }, Float { .. }) => CastKind::FloatResize,
        (f, t) if pointer_like(f) && pointer_like(t) => CastKind::Identity,
        (Int { .. }, t) if pointer_like(t) => CastKind::IntResize { signed },
        (f, Int { .. }) if pointer_like(f) => CastKind::IntResize { signed: false },
        (Array { .. }, Pointer) => CastKind::Decay,
        _ => return None,
    })
}

/// Emits the instructions for `kind`. `v` is a value of `from`, or for
/// [`CastKind::Decay`] the array's address.
pub fn emit_cast(b: &mut FunctionBuilder, kind: CastKind, v: Value, from: &BackendType, to: &BackendType) -> Value {
    let target = match to.clif() {
        Some(t) => t,
        None => return v,
    };
    match kind {
        CastKind::Identity | CastKind::Decay => v,
        CastKind::IntResize { signed } => {
            let source = from.clif().unwrap_or(ptr_width().to_clif());
            match target.bits().cmp(&source.bits()) {
                Ordering::Less => b.ins().ireduce(target, v),
                Ordering::Greater if signed => b.ins().sextend(target, v),
                Ordering::Greater => b.ins().uextend(target, v),
                Ordering::Equal => v,
            }
        }
        CastKind::IntToFloat { signed: true } => b.ins().fcvt_from_sint(target, v),
        CastKind::IntToFloat { signed: false } => b.ins().fcvt_from_uint(target, v),
        CastKind::FloatToInt { signed: true } => b.ins().fcvt_to_sint_sat(target, v),
        CastKind::FloatToInt { signed: false } => b.ins().fcvt_to_uint_sat(target, v),
        CastKind::FloatResize => {
            let source = from.clif().map(|t| t.bits()).unwrap_or(64);
            match target.bits().cmp(&source) {
                Ordering::Less => b.ins().fdemote(target, v),
                Ordering::Greater => b.ins().fpromote(target, v),
                Ordering::Equal => v,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::compiler::codegen::types::Aggregate;

    const I32: BackendType = BackendType::Int { bits: 32, signed: true };
    const U8: BackendType = BackendType::Int { bits: 8, signed: false };
    const I64: BackendType = BackendType::Int { bits: 64, signed: true };
    const F64: BackendType = BackendType::Float { bits: 64 };
    const F32: BackendType = BackendType::Float { bits: 32 };

    #[test]
    fn test_integer_resizing_follows_source_signedness() {
        assert_eq!(cast_kind(&I32, &I64), Some(CastKind::IntResize { signed: true }));
        assert_eq!(cast_kind(&U8, &I64), Some(CastKind::IntResize { signed: false }));
        assert_eq!(cast_kind(&BackendType::Bool, &I32), Some(CastKind::IntResize { signed: false }));
    }

    #[test]
    fn test_float_conversions() {
        assert_eq!(cast_kind(&I32, &F64), Some(CastKind::IntToFloat { signed: true }));
        assert_eq!(cast_kind(&F64, &U8), Some(CastKind::FloatToInt { signed: false }));
        assert_eq!(cast_kind(&F64, &F32), Some(CastKind::FloatResize));
    }

    #[test]
    fn test_pointer_conversions() {
        use BackendType::*;
        assert_eq!(cast_kind(&Pointer, &FnPointer), Some(CastKind::Identity));
        assert_eq!(cast_kind(&I64, &Pointer), Some(CastKind::IntResize { signed: true }));
        assert_eq!(cast_kind(&Pointer, &I64), Some(CastKind::IntResize { signed: false }));
        let array = Array {
            elem: Box::new(I32),
            len: 4,
        };
        assert_eq!(cast_kind(&array, &Pointer), Some(CastKind::Decay));
    }

    #[test]
    fn test_rejected_conversions() {
        let agg = BackendType::Struct(Rc::new(Aggregate {
            name: "P".into(),
            fields: vec![],
            offsets: vec![],
            size: 0,
            align: 1,
        }));
        assert_eq!(cast_kind(&agg, &I32), None);
        assert_eq!(cast_kind(&I32, &BackendType::Bool), None);
        assert_eq!(cast_kind(&F64, &BackendType::Pointer), None);
        assert_eq!(cast_kind(&BackendType::Void, &I32), None);
    }
}
