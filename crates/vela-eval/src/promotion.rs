//! Java numeric and `String` promotion.
//!
//! A fixed lattice over the closed [`TypeTag`] set, computed once and
//! consulted only at compile time. Sub-`int` kinds promote to `int`; the
//! widening order is `int < long < float < double`; `boolean` combines only
//! with `boolean`; `String` absorbs every operand of `+`; every other
//! combination is `Undefined` and rejected by the compiler.

use vela_jdi::TypeTag;

/// Binary numeric/`String` promotion (JLS 5.6.2, plus string conversion).
pub fn binary_promotion(a: TypeTag, b: TypeTag) -> TypeTag {
    use TypeTag::*;
    match (a, b) {
        (Undefined, _) | (_, Undefined) => Undefined,
        (Void, _) | (_, Void) => Undefined,
        (String, _) | (_, String) => String,
        (Boolean, Boolean) => Boolean,
        (Boolean, _) | (_, Boolean) => Undefined,
        (Object, _) | (_, Object) => Undefined,
        (Null, _) | (_, Null) => Undefined,
        (Double, _) | (_, Double) => Double,
        (Float, _) | (_, Float) => Float,
        (Long, _) | (_, Long) => Long,
        // char, byte, short and int all meet at int
        _ => Int,
    }
}

/// Unary numeric promotion, defined as promotion against `int`.
pub fn unary_promotion(t: TypeTag) -> TypeTag {
    binary_promotion(t, TypeTag::Int)
}
