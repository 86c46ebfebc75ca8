use crate::compiler::tokens::{Punctuation, TokenKind};

use super::node::BinOpKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum BindingPower {
    None = 0,
    Assignment = 1, // = (right-associative)
    LogicalOr = 2,  // || (right-associative)
    LogicalAnd = 3, // && (right-associative)
    Equality = 4,   // == !=
    Comparison = 5, // < > <= >=
    Term = 6,       // + -
    Factor = 7,     // * / %
    Unary = 8,      // prefix & * ! - and casts
    Postfix = 9,    // calls, indexing, member access
}

impl BindingPower {
    /// The power operands to the right of an operator must exceed. Right
    /// associative operators accept their own level again.
    pub fn right(self, right_assoc: bool) -> BindingPower {
        if right_assoc {
            return self;
        }
        match self {
            BindingPower::None => BindingPower::Assignment,
            BindingPower::Assignment => BindingPower::LogicalOr,
            BindingPower::LogicalOr => BindingPower::LogicalAnd,
            BindingPower::LogicalAnd => BindingPower::Equality,
            BindingPower::Equality => BindingPower::Comparison,
            BindingPower::Comparison => BindingPower::Term,
            BindingPower::Term => BindingPower::Factor,
            BindingPower::Factor => BindingPower::Unary,
            BindingPower::Unary | BindingPower::Postfix => BindingPower::Postfix,
        }
    }
}

/// Left binding power and associativity of an infix/postfix token.
pub fn infix_binding_power(kind: TokenKind) -> (BindingPower, bool) {
    use Punctuation::*;
    let TokenKind::Punctuation(p) = kind else {
        return (BindingPower::None, false);
    };
    match p {
        Eq => (BindingPower::Assignment, true),
        PipePipe => (BindingPower::LogicalOr, true),
        AmpAmp => (BindingPower::LogicalAnd, true),
        EqEq | NotEq => (BindingPower::Equality, false),
        LessThan | LessThanOrEq | GreaterThan | GreaterThanOrEq => (BindingPower::Comparison, false),
        Plus | Minus => (BindingPower::Term, false),
        Star | Slash | Percent => (BindingPower::Factor, false),
        OpenParen | OpenBracket | Dot | Arrow => (BindingPower::Postfix, false),
        _ => (BindingPower::None, false),
    }
}

pub fn binary_op(p: Punctuation) -> Option<BinOpKind> {
    use Punctuation::*;
    Some(match p {
        Plus => BinOpKind::Add,
        Minus => BinOpKind::Sub,
        Star => BinOpKind::Mul,
        Slash => BinOpKind::Div,
        Percent => BinOpKind::Mod,
        EqEq => BinOpKind::Eq,
        NotEq => BinOpKind::NotEq,
        LessThan => BinOpKind::LessThan,
        LessThanOrEq => BinOpKind::LessThanOrEq,
        GreaterThan => BinOpKind::GreaterThan,
        GreaterThanOrEq => BinOpKind::GreaterThanOrEq,
        AmpAmp => BinOpKind::And,
        PipePipe => BinOpKind::Or,
        _ => return None,
    })
}
