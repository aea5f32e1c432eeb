//! Expression AST and binding environment.
//!
//! The AST is produced by an external parser and arrives validated, with
//! byte spans into the original source text. The binding environment is
//! owned by the caller (the debugger frame) for the duration of one
//! evaluation and is read-only to the engine.

use vela_core::Span;
use vela_jdi::{FieldDescriptor, JavaType, LocalSlot, MethodDescriptor};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitOr,
    BitXor,
    AndAnd,
    OrOr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::AndAnd => "&&",
            BinaryOp::OrOr => "||",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    /// Unary `+` (numeric promotion only).
    Plus,
    Neg,
    Not,
    BitNot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    /// A simple name, resolved against {local, instance field, static field,
    /// enclosing-type field} in that order.
    Name(String),
    This,
    FieldAccess {
        receiver: Box<Expr>,
        name: String,
    },
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    /// Simple (`op: None`) or compound (`op: Some(..)`) assignment.
    Assign {
        target: Box<Expr>,
        op: Option<BinaryOp>,
        value: Box<Expr>,
    },
    PrefixIncDec {
        op: IncDecOp,
        target: Box<Expr>,
    },
    PostfixIncDec {
        op: IncDecOp,
        target: Box<Expr>,
    },
    /// Unqualified calls (`receiver: None`) dispatch on the frame's
    /// receiving type.
    MethodCall {
        receiver: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    New {
        type_name: String,
        args: Vec<Expr>,
    },
    NewArray {
        element_type: JavaType,
        dimensions: Vec<Expr>,
    },
    Cast {
        ty: JavaType,
        expr: Box<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Null,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalBinding {
    pub name: String,
    pub slot: LocalSlot,
    pub ty: JavaType,
}

impl LocalBinding {
    pub fn new(name: impl Into<String>, slot: LocalSlot, ty: JavaType) -> Self {
        Self {
            name: name.into(),
            slot,
            ty,
        }
    }
}

/// Lexical bindings visible to one evaluation, supplied by the debugger
/// frame: local variables, the receiving type and its visible members, and
/// the member universe of any other types the expression may touch.
#[derive(Clone, Debug, Default)]
pub struct BindingEnv {
    pub locals: Vec<LocalBinding>,
    /// Fully qualified name of the type declaring the suspended frame.
    pub receiver_type: String,
    /// Whether the frame has a `this` (false in static methods).
    pub has_this: bool,
    /// Enclosing types, innermost first, for outer-field resolution.
    pub enclosing_types: Vec<String>,
    pub fields: Vec<FieldDescriptor>,
    pub methods: Vec<MethodDescriptor>,
    pub constructors: Vec<MethodDescriptor>,
}

impl BindingEnv {
    pub fn new(receiver_type: impl Into<String>) -> Self {
        Self {
            receiver_type: receiver_type.into(),
            has_this: true,
            ..Default::default()
        }
    }

    pub fn local(&self, name: &str) -> Option<&LocalBinding> {
        self.locals.iter().find(|local| local.name == name)
    }

    /// A field of `declaring` by simple name; instance fields shadow static
    /// ones of the same name.
    pub fn field_named(&self, declaring: &str, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| {
                field.declaring_type == declaring && field.name == name && !field.is_static
            })
            .or_else(|| {
                self.fields.iter().find(|field| {
                    field.declaring_type == declaring && field.name == name && field.is_static
                })
            })
    }

    /// Resolve an unqualified field name against the receiving type, then
    /// the enclosing types from innermost out.
    pub fn resolve_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.field_named(&self.receiver_type, name).or_else(|| {
            self.enclosing_types
                .iter()
                .find_map(|outer| self.field_named(outer, name))
        })
    }

    pub fn methods_named(&self, declaring: &str, name: &str) -> Vec<&MethodDescriptor> {
        self.methods
            .iter()
            .filter(|method| method.declaring_type == declaring && method.name == name)
            .collect()
    }

    pub fn constructors_of(&self, type_name: &str) -> Vec<&MethodDescriptor> {
        self.constructors
            .iter()
            .filter(|constructor| constructor.declaring_type == type_name)
            .collect()
    }
}
