//! Expression-tree IR consumed by the converter.
//!
//! The vocabulary is fixed: constants, the context parameter, unary and
//! binary operators, member access, indexing, method calls (including the
//! symbol accessor patterns), construction, array construction and callable
//! invocation. `Lambda` and `Conditional` exist so that front ends can hand
//! them over, but the converter rejects them.
//!
//! Members are referenced by [`MemberId`] rather than by name: a front end
//! has already bound every member against the [`TypeRegistry`](crate::TypeRegistry).

use serde::{Deserialize, Serialize};

use crate::id::{ArgumentId, DelegateArgumentId, MemberId, SymbolRef, VariableId};
use crate::type_id::TypeId;
use crate::types::{ConstValue, ParamDef};

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Unary operators. The cast family carries its target type on
/// [`Expr::Unary::ty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Boolean not, or bitwise complement on integers.
    Not,
    Negate,
    /// Conversion; numeric narrowing wraps.
    Cast,
    /// Conversion; numeric narrowing is range-checked.
    CheckedCast,
    /// Reference conversion yielding `null` instead of failing.
    TypeAs,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    /// Non-short-circuit and (logical on Bool, bitwise on integers).
    And,
    /// Non-short-circuit or (logical on Bool, bitwise on integers).
    Or,
    AndAlso,
    OrElse,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// One-dimensional array element access.
    ArrayIndex,
}

impl BinaryOp {
    pub fn is_short_circuit(self) -> bool {
        matches!(self, BinaryOp::AndAlso | BinaryOp::OrElse)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo
        )
    }
}

/// Symbol accessor methods recognised by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intrinsic {
    /// `variable.Get(context)`: target is the variable, argument the context.
    VariableGet,
    /// `argument.Get(context)`.
    ArgumentGet,
    /// `delegateArgument.Get(context)`.
    DelegateArgumentGet,
    /// `context.GetValue(symbolOrName)`: target is the context, the single
    /// argument is a symbol or a name looked up through the scope chain.
    ContextGetValue,
}

/// The method a [`Expr::Call`] invokes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MethodRef {
    Member(MemberId),
    /// A symbol accessor producing a value of `ty`.
    Intrinsic { accessor: Intrinsic, ty: TypeId },
}

// ---------------------------------------------------------------------------
// Expression tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Constant {
        value: ConstValue,
        ty: TypeId,
    },
    /// The execution-context parameter of the enclosing expression.
    Context,
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        /// Target type of cast operators.
        ty: Option<TypeId>,
        /// Explicit operator method (overload).
        method: Option<MemberId>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        checked: bool,
        method: Option<MemberId>,
    },
    /// Field or property access; `target` is `None` for static members.
    Member {
        target: Option<Box<Expr>>,
        member: MemberId,
    },
    /// Multi-dimensional array element or custom indexer access.
    Index {
        target: Box<Expr>,
        indices: Vec<Expr>,
    },
    Call {
        target: Option<Box<Expr>>,
        method: MethodRef,
        args: Vec<Expr>,
    },
    /// Object construction; `constructor: None` selects the best match by
    /// argument types.
    New {
        ty: TypeId,
        constructor: Option<MemberId>,
        args: Vec<Expr>,
    },
    /// Array of `element` with one dimension per bound.
    NewArrayBounds {
        element: TypeId,
        bounds: Vec<Expr>,
    },
    /// One-dimensional array initialised with `items`.
    NewArrayInit {
        element: TypeId,
        items: Vec<Expr>,
    },
    /// Invocation of a callable value.
    Invoke {
        callable: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Explicit evaluation order of an operand or argument.
    Ordered {
        order: u32,
        expr: Box<Expr>,
    },
    Lambda {
        params: Vec<ParamDef>,
        body: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
}

impl Expr {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Constant { .. } => "Constant",
            Expr::Context => "Context",
            Expr::Unary { .. } => "Unary",
            Expr::Binary { .. } => "Binary",
            Expr::Member { .. } => "Member",
            Expr::Index { .. } => "Index",
            Expr::Call { .. } => "Call",
            Expr::New { .. } => "New",
            Expr::NewArrayBounds { .. } => "NewArrayBounds",
            Expr::NewArrayInit { .. } => "NewArrayInit",
            Expr::Invoke { .. } => "Invoke",
            Expr::Ordered { .. } => "Ordered",
            Expr::Lambda { .. } => "Lambda",
            Expr::Conditional { .. } => "Conditional",
        }
    }

    /// Strips [`Expr::Ordered`] wrappers, returning the explicit order (if
    /// any) and the wrapped expression.
    pub fn unwrap_order(&self) -> (Option<u32>, &Expr) {
        match self {
            Expr::Ordered { order, expr } => {
                let (_, inner) = expr.unwrap_order();
                (Some(*order), inner)
            }
            other => (None, other),
        }
    }

    // -- Builders --

    pub fn constant(value: ConstValue, ty: TypeId) -> Expr {
        Expr::Constant { value, ty }
    }

    pub fn bool(v: bool) -> Expr {
        Expr::constant(ConstValue::Bool(v), TypeId::BOOL)
    }

    pub fn i32(v: i32) -> Expr {
        Expr::constant(ConstValue::I32(v), TypeId::I32)
    }

    pub fn i64(v: i64) -> Expr {
        Expr::constant(ConstValue::I64(v), TypeId::I64)
    }

    pub fn f64(v: f64) -> Expr {
        Expr::constant(ConstValue::F64(v), TypeId::F64)
    }

    pub fn string(v: &str) -> Expr {
        Expr::constant(ConstValue::Str(v.to_string()), TypeId::STRING)
    }

    pub fn null(ty: TypeId) -> Expr {
        Expr::constant(ConstValue::Null, ty)
    }

    /// A symbol identity literal, as used by accessor patterns.
    pub fn symbol(symbol: SymbolRef) -> Expr {
        Expr::constant(ConstValue::Symbol(symbol), TypeId::OBJECT)
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
            ty: None,
            method: None,
        }
    }

    pub fn cast(op: UnaryOp, operand: Expr, ty: TypeId) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
            ty: Some(ty),
            method: None,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            checked: false,
            method: None,
        }
    }

    pub fn checked(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            checked: true,
            method: None,
        }
    }

    /// A binary operator bound to an explicit operator method.
    pub fn binary_with(op: BinaryOp, left: Expr, right: Expr, method: MemberId) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            checked: false,
            method: Some(method),
        }
    }

    pub fn member(target: Expr, member: MemberId) -> Expr {
        Expr::Member {
            target: Some(Box::new(target)),
            member,
        }
    }

    pub fn static_member(member: MemberId) -> Expr {
        Expr::Member {
            target: None,
            member,
        }
    }

    pub fn index(target: Expr, indices: Vec<Expr>) -> Expr {
        Expr::Index {
            target: Box::new(target),
            indices,
        }
    }

    pub fn array_index(array: Expr, index: Expr) -> Expr {
        Expr::binary(BinaryOp::ArrayIndex, array, index)
    }

    pub fn call(target: Expr, method: MemberId, args: Vec<Expr>) -> Expr {
        Expr::Call {
            target: Some(Box::new(target)),
            method: MethodRef::Member(method),
            args,
        }
    }

    pub fn static_call(method: MemberId, args: Vec<Expr>) -> Expr {
        Expr::Call {
            target: None,
            method: MethodRef::Member(method),
            args,
        }
    }

    fn accessor(accessor: Intrinsic, symbol: SymbolRef, ty: TypeId) -> Expr {
        Expr::Call {
            target: Some(Box::new(Expr::symbol(symbol))),
            method: MethodRef::Intrinsic { accessor, ty },
            args: vec![Expr::Context],
        }
    }

    /// `variable.Get(context)`.
    pub fn variable(id: VariableId, ty: TypeId) -> Expr {
        Expr::accessor(Intrinsic::VariableGet, SymbolRef::Variable(id), ty)
    }

    /// `argument.Get(context)`.
    pub fn argument(id: ArgumentId, ty: TypeId) -> Expr {
        Expr::accessor(Intrinsic::ArgumentGet, SymbolRef::Argument(id), ty)
    }

    /// `delegateArgument.Get(context)`.
    pub fn delegate_argument(id: DelegateArgumentId, ty: TypeId) -> Expr {
        Expr::accessor(
            Intrinsic::DelegateArgumentGet,
            SymbolRef::DelegateArgument(id),
            ty,
        )
    }

    /// `context.GetValue(name)`, resolved through the scope chain.
    pub fn context_value(name: &str, ty: TypeId) -> Expr {
        Expr::Call {
            target: Some(Box::new(Expr::Context)),
            method: MethodRef::Intrinsic {
                accessor: Intrinsic::ContextGetValue,
                ty,
            },
            args: vec![Expr::string(name)],
        }
    }

    pub fn new_object(ty: TypeId, args: Vec<Expr>) -> Expr {
        Expr::New {
            ty,
            constructor: None,
            args,
        }
    }

    pub fn new_array(element: TypeId, bounds: Vec<Expr>) -> Expr {
        Expr::NewArrayBounds { element, bounds }
    }

    pub fn array_init(element: TypeId, items: Vec<Expr>) -> Expr {
        Expr::NewArrayInit { element, items }
    }

    pub fn invoke(callable: Expr, args: Vec<Expr>) -> Expr {
        Expr::Invoke {
            callable: Box::new(callable),
            args,
        }
    }

    pub fn ordered(order: u32, expr: Expr) -> Expr {
        Expr::Ordered {
            order,
            expr: Box::new(expr),
        }
    }
}
