//! AST lowering.
//!
//! A single post-order walk over the expression tree. Static types are
//! computed bottom-up; numeric promotion and overload resolution happen
//! here, never during execution. The emitted sequence encodes Java's strict
//! left-to-right evaluation order; `&&`, `||` and `?:` lower to conditional
//! jumps so the untaken operand is never on the executed path.

use tracing::debug;

use vela_core::Span;
use vela_jdi::{
    FieldDescriptor, JavaType, LocalSlot, MethodDescriptor, TypeTag, JAVA_LANG_OBJECT,
};

use crate::ast::{BinaryOp, BindingEnv, Expr, ExprKind, IncDecOp, Literal, UnaryOp};
use crate::error::CompileError;
use crate::instruction::{ArithOp, CmpOp, Instruction, InstructionSequence, UnOp};
use crate::promotion::{binary_promotion, unary_promotion};

/// Lower `expr` to an instruction sequence, or fail with a diagnosis naming
/// the offending sub-expression. Pure: no remote interaction happens here.
pub fn compile(expr: &Expr, env: &BindingEnv) -> Result<InstructionSequence, CompileError> {
    let mut compiler = Compiler {
        env,
        code: InstructionSequence::new(),
    };
    let ty = compiler.compile_expr(expr)?;
    debug!(instructions = compiler.code.len(), result_type = %ty, "compiled expression");
    Ok(compiler.code)
}

struct Compiler<'e> {
    env: &'e BindingEnv,
    code: InstructionSequence,
}

/// An assignment target with its address computation already emitted.
enum Target {
    Local { slot: LocalSlot, ty: JavaType },
    Field {
        field: FieldDescriptor,
        receiver_on_stack: bool,
    },
    Element { ty: JavaType },
}

impl Target {
    fn ty(&self) -> &JavaType {
        match self {
            Target::Local { ty, .. } => ty,
            Target::Field { field, .. } => &field.ty,
            Target::Element { ty } => ty,
        }
    }
}

impl<'e> Compiler<'e> {
    fn compile_expr(&mut self, expr: &Expr) -> Result<JavaType, CompileError> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(self.compile_literal(literal)),
            ExprKind::Name(name) => self.compile_name(name, expr.span),
            ExprKind::This => {
                self.code.emit(Instruction::PushThis);
                Ok(JavaType::Reference(self.env.receiver_type.clone()))
            }
            ExprKind::FieldAccess { receiver, name } => {
                self.compile_field_access(receiver, name, expr.span)
            }
            ExprKind::ArrayAccess { array, index } => {
                self.compile_array_access(array, index, expr.span)
            }
            ExprKind::Unary { op, operand } => self.compile_unary(*op, operand, expr.span),
            ExprKind::Binary { op, lhs, rhs } => self.compile_binary(*op, lhs, rhs, expr.span),
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => self.compile_conditional(condition, then_branch, else_branch, expr.span),
            ExprKind::Assign { target, op, value } => {
                self.compile_assign(target, *op, value, expr.span)
            }
            ExprKind::PrefixIncDec { op, target } => {
                self.compile_inc_dec(*op, target, false, expr.span)
            }
            ExprKind::PostfixIncDec { op, target } => {
                self.compile_inc_dec(*op, target, true, expr.span)
            }
            ExprKind::MethodCall {
                receiver,
                name,
                args,
            } => self.compile_method_call(receiver.as_deref(), name, args, expr.span),
            ExprKind::New { type_name, args } => self.compile_new(type_name, args, expr.span),
            ExprKind::NewArray {
                element_type,
                dimensions,
            } => self.compile_new_array(element_type, dimensions, expr.span),
            ExprKind::Cast { ty, expr: inner } => self.compile_cast(ty, inner, expr.span),
        }
    }

    fn compile_literal(&mut self, literal: &Literal) -> JavaType {
        match literal {
            Literal::Boolean(v) => {
                self.code.emit(Instruction::PushBoolean(*v));
                JavaType::Boolean
            }
            Literal::Char(v) => {
                self.code.emit(Instruction::PushChar(*v));
                JavaType::Char
            }
            Literal::Int(v) => {
                self.code.emit(Instruction::PushInt(*v));
                JavaType::Int
            }
            Literal::Long(v) => {
                self.code.emit(Instruction::PushLong(*v));
                JavaType::Long
            }
            Literal::Float(v) => {
                self.code.emit(Instruction::PushFloat(*v));
                JavaType::Float
            }
            Literal::Double(v) => {
                self.code.emit(Instruction::PushDouble(*v));
                JavaType::Double
            }
            Literal::String(s) => {
                self.code.emit(Instruction::PushString(s.clone()));
                JavaType::string()
            }
            Literal::Null => {
                self.code.emit(Instruction::PushNull);
                JavaType::Null
            }
        }
    }

    fn compile_name(&mut self, name: &str, span: Span) -> Result<JavaType, CompileError> {
        let env = self.env;
        if let Some(local) = env.local(name) {
            self.code.emit(Instruction::LoadLocal(local.slot));
            return Ok(local.ty.clone());
        }
        if let Some(field) = env.resolve_field(name) {
            let field = field.clone();
            return self.emit_field_read(field, name, span);
        }
        Err(CompileError::UnresolvedName {
            name: name.to_string(),
            span,
        })
    }

    fn emit_field_read(
        &mut self,
        field: FieldDescriptor,
        name: &str,
        span: Span,
    ) -> Result<JavaType, CompileError> {
        if field.is_static {
            self.code.emit(Instruction::GetStaticField(field.clone()));
        } else {
            if !self.env.has_this {
                return Err(CompileError::InstanceMemberInStaticContext {
                    name: name.to_string(),
                    span,
                });
            }
            self.code.emit(Instruction::PushThis);
            self.code.emit(Instruction::GetField(field.clone()));
        }
        Ok(field.ty)
    }

    fn compile_field_access(
        &mut self,
        receiver: &Expr,
        name: &str,
        span: Span,
    ) -> Result<JavaType, CompileError> {
        let receiver_ty = self.compile_expr(receiver)?;
        if matches!(receiver_ty, JavaType::Array(_)) && name == "length" {
            self.code.emit(Instruction::ArrayLength);
            return Ok(JavaType::Int);
        }
        let class_name = match reference_name(&receiver_ty) {
            Some(class_name) => class_name.to_string(),
            None => {
                return Err(CompileError::UnresolvedName {
                    name: name.to_string(),
                    span,
                })
            }
        };
        let Some(field) = self.env.field_named(&class_name, name) else {
            return Err(CompileError::UnresolvedName {
                name: name.to_string(),
                span,
            });
        };
        let field = field.clone();
        if field.is_static {
            // the receiver was evaluated for its side effects only
            self.code.emit(Instruction::Pop);
            self.code.emit(Instruction::GetStaticField(field.clone()));
        } else {
            self.code.emit(Instruction::GetField(field.clone()));
        }
        Ok(field.ty)
    }

    fn compile_array_access(
        &mut self,
        array: &Expr,
        index: &Expr,
        span: Span,
    ) -> Result<JavaType, CompileError> {
        let array_ty = self.compile_expr(array)?;
        let JavaType::Array(element) = array_ty else {
            return Err(CompileError::NotAnArray { span });
        };
        let index_ty = self.compile_expr(index)?;
        self.widen_index(index_ty.tag(), index.span)?;
        self.code.emit(Instruction::LoadArrayElement);
        Ok(*element)
    }

    /// Array indexes and dimensions undergo unary promotion and must land on
    /// `int`.
    fn widen_index(&mut self, tag: TypeTag, span: Span) -> Result<(), CompileError> {
        match tag {
            TypeTag::Int => Ok(()),
            t if t.is_sub_int() => {
                self.code.emit(Instruction::Cast { tag: TypeTag::Int });
                Ok(())
            }
            other => Err(CompileError::TypeMismatch {
                from: other.to_string(),
                to: "int".to_string(),
                span,
            }),
        }
    }

    fn compile_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        span: Span,
    ) -> Result<JavaType, CompileError> {
        let operand_ty = self.compile_expr(operand)?;
        let tag = operand_ty.tag();
        match op {
            UnaryOp::Plus => {
                let promoted = unary_promotion(tag);
                if !promoted.is_numeric() {
                    return Err(CompileError::InapplicableUnary {
                        op: "+",
                        operand: tag,
                        span,
                    });
                }
                self.widen(tag, promoted);
                Ok(java_type_for(promoted))
            }
            UnaryOp::Neg => {
                let promoted = unary_promotion(tag);
                if !promoted.is_numeric() {
                    return Err(CompileError::InapplicableUnary {
                        op: "-",
                        operand: tag,
                        span,
                    });
                }
                self.code.emit(Instruction::Unary {
                    op: UnOp::Neg,
                    tag: promoted,
                });
                Ok(java_type_for(promoted))
            }
            UnaryOp::Not => {
                if tag != TypeTag::Boolean {
                    return Err(CompileError::NonBooleanOperand {
                        op: "!",
                        found: tag,
                        span,
                    });
                }
                self.code.emit(Instruction::Unary {
                    op: UnOp::Not,
                    tag: TypeTag::Boolean,
                });
                Ok(JavaType::Boolean)
            }
            UnaryOp::BitNot => {
                let promoted = unary_promotion(tag);
                if !promoted.is_integral() {
                    return Err(CompileError::InapplicableUnary {
                        op: "~",
                        operand: tag,
                        span,
                    });
                }
                self.code.emit(Instruction::Unary {
                    op: UnOp::BitNot,
                    tag: promoted,
                });
                Ok(java_type_for(promoted))
            }
        }
    }

    fn compile_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> Result<JavaType, CompileError> {
        if matches!(op, BinaryOp::AndAnd | BinaryOp::OrOr) {
            return self.compile_short_circuit(op, lhs, rhs);
        }
        let lhs_ty = self.compile_expr(lhs)?;
        let rhs_ty = self.compile_expr(rhs)?;
        let result = self.emit_operator(op, lhs_ty.tag(), rhs_ty.tag(), span)?;
        Ok(java_type_for(result))
    }

    /// `&&` and `||` as conditional jumps; the right operand is not on the
    /// executed path when the left operand decides the result.
    fn compile_short_circuit(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<JavaType, CompileError> {
        let lhs_ty = self.compile_expr(lhs)?;
        self.require_boolean(lhs_ty.tag(), op.symbol(), lhs.span)?;

        let is_or = matches!(op, BinaryOp::OrOr);
        let shortcut = self.code.emit(if is_or {
            Instruction::JumpIfTrue { target: 0 }
        } else {
            Instruction::JumpIfFalse { target: 0 }
        });

        let rhs_ty = self.compile_expr(rhs)?;
        self.require_boolean(rhs_ty.tag(), op.symbol(), rhs.span)?;
        let done = self.code.emit(Instruction::Jump { target: 0 });

        let shortcut_target = self.code.len();
        self.code.emit(Instruction::PushBoolean(is_or));
        let end = self.code.len();

        self.code.patch_jump(shortcut, shortcut_target);
        self.code.patch_jump(done, end);
        Ok(JavaType::Boolean)
    }

    fn compile_conditional(
        &mut self,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
        span: Span,
    ) -> Result<JavaType, CompileError> {
        let condition_ty = self.compile_expr(condition)?;
        self.require_boolean(condition_ty.tag(), "?:", condition.span)?;

        let to_else = self.code.emit(Instruction::JumpIfFalse { target: 0 });
        let then_ty = self.compile_expr(then_branch)?;
        let over_else = self.code.emit(Instruction::Jump { target: 0 });
        self.code.patch_jump(to_else, self.code.len());
        let else_ty = self.compile_expr(else_branch)?;
        self.code.patch_jump(over_else, self.code.len());

        let (tt, et) = (then_ty.tag(), else_ty.tag());
        if tt == TypeTag::Void {
            return Err(CompileError::VoidValue {
                span: then_branch.span,
            });
        }
        if et == TypeTag::Void {
            return Err(CompileError::VoidValue {
                span: else_branch.span,
            });
        }
        if then_ty == else_ty {
            return Ok(then_ty);
        }
        let promoted = binary_promotion(tt, et);
        if promoted.is_numeric() {
            // a single widening after the join covers both branches
            self.code.emit(Instruction::Cast { tag: promoted });
            return Ok(java_type_for(promoted));
        }
        if tt == TypeTag::Null && et.is_reference() {
            return Ok(else_ty);
        }
        if et == TypeTag::Null && tt.is_reference() {
            return Ok(then_ty);
        }
        if tt.is_reference() && et.is_reference() {
            return Ok(JavaType::object());
        }
        Err(CompileError::InapplicableOperator {
            op: "?:",
            lhs: tt,
            rhs: et,
            span,
        })
    }

    fn compile_assign(
        &mut self,
        target: &Expr,
        op: Option<BinaryOp>,
        value: &Expr,
        span: Span,
    ) -> Result<JavaType, CompileError> {
        let target = self.compile_target(target)?;
        let target_ty = target.ty().clone();
        match op {
            None => {
                self.prepare_simple_store(&target, span)?;
                let value_ty = self.compile_expr(value)?;
                self.coerce_assignable(&value_ty, &target_ty, value.span)?;
            }
            Some(op) => {
                self.emit_target_read(&target, span)?;
                self.compile_compound_value(&target_ty, op, value, span)?;
            }
        }
        self.emit_target_store(&target);
        Ok(target_ty)
    }

    fn compile_inc_dec(
        &mut self,
        op: IncDecOp,
        target: &Expr,
        postfix: bool,
        span: Span,
    ) -> Result<JavaType, CompileError> {
        let symbol = match op {
            IncDecOp::Inc => "++",
            IncDecOp::Dec => "--",
        };
        let target = self.compile_target(target)?;
        let target_ty = target.ty().clone();
        let tag = target_ty.tag();
        if !tag.is_numeric() {
            return Err(CompileError::InapplicableUnary {
                op: symbol,
                operand: tag,
                span,
            });
        }
        let promoted = unary_promotion(tag);

        self.emit_target_read(&target, span)?;
        if postfix {
            // tuck the old value beneath whatever the store needs
            let tuck = match &target {
                Target::Local { .. } => Instruction::Dup,
                Target::Field { field, .. } if field.is_static => Instruction::Dup,
                Target::Field { .. } => Instruction::DupX1,
                Target::Element { .. } => Instruction::DupX2,
            };
            self.code.emit(tuck);
        }
        self.code.emit(Instruction::PushInt(1));
        let arith = match op {
            IncDecOp::Inc => ArithOp::Add,
            IncDecOp::Dec => ArithOp::Sub,
        };
        self.code.emit(Instruction::Arith {
            op: arith,
            tag: promoted,
        });
        if promoted != tag {
            self.code.emit(Instruction::Cast { tag });
        }
        self.emit_target_store(&target);
        if postfix {
            self.code.emit(Instruction::Pop);
        }
        Ok(target_ty)
    }

    /// Emit the target's address computation (receiver / array and index)
    /// and classify it. Called before the right-hand side, matching Java's
    /// left-to-right order.
    fn compile_target(&mut self, target: &Expr) -> Result<Target, CompileError> {
        match &target.kind {
            ExprKind::Name(name) => {
                let env = self.env;
                if let Some(local) = env.local(name) {
                    return Ok(Target::Local {
                        slot: local.slot,
                        ty: local.ty.clone(),
                    });
                }
                if let Some(field) = env.resolve_field(name) {
                    return Ok(Target::Field {
                        field: field.clone(),
                        receiver_on_stack: false,
                    });
                }
                Err(CompileError::UnresolvedName {
                    name: name.clone(),
                    span: target.span,
                })
            }
            ExprKind::FieldAccess { receiver, name } => {
                let receiver_ty = self.compile_expr(receiver)?;
                if matches!(receiver_ty, JavaType::Array(_)) {
                    // `length` is the only array member and it is read-only
                    return Err(CompileError::InvalidAssignmentTarget { span: target.span });
                }
                let class_name = match reference_name(&receiver_ty) {
                    Some(class_name) => class_name.to_string(),
                    None => {
                        return Err(CompileError::UnresolvedName {
                            name: name.clone(),
                            span: target.span,
                        })
                    }
                };
                let Some(field) = self.env.field_named(&class_name, name) else {
                    return Err(CompileError::UnresolvedName {
                        name: name.clone(),
                        span: target.span,
                    });
                };
                Ok(Target::Field {
                    field: field.clone(),
                    receiver_on_stack: true,
                })
            }
            ExprKind::ArrayAccess { array, index } => {
                let array_ty = self.compile_expr(array)?;
                let JavaType::Array(element) = array_ty else {
                    return Err(CompileError::NotAnArray { span: array.span });
                };
                let index_ty = self.compile_expr(index)?;
                self.widen_index(index_ty.tag(), index.span)?;
                Ok(Target::Element { ty: *element })
            }
            _ => Err(CompileError::InvalidAssignmentTarget { span: target.span }),
        }
    }

    /// For a simple store, fields still need their implicit receiver pushed
    /// (and a discarded receiver popped for statics) before the value.
    fn prepare_simple_store(&mut self, target: &Target, span: Span) -> Result<(), CompileError> {
        if let Target::Field {
            field,
            receiver_on_stack,
        } = target
        {
            if field.is_static {
                if *receiver_on_stack {
                    self.code.emit(Instruction::Pop);
                }
            } else if !*receiver_on_stack {
                self.push_this_for(&field.name, span)?;
            }
        }
        Ok(())
    }

    /// Read the target's current value, duplicating the address parts so the
    /// later store re-uses them (the target is evaluated once).
    fn emit_target_read(&mut self, target: &Target, span: Span) -> Result<(), CompileError> {
        match target {
            Target::Local { slot, .. } => {
                self.code.emit(Instruction::LoadLocal(*slot));
            }
            Target::Field {
                field,
                receiver_on_stack,
            } => {
                if field.is_static {
                    if *receiver_on_stack {
                        self.code.emit(Instruction::Pop);
                    }
                    self.code.emit(Instruction::GetStaticField(field.clone()));
                } else {
                    if !*receiver_on_stack {
                        self.push_this_for(&field.name, span)?;
                    }
                    self.code.emit(Instruction::Dup);
                    self.code.emit(Instruction::GetField(field.clone()));
                }
            }
            Target::Element { .. } => {
                self.code.emit(Instruction::Dup2);
                self.code.emit(Instruction::LoadArrayElement);
            }
        }
        Ok(())
    }

    fn emit_target_store(&mut self, target: &Target) {
        match target {
            Target::Local { slot, .. } => {
                self.code.emit(Instruction::StoreLocal(*slot));
            }
            Target::Field { field, .. } => {
                if field.is_static {
                    self.code.emit(Instruction::PutStaticField(field.clone()));
                } else {
                    self.code.emit(Instruction::PutField(field.clone()));
                }
            }
            Target::Element { .. } => {
                self.code.emit(Instruction::StoreArrayElement);
            }
        }
    }

    /// With the target's old value on the stack, compile the right operand,
    /// apply the operator in the promoted type of the left operand, and cast
    /// back to the target type (JLS 15.26.2 narrows implicitly).
    fn compile_compound_value(
        &mut self,
        target_ty: &JavaType,
        op: BinaryOp,
        value: &Expr,
        span: Span,
    ) -> Result<(), CompileError> {
        let value_ty = self.compile_expr(value)?;
        let (lt, rt) = (target_ty.tag(), value_ty.tag());
        if matches!(
            op,
            BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::AndAnd
                | BinaryOp::OrOr
        ) {
            return Err(CompileError::InapplicableOperator {
                op: op.symbol(),
                lhs: lt,
                rhs: rt,
                span,
            });
        }
        let result = self.emit_operator(op, lt, rt, span)?;
        if result != lt && result.is_numeric() && lt.is_numeric() {
            self.code.emit(Instruction::Cast { tag: lt });
        }
        Ok(())
    }

    /// Emit the operator instruction for already-compiled operands and
    /// return the static tag of the value it leaves on the stack.
    fn emit_operator(
        &mut self,
        op: BinaryOp,
        lt: TypeTag,
        rt: TypeTag,
        span: Span,
    ) -> Result<TypeTag, CompileError> {
        use BinaryOp::*;
        let inapplicable = || CompileError::InapplicableOperator {
            op: op.symbol(),
            lhs: lt,
            rhs: rt,
            span,
        };
        match op {
            Shl | Shr | UShr => {
                // JLS 15.19: each operand promotes on its own; the result
                // takes the left operand's promoted type
                let lp = unary_promotion(lt);
                let rp = unary_promotion(rt);
                if !lp.is_integral() || !rp.is_integral() {
                    return Err(inapplicable());
                }
                let arith = match op {
                    Shl => ArithOp::Shl,
                    Shr => ArithOp::Shr,
                    _ => ArithOp::UShr,
                };
                self.code.emit(Instruction::Arith { op: arith, tag: lp });
                Ok(lp)
            }
            Lt | Le | Gt | Ge => {
                let promoted = binary_promotion(lt, rt);
                if !promoted.is_numeric() {
                    return Err(inapplicable());
                }
                let cmp = match op {
                    Lt => CmpOp::Lt,
                    Le => CmpOp::Le,
                    Gt => CmpOp::Gt,
                    _ => CmpOp::Ge,
                };
                self.code.emit(Instruction::Compare {
                    op: cmp,
                    tag: promoted,
                });
                Ok(TypeTag::Boolean)
            }
            Eq | Ne => {
                let cmp = if matches!(op, Eq) { CmpOp::Eq } else { CmpOp::Ne };
                let promoted = binary_promotion(lt, rt);
                if promoted.is_numeric() {
                    self.code.emit(Instruction::Compare {
                        op: cmp,
                        tag: promoted,
                    });
                } else if lt == TypeTag::Boolean && rt == TypeTag::Boolean {
                    self.code.emit(Instruction::Compare {
                        op: cmp,
                        tag: TypeTag::Boolean,
                    });
                } else if lt.is_reference() && rt.is_reference() {
                    self.code.emit(Instruction::Compare {
                        op: cmp,
                        tag: TypeTag::Object,
                    });
                } else {
                    return Err(inapplicable());
                }
                Ok(TypeTag::Boolean)
            }
            Add | Sub | Mul | Div | Rem | BitAnd | BitOr | BitXor => {
                let promoted = binary_promotion(lt, rt);
                match promoted {
                    TypeTag::Undefined => Err(inapplicable()),
                    TypeTag::String => {
                        if matches!(op, Add) {
                            self.code.emit(Instruction::Arith {
                                op: ArithOp::Add,
                                tag: TypeTag::String,
                            });
                            Ok(TypeTag::String)
                        } else {
                            Err(inapplicable())
                        }
                    }
                    TypeTag::Boolean => {
                        let arith = match op {
                            BitAnd => ArithOp::And,
                            BitOr => ArithOp::Or,
                            BitXor => ArithOp::Xor,
                            _ => return Err(inapplicable()),
                        };
                        self.code.emit(Instruction::Arith {
                            op: arith,
                            tag: TypeTag::Boolean,
                        });
                        Ok(TypeTag::Boolean)
                    }
                    tag => {
                        if matches!(op, BitAnd | BitOr | BitXor) && !tag.is_integral() {
                            return Err(inapplicable());
                        }
                        let arith = match op {
                            Add => ArithOp::Add,
                            Sub => ArithOp::Sub,
                            Mul => ArithOp::Mul,
                            Div => ArithOp::Div,
                            Rem => ArithOp::Rem,
                            BitAnd => ArithOp::And,
                            BitOr => ArithOp::Or,
                            BitXor => ArithOp::Xor,
                            _ => return Err(inapplicable()),
                        };
                        self.code.emit(Instruction::Arith { op: arith, tag });
                        Ok(tag)
                    }
                }
            }
            AndAnd | OrOr => Err(inapplicable()),
        }
    }

    fn compile_method_call(
        &mut self,
        receiver: Option<&Expr>,
        name: &str,
        args: &[Expr],
        span: Span,
    ) -> Result<JavaType, CompileError> {
        let declaring = match receiver {
            Some(receiver_expr) => {
                let receiver_ty = self.compile_expr(receiver_expr)?;
                match reference_name(&receiver_ty) {
                    Some(class_name) => class_name.to_string(),
                    None => {
                        return Err(CompileError::NoApplicableMethod {
                            name: name.to_string(),
                            receiver_type: receiver_ty.to_string(),
                            arg_types: String::new(),
                            span,
                        })
                    }
                }
            }
            None => self.env.receiver_type.clone(),
        };

        let mut candidates = self.env.methods_named(&declaring, name);
        if candidates.is_empty() {
            return Err(CompileError::NoApplicableMethod {
                name: name.to_string(),
                receiver_type: declaring,
                arg_types: String::new(),
                span,
            });
        }

        // Unqualified calls to instance methods receive the implicit `this`;
        // the candidate set decides which form this call takes.
        let instance_call = match receiver {
            Some(_) => true,
            None => candidates.iter().any(|method| !method.is_static),
        };
        if receiver.is_none() && instance_call {
            if !self.env.has_this {
                return Err(CompileError::InstanceMemberInStaticContext {
                    name: name.to_string(),
                    span,
                });
            }
            self.code.emit(Instruction::PushThis);
        }
        candidates.retain(|method| method.is_static != instance_call);

        let mut arg_types = Vec::with_capacity(args.len());
        for arg in args {
            let arg_ty = self.compile_expr(arg)?;
            if arg_ty.tag() == TypeTag::Void {
                return Err(CompileError::VoidValue { span: arg.span });
            }
            arg_types.push(arg_ty);
        }

        let resolved = resolve_overload(&candidates, &arg_types).map_err(|kind| match kind {
            OverloadError::NoneApplicable => CompileError::NoApplicableMethod {
                name: name.to_string(),
                receiver_type: declaring.clone(),
                arg_types: render_types(&arg_types),
                span,
            },
            OverloadError::Ambiguous => CompileError::AmbiguousOverload {
                name: name.to_string(),
                span,
            },
        })?;
        let method = resolved.clone();
        self.code.emit(Instruction::Invoke(method.clone()));
        Ok(method.return_type)
    }

    fn compile_new(
        &mut self,
        type_name: &str,
        args: &[Expr],
        span: Span,
    ) -> Result<JavaType, CompileError> {
        let candidates = self.env.constructors_of(type_name);
        let mut arg_types = Vec::with_capacity(args.len());
        for arg in args {
            let arg_ty = self.compile_expr(arg)?;
            if arg_ty.tag() == TypeTag::Void {
                return Err(CompileError::VoidValue { span: arg.span });
            }
            arg_types.push(arg_ty);
        }
        let resolved = resolve_overload(&candidates, &arg_types).map_err(|kind| match kind {
            OverloadError::NoneApplicable => CompileError::NoApplicableConstructor {
                type_name: type_name.to_string(),
                arg_types: render_types(&arg_types),
                span,
            },
            OverloadError::Ambiguous => CompileError::AmbiguousOverload {
                name: type_name.to_string(),
                span,
            },
        })?;
        let constructor = resolved.clone();
        self.code.emit(Instruction::New(constructor));
        Ok(JavaType::Reference(type_name.to_string()))
    }

    fn compile_new_array(
        &mut self,
        element_type: &JavaType,
        dimensions: &[Expr],
        span: Span,
    ) -> Result<JavaType, CompileError> {
        if dimensions.is_empty() {
            return Err(CompileError::NotAnArray { span });
        }
        for dimension in dimensions {
            let dimension_ty = self.compile_expr(dimension)?;
            self.widen_index(dimension_ty.tag(), dimension.span)?;
        }
        self.code.emit(Instruction::NewArray {
            element_type: element_type.clone(),
            dims: dimensions.len(),
        });
        let mut ty = element_type.clone();
        for _ in 0..dimensions.len() {
            ty = JavaType::array(ty);
        }
        Ok(ty)
    }

    fn compile_cast(
        &mut self,
        ty: &JavaType,
        inner: &Expr,
        span: Span,
    ) -> Result<JavaType, CompileError> {
        let from = self.compile_expr(inner)?;
        if from == *ty {
            return Ok(ty.clone());
        }
        let (ft, tt) = (from.tag(), ty.tag());
        if ft.is_numeric() && tt.is_numeric() {
            self.code.emit(Instruction::Cast { tag: tt });
            return Ok(ty.clone());
        }
        // reference casts are compile-time only
        let from_reference = matches!(
            from,
            JavaType::Reference(_) | JavaType::Array(_) | JavaType::Null
        );
        let to_reference = matches!(ty, JavaType::Reference(_) | JavaType::Array(_));
        if from_reference && to_reference {
            return Ok(ty.clone());
        }
        Err(CompileError::InvalidCast {
            from: from.to_string(),
            to: ty.to_string(),
            span,
        })
    }

    /// Simple assignment allows identity and widening conversions only;
    /// narrowing is a compile-time mismatch.
    fn coerce_assignable(
        &mut self,
        from: &JavaType,
        to: &JavaType,
        span: Span,
    ) -> Result<(), CompileError> {
        match assignment_conversion(from, to) {
            Some(false) => Ok(()),
            Some(true) => {
                self.code.emit(Instruction::Cast { tag: to.tag() });
                Ok(())
            }
            None => Err(CompileError::TypeMismatch {
                from: from.to_string(),
                to: to.to_string(),
                span,
            }),
        }
    }

    fn push_this_for(&mut self, member: &str, span: Span) -> Result<(), CompileError> {
        if !self.env.has_this {
            return Err(CompileError::InstanceMemberInStaticContext {
                name: member.to_string(),
                span,
            });
        }
        self.code.emit(Instruction::PushThis);
        Ok(())
    }

    fn require_boolean(
        &self,
        tag: TypeTag,
        op: &'static str,
        span: Span,
    ) -> Result<(), CompileError> {
        if tag == TypeTag::Boolean {
            Ok(())
        } else {
            Err(CompileError::NonBooleanOperand {
                op,
                found: tag,
                span,
            })
        }
    }

    fn widen(&mut self, from: TypeTag, to: TypeTag) {
        if from != to && from.is_numeric() && to.is_numeric() {
            self.code.emit(Instruction::Cast { tag: to });
        }
    }
}

enum OverloadError {
    NoneApplicable,
    Ambiguous,
}

/// Pick the most specific applicable overload (JLS 15.12.2, without boxing
/// or varargs): applicability is identity, widening primitive conversion, or
/// reference assignability per declared types.
fn resolve_overload<'m>(
    candidates: &[&'m MethodDescriptor],
    args: &[JavaType],
) -> Result<&'m MethodDescriptor, OverloadError> {
    let applicable: Vec<&MethodDescriptor> = candidates
        .iter()
        .copied()
        .filter(|method| {
            method.params.len() == args.len()
                && method
                    .params
                    .iter()
                    .zip(args)
                    .all(|(param, arg)| invocation_applicable(arg, param))
        })
        .collect();
    if applicable.is_empty() {
        return Err(OverloadError::NoneApplicable);
    }
    if applicable.len() == 1 {
        return Ok(applicable[0]);
    }
    let most_specific: Vec<&MethodDescriptor> = applicable
        .iter()
        .copied()
        .filter(|method| {
            applicable
                .iter()
                .all(|other| at_least_as_specific(method, other))
        })
        .collect();
    match most_specific.as_slice() {
        [single] => Ok(single),
        _ => Err(OverloadError::Ambiguous),
    }
}

fn at_least_as_specific(m1: &MethodDescriptor, m2: &MethodDescriptor) -> bool {
    m1.params
        .iter()
        .zip(&m2.params)
        .all(|(p1, p2)| invocation_applicable(p1, p2))
}

fn invocation_applicable(from: &JavaType, to: &JavaType) -> bool {
    if from == to {
        return true;
    }
    if widening_ok(from.tag(), to.tag()) {
        return true;
    }
    match (from, to) {
        (JavaType::Null, JavaType::Reference(_) | JavaType::Array(_)) => true,
        (JavaType::Reference(_) | JavaType::Array(_), JavaType::Reference(name)) => {
            name == JAVA_LANG_OBJECT
        }
        _ => false,
    }
}

/// Widening primitive conversions, JLS 5.1.2.
fn widening_ok(from: TypeTag, to: TypeTag) -> bool {
    use TypeTag::*;
    matches!(
        (from, to),
        (Byte, Short | Int | Long | Float | Double)
            | (Short, Int | Long | Float | Double)
            | (Char, Int | Long | Float | Double)
            | (Int, Long | Float | Double)
            | (Long, Float | Double)
            | (Float, Double)
    )
}

/// Identity (`Some(false)`), widening (`Some(true)`, emit a cast) or
/// disallowed (`None`).
fn assignment_conversion(from: &JavaType, to: &JavaType) -> Option<bool> {
    if from == to {
        return Some(false);
    }
    if widening_ok(from.tag(), to.tag()) {
        return Some(true);
    }
    match (from, to) {
        (JavaType::Null, JavaType::Reference(_) | JavaType::Array(_)) => Some(false),
        (JavaType::Reference(_) | JavaType::Array(_), JavaType::Reference(name))
            if name == JAVA_LANG_OBJECT =>
        {
            Some(false)
        }
        _ => None,
    }
}

fn reference_name(ty: &JavaType) -> Option<&str> {
    match ty {
        JavaType::Reference(name) => Some(name),
        _ => None,
    }
}

fn render_types(types: &[JavaType]) -> String {
    types
        .iter()
        .map(JavaType::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn java_type_for(tag: TypeTag) -> JavaType {
    match tag {
        TypeTag::Boolean => JavaType::Boolean,
        TypeTag::Byte => JavaType::Byte,
        TypeTag::Char => JavaType::Char,
        TypeTag::Short => JavaType::Short,
        TypeTag::Int => JavaType::Int,
        TypeTag::Long => JavaType::Long,
        TypeTag::Float => JavaType::Float,
        TypeTag::Double => JavaType::Double,
        TypeTag::String => JavaType::string(),
        TypeTag::Void => JavaType::Void,
        TypeTag::Null => JavaType::Null,
        TypeTag::Object | TypeTag::Undefined => JavaType::object(),
    }
}
