//! Stack-machine execution.
//!
//! One program counter over the instruction list, an explicit operand
//! stack, a single dispatch over the closed instruction set. Remote-touching
//! instructions delegate to the runtime context and block until the debuggee
//! answers; any failure aborts the run immediately — no instruction after a
//! failed one executes.

use std::time::Instant;

use tracing::trace;

use vela_core::CancelToken;
use vela_jdi::{ArrayRef, JavaType, MethodDescriptor, RuntimeContext, TypeTag, Value};

use crate::error::RuntimeFailure;
use crate::instruction::{ArithOp, CmpOp, Instruction, InstructionSequence, UnOp};

/// Execute a compiled sequence against a runtime context.
///
/// Terminates when the counter runs past the last instruction; the result is
/// the top of the stack, or `Value::Void` when the stack is empty (a
/// void-valued expression). The cancel token and the optional deadline are
/// checked cooperatively before each instruction.
pub fn run(
    sequence: &InstructionSequence,
    ctx: &mut dyn RuntimeContext,
    cancel: &CancelToken,
    deadline: Option<Instant>,
) -> Result<Value, RuntimeFailure> {
    let mut machine = Machine { stack: Vec::new() };
    let mut pc = 0usize;
    while let Some(instruction) = sequence.get(pc) {
        if cancel.is_cancelled() {
            return Err(RuntimeFailure::Cancelled);
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(RuntimeFailure::Timeout);
        }
        trace!(pc, %instruction, depth = machine.stack.len(), "execute");
        pc = machine.step(instruction, pc, ctx)?;
    }
    let result = machine.stack.pop().unwrap_or(Value::Void);
    if !machine.stack.is_empty() {
        return Err(RuntimeFailure::Internal(
            "operand stack not balanced after execution".to_string(),
        ));
    }
    Ok(result)
}

struct Machine {
    stack: Vec<Value>,
}

impl Machine {
    fn step(
        &mut self,
        instruction: &Instruction,
        pc: usize,
        ctx: &mut dyn RuntimeContext,
    ) -> Result<usize, RuntimeFailure> {
        let mut next = pc + 1;
        match instruction {
            Instruction::PushBoolean(v) => self.push(Value::Boolean(*v)),
            Instruction::PushByte(v) => self.push(Value::Byte(*v)),
            Instruction::PushShort(v) => self.push(Value::Short(*v)),
            Instruction::PushInt(v) => self.push(Value::Int(*v)),
            Instruction::PushLong(v) => self.push(Value::Long(*v)),
            Instruction::PushFloat(v) => self.push(Value::Float(*v)),
            Instruction::PushDouble(v) => self.push(Value::Double(*v)),
            Instruction::PushChar(c) => self.push(Value::Char(*c)),
            Instruction::PushString(s) => self.push(Value::String(s.clone())),
            Instruction::PushNull => self.push(Value::Null),
            Instruction::PushThis => match ctx.this_object()? {
                Some(object) => self.push(Value::Object(object)),
                None => {
                    // static frame: the receiving type's class mirror stands in
                    let mirror = ctx.receiving_type()?;
                    self.push(Value::Object(mirror));
                }
            },
            Instruction::LoadLocal(slot) => {
                let value = ctx.read_local(*slot)?;
                self.push(value);
            }
            Instruction::StoreLocal(slot) => {
                let value = self.pop()?;
                ctx.write_local(*slot, value.clone())?;
                self.push(value);
            }
            Instruction::GetField(field) => {
                let receiver = self.pop_receiver()?;
                let value = ctx.read_field(Some(&receiver), field)?;
                self.push(value);
            }
            Instruction::GetStaticField(field) => {
                let value = ctx.read_field(None, field)?;
                self.push(value);
            }
            Instruction::PutField(field) => {
                let value = self.pop()?;
                let receiver = self.pop_receiver()?;
                ctx.write_field(Some(&receiver), field, value.clone())?;
                self.push(value);
            }
            Instruction::PutStaticField(field) => {
                let value = self.pop()?;
                ctx.write_field(None, field, value.clone())?;
                self.push(value);
            }
            Instruction::LoadArrayElement => {
                let index = self.pop_i32()?;
                let array = self.pop_array()?;
                let value = ctx.read_array_element(&array, index)?;
                self.push(value);
            }
            Instruction::StoreArrayElement => {
                let value = self.pop()?;
                let index = self.pop_i32()?;
                let array = self.pop_array()?;
                ctx.write_array_element(&array, index, value.clone())?;
                self.push(value);
            }
            Instruction::ArrayLength => {
                let array = self.pop_array()?;
                let length = ctx.array_length(&array)?;
                self.push(Value::Int(length));
            }
            Instruction::Arith { op, tag } => self.arith(*op, *tag, ctx)?,
            Instruction::Compare { op, tag } => self.compare(*op, *tag)?,
            Instruction::Unary { op, tag } => self.unary(*op, *tag)?,
            Instruction::Cast { tag } => {
                let value = self.pop()?;
                let converted = cast_value(value, *tag)?;
                self.push(converted);
            }
            Instruction::Invoke(method) => {
                let args = self.pop_args(method)?;
                let receiver = if method.is_static {
                    None
                } else {
                    Some(self.pop_receiver()?)
                };
                let result = ctx.invoke(receiver.as_ref(), method, args)?;
                if method.return_type != JavaType::Void {
                    self.push(result);
                }
            }
            Instruction::New(constructor) => {
                let args = self.pop_args(constructor)?;
                let object = ctx.new_instance(constructor, args)?;
                self.push(Value::Object(object));
            }
            Instruction::NewArray { element_type, dims } => {
                let mut lengths = Vec::with_capacity(*dims);
                for _ in 0..*dims {
                    lengths.push(self.pop_i32()?);
                }
                lengths.reverse();
                let array = ctx.new_array(element_type, lengths)?;
                self.push(Value::Array(array));
            }
            Instruction::Jump { target } => next = *target,
            Instruction::JumpIfFalse { target } => {
                if !self.pop_boolean()? {
                    next = *target;
                }
            }
            Instruction::JumpIfTrue { target } => {
                if self.pop_boolean()? {
                    next = *target;
                }
            }
            Instruction::Dup => {
                let value = self.peek()?.clone();
                self.push(value);
            }
            Instruction::Dup2 => {
                if self.stack.len() < 2 {
                    return Err(underflow());
                }
                let under = self.stack[self.stack.len() - 2].clone();
                let top = self.stack[self.stack.len() - 1].clone();
                self.push(under);
                self.push(top);
            }
            Instruction::DupX1 => {
                let top = self.pop()?;
                let under = self.pop()?;
                self.push(top.clone());
                self.push(under);
                self.push(top);
            }
            Instruction::DupX2 => {
                let top = self.pop()?;
                let x1 = self.pop()?;
                let x2 = self.pop()?;
                self.push(top.clone());
                self.push(x2);
                self.push(x1);
                self.push(top);
            }
            Instruction::Pop => {
                self.pop()?;
            }
            Instruction::Swap => {
                let top = self.pop()?;
                let under = self.pop()?;
                self.push(top);
                self.push(under);
            }
        }
        Ok(next)
    }

    fn arith(
        &mut self,
        op: ArithOp,
        tag: TypeTag,
        ctx: &mut dyn RuntimeContext,
    ) -> Result<(), RuntimeFailure> {
        if tag == TypeTag::String {
            let rhs = self.pop()?;
            let lhs = self.pop()?;
            let mut text = stringify(lhs, ctx)?;
            text.push_str(&stringify(rhs, ctx)?);
            self.push(Value::String(text));
            return Ok(());
        }
        if tag == TypeTag::Boolean {
            let rhs = self.pop_boolean()?;
            let lhs = self.pop_boolean()?;
            let result = match op {
                ArithOp::And => lhs & rhs,
                ArithOp::Or => lhs | rhs,
                ArithOp::Xor => lhs ^ rhs,
                other => {
                    return Err(RuntimeFailure::Internal(format!(
                        "`{}` is not a boolean operation",
                        other.mnemonic()
                    )))
                }
            };
            self.push(Value::Boolean(result));
            return Ok(());
        }
        if matches!(op, ArithOp::Shl | ArithOp::Shr | ArithOp::UShr) {
            // Java masks the shift count to the width of the shifted type
            let amount = self.pop_integral()?;
            match tag {
                TypeTag::Int => {
                    let value = self.pop_i32()?;
                    self.push(Value::Int(shift_i32(op, value, amount)));
                }
                TypeTag::Long => {
                    let value = self.pop_i64()?;
                    self.push(Value::Long(shift_i64(op, value, amount)));
                }
                other => {
                    return Err(RuntimeFailure::Internal(format!(
                        "shift on non-integral type `{other}`"
                    )))
                }
            }
            return Ok(());
        }
        match tag {
            TypeTag::Int => {
                let rhs = self.pop_i32()?;
                let lhs = self.pop_i32()?;
                self.push(Value::Int(int_arith(op, lhs, rhs)?));
            }
            TypeTag::Long => {
                let rhs = self.pop_i64()?;
                let lhs = self.pop_i64()?;
                self.push(Value::Long(long_arith(op, lhs, rhs)?));
            }
            TypeTag::Float => {
                let rhs = self.pop_f32()?;
                let lhs = self.pop_f32()?;
                self.push(Value::Float(float_arith(op, lhs, rhs)?));
            }
            TypeTag::Double => {
                let rhs = self.pop_f64()?;
                let lhs = self.pop_f64()?;
                self.push(Value::Double(double_arith(op, lhs, rhs)?));
            }
            other => {
                return Err(RuntimeFailure::Internal(format!(
                    "arithmetic on non-numeric type `{other}`"
                )))
            }
        }
        Ok(())
    }

    fn compare(&mut self, op: CmpOp, tag: TypeTag) -> Result<(), RuntimeFailure> {
        let result = match tag {
            TypeTag::Int => {
                let rhs = self.pop_i32()?;
                let lhs = self.pop_i32()?;
                compare_ints(op, i64::from(lhs), i64::from(rhs))
            }
            TypeTag::Long => {
                let rhs = self.pop_i64()?;
                let lhs = self.pop_i64()?;
                compare_ints(op, lhs, rhs)
            }
            // IEEE semantics match Java: NaN compares false except for `!=`
            TypeTag::Float => {
                let rhs = self.pop_f32()?;
                let lhs = self.pop_f32()?;
                compare_floats(op, f64::from(lhs), f64::from(rhs))
            }
            TypeTag::Double => {
                let rhs = self.pop_f64()?;
                let lhs = self.pop_f64()?;
                compare_floats(op, lhs, rhs)
            }
            TypeTag::Boolean => {
                let rhs = self.pop_boolean()?;
                let lhs = self.pop_boolean()?;
                match op {
                    CmpOp::Eq => lhs == rhs,
                    CmpOp::Ne => lhs != rhs,
                    other => {
                        return Err(RuntimeFailure::Internal(format!(
                            "ordering comparison `{}` on booleans",
                            other.mnemonic()
                        )))
                    }
                }
            }
            TypeTag::Object | TypeTag::String | TypeTag::Null => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let equal = reference_equal(&lhs, &rhs);
                match op {
                    CmpOp::Eq => equal,
                    CmpOp::Ne => !equal,
                    other => {
                        return Err(RuntimeFailure::Internal(format!(
                            "ordering comparison `{}` on references",
                            other.mnemonic()
                        )))
                    }
                }
            }
            other => {
                return Err(RuntimeFailure::Internal(format!(
                    "comparison on `{other}`"
                )))
            }
        };
        self.push(Value::Boolean(result));
        Ok(())
    }

    fn unary(&mut self, op: UnOp, tag: TypeTag) -> Result<(), RuntimeFailure> {
        match op {
            UnOp::Not => {
                let value = self.pop_boolean()?;
                self.push(Value::Boolean(!value));
            }
            UnOp::Neg => match tag {
                TypeTag::Int => {
                    let value = self.pop_i32()?;
                    self.push(Value::Int(value.wrapping_neg()));
                }
                TypeTag::Long => {
                    let value = self.pop_i64()?;
                    self.push(Value::Long(value.wrapping_neg()));
                }
                TypeTag::Float => {
                    let value = self.pop_f32()?;
                    self.push(Value::Float(-value));
                }
                TypeTag::Double => {
                    let value = self.pop_f64()?;
                    self.push(Value::Double(-value));
                }
                other => {
                    return Err(RuntimeFailure::Internal(format!(
                        "negation of `{other}`"
                    )))
                }
            },
            UnOp::BitNot => match tag {
                TypeTag::Int => {
                    let value = self.pop_i32()?;
                    self.push(Value::Int(!value));
                }
                TypeTag::Long => {
                    let value = self.pop_i64()?;
                    self.push(Value::Long(!value));
                }
                other => {
                    return Err(RuntimeFailure::Internal(format!(
                        "bitwise complement of `{other}`"
                    )))
                }
            },
        }
        Ok(())
    }

    fn pop_args(&mut self, method: &MethodDescriptor) -> Result<Vec<Value>, RuntimeFailure> {
        let mut args = Vec::with_capacity(method.params.len());
        for _ in 0..method.params.len() {
            args.push(self.pop()?);
        }
        args.reverse();
        // method-invocation conversion: widen each argument to its declared
        // parameter type (the decision was made at compile time)
        for (arg, param) in args.iter_mut().zip(&method.params) {
            let tag = param.tag();
            if tag.is_numeric() && arg.tag() != tag {
                *arg = cast_value(arg.clone(), tag)?;
            }
        }
        Ok(args)
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, RuntimeFailure> {
        self.stack.pop().ok_or_else(underflow)
    }

    fn peek(&self) -> Result<&Value, RuntimeFailure> {
        self.stack.last().ok_or_else(underflow)
    }

    fn pop_boolean(&mut self) -> Result<bool, RuntimeFailure> {
        match self.pop()? {
            Value::Boolean(v) => Ok(v),
            other => Err(type_defect("boolean", &other)),
        }
    }

    fn pop_i32(&mut self) -> Result<i32, RuntimeFailure> {
        match self.pop()? {
            Value::Int(v) => Ok(v),
            Value::Byte(v) => Ok(i32::from(v)),
            Value::Short(v) => Ok(i32::from(v)),
            Value::Char(c) => Ok(c as i32),
            other => Err(type_defect("int", &other)),
        }
    }

    fn pop_i64(&mut self) -> Result<i64, RuntimeFailure> {
        match self.pop()? {
            Value::Long(v) => Ok(v),
            Value::Int(v) => Ok(i64::from(v)),
            Value::Byte(v) => Ok(i64::from(v)),
            Value::Short(v) => Ok(i64::from(v)),
            Value::Char(c) => Ok(i64::from(c as u32)),
            other => Err(type_defect("long", &other)),
        }
    }

    fn pop_f32(&mut self) -> Result<f32, RuntimeFailure> {
        match self.pop()? {
            Value::Float(v) => Ok(v),
            Value::Long(v) => Ok(v as f32),
            Value::Int(v) => Ok(v as f32),
            Value::Byte(v) => Ok(f32::from(v)),
            Value::Short(v) => Ok(f32::from(v)),
            Value::Char(c) => Ok(c as u32 as f32),
            other => Err(type_defect("float", &other)),
        }
    }

    fn pop_f64(&mut self) -> Result<f64, RuntimeFailure> {
        match self.pop()? {
            Value::Double(v) => Ok(v),
            Value::Float(v) => Ok(f64::from(v)),
            Value::Long(v) => Ok(v as f64),
            Value::Int(v) => Ok(f64::from(v)),
            Value::Byte(v) => Ok(f64::from(v)),
            Value::Short(v) => Ok(f64::from(v)),
            Value::Char(c) => Ok(f64::from(c as u32)),
            other => Err(type_defect("double", &other)),
        }
    }

    fn pop_integral(&mut self) -> Result<i64, RuntimeFailure> {
        match self.pop()? {
            Value::Long(v) => Ok(v),
            Value::Int(v) => Ok(i64::from(v)),
            Value::Byte(v) => Ok(i64::from(v)),
            Value::Short(v) => Ok(i64::from(v)),
            Value::Char(c) => Ok(i64::from(c as u32)),
            other => Err(type_defect("integral", &other)),
        }
    }

    fn pop_array(&mut self) -> Result<ArrayRef, RuntimeFailure> {
        match self.pop()? {
            Value::Array(array) => Ok(array),
            Value::Null => Err(RuntimeFailure::NullPointer),
            other => Err(type_defect("array reference", &other)),
        }
    }

    fn pop_receiver(&mut self) -> Result<Value, RuntimeFailure> {
        match self.pop()? {
            Value::Null => Err(RuntimeFailure::NullPointer),
            value @ (Value::Object(_) | Value::Array(_) | Value::String(_)) => Ok(value),
            other => Err(type_defect("object reference", &other)),
        }
    }
}

fn underflow() -> RuntimeFailure {
    RuntimeFailure::Internal("operand stack underflow".to_string())
}

fn type_defect(expected: &str, found: &Value) -> RuntimeFailure {
    RuntimeFailure::Internal(format!(
        "expected {expected} on the operand stack, found {}",
        found.type_name()
    ))
}

fn int_arith(op: ArithOp, lhs: i32, rhs: i32) -> Result<i32, RuntimeFailure> {
    Ok(match op {
        ArithOp::Add => lhs.wrapping_add(rhs),
        ArithOp::Sub => lhs.wrapping_sub(rhs),
        ArithOp::Mul => lhs.wrapping_mul(rhs),
        ArithOp::Div => {
            if rhs == 0 {
                return Err(RuntimeFailure::DivisionByZero);
            }
            lhs.wrapping_div(rhs)
        }
        ArithOp::Rem => {
            if rhs == 0 {
                return Err(RuntimeFailure::DivisionByZero);
            }
            lhs.wrapping_rem(rhs)
        }
        ArithOp::And => lhs & rhs,
        ArithOp::Or => lhs | rhs,
        ArithOp::Xor => lhs ^ rhs,
        ArithOp::Shl | ArithOp::Shr | ArithOp::UShr => {
            return Err(RuntimeFailure::Internal("shift routed to arithmetic".into()))
        }
    })
}

fn long_arith(op: ArithOp, lhs: i64, rhs: i64) -> Result<i64, RuntimeFailure> {
    Ok(match op {
        ArithOp::Add => lhs.wrapping_add(rhs),
        ArithOp::Sub => lhs.wrapping_sub(rhs),
        ArithOp::Mul => lhs.wrapping_mul(rhs),
        ArithOp::Div => {
            if rhs == 0 {
                return Err(RuntimeFailure::DivisionByZero);
            }
            lhs.wrapping_div(rhs)
        }
        ArithOp::Rem => {
            if rhs == 0 {
                return Err(RuntimeFailure::DivisionByZero);
            }
            lhs.wrapping_rem(rhs)
        }
        ArithOp::And => lhs & rhs,
        ArithOp::Or => lhs | rhs,
        ArithOp::Xor => lhs ^ rhs,
        ArithOp::Shl | ArithOp::Shr | ArithOp::UShr => {
            return Err(RuntimeFailure::Internal("shift routed to arithmetic".into()))
        }
    })
}

fn float_arith(op: ArithOp, lhs: f32, rhs: f32) -> Result<f32, RuntimeFailure> {
    Ok(match op {
        ArithOp::Add => lhs + rhs,
        ArithOp::Sub => lhs - rhs,
        ArithOp::Mul => lhs * rhs,
        ArithOp::Div => lhs / rhs,
        ArithOp::Rem => lhs % rhs,
        other => {
            return Err(RuntimeFailure::Internal(format!(
                "`{}` on float operands",
                other.mnemonic()
            )))
        }
    })
}

fn double_arith(op: ArithOp, lhs: f64, rhs: f64) -> Result<f64, RuntimeFailure> {
    Ok(match op {
        ArithOp::Add => lhs + rhs,
        ArithOp::Sub => lhs - rhs,
        ArithOp::Mul => lhs * rhs,
        ArithOp::Div => lhs / rhs,
        ArithOp::Rem => lhs % rhs,
        other => {
            return Err(RuntimeFailure::Internal(format!(
                "`{}` on double operands",
                other.mnemonic()
            )))
        }
    })
}

fn shift_i32(op: ArithOp, value: i32, amount: i64) -> i32 {
    let amount = (amount & 31) as u32;
    match op {
        ArithOp::Shl => value.wrapping_shl(amount),
        ArithOp::Shr => value.wrapping_shr(amount),
        _ => ((value as u32) >> amount) as i32,
    }
}

fn shift_i64(op: ArithOp, value: i64, amount: i64) -> i64 {
    let amount = (amount & 63) as u32;
    match op {
        ArithOp::Shl => value.wrapping_shl(amount),
        ArithOp::Shr => value.wrapping_shr(amount),
        _ => ((value as u64) >> amount) as i64,
    }
}

fn compare_ints(op: CmpOp, lhs: i64, rhs: i64) -> bool {
    match op {
        CmpOp::Eq => lhs == rhs,
        CmpOp::Ne => lhs != rhs,
        CmpOp::Lt => lhs < rhs,
        CmpOp::Le => lhs <= rhs,
        CmpOp::Gt => lhs > rhs,
        CmpOp::Ge => lhs >= rhs,
    }
}

fn compare_floats(op: CmpOp, lhs: f64, rhs: f64) -> bool {
    match op {
        CmpOp::Eq => lhs == rhs,
        CmpOp::Ne => lhs != rhs,
        CmpOp::Lt => lhs < rhs,
        CmpOp::Le => lhs <= rhs,
        CmpOp::Gt => lhs > rhs,
        CmpOp::Ge => lhs >= rhs,
    }
}

fn reference_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Object(a), Value::Object(b)) => a.id == b.id,
        (Value::Array(a), Value::Array(b)) => a.id == b.id,
        // local string mirrors carry no debuggee identity; contents stand in
        (Value::String(a), Value::String(b)) => a == b,
        _ => false,
    }
}

/// Numeric conversion with Java's narrowing semantics; non-numeric targets
/// pass the value through (reference casts were checked at compile time).
fn cast_value(value: Value, tag: TypeTag) -> Result<Value, RuntimeFailure> {
    if value.tag() == tag || !tag.is_numeric() {
        return Ok(value);
    }
    enum Num {
        I(i64),
        F(f64),
    }
    let number = match &value {
        Value::Byte(v) => Num::I(i64::from(*v)),
        Value::Short(v) => Num::I(i64::from(*v)),
        Value::Char(c) => Num::I(i64::from(*c as u32)),
        Value::Int(v) => Num::I(i64::from(*v)),
        Value::Long(v) => Num::I(*v),
        Value::Float(v) => Num::F(f64::from(*v)),
        Value::Double(v) => Num::F(*v),
        other => {
            return Err(RuntimeFailure::Internal(format!(
                "cannot convert {} to {tag}",
                other.type_name()
            )))
        }
    };
    // `as` on floats saturates and maps NaN to zero, matching JLS 5.1.3;
    // float-to-small-int narrows through int first
    Ok(match tag {
        TypeTag::Byte => match number {
            Num::I(i) => Value::Byte(i as i8),
            Num::F(f) => Value::Byte((f as i32) as i8),
        },
        TypeTag::Short => match number {
            Num::I(i) => Value::Short(i as i16),
            Num::F(f) => Value::Short((f as i32) as i16),
        },
        TypeTag::Char => match number {
            Num::I(i) => Value::Char(char_from_code(i as u16)),
            Num::F(f) => Value::Char(char_from_code((f as i32) as u16)),
        },
        TypeTag::Int => match number {
            Num::I(i) => Value::Int(i as i32),
            Num::F(f) => Value::Int(f as i32),
        },
        TypeTag::Long => match number {
            Num::I(i) => Value::Long(i),
            Num::F(f) => Value::Long(f as i64),
        },
        TypeTag::Float => match number {
            Num::I(i) => Value::Float(i as f32),
            Num::F(f) => Value::Float(f as f32),
        },
        TypeTag::Double => match number {
            Num::I(i) => Value::Double(i as f64),
            Num::F(f) => Value::Double(f),
        },
        other => {
            return Err(RuntimeFailure::Internal(format!(
                "conversion to `{other}`"
            )))
        }
    })
}

/// UTF-16 code units outside the scalar-value range have no host
/// representation; they render as the replacement character.
fn char_from_code(code: u16) -> char {
    char::from_u32(u32::from(code)).unwrap_or('\u{fffd}')
}

/// `String.valueOf` for concatenation operands: primitives and `null`
/// render locally; objects and arrays ask the debuggee for `toString()`.
fn stringify(value: Value, ctx: &mut dyn RuntimeContext) -> Result<String, RuntimeFailure> {
    if let Some(text) = value.to_java_string() {
        return Ok(text);
    }
    match &value {
        Value::Object(_) | Value::Array(_) => {
            let to_string = MethodDescriptor::new(
                value.type_name(),
                "toString",
                vec![],
                JavaType::string(),
                false,
            );
            match ctx.invoke(Some(&value), &to_string, Vec::new())? {
                Value::String(text) => Ok(text),
                Value::Null => Ok("null".to_string()),
                other => Err(RuntimeFailure::Internal(format!(
                    "toString() returned {}",
                    other.type_name()
                ))),
            }
        }
        other => Err(RuntimeFailure::Internal(format!(
            "cannot render {} as a string",
            other.type_name()
        ))),
    }
}
