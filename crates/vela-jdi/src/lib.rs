//! Debuggee value model and runtime-context facade for Vela.
//!
//! `vela-eval` consumes this crate to execute compiled expressions against a
//! suspended JVM frame. The [`RuntimeContext`] trait is deliberately narrow:
//! every operation is a blocking remote round trip bound to one suspended
//! thread, and overload resolution never happens here — field and method
//! descriptors arrive fully resolved from the compiler.

mod mock;

use std::fmt;

use thiserror::Error;

pub use mock::MockRuntimeContext;

pub type ObjectId = u64;
pub type LocalSlot = u16;

pub const JAVA_LANG_OBJECT: &str = "java.lang.Object";
pub const JAVA_LANG_STRING: &str = "java.lang.String";

/// Static type tag attached to every compiled value.
///
/// This is the closed lattice numeric/`String` promotion is defined over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Undefined,
    Object,
    Char,
    Byte,
    Short,
    Boolean,
    Void,
    Long,
    Double,
    Float,
    Int,
    String,
    Null,
}

impl TypeTag {
    pub const ALL: [TypeTag; 13] = [
        TypeTag::Undefined,
        TypeTag::Object,
        TypeTag::Char,
        TypeTag::Byte,
        TypeTag::Short,
        TypeTag::Boolean,
        TypeTag::Void,
        TypeTag::Long,
        TypeTag::Double,
        TypeTag::Float,
        TypeTag::Int,
        TypeTag::String,
        TypeTag::Null,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Undefined => "<undefined>",
            TypeTag::Object => "Object",
            TypeTag::Char => "char",
            TypeTag::Byte => "byte",
            TypeTag::Short => "short",
            TypeTag::Boolean => "boolean",
            TypeTag::Void => "void",
            TypeTag::Long => "long",
            TypeTag::Double => "double",
            TypeTag::Float => "float",
            TypeTag::Int => "int",
            TypeTag::String => "String",
            TypeTag::Null => "null",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            TypeTag::Char
                | TypeTag::Byte
                | TypeTag::Short
                | TypeTag::Int
                | TypeTag::Long
                | TypeTag::Float
                | TypeTag::Double
        )
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            TypeTag::Char | TypeTag::Byte | TypeTag::Short | TypeTag::Int | TypeTag::Long
        )
    }

    /// `char`, `byte` and `short` widen to `int` before any operation.
    pub fn is_sub_int(self) -> bool {
        matches!(self, TypeTag::Char | TypeTag::Byte | TypeTag::Short)
    }

    /// Reference kinds; a `null` literal is assignable to any of them.
    pub fn is_reference(self) -> bool {
        matches!(self, TypeTag::Object | TypeTag::String | TypeTag::Null)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A declared Java type as bindings and descriptors carry it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum JavaType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
    /// The type of the `null` literal (JLS 4.1).
    Null,
    /// A class or interface type, by fully qualified source name.
    Reference(String),
    Array(Box<JavaType>),
}

impl JavaType {
    pub fn reference(name: impl Into<String>) -> Self {
        JavaType::Reference(name.into())
    }

    pub fn array(element: JavaType) -> Self {
        JavaType::Array(Box::new(element))
    }

    pub fn string() -> Self {
        JavaType::Reference(JAVA_LANG_STRING.to_string())
    }

    pub fn object() -> Self {
        JavaType::Reference(JAVA_LANG_OBJECT.to_string())
    }

    pub fn tag(&self) -> TypeTag {
        match self {
            JavaType::Boolean => TypeTag::Boolean,
            JavaType::Byte => TypeTag::Byte,
            JavaType::Char => TypeTag::Char,
            JavaType::Short => TypeTag::Short,
            JavaType::Int => TypeTag::Int,
            JavaType::Long => TypeTag::Long,
            JavaType::Float => TypeTag::Float,
            JavaType::Double => TypeTag::Double,
            JavaType::Void => TypeTag::Void,
            JavaType::Null => TypeTag::Null,
            JavaType::Reference(name) if name == JAVA_LANG_STRING => TypeTag::String,
            JavaType::Reference(_) => TypeTag::Object,
            JavaType::Array(_) => TypeTag::Object,
        }
    }

    /// JNI-style signature: `I`, `Ljava/lang/String;`, `[I`.
    pub fn signature(&self) -> String {
        match self {
            JavaType::Boolean => "Z".to_string(),
            JavaType::Byte => "B".to_string(),
            JavaType::Char => "C".to_string(),
            JavaType::Short => "S".to_string(),
            JavaType::Int => "I".to_string(),
            JavaType::Long => "J".to_string(),
            JavaType::Float => "F".to_string(),
            JavaType::Double => "D".to_string(),
            JavaType::Void => "V".to_string(),
            // the null type erases to Object on the wire
            JavaType::Null => format!("L{};", JAVA_LANG_OBJECT.replace('.', "/")),
            JavaType::Reference(name) => format!("L{};", name.replace('.', "/")),
            JavaType::Array(element) => format!("[{}", element.signature()),
        }
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JavaType::Boolean => f.write_str("boolean"),
            JavaType::Byte => f.write_str("byte"),
            JavaType::Char => f.write_str("char"),
            JavaType::Short => f.write_str("short"),
            JavaType::Int => f.write_str("int"),
            JavaType::Long => f.write_str("long"),
            JavaType::Float => f.write_str("float"),
            JavaType::Double => f.write_str("double"),
            JavaType::Void => f.write_str("void"),
            JavaType::Null => f.write_str("null"),
            JavaType::Reference(name) => f.write_str(name),
            JavaType::Array(element) => write!(f, "{element}[]"),
        }
    }
}

/// A remote object reference.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectRef {
    pub id: ObjectId,
    pub runtime_type: String,
}

impl ObjectRef {
    pub fn new(id: ObjectId, runtime_type: impl Into<String>) -> Self {
        Self {
            id,
            runtime_type: runtime_type.into(),
        }
    }
}

/// A remote array reference.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayRef {
    pub id: ObjectId,
    pub element_type: String,
}

impl ArrayRef {
    pub fn new(id: ObjectId, element_type: impl Into<String>) -> Self {
        Self {
            id,
            element_type: element_type.into(),
        }
    }
}

/// A typed runtime value produced by evaluating (part of) an expression.
///
/// The tag assigned at compile time is never contradicted by data returned
/// from the runtime context; a mismatch is a defect, not a runtime condition.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Void,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    /// Local mirror of a remote `java.lang.String`.
    String(String),
    Object(ObjectRef),
    Array(ArrayRef),
}

impl Value {
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Void => TypeTag::Void,
            Value::Boolean(_) => TypeTag::Boolean,
            Value::Byte(_) => TypeTag::Byte,
            Value::Short(_) => TypeTag::Short,
            Value::Int(_) => TypeTag::Int,
            Value::Long(_) => TypeTag::Long,
            Value::Float(_) => TypeTag::Float,
            Value::Double(_) => TypeTag::Double,
            Value::Char(_) => TypeTag::Char,
            Value::String(_) => TypeTag::String,
            Value::Object(_) => TypeTag::Object,
            Value::Array(_) => TypeTag::Object,
        }
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Value::Object(object) => Some(object.id),
            Value::Array(array) => Some(array.id),
            _ => None,
        }
    }

    /// Runtime type name as a debugger would display it.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Void => "void".to_string(),
            Value::Boolean(_) => "boolean".to_string(),
            Value::Byte(_) => "byte".to_string(),
            Value::Short(_) => "short".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Long(_) => "long".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Double(_) => "double".to_string(),
            Value::Char(_) => "char".to_string(),
            Value::String(_) => JAVA_LANG_STRING.to_string(),
            Value::Object(object) => object.runtime_type.clone(),
            Value::Array(array) => format!("{}[]", array.element_type),
        }
    }

    /// Render the value the way Java's `String.valueOf` would.
    ///
    /// Object and array references need a remote `toString()` and return
    /// `None`; so does `void`, which is not a value at all.
    pub fn to_java_string(&self) -> Option<String> {
        match self {
            Value::Null => Some("null".to_string()),
            Value::Void => None,
            Value::Boolean(v) => Some(v.to_string()),
            Value::Byte(v) => Some(v.to_string()),
            Value::Short(v) => Some(v.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::Long(v) => Some(v.to_string()),
            Value::Float(v) => Some(java_float_string(*v)),
            Value::Double(v) => Some(java_double_string(*v)),
            Value::Char(c) => Some(c.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Object(_) | Value::Array(_) => None,
        }
    }
}

/// Java renders whole floats with a trailing `.0` (`1.0`, not `1`).
fn java_float_string(value: f32) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f32::INFINITY {
        "Infinity".to_string()
    } else if value == f32::NEG_INFINITY {
        "-Infinity".to_string()
    } else if value == value.trunc() {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

fn java_double_string(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "Infinity".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if value == value.trunc() {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Void => f.write_str("void"),
            Value::Char(c) => write!(f, "'{c}'"),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Object(object) => write!(f, "{}@{}", object.runtime_type, object.id),
            Value::Array(array) => write!(f, "{}[]@{}", array.element_type, array.id),
            other => match other.to_java_string() {
                Some(s) => f.write_str(&s),
                None => Ok(()),
            },
        }
    }
}

/// A field fully resolved at compile time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub declaring_type: String,
    pub name: String,
    pub ty: JavaType,
    pub is_static: bool,
}

impl FieldDescriptor {
    pub fn new(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        ty: JavaType,
        is_static: bool,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            ty,
            is_static,
        }
    }
}

/// A method (or constructor) fully resolved at compile time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub declaring_type: String,
    pub name: String,
    pub params: Vec<JavaType>,
    pub return_type: JavaType,
    pub is_static: bool,
}

impl MethodDescriptor {
    pub fn new(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        params: Vec<JavaType>,
        return_type: JavaType,
        is_static: bool,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            params,
            return_type,
            is_static,
        }
    }

    /// JNI-style signature, e.g. `(ILjava/lang/String;)V`.
    pub fn signature(&self) -> String {
        let mut signature = String::from("(");
        for param in &self.params {
            signature.push_str(&param.signature());
        }
        signature.push(')');
        signature.push_str(&self.return_type.signature());
        signature
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ContextError {
    /// The evaluated code threw inside the debuggee. Carries the thrown
    /// value; the evaluation reports it as its outcome.
    #[error("debuggee threw {exception}")]
    Thrown { exception: Value },
    #[error("debuggee context lost: {0}")]
    ContextLost(String),
    #[error("remote call timed out")]
    Timeout,
    #[error("invalid object id {0}")]
    InvalidObjectId(ObjectId),
    #[error("{0}")]
    Other(String),
}

/// Narrow, blocking interface onto one suspended debuggee frame.
///
/// Every call is a remote round trip that suspends the evaluation until the
/// debuggee has run and re-suspended; each may take an unbounded but finite
/// time and may fail. Implementations are not reentrant: a context
/// represents one suspended thread's execution state, and at most one
/// evaluation may drive it at a time.
pub trait RuntimeContext: Send {
    /// The `this` object of the suspended frame, or `None` in a static frame.
    fn this_object(&mut self) -> Result<Option<ObjectRef>, ContextError>;

    /// Class mirror of the type declaring the suspended frame. Evaluating
    /// `this` in a static frame yields this mirror instead.
    fn receiving_type(&mut self) -> Result<ObjectRef, ContextError>;

    fn read_local(&mut self, slot: LocalSlot) -> Result<Value, ContextError>;
    fn write_local(&mut self, slot: LocalSlot, value: Value) -> Result<(), ContextError>;

    /// Read a field. `receiver` is `None` for static fields.
    fn read_field(
        &mut self,
        receiver: Option<&Value>,
        field: &FieldDescriptor,
    ) -> Result<Value, ContextError>;

    fn write_field(
        &mut self,
        receiver: Option<&Value>,
        field: &FieldDescriptor,
        value: Value,
    ) -> Result<(), ContextError>;

    fn read_array_element(&mut self, array: &ArrayRef, index: i32)
        -> Result<Value, ContextError>;

    fn write_array_element(
        &mut self,
        array: &ArrayRef,
        index: i32,
        value: Value,
    ) -> Result<(), ContextError>;

    fn array_length(&mut self, array: &ArrayRef) -> Result<i32, ContextError>;

    /// Invoke a fully resolved method. `receiver` is `None` for static calls.
    fn invoke(
        &mut self,
        receiver: Option<&Value>,
        method: &MethodDescriptor,
        args: Vec<Value>,
    ) -> Result<Value, ContextError>;

    fn new_instance(
        &mut self,
        constructor: &MethodDescriptor,
        args: Vec<Value>,
    ) -> Result<ObjectRef, ContextError>;

    /// Allocate a (possibly multi-dimensional) array of `element_type`.
    fn new_array(
        &mut self,
        element_type: &JavaType,
        lengths: Vec<i32>,
    ) -> Result<ArrayRef, ContextError>;
}
