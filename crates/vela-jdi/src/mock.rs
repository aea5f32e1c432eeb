use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::{
    ArrayRef, ContextError, FieldDescriptor, JavaType, LocalSlot, MethodDescriptor, ObjectId,
    ObjectRef, RuntimeContext, Value,
};

/// Deterministic, in-memory runtime-context test double.
///
/// Every remote call is appended to [`calls`](Self::calls) so tests can
/// assert that an untaken branch performed no remote operation. Calls with
/// no seeded state or queued answer fail with [`ContextError::Other`] rather
/// than panicking.
pub struct MockRuntimeContext {
    this: Option<ObjectRef>,
    receiving_type: Option<ObjectRef>,
    locals: HashMap<LocalSlot, Value>,
    fields: HashMap<(Option<ObjectId>, String), Value>,
    arrays: HashMap<ObjectId, (JavaType, Vec<Value>)>,
    invocations: HashMap<String, VecDeque<Result<Value, ContextError>>>,
    constructions: HashMap<String, VecDeque<Result<ObjectRef, ContextError>>>,
    next_object_id: ObjectId,
    /// Human-readable log of every remote call, in order.
    pub calls: Vec<String>,
}

impl Default for MockRuntimeContext {
    fn default() -> Self {
        Self {
            this: None,
            receiving_type: None,
            locals: HashMap::new(),
            fields: HashMap::new(),
            arrays: HashMap::new(),
            invocations: HashMap::new(),
            constructions: HashMap::new(),
            next_object_id: 1,
            calls: Vec::new(),
        }
    }
}

impl MockRuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_this(&mut self, object: ObjectRef) {
        self.this = Some(object);
    }

    pub fn set_receiving_type(&mut self, type_name: &str) -> ObjectRef {
        let mirror = self.allocate_object(type_name.to_string());
        self.receiving_type = Some(mirror.clone());
        mirror
    }

    pub fn set_local(&mut self, slot: LocalSlot, value: Value) {
        self.locals.insert(slot, value);
    }

    pub fn local(&self, slot: LocalSlot) -> Option<&Value> {
        self.locals.get(&slot)
    }

    /// Seed a field value. `receiver` is `None` for static fields.
    pub fn set_field(&mut self, receiver: Option<ObjectId>, name: impl Into<String>, value: Value) {
        self.fields.insert((receiver, name.into()), value);
    }

    pub fn field(&self, receiver: Option<ObjectId>, name: &str) -> Option<&Value> {
        self.fields.get(&(receiver, name.to_string()))
    }

    /// Allocate an object id for a synthetic remote object.
    pub fn insert_object(&mut self, runtime_type: &str) -> ObjectRef {
        self.allocate_object(runtime_type.to_string())
    }

    /// Seed an array with the given contents and allocate an id for it.
    pub fn insert_array(&mut self, element_type: JavaType, contents: Vec<Value>) -> ArrayRef {
        let id = self.alloc_id();
        let array = ArrayRef::new(id, element_type.to_string());
        self.arrays.insert(id, (element_type, contents));
        array
    }

    pub fn array_contents(&self, id: ObjectId) -> Option<&[Value]> {
        self.arrays.get(&id).map(|(_, contents)| contents.as_slice())
    }

    /// Queue the next result for an invocation of `method_name`.
    pub fn queue_invocation(
        &mut self,
        method_name: impl Into<String>,
        result: Result<Value, ContextError>,
    ) {
        self.invocations
            .entry(method_name.into())
            .or_default()
            .push_back(result);
    }

    /// Queue the next result for a `new` of `type_name`. Without a queued
    /// result, construction allocates a fresh object of that type.
    pub fn queue_construction(
        &mut self,
        type_name: impl Into<String>,
        result: Result<ObjectRef, ContextError>,
    ) {
        self.constructions
            .entry(type_name.into())
            .or_default()
            .push_back(result);
    }

    /// Build a `Thrown` error carrying a synthetic exception object.
    pub fn thrown_exception(&mut self, runtime_type: &str) -> ContextError {
        let exception = self.allocate_object(runtime_type.to_string());
        ContextError::Thrown {
            exception: Value::Object(exception),
        }
    }

    fn alloc_id(&mut self) -> ObjectId {
        let id = self.next_object_id;
        self.next_object_id += 1;
        id
    }

    fn allocate_object(&mut self, runtime_type: String) -> ObjectRef {
        ObjectRef::new(self.alloc_id(), runtime_type)
    }

    fn out_of_bounds(&mut self) -> ContextError {
        self.thrown_exception("java.lang.ArrayIndexOutOfBoundsException")
    }

    fn log(&mut self, call: String) {
        trace!(%call, "mock remote call");
        self.calls.push(call);
    }

    fn allocate_array(
        &mut self,
        element_type: &JavaType,
        lengths: &[i32],
    ) -> Result<ArrayRef, ContextError> {
        let (len, rest) = lengths
            .split_first()
            .ok_or_else(|| ContextError::Other("new_array needs at least one dimension".into()))?;
        if *len < 0 {
            return Err(self.thrown_exception("java.lang.NegativeArraySizeException"));
        }

        let mut level_type = element_type.clone();
        for _ in 0..rest.len() {
            level_type = JavaType::array(level_type);
        }

        let mut contents = Vec::with_capacity(*len as usize);
        if rest.is_empty() {
            contents.resize(*len as usize, default_value(element_type));
        } else {
            for _ in 0..*len {
                let inner = self.allocate_array(element_type, rest)?;
                contents.push(Value::Array(inner));
            }
        }

        let id = self.alloc_id();
        let array = ArrayRef::new(id, level_type.to_string());
        self.arrays.insert(id, (level_type, contents));
        Ok(array)
    }
}

fn default_value(ty: &JavaType) -> Value {
    match ty {
        JavaType::Boolean => Value::Boolean(false),
        JavaType::Byte => Value::Byte(0),
        JavaType::Char => Value::Char('\u{0}'),
        JavaType::Short => Value::Short(0),
        JavaType::Int => Value::Int(0),
        JavaType::Long => Value::Long(0),
        JavaType::Float => Value::Float(0.0),
        JavaType::Double => Value::Double(0.0),
        _ => Value::Null,
    }
}

fn field_key(receiver: Option<&Value>, field: &FieldDescriptor) -> (Option<ObjectId>, String) {
    let receiver = if field.is_static {
        None
    } else {
        receiver.and_then(Value::object_id)
    };
    (receiver, field.name.clone())
}

impl RuntimeContext for MockRuntimeContext {
    fn this_object(&mut self) -> Result<Option<ObjectRef>, ContextError> {
        self.log("this_object".to_string());
        Ok(self.this.clone())
    }

    fn receiving_type(&mut self) -> Result<ObjectRef, ContextError> {
        self.log("receiving_type".to_string());
        self.receiving_type
            .clone()
            .ok_or_else(|| ContextError::Other("no mock receiving type configured".into()))
    }

    fn read_local(&mut self, slot: LocalSlot) -> Result<Value, ContextError> {
        self.log(format!("read_local {slot}"));
        self.locals
            .get(&slot)
            .cloned()
            .ok_or_else(|| ContextError::Other(format!("no mock local in slot {slot}")))
    }

    fn write_local(&mut self, slot: LocalSlot, value: Value) -> Result<(), ContextError> {
        self.log(format!("write_local {slot}"));
        self.locals.insert(slot, value);
        Ok(())
    }

    fn read_field(
        &mut self,
        receiver: Option<&Value>,
        field: &FieldDescriptor,
    ) -> Result<Value, ContextError> {
        self.log(format!("read_field {}", field.name));
        let key = field_key(receiver, field);
        self.fields
            .get(&key)
            .cloned()
            .ok_or_else(|| ContextError::Other(format!("no mock field `{}`", field.name)))
    }

    fn write_field(
        &mut self,
        receiver: Option<&Value>,
        field: &FieldDescriptor,
        value: Value,
    ) -> Result<(), ContextError> {
        self.log(format!("write_field {}", field.name));
        let key = field_key(receiver, field);
        self.fields.insert(key, value);
        Ok(())
    }

    fn read_array_element(
        &mut self,
        array: &ArrayRef,
        index: i32,
    ) -> Result<Value, ContextError> {
        self.log(format!("read_array_element {}[{}]", array.id, index));
        let element = match self.arrays.get(&array.id) {
            None => return Err(ContextError::InvalidObjectId(array.id)),
            Some((_, contents)) => {
                if index < 0 || index as usize >= contents.len() {
                    None
                } else {
                    Some(contents[index as usize].clone())
                }
            }
        };
        match element {
            Some(value) => Ok(value),
            None => Err(self.out_of_bounds()),
        }
    }

    fn write_array_element(
        &mut self,
        array: &ArrayRef,
        index: i32,
        value: Value,
    ) -> Result<(), ContextError> {
        self.log(format!("write_array_element {}[{}]", array.id, index));
        let len = match self.arrays.get(&array.id) {
            None => return Err(ContextError::InvalidObjectId(array.id)),
            Some((_, contents)) => contents.len(),
        };
        if index < 0 || index as usize >= len {
            return Err(self.out_of_bounds());
        }
        if let Some((_, contents)) = self.arrays.get_mut(&array.id) {
            contents[index as usize] = value;
        }
        Ok(())
    }

    fn array_length(&mut self, array: &ArrayRef) -> Result<i32, ContextError> {
        self.log(format!("array_length {}", array.id));
        match self.arrays.get(&array.id) {
            Some((_, contents)) => Ok(contents.len() as i32),
            None => Err(ContextError::InvalidObjectId(array.id)),
        }
    }

    fn invoke(
        &mut self,
        _receiver: Option<&Value>,
        method: &MethodDescriptor,
        _args: Vec<Value>,
    ) -> Result<Value, ContextError> {
        self.log(format!("invoke {}", method.name));
        match self
            .invocations
            .get_mut(&method.name)
            .and_then(VecDeque::pop_front)
        {
            Some(result) => result,
            None => Err(ContextError::Other(format!(
                "no mock invocation result queued for `{}`",
                method.name
            ))),
        }
    }

    fn new_instance(
        &mut self,
        constructor: &MethodDescriptor,
        _args: Vec<Value>,
    ) -> Result<ObjectRef, ContextError> {
        self.log(format!("new {}", constructor.declaring_type));
        if let Some(result) = self
            .constructions
            .get_mut(&constructor.declaring_type)
            .and_then(VecDeque::pop_front)
        {
            return result;
        }
        Ok(self.allocate_object(constructor.declaring_type.clone()))
    }

    fn new_array(
        &mut self,
        element_type: &JavaType,
        lengths: Vec<i32>,
    ) -> Result<ArrayRef, ContextError> {
        self.log(format!(
            "new_array {}{}",
            element_type,
            lengths
                .iter()
                .map(|len| format!("[{len}]"))
                .collect::<String>()
        ));
        self.allocate_array(element_type, &lengths)
    }
}
