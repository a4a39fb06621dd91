//! Handle-based host heap for guest objects.
//!
//! Object lifetime is delegated to the host: the heap only allocates and
//! hands out stable [`ObjectId`] handles. There is no garbage collection.

use std::collections::HashMap;

use crate::value::Value;

/// Stable handle to a heap-allocated guest object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u32);

/// A guest object: named fields plus an optional array body.
#[derive(Debug, Clone, PartialEq)]
pub struct HeapObject {
    /// Internal class name, e.g. `java/lang/Object`.
    pub class_name: String,
    /// Named instance fields.
    pub fields: HashMap<String, Value>,
    /// Array storage, present only for array objects.
    pub array: Option<Vec<Value>>,
}

impl HeapObject {
    /// Create a plain (non-array) object of the given class.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fields: HashMap::new(),
            array: None,
        }
    }

    /// Create an array object of the given class with `len` null elements.
    pub fn new_array(class_name: impl Into<String>, len: usize) -> Self {
        Self {
            class_name: class_name.into(),
            fields: HashMap::new(),
            array: Some(vec![Value::Null; len]),
        }
    }
}

/// The host heap. Allocation-only; object destruction is out of scope.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
}

impl Heap {
    /// Create an empty heap.
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// Allocate an object and return its handle.
    pub fn alloc(&mut self, obj: HeapObject) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(obj);
        id
    }

    /// Look up an object by handle.
    pub fn get(&self, id: ObjectId) -> Option<&HeapObject> {
        self.objects.get(id.0 as usize)
    }

    /// Look up an object mutably by handle.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        self.objects.get_mut(id.0 as usize)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
