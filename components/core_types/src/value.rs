//! Guest value representation.
//!
//! Values follow the two-slot convention for 64-bit primitives: a `Long` or
//! `Double` on an operand stack or in a local-variable array is immediately
//! followed by a [`Value::HighPadding`] slot.

use crate::heap::ObjectId;

/// A single guest value slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// The null reference.
    Null,
    /// 32-bit signed integer (also carries booleans as 0/1, chars, shorts).
    Int(i32),
    /// 64-bit signed integer. Occupies two slots; the next slot is padding.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float. Occupies two slots; the next slot is padding.
    Double(f64),
    /// Reference to a heap object.
    Ref(ObjectId),
    /// The second slot of a two-slot value. Never observed by guest code.
    HighPadding,
}

impl Value {
    /// Returns true for values that occupy two stack/local slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    /// Returns the contained `i32`, or `None` for non-integer values.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the contained `i64`, or `None` for non-long values.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Returns the referenced object, or `None` for `Null` and non-references.
    pub fn as_ref_id(&self) -> Option<ObjectId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns true if this value is the null reference.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}
