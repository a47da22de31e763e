//! PDF object types.
//!
//! The fundamental sum type for PDF values, plus streams and indirect
//! references. Dictionaries preserve insertion order, which the resource
//! walker relies on when enumerating entries.

use crate::error::{RenderError, Result};
use bytes::Bytes;
use indexmap::IndexMap;

/// A PDF dictionary: name -> object mapping in insertion order.
pub type Dict = IndexMap<String, Object>;

/// PDF object types - the fundamental value type in PDF.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Real (floating point) value
    Real(f64),
    /// Name object (e.g., /Type, /Font)
    Name(String),
    /// String (byte array)
    String(Vec<u8>),
    /// Array of objects
    Array(Vec<Self>),
    /// Dictionary (name -> object mapping)
    Dict(Dict),
    /// Stream (dictionary + binary data)
    Stream(Box<Stream>),
    /// Indirect object reference
    Ref(ObjRef),
}

impl Object {
    /// Check if this is a null object
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get as boolean
    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(RenderError::TypeCheck {
                expected: "bool",
                got: self.type_name(),
            }),
        }
    }

    /// Get as integer
    pub const fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            _ => Err(RenderError::TypeCheck {
                expected: "int",
                got: self.type_name(),
            }),
        }
    }

    /// Get numeric value (int or real coerced to f64)
    pub const fn as_num(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Real(n) => Ok(*n),
            _ => Err(RenderError::TypeCheck {
                expected: "number",
                got: self.type_name(),
            }),
        }
    }

    /// Get as name string
    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(RenderError::TypeCheck {
                expected: "name",
                got: self.type_name(),
            }),
        }
    }

    /// Get as array
    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(RenderError::TypeCheck {
                expected: "array",
                got: self.type_name(),
            }),
        }
    }

    /// Get as dictionary. A stream answers with its own dictionary, since a
    /// stream is usable anywhere a dictionary is expected.
    pub fn as_dict(&self) -> Result<&Dict> {
        match self {
            Self::Dict(d) => Ok(d),
            Self::Stream(s) => Ok(&s.dict),
            _ => Err(RenderError::TypeCheck {
                expected: "dict",
                got: self.type_name(),
            }),
        }
    }

    /// Get as stream
    pub fn as_stream(&self) -> Result<&Stream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(RenderError::TypeCheck {
                expected: "stream",
                got: self.type_name(),
            }),
        }
    }

    /// Get as object reference
    pub const fn as_obj_ref(&self) -> Result<&ObjRef> {
        match self {
            Self::Ref(r) => Ok(r),
            _ => Err(RenderError::TypeCheck {
                expected: "ref",
                got: self.type_name(),
            }),
        }
    }

    /// Check whether this is a name equal to the given string.
    pub fn name_is(&self, name: &str) -> bool {
        matches!(self, Self::Name(s) if s == name)
    }

    /// Type name for error messages
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Ref(_) => "ref",
        }
    }
}

/// Indirect object reference (object id + generation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    pub objid: u32,
    pub genno: u16,
}

impl ObjRef {
    pub const fn new(objid: u32, genno: u16) -> Self {
        Self { objid, genno }
    }
}

/// A PDF stream: attribute dictionary plus raw (still encoded) data.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    /// Stream attributes (Filter, Length, image keys, ...)
    pub dict: Dict,
    /// Raw stream payload, exactly as it appeared between stream/endstream.
    data: Bytes,
}

impl Stream {
    pub fn new(dict: Dict, data: impl Into<Bytes>) -> Self {
        Self {
            dict,
            data: data.into(),
        }
    }

    /// Get an attribute from the stream dictionary.
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.dict.get(key)
    }

    /// Raw (undecoded) stream data.
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    /// Raw data length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Shorthand for building a `Dict` from key/object pairs, used heavily in
/// tests.
pub fn dict_from(pairs: impl IntoIterator<Item = (&'static str, Object)>) -> Dict {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        assert!(Object::Null.is_null());
        assert_eq!(Object::Int(42).as_int().unwrap(), 42);
        assert_eq!(Object::Int(42).as_num().unwrap(), 42.0);
        assert_eq!(Object::Real(0.5).as_num().unwrap(), 0.5);
        assert_eq!(Object::Name("Image".into()).as_name().unwrap(), "Image");
        assert!(Object::Null.as_int().is_err());
        assert!(Object::Name("X".into()).name_is("X"));
        assert!(!Object::Name("X".into()).name_is("Y"));
    }

    #[test]
    fn stream_answers_as_dict() {
        let s = Stream::new(
            dict_from([("Subtype", Object::Name("Image".into()))]),
            &b"abc"[..],
        );
        let obj = Object::Stream(Box::new(s));
        assert_eq!(
            obj.as_dict()
                .unwrap()
                .get("Subtype")
                .unwrap()
                .as_name()
                .unwrap(),
            "Image"
        );
    }

    #[test]
    fn dict_preserves_insertion_order() {
        let d = dict_from([
            ("Zebra", Object::Int(1)),
            ("Apple", Object::Int(2)),
            ("Mango", Object::Int(3)),
        ]);
        let keys: Vec<&str> = d.keys().map(String::as_str).collect();
        assert_eq!(keys, ["Zebra", "Apple", "Mango"]);
    }
}
