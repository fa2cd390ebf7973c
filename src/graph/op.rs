//! Op, tensor identities and attribute values
//!
//! An [`Op`] is a plain value; its identity ([`OpId`]) is assigned by the
//! [`Graph`](super::Graph) it is inserted into.

use std::fmt;

use indexmap::IndexMap;

/// Stable op identity within one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u32);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// Stable tensor identity within one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub u32);

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Attribute value attached to an op
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Integer
    Int(i64),
    /// Float
    Float(f32),
    /// Boolean
    Bool(bool),
    /// String
    Str(String),
    /// Integer list
    Ints(Vec<i64>),
    /// Float list
    Floats(Vec<f32>),
    /// String list
    Strs(Vec<String>),
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        Self::Ints(v)
    }
}

impl From<Vec<f32>> for AttrValue {
    fn from(v: Vec<f32>) -> Self {
        Self::Floats(v)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(v: Vec<String>) -> Self {
        Self::Strs(v)
    }
}

/// Ordered attribute map
pub type AttrMap = IndexMap<String, AttrValue>;

/// The ops a fused op replaced, kept for lowering
#[derive(Debug, Clone, PartialEq)]
pub struct FusedBody {
    /// Name of the pattern that produced the fusion
    pub pattern: String,
    /// Removed ops with their former identities, in graph order
    pub ops: Vec<(OpId, Op)>,
}

/// A computation node
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    /// Kind identifier (e.g. `"relu"`)
    pub kind: String,
    /// Ordered input tensors
    pub inputs: Vec<TensorId>,
    /// Ordered output tensors
    pub outputs: Vec<TensorId>,
    /// Named attributes
    pub attrs: AttrMap,
    /// Set on fused ops only
    pub body: Option<Box<FusedBody>>,
}

impl Op {
    /// Create an op of the given kind with no ports
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            attrs: AttrMap::new(),
            body: None,
        }
    }

    /// Set the input tensors
    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = TensorId>) -> Self {
        self.inputs = inputs.into_iter().collect();
        self
    }

    /// Set the output tensors
    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = TensorId>) -> Self {
        self.outputs = outputs.into_iter().collect();
        self
    }

    /// Add an attribute
    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Get attribute by name
    pub fn get_attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    /// Check if the op carries an attribute
    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Get integer attribute value with default
    pub fn get_attr_int(&self, name: &str, default: i64) -> i64 {
        match self.attrs.get(name) {
            Some(AttrValue::Int(v)) => *v,
            _ => default,
        }
    }

    /// Get float attribute value with default
    pub fn get_attr_float(&self, name: &str, default: f32) -> f32 {
        match self.attrs.get(name) {
            Some(AttrValue::Float(v)) => *v,
            _ => default,
        }
    }

    /// Get boolean attribute value with default
    pub fn get_attr_bool(&self, name: &str, default: bool) -> bool {
        match self.attrs.get(name) {
            Some(AttrValue::Bool(v)) => *v,
            _ => default,
        }
    }

    /// Get string attribute value
    pub fn get_attr_str(&self, name: &str) -> Option<&str> {
        match self.attrs.get(name) {
            Some(AttrValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Whether this op is the product of a fusion
    pub fn is_fused(&self) -> bool {
        self.body.is_some()
    }
}
