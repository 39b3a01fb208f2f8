use std::collections::BTreeMap;

use crate::core::{ConfigurationError, Vector3D};

/// Map from property names to values, with deterministic iteration order.
pub type PropertyMap = BTreeMap<String, Property>;

/// A value stored by frames, atoms and residues under a free-form name.
///
/// Reading a property as the wrong kind is a typed error, never a silent
/// coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Bool(bool),
    Double(f64),
    String(String),
    Vector3D(Vector3D),
}

impl Property {
    /// Name of the kind currently held, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Property::Bool(_) => "bool",
            Property::Double(_) => "double",
            Property::String(_) => "string",
            Property::Vector3D(_) => "Vector3D",
        }
    }

    pub fn as_bool(&self) -> Result<bool, ConfigurationError> {
        match self {
            Property::Bool(value) => Ok(*value),
            _ => Err(self.wrong_kind("bool")),
        }
    }

    pub fn as_double(&self) -> Result<f64, ConfigurationError> {
        match self {
            Property::Double(value) => Ok(*value),
            _ => Err(self.wrong_kind("double")),
        }
    }

    pub fn as_string(&self) -> Result<&str, ConfigurationError> {
        match self {
            Property::String(value) => Ok(value),
            _ => Err(self.wrong_kind("string")),
        }
    }

    pub fn as_vector3d(&self) -> Result<Vector3D, ConfigurationError> {
        match self {
            Property::Vector3D(value) => Ok(*value),
            _ => Err(self.wrong_kind("Vector3D")),
        }
    }

    fn wrong_kind(&self, expected: &'static str) -> ConfigurationError {
        ConfigurationError::PropertyKind {
            expected,
            actual: self.kind(),
        }
    }
}

impl From<bool> for Property {
    fn from(value: bool) -> Self {
        Property::Bool(value)
    }
}

impl From<f64> for Property {
    fn from(value: f64) -> Self {
        Property::Double(value)
    }
}

impl From<&str> for Property {
    fn from(value: &str) -> Self {
        Property::String(value.to_owned())
    }
}

impl From<String> for Property {
    fn from(value: String) -> Self {
        Property::String(value)
    }
}

impl From<Vector3D> for Property {
    fn from(value: Vector3D) -> Self {
        Property::Vector3D(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        let p = Property::from(42.0);
        assert_eq!(p.as_double().unwrap(), 42.0);
        assert!(p.as_bool().is_err());
        assert!(p.as_string().is_err());

        let p = Property::from("hello");
        assert_eq!(p.as_string().unwrap(), "hello");
        let err = p.as_double().unwrap_err().to_string();
        assert_eq!(err, "tried to read a string property as double");

        let p = Property::from(Vector3D::new(1.0, 2.0, 3.0));
        assert_eq!(p.as_vector3d().unwrap(), Vector3D::new(1.0, 2.0, 3.0));
        assert!(p.as_bool().is_err());
    }
}
