//! Explicit type descriptors used to key converter registrations

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifies a conversion target: the concrete Rust type plus optional type parameters
///
/// Equality and hashing only consider the concrete type. Parameters are informational and
/// let converters of generic containers describe their element types.
#[derive(Clone)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
    params: Vec<TypeDescriptor>,
}

impl TypeDescriptor {
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            params: Vec::new(),
        }
    }

    /// Descriptor of `T` carrying the given type parameters
    pub fn parameterized<T: 'static + ?Sized>(params: Vec<TypeDescriptor>) -> Self {
        Self {
            params,
            ..Self::of::<T>()
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without module paths, e.g. `Vec<i32>`
    pub fn simple_name(&self) -> String {
        let mut simple = String::with_capacity(self.name.len());
        let mut segment = String::new();
        for c in self.name.chars() {
            match c {
                ':' => segment.clear(),
                '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                    simple.push_str(&segment);
                    segment.clear();
                    simple.push(c);
                }
                _ => segment.push(c),
            }
        }
        simple.push_str(&segment);
        simple
    }

    pub fn params(&self) -> &[TypeDescriptor] {
        &self.params
    }

    pub fn is_parameterized(&self) -> bool {
        !self.params.is_empty()
    }

    pub fn is<T: 'static + ?Sized>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.simple_name())
    }
}
