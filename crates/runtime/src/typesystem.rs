//! Type System (C2): a registry from a type-identity token to a named
//! `TypeInfo` descriptor.
//!
//! Grounded on `examples/original_source/include/teascript/TypeInfo.hpp`:
//! the original compares types by `std::type_index` identity, not by name,
//! and carries `(name, size, is_arithmetic, is_signed, is_nav)`. We replace
//! `std::type_index` with a small newtype index (`TypeId`) into a `Vec`,
//! which is the natural Rust analogue of "identity token" without needing
//! `std::any::TypeId` (TeaScript's types are dynamic/user-registrable, not
//! fixed Rust types).

/// Identity token for a registered type. Two `TypeId`s compare equal iff
/// they name the same registration slot — never by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

/// A named type descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub name: String,
    pub size_bytes: usize,
    pub is_arithmetic: bool,
    pub is_signed: bool,
    pub is_nav: bool,
}

/// Registry of all known types, pre-populated with TeaScript's primitives.
pub struct TypeSystem {
    types: Vec<TypeInfo>,
}

macro_rules! prim {
    ($ts:expr, $name:expr, $size:expr, $arith:expr, $signed:expr, $nav:expr) => {
        $ts.types.push(TypeInfo {
            name: $name.to_string(),
            size_bytes: $size,
            is_arithmetic: $arith,
            is_signed: $signed,
            is_nav: $nav,
        });
    };
}

impl TypeSystem {
    pub fn new() -> Self {
        let mut ts = TypeSystem { types: Vec::new() };
        prim!(ts, "NaV", 0, false, false, true);
        prim!(ts, "Bool", 1, false, false, false);
        prim!(ts, "u8", 1, true, false, false);
        prim!(ts, "i64", 8, true, true, false);
        prim!(ts, "u64", 8, true, false, false);
        prim!(ts, "f64", 8, true, true, false);
        prim!(ts, "String", 0, false, false, false);
        prim!(ts, "Buffer", 0, false, false, false);
        prim!(ts, "Tuple", 0, false, false, false);
        prim!(ts, "Function", 0, false, false, false);
        prim!(ts, "IntegerSequence", 0, false, false, false);
        prim!(ts, "TypeInfo", 0, false, false, false);
        prim!(ts, "Error", 0, false, false, false);
        prim!(ts, "Passthrough", 0, false, false, false);
        // Concept types: not real value kinds, used only by `is`.
        prim!(ts, "Number", 0, false, false, false);
        prim!(ts, "Const", 0, false, false, false);
        ts
    }

    /// Idempotent registration: returns the existing id if `name` is
    /// already registered.
    pub fn register(&mut self, name: &str, size_bytes: usize, is_arithmetic: bool, is_signed: bool) -> TypeId {
        if let Some(id) = self.find_by_name(name) {
            return id;
        }
        self.types.push(TypeInfo {
            name: name.to_string(),
            size_bytes,
            is_arithmetic,
            is_signed,
            is_nav: false,
        });
        TypeId((self.types.len() - 1) as u32)
    }

    pub fn find_by_name(&self, name: &str) -> Option<TypeId> {
        self.types.iter().position(|t| t.name == name).map(|i| TypeId(i as u32))
    }

    pub fn get(&self, id: TypeId) -> &TypeInfo {
        &self.types[id.0 as usize]
    }

    pub fn nav(&self) -> TypeId {
        TypeId(0)
    }
    pub fn bool_type(&self) -> TypeId {
        TypeId(1)
    }
    pub fn u8_type(&self) -> TypeId {
        TypeId(2)
    }
    pub fn i64_type(&self) -> TypeId {
        TypeId(3)
    }
    pub fn u64_type(&self) -> TypeId {
        TypeId(4)
    }
    pub fn f64_type(&self) -> TypeId {
        TypeId(5)
    }
    pub fn string_type(&self) -> TypeId {
        TypeId(6)
    }
    pub fn buffer_type(&self) -> TypeId {
        TypeId(7)
    }
    pub fn tuple_type(&self) -> TypeId {
        TypeId(8)
    }
    pub fn function_type(&self) -> TypeId {
        TypeId(9)
    }
    pub fn integer_sequence_type(&self) -> TypeId {
        TypeId(10)
    }
    pub fn type_info_type(&self) -> TypeId {
        TypeId(11)
    }
    pub fn error_type(&self) -> TypeId {
        TypeId(12)
    }
    pub fn passthrough_type(&self) -> TypeId {
        TypeId(13)
    }
    pub fn number_concept(&self) -> TypeId {
        TypeId(14)
    }
    pub fn const_concept(&self) -> TypeId {
        TypeId(15)
    }
}

impl Default for TypeSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_idempotent() {
        let mut ts = TypeSystem::new();
        let a = ts.register("Widget", 4, false, false);
        let b = ts.register("Widget", 999, true, true);
        assert_eq!(a, b);
        assert_eq!(ts.get(a).size_bytes, 4);
    }

    #[test]
    fn type_ids_compare_by_identity_not_name() {
        let ts = TypeSystem::new();
        assert_eq!(ts.i64_type(), ts.i64_type());
        assert_ne!(ts.i64_type(), ts.u64_type());
    }
}
