//! Source-level C types attached to IR operands
//!
//! The analyzer needs just enough of the C type system to resolve pointers,
//! unmanaged arrays and aggregate fields: bit sizes, signedness, referent and
//! element accessors, and per-field offsets. Aggregate declarations are shared
//! behind an `Arc` so that every operand of the same struct type points at one
//! field table.

use std::fmt;
use std::sync::Arc;

/// A source-level type as the IR producer describes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CType {
    Void,
    /// Integer scalar with an explicit width and signedness.
    Int { bits: u32, signed: bool },
    /// Floating-point scalar. The analyzer coerces float immediates to
    /// integers at ingest; the width is kept for the coerced value.
    Float { bits: u32 },
    /// Pointer to a referent type. `bits` is the pointer width on the target.
    Pointer { referent: Box<CType>, bits: u32 },
    /// Unmanaged (C-style) array. `length` is `None` for incomplete types.
    Array {
        element: Box<CType>,
        length: Option<u64>,
    },
    /// Struct or union.
    Aggregate(Arc<AggregateType>),
}

/// Declared layout of a struct or union.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct AggregateType {
    pub name: String,
    /// Total size of the aggregate in bits.
    pub bits: u32,
    pub is_union: bool,
    pub fields: Vec<Field>,
}

/// One field of an aggregate, with its bit offset from the aggregate start.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: CType,
    pub bit_offset: u64,
}

impl CType {
    /// Signed integer of the given width.
    pub fn int(bits: u32) -> Self {
        CType::Int { bits, signed: true }
    }

    /// Unsigned integer of the given width.
    pub fn uint(bits: u32) -> Self {
        CType::Int {
            bits,
            signed: false,
        }
    }

    pub fn float(bits: u32) -> Self {
        CType::Float { bits }
    }

    pub fn pointer(referent: CType, bits: u32) -> Self {
        CType::Pointer {
            referent: Box::new(referent),
            bits,
        }
    }

    pub fn array(element: CType, length: Option<u64>) -> Self {
        CType::Array {
            element: Box::new(element),
            length,
        }
    }

    pub fn aggregate(decl: Arc<AggregateType>) -> Self {
        CType::Aggregate(decl)
    }

    /// Size of a value of this type, in bits.
    pub fn bit_size(&self) -> u32 {
        match self {
            CType::Void => 0,
            CType::Int { bits, .. } | CType::Float { bits } | CType::Pointer { bits, .. } => *bits,
            CType::Array { element, length } => match length {
                Some(n) => element.bit_size() * (*n as u32),
                None => element.bit_size(),
            },
            CType::Aggregate(decl) => decl.bits,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer { .. })
    }

    pub fn is_unmanaged_array(&self) -> bool {
        matches!(self, CType::Array { .. })
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, CType::Aggregate(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, CType::Float { .. })
    }

    /// True for unsigned integer scalars; everything else is treated as
    /// signed when choosing operator variants.
    pub fn is_unsigned(&self) -> bool {
        matches!(self, CType::Int { signed: false, .. })
    }

    /// Referent of a pointer type.
    pub fn referent(&self) -> Option<&CType> {
        match self {
            CType::Pointer { referent, .. } => Some(referent),
            _ => None,
        }
    }

    /// One indexing level down: the referent of a pointer or the element of
    /// an unmanaged array.
    pub fn element(&self) -> Option<&CType> {
        match self {
            CType::Pointer { referent, .. } => Some(referent),
            CType::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Declared element count of a fixed-size array level.
    pub fn fixed_length(&self) -> Option<u64> {
        match self {
            CType::Array { length, .. } => *length,
            _ => None,
        }
    }

    pub fn as_aggregate(&self) -> Option<&Arc<AggregateType>> {
        match self {
            CType::Aggregate(decl) => Some(decl),
            _ => None,
        }
    }
}

impl AggregateType {
    /// Bit size of one field, from its declared type.
    pub fn field_bits(&self, field: &Field) -> u32 {
        field.ty.bit_size()
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CType::Void => write!(f, "void"),
            CType::Int { bits, signed: true } => write!(f, "i{bits}"),
            CType::Int {
                bits,
                signed: false,
            } => write!(f, "u{bits}"),
            CType::Float { bits } => write!(f, "f{bits}"),
            CType::Pointer { referent, .. } => write!(f, "{referent}*"),
            CType::Array { element, length } => match length {
                Some(n) => write!(f, "{element}[{n}]"),
                None => write!(f, "{element}[]"),
            },
            CType::Aggregate(decl) => write!(f, "{}", decl.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_sizes() {
        assert_eq!(CType::int(32).bit_size(), 32);
        assert_eq!(CType::pointer(CType::int(8), 32).bit_size(), 32);
        assert_eq!(CType::array(CType::int(32), Some(8)).bit_size(), 256);
        assert_eq!(CType::array(CType::int(32), None).bit_size(), 32);
    }

    #[test]
    fn element_walk() {
        let p = CType::pointer(CType::array(CType::int(16), Some(4)), 32);
        let level1 = p.element().unwrap();
        assert!(level1.is_unmanaged_array());
        assert_eq!(level1.fixed_length(), Some(4));
        assert_eq!(level1.element().unwrap().bit_size(), 16);
    }

    #[test]
    fn signedness() {
        assert!(CType::uint(32).is_unsigned());
        assert!(!CType::int(32).is_unsigned());
        assert!(!CType::pointer(CType::int(8), 32).is_unsigned());
    }
}
