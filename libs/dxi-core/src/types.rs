//! The closed type system: primitive and composite type descriptors with
//! fully specified layout, alignment, naming, print/scan, casting and
//! hashing semantics.
//!
//! A concrete type is a pair `(DataType, size)`; the size discriminates
//! widths within a family (`int32` vs `int64`, `string10` vs `blob4`).
//! Typed values are carried by [`Value`], one variant per representable
//! width, so deep copy and deep release fall out of `Clone` and `Drop`.

use crate::errors::{ensure_or, raise, ErrorKind, Result};
use crate::instance::InstanceRef;

use core::fmt;

mod cast_impl;
mod hash_impl;
pub(crate) mod print_impl;

pub use cast_impl::{copy_cast, ndcast};
pub use hash_impl::update_sha3;
pub use print_impl::{aprint, print, scan, PrintFlags};

/// Size of a pointer-sized member in the portable layout model.
///
/// Entity layouts are computed against a fixed 64-bit model so that two
/// runtimes agree on offsets regardless of the host.
pub const POINTER_SIZE: usize = 8;

/// Model sizes of the structural composites (two, eight and five
/// pointer-sized members respectively).
pub const DIMENSION_SIZE: usize = 2 * POINTER_SIZE;
pub const PROPERTY_SIZE: usize = 8 * POINTER_SIZE;
pub const RELATION_SIZE: usize = 5 * POINTER_SIZE;

/// An enumeration of the data type families.
///
/// The set is closed: everything an entity property can hold is one of
/// these, sized by the accompanying `size` field of the property.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DataType {
    /// Fixed-size binary blob of `size` bytes.
    Blob,
    /// Boolean, persisted as one unsigned byte.
    Bool,
    /// Signed integer of `size` ∈ {1, 2, 4, 8} bytes.
    Int,
    /// Unsigned integer of `size` ∈ {1, 2, 4, 8} bytes.
    UInt,
    /// IEEE float of `size` ∈ {4, 8} bytes.  Sizes 10, 12 and 16 are
    /// recognized by the name grammar but have no value representation
    /// here; value-level operations on them fail with `Unsupported`.
    Float,
    /// Fixed-size string buffer of `size` bytes: NUL-padded,
    /// NUL-terminated when it fits.
    FixString,
    /// Owned variable-length NUL-terminated string (one pointer in the
    /// layout model).
    StringPtr,
    /// Owned reference to another instance by identifier.  May carry a
    /// target metadata uri (a "typed" ref).
    Ref,
    /// Structural composite: a named dimension.
    Dimension,
    /// Structural composite: a typed, named, dimensioned property.
    Property,
    /// Structural composite: a subject-predicate-object triple.
    Relation,
}

pub const MAX_DTYPE: DataType = DataType::Relation;

/// Per-family metadata, indexable by the enum discriminant.
#[derive(Debug, Clone)]
pub struct Meta {
    pub dtype: DataType,
    /// Base of the canonical textual name ("int" in "int32").
    pub basename: &'static str,
    /// Whether values of this family own heap memory and therefore need
    /// deep copy and deep release.
    pub is_allocated: bool,
    /// Whether the family is numeric (participates in numeric casts).
    pub is_numeric: bool,
}

macro_rules! mk_meta {
    ($dtype:expr, $name:expr, $alloc:expr, $num:expr) => {
        Meta {
            dtype: $dtype,
            basename: $name,
            is_allocated: $alloc,
            is_numeric: $num,
        }
    };
}

impl DataType {
    #[rustfmt::skip]
    pub const fn all() -> &'static [Meta] {
        use DataType::*;
        const LIST: [Meta; MAX_DTYPE as usize + 1] = [
            mk_meta!(Blob,      "blob",      false, false),
            mk_meta!(Bool,      "bool",      false, false),
            mk_meta!(Int,       "int",       false, true),
            mk_meta!(UInt,      "uint",      false, true),
            mk_meta!(Float,     "float",     false, true),
            mk_meta!(FixString, "string",    false, false),
            mk_meta!(StringPtr, "string",    true,  false),
            mk_meta!(Ref,       "ref",       true,  false),
            mk_meta!(Dimension, "dimension", true,  false),
            mk_meta!(Property,  "property",  true,  false),
            mk_meta!(Relation,  "relation",  true,  false),
        ];
        &LIST
    }

    pub const fn info(&self) -> &'static Meta {
        &Self::all()[*self as usize]
    }

    pub const fn basename(&self) -> &'static str {
        self.info().basename
    }

    /// Whether values of this family own heap memory (deep copy / deep
    /// release required).
    pub const fn is_allocated(&self) -> bool {
        self.info().is_allocated
    }

    pub const fn is_numeric(&self) -> bool {
        self.info().is_numeric
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataType({})", self.basename())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.basename())
    }
}

// ---------------------------------------------------------------------------
// Sizes, alignment, layout
// ---------------------------------------------------------------------------

/// Validates that `size` is representable for `dtype`.
pub fn check_size(dtype: DataType, size: usize) -> Result<()> {
    use DataType::*;
    let ok = match dtype {
        Blob | FixString => size > 0,
        Bool => size == 1,
        Int | UInt => matches!(size, 1 | 2 | 4 | 8),
        Float => matches!(size, 4 | 8 | 10 | 12 | 16),
        StringPtr | Ref => size == POINTER_SIZE,
        Dimension => size == DIMENSION_SIZE,
        Property => size == PROPERTY_SIZE,
        Relation => size == RELATION_SIZE,
    };
    ensure_or!(
        ok,
        ErrorKind::Value,
        "invalid size {size} for type \"{dtype}\""
    );
    Ok(())
}

/// Default (and for most families the only) size of `dtype`.
pub const fn default_size(dtype: DataType) -> usize {
    use DataType::*;
    match dtype {
        Blob | Bool | FixString => 1,
        Int | UInt => 4,
        Float => 8,
        StringPtr | Ref => POINTER_SIZE,
        Dimension => DIMENSION_SIZE,
        Property => PROPERTY_SIZE,
        Relation => RELATION_SIZE,
    }
}

/// Alignment of a member of type `(dtype, size)`.
///
/// Natural alignment for 1/2/4/8-byte scalars; extended-precision floats
/// (80/96/128 bit) fall back to 16 bytes; byte buffers are unaligned;
/// pointers and composites align to the pointer size.
pub fn alignment(dtype: DataType, size: usize) -> Result<usize> {
    use DataType::*;
    check_size(dtype, size)?;
    Ok(match dtype {
        Blob | Bool | FixString => 1,
        Int | UInt => size,
        Float => match size {
            4 => 4,
            8 => 8,
            _ => 16,
        },
        StringPtr | Ref | Dimension | Property | Relation => POINTER_SIZE,
    })
}

/// Byte size and alignment of a member of type `(dtype, size)`.
pub fn layout(dtype: DataType, size: usize) -> Result<(usize, usize)> {
    Ok((size, alignment(dtype, size)?))
}

/// Minimum number of padding bytes so that `offset + padding` is correctly
/// aligned for `(dtype, size)`.
pub fn padding_at(dtype: DataType, size: usize, offset: usize) -> Result<usize> {
    let align = alignment(dtype, size)?;
    Ok((align - offset % align) % align)
}

/// Offset of a member of type `(dtype, size)` placed after a member that
/// ends at `prev_offset + prev_size`.
pub fn member_offset(
    prev_offset: usize,
    prev_size: usize,
    dtype: DataType,
    size: usize,
) -> Result<usize> {
    let end = prev_offset + prev_size;
    Ok(end + padding_at(dtype, size, end)?)
}

// ---------------------------------------------------------------------------
// Type names
// ---------------------------------------------------------------------------

/// A parsed type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedType {
    pub dtype: DataType,
    pub size: usize,
    /// Target metadata uri for a typed ref.
    pub refuri: std::option::Option<String>,
}

/// Formats the canonical textual name of `(dtype, size)`.
///
/// Examples: `int32`, `float64`, `string10`, `string`, `blob4`, `ref`,
/// `dimension`.  A typed ref prints as its target uri.
pub fn typename(dtype: DataType, size: usize, refuri: std::option::Option<&str>) -> Result<String> {
    use DataType::*;
    check_size(dtype, size)?;
    Ok(match dtype {
        Blob => format!("blob{size}"),
        Bool => "bool".to_owned(),
        Int => format!("int{}", size * 8),
        UInt => format!("uint{}", size * 8),
        Float => format!("float{}", size * 8),
        FixString => format!("string{size}"),
        StringPtr => "string".to_owned(),
        Ref => match refuri {
            Some(uri) => uri.to_owned(),
            None => "ref".to_owned(),
        },
        Dimension => "dimension".to_owned(),
        Property => "property".to_owned(),
        Relation => "relation".to_owned(),
    })
}

/// Parses a type name per the closed grammar.
///
/// `blob<N>`, `bool`, `int<8|16|32|64>`, `uint<8|16|32|64>`,
/// `float<32|64|80|96|128>`, `string` (variable), `string<N>` (fixed),
/// `ref`, `<meta-uri>` (typed ref), `dimension`, `property`, `relation`.
/// Anything else is an error.
pub fn parse_typename(s: &str) -> Result<ParsedType> {
    use DataType::*;

    fn parsed(dtype: DataType, size: usize) -> ParsedType {
        ParsedType {
            dtype,
            size,
            refuri: None,
        }
    }

    fn tail_number(s: &str, prefix: &str) -> std::option::Option<usize> {
        s.strip_prefix(prefix)
            .filter(|t| !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|t| t.parse().ok())
    }

    match s {
        "bool" => return Ok(parsed(Bool, 1)),
        "string" => return Ok(parsed(StringPtr, POINTER_SIZE)),
        "ref" => return Ok(parsed(Ref, POINTER_SIZE)),
        "dimension" => return Ok(parsed(Dimension, DIMENSION_SIZE)),
        "property" => return Ok(parsed(Property, PROPERTY_SIZE)),
        "relation" => return Ok(parsed(Relation, RELATION_SIZE)),
        _ => {}
    }
    if let Some(n) = tail_number(s, "blob") {
        ensure_or!(n > 0, ErrorKind::Value, "invalid blob size in \"{s}\"");
        return Ok(parsed(Blob, n));
    }
    if let Some(n) = tail_number(s, "string") {
        ensure_or!(n > 0, ErrorKind::Value, "invalid string size in \"{s}\"");
        return Ok(parsed(FixString, n));
    }
    if let Some(bits) = tail_number(s, "uint") {
        ensure_or!(
            matches!(bits, 8 | 16 | 32 | 64),
            ErrorKind::Value,
            "invalid uint width in \"{s}\""
        );
        return Ok(parsed(UInt, bits / 8));
    }
    if let Some(bits) = tail_number(s, "int") {
        ensure_or!(
            matches!(bits, 8 | 16 | 32 | 64),
            ErrorKind::Value,
            "invalid int width in \"{s}\""
        );
        return Ok(parsed(Int, bits / 8));
    }
    if let Some(bits) = tail_number(s, "float") {
        ensure_or!(
            matches!(bits, 32 | 64 | 80 | 96 | 128),
            ErrorKind::Value,
            "invalid float width in \"{s}\""
        );
        return Ok(parsed(Float, bits / 8));
    }
    // A meta uri denotes a ref typed with the target metadata.
    if crate::ident::split_meta_uri(s).is_ok() {
        return Ok(ParsedType {
            dtype: Ref,
            size: POINTER_SIZE,
            refuri: Some(s.to_owned()),
        });
    }
    raise!(ErrorKind::Parse, "unknown type name: \"{s}\"")
}

impl std::str::FromStr for ParsedType {
    type Err = crate::errors::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_typename(s)
    }
}

// ---------------------------------------------------------------------------
// Structural composites
// ---------------------------------------------------------------------------

/// A named symbolic length referenced by array properties.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dimension {
    pub name: String,
    pub description: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A typed, named, dimensioned field of an entity.
///
/// `shape` holds dimension-name expressions (names or integer literals),
/// not concrete values; those are resolved at instance creation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Property {
    pub name: String,
    pub dtype: DataType,
    pub size: usize,
    pub shape: Vec<String>,
    pub unit: std::option::Option<String>,
    pub description: std::option::Option<String>,
    /// Target metadata uri for a typed ref property.
    pub refuri: std::option::Option<String>,
}

impl Property {
    pub fn new(name: impl Into<String>, dtype: DataType, size: usize) -> Self {
        Self {
            name: name.into(),
            dtype,
            size,
            shape: Vec::new(),
            unit: None,
            description: None,
            refuri: None,
        }
    }

    pub fn with_shape(mut self, shape: &[&str]) -> Self {
        self.shape = shape.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Number of dimensions; zero for a scalar property.
    pub fn ndims(&self) -> usize {
        self.shape.len()
    }

    pub fn is_array(&self) -> bool {
        !self.shape.is_empty()
    }

    /// Canonical type name of this property.
    pub fn typename(&self) -> Result<String> {
        typename(self.dtype, self.size, self.refuri.as_deref())
    }
}

/// A subject-predicate-object triple with optional datatype and id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Relation {
    pub s: String,
    pub p: String,
    pub o: String,
    pub d: std::option::Option<String>,
    pub id: std::option::Option<String>,
}

impl Relation {
    pub fn new(s: impl Into<String>, p: impl Into<String>, o: impl Into<String>) -> Self {
        Self {
            s: s.into(),
            p: p.into(),
            o: o.into(),
            d: None,
            id: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Typed values
// ---------------------------------------------------------------------------

/// A single typed value.
///
/// One variant per representable width, so that a value always knows its
/// declared storage type and deep copy / deep release come from `Clone`
/// and `Drop`.
#[derive(Debug, Clone)]
pub enum Value {
    Blob(Vec<u8>),
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Both fixed-size and variable-length strings.
    Str(String),
    /// Owned reference to another instance; `None` until assigned.
    Ref(std::option::Option<InstanceRef>),
    Dimension(Dimension),
    Property(Property),
    Relation(Relation),
}

impl Value {
    /// The zero value of `(dtype, size)`: numeric zero, empty string or
    /// blob of NULs, unassigned ref, default composite.
    pub fn zero(dtype: DataType, size: usize) -> Result<Value> {
        use DataType::*;
        check_size(dtype, size)?;
        Ok(match (dtype, size) {
            (Blob, n) => Value::Blob(vec![0u8; n]),
            (Bool, _) => Value::Bool(false),
            (Int, 1) => Value::I8(0),
            (Int, 2) => Value::I16(0),
            (Int, 4) => Value::I32(0),
            (Int, 8) => Value::I64(0),
            (UInt, 1) => Value::U8(0),
            (UInt, 2) => Value::U16(0),
            (UInt, 4) => Value::U32(0),
            (UInt, 8) => Value::U64(0),
            (Float, 4) => Value::F32(0.0),
            (Float, 8) => Value::F64(0.0),
            (Float, n) => raise!(
                ErrorKind::Unsupported,
                "float{} values are not representable",
                n * 8
            ),
            (FixString, _) | (StringPtr, _) => Value::Str(String::new()),
            (Ref, _) => Value::Ref(None),
            (Dimension, _) => Value::Dimension(self::Dimension::default()),
            (Property, _) => Value::Property(self::Property::new("", DataType::Blob, 1)),
            (Relation, _) => Value::Relation(self::Relation::default()),
            (Int, _) | (UInt, _) => unreachable!("checked by check_size"),
        })
    }

    /// The type family this value belongs to.  A string reports
    /// [`DataType::StringPtr`]; the fixed-size interpretation is decided
    /// by the property it is stored under.
    pub fn dtype(&self) -> DataType {
        use DataType::*;
        match self {
            Value::Blob(_) => Blob,
            Value::Bool(_) => Bool,
            Value::I8(_) | Value::I16(_) | Value::I32(_) | Value::I64(_) => Int,
            Value::U8(_) | Value::U16(_) | Value::U32(_) | Value::U64(_) => UInt,
            Value::F32(_) | Value::F64(_) => Float,
            Value::Str(_) => StringPtr,
            Value::Ref(_) => Ref,
            Value::Dimension(_) => Dimension,
            Value::Property(_) => Property,
            Value::Relation(_) => Relation,
        }
    }

    /// Declared storage width of this value.
    pub fn width(&self) -> usize {
        match self {
            Value::Blob(b) => b.len(),
            Value::Bool(_) => 1,
            Value::I8(_) | Value::U8(_) => 1,
            Value::I16(_) | Value::U16(_) => 2,
            Value::I32(_) | Value::U32(_) | Value::F32(_) => 4,
            Value::I64(_) | Value::U64(_) | Value::F64(_) => 8,
            Value::Str(_) => POINTER_SIZE,
            Value::Ref(_) => POINTER_SIZE,
            Value::Dimension(_) => DIMENSION_SIZE,
            Value::Property(_) => PROPERTY_SIZE,
            Value::Relation(_) => RELATION_SIZE,
        }
    }

    /// Whether this value is storable under `(dtype, size)`.
    pub fn matches(&self, dtype: DataType, size: usize) -> bool {
        use DataType::*;
        match (self, dtype) {
            (Value::Blob(b), Blob) => b.len() == size,
            (Value::Bool(_), Bool) => true,
            (Value::I8(_), Int) => size == 1,
            (Value::I16(_), Int) => size == 2,
            (Value::I32(_), Int) => size == 4,
            (Value::I64(_), Int) => size == 8,
            (Value::U8(_), UInt) => size == 1,
            (Value::U16(_), UInt) => size == 2,
            (Value::U32(_), UInt) => size == 4,
            (Value::U64(_), UInt) => size == 8,
            (Value::F32(_), Float) => size == 4,
            (Value::F64(_), Float) => size == 8,
            // A fixed string must fit its buffer (NUL-terminated when the
            // length is strictly smaller).
            (Value::Str(s), FixString) => s.len() <= size,
            (Value::Str(_), StringPtr) => true,
            (Value::Ref(_), Ref) => true,
            (Value::Dimension(_), Dimension) => true,
            (Value::Property(_), Property) => true,
            (Value::Relation(_), Relation) => true,
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => raise!(ErrorKind::Type, "expected bool, got \"{}\"", other.dtype()),
        }
    }

    /// Any integer value widened to `i64`.  Fails on unsigned values that
    /// do not fit.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::I8(v) => Ok(*v as i64),
            Value::I16(v) => Ok(*v as i64),
            Value::I32(v) => Ok(*v as i64),
            Value::I64(v) => Ok(*v),
            Value::U8(v) => Ok(*v as i64),
            Value::U16(v) => Ok(*v as i64),
            Value::U32(v) => Ok(*v as i64),
            Value::U64(v) => i64::try_from(*v).map_err(|_| {
                crate::errors::Error::new(ErrorKind::Value, format!("{v} overflows int64"))
            }),
            other => raise!(
                ErrorKind::Type,
                "expected integer, got \"{}\"",
                other.dtype()
            ),
        }
    }

    pub fn as_u64(&self) -> Result<u64> {
        match self {
            Value::U8(v) => Ok(*v as u64),
            Value::U16(v) => Ok(*v as u64),
            Value::U32(v) => Ok(*v as u64),
            Value::U64(v) => Ok(*v),
            other => {
                let v = other.as_i64()?;
                u64::try_from(v).map_err(|_| {
                    crate::errors::Error::new(ErrorKind::Value, format!("{v} is negative"))
                })
            }
        }
    }

    /// Any numeric value widened to `f64`.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::F32(v) => Ok(*v as f64),
            Value::F64(v) => Ok(*v),
            Value::U64(v) => Ok(*v as f64),
            other => Ok(other.as_i64()? as f64),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => raise!(
                ErrorKind::Type,
                "expected string, got \"{}\"",
                other.dtype()
            ),
        }
    }

    pub fn as_blob(&self) -> Result<&[u8]> {
        match self {
            Value::Blob(b) => Ok(b),
            other => raise!(ErrorKind::Type, "expected blob, got \"{}\"", other.dtype()),
        }
    }

    pub fn as_ref_target(&self) -> Result<std::option::Option<&InstanceRef>> {
        match self {
            Value::Ref(r) => Ok(r.as_ref()),
            other => raise!(ErrorKind::Type, "expected ref, got \"{}\"", other.dtype()),
        }
    }

    pub fn as_dimension(&self) -> Result<&Dimension> {
        match self {
            Value::Dimension(d) => Ok(d),
            other => raise!(
                ErrorKind::Type,
                "expected dimension, got \"{}\"",
                other.dtype()
            ),
        }
    }

    pub fn as_property(&self) -> Result<&Property> {
        match self {
            Value::Property(p) => Ok(p),
            other => raise!(
                ErrorKind::Type,
                "expected property, got \"{}\"",
                other.dtype()
            ),
        }
    }

    pub fn as_relation(&self) -> Result<&Relation> {
        match self {
            Value::Relation(r) => Ok(r),
            other => raise!(
                ErrorKind::Type,
                "expected relation, got \"{}\"",
                other.dtype()
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Blob(a), Blob(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (I8(a), I8(b)) => a == b,
            (I16(a), I16(b)) => a == b,
            (I32(a), I32(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (U8(a), U8(b)) => a == b,
            (U16(a), U16(b)) => a == b,
            (U32(a), U32(b)) => a == b,
            (U64(a), U64(b)) => a == b,
            (F32(a), F32(b)) => a == b,
            (F64(a), F64(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            // Refs compare by target identity.
            (Ref(a), Ref(b)) => match (a, b) {
                (None, None) => true,
                (Some(x), Some(y)) => x.uuid() == y.uuid(),
                _ => false,
            },
            (Dimension(a), Dimension(b)) => a == b,
            (Property(a), Property(b)) => a == b,
            (Relation(a), Relation(b)) => a == b,
            _ => false,
        }
    }
}

/// Storage of one property slot: a scalar or a flat row-major array whose
/// shape lives in the instance's shape block.
#[derive(Debug, Clone, PartialEq)]
pub enum PropVal {
    Scalar(Value),
    Array(Vec<Value>),
}

impl PropVal {
    pub fn is_array(&self) -> bool {
        matches!(self, PropVal::Array(_))
    }

    /// Number of elements: 1 for a scalar.
    pub fn len(&self) -> usize {
        match self {
            PropVal::Scalar(_) => 1,
            PropVal::Array(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_scalar(&self) -> Result<&Value> {
        match self {
            PropVal::Scalar(v) => Ok(v),
            PropVal::Array(_) => raise!(ErrorKind::Type, "expected scalar, got array"),
        }
    }

    pub fn as_array(&self) -> Result<&[Value]> {
        match self {
            PropVal::Array(v) => Ok(v),
            PropVal::Scalar(_) => raise!(ErrorKind::Type, "expected array, got scalar"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typenames_format() {
        assert_eq!(typename(DataType::Int, 4, None).unwrap(), "int32");
        assert_eq!(typename(DataType::Float, 8, None).unwrap(), "float64");
        assert_eq!(typename(DataType::FixString, 10, None).unwrap(), "string10");
        assert_eq!(typename(DataType::StringPtr, 8, None).unwrap(), "string");
        assert_eq!(typename(DataType::Blob, 4, None).unwrap(), "blob4");
        assert_eq!(typename(DataType::Ref, 8, None).unwrap(), "ref");
        assert_eq!(
            typename(DataType::Ref, 8, Some("http://www.sintef.no/calm/0.1/Chemistry")).unwrap(),
            "http://www.sintef.no/calm/0.1/Chemistry"
        );
    }

    #[test]
    fn typenames_parse() {
        let t = parse_typename("int32").unwrap();
        assert_eq!((t.dtype, t.size), (DataType::Int, 4));
        let t = parse_typename("uint8").unwrap();
        assert_eq!((t.dtype, t.size), (DataType::UInt, 1));
        let t = parse_typename("float128").unwrap();
        assert_eq!((t.dtype, t.size), (DataType::Float, 16));
        let t = parse_typename("string").unwrap();
        assert_eq!((t.dtype, t.size), (DataType::StringPtr, POINTER_SIZE));
        let t = parse_typename("string10").unwrap();
        assert_eq!((t.dtype, t.size), (DataType::FixString, 10));
        let t = parse_typename("blob4").unwrap();
        assert_eq!((t.dtype, t.size), (DataType::Blob, 4));
        let t = parse_typename("relation").unwrap();
        assert_eq!(t.dtype, DataType::Relation);
        let t = parse_typename("http://www.sintef.no/calm/0.1/Chemistry").unwrap();
        assert_eq!(t.dtype, DataType::Ref);
        assert_eq!(
            t.refuri.as_deref(),
            Some("http://www.sintef.no/calm/0.1/Chemistry")
        );

        assert!(parse_typename("int7").is_err());
        assert!(parse_typename("float8").is_err());
        assert!(parse_typename("complex64").is_err());
        assert!(parse_typename("").is_err());
    }

    #[test]
    fn round_trip_names() {
        for name in [
            "blob4",
            "bool",
            "int8",
            "int16",
            "int32",
            "int64",
            "uint8",
            "uint16",
            "uint32",
            "uint64",
            "float32",
            "float64",
            "string",
            "string10",
            "ref",
            "dimension",
            "property",
            "relation",
        ] {
            let t = parse_typename(name).unwrap();
            assert_eq!(
                typename(t.dtype, t.size, t.refuri.as_deref()).unwrap(),
                name
            );
        }
    }

    #[test]
    fn alignments() {
        assert_eq!(alignment(DataType::Bool, 1).unwrap(), 1);
        assert_eq!(alignment(DataType::Int, 8).unwrap(), 8);
        assert_eq!(alignment(DataType::Float, 16).unwrap(), 16);
        assert_eq!(alignment(DataType::FixString, 10).unwrap(), 1);
        assert_eq!(alignment(DataType::Property, PROPERTY_SIZE).unwrap(), 8);
    }

    #[test]
    fn padding() {
        assert_eq!(padding_at(DataType::Int, 8, 0).unwrap(), 0);
        assert_eq!(padding_at(DataType::Int, 8, 1).unwrap(), 7);
        assert_eq!(padding_at(DataType::Int, 4, 6).unwrap(), 2);
        assert_eq!(member_offset(0, 1, DataType::Int, 8).unwrap(), 8);
        assert_eq!(member_offset(8, 8, DataType::FixString, 10).unwrap(), 16);
    }

    #[test]
    fn zero_values() {
        assert_eq!(Value::zero(DataType::Int, 4).unwrap(), Value::I32(0));
        assert_eq!(
            Value::zero(DataType::Blob, 3).unwrap(),
            Value::Blob(vec![0, 0, 0])
        );
        assert_eq!(
            Value::zero(DataType::FixString, 10).unwrap(),
            Value::Str(String::new())
        );
        assert!(matches!(
            Value::zero(DataType::Ref, 8).unwrap(),
            Value::Ref(None)
        ));
        assert!(Value::zero(DataType::Float, 16).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn dimension_serde_round_trip() {
        use serde_test::{assert_tokens, Token};
        assert_tokens(
            &Dimension::new("nelements", "Number of elements."),
            &[
                Token::Struct {
                    name: "Dimension",
                    len: 2,
                },
                Token::Str("name"),
                Token::Str("nelements"),
                Token::Str("description"),
                Token::Str("Number of elements."),
                Token::StructEnd,
            ],
        );
    }

    #[test]
    fn value_matching() {
        assert!(Value::I32(7).matches(DataType::Int, 4));
        assert!(!Value::I32(7).matches(DataType::Int, 8));
        assert!(Value::Str("ab".into()).matches(DataType::FixString, 2));
        assert!(!Value::Str("abc".into()).matches(DataType::FixString, 2));
        assert!(Value::Str("abc".into()).matches(DataType::StringPtr, 8));
    }
}
