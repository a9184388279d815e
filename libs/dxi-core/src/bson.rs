//! BSON codec: byte-stable binary serialization of instances.
//!
//! The element sequence is fixed (uuid, uri?, meta, parent?, byteorder,
//! then dimensions and properties), so any two conformant writers produce
//! the same byte stream for a given instance, modulo the `byteorder`
//! marker and the endianness of array cells.  Scalars are encoded as
//! ordinary BSON values; arrays are binary blobs of raw cells in host
//! byte order, and the reader byteswaps them when the document's marker
//! disagrees with its own host.  Textual data is never byteswapped.

use crate::entity::Entity;
use crate::errors::{ensure_or, raise, ErrorKind, Result, ResultExt};
use crate::ident;
use crate::instance::{Instance, InstanceRef, Parent};
use crate::schemas;
use crate::types::{DataType, Dimension, PropVal, Property, Relation, Value};
use crate::utils::bson::{self, Element, Parser, Writer};

use tracing::debug;

/// Byte-order marker of this host.
const HOST_BYTEORDER: &str = if cfg!(target_endian = "little") {
    "LE"
} else {
    "BE"
};

/// Serializes `inst` into a standalone BSON document.
pub fn from_instance(inst: &InstanceRef) -> Result<Vec<u8>> {
    let mut w = Writer::new();
    append_instance(&mut w, inst)?;
    Ok(w.finish())
}

/// Appends the element sequence of `inst` to an open document.
pub(crate) fn append_instance(w: &mut Writer, inst: &InstanceRef) -> Result<()> {
    w.append_string("uuid", inst.uuid());
    if let Some(uri) = inst.uri() {
        w.append_string("uri", uri);
    }
    w.append_string("meta", &inst.meta().uri());
    if let Some(parent) = inst.parent() {
        w.begin_subdoc("parent");
        w.append_string("uuid", &parent.uuid);
        w.append_binary("hash", bson::SUBTYPE_GENERIC, &parent.hash);
        w.end_subdoc();
    }
    // Arrays are serialized in host byte order; the marker lets a reader
    // decide whether to byteswap.
    w.append_string("byteorder", HOST_BYTEORDER);

    if inst.is_meta() {
        append_metadata_body(w, &Entity::from_instance(inst.clone())?)
    } else {
        append_data_body(w, inst)
    }
}

fn append_data_body(w: &mut Writer, inst: &InstanceRef) -> Result<()> {
    let meta = inst.meta().entity()?;
    let layout = meta.layout();

    w.begin_subdoc("dimensions");
    for (d, v) in layout.dimensions.iter().zip(inst.dimension_values()) {
        w.append_int32(&d.name, *v as i32);
    }
    w.end_subdoc();

    w.begin_subdoc("properties");
    for (i, prop) in layout.properties.iter().enumerate() {
        let value = inst.get_property(i)?;
        append_property(w, prop, &value)
            .context_with(|| format!("serialising property \"{}\"", prop.name))?;
    }
    w.end_subdoc();
    Ok(())
}

fn append_metadata_body(w: &mut Writer, entity: &Entity) -> Result<()> {
    let layout = entity.layout();
    if !layout.description.is_empty() {
        w.append_string("description", &layout.description);
    }

    // The entity's own dimension values, named by its meta's dimensions.
    let meta = entity.as_instance().meta().entity()?;
    w.begin_subdoc("dimension_values");
    for (d, v) in meta
        .layout()
        .dimensions
        .iter()
        .zip(entity.as_instance().dimension_values())
    {
        w.append_int32(&d.name, *v as i32);
    }
    w.end_subdoc();

    w.begin_subdoc("dimensions");
    for d in &layout.dimensions {
        w.append_string(&d.name, &d.description);
    }
    w.end_subdoc();

    w.begin_subdoc("properties");
    for p in &layout.properties {
        w.begin_subdoc(&p.name);
        w.append_string("type", &crate::types::typename(p.dtype, p.size, None)?);
        if let Some(refuri) = &p.refuri {
            w.append_string("$ref", refuri);
        }
        if !p.shape.is_empty() {
            w.begin_array("shape");
            for (i, dim) in p.shape.iter().enumerate() {
                w.append_string(&i.to_string(), dim);
            }
            w.end_subdoc();
        }
        if let Some(unit) = &p.unit {
            if !unit.is_empty() {
                w.append_string("unit", unit);
            }
        }
        if let Some(descr) = &p.description {
            if !descr.is_empty() {
                w.append_string("description", descr);
            }
        }
        w.end_subdoc();
    }
    w.end_subdoc();
    Ok(())
}

fn append_property(w: &mut Writer, prop: &Property, value: &PropVal) -> Result<()> {
    use DataType::*;
    let values = match value {
        PropVal::Scalar(v) => return append_scalar(w, prop, v),
        PropVal::Array(values) => values,
    };
    match prop.dtype {
        Blob | Bool | Int | UInt | Float | FixString => {
            let mut cells = Vec::with_capacity(values.len() * prop.size);
            for v in values {
                push_cell(&mut cells, v, prop)?;
            }
            w.append_binary(&prop.name, bson::SUBTYPE_GENERIC, &cells);
        }
        StringPtr => {
            w.begin_binary(&prop.name, bson::SUBTYPE_GENERIC);
            for v in values {
                w.append_binary_bytes(v.as_str()?.as_bytes());
                w.append_binary_bytes(&[0]);
            }
            w.end_binary();
        }
        Ref => {
            w.begin_binary(&prop.name, bson::SUBTYPE_GENERIC);
            for v in values {
                let target = match v.as_ref_target()? {
                    Some(t) => t,
                    None => raise!(
                        ErrorKind::InconsistentData,
                        "unassigned ref in property \"{}\"",
                        prop.name
                    ),
                };
                w.append_binary_bytes(target.uuid().as_bytes());
                w.append_binary_bytes(&[0]);
            }
            w.end_binary();
        }
        // Repeated elements with the property name, which is valid BSON.
        Relation => {
            for v in values {
                append_relation(w, &prop.name, v.as_relation()?);
            }
        }
        Dimension | Property => raise!(
            ErrorKind::Unsupported,
            "cannot serialise \"{}\" arrays",
            prop.dtype
        ),
    }
    Ok(())
}

fn append_scalar(w: &mut Writer, prop: &Property, v: &Value) -> Result<()> {
    use DataType::*;
    match prop.dtype {
        Blob => w.append_binary(&prop.name, bson::SUBTYPE_GENERIC, v.as_blob()?),
        Bool => w.append_bool(&prop.name, v.as_bool()?),
        Int => {
            let wide = v.as_i64()?;
            if prop.size <= 4 {
                w.append_int32(&prop.name, wide as i32);
            } else {
                w.append_int64(&prop.name, wide);
            }
        }
        UInt => {
            let wide = v.as_u64()?;
            if prop.size < 4 {
                w.append_int32(&prop.name, wide as i32);
            } else {
                w.append_uint64(&prop.name, wide);
            }
        }
        Float => match prop.size {
            4 | 8 => w.append_double(&prop.name, v.as_f64()?),
            n => raise!(
                ErrorKind::Unsupported,
                "cannot serialise float{} values",
                n * 8
            ),
        },
        FixString | StringPtr => w.append_string(&prop.name, v.as_str()?),
        Ref => match v.as_ref_target()? {
            Some(target) => w.append_string(&prop.name, target.uuid()),
            None => raise!(
                ErrorKind::InconsistentData,
                "unassigned ref in property \"{}\"",
                prop.name
            ),
        },
        Relation => append_relation(w, &prop.name, v.as_relation()?),
        Dimension | Property => raise!(
            ErrorKind::Unsupported,
            "cannot serialise \"{}\" values",
            prop.dtype
        ),
    }
    Ok(())
}

fn append_relation(w: &mut Writer, ename: &str, rel: &Relation) {
    w.begin_subdoc(ename);
    w.append_string("s", &rel.s);
    w.append_string("p", &rel.p);
    w.append_string("o", &rel.o);
    if let Some(d) = &rel.d {
        w.append_string("d", d);
    }
    w.end_subdoc();
}

fn push_cell(cells: &mut Vec<u8>, v: &Value, prop: &Property) -> Result<()> {
    match v {
        Value::Blob(b) => cells.extend_from_slice(b),
        Value::Bool(x) => cells.push(*x as u8),
        Value::I8(x) => cells.extend_from_slice(&x.to_ne_bytes()),
        Value::I16(x) => cells.extend_from_slice(&x.to_ne_bytes()),
        Value::I32(x) => cells.extend_from_slice(&x.to_ne_bytes()),
        Value::I64(x) => cells.extend_from_slice(&x.to_ne_bytes()),
        Value::U8(x) => cells.extend_from_slice(&x.to_ne_bytes()),
        Value::U16(x) => cells.extend_from_slice(&x.to_ne_bytes()),
        Value::U32(x) => cells.extend_from_slice(&x.to_ne_bytes()),
        Value::U64(x) => cells.extend_from_slice(&x.to_ne_bytes()),
        Value::F32(x) => cells.extend_from_slice(&x.to_ne_bytes()),
        Value::F64(x) => cells.extend_from_slice(&x.to_ne_bytes()),
        // Fixed strings are NUL-padded to the declared cell size.
        Value::Str(s) => {
            ensure_or!(
                s.len() <= prop.size,
                ErrorKind::Value,
                "string \"{s}\" does not fit in string{}",
                prop.size
            );
            cells.extend_from_slice(s.as_bytes());
            cells.resize(cells.len() + prop.size - s.len(), 0);
        }
        other => raise!(
            ErrorKind::Type,
            "value of type \"{}\" in a raw cell array",
            other.dtype()
        ),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Builds an instance from a BSON document.
///
/// When `id` is given it must match the document's identity.  Metadata is
/// resolved through the global store; array cells are restored to host
/// byte order.
pub fn load_instance(doc: &[u8], id: std::option::Option<&str>) -> Result<InstanceRef> {
    let uuid = require_str(doc, "uuid")?;
    let uri = scan_str(doc, "uri")?;
    let meta_uri = require_str(doc, "meta")?;

    if let Some(id) = id {
        let wanted = ident::uuid_for(Some(id)).0;
        ensure_or!(
            wanted == uuid.to_ascii_lowercase(),
            ErrorKind::MissingInstance,
            "document holds \"{uuid}\", not \"{id}\""
        );
    }

    // A document without a byteorder marker is read as little-endian.
    let swap = match scan_str(doc, "byteorder")? {
        Some(marker) => marker != HOST_BYTEORDER,
        None => {
            debug!(uuid = %uuid, "no byteorder marker, assuming LE");
            HOST_BYTEORDER != "LE"
        }
    };

    let parent = match bson::scan(doc, "parent")? {
        None => None,
        Some(elem) => {
            let sub = elem.as_doc()?;
            let puuid = require_str(sub, "uuid")?;
            let (_, hash) = match bson::scan(sub, "hash")? {
                Some(h) => h.as_binary()?,
                None => raise!(ErrorKind::Parse, "parent without hash"),
            };
            ensure_or!(
                hash.len() == 32,
                ErrorKind::Parse,
                "parent hash has {} bytes",
                hash.len()
            );
            let mut fixed = [0u8; 32];
            fixed.copy_from_slice(hash);
            Some(Parent {
                uuid: puuid.to_owned(),
                hash: fixed,
            })
        }
    };

    if schemas::is_metadata_schema(meta_uri) {
        return Ok(load_metadata(doc, uri)?.as_instance().clone());
    }

    let best_id = uri.map(str::to_owned).unwrap_or_else(|| uuid.to_owned());
    if let Some(existing) = crate::store::Store::global().get_live(&best_id) {
        return Ok(existing);
    }

    let meta = match crate::store::Store::global().get(meta_uri)? {
        Some(inst) => Entity::from_instance(inst)?,
        None => raise!(ErrorKind::MissingMetadata, "no metadata \"{meta_uri}\""),
    };
    let layout = meta.layout();

    let dims_doc = match bson::scan(doc, "dimensions")? {
        Some(elem) => elem.as_doc()?,
        None => raise!(ErrorKind::Parse, "document without dimensions"),
    };
    let mut dimvalues = Vec::with_capacity(layout.dimensions.len());
    for d in &layout.dimensions {
        match bson::scan(dims_doc, &d.name)? {
            Some(elem) => dimvalues.push(elem.as_i64()? as usize),
            None => raise!(
                ErrorKind::InconsistentData,
                "missing value for dimension \"{}\"",
                d.name
            ),
        }
    }

    let inst = Instance::create_with_parent(&meta, &dimvalues, Some(&best_id), parent)?;

    let props_doc = match bson::scan(doc, "properties")? {
        Some(elem) => elem.as_doc()?,
        None => raise!(ErrorKind::Parse, "document without properties"),
    };
    for (i, prop) in layout.properties.iter().enumerate() {
        let shape = inst.property_shape(i)?.to_vec();
        let value = read_property(props_doc, prop, &shape, swap)
            .context_with(|| format!("parsing property \"{}\"", prop.name))?;
        if let Some(value) = value {
            inst.set_property(i, value)?;
        }
    }
    Ok(inst)
}

fn load_metadata(doc: &[u8], uri: std::option::Option<&str>) -> Result<Entity> {
    let uri = match uri {
        Some(u) => u,
        None => raise!(ErrorKind::InvalidMetadata, "metadata document without uri"),
    };
    let description = scan_str(doc, "description")?.unwrap_or_default().to_owned();

    let mut dimensions = Vec::new();
    if let Some(elem) = bson::scan(doc, "dimensions")? {
        let mut parser = Parser::new(elem.as_doc()?)?;
        while let Some(d) = parser.next()? {
            dimensions.push(Dimension::new(d.name, d.as_str()?));
        }
    }

    let mut properties = Vec::new();
    if let Some(elem) = bson::scan(doc, "properties")? {
        let mut parser = Parser::new(elem.as_doc()?)?;
        while let Some(p) = parser.next()? {
            properties.push(read_property_record(p)?);
        }
    }

    Entity::from_parts(uri, &description, dimensions, properties, Vec::new())
}

fn read_property_record(elem: Element<'_>) -> Result<Property> {
    let sub = elem.as_doc()?;
    let tname = require_str(sub, "type")?;
    let parsed = crate::types::parse_typename(tname)?;
    let mut prop = Property::new(elem.name, parsed.dtype, parsed.size);
    prop.refuri = parsed.refuri;
    if prop.refuri.is_none() {
        prop.refuri = scan_str(sub, "$ref")?.map(str::to_owned);
    }
    if let Some(shape) = bson::scan(sub, "shape")? {
        let mut parser = Parser::new(shape.as_doc()?)?;
        while let Some(dim) = parser.next()? {
            prop.shape.push(dim.as_str()?.to_owned());
        }
    }
    prop.unit = scan_str(sub, "unit")?.map(str::to_owned);
    prop.description = scan_str(sub, "description")?.map(str::to_owned);
    Ok(prop)
}

/// Reads one property value; `None` leaves the zero initialization.
fn read_property(
    props_doc: &[u8],
    prop: &Property,
    shape: &[usize],
    swap: bool,
) -> Result<std::option::Option<PropVal>> {
    use DataType::*;

    // Relation arrays appear as repeated subdocuments with the same name.
    if prop.dtype == Relation && !shape.is_empty() {
        let nmemb: usize = shape.iter().product();
        let mut rels = Vec::with_capacity(nmemb);
        let mut parser = Parser::new(props_doc)?;
        while let Some(elem) = parser.next()? {
            if elem.name == prop.name {
                rels.push(Value::Relation(read_relation(elem)?));
            }
        }
        if rels.is_empty() && nmemb > 0 {
            return Ok(None);
        }
        ensure_or!(
            rels.len() == nmemb,
            ErrorKind::InconsistentData,
            "expected {nmemb} relations, found {}",
            rels.len()
        );
        return Ok(Some(PropVal::Array(rels)));
    }

    let elem = match bson::scan(props_doc, &prop.name)? {
        Some(e) => e,
        None => return Ok(None),
    };

    if shape.is_empty() {
        let v = match prop.dtype {
            Blob => {
                let (_, bytes) = elem.as_binary()?;
                ensure_or!(
                    bytes.len() == prop.size,
                    ErrorKind::InconsistentData,
                    "blob{} value has {} bytes",
                    prop.size,
                    bytes.len()
                );
                Value::Blob(bytes.to_vec())
            }
            Bool => Value::Bool(elem.as_bool()?),
            Int => crate::types::print_impl::int_value(elem.as_i64()?, prop.size)?,
            UInt => crate::types::print_impl::uint_value(elem.as_u64()?, prop.size)?,
            Float => match prop.size {
                4 => Value::F32(elem.as_f64()? as f32),
                8 => Value::F64(elem.as_f64()?),
                n => raise!(
                    ErrorKind::Unsupported,
                    "cannot read float{} values",
                    n * 8
                ),
            },
            FixString | StringPtr => Value::Str(elem.as_str()?.to_owned()),
            Ref => Value::Ref(Some(crate::store::Store::global().fetch(elem.as_str()?)?)),
            Relation => Value::Relation(read_relation(elem)?),
            Dimension | Property => raise!(
                ErrorKind::Unsupported,
                "cannot read \"{}\" values",
                prop.dtype
            ),
        };
        return Ok(Some(PropVal::Scalar(v)));
    }

    // Array: one binary blob of raw cells.
    let nmemb: usize = shape.iter().product();
    let (_, bytes) = elem.as_binary()?;
    let values = match prop.dtype {
        Blob | Bool | Int | UInt | Float | FixString => {
            ensure_or!(
                bytes.len() == nmemb * prop.size,
                ErrorKind::InconsistentData,
                "expected {} bytes of cells, found {}",
                nmemb * prop.size,
                bytes.len()
            );
            bytes
                .chunks_exact(prop.size)
                .map(|cell| read_cell(cell, prop, swap))
                .collect::<Result<Vec<_>>>()?
        }
        StringPtr | Ref => {
            let mut strings: Vec<&[u8]> = bytes.split(|b| *b == 0).collect();
            // The blob ends with a terminator, so drop the trailing empty
            // piece.
            if strings.last() == Some(&&b""[..]) {
                strings.pop();
            }
            ensure_or!(
                strings.len() == nmemb,
                ErrorKind::InconsistentData,
                "expected {nmemb} strings, found {}",
                strings.len()
            );
            let mut values = Vec::with_capacity(nmemb);
            for s in strings {
                let s = std::str::from_utf8(s)
                    .map_err(|e| crate::errors::Error::new(ErrorKind::Parse, e.to_string()))?;
                values.push(if prop.dtype == StringPtr {
                    Value::Str(s.to_owned())
                } else {
                    Value::Ref(Some(crate::store::Store::global().fetch(s)?))
                });
            }
            values
        }
        Relation | Dimension | Property => unreachable!("handled above"),
    };
    Ok(Some(PropVal::Array(values)))
}

/// Decodes one raw array cell, restoring host byte order.
fn read_cell(cell: &[u8], prop: &Property, swap: bool) -> Result<Value> {
    use DataType::*;
    let mut fixed: Vec<u8> = cell.to_vec();
    // Only numeric cells are byte-sensitive; text and blobs never swap.
    if swap && matches!(prop.dtype, Int | UInt | Float) {
        fixed.reverse();
    }
    let arr8 = |b: &[u8]| -> [u8; 8] { b.try_into().expect("8-byte cell") };
    Ok(match (prop.dtype, prop.size) {
        (Blob, _) => Value::Blob(fixed),
        (Bool, _) => Value::Bool(fixed[0] != 0),
        (Int, 1) => Value::I8(fixed[0] as i8),
        (Int, 2) => Value::I16(i16::from_ne_bytes(fixed[..].try_into().expect("2-byte cell"))),
        (Int, 4) => Value::I32(i32::from_ne_bytes(fixed[..].try_into().expect("4-byte cell"))),
        (Int, 8) => Value::I64(i64::from_ne_bytes(arr8(&fixed))),
        (UInt, 1) => Value::U8(fixed[0]),
        (UInt, 2) => Value::U16(u16::from_ne_bytes(fixed[..].try_into().expect("2-byte cell"))),
        (UInt, 4) => Value::U32(u32::from_ne_bytes(fixed[..].try_into().expect("4-byte cell"))),
        (UInt, 8) => Value::U64(u64::from_ne_bytes(arr8(&fixed))),
        (Float, 4) => Value::F32(f32::from_ne_bytes(fixed[..].try_into().expect("4-byte cell"))),
        (Float, 8) => Value::F64(f64::from_ne_bytes(arr8(&fixed))),
        (FixString, _) => {
            let end = fixed.iter().position(|b| *b == 0).unwrap_or(fixed.len());
            Value::Str(
                std::str::from_utf8(&fixed[..end])
                    .map_err(|e| crate::errors::Error::new(ErrorKind::Parse, e.to_string()))?
                    .to_owned(),
            )
        }
        (dtype, size) => raise!(ErrorKind::Value, "invalid cell type \"{dtype}\" ({size})"),
    })
}

fn read_relation(elem: Element<'_>) -> Result<Relation> {
    let sub = elem.as_doc()?;
    let mut rel = Relation::new(
        require_str(sub, "s")?,
        require_str(sub, "p")?,
        require_str(sub, "o")?,
    );
    rel.d = scan_str(sub, "d")?.map(str::to_owned);
    Ok(rel)
}

fn scan_str<'a>(doc: &'a [u8], ename: &str) -> Result<std::option::Option<&'a str>> {
    match bson::scan(doc, ename)? {
        Some(elem) => Ok(Some(elem.as_str()?)),
        None => Ok(None),
    }
}

fn require_str<'a>(doc: &'a [u8], ename: &str) -> Result<&'a str> {
    match bson::scan(doc, ename)? {
        Some(elem) => elem.as_str(),
        None => raise!(ErrorKind::Parse, "missing BSON element \"{ename}\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dimension;

    fn sample_entity(uri: &str) -> Entity {
        Entity::from_parts(
            uri,
            "BSON sample",
            vec![Dimension::new("n", "count")],
            vec![
                Property::new("flag", DataType::Bool, 1),
                Property::new("small", DataType::Int, 2),
                Property::new("big", DataType::UInt, 8),
                Property::new("name", DataType::FixString, 12),
                Property::new("weights", DataType::Float, 8).with_shape(&["n"]),
                Property::new("codes", DataType::Int, 4).with_shape(&["n"]),
                Property::new("labels", DataType::StringPtr, 8).with_shape(&["n"]),
                Property::new("tag", DataType::FixString, 4).with_shape(&["n"]),
                Property::new("raw", DataType::Blob, 2),
            ],
            vec![],
        )
        .unwrap()
    }

    fn sample_instance(meta: &Entity, id: &str) -> InstanceRef {
        let inst = Instance::create(meta, &[2], Some(id)).unwrap();
        let set = |name: &str, v: PropVal| inst.set_property_by_name(name, v).unwrap();
        set("flag", PropVal::Scalar(Value::Bool(true)));
        set("small", PropVal::Scalar(Value::I16(-300)));
        set("big", PropVal::Scalar(Value::U64(1 << 60)));
        set("name", PropVal::Scalar(Value::Str("specimen".into())));
        set(
            "weights",
            PropVal::Array(vec![Value::F64(0.25), Value::F64(12.5)]),
        );
        set(
            "codes",
            PropVal::Array(vec![Value::I32(-7), Value::I32(1 << 20)]),
        );
        set(
            "labels",
            PropVal::Array(vec![Value::Str("alpha".into()), Value::Str("".into())]),
        );
        set(
            "tag",
            PropVal::Array(vec![Value::Str("ab".into()), Value::Str("cdef".into())]),
        );
        set("raw", PropVal::Scalar(Value::Blob(vec![0xff, 0x01])));
        inst
    }

    #[test]
    fn data_round_trip_bytewise() {
        let meta = sample_entity("http://example.com/bson-test/0.1/Roundtrip");
        let doc = {
            let inst = sample_instance(&meta, "http://data.example.com/bson-rt");
            from_instance(&inst).unwrap()
        };
        // The original is dropped, so this re-builds from bytes.
        let back = load_instance(&doc, None).unwrap();
        assert_eq!(back.uri(), Some("http://data.example.com/bson-rt"));
        assert_eq!(
            back.get_property_by_name("small").unwrap(),
            PropVal::Scalar(Value::I16(-300))
        );
        assert_eq!(
            back.get_property_by_name("weights").unwrap(),
            PropVal::Array(vec![Value::F64(0.25), Value::F64(12.5)])
        );
        assert_eq!(
            back.get_property_by_name("labels").unwrap(),
            PropVal::Array(vec![Value::Str("alpha".into()), Value::Str("".into())])
        );
        assert_eq!(
            back.get_property_by_name("tag").unwrap(),
            PropVal::Array(vec![Value::Str("ab".into()), Value::Str("cdef".into())])
        );

        // Same content serializes to the same bytes.
        let again = from_instance(&back).unwrap();
        assert_eq!(doc, again);
    }

    #[test]
    fn metadata_round_trip() {
        let meta = sample_entity("http://example.com/bson-test/0.1/MetaRt");
        let doc = from_instance(meta.as_instance()).unwrap();
        assert_eq!(
            bson::scan(&doc, "byteorder")
                .unwrap()
                .unwrap()
                .as_str()
                .unwrap(),
            HOST_BYTEORDER
        );
        let back = load_instance(&doc, None).unwrap();
        let back = Entity::from_instance(back).unwrap();
        assert_eq!(back.properties(), meta.properties());
        assert_eq!(back.dimensions(), meta.dimensions());
        assert_eq!(back.description(), meta.description());
    }

    #[test]
    fn identity_is_verified() {
        let meta = sample_entity("http://example.com/bson-test/0.1/IdCheck");
        let inst = sample_instance(&meta, "http://data.example.com/bson-id");
        let doc = from_instance(&inst).unwrap();
        assert!(load_instance(&doc, Some("http://data.example.com/bson-id")).is_ok());
        assert_eq!(
            load_instance(&doc, Some("http://data.example.com/other"))
                .unwrap_err()
                .kind(),
            ErrorKind::MissingInstance
        );
    }

    #[test]
    fn foreign_byteorder_is_swapped() {
        let meta = sample_entity("http://example.com/bson-test/0.1/Swapped");
        let doc = {
            let inst = sample_instance(&meta, "http://data.example.com/bson-sw");
            from_instance(&inst).unwrap()
        };

        // Flip the byteorder marker and reverse every numeric array cell,
        // emulating a foreign-endian writer.
        let mut foreign = doc.clone();
        let marker = bson::scan(&doc, "byteorder").unwrap().unwrap();
        let marker_off = marker.data.as_ptr() as usize - doc.as_ptr() as usize + 4;
        foreign[marker_off] = if HOST_BYTEORDER == "LE" { b'B' } else { b'L' };

        let props = bson::scan(&doc, "properties").unwrap().unwrap();
        for (name, width) in [("weights", 8usize), ("codes", 4)] {
            let elem = bson::scan(props.data, name).unwrap().unwrap();
            let (_, bytes) = elem.as_binary().unwrap();
            let off = bytes.as_ptr() as usize - doc.as_ptr() as usize;
            for start in (off..off + bytes.len()).step_by(width) {
                foreign[start..start + width].reverse();
            }
        }

        let back = load_instance(&foreign, None).unwrap();
        assert_eq!(
            back.get_property_by_name("weights").unwrap(),
            PropVal::Array(vec![Value::F64(0.25), Value::F64(12.5)])
        );
        assert_eq!(
            back.get_property_by_name("codes").unwrap(),
            PropVal::Array(vec![Value::I32(-7), Value::I32(1 << 20)])
        );
        // Text cells are never swapped.
        assert_eq!(
            back.get_property_by_name("labels").unwrap(),
            PropVal::Array(vec![Value::Str("alpha".into()), Value::Str("".into())])
        );
    }

    #[test]
    fn parent_round_trips() {
        let meta = sample_entity("http://example.com/bson-test/0.1/Parented");
        let parent_inst = sample_instance(&meta, "http://data.example.com/bson-parent");
        let parent = Parent {
            uuid: parent_inst.uuid().to_owned(),
            hash: parent_inst.hash().unwrap(),
        };
        let child = Instance::create_with_parent(
            &meta,
            &[2],
            Some("http://data.example.com/bson-child"),
            Some(parent.clone()),
        )
        .unwrap();

        let doc = from_instance(&child).unwrap();
        drop(child);
        let back = load_instance(&doc, None).unwrap();
        assert_eq!(back.parent(), Some(&parent));
    }

    #[test]
    fn relations_serialize_as_repeated_documents() {
        let mut coll =
            crate::collection::Collection::new(Some("http://data.example.com/bson-coll"));
        let meta = sample_entity("http://example.com/bson-test/0.1/CollItem");
        let item = sample_instance(&meta, "http://data.example.com/bson-coll-item");
        coll.add("it", item).unwrap();

        let inst = coll.as_instance().unwrap();
        let doc = from_instance(&inst).unwrap();
        drop(inst);
        let back = load_instance(&doc, None).unwrap();
        let rels = back.get_property_by_name("relations").unwrap();
        assert_eq!(rels.as_array().unwrap().len(), 3);
        let back_coll = crate::collection::Collection::from_instance(&back).unwrap();
        assert_eq!(back_coll.labels(), vec!["it"]);
    }
}
