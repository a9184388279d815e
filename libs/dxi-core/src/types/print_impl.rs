//! Textual form of typed values: JSON-compatible print and its inverse.

use super::*;
use crate::errors::{ensure_or, raise, ErrorKind, Result};
use serde_json::json;

bitflags::bitflags! {
    /// Flags controlling [`print`] and [`scan`].
    pub struct PrintFlags: u32 {
        /// Surround strings and blobs with `"` (and expect the quotes when
        /// scanning).
        const QUOTED = 1;
    }
}

/// Writes a JSON-compatible textual form of `value`.
///
/// Composites emit objects with their canonical field names.  Blobs are
/// hex-encoded.  An unassigned ref prints as `null`.
pub fn print(value: &Value, flags: PrintFlags) -> Result<String> {
    let quoted = flags.contains(PrintFlags::QUOTED);
    let quote = |s: &str| -> Result<String> {
        if quoted {
            serde_json::to_string(s)
                .map_err(|e| crate::errors::Error::new(ErrorKind::Serialise, e.to_string()))
        } else {
            Ok(s.to_owned())
        }
    };
    Ok(match value {
        Value::Blob(b) => quote(&hex::encode(b))?,
        Value::Bool(v) => v.to_string(),
        Value::I8(v) => v.to_string(),
        Value::I16(v) => v.to_string(),
        Value::I32(v) => v.to_string(),
        Value::I64(v) => v.to_string(),
        Value::U8(v) => v.to_string(),
        Value::U16(v) => v.to_string(),
        Value::U32(v) => v.to_string(),
        Value::U64(v) => v.to_string(),
        Value::F32(v) => {
            ensure_or!(v.is_finite(), ErrorKind::Serialise, "cannot print {v}");
            v.to_string()
        }
        Value::F64(v) => {
            ensure_or!(v.is_finite(), ErrorKind::Serialise, "cannot print {v}");
            v.to_string()
        }
        Value::Str(s) => quote(s)?,
        Value::Ref(None) => "null".to_owned(),
        Value::Ref(Some(target)) => quote(target.id())?,
        Value::Dimension(d) => dimension_to_json(d).to_string(),
        Value::Property(p) => property_to_json(p)?.to_string(),
        Value::Relation(r) => relation_to_json(r).to_string(),
    })
}

/// Like [`print`], but appends to `dest` and returns the number of bytes
/// written.
pub fn aprint(dest: &mut String, value: &Value, flags: PrintFlags) -> Result<usize> {
    let s = print(value, flags)?;
    dest.push_str(&s);
    Ok(s.len())
}

pub(crate) fn dimension_to_json(d: &Dimension) -> serde_json::Value {
    json!({ "name": d.name, "description": d.description })
}

pub(crate) fn property_to_json(p: &Property) -> Result<serde_json::Value> {
    let mut obj = serde_json::Map::new();
    obj.insert("name".into(), json!(p.name));
    obj.insert("type".into(), json!(typename(p.dtype, p.size, None)?));
    if let Some(refuri) = &p.refuri {
        obj.insert("$ref".into(), json!(refuri));
    }
    if !p.shape.is_empty() {
        obj.insert("shape".into(), json!(p.shape));
    }
    if let Some(unit) = &p.unit {
        obj.insert("unit".into(), json!(unit));
    }
    if let Some(descr) = &p.description {
        obj.insert("description".into(), json!(descr));
    }
    Ok(serde_json::Value::Object(obj))
}

pub(crate) fn relation_to_json(r: &Relation) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    obj.insert("s".into(), json!(r.s));
    obj.insert("p".into(), json!(r.p));
    obj.insert("o".into(), json!(r.o));
    if let Some(d) = &r.d {
        obj.insert("d".into(), json!(d));
    }
    if let Some(id) = &r.id {
        obj.insert("id".into(), json!(id));
    }
    serde_json::Value::Object(obj)
}

pub(crate) fn dimension_from_json(v: &serde_json::Value) -> Result<Dimension> {
    let obj = match v.as_object() {
        Some(o) => o,
        None => raise!(ErrorKind::Parse, "dimension record is not an object"),
    };
    let name = match obj.get("name").and_then(|n| n.as_str()) {
        Some(n) => n.to_owned(),
        None => raise!(ErrorKind::Parse, "dimension record without \"name\""),
    };
    let description = obj
        .get("description")
        .and_then(|d| d.as_str())
        .unwrap_or_default()
        .to_owned();
    Ok(Dimension { name, description })
}

pub(crate) fn property_from_json(v: &serde_json::Value) -> Result<Property> {
    let obj = match v.as_object() {
        Some(o) => o,
        None => raise!(ErrorKind::Parse, "property record is not an object"),
    };
    let name = match obj.get("name").and_then(|n| n.as_str()) {
        Some(n) => n.to_owned(),
        None => raise!(ErrorKind::Parse, "property record without \"name\""),
    };
    let tname = match obj.get("type").and_then(|t| t.as_str()) {
        Some(t) => t,
        None => raise!(ErrorKind::Parse, "property \"{name}\" without \"type\""),
    };
    let parsed = parse_typename(tname)?;
    let mut prop = Property::new(name, parsed.dtype, parsed.size);
    prop.refuri = parsed.refuri;
    if prop.refuri.is_none() {
        if let Some(r) = obj.get("$ref").and_then(|r| r.as_str()) {
            prop.refuri = Some(r.to_owned());
        }
    }
    // Accept the legacy key "dims" as well as "shape".
    if let Some(shape) = obj
        .get("shape")
        .or_else(|| obj.get("dims"))
        .and_then(|s| s.as_array())
    {
        prop.shape = shape
            .iter()
            .map(|e| match e {
                serde_json::Value::String(s) => Ok(s.clone()),
                serde_json::Value::Number(n) => Ok(n.to_string()),
                _ => Err(crate::errors::Error::new(
                    ErrorKind::Parse,
                    format!("invalid shape element in property \"{}\"", prop.name),
                )),
            })
            .collect::<Result<Vec<_>>>()?;
    }
    if let Some(unit) = obj.get("unit").and_then(|u| u.as_str()) {
        prop.unit = Some(unit.to_owned());
    }
    if let Some(descr) = obj.get("description").and_then(|d| d.as_str()) {
        prop.description = Some(descr.to_owned());
    }
    Ok(prop)
}

pub(crate) fn relation_from_json(v: &serde_json::Value) -> Result<Relation> {
    // Relations appear both as {"s","p","o"} objects and as 3/4-element
    // arrays in older documents.
    if let Some(arr) = v.as_array() {
        ensure_or!(
            matches!(arr.len(), 3 | 4),
            ErrorKind::Parse,
            "relation triple must have 3 or 4 elements"
        );
        let as_str = |i: usize| -> Result<String> {
            match arr[i].as_str() {
                Some(s) => Ok(s.to_owned()),
                None => {
                    raise!(ErrorKind::Parse, "relation element {i} is not a string")
                }
            }
        };
        let mut rel = Relation::new(as_str(0)?, as_str(1)?, as_str(2)?);
        if arr.len() == 4 {
            rel.d = Some(as_str(3)?);
        }
        return Ok(rel);
    }
    let obj = match v.as_object() {
        Some(o) => o,
        None => raise!(ErrorKind::Parse, "relation record is not an object"),
    };
    let field = |key: &str| -> Result<String> {
        match obj.get(key).and_then(|f| f.as_str()) {
            Some(s) => Ok(s.to_owned()),
            None => raise!(ErrorKind::Parse, "relation record without \"{key}\""),
        }
    };
    let mut rel = Relation::new(field("s")?, field("p")?, field("o")?);
    rel.d = obj.get("d").and_then(|d| d.as_str()).map(str::to_owned);
    rel.id = obj.get("id").and_then(|d| d.as_str()).map(str::to_owned);
    Ok(rel)
}

/// Inverse of [`print`]: scans a typed value from `src`.
pub fn scan(src: &str, dtype: DataType, size: usize, flags: PrintFlags) -> Result<Value> {
    use DataType::*;
    check_size(dtype, size)?;
    let src = src.trim();
    let quoted = flags.contains(PrintFlags::QUOTED);
    let unquote = |s: &str| -> Result<String> {
        if quoted {
            serde_json::from_str::<String>(s)
                .map_err(|e| crate::errors::Error::new(ErrorKind::Parse, e.to_string()))
        } else {
            Ok(s.to_owned())
        }
    };
    match dtype {
        Bool => match src {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => raise!(ErrorKind::Parse, "cannot scan \"{src}\" as bool"),
        },
        Int => {
            let v: i64 = src
                .parse()
                .map_err(|_| parse_error(src, "int", size * 8))?;
            int_value(v, size)
        }
        UInt => {
            let v: u64 = src
                .parse()
                .map_err(|_| parse_error(src, "uint", size * 8))?;
            uint_value(v, size)
        }
        Float => match size {
            4 => Ok(Value::F32(
                src.parse().map_err(|_| parse_error(src, "float", 32))?,
            )),
            8 => Ok(Value::F64(
                src.parse().map_err(|_| parse_error(src, "float", 64))?,
            )),
            n => raise!(
                ErrorKind::Unsupported,
                "float{} values are not representable",
                n * 8
            ),
        },
        FixString => {
            let s = unquote(src)?;
            ensure_or!(
                s.len() <= size,
                ErrorKind::Value,
                "string \"{s}\" does not fit in string{size}"
            );
            Ok(Value::Str(s))
        }
        StringPtr => Ok(Value::Str(unquote(src)?)),
        Blob => {
            let s = unquote(src)?;
            let bytes = hex::decode(s.as_bytes())
                .map_err(|e| crate::errors::Error::new(ErrorKind::Parse, e.to_string()))?;
            ensure_or!(
                bytes.len() == size,
                ErrorKind::Value,
                "blob{} value has {} bytes",
                size,
                bytes.len()
            );
            Ok(Value::Blob(bytes))
        }
        Ref => {
            if src == "null" {
                return Ok(Value::Ref(None));
            }
            let id = unquote(src)?;
            match crate::store::Store::global().get(&id)? {
                Some(target) => Ok(Value::Ref(Some(target))),
                None => raise!(ErrorKind::MissingInstance, "no instance with id \"{id}\""),
            }
        }
        Dimension => {
            let v: serde_json::Value = serde_json::from_str(src)
                .map_err(|e| crate::errors::Error::new(ErrorKind::Parse, e.to_string()))?;
            Ok(Value::Dimension(dimension_from_json(&v)?))
        }
        Property => {
            let v: serde_json::Value = serde_json::from_str(src)
                .map_err(|e| crate::errors::Error::new(ErrorKind::Parse, e.to_string()))?;
            Ok(Value::Property(property_from_json(&v)?))
        }
        Relation => {
            let v: serde_json::Value = serde_json::from_str(src)
                .map_err(|e| crate::errors::Error::new(ErrorKind::Parse, e.to_string()))?;
            Ok(Value::Relation(relation_from_json(&v)?))
        }
    }
}

fn parse_error(src: &str, family: &str, bits: usize) -> crate::errors::Error {
    crate::errors::Error::new(
        ErrorKind::Parse,
        format!("cannot scan \"{src}\" as {family}{bits}"),
    )
}

pub(crate) fn int_value(v: i64, size: usize) -> Result<Value> {
    Ok(match size {
        1 => Value::I8(i8::try_from(v).map_err(|_| overflow(v, "int8"))?),
        2 => Value::I16(i16::try_from(v).map_err(|_| overflow(v, "int16"))?),
        4 => Value::I32(i32::try_from(v).map_err(|_| overflow(v, "int32"))?),
        8 => Value::I64(v),
        _ => raise!(ErrorKind::Value, "invalid integer size: {size}"),
    })
}

pub(crate) fn uint_value(v: u64, size: usize) -> Result<Value> {
    Ok(match size {
        1 => Value::U8(u8::try_from(v).map_err(|_| overflow(v as i64, "uint8"))?),
        2 => Value::U16(u16::try_from(v).map_err(|_| overflow(v as i64, "uint16"))?),
        4 => Value::U32(u32::try_from(v).map_err(|_| overflow(v as i64, "uint32"))?),
        8 => Value::U64(v),
        _ => raise!(ErrorKind::Value, "invalid integer size: {size}"),
    })
}

fn overflow(v: i64, tname: &str) -> crate::errors::Error {
    crate::errors::Error::new(ErrorKind::Value, format!("{v} does not fit in {tname}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_scalars() {
        assert_eq!(
            scan("3.14", DataType::Float, 8, PrintFlags::empty()).unwrap(),
            Value::F64(3.14)
        );
        assert_eq!(
            scan("true", DataType::Bool, 1, PrintFlags::empty()).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            scan("\"ff0a1008\"", DataType::Blob, 4, PrintFlags::QUOTED).unwrap(),
            Value::Blob(vec![0xff, 0x0a, 0x10, 0x08])
        );
    }

    #[test]
    fn scan_rejects_malformed() {
        assert!(scan("3.14", DataType::Int, 4, PrintFlags::empty()).is_err());
        assert!(scan("yes", DataType::Bool, 1, PrintFlags::empty()).is_err());
        assert!(scan("200", DataType::Int, 1, PrintFlags::empty()).is_err());
        assert!(scan("-1", DataType::UInt, 4, PrintFlags::empty()).is_err());
        assert!(scan("\"zz\"", DataType::Blob, 1, PrintFlags::QUOTED).is_err());
        assert!(scan("\"ff\"", DataType::Blob, 2, PrintFlags::QUOTED).is_err());
    }

    #[test]
    fn print_scan_round_trip() {
        let cases: Vec<(Value, DataType, usize)> = vec![
            (Value::Bool(true), DataType::Bool, 1),
            (Value::I8(-12), DataType::Int, 1),
            (Value::I64(i64::MIN), DataType::Int, 8),
            (Value::U64(u64::MAX), DataType::UInt, 8),
            (Value::F32(2.5), DataType::Float, 4),
            (Value::F64(-1.0e-6), DataType::Float, 8),
            (Value::Str("hello \"world\"".into()), DataType::StringPtr, 8),
            (Value::Blob(vec![1, 2, 3]), DataType::Blob, 3),
        ];
        for (value, dtype, size) in cases {
            let text = print(&value, PrintFlags::QUOTED).unwrap();
            let back = scan(&text, dtype, size, PrintFlags::QUOTED).unwrap();
            assert_eq!(back, value, "round-tripping {text}");
        }
    }

    #[test]
    fn composites_round_trip() {
        let prop = Property::new("X0", DataType::Float, 8)
            .with_shape(&["nelements"])
            .with_unit("1")
            .with_description("Nominal composition");
        let text = print(&Value::Property(prop.clone()), PrintFlags::empty()).unwrap();
        let back = scan(&text, DataType::Property, PROPERTY_SIZE, PrintFlags::empty()).unwrap();
        assert_eq!(back, Value::Property(prop));

        let mut rel = Relation::new("subj", "pred", "obj");
        rel.d = Some("xsd:string".into());
        let text = print(&Value::Relation(rel.clone()), PrintFlags::empty()).unwrap();
        let back = scan(&text, DataType::Relation, RELATION_SIZE, PrintFlags::empty()).unwrap();
        assert_eq!(back, Value::Relation(rel));
    }

    #[test]
    fn relation_from_triple_array() {
        let v: serde_json::Value = serde_json::from_str(r#"["a","b","c"]"#).unwrap();
        let rel = relation_from_json(&v).unwrap();
        assert_eq!(rel, Relation::new("a", "b", "c"));
    }
}
