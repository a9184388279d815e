//! JSON codec: dual-layout reader and writer.
//!
//! Two concrete layouts are supported per document.  The *soft7* layout
//! keys `properties` by property name with raw JSON values (nested arrays
//! for shaped properties); it is the format of data documents.  The
//! *arrays* layout writes `dimensions` and `properties` as arrays of
//! `{name, …}` records; it is the default format of metadata documents
//! (the reader accepts both for metadata indefinitely).
//!
//! A document is either *single* (the top-level object is the instance)
//! or *multi* (the top-level object maps ids to instance records, keyed by
//! uuid or uri).

use crate::entity::Entity;
use crate::errors::{ensure_or, raise, ErrorKind, Result, ResultExt};
use crate::ident;
use crate::instance::{Instance, InstanceRef};
use crate::schemas;
use crate::types::print_impl::{
    dimension_from_json, dimension_to_json, property_from_json, property_to_json,
    relation_from_json, relation_to_json,
};
use crate::types::{DataType, Dimension, PropVal, Property, Value};

use serde_json::{json, Map as JsonMap, Value as Json};

bitflags::bitflags! {
    /// Orthogonal serialization options.
    pub struct JsonFlags: u32 {
        /// Write the single-entity format (top-level object is the
        /// instance) instead of a one-entry id map.
        const SINGLE    = 1;
        /// Key multi-entity output by uri (when the instance has one).
        const URI_KEY   = 2;
        /// Include `uuid` in the output.
        const WITH_UUID = 4;
        /// Always include `meta`, even for metadata.
        const WITH_META = 8;
        /// Metadata dimensions and properties as record arrays (the
        /// legacy layout, and still the metadata default).
        const ARRAYS    = 16;
    }
}

/// Whether a JSON document holds data or metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonFormat {
    Data,
    Meta,
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Serializes `inst` as pretty-printed JSON honoring `flags`.
pub fn sprint(inst: &InstanceRef, flags: JsonFlags) -> Result<String> {
    let body = instance_to_json(inst, flags)?;
    let root = if flags.contains(JsonFlags::SINGLE) {
        body
    } else {
        let mut map = JsonMap::new();
        map.insert(write_key(inst, flags), body);
        Json::Object(map)
    };
    serde_json::to_string_pretty(&root)
        .map_err(|e| crate::errors::Error::new(ErrorKind::Serialise, e.to_string()))
}

/// Like [`sprint`], but appends to `dest` and returns the number of bytes
/// written.
pub fn aprint(dest: &mut String, inst: &InstanceRef, flags: JsonFlags) -> Result<usize> {
    let s = sprint(inst, flags)?;
    dest.push_str(&s);
    Ok(s.len())
}

fn write_key(inst: &InstanceRef, flags: JsonFlags) -> String {
    match inst.uri() {
        Some(uri) if flags.contains(JsonFlags::URI_KEY) => uri.to_owned(),
        _ => inst.uuid().to_owned(),
    }
}

/// The JSON body of one instance (no id-map wrapping).
pub(crate) fn instance_to_json(inst: &InstanceRef, flags: JsonFlags) -> Result<Json> {
    if inst.is_meta() {
        meta_to_json(&Entity::from_instance(inst.clone())?, flags)
    } else {
        data_to_json(inst, flags)
    }
}

fn data_to_json(inst: &InstanceRef, flags: JsonFlags) -> Result<Json> {
    let meta = inst.meta().entity()?;
    let layout = meta.layout();
    let mut obj = JsonMap::new();
    if flags.contains(JsonFlags::WITH_UUID) {
        obj.insert("uuid".into(), json!(inst.uuid()));
    }
    if let Some(uri) = inst.uri() {
        obj.insert("uri".into(), json!(uri));
    }
    obj.insert("meta".into(), json!(meta.uri()));

    let mut dims = JsonMap::new();
    for (d, v) in layout.dimensions.iter().zip(inst.dimension_values()) {
        dims.insert(d.name.clone(), json!(v));
    }
    obj.insert("dimensions".into(), Json::Object(dims));

    let mut props = JsonMap::new();
    for (i, prop) in layout.properties.iter().enumerate() {
        let value = inst.get_property(i)?;
        let shape = inst.property_shape(i)?;
        props.insert(
            prop.name.clone(),
            propval_to_json(prop, shape, &value)
                .context_with(|| format!("serialising property \"{}\"", prop.name))?,
        );
    }
    obj.insert("properties".into(), Json::Object(props));
    Ok(Json::Object(obj))
}

fn meta_to_json(entity: &Entity, flags: JsonFlags) -> Result<Json> {
    let layout = entity.layout();
    let mut obj = JsonMap::new();
    if flags.contains(JsonFlags::WITH_UUID) {
        obj.insert("uuid".into(), json!(entity.as_instance().uuid()));
    }
    obj.insert("uri".into(), json!(entity.uri()));
    if flags.contains(JsonFlags::WITH_META) {
        obj.insert("meta".into(), json!(entity.as_instance().meta().uri()));
    }
    if !layout.description.is_empty() {
        obj.insert("description".into(), json!(layout.description));
    }

    // The arrays layout is the metadata default.
    obj.insert(
        "dimensions".into(),
        Json::Array(layout.dimensions.iter().map(dimension_to_json).collect()),
    );
    obj.insert(
        "properties".into(),
        Json::Array(
            layout
                .properties
                .iter()
                .map(property_to_json)
                .collect::<Result<_>>()?,
        ),
    );
    if !layout.relations.is_empty() {
        obj.insert(
            "relations".into(),
            Json::Array(layout.relations.iter().map(relation_to_json).collect()),
        );
    }
    Ok(Json::Object(obj))
}

/// JSON value of one property: raw scalar, or nested arrays per shape.
pub(crate) fn propval_to_json(
    prop: &Property,
    shape: &[usize],
    value: &PropVal,
) -> Result<Json> {
    match value {
        PropVal::Scalar(v) => value_to_json(v),
        PropVal::Array(values) => {
            let mut jsons = Vec::with_capacity(values.len());
            for v in values {
                jsons.push(value_to_json(v)?);
            }
            Ok(nest(&mut jsons.into_iter(), shape, &prop.name)?)
        }
    }
}

fn nest(flat: &mut std::vec::IntoIter<Json>, shape: &[usize], name: &str) -> Result<Json> {
    match shape.split_first() {
        None => match flat.next() {
            Some(v) => Ok(v),
            None => raise!(
                ErrorKind::InconsistentData,
                "property \"{name}\" has fewer elements than its shape"
            ),
        },
        Some((n, rest)) => {
            let mut out = Vec::with_capacity(*n);
            for _ in 0..*n {
                out.push(nest(flat, rest, name)?);
            }
            Ok(Json::Array(out))
        }
    }
}

fn value_to_json(value: &Value) -> Result<Json> {
    Ok(match value {
        Value::Blob(b) => json!(hex::encode(b)),
        Value::Bool(v) => json!(v),
        Value::I8(v) => json!(v),
        Value::I16(v) => json!(v),
        Value::I32(v) => json!(v),
        Value::I64(v) => json!(v),
        Value::U8(v) => json!(v),
        Value::U16(v) => json!(v),
        Value::U32(v) => json!(v),
        Value::U64(v) => json!(v),
        Value::F32(v) => float_to_json(*v as f64)?,
        Value::F64(v) => float_to_json(*v)?,
        Value::Str(s) => json!(s),
        // Canonical ref form: the target's uri when it has one, uuid
        // otherwise.
        Value::Ref(None) => Json::Null,
        Value::Ref(Some(target)) => json!(target.id()),
        Value::Dimension(d) => dimension_to_json(d),
        Value::Property(p) => property_to_json(p)?,
        Value::Relation(r) => relation_to_json(r),
    })
}

fn float_to_json(v: f64) -> Result<Json> {
    match serde_json::Number::from_f64(v) {
        Some(n) => Ok(Json::Number(n)),
        None => raise!(ErrorKind::Serialise, "cannot serialise {v} as JSON"),
    }
}

/// Parses `buf` as a JSON object, adds `inst` under one new top-level key
/// and re-emits the document into `buf`.
pub fn append(buf: &mut String, inst: &InstanceRef, flags: JsonFlags) -> Result<()> {
    let mut root: Json = if buf.trim().is_empty() {
        Json::Object(JsonMap::new())
    } else {
        serde_json::from_str(buf)
            .map_err(|e| crate::errors::Error::new(ErrorKind::Parse, e.to_string()))?
    };
    let map = match root.as_object_mut() {
        Some(m) => m,
        None => raise!(ErrorKind::Parse, "can only append to a JSON object"),
    };
    map.insert(write_key(inst, flags), instance_to_json(inst, flags)?);
    *buf = serde_json::to_string_pretty(&root)
        .map_err(|e| crate::errors::Error::new(ErrorKind::Serialise, e.to_string()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn parse_root(src: &str) -> Result<JsonMap<String, Json>> {
    let root: Json = serde_json::from_str(src)
        .map_err(|e| crate::errors::Error::new(ErrorKind::Parse, e.to_string()))?;
    match root {
        Json::Object(map) => Ok(map),
        _ => raise!(ErrorKind::Parse, "top-level JSON value is not an object"),
    }
}

/// Whether a top-level object is itself an instance record (single
/// format) rather than an id map.
fn is_single(map: &JsonMap<String, Json>) -> bool {
    ["properties", "dimensions", "uri", "uuid", "meta"]
        .iter()
        .any(|k| map.contains_key(*k))
}

fn entry_is_meta(entry: &JsonMap<String, Json>) -> bool {
    match entry.get("meta").and_then(Json::as_str) {
        Some(meta) => schemas::is_metadata_schema(meta),
        // No meta: structural record arrays mean metadata.
        None => {
            entry.get("properties").map_or(false, Json::is_array)
                || entry.get("dimensions").map_or(false, Json::is_array)
                || matches!(
                    (entry.get("name"), entry.get("version"), entry.get("namespace")),
                    (Some(_), Some(_), Some(_))
                )
        }
    }
}

/// Classifies a document: data or metadata, single or multi, soft7 or
/// arrays, uri- or uuid-keyed.  The returned flags are suitable for
/// re-writing the document the way it came in.
pub fn check(src: &str, id: std::option::Option<&str>) -> Result<(JsonFormat, JsonFlags)> {
    let map = parse_root(src)?;
    let mut flags = JsonFlags::empty();

    let entry: &JsonMap<String, Json> = if is_single(&map) {
        flags |= JsonFlags::SINGLE;
        &map
    } else {
        let (key, value) = select_entry(&map, id)?;
        let entry = match value.as_object() {
            Some(o) => o,
            None => raise!(ErrorKind::Parse, "entry \"{key}\" is not an object"),
        };
        if !ident::is_uuid(key) || entry.contains_key("uri") {
            flags |= JsonFlags::URI_KEY;
        }
        entry
    };

    if entry.contains_key("uuid") {
        flags |= JsonFlags::WITH_UUID;
    }
    let format = if entry_is_meta(entry) {
        if entry.contains_key("meta") {
            flags |= JsonFlags::WITH_META;
        }
        if entry.get("dimensions").map_or(false, Json::is_array)
            || entry.get("properties").map_or(false, Json::is_array)
        {
            flags |= JsonFlags::ARRAYS;
        }
        JsonFormat::Meta
    } else {
        JsonFormat::Data
    };
    Ok((format, flags))
}

fn select_entry<'a>(
    map: &'a JsonMap<String, Json>,
    id: std::option::Option<&str>,
) -> Result<(&'a str, &'a Json)> {
    let id = match id {
        None => {
            return match map.iter().next() {
                Some((k, v)) => Ok((k.as_str(), v)),
                None => raise!(ErrorKind::Parse, "empty JSON document"),
            }
        }
        Some(id) => id,
    };
    let wanted_uuid = ident::uuid_for(Some(id)).0;
    for (key, value) in map {
        if key == id || ident::uuid_for(Some(key)).0 == wanted_uuid {
            return Ok((key.as_str(), value));
        }
        if let Some(entry) = value.as_object() {
            let matches = entry.get("uri").and_then(Json::as_str) == Some(id)
                || entry.get("uuid").and_then(Json::as_str) == Some(wanted_uuid.as_str());
            if matches {
                return Ok((key.as_str(), value));
            }
        }
    }
    raise!(ErrorKind::MissingInstance, "no instance with id \"{id}\"")
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Builds the instance `id` (or the only/first instance) from `src`.
///
/// Metadata needed by the requested instance is resolved within the same
/// document first, then through the global store (which may hit a lazy
/// fetch hook).  When `metaid` is given, the returned instance must be of
/// that metadata.
pub fn sscan(
    src: &str,
    id: std::option::Option<&str>,
    metaid: std::option::Option<&str>,
) -> Result<InstanceRef> {
    let map = parse_root(src)?;
    let inst = if is_single(&map) {
        build_instance(&map, id, None)?
    } else {
        let (key, value) = match (id, metaid) {
            (None, Some(metaid)) => select_by_meta(&map, metaid)?,
            _ => select_entry(&map, id)?,
        };
        let entry = match value.as_object() {
            Some(o) => o,
            None => raise!(ErrorKind::Parse, "entry \"{key}\" is not an object"),
        };
        build_instance(entry, Some(key), Some(&map))?
    };
    if let Some(metaid) = metaid {
        let meta_uri = inst.meta().uri();
        let wanted = ident::uuid_for(Some(metaid)).0;
        ensure_or!(
            meta_uri == metaid || ident::uuid_of(&meta_uri) == wanted,
            ErrorKind::MissingInstance,
            "instance \"{}\" is not of metadata \"{metaid}\"",
            inst.id()
        );
    }
    Ok(inst)
}

fn select_by_meta<'a>(
    map: &'a JsonMap<String, Json>,
    metaid: &str,
) -> Result<(&'a str, &'a Json)> {
    let wanted = ident::uuid_for(Some(metaid)).0;
    for (key, value) in map {
        if let Some(entry) = value.as_object() {
            if let Some(meta) = entry.get("meta").and_then(Json::as_str) {
                if meta == metaid || ident::uuid_for(Some(meta)).0 == wanted {
                    return Ok((key.as_str(), value));
                }
            }
        }
    }
    raise!(
        ErrorKind::MissingInstance,
        "no instance of metadata \"{metaid}\" in document"
    )
}

/// Builds one instance from its JSON record.
fn build_instance(
    entry: &JsonMap<String, Json>,
    id: std::option::Option<&str>,
    doc: std::option::Option<&JsonMap<String, Json>>,
) -> Result<InstanceRef> {
    if entry_is_meta(entry) {
        return Ok(build_entity(entry, id)?.as_instance().clone());
    }

    let meta_uri = match entry.get("meta").and_then(Json::as_str) {
        Some(m) => m.to_owned(),
        None => raise!(
            ErrorKind::MissingMetadata,
            "data record \"{}\" has no \"meta\" key",
            id.unwrap_or("<anonymous>")
        ),
    };
    let meta = resolve_meta(&meta_uri, doc)
        .context_with(|| format!("resolving metadata \"{meta_uri}\""))?;
    let layout = meta.layout();

    // Dimension values, in declaration order.
    let dims_obj = entry.get("dimensions").and_then(Json::as_object);
    let mut dimvalues = Vec::with_capacity(layout.dimensions.len());
    for d in &layout.dimensions {
        let v = dims_obj.and_then(|o| o.get(&d.name)).and_then(Json::as_u64);
        match v {
            Some(v) => dimvalues.push(v as usize),
            None => raise!(
                ErrorKind::InconsistentData,
                "missing value for dimension \"{}\"",
                d.name
            ),
        }
    }

    // Identity: uri wins, then an explicit uuid, then the map key.
    let uri = entry.get("uri").and_then(Json::as_str);
    let uuid = entry.get("uuid").and_then(Json::as_str);
    let best_id = uri
        .or(uuid)
        .or(id)
        .map(str::to_owned);
    if let (Some(uri), Some(uuid)) = (uri, uuid) {
        ensure_or!(
            ident::uuid_of(uri) == uuid.to_ascii_lowercase(),
            ErrorKind::InconsistentData,
            "uuid \"{uuid}\" does not match uri \"{uri}\""
        );
    }

    // An instance that is already live wins over re-building it.
    if let Some(id) = best_id.as_deref() {
        if let Some(existing) = crate::store::Store::global().get_live(id) {
            return Ok(existing);
        }
    }

    let inst = Instance::create(&meta, &dimvalues, best_id.as_deref())?;
    if let Some(props) = entry.get("properties").and_then(Json::as_object) {
        for (i, prop) in layout.properties.iter().enumerate() {
            let value = match props.get(&prop.name) {
                Some(v) => v,
                None => continue, // left zero-initialized
            };
            let shape = inst.property_shape(i)?.to_vec();
            let parsed = propval_from_json(prop, &shape, value)
                .context_with(|| format!("parsing property \"{}\"", prop.name))?;
            inst.set_property(i, parsed)?;
        }
    }
    Ok(inst)
}

/// Builds an entity from a metadata record in either layout.
fn build_entity(entry: &JsonMap<String, Json>, id: std::option::Option<&str>) -> Result<Entity> {
    let uri = match entry.get("uri").and_then(Json::as_str) {
        Some(u) => u.to_owned(),
        None => match (
            entry.get("name").and_then(Json::as_str),
            entry.get("version").and_then(Json::as_str),
            entry.get("namespace").and_then(Json::as_str),
        ) {
            (Some(n), Some(v), Some(ns)) => ident::join_meta_uri(n, v, ns),
            _ => match id {
                Some(id) if !ident::is_uuid(id) => id.to_owned(),
                _ => raise!(ErrorKind::InvalidMetadata, "metadata record without uri"),
            },
        },
    };

    let description = entry
        .get("description")
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_owned();

    let dimensions = match entry.get("dimensions") {
        None => Vec::new(),
        Some(Json::Array(records)) => records
            .iter()
            .map(dimension_from_json)
            .collect::<Result<Vec<_>>>()?,
        // soft7: an object mapping name to description.
        Some(Json::Object(map)) => map
            .iter()
            .map(|(name, descr)| {
                Dimension::new(name.clone(), descr.as_str().unwrap_or_default())
            })
            .collect(),
        Some(_) => raise!(ErrorKind::Parse, "invalid \"dimensions\" in \"{uri}\""),
    };

    let properties = match entry.get("properties") {
        None => Vec::new(),
        Some(Json::Array(records)) => records
            .iter()
            .map(property_from_json)
            .collect::<Result<Vec<_>>>()?,
        // soft7: an object keyed by property name.
        Some(Json::Object(map)) => {
            let mut props = Vec::with_capacity(map.len());
            for (name, record) in map {
                let mut with_name = match record.as_object() {
                    Some(o) => o.clone(),
                    None => raise!(ErrorKind::Parse, "property \"{name}\" is not an object"),
                };
                with_name.insert("name".into(), json!(name));
                props.push(property_from_json(&Json::Object(with_name))?);
            }
            props
        }
        Some(_) => raise!(ErrorKind::Parse, "invalid \"properties\" in \"{uri}\""),
    };

    let relations = match entry.get("relations") {
        None => Vec::new(),
        Some(Json::Array(records)) => records
            .iter()
            .map(relation_from_json)
            .collect::<Result<Vec<_>>>()?,
        Some(_) => raise!(ErrorKind::Parse, "invalid \"relations\" in \"{uri}\""),
    };

    Entity::from_parts(&uri, &description, dimensions, properties, relations)
}

/// Resolves a meta uri: first against other records of the same document,
/// then through the global store.
fn resolve_meta(
    meta_uri: &str,
    doc: std::option::Option<&JsonMap<String, Json>>,
) -> Result<Entity> {
    if let Some(schema) = schemas::find(meta_uri) {
        return Ok(schema.clone());
    }
    // Already live (or fetchable through the store hook)?
    if let Some(inst) = crate::store::Store::global().get(meta_uri)? {
        return Entity::from_instance(inst);
    }
    if let Some(map) = doc {
        if let Ok((key, value)) = select_entry(map, Some(meta_uri)) {
            if let Some(entry) = value.as_object() {
                return build_entity(entry, Some(key));
            }
        }
    }
    raise!(ErrorKind::MissingMetadata, "no metadata \"{meta_uri}\"")
}

/// Parses one property value: a raw scalar, or nested arrays matching
/// `shape`.
pub(crate) fn propval_from_json(
    prop: &Property,
    shape: &[usize],
    value: &Json,
) -> Result<PropVal> {
    if shape.is_empty() {
        return Ok(PropVal::Scalar(value_from_json(prop, value)?));
    }
    let mut flat = Vec::with_capacity(shape.iter().product());
    flatten(prop, shape, value, &mut flat)?;
    Ok(PropVal::Array(flat))
}

fn flatten(prop: &Property, shape: &[usize], value: &Json, out: &mut Vec<Value>) -> Result<()> {
    match shape.split_first() {
        None => {
            out.push(value_from_json(prop, value)?);
            Ok(())
        }
        Some((n, rest)) => {
            let arr = match value.as_array() {
                Some(a) => a,
                None => raise!(
                    ErrorKind::InconsistentData,
                    "property \"{}\" expects a nested array",
                    prop.name
                ),
            };
            ensure_or!(
                arr.len() == *n,
                ErrorKind::InconsistentData,
                "property \"{}\" expects {n} elements, got {}",
                prop.name,
                arr.len()
            );
            for v in arr {
                flatten(prop, rest, v, out)?;
            }
            Ok(())
        }
    }
}

fn value_from_json(prop: &Property, value: &Json) -> Result<Value> {
    use DataType::*;
    let wrong = || {
        crate::errors::Error::new(
            ErrorKind::Type,
            format!(
                "JSON value {value} cannot be stored in property \"{}\"",
                prop.name
            ),
        )
    };
    match prop.dtype {
        Blob => {
            let s = value.as_str().ok_or_else(wrong)?;
            let bytes = hex::decode(s.as_bytes())
                .map_err(|e| crate::errors::Error::new(ErrorKind::Parse, e.to_string()))?;
            ensure_or!(
                bytes.len() == prop.size,
                ErrorKind::Value,
                "blob{} value has {} bytes",
                prop.size,
                bytes.len()
            );
            Ok(Value::Blob(bytes))
        }
        Bool => Ok(Value::Bool(value.as_bool().ok_or_else(wrong)?)),
        Int => crate::types::print_impl::int_value(value.as_i64().ok_or_else(wrong)?, prop.size),
        UInt => crate::types::print_impl::uint_value(value.as_u64().ok_or_else(wrong)?, prop.size),
        Float => {
            let v = value.as_f64().ok_or_else(wrong)?;
            match prop.size {
                4 => Ok(Value::F32(v as f32)),
                8 => Ok(Value::F64(v)),
                n => raise!(
                    ErrorKind::Unsupported,
                    "float{} values are not representable",
                    n * 8
                ),
            }
        }
        FixString => {
            let s = value.as_str().ok_or_else(wrong)?;
            ensure_or!(
                s.len() <= prop.size,
                ErrorKind::Value,
                "string \"{s}\" does not fit in string{}",
                prop.size
            );
            Ok(Value::Str(s.to_owned()))
        }
        StringPtr => Ok(Value::Str(value.as_str().ok_or_else(wrong)?.to_owned())),
        Ref => match value {
            Json::Null => Ok(Value::Ref(None)),
            Json::String(id) => Ok(Value::Ref(Some(
                crate::store::Store::global().fetch(id)?,
            ))),
            _ => Err(wrong()),
        },
        Dimension => Ok(Value::Dimension(dimension_from_json(value)?)),
        Property => Ok(Value::Property(property_from_json(value)?)),
        Relation => Ok(Value::Relation(relation_from_json(value)?)),
    }
}

// ---------------------------------------------------------------------------
// Iterator
// ---------------------------------------------------------------------------

/// Enumerates the ids in a document, optionally restricted to instances of
/// the metadata `metaid`.  Used by drivers to list a container.
pub fn iter(src: &str, metaid: std::option::Option<&str>) -> Result<Vec<String>> {
    let map = parse_root(src)?;
    let matches_meta = |entry: &JsonMap<String, Json>| -> bool {
        let metaid = match metaid {
            None => return true,
            Some(m) => m,
        };
        let wanted = ident::uuid_for(Some(metaid)).0;
        match entry.get("meta").and_then(Json::as_str) {
            Some(m) => m == metaid || ident::uuid_for(Some(m)).0 == wanted,
            // Metadata without an explicit meta key is an entity-schema
            // instance.
            None => {
                entry_is_meta(entry)
                    && (metaid == schemas::ENTITY_SCHEMA_URI
                        || wanted == ident::uuid_of(schemas::ENTITY_SCHEMA_URI))
            }
        }
    };

    if is_single(&map) {
        if !matches_meta(&map) {
            return Ok(Vec::new());
        }
        let id = map
            .get("uri")
            .or_else(|| map.get("uuid"))
            .and_then(Json::as_str);
        return match id {
            Some(id) => Ok(vec![id.to_owned()]),
            None => raise!(ErrorKind::Parse, "single document without uri or uuid"),
        };
    }
    Ok(map
        .iter()
        .filter(|(_, v)| v.as_object().map_or(false, |o| matches_meta(o)))
        .map(|(k, _)| k.clone())
        .collect())
}
