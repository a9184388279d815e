//! The uniform in-memory representation of data and metadata.
//!
//! An [`Instance`] is a reference-counted object made of a header (uuid,
//! optional uri, meta reference, optional parent snapshot), a dimension
//! vector, a property block and a per-property shape block.  Metadata is
//! itself an instance of a meta-entity (see [`crate::entity`]), bottoming
//! out in the three built-in schemas of [`crate::schemas`].

use crate::entity::{Entity, Layout};
use crate::errors::{ensure_or, raise, ErrorKind, Result};
use crate::ident::{self, UuidSource};
use crate::schemas::{self, Builtin};
use crate::types::{PropVal, Value};
use crate::{Arc, RwLock};

use core::fmt;
use sha3::{Digest, Sha3_256};
use std::sync::OnceLock;

/// Strong reference to an instance; cloning bumps the reference count.
pub type InstanceRef = Arc<Instance>;

/// Snapshot ancestry of an instance: the identity and content hash of the
/// instance it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parent {
    pub uuid: String,
    pub hash: [u8; 32],
}

/// Reference from an instance to its metadata.
///
/// The three built-in schemas are statically allocated and referred to by
/// tag, which breaks the ownership cycle of the self-describing root; all
/// other metadata is ordinary reference-counted instances.
#[derive(Clone)]
pub enum MetaRef {
    Builtin(Builtin),
    Link(InstanceRef),
}

impl MetaRef {
    /// The strong instance behind this reference.
    pub fn resolve(&self) -> InstanceRef {
        match self {
            MetaRef::Builtin(b) => schemas::builtin(*b).0.clone(),
            MetaRef::Link(inst) => inst.clone(),
        }
    }

    /// Uri of the referenced metadata.  Metadata always has one.
    pub fn uri(&self) -> String {
        match self {
            MetaRef::Builtin(b) => b.uri().to_owned(),
            MetaRef::Link(inst) => inst
                .uri()
                .map(str::to_owned)
                .unwrap_or_else(|| inst.uuid().to_owned()),
        }
    }

    /// Schema view of the referenced metadata.
    pub fn entity(&self) -> Result<Entity> {
        Entity::from_instance(self.resolve())
    }
}

impl fmt::Debug for MetaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetaRef({})", self.uri())
    }
}

/// Raw constructor input used by [`Entity`], the built-in schemas and the
/// codecs.  `Instance::create` is the validated public path.
pub(crate) struct RawParts {
    pub uuid: String,
    pub uri: std::option::Option<String>,
    pub meta: MetaRef,
    pub parent: std::option::Option<Parent>,
    pub dims: Vec<usize>,
    pub props: Vec<PropVal>,
    pub shapes: Vec<Vec<usize>>,
}

/// A concrete record conforming to an entity.
pub struct Instance {
    uuid: String,
    uri: std::option::Option<String>,
    meta: MetaRef,
    parent: std::option::Option<Parent>,
    /// Concrete dimension values, in metadata declaration order.
    dims: Vec<usize>,
    props: RwLock<Vec<PropVal>>,
    /// Resolved shape values per property; empty for scalars.
    shapes: Vec<Vec<usize>>,
    /// Layout cache; set exactly once, only on metadata instances.
    pub(crate) layout: OnceLock<Layout>,
}

impl Instance {
    /// Creates a new zero-initialized instance of `meta`.
    ///
    /// `dimvalues` supplies one concrete length per metadata dimension.
    /// When `id` is given the instance is registered in the global store
    /// under both uuid and uri; a duplicate registration returns the
    /// already-live instance and drops the new allocation.
    pub fn create(
        meta: &Entity,
        dimvalues: &[usize],
        id: std::option::Option<&str>,
    ) -> Result<InstanceRef> {
        Self::create_with_parent(meta, dimvalues, id, None)
    }

    /// Like [`create`](Self::create), but records a parent snapshot in the
    /// header.  Used when decoding serialized ancestry.
    pub fn create_with_parent(
        meta: &Entity,
        dimvalues: &[usize],
        id: std::option::Option<&str>,
        parent: std::option::Option<Parent>,
    ) -> Result<InstanceRef> {
        let layout = meta.layout();
        ensure_or!(
            dimvalues.len() == layout.dimensions.len(),
            ErrorKind::Value,
            "entity \"{}\" takes {} dimension values, {} given",
            meta.uri(),
            layout.dimensions.len(),
            dimvalues.len()
        );

        let (uuid, source) = ident::uuid_for(id);
        let uri = match (id, source) {
            (Some(s), UuidSource::Hashed) => Some(s.to_owned()),
            _ => None,
        };

        let mut props = Vec::with_capacity(layout.properties.len());
        let mut shapes = Vec::with_capacity(layout.properties.len());
        for prop in &layout.properties {
            if prop.is_array() {
                let shape = resolve_shape(&prop.shape, &layout.dimensions, dimvalues)?;
                let nmemb: usize = shape.iter().product();
                let mut arr = Vec::with_capacity(nmemb);
                for _ in 0..nmemb {
                    arr.push(Value::zero(prop.dtype, prop.size)?);
                }
                props.push(PropVal::Array(arr));
                shapes.push(shape);
            } else {
                props.push(PropVal::Scalar(Value::zero(prop.dtype, prop.size)?));
                shapes.push(Vec::new());
            }
        }

        let inst = Self::from_raw(RawParts {
            uuid,
            uri,
            meta: meta.meta_ref(),
            parent,
            dims: dimvalues.to_vec(),
            props,
            shapes,
        });
        if id.is_some() {
            return Ok(crate::store::Store::global().put(inst));
        }
        Ok(inst)
    }

    pub(crate) fn from_raw(raw: RawParts) -> InstanceRef {
        Arc::new(Instance {
            uuid: raw.uuid,
            uri: raw.uri,
            meta: raw.meta,
            parent: raw.parent,
            dims: raw.dims,
            props: RwLock::new(raw.props),
            shapes: raw.shapes,
            layout: OnceLock::new(),
        })
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn uri(&self) -> std::option::Option<&str> {
        self.uri.as_deref()
    }

    /// The preferred identifier: uri when present, uuid otherwise.
    pub fn id(&self) -> &str {
        self.uri.as_deref().unwrap_or(&self.uuid)
    }

    pub fn meta(&self) -> &MetaRef {
        &self.meta
    }

    pub fn parent(&self) -> std::option::Option<&Parent> {
        self.parent.as_ref()
    }

    /// Concrete dimension values in declaration order.
    pub fn dimension_values(&self) -> &[usize] {
        &self.dims
    }

    /// Value of the dimension named `name`.
    pub fn dimension_value(&self, name: &str) -> Result<usize> {
        let meta = self.meta.entity()?;
        match meta
            .layout()
            .dimensions
            .iter()
            .position(|d| d.name == name)
        {
            Some(i) => Ok(self.dims[i]),
            None => raise!(
                ErrorKind::Key,
                "entity \"{}\" has no dimension \"{name}\"",
                meta.uri()
            ),
        }
    }

    /// Resolved shape of property `index`; empty for scalars.
    pub fn property_shape(&self, index: usize) -> Result<&[usize]> {
        ensure_or!(
            index < self.shapes.len(),
            ErrorKind::Index,
            "property index {index} out of range ({} properties)",
            self.shapes.len()
        );
        Ok(&self.shapes[index])
    }

    /// Index of the property named `name` in this instance's metadata.
    pub fn property_index(&self, name: &str) -> Result<usize> {
        let meta = self.meta.entity()?;
        match meta
            .layout()
            .properties
            .iter()
            .position(|p| p.name == name)
        {
            Some(i) => Ok(i),
            None => raise!(
                ErrorKind::Key,
                "entity \"{}\" has no property \"{name}\"",
                meta.uri()
            ),
        }
    }

    /// Returns a deep copy of property `index`.
    pub fn get_property(&self, index: usize) -> Result<PropVal> {
        let props = self.props.read().expect("property lock poisoned");
        match props.get(index) {
            Some(v) => Ok(v.clone()),
            None => raise!(
                ErrorKind::Index,
                "property index {index} out of range ({} properties)",
                props.len()
            ),
        }
    }

    pub fn get_property_by_name(&self, name: &str) -> Result<PropVal> {
        self.get_property(self.property_index(name)?)
    }

    /// Runs `f` over a borrowed view of property `index` without copying.
    pub fn with_property<T>(&self, index: usize, f: impl FnOnce(&PropVal) -> T) -> Result<T> {
        let props = self.props.read().expect("property lock poisoned");
        match props.get(index) {
            Some(v) => Ok(f(v)),
            None => raise!(
                ErrorKind::Index,
                "property index {index} out of range ({} properties)",
                props.len()
            ),
        }
    }

    /// Replaces property `index` with `value`.
    ///
    /// The value must match the declared type and, for arrays, the resolved
    /// shape.  The old value is deep-released and the new one is owned by
    /// this instance.
    pub fn set_property(&self, index: usize, value: PropVal) -> Result<()> {
        let meta = self.meta.entity()?;
        let layout = meta.layout();
        ensure_or!(
            index < layout.properties.len(),
            ErrorKind::Index,
            "property index {index} out of range ({} properties)",
            layout.properties.len()
        );
        let prop = &layout.properties[index];
        match &value {
            PropVal::Scalar(v) => {
                ensure_or!(
                    !prop.is_array(),
                    ErrorKind::Type,
                    "property \"{}\" is an array",
                    prop.name
                );
                ensure_or!(
                    v.matches(prop.dtype, prop.size),
                    ErrorKind::Type,
                    "value of type \"{}\" cannot be stored in property \"{}\" of type \"{}\"",
                    v.dtype(),
                    prop.name,
                    prop.typename()?
                );
            }
            PropVal::Array(values) => {
                ensure_or!(
                    prop.is_array(),
                    ErrorKind::Type,
                    "property \"{}\" is a scalar",
                    prop.name
                );
                let expected: usize = self.shapes[index].iter().product();
                ensure_or!(
                    values.len() == expected,
                    ErrorKind::Value,
                    "property \"{}\" takes {expected} elements, {} given",
                    prop.name,
                    values.len()
                );
                for v in values {
                    ensure_or!(
                        v.matches(prop.dtype, prop.size),
                        ErrorKind::Type,
                        "array element of type \"{}\" cannot be stored in property \"{}\" of type \"{}\"",
                        v.dtype(),
                        prop.name,
                        prop.typename()?
                    );
                }
            }
        }
        let mut props = self.props.write().expect("property lock poisoned");
        props[index] = value;
        Ok(())
    }

    pub fn set_property_by_name(&self, name: &str, value: PropVal) -> Result<()> {
        self.set_property(self.property_index(name)?, value)
    }

    /// Textual form of property `index` (nested JSON arrays for shaped
    /// properties).
    pub fn get_property_as_string(&self, index: usize) -> Result<String> {
        let meta = self.meta.entity()?;
        let prop = match meta.layout().properties.get(index) {
            Some(p) => p.clone(),
            None => raise!(ErrorKind::Index, "property index {index} out of range"),
        };
        let value = self.get_property(index)?;
        let shape = self.property_shape(index)?;
        let json = crate::json::propval_to_json(&prop, shape, &value)?;
        Ok(json.to_string())
    }

    /// Inverse of [`get_property_as_string`](Self::get_property_as_string).
    pub fn set_property_from_string(&self, index: usize, src: &str) -> Result<()> {
        let meta = self.meta.entity()?;
        let prop = match meta.layout().properties.get(index) {
            Some(p) => p.clone(),
            None => raise!(ErrorKind::Index, "property index {index} out of range"),
        };
        let json: serde_json::Value = serde_json::from_str(src)
            .map_err(|e| crate::errors::Error::new(ErrorKind::Parse, e.to_string()))?;
        let shape = self.property_shape(index)?.to_vec();
        let value = crate::json::propval_from_json(&prop, &shape, &json)?;
        self.set_property(index, value)
    }

    /// Whether this instance is metadata, i.e. its meta reaches the
    /// entity-schema root in at most two steps.
    pub fn is_meta(&self) -> bool {
        let meta_uri = self.meta.uri();
        meta_uri == schemas::ENTITY_SCHEMA_URI || meta_uri == schemas::BASIC_METADATA_SCHEMA_URI
    }

    /// SHA3-256 digest of the instance content: meta uri, dimension values
    /// and every property value in declaration order, each in its
    /// canonical byte form.
    pub fn hash(&self) -> Result<[u8; 32]> {
        let mut ctx = Sha3_256::new();
        ctx.update(self.meta.uri().as_bytes());
        for d in &self.dims {
            ctx.update((*d as u64).to_le_bytes());
        }
        let props = self.props.read().expect("property lock poisoned");
        for prop in props.iter() {
            match prop {
                PropVal::Scalar(v) => crate::types::update_sha3(&mut ctx, v)?,
                PropVal::Array(values) => {
                    for v in values {
                        crate::types::update_sha3(&mut ctx, v)?;
                    }
                }
            }
        }
        Ok(ctx.finalize().into())
    }

}

impl Drop for Instance {
    fn drop(&mut self) {
        // The weak store entries for this instance are dead now; drop them
        // eagerly so lookups do not have to prune lazily.
        crate::store::Store::global().forget_expired(&self.uuid, self.uri.as_deref());
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.uri {
            Some(uri) => write!(f, "Instance({}, {uri})", self.uuid),
            None => write!(f, "Instance({})", self.uuid),
        }
    }
}

/// Resolves dimension-name expressions to concrete lengths.
///
/// An expression is either the name of a metadata dimension or a
/// non-negative integer literal.
pub(crate) fn resolve_shape(
    shape: &[String],
    dimensions: &[crate::types::Dimension],
    dimvalues: &[usize],
) -> Result<Vec<usize>> {
    shape
        .iter()
        .map(|expr| {
            if let Some(i) = dimensions.iter().position(|d| &d.name == expr) {
                return Ok(dimvalues[i]);
            }
            expr.parse::<usize>().map_err(|_| {
                crate::errors::Error::new(
                    ErrorKind::InvalidMetadata,
                    format!("unknown dimension name \"{expr}\""),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Dimension, Property};

    fn sample_entity(uri: &str) -> Entity {
        Entity::from_parts(
            uri,
            "Test entity",
            vec![Dimension::new("n", "Number of items")],
            vec![
                Property::new("label", DataType::StringPtr, 8),
                Property::new("values", DataType::Float, 8).with_shape(&["n"]),
                Property::new("flag", DataType::Bool, 1),
            ],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn creates_zero_initialized() {
        let meta = sample_entity("http://example.com/inst-test/0.1/Zeroed");
        let inst = Instance::create(&meta, &[3], None).unwrap();
        assert_eq!(inst.dimension_values(), &[3]);
        assert_eq!(inst.dimension_value("n").unwrap(), 3);
        assert_eq!(
            inst.get_property_by_name("label").unwrap(),
            PropVal::Scalar(Value::Str(String::new()))
        );
        let values = inst.get_property_by_name("values").unwrap();
        assert_eq!(values.as_array().unwrap().len(), 3);
        assert_eq!(inst.property_shape(1).unwrap(), &[3]);
    }

    #[test]
    fn property_set_get() {
        let meta = sample_entity("http://example.com/inst-test/0.1/SetGet");
        let inst = Instance::create(&meta, &[2], None).unwrap();
        inst.set_property_by_name("label", PropVal::Scalar(Value::Str("abc".into())))
            .unwrap();
        inst.set_property_by_name(
            "values",
            PropVal::Array(vec![Value::F64(1.5), Value::F64(2.5)]),
        )
        .unwrap();
        assert_eq!(
            inst.get_property_by_name("label").unwrap(),
            PropVal::Scalar(Value::Str("abc".into()))
        );

        // Wrong type, wrong arity, wrong length.
        assert!(inst
            .set_property_by_name("label", PropVal::Scalar(Value::I32(1)))
            .is_err());
        assert!(inst
            .set_property_by_name("flag", PropVal::Array(vec![Value::Bool(true)]))
            .is_err());
        assert!(inst
            .set_property_by_name("values", PropVal::Array(vec![Value::F64(1.0)]))
            .is_err());
        assert!(inst.get_property(17).is_err());
    }

    #[test]
    fn property_string_round_trip() {
        let meta = sample_entity("http://example.com/inst-test/0.1/Strings");
        let inst = Instance::create(&meta, &[2], None).unwrap();
        inst.set_property_from_string(1, "[0.5, 1.5]").unwrap();
        assert_eq!(inst.get_property_as_string(1).unwrap(), "[0.5,1.5]");
        assert_eq!(
            inst.get_property_by_name("values").unwrap(),
            PropVal::Array(vec![Value::F64(0.5), Value::F64(1.5)])
        );
    }

    #[test]
    fn identity_rule() {
        let meta = sample_entity("http://example.com/inst-test/0.1/Identity");
        let named = Instance::create(&meta, &[1], Some("http://data.example.com/a1")).unwrap();
        assert_eq!(named.uri(), Some("http://data.example.com/a1"));
        assert_eq!(
            named.uuid(),
            crate::ident::uuid_of("http://data.example.com/a1")
        );

        let anon = Instance::create(&meta, &[1], None).unwrap();
        assert_eq!(anon.uri(), None);
        assert!(crate::ident::is_uuid(anon.uuid()));
    }

    #[test]
    fn duplicate_registration_returns_existing() {
        let meta = sample_entity("http://example.com/inst-test/0.1/Dup");
        let a = Instance::create(&meta, &[1], Some("http://data.example.com/dup")).unwrap();
        let b = Instance::create(&meta, &[1], Some("http://data.example.com/dup")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn entities_are_meta_instances_are_not() {
        let meta = sample_entity("http://example.com/inst-test/0.1/IsMeta");
        let inst = Instance::create(&meta, &[1], None).unwrap();
        assert!(!inst.is_meta());
        assert!(meta.as_instance().is_meta());
    }

    #[test]
    fn hash_tracks_content() {
        let meta = sample_entity("http://example.com/inst-test/0.1/Hash");
        let a = Instance::create(&meta, &[1], None).unwrap();
        let b = Instance::create(&meta, &[1], None).unwrap();
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
        b.set_property_by_name("flag", PropVal::Scalar(Value::Bool(true)))
            .unwrap();
        assert_ne!(a.hash().unwrap(), b.hash().unwrap());
    }

    #[test]
    fn shape_resolution() {
        let dims = vec![Dimension::new("n", "")];
        let resolved = resolve_shape(
            &["n".to_owned(), "3".to_owned()],
            &dims,
            &[5],
        )
        .unwrap();
        assert_eq!(resolved, vec![5, 3]);
        assert!(resolve_shape(&["m".to_owned()], &dims, &[5]).is_err());
    }
}
