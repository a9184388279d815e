//! Entities: metadata instances with a cached memory layout.
//!
//! An [`Entity`] is a typed view over an [`Instance`] whose property values
//! carry the schema of other instances (`dimensions[]`, `properties[]` and
//! optionally `relations[]`).  On top of the uniform representation it
//! caches everything needed to lay out conforming instances: header size,
//! dimension-block offset, per-property byte offsets, shape-block offset,
//! total size and the widest member alignment.  The cache is computed at
//! post-initialization and never observed stale.

use crate::errors::{ensure_or, raise, ErrorKind, Result};
use crate::ident;
use crate::instance::{Instance, InstanceRef, MetaRef, RawParts};
use crate::schemas::{self, Builtin};
use crate::types::{self, DataType, Dimension, PropVal, Property, Relation, Value, POINTER_SIZE};

use core::fmt;
use std::ops::Deref;

/// Size of the instance header in the portable layout model: 37 bytes of
/// uuid, padding, four pointer-sized members (uri, refcount, meta, parent)
/// and a 32-byte content hash.
const HEADER_RAW_SIZE: usize = 40 + 4 * POINTER_SIZE + 32;

const fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) / align * align
}

/// Cached layout of an entity, immutable once computed.
#[derive(Debug, Clone)]
pub struct Layout {
    pub description: String,
    pub dimensions: Vec<Dimension>,
    pub properties: Vec<Property>,
    pub relations: Vec<Relation>,
    /// Aligned size of the instance header.
    pub headersize: usize,
    /// Offset of the dimension-value block (equals `headersize`).
    pub dimoffset: usize,
    /// Byte offset of each property, in declaration order.
    pub offsets: Vec<usize>,
    /// Offset of the per-property shape block.
    pub propdimsoffset: usize,
    /// Byte offset of each property's shape vector within the instance.
    pub shapeoffsets: Vec<usize>,
    /// Total instance size, ceiled to the widest alignment.
    pub size: usize,
    /// Alignment of the widest member.
    pub alignment: usize,
}

/// Schema view over a metadata instance.
#[derive(Clone)]
pub struct Entity(pub(crate) InstanceRef);

impl Entity {
    /// Validates the schema parts, computes the layout cache and registers
    /// the entity in the global store.
    ///
    /// `uri` must be a meta uri of the form `namespace/version/name`.
    pub fn from_parts(
        uri: &str,
        description: &str,
        dimensions: Vec<Dimension>,
        properties: Vec<Property>,
        relations: Vec<Relation>,
    ) -> Result<Entity> {
        ident::split_meta_uri(uri)
            .map_err(|e| e.rekind(ErrorKind::InvalidMetadata, format!("invalid entity uri \"{uri}\"")))?;
        let layout = compute_layout(description, dimensions, properties, relations)?;

        let dims = vec![
            layout.dimensions.len(),
            layout.properties.len(),
            layout.relations.len(),
        ];
        let props = vec![
            PropVal::Scalar(Value::Str(layout.description.clone())),
            PropVal::Array(
                layout
                    .dimensions
                    .iter()
                    .cloned()
                    .map(Value::Dimension)
                    .collect(),
            ),
            PropVal::Array(
                layout
                    .properties
                    .iter()
                    .cloned()
                    .map(Value::Property)
                    .collect(),
            ),
            PropVal::Array(
                layout
                    .relations
                    .iter()
                    .cloned()
                    .map(Value::Relation)
                    .collect(),
            ),
        ];
        let shapes = vec![
            Vec::new(),
            vec![layout.dimensions.len()],
            vec![layout.properties.len()],
            vec![layout.relations.len()],
        ];

        let inst = Instance::from_raw(RawParts {
            uuid: ident::uuid_of(uri),
            uri: Some(uri.to_owned()),
            meta: MetaRef::Builtin(Builtin::Entity),
            parent: None,
            dims,
            props,
            shapes,
        });
        inst.layout
            .set(layout)
            .expect("layout of a fresh instance is unset");
        Ok(Entity(crate::store::Store::global().put(inst)))
    }

    /// Wraps an existing metadata instance, computing the layout cache on
    /// first use.
    pub fn from_instance(inst: InstanceRef) -> Result<Entity> {
        ensure_or!(
            inst.is_meta(),
            ErrorKind::InvalidMetadata,
            "instance \"{}\" is not metadata",
            inst.id()
        );
        if inst.layout.get().is_none() {
            let layout = layout_from_values(&inst)?;
            // Another thread may have won the race; the value is identical.
            let _ = inst.layout.set(layout);
        }
        Ok(Entity(inst))
    }

    /// The underlying metadata instance.
    pub fn as_instance(&self) -> &InstanceRef {
        &self.0
    }

    /// Reference suitable for the `meta` header field of conforming
    /// instances.  The built-in schemas are referred to by tag.
    pub fn meta_ref(&self) -> MetaRef {
        match schemas::builtin_for_uri(self.uri()) {
            Some(b) => MetaRef::Builtin(b),
            None => MetaRef::Link(self.0.clone()),
        }
    }

    /// Uri of this entity.  Metadata always carries one.
    pub fn uri(&self) -> &str {
        self.0.id()
    }

    /// The cached layout.
    pub fn layout(&self) -> &Layout {
        self.0
            .layout
            .get()
            .expect("entity layout is computed at construction")
    }

    pub fn description(&self) -> &str {
        &self.layout().description
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.layout().dimensions
    }

    pub fn properties(&self) -> &[Property] {
        &self.layout().properties
    }

    pub fn relations(&self) -> &[Relation] {
        &self.layout().relations
    }

    pub fn ndimensions(&self) -> usize {
        self.layout().dimensions.len()
    }

    pub fn nproperties(&self) -> usize {
        self.layout().properties.len()
    }

    /// Total byte size of a conforming instance in the layout model.
    pub fn size(&self) -> usize {
        self.layout().size
    }

    pub fn property(&self, name: &str) -> std::option::Option<&Property> {
        self.layout().properties.iter().find(|p| p.name == name)
    }

    pub fn property_index(&self, name: &str) -> std::option::Option<usize> {
        self.layout().properties.iter().position(|p| p.name == name)
    }

    pub fn dimension_index(&self, name: &str) -> std::option::Option<usize> {
        self.layout().dimensions.iter().position(|d| d.name == name)
    }

    /// Name component of the entity uri.
    pub fn name(&self) -> Result<String> {
        Ok(ident::split_meta_uri(self.uri())?.0)
    }

    /// Version component of the entity uri.
    pub fn version(&self) -> Result<String> {
        Ok(ident::split_meta_uri(self.uri())?.1)
    }

    /// Namespace component of the entity uri.
    pub fn namespace(&self) -> Result<String> {
        Ok(ident::split_meta_uri(self.uri())?.2)
    }

    /// Creates a zero-initialized instance of this entity.
    pub fn create_instance(
        &self,
        dimvalues: &[usize],
        id: std::option::Option<&str>,
    ) -> Result<InstanceRef> {
        Instance::create(self, dimvalues, id)
    }
}

impl Deref for Entity {
    type Target = Instance;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.uri())
    }
}

/// Rebuilds the layout of a metadata instance from its property values.
fn layout_from_values(inst: &InstanceRef) -> Result<Layout> {
    let mut description = String::new();
    let mut dimensions = Vec::new();
    let mut properties = Vec::new();
    let mut relations = Vec::new();

    let meta = inst.meta().entity()?;
    for (i, prop) in meta.layout().properties.iter().enumerate() {
        let value = inst.get_property(i)?;
        match (prop.name.as_str(), value) {
            ("description", PropVal::Scalar(Value::Str(s))) => description = s,
            ("dimensions", PropVal::Array(values)) => {
                for v in values {
                    dimensions.push(v.as_dimension()?.clone());
                }
            }
            ("properties", PropVal::Array(values)) => {
                for v in values {
                    properties.push(v.as_property()?.clone());
                }
            }
            ("relations", PropVal::Array(values)) => {
                for v in values {
                    relations.push(v.as_relation()?.clone());
                }
            }
            (name, _) => raise!(
                ErrorKind::InvalidMetadata,
                "unexpected schema property \"{name}\" in \"{}\"",
                inst.id()
            ),
        }
    }
    compute_layout(&description, dimensions, properties, relations)
}

/// Computes the layout cache for a validated schema.
///
/// Properties are placed in declaration order with the minimum padding
/// required by their alignment; array properties occupy one pointer and
/// park their concrete shape values in the trailing shape block.
pub(crate) fn compute_layout(
    description: &str,
    dimensions: Vec<Dimension>,
    properties: Vec<Property>,
    relations: Vec<Relation>,
) -> Result<Layout> {
    for (i, d) in dimensions.iter().enumerate() {
        ensure_or!(
            !d.name.is_empty(),
            ErrorKind::InvalidMetadata,
            "dimension {i} has an empty name"
        );
        ensure_or!(
            !dimensions[..i].iter().any(|x| x.name == d.name),
            ErrorKind::InvalidMetadata,
            "duplicate dimension name \"{}\"",
            d.name
        );
    }
    for (i, p) in properties.iter().enumerate() {
        ensure_or!(
            !p.name.is_empty(),
            ErrorKind::InvalidMetadata,
            "property {i} has an empty name"
        );
        ensure_or!(
            !properties[..i].iter().any(|x| x.name == p.name),
            ErrorKind::InvalidMetadata,
            "duplicate property name \"{}\"",
            p.name
        );
        types::check_size(p.dtype, p.size)
            .map_err(|e| e.rekind(ErrorKind::InvalidMetadata, format!("property \"{}\"", p.name)))?;
        for expr in &p.shape {
            let known = dimensions.iter().any(|d| &d.name == expr)
                || expr.parse::<usize>().is_ok();
            ensure_or!(
                known,
                ErrorKind::InvalidMetadata,
                "property \"{}\" refers to unknown dimension \"{expr}\"",
                p.name
            );
        }
    }

    // Widest alignment among size_t, pointers and all property types.
    let mut alignment = POINTER_SIZE;
    for p in &properties {
        let a = if p.is_array() {
            POINTER_SIZE
        } else {
            types::alignment(p.dtype, p.size)?
        };
        alignment = alignment.max(a);
    }

    let headersize = align_up(HEADER_RAW_SIZE, alignment);
    let dimoffset = headersize;
    let mut offset = dimoffset + dimensions.len() * POINTER_SIZE;

    let mut offsets = Vec::with_capacity(properties.len());
    for p in &properties {
        let (psize, pdtype, psz) = if p.is_array() {
            (POINTER_SIZE, DataType::StringPtr, POINTER_SIZE)
        } else {
            (p.size, p.dtype, p.size)
        };
        offset += types::padding_at(pdtype, psz, offset)?;
        offsets.push(offset);
        offset += psize;
    }

    let propdimsoffset = align_up(offset, POINTER_SIZE);
    let mut shapeoffsets = Vec::with_capacity(properties.len());
    let mut shape_end = propdimsoffset;
    for p in &properties {
        shapeoffsets.push(shape_end);
        shape_end += p.ndims() * POINTER_SIZE;
    }
    let size = align_up(shape_end, alignment);

    Ok(Layout {
        description: description.to_owned(),
        dimensions,
        properties,
        relations,
        headersize,
        dimoffset,
        offsets,
        propdimsoffset,
        shapeoffsets,
        size,
        alignment,
    })
}
