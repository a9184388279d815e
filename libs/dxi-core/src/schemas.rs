//! The three built-in self-describing schemas.
//!
//! `BasicMetadataSchema` is the self-referential root (its meta is itself),
//! `EntitySchema` is the meta of every user entity, and `CollectionEntity`
//! describes collections of labelled instances.  All three are statically
//! allocated and referred to by tag from [`crate::instance::MetaRef`],
//! which is what breaks the meta-meta ownership cycle.  Their uris (and
//! therefore their version-5 UUIDs) are fixed so that independent
//! implementations parse each other's data bit-for-bit.

use crate::entity::{compute_layout, Entity};
use crate::ident;
use crate::instance::{Instance, MetaRef, RawParts};
use crate::types::{DataType, Dimension, PropVal, Property, Value, PROPERTY_SIZE, RELATION_SIZE};
use std::sync::OnceLock;

pub const BASIC_METADATA_SCHEMA_URI: &str = "http://onto-ns.com/meta/0.1/BasicMetadataSchema";
pub const ENTITY_SCHEMA_URI: &str = "http://onto-ns.com/meta/0.3/EntitySchema";
pub const COLLECTION_ENTITY_URI: &str = "http://onto-ns.com/meta/0.1/Collection";

/// Tag naming one of the built-in schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    BasicMetadata,
    Entity,
    Collection,
}

impl Builtin {
    pub const fn uri(&self) -> &'static str {
        match self {
            Builtin::BasicMetadata => BASIC_METADATA_SCHEMA_URI,
            Builtin::Entity => ENTITY_SCHEMA_URI,
            Builtin::Collection => COLLECTION_ENTITY_URI,
        }
    }

    /// Deterministic UUID of this schema (version 5 of the uri).
    pub fn uuid(&self) -> &'static str {
        static UUIDS: OnceLock<[String; 3]> = OnceLock::new();
        let uuids = UUIDS.get_or_init(|| {
            [
                ident::uuid_of(BASIC_METADATA_SCHEMA_URI),
                ident::uuid_of(ENTITY_SCHEMA_URI),
                ident::uuid_of(COLLECTION_ENTITY_URI),
            ]
        });
        match self {
            Builtin::BasicMetadata => &uuids[0],
            Builtin::Entity => &uuids[1],
            Builtin::Collection => &uuids[2],
        }
    }
}

/// Returns the static entity for a built-in tag.
pub fn builtin(b: Builtin) -> &'static Entity {
    match b {
        Builtin::BasicMetadata => basic_metadata_schema(),
        Builtin::Entity => entity_schema(),
        Builtin::Collection => collection_entity(),
    }
}

/// Maps a schema uri to its built-in tag.
pub fn builtin_for_uri(uri: &str) -> std::option::Option<Builtin> {
    match uri {
        BASIC_METADATA_SCHEMA_URI => Some(Builtin::BasicMetadata),
        ENTITY_SCHEMA_URI => Some(Builtin::Entity),
        COLLECTION_ENTITY_URI => Some(Builtin::Collection),
        _ => None,
    }
}

/// Whether `id` (uri or uuid) names a schema whose instances are
/// themselves metadata.  Collection instances are ordinary data.
pub fn is_metadata_schema(id: &str) -> bool {
    [Builtin::BasicMetadata, Builtin::Entity]
        .iter()
        .any(|b| id == b.uri() || id == b.uuid())
}

/// Looks a built-in schema up by uri or uuid.
pub fn find(id: &str) -> std::option::Option<&'static Entity> {
    for b in [Builtin::BasicMetadata, Builtin::Entity, Builtin::Collection] {
        if id == b.uri() || id == b.uuid() {
            return Some(builtin(b));
        }
    }
    None
}

/// Dimensions shared by the two schema-of-schemas.
fn schema_dimensions() -> Vec<Dimension> {
    vec![
        Dimension::new("ndimensions", "Number of dimensions."),
        Dimension::new("nproperties", "Number of properties."),
        Dimension::new("nrelations", "Number of relations."),
    ]
}

/// Properties shared by the two schema-of-schemas.
fn schema_properties() -> Vec<Property> {
    vec![
        Property::new("description", DataType::StringPtr, crate::types::POINTER_SIZE)
            .with_description("Description of the metadata."),
        Property::new("dimensions", DataType::Dimension, crate::types::DIMENSION_SIZE)
            .with_shape(&["ndimensions"])
            .with_description("Name and description of each dimension."),
        Property::new("properties", DataType::Property, PROPERTY_SIZE)
            .with_shape(&["nproperties"])
            .with_description("Type, name and description of each property."),
        Property::new("relations", DataType::Relation, RELATION_SIZE)
            .with_shape(&["nrelations"])
            .with_description("Subject-predicate-object triples."),
    ]
}

/// Builds a statically-held schema instance without touching the store.
fn make_schema(
    uri: &str,
    description: &str,
    meta: MetaRef,
    dimensions: Vec<Dimension>,
    properties: Vec<Property>,
) -> Entity {
    let layout = compute_layout(description, dimensions, properties, vec![])
        .expect("built-in schema is well-formed");
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
        PropVal::Array(Vec::new()),
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
        meta,
        parent: None,
        dims,
        props,
        shapes,
    });
    inst.layout
        .set(layout)
        .expect("layout of a fresh instance is unset");
    Entity(inst)
}

/// The self-referential meta-meta root.
pub fn basic_metadata_schema() -> &'static Entity {
    static SCHEMA: OnceLock<Entity> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        make_schema(
            BASIC_METADATA_SCHEMA_URI,
            "Meta-metadata description of a metadata schema.",
            MetaRef::Builtin(Builtin::BasicMetadata),
            schema_dimensions(),
            schema_properties(),
        )
    })
}

/// The meta of every user entity.
pub fn entity_schema() -> &'static Entity {
    static SCHEMA: OnceLock<Entity> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        make_schema(
            ENTITY_SCHEMA_URI,
            "Schema for entities.",
            MetaRef::Builtin(Builtin::BasicMetadata),
            schema_dimensions(),
            schema_properties(),
        )
    })
}

/// Entity describing collections of labelled instances.
pub fn collection_entity() -> &'static Entity {
    static SCHEMA: OnceLock<Entity> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        make_schema(
            COLLECTION_ENTITY_URI,
            "Collection of instances, labelled through relation triples.",
            MetaRef::Builtin(Builtin::Entity),
            vec![Dimension::new("nrelations", "Number of relations.")],
            vec![Property::new("relations", DataType::Relation, RELATION_SIZE)
                .with_shape(&["nrelations"])
                .with_description("Subject-predicate-object triples.")],
        )
    })
}
