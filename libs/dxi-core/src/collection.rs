//! Collections: labelled groups of instances held together by relation
//! triples.
//!
//! A collection is ordinary data from the runtime's point of view: an
//! instance of the built-in Collection entity whose single array property
//! is its relation table.  Labels are bound to instances with three
//! triples: `(label, "_is-a", "Instance")`, `(label, "_has-uuid", uuid)`
//! and `(label, "_has-meta", meta-uri)`.

use crate::errors::{raise, ErrorKind, Result};
use crate::instance::{Instance, InstanceRef};
use crate::schemas;
use crate::types::{PropVal, Relation, Value};
use crate::HashMap;

const IS_A: &str = "_is-a";
const HAS_UUID: &str = "_has-uuid";
const HAS_META: &str = "_has-meta";

/// A mutable collection of labelled instances.
///
/// Mutation happens on this wrapper; [`as_instance`](Self::as_instance)
/// materializes a fresh instance (the dimension value of an instance is
/// fixed at creation, so every snapshot is a new one).
#[derive(Debug, Default)]
pub struct Collection {
    id: std::option::Option<String>,
    relations: Vec<Relation>,
    /// Strong references keeping labelled instances alive.
    refs: HashMap<String, InstanceRef>,
}

impl Collection {
    pub fn new(id: std::option::Option<&str>) -> Collection {
        Collection {
            id: id.map(str::to_owned),
            relations: Vec::new(),
            refs: HashMap::new(),
        }
    }

    /// Rebuilds a collection from a previously materialized instance.
    pub fn from_instance(inst: &InstanceRef) -> Result<Collection> {
        if inst.meta().uri() != schemas::COLLECTION_ENTITY_URI {
            raise!(
                ErrorKind::Type,
                "instance \"{}\" is not a collection",
                inst.id()
            );
        }
        let mut coll = Collection::new(inst.uri());
        let rels = inst.get_property_by_name("relations")?;
        for v in rels.as_array()? {
            coll.relations.push(v.as_relation()?.clone());
        }
        // Re-resolve labelled instances that are still reachable.
        for rel in coll.relations.clone() {
            if rel.p == HAS_UUID {
                if let Some(target) = crate::store::Store::global().get(&rel.o)? {
                    coll.refs.insert(rel.s.clone(), target);
                }
            }
        }
        Ok(coll)
    }

    pub fn id(&self) -> std::option::Option<&str> {
        self.id.as_deref()
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn add_relation(&mut self, rel: Relation) {
        self.relations.push(rel);
    }

    /// First relation matching the given subject/predicate/object filters.
    pub fn find_first(
        &self,
        s: std::option::Option<&str>,
        p: std::option::Option<&str>,
        o: std::option::Option<&str>,
    ) -> std::option::Option<&Relation> {
        self.relations.iter().find(|r| {
            s.map_or(true, |v| r.s == v) && p.map_or(true, |v| r.p == v) && o.map_or(true, |v| r.o == v)
        })
    }

    /// Removes all relations matching the filters; returns how many.
    pub fn remove_relations(
        &mut self,
        s: std::option::Option<&str>,
        p: std::option::Option<&str>,
        o: std::option::Option<&str>,
    ) -> usize {
        let before = self.relations.len();
        self.relations.retain(|r| {
            !(s.map_or(true, |v| r.s == v)
                && p.map_or(true, |v| r.p == v)
                && o.map_or(true, |v| r.o == v))
        });
        before - self.relations.len()
    }

    /// Binds `label` to `inst`.  A label can be bound only once.
    pub fn add(&mut self, label: &str, inst: InstanceRef) -> Result<()> {
        if self.find_first(Some(label), Some(IS_A), None).is_some() {
            raise!(ErrorKind::Key, "label \"{label}\" is already in use");
        }
        self.relations.push(Relation::new(label, IS_A, "Instance"));
        self.relations
            .push(Relation::new(label, HAS_UUID, inst.uuid()));
        self.relations
            .push(Relation::new(label, HAS_META, inst.meta().uri()));
        self.refs.insert(label.to_owned(), inst);
        Ok(())
    }

    /// The instance bound to `label`.
    pub fn get(&self, label: &str) -> Result<InstanceRef> {
        if let Some(inst) = self.refs.get(label) {
            return Ok(inst.clone());
        }
        match self.find_first(Some(label), Some(HAS_UUID), None) {
            Some(rel) => crate::store::Store::global().fetch(&rel.o),
            None => raise!(ErrorKind::Key, "no instance labelled \"{label}\""),
        }
    }

    /// Unbinds `label`; returns the instance it referred to, if alive.
    pub fn remove(&mut self, label: &str) -> std::option::Option<InstanceRef> {
        self.remove_relations(Some(label), None, None);
        self.refs.remove(label)
    }

    /// Number of labelled instances.
    pub fn count(&self) -> usize {
        self.relations.iter().filter(|r| r.p == IS_A).count()
    }

    /// Labels in insertion order.
    pub fn labels(&self) -> Vec<&str> {
        self.relations
            .iter()
            .filter(|r| r.p == IS_A)
            .map(|r| r.s.as_str())
            .collect()
    }

    /// Materializes this collection as an instance of the Collection
    /// entity, ready for the codecs.
    pub fn as_instance(&self) -> Result<InstanceRef> {
        let meta = schemas::collection_entity();
        let inst = Instance::create(meta, &[self.relations.len()], self.id.as_deref())?;
        inst.set_property_by_name(
            "relations",
            PropVal::Array(self.relations.iter().cloned().map(Value::Relation).collect()),
        )?;
        Ok(inst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::types::{DataType, Dimension, Property};

    fn item_entity() -> Entity {
        Entity::from_parts(
            "http://example.com/coll-test/0.1/Item",
            "",
            vec![Dimension::new("n", "")],
            vec![Property::new("values", DataType::Int, 4).with_shape(&["n"])],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn labels_and_lookup() {
        let meta = item_entity();
        let a = Instance::create(&meta, &[1], None).unwrap();
        let b = Instance::create(&meta, &[2], None).unwrap();

        let mut coll = Collection::new(Some("http://data.example.com/coll1"));
        coll.add("first", a.clone()).unwrap();
        coll.add("second", b.clone()).unwrap();
        assert_eq!(coll.count(), 2);
        assert_eq!(coll.labels(), vec!["first", "second"]);
        assert!(std::sync::Arc::ptr_eq(&coll.get("first").unwrap(), &a));
        assert!(coll.add("first", b.clone()).is_err());

        let removed = coll.remove("first").unwrap();
        assert!(std::sync::Arc::ptr_eq(&removed, &a));
        assert_eq!(coll.count(), 1);
        assert!(coll.get("first").is_err());
    }

    #[test]
    fn materializes_and_rebuilds() {
        let meta = item_entity();
        let a = Instance::create(&meta, &[1], None).unwrap();

        let mut coll = Collection::new(Some("http://data.example.com/coll2"));
        coll.add("only", a.clone()).unwrap();
        coll.add_relation(Relation::new("only", "comment", "kept as-is"));

        let inst = coll.as_instance().unwrap();
        assert_eq!(inst.meta().uri(), schemas::COLLECTION_ENTITY_URI);
        assert_eq!(inst.dimension_values(), &[4]);

        let back = Collection::from_instance(&inst).unwrap();
        assert_eq!(back.count(), 1);
        assert!(std::sync::Arc::ptr_eq(&back.get("only").unwrap(), &a));
        assert_eq!(
            back.find_first(None, Some("comment"), None).unwrap().o,
            "kept as-is"
        );
    }
}
