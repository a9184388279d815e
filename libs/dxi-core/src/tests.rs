//! End-to-end scenarios over the whole data plane: entity definition,
//! instance population, and round-trips through both codecs.

use crate::entity::Entity;
use crate::instance::Instance;
use crate::json::{self, JsonFlags, JsonFormat};
use crate::types::{DataType, Dimension, PropVal, Property, Value};
use crate::{bson, ident};

const CHEMISTRY_URI: &str = "http://www.sintef.no/calm/0.1/Chemistry";

fn chemistry_entity() -> Entity {
    Entity::from_parts(
        CHEMISTRY_URI,
        "Alloy chemistry with phase data.",
        vec![
            Dimension::new("nelements", "Number of chemical elements."),
            Dimension::new("nphases", "Number of phases."),
        ],
        vec![
            Property::new("alloy", DataType::StringPtr, 8)
                .with_description("Alloy designation."),
            Property::new("elements", DataType::StringPtr, 8)
                .with_shape(&["nelements"])
                .with_description("Chemical symbol of each element."),
            Property::new("phases", DataType::StringPtr, 8)
                .with_shape(&["nphases"])
                .with_description("Name of each phase."),
            Property::new("X0", DataType::Float, 8)
                .with_shape(&["nelements"])
                .with_description("Nominal composition."),
            Property::new("volfrac", DataType::Float, 8)
                .with_shape(&["nphases"])
                .with_description("Volume fraction of each phase."),
            Property::new("rpart", DataType::Float, 8)
                .with_shape(&["nphases"])
                .with_unit("m")
                .with_description("Particle radius of each phase."),
            Property::new("atvol", DataType::Float, 8)
                .with_shape(&["nphases"])
                .with_unit("m^3")
                .with_description("Average atomic volume of each phase."),
        ],
        vec![],
    )
    .unwrap()
}

fn f64s(values: &[f64]) -> PropVal {
    PropVal::Array(values.iter().copied().map(Value::F64).collect())
}

fn strs(values: &[&str]) -> PropVal {
    PropVal::Array(values.iter().map(|s| Value::Str((*s).into())).collect())
}

fn chemistry_instance(meta: &Entity, id: &str) -> crate::InstanceRef {
    let inst = Instance::create(meta, &[4, 3], Some(id)).unwrap();
    let set = |name: &str, v: PropVal| inst.set_property_by_name(name, v).unwrap();
    set(
        "alloy",
        PropVal::Scalar(Value::Str("Sample alloy (Al-Mg-Si)".into())),
    );
    set("elements", strs(&["Al", "Mg", "Si", "Fe"]));
    set("phases", strs(&["FCC_A1", "MG2SI", "ALFESI_ALPHA"]));

    // The nominal composition must sum to one: the matrix element takes
    // whatever the solutes leave.
    let mut x0 = [0.99, 0.005, 0.005, 0.0003];
    x0[0] = 1.0 - x0[1..].iter().sum::<f64>();
    set("X0", f64s(&x0));

    set("volfrac", f64s(&[0.98, 0.01, 0.01]));
    set("rpart", f64s(&[0.0, 1e-6, 10e-6]));
    set("atvol", f64s(&[16e-30, 24e-30, 20e-30]));
    inst
}

fn assert_chemistry_equal(a: &crate::InstanceRef, b: &crate::InstanceRef) {
    assert_eq!(a.dimension_values(), b.dimension_values());
    for name in ["alloy", "elements", "phases", "X0", "volfrac", "rpart", "atvol"] {
        assert_eq!(
            a.get_property_by_name(name).unwrap(),
            b.get_property_by_name(name).unwrap(),
            "property \"{name}\" differs"
        );
    }
    assert_eq!(a.hash().unwrap(), b.hash().unwrap());
}

#[test]
fn chemistry_entity_uuid_is_pinned() {
    assert_eq!(
        ident::uuid_of(CHEMISTRY_URI),
        "62bfca3a-cd16-5046-b44b-a3d69b34fcff"
    );
    let meta = chemistry_entity();
    assert_eq!(
        meta.as_instance().uuid(),
        "62bfca3a-cd16-5046-b44b-a3d69b34fcff"
    );
}

#[test]
fn chemistry_through_json() {
    let meta = chemistry_entity();
    let original = chemistry_instance(&meta, "http://data.example.com/chem-json");

    let text = json::sprint(&original, JsonFlags::WITH_UUID | JsonFlags::URI_KEY).unwrap();
    let (format, flags) = json::check(&text, None).unwrap();
    assert_eq!(format, JsonFormat::Data);
    assert!(flags.contains(JsonFlags::URI_KEY));

    // Re-scanning while the original is live deduplicates to the same
    // object.
    let same = json::sscan(&text, None, None).unwrap();
    assert!(std::sync::Arc::ptr_eq(&same, &original));

    // Re-scanning after it is gone re-builds an equal instance.
    let expected_hash = original.hash().unwrap();
    drop(same);
    drop(original);
    let rebuilt = json::sscan(&text, None, None).unwrap();
    assert_eq!(rebuilt.uri(), Some("http://data.example.com/chem-json"));
    assert_eq!(rebuilt.hash().unwrap(), expected_hash);
    let mut x0 = [0.99, 0.005, 0.005, 0.0003];
    x0[0] = 1.0 - x0[1..].iter().sum::<f64>();
    assert_eq!(rebuilt.get_property_by_name("X0").unwrap(), f64s(&x0));
}

#[test]
fn chemistry_through_bson() {
    let meta = chemistry_entity();
    let original = chemistry_instance(&meta, "http://data.example.com/chem-bson");
    let doc = bson::from_instance(&original).unwrap();

    let expected_hash = original.hash().unwrap();
    drop(original);
    let rebuilt = bson::load_instance(&doc, None).unwrap();
    assert_eq!(rebuilt.uri(), Some("http://data.example.com/chem-bson"));
    assert_eq!(rebuilt.hash().unwrap(), expected_hash);
    assert_eq!(
        rebuilt.get_property_by_name("phases").unwrap(),
        strs(&["FCC_A1", "MG2SI", "ALFESI_ALPHA"])
    );
    assert_eq!(
        rebuilt.get_property_by_name("atvol").unwrap(),
        f64s(&[16e-30, 24e-30, 20e-30])
    );

    // Byte-stable: the rebuilt instance serializes identically.
    assert_eq!(bson::from_instance(&rebuilt).unwrap(), doc);
}

#[test]
fn chemistry_codecs_agree() {
    let meta = chemistry_entity();
    let original = chemistry_instance(&meta, "http://data.example.com/chem-both");

    let text = json::sprint(&original, JsonFlags::SINGLE).unwrap();
    let doc = bson::from_instance(&original).unwrap();
    drop(original);

    let via_json = json::sscan(&text, None, None).unwrap();
    let via_bson = bson::load_instance(&doc, None).unwrap();
    // The BSON load deduplicates against the instance the JSON scan just
    // registered, and either way the contents agree.
    assert_chemistry_equal(&via_json, &via_bson);
}

#[test]
fn chemistry_metadata_round_trips_both_ways() {
    let meta = chemistry_entity();

    let text = json::sprint(meta.as_instance(), JsonFlags::SINGLE).unwrap();
    let (format, flags) = json::check(&text, None).unwrap();
    assert_eq!(format, JsonFormat::Meta);
    assert!(flags.contains(JsonFlags::ARRAYS));
    let from_json = Entity::from_instance(json::sscan(&text, None, None).unwrap()).unwrap();
    assert_eq!(from_json.properties(), meta.properties());

    let doc = bson::from_instance(meta.as_instance()).unwrap();
    let from_bson = Entity::from_instance(bson::load_instance(&doc, None).unwrap()).unwrap();
    assert_eq!(from_bson.properties(), meta.properties());
    assert_eq!(from_bson.dimensions(), meta.dimensions());
}
