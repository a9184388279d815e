pub(crate) mod bson;
