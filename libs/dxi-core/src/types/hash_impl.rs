//! Canonical SHA-3 feed of typed values.
//!
//! Canonical forms: `bool` is a single 0/1 byte; integers and floats are
//! the little-endian bytes of their declared width; strings are UTF-8
//! without terminator; composites feed each field in declaration order and
//! skip absent optional fields (no sentinel), so the digest does not
//! depend on which optionals happen to be absent.

use super::*;
use crate::errors::Result;
use sha3::{Digest, Sha3_256};

/// Feeds the canonical byte sequence of `value` into `ctx`.
pub fn update_sha3(ctx: &mut Sha3_256, value: &Value) -> Result<()> {
    match value {
        Value::Blob(b) => ctx.update(b),
        Value::Bool(v) => ctx.update([*v as u8]),
        Value::I8(v) => ctx.update(v.to_le_bytes()),
        Value::I16(v) => ctx.update(v.to_le_bytes()),
        Value::I32(v) => ctx.update(v.to_le_bytes()),
        Value::I64(v) => ctx.update(v.to_le_bytes()),
        Value::U8(v) => ctx.update(v.to_le_bytes()),
        Value::U16(v) => ctx.update(v.to_le_bytes()),
        Value::U32(v) => ctx.update(v.to_le_bytes()),
        Value::U64(v) => ctx.update(v.to_le_bytes()),
        Value::F32(v) => ctx.update(v.to_le_bytes()),
        Value::F64(v) => ctx.update(v.to_le_bytes()),
        Value::Str(s) => ctx.update(s.as_bytes()),
        // A ref contributes the identity of its target; an unassigned ref
        // contributes nothing.
        Value::Ref(target) => {
            if let Some(t) = target {
                ctx.update(t.uuid().as_bytes());
            }
        }
        Value::Dimension(d) => {
            ctx.update(d.name.as_bytes());
            ctx.update(d.description.as_bytes());
        }
        Value::Property(p) => {
            ctx.update(p.name.as_bytes());
            ctx.update(p.typename()?.as_bytes());
            for dim in &p.shape {
                ctx.update(dim.as_bytes());
            }
            if let Some(unit) = &p.unit {
                ctx.update(unit.as_bytes());
            }
            if let Some(descr) = &p.description {
                ctx.update(descr.as_bytes());
            }
        }
        Value::Relation(r) => {
            ctx.update(r.s.as_bytes());
            ctx.update(r.p.as_bytes());
            ctx.update(r.o.as_bytes());
            if let Some(d) = &r.d {
                ctx.update(d.as_bytes());
            }
            if let Some(id) = &r.id {
                ctx.update(id.as_bytes());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(values: &[Value]) -> [u8; 32] {
        let mut ctx = Sha3_256::new();
        for v in values {
            update_sha3(&mut ctx, v).unwrap();
        }
        ctx.finalize().into()
    }

    #[test]
    fn deterministic() {
        let a = digest_of(&[Value::I32(42), Value::Str("x".into())]);
        let b = digest_of(&[Value::I32(42), Value::Str("x".into())]);
        assert_eq!(a, b);
    }

    #[test]
    fn width_matters() {
        assert_ne!(digest_of(&[Value::I32(1)]), digest_of(&[Value::I64(1)]));
    }

    #[test]
    fn absent_optionals_are_skipped() {
        let bare = Relation::new("a", "b", "c");
        let mut with_d = bare.clone();
        with_d.d = Some("xsd:int".into());
        assert_ne!(
            digest_of(&[Value::Relation(bare.clone())]),
            digest_of(&[Value::Relation(with_d)])
        );
        // No sentinel: an absent optional feeds nothing at all.
        let mut folded = Sha3_256::new();
        folded.update(b"a");
        folded.update(b"b");
        folded.update(b"c");
        let folded: [u8; 32] = folded.finalize().into();
        assert_eq!(digest_of(&[Value::Relation(bare)]), folded);
    }
}
