//! Value-preserving casts between concrete types.

use super::*;
use crate::errors::{ensure_or, raise, ErrorKind, Result};

enum Num {
    I(i64),
    U(u64),
    F(f64),
}

fn numeric(src: &Value) -> std::option::Option<Num> {
    Some(match src {
        Value::Bool(v) => Num::U(*v as u64),
        Value::I8(v) => Num::I(*v as i64),
        Value::I16(v) => Num::I(*v as i64),
        Value::I32(v) => Num::I(*v as i64),
        Value::I64(v) => Num::I(*v),
        Value::U8(v) => Num::U(*v as u64),
        Value::U16(v) => Num::U(*v as u64),
        Value::U32(v) => Num::U(*v as u64),
        Value::U64(v) => Num::U(*v),
        Value::F32(v) => Num::F(*v as f64),
        Value::F64(v) => Num::F(*v),
        _ => return None,
    })
}

fn cast_error(src: &Value, dtype: DataType, size: usize) -> crate::errors::Error {
    let target = typename(dtype, size, None).unwrap_or_else(|_| dtype.basename().to_owned());
    crate::errors::Error::new(
        ErrorKind::Type,
        format!("cannot cast \"{}\" value to \"{target}\"", src.dtype()),
    )
}

/// Casts `src` to the concrete type `(dtype, size)`.
///
/// Numeric widenings are exact; narrowings follow C-style truncation;
/// string-to-number parses; number-to-string uses shortest round-trip
/// formatting.  Anything outside these rules is a `Type` error.
pub fn copy_cast(src: &Value, dtype: DataType, size: usize) -> Result<Value> {
    use DataType::*;
    check_size(dtype, size)?;

    // Same concrete type: plain deep copy.
    if src.matches(dtype, size) && !(dtype == FixString && src.dtype() == StringPtr) {
        return Ok(src.clone());
    }

    if let Some(num) = numeric(src) {
        return match dtype {
            Bool => Ok(Value::Bool(match num {
                Num::I(v) => v != 0,
                Num::U(v) => v != 0,
                Num::F(v) => v != 0.0,
            })),
            Int => {
                let wide = match num {
                    Num::I(v) => v,
                    Num::U(v) => v as i64,
                    Num::F(v) => v as i64,
                };
                Ok(match size {
                    1 => Value::I8(wide as i8),
                    2 => Value::I16(wide as i16),
                    4 => Value::I32(wide as i32),
                    _ => Value::I64(wide),
                })
            }
            UInt => {
                let wide = match num {
                    Num::I(v) => v as u64,
                    Num::U(v) => v,
                    Num::F(v) => v as u64,
                };
                Ok(match size {
                    1 => Value::U8(wide as u8),
                    2 => Value::U16(wide as u16),
                    4 => Value::U32(wide as u32),
                    _ => Value::U64(wide),
                })
            }
            Float => {
                let wide = match num {
                    Num::I(v) => v as f64,
                    Num::U(v) => v as f64,
                    Num::F(v) => v,
                };
                match size {
                    4 => Ok(Value::F32(wide as f32)),
                    8 => Ok(Value::F64(wide)),
                    n => raise!(
                        ErrorKind::Unsupported,
                        "float{} values are not representable",
                        n * 8
                    ),
                }
            }
            FixString | StringPtr => {
                let text = print(src, PrintFlags::empty())?;
                if dtype == FixString {
                    ensure_or!(
                        text.len() <= size,
                        ErrorKind::Value,
                        "\"{text}\" does not fit in string{size}"
                    );
                }
                Ok(Value::Str(text))
            }
            _ => Err(cast_error(src, dtype, size)),
        };
    }

    match (src, dtype) {
        // String to number (or bool) parses; string to string re-checks the
        // destination capacity.
        (Value::Str(s), Bool | Int | UInt | Float | FixString | StringPtr | Blob) => {
            scan(s, dtype, size, PrintFlags::empty())
        }
        (Value::Blob(b), FixString | StringPtr) => {
            let text = hex::encode(b);
            if dtype == FixString {
                ensure_or!(
                    text.len() <= size,
                    ErrorKind::Value,
                    "\"{text}\" does not fit in string{size}"
                );
            }
            Ok(Value::Str(text))
        }
        _ => Err(cast_error(src, dtype, size)),
    }
}

/// N-dimensional strided cast.
///
/// Reads `src` through `src_strides` (element strides, one per dimension;
/// row-major contiguous when `None`) and produces a contiguous row-major
/// array of the destination type with the same `shape`.  Used when a
/// reader's array layout differs from the writer's.
pub fn ndcast(
    src: &[Value],
    shape: &[usize],
    src_strides: std::option::Option<&[usize]>,
    dtype: DataType,
    size: usize,
) -> Result<Vec<Value>> {
    let nmemb: usize = shape.iter().product();
    if shape.is_empty() || nmemb == 0 {
        return Ok(Vec::new());
    }

    let strides: Vec<usize> = match src_strides {
        Some(s) => {
            ensure_or!(
                s.len() == shape.len(),
                ErrorKind::Value,
                "stride rank {} does not match shape rank {}",
                s.len(),
                shape.len()
            );
            s.to_vec()
        }
        None => {
            // Row-major contiguous strides.
            let mut s = vec![1usize; shape.len()];
            for d in (0..shape.len() - 1).rev() {
                s[d] = s[d + 1] * shape[d + 1];
            }
            s
        }
    };

    let mut out = Vec::with_capacity(nmemb);
    let mut index = vec![0usize; shape.len()];
    loop {
        let offset: usize = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
        ensure_or!(
            offset < src.len(),
            ErrorKind::Index,
            "source index {offset} out of range ({} elements)",
            src.len()
        );
        out.push(copy_cast(&src[offset], dtype, size)?);

        // Advance the row-major multi-index.
        let mut d = shape.len();
        loop {
            if d == 0 {
                return Ok(out);
            }
            d -= 1;
            index[d] += 1;
            if index[d] < shape[d] {
                break;
            }
            index[d] = 0;
        }
    }
}
