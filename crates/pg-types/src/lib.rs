//! # pg-types
//!
//! PostgreSQL to Rust type mappings and conversions.
//!
//! Values travel in the text format in both directions: parameters are
//! rendered with [`SqlValue::to_text`] and result columns are parsed by
//! [`decode_text`] using the column's type OID.
//!
//! ## Type Mappings
//!
//! | PostgreSQL Type | OID | Rust Type |
//! |-----------------|-----|-----------|
//! | `bool` | 16 | `bool` |
//! | `int2` | 21 | `i16` |
//! | `int4` | 23 | `i32` |
//! | `int8` | 20 | `i64` |
//! | `float4` | 700 | `f32` |
//! | `float8` | 701 | `f64` |
//! | `text`/`varchar`/`bpchar`/`name` | 25/1043/1042/19 | `String` |
//! | `bytea` | 17 | `Vec<u8>` / `Bytes` |
//!
//! Any other type decodes to its text representation.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod decode;
pub mod encode;
pub mod error;
pub mod from_sql;
pub mod oid;
pub mod to_sql;
pub mod value;

pub use decode::decode_text;
pub use error::TypeError;
pub use from_sql::FromSql;
pub use to_sql::ToSql;
pub use value::SqlValue;
