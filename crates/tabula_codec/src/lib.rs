//! # Tabula Codec
//!
//! Attribute-value tree and serde-based codec for Tabula.
//!
//! Rows in a Tabula table are stored as trees of [`AttributeValue`]s. This
//! crate provides:
//! - The tagged [`AttributeValue`] union (string, number, binary, sets, map,
//!   list, null, bool)
//! - [`AttributePath`], a structural pointer into a tree (`"a"."b"[2]`) that
//!   can read, set and remove nested values
//! - [`AttributeEncoder`] / [`AttributeDecoder`] for converting any serde type
//!   to and from a tree
//!
//! ## Usage
//!
//! ```
//! use tabula_codec::{AttributeDecoder, AttributeEncoder, AttributeValue};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Account {
//!     name: String,
//!     balance: i64,
//! }
//!
//! let encoder = AttributeEncoder::new();
//! let decoder = AttributeDecoder::new();
//!
//! let account = Account { name: "alice".into(), balance: 10 };
//! let attributes = encoder.encode_attributes(&account).unwrap();
//! assert_eq!(attributes.get("balance"), Some(&AttributeValue::N("10".into())));
//!
//! let decoded: Account = decoder.decode_attributes(attributes).unwrap();
//! assert_eq!(decoded, account);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod path;
mod value;

pub use decoder::AttributeDecoder;
pub use encoder::AttributeEncoder;
pub use error::{CodecError, CodecResult};
pub use path::{AttributePath, PathSegment};
pub use value::{AttributeValue, Attributes};
