//! Keys, row metadata and typed items.
//!
//! A stored item is a flat attribute map. The reserved attributes are:
//!
//! | Attribute         | Value                                 |
//! |-------------------|---------------------------------------|
//! | `PK`              | partition key                         |
//! | `SK`              | sort key                              |
//! | `CreateDate`      | RFC 3339 timestamp, set once          |
//! | `RowType`         | row type tag                          |
//! | `RowVersion`      | number, starts at 1                   |
//! | `LastUpdatedDate` | RFC 3339 timestamp                    |
//! | `ExpireDate`      | epoch seconds, only when a TTL is set |
//!
//! The row value's own attributes sit next to them at the top level.

use crate::error::{TableError, TableResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tabula_codec::{AttributeDecoder, AttributeEncoder, AttributeValue, Attributes, CodecError};

/// Partition key attribute name.
pub const PARTITION_KEY: &str = "PK";
/// Sort key attribute name.
pub const SORT_KEY: &str = "SK";
/// Creation timestamp attribute name.
pub const CREATE_DATE: &str = "CreateDate";
/// Row type tag attribute name.
pub const ROW_TYPE: &str = "RowType";
/// Row version attribute name.
pub const ROW_VERSION: &str = "RowVersion";
/// Last update timestamp attribute name.
pub const LAST_UPDATED_DATE: &str = "LastUpdatedDate";
/// Expiry attribute name.
pub const EXPIRE_DATE: &str = "ExpireDate";

/// Attribute names a row value may not use.
pub const RESERVED_ATTRIBUTES: [&str; 7] = [
    PARTITION_KEY,
    SORT_KEY,
    CREATE_DATE,
    ROW_TYPE,
    ROW_VERSION,
    LAST_UPDATED_DATE,
    EXPIRE_DATE,
];

/// Identity of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositePrimaryKey {
    /// Partition key.
    pub partition_key: String,
    /// Sort key.
    pub sort_key: String,
}

impl CompositePrimaryKey {
    /// Creates a key.
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }

    /// Returns the key as an attribute map.
    pub fn to_attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(PARTITION_KEY.into(), self.partition_key.as_str().into());
        attributes.insert(SORT_KEY.into(), self.sort_key.as_str().into());
        attributes
    }

    /// Reads the key attributes of a stored item.
    pub fn from_attributes(attributes: &Attributes) -> TableResult<Self> {
        Ok(Self {
            partition_key: required_string(attributes, PARTITION_KEY)?.to_string(),
            sort_key: required_string(attributes, SORT_KEY)?.to_string(),
        })
    }
}

impl fmt::Display for CompositePrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.partition_key, self.sort_key)
    }
}

/// Version and last-update metadata of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowStatus {
    /// Starts at 1; grows by exactly 1 per successful update.
    pub row_version: u64,
    /// Time of the last write.
    pub last_updated_date: DateTime<Utc>,
}

/// Expiry of a row, in seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeToLive {
    /// Expiry time in epoch seconds.
    pub expire_at: i64,
}

impl TimeToLive {
    /// Creates a TTL expiring at `expire_at` epoch seconds.
    pub fn new(expire_at: i64) -> Self {
        Self { expire_at }
    }

    /// Creates a TTL expiring at a timestamp.
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            expire_at: time.timestamp(),
        }
    }
}

/// A row value shape stored in a table.
///
/// `ROW_TYPE` is the tag stored in the `RowType` attribute; every shape
/// sharing a table must use a distinct tag.
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use tabula_core::RowType;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Customer {
///     name: String,
/// }
///
/// impl RowType for Customer {
///     const ROW_TYPE: &'static str = "Customer";
/// }
/// ```
pub trait RowType: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Tag stored in the `RowType` attribute.
    const ROW_TYPE: &'static str;
}

/// An immutable row of type `T` with its key and metadata.
///
/// Items are never modified in place. [`TypedItem::create_updated_item`]
/// derives the next version from an existing one. `create_date` together
/// with the row version forms the concurrency token: a row deleted and
/// re-inserted gets a new `create_date`, so a stale copy never matches it.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedItem<T> {
    key: CompositePrimaryKey,
    create_date: DateTime<Utc>,
    row_status: RowStatus,
    row_value: T,
    time_to_live: Option<TimeToLive>,
}

impl<T: RowType> TypedItem<T> {
    /// Creates a first-version item stamped with the current time.
    pub fn new(key: CompositePrimaryKey, row_value: T) -> Self {
        Self::new_at(key, row_value, Utc::now())
    }

    /// Creates a first-version item stamped with `now`.
    pub fn new_at(key: CompositePrimaryKey, row_value: T, now: DateTime<Utc>) -> Self {
        Self {
            key,
            create_date: now,
            row_status: RowStatus {
                row_version: 1,
                last_updated_date: now,
            },
            row_value,
            time_to_live: None,
        }
    }

    /// Sets the expiry of a new item.
    #[must_use]
    pub fn with_time_to_live(mut self, time_to_live: TimeToLive) -> Self {
        self.time_to_live = Some(time_to_live);
        self
    }

    /// Derives the next version of this item with a new value.
    ///
    /// The key, create date and TTL carry over; the version grows by one.
    pub fn create_updated_item(&self, row_value: T) -> Self {
        self.create_updated_item_at(row_value, Utc::now())
    }

    /// Like [`TypedItem::create_updated_item`], stamped with `now`.
    pub fn create_updated_item_at(&self, row_value: T, now: DateTime<Utc>) -> Self {
        Self {
            key: self.key.clone(),
            create_date: self.create_date,
            row_status: RowStatus {
                row_version: self.row_status.row_version + 1,
                last_updated_date: now,
            },
            row_value,
            time_to_live: self.time_to_live,
        }
    }

    /// Like [`TypedItem::create_updated_item`], replacing the TTL.
    pub fn create_updated_item_with_time_to_live(
        &self,
        row_value: T,
        time_to_live: Option<TimeToLive>,
    ) -> Self {
        Self {
            time_to_live,
            ..self.create_updated_item(row_value)
        }
    }

    /// Encodes this item into its stored attribute map.
    pub fn encode(&self, encoder: &AttributeEncoder) -> TableResult<Attributes> {
        let value = encoder.encode_attributes(&self.row_value)?;
        if let Some(name) = RESERVED_ATTRIBUTES.iter().find(|n| value.contains_key(**n)) {
            return Err(CodecError::encoding_failed(format!(
                "row type {} uses reserved attribute {name}",
                T::ROW_TYPE
            ))
            .into());
        }

        let mut attributes = self.key.to_attributes();
        attributes.insert(CREATE_DATE.into(), format_date(&self.create_date).into());
        attributes.insert(ROW_TYPE.into(), T::ROW_TYPE.into());
        attributes.insert(
            ROW_VERSION.into(),
            AttributeValue::from(self.row_status.row_version),
        );
        attributes.insert(
            LAST_UPDATED_DATE.into(),
            format_date(&self.row_status.last_updated_date).into(),
        );
        if let Some(ttl) = self.time_to_live {
            attributes.insert(EXPIRE_DATE.into(), AttributeValue::from(ttl.expire_at));
        }
        attributes.extend(value);
        Ok(attributes)
    }

    /// Decodes a stored attribute map.
    ///
    /// Fails with [`TableError::TypeMismatch`] if the stored row type tag is
    /// not `T::ROW_TYPE`.
    pub fn decode(decoder: &AttributeDecoder, attributes: Attributes) -> TableResult<Self> {
        let provided = row_type_of(&attributes)?;
        if provided != T::ROW_TYPE {
            return Err(TableError::TypeMismatch {
                expected: T::ROW_TYPE.to_string(),
                provided: provided.to_string(),
            });
        }
        Self::decode_unchecked(decoder, attributes)
    }

    /// Decodes a stored attribute map without checking its row type tag.
    pub(crate) fn decode_unchecked(
        decoder: &AttributeDecoder,
        mut attributes: Attributes,
    ) -> TableResult<Self> {
        let key = CompositePrimaryKey::from_attributes(&attributes)?;
        let create_date = parse_date(required_string(&attributes, CREATE_DATE)?)?;
        let row_version = attributes
            .get(ROW_VERSION)
            .and_then(AttributeValue::as_u64)
            .ok_or_else(|| missing(ROW_VERSION))?;
        let last_updated_date = parse_date(required_string(&attributes, LAST_UPDATED_DATE)?)?;
        let time_to_live = match attributes.get(EXPIRE_DATE) {
            Some(value) => Some(TimeToLive::new(
                value.as_i64().ok_or_else(|| missing(EXPIRE_DATE))?,
            )),
            None => None,
        };

        for name in RESERVED_ATTRIBUTES {
            attributes.remove(name);
        }
        let row_value = decoder.decode_attributes(attributes)?;

        Ok(Self {
            key,
            create_date,
            row_status: RowStatus {
                row_version,
                last_updated_date,
            },
            row_value,
            time_to_live,
        })
    }
}

impl<T> TypedItem<T> {
    /// Returns the key.
    pub fn key(&self) -> &CompositePrimaryKey {
        &self.key
    }

    /// Returns the creation time.
    pub fn create_date(&self) -> DateTime<Utc> {
        self.create_date
    }

    /// Returns the version metadata.
    pub fn row_status(&self) -> &RowStatus {
        &self.row_status
    }

    /// Returns the row version.
    pub fn row_version(&self) -> u64 {
        self.row_status.row_version
    }

    /// Returns the row value.
    pub fn row_value(&self) -> &T {
        &self.row_value
    }

    /// Consumes the item, returning the row value.
    pub fn into_row_value(self) -> T {
        self.row_value
    }

    /// Returns the expiry, if any.
    pub fn time_to_live(&self) -> Option<TimeToLive> {
        self.time_to_live
    }
}

/// Returns the row type tag of a stored item.
pub fn row_type_of(attributes: &Attributes) -> TableResult<&str> {
    attributes
        .get(ROW_TYPE)
        .and_then(AttributeValue::as_s)
        .ok_or_else(|| missing(ROW_TYPE))
}

pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_date(text: &str) -> TableResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| CodecError::decoding_failed(format!("invalid timestamp {text}: {e}")).into())
}

fn required_string<'a>(attributes: &'a Attributes, name: &str) -> TableResult<&'a str> {
    attributes
        .get(name)
        .and_then(AttributeValue::as_s)
        .ok_or_else(|| missing(name))
}

fn missing(name: &str) -> TableError {
    TableError::unexpected_response(format!("stored item has no valid {name} attribute"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pinned: Option<bool>,
    }

    impl RowType for Note {
        const ROW_TYPE: &'static str = "Note";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sneaky {
        #[serde(rename = "RowVersion")]
        version: u64,
    }

    impl RowType for Sneaky {
        const ROW_TYPE: &'static str = "Sneaky";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Other {
        text: String,
    }

    impl RowType for Other {
        const ROW_TYPE: &'static str = "Other";
    }

    fn note(text: &str) -> Note {
        Note {
            text: text.into(),
            pinned: None,
        }
    }

    fn instant(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn new_item_starts_at_version_one() {
        let item = TypedItem::new_at(CompositePrimaryKey::new("p", "s"), note("a"), instant(0));
        assert_eq!(item.row_version(), 1);
        assert_eq!(item.create_date(), instant(0));
        assert_eq!(item.row_status().last_updated_date, instant(0));
    }

    #[test]
    fn updated_item_bumps_version_and_keeps_create_date() {
        let item = TypedItem::new_at(CompositePrimaryKey::new("p", "s"), note("a"), instant(0))
            .with_time_to_live(TimeToLive::new(42));
        let updated = item.create_updated_item_at(note("b"), instant(5));

        assert_eq!(updated.row_version(), 2);
        assert_eq!(updated.create_date(), instant(0));
        assert_eq!(updated.row_status().last_updated_date, instant(5));
        assert_eq!(updated.time_to_live(), Some(TimeToLive::new(42)));
        assert_eq!(updated.row_value(), &note("b"));
        assert_eq!(item.row_version(), 1);

        let cleared = item.create_updated_item_with_time_to_live(note("c"), None);
        assert_eq!(cleared.time_to_live(), None);
    }

    #[test]
    fn encoded_layout_is_flat() {
        let item = TypedItem::new_at(CompositePrimaryKey::new("p", "s"), note("hi"), instant(0))
            .with_time_to_live(TimeToLive::new(99));
        let attributes = item.encode(&AttributeEncoder::new()).unwrap();

        assert_eq!(attributes.get(PARTITION_KEY), Some(&"p".into()));
        assert_eq!(attributes.get(SORT_KEY), Some(&"s".into()));
        assert_eq!(attributes.get(ROW_TYPE), Some(&"Note".into()));
        assert_eq!(attributes.get(ROW_VERSION), Some(&AttributeValue::from(1u64)));
        assert_eq!(attributes.get(EXPIRE_DATE), Some(&AttributeValue::from(99i64)));
        assert_eq!(attributes.get("text"), Some(&"hi".into()));
        assert!(!attributes.contains_key("pinned"));
    }

    #[test]
    fn decode_round_trip() {
        let item = TypedItem::new_at(CompositePrimaryKey::new("p", "s"), note("hi"), instant(3))
            .create_updated_item_at(note("there"), instant(7));
        let attributes = item.encode(&AttributeEncoder::new()).unwrap();
        let decoded = TypedItem::<Note>::decode(&AttributeDecoder::new(), attributes).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn decode_rejects_other_row_type() {
        let item = TypedItem::new(CompositePrimaryKey::new("p", "s"), note("hi"));
        let attributes = item.encode(&AttributeEncoder::new()).unwrap();
        let result = TypedItem::<Other>::decode(&AttributeDecoder::new(), attributes);
        assert!(matches!(
            result,
            Err(TableError::TypeMismatch { ref expected, ref provided })
                if expected == "Other" && provided == "Note"
        ));
    }

    #[test]
    fn reserved_attribute_rejected() {
        let item = TypedItem::new(CompositePrimaryKey::new("p", "s"), Sneaky { version: 9 });
        let result = item.encode(&AttributeEncoder::new());
        assert!(matches!(result, Err(TableError::Codec(_))));
    }

    #[test]
    fn key_display_and_attributes() {
        let key = CompositePrimaryKey::new("p1", "s1");
        assert_eq!(key.to_string(), "(p1, s1)");
        let back = CompositePrimaryKey::from_attributes(&key.to_attributes()).unwrap();
        assert_eq!(back, key);
    }
}
