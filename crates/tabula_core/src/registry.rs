//! Row type registry for polymorphic decoding.
//!
//! A table following the single-table pattern stores several row shapes side
//! by side. A [`TypeRegistry`] maps each shape's `RowType` tag to a decode
//! function producing one variant of a closed result type, usually an enum
//! with one variant per shape.

use crate::error::{TableError, TableResult};
use crate::item::{row_type_of, RowType, TypedItem};
use std::collections::BTreeMap;
use std::fmt;
use tabula_codec::{AttributeDecoder, Attributes};

/// Decodes one stored item into a variant of `R`.
pub type DecodeFn<R> = dyn Fn(&AttributeDecoder, Attributes) -> TableResult<R> + Send + Sync;

/// A closed, build-once mapping from row type tags to decode functions.
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use tabula_core::{RowType, TypeRegistry, TypedItem};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Customer { name: String }
/// impl RowType for Customer { const ROW_TYPE: &'static str = "Customer"; }
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Order { total: u64 }
/// impl RowType for Order { const ROW_TYPE: &'static str = "Order"; }
///
/// enum Row {
///     Customer(TypedItem<Customer>),
///     Order(TypedItem<Order>),
/// }
///
/// let registry = TypeRegistry::builder()
///     .register::<Customer>(Row::Customer)
///     .register::<Order>(Row::Order)
///     .build();
/// assert_eq!(registry.len(), 2);
/// ```
pub struct TypeRegistry<R> {
    decoders: BTreeMap<&'static str, Box<DecodeFn<R>>>,
    single_variant_fallback: bool,
}

impl<R: 'static> TypeRegistry<R> {
    /// Starts building a registry.
    pub fn builder() -> TypeRegistryBuilder<R> {
        TypeRegistryBuilder {
            decoders: BTreeMap::new(),
            single_variant_fallback: false,
        }
    }

    /// Returns the decode function for a row type tag.
    ///
    /// Unknown tags fail with [`TableError::UnexpectedType`], unless the
    /// registry was built with the single-variant fallback and holds exactly
    /// one decode function, in which case that function is returned.
    pub fn resolve(&self, tag: &str) -> TableResult<&DecodeFn<R>> {
        if let Some(decode) = self.decoders.get(tag) {
            return Ok(decode.as_ref());
        }
        if self.single_variant_fallback && self.decoders.len() == 1 {
            if let Some(decode) = self.decoders.values().next() {
                return Ok(decode.as_ref());
            }
        }
        Err(TableError::UnexpectedType {
            provided: tag.to_string(),
        })
    }

    /// Decodes a stored item by its row type tag.
    pub fn decode(&self, decoder: &AttributeDecoder, attributes: Attributes) -> TableResult<R> {
        let decode = self.resolve(row_type_of(&attributes)?)?;
        decode(decoder, attributes)
    }

    /// Returns true if a tag is registered.
    pub fn contains(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    /// Returns the registered tags in sorted order.
    pub fn row_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    /// Returns the number of registered row types.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl<R> fmt::Debug for TypeRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("row_types", &self.decoders.keys().collect::<Vec<_>>())
            .field("single_variant_fallback", &self.single_variant_fallback)
            .finish()
    }
}

/// Builder for a [`TypeRegistry`].
pub struct TypeRegistryBuilder<R> {
    decoders: BTreeMap<&'static str, Box<DecodeFn<R>>>,
    single_variant_fallback: bool,
}

impl<R: 'static> TypeRegistryBuilder<R> {
    /// Registers row type `T`, wrapping decoded items with `wrap`.
    ///
    /// Registering the same tag again replaces the earlier entry.
    #[must_use]
    pub fn register<T: RowType>(mut self, wrap: fn(TypedItem<T>) -> R) -> Self {
        self.decoders.insert(
            T::ROW_TYPE,
            Box::new(move |decoder: &AttributeDecoder, attributes: Attributes| {
                TypedItem::<T>::decode_unchecked(decoder, attributes).map(wrap)
            }),
        );
        self
    }

    /// Decodes unknown tags with the sole registered function when exactly
    /// one row type is registered. Off by default.
    #[must_use]
    pub fn with_single_variant_fallback(mut self, enabled: bool) -> Self {
        self.single_variant_fallback = enabled;
        self
    }

    /// Finishes the registry.
    pub fn build(self) -> TypeRegistry<R> {
        TypeRegistry {
            decoders: self.decoders,
            single_variant_fallback: self.single_variant_fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{CompositePrimaryKey, ROW_TYPE};
    use serde::{Deserialize, Serialize};
    use tabula_codec::AttributeEncoder;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Customer {
        name: String,
    }

    impl RowType for Customer {
        const ROW_TYPE: &'static str = "Customer";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        total: u64,
    }

    impl RowType for Order {
        const ROW_TYPE: &'static str = "Order";
    }

    #[derive(Debug, PartialEq)]
    enum Row {
        Customer(TypedItem<Customer>),
        Order(TypedItem<Order>),
    }

    fn stored<T: RowType>(value: T) -> Attributes {
        TypedItem::new(CompositePrimaryKey::new("p", "s"), value)
            .encode(&AttributeEncoder::new())
            .unwrap()
    }

    fn registry() -> TypeRegistry<Row> {
        TypeRegistry::builder()
            .register::<Customer>(Row::Customer)
            .register::<Order>(Row::Order)
            .build()
    }

    #[test]
    fn decodes_by_tag() {
        let registry = registry();
        let decoder = AttributeDecoder::new();

        let row = registry.decode(&decoder, stored(Order { total: 7 })).unwrap();
        assert!(matches!(row, Row::Order(ref item) if item.row_value().total == 7));

        let row = registry
            .decode(&decoder, stored(Customer { name: "ada".into() }))
            .unwrap();
        assert!(matches!(row, Row::Customer(_)));
    }

    #[test]
    fn unknown_tag_is_unexpected_type() {
        let registry = registry();
        assert!(matches!(
            registry.resolve("Invoice"),
            Err(TableError::UnexpectedType { ref provided }) if provided == "Invoice"
        ));
    }

    #[test]
    fn single_variant_fallback_off_by_default() {
        let registry = TypeRegistry::builder()
            .register::<Customer>(Row::Customer)
            .build();
        let mut attributes = stored(Customer { name: "ada".into() });
        attributes.insert(ROW_TYPE.into(), "LegacyCustomer".into());

        let result = registry.decode(&AttributeDecoder::new(), attributes);
        assert!(matches!(result, Err(TableError::UnexpectedType { .. })));
    }

    #[test]
    fn single_variant_fallback_when_enabled() {
        let registry = TypeRegistry::builder()
            .register::<Customer>(Row::Customer)
            .with_single_variant_fallback(true)
            .build();
        let mut attributes = stored(Customer { name: "ada".into() });
        attributes.insert(ROW_TYPE.into(), "LegacyCustomer".into());

        let row = registry.decode(&AttributeDecoder::new(), attributes).unwrap();
        assert!(matches!(row, Row::Customer(ref item) if item.row_value().name == "ada"));
    }

    #[test]
    fn fallback_ignored_with_several_variants() {
        let registry = TypeRegistry::builder()
            .register::<Customer>(Row::Customer)
            .register::<Order>(Row::Order)
            .with_single_variant_fallback(true)
            .build();
        assert!(registry.resolve("LegacyCustomer").is_err());
    }

    #[test]
    fn lists_row_types() {
        let registry = registry();
        assert_eq!(registry.row_types().collect::<Vec<_>>(), vec!["Customer", "Order"]);
        assert!(registry.contains("Order"));
        assert!(!registry.is_empty());
    }
}
