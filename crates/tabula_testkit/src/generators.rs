//! Property-based test generators using proptest.

use crate::fixtures::Account;
use proptest::prelude::*;
use tabula_codec::{AttributeValue, Attributes};

/// Strategy for attribute names that never collide with reserved names.
pub fn attribute_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}"
}

/// Strategy for scalar attribute values.
pub fn scalar_value_strategy() -> impl Strategy<Value = AttributeValue> {
    prop_oneof![
        "[a-zA-Z0-9 ']{0,12}".prop_map(AttributeValue::S),
        any::<i32>().prop_map(|n| AttributeValue::N(n.to_string())),
        any::<bool>().prop_map(AttributeValue::Bool),
        Just(AttributeValue::Null),
    ]
}

/// Strategy for nested attribute values, up to three levels deep.
pub fn attribute_value_strategy() -> impl Strategy<Value = AttributeValue> {
    scalar_value_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(AttributeValue::L),
            prop::collection::btree_map(attribute_name_strategy(), inner, 0..4)
                .prop_map(|map| AttributeValue::M(map.into_iter().collect())),
        ]
    })
}

/// Strategy for top-level attribute maps.
pub fn attributes_strategy() -> impl Strategy<Value = Attributes> {
    prop::collection::btree_map(attribute_name_strategy(), attribute_value_strategy(), 0..6)
        .prop_map(|map| map.into_iter().collect())
}

/// Strategy for account values.
pub fn account_strategy() -> impl Strategy<Value = Account> {
    (
        "[a-z]{1,8}",
        any::<i64>(),
        prop::collection::vec("[a-z]{1,5}", 0..4),
    )
        .prop_map(|(owner, balance, tags)| Account {
            owner,
            balance,
            tags,
        })
}
