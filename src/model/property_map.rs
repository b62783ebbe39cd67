//! PropertyMap — the key-value store on nodes and relations.

use std::collections::BTreeMap;
use super::Value;

/// A map of property names to values.
///
/// Ordered (`BTreeMap`) so that serialized patches and events are stable
/// across runs — the replay invariant depends on it.
pub type PropertyMap = BTreeMap<String, Value>;

/// Convert a vec of (key, value) pairs into a map value.
impl<K, V> From<Vec<(K, V)>> for Value
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from(pairs: Vec<(K, V)>) -> Self {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
