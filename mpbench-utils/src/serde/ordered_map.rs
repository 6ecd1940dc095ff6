//! Module that allows to (de-)serialize a list of key-value pairs as a map with `serde`, keeping
//! the insertion order of the keys in both directions.

use std::{fmt, marker::PhantomData};

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

/// Helper struct that allows (de-)serialization of an ordered list of pairs as this type.
///
/// Example:
/// ```ignore
/// serde_json::to_string_pretty(&OrderedMap::from(vec![("b", 1), ("a", 2)])).unwrap();
/// // {"b": 1, "a": 2}
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedMap<K, V>(
    #[serde(with = "crate::serde::ordered_map")]
    #[serde(bound(
        deserialize = "K: Deserialize<'de> + PartialEq, V: Deserialize<'de>",
        serialize = "K: Serialize, V: Serialize",
    ))]
    pub Vec<(K, V)>,
);

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<K, V> From<Vec<(K, V)>> for OrderedMap<K, V> {
    fn from(entries: Vec<(K, V)>) -> Self {
        Self(entries)
    }
}

impl<K, V> From<OrderedMap<K, V>> for Vec<(K, V)> {
    fn from(val: OrderedMap<K, V>) -> Self {
        val.0
    }
}

/// Serialize the pairs as a map, in the order of the list.
pub fn serialize<K: Serialize, V: Serialize, S: Serializer>(
    entries: &[(K, V)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (key, val) in entries {
        map.serialize_entry(key, val)?;
    }
    map.end()
}

/// Deserialize a map into a list of pairs, in the order of the document. A key that appears twice
/// keeps its first position and takes the last value.
pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<Vec<(K, V)>, D::Error>
where
    K: Deserialize<'de> + PartialEq,
    V: Deserialize<'de>,
    D: Deserializer<'de>,
{
    deserializer.deserialize_map(EntriesVisitor(PhantomData))
}

struct EntriesVisitor<K, V>(PhantomData<(K, V)>);

impl<'de, K, V> Visitor<'de> for EntriesVisitor<K, V>
where
    K: Deserialize<'de> + PartialEq,
    V: Deserialize<'de>,
{
    type Value = Vec<(K, V)>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries: Vec<(K, V)> = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, val)) = access.next_entry::<K, V>()? {
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = val,
                None => entries.push((key, val)),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let map = OrderedMap::from(vec![
            ("roundrobin".to_string(), 2),
            ("default".to_string(), 1),
            ("blest".to_string(), 3),
        ]);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"roundrobin":2,"default":1,"blest":3}"#);

        let back: OrderedMap<String, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn duplicate_key_last_value_wins() {
        let back: OrderedMap<String, u32> =
            serde_json::from_str(r#"{"a": 1, "b": 2, "a": 3}"#).unwrap();
        assert_eq!(back.0, vec![("a".to_string(), 3), ("b".to_string(), 2)]);
    }
}
