//! Cache value encoding for entity results.

use crate::entity::{Entity, EntityResult, Value};
use crate::error::CacheError;

/// Serialize an entity result for storage in a cache slot.
///
/// Entities holding a NaN or infinite double are refused: JSON has no form
/// for them that decodes back.
pub fn encode_entity_result(result: &EntityResult) -> Result<Vec<u8>, CacheError> {
    if !is_json_safe(&result.entity) {
        return Err(CacheError::Serialization {
            reason: "non-finite double property".to_string(),
        });
    }
    serde_json::to_vec(result).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })
}

/// Parse a cache slot. Corrupt or foreign bytes yield `None`.
pub fn decode_entity_result(bytes: &[u8]) -> Option<EntityResult> {
    serde_json::from_slice(bytes).ok()
}

fn is_json_safe(entity: &Entity) -> bool {
    entity.properties.values().all(value_is_json_safe)
}

fn value_is_json_safe(value: &Value) -> bool {
    match value {
        Value::Double(d) => d.is_finite(),
        Value::Array(values) => values.iter().all(value_is_json_safe),
        Value::Entity(entity) => is_json_safe(entity),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;

    #[test]
    fn test_encoded_result_decodes_to_same_value() {
        let result = EntityResult::new(
            Entity::new(Key::name("Task", "a").with_namespace("ns"))
                .with("title", "x")
                .with("score", 1.5)
                .with("tags", Value::Array(vec![Value::from("a"), Value::Null])),
        )
        .with_version(12);

        let bytes = encode_entity_result(&result).unwrap();
        assert_eq!(decode_entity_result(&bytes), Some(result));
    }

    #[test]
    fn test_corrupt_bytes_decode_to_none() {
        assert_eq!(decode_entity_result(b"\x00\x01not json"), None);
        assert_eq!(decode_entity_result(b""), None);
        assert_eq!(decode_entity_result(b"{\"unexpected\":true}"), None);
    }

    #[test]
    fn test_non_finite_doubles_are_refused() {
        let key = Key::id("Task", 1);
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let flat = EntityResult::new(Entity::new(key.clone()).with("score", bad));
            assert!(matches!(
                encode_entity_result(&flat),
                Err(CacheError::Serialization { .. })
            ));

            let nested = Entity::new(key.clone()).with(
                "inner",
                Value::Array(vec![Value::Entity(Box::new(Entity::default().with("x", bad)))]),
            );
            assert!(encode_entity_result(&EntityResult::new(nested)).is_err());
        }
    }
}
