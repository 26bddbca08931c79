use serde_json::Value;

/// The reserved fields a document may carry alongside its scalar
/// payload. Everything else in the JSON object is a user scalar and, if
/// integer-valued, gets mirrored into the filter index.
pub const FIELD_ID: &str = "id";
pub const FIELD_VECTORS: &str = "vectors";
pub const FIELD_INDEX_TYPE: &str = "indexType";

/// A stored record: the caller's JSON object, kept whole so `/query` can
/// hand it back unchanged.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Document(pub Value);

impl Document {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn id(&self) -> Option<u64> {
        self.0.get(FIELD_ID)?.as_u64()
    }

    pub fn vectors(&self) -> Option<Vec<f32>> {
        let arr = self.0.get(FIELD_VECTORS)?.as_array()?;
        arr.iter().map(|v| v.as_f64().map(|f| f as f32)).collect()
    }

    pub fn index_type(&self) -> Option<&str> {
        self.0.get(FIELD_INDEX_TYPE)?.as_str()
    }

    /// Every top-level field other than the reserved ones whose value is
    /// a JSON integer. These are the fields mirrored into the filter
    /// index on upsert.
    pub fn integer_fields(&self) -> Vec<(String, i64)> {
        let Some(obj) = self.0.as_object() else {
            return Vec::new();
        };
        obj.iter()
            .filter(|(k, _)| k.as_str() != FIELD_ID && k.as_str() != FIELD_VECTORS && k.as_str() != FIELD_INDEX_TYPE)
            .filter_map(|(k, v)| v.as_i64().map(|i| (k.clone(), i)))
            .collect()
    }

    pub fn integer_field(&self, field: &str) -> Option<i64> {
        self.0.get(field)?.as_i64()
    }
}
