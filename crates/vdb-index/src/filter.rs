use std::collections::BTreeMap;

use base64::Engine;
use dashmap::DashMap;
use roaring::RoaringBitmap;
use vdb_core::FilterOp;

/// `fieldname -> value -> bitmap of ids`. An inner `BTreeMap` (rather
/// than a hash map) so iterating every value under a field for
/// `NOT_EQUAL` is deterministic.
pub struct FilterIndex {
    fields: DashMap<String, BTreeMap<i64, RoaringBitmap>>,
}

impl Default for FilterIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterIndex {
    pub fn new() -> Self {
        Self { fields: DashMap::new() }
    }

    /// Clears any existing membership for `id` under `old_value` (if
    /// given) and sets membership under `new_value`, creating the
    /// field/value bitmap lazily. Leaves a now-empty old bitmap in place
    /// rather than deleting the map entry — harmless, and cheaper than
    /// pruning on every update.
    pub fn update(&self, field: &str, old_value: Option<i64>, new_value: i64, id: u32) {
        let mut values = self.fields.entry(field.to_string()).or_default();
        if let Some(old) = old_value {
            if let Some(bitmap) = values.get_mut(&old) {
                bitmap.remove(id);
            }
        }
        values.entry(new_value).or_default().insert(id);
    }

    /// ORs the bitmap(s) matching `op`/`value` under `field` into
    /// `out`. A missing field is a silent no-op: `out` is left
    /// untouched, yielding an empty result rather than an error.
    pub fn query(&self, field: &str, op: FilterOp, value: i64, out: &mut RoaringBitmap) {
        let Some(values) = self.fields.get(field) else {
            return;
        };
        match op {
            FilterOp::Equal => {
                if let Some(bitmap) = values.get(&value) {
                    *out |= bitmap;
                }
            }
            FilterOp::NotEqual => {
                for (k, bitmap) in values.iter() {
                    if *k != value {
                        *out |= bitmap;
                    }
                }
            }
        }
    }

    pub fn remove_id(&self, field: &str, value: i64, id: u32) {
        if let Some(mut values) = self.fields.get_mut(field) {
            if let Some(bitmap) = values.get_mut(&value) {
                bitmap.remove(id);
            }
        }
    }

    /// `field|value|<base64 portable-bitmap-bytes>` per line. The
    /// portable roaring format can contain arbitrary bytes including
    /// newlines; base64-encoding keeps the line-oriented text format
    /// genuinely safe to read back line by line.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for entry in self.fields.iter() {
            let field = entry.key();
            for (value, bitmap) in entry.value() {
                let mut buf = Vec::new();
                if bitmap.serialize_into(&mut buf).is_err() {
                    continue;
                }
                let encoded = base64::engine::general_purpose::STANDARD.encode(&buf);
                out.push_str(field);
                out.push('|');
                out.push_str(&value.to_string());
                out.push('|');
                out.push_str(&encoded);
                out.push('\n');
            }
        }
        out
    }

    pub fn deserialize(data: &str) -> Self {
        let index = Self::new();
        for line in data.lines() {
            let mut parts = line.splitn(3, '|');
            let (Some(field), Some(value_str), Some(encoded)) = (parts.next(), parts.next(), parts.next()) else {
                continue;
            };
            let Ok(value) = value_str.parse::<i64>() else { continue };
            let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(encoded) else { continue };
            let Ok(bitmap) = RoaringBitmap::deserialize_from(&bytes[..]) else { continue };
            index.fields.entry(field.to_string()).or_default().insert(value, bitmap);
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_returns_only_matching_bitmap() {
        let idx = FilterIndex::new();
        idx.update("category", None, 7, 1);
        idx.update("category", None, 8, 2);
        let mut out = RoaringBitmap::new();
        idx.query("category", FilterOp::Equal, 7, &mut out);
        assert!(out.contains(1));
        assert!(!out.contains(2));
    }

    #[test]
    fn not_equal_ors_every_other_bitmap() {
        let idx = FilterIndex::new();
        idx.update("category", None, 7, 1);
        idx.update("category", None, 8, 2);
        idx.update("category", None, 9, 3);
        let mut out = RoaringBitmap::new();
        idx.query("category", FilterOp::NotEqual, 7, &mut out);
        assert!(!out.contains(1));
        assert!(out.contains(2));
        assert!(out.contains(3));
    }

    #[test]
    fn update_moves_id_between_value_buckets() {
        let idx = FilterIndex::new();
        idx.update("category", None, 7, 1);
        idx.update("category", Some(7), 8, 1);
        let mut out7 = RoaringBitmap::new();
        idx.query("category", FilterOp::Equal, 7, &mut out7);
        assert!(!out7.contains(1));
        let mut out8 = RoaringBitmap::new();
        idx.query("category", FilterOp::Equal, 8, &mut out8);
        assert!(out8.contains(1));
    }

    #[test]
    fn missing_field_yields_empty_not_an_error() {
        let idx = FilterIndex::new();
        let mut out = RoaringBitmap::new();
        idx.query("nonexistent", FilterOp::Equal, 1, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn serialize_round_trips_through_base64_lines() {
        let idx = FilterIndex::new();
        idx.update("category", None, 7, 1);
        idx.update("category", None, 8, 2);
        let text = idx.serialize();
        let restored = FilterIndex::deserialize(&text);
        let mut out = RoaringBitmap::new();
        restored.query("category", FilterOp::Equal, 7, &mut out);
        assert!(out.contains(1));
    }
}
