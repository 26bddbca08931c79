//! Dimension is a startup-configured runtime value in this system, not a
//! compile-time one, so vectors are plain `Vec<f32>` rather than
//! `[f32; N]`. We keep the raw-byte view used elsewhere for storage and
//! WAL/snapshot framing.

/// Reinterprets a vector's coordinates as a byte slice, for writing
/// straight into segment storage.
pub fn as_bytes(v: &[f32]) -> &[u8] {
    unsafe { std::slice::from_raw_parts(v.as_ptr().cast::<u8>(), std::mem::size_of_val(v)) }
}

/// Reinterprets a byte slice as `f32` coordinates.
///
/// # Panics
///
/// Panics if `bytes` is not a whole number of `f32`s or is misaligned.
pub fn from_bytes(bytes: &[u8]) -> &[f32] {
    let width = std::mem::size_of::<f32>();
    assert_eq!(bytes.len() % width, 0, "byte slice is not a whole number of f32 coordinates");
    assert_eq!(
        bytes.as_ptr().align_offset(std::mem::align_of::<f32>()),
        0,
        "misaligned byte slice; use aligned storage"
    );
    unsafe { std::slice::from_raw_parts(bytes.as_ptr().cast::<f32>(), bytes.len() / width) }
}

/// Euclidean / inner-product / cosine style distance functions over
/// runtime-dimension `f32` vectors. Smaller is always "closer" so search
/// results can be sorted ascending regardless of which metric is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MetricKind {
    L2,
    InnerProduct,
}

impl MetricKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "L2" | "EUCLIDEAN" => Some(Self::L2),
            "IP" | "INNER_PRODUCT" | "INNERPRODUCT" => Some(Self::InnerProduct),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::L2 => "L2",
            Self::InnerProduct => "IP",
        }
    }

    /// Distance between `a` and `b`. Callers must ensure both slices have
    /// the same length; this is checked once at the call boundary
    /// (`VectorIndex::insert`/`search`), not on every distance call.
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => l2_sq(a, b),
            // Negated so "smaller is closer" still holds: the nearest
            // neighbor under inner product is the one with the largest
            // dot product.
            Self::InnerProduct => -dot(a, b),
        }
    }
}

#[inline]
fn l2_sq(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_distance_matches_hand_computation() {
        let a = [1.0_f32, 2.0, 3.0];
        let b = [4.0_f32, 5.0, 6.0];
        let dist = MetricKind::L2.distance(&a, &b);
        assert!((dist - 27.0).abs() < f32::EPSILON);
    }

    #[test]
    fn inner_product_prefers_larger_dot_as_closer() {
        let q = [1.0_f32, 0.0];
        let close = [1.0_f32, 0.0];
        let far = [-1.0_f32, 0.0];
        assert!(MetricKind::InnerProduct.distance(&q, &close) < MetricKind::InnerProduct.distance(&q, &far));
    }

    #[test]
    fn byte_round_trip_preserves_coordinates() {
        let v = vec![1.5_f32, -2.25, 3.0];
        let bytes = as_bytes(&v).to_vec();
        let back = from_bytes(&bytes);
        assert_eq!(back, v.as_slice());
    }
}
