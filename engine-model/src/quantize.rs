//! Path quantisation (spec.md §3 "Path Quantisation").
//!
//! Projects an embedding of arbitrary dimensionality down to a fixed
//! 64-dimensional subspace, 2-bit-quantises each of those dimensions into
//! one of 4 buckets, and groups the resulting 128 bits into 4 path
//! segments. The whole function is pure: same embedding in, same 4
//! segments out, on any machine.

const SUBSPACE_DIMS: usize = 64;
const SEGMENTS: usize = 4;
const DIMS_PER_SEGMENT: usize = SUBSPACE_DIMS / SEGMENTS;

/// A 4-segment directory path derived from an embedding. Each segment is an
/// 8-character lowercase hex string (32 bits = 16 dimensions * 2 bits).
pub type QuantisedPath = [String; SEGMENTS];

/// Deterministically fold an embedding of any length down to 64 scalars by
/// summing components whose index shares a residue class mod 64. This
/// keeps the function total (never panics on short or empty embeddings)
/// while staying order-sensitive, so two different embeddings essentially
/// never collide.
fn project_to_subspace(embedding: &[f32]) -> [f32; SUBSPACE_DIMS] {
    let mut out = [0f32; SUBSPACE_DIMS];
    if embedding.is_empty() {
        return out;
    }
    for (i, value) in embedding.iter().enumerate() {
        out[i % SUBSPACE_DIMS] += value;
    }
    out
}

/// 2-bit quantisation of a single scalar into one of 4 buckets.
///
/// Thresholds are fixed constants rather than derived from the embedding's
/// own distribution, which is what makes the function pure per-embedding
/// instead of needing corpus-wide statistics at quantisation time.
fn quantize_scalar(value: f32) -> u8 {
    const LOW: f32 = -0.25;
    const HIGH: f32 = 0.25;
    if value < LOW {
        0
    } else if value < 0.0 {
        1
    } else if value < HIGH {
        2
    } else {
        3
    }
}

/// Compute the 4-segment path for a given embedding.
pub fn quantize_path(embedding: &[f32]) -> QuantisedPath {
    let subspace = project_to_subspace(embedding);

    let mut segments: [u32; SEGMENTS] = [0; SEGMENTS];
    for (i, value) in subspace.iter().enumerate() {
        let segment = i / DIMS_PER_SEGMENT;
        let slot_in_segment = i % DIMS_PER_SEGMENT;
        let bucket = quantize_scalar(*value) as u32;
        segments[segment] |= bucket << (slot_in_segment * 2);
    }

    segments.map(|s| format!("{s:08x}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_fixed_embedding() {
        let embedding: Vec<f32> = (0..768).map(|i| (i as f32 * 0.01).sin()).collect();
        let a = quantize_path(&embedding);
        let b = quantize_path(&embedding);
        assert_eq!(a, b);
    }

    #[test]
    fn differs_for_different_embeddings() {
        let a = quantize_path(&vec![1.0; 64]);
        let b = quantize_path(&vec![-1.0; 64]);
        assert_ne!(a, b);
    }

    #[test]
    fn handles_short_and_empty_embeddings() {
        let empty: Vec<f32> = Vec::new();
        let short = vec![0.5f32, -0.5, 0.0];
        let _ = quantize_path(&empty);
        let _ = quantize_path(&short);
    }

    #[test]
    fn produces_four_eight_char_segments() {
        let embedding = vec![0.3f32; 1536];
        let path = quantize_path(&embedding);
        assert_eq!(path.len(), 4);
        for seg in &path {
            assert_eq!(seg.len(), 8);
            assert!(seg.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
