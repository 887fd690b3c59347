//! Dense index artifact format and brute-force similarity search.
//!
//! The index file stores one vector per chunk, in the same order as the
//! metadata file's `[id, text]` pairs. Layout, all little-endian:
//!
//! ```text
//! b"FOLIOVEC"          magic
//! u32 version          currently 1
//! u32 dims
//! u32 count
//! u32 model_len
//! [u8; model_len]      embedding model name (UTF-8)
//! [f32; count * dims]  vectors, row-major
//! ```
//!
//! The model name lets the server refuse an index built with a different
//! embedding model than the one it is configured to query with.

use anyhow::{bail, Context, Result};

const MAGIC: &[u8; 8] = b"FOLIOVEC";
const VERSION: u32 = 1;

/// Vectors for every chunk plus the model that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseIndex {
    pub model: String,
    pub dims: usize,
    vectors: Vec<Vec<f32>>,
}

impl DenseIndex {
    /// Creates an index, checking every vector has `dims` components.
    pub fn new(model: impl Into<String>, dims: usize, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if dims == 0 {
            bail!("index dims must be > 0");
        }
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
            bail!("vector {} has {} dims, expected {}", i, v.len(), dims);
        }
        Ok(Self {
            model: model.into(),
            dims,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Serializes the index into the on-disk layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let model = self.model.as_bytes();
        let mut bytes = Vec::with_capacity(24 + model.len() + self.len() * self.dims * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dims as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(model.len() as u32).to_le_bytes());
        bytes.extend_from_slice(model);
        for v in &self.vectors {
            bytes.extend_from_slice(&vec_to_blob(v));
        }
        bytes
    }

    /// Parses the on-disk layout, rejecting truncated or foreign files.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader { bytes, pos: 0 };

        if reader.take(MAGIC.len())? != MAGIC {
            bail!("not a folio vector index (bad magic)");
        }
        let version = reader.u32()?;
        if version != VERSION {
            bail!("unsupported index version {} (expected {})", version, VERSION);
        }
        let dims = reader.u32()? as usize;
        let count = reader.u32()? as usize;
        let model_len = reader.u32()? as usize;
        let model = std::str::from_utf8(reader.take(model_len)?)
            .context("index model name is not UTF-8")?
            .to_string();

        let body = reader.take(count.saturating_mul(dims).saturating_mul(4))?;
        if reader.pos != bytes.len() {
            bail!("index has {} trailing bytes", bytes.len() - reader.pos);
        }

        let vectors = if dims == 0 {
            Vec::new()
        } else {
            body.chunks_exact(dims * 4).map(blob_to_vec).collect()
        };
        Self::new(model, dims, vectors)
    }

    /// Returns `(position, score)` for the `k` most similar vectors.
    ///
    /// Scores are cosine similarities, highest first. Equal scores keep
    /// index order.
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();

        // Stable sort keeps index order among ties.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .with_context(|| format!("index truncated at byte {}", self.pos))?;
        let bytes = self.bytes;
        let slice = &bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

/// Encodes a vector as little-endian `f32` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decodes little-endian `f32` bytes. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, zero or
/// mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> DenseIndex {
        DenseIndex::new(
            "test-model",
            3,
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![1.0, 0.0, 0.0],
                vec![0.7, 0.7, 0.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_bytes_roundtrip() {
        let idx = index();
        let restored = DenseIndex::from_bytes(&idx.to_bytes()).unwrap();
        assert_eq!(restored, idx);
        assert_eq!(restored.model, "test-model");
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = index().to_bytes();
        bytes[0] = b'X';
        let err = DenseIndex::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_rejects_truncation_and_trailing_bytes() {
        let bytes = index().to_bytes();
        assert!(DenseIndex::from_bytes(&bytes[..bytes.len() - 2]).is_err());
        let mut longer = bytes.clone();
        longer.push(0);
        assert!(DenseIndex::from_bytes(&longer).is_err());
        assert!(DenseIndex::from_bytes(b"FOLIO").is_err());
    }

    #[test]
    fn test_new_rejects_ragged_vectors() {
        assert!(DenseIndex::new("m", 2, vec![vec![1.0, 0.0], vec![1.0]]).is_err());
        assert!(DenseIndex::new("m", 0, vec![]).is_err());
    }

    #[test]
    fn test_top_k_orders_by_score_then_position() {
        let hits = index().top_k(&[1.0, 0.0, 0.0], 3);
        let positions: Vec<usize> = hits.iter().map(|(i, _)| *i).collect();
        assert_eq!(positions, vec![0, 2, 3]);
        assert!(hits[0].1 >= hits[2].1);
    }

    #[test]
    fn test_top_k_larger_than_index() {
        assert_eq!(index().top_k(&[0.0, 1.0, 0.0], 10).len(), 4);
    }

    #[test]
    fn test_cosine_edges() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
