//! Deterministic local embeddings used when the provider cannot be reached.
//!
//! Vectors are feature-hashed: every lowercased word and every character trigram
//! of each word lands in one bucket chosen by its SHA-256 digest, with a sign taken
//! from the same digest. The result is L2-normalised, so identical text always maps
//! to the identical unit vector and texts sharing vocabulary point in similar directions.


use sha2::{Digest, Sha256};

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Build the fallback vector for `text` with `dimension` components.
///
/// Similarity between fallback vectors only reflects shared words and spelling.
/// Synonyms with no common trigrams ("sign in" against "login") score near zero,
/// so thresholds tuned for provider vectors filter out most fallback matches.
#[inline]
pub fn fallback_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0_f32; dimension];
    if dimension == 0 {
        return vector;
    }

    let lowered = text.to_lowercase();
    for word in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
    {
        add_feature(&mut vector, "w", word, WORD_WEIGHT);

        let padded: Vec<char> = format!(" {word} ").chars().collect();
        for window in padded.windows(3) {
            let trigram: String = window.iter().collect();
            add_feature(&mut vector, "t", &trigram, TRIGRAM_WEIGHT);
        }
    }

    if !normalize(&mut vector) {
        // No usable features (punctuation only, or colliding signs cancelled out)
        let (bucket, _) = bucket_and_sign("x", text.trim(), dimension);
        vector.iter_mut().for_each(|value| *value = 0.0);
        vector[bucket] = 1.0;
    }

    vector
}

fn add_feature(vector: &mut [f32], namespace: &str, feature: &str, weight: f32) {
    let (bucket, sign) = bucket_and_sign(namespace, feature, vector.len());
    vector[bucket] += sign * weight;
}

fn bucket_and_sign(namespace: &str, feature: &str, dimension: usize) -> (usize, f32) {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update([0u8]);
    hasher.update(feature.as_bytes());
    let digest = hasher.finalize();

    let mut index_bytes = [0u8; 8];
    index_bytes.copy_from_slice(&digest[..8]);
    let bucket = (u64::from_le_bytes(index_bytes) % dimension as u64) as usize;
    let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };

    (bucket, sign)
}

/// Scale to unit length; returns false for a zero vector
fn normalize(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return false;
    }

    vector.iter_mut().for_each(|value| *value /= norm);
    true
}
