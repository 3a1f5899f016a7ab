use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{Device, EmbeddingModel, ModelError, normalize_whitespace};

/// Deterministic feature-hashing embedder over word unigrams and bigrams.
/// Runs on the CPU only and needs no model download.
#[derive(Debug, Clone)]
pub struct LocalHashModel {
    dimensions: usize,
}

impl LocalHashModel {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }

    pub fn embed_text(&self, payload: &str) -> Vec<f32> {
        let dims = self.dimensions;
        let mut vector = vec![0_f32; dims];

        for token in tokenize_payload(payload) {
            let hash = stable_hash(&token);
            let index = (hash as usize) % dims;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            let weight = 1.0 + (((hash >> 48) & 0xFF) as f32 / 255.0);
            vector[index] += sign * weight;
        }

        normalize_vector(&mut vector);
        vector
    }
}

impl EmbeddingModel for LocalHashModel {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, texts: &[&str], device: Device) -> Result<Vec<Vec<f32>>, ModelError> {
        if device != Device::Cpu {
            return Err(format!("local hash embedder cannot run on {}", device.as_str()).into());
        }

        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn stable_hash(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn tokenize_payload(payload: &str) -> Vec<String> {
    let normalized = normalize_whitespace(payload);
    if normalized.is_empty() {
        return Vec::new();
    }

    let words = normalized
        .split(' ')
        .map(|value| {
            value
                .chars()
                .filter(|character| character.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|value| !value.is_empty())
        .collect::<Vec<String>>();

    let mut features = Vec::<String>::with_capacity(words.len() * 2);
    for (index, word) in words.iter().enumerate() {
        features.push(format!("w:{word}"));
        if let Some(next) = words.get(index + 1) {
            features.push(format!("b:{word}_{next}"));
        }
    }
    features
}

fn normalize_vector(values: &mut [f32]) {
    let squared_norm = values
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>();

    if squared_norm <= 0.0 {
        return;
    }

    let norm = squared_norm.sqrt() as f32;
    for value in values {
        *value /= norm;
    }
}
