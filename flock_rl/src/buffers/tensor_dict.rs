//! Dictionary of named tensors sharing a batch shape.
//!
//! Every field stores a flat row-major `Vec<f32>` of shape
//! `batch_shape ++ feature_shape`. A "row" is one element of the flattened
//! batch, i.e. `feature_size` contiguous floats.

use std::collections::BTreeMap;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::BufferError;

/// One named field of a [`TensorDict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    feature_shape: Vec<usize>,
    data: Vec<f32>,
}

impl Field {
    pub fn feature_shape(&self) -> &[usize] {
        &self.feature_shape
    }

    /// Floats per row.
    pub fn feature_size(&self) -> usize {
        self.feature_shape.iter().product()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Slice of a single row.
    pub fn row(&self, row: usize) -> &[f32] {
        let size = self.feature_size();
        &self.data[row * size..(row + 1) * size]
    }
}

/// Ordered map `key -> Field` with a common batch shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TensorDict {
    batch_shape: Vec<usize>,
    fields: BTreeMap<String, Field>,
}

impl TensorDict {
    pub fn new(batch_shape: impl Into<Vec<usize>>) -> Self {
        Self {
            batch_shape: batch_shape.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn batch_shape(&self) -> &[usize] {
        &self.batch_shape
    }

    /// Number of rows (product of the batch shape).
    pub fn len(&self) -> usize {
        self.batch_shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Field> {
        self.fields.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Field> {
        self.fields.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(k, f)| (k.as_str(), f))
    }

    /// Field data or [`BufferError::MissingKey`].
    pub fn data(&self, key: &str) -> Result<&[f32], BufferError> {
        self.fields
            .get(key)
            .map(Field::data)
            .ok_or_else(|| BufferError::MissingKey(key.to_string()))
    }

    /// Full shape of a field, `batch_shape ++ feature_shape`.
    pub fn shape(&self, key: &str) -> Option<Vec<usize>> {
        self.fields.get(key).map(|f| {
            let mut shape = self.batch_shape.clone();
            shape.extend_from_slice(&f.feature_shape);
            shape
        })
    }

    /// Insert or replace a field.
    ///
    /// `data.len()` must equal `len() * prod(feature_shape)`.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        feature_shape: &[usize],
        data: Vec<f32>,
    ) -> Result<(), BufferError> {
        let key = key.into();
        let expected = self.len() * feature_shape.iter().product::<usize>();
        if data.len() != expected {
            return Err(BufferError::DataLength {
                key,
                expected,
                actual: data.len(),
            });
        }
        self.fields.insert(
            key,
            Field {
                feature_shape: feature_shape.to_vec(),
                data,
            },
        );
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(
        mut self,
        key: impl Into<String>,
        feature_shape: &[usize],
        data: Vec<f32>,
    ) -> Result<Self, BufferError> {
        self.insert(key, feature_shape, data)?;
        Ok(self)
    }

    /// Reinterpret the batch shape; the number of rows must not change.
    pub fn reshape_batch(mut self, batch_shape: impl Into<Vec<usize>>) -> Result<Self, BufferError> {
        let batch_shape = batch_shape.into();
        let rows: usize = batch_shape.iter().product();
        if rows != self.len() {
            return Err(BufferError::BatchShape {
                expected: vec![self.len()],
                actual: batch_shape,
            });
        }
        self.batch_shape = batch_shape;
        Ok(self)
    }

    /// Collapse the batch shape to `[len()]`.
    pub fn flatten_batch(self) -> Self {
        let rows = self.len();
        Self {
            batch_shape: vec![rows],
            fields: self.fields,
        }
    }

    /// Gather rows of the flattened batch into a new dict of shape `[indices.len()]`.
    pub fn select(&self, indices: &[usize]) -> Self {
        let fields = self
            .fields
            .iter()
            .map(|(key, field)| {
                let size = field.feature_size();
                let mut data = Vec::with_capacity(indices.len() * size);
                for &row in indices {
                    data.extend_from_slice(&field.data[row * size..(row + 1) * size]);
                }
                (
                    key.clone(),
                    Field {
                        feature_shape: field.feature_shape.clone(),
                        data,
                    },
                )
            })
            .collect();
        Self {
            batch_shape: vec![indices.len()],
            fields,
        }
    }

    /// Split the flattened batch into `n` contiguous chunks.
    ///
    /// The first `len() % n` chunks hold one extra row.
    pub fn split(&self, n: usize) -> Result<Vec<Self>, BufferError> {
        if n == 0 {
            return Err(BufferError::Invalid("cannot split into 0 chunks".into()));
        }
        let rows = self.len();
        let base = rows / n;
        let extra = rows % n;
        let mut start = 0;
        let mut chunks = Vec::with_capacity(n);
        for i in 0..n {
            let size = base + usize::from(i < extra);
            let indices: Vec<usize> = (start..start + size).collect();
            chunks.push(self.select(&indices));
            start += size;
        }
        Ok(chunks)
    }

    /// Concatenate dicts along the flattened batch.
    ///
    /// All parts must carry the same keys and feature shapes.
    pub fn concat(parts: &[Self]) -> Result<Self, BufferError> {
        let Some(first) = parts.first() else {
            return Ok(Self::new(vec![0]));
        };
        let rows = parts.iter().map(Self::len).sum::<usize>();
        let mut out = Self::new(vec![rows]);
        for (key, field) in &first.fields {
            let mut data = Vec::with_capacity(rows * field.feature_size());
            for part in parts {
                let other = part
                    .fields
                    .get(key)
                    .ok_or_else(|| BufferError::MissingKey(key.clone()))?;
                if other.feature_shape != field.feature_shape {
                    return Err(BufferError::FeatureShape {
                        key: key.clone(),
                        expected: field.feature_shape.clone(),
                        actual: other.feature_shape.clone(),
                    });
                }
                data.extend_from_slice(&other.data);
            }
            out.insert(key.clone(), &field.feature_shape, data)?;
        }
        Ok(out)
    }

    /// Field as a `[rows, feature_size]` tensor.
    pub fn to_tensor2<B: Backend>(
        &self,
        key: &str,
        device: &B::Device,
    ) -> Result<Tensor<B, 2>, BufferError> {
        let field = self
            .fields
            .get(key)
            .ok_or_else(|| BufferError::MissingKey(key.to_string()))?;
        Ok(Tensor::<B, 1>::from_floats(field.data.as_slice(), device)
            .reshape([self.len(), field.feature_size()]))
    }

    /// Field as a `[rows]` tensor; the feature size must be 1.
    pub fn to_tensor1<B: Backend>(
        &self,
        key: &str,
        device: &B::Device,
    ) -> Result<Tensor<B, 1>, BufferError> {
        let field = self
            .fields
            .get(key)
            .ok_or_else(|| BufferError::MissingKey(key.to_string()))?;
        if field.feature_size() != 1 {
            return Err(BufferError::FeatureShape {
                key: key.to_string(),
                expected: vec![1],
                actual: field.feature_shape.clone(),
            });
        }
        Ok(Tensor::<B, 1>::from_floats(field.data.as_slice(), device))
    }
}
