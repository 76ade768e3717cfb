use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use burn::tensor::TensorData;
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::CheckpointError;

/// Parameter name to host tensor mapping, the in-memory form of a checkpoint.
#[derive(Debug, Clone, Default)]
pub struct StateDict {
    tensors: BTreeMap<String, TensorData>,
    metadata: BTreeMap<String, String>,
}

impl StateDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, data: TensorData) {
        self.tensors.insert(name.into(), data);
    }

    pub fn remove(&mut self, name: &str) -> Option<TensorData> {
        self.tensors.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&TensorData> {
        self.tensors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.tensors.keys()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Remove every entry whose name matches the predicate, returning the removed names.
    pub fn remove_matching(&mut self, pred: impl Fn(&str) -> bool) -> Vec<String> {
        let removed: Vec<String> = self.tensors.keys().filter(|k| pred(k)).cloned().collect();
        for key in &removed {
            self.tensors.remove(key);
        }
        removed
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Serialize all tensors as little endian f32 safetensors.
    pub fn to_safetensors(&self) -> Result<Vec<u8>, CheckpointError> {
        let encoded = self
            .tensors
            .iter()
            .map(|(name, data)| {
                let values = data
                    .clone()
                    .convert::<f32>()
                    .to_vec::<f32>()
                    .map_err(|e| CheckpointError::Data(format!("{name}: {e:?}")))?;
                let bytes: Vec<u8> = bytemuck::cast_slice(&values).to_vec();
                Ok((name.clone(), data.shape.clone(), bytes))
            })
            .collect::<Result<Vec<_>, CheckpointError>>()?;

        let views = encoded
            .iter()
            .map(|(name, shape, bytes)| {
                TensorView::new(Dtype::F32, shape.clone(), bytes)
                    .map(|view| (name.clone(), view))
                    .map_err(|e| CheckpointError::Format(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let metadata = (!self.metadata.is_empty()).then(|| {
            self.metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<HashMap<_, _>>()
        });

        safetensors::serialize(views.iter().map(|(name, view)| (name, view)), metadata)
            .map_err(|e| CheckpointError::Format(e.to_string()))
    }

    pub fn from_safetensors(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let tensors =
            SafeTensors::deserialize(bytes).map_err(|e| CheckpointError::Format(e.to_string()))?;

        let mut dict = Self::new();
        for (name, view) in tensors.tensors() {
            let shape = view.shape().to_vec();
            let values: Vec<f32> = match view.dtype() {
                // The tensor data is not guaranteed to be aligned, so decode bytewise.
                Dtype::F32 => view
                    .data()
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
                Dtype::F64 => view
                    .data()
                    .chunks_exact(8)
                    .map(|b| {
                        f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
                    })
                    .collect(),
                other => {
                    return Err(CheckpointError::UnsupportedDtype {
                        name,
                        dtype: format!("{other:?}"),
                    });
                }
            };
            dict.insert(name, TensorData::new(values, shape));
        }

        let (_, header) =
            SafeTensors::read_metadata(bytes).map_err(|e| CheckpointError::Format(e.to_string()))?;
        if let Some(meta) = header.metadata() {
            dict.metadata = meta.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        }
        Ok(dict)
    }

    pub fn read(path: &Path) -> Result<Self, CheckpointError> {
        if !path.is_file() {
            return Err(CheckpointError::NotFound(path.to_owned()));
        }
        let bytes = std::fs::read(path).map_err(|source| CheckpointError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_safetensors(&bytes)
    }

    pub fn write(&self, path: &Path) -> Result<(), CheckpointError> {
        let bytes = self.to_safetensors()?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| CheckpointError::Io {
                path: parent.to_owned(),
                source,
            })?;
        }
        std::fs::write(path, bytes).map_err(|source| CheckpointError::Io {
            path: path.to_owned(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safetensors_roundtrip_keeps_values_and_metadata() {
        let mut dict = StateDict::new().with_metadata("model", "mosaic");
        dict.insert(
            "conv1.conv2d.weight",
            TensorData::new(vec![1.0f32, -2.5, 3.25, 0.0], [2, 2]),
        );
        dict.insert("in1.bias", TensorData::new(vec![0.5f32], [1]));

        let bytes = dict.to_safetensors().expect("Serializable");
        let back = StateDict::from_safetensors(&bytes).expect("Deserializable");

        assert_eq!(back.len(), 2);
        assert_eq!(back.metadata("model"), Some("mosaic"));
        let weight = back.get("conv1.conv2d.weight").expect("Has weight");
        assert_eq!(weight.shape, vec![2, 2]);
        assert_eq!(
            weight.clone().to_vec::<f32>().expect("f32"),
            vec![1.0, -2.5, 3.25, 0.0]
        );
    }

    #[test]
    fn reading_missing_file_is_not_found() {
        let res = StateDict::read(Path::new("/no/such/model.safetensors"));
        assert!(matches!(res, Err(CheckpointError::NotFound(_))));
    }

    #[test]
    fn garbage_is_format_error() {
        let res = StateDict::from_safetensors(b"definitely not safetensors");
        assert!(matches!(res, Err(CheckpointError::Format(_))));
    }

    #[test]
    fn remove_matching_returns_removed_names() {
        let mut dict = StateDict::new();
        dict.insert("a.keep", TensorData::new(vec![1.0f32], [1]));
        dict.insert("a.drop", TensorData::new(vec![1.0f32], [1]));
        let removed = dict.remove_matching(|k| k.ends_with("drop"));
        assert_eq!(removed, ["a.drop"]);
        assert!(dict.contains("a.keep"));
        assert!(!dict.contains("a.drop"));
    }
}
