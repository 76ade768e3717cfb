use burn::{
    module::Param,
    nn::{InstanceNorm, conv::Conv2d},
    prelude::Backend,
    tensor::{Tensor, TensorData},
};
use std::collections::BTreeSet;

use crate::{CheckpointError, StateDict};

/// Join a parameter name onto a module prefix, `""` meaning the root module.
pub fn join_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

pub trait ParamVisitor<B: Backend> {
    fn visit<const D: usize>(&mut self, name: &str, param: &Param<Tensor<B, D>>);
}

pub trait ParamMapper<B: Backend> {
    fn map<const D: usize>(&mut self, name: &str, param: Param<Tensor<B, D>>)
    -> Param<Tensor<B, D>>;
}

/// Modules whose parameters have stable, PyTorch style names. Names are what
/// ends up in checkpoints, so they must never depend on burn's internal layout.
pub trait NamedModule<B: Backend>: Sized {
    fn visit_named<V: ParamVisitor<B>>(&self, prefix: &str, visitor: &mut V);
    fn map_named<M: ParamMapper<B>>(self, prefix: &str, mapper: &mut M) -> Self;

    /// All parameter names of this module.
    fn param_names(&self) -> BTreeSet<String> {
        let mut names = ParamNames::default();
        self.visit_named("", &mut names);
        names.0
    }

    /// Copy all parameters to host memory, keyed by name.
    fn to_state_dict(&self) -> StateDict {
        let mut exporter = StateDictExporter::default();
        self.visit_named("", &mut exporter);
        exporter.0
    }

    /// Replace the parameters with the tensors from a state dict. The key set must match exactly.
    fn load_state_dict(self, mut dict: StateDict) -> Result<Self, CheckpointError> {
        let expected = self.param_names();
        let missing: Vec<_> = expected
            .iter()
            .filter(|k| !dict.contains(k))
            .cloned()
            .collect();
        let unexpected: Vec<_> = dict
            .keys()
            .filter(|k| !expected.contains(*k))
            .cloned()
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(CheckpointError::ParameterMismatch {
                missing,
                unexpected,
            });
        }

        let mut importer = StateDictImporter {
            dict: &mut dict,
            error: None,
        };
        let module = self.map_named("", &mut importer);
        match importer.error {
            Some(err) => Err(err),
            None => Ok(module),
        }
    }
}

#[derive(Default)]
struct ParamNames(BTreeSet<String>);

impl<B: Backend> ParamVisitor<B> for ParamNames {
    fn visit<const D: usize>(&mut self, name: &str, _param: &Param<Tensor<B, D>>) {
        self.0.insert(name.to_owned());
    }
}

#[derive(Default)]
struct StateDictExporter(StateDict);

impl<B: Backend> ParamVisitor<B> for StateDictExporter {
    fn visit<const D: usize>(&mut self, name: &str, param: &Param<Tensor<B, D>>) {
        self.0.insert(name, param.val().into_data());
    }
}

struct StateDictImporter<'a> {
    dict: &'a mut StateDict,
    error: Option<CheckpointError>,
}

impl StateDictImporter<'_> {
    fn take_tensor<B: Backend, const D: usize>(
        &mut self,
        name: &str,
        current: &Tensor<B, D>,
    ) -> Result<Tensor<B, D>, CheckpointError> {
        let data = self
            .dict
            .remove(name)
            .ok_or_else(|| CheckpointError::ParameterMismatch {
                missing: vec![name.to_owned()],
                unexpected: vec![],
            })?;

        let expected = current.dims().to_vec();
        if data.shape != expected {
            return Err(CheckpointError::ShapeMismatch {
                name: name.to_owned(),
                expected,
                found: data.shape,
            });
        }

        let data: TensorData = data.convert::<B::FloatElem>();
        let tensor = Tensor::<B, D>::from_data(data, &current.device());
        Ok(if current.is_require_grad() {
            tensor.require_grad()
        } else {
            tensor
        })
    }
}

impl<B: Backend> ParamMapper<B> for StateDictImporter<'_> {
    fn map<const D: usize>(
        &mut self,
        name: &str,
        param: Param<Tensor<B, D>>,
    ) -> Param<Tensor<B, D>> {
        if self.error.is_some() {
            return param;
        }
        let (id, current, _) = param.consume();
        match self.take_tensor(name, &current) {
            Ok(loaded) => Param::initialized(id, loaded),
            Err(err) => {
                self.error = Some(err);
                Param::initialized(id, current)
            }
        }
    }
}

impl<B: Backend> NamedModule<B> for Conv2d<B> {
    fn visit_named<V: ParamVisitor<B>>(&self, prefix: &str, visitor: &mut V) {
        visitor.visit(&join_name(prefix, "weight"), &self.weight);
        if let Some(bias) = &self.bias {
            visitor.visit(&join_name(prefix, "bias"), bias);
        }
    }

    fn map_named<M: ParamMapper<B>>(mut self, prefix: &str, mapper: &mut M) -> Self {
        self.weight = mapper.map(&join_name(prefix, "weight"), self.weight);
        self.bias = self.bias.map(|b| mapper.map(&join_name(prefix, "bias"), b));
        self
    }
}

/// Affine instance norm parameters use the `weight`/`bias` names of `nn.InstanceNorm2d`.
impl<B: Backend> NamedModule<B> for InstanceNorm<B> {
    fn visit_named<V: ParamVisitor<B>>(&self, prefix: &str, visitor: &mut V) {
        if let Some(gamma) = &self.gamma {
            visitor.visit(&join_name(prefix, "weight"), gamma);
        }
        if let Some(beta) = &self.beta {
            visitor.visit(&join_name(prefix, "bias"), beta);
        }
    }

    fn map_named<M: ParamMapper<B>>(mut self, prefix: &str, mapper: &mut M) -> Self {
        self.gamma = self.gamma.map(|g| mapper.map(&join_name(prefix, "weight"), g));
        self.beta = self.beta.map(|b| mapper.map(&join_name(prefix, "bias"), b));
        self
    }
}
