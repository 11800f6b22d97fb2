//! Typed parameter set handed to the experiment engine.

use std::path::{Path, PathBuf};

use crate::catalog::{ChannelSelector, ExperimentDescriptor, GroupTable, Target};

use super::config::RunConfig;
use super::engine::EngineError;

/// Value of a single engine parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Int(u64),
    IntList(Vec<u8>),
}

/// Parameters of one engine invocation.
///
/// Required fields are always present; optional ones are only set when the
/// batch configuration supplies a meaningful value, so the engine's own
/// defaults stay in effect otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParams {
    pub data_path: PathBuf,
    pub plot_path: PathBuf,
    pub classification_target: Target,
    pub channels: Vec<u8>,
    pub wandb_group: Option<String>,
    pub skip_first_n_timesteps: Option<u32>,
}

impl EngineParams {
    /// Derives the parameters of `descriptor`, writing into `output_dir`.
    pub fn for_descriptor(
        descriptor: &ExperimentDescriptor,
        config: &RunConfig,
        output_dir: &Path,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            data_path: config.data_path.clone(),
            plot_path: output_dir.to_path_buf(),
            classification_target: descriptor.target(),
            channels: resolve_channels(descriptor, &config.groups)?,
            wandb_group: config.group_tag.clone().filter(|t| !t.is_empty()),
            skip_first_n_timesteps: config.skip_first_n_timesteps.filter(|&n| n > 0),
        })
    }

    /// Named parameters in a stable order.
    pub fn entries(&self) -> Vec<(&'static str, ParamValue)> {
        let mut entries = vec![
            (
                "data_path",
                ParamValue::Text(self.data_path.display().to_string()),
            ),
            (
                "plot_path",
                ParamValue::Text(self.plot_path.display().to_string()),
            ),
            (
                "classification_target",
                ParamValue::Text(self.classification_target.engine_value().to_string()),
            ),
            ("channels", ParamValue::IntList(self.channels.clone())),
        ];

        if let Some(ref group) = self.wandb_group {
            entries.push(("wandb_group", ParamValue::Text(group.clone())));
        }
        if let Some(skip) = self.skip_first_n_timesteps {
            entries.push(("skip_first_n_timesteps", ParamValue::Int(u64::from(skip))));
        }

        entries
    }
}

/// Resolves a descriptor's selector to concrete channel indices.
pub fn resolve_channels(
    descriptor: &ExperimentDescriptor,
    groups: &GroupTable,
) -> Result<Vec<u8>, EngineError> {
    match descriptor.selector() {
        ChannelSelector::Channels(channels) => Ok(channels.clone()),
        ChannelSelector::Group(tag) => groups
            .resolve(tag)
            .map(|channels| channels.to_vec())
            .ok_or_else(|| EngineError::UnknownGroup(tag.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_params_only() {
        let descriptor = ExperimentDescriptor::channels("signal_3_ironing", vec![3], Target::Ironing);
        let config = RunConfig::new("out").with_data_path("data.npz");
        let params = EngineParams::for_descriptor(&descriptor, &config, Path::new("out/signal_3_ironing")).unwrap();

        let keys: Vec<&str> = params.entries().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["data_path", "plot_path", "classification_target", "channels"]);
        assert_eq!(params.channels, vec![3]);
        assert_eq!(params.plot_path, PathBuf::from("out/signal_3_ironing"));
    }

    #[test]
    fn test_optional_params_forwarded() {
        let descriptor = ExperimentDescriptor::group("all_deep_drawing", "ALL", Target::DeepDrawing);
        let config = RunConfig::new("out")
            .with_group_tag(Some("sweep".to_string()))
            .with_skip_timesteps(Some(10));
        let params = EngineParams::for_descriptor(&descriptor, &config, Path::new("out/x")).unwrap();

        let entries = params.entries();
        assert!(entries.contains(&("wandb_group", ParamValue::Text("sweep".to_string()))));
        assert!(entries.contains(&("skip_first_n_timesteps", ParamValue::Int(10))));
        assert!(entries.contains(&(
            "classification_target",
            ParamValue::Text("DeepDrawing".to_string())
        )));
        assert_eq!(params.channels, vec![1, 2, 3, 4, 5, 7, 8, 9]);
    }

    #[test]
    fn test_zero_skip_is_not_forwarded() {
        let descriptor = ExperimentDescriptor::channels("x", vec![1], Target::Ironing);
        let mut config = RunConfig::new("out");
        config.skip_first_n_timesteps = Some(0);
        config.group_tag = Some(String::new());
        let params = EngineParams::for_descriptor(&descriptor, &config, Path::new("out/x")).unwrap();

        assert!(params.skip_first_n_timesteps.is_none());
        assert!(params.wandb_group.is_none());
        assert_eq!(params.entries().len(), 4);
    }

    #[test]
    fn test_unknown_group() {
        let descriptor = ExperimentDescriptor::group("x", "MISSING", Target::Ironing);
        let result = resolve_channels(&descriptor, &GroupTable::default());
        assert!(matches!(result, Err(EngineError::UnknownGroup(tag)) if tag == "MISSING"));
    }
}
