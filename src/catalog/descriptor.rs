//! Experiment descriptors.
//!
//! A descriptor is the immutable specification of one experiment: which
//! signal channels feed the classifier, which forming process is classified,
//! and the name under which its artifacts are stored.

use serde::{Deserialize, Serialize};

/// Classification target of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Target {
    /// Ironing process.
    #[serde(alias = "ironing")]
    Ironing,
    /// Deep drawing process.
    #[serde(alias = "deep_drawing", alias = "deepdrawing")]
    DeepDrawing,
}

impl Target {
    /// All targets, in catalog order.
    pub const ALL: [Target; 2] = [Target::Ironing, Target::DeepDrawing];

    /// Value passed to the engine as `classification_target`.
    pub fn engine_value(&self) -> &'static str {
        match self {
            Target::Ironing => "Ironing",
            Target::DeepDrawing => "DeepDrawing",
        }
    }

    /// Filesystem-safe fragment used in generated experiment names.
    pub fn slug(&self) -> &'static str {
        match self {
            Target::Ironing => "ironing",
            Target::DeepDrawing => "deep_drawing",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.engine_value())
    }
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "ironing" => Ok(Target::Ironing),
            "deepdrawing" | "deep_drawing" => Ok(Target::DeepDrawing),
            other => Err(format!("Unknown classification target: {}", other)),
        }
    }
}

/// Whether a descriptor selects individual channels or a named group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortionKind {
    /// An explicit list of channels.
    Single,
    /// A predefined channel group resolved through the group table.
    NamedGroup,
}

impl std::fmt::Display for PortionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortionKind::Single => write!(f, "single"),
            PortionKind::NamedGroup => write!(f, "group"),
        }
    }
}

/// Channel selection of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSelector {
    /// Ordered, unique channel indices.
    Channels(Vec<u8>),
    /// Tag of an entry in the group table.
    Group(String),
}

/// Immutable specification of one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentDescriptor {
    name: String,
    selector: ChannelSelector,
    target: Target,
}

impl ExperimentDescriptor {
    /// Creates a descriptor over an explicit channel list.
    pub fn channels(name: impl Into<String>, channels: Vec<u8>, target: Target) -> Self {
        Self {
            name: name.into(),
            selector: ChannelSelector::Channels(channels),
            target,
        }
    }

    /// Creates a descriptor over a named channel group.
    pub fn group(name: impl Into<String>, tag: impl Into<String>, target: Target) -> Self {
        Self {
            name: name.into(),
            selector: ChannelSelector::Group(tag.into()),
            target,
        }
    }

    /// Unique name, also the output directory key.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selector(&self) -> &ChannelSelector {
        &self.selector
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn portion_kind(&self) -> PortionKind {
        match self.selector {
            ChannelSelector::Channels(_) => PortionKind::Single,
            ChannelSelector::Group(_) => PortionKind::NamedGroup,
        }
    }

    /// The group tag, if this descriptor selects a named group.
    pub fn group_tag(&self) -> Option<&str> {
        match &self.selector {
            ChannelSelector::Group(tag) => Some(tag),
            ChannelSelector::Channels(_) => None,
        }
    }
}

/// Returns whether `name` can be used as a single directory component.
pub fn is_filesystem_safe(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parsing() {
        assert_eq!("Ironing".parse::<Target>().unwrap(), Target::Ironing);
        assert_eq!("deep-drawing".parse::<Target>().unwrap(), Target::DeepDrawing);
        assert_eq!("DeepDrawing".parse::<Target>().unwrap(), Target::DeepDrawing);
        assert!("stamping".parse::<Target>().is_err());
    }

    #[test]
    fn test_portion_kind_follows_selector() {
        let single = ExperimentDescriptor::channels("signal_1_ironing", vec![1], Target::Ironing);
        assert_eq!(single.portion_kind(), PortionKind::Single);
        assert!(single.group_tag().is_none());

        let group = ExperimentDescriptor::group("direct_ironing", "DIRECT", Target::Ironing);
        assert_eq!(group.portion_kind(), PortionKind::NamedGroup);
        assert_eq!(group.group_tag(), Some("DIRECT"));
    }

    #[test]
    fn test_filesystem_safe_names() {
        assert!(is_filesystem_safe("signal_1_deep_drawing"));
        assert!(is_filesystem_safe("custom-1.4.7"));
        assert!(!is_filesystem_safe(""));
        assert!(!is_filesystem_safe("with space"));
        assert!(!is_filesystem_safe("nested/dir"));
        assert!(!is_filesystem_safe(".."));
    }

    #[test]
    fn test_descriptor_serialization() {
        let descriptor = ExperimentDescriptor::group("all_ironing", "ALL", Target::Ironing);
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(json.contains("\"group\":\"ALL\""));

        let parsed: ExperimentDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, descriptor);
    }
}
