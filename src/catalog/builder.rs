//! Catalog construction.
//!
//! The catalog is the ordered list of experiments a batch runs: every
//! individual channel and every channel group, each against every target,
//! followed by any custom descriptors.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::CatalogError;

use super::descriptor::{is_filesystem_safe, ChannelSelector, ExperimentDescriptor, Target};
use super::groups::{validate_channels, GroupTable, DEFAULT_INDIVIDUAL_CHANNELS};

/// Builds the ordered experiment catalog.
///
/// Emits, in order: two descriptors per individual channel (one per
/// target), two per group table entry, then `extra` verbatim. Every
/// descriptor is validated and names must be unique, so a bad catalog is
/// rejected before any job is dispatched.
pub fn build_catalog(
    individual_channels: &[u8],
    groups: &GroupTable,
    extra: &[ExperimentDescriptor],
) -> Result<Vec<ExperimentDescriptor>, CatalogError> {
    groups.validate()?;

    let mut catalog = Vec::with_capacity((individual_channels.len() + groups.len()) * 2 + extra.len());

    for &channel in individual_channels {
        for target in Target::ALL {
            catalog.push(ExperimentDescriptor::channels(
                single_channel_name(channel, target),
                vec![channel],
                target,
            ));
        }
    }

    for (tag, _) in groups.iter() {
        for target in Target::ALL {
            catalog.push(ExperimentDescriptor::group(
                group_name(tag, target),
                tag,
                target,
            ));
        }
    }

    catalog.extend(extra.iter().cloned());

    let mut seen = HashSet::with_capacity(catalog.len());
    for descriptor in &catalog {
        validate_descriptor(descriptor, groups)?;
        if !seen.insert(descriptor.name()) {
            return Err(CatalogError::DuplicateName(descriptor.name().to_string()));
        }
    }

    Ok(catalog)
}

/// Builds the standard catalog: all usable channels and the default groups.
pub fn default_catalog(extra: &[ExperimentDescriptor]) -> Result<Vec<ExperimentDescriptor>, CatalogError> {
    build_catalog(&DEFAULT_INDIVIDUAL_CHANNELS, &GroupTable::default(), extra)
}

/// Name of the experiment running a single channel.
pub fn single_channel_name(channel: u8, target: Target) -> String {
    format!("signal_{}_{}", channel, target.slug())
}

/// Name of the experiment running a channel group.
pub fn group_name(tag: &str, target: Target) -> String {
    format!("{}_{}", tag.to_lowercase(), target.slug())
}

fn validate_descriptor(
    descriptor: &ExperimentDescriptor,
    groups: &GroupTable,
) -> Result<(), CatalogError> {
    if !is_filesystem_safe(descriptor.name()) {
        return Err(CatalogError::InvalidName(descriptor.name().to_string()));
    }

    match descriptor.selector() {
        ChannelSelector::Channels(channels) => validate_channels(descriptor.name(), channels),
        ChannelSelector::Group(tag) if groups.contains(tag) => Ok(()),
        ChannelSelector::Group(tag) => Err(CatalogError::UnknownGroup {
            name: descriptor.name().to_string(),
            group: tag.clone(),
        }),
    }
}

/// One entry of a custom descriptors file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DescriptorEntry {
    name: String,
    target: Target,
    #[serde(default)]
    channels: Option<Vec<u8>>,
    #[serde(default)]
    group: Option<String>,
}

impl TryFrom<DescriptorEntry> for ExperimentDescriptor {
    type Error = CatalogError;

    fn try_from(entry: DescriptorEntry) -> Result<Self, Self::Error> {
        match (entry.channels, entry.group) {
            (Some(channels), None) => Ok(ExperimentDescriptor::channels(
                entry.name,
                channels,
                entry.target,
            )),
            (None, Some(group)) => Ok(ExperimentDescriptor::group(entry.name, group, entry.target)),
            (Some(_), Some(_)) => Err(CatalogError::InvalidDescriptor {
                name: entry.name,
                reason: "specify either 'channels' or 'group', not both".to_string(),
            }),
            (None, None) => Err(CatalogError::InvalidDescriptor {
                name: entry.name,
                reason: "missing 'channels' or 'group'".to_string(),
            }),
        }
    }
}

/// Parses custom descriptors from YAML (JSON is accepted as well).
///
/// ```yaml
/// - name: custom_1_4_ironing
///   target: Ironing
///   channels: [1, 4]
/// - name: direct_again
///   target: DeepDrawing
///   group: DIRECT
/// ```
pub fn parse_extra_descriptors(content: &str) -> Result<Vec<ExperimentDescriptor>, CatalogError> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<DescriptorEntry> = serde_yaml::from_str(content)?;
    entries.into_iter().map(ExperimentDescriptor::try_from).collect()
}

/// Reads custom descriptors from a file.
pub fn load_extra_descriptors(path: &Path) -> Result<Vec<ExperimentDescriptor>, CatalogError> {
    let content = fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_extra_descriptors(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PortionKind;

    #[test]
    fn test_two_channels_one_group() {
        let groups = GroupTable::empty().with_group("DIRECT", vec![1, 2]);
        let catalog = build_catalog(&[1, 2], &groups, &[]).unwrap();

        assert_eq!(catalog.len(), 6);
        let names: HashSet<&str> = catalog.iter().map(|d| d.name()).collect();
        assert_eq!(names.len(), 6);

        let order: Vec<&str> = catalog.iter().map(|d| d.name()).collect();
        assert_eq!(
            order,
            vec![
                "signal_1_ironing",
                "signal_1_deep_drawing",
                "signal_2_ironing",
                "signal_2_deep_drawing",
                "direct_ironing",
                "direct_deep_drawing",
            ]
        );
        assert_eq!(catalog[4].portion_kind(), PortionKind::NamedGroup);
        assert_eq!(catalog[0].portion_kind(), PortionKind::Single);
    }

    #[test]
    fn test_catalog_is_pure() {
        let extra = vec![ExperimentDescriptor::channels("custom_1_4", vec![1, 4], Target::Ironing)];
        let first = default_catalog(&extra).unwrap();
        let second = default_catalog(&extra).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_default_catalog_size() {
        let catalog = default_catalog(&[]).unwrap();
        assert_eq!(catalog.len(), (8 + 3) * 2);
        assert!(catalog.iter().all(|d| is_filesystem_safe(d.name())));
        assert!(catalog
            .iter()
            .all(|d| !d.name().contains("signal_6") && !d.name().contains("signal_0")));
    }

    #[test]
    fn test_extras_appended_verbatim() {
        let extra = vec![
            ExperimentDescriptor::channels("custom_9_2", vec![9, 2], Target::DeepDrawing),
            ExperimentDescriptor::group("indirect_rerun", "INDIRECT", Target::Ironing),
        ];
        let catalog = default_catalog(&extra).unwrap();
        assert_eq!(&catalog[catalog.len() - 2..], &extra[..]);
    }

    #[test]
    fn test_rejects_invalid_extras() {
        let reserved = vec![ExperimentDescriptor::channels("bad", vec![1, 6], Target::Ironing)];
        assert!(matches!(
            default_catalog(&reserved),
            Err(CatalogError::ReservedChannel { .. })
        ));

        let unknown_group = vec![ExperimentDescriptor::group("bad", "OUTER", Target::Ironing)];
        assert!(matches!(
            default_catalog(&unknown_group),
            Err(CatalogError::UnknownGroup { .. })
        ));

        let unsafe_name = vec![ExperimentDescriptor::channels("a/b", vec![1], Target::Ironing)];
        assert!(matches!(
            default_catalog(&unsafe_name),
            Err(CatalogError::InvalidName(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let colliding = vec![ExperimentDescriptor::channels(
            "signal_1_ironing",
            vec![1, 2],
            Target::Ironing,
        )];
        assert!(matches!(
            default_catalog(&colliding),
            Err(CatalogError::DuplicateName(name)) if name == "signal_1_ironing"
        ));
    }

    #[test]
    fn test_parse_extra_descriptors() {
        let yaml = r#"
- name: custom_1_4_ironing
  target: Ironing
  channels: [1, 4]
- name: direct_again
  target: deep_drawing
  group: DIRECT
"#;
        let extras = parse_extra_descriptors(yaml).unwrap();
        assert_eq!(extras.len(), 2);
        assert_eq!(
            extras[0],
            ExperimentDescriptor::channels("custom_1_4_ironing", vec![1, 4], Target::Ironing)
        );
        assert_eq!(extras[1].group_tag(), Some("DIRECT"));
        assert_eq!(extras[1].target(), Target::DeepDrawing);

        assert!(parse_extra_descriptors("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_descriptors() {
        let unknown_target = "- name: x\n  target: Stamping\n  channels: [1]\n";
        assert!(matches!(
            parse_extra_descriptors(unknown_target),
            Err(CatalogError::Yaml(_))
        ));

        let both = "- name: x\n  target: Ironing\n  channels: [1]\n  group: ALL\n";
        assert!(matches!(
            parse_extra_descriptors(both),
            Err(CatalogError::InvalidDescriptor { .. })
        ));

        let neither = "- name: x\n  target: Ironing\n";
        assert!(matches!(
            parse_extra_descriptors(neither),
            Err(CatalogError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_load_extra_descriptors_missing_file() {
        let result = load_extra_descriptors(Path::new("/nonexistent/extra.yaml"));
        assert!(matches!(result, Err(CatalogError::Read { .. })));
    }
}
