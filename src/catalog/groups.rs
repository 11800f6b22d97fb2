//! Sensor channels and named channel groups.

use crate::error::CatalogError;

/// Highest valid channel index.
pub const MAX_CHANNEL: u8 = 9;

/// Channel indices that never appear in a selector: 0 is the time axis,
/// 6 is a disconnected sensor.
pub const RESERVED_CHANNELS: [u8; 2] = [0, 6];

/// Channels run individually by the default catalog.
pub const DEFAULT_INDIVIDUAL_CHANNELS: [u8; 8] = [1, 2, 3, 4, 5, 7, 8, 9];

/// Ordered mapping from group tag to channel set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTable {
    entries: Vec<(String, Vec<u8>)>,
}

impl GroupTable {
    /// Creates an empty table.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a group, replacing the channels of an existing tag in place.
    pub fn insert(&mut self, tag: impl Into<String>, channels: Vec<u8>) {
        let tag = tag.into();
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(entry) => entry.1 = channels,
            None => self.entries.push((tag, channels)),
        }
    }

    /// Builder form of [`GroupTable::insert`].
    pub fn with_group(mut self, tag: impl Into<String>, channels: Vec<u8>) -> Self {
        self.insert(tag, channels);
        self
    }

    /// Looks up the channels of a group.
    pub fn resolve(&self, tag: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, channels)| channels.as_slice())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.resolve(tag).is_some()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(tag, channels)| (tag.as_str(), channels.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks every group's tag and channel set.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for (tag, channels) in &self.entries {
            if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(CatalogError::InvalidGroup {
                    group: tag.clone(),
                    reason: "tag must be non-empty and alphanumeric".to_string(),
                });
            }
            validate_channels(tag, channels).map_err(|e| CatalogError::InvalidGroup {
                group: tag.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

impl Default for GroupTable {
    fn default() -> Self {
        Self::empty()
            .with_group("DIRECT", vec![1, 2, 3])
            .with_group("INDIRECT", vec![4, 5, 7, 8, 9])
            .with_group("ALL", vec![1, 2, 3, 4, 5, 7, 8, 9])
    }
}

/// Validates a channel selector: non-empty, in range, not reserved, unique.
///
/// `owner` names the descriptor or group in error messages.
pub fn validate_channels(owner: &str, channels: &[u8]) -> Result<(), CatalogError> {
    if channels.is_empty() {
        return Err(CatalogError::EmptySelector {
            name: owner.to_string(),
        });
    }

    for (i, &channel) in channels.iter().enumerate() {
        if RESERVED_CHANNELS.contains(&channel) {
            return Err(CatalogError::ReservedChannel {
                name: owner.to_string(),
                channel,
            });
        }
        if channel > MAX_CHANNEL {
            return Err(CatalogError::ChannelOutOfRange {
                name: owner.to_string(),
                channel,
                max: MAX_CHANNEL,
            });
        }
        if channels[..i].contains(&channel) {
            return Err(CatalogError::DuplicateChannel {
                name: owner.to_string(),
                channel,
            });
        }
    }

    Ok(())
}
