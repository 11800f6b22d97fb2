//! Experiment catalog.
//!
//! Enumerates the experiments of a batch. The standard catalog crosses every
//! usable sensor channel, and every named channel group, with both
//! classification targets:
//!
//! ```text
//! channels 1 2 3 4 5 7 8 9   ─┐
//!                             ├─ × {Ironing, DeepDrawing} ─→ descriptors
//! groups DIRECT INDIRECT ALL ─┘
//!                                 + custom descriptors (appended)
//! ```
//!
//! # Example
//!
//! ```rust
//! use formsweep::catalog::{build_catalog, GroupTable};
//!
//! let groups = GroupTable::empty().with_group("DIRECT", vec![1, 2]);
//! let catalog = build_catalog(&[1, 2], &groups, &[]).unwrap();
//! assert_eq!(catalog.len(), 6);
//! ```

pub mod builder;
pub mod descriptor;
pub mod groups;

pub use builder::{
    build_catalog, default_catalog, group_name, load_extra_descriptors, parse_extra_descriptors,
    single_channel_name,
};
pub use descriptor::{is_filesystem_safe, ChannelSelector, ExperimentDescriptor, PortionKind, Target};
pub use groups::{
    validate_channels, GroupTable, DEFAULT_INDIVIDUAL_CHANNELS, MAX_CHANNEL, RESERVED_CHANNELS,
};
