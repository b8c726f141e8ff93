//! Assets discovered by a provider: virtual machines, container images
//! and running containers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::error::MergeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    VirtualMachine,
    ContainerImage,
    Container,
}

impl AssetKind {
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AssetKind::VirtualMachine => "VMInfo",
            AssetKind::ContainerImage => "ContainerImageInfo",
            AssetKind::Container => "ContainerInfo",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootVolume {
    pub size_gb: u64,
    pub encrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmInfo {
    pub instance_id: String,
    pub location: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub root_volume: RootVolume,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerImageInfo {
    pub image_id: String,
    #[serde(default)]
    pub repo_tags: Vec<String>,
    #[serde(default)]
    pub repo_digests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default)]
    pub labels: Vec<Tag>,
}

impl ContainerImageInfo {
    /// Union repo tags and digests of two descriptions of the same image.
    pub fn merge(mut self, other: ContainerImageInfo) -> Result<Self, MergeError> {
        if self.image_id != other.image_id {
            return Err(MergeError {
                left: self.image_id,
                right: other.image_id,
            });
        }

        self.repo_tags = union(self.repo_tags, other.repo_tags);
        self.repo_digests = union(self.repo_digests, other.repo_digests);
        self.architecture = other.architecture.or(self.architecture);
        self.os = other.os.or(self.os);
        self.size = other.size.or(self.size);
        if !other.labels.is_empty() {
            self.labels = other.labels;
        }
        Ok(self)
    }
}

fn union(left: Vec<String>, right: Vec<String>) -> Vec<String> {
    left.into_iter()
        .chain(right)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub container_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub image: ContainerImageInfo,
    #[serde(default)]
    pub labels: Vec<Tag>,
}

/// Provider specific description of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "objectType")]
pub enum AssetInfo {
    #[serde(rename = "VMInfo")]
    VirtualMachine(VmInfo),
    #[serde(rename = "ContainerImageInfo")]
    ContainerImage(ContainerImageInfo),
    #[serde(rename = "ContainerInfo")]
    Container(ContainerInfo),
}

impl AssetInfo {
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> AssetKind {
        match self {
            AssetInfo::VirtualMachine(_) => AssetKind::VirtualMachine,
            AssetInfo::ContainerImage(_) => AssetKind::ContainerImage,
            AssetInfo::Container(_) => AssetKind::Container,
        }
    }

    /// Stable identity used to detect an asset that was already discovered.
    #[must_use]
    pub fn identity(&self) -> String {
        match self {
            AssetInfo::VirtualMachine(vm) => format!("{}:{}", self.kind(), vm.instance_id),
            AssetInfo::ContainerImage(image) => format!("{}:{}", self.kind(), image.image_id),
            AssetInfo::Container(container) => {
                format!("{}:{}", self.kind(), container.container_id)
            }
        }
    }

    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            AssetInfo::VirtualMachine(vm) => Some(vm.location.as_str()),
            AssetInfo::ContainerImage(_) => None,
            AssetInfo::Container(container) => container.location.as_deref(),
        }
    }

    #[must_use]
    pub fn tags(&self) -> &[Tag] {
        match self {
            AssetInfo::VirtualMachine(vm) => &vm.tags,
            AssetInfo::ContainerImage(image) => &image.labels,
            AssetInfo::Container(container) => &container.labels,
        }
    }

    /// Rough size of the data a scanner has to read, in gigabytes.
    #[must_use]
    pub fn size_gb(&self) -> u64 {
        const GB: u64 = 1024 * 1024 * 1024;
        match self {
            AssetInfo::VirtualMachine(vm) => vm.root_volume.size_gb,
            AssetInfo::ContainerImage(image) => image.size.unwrap_or(0).div_ceil(GB),
            AssetInfo::Container(container) => container.image.size.unwrap_or(0).div_ceil(GB),
        }
    }

    /// Merge a fresh discovery of the same asset into this description.
    pub fn merge(self, other: AssetInfo) -> Result<AssetInfo, MergeError> {
        match (self, other) {
            (AssetInfo::ContainerImage(existing), AssetInfo::ContainerImage(found)) => {
                existing.merge(found).map(AssetInfo::ContainerImage)
            }
            (AssetInfo::Container(existing), AssetInfo::Container(mut found))
                if existing.container_id == found.container_id =>
            {
                found.image = existing.image.merge(found.image)?;
                Ok(AssetInfo::Container(found))
            }
            (AssetInfo::VirtualMachine(existing), AssetInfo::VirtualMachine(found))
                if existing.instance_id == found.instance_id =>
            {
                Ok(AssetInfo::VirtualMachine(found))
            }
            (left, right) => Err(MergeError {
                left: left.identity(),
                right: right.identity(),
            }),
        }
    }
}

impl fmt::Display for AssetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: Uuid,
    pub asset_info: AssetInfo,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminated_on: Option<DateTime<Utc>>,
}

impl Asset {
    /// A newly discovered asset, first and last seen at `seen`.
    #[inline]
    #[must_use]
    pub fn new(asset_info: AssetInfo, seen: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset_info,
            first_seen: seen,
            last_seen: seen,
            terminated_on: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_terminated(&self) -> bool {
        self.terminated_on.is_some()
    }
}

/// Selects the assets a scan applies to. Empty lists match everything;
/// every listed tag must be present on the asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetScope {
    #[serde(default)]
    pub kinds: Vec<AssetKind>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl AssetScope {
    #[must_use]
    pub fn matches(&self, info: &AssetInfo) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&info.kind()) {
            return false;
        }
        if !self.locations.is_empty() {
            match info.location() {
                Some(location) if self.locations.iter().any(|l| l == location) => {}
                _ => return false,
            }
        }
        let tags = info.tags();
        self.tags.iter().all(|tag| tags.contains(tag))
    }
}
