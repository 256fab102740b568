//! Volume Handle Parsing
//!
//! CSI volume handles for GCE persistent disks carry the disk coordinates as
//! a slash-delimited path, e.g.
//! `projects/my-project/zones/us-central1-a/disks/my-disk`.

use crate::error::{Error, Result};

/// Resource coordinates of a GCE persistent disk, extracted from a CSI
/// volume handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeHandle {
    /// GCP project ID
    pub project: String,
    /// Zone (or region for regional disks)
    pub location: String,
    /// Disk name
    pub name: String,
}

impl VolumeHandle {
    /// Parse a volume handle into disk coordinates.
    ///
    /// The handle is purely positional: segments 1, 3 and 5 are taken as
    /// project, location and name. The literal segments in between are not
    /// inspected, and no content validation is applied to the extracted
    /// values. Extra trailing segments are ignored.
    pub fn parse(id: &str) -> Result<Self> {
        let parts: Vec<&str> = id.split('/').collect();
        if parts.len() < 6 {
            return Err(Error::MalformedVolumeHandle(id.to_string()));
        }
        Ok(Self {
            project: parts[1].to_string(),
            location: parts[3].to_string(),
            name: parts[5].to_string(),
        })
    }
}

impl std::fmt::Display for VolumeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "projects/{}/zones/{}/disks/{}",
            self.project, self.location, self.name
        )
    }
}
