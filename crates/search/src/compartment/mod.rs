//! Compartment membership.
//!
//! A compartment groups the resources that belong to one Patient, Encounter,
//! Practitioner, RelatedPerson or Device. Membership is decided from a
//! resource's search index: the compartment definition names the reference
//! parameters linking each resource type to each compartment type, and every
//! resource id found under those parameters is an owner.
//!
//! - [`definitions`] - which parameters link a resource type to a compartment
//! - [`indexer`] - builds [`CompartmentIndices`] from index entries

pub mod definitions;
pub mod indexer;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use definitions::{CompartmentDefinitionRegistry, CompartmentDefinitionRegistryBuilder, CompartmentLookup};
pub use indexer::CompartmentIndexer;

/// The standard compartment types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CompartmentType {
    /// Resources about one patient.
    Patient,
    /// Resources recorded during one encounter.
    Encounter,
    /// Resources involving one device.
    Device,
    /// Resources involving one practitioner.
    Practitioner,
    /// Resources involving one related person.
    RelatedPerson,
}

impl CompartmentType {
    /// Every compartment type, in indexing order.
    pub const ALL: [CompartmentType; 5] = [
        CompartmentType::Patient,
        CompartmentType::Encounter,
        CompartmentType::Device,
        CompartmentType::Practitioner,
        CompartmentType::RelatedPerson,
    ];

    /// The resource type that owns this compartment.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompartmentType::Patient => "Patient",
            CompartmentType::Encounter => "Encounter",
            CompartmentType::Device => "Device",
            CompartmentType::Practitioner => "Practitioner",
            CompartmentType::RelatedPerson => "RelatedPerson",
        }
    }
}

impl fmt::Display for CompartmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompartmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompartmentType::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown compartment type: {}", s))
    }
}

/// Resource ids compared case-insensitively.
///
/// The casing of the first insertion is kept for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceIdSet {
    ids: BTreeMap<String, String>,
}

impl ResourceIdSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id`; returns false if an id equal ignoring case is present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        let key = id.to_lowercase();
        if self.ids.contains_key(&key) {
            return false;
        }
        self.ids.insert(key, id);
        true
    }

    /// Returns true if `id` is present, ignoring case.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(&id.to_lowercase())
    }

    /// Number of distinct ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates the ids in their original casing.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.values().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ResourceIdSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = ResourceIdSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// Compartment owners of one resource.
///
/// Compartment types without owners are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompartmentIndices {
    compartments: BTreeMap<CompartmentType, ResourceIdSet>,
}

impl CompartmentIndices {
    /// Creates empty indices.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, compartment: CompartmentType, id: &str) {
        self.compartments.entry(compartment).or_default().insert(id);
    }

    /// Owners in `compartment`, if any.
    pub fn get(&self, compartment: CompartmentType) -> Option<&ResourceIdSet> {
        self.compartments.get(&compartment)
    }

    /// Returns true if `id` owns this resource in `compartment`.
    pub fn contains(&self, compartment: CompartmentType, id: &str) -> bool {
        self.get(compartment).is_some_and(|ids| ids.contains(id))
    }

    /// Every compartment type in which `id` is an owner.
    pub fn compartments_of(&self, id: &str) -> Vec<CompartmentType> {
        self.compartments
            .iter()
            .filter(|(_, ids)| ids.contains(id))
            .map(|(compartment, _)| *compartment)
            .collect()
    }

    /// Number of compartment types with owners.
    pub fn len(&self) -> usize {
        self.compartments.len()
    }

    /// Returns true if the resource belongs to no compartment.
    pub fn is_empty(&self) -> bool {
        self.compartments.is_empty()
    }

    /// Iterates compartment types and their owners.
    pub fn iter(&self) -> impl Iterator<Item = (CompartmentType, &ResourceIdSet)> {
        self.compartments.iter().map(|(c, ids)| (*c, ids))
    }
}
