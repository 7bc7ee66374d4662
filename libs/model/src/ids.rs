// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Row identifiers and opaque name newtypes.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Identifier of a dataset row.
///
/// Identifiers are assigned sequentially by the dataset on insert, so a lower
/// identifier means an earlier creation. Ordering logic (oldest-record
/// tiebreaks) relies on this.
pub trait Id {
    /// Creates an identifier from a `usize`.
    fn from_usize(val: usize) -> Self;
    /// Returns the identifier as a `usize`.
    fn as_usize(&self) -> usize;
}

/// Allocation pool identifier.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct PoolId(usize);

impl Id for PoolId {
    fn from_usize(val: usize) -> Self {
        Self(val)
    }

    fn as_usize(&self) -> usize {
        self.0
    }
}

/// Host identifier.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct HostId(usize);

impl Id for HostId {
    fn from_usize(val: usize) -> Self {
        Self(val)
    }

    fn as_usize(&self) -> usize {
        self.0
    }
}

/// Network interface identifier.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct InterfaceId(usize);

impl Id for InterfaceId {
    fn from_usize(val: usize) -> Self {
        Self(val)
    }

    fn as_usize(&self) -> usize {
        self.0
    }
}

/// Address record identifier.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct RecordId(usize);

impl Id for RecordId {
    fn from_usize(val: usize) -> Self {
        Self(val)
    }

    fn as_usize(&self) -> usize {
        self.0
    }
}

/// A DNS domain name, e.g. `example.com`.
#[derive(
    Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct DomainName(pub String);

impl From<&str> for DomainName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Name of one allocation scope: the pools whose leases are observed and
/// reconciled together.
#[derive(
    Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ScopeName(pub String);

impl From<&str> for ScopeName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque reference to a principal in the external user system.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(pub String);

impl From<&str> for Principal {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
