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

//! # NetBind model
//!
//! Domain types for the address-binding control plane.
//!
//! # Organisation
//!
//! - [`ids`] holds the row identifiers and the opaque string newtypes
//!   ([`ids::DomainName`], [`ids::ScopeName`], [`ids::Principal`]).
//! - [`addr`] holds hardware addresses ([`addr::MacAddr`]), the address
//!   family tag, and the mapping between IP addresses and the numeric keys
//!   used for range arithmetic.
//! - [`record`] holds address records and their allocation kinds.
//! - [`interface`] holds network interfaces and the tagged interface kind.
//! - [`host`] holds hosts and fully-qualified names.
//! - [`network`] holds the configuration-owned lookup rows: subnets and
//!   allocation pools.

pub mod addr;
pub mod host;
pub mod ids;
pub mod interface;
pub mod network;
pub mod record;

pub use addr::{AddrFamily, MacAddr};
pub use host::{Fqdn, Host};
pub use ids::{DomainName, HostId, Id, InterfaceId, PoolId, Principal, RecordId, ScopeName};
pub use interface::{Interface, InterfaceKind};
pub use network::{Pool, Subnet};
pub use record::{AddressRecord, AllocationKind};
