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

//! # NetBind store
//!
//! In-memory transactional store for the address-binding control plane.
//!
//! The [store::MemStore] hands out snapshot-isolated [store::Transaction]s
//! over a [dataset::Dataset]. Commits detect competing writes
//! ([store::StoreError::WriteConflict], retryable) and enforce uniqueness
//! constraints at commit time ([store::StoreError::UniqueViolation], not
//! retryable). [locks::AdvisoryLocks] provides named exclusive locks with
//! RAII guards, and [retry::RetryPolicy] is the bounded retry loop callers
//! wrap mutating operations in.

pub mod dataset;
pub mod locks;
pub mod retry;
pub mod store;
