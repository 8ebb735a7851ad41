// MinIO Rust Library for Overture Maps GeoParquet Extraction
// Copyright 2025 MinIO, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Test support: an in-memory Overture-shaped dataset and instrumented collaborators.

pub mod cleanup_guard;
pub mod fixtures;
pub mod recording_store;
pub mod test_context;
pub mod utils;
