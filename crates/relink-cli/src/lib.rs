// Copyright 2025 relink Authors
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

//! # relink CLI
//!
//! Command-line front end for the relink client.
//!
//! ## Key Commands
//!
//! - `relink connect`: connect to a host and exchange console lines (or heartbeats)
//! - `relink echo`: run the framed echo peer for local testing

pub mod console;
