// Copyright 2021 The Obol Developers
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

//! The consensus-critical message layer of the obol protocol.
//!
//! Issuance payloads are embedded in host-chain transactions; this crate
//! decodes them, validates them against prior ledger state and the
//! height-indexed protocol gates, and applies the resulting ledger
//! mutations. The host block loop owns the ledger handle and feeds
//! transactions through [`messages::issuance::parse`] one at a time, in
//! `tx_index` order.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate failure_derive;

pub use util;

pub mod consensus;
pub mod global;
pub mod ledger;
pub mod messages;
