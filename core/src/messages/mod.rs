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

//! Message families embedded in host-chain transactions. Only the
//! issuance family lives in this crate; dispensers and asset groups are
//! collaborators it consults.

pub mod assetgroup;
pub mod dispenser;
pub mod issuance;
pub mod message_type;
