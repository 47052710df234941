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

//! Process-wide network mode. Set once by the host at startup; the test
//! networks unconditionally enable protocol-version branches that mainnet
//! phases in by block height.

use crate::util::RwLock;

/// Types of chain a process can run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainTypes {
	/// Main production network.
	Mainnet,
	/// Public test network.
	Testnet,
	/// Local regression-test network.
	Regtest,
}

impl Default for ChainTypes {
	fn default() -> ChainTypes {
		ChainTypes::Mainnet
	}
}

lazy_static! {
	/// The network mode this process runs against.
	pub static ref CHAIN_TYPE: RwLock<ChainTypes> = RwLock::new(ChainTypes::Mainnet);
}

/// Set the network mode.
pub fn set_chain_type(new_type: ChainTypes) {
	*CHAIN_TYPE.write() = new_type;
}

/// The network mode this process runs against.
pub fn get_chain_type() -> ChainTypes {
	*CHAIN_TYPE.read()
}

/// Whether the process runs against the public test network.
pub fn is_testnet() -> bool {
	get_chain_type() == ChainTypes::Testnet
}

/// Whether the process runs against a local regression-test network.
pub fn is_regtest() -> bool {
	get_chain_type() == ChainTypes::Regtest
}
