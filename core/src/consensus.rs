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

//! Protocol constants and the named feature-gate schedule.
//!
//! Every named gate activates at a fixed height per network; historical
//! replay must resolve each gate the same way at every height forever,
//! so entries are never edited once shipped, only appended.

use crate::global::{self, ChainTypes};

pub use crate::util::asset_name::{BTC, XOB};

/// Base-unit multiplier for native-asset amounts.
pub const UNIT: u64 = 100_000_000;

/// Ledger ceiling on quantities, fees and call dates.
pub const MAX_INT: i64 = i64::max_value();

struct ProtocolChange {
	name: &'static str,
	mainnet: u64,
	testnet: u64,
	regtest: u64,
}

/// Activation schedule. Test networks activate everything from genesis
/// except where a rollout needed staging on testnet too.
const PROTOCOL_CHANGES: &[ProtocolChange] = &[
	ProtocolChange {
		name: "numeric_asset_names",
		mainnet: 285_000,
		testnet: 0,
		regtest: 0,
	},
	ProtocolChange {
		name: "subassets",
		mainnet: 290_000,
		testnet: 0,
		regtest: 0,
	},
	ProtocolChange {
		name: "non_fungible_assets",
		mainnet: 295_000,
		testnet: 0,
		regtest: 0,
	},
	ProtocolChange {
		name: "delisted_assets",
		mainnet: 300_000,
		testnet: 0,
		regtest: 0,
	},
	ProtocolChange {
		name: "non_reassignable_assets",
		mainnet: 300_000,
		testnet: 0,
		regtest: 0,
	},
	ProtocolChange {
		name: "issuance_lock_fix",
		mainnet: 302_000,
		testnet: 0,
		regtest: 0,
	},
	ProtocolChange {
		name: "utf-8_codec_fixes",
		mainnet: 302_000,
		testnet: 0,
		regtest: 0,
	},
	ProtocolChange {
		name: "enable_vendable_fix",
		mainnet: 308_000,
		testnet: 0,
		regtest: 0,
	},
	ProtocolChange {
		name: "integer_overflow_fix",
		mainnet: 308_000,
		testnet: 0,
		regtest: 0,
	},
	ProtocolChange {
		name: "dispensers",
		mainnet: 315_000,
		testnet: 0,
		regtest: 0,
	},
	ProtocolChange {
		name: "fee_revision_2021_1q",
		mainnet: 400_000,
		testnet: 390_000,
		regtest: 0,
	},
];

/// Whether the named protocol change is active at `height` on `chain`.
/// Unknown names are never active.
pub fn enabled_at(chain: ChainTypes, name: &str, height: u64) -> bool {
	for change in PROTOCOL_CHANGES {
		if change.name == name {
			let activation = match chain {
				ChainTypes::Mainnet => change.mainnet,
				ChainTypes::Testnet => change.testnet,
				ChainTypes::Regtest => change.regtest,
			};
			return height >= activation;
		}
	}
	false
}

/// Whether the named protocol change is active at `height` on the
/// process-wide network.
pub fn enabled(name: &str, height: u64) -> bool {
	enabled_at(global::get_chain_type(), name, height)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn gates_flip_at_activation() {
		assert!(!enabled_at(
			ChainTypes::Mainnet,
			"numeric_asset_names",
			284_999
		));
		assert!(enabled_at(
			ChainTypes::Mainnet,
			"numeric_asset_names",
			285_000
		));
		assert!(enabled_at(ChainTypes::Mainnet, "subassets", 290_000));
		assert!(!enabled_at(ChainTypes::Mainnet, "subassets", 289_999));
	}

	#[test]
	fn test_networks_activate_from_genesis() {
		assert!(enabled_at(ChainTypes::Testnet, "subassets", 0));
		assert!(enabled_at(ChainTypes::Regtest, "integer_overflow_fix", 0));
		// staged rollouts still gate on testnet
		assert!(!enabled_at(
			ChainTypes::Testnet,
			"fee_revision_2021_1q",
			100_000
		));
	}

	#[test]
	fn unknown_gates_are_inactive() {
		assert!(!enabled_at(ChainTypes::Mainnet, "sharding", u64::max_value()));
		assert!(!enabled_at(ChainTypes::Regtest, "", 0));
	}
}
