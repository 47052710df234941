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

//! Dispenser hook. The dispenser message family is handled outside this
//! crate; issuance only needs to know whether an asset currently backs
//! an open dispenser.

use crate::ledger::{Error, Ledger};

/// Status code of an open dispenser row.
pub const STATUS_OPEN: i64 = 0;
/// Status code of a closed dispenser row.
pub const STATUS_CLOSED: i64 = 10;

/// Whether any dispenser is currently open on `asset`.
pub fn is_opened(ledger: &Ledger, asset: &str) -> Result<bool, Error> {
	ledger.dispenser_with_status_exists(asset, STATUS_OPEN)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn open_and_closed_rows() {
		let ledger = Ledger::open_in_memory().unwrap();
		assert!(!is_opened(&ledger, "BANANA").unwrap());

		ledger.insert_dispenser(1, "BANANA", STATUS_CLOSED).unwrap();
		assert!(!is_opened(&ledger, "BANANA").unwrap());

		ledger.insert_dispenser(2, "BANANA", STATUS_OPEN).unwrap();
		assert!(is_opened(&ledger, "BANANA").unwrap());
	}
}
