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

//! Registry of non-fungible asset groups.
//!
//! A non-fungible long-name such as `G.nft1` lives in the group named by
//! the component before the first period. Groups belong to the address
//! that first registered into them; later registrations by anyone else
//! are rejected during validation.

use crate::ledger::{AssetGroupRow, Error, Ledger};

/// Problems blocking a non-fungible issuance of `longname` by `source`.
pub fn validate(ledger: &Ledger, longname: &str, source: &str) -> Result<Vec<String>, Error> {
	let mut problems = Vec::new();
	if let Some(owner) = ledger.assetgroup_owner(&group_of(longname))? {
		if owner != source {
			problems.push("asset group owned by another address".to_owned());
		}
	}
	Ok(problems)
}

/// Record a non-fungible registration. Rows are kept for non-valid
/// statuses too, mirroring how issuance rows persist their status.
pub fn create(
	ledger: &Ledger,
	tx_index: i64,
	tx_hash: &str,
	block_index: u64,
	longname: Option<&str>,
	issuer: &str,
	status: &str,
) -> Result<(), Error> {
	let longname = longname.unwrap_or_default();
	ledger.insert_assetgroup(&AssetGroupRow {
		tx_index,
		tx_hash: tx_hash.to_owned(),
		block_index: block_index as i64,
		asset_group: group_of(longname),
		asset_longname: longname.to_owned(),
		owner: issuer.to_owned(),
		status: status.to_owned(),
	})
}

/// The group key is everything before the first period.
fn group_of(longname: &str) -> String {
	longname.split('.').next().unwrap_or_default().to_owned()
}
