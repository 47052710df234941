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

//! Codec between 64-bit asset ids and their textual names, plus the
//! sub-asset long-name helpers.
//!
//! Ids 0 and 1 are reserved for the host-chain coin and the protocol's
//! native asset. Alphabetic names are big-endian base-26 over `A..=Z`,
//! at least four characters, and may not start with `A`; names starting
//! with `A` are the textual form of a numeric id above the alphabetic
//! namespace. Sub-asset long-names use a wider 67-symbol alphabet and
//! travel compacted as a big-endian base-68 integer with digit values
//! `1..=67`.

use num::bigint::BigUint;
use num::traits::{ToPrimitive, Zero};
use rand::{thread_rng, Rng};

/// Host-chain coin symbol, asset id 0. Never issuable.
pub const BTC: &str = "BTC";
/// Protocol native asset, asset id 1. Never issuable; pays issuance fees.
pub const XOB: &str = "XOB";

/// Floor of the alphabetic namespace; `BAAA` maps here.
pub const ALPHABETIC_ASSET_ID_MIN: u64 = 17_576; // 26^3
/// Smallest valid numeric asset id, one above the alphabetic namespace.
pub const NUMERIC_ASSET_ID_MIN: u64 = 95_428_956_661_682_177; // 26^12 + 1

const B26_DIGITS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SUBASSET_DIGITS: &str =
	"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789.-_@!";
const SUBASSET_NAME_MAX: usize = 250;

/// Errors raised by the name codecs.
#[derive(Debug, Clone, Eq, PartialEq, Fail)]
pub enum Error {
	/// An asset name that does not follow the naming rules.
	#[fail(display = "invalid asset name: {}", _0)]
	AssetName(&'static str),
	/// An asset id outside the representable namespaces.
	#[fail(display = "invalid asset id: {}", _0)]
	AssetId(&'static str),
}

/// A dotted sub-asset name split into its parent and full long form.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParsedSubasset {
	/// The parent asset's own (alphabetic) name.
	pub parent: String,
	/// The full `parent.child` long-name.
	pub longname: String,
}

/// Map an asset name to its 64-bit id.
///
/// `numeric_names` reflects whether the numeric namespace is open at the
/// height the name is evaluated for.
pub fn generate_asset_id(asset_name: &str, numeric_names: bool) -> Result<u64, Error> {
	if asset_name == BTC {
		return Ok(0);
	}
	if asset_name == XOB {
		return Ok(1);
	}
	if asset_name.len() < 4 {
		return Err(Error::AssetName("too short"));
	}

	if asset_name.starts_with('A') {
		// Numeric asset names.
		if !numeric_names {
			return Err(Error::AssetName("numeric asset names not enabled"));
		}
		let asset_id = asset_name[1..]
			.parse::<u64>()
			.map_err(|_| Error::AssetName("non-numeric asset name starts with 'A'"))?;
		if asset_id < NUMERIC_ASSET_ID_MIN {
			return Err(Error::AssetName("numeric asset name not in range"));
		}
		return Ok(asset_id);
	}

	// Alphabetic asset names.
	let mut asset_id: u64 = 0;
	for c in asset_name.chars() {
		let n = B26_DIGITS
			.find(c)
			.ok_or(Error::AssetName("invalid character in asset name"))? as u64;
		asset_id = asset_id
			.checked_mul(26)
			.and_then(|id| id.checked_add(n))
			.ok_or(Error::AssetName("asset name too long"))?;
	}
	if asset_id < ALPHABETIC_ASSET_ID_MIN {
		return Err(Error::AssetName("too short"));
	}
	Ok(asset_id)
}

/// Map a 64-bit asset id back to its name. Exact inverse of
/// [`generate_asset_id`] over valid ids.
pub fn generate_asset_name(asset_id: u64, numeric_names: bool) -> Result<String, Error> {
	if asset_id == 0 {
		return Ok(BTC.to_owned());
	}
	if asset_id == 1 {
		return Ok(XOB.to_owned());
	}
	if asset_id < ALPHABETIC_ASSET_ID_MIN {
		return Err(Error::AssetId("too low"));
	}
	if numeric_names && asset_id >= NUMERIC_ASSET_ID_MIN {
		return Ok(format!("A{}", asset_id));
	}

	let digits = B26_DIGITS.as_bytes();
	let mut name = Vec::new();
	let mut n = asset_id;
	while n > 0 {
		name.push(digits[(n % 26) as usize]);
		n /= 26;
	}
	name.reverse();
	Ok(String::from_utf8(name).expect("base-26 digits are ascii"))
}

/// Allocate a fresh random numeric-form asset name.
pub fn generate_random_asset() -> String {
	format!(
		"A{}",
		thread_rng().gen_range(NUMERIC_ASSET_ID_MIN, u64::max_value())
	)
}

/// Split a dotted asset name into parent and long form. Names without a
/// period are plain assets and yield `None`.
pub fn parse_subasset_from_asset_name(asset: &str) -> Result<Option<ParsedSubasset>, Error> {
	let idx = match asset.find('.') {
		Some(idx) => idx,
		None => return Ok(None),
	};
	let parent = &asset[..idx];
	let child = &asset[idx + 1..];

	validate_subasset_parent_name(parent)?;
	validate_subasset_longname(asset, child)?;

	Ok(Some(ParsedSubasset {
		parent: parent.to_owned(),
		longname: asset.to_owned(),
	}))
}

/// Check that a sub-asset parent is a well-formed alphabetic asset name.
pub fn validate_subasset_parent_name(parent: &str) -> Result<(), Error> {
	if parent == BTC || parent == XOB {
		return Err(Error::AssetName("parent asset name is reserved"));
	}
	if parent.len() < 4 {
		return Err(Error::AssetName("parent asset name too short"));
	}
	if parent.starts_with('A') {
		return Err(Error::AssetName("parent asset name must be alphabetic"));
	}
	if parent.chars().any(|c| !B26_DIGITS.contains(c)) {
		return Err(Error::AssetName("invalid character in parent asset name"));
	}
	Ok(())
}

/// Check a sub-asset long-name against the 67-symbol alphabet and the
/// period-placement rules.
pub fn validate_subasset_longname(longname: &str, child: &str) -> Result<(), Error> {
	if child.is_empty() {
		return Err(Error::AssetName("subasset name too short"));
	}
	if longname.len() > SUBASSET_NAME_MAX {
		return Err(Error::AssetName("subasset name too long"));
	}
	let mut previous = '.';
	for c in longname.chars() {
		if !SUBASSET_DIGITS.contains(c) {
			return Err(Error::AssetName("invalid character in subasset name"));
		}
		if c == '.' && previous == '.' {
			return Err(Error::AssetName("subasset name contains consecutive periods"));
		}
		previous = c;
	}
	if previous == '.' {
		return Err(Error::AssetName("subasset name ends with a period"));
	}
	Ok(())
}

/// Compact a sub-asset long-name into its base-68 big-endian byte form.
/// Digit values are alphabet index plus one, so the empty name is the
/// zero integer and encodes to zero bytes.
pub fn compact_subasset_longname(longname: &str) -> Result<Vec<u8>, Error> {
	let base = BigUint::from(68u32);
	let mut n = BigUint::zero();
	for c in longname.chars() {
		let digit = SUBASSET_DIGITS
			.find(c)
			.ok_or(Error::AssetName("invalid character in subasset name"))? as u32;
		n = &n * &base + BigUint::from(digit + 1);
	}
	if n.is_zero() {
		return Ok(Vec::new());
	}
	Ok(n.to_bytes_be())
}

/// Expand compacted bytes back into a sub-asset long-name. Never fails;
/// byte strings that did not come from [`compact_subasset_longname`] just
/// expand to a name that fails validation downstream.
pub fn expand_subasset_longname(raw: &[u8]) -> String {
	let mut n = BigUint::from_bytes_be(raw);
	if n.is_zero() {
		return String::new();
	}
	let base = BigUint::from(68u32);
	let digits = SUBASSET_DIGITS.as_bytes();
	let mut name = Vec::new();
	while !n.is_zero() {
		let rem = (&n % &base).to_usize().unwrap_or(0);
		// digit values are 1..=67 under divisor 68; a zero residue only
		// appears in encodings the compaction never produces, and wraps
		// to the last symbol instead of failing
		name.push(digits[(rem + 66) % 67]);
		n = &n / &base;
	}
	name.reverse();
	String::from_utf8(name).expect("alphabet symbols are ascii")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reserved_ids() {
		assert_eq!(generate_asset_id(BTC, false).unwrap(), 0);
		assert_eq!(generate_asset_id(XOB, false).unwrap(), 1);
		assert_eq!(generate_asset_name(0, false).unwrap(), BTC);
		assert_eq!(generate_asset_name(1, false).unwrap(), XOB);
	}

	#[test]
	fn alphabetic_round_trip() {
		for name in &["BAAA", "BANANA", "ZZZZZZZZZZZZ", "CDEFGHIJ"] {
			let id = generate_asset_id(name, false).unwrap();
			assert_eq!(&generate_asset_name(id, false).unwrap(), name);
		}
	}

	#[test]
	fn alphabetic_bounds() {
		// BAAA is the lowest issuable four-character name
		assert_eq!(
			generate_asset_id("BAAA", false).unwrap(),
			ALPHABETIC_ASSET_ID_MIN
		);
		assert_eq!(
			generate_asset_id("BAA", false).unwrap_err(),
			Error::AssetName("too short")
		);
		assert_eq!(
			generate_asset_id("B4NANA", false).unwrap_err(),
			Error::AssetName("invalid character in asset name")
		);
	}

	#[test]
	fn numeric_names_gated() {
		let name = format!("A{}", NUMERIC_ASSET_ID_MIN);
		assert_eq!(
			generate_asset_id(&name, true).unwrap(),
			NUMERIC_ASSET_ID_MIN
		);
		assert_eq!(
			generate_asset_id(&name, false).unwrap_err(),
			Error::AssetName("numeric asset names not enabled")
		);
		// one below the namespace floor
		assert_eq!(
			generate_asset_id(&format!("A{}", NUMERIC_ASSET_ID_MIN - 1), true).unwrap_err(),
			Error::AssetName("numeric asset name not in range")
		);
		assert_eq!(
			generate_asset_id("ABCD", true).unwrap_err(),
			Error::AssetName("non-numeric asset name starts with 'A'")
		);
	}

	#[test]
	fn numeric_round_trip() {
		let id = NUMERIC_ASSET_ID_MIN + 42;
		let name = generate_asset_name(id, true).unwrap();
		assert_eq!(name, format!("A{}", id));
		assert_eq!(generate_asset_id(&name, true).unwrap(), id);
	}

	#[test]
	fn high_ids_without_numeric_names_fall_back_to_base26() {
		let name = generate_asset_name(NUMERIC_ASSET_ID_MIN + 1, false).unwrap();
		assert!(!name.starts_with('A'));
		assert!(name.len() >= 13);
	}

	#[test]
	fn random_asset_in_numeric_range() {
		for _ in 0..16 {
			let name = generate_random_asset();
			let id = generate_asset_id(&name, true).unwrap();
			assert!(id >= NUMERIC_ASSET_ID_MIN);
		}
	}

	#[test]
	fn parse_subasset_names() {
		assert_eq!(parse_subasset_from_asset_name("BANANA").unwrap(), None);
		let parsed = parse_subasset_from_asset_name("BANANA.split")
			.unwrap()
			.unwrap();
		assert_eq!(parsed.parent, "BANANA");
		assert_eq!(parsed.longname, "BANANA.split");

		assert!(parse_subasset_from_asset_name("AXX.child").is_err());
		assert!(parse_subasset_from_asset_name("BTC.child").is_err());
		assert!(parse_subasset_from_asset_name("BANANA.").is_err());
		assert!(parse_subasset_from_asset_name("BANANA..x").is_err());
		assert!(parse_subasset_from_asset_name("BANANA.sp it").is_err());
	}

	#[test]
	fn subasset_longname_rules() {
		assert!(validate_subasset_longname("BANANA.a-b_c@d!e.9", "a-b_c@d!e.9").is_ok());
		assert_eq!(
			validate_subasset_longname("BANANA.", "").unwrap_err(),
			Error::AssetName("subasset name too short")
		);
		let long = format!("BANANA.{}", "a".repeat(250));
		assert_eq!(
			validate_subasset_longname(&long, &long[7..]).unwrap_err(),
			Error::AssetName("subasset name too long")
		);
		assert_eq!(
			validate_subasset_longname(".BANANA.x", "x").unwrap_err(),
			Error::AssetName("subasset name contains consecutive periods")
		);
	}

	#[test]
	fn compact_expand_round_trip() {
		for name in &["", "a", "!", "BANANA.split", "G.nft1", "x.y-z_0@9!"] {
			let compacted = compact_subasset_longname(name).unwrap();
			assert_eq!(&expand_subasset_longname(&compacted), name);
		}
	}

	#[test]
	fn compact_is_minimal() {
		// single first-symbol digit packs to one byte of value one
		assert_eq!(compact_subasset_longname("a").unwrap(), vec![1]);
		assert_eq!(compact_subasset_longname("ab").unwrap(), vec![70]);
		// the last alphabet symbol carries the top digit value, 67
		assert_eq!(compact_subasset_longname("!").unwrap(), vec![67]);
	}

	#[test]
	fn foreign_zero_residues_expand_without_panicking() {
		// digit values stop at 67, so a byte string with a residue of
		// zero mod 68 never comes from the compaction. Peers can still
		// put one on the wire; it must expand (to a name with a spurious
		// leading 'a'), not crash, and downstream validation rejects it.
		assert_eq!(expand_subasset_longname(&[68]), "a!");
		assert_eq!(expand_subasset_longname(&[136]), "b!");
		assert_eq!(expand_subasset_longname(&[204]), "c!");
	}

	#[test]
	fn compact_rejects_foreign_symbols() {
		assert!(compact_subasset_longname("white space").is_err());
		assert!(compact_subasset_longname("émoji").is_err());
	}
}
