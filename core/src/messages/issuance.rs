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

//! Asset issuance messages: wire codec, validation, composition and
//! parsing.
//!
//! Everything here is consensus-critical and history-sensitive. The
//! wire layouts, the order and wording of validation problems, the fee
//! schedule and the persisted fields must replay identically for every
//! historical block, so changes ship behind height-indexed gates in
//! [`crate::consensus`] and the old branches stay in place forever.

#![allow(missing_docs)]

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use crate::consensus;
use crate::global;
use crate::ledger::{self, AssetRow, IssuanceRow, Ledger};
use crate::messages::{assetgroup, dispenser, message_type};
use crate::util::asset_name;

/// Standard issuance message type.
pub const ID: u32 = 20;
/// Sub-asset issuance message type.
pub const SUBASSET_ID: u32 = 21;

// Fixed-part lengths of the three wire layouts.
const LENGTH_1: usize = 8 + 8 + 1;
const LENGTH_2: usize = 8 + 8 + 1 + 1 + 4 + 4;
const SUBASSET_LENGTH: usize = 8 + 8 + 1 + 1;

// Descriptions up to this many bytes travel length-prefixed; longer ones
// as a raw tail. Historical boundary, never to be moved.
const PASCAL_MAX: usize = 42;

/// Errors surfaced by the issuance message layer.
#[derive(Debug, Fail)]
pub enum Error {
	/// The payload does not decode under any supported layout.
	#[fail(display = "could not unpack issuance message")]
	Unpack,
	/// Validation rejected a composed issuance.
	#[fail(display = "issuance rejected: {:?}", _0)]
	Compose(Vec<String>),
	/// Asset or sub-asset name rejected by the codec.
	#[fail(display = "{}", _0)]
	AssetName(asset_name::Error),
	/// Ledger store failure, fatal.
	#[fail(display = "{}", _0)]
	Ledger(ledger::Error),
}

impl From<ledger::Error> for Error {
	fn from(e: ledger::Error) -> Error {
		Error::Ledger(e)
	}
}

impl From<asset_name::Error> for Error {
	fn from(e: asset_name::Error) -> Error {
		Error::AssetName(e)
	}
}

/// Field values decoded from an issuance payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuanceBody {
	pub asset_id: u64,
	pub quantity: u64,
	pub divisible: bool,
	pub listed: bool,
	pub reassignable: bool,
	pub vendable: bool,
	pub fungible: bool,
	pub callable: bool,
	pub call_date: i64,
	pub call_price: f64,
	pub description: String,
	/// Expanded long-name, sub-asset (type 21) messages only.
	pub subasset_longname: Option<String>,
}

// Bit 0 is positive, bits 1-4 are negative. This matches wire bytes
// produced by existing peers and cannot change.
fn flags_byte(
	divisible: bool,
	listed: bool,
	reassignable: bool,
	vendable: bool,
	fungible: bool,
) -> u8 {
	(if divisible { 1 } else { 0 })
		| (if listed { 0 } else { 2 })
		| (if reassignable { 0 } else { 4 })
		| (if vendable { 0 } else { 8 })
		| (if fungible { 0 } else { 16 })
}

fn split_flags(flags: u8) -> (bool, bool, bool, bool, bool) {
	(
		flags & 1 != 0,
		flags & 2 == 0,
		flags & 4 == 0,
		flags & 8 == 0,
		flags & 16 == 0,
	)
}

// Wire call prices are IEEE-754 f32; after widening they are rounded to
// six decimals with ties-to-even, which peers rely on bit-for-bit.
fn round_call_price(price: f32) -> f64 {
	(f64::from(price) * 1_000_000.0).round_ties_even() / 1_000_000.0
}

fn decode_description(raw: &[u8], block_index: u64) -> String {
	match std::str::from_utf8(raw) {
		Ok(s) => s.to_owned(),
		Err(_) => {
			if consensus::enabled("utf-8_codec_fixes", block_index) {
				String::from_utf8_lossy(raw).into_owned()
			} else {
				String::new()
			}
		}
	}
}

/// Decode an issuance payload (the message-type byte already stripped).
pub fn unpack(message: &[u8], message_type_id: u32, block_index: u64) -> Result<IssuanceBody, Error> {
	if message_type_id == SUBASSET_ID {
		if !consensus::enabled("subassets", block_index) {
			warn!("sub-asset issuance before activation at block {}", block_index);
			return Err(Error::Unpack);
		}
		unpack_subasset(message, block_index)
	} else {
		unpack_standard(message, block_index)
	}
}

fn unpack_standard(message: &[u8], block_index: u64) -> Result<IssuanceBody, Error> {
	if (block_index > 283_271 || global::is_testnet() || global::is_regtest())
		&& message.len() >= LENGTH_2
	{
		let mut cursor = Cursor::new(message);
		let asset_id = cursor.read_u64::<BigEndian>().map_err(|_| Error::Unpack)?;
		let quantity = cursor.read_u64::<BigEndian>().map_err(|_| Error::Unpack)?;
		let flags = cursor.read_u8().map_err(|_| Error::Unpack)?;
		let callable = cursor.read_u8().map_err(|_| Error::Unpack)? != 0;
		let call_date = i64::from(cursor.read_u32::<BigEndian>().map_err(|_| Error::Unpack)?);
		let call_price =
			round_call_price(cursor.read_f32::<BigEndian>().map_err(|_| Error::Unpack)?);

		let tail = &message[LENGTH_2..];
		let raw_description: &[u8] = if tail.len() <= PASCAL_MAX {
			// length-prefixed short form; the prefix wins over the tail
			match tail.split_first() {
				Some((len, rest)) => &rest[..rest.len().min(usize::from(*len))],
				None => &[],
			}
		} else {
			tail
		};
		let description = decode_description(raw_description, block_index);

		let (divisible, listed, reassignable, vendable, fungible) = split_flags(flags);
		Ok(IssuanceBody {
			asset_id,
			quantity,
			divisible,
			listed,
			reassignable,
			vendable,
			fungible,
			callable,
			call_date,
			call_price,
			description,
			subasset_longname: None,
		})
	} else {
		if message.len() != LENGTH_1 {
			return Err(Error::Unpack);
		}
		let mut cursor = Cursor::new(message);
		let asset_id = cursor.read_u64::<BigEndian>().map_err(|_| Error::Unpack)?;
		let quantity = cursor.read_u64::<BigEndian>().map_err(|_| Error::Unpack)?;
		// the legacy layout carried a bare bool, so only divisibility
		// survives; the negative flags read as set
		let divisible = cursor.read_u8().map_err(|_| Error::Unpack)? != 0;
		Ok(IssuanceBody {
			asset_id,
			quantity,
			divisible,
			listed: true,
			reassignable: true,
			vendable: true,
			fungible: true,
			callable: false,
			call_date: 0,
			call_price: 0.0,
			description: String::new(),
			subasset_longname: None,
		})
	}
}

fn unpack_subasset(message: &[u8], block_index: u64) -> Result<IssuanceBody, Error> {
	if message.len() < SUBASSET_LENGTH {
		return Err(Error::Unpack);
	}
	let mut cursor = Cursor::new(message);
	let asset_id = cursor.read_u64::<BigEndian>().map_err(|_| Error::Unpack)?;
	let quantity = cursor.read_u64::<BigEndian>().map_err(|_| Error::Unpack)?;
	let flags = cursor.read_u8().map_err(|_| Error::Unpack)?;
	let compacted_length = usize::from(cursor.read_u8().map_err(|_| Error::Unpack)?);

	let remaining = message.len() - SUBASSET_LENGTH;
	if compacted_length > remaining {
		warn!(
			"invalid sub-asset name length {} with {} trailing bytes",
			compacted_length, remaining
		);
		return Err(Error::Unpack);
	}
	let compacted = &message[SUBASSET_LENGTH..SUBASSET_LENGTH + compacted_length];
	let description = decode_description(&message[SUBASSET_LENGTH + compacted_length..], block_index);
	let subasset_longname = asset_name::expand_subasset_longname(compacted);

	let (divisible, listed, reassignable, vendable, fungible) = split_flags(flags);
	Ok(IssuanceBody {
		asset_id,
		quantity,
		divisible,
		listed,
		reassignable,
		vendable,
		fungible,
		callable: false,
		call_date: 0,
		call_price: 0.0,
		description,
		subasset_longname: Some(subasset_longname),
	})
}

/// Serialise a standard (type 20) issuance, message-type byte included.
pub fn pack_standard(
	asset_id: u64,
	quantity: u64,
	flags: u8,
	callable: bool,
	call_date: i64,
	call_price: f64,
	description: &str,
) -> Vec<u8> {
	let mut data = message_type::pack(ID);
	data.extend_from_slice(&asset_id.to_be_bytes());
	data.extend_from_slice(&quantity.to_be_bytes());
	data.push(flags);
	data.push(if callable { 1 } else { 0 });
	data.extend_from_slice(&(call_date as u32).to_be_bytes());
	data.extend_from_slice(&(call_price as f32).to_be_bytes());
	let description = description.as_bytes();
	if description.len() <= PASCAL_MAX {
		data.push(description.len() as u8);
	}
	data.extend_from_slice(description);
	data
}

/// Serialise a sub-asset (type 21) issuance, message-type byte included.
pub fn pack_subasset(
	asset_id: u64,
	quantity: u64,
	flags: u8,
	compacted_longname: &[u8],
	description: &str,
) -> Vec<u8> {
	let mut data = message_type::pack(SUBASSET_ID);
	data.extend_from_slice(&asset_id.to_be_bytes());
	data.extend_from_slice(&quantity.to_be_bytes());
	data.push(flags);
	data.push(compacted_longname.len() as u8);
	data.extend_from_slice(compacted_longname);
	data.extend_from_slice(description.as_bytes());
	data
}

/// A candidate issuance before default resolution. `None` fields take
/// protocol defaults inside [`validate`].
#[derive(Debug, Clone, Default)]
pub struct CandidateIssuance {
	pub source: String,
	pub destination: Option<String>,
	pub asset: String,
	pub quantity: u64,
	pub divisible: Option<bool>,
	pub listed: Option<bool>,
	pub reassignable: Option<bool>,
	pub vendable: Option<bool>,
	pub fungible: Option<bool>,
	pub callable: bool,
	pub call_date: Option<i64>,
	pub call_price: Option<f64>,
	pub description: Option<String>,
	pub subasset_parent: Option<String>,
	pub subasset_longname: Option<String>,
}

/// Validator output: resolved fields, the problems list and the fee.
#[derive(Debug, Clone)]
pub struct Validated {
	pub call_date: i64,
	pub call_price: f64,
	/// Problems in evaluation order; empty means the issuance is valid.
	pub problems: Vec<String>,
	/// Fee in base units of the native asset.
	pub fee: u64,
	pub description: String,
	pub divisible: bool,
	pub listed: bool,
	pub reassignable: bool,
	pub vendable: bool,
	pub fungible: bool,
	/// Whether the asset already has a valid issuance.
	pub reissuance: bool,
	/// Long-name registered for the asset, when reissuing a sub-asset.
	pub reissued_asset_longname: Option<String>,
}

/// Validate a candidate issuance against prior ledger state at
/// `block_index`. Problems accumulate in a fixed order; their joined
/// text is consensus-visible as the stored status.
pub fn validate(
	ledger: &Ledger,
	candidate: &CandidateIssuance,
	block_index: u64,
) -> Result<Validated, Error> {
	let mut problems = Vec::new();
	let mut fee: u64 = 0;

	if candidate.asset == consensus::BTC || candidate.asset == consensus::XOB {
		problems.push(format!(
			"cannot issue {} or {}",
			consensus::BTC,
			consensus::XOB
		));
	}

	let mut call_date = candidate.call_date.unwrap_or(0);
	let mut call_price = candidate.call_price.unwrap_or(0.0);
	let description = candidate.description.clone().unwrap_or_default();
	let divisible = candidate.divisible.unwrap_or(true);
	let listed = candidate.listed.unwrap_or(true);
	let reassignable = candidate.reassignable.unwrap_or(true);
	let vendable = candidate.vendable.unwrap_or(true);
	let fungible = candidate.fungible.unwrap_or(true);

	if consensus::enabled("non_fungible_assets", block_index) {
		if !fungible {
			if divisible {
				problems.push("Cannot create the asset with non-fungible and divisible".to_owned());
			} else if candidate.quantity != 1 {
				problems.push("non-fungible asset can issue only 1 asset".to_owned());
			}
		}
	} else if !fungible {
		problems.push("non-fungible assets not enabled".to_owned());
	}

	if call_price < 0.0 {
		problems.push("negative call price".to_owned());
	}
	if call_date < 0 {
		problems.push("negative call date".to_owned());
	}

	// Callable, or not.
	if !candidate.callable {
		if block_index >= 312_500 || global::is_testnet() || global::is_regtest() {
			call_date = 0;
			call_price = 0.0;
		} else if block_index >= 310_000 {
			if call_date != 0 {
				problems.push("call date for non-callable asset".to_owned());
			}
			if call_price != 0.0 {
				problems.push("call price for non-callable asset".to_owned());
			}
		}
	}

	// Valid re-issuance?
	let issuances = ledger.valid_issuances(&candidate.asset)?;
	let mut reissued_asset_longname = None;
	let reissuance;
	if let Some(last) = issuances.last() {
		reissuance = true;
		reissued_asset_longname = last.asset_longname.clone();

		let issuance_locked = if consensus::enabled("issuance_lock_fix", block_index) {
			issuances.iter().any(|row| row.locked)
		} else {
			// before the lock fix only the latest issuance was checked
			last.locked
		};

		if last.issuer.as_deref() != Some(candidate.source.as_str()) {
			problems.push("issued by another address".to_owned());
		}
		if last.divisible.unwrap_or(false) != divisible {
			problems.push("cannot change divisibility".to_owned());
		}
		if last.listed.unwrap_or(false) != listed {
			problems.push("cannot change listing flag".to_owned());
		}
		if last.reassignable.unwrap_or(false) != reassignable {
			problems.push("cannot change reassignable flag".to_owned());
		}
		if last.vendable.unwrap_or(false) != vendable {
			// a NULL cell is not a stored false here
			if last.vendable == Some(false)
				|| consensus::enabled("enable_vendable_fix", block_index)
			{
				problems.push("Cannot change vendable flag".to_owned());
			} else if dispenser::is_opened(ledger, &candidate.asset)? {
				problems
					.push("Cannot change vendable flag because the asset is dispending".to_owned());
			}
		}
		if last.callable.unwrap_or(false) != candidate.callable {
			problems.push("cannot change callability".to_owned());
		}
		if last.call_date.unwrap_or(0) > call_date
			&& (call_date != 0
				|| (block_index < 312_500 && (!global::is_testnet() || !global::is_regtest())))
		{
			problems.push("cannot advance call date".to_owned());
		}
		if last.call_price.unwrap_or(0.0) > call_price {
			problems.push("cannot reduce call price".to_owned());
		}
		if issuance_locked && candidate.quantity != 0 {
			problems.push("locked asset and non-zero quantity".to_owned());
		}
	} else {
		reissuance = false;
		if description.to_lowercase() == "lock" && fungible {
			problems.push("cannot lock a non-existent asset".to_owned());
		}
		if candidate.destination.is_some() {
			problems.push("cannot transfer a non-existent asset".to_owned());
		}
	}

	// Parent ownership, for sub-assets and asset groups.
	if let Some(subasset_longname) = &candidate.subasset_longname {
		if fungible {
			let parent = candidate.subasset_parent.as_deref().unwrap_or_default();
			let parent_issuances = ledger.valid_issuances(parent)?;
			if let Some(last_parent) = parent_issuances.last() {
				if last_parent.issuer.as_deref() != Some(candidate.source.as_str()) {
					problems.push("parent asset owned by another address".to_owned());
				}
			} else {
				problems.push("parent asset not found".to_owned());
			}
		} else {
			problems.extend(assetgroup::validate(ledger, subasset_longname, &candidate.source)?);
		}
	}

	if let Some(subasset_longname) = &candidate.subasset_longname {
		if !reissuance {
			if fungible {
				// a long-name registers exactly once
				if ledger.asset_by_longname(subasset_longname)?.is_some() {
					problems.push("subasset already exists".to_owned());
				}
			}
			// the wrapping asset itself must be numeric
			if !candidate.asset.starts_with('A') {
				problems.push("parent asset must be a numeric asset".to_owned());
			}
		}
	}

	// Check for existence of fee funds.
	if candidate.quantity != 0
		|| block_index >= 315_000
		|| global::is_testnet()
		|| global::is_regtest()
	{
		// Only first issuances pay, except in the earliest fee era.
		if !reissuance || (block_index < 310_000 && !global::is_testnet() && !global::is_regtest())
		{
			let balance = ledger.balance(&candidate.source, consensus::XOB)?;
			if consensus::enabled("numeric_asset_names", block_index) {
				if candidate.subasset_longname.is_some() {
					if consensus::enabled("subassets", block_index) && fungible {
						fee = consensus::UNIT / 4;
					} else if consensus::enabled("non_fungible_assets", block_index) && !fungible {
						fee = consensus::UNIT / 400;
					} else {
						// same rate; validation rejects these forms anyway
						fee = consensus::UNIT / 400;
					}
				} else if candidate.asset.len() >= 13 {
					fee = 0;
				} else {
					fee = consensus::UNIT / 2;
				}
				if consensus::enabled("fee_revision_2021_1q", block_index) {
					fee *= 100;
				}
			} else if block_index >= 291_700 || global::is_testnet() || global::is_regtest() {
				fee = consensus::UNIT / 2;
			} else if block_index >= 286_000 || global::is_testnet() || global::is_regtest() {
				fee = 5 * consensus::UNIT;
			} else if block_index > 281_236 || global::is_testnet() || global::is_regtest() {
				fee = 5;
			}
			if fee > 0 && balance.unwrap_or(0) < fee as i64 {
				problems.push("insufficient funds".to_owned());
			}
		}
	}

	if !(block_index >= 317_500 || global::is_testnet() || global::is_regtest())
		&& description.chars().count() > 42
	{
		problems.push("description too long".to_owned());
	}

	if !listed && !consensus::enabled("delisted_assets", block_index) {
		problems.push("invalid: delisted assets not supported yet.".to_owned());
	}
	if !reassignable && !consensus::enabled("non_reassignable_assets", block_index) {
		problems.push("invalid: non-reassignable assets not supported yet.".to_owned());
	}

	// The cap, the supply total, the transfer check and the overflow
	// check keep this exact order.
	call_date = call_date.min(consensus::MAX_INT);
	let total: u128 = issuances
		.iter()
		.map(|row| row.quantity.unwrap_or(0) as u128)
		.sum();
	let total_overflow = total + u128::from(candidate.quantity) > consensus::MAX_INT as u128;
	if total_overflow {
		problems.push("total quantity overflow".to_owned());
	}

	if candidate.destination.is_some() && candidate.quantity != 0 {
		problems.push("cannot issue and transfer simultaneously".to_owned());
	}

	if consensus::enabled("integer_overflow_fix", block_index)
		&& (fee > consensus::MAX_INT as u64
			|| candidate.quantity > consensus::MAX_INT as u64
			|| total_overflow)
	{
		problems.push("integer overflow".to_owned());
	}

	Ok(Validated {
		call_date,
		call_price,
		problems,
		fee,
		description,
		divisible,
		listed,
		reassignable,
		vendable,
		fungible,
		reissuance,
		reissued_asset_longname,
	})
}

/// Build the outgoing message for an issuance, validating it first.
///
/// Returns the source, the host-chain destination outputs and the
/// payload bytes ready for transaction assembly.
#[allow(clippy::too_many_arguments)]
pub fn compose(
	ledger: &Ledger,
	source: &str,
	transfer_destination: Option<&str>,
	asset: &str,
	quantity: u64,
	divisible: Option<bool>,
	listed: Option<bool>,
	reassignable: Option<bool>,
	vendable: Option<bool>,
	fungible: Option<bool>,
	description: Option<&str>,
	block_index: u64,
) -> Result<(String, Vec<(String, Option<u64>)>, Vec<u8>), Error> {
	// Callability is deprecated: reissuances inherit the old values,
	// first issuances are uncallable.
	let issuances = ledger.valid_issuances(asset)?;
	let (callable, call_date, call_price) = match issuances.last() {
		Some(last) => (
			last.callable.unwrap_or(false),
			last.call_date.unwrap_or(0),
			last.call_price.unwrap_or(0.0),
		),
		None => (false, 0, 0.0),
	};

	let mut asset = asset.to_owned();
	let mut subasset_parent = None;
	let mut subasset_longname = None;
	if consensus::enabled("subassets", block_index) && fungible != Some(false) {
		if let Some(parsed) = asset_name::parse_subasset_from_asset_name(&asset)? {
			subasset_parent = Some(parsed.parent);
			match ledger.asset_by_longname(&parsed.longname)? {
				Some(existing) => {
					// the long-name is taken: reissue under the numeric
					// name already registered for it
					asset = existing.asset_name;
				}
				None => {
					asset = asset_name::generate_random_asset();
				}
			}
			subasset_longname = Some(parsed.longname);
		}
	} else if consensus::enabled("non_fungible_assets", block_index) && fungible == Some(false) {
		// a non-fungible issuance is always new, under a fresh numeric id
		let parent = asset_name::generate_random_asset();
		subasset_longname = Some(asset);
		subasset_parent = Some(parent.clone());
		asset = parent;
	}

	let candidate = CandidateIssuance {
		source: source.to_owned(),
		destination: transfer_destination.map(|d| d.to_owned()),
		asset: asset.clone(),
		quantity,
		divisible,
		listed,
		reassignable,
		vendable,
		fungible,
		callable,
		call_date: Some(call_date),
		call_price: Some(call_price),
		description: description.map(|d| d.to_owned()),
		subasset_parent,
		subasset_longname: subasset_longname.clone(),
	};
	let validated = validate(ledger, &candidate, block_index)?;
	if !validated.problems.is_empty() {
		return Err(Error::Compose(validated.problems));
	}

	let numeric_names = consensus::enabled("numeric_asset_names", block_index);
	let asset_id = asset_name::generate_asset_id(&asset, numeric_names)?;
	let flags = flags_byte(
		validated.divisible,
		validated.listed,
		validated.reassignable,
		validated.vendable,
		validated.fungible,
	);
	let data = match subasset_longname.as_deref() {
		// type 21 only carries initial sub-asset and non-fungible
		// issuances; type 20 covers everything else, reissuances included
		Some(longname) if !validated.reissuance => {
			let compacted = asset_name::compact_subasset_longname(longname)?;
			pack_subasset(asset_id, quantity, flags, &compacted, &validated.description)
		}
		_ => pack_standard(
			asset_id,
			quantity,
			flags,
			callable,
			validated.call_date,
			validated.call_price,
			&validated.description,
		),
	};

	let destination_outputs = match transfer_destination {
		Some(destination) => vec![(destination.to_owned(), None)],
		None => Vec::new(),
	};
	Ok((source.to_owned(), destination_outputs, data))
}

/// Host-chain transaction context threaded through a single parse.
#[derive(Debug, Clone)]
pub struct TxContext {
	/// Ledger ordering key assigned by the host block loop.
	pub tx_index: i64,
	/// Host-chain transaction hash.
	pub tx_hash: String,
	/// Height of the confirming block.
	pub block_index: u64,
	/// Address that carried the message.
	pub source: String,
	/// Host-chain destination output, when present.
	pub destination: Option<String>,
}

/// Parse one inbound issuance message and apply its ledger effects.
///
/// Decode, name and validation failures are recoverable: they persist a
/// row with a descriptive status and leave balances untouched. Only
/// ledger failures propagate.
pub fn parse(
	ledger: &Ledger,
	tx: &TxContext,
	message: &[u8],
	message_type_id: u32,
) -> Result<(), Error> {
	let mut status = "valid".to_owned();
	let mut body = None;
	let mut asset = None;
	let mut asset_id: u64 = 0;

	match unpack(message, message_type_id, tx.block_index) {
		Ok(unpacked) => {
			asset_id = unpacked.asset_id;
			let numeric_names = consensus::enabled("numeric_asset_names", tx.block_index);
			match asset_name::generate_asset_name(unpacked.asset_id, numeric_names) {
				Ok(name) => asset = Some(name),
				Err(_) => status = "invalid: bad asset name".to_owned(),
			}
			body = Some(unpacked);
		}
		Err(Error::Unpack) => status = "invalid: could not unpack".to_owned(),
		Err(err) => return Err(err),
	}

	// Validate and split the sub-asset long-name carried by the message.
	let mut subasset_parent = None;
	let mut subasset_longname = body.as_ref().and_then(|b| b.subasset_longname.clone());
	if status == "valid" {
		if let Some(longname) = subasset_longname.clone() {
			let fungible = body.as_ref().map(|b| b.fungible).unwrap_or(true);
			if fungible {
				match asset_name::parse_subasset_from_asset_name(&longname) {
					Ok(Some(parsed)) => {
						subasset_parent = Some(parsed.parent);
						subasset_longname = Some(parsed.longname);
					}
					Ok(None) | Err(_) => {
						asset = None;
						status = "invalid: bad subasset name".to_owned();
					}
				}
			} else {
				subasset_parent = asset.clone();
				if asset_name::validate_subasset_longname(&longname, &longname).is_err() {
					asset = None;
					status = "invalid: bad assetgroup name".to_owned();
				}
			}
		}
	}

	let mut reissuance = false;
	let mut fee: u64 = 0;
	let mut quantity = body.as_ref().map(|b| b.quantity).unwrap_or(0);
	let mut validated: Option<Validated> = None;

	if status == "valid" {
		if let (Some(b), Some(asset_ref)) = (body.as_ref(), asset.as_ref()) {
			let candidate = CandidateIssuance {
				source: tx.source.clone(),
				destination: tx.destination.clone(),
				asset: asset_ref.clone(),
				quantity: b.quantity,
				divisible: Some(b.divisible),
				listed: Some(b.listed),
				reassignable: Some(b.reassignable),
				vendable: Some(b.vendable),
				fungible: Some(b.fungible),
				callable: b.callable,
				call_date: Some(b.call_date),
				call_price: Some(b.call_price),
				description: Some(b.description.clone()),
				subasset_parent: subasset_parent.clone(),
				subasset_longname: subasset_longname.clone(),
			};
			let result = validate(ledger, &candidate, tx.block_index)?;
			if !result.problems.is_empty() {
				status = format!("invalid: {}", result.problems.join("; "));
			}
			if !consensus::enabled("integer_overflow_fix", tx.block_index)
				&& result.problems.iter().any(|p| p == "total quantity overflow")
			{
				quantity = 0;
			}
			reissuance = result.reissuance;
			fee = result.fee;
			validated = Some(result);
		}
	}

	// A host-chain destination makes this a transfer of ownership, never
	// a mint.
	let (issuer, transfer) = match &tx.destination {
		Some(destination) => {
			quantity = 0;
			(destination.clone(), true)
		}
		None => (tx.source.clone(), false),
	};

	// Debit fee.
	if status == "valid" {
		ledger.debit(&tx.source, consensus::XOB, fee, "issuance fee", &tx.tx_hash)?;
	}

	let fungible_resolved = validated
		.as_ref()
		.map(|v| v.fungible)
		.or_else(|| body.as_ref().map(|b| b.fungible));
	let mut description = validated
		.as_ref()
		.map(|v| v.description.clone())
		.or_else(|| body.as_ref().map(|b| b.description.clone()));

	// Lock?
	let mut lock = false;
	if status == "valid" {
		if !reissuance {
			// Add to the table of assets.
			let fungible = fungible_resolved.unwrap_or(true);
			ledger.insert_asset(&AssetRow {
				asset_id: asset_id.to_string(),
				asset_name: asset.clone().unwrap_or_default(),
				block_index: tx.block_index as i64,
				asset_longname: if fungible { subasset_longname.clone() } else { None },
				asset_group: if fungible { None } else { subasset_longname.clone() },
			})?;
			if !fungible {
				// non-fungible supply is fixed at birth
				lock = true;
			}
		} else if description
			.as_deref()
			.map(|d| !d.is_empty() && d.to_lowercase() == "lock")
			.unwrap_or(false)
		{
			lock = true;
			// the lock marker never becomes the stored description
			description = ledger.last_issuance_description(asset.as_deref().unwrap_or_default())?;
		}
	}

	// Reissuances keep advertising the registered long-name.
	let asset_longname = if status == "valid" && reissuance {
		validated.as_ref().and_then(|v| v.reissued_asset_longname.clone())
	} else {
		subasset_longname.clone()
	};

	let row = IssuanceRow {
		tx_index: tx.tx_index,
		tx_hash: tx.tx_hash.clone(),
		msg_index: 0,
		block_index: tx.block_index as i64,
		asset: asset.clone(),
		quantity: body
			.as_ref()
			.map(|_| quantity.min(consensus::MAX_INT as u64) as i64),
		divisible: validated
			.as_ref()
			.map(|v| v.divisible)
			.or_else(|| body.as_ref().map(|b| b.divisible)),
		source: tx.source.clone(),
		issuer: Some(issuer.clone()),
		transfer,
		callable: body.as_ref().map(|b| b.callable),
		call_date: validated
			.as_ref()
			.map(|v| v.call_date)
			.or_else(|| body.as_ref().map(|b| b.call_date)),
		call_price: validated
			.as_ref()
			.map(|v| v.call_price)
			.or_else(|| body.as_ref().map(|b| b.call_price)),
		description,
		fee_paid: fee as i64,
		locked: lock,
		status: status.clone(),
		asset_longname: asset_longname.clone(),
		listed: validated
			.as_ref()
			.map(|v| v.listed)
			.or_else(|| body.as_ref().map(|b| b.listed)),
		reassignable: validated
			.as_ref()
			.map(|v| v.reassignable)
			.or_else(|| body.as_ref().map(|b| b.reassignable)),
		vendable: validated
			.as_ref()
			.map(|v| v.vendable)
			.or_else(|| body.as_ref().map(|b| b.vendable)),
		fungible: fungible_resolved,
	};
	if !status.contains("integer overflow") {
		ledger.insert_issuance(&row)?;
	} else {
		// out-of-range values must never reach the store
		warn!("not storing issuance tx {}: {}", tx.tx_hash, status);
		debug!("issuance bindings: {:?}", row);
	}

	if fungible_resolved == Some(false) {
		assetgroup::create(
			ledger,
			tx.tx_index,
			&tx.tx_hash,
			tx.block_index,
			asset_longname.as_deref(),
			&issuer,
			&status,
		)?;
	}

	// Credit.
	if status == "valid" && quantity > 0 {
		ledger.credit(
			&tx.source,
			asset.as_deref().unwrap_or_default(),
			quantity,
			"issuance",
			&tx.tx_hash,
		)?;
	}

	Ok(())
}

/// Whether dispensers currently accept `asset`.
pub fn is_vendable(ledger: &Ledger, asset: &str, block_index: u64) -> Result<bool, Error> {
	if asset == consensus::XOB {
		return Ok(true);
	}

	let mut resolved = asset.to_owned();
	if consensus::enabled("subassets", block_index) {
		if let Ok(Some(_)) = asset_name::parse_subasset_from_asset_name(asset) {
			if let Some(registered) = ledger.asset_by_longname(asset)? {
				resolved = registered.asset_name;
			}
		}
	}

	let issuances = ledger.valid_issuances(&resolved)?;
	let last = match issuances.last() {
		Some(last) => last,
		None => return Ok(false),
	};
	if !consensus::enabled("dispensers", block_index) {
		return Ok(false);
	}
	if !consensus::enabled("enable_vendable_fix", block_index)
		&& (last.reassignable == Some(false) || last.listed == Some(false))
	{
		return Ok(false);
	}
	Ok(last.vendable.unwrap_or(false))
}

/// Asset named by the issuance recorded for `tx_hash`, if any.
pub fn find_issuance_by_tx_hash(ledger: &Ledger, tx_hash: &str) -> Result<Option<String>, Error> {
	Ok(ledger.issuance_by_tx_hash(tx_hash)?.and_then(|row| row.asset))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::global::{set_chain_type, ChainTypes};

	fn strip(data: &[u8]) -> (u32, &[u8]) {
		message_type::unpack(data).unwrap()
	}

	#[test]
	fn flag_bits_cover_all_combinations() {
		set_chain_type(ChainTypes::Mainnet);
		for bits in 0..32u8 {
			let divisible = bits & 1 != 0;
			let listed = bits & 2 != 0;
			let reassignable = bits & 4 != 0;
			let vendable = bits & 8 != 0;
			let fungible = bits & 16 != 0;

			let byte = flags_byte(divisible, listed, reassignable, vendable, fungible);
			// bit 0 is positive, bits 1-4 are negative
			assert_eq!(byte & 1 != 0, divisible);
			assert_eq!(byte & 2 != 0, !listed);
			assert_eq!(byte & 4 != 0, !reassignable);
			assert_eq!(byte & 8 != 0, !vendable);
			assert_eq!(byte & 16 != 0, !fungible);

			assert_eq!(
				split_flags(byte),
				(divisible, listed, reassignable, vendable, fungible)
			);
		}
	}

	#[test]
	fn standard_round_trip() {
		set_chain_type(ChainTypes::Mainnet);
		let data = pack_standard(
			95_428_956_661_682_177,
			1_000,
			flags_byte(true, true, false, true, true),
			true,
			1_600_000_000,
			1.5,
			"a test asset",
		);
		let (id, message) = strip(&data);
		assert_eq!(id, ID);
		let body = unpack(message, id, 320_000).unwrap();
		assert_eq!(body.asset_id, 95_428_956_661_682_177);
		assert_eq!(body.quantity, 1_000);
		assert!(body.divisible);
		assert!(body.listed);
		assert!(!body.reassignable);
		assert!(body.callable);
		assert_eq!(body.call_date, 1_600_000_000);
		assert_eq!(body.call_price, 1.5);
		assert_eq!(body.description, "a test asset");
		assert_eq!(body.subasset_longname, None);
	}

	#[test]
	fn empty_description_round_trip() {
		set_chain_type(ChainTypes::Mainnet);
		let data = pack_standard(17_576, 0, 1, false, 0, 0.0, "");
		let (id, message) = strip(&data);
		assert_eq!(message.len(), LENGTH_2 + 1);
		let body = unpack(message, id, 320_000).unwrap();
		assert_eq!(body.description, "");
	}

	#[test]
	fn description_boundary_at_41_bytes_round_trips() {
		set_chain_type(ChainTypes::Mainnet);
		let description = "a".repeat(41);
		let data = pack_standard(17_576, 10, 1, false, 0, 0.0, &description);
		let (id, message) = strip(&data);
		assert_eq!(message.len() - LENGTH_2, 42);
		let body = unpack(message, id, 320_000).unwrap();
		assert_eq!(body.description, description);
	}

	#[test]
	fn description_boundary_at_42_bytes_decodes_raw() {
		// 42 bytes still encode length-prefixed, but the 43-byte tail
		// decodes raw, so the prefix byte leaks into the text. Historical
		// behavior, kept bit-for-bit.
		set_chain_type(ChainTypes::Mainnet);
		let description = "a".repeat(42);
		let data = pack_standard(17_576, 10, 1, false, 0, 0.0, &description);
		let (id, message) = strip(&data);
		assert_eq!(message.len() - LENGTH_2, 43);
		let body = unpack(message, id, 320_000).unwrap();
		assert_eq!(body.description, format!("*{}", description));
	}

	#[test]
	fn description_boundary_at_43_bytes_round_trips() {
		set_chain_type(ChainTypes::Mainnet);
		let description = "a".repeat(43);
		let data = pack_standard(17_576, 10, 1, false, 0, 0.0, &description);
		let (id, message) = strip(&data);
		assert_eq!(message.len() - LENGTH_2, 43);
		let body = unpack(message, id, 320_000).unwrap();
		assert_eq!(body.description, description);
	}

	#[test]
	fn pascal_prefix_wins_over_trailing_bytes() {
		set_chain_type(ChainTypes::Mainnet);
		let mut message = Vec::new();
		message.extend_from_slice(&17_576u64.to_be_bytes());
		message.extend_from_slice(&5u64.to_be_bytes());
		message.push(1);
		message.push(0);
		message.extend_from_slice(&0u32.to_be_bytes());
		message.extend_from_slice(&0f32.to_be_bytes());
		// prefix says 2 bytes, 4 bytes follow
		message.extend_from_slice(&[2, b'h', b'i', b'x', b'x']);
		let body = unpack(&message, ID, 320_000).unwrap();
		assert_eq!(body.description, "hi");
	}

	#[test]
	fn legacy_17_byte_layout() {
		set_chain_type(ChainTypes::Mainnet);
		let mut message = Vec::new();
		message.extend_from_slice(&17_576u64.to_be_bytes());
		message.extend_from_slice(&500u64.to_be_bytes());
		message.push(3);
		let body = unpack(&message, ID, 283_000).unwrap();
		// a bare bool: any non-zero byte is divisible, negative flags
		// cannot be cleared
		assert!(body.divisible);
		assert!(body.listed);
		assert!(body.reassignable);
		assert!(body.vendable);
		assert!(body.fungible);
		assert!(!body.callable);
		assert_eq!(body.description, "");

		assert!(unpack(&message[..16], ID, 283_000).is_err());
	}

	#[test]
	fn long_messages_before_the_cutoff_must_be_exactly_17_bytes() {
		set_chain_type(ChainTypes::Mainnet);
		let data = pack_standard(17_576, 10, 1, false, 0, 0.0, "hello");
		let (id, message) = strip(&data);
		assert!(unpack(message, id, 283_271).is_err());
		assert!(unpack(message, id, 283_272).is_ok());
	}

	#[test]
	fn subasset_round_trip() {
		set_chain_type(ChainTypes::Mainnet);
		let compacted = asset_name::compact_subasset_longname("BANANA.split").unwrap();
		let data = pack_subasset(
			95_428_956_661_682_177,
			100,
			flags_byte(true, true, true, true, true),
			&compacted,
			"tropical",
		);
		let (id, message) = strip(&data);
		assert_eq!(id, SUBASSET_ID);
		let body = unpack(message, id, 320_000).unwrap();
		assert_eq!(body.asset_id, 95_428_956_661_682_177);
		assert_eq!(body.quantity, 100);
		assert_eq!(body.subasset_longname.as_deref(), Some("BANANA.split"));
		assert_eq!(body.description, "tropical");
		assert!(!body.callable);
		assert_eq!(body.call_date, 0);
		assert_eq!(body.call_price, 0.0);
	}

	#[test]
	fn subasset_rejected_before_activation() {
		set_chain_type(ChainTypes::Mainnet);
		let compacted = asset_name::compact_subasset_longname("BANANA.split").unwrap();
		let data = pack_subasset(95_428_956_661_682_177, 100, 1, &compacted, "");
		let (id, message) = strip(&data);
		assert!(unpack(message, id, 289_999).is_err());
	}

	#[test]
	fn subasset_length_byte_must_fit() {
		set_chain_type(ChainTypes::Mainnet);
		let mut message = Vec::new();
		message.extend_from_slice(&95_428_956_661_682_177u64.to_be_bytes());
		message.extend_from_slice(&1u64.to_be_bytes());
		message.push(1);
		message.push(9); // claims 9 bytes, only 2 follow
		message.extend_from_slice(&[1, 2]);
		assert!(unpack(&message, SUBASSET_ID, 320_000).is_err());
	}

	#[test]
	fn call_price_rounds_to_six_decimals() {
		set_chain_type(ChainTypes::Mainnet);
		let data = pack_standard(17_576, 0, 1, true, 10, 1.234_567_89, "");
		let (id, message) = strip(&data);
		let body = unpack(message, id, 320_000).unwrap();
		assert_eq!(body.call_price, 1_234_568.0 / 1_000_000.0);
	}

	#[test]
	fn invalid_utf8_description_is_gated() {
		set_chain_type(ChainTypes::Mainnet);
		let mut message = Vec::new();
		message.extend_from_slice(&17_576u64.to_be_bytes());
		message.extend_from_slice(&5u64.to_be_bytes());
		message.push(1);
		message.push(0);
		message.extend_from_slice(&0u32.to_be_bytes());
		message.extend_from_slice(&0f32.to_be_bytes());
		message.extend_from_slice(&[2, 0xff, 0xfe]);

		// before the codec fix bad bytes collapse to an empty string
		let body = unpack(&message, ID, 301_999).unwrap();
		assert_eq!(body.description, "");
		// after it they become replacement characters
		let body = unpack(&message, ID, 302_000).unwrap();
		assert_eq!(body.description, "\u{fffd}\u{fffd}");
	}
}
