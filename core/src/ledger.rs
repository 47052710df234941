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

//! Ledger persistence for the message layer.
//!
//! The host block loop owns the handle and threads it through every
//! parse; the message layer itself never opens or closes a store. All
//! failures here are fatal to the caller - recoverable conditions are
//! expressed as issuance statuses, never as store errors.

#![allow(missing_docs)]

use rusqlite::{params, Connection, OptionalExtension, Row};

/// Errors from ledger persistence.
#[derive(Debug, Fail)]
pub enum Error {
	/// Underlying store failure.
	#[fail(display = "ledger store error: {}", _0)]
	Store(rusqlite::Error),
	/// A debit would overdraw a balance. Fee validation rules out every
	/// reachable case, so hitting this means the ledger is inconsistent.
	#[fail(display = "insufficient {} balance for {}", asset, address)]
	InsufficientBalance {
		/// Account being debited.
		address: String,
		/// Asset being debited.
		asset: String,
	},
}

impl From<rusqlite::Error> for Error {
	fn from(e: rusqlite::Error) -> Error {
		Error::Store(e)
	}
}

/// One row of the `issuances` table. Every accepted message persists a
/// row, valid or not, so most payload fields are nullable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuanceRow {
	/// Ledger ordering key.
	pub tx_index: i64,
	/// Host-chain transaction hash.
	pub tx_hash: String,
	/// Message position within the transaction, 0 for issuance.
	pub msg_index: i64,
	/// Height of the confirming block.
	pub block_index: i64,
	/// Short-form asset name, if the id resolved.
	pub asset: Option<String>,
	pub quantity: Option<i64>,
	pub divisible: Option<bool>,
	/// Address that carried the message.
	pub source: String,
	/// Owner of the asset after this issuance.
	pub issuer: Option<String>,
	/// Whether the message transferred ownership.
	pub transfer: bool,
	pub callable: Option<bool>,
	pub call_date: Option<i64>,
	pub call_price: Option<f64>,
	pub description: Option<String>,
	/// Fee debited, in base units of the native asset.
	pub fee_paid: i64,
	/// Whether this issuance locked the asset's supply.
	pub locked: bool,
	/// `valid` or a specific `invalid: *` status.
	pub status: String,
	pub asset_longname: Option<String>,
	pub listed: Option<bool>,
	pub reassignable: Option<bool>,
	pub vendable: Option<bool>,
	pub fungible: Option<bool>,
}

impl IssuanceRow {
	fn from_row(row: &Row<'_>) -> rusqlite::Result<IssuanceRow> {
		Ok(IssuanceRow {
			tx_index: row.get("tx_index")?,
			tx_hash: row.get("tx_hash")?,
			msg_index: row.get("msg_index")?,
			block_index: row.get("block_index")?,
			asset: row.get("asset")?,
			quantity: row.get("quantity")?,
			divisible: row.get("divisible")?,
			source: row.get("source")?,
			issuer: row.get("issuer")?,
			transfer: row.get("transfer")?,
			callable: row.get("callable")?,
			call_date: row.get("call_date")?,
			call_price: row.get("call_price")?,
			description: row.get("description")?,
			fee_paid: row.get("fee_paid")?,
			locked: row.get("locked")?,
			status: row.get("status")?,
			asset_longname: row.get("asset_longname")?,
			listed: row.get("listed")?,
			reassignable: row.get("reassignable")?,
			vendable: row.get("vendable")?,
			fungible: row.get("fungible")?,
		})
	}
}

/// One row of the `assets` registry. Created exactly once per asset,
/// never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRow {
	/// Numeric id, stored textually.
	pub asset_id: String,
	/// Short-form name.
	pub asset_name: String,
	/// Height of the registering block.
	pub block_index: i64,
	/// Dotted long form, fungible sub-assets only.
	pub asset_longname: Option<String>,
	/// Group long form, non-fungible registrations only.
	pub asset_group: Option<String>,
}

/// One row of the non-fungible `assetgroups` registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetGroupRow {
	/// Ledger ordering key of the registering message.
	pub tx_index: i64,
	/// Host-chain transaction hash.
	pub tx_hash: String,
	/// Height of the registering block.
	pub block_index: i64,
	/// Group key, the component before the first period.
	pub asset_group: String,
	/// Full long-name of the registered member.
	pub asset_longname: String,
	/// Owner address.
	pub owner: String,
	/// Status of the registering issuance.
	pub status: String,
}

/// Handle over the ledger database.
pub struct Ledger {
	conn: Connection,
}

impl Ledger {
	/// Open (or create) a ledger at `path` and run the schema migration.
	pub fn open(path: &str) -> Result<Ledger, Error> {
		Ledger::new(Connection::open(path)?)
	}

	/// In-memory ledger, used by tests.
	pub fn open_in_memory() -> Result<Ledger, Error> {
		Ledger::new(Connection::open_in_memory()?)
	}

	/// Wrap an existing connection and run the schema migration.
	pub fn new(conn: Connection) -> Result<Ledger, Error> {
		// The declared FOREIGN KEY on `transactions` documents the
		// relationship to the host chain's own table, which this crate
		// never creates; enforcement is the host's responsibility, not
		// ours. Newer bundled SQLite defaults this pragma on, so pin it
		// off explicitly to keep the original, intended behavior.
		conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
		let ledger = Ledger { conn };
		ledger.initialise()?;
		Ok(ledger)
	}

	/// One-shot, idempotent schema setup: create missing tables, add
	/// columns introduced after the original deployment, and rebuild the
	/// issuances table onto its composite primary key if it still has the
	/// original single-column one.
	fn initialise(&self) -> Result<(), Error> {
		self.conn.execute(
			"CREATE TABLE IF NOT EXISTS issuances(
			 tx_index INTEGER PRIMARY KEY,
			 tx_hash TEXT UNIQUE,
			 block_index INTEGER,
			 asset TEXT,
			 quantity INTEGER,
			 divisible BOOL,
			 source TEXT,
			 issuer TEXT,
			 transfer BOOL,
			 callable BOOL,
			 call_date INTEGER,
			 call_price REAL,
			 description TEXT,
			 fee_paid INTEGER,
			 locked BOOL,
			 status TEXT,
			 asset_longname TEXT,
			 listed BOOL,
			 reassignable BOOL,
			 vendable BOOL,
			 fungible BOOL,
			 FOREIGN KEY (tx_index, tx_hash, block_index) REFERENCES transactions(tx_index, tx_hash, block_index))",
			[],
		)?;

		// SQLite cannot ALTER TABLE IF COLUMN NOT EXISTS, so probe.
		let columns = self.table_columns("issuances")?;
		for (column, kind) in &[
			("asset_longname", "TEXT"),
			("listed", "BOOL"),
			("reassignable", "BOOL"),
			("vendable", "BOOL"),
			("fungible", "BOOL"),
		] {
			if !columns.iter().any(|c| c == column) {
				self.conn.execute(
					&format!("ALTER TABLE issuances ADD COLUMN {} {}", column, kind),
					[],
				)?;
			}
		}

		// SQLite cannot drop a UNIQUE constraint either; moving to the
		// (tx_index, msg_index) key means rebuilding the whole table.
		if !columns.iter().any(|c| c == "msg_index") {
			self.conn.execute(
				"CREATE TABLE IF NOT EXISTS new_issuances(
				 tx_index INTEGER,
				 tx_hash TEXT,
				 msg_index INTEGER DEFAULT 0,
				 block_index INTEGER,
				 asset TEXT,
				 quantity INTEGER,
				 divisible BOOL,
				 source TEXT,
				 issuer TEXT,
				 transfer BOOL,
				 callable BOOL,
				 call_date INTEGER,
				 call_price REAL,
				 description TEXT,
				 fee_paid INTEGER,
				 locked BOOL,
				 status TEXT,
				 asset_longname TEXT,
				 listed BOOL,
				 reassignable BOOL,
				 vendable BOOL,
				 fungible BOOL,
				 PRIMARY KEY (tx_index, msg_index),
				 FOREIGN KEY (tx_index, tx_hash, block_index) REFERENCES transactions(tx_index, tx_hash, block_index),
				 UNIQUE (tx_hash, msg_index))",
				[],
			)?;
			self.conn.execute(
				"INSERT INTO new_issuances(tx_index, tx_hash, msg_index, block_index,
				 asset, quantity, divisible, source, issuer, transfer, callable,
				 call_date, call_price, description, fee_paid, locked, status,
				 asset_longname, listed, reassignable, vendable, fungible)
				 SELECT tx_index, tx_hash, 0, block_index, asset, quantity, divisible,
				 source, issuer, transfer, callable, call_date, call_price, description,
				 fee_paid, locked, status, asset_longname, listed, reassignable,
				 vendable, fungible FROM issuances",
				[],
			)?;
			self.conn.execute("DROP TABLE issuances", [])?;
			self.conn
				.execute("ALTER TABLE new_issuances RENAME TO issuances", [])?;
		}

		self.conn.execute_batch(
			"CREATE INDEX IF NOT EXISTS block_index_idx ON issuances (block_index);
			 CREATE INDEX IF NOT EXISTS valid_asset_idx ON issuances (asset, status);
			 CREATE INDEX IF NOT EXISTS status_idx ON issuances (status);
			 CREATE INDEX IF NOT EXISTS source_idx ON issuances (source);
			 CREATE INDEX IF NOT EXISTS asset_longname_idx ON issuances (asset_longname);

			 CREATE TABLE IF NOT EXISTS assets(
			 asset_id TEXT UNIQUE,
			 asset_name TEXT UNIQUE,
			 block_index INTEGER,
			 asset_longname TEXT,
			 asset_group TEXT);
			 CREATE INDEX IF NOT EXISTS assets_longname_idx ON assets (asset_longname);

			 CREATE TABLE IF NOT EXISTS balances(
			 address TEXT,
			 asset TEXT,
			 quantity INTEGER);
			 CREATE INDEX IF NOT EXISTS balances_address_asset_idx ON balances (address, asset);

			 CREATE TABLE IF NOT EXISTS assetgroups(
			 tx_index INTEGER,
			 tx_hash TEXT,
			 block_index INTEGER,
			 asset_group TEXT,
			 asset_longname TEXT,
			 owner TEXT,
			 status TEXT);
			 CREATE INDEX IF NOT EXISTS assetgroups_group_idx ON assetgroups (asset_group);

			 CREATE TABLE IF NOT EXISTS dispensers(
			 tx_index INTEGER,
			 asset TEXT,
			 status INTEGER);
			 CREATE INDEX IF NOT EXISTS dispensers_asset_idx ON dispensers (asset);",
		)?;

		Ok(())
	}

	fn table_columns(&self, table: &str) -> Result<Vec<String>, Error> {
		let mut stmt = self
			.conn
			.prepare(&format!("PRAGMA table_info({})", table))?;
		let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
		let mut columns = Vec::new();
		for column in rows {
			columns.push(column?);
		}
		Ok(columns)
	}

	/// All `valid` issuances of `asset`, in `tx_index` order.
	pub fn valid_issuances(&self, asset: &str) -> Result<Vec<IssuanceRow>, Error> {
		let mut stmt = self.conn.prepare(
			"SELECT * FROM issuances WHERE status = ?1 AND asset = ?2 ORDER BY tx_index ASC",
		)?;
		let rows = stmt.query_map(params!["valid", asset], IssuanceRow::from_row)?;
		let mut issuances = Vec::new();
		for row in rows {
			issuances.push(row?);
		}
		Ok(issuances)
	}

	/// The issuance recorded for a host transaction, if any.
	pub fn issuance_by_tx_hash(&self, tx_hash: &str) -> Result<Option<IssuanceRow>, Error> {
		let row = self
			.conn
			.query_row(
				"SELECT * FROM issuances WHERE tx_hash = ?1",
				params![tx_hash],
				IssuanceRow::from_row,
			)
			.optional()?;
		Ok(row)
	}

	/// Description carried by the most recent valid issuance of `asset`.
	pub fn last_issuance_description(&self, asset: &str) -> Result<Option<String>, Error> {
		let description = self
			.conn
			.query_row(
				"SELECT description FROM issuances WHERE status = ?1 AND asset = ?2
				 ORDER BY tx_index DESC LIMIT 1",
				params!["valid", asset],
				|row| row.get::<_, Option<String>>(0),
			)
			.optional()?;
		Ok(description.unwrap_or(None))
	}

	/// Registry row for a fungible sub-asset long-name.
	pub fn asset_by_longname(&self, longname: &str) -> Result<Option<AssetRow>, Error> {
		let row = self
			.conn
			.query_row(
				"SELECT asset_id, asset_name, block_index, asset_longname, asset_group
				 FROM assets WHERE asset_longname = ?1",
				params![longname],
				|row| {
					Ok(AssetRow {
						asset_id: row.get(0)?,
						asset_name: row.get(1)?,
						block_index: row.get(2)?,
						asset_longname: row.get(3)?,
						asset_group: row.get(4)?,
					})
				},
			)
			.optional()?;
		Ok(row)
	}

	/// Registry row for a short-form asset name.
	pub fn asset_by_name(&self, asset_name: &str) -> Result<Option<AssetRow>, Error> {
		let row = self
			.conn
			.query_row(
				"SELECT asset_id, asset_name, block_index, asset_longname, asset_group
				 FROM assets WHERE asset_name = ?1",
				params![asset_name],
				|row| {
					Ok(AssetRow {
						asset_id: row.get(0)?,
						asset_name: row.get(1)?,
						block_index: row.get(2)?,
						asset_longname: row.get(3)?,
						asset_group: row.get(4)?,
					})
				},
			)
			.optional()?;
		Ok(row)
	}

	/// Balance of `asset` held by `address`, if a row exists.
	pub fn balance(&self, address: &str, asset: &str) -> Result<Option<i64>, Error> {
		let quantity = self
			.conn
			.query_row(
				"SELECT quantity FROM balances WHERE address = ?1 AND asset = ?2",
				params![address, asset],
				|row| row.get::<_, i64>(0),
			)
			.optional()?;
		Ok(quantity)
	}

	/// Register a new asset.
	pub fn insert_asset(&self, row: &AssetRow) -> Result<(), Error> {
		self.conn.execute(
			"INSERT INTO assets (asset_id, asset_name, block_index, asset_longname, asset_group)
			 VALUES (?1, ?2, ?3, ?4, ?5)",
			params![
				row.asset_id,
				row.asset_name,
				row.block_index,
				row.asset_longname,
				row.asset_group
			],
		)?;
		Ok(())
	}

	/// Persist an issuance row.
	pub fn insert_issuance(&self, row: &IssuanceRow) -> Result<(), Error> {
		self.conn.execute(
			"INSERT INTO issuances (tx_index, tx_hash, msg_index, block_index, asset,
			 quantity, divisible, source, issuer, transfer, callable, call_date,
			 call_price, description, fee_paid, locked, status, asset_longname,
			 listed, reassignable, vendable, fungible)
			 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
			 ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
			params![
				row.tx_index,
				row.tx_hash,
				row.msg_index,
				row.block_index,
				row.asset,
				row.quantity,
				row.divisible,
				row.source,
				row.issuer,
				row.transfer,
				row.callable,
				row.call_date,
				row.call_price,
				row.description,
				row.fee_paid,
				row.locked,
				row.status,
				row.asset_longname,
				row.listed,
				row.reassignable,
				row.vendable,
				row.fungible
			],
		)?;
		Ok(())
	}

	/// Remove `quantity` of `asset` from `address`. `action` and `event`
	/// only feed the audit log.
	pub fn debit(
		&self,
		address: &str,
		asset: &str,
		quantity: u64,
		action: &str,
		event: &str,
	) -> Result<(), Error> {
		if quantity == 0 {
			return Ok(());
		}
		let current = self.balance(address, asset)?.unwrap_or(0);
		if current < quantity as i64 {
			return Err(Error::InsufficientBalance {
				address: address.to_owned(),
				asset: asset.to_owned(),
			});
		}
		self.conn.execute(
			"UPDATE balances SET quantity = quantity - ?1 WHERE address = ?2 AND asset = ?3",
			params![quantity as i64, address, asset],
		)?;
		debug!(
			"debit {} {} from {} ({}, {})",
			quantity, asset, address, action, event
		);
		Ok(())
	}

	/// Add `quantity` of `asset` to `address`.
	pub fn credit(
		&self,
		address: &str,
		asset: &str,
		quantity: u64,
		action: &str,
		event: &str,
	) -> Result<(), Error> {
		if quantity == 0 {
			return Ok(());
		}
		let updated = self.conn.execute(
			"UPDATE balances SET quantity = quantity + ?1 WHERE address = ?2 AND asset = ?3",
			params![quantity as i64, address, asset],
		)?;
		if updated == 0 {
			self.conn.execute(
				"INSERT INTO balances (address, asset, quantity) VALUES (?1, ?2, ?3)",
				params![address, asset, quantity as i64],
			)?;
		}
		debug!(
			"credit {} {} to {} ({}, {})",
			quantity, asset, address, action, event
		);
		Ok(())
	}

	/// Owner of the most recent valid registration in a non-fungible
	/// group, if the group exists.
	pub fn assetgroup_owner(&self, asset_group: &str) -> Result<Option<String>, Error> {
		let owner = self
			.conn
			.query_row(
				"SELECT owner FROM assetgroups WHERE asset_group = ?1 AND status = ?2
				 ORDER BY tx_index DESC LIMIT 1",
				params![asset_group, "valid"],
				|row| row.get::<_, String>(0),
			)
			.optional()?;
		Ok(owner)
	}

	/// Record a non-fungible group registration.
	pub fn insert_assetgroup(&self, row: &AssetGroupRow) -> Result<(), Error> {
		self.conn.execute(
			"INSERT INTO assetgroups (tx_index, tx_hash, block_index, asset_group,
			 asset_longname, owner, status)
			 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
			params![
				row.tx_index,
				row.tx_hash,
				row.block_index,
				row.asset_group,
				row.asset_longname,
				row.owner,
				row.status
			],
		)?;
		Ok(())
	}

	/// Whether any dispenser row for `asset` carries `status`.
	pub fn dispenser_with_status_exists(&self, asset: &str, status: i64) -> Result<bool, Error> {
		let count: i64 = self.conn.query_row(
			"SELECT COUNT(*) FROM dispensers WHERE asset = ?1 AND status = ?2",
			params![asset, status],
			|row| row.get(0),
		)?;
		Ok(count > 0)
	}

	/// Record a dispenser row. The dispenser message family lives outside
	/// this crate; this hook lets the host mirror its state in.
	pub fn insert_dispenser(&self, tx_index: i64, asset: &str, status: i64) -> Result<(), Error> {
		self.conn.execute(
			"INSERT INTO dispensers (tx_index, asset, status) VALUES (?1, ?2, ?3)",
			params![tx_index, asset, status],
		)?;
		Ok(())
	}
}
