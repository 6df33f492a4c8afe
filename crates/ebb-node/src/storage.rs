//! RocksDB-backed persistence for ledger and distributor state.
//!
//! State is keyed per entity so that an operation rewrites only what it
//! touched:
//!
//! | column family | key | value |
//! |---|---|---|
//! | `positions` | account id | [`LockPosition`] |
//! | `histories` | account id | [`AccountHistory`] |
//! | `totals` | week (BE) | committed [`AggregatePoint`] |
//! | `unlocks` | week (BE) | scheduled principal |
//! | `rewards` | week (BE) | settled reward |
//! | `watermarks` | account id | first unpaid week |
//! | `meta` | name | schema version, ledger settings, distributor balances |
//!
//! Each write is one atomic [`WriteBatch`], so a reload never sees a ledger
//! and distributor from different moments.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};
use tracing::{debug, info};

use ebb_core::error::EbbError;
use ebb_core::types::{AccountId, AggregatePoint, LockPosition, Week};
use ebb_ledger::{AccountHistory, LedgerJournal, LedgerSettings, LedgerState, Rollup};
use ebb_rewards::{DistributorJournal, DistributorState};

// --- Column family names ---

const CF_POSITIONS: &str = "positions";
const CF_HISTORIES: &str = "histories";
const CF_TOTALS: &str = "totals";
const CF_UNLOCKS: &str = "unlocks";
const CF_REWARDS: &str = "rewards";
const CF_WATERMARKS: &str = "watermarks";
const CF_META: &str = "meta";

const ALL_CFS: &[&str] = &[
    CF_POSITIONS,
    CF_HISTORIES,
    CF_TOTALS,
    CF_UNLOCKS,
    CF_REWARDS,
    CF_WATERMARKS,
    CF_META,
];

/// Every family except `meta`, cleared by a full save.
const DATA_CFS: &[&str] = &[CF_POSITIONS, CF_HISTORIES, CF_TOTALS, CF_UNLOCKS, CF_REWARDS, CF_WATERMARKS];

// --- Metadata keys ---

const META_SCHEMA_VERSION: &[u8] = b"schema_version";
const META_LEDGER_SETTINGS: &[u8] = b"ledger_settings";
const META_REWARD_BALANCES: &[u8] = b"reward_balances";

/// Sorts after every account and week key.
const KEY_END: [u8; 33] = [0xFF; 33];

/// Current on-disk layout. Bumped whenever a key scheme or encoded type changes.
pub const SCHEMA_VERSION: u32 = 2;

fn storage_err(e: impl std::fmt::Display) -> EbbError {
    EbbError::Storage(e.to_string())
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, EbbError> {
    bincode::encode_to_vec(value, bincode::config::standard()).map_err(storage_err)
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, EbbError> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard()).map_err(storage_err)?;
    Ok(value)
}

fn week_key(week: Week) -> [u8; 2] {
    week.to_be_bytes()
}

fn week_from_key(key: &[u8]) -> Result<Week, EbbError> {
    let raw: [u8; 2] = key
        .try_into()
        .map_err(|_| EbbError::Storage(format!("invalid week key length {}", key.len())))?;
    Ok(Week::from_be_bytes(raw))
}

fn account_from_key(key: &[u8]) -> Result<AccountId, EbbError> {
    let raw: [u8; 32] = key
        .try_into()
        .map_err(|_| EbbError::Storage(format!("invalid account key length {}", key.len())))?;
    Ok(AccountId(raw))
}

/// Durable home for ledger and distributor state.
///
/// Implemented by [`RocksStore`]; the node writes through this trait.
pub trait StateStore: Send + Sync {
    /// Load both engines, or `None` if nothing has been saved yet.
    fn load(&self) -> Result<Option<(LedgerState, DistributorState)>, EbbError>;

    /// Replace everything stored with `ledger` and `rewards`.
    fn save(&self, ledger: &LedgerState, rewards: &DistributorState) -> Result<(), EbbError>;

    /// Rewrite exactly the keys the journals name, taking each value from
    /// the given state. A key whose value is now absent is deleted.
    fn write_changes(
        &self,
        ledger: &LedgerState,
        ledger_journal: &LedgerJournal,
        rewards: &DistributorState,
        rewards_journal: &DistributorJournal,
    ) -> Result<(), EbbError>;
}

pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a database at `path`.
    ///
    /// A fresh database is stamped with [`SCHEMA_VERSION`]; an existing one
    /// must carry the same version.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EbbError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors).map_err(storage_err)?;
        let store = Self { db };

        match store.schema_version()? {
            None => {
                let cf = store.cf_handle(CF_META)?;
                store
                    .db
                    .put_cf(&cf, META_SCHEMA_VERSION, SCHEMA_VERSION.to_le_bytes())
                    .map_err(storage_err)?;
                info!(path = %path.as_ref().display(), version = SCHEMA_VERSION, "initialised ledger store");
            }
            Some(SCHEMA_VERSION) => {}
            Some(other) => {
                return Err(EbbError::Storage(format!(
                    "unsupported schema version {other}, expected {SCHEMA_VERSION}"
                )));
            }
        }
        Ok(store)
    }

    /// Schema version stamped in `meta`, if any.
    pub fn schema_version(&self) -> Result<Option<u32>, EbbError> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(&cf, META_SCHEMA_VERSION).map_err(storage_err)? {
            Some(bytes) => {
                let raw: [u8; 4] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| EbbError::Storage("invalid schema version length".into()))?;
                Ok(Some(u32::from_le_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), EbbError> {
        self.db.flush().map_err(storage_err)
    }

    fn get_decoded<T: bincode::Decode<()>>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>, EbbError> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(&cf, key).map_err(storage_err)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every entry of a family in key order.
    fn scan<T: bincode::Decode<()>>(&self, cf_name: &str) -> Result<Vec<(Box<[u8]>, T)>, EbbError> {
        let cf = self.cf_handle(cf_name)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (key, value) = item.map_err(storage_err)?;
            let decoded = decode(&value)?;
            out.push((key, decoded));
        }
        Ok(out)
    }

    fn scan_accounts<T: bincode::Decode<()>>(&self, cf_name: &str) -> Result<HashMap<AccountId, T>, EbbError> {
        self.scan(cf_name)?
            .into_iter()
            .map(|(key, value)| Ok((account_from_key(&key)?, value)))
            .collect()
    }

    /// A week-keyed family that must hold every week from 0 with no gaps.
    fn scan_series<T: bincode::Decode<()>>(&self, cf_name: &str) -> Result<Vec<T>, EbbError> {
        let mut out = Vec::new();
        for (key, value) in self.scan(cf_name)? {
            let week = week_from_key(&key)?;
            if week as usize != out.len() {
                return Err(EbbError::Storage(format!("{cf_name}: expected week {}, found {week}", out.len())));
            }
            out.push(value);
        }
        Ok(out)
    }

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, EbbError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| EbbError::Storage(format!("missing column family: {name}")))
    }

    fn put_or_delete<T: bincode::Encode>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: Option<&T>,
    ) -> Result<(), EbbError> {
        let cf = self.cf_handle(cf_name)?;
        match value {
            Some(value) => batch.put_cf(cf, key, encode(value)?),
            None => batch.delete_cf(cf, key),
        }
        Ok(())
    }
}

impl StateStore for RocksStore {
    fn load(&self) -> Result<Option<(LedgerState, DistributorState)>, EbbError> {
        let settings: Option<LedgerSettings> = self.get_decoded(CF_META, META_LEDGER_SETTINGS)?;
        let balances: Option<(u64, u64)> = self.get_decoded(CF_META, META_REWARD_BALANCES)?;
        let (settings, (last_balance, total_claimed)) = match (settings, balances) {
            (Some(settings), Some(balances)) => (settings, balances),
            (None, None) => return Ok(None),
            _ => return Err(EbbError::Storage("partial state on disk".into())),
        };

        let positions: HashMap<AccountId, LockPosition> = self.scan_accounts(CF_POSITIONS)?;
        let histories: HashMap<AccountId, AccountHistory> = self.scan_accounts(CF_HISTORIES)?;
        let totals: Vec<AggregatePoint> = self.scan_series(CF_TOTALS)?;
        let unlocks = self
            .scan::<u128>(CF_UNLOCKS)?
            .into_iter()
            .map(|(key, amount)| Ok((week_from_key(&key)?, amount)))
            .collect::<Result<BTreeMap<Week, u128>, EbbError>>()?;
        let rollup =
            Rollup::from_parts(totals, unlocks).ok_or_else(|| EbbError::Storage("no committed totals".into()))?;
        let ledger = LedgerState::from_parts(settings, positions, histories, rollup);

        let reward_per_week: Vec<u64> = self.scan_series(CF_REWARDS)?;
        let last_claimed: HashMap<AccountId, Week> = self.scan_accounts(CF_WATERMARKS)?;
        let rewards = DistributorState::from_parts(reward_per_week, last_claimed, last_balance, total_claimed);

        debug!(
            accounts = ledger.histories().count(),
            frontier = ledger.rollup().frontier(),
            settled = rewards.rewards().len(),
            "state loaded"
        );
        Ok(Some((ledger, rewards)))
    }

    fn save(&self, ledger: &LedgerState, rewards: &DistributorState) -> Result<(), EbbError> {
        let mut batch = WriteBatch::default();
        let start: &[u8] = &[];
        for name in DATA_CFS {
            batch.delete_range_cf(self.cf_handle(name)?, start, &KEY_END[..]);
        }

        let cf = self.cf_handle(CF_POSITIONS)?;
        for (account, position) in ledger.positions() {
            batch.put_cf(cf, account.0, encode(position)?);
        }
        let cf = self.cf_handle(CF_HISTORIES)?;
        for (account, history) in ledger.histories() {
            batch.put_cf(cf, account.0, encode(history)?);
        }
        let cf = self.cf_handle(CF_TOTALS)?;
        for (week, point) in ledger.rollup().totals().iter().enumerate() {
            batch.put_cf(cf, week_key(week as Week), encode(point)?);
        }
        let cf = self.cf_handle(CF_UNLOCKS)?;
        for (week, amount) in ledger.rollup().unlocks() {
            batch.put_cf(cf, week_key(week), encode(&amount)?);
        }
        let cf = self.cf_handle(CF_REWARDS)?;
        for (week, reward) in rewards.rewards().iter().enumerate() {
            batch.put_cf(cf, week_key(week as Week), encode(reward)?);
        }
        let cf = self.cf_handle(CF_WATERMARKS)?;
        for (account, week) in rewards.watermarks() {
            batch.put_cf(cf, account.0, encode(week)?);
        }
        let cf = self.cf_handle(CF_META)?;
        batch.put_cf(cf, META_LEDGER_SETTINGS, encode(ledger.settings())?);
        batch.put_cf(cf, META_REWARD_BALANCES, encode(&rewards.balances())?);

        let entries = batch.len();
        self.db.write(batch).map_err(storage_err)?;
        debug!(entries, "state saved");
        Ok(())
    }

    fn write_changes(
        &self,
        ledger: &LedgerState,
        ledger_journal: &LedgerJournal,
        rewards: &DistributorState,
        rewards_journal: &DistributorJournal,
    ) -> Result<(), EbbError> {
        let mut batch = WriteBatch::default();

        for account in ledger_journal.accounts() {
            self.put_or_delete(&mut batch, CF_POSITIONS, &account.0, ledger.position(account))?;
            self.put_or_delete(&mut batch, CF_HISTORIES, &account.0, ledger.history(account))?;
        }
        if let Some(weeks) = ledger_journal.total_weeks() {
            for week in weeks {
                self.put_or_delete(&mut batch, CF_TOTALS, &week_key(week), ledger.rollup().committed(week))?;
            }
        }
        for week in ledger_journal.unlock_weeks() {
            let amount = Some(ledger.rollup().scheduled_unlock(week)).filter(|a| *a > 0);
            self.put_or_delete(&mut batch, CF_UNLOCKS, &week_key(week), amount.as_ref())?;
        }
        if ledger_journal.settings_changed() {
            batch.put_cf(self.cf_handle(CF_META)?, META_LEDGER_SETTINGS, encode(ledger.settings())?);
        }

        if let Some(weeks) = rewards_journal.settled_weeks() {
            for week in weeks {
                let reward = rewards.rewards().get(week as usize);
                self.put_or_delete(&mut batch, CF_REWARDS, &week_key(week), reward)?;
            }
        }
        for account in rewards_journal.accounts() {
            self.put_or_delete(&mut batch, CF_WATERMARKS, &account.0, rewards.watermark(account).as_ref())?;
        }
        if rewards_journal.balances_changed() {
            batch.put_cf(self.cf_handle(CF_META)?, META_REWARD_BALANCES, encode(&rewards.balances())?);
        }

        if batch.is_empty() {
            return Ok(());
        }
        let entries = batch.len();
        self.db.write(batch).map_err(storage_err)?;
        debug!(entries, "changes written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_keys_sort_numerically() {
        assert!(week_key(255) < week_key(256));
        assert!(week_key(Week::MAX).as_slice() < KEY_END.as_slice());
        assert_eq!(week_from_key(&week_key(513)).unwrap(), 513);
        assert!(week_from_key(&[1, 2, 3]).is_err());
    }

    #[test]
    fn account_keys_round_trip() {
        let account = AccountId::from_label("alice");
        assert_eq!(account_from_key(&account.0).unwrap(), account);
        assert!(account.0.as_slice() < KEY_END.as_slice());
        assert!(account_from_key(&[0; 31]).is_err());
    }
}
