use crate::error::PersistenceError;
use chrono::{DateTime, Utc};
use configuration::PersistenceConfig;
use core_types::{CloseReason, LedgerSnapshot, Position, TradeLogEntry};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const POSITION_HEADER: [&str; 11] = [
    "position_id",
    "symbol",
    "side",
    "entry_price",
    "size",
    "margin",
    "stop_loss_price",
    "take_profit_price",
    "trailing_stop_price",
    "trail_pct",
    "opened_at",
];

const TRADE_LOG_HEADER: [&str; 10] = [
    "timestamp",
    "position_id",
    "symbol",
    "action",
    "side",
    "price",
    "size",
    "margin",
    "pnl",
    "reason",
];

/// The committed ledger state. Balance and positions travel together so a
/// single rename replaces both.
#[derive(Debug, Serialize, Deserialize)]
struct Status {
    margin_balance: Decimal,
    /// Absent in files written before positions were embedded; `load` then
    /// falls back to the positions CSV.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    positions: Option<BTreeMap<String, Position>>,
}

/// Durable home of the ledger: a JSON status file holding the balance and
/// the open positions, a CSV view of those positions and an append-only CSV
/// trade log.
///
/// The status file is the commit point. It is replaced atomically (write to
/// a temporary file, then rename), so a crash mid-write leaves the previous
/// snapshot intact, and the positions CSV is rewritten from it afterwards.
#[derive(Debug, Clone)]
pub struct StateStore {
    data_dir: PathBuf,
    status_path: PathBuf,
    positions_path: PathBuf,
    trade_log_path: PathBuf,
}

impl StateStore {
    pub fn new(config: &PersistenceConfig) -> Self {
        let dir = &config.data_dir;
        Self {
            data_dir: dir.clone(),
            status_path: dir.join(&config.status_file),
            positions_path: dir.join(&config.positions_file),
            trade_log_path: dir.join(&config.trade_log_file),
        }
    }

    pub fn trade_log_path(&self) -> &Path {
        &self.trade_log_path
    }

    /// Reconstructs the ledger snapshot. Missing files mean a fresh start:
    /// `initial_balance` and no positions.
    pub fn load(&self, initial_balance: Decimal) -> Result<LedgerSnapshot, PersistenceError> {
        let (balance, committed) = match fs::read_to_string(&self.status_path) {
            Ok(text) => {
                let status = serde_json::from_str::<Status>(&text)?;
                (status.margin_balance, status.positions)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.status_path.display(), %initial_balance, "No status file, starting fresh");
                (initial_balance, None)
            }
            Err(source) => return Err(io_error(&self.status_path, source)),
        };

        let positions = match committed {
            Some(positions) => positions,
            None if self.positions_path.exists() => self.read_positions()?,
            None => BTreeMap::new(),
        };

        tracing::info!(%balance, open_positions = positions.len(), "Loaded ledger state");
        Ok(LedgerSnapshot { balance, positions })
    }

    /// Replaces the persisted balance and positions with `snapshot`.
    ///
    /// Once the status file is renamed into place the snapshot is committed,
    /// even if refreshing the positions CSV afterwards fails. An empty
    /// position map removes the positions file.
    pub fn save_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<(), PersistenceError> {
        self.ensure_dir()?;

        let status = serde_json::to_vec_pretty(&Status {
            margin_balance: snapshot.balance,
            positions: Some(snapshot.positions.clone()),
        })?;
        write_atomically(&self.status_path, &status)?;

        if snapshot.positions.is_empty() {
            match fs::remove_file(&self.positions_path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => return Err(io_error(&self.positions_path, source)),
            }
            return Ok(());
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(POSITION_HEADER).map_err(|e| csv_error(&self.positions_path, e))?;
        for p in snapshot.positions.values() {
            writer
                .write_record([
                    p.position_id.to_string(),
                    p.symbol.clone(),
                    p.side.to_string(),
                    p.entry_price.to_string(),
                    p.size.to_string(),
                    p.margin.to_string(),
                    p.stop_loss_price.to_string(),
                    p.take_profit_price.to_string(),
                    opt_to_string(p.trailing_stop_price),
                    opt_to_string(p.trail_pct),
                    p.opened_at.to_rfc3339(),
                ])
                .map_err(|e| csv_error(&self.positions_path, e))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| io_error(&self.positions_path, e.into_error()))?;
        write_atomically(&self.positions_path, &bytes)
    }

    /// Appends entries to the trade log, writing the header if the file is new.
    ///
    /// All or nothing: the rows are encoded up front and a failed write
    /// truncates the file back to its previous length.
    pub fn append_trade_log(&self, entries: &[TradeLogEntry]) -> Result<(), PersistenceError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.ensure_dir()?;

        let path = &self.trade_log_path;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| io_error(path, e))?;
        let start = file.seek(SeekFrom::End(0)).map_err(|e| io_error(path, e))?;

        let bytes = encode_trade_log(path, entries, start == 0)?;
        if let Err(source) = file.write_all(&bytes).and_then(|()| file.sync_data()) {
            if let Err(e) = file.set_len(start) {
                tracing::error!(path = %path.display(), error = %e, "Failed to roll back a partial trade log append");
            }
            return Err(io_error(path, source));
        }
        Ok(())
    }

    /// Reads the whole trade log. Malformed rows are skipped with a warning.
    pub fn read_trade_log(&self) -> Result<Vec<TradeLogEntry>, PersistenceError> {
        let path = &self.trade_log_path;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
        let mut entries = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result.map_err(|e| csv_error(path, e))?;
            match parse_trade_log_entry(&record) {
                Ok(entry) => entries.push(entry),
                Err(reason) => {
                    tracing::warn!(path = %path.display(), line = idx + 2, %reason, "Skipping malformed trade log row");
                }
            }
        }
        Ok(entries)
    }

    fn read_positions(&self) -> Result<BTreeMap<String, Position>, PersistenceError> {
        let path = &self.positions_path;
        let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
        let mut positions = BTreeMap::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result.map_err(|e| csv_error(path, e))?;
            let position = parse_position(&record).map_err(|reason| PersistenceError::Malformed {
                path: path.display().to_string(),
                line: idx as u64 + 2,
                reason,
            })?;
            positions.insert(position.symbol.clone(), position);
        }
        Ok(positions)
    }

    fn ensure_dir(&self) -> Result<(), PersistenceError> {
        if self.data_dir.as_os_str().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.data_dir).map_err(|e| io_error(&self.data_dir, e))
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
    file.write_all(bytes).map_err(|e| io_error(&tmp, e))?;
    file.sync_all().map_err(|e| io_error(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| io_error(path, e))
}

fn encode_trade_log(path: &Path, entries: &[TradeLogEntry], with_header: bool) -> Result<Vec<u8>, PersistenceError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    if with_header {
        writer.write_record(TRADE_LOG_HEADER).map_err(|e| csv_error(path, e))?;
    }
    for e in entries {
        writer
            .write_record([
                e.timestamp.to_rfc3339(),
                e.position_id.to_string(),
                e.symbol.clone(),
                e.action.to_string(),
                e.side.to_string(),
                e.price.to_string(),
                e.size.to_string(),
                e.margin.to_string(),
                e.pnl.to_string(),
                opt_to_string(e.reason),
            ])
            .map_err(|err| csv_error(path, err))?;
    }
    writer.into_inner().map_err(|e| io_error(path, e.into_error()))
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io { path: path.display().to_string(), source }
}

fn csv_error(path: &Path, source: csv::Error) -> PersistenceError {
    PersistenceError::Csv { path: path.display().to_string(), source }
}

fn opt_to_string<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn field<T>(record: &csv::StringRecord, idx: usize, name: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = record.get(idx).ok_or_else(|| format!("missing column '{}'", name))?;
    raw.trim().parse::<T>().map_err(|e| format!("column '{}' value '{}': {}", name, raw, e))
}

fn optional_field<T>(record: &csv::StringRecord, idx: usize, name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    match record.get(idx).map(str::trim) {
        None | Some("") => Ok(None),
        Some(_) => field(record, idx, name).map(Some),
    }
}

fn parse_position(record: &csv::StringRecord) -> Result<Position, String> {
    Ok(Position {
        position_id: field(record, 0, "position_id")?,
        symbol: field(record, 1, "symbol")?,
        side: field(record, 2, "side")?,
        entry_price: field(record, 3, "entry_price")?,
        size: field(record, 4, "size")?,
        margin: field(record, 5, "margin")?,
        stop_loss_price: field(record, 6, "stop_loss_price")?,
        take_profit_price: field(record, 7, "take_profit_price")?,
        trailing_stop_price: optional_field(record, 8, "trailing_stop_price")?,
        trail_pct: optional_field(record, 9, "trail_pct")?,
        opened_at: field::<DateTime<Utc>>(record, 10, "opened_at")?,
    })
}

fn parse_trade_log_entry(record: &csv::StringRecord) -> Result<TradeLogEntry, String> {
    Ok(TradeLogEntry {
        timestamp: field::<DateTime<Utc>>(record, 0, "timestamp")?,
        position_id: field(record, 1, "position_id")?,
        symbol: field(record, 2, "symbol")?,
        action: field(record, 3, "action")?,
        side: field(record, 4, "side")?,
        price: field(record, 5, "price")?,
        size: field(record, 6, "size")?,
        margin: field(record, 7, "margin")?,
        pnl: field(record, 8, "pnl")?,
        reason: optional_field::<CloseReason>(record, 9, "reason")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Side, TradeAction};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn store(dir: &Path) -> StateStore {
        StateStore::new(&PersistenceConfig { data_dir: dir.to_path_buf(), ..Default::default() })
    }

    fn position(symbol: &str, trailing: bool) -> Position {
        Position {
            position_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side: if trailing { Side::Short } else { Side::Long },
            entry_price: dec!(101.25),
            size: dec!(0.0493827160493827160493827160),
            margin: dec!(1),
            stop_loss_price: dec!(96.1875),
            take_profit_price: dec!(106.3125),
            trailing_stop_price: trailing.then_some(dec!(104.28750)),
            trail_pct: trailing.then_some(dec!(0.03)),
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn missing_files_mean_fresh_start() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = store(dir.path()).load(dec!(10)).unwrap();
        assert_eq!(snapshot.balance, dec!(10));
        assert!(snapshot.positions.is_empty());
    }

    #[test]
    fn snapshot_round_trips_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut positions = BTreeMap::new();
        positions.insert("BTCUSDT".to_string(), position("BTCUSDT", false));
        positions.insert("ETHUSDT".to_string(), position("ETHUSDT", true));
        let snapshot = LedgerSnapshot { balance: dec!(7.987654321), positions };

        store.save_snapshot(&snapshot).unwrap();
        assert_eq!(store.load(dec!(10)).unwrap(), snapshot);
    }

    #[test]
    fn empty_snapshot_removes_positions_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut positions = BTreeMap::new();
        positions.insert("BTCUSDT".to_string(), position("BTCUSDT", false));
        store.save_snapshot(&LedgerSnapshot { balance: dec!(9), positions }).unwrap();
        assert!(dir.path().join("positions.csv").exists());

        store.save_snapshot(&LedgerSnapshot { balance: dec!(10.5), positions: BTreeMap::new() }).unwrap();
        assert!(!dir.path().join("positions.csv").exists());
        assert_eq!(store.load(dec!(1)).unwrap().balance, dec!(10.5));
    }

    #[test]
    fn trade_log_appends_with_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let p = position("SOLUSDT", false);
        let open = TradeLogEntry::opened(&p);
        let close = TradeLogEntry::closed(&p, dec!(104), dec!(0.19439), CloseReason::TakeProfit, Utc::now());

        store.append_trade_log(std::slice::from_ref(&open)).unwrap();
        store.append_trade_log(std::slice::from_ref(&close)).unwrap();

        let text = fs::read_to_string(store.trade_log_path()).unwrap();
        assert_eq!(text.matches("timestamp,position_id").count(), 1);

        let entries = store.read_trade_log().unwrap();
        assert_eq!(entries, vec![open, close]);
        assert_eq!(entries[1].action, TradeAction::Close);
        assert_eq!(entries[1].reason, Some(CloseReason::TakeProfit));
    }

    #[test]
    fn malformed_trade_log_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let p = position("SOLUSDT", false);
        store.append_trade_log(&[TradeLogEntry::opened(&p)]).unwrap();

        let mut file = OpenOptions::new().append(true).open(store.trade_log_path()).unwrap();
        writeln!(file, "not-a-date,x,SOLUSDT,OPEN,LONG,1,1,1,0,").unwrap();

        assert_eq!(store.read_trade_log().unwrap().len(), 1);
    }

    #[test]
    fn failed_positions_view_does_not_lose_margin() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.save_snapshot(&LedgerSnapshot { balance: dec!(10), positions: BTreeMap::new() }).unwrap();

        // A directory squatting on the temp path makes the CSV rewrite fail.
        fs::create_dir(dir.path().join("positions.csv.tmp")).unwrap();
        let mut positions = BTreeMap::new();
        positions.insert("BTCUSDT".to_string(), position("BTCUSDT", false));
        let snapshot = LedgerSnapshot { balance: dec!(9), positions };
        assert!(store.save_snapshot(&snapshot).is_err());

        let restored = store.load(dec!(10)).unwrap();
        assert_eq!(restored, snapshot);
        assert_eq!(restored.balance + restored.committed_margin(), dec!(10));
    }

    #[test]
    fn status_without_positions_falls_back_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut positions = BTreeMap::new();
        positions.insert("ETHUSDT".to_string(), position("ETHUSDT", true));
        store.save_snapshot(&LedgerSnapshot { balance: dec!(9), positions: positions.clone() }).unwrap();
        fs::write(dir.path().join("status.json"), r#"{"margin_balance": "9"}"#).unwrap();

        let restored = store.load(dec!(10)).unwrap();
        assert_eq!(restored.balance, dec!(9));
        assert_eq!(restored.positions, positions);
    }

    #[test]
    fn rejected_append_can_be_retried_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let p = position("SOLUSDT", false);
        let open = TradeLogEntry::opened(&p);
        let close = TradeLogEntry::closed(&p, dec!(99), dec!(-0.11), CloseReason::StopLoss, Utc::now());
        store.append_trade_log(std::slice::from_ref(&open)).unwrap();

        let parked = dir.path().join("parked.csv");
        fs::rename(store.trade_log_path(), &parked).unwrap();
        fs::create_dir(store.trade_log_path()).unwrap();
        assert!(store.append_trade_log(std::slice::from_ref(&close)).is_err());

        fs::remove_dir(store.trade_log_path()).unwrap();
        fs::rename(&parked, store.trade_log_path()).unwrap();
        store.append_trade_log(std::slice::from_ref(&close)).unwrap();

        assert_eq!(store.read_trade_log().unwrap(), vec![open, close]);
    }

    #[test]
    fn corrupt_positions_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("positions.csv"), "position_id,symbol\nnope,BTCUSDT\n").unwrap();
        assert!(matches!(
            store(dir.path()).load(dec!(10)),
            Err(PersistenceError::Malformed { .. })
        ));
    }
}
