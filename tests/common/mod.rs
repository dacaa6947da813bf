#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use sql_dbhelper::prelude::*;
use tempfile::TempDir;

/// Counters and statement log shared by every connection a `MockProvider` creates.
#[derive(Debug, Default)]
pub struct MockLog {
    pub created: AtomicUsize,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub cancels: AtomicUsize,
    pub executed: Mutex<Vec<String>>,
    pub last_parameters: Mutex<Vec<Parameter>>,
}

impl MockLog {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

/// Scripted behavior for mock connections.
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    /// Statements containing this text fail.
    pub fail_on: Option<String>,
    pub fail_rollback: bool,
    /// Number of initial open attempts that fail.
    pub failing_opens: usize,
    /// Statements containing this text block until cancelled.
    pub block_on: Option<String>,
    /// Result sets returned by every reader.
    pub result_sets: Vec<ResultSet>,
}

#[derive(Clone, Default)]
pub struct MockProvider {
    pub log: Arc<MockLog>,
    pub script: MockScript,
}

impl MockProvider {
    pub fn new(script: MockScript) -> Self {
        Self {
            log: Arc::new(MockLog::default()),
            script,
        }
    }

    pub fn client(&self) -> DbClient {
        DbClient::new(Arc::new(self.clone()), ClientOptions::new("mock://db"))
    }
}

impl ProviderFactory for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn create_connection(&self) -> Result<Box<dyn DbConnection>, DbHelperError> {
        self.log.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            log: Arc::clone(&self.log),
            script: self.script.clone(),
            connection_string: String::new(),
            open: false,
            in_tx: false,
            cancelled: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct MockCancel {
    flag: Arc<AtomicBool>,
    log: Arc<MockLog>,
}

impl CancelHandle for MockCancel {
    fn cancel(&self) {
        self.log.cancels.fetch_add(1, Ordering::SeqCst);
        self.flag.store(true, Ordering::SeqCst);
    }
}

pub struct MockConnection {
    log: Arc<MockLog>,
    script: MockScript,
    connection_string: String,
    open: bool,
    in_tx: bool,
    cancelled: Arc<AtomicBool>,
}

impl MockConnection {
    fn run(&mut self, command: &mut Command) -> Result<(), DbHelperError> {
        if !self.open {
            return Err(DbHelperError::ConnectionError("mock connection is closed".into()));
        }
        self.log.executed.lock().unwrap().push(command.text.clone());
        *self.log.last_parameters.lock().unwrap() = command.parameters.clone();

        if let Some(block) = &self.script.block_on
            && command.text.contains(block.as_str())
        {
            while !self.cancelled.swap(false, Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            return Err(DbHelperError::Cancelled);
        }
        if let Some(fail) = &self.script.fail_on
            && command.text.contains(fail.as_str())
        {
            return Err(DbHelperError::ExecutionError(format!(
                "mock failure: {}",
                command.text
            )));
        }
        for param in command.output_parameters_mut() {
            param.value = if param.db_type == DbType::Text {
                RowValues::Text("out".into())
            } else {
                RowValues::Int(42)
            };
        }
        Ok(())
    }
}

impl DbConnection for MockConnection {
    fn connection_string(&self) -> &str {
        &self.connection_string
    }

    fn set_connection_string(&mut self, value: &str) {
        self.connection_string = value.to_string();
    }

    fn database(&self) -> String {
        "mock".into()
    }

    fn state(&self) -> ConnectionState {
        if self.open {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    fn open(&mut self) -> Result<(), DbHelperError> {
        let attempt = self.log.opens.fetch_add(1, Ordering::SeqCst);
        if attempt < self.script.failing_opens {
            return Err(DbHelperError::ConnectionError("mock open failure".into()));
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DbHelperError> {
        if self.open {
            self.open = false;
            self.log.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn begin_transaction(&mut self, _isolation: IsolationLevel) -> Result<(), DbHelperError> {
        self.log.begins.fetch_add(1, Ordering::SeqCst);
        self.in_tx = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbHelperError> {
        self.log.commits.fetch_add(1, Ordering::SeqCst);
        self.in_tx = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbHelperError> {
        self.log.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.in_tx = false;
        if self.script.fail_rollback {
            return Err(DbHelperError::ConnectionError("mock rollback failure".into()));
        }
        Ok(())
    }

    fn execute_non_query(&mut self, command: &mut Command) -> Result<usize, DbHelperError> {
        self.run(command)?;
        Ok(1)
    }

    fn execute_scalar(&mut self, command: &mut Command) -> Result<RowValues, DbHelperError> {
        self.run(command)?;
        Ok(self
            .script
            .result_sets
            .first()
            .and_then(|rs| rs.results.first())
            .and_then(|row| row.get_by_index(0).cloned())
            .unwrap_or(RowValues::Null))
    }

    fn execute_reader(
        &mut self,
        command: &mut Command,
        _behavior: CommandBehavior,
    ) -> Result<Box<dyn DbReader>, DbHelperError> {
        self.run(command)?;
        Ok(Box::new(MockReader {
            sets: self.script.result_sets.clone(),
            current: 0,
            row: None,
            closed: false,
        }))
    }

    fn cancel_handle(&self) -> Option<Arc<dyn CancelHandle>> {
        Some(Arc::new(MockCancel {
            flag: Arc::clone(&self.cancelled),
            log: Arc::clone(&self.log),
        }))
    }
}

pub struct MockReader {
    sets: Vec<ResultSet>,
    current: usize,
    row: Option<usize>,
    closed: bool,
}

impl DbReader for MockReader {
    fn column_names(&self) -> Arc<Vec<String>> {
        self.sets
            .get(self.current)
            .map(|rs| Arc::clone(rs.get_column_names()))
            .unwrap_or_default()
    }

    fn read(&mut self) -> Result<bool, DbHelperError> {
        let len = self.sets.get(self.current).map_or(0, ResultSet::len);
        let next = self.row.map_or(0, |r| r + 1);
        self.row = Some(next.min(len));
        Ok(next < len)
    }

    fn get_value(&self, ordinal: usize) -> Result<RowValues, DbHelperError> {
        self.sets
            .get(self.current)
            .zip(self.row)
            .and_then(|(rs, r)| rs.results.get(r))
            .and_then(|row| row.get_by_index(ordinal).cloned())
            .ok_or_else(|| DbHelperError::ExecutionError("no value".into()))
    }

    fn next_result(&mut self) -> Result<bool, DbHelperError> {
        self.row = None;
        self.current += 1;
        Ok(self.current < self.sets.len())
    }

    fn records_affected(&self) -> usize {
        0
    }

    fn close(&mut self) -> Result<(), DbHelperError> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Result set built from column names and rows.
pub fn result_set(columns: &[&str], rows: Vec<Vec<RowValues>>) -> ResultSet {
    let mut rs = ResultSet::with_capacity(rows.len());
    rs.set_column_names(Arc::new(columns.iter().map(|c| (*c).to_string()).collect()));
    for row in rows {
        rs.add_row_values(row);
    }
    rs
}

/// File-backed SQLite path inside a fresh temp dir; the dir is removed when the guard drops.
pub fn unique_db_path(prefix: &str) -> (TempDir, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    let path = path.to_string_lossy().into_owned();
    (dir, path)
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub score: i32,
    pub nickname: Option<String>,
}

impl DataObject for Person {
    fn describe(map: &mut FieldMap<Self>) {
        map.field("Id", |p: &mut Person, v: i64| p.id = v);
        map.field("Name", |p: &mut Person, v: String| p.name = v);
        map.field("Score", |p: &mut Person, v: i32| p.score = v)
            .default_if_null(0);
        map.field("Nickname", |p: &mut Person, v: Option<String>| p.nickname = v);
    }
}
