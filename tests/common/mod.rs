//! Shared in-memory resource managers for the integration tests
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use jtx::{ResourceError, ResourceManager, TransactionMode};

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn events(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Committed key-value data
#[derive(Debug, Clone, Default)]
pub struct Store {
    data: Arc<Mutex<BTreeMap<String, String>>>,
}

impl Store {
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    fn put(&self, key: String, value: String) {
        self.data.lock().unwrap().insert(key, value);
    }
}

/// Key-value transaction: buffers writes when active, writes through otherwise
#[derive(Debug)]
pub struct KvTxn {
    pub active: bool,
    pub mode: TransactionMode,
    store: Store,
    pending: Vec<(String, String)>,
}

impl KvTxn {
    pub fn put(&mut self, key: &str, value: &str) {
        if self.active {
            self.pending.push((key.to_string(), value.to_string()));
        } else {
            self.store.put(key.to_string(), value.to_string());
        }
    }
}

#[derive(Debug, Default)]
pub struct KvManager {
    pub store: Store,
    journal: Journal,
    pub fail_commit: AtomicBool,
    pub fail_rollback: AtomicBool,
}

impl KvManager {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: Arc::clone(journal),
            ..Self::default()
        }
    }

    pub fn fail_commits(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_rollbacks(&self) {
        self.fail_rollback.store(true, Ordering::SeqCst);
    }

    fn record(&self, event: &str) {
        self.journal.lock().unwrap().push(event.to_string());
    }
}

impl ResourceManager for KvManager {
    type Resource = KvTxn;

    fn begin_transaction(
        &self,
        mode: &TransactionMode,
        active: bool,
    ) -> Result<KvTxn, ResourceError> {
        self.record(if active { "kv.begin" } else { "kv.begin(inactive)" });
        Ok(KvTxn {
            active,
            mode: *mode,
            store: self.store.clone(),
            pending: Vec::new(),
        })
    }

    fn commit_transaction(&self, txn: KvTxn) -> Result<(), ResourceError> {
        self.record("kv.commit");
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err("kv store is read-only".into());
        }
        for (key, value) in txn.pending {
            self.store.put(key, value);
        }
        Ok(())
    }

    fn rollback_transaction(&self, _txn: KvTxn) -> Result<(), ResourceError> {
        self.record("kv.rollback");
        if self.fail_rollback.load(Ordering::SeqCst) {
            return Err("kv connection lost".into());
        }
        Ok(())
    }

    fn close(&self) -> Result<(), ResourceError> {
        self.record("kv.close");
        Ok(())
    }
}

/// Outgoing messages, delivered on commit
#[derive(Debug, Default)]
pub struct Outbox {
    pub messages: Vec<String>,
}

#[derive(Debug, Default)]
pub struct OutboxManager {
    pub delivered: Arc<Mutex<Vec<String>>>,
    journal: Journal,
    pub fail_commit: AtomicBool,
    pub fail_close: AtomicBool,
}

impl OutboxManager {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: Arc::clone(journal),
            ..Self::default()
        }
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }

    fn record(&self, event: &str) {
        self.journal.lock().unwrap().push(event.to_string());
    }
}

impl ResourceManager for OutboxManager {
    type Resource = Outbox;

    fn begin_transaction(
        &self,
        _mode: &TransactionMode,
        _active: bool,
    ) -> Result<Outbox, ResourceError> {
        self.record("outbox.begin");
        Ok(Outbox::default())
    }

    fn commit_transaction(&self, outbox: Outbox) -> Result<(), ResourceError> {
        self.record("outbox.commit");
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err("broker unreachable".into());
        }
        self.delivered.lock().unwrap().extend(outbox.messages);
        Ok(())
    }

    fn rollback_transaction(&self, _outbox: Outbox) -> Result<(), ResourceError> {
        self.record("outbox.rollback");
        Ok(())
    }

    fn close(&self) -> Result<(), ResourceError> {
        self.record("outbox.close");
        if self.fail_close.load(Ordering::SeqCst) {
            return Err("broker session leaked".into());
        }
        Ok(())
    }
}
