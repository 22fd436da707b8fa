//! Propagation behavior against real resources

mod common;

use std::sync::Arc;

use common::{events, init_logging, Journal, KvManager, KvTxn};
use jtx::{
    JtxError, PropagationBehavior, TransactionContext, TransactionManager, TransactionMode,
    TransactionStatus,
};

fn setup() -> (Journal, Arc<KvManager>, TransactionManager) {
    init_logging();
    let journal = Journal::default();
    let kv = Arc::new(KvManager::new(&journal));
    let manager = TransactionManager::new();
    manager.register_resource_manager(Arc::clone(&kv)).unwrap();
    (journal, kv, manager)
}

// ============== Joining ==============

#[test]
fn test_joined_writes_commit_once_at_outer_level() {
    let (journal, kv, manager) = setup();
    let mut ctx = TransactionContext::new();

    let outer = manager.request_transaction(&mut ctx, TransactionMode::required(), None).unwrap();
    manager.request_resource::<KvTxn>(&outer).unwrap().put("order:1", "placed");

    for behavior in [
        PropagationBehavior::Required,
        PropagationBehavior::Supports,
        PropagationBehavior::Mandatory,
    ] {
        let inner = manager
            .request_transaction(&mut ctx, TransactionMode::new(behavior), None)
            .unwrap();
        assert_eq!(inner, outer);
        manager.request_resource::<KvTxn>(&inner).unwrap().put("order:1", "paid");
        manager.commit_transaction(&mut ctx, &inner).unwrap();
        assert_eq!(kv.store.get("order:1"), None);
    }

    manager.commit_transaction(&mut ctx, &outer).unwrap();
    assert_eq!(kv.store.get("order:1").as_deref(), Some("paid"));
    assert_eq!(events(&journal), vec!["kv.begin", "kv.commit"]);
}

#[test]
fn test_inner_failure_rolls_back_whole_transaction() {
    let (journal, kv, manager) = setup();
    let mut ctx = TransactionContext::new();

    let outer = manager.request_transaction(&mut ctx, TransactionMode::required(), None).unwrap();
    manager.request_resource::<KvTxn>(&outer).unwrap().put("order:1", "placed");

    let inner = manager.request_transaction(&mut ctx, TransactionMode::required(), None).unwrap();
    manager
        .rollback_transaction(&mut ctx, &inner, Some(&"payment declined"))
        .unwrap();
    assert!(outer.is_rollback_only());

    let err = manager.commit_transaction(&mut ctx, &outer).unwrap_err();
    assert!(matches!(err, JtxError::RollbackOnly { .. }));
    assert_eq!(outer.status(), TransactionStatus::RolledBack);
    assert_eq!(kv.store.len(), 0);
    assert_eq!(events(&journal), vec!["kv.begin", "kv.rollback"]);
}

#[test]
fn test_set_rollback_only_by_application() {
    let (_journal, kv, manager) = setup();
    let mut ctx = TransactionContext::new();

    let tx = manager.request_transaction(&mut ctx, TransactionMode::required(), None).unwrap();
    manager.request_resource::<KvTxn>(&tx).unwrap().put("k", "v");
    tx.set_rollback_only();

    assert!(manager.commit_transaction(&mut ctx, &tx).is_err());
    assert_eq!(kv.store.get("k"), None);
}

// ============== Suspension ==============

#[test]
fn test_requires_new_survives_outer_rollback() {
    let (_journal, kv, manager) = setup();
    let mut ctx = TransactionContext::new();

    let outer = manager.request_transaction(&mut ctx, TransactionMode::required(), None).unwrap();
    manager.request_resource::<KvTxn>(&outer).unwrap().put("order:1", "placed");

    let audit = manager
        .request_transaction(&mut ctx, TransactionMode::requires_new(), None)
        .unwrap();
    assert_ne!(audit, outer);
    assert_eq!(outer.status(), TransactionStatus::Suspended);
    manager.request_resource::<KvTxn>(&audit).unwrap().put("audit:1", "attempted");
    manager.commit_transaction(&mut ctx, &audit).unwrap();

    assert_eq!(manager.get_transaction(&ctx, None), Some(outer.clone()));
    manager.rollback_transaction(&mut ctx, &outer, None).unwrap();

    assert_eq!(kv.store.get("audit:1").as_deref(), Some("attempted"));
    assert_eq!(kv.store.get("order:1"), None);
}

#[test]
fn test_deep_suspension_restores_in_order() {
    let (_journal, _kv, manager) = setup();
    let mut ctx = TransactionContext::new();

    let mut stack = vec![manager
        .request_transaction(&mut ctx, TransactionMode::required(), None)
        .unwrap()];
    for i in 0..5 {
        let mode = if i % 2 == 0 {
            TransactionMode::requires_new()
        } else {
            TransactionMode::not_supported()
        };
        stack.push(manager.request_transaction(&mut ctx, mode, None).unwrap());
    }
    assert_eq!(ctx.total_transactions(), 6);

    while let Some(tx) = stack.pop() {
        assert_eq!(manager.get_transaction(&ctx, None), Some(tx.clone()));
        manager.commit_transaction(&mut ctx, &tx).unwrap();
        if let Some(below) = stack.last() {
            assert_eq!(manager.get_transaction(&ctx, None), Some(below.clone()));
            assert_ne!(below.status(), TransactionStatus::Suspended);
        }
    }
    assert!(ctx.is_empty());
}

#[test]
fn test_not_supported_writes_through() {
    let (journal, kv, manager) = setup();
    let mut ctx = TransactionContext::new();

    let outer = manager.request_transaction(&mut ctx, TransactionMode::required(), None).unwrap();
    let plain = manager
        .request_transaction(&mut ctx, TransactionMode::not_supported(), None)
        .unwrap();
    assert!(plain.is_no_transaction());
    {
        let mut txn = manager.request_resource::<KvTxn>(&plain).unwrap();
        assert!(!txn.active);
        txn.put("counter", "1");
    }
    // Visible before any commit
    assert_eq!(kv.store.get("counter").as_deref(), Some("1"));

    manager.commit_transaction(&mut ctx, &plain).unwrap();
    manager.rollback_transaction(&mut ctx, &outer, None).unwrap();
    assert_eq!(kv.store.get("counter").as_deref(), Some("1"));
    assert_eq!(events(&journal), vec!["kv.begin(inactive)", "kv.commit"]);
}

// ============== Failing behaviors ==============

#[test]
fn test_mandatory_and_never() {
    let (journal, _kv, manager) = setup();
    let mut ctx = TransactionContext::new();

    assert!(matches!(
        manager.request_transaction(&mut ctx, TransactionMode::mandatory(), None),
        Err(JtxError::NoTransaction { scope: None })
    ));

    let tx = manager.request_transaction(&mut ctx, TransactionMode::required(), None).unwrap();
    assert!(matches!(
        manager.request_transaction(&mut ctx, TransactionMode::never(), None),
        Err(JtxError::ExistingTransaction { .. })
    ));
    // The failed request did not disturb the ambient transaction
    assert_eq!(tx.ref_count(), 1);
    assert_eq!(tx.status(), TransactionStatus::Active);
    manager.commit_transaction(&mut ctx, &tx).unwrap();
    assert!(events(&journal).is_empty());
}

#[test]
fn test_mandatory_inside_not_supported_fails() {
    let (_journal, _kv, manager) = setup();
    let mut ctx = TransactionContext::new();

    let _outer = manager.request_transaction(&mut ctx, TransactionMode::required(), None).unwrap();
    let _plain = manager
        .request_transaction(&mut ctx, TransactionMode::not_supported(), None)
        .unwrap();
    assert!(matches!(
        manager.request_transaction(&mut ctx, TransactionMode::mandatory(), None),
        Err(JtxError::NoTransaction { .. })
    ));
    // NEVER is fine there
    assert!(manager.request_transaction(&mut ctx, TransactionMode::never(), None).is_ok());
}

// ============== Nested ==============

#[test]
fn test_nested_commits_with_parent() {
    let (_journal, kv, manager) = setup();
    let mut ctx = TransactionContext::new();

    let parent = manager.request_transaction(&mut ctx, TransactionMode::required(), None).unwrap();
    let child = manager.request_transaction(&mut ctx, TransactionMode::nested(), None).unwrap();
    manager.request_resource::<KvTxn>(&child).unwrap().put("line:1", "widget");
    manager.commit_transaction(&mut ctx, &child).unwrap();
    assert_eq!(kv.store.get("line:1"), None);

    manager.commit_transaction(&mut ctx, &parent).unwrap();
    assert_eq!(kv.store.get("line:1").as_deref(), Some("widget"));
}

#[test]
fn test_nested_rollback_dooms_parent() {
    let (_journal, kv, manager) = setup();
    let mut ctx = TransactionContext::new();

    let parent = manager.request_transaction(&mut ctx, TransactionMode::required(), None).unwrap();
    manager.request_resource::<KvTxn>(&parent).unwrap().put("order:1", "placed");
    let child = manager.request_transaction(&mut ctx, TransactionMode::nested(), None).unwrap();
    manager.rollback_transaction(&mut ctx, &child, Some(&"bad line")).unwrap();

    assert!(parent.is_rollback_only());
    assert!(manager.commit_transaction(&mut ctx, &parent).is_err());
    assert_eq!(kv.store.len(), 0);
}

// ============== Scopes ==============

#[test]
fn test_scopes_are_partitioned() {
    let (_journal, kv, manager) = setup();
    let mut ctx = TransactionContext::new();

    let orders = manager
        .request_transaction(&mut ctx, TransactionMode::required(), Some("Orders#place"))
        .unwrap();
    let audit = manager
        .request_transaction(&mut ctx, TransactionMode::required(), Some("Audit#record"))
        .unwrap();
    assert_ne!(orders, audit);
    assert_eq!(audit.ref_count(), 1);

    manager.request_resource::<KvTxn>(&audit).unwrap().put("audit:1", "x");
    manager.request_resource::<KvTxn>(&orders).unwrap().put("order:1", "y");
    manager.rollback_transaction(&mut ctx, &orders, None).unwrap();
    manager.commit_transaction(&mut ctx, &audit).unwrap();

    assert_eq!(kv.store.get("audit:1").as_deref(), Some("x"));
    assert_eq!(kv.store.get("order:1"), None);
}

#[test]
fn test_mode_reaches_resource_manager() {
    let (_journal, _kv, manager) = setup();
    let mut ctx = TransactionContext::new();

    let mode = TransactionMode::required()
        .with_read_only(true)
        .with_timeout(Some(5));
    let tx = manager.request_transaction(&mut ctx, mode, None).unwrap();
    let joined = manager
        .request_transaction(&mut ctx, TransactionMode::supports(), None)
        .unwrap();

    // The resource begins with the owning transaction's mode
    let txn = manager.request_resource::<KvTxn>(&joined).unwrap();
    assert_eq!(txn.mode, mode);
    assert_eq!(*tx.mode(), mode);
}
