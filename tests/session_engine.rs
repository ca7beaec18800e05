//! Session Engine Tests
//!
//! Accumulation semantics, concurrent appends and validated submits against
//! the onboarding domain.
//!
//! Run with: cargo test --test session_engine

use std::sync::Arc;
use std::time::Duration;

use ob_poc_dsl::domains::onboarding;
use ob_poc_dsl::error::{SessionError, TransitionError};
use ob_poc_dsl::session::{append_fragment, Session, SessionManager, FRAGMENT_SEPARATOR};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const CREATE: &str = r#"(case.create (cbu.id "CBU-1234") (nature-purpose "UCITS equity fund"))"#;
const ADD_PRODUCTS: &str = r#"(products.add "CUSTODY" "FUND_ACCOUNTING")"#;

fn accumulated(fragments: &[String]) -> String {
    let mut text = String::new();
    for fragment in fragments {
        append_fragment(&mut text, fragment);
    }
    text
}

proptest! {
    #[test]
    fn test_accumulation_is_associative(
        a in prop::collection::vec("[a-z() ]{0,12}", 0..5),
        b in prop::collection::vec("[a-z() ]{0,12}", 0..5),
    ) {
        let whole: Vec<String> = a.iter().chain(b.iter()).cloned().collect();

        let mut left = accumulated(&a);
        append_fragment(&mut left, &accumulated(&b));

        prop_assert_eq!(left, accumulated(&whole));
    }

    #[test]
    fn test_version_counts_non_empty_fragments(
        fragments in prop::collection::vec("[a-z]{0,4}", 0..10),
    ) {
        let mut session = Session::new("prop", "onboarding");
        for fragment in &fragments {
            session.accumulate(fragment);
        }
        let expected = fragments.iter().filter(|f| !f.is_empty()).count() as u64;
        prop_assert_eq!(session.version(), expected);
    }
}

#[test]
fn test_empty_fragment_is_a_no_op() {
    let mut session = Session::new("s-1", "onboarding");
    assert!(!session.accumulate(""));
    assert_eq!(session.text(), "");
    assert_eq!(session.version(), 0);

    assert!(session.accumulate(CREATE));
    assert!(!session.accumulate(""));
    assert_eq!(session.text(), CREATE);
    assert_eq!(session.version(), 1);

    assert!(session.accumulate(ADD_PRODUCTS));
    assert_eq!(
        session.text(),
        format!("{}{}{}", CREATE, FRAGMENT_SEPARATOR, ADD_PRODUCTS)
    );
}

#[tokio::test]
async fn test_concurrent_accumulates_serialize() {
    let manager = Arc::new(SessionManager::new());
    manager.get_or_create("shared", "onboarding").await;

    let mut tasks = Vec::new();
    for i in 0..32 {
        let manager = Arc::clone(&manager);
        tasks.push(tokio::spawn(async move {
            manager
                .accumulate("shared", &format!("(note.add \"{}\")", i))
                .await
                .unwrap()
        }));
    }

    let mut versions = Vec::new();
    for task in tasks {
        versions.push(task.await.unwrap());
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=32).collect::<Vec<u64>>());

    let session = manager.snapshot("shared").await.unwrap();
    assert_eq!(session.version(), 32);
    let fragments: Vec<&str> = session.text().split(FRAGMENT_SEPARATOR).collect();
    assert_eq!(fragments.len(), 32);
    for i in 0..32 {
        assert!(fragments.contains(&format!("(note.add \"{}\")", i).as_str()));
    }
}

#[tokio::test]
async fn test_sessions_do_not_block_each_other() {
    let manager = Arc::new(SessionManager::new());
    manager.get_or_create("a", "onboarding").await;
    manager.get_or_create("b", "onboarding").await;

    let held = manager.get("a").await.unwrap();
    let guard = held.lock().await;

    let version = tokio::time::timeout(Duration::from_secs(1), manager.accumulate("b", CREATE))
        .await
        .expect("accumulate on b waited for a")
        .unwrap();
    assert_eq!(version, 1);

    // Work on `a` queues behind the held lock until it is released
    let pending = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.accumulate("a", ADD_PRODUCTS).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished());
    assert_eq!(guard.version(), 0);
    drop(guard);

    assert_eq!(pending.await.unwrap().unwrap(), 1);
    assert_eq!(manager.snapshot("b").await.unwrap().text(), CREATE);
}

#[tokio::test]
async fn test_submit_walks_and_rejects() {
    let manager = SessionManager::new();
    let domain = onboarding::domain().unwrap();
    manager.get_or_create("case-1", "onboarding").await;

    let first = manager.submit("case-1", CREATE, &domain).await.unwrap();
    assert_eq!(first.previous_state, None);
    assert_eq!(first.state.as_deref(), Some("CREATE"));
    assert_eq!(first.version, 1);

    let second = manager.submit("case-1", ADD_PRODUCTS, &domain).await.unwrap();
    assert_eq!(second.previous_state.as_deref(), Some("CREATE"));
    assert_eq!(second.state.as_deref(), Some("PRODUCTS_ADDED"));
    assert_eq!(second.verbs, vec!["products.add"]);

    // products.add is only legal from CREATE
    let err = manager.submit("case-1", ADD_PRODUCTS, &domain).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transition(TransitionError::VerbNotAllowed { ref current, .. }) if current == "PRODUCTS_ADDED"
    ));

    let session = manager.snapshot("case-1").await.unwrap();
    assert_eq!(session.version(), 2);
    assert_eq!(session.current_state(), Some("PRODUCTS_ADDED"));
    assert_eq!(
        session.text(),
        format!("{}{}{}", CREATE, FRAGMENT_SEPARATOR, ADD_PRODUCTS)
    );
}

#[tokio::test]
async fn test_submit_rejects_bad_text_without_touching_session() {
    let manager = SessionManager::new();
    let domain = onboarding::domain().unwrap();
    manager.get_or_create("case-2", "onboarding").await;

    let err = manager
        .submit("case-2", "(case.create (cbu.id \"CBU-1\")", &domain)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Parse(_)));

    let err = manager
        .submit("case-2", "(kyc.begin (entity \"E-1\"))", &domain)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Vocabulary(_)));

    let err = manager.submit("missing", CREATE, &domain).await.unwrap_err();
    assert!(matches!(err, SessionError::NotFound { .. }));

    let session = manager.snapshot("case-2").await.unwrap();
    assert_eq!(session.version(), 0);
    assert_eq!(session.current_state(), None);
}

#[tokio::test]
async fn test_submit_requires_session_domain() {
    let manager = SessionManager::new();
    let onboarding = onboarding::domain().unwrap();
    manager.get_or_create("case-3", "kyc").await;

    let err = manager.submit("case-3", CREATE, &onboarding).await.unwrap_err();
    assert!(matches!(err, SessionError::DomainNotActive { ref domain, .. } if domain == "onboarding"));

    manager.switch_domain("case-3", "onboarding").await.unwrap();
    let ok = manager.submit("case-3", CREATE, &onboarding).await.unwrap();
    assert_eq!(ok.state.as_deref(), Some("CREATE"));
}
