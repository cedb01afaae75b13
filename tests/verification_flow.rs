//! Verification code flow tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FailingCache, RecordingMailer, FROM, SERVICE_NAME};
use mailrelay::cache::Cache;
use mailrelay::config::VerificationConfig;
use mailrelay::{ErrorCategory, MemoryCache, RelayError, VerificationService};

fn service(max_attempts: u32) -> (VerificationService, Arc<RecordingMailer>) {
    let mailer = Arc::new(RecordingMailer::new());
    let config = VerificationConfig {
        code_ttl_secs: 300,
        max_attempts,
    };
    let service = VerificationService::new(
        Arc::new(MemoryCache::new()),
        mailer.clone(),
        SERVICE_NAME,
        FROM,
        &config,
    );
    (service, mailer)
}

/// A six-digit code guaranteed to differ from `code`.
fn wrong(code: &str) -> String {
    if code == "000000" {
        "111111".to_string()
    } else {
        "000000".to_string()
    }
}

#[tokio::test]
async fn test_code_verifies_exactly_once() {
    let (service, _) = service(5);

    let code = service.send_code("me@example.com").await.unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    service.verify_code("me@example.com", &code).await.unwrap();

    let again = service.verify_code("me@example.com", &code).await;
    assert!(matches!(again, Err(RelayError::InvalidCode)));
}

#[tokio::test]
async fn test_lockout_on_attempt_after_max() {
    let max = 5;
    let (service, _) = service(max);
    let code = service.send_code("me@example.com").await.unwrap();
    let bad = wrong(&code);

    for _ in 0..max {
        let result = service.verify_code("me@example.com", &bad).await;
        assert!(matches!(result, Err(RelayError::InvalidCode)));
    }

    let locked = service.verify_code("me@example.com", &code).await;
    let err = locked.unwrap_err();
    assert!(matches!(err, RelayError::TooManyAttempts));
    assert_eq!(err.category(), ErrorCategory::Input);
}

#[tokio::test]
async fn test_correct_code_at_last_allowed_attempt() {
    let max = 5;
    let (service, _) = service(max);
    let code = service.send_code("me@example.com").await.unwrap();
    let bad = wrong(&code);

    for _ in 0..max - 1 {
        let _ = service.verify_code("me@example.com", &bad).await;
    }

    service.verify_code("me@example.com", &code).await.unwrap();
}

#[tokio::test]
async fn test_code_expires() {
    tokio::time::pause();
    let (service, _) = service(5);
    let code = service.send_code("me@example.com").await.unwrap();

    tokio::time::advance(Duration::from_secs(299)).await;
    let still_valid = service.send_code("other@example.com").await.unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;

    let result = service.verify_code("me@example.com", &code).await;
    assert!(matches!(result, Err(RelayError::InvalidCode)));

    service
        .verify_code("other@example.com", &still_valid)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_resend_replaces_code() {
    let (service, _) = service(5);

    let first = service.send_code("me@example.com").await.unwrap();
    let second = service.send_code("me@example.com").await.unwrap();

    if first != second {
        let result = service.verify_code("me@example.com", &first).await;
        assert!(matches!(result, Err(RelayError::InvalidCode)));
    }
    service.verify_code("me@example.com", &second).await.unwrap();
}

#[tokio::test]
async fn test_code_is_mailed_to_identity() {
    let (service, mailer) = service(5);
    let code = service.send_code("me@example.com").await.unwrap();

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].destination, vec!["me@example.com"]);
    assert_eq!(sent[0].from, FROM);
    assert_eq!(sent[0].subject, "[MailRelay] Verification Code");
    assert!(sent[0].body.text().contains(&code));
}

#[tokio::test]
async fn test_identities_are_independent() {
    let (service, _) = service(1);
    let mine = service.send_code("me@example.com").await.unwrap();
    let theirs = service.send_code("you@example.com").await.unwrap();

    let _ = service.verify_code("you@example.com", &wrong(&theirs)).await;
    assert!(matches!(
        service.verify_code("you@example.com", &theirs).await,
        Err(RelayError::TooManyAttempts)
    ));

    service.verify_code("me@example.com", &mine).await.unwrap();
}

#[tokio::test]
async fn test_cache_outage_is_reported() {
    let mailer = Arc::new(RecordingMailer::new());
    let service = VerificationService::new(
        Arc::new(FailingCache),
        mailer.clone(),
        SERVICE_NAME,
        FROM,
        &VerificationConfig::default(),
    );

    let result = service.send_code("me@example.com").await;
    assert!(matches!(result, Err(RelayError::Cache(_))));
    assert_eq!(mailer.sent_count(), 0);

    // Verification must not pass when state cannot be read.
    let result = service.verify_code("me@example.com", "123456").await;
    assert!(matches!(result, Err(RelayError::Cache(_))));
}

#[tokio::test]
async fn test_state_keys_share_namespace() {
    let cache = Arc::new(MemoryCache::new());
    let service = VerificationService::new(
        cache.clone(),
        Arc::new(RecordingMailer::new()),
        SERVICE_NAME,
        FROM,
        &VerificationConfig::default(),
    );
    service.send_code("me@example.com").await.unwrap();

    let keys = cache.keys("verification:*").await.unwrap();
    assert_eq!(
        keys.into_iter().collect::<Vec<_>>(),
        vec![
            "verification:attempt:me@example.com".to_string(),
            "verification:code:me@example.com".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_expired_codes_do_not_accumulate() {
    tokio::time::pause();
    let cache = Arc::new(MemoryCache::new());
    let config = VerificationConfig {
        code_ttl_secs: 1,
        max_attempts: 5,
    };
    let service = VerificationService::new(
        cache.clone(),
        Arc::new(RecordingMailer::new()),
        SERVICE_NAME,
        FROM,
        &config,
    );

    let mut issued = Vec::new();
    for i in 0..100 {
        let identity = format!("user{i}@example.com");
        let code = service.send_code(&identity).await.unwrap();
        issued.push((identity, code));
    }
    assert_eq!(cache.len(), 200);

    tokio::time::advance(Duration::from_secs(10)).await;
    for (identity, code) in &issued {
        let result = service.verify_code(identity, code).await;
        assert!(matches!(result, Err(RelayError::InvalidCode)));
    }
    assert_eq!(cache.len(), 0);
}
