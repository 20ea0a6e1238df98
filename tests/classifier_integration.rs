use mailsort::classifier::{HybridClassifier, Prediction};
use mailsort::model::UserModel;
use mailsort::spam::{LinearSpamModel, NeverSpam, SpamDetector};
use mailsort::store::{DirStore, MemoryStore, ModelStore, SqliteStore};
use std::sync::Arc;
use tempfile::TempDir;

const BUDGET: &str = "Quarterly budget review meeting with the finance team";
const DINNER: &str = "Dinner reservation confirmed for Saturday evening";
const JOB: &str = "Senior Rust developer position open, apply today with your resume";
const JOB_RELATED: &str = "Backend developer position: send your resume to apply";
const FLIGHT: &str = "Your flight to Lisbon departs from gate twelve";

const SPAM_MODEL: &str = r#"{
    "classes": ["ham", "spam"],
    "vocabulary": {"winner": 0, "prize": 1, "free": 2, "claim": 3},
    "idf": [1.0, 1.0, 1.0, 1.0],
    "weights": [3.0, 3.0, 2.0, 2.0],
    "bias": -1.0
}"#;

fn label(s: &str) -> Prediction {
    Prediction::Label(s.to_string())
}

fn never_spam() -> Arc<dyn SpamDetector> {
    Arc::new(NeverSpam)
}

#[test]
fn new_user_falls_back_to_primary() {
    let svc = HybridClassifier::new(never_spam(), MemoryStore::new());
    assert_eq!(svc.predict(DINNER, "newcomer").as_str(), "primary");
}

#[test]
fn spam_verdict_wins_over_user_model() {
    let spam = LinearSpamModel::from_slice(SPAM_MODEL.as_bytes()).unwrap();
    let svc = HybridClassifier::new(Arc::new(spam), MemoryStore::new());

    let text = "Claim your FREE prize, winner!";
    for _ in 0..5 {
        svc.learn(text, "promotions", "u1");
    }
    assert_eq!(svc.get_known_categories("u1"), vec!["promotions"]);
    assert_eq!(svc.predict(text, "u1"), Prediction::Spam);
    assert_eq!(svc.predict(text, "untrained"), Prediction::Spam);
    assert_eq!(svc.predict(BUDGET, "untrained"), Prediction::Fallback("primary".into()));
}

#[test]
fn new_label_does_not_forget_old_ones() {
    let svc = HybridClassifier::new(never_spam(), MemoryStore::new());
    assert!(svc.learn(BUDGET, "work", "u1").success);
    assert!(svc.learn(FLIGHT, "travel", "u1").success);

    assert_eq!(svc.get_known_categories("u1"), vec!["travel", "work"]);
    assert_eq!(svc.predict("Finance team budget meeting moved to Thursday", "u1"), label("work"));
    assert_eq!(svc.predict("Boarding pass for your flight to Lisbon", "u1"), label("travel"));
}

#[test]
fn repeated_corrections_converge_and_generalize() {
    let svc = HybridClassifier::new(never_spam(), MemoryStore::new());
    for _ in 0..3 {
        svc.learn(BUDGET, "work", "u1");
    }
    svc.learn(DINNER, "personal", "u1");
    svc.learn(JOB, "work", "u1");

    assert_eq!(svc.predict(JOB, "u1"), label("work"));
    assert_eq!(svc.predict(JOB_RELATED, "u1"), label("work"));

    let mut converged_after = None;
    for i in 1..=10 {
        svc.learn(JOB, "jobpostings", "u1");
        if converged_after.is_none() && svc.predict(JOB, "u1") == label("jobpostings") {
            converged_after = Some(i);
        }
    }
    assert!(converged_after.is_some(), "never converged to jobpostings");

    assert_eq!(svc.predict(JOB, "u1"), label("jobpostings"));
    assert_eq!(svc.predict(JOB_RELATED, "u1"), label("jobpostings"));
    // Unrelated mail keeps its class.
    assert_eq!(svc.predict(BUDGET, "u1"), label("work"));
    assert_eq!(svc.predict(DINNER, "u1"), label("personal"));
}

#[test]
fn spam_correction_leaves_categories_alone() {
    let svc = HybridClassifier::new(never_spam(), MemoryStore::new());
    svc.learn(BUDGET, "work", "u1");
    let before = svc.get_known_categories("u1");
    let outcome = svc.learn(DINNER, "spam", "u1");
    assert!(outcome.success);
    assert_eq!(svc.get_known_categories("u1"), before);
}

#[test]
fn restart_reloads_saved_model() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("models.db");

    {
        let svc = HybridClassifier::new(never_spam(), SqliteStore::open(&db_path).unwrap());
        svc.learn(BUDGET, "work", "42");
        svc.learn(FLIGHT, "travel", "42");
    }

    let svc = HybridClassifier::new(never_spam(), SqliteStore::open(&db_path).unwrap());
    assert_eq!(svc.get_known_categories("42"), vec!["travel", "work"]);
    assert_eq!(svc.predict(BUDGET, "42"), label("work"));
    assert_eq!(svc.predict(FLIGHT, "42"), label("travel"));
}

#[test]
fn encrypted_store_reloads_only_with_key() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("models.db");
    let key = "5f".repeat(32);

    {
        let store = SqliteStore::open_with_key(&db_path, Some(key.as_str())).unwrap();
        let svc = HybridClassifier::new(never_spam(), store);
        svc.learn(BUDGET, "work", "42");
    }

    let store = SqliteStore::open_with_key(&db_path, Some(key.as_str())).unwrap();
    let svc = HybridClassifier::new(never_spam(), store);
    assert_eq!(svc.get_known_categories("42"), vec!["work"]);
    assert_eq!(svc.predict(BUDGET, "42"), label("work"));

    assert!(SqliteStore::open(&db_path).is_err());
    assert!(SqliteStore::open_with_key(&db_path, Some("00".repeat(32).as_str())).is_err());
}

#[test]
fn dir_store_restart_reloads_saved_model() {
    let dir = TempDir::new().unwrap();
    {
        let svc = HybridClassifier::new(never_spam(), DirStore::new(dir.path()));
        svc.learn(DINNER, "personal", "7");
    }
    assert!(dir.path().join("user_7").join("model.json").exists());

    let svc = HybridClassifier::new(never_spam(), DirStore::new(dir.path()));
    assert_eq!(svc.get_known_categories("7"), vec!["personal"]);
    assert_eq!(svc.predict(DINNER, "7"), label("personal"));
}

#[test]
fn concurrent_corrections_are_not_lost() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("models.db");
    let svc = Arc::new(HybridClassifier::new(
        never_spam(),
        SqliteStore::open(&db_path).unwrap(),
    ));

    let threads: Vec<_> = (0..8)
        .map(|i| {
            let svc = Arc::clone(&svc);
            std::thread::spawn(move || {
                let label = if i % 2 == 0 { "even" } else { "odd" };
                for _ in 0..10 {
                    assert!(svc.learn(BUDGET, label, "shared").success);
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    drop(svc);

    let model: UserModel = SqliteStore::open(&db_path).unwrap().load("shared").unwrap().unwrap();
    assert_eq!(model.labels(), ["even", "odd"]);
    assert_eq!(model.classifier().class_count("even"), Some(40.0));
    assert_eq!(model.classifier().class_count("odd"), Some(40.0));
}

#[test]
fn raw_email_source_is_classified_by_body() {
    let svc = HybridClassifier::new(never_spam(), MemoryStore::new());
    let raw = "From: recruiter@agency.example\n\
               Subject: Opportunity\n\
               \n\
               Senior Rust developer position open, apply today with your resume";
    svc.learn(raw, "jobpostings", "u1");
    svc.learn(DINNER, "personal", "u1");
    assert_eq!(svc.predict(JOB_RELATED, "u1"), label("jobpostings"));
}
