#[path = "../../piramide-client/tests/common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{FakeBackend, FakeOptions};
use piramide_client::{ClientConfig, ClientError, Endpoint, FeedClient, Resolver, ResolverConfig};
use piramide_store::LocalStore;
use piramide_sync::{FeedEngine, FeedState, RepliesOutcome, ReportOutcome, SyncConfig, VoteMode};
use piramide_types::models::{PostId, VoteState};

fn engine_for(backend: &FakeBackend) -> FeedEngine {
    engine_with_store(backend, Arc::new(LocalStore::open_in_memory().unwrap()))
}

fn engine_with_store(backend: &FakeBackend, store: Arc<LocalStore>) -> FeedEngine {
    let endpoint = Endpoint::new(&backend.base_url(), "/api").unwrap();
    let client = FeedClient::new(endpoint, &ClientConfig::default()).unwrap();
    FeedEngine::new(client, store, None, &SyncConfig::default()).unwrap()
}

#[tokio::test]
async fn refresh_renders_newest_first_with_trending() {
    let backend = FakeBackend::start().await;
    backend.seed_post("primeira #Topo #pirâmide", "topo");
    backend.seed_post("segunda #topo", "base");

    let engine = engine_for(&backend);
    assert_eq!(engine.state().await, FeedState::Idle);

    assert_eq!(engine.refresh().await.unwrap(), 2);
    assert_eq!(engine.generation(), 1);

    let items = engine.render_list().await;
    let texts: Vec<&str> = items.iter().map(|i| i.post.text.as_str()).collect();
    assert_eq!(texts, vec!["segunda #topo", "primeira #Topo #pirâmide"]);
    assert!(items.iter().all(|i| i.my_vote == VoteState::None && !i.reported));

    assert_eq!(
        engine.trending().await,
        vec![("topo".to_string(), 2), ("pirâmide".to_string(), 1)]
    );
}

#[tokio::test]
async fn read_failure_degrades_to_failed_state() {
    let backend = FakeBackend::start().await;
    backend.seed_post("x", "base");
    let engine = engine_for(&backend);
    engine.refresh().await.unwrap();

    backend.set_offline(true);
    let err = engine.refresh().await.unwrap_err();
    assert!(matches!(err.client_error(), Some(ClientError::Network(_))));
    assert!(matches!(engine.state().await, FeedState::Failed(_)));
    assert!(engine.render_list().await.is_empty());

    backend.set_offline(false);
    assert_eq!(engine.refresh().await.unwrap(), 1);
}

#[tokio::test]
async fn confirmed_vote_holds_until_newer_fetch() {
    let backend = FakeBackend::start().await;
    let id = PostId::new(backend.seed_post("vote", "meio"));
    let engine = engine_for(&backend);
    engine.refresh().await.unwrap();

    let outcome = engine.vote(&id, VoteState::Up).await.unwrap();
    assert_eq!(outcome.vote, VoteState::Up);
    assert_eq!(outcome.upvotes, 1);

    // someone else votes; the feed we hold still says 0
    backend.set_upvotes(id.as_str(), 5);
    let item = &engine.render_list().await[0];
    assert_eq!(item.post.upvotes, 1);
    assert_eq!(item.my_vote, VoteState::Up);
    assert!(!item.vote_pending);

    engine.refresh().await.unwrap();
    assert_eq!(engine.render_list().await[0].post.upvotes, 5);

    // voting up again retracts
    let outcome = engine.vote(&id, VoteState::Up).await.unwrap();
    assert_eq!(outcome.vote, VoteState::None);
    assert_eq!(outcome.upvotes, 4);

    let deltas: Vec<i64> = backend.votes().iter().map(|(_, b)| b["delta"].as_i64().unwrap()).collect();
    assert_eq!(deltas, vec![1, -1]);
    assert_eq!(backend.votes()[0].1["fingerprint"], json!(engine.fingerprint()));
}

#[tokio::test]
async fn failed_vote_rolls_back() {
    let backend = FakeBackend::start().await;
    let id = PostId::new(backend.seed_post("vote", "meio"));
    let engine = engine_for(&backend);
    engine.refresh().await.unwrap();

    backend.set_offline(true);
    assert!(engine.vote(&id, VoteState::Down).await.is_err());

    let item = &engine.render_list().await[0];
    assert_eq!(item.post.upvotes, 0);
    assert_eq!(item.my_vote, VoteState::None);
}

#[tokio::test]
async fn missing_vote_endpoint_switches_to_local_counting() {
    let backend = FakeBackend::start_with(FakeOptions {
        votes_supported: false,
        ..Default::default()
    })
    .await;
    let id = PostId::new(backend.seed_post("curtir", "base"));
    backend.set_upvotes(id.as_str(), 3);
    let engine = engine_for(&backend);
    engine.refresh().await.unwrap();

    let outcome = engine.vote(&id, VoteState::Up).await.unwrap();
    assert_eq!(outcome.upvotes, 4);
    assert_eq!(engine.vote_mode().await, VoteMode::LocalOnly);

    engine.refresh().await.unwrap();
    let item = &engine.render_list().await[0];
    assert_eq!(item.post.upvotes, 4);
    assert_eq!(item.my_vote, VoteState::Up);

    let hits = backend.hits();
    let outcome = engine.vote(&id, VoteState::Down).await.unwrap();
    assert_eq!(outcome.upvotes, 2);
    assert_eq!(backend.hits(), hits);
}

#[tokio::test]
async fn local_counting_survives_restart() {
    let backend = FakeBackend::start_with(FakeOptions {
        votes_supported: false,
        ..Default::default()
    })
    .await;
    let id = PostId::new(backend.seed_post("curtir", "base"));
    backend.set_upvotes(id.as_str(), 3);
    let store = Arc::new(LocalStore::open_in_memory().unwrap());

    let engine = engine_with_store(&backend, store.clone());
    engine.refresh().await.unwrap();
    engine.vote(&id, VoteState::Up).await.unwrap();
    drop(engine);

    let restarted = engine_with_store(&backend, store);
    assert_eq!(restarted.vote_mode().await, VoteMode::LocalOnly);
    restarted.refresh().await.unwrap();
    let item = &restarted.render_list().await[0];
    assert_eq!(item.my_vote, VoteState::Up);
    assert_eq!(item.post.upvotes, 4);
}

#[tokio::test]
async fn concurrent_votes_are_applied_in_turn() {
    let backend = FakeBackend::start().await;
    let id = PostId::new(backend.seed_post("vote", "meio"));
    let engine = engine_for(&backend);
    engine.refresh().await.unwrap();

    let (a, b) = tokio::join!(engine.vote(&id, VoteState::Up), engine.vote(&id, VoteState::Up));
    let mut votes = vec![a.unwrap().vote, b.unwrap().vote];
    votes.sort_by_key(|v| v.delta());
    assert_eq!(votes, vec![VoteState::None, VoteState::Up]);

    let mut deltas: Vec<i64> = backend.votes().iter().map(|(_, b)| b["delta"].as_i64().unwrap()).collect();
    deltas.sort();
    assert_eq!(deltas, vec![-1, 1]);
    assert_eq!(engine.store().vote_state(&id).unwrap(), VoteState::None);

    engine.refresh().await.unwrap();
    assert_eq!(engine.render_list().await[0].post.upvotes, 0);
}

#[tokio::test]
async fn vote_on_unknown_post_is_refused() {
    let backend = FakeBackend::start().await;
    let engine = engine_for(&backend);
    engine.refresh().await.unwrap();

    assert!(engine.vote(&PostId::from("99"), VoteState::Up).await.is_err());
    assert!(backend.votes().is_empty());
}

#[tokio::test]
async fn report_is_sent_once_per_device() {
    let backend = FakeBackend::start().await;
    let id = PostId::new(backend.seed_post("spam", "base"));
    let engine = engine_for(&backend);
    engine.refresh().await.unwrap();

    assert_eq!(engine.report(&id, Some("spam")).await.unwrap(), ReportOutcome::Sent);
    assert_eq!(
        engine.report(&id, None).await.unwrap(),
        ReportOutcome::AlreadyReported
    );
    assert_eq!(backend.reports().len(), 1);
    assert!(engine.render_list().await[0].reported);
}

#[tokio::test]
async fn replies_for_a_vanished_post_are_stale() {
    let backend = FakeBackend::start_with(FakeOptions {
        replies_delay: Some(Duration::from_millis(300)),
        ..Default::default()
    })
    .await;
    let gone = PostId::new(backend.seed_post("vai sumir", "base"));
    let kept = PostId::new(backend.seed_post("fica", "base"));
    let engine = engine_for(&backend);
    engine.refresh().await.unwrap();

    let slow_gone = {
        let engine = engine.clone();
        let id = gone.clone();
        tokio::spawn(async move { engine.load_replies(&id).await })
    };
    let slow_kept = {
        let engine = engine.clone();
        let id = kept.clone();
        tokio::spawn(async move { engine.load_replies(&id).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    backend.remove_post(gone.as_str());
    engine.refresh().await.unwrap();

    assert_eq!(slow_gone.await.unwrap().unwrap(), RepliesOutcome::Stale);
    assert_eq!(
        slow_kept.await.unwrap().unwrap(),
        RepliesOutcome::Loaded(Vec::new())
    );
}

#[tokio::test]
async fn rotated_endpoint_is_re_resolved() {
    let old = FakeBackend::start().await;
    let new = FakeBackend::start().await;
    new.seed_post("do outro lado", "meio");

    let resolver = Resolver::new(ResolverConfig {
        descriptor_url: old.descriptor_url(),
        request_timeout: Duration::from_secs(2),
        ..Default::default()
    })
    .unwrap();
    let endpoint = resolver.resolve().await.unwrap();
    let client = FeedClient::new(endpoint, &ClientConfig::default()).unwrap();
    let store = Arc::new(LocalStore::open_in_memory().unwrap());
    let engine = FeedEngine::new(client, store, Some(resolver), &SyncConfig::default()).unwrap();

    assert_eq!(engine.refresh().await.unwrap(), 0);

    old.point_descriptor_at(&new.base_url());
    old.set_offline(true);
    assert!(engine.refresh().await.is_err());

    assert_eq!(engine.refresh().await.unwrap(), 1);
    assert_eq!(engine.endpoint().await.base_url(), new.base_url());
}
