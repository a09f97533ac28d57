use chrono::{TimeZone, Utc};
use std::sync::Arc;

use super::mocks::{
    author, id, memory, post, FakeReader, FakeWriter, InMemoryStore, ScriptedGenerator, BOT_ID,
};
use crate::character::CharacterConfig;
use crate::config::Config;
use crate::core::proactive::ProactivePipeline;
use crate::models::{PostId, ProactiveReplyRecord};
use crate::providers::SearchPage;

struct Harness {
    reader: Arc<FakeReader>,
    writer: Arc<FakeWriter>,
    generator: Arc<ScriptedGenerator>,
    store: Arc<InMemoryStore>,
    pipeline: ProactivePipeline,
}

fn harness(
    config: Config,
    reader: FakeReader,
    writer: FakeWriter,
    generator: ScriptedGenerator,
) -> Harness {
    let reader = Arc::new(reader);
    let writer = Arc::new(writer);
    let generator = Arc::new(generator);
    let (store, memory) = memory();
    let pipeline = ProactivePipeline::new(
        Arc::new(config),
        BOT_ID,
        reader.clone(),
        writer.clone(),
        generator.clone(),
        memory,
        Arc::new(CharacterConfig::default()),
    );
    Harness {
        reader,
        writer,
        generator,
        store,
        pipeline,
    }
}

fn config() -> Config {
    Config {
        min_followers: 100,
        max_replies_per_run: 3,
        search_pool_size: 100,
        ..Config::default()
    }
}

/// Five eligible questions with descending likes.
fn question_page() -> SearchPage {
    SearchPage {
        posts: vec![
            post("101", "a1", "which http crate should I use?", 30, 2),
            post("102", "a2", "is tokio overkill for a cli?", 12, 1),
            post("103", "a3", "how do I read a file line by line?", 8, 0),
            post("104", "a4", "serde or manual parsing?", 4, 0),
            post("105", "a5", "where do I start with wasm?", 1, 0),
        ],
        authors: (1..=5).map(|n| author(&format!("a{n}"), 1_000)).collect(),
        next_token: None,
    }
}

fn record_exists(store: &InMemoryStore, raw: &str) -> bool {
    store.doc("proactiveReplies", raw).is_some()
}

#[tokio::test]
async fn replies_to_the_best_candidates_and_records_them() {
    let h = harness(
        config(),
        FakeReader::with_pages(vec![question_page()]),
        FakeWriter::default(),
        ScriptedGenerator::always("happy to help, the docs have a great intro chapter"),
    );
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

    let report = h.pipeline.run_at(now).await.unwrap();

    assert_eq!(report.pool_size, 5);
    assert_eq!(report.selected, 3);
    assert_eq!(report.thresholds_used, vec![20, 10, 5]);
    assert_eq!(report.replied, vec![id("101"), id("102"), id("103")]);
    assert_eq!(h.writer.replied_to(), report.replied);
    for raw in ["101", "102", "103"] {
        assert!(record_exists(&h.store, raw));
    }
    assert!(!record_exists(&h.store, "104"));

    let doc = h.store.doc("proactiveReplies", "101").unwrap();
    assert_eq!(doc["authorId"], "a1");
    assert_eq!(doc["repliedAt"], "2024-06-01T12:00:00Z");
    // the search asked for the configured pool in one page
    assert_eq!(h.reader.page_sizes(), vec![100]);
}

#[tokio::test]
async fn failed_generation_skips_without_posting_and_retries_next_run() {
    let h = harness(
        config(),
        FakeReader::with_pages(vec![question_page(), question_page()]),
        FakeWriter::default(),
        ScriptedGenerator::scripted(vec![None]),
    );

    let first = h.pipeline.run().await.unwrap();
    assert_eq!(first.generation_failed, 1);
    assert_eq!(first.replied, vec![id("102"), id("103")]);
    assert!(!h.writer.replied_to().contains(&id("101")));
    assert!(!record_exists(&h.store, "101"));

    // Next run: 101 is still eligible, the others are already recorded
    let second = h.pipeline.run().await.unwrap();
    assert_eq!(second.replied, vec![id("101")]);
    assert_eq!(second.already_recorded, 2);
    assert!(record_exists(&h.store, "101"));
}

#[tokio::test]
async fn failed_post_leaves_no_record() {
    let h = harness(
        config(),
        FakeReader::with_pages(vec![question_page()]),
        FakeWriter::failing_for(&["102"]),
        ScriptedGenerator::always("happy to help, the docs have a great intro chapter"),
    );

    let report = h.pipeline.run().await.unwrap();

    assert_eq!(report.post_failed, 1);
    assert_eq!(report.replied, vec![id("101"), id("103")]);
    assert!(!record_exists(&h.store, "102"));
    assert_eq!(h.store.count("proactiveReplies"), 2);
}

#[tokio::test]
async fn rate_limiting_does_not_stop_the_run_or_create_records() {
    let h = harness(
        config(),
        FakeReader::with_pages(vec![question_page()]),
        FakeWriter {
            rate_limited: true,
            ..FakeWriter::default()
        },
        ScriptedGenerator::always("happy to help, the docs have a great intro chapter"),
    );

    let report = h.pipeline.run().await.unwrap();

    assert_eq!(report.post_failed, 3);
    assert_eq!(h.generator.calls(), 3);
    assert_eq!(h.store.count("proactiveReplies"), 0);
}

#[tokio::test]
async fn previously_recorded_posts_are_not_targeted_again() {
    let h = harness(
        config(),
        FakeReader::with_pages(vec![question_page()]),
        FakeWriter::default(),
        ScriptedGenerator::always("happy to help, the docs have a great intro chapter"),
    );
    crate::memory::MemoryStore::new(h.store.clone())
        .record_proactive_reply(&ProactiveReplyRecord {
            post_id: id("101"),
            author_id: "a1".to_string(),
            replied_at: Utc::now(),
        })
        .await
        .unwrap();

    let report = h.pipeline.run().await.unwrap();

    assert_eq!(report.already_recorded, 1);
    assert_eq!(report.replied, vec![id("102"), id("103")]);
    assert_eq!(h.generator.calls(), 2);
}

#[tokio::test]
async fn dedup_read_failure_skips_the_candidate() {
    let h = harness(
        config(),
        FakeReader::with_pages(vec![question_page()]),
        FakeWriter::default(),
        ScriptedGenerator::always("happy to help, the docs have a great intro chapter"),
    );
    h.store.fail_reads.lock().unwrap().insert("102".to_string());

    let report = h.pipeline.run().await.unwrap();

    assert_eq!(report.dedup_check_failed, 1);
    assert!(!h.writer.replied_to().contains(&id("102")));
    assert_eq!(report.replied.len(), 2);
}

#[tokio::test]
async fn empty_pool_is_a_quiet_no_op() {
    let h = harness(
        config(),
        FakeReader::with_pages(vec![]),
        FakeWriter::default(),
        ScriptedGenerator::always("unused"),
    );

    let report = h.pipeline.run().await.unwrap();

    assert_eq!(report.pool_size, 0);
    assert_eq!(report.selected, 0);
    assert_eq!(h.generator.calls(), 0);
    assert!(h.writer.replied_to().is_empty());
}

#[tokio::test]
async fn no_qualifying_candidates_takes_no_action() {
    let page = SearchPage {
        posts: vec![
            post("201", "a1", "statement without a question", 99, 9),
            post("202", BOT_ID, "my own question?", 99, 9),
            post("203", "tiny", "small account question?", 99, 9),
        ],
        authors: vec![author("a1", 1_000), author("tiny", 3)],
        next_token: None,
    };
    let h = harness(
        config(),
        FakeReader::with_pages(vec![page]),
        FakeWriter::default(),
        ScriptedGenerator::always("unused"),
    );

    let report = h.pipeline.run().await.unwrap();

    assert_eq!(report.pool_size, 3);
    assert_eq!(report.selected, 0);
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn search_failure_fails_the_run() {
    let h = harness(
        config(),
        FakeReader {
            fail_search_call: Some(0),
            ..FakeReader::default()
        },
        FakeWriter::default(),
        ScriptedGenerator::always("unused"),
    );

    assert!(h.pipeline.run().await.is_err());
    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn tweet_mode_off_posts_and_records_nothing() {
    let h = harness(
        Config {
            tweet_mode: false,
            ..config()
        },
        FakeReader::with_pages(vec![question_page()]),
        FakeWriter::default(),
        ScriptedGenerator::always("happy to help, the docs have a great intro chapter"),
    );

    let report = h.pipeline.run().await.unwrap();

    assert_eq!(report.held_back, 3);
    assert!(h.writer.replied_to().is_empty());
    assert_eq!(h.store.count("proactiveReplies"), 0);
}

#[tokio::test]
async fn record_exists_exactly_for_successful_posts() {
    let h = harness(
        Config {
            max_replies_per_run: 5,
            ..config()
        },
        FakeReader::with_pages(vec![question_page()]),
        FakeWriter::failing_for(&["103"]),
        ScriptedGenerator::scripted(vec![Some("sure, try reqwest"), None]),
    );

    h.pipeline.run().await.unwrap();

    let posted: Vec<PostId> = h.writer.replied_to();
    for raw in ["101", "102", "103", "104", "105"] {
        assert_eq!(
            record_exists(&h.store, raw),
            posted.contains(&id(raw)),
            "record/post mismatch for {raw}"
        );
    }
    assert_eq!(posted, vec![id("101"), id("104"), id("105")]);
}
