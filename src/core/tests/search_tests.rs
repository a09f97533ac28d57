use std::sync::Arc;

use super::mocks::{author, post, FakeReader};
use crate::core::search::{build_topic_query, page_size_for, SearchPager};
use crate::providers::SearchPage;

fn page(start: usize, count: usize, next_token: Option<&str>) -> SearchPage {
    SearchPage {
        posts: (start..start + count)
            .map(|n| post(&n.to_string(), &format!("a{n}"), "why?", 1, 0))
            .collect(),
        authors: (start..start + count)
            .map(|n| author(&format!("a{n}"), n as u64))
            .collect(),
        next_token: next_token.map(str::to_string),
    }
}

#[test]
fn page_size_stays_within_api_bounds() {
    assert_eq!(page_size_for(3), 10);
    assert_eq!(page_size_for(10), 10);
    assert_eq!(page_size_for(55), 55);
    assert_eq!(page_size_for(250), 100);
}

#[test]
fn topic_query_excludes_retweets_and_replies() {
    let topics = vec!["rustlang".to_string(), "learning to code".to_string()];
    assert_eq!(
        build_topic_query(&topics, "en"),
        "(rustlang OR \"learning to code\") -is:retweet -is:reply lang:en"
    );
}

#[tokio::test]
async fn pages_until_desired_count_is_met() {
    let reader = Arc::new(FakeReader::with_pages(vec![
        page(1, 100, Some("t1")),
        page(101, 100, Some("t2")),
        page(201, 50, Some("t3")),
    ]));
    let pager = SearchPager::new(reader.clone());

    let pool = pager.collect("q", 250).await.unwrap();

    assert_eq!(pool.posts.len(), 250);
    assert_eq!(pool.pages, 3);
    assert_eq!(reader.page_sizes(), vec![100, 100, 50]);
    let tokens: Vec<Option<String>> = reader
        .search_calls
        .lock()
        .unwrap()
        .iter()
        .map(|(_, t)| t.clone())
        .collect();
    assert_eq!(
        tokens,
        vec![None, Some("t1".to_string()), Some("t2".to_string())]
    );
    // insertion order is preserved
    assert_eq!(pool.posts[0].id.as_str(), "1");
    assert_eq!(pool.posts[249].id.as_str(), "250");
    assert_eq!(pool.authors.followers_of("a150"), 150);
}

#[tokio::test]
async fn skips_an_undersized_trailing_page() {
    let reader = Arc::new(FakeReader::with_pages(vec![
        page(1, 95, Some("t1")),
        page(96, 5, None),
    ]));
    let pool = SearchPager::new(reader.clone()).collect("q", 100).await.unwrap();

    assert_eq!(pool.posts.len(), 95);
    assert_eq!(reader.page_sizes(), vec![100]);
}

#[tokio::test]
async fn small_requests_still_ask_for_the_minimum_page() {
    let reader = Arc::new(FakeReader::with_pages(vec![page(1, 10, Some("t1"))]));
    let pool = SearchPager::new(reader.clone()).collect("q", 5).await.unwrap();

    assert_eq!(reader.page_sizes(), vec![10]);
    assert_eq!(pool.posts.len(), 10);
}

#[tokio::test]
async fn stops_when_no_continuation_token() {
    let reader = Arc::new(FakeReader::with_pages(vec![
        page(1, 40, None),
        page(41, 40, None),
    ]));
    let pool = SearchPager::new(reader.clone()).collect("q", 100).await.unwrap();

    assert_eq!(pool.posts.len(), 40);
    assert_eq!(reader.page_sizes(), vec![100]);
}

#[tokio::test]
async fn empty_page_with_token_ends_pagination() {
    let reader = Arc::new(FakeReader::with_pages(vec![page(1, 0, Some("t1"))]));
    let pool = SearchPager::new(reader.clone()).collect("q", 100).await.unwrap();

    assert!(pool.posts.is_empty());
    assert_eq!(reader.page_sizes().len(), 1);
}

#[tokio::test]
async fn a_failed_page_fails_the_collection() {
    let reader = Arc::new(FakeReader {
        fail_search_call: Some(1),
        ..FakeReader::with_pages(vec![page(1, 100, Some("t1")), page(101, 100, None)])
    });
    let result = SearchPager::new(reader.clone()).collect("q", 200).await;

    assert!(result.is_err());
    assert_eq!(reader.page_sizes(), vec![100, 100]);
}
