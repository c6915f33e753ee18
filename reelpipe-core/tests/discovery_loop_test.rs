use async_trait::async_trait;
use tempfile::TempDir;

use reelpipe_core::browser::{
    BrowserError, BrowserResult, DiscoveryConfig, DiscoveryLoop, FeedSession, StopReason,
};
use reelpipe_core::{PostId, QueueFile};

const PATTERN: &str = r"^https://www\.instagram\.com/reels/[A-Za-z0-9_-]+$";

fn config(max_misses: usize, max_scrolls: usize) -> DiscoveryConfig {
    DiscoveryConfig {
        feed_url: "https://www.instagram.com/reels/".into(),
        post_pattern: PATTERN.into(),
        max_consecutive_misses: max_misses,
        max_total_scrolls: max_scrolls,
        initial_wait_ms: (0, 0),
        watch_time_ms: (0, 0),
    }
}

fn reel(code: &str) -> String {
    format!("https://www.instagram.com/reels/{code}/")
}

/// Scripted feed. `stuck` keeps the view on the first location forever.
struct ScriptedFeed {
    locations: Vec<String>,
    index: usize,
    stuck: bool,
    opened: Vec<String>,
    reads: usize,
    fail_after_reads: Option<usize>,
}

impl ScriptedFeed {
    fn new(locations: Vec<String>) -> Self {
        Self {
            locations,
            index: 0,
            stuck: false,
            opened: Vec::new(),
            reads: 0,
            fail_after_reads: None,
        }
    }
}

#[async_trait(?Send)]
impl FeedSession for ScriptedFeed {
    async fn open(&mut self, url: &str) -> BrowserResult<()> {
        self.opened.push(url.to_string());
        Ok(())
    }

    async fn current_location(&mut self) -> BrowserResult<String> {
        if Some(self.reads) == self.fail_after_reads {
            return Err(BrowserError::Unexpected("tab crashed".into()));
        }
        self.reads += 1;
        let index = self.index.min(self.locations.len() - 1);
        Ok(self.locations[index].clone())
    }

    async fn advance(&mut self) -> BrowserResult<()> {
        if !self.stuck {
            self.index += 1;
        }
        Ok(())
    }
}

/// Every read yields a fresh post.
struct EndlessFeed {
    counter: usize,
}

#[async_trait(?Send)]
impl FeedSession for EndlessFeed {
    async fn open(&mut self, _url: &str) -> BrowserResult<()> {
        Ok(())
    }

    async fn current_location(&mut self) -> BrowserResult<String> {
        Ok(reel(&format!("R{}", self.counter)))
    }

    async fn advance(&mut self) -> BrowserResult<()> {
        self.counter += 1;
        Ok(())
    }
}

#[tokio::test]
async fn collects_until_target_and_counts_duplicates() {
    let mut feed = ScriptedFeed::new(
        ["A", "B", "A", "C", "D", "E", "F"]
            .iter()
            .map(|code| reel(code))
            .collect(),
    );
    let mut discovery = DiscoveryLoop::new(config(10, 200)).unwrap();
    let report = discovery.run(&mut feed, 5).await.unwrap();

    let collected: Vec<&str> = report.collected.iter().map(PostId::shortcode).collect();
    assert_eq!(collected, vec!["A", "B", "C", "D", "E"]);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.misses, 0);
    assert_eq!(report.scrolls, 6);
    assert_eq!(report.stop_reason, StopReason::TargetReached);
    assert_eq!(feed.opened, vec!["https://www.instagram.com/reels/".to_string()]);
}

#[tokio::test]
async fn identifiers_are_normalized_before_dedup() {
    let mut feed = ScriptedFeed::new(vec![
        "https://www.instagram.com/reels/A/?utm_source=feed".into(),
        "https://www.instagram.com/reels/A/#".into(),
        "https://www.instagram.com/reels/B".into(),
    ]);
    let mut discovery = DiscoveryLoop::new(config(10, 200)).unwrap();
    let report = discovery.run(&mut feed, 2).await.unwrap();

    let collected: Vec<&str> = report.collected.iter().map(PostId::as_str).collect();
    assert_eq!(
        collected,
        vec![
            "https://www.instagram.com/reels/A",
            "https://www.instagram.com/reels/B"
        ]
    );
    assert_eq!(report.duplicates, 1);
}

#[tokio::test]
async fn feed_that_never_advances_stalls() {
    let mut feed = ScriptedFeed::new(vec![reel("A")]);
    feed.stuck = true;
    let mut discovery = DiscoveryLoop::new(config(10, 200)).unwrap();
    let report = discovery.run(&mut feed, 5).await.unwrap();

    assert_eq!(report.collected.len(), 1);
    assert_eq!(report.duplicates, 10);
    assert_eq!(report.scrolls, 11);
    assert_eq!(report.stop_reason, StopReason::Stalled);
}

#[tokio::test]
async fn non_post_locations_count_as_misses() {
    let mut feed = ScriptedFeed::new(vec![
        "https://www.instagram.com/".into(),
        "https://www.instagram.com/accounts/login/".into(),
        reel("A"),
        "https://www.instagram.com/explore/".into(),
    ]);
    let mut discovery = DiscoveryLoop::new(config(3, 200)).unwrap();
    let report = discovery.run(&mut feed, 5).await.unwrap();

    assert_eq!(report.collected.len(), 1);
    assert_eq!(report.misses, 5);
    assert_eq!(report.stop_reason, StopReason::Stalled);
    assert_eq!(report.scrolls, 6);
}

#[tokio::test]
async fn endless_feed_stops_at_scroll_ceiling() {
    let mut feed = EndlessFeed { counter: 0 };
    let mut discovery = DiscoveryLoop::new(config(10, 7)).unwrap();
    let report = discovery.run(&mut feed, 100).await.unwrap();

    assert_eq!(report.scrolls, 7);
    assert_eq!(report.collected.len(), 7);
    assert_eq!(report.stop_reason, StopReason::ScrollCeiling);
}

#[tokio::test]
async fn session_fault_aborts_run() {
    let mut feed = ScriptedFeed::new(vec![reel("A"), reel("B"), reel("C")]);
    feed.fail_after_reads = Some(2);
    let mut discovery = DiscoveryLoop::new(config(10, 200)).unwrap();
    let result = discovery.run(&mut feed, 5).await;

    assert!(matches!(result, Err(BrowserError::Unexpected(_))));
}

#[test]
fn invalid_pattern_is_rejected() {
    let mut bad = config(10, 200);
    bad.post_pattern = "(".into();
    assert!(matches!(
        DiscoveryLoop::new(bad),
        Err(BrowserError::Configuration(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn pacing_waits_are_accumulated() {
    let mut cfg = config(10, 200);
    cfg.initial_wait_ms = (100, 100);
    cfg.watch_time_ms = (50, 50);
    let mut feed = ScriptedFeed::new(vec![reel("A"), reel("B")]);
    let mut discovery = DiscoveryLoop::new(cfg).unwrap();

    let start = tokio::time::Instant::now();
    let report = discovery.run(&mut feed, 2).await.unwrap();

    assert_eq!(report.total_wait_ms, 200);
    assert!(start.elapsed() >= std::time::Duration::from_millis(200));
}

#[tokio::test]
async fn persist_appends_new_identifiers_only() {
    let dir = TempDir::new().unwrap();
    let queue = QueueFile::new(dir.path().join("data").join("queue.txt"));
    queue.append([reel("A").trim_end_matches('/')]).await.unwrap();

    let mut feed = ScriptedFeed::new(vec![reel("A"), reel("B")]);
    let mut discovery = DiscoveryLoop::new(config(10, 200)).unwrap();
    let report = discovery.run(&mut feed, 2).await.unwrap();
    let written = report.persist(&queue).await.unwrap();

    assert_eq!(written, 1);
    assert_eq!(
        queue.read().await.unwrap(),
        vec![
            "https://www.instagram.com/reels/A".to_string(),
            "https://www.instagram.com/reels/B".to_string()
        ]
    );
}

#[tokio::test]
async fn empty_run_leaves_queue_untouched() {
    let dir = TempDir::new().unwrap();
    let queue = QueueFile::new(dir.path().join("queue.txt"));

    let mut feed = ScriptedFeed::new(vec!["https://www.instagram.com/".into()]);
    feed.stuck = true;
    let mut discovery = DiscoveryLoop::new(config(2, 200)).unwrap();
    let report = discovery.run(&mut feed, 3).await.unwrap();

    assert!(report.collected.is_empty());
    assert_eq!(report.persist(&queue).await.unwrap(), 0);
    assert!(!queue.path().exists());
}
