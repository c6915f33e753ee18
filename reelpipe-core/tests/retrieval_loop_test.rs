use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use reelpipe_core::config::SidecarContent;
use reelpipe_core::retrieval::{
    MediaRetriever, RetrievalConfig, RetrievalError, RetrievalLoop, RetrievalResult,
    RetrievedPost, RetryPolicy,
};
use reelpipe_core::{Pacer, QueueFile};

/// Fails each shortcode a scripted number of times before succeeding.
struct FlakyRetriever {
    failures: HashMap<String, u32>,
    captions: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
    workdirs: Mutex<Vec<PathBuf>>,
}

impl FlakyRetriever {
    fn new(failures: &[(&str, u32)]) -> Self {
        Self {
            failures: failures
                .iter()
                .map(|(code, count)| (code.to_string(), *count))
                .collect(),
            captions: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            workdirs: Mutex::new(Vec::new()),
        }
    }

    fn with_caption(mut self, shortcode: &str, caption: &str) -> Self {
        self.captions
            .insert(shortcode.to_string(), caption.to_string());
        self
    }

    fn calls_for(&self, shortcode: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == shortcode)
            .count()
    }
}

#[async_trait]
impl MediaRetriever for FlakyRetriever {
    async fn retrieve(&self, shortcode: &str, workdir: &Path) -> RetrievalResult<RetrievedPost> {
        let previous = self.calls_for(shortcode) as u32;
        self.calls.lock().unwrap().push(shortcode.to_string());
        self.workdirs.lock().unwrap().push(workdir.to_path_buf());

        // Leave something behind so cleanup has work to do.
        std::fs::write(workdir.join("partial.tmp"), b"partial").unwrap();

        let allowed_failures = self.failures.get(shortcode).copied().unwrap_or(0);
        if previous < allowed_failures {
            return Err(RetrievalError::Api {
                status: 429,
                message: "rate limited".into(),
            });
        }
        let media_path = workdir.join(format!("{shortcode}.mp4"));
        std::fs::write(&media_path, b"video bytes").unwrap();
        Ok(RetrievedPost {
            shortcode: shortcode.to_string(),
            caption: self.captions.get(shortcode).cloned(),
            media_path,
        })
    }
}

struct Harness {
    _dir: TempDir,
    queue: QueueFile,
    config: RetrievalConfig,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let queue = QueueFile::new(dir.path().join("data").join("queue.txt"));
        let config = RetrievalConfig {
            media_dir: dir.path().join("videos"),
            staging_dir: dir.path().join("staging"),
            caption_words: 6,
            max_name_length: 50,
            media_extension: "mp4".into(),
            sidecar: SidecarContent::SourceUrl,
            dead_letter_file: None,
        };
        Self {
            _dir: dir,
            queue,
            config,
        }
    }

    fn runner(&self, retriever: Arc<FlakyRetriever>) -> RetrievalLoop {
        RetrievalLoop::new(
            self.config.clone(),
            RetryPolicy::new(3, Pacer::disabled()),
            retriever,
        )
        .unwrap()
    }
}

fn reel(code: &str) -> String {
    format!("https://www.instagram.com/reels/{code}")
}

#[tokio::test]
async fn failing_item_is_dropped_and_queue_cleared() {
    let harness = Harness::new();
    harness.queue.append([reel("x1"), reel("x2")]).await.unwrap();
    let retriever = Arc::new(FlakyRetriever::new(&[("x1", u32::MAX)]));

    let report = harness.runner(retriever.clone()).run(&harness.queue).await.unwrap();

    assert_eq!(retriever.calls_for("x1"), 3);
    assert_eq!(retriever.calls_for("x2"), 1);
    assert_eq!(report.attempted, 2);
    assert_eq!(report.retriever_calls, 4);
    assert_eq!(report.retrieved.len(), 1);
    assert_eq!(report.retrieved[0].identifier, reel("x2"));
    assert_eq!(report.abandoned.len(), 1);
    assert_eq!(report.abandoned[0].attempts, 3);
    assert!(report.queue_cleared);

    assert!(harness.queue.read().await.unwrap().is_empty());
    let media: Vec<String> = std::fs::read_dir(&harness.config.media_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert!(media.iter().all(|name| !name.contains("x1")));
    assert!(media.contains(&"x2.mp4".to_string()));
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let harness = Harness::new();
    harness.queue.append([reel("x1")]).await.unwrap();
    let retriever = Arc::new(FlakyRetriever::new(&[("x1", 2)]));

    let report = harness.runner(retriever.clone()).run(&harness.queue).await.unwrap();

    assert_eq!(retriever.calls_for("x1"), 3);
    assert_eq!(report.retrieved.len(), 1);
    assert!(report.abandoned.is_empty());
}

#[tokio::test]
async fn working_directories_are_removed_after_every_attempt() {
    let harness = Harness::new();
    harness.queue.append([reel("x1"), reel("x2")]).await.unwrap();
    let retriever = Arc::new(FlakyRetriever::new(&[("x1", 1), ("x2", u32::MAX)]));

    harness.runner(retriever.clone()).run(&harness.queue).await.unwrap();

    let workdirs = retriever.workdirs.lock().unwrap().clone();
    assert_eq!(workdirs.len(), 5);
    for workdir in &workdirs {
        assert!(workdir.starts_with(&harness.config.staging_dir));
        assert!(!workdir.exists(), "{} still exists", workdir.display());
    }
    assert_eq!(
        std::fs::read_dir(&harness.config.staging_dir).unwrap().count(),
        0
    );
}

#[tokio::test]
async fn every_item_failing_still_clears_queue() {
    let harness = Harness::new();
    harness.queue.append([reel("a"), reel("b")]).await.unwrap();
    let retriever = Arc::new(FlakyRetriever::new(&[("a", u32::MAX), ("b", u32::MAX)]));

    let report = harness.runner(retriever).run(&harness.queue).await.unwrap();

    assert!(report.retrieved.is_empty());
    assert_eq!(report.abandoned.len(), 2);
    assert!(harness.queue.read().await.unwrap().is_empty());
    assert!(harness.queue.path().exists());
}

#[tokio::test]
async fn unusable_staging_folder_abandons_items_and_clears_queue() {
    let harness = Harness::new();
    std::fs::write(&harness.config.staging_dir, b"not a directory").unwrap();
    harness.queue.append([reel("x1")]).await.unwrap();
    let retriever = Arc::new(FlakyRetriever::new(&[]));

    let report = harness.runner(retriever.clone()).run(&harness.queue).await.unwrap();

    assert_eq!(retriever.calls_for("x1"), 0);
    assert!(report.retrieved.is_empty());
    assert_eq!(report.abandoned.len(), 1);
    assert_eq!(report.abandoned[0].attempts, 3);
    assert!(report.queue_cleared);
    assert!(harness.queue.read().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_sidecar_write_leaves_no_media_behind() {
    let harness = Harness::new();
    // A directory where the sidecar should go makes every write fail.
    std::fs::create_dir_all(harness.config.media_dir.join("x1.txt")).unwrap();
    harness.queue.append([reel("x1")]).await.unwrap();
    let retriever = Arc::new(FlakyRetriever::new(&[]));

    let report = harness.runner(retriever.clone()).run(&harness.queue).await.unwrap();

    assert_eq!(retriever.calls_for("x1"), 3);
    assert!(report.retrieved.is_empty());
    assert_eq!(report.abandoned.len(), 1);
    assert!(!harness.config.media_dir.join("x1.mp4").exists());
    assert!(harness.queue.read().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_queue_file_is_an_empty_pass() {
    let harness = Harness::new();
    let retriever = Arc::new(FlakyRetriever::new(&[]));

    let report = harness.runner(retriever.clone()).run(&harness.queue).await.unwrap();

    assert_eq!(report.attempted, 0);
    assert_eq!(report.retriever_calls, 0);
    assert!(harness.queue.path().exists());
    assert!(harness.queue.read().await.unwrap().is_empty());
}

#[tokio::test]
async fn artifacts_are_named_from_caption_with_source_sidecar() {
    let harness = Harness::new();
    harness.queue.append([reel("C1abc")]).await.unwrap();
    let retriever = Arc::new(
        FlakyRetriever::new(&[]).with_caption("C1abc", "Morning: surf? session at the point today"),
    );

    let report = harness.runner(retriever).run(&harness.queue).await.unwrap();

    let artifact = &report.retrieved[0];
    assert_eq!(artifact.base_name, "C1abc_Morning_surf_session_at_the_point");
    assert_eq!(
        artifact.media_path,
        harness
            .config
            .media_dir
            .join("C1abc_Morning_surf_session_at_the_point.mp4")
    );
    assert_eq!(
        std::fs::read(&artifact.media_path).unwrap(),
        b"video bytes".to_vec()
    );
    let sidecar = artifact.sidecar_path.clone().unwrap();
    assert_eq!(std::fs::read_to_string(sidecar).unwrap(), reel("C1abc"));
}

#[tokio::test]
async fn caption_sidecar_mode_writes_caption() {
    let mut harness = Harness::new();
    harness.config.sidecar = SidecarContent::Caption;
    harness.queue.append([reel("C2")]).await.unwrap();
    let retriever = Arc::new(FlakyRetriever::new(&[]).with_caption("C2", "hello world"));

    let report = harness.runner(retriever).run(&harness.queue).await.unwrap();

    let sidecar = report.retrieved[0].sidecar_path.clone().unwrap();
    assert_eq!(std::fs::read_to_string(sidecar).unwrap(), "hello world");
}

#[tokio::test]
async fn no_sidecar_mode_writes_media_only() {
    let mut harness = Harness::new();
    harness.config.sidecar = SidecarContent::None;
    harness.queue.append([reel("C3")]).await.unwrap();
    let retriever = Arc::new(FlakyRetriever::new(&[]));

    let report = harness.runner(retriever).run(&harness.queue).await.unwrap();

    assert!(report.retrieved[0].sidecar_path.is_none());
    assert!(!harness.config.media_dir.join("C3.txt").exists());
}

#[tokio::test]
async fn abandoned_identifiers_reach_dead_letter_log() {
    let mut harness = Harness::new();
    let dead_letter = harness.config.media_dir.with_file_name("abandoned.tsv");
    harness.config.dead_letter_file = Some(dead_letter.clone());
    harness.queue.append([reel("gone"), reel("kept")]).await.unwrap();
    let retriever = Arc::new(FlakyRetriever::new(&[("gone", u32::MAX)]));

    harness.runner(retriever).run(&harness.queue).await.unwrap();

    let contents = std::fs::read_to_string(dead_letter).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1);
    let fields: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!(fields[1], reel("gone"));
    assert!(fields[2].contains("429"));
}

#[tokio::test(start_paused = true)]
async fn backoff_sleeps_between_attempts() {
    let harness = Harness::new();
    harness.queue.append([reel("x1")]).await.unwrap();
    let retriever = Arc::new(FlakyRetriever::new(&[("x1", u32::MAX)]));
    let runner = RetrievalLoop::new(
        harness.config.clone(),
        RetryPolicy::new(3, Pacer::from_seconds([5, 5])),
        retriever,
    )
    .unwrap();

    let start = tokio::time::Instant::now();
    runner.run(&harness.queue).await.unwrap();

    // Two waits between three attempts, none after the last.
    let elapsed = start.elapsed();
    assert!(elapsed >= std::time::Duration::from_secs(10));
    assert!(elapsed < std::time::Duration::from_secs(15));
}

#[test]
fn zero_attempt_policy_is_rejected() {
    let harness = Harness::new();
    let result = RetrievalLoop::new(
        harness.config.clone(),
        RetryPolicy::new(0, Pacer::disabled()),
        Arc::new(FlakyRetriever::new(&[])),
    );
    assert!(matches!(result, Err(RetrievalError::Configuration(_))));
}
