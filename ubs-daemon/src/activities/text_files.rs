//! Text document activity: write a few `.txt` files filled from text APIs or a local pool.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};
use ubs_core::plan::DOCUMENT_GAP_SECS;

use crate::artifacts::stamp;
use crate::config::Config;
use crate::lifecycle::Running;
use crate::registry::Activity;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_TRIES: usize = 3;
/// Longest text taken from one API response, in characters.
const MAX_FETCHED_CHARS: usize = 1000;

const SENTENCES: [&str; 10] = [
    "This is a sample document created automatically.",
    "The weather today is quite pleasant for outdoor activities.",
    "Technology continues to evolve at an unprecedented pace.",
    "Many people enjoy reading books in their spare time.",
    "Coffee shops have become popular places for remote work.",
    "Exercise is important for maintaining good health.",
    "Travel broadens one's perspective on different cultures.",
    "Music has the power to evoke strong emotions.",
    "Learning new skills is a lifelong journey.",
    "Nature provides a peaceful escape from city life.",
];

pub struct TextFilesActivity {
    config: Arc<Config>,
    running: Running,
    client: reqwest::Client,
}

impl TextFilesActivity {
    pub fn new(config: Arc<Config>, running: Running) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "http client setup failed; using defaults");
                reqwest::Client::new()
            });
        Self {
            config,
            running,
            client,
        }
    }

    /// Body of a random configured API, truncated. `None` after `FETCH_TRIES` failures.
    async fn fetch_text(&self) -> Option<String> {
        if self.config.text_apis.is_empty() {
            return None;
        }
        for _ in 0..FETCH_TRIES {
            let url = self.config.text_apis.choose(&mut rand::thread_rng())?.clone();
            let response = match self.client.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!(%url, error = %e, "text api request failed");
                    continue;
                }
            };
            if !response.status().is_success() {
                debug!(%url, status = %response.status(), "text api refused");
                continue;
            }
            match response.text().await {
                Ok(body) => return Some(body.chars().take(MAX_FETCHED_CHARS).collect()),
                Err(e) => debug!(%url, error = %e, "text api body unreadable"),
            }
        }
        None
    }

    async fn content(&self) -> String {
        match self.fetch_text().await {
            Some(text) => text,
            None => local_text(&mut rand::thread_rng()),
        }
    }
}

/// Three to eight distinct sentences from the built-in pool, one per line.
fn local_text<R: Rng + ?Sized>(rng: &mut R) -> String {
    let n = rng.gen_range(3..=8);
    SENTENCES
        .choose_multiple(rng, n)
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Activity for TextFilesActivity {
    async fn run(&self) -> anyhow::Result<()> {
        let dir = self.config.save_paths.text_files();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;

        let count = self.config.files_to_create_per_day;
        for i in 0..count {
            if !self.running.is_set() {
                break;
            }
            let path = dir.join(format!("document_{}_{i}.txt", stamp()));
            let text = self.content().await;
            match tokio::fs::write(&path, text).await {
                Ok(()) => info!(path = %path.display(), "document created"),
                Err(e) => warn!(path = %path.display(), error = %e, "cannot write document"),
            }
            if i + 1 < count {
                let gap = DOCUMENT_GAP_SECS.pick(&mut rand::thread_rng());
                if !self.running.pause(Duration::from_secs(gap)).await {
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::RunningFlag;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::path::Path;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn documents(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Serves `status` with `body` to every connection.
    async fn http_server(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf).await;
                let reply = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        format!("http://{addr}/")
    }

    #[test]
    fn local_text_draws_distinct_sentences() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let text = local_text(&mut rng);
            let lines: Vec<_> = text.lines().collect();
            assert!((3..=8).contains(&lines.len()));
            let mut unique = lines.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), lines.len());
            assert!(lines.iter().all(|l| SENTENCES.contains(l)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn writes_requested_number_of_documents() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.save_paths.text_files = Some(dir.path().join("docs"));
        config.files_to_create_per_day = 3;
        let flag = RunningFlag::raised();
        TextFilesActivity::new(Arc::new(config), flag.view())
            .run()
            .await
            .unwrap();
        let names = documents(&dir.path().join("docs"));
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| n.starts_with("document_") && n.ends_with(".txt")));
        assert!(names[2].ends_with("_2.txt"));
    }

    #[tokio::test]
    async fn api_text_is_truncated() {
        let url = http_server("200 OK", "x".repeat(1500)).await;
        let mut config = Config::default();
        config.text_apis = vec![url];
        let flag = RunningFlag::raised();
        let activity = TextFilesActivity::new(Arc::new(config), flag.view());
        let text = activity.fetch_text().await.unwrap();
        assert_eq!(text.len(), MAX_FETCHED_CHARS);
    }

    #[tokio::test]
    async fn failing_api_falls_back_to_pool() {
        let url = http_server("500 Internal Server Error", "down".into()).await;
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.text_apis = vec![url];
        config.save_paths.text_files = Some(dir.path().to_path_buf());
        config.files_to_create_per_day = 1;
        let flag = RunningFlag::raised();
        let activity = TextFilesActivity::new(Arc::new(config), flag.view());
        assert!(activity.fetch_text().await.is_none());
        activity.run().await.unwrap();
        let names = documents(dir.path());
        assert_eq!(names.len(), 1);
        let text = std::fs::read_to_string(dir.path().join(&names[0])).unwrap();
        assert!(text.lines().all(|l| SENTENCES.contains(&l)));
    }
}
