//! Keyword search example - one producer walks a directory tree, many
//! consumers search the files it finds
//!
//! Usage: cargo run --example keyword_search -- [DIR] [KEYWORD]

use pledge::sync::{BoundedQueue, Feed};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

const FILE_QUEUE_SIZE: usize = 10;
const SEARCH_THREADS: usize = 16;

fn enumerate(dir: &Path, queue: &BoundedQueue<Feed<PathBuf>>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            enumerate(&path, queue)?;
        } else {
            queue.send(path);
        }
    }
    Ok(())
}

fn search(path: &Path, keyword: &str) -> io::Result<usize> {
    let reader = BufReader::new(File::open(path)?);
    let mut hits = 0;

    for (index, line) in reader.lines().enumerate() {
        // skip binary or non-UTF-8 content
        let Ok(line) = line else { break };
        if line.contains(keyword) {
            println!("{}:{}:{}", path.display(), index + 1, line.trim_end());
            hits += 1;
        }
    }

    Ok(hits)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let root = PathBuf::from(args.next().unwrap_or_else(|| "src".to_string()));
    let keyword = args.next().unwrap_or_else(|| "Condvar".to_string());

    println!("=== Keyword Search Example ===\n");
    println!("Searching {} for '{}'\n", root.display(), keyword);

    let queue = Arc::new(BoundedQueue::new(FILE_QUEUE_SIZE).expect("Failed to create queue"));
    let matches = Arc::new(AtomicUsize::new(0));

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            if let Err(e) = enumerate(&root, &queue) {
                tracing::error!(error = %e, "directory walk failed");
            }
            // always release the consumers, even after a failed walk
            queue.finish();
        })
    };

    let consumers: Vec<_> = (0..SEARCH_THREADS)
        .map(|_| {
            let queue = queue.clone();
            let keyword = keyword.clone();
            let matches = matches.clone();
            thread::spawn(move || {
                queue.consume(|path: PathBuf| match search(&path, &keyword) {
                    Ok(hits) => {
                        matches.fetch_add(hits, Ordering::Relaxed);
                    }
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping file"),
                })
            })
        })
        .collect();

    producer.join().expect("producer panicked");
    let files: usize = consumers
        .into_iter()
        .map(|c| c.join().expect("consumer panicked"))
        .sum();

    println!(
        "\n{} matching lines in {} files",
        matches.load(Ordering::Relaxed),
        files
    );
}
