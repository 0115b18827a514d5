#![allow(dead_code)]

use serde_json::json;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use subsift::RunOptions;

/// Write a compressed `.zst` file containing the provided JSONL lines.
pub fn write_zst_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    for l in lines {
        writeln!(&mut enc, "{}", l).unwrap();
    }
    enc.finish().unwrap();
}

/// Read a text file line-by-line into strings (skips empty lines).
pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// A comment-shaped record in `subreddit`, numbered `id`.
pub fn comment(subreddit: &str, id: u64) -> String {
    json!({
        "author": format!("user{}", id % 17),
        "body": format!("comment body number {id}, with some filler text"),
        "created_utc": 1_325_376_000u64 + id,
        "id": format!("c{id}"),
        "parent_id": "t3_s1",
        "score": (id % 11) as i64 - 3,
        "subreddit": subreddit,
    })
    .to_string()
}

/// `n` records cycling over `subs`.
pub fn mixed_lines(subs: &[&str], n: u64) -> Vec<String> {
    (0..n).map(|i| comment(subs[(i as usize) % subs.len()], i)).collect()
}

/// Lines of `lines` whose subreddit is one of `targets`, in order.
pub fn expected_matches(lines: &[String], targets: &[&str]) -> Vec<String> {
    lines
        .iter()
        .filter(|l| {
            serde_json::from_str::<serde_json::Value>(l)
                .ok()
                .and_then(|v| v.get("subreddit").and_then(|s| s.as_str()).map(|s| targets.contains(&s)))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// A data directory with three monthly archives of mixed subreddits.
/// Returns (root tempdir path, data dir, the lines written per archive name).
pub fn make_corpus() -> (PathBuf, PathBuf, Vec<(String, Vec<String>)>) {
    let base = tempfile::tempdir().unwrap().into_path();
    let data = base.join("data");
    let mut written = Vec::new();
    for (name, n) in [("RC_2012-01", 300u64), ("RC_2012-02", 120), ("RS_2012-01", 45)] {
        let lines = mixed_lines(&["LetsTalkMusic", "AskReddit", "Jazz", "letstalkmusic"], n);
        write_zst_lines(&data.join(format!("{name}.zst")), &lines);
        written.push((name.to_string(), lines));
    }
    (base, data, written)
}

/// Options pointing at `data` → `base/<out>` with progress-friendly small buffers.
pub fn options(data: &Path, out: &Path, targets: &[&str]) -> RunOptions {
    RunOptions::new(data, out, targets)
        .with_num_workers(2)
        .with_read_buffer(8 * 1024)
        .with_low_memory_threshold(0.0)
}

/// Write a file with a `.zst` name but plain-text contents.
pub fn write_corrupt(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    writeln!(&mut f, "{{\"id\":\"bad\",\"subreddit\":\"LetsTalkMusic\"}}").unwrap();
}

/// Map of output file name → bytes for every file in `dir`.
pub fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut v: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap())
        .map(|e| (e.file_name().to_string_lossy().into_owned(), fs::read(e.path()).unwrap()))
        .collect();
    v.sort();
    v
}
