#[path = "common/mod.rs"]
mod common;

use common::*;
use std::fs;
use std::sync::Arc;
use subsift::{
    ArchiveFile, ArchiveOutcome, ArchiveState, ArchiveStatus, FailureKind, ProgressObserver, RunError,
    SubredditExtractor,
};

/// The canonical scenario: one matching and one non-matching line.
/// Outcome: exactly the matching line, byte-for-byte.
#[test]
fn lets_talk_music_scenario() {
    let base = tempfile::tempdir().unwrap().into_path();
    let data = base.join("data");
    write_zst_lines(
        &data.join("RC_2015-01.zst"),
        &[
            r#"{"subreddit":"LetsTalkMusic","id":1}"#.to_string(),
            r#"{"subreddit":"other","id":2}"#.to_string(),
        ],
    );
    let out = base.join("out");

    let summary = SubredditExtractor::new(options(&data, &out, &["LetsTalkMusic"])).run().unwrap();

    assert_eq!(read_lines(&out.join("RC_2015-01.jsonl")), vec![r#"{"subreddit":"LetsTalkMusic","id":1}"#]);
    assert_eq!(summary.archives.len(), 1);
    assert_eq!(summary.total_scanned(), 2);
    assert_eq!(summary.total_matched(), 1);
    assert!(summary.is_clean());
}

/// Every archive gets its own output containing exactly its M matching records, in order.
#[test]
fn each_archive_output_has_exactly_its_matches_in_order() {
    let (base, data, written) = make_corpus();
    let out = base.join("out");
    let targets = ["LetsTalkMusic", "Jazz"];

    let summary = SubredditExtractor::new(options(&data, &out, &targets).with_batch_size(7)).run().unwrap();
    assert_eq!(summary.archives.len(), 3);
    assert!(summary.is_clean());

    for (name, lines) in &written {
        let expected = expected_matches(lines, &targets);
        let got = read_lines(&out.join(format!("{name}.jsonl")));
        assert_eq!(got, expected, "output for {name}");

        let o = summary.get(&data.join(format!("{name}.zst"))).unwrap();
        assert_eq!(o.records_scanned, lines.len() as u64);
        assert_eq!(o.records_matched, expected.len() as u64);
        assert_eq!(o.parse_errors, 0);
    }
}

/// `[valid1, malformed, valid2]` with both valid lines matching → `[valid1, valid2]`.
#[test]
fn malformed_line_does_not_disturb_neighbours() {
    let base = tempfile::tempdir().unwrap().into_path();
    let data = base.join("data");
    let valid1 = comment("rust", 1);
    let valid2 = comment("rust", 2);
    write_zst_lines(
        &data.join("RC_2016-01.zst"),
        &[valid1.clone(), r#"{"subreddit":"rust","id":"#.to_string(), valid2.clone()],
    );
    let out = base.join("out");

    let summary = SubredditExtractor::new(options(&data, &out, &["rust"])).run().unwrap();

    assert_eq!(read_lines(&out.join("RC_2016-01.jsonl")), vec![valid1, valid2]);
    assert_eq!(summary.total_parse_errors(), 1);
    assert!(summary.is_clean(), "a malformed line is not an archive failure");
}

/// batch_size=1 and batch_size=10000 produce byte-identical files.
#[test]
fn output_is_invariant_under_batch_size() {
    let (base, data, _) = make_corpus();
    let small = base.join("out_small");
    let large = base.join("out_large");
    let targets = ["LetsTalkMusic"];

    SubredditExtractor::new(options(&data, &small, &targets).with_batch_size(1)).run().unwrap();
    SubredditExtractor::new(options(&data, &large, &targets).with_batch_size(10_000)).run().unwrap();

    assert_eq!(snapshot(&small), snapshot(&large));
}

/// num_workers=1 and num_workers=4 produce identical per-archive files.
#[test]
fn output_is_invariant_under_worker_count() {
    let (base, data, _) = make_corpus();
    let one = base.join("out_one");
    let four = base.join("out_four");
    let targets = ["LetsTalkMusic", "AskReddit"];

    SubredditExtractor::new(options(&data, &one, &targets).with_num_workers(1)).run().unwrap();
    SubredditExtractor::new(options(&data, &four, &targets).with_num_workers(4)).run().unwrap();

    let a = snapshot(&one);
    assert_eq!(a.len(), 3);
    assert_eq!(a, snapshot(&four));
}

/// Running twice over unchanged input reproduces the same files; nothing accumulates,
/// and stale content from an unrelated earlier run is overwritten.
#[test]
fn rerun_is_idempotent() {
    let (base, data, _) = make_corpus();
    let out = base.join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("RC_2012-01.jsonl"), "stale line\n").unwrap();

    let extractor = SubredditExtractor::new(options(&data, &out, &["Jazz"]));
    extractor.run().unwrap();
    let first = snapshot(&out);
    extractor.run().unwrap();
    assert_eq!(first, snapshot(&out));
    assert!(!fs::read_to_string(out.join("RC_2012-01.jsonl")).unwrap().contains("stale"));
}

/// An archive that cannot be opened is reported as ArchiveOpenError; the others still
/// produce correct output.
#[test]
fn unopenable_archive_fails_alone() {
    let (base, data, written) = make_corpus();
    let out = base.join("out");
    let targets = ["LetsTalkMusic"];

    let mut archives: Vec<ArchiveFile> = written
        .iter()
        .map(|(name, _)| ArchiveFile::from_path(data.join(format!("{name}.zst"))))
        .collect();
    let missing = data.join("RC_2099-12.zst");
    archives.push(ArchiveFile::from_path(&missing));

    let summary = SubredditExtractor::new(options(&data, &out, &targets)).run_archives(archives).unwrap();

    let o = summary.get(&missing).unwrap();
    let f = o.failure().expect("missing archive must fail");
    assert_eq!(f.kind, FailureKind::ArchiveOpen);
    assert_eq!(f.kind.to_string(), "ArchiveOpenError");
    assert_eq!(f.stage, ArchiveState::Opening);
    assert!(!out.join("RC_2099-12.jsonl").exists());

    assert_eq!(summary.succeeded(), 3);
    for (name, lines) in &written {
        assert_eq!(read_lines(&out.join(format!("{name}.jsonl"))), expected_matches(lines, &targets));
    }
    assert_eq!(summary.unfinished_archives(), vec![missing]);
}

/// A non-zstd file with a `.zst` name fails with a decompression error; siblings succeed
/// and the run itself still returns Ok.
#[test]
fn corrupt_archive_fails_alone() {
    let (base, data, written) = make_corpus();
    let bad = data.join("RC_2012-03.zst");
    write_corrupt(&bad);
    let out = base.join("out");

    let summary = SubredditExtractor::new(options(&data, &out, &["Jazz"])).run().unwrap();

    assert_eq!(summary.archives.len(), 4);
    let f = summary.get(&bad).unwrap().failure().unwrap().clone();
    assert_eq!(f.kind, FailureKind::Decompression);
    assert!(f.position.is_some());
    assert_eq!(read_lines(&out.join("RC_2012-03.jsonl")), Vec::<String>::new());
    for (name, lines) in &written {
        assert_eq!(read_lines(&out.join(format!("{name}.jsonl"))), expected_matches(lines, &["Jazz"]));
    }
}

/// A truncated archive fails mid-stream; whatever was written before the failure is a
/// clean, in-order prefix of the expected matches.
#[test]
fn truncated_archive_keeps_a_valid_prefix() {
    let base = tempfile::tempdir().unwrap().into_path();
    let data = base.join("data");
    let path = data.join("RC_2013-01.zst");
    let lines = mixed_lines(&["Jazz", "AskReddit"], 20_000);
    write_zst_lines(&path, &lines);
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
    let out = base.join("out");

    let summary = SubredditExtractor::new(options(&data, &out, &["Jazz"]).with_batch_size(10)).run().unwrap();

    let o = summary.get(&path).unwrap();
    let f = o.failure().expect("truncated archive must fail");
    assert_eq!(f.kind, FailureKind::Decompression);
    assert!(matches!(f.stage, ArchiveState::Streaming));

    let expected = expected_matches(&lines, &["Jazz"]);
    let got = read_lines(&out.join("RC_2013-01.jsonl"));
    assert!(got.len() < expected.len());
    assert_eq!(got[..], expected[..got.len()]);
    assert_eq!(o.records_matched, got.len() as u64);
}

#[test]
fn missing_input_directory_is_a_run_error() {
    let base = tempfile::tempdir().unwrap().into_path();
    let res = SubredditExtractor::new(options(&base.join("nope"), &base.join("out"), &["x"])).run();
    assert!(matches!(res, Err(RunError::InputDir { .. })));
}

#[test]
fn empty_input_directory_is_an_empty_summary() {
    let base = tempfile::tempdir().unwrap().into_path();
    let data = base.join("data");
    fs::create_dir_all(&data).unwrap();
    let summary = SubredditExtractor::new(options(&data, &base.join("out"), &["x"])).run().unwrap();
    assert!(summary.archives.is_empty());
    assert!(summary.is_clean());
}

/// Cancels the run as soon as the first archive finishes.
struct CancelAfterFirst(subsift::CancelToken);

impl ProgressObserver for CancelAfterFirst {
    fn archive_finished(&self, _worker: usize, _outcome: &ArchiveOutcome) {
        self.0.cancel();
    }
}

/// With one worker, cancelling after the first archive leaves the rest untouched.
#[test]
fn cancel_stops_remaining_archives() {
    let (base, data, _) = make_corpus();
    let out = base.join("out");

    let extractor = SubredditExtractor::new(options(&data, &out, &["Jazz"]).with_num_workers(1));
    let token = extractor.cancel_token();
    let summary = extractor.observer(Arc::new(CancelAfterFirst(token))).run().unwrap();

    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.cancelled(), 2);
    let cancelled: Vec<_> = summary
        .archives
        .iter()
        .filter(|o| o.status == ArchiveStatus::Cancelled)
        .map(|o| o.output.clone())
        .collect();
    for p in cancelled {
        assert!(!p.exists(), "{} should not have been started", p.display());
    }
}

#[test]
fn summary_json_lists_failures() {
    let (base, data, _) = make_corpus();
    write_corrupt(&data.join("RC_2012-03.zst"));
    let out = base.join("out");
    let summary = SubredditExtractor::new(options(&data, &out, &["Jazz"])).run().unwrap();

    let json_path = base.join("summary.json");
    summary.write_json(&json_path).unwrap();
    let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    let archives = v["archives"].as_array().unwrap();
    assert_eq!(archives.len(), 4);
    let failed: Vec<_> = archives.iter().filter(|a| a["status"]["status"] == "failed").collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["status"]["kind"], "Decompression");
}

/// Two archives with the same file name in different directories would share one output
/// file; only the first one runs and the other is reported, so no records are silently lost.
#[test]
fn colliding_outputs_are_not_both_written() {
    let base = tempfile::tempdir().unwrap().into_path();
    let first = mixed_lines(&["Jazz"], 50);
    let second: Vec<String> = (1000..1050).map(|i| comment("Jazz", i)).collect();
    let a = base.join("a").join("RC_2012-01.zst");
    let b = base.join("b").join("RC_2012-01.zst");
    write_zst_lines(&a, &first);
    write_zst_lines(&b, &second);
    let out = base.join("out");

    let archives = vec![ArchiveFile::from_path(&a), ArchiveFile::from_path(&b), ArchiveFile::from_path(&a)];
    let summary = SubredditExtractor::new(options(&base.join("a"), &out, &["Jazz"]))
        .run_archives(archives)
        .unwrap();

    assert_eq!(summary.archives.len(), 2);
    assert!(summary.get(&a).unwrap().is_done());
    let f = summary.get(&b).unwrap().failure().expect("second archive must not run");
    assert_eq!(f.kind, FailureKind::OutputConflict);
    assert_eq!(summary.total_matched(), 50);
    assert_eq!(read_lines(&out.join("RC_2012-01.jsonl")), first);
    assert_eq!(summary.unfinished_archives(), vec![b]);
}

/// A write failure while flushing the last batch fails only that archive, in the
/// Flushing state, with a stream position.
#[cfg(unix)]
#[test]
fn write_failure_at_final_flush_fails_alone() {
    if !std::path::Path::new("/dev/full").exists() {
        return;
    }
    let (base, data, written) = make_corpus();
    let out = base.join("out");
    fs::create_dir_all(&out).unwrap();
    std::os::unix::fs::symlink("/dev/full", out.join("RC_2012-01.jsonl")).unwrap();

    let summary =
        SubredditExtractor::new(options(&data, &out, &["Jazz"]).with_batch_size(10_000)).run().unwrap();

    let full = data.join("RC_2012-01.zst");
    let o = summary.get(&full).unwrap();
    let f = o.failure().expect("writing into a full device must fail");
    assert_eq!(f.kind, FailureKind::Write);
    assert_eq!(f.stage, ArchiveState::Flushing);
    assert_eq!(f.position.map(|p| p.line), Some(300));

    assert_eq!(summary.succeeded(), 2);
    for (name, lines) in written.iter().filter(|(name, _)| name != "RC_2012-01") {
        assert_eq!(read_lines(&out.join(format!("{name}.jsonl"))), expected_matches(lines, &["Jazz"]));
    }
}
