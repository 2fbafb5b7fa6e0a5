//! Writer-to-reader round-trips over real files, including crash-shaped
//! artifacts.

use tcap_core::{PlayerConfig, SessionPlayer, SessionReader, SessionWriter, StreamIndex};
use tempfile::TempDir;

fn prefix_in(dir: &TempDir) -> String {
    dir.path().join("cap").to_string_lossy().into_owned()
}

/// Small deterministic generator for commit sizes.
struct Lcg(u64);

impl Lcg {
    fn next_size(&mut self) -> usize {
        self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        ((self.0 >> 33) % 1024 + 1) as usize
    }
}

#[test]
fn roundtrip_reconstructs_commit_stream() {
    let dir = TempDir::new().unwrap();
    let prefix = prefix_in(&dir);

    let mut writer = SessionWriter::create(&prefix, 42, Some("deadbeef"), Some(true)).unwrap();
    let mut rng = Lcg(7);
    let mut total_out = 0u64;
    let mut total_in = 0u64;
    for i in 0..50 {
        let chunk = vec![b'a' + (i % 26) as u8; rng.next_size()];
        if i % 5 == 0 {
            writer.append_input(&chunk).unwrap();
            total_in += chunk.len() as u64;
        } else {
            writer.append_output(&chunk).unwrap();
            total_out += chunk.len() as u64;
        }
    }
    let started_at = writer.started_at_unix_ns();
    drop(writer);

    let session = SessionReader::open(&prefix).unwrap();
    assert_eq!(session.output_len, total_out);
    assert_eq!(session.input_len, total_in);
    assert_eq!(session.output.len(), 41);
    assert_eq!(session.input.len(), 11);

    // One start instant shared by every header that carries it.
    assert_eq!(session.output.started_at_unix_ns(), started_at);
    assert_eq!(session.input.started_at_unix_ns(), started_at);
    assert_eq!(session.meta.as_ref().unwrap().started_at_unix_ns, started_at);
    assert_eq!(session.meta.as_ref().unwrap().build_git_sha.as_deref(), Some("deadbeef"));

    for index in [&session.input, &session.output] {
        let ts = index.timestamps();
        let ends = index.end_offsets();
        assert!(ts.windows(2).all(|w| w[0] <= w[1]), "t_ns must not decrease");
        assert!(ends.windows(2).all(|w| w[0] < w[1]), "end_offset must grow");
    }
    assert_eq!(*session.output.end_offsets().last().unwrap(), total_out);
    assert_eq!(*session.input.end_offsets().last().unwrap(), total_in);
}

#[test]
fn crash_tail_in_sidecar_is_discarded() {
    let dir = TempDir::new().unwrap();
    let prefix = prefix_in(&dir);

    let mut writer = SessionWriter::create(&prefix, 1, None, None).unwrap();
    writer.append_output(b"one").unwrap();
    writer.append_output(b"twotwo").unwrap();
    drop(writer);

    // Simulate dying mid-record: append half a varint to the sidecar.
    let tidx_path = format!("{prefix}.output.tidx");
    let mut bytes = std::fs::read(&tidx_path).unwrap();
    bytes.push(0xf3);
    std::fs::write(&tidx_path, bytes).unwrap();

    let session = SessionReader::open(&prefix).unwrap();
    assert_eq!(session.output.len(), 3);
    assert_eq!(*session.output.end_offsets().last().unwrap(), 9);
}

#[test]
fn index_records_past_raw_length_are_dropped() {
    let dir = TempDir::new().unwrap();
    let prefix = prefix_in(&dir);

    let mut writer = SessionWriter::create(&prefix, 1, None, None).unwrap();
    writer.append_output(b"aaaa").unwrap();
    writer.append_output(b"bbbb").unwrap();
    writer.append_output(b"cccc").unwrap();
    drop(writer);

    // Simulate the raw stream losing its tail: index said 12, disk has 9.
    let raw_path = format!("{prefix}.output");
    let mut raw = std::fs::read(&raw_path).unwrap();
    raw.truncate(9);
    std::fs::write(&raw_path, raw).unwrap();

    let session = SessionReader::open(&prefix).unwrap();
    assert_eq!(session.output.len(), 3);
    assert_eq!(*session.output.end_offsets().last().unwrap(), 8);
    assert!(*session.output.end_offsets().last().unwrap() <= session.output_len);
}

#[test]
fn resize_offsets_stay_within_output() {
    let dir = TempDir::new().unwrap();
    let prefix = prefix_in(&dir);

    let mut writer = SessionWriter::create(&prefix, 1, None, None).unwrap();
    writer.record_resize(80, 24);
    writer.append_output(b"hello").unwrap();
    writer.record_resize(132, 43);
    writer.append_output(b" world").unwrap();
    drop(writer);

    let session = SessionReader::open(&prefix).unwrap();
    let resizes = session.events.resizes();
    assert_eq!(resizes.len(), 2);
    assert_eq!(resizes[0].stream_offset, 0);
    assert_eq!(resizes[1].stream_offset, 5);
    assert!(resizes.iter().all(|e| e.stream_offset <= session.output_len));

    // Lexicographic (stream_offset, t_ns) order.
    assert!(
        resizes
            .windows(2)
            .all(|w| (w[0].stream_offset, w[0].t_ns) <= (w[1].stream_offset, w[1].t_ns))
    );

    // Segmentation puts each event at its exact offset.
    let output = SessionReader::read_output(&prefix).unwrap();
    let segments = session.events.segment(0, &output);
    let byte_total: usize = segments
        .iter()
        .filter_map(|s| match s {
            tcap_core::Segment::Bytes(b) => Some(b.len()),
            tcap_core::Segment::Resize(_) => None,
        })
        .sum();
    assert_eq!(byte_total, output.len());
}

#[test]
fn player_replays_indexed_bytes() {
    let dir = TempDir::new().unwrap();
    let prefix = prefix_in(&dir);

    let mut writer = SessionWriter::create(&prefix, 1, None, None).unwrap();
    writer.append_output(b"first ").unwrap();
    writer.append_output(b"second").unwrap();
    drop(writer);

    let player = SessionPlayer::open(&prefix)
        .unwrap()
        .with_config(PlayerConfig::default().with_speed(1000.0));
    assert_eq!(player.record_count(), 3);

    let mut out = Vec::new();
    player.replay(&mut out).unwrap();
    assert_eq!(out, b"first second");
    assert_eq!(player.collect(), b"first second");
}

#[test]
fn missing_sidecar_loads_as_empty_index() {
    let dir = TempDir::new().unwrap();
    let prefix = prefix_in(&dir);

    let mut writer = SessionWriter::create(&prefix, 1, None, None).unwrap();
    writer.append_output(b"data").unwrap();
    drop(writer);

    std::fs::remove_file(format!("{prefix}.input.tidx")).unwrap();
    std::fs::remove_file(format!("{prefix}.events.jsonl")).unwrap();

    let session = SessionReader::open(&prefix).unwrap();
    assert!(session.input.is_empty());
    assert!(session.events.is_empty());
    assert_eq!(session.output.len(), 2);
}

#[test]
fn unknown_flags_need_opt_in() {
    let dir = TempDir::new().unwrap();
    let prefix = prefix_in(&dir);

    let writer = SessionWriter::create(&prefix, 1, None, None).unwrap();
    drop(writer);

    let tidx_path = format!("{prefix}.output.tidx");
    let mut bytes = std::fs::read(&tidx_path).unwrap();
    bytes[5] = 0x80;
    std::fs::write(&tidx_path, bytes).unwrap();

    assert!(SessionReader::open(&prefix).is_err());
    let session = SessionReader::open_with(&prefix, true).unwrap();
    assert_eq!(session.output.flags(), 0x80);
    let _: &StreamIndex = &session.output;
}
