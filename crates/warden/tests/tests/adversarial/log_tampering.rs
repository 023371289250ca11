//! Adversarial: replayed, reordered, dropped and rewritten log entries.

use warden_probes::{
    LogAnchor, LogChainEntry, LogIntegrityMonitor, LogIssueKind, LogMonitorConfig,
};
use warden_tests::produce_log;

fn monitor() -> LogIntegrityMonitor {
    LogIntegrityMonitor::new(LogMonitorConfig::default()).unwrap()
}

fn feed(m: &LogIntegrityMonitor, entries: &[LogChainEntry]) -> Vec<Option<LogIssueKind>> {
    entries.iter().map(|e| m.ingest(*e)).collect()
}

#[test]
fn replayed_entry_is_a_break_without_reanchoring() {
    let entries = produce_log(LogAnchor::GENESIS, 6);
    let m = monitor();
    feed(&m, &entries[..5]);

    assert_eq!(m.ingest(entries[2]), Some(LogIssueKind::Break));
    assert_eq!(m.tip().seq, 5);
    // the genuine successor still links to the real tip
    assert_eq!(m.ingest(entries[5]), None);

    let report = m.verify();
    assert_eq!(report.first_break, Some(3));
    assert!(!report.has_gap());
    assert_eq!(report.score(), 0.0);
}

#[test]
fn swapped_neighbours_show_gap_and_break() {
    let entries = produce_log(LogAnchor::GENESIS, 5);
    let shuffled = [entries[0], entries[1], entries[3], entries[2], entries[4]];
    let m = monitor();
    let issues = feed(&m, &shuffled);
    assert_eq!(
        issues,
        vec![
            None,
            None,
            Some(LogIssueKind::Gap { from: 3, to: 3 }),
            Some(LogIssueKind::Break),
            None,
        ]
    );

    let report = m.verify();
    assert_eq!(report.gaps, vec![3]);
    assert_eq!(report.first_break, Some(3));
    assert_eq!(m.issues().len(), 2);

    // one resolution covers both issues at that seq
    assert!(m.resolve(3));
    assert!(m.verify().valid);
}

#[test]
fn edited_payload_hash_breaks_and_successors_relink() {
    let mut entries = produce_log(LogAnchor::GENESIS, 6);
    entries[3].payload_hash ^= 0x0100;
    let m = monitor();
    let issues = feed(&m, &entries);
    assert_eq!(issues[3], Some(LogIssueKind::Break));
    // the running hash was left intact, so re-anchoring on it relinks
    assert_eq!(issues[4], None);
    assert_eq!(issues[5], None);
    assert_eq!(m.verify().first_break, Some(4));
}

#[test]
fn recomputed_forgery_is_caught_by_its_successor() {
    let genuine = produce_log(LogAnchor::GENESIS, 4);
    // the forger rewrites entry 2 and fixes up its own running hash
    let forged = LogChainEntry::next(genuine[0].anchor(), b"nothing happened");
    let stream = [genuine[0], forged, genuine[2], genuine[3]];

    let m = monitor();
    let issues = feed(&m, &stream);
    assert_eq!(issues[1], None);
    assert_eq!(issues[2], Some(LogIssueKind::Break));
    assert_eq!(issues[3], None);
}

#[test]
fn payload_swap_is_visible_to_payload_check() {
    let m = monitor();
    let seq = m.append(b"rm -rf /scratch");
    assert_eq!(m.check_payload(seq, b"rm -rf /scratch"), Some(true));
    assert_eq!(m.check_payload(seq, b"ls /scratch"), Some(false));
    assert_eq!(m.check_payload(seq + 10, b"anything"), None);
}

#[test]
fn dropped_tail_range_is_counted_but_listing_is_capped() {
    let m = LogIntegrityMonitor::new(LogMonitorConfig {
        max_listed_gaps: 4,
        ..Default::default()
    })
    .unwrap();
    m.append(b"first");
    let far = LogChainEntry::next(
        LogAnchor {
            seq: 999,
            running_hash: 0,
        },
        b"late",
    );
    assert_eq!(m.ingest(far), Some(LogIssueKind::Gap { from: 2, to: 999 }));

    let report = m.verify();
    assert_eq!(report.missing_count, 998);
    assert_eq!(report.gaps, vec![2, 3, 4, 5]);
    assert_eq!(report.score(), 50.0);
}

#[test]
fn offline_stream_verification_matches_online_monitor() {
    let mut entries = produce_log(LogAnchor::GENESIS, 12);
    entries.remove(4);
    entries[8].running_hash ^= 0xffff;

    let m = monitor();
    feed(&m, &entries);
    let online = m.verify();
    let offline = LogIntegrityMonitor::verify_stream(LogAnchor::GENESIS, &entries);

    assert_eq!(offline.gaps, online.gaps);
    assert_eq!(offline.first_break, online.first_break);
    assert_eq!(offline.tip_seq, online.tip_seq);
    assert_eq!(offline.entries_checked, 11);
    assert!(!offline.valid);
}

#[test]
fn resumed_monitor_rejects_history_before_its_anchor() {
    let entries = produce_log(LogAnchor::GENESIS, 8);
    let m = LogIntegrityMonitor::with_anchor(LogMonitorConfig::default(), entries[4].anchor())
        .unwrap();
    assert_eq!(m.ingest(entries[2]), Some(LogIssueKind::Break));
    assert_eq!(feed(&m, &entries[5..]), vec![None, None, None]);
    assert_eq!(m.tip().seq, 8);
}
