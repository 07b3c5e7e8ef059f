//! Logs rendered by the writer parse back into the records they came from.

use std::io::Cursor;

use tokenledger::usage::{export, LogSchema, LogStreamParser, PhaseInfo, UsageInfo, UsageLogWriter};

fn known_records() -> Vec<PhaseInfo> {
    let steps = [
        ("Chief Executive Officer", "DemandAnalysis", 0, 1_203, 412),
        ("Chief Product Officer", "DemandAnalysis", 1, 1_650, 98),
        ("Chief Technology Officer", "LanguageChoose", 0, 980, 64),
        ("Programmer", "Coding", 0, 2_410, 1_877),
        ("Code Reviewer", "CodeReviewComment", 0, 4_102, 533),
        ("Programmer", "CodeReviewModification", 1, 4_870, 2_004),
    ];

    steps
        .iter()
        .enumerate()
        .map(|(i, &(role, phase, turn, prompt, completion))| {
            let usage = UsageInfo::timed(
                prompt,
                completion,
                prompt + completion,
                format!("2025-21-05 14:{:02}:10", i),
                format!("2025-21-05 14:{:02}:42", i),
            );
            PhaseInfo::new(role, phase, turn, usage)
        })
        .collect()
}

fn render_log(schema: LogSchema, records: &[PhaseInfo]) -> String {
    let mut writer = UsageLogWriter::new(Vec::new(), schema);
    for record in records {
        writer
            .write_phase_record("gpt-4", record, Some(0.01))
            .expect("write record");
    }
    String::from_utf8(writer.into_inner()).expect("utf-8 log")
}

#[test]
fn test_timestamped_log_round_trip() {
    let records = known_records();
    let log = render_log(LogSchema::Timestamped, &records);

    let parsed = LogStreamParser::new(LogSchema::Timestamped)
        .parse_reader(Cursor::new(log))
        .expect("parse rendered log");
    assert_eq!(parsed, records);

    let mut csv = Vec::new();
    export::write_csv(&mut csv, LogSchema::Timestamped, &parsed).expect("write csv");
    let reread = export::read_csv(csv.as_slice(), LogSchema::Timestamped).expect("read csv");
    assert_eq!(reread, records);
}

#[test]
fn test_count_only_log_round_trip() {
    let records = known_records();
    let log = render_log(LogSchema::CountOnly, &records);

    let parsed = LogStreamParser::new(LogSchema::CountOnly)
        .parse_str(&log)
        .expect("parse rendered log");

    let expected: Vec<PhaseInfo> = records
        .into_iter()
        .map(|mut record| {
            record.usage_info.send_time = None;
            record.usage_info.recv_time = None;
            record
        })
        .collect();
    assert_eq!(parsed, expected);

    let mut csv = Vec::new();
    export::write_csv(&mut csv, LogSchema::CountOnly, &parsed).expect("write csv");
    let reread = export::read_csv(csv.as_slice(), LogSchema::CountOnly).expect("read csv");
    assert_eq!(reread, expected);
}

#[test]
fn test_output_count_matches_phase_markers() {
    let records = known_records();
    let log = render_log(LogSchema::Timestamped, &records);
    let markers = log.lines().filter(|line| line.contains("[Start Chat]")).count();

    let parsed = LogStreamParser::new(LogSchema::Timestamped)
        .parse_str(&log)
        .expect("parse rendered log");
    assert_eq!(parsed.len(), markers);
}

#[test]
fn test_truncated_rendered_log_yields_nothing() {
    let log = render_log(LogSchema::Timestamped, &known_records());
    // Cut inside the last receive block, after its prompt_tokens line
    let cut = log.rfind("completion_tokens").expect("receive block");

    let result = LogStreamParser::new(LogSchema::Timestamped).parse_str(&log[..cut]);
    assert!(result.is_err());
}
