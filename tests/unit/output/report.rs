use super::*;

fn issue(msg: &str) -> Issue {
    Issue {
        kind: IssueKind::InvalidTag,
        message: msg.to_owned(),
    }
}

#[test]
fn single_issue_summary_is_its_message() {
    let mut report = ErrorReport::new(vec![issue("Invalid layer name:\n\nA [x]")]);
    let tmp = tempfile::tempdir().unwrap();
    report.write_log(&tmp.path().join("errors.txt"));
    assert_eq!(report.summary(), "Invalid layer name:\n\nA [x]");
    assert_eq!(report.log_path, None);
    assert!(!tmp.path().join("errors.txt").exists());
}

#[test]
fn several_issues_write_a_log() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("out").join("errors.txt");
    let mut report = ErrorReport::new(vec![issue("first\n\nA"), issue("second"), issue("third")]);
    report.write_log(&path);
    assert_eq!(report.log_path.as_deref(), Some(path.as_path()));
    assert_eq!(
        report.summary(),
        "first\n\nA\n\nSee errors.txt for 2 additional errors."
    );
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, "first\nA\n---\nsecond\n---\nthird\n");
}

#[test]
fn singular_wording_for_one_extra() {
    let report = ErrorReport::new(vec![issue("a"), issue("b")]);
    assert!(report.summary().ends_with("See errors.txt for 1 additional error."));
}

#[test]
fn unwritable_log_is_reported_in_summary() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("file");
    std::fs::write(&blocker, "x").unwrap();
    let mut report = ErrorReport::new(vec![issue("a"), issue("b")]);
    report.write_log(&blocker.join("errors.txt"));
    assert!(report.log_path.is_none());
    assert!(
        report
            .summary()
            .contains("Unable to write 1 additional error to errors.txt.")
    );
}

#[test]
fn issue_log_keeps_order() {
    let mut log = IssueLog::default();
    log.push(IssueKind::InvalidScale, "one");
    log.push(IssueKind::NotAMesh, "two");
    assert_eq!(log.len(), 2);
    let kinds: Vec<_> = log.iter().map(|i| i.kind).collect();
    assert_eq!(kinds, vec![IssueKind::InvalidScale, IssueKind::NotAMesh]);
}
