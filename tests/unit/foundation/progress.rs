use super::*;

#[test]
fn first_and_last_items_are_always_reported() {
    let mut seen = Vec::new();
    let mut observer = |u: &ProgressUpdate<'_>| seen.push((u.count, u.label.to_owned()));
    {
        let mut progress = Progress::new(Some(&mut observer));
        progress.begin(Stage::Export, 4);
        let t0 = Instant::now();
        progress.advance_at("a", t0);
        progress.advance_at("b", t0 + Duration::from_millis(10));
        progress.advance_at("c", t0 + Duration::from_millis(20));
        progress.advance_at(" d ", t0 + Duration::from_millis(30));
    }
    assert_eq!(seen, vec![(1, "a".to_owned()), (4, "d".to_owned())]);
}

#[test]
fn middle_items_report_after_interval() {
    let mut counts = Vec::new();
    let mut observer = |u: &ProgressUpdate<'_>| counts.push(u.count);
    {
        let mut progress = Progress::new(Some(&mut observer));
        progress.begin(Stage::Collect, 10);
        let t0 = Instant::now();
        progress.advance_at("a", t0);
        progress.advance_at("b", t0 + Duration::from_millis(100));
        progress.advance_at("c", t0 + Duration::from_millis(600));
        progress.advance_at("d", t0 + Duration::from_millis(700));
    }
    assert_eq!(counts, vec![1, 3]);
}

#[test]
fn begin_resets_counters() {
    let mut stages = Vec::new();
    let mut observer = |u: &ProgressUpdate<'_>| stages.push((u.stage, u.count, u.total));
    {
        let mut progress = Progress::new(Some(&mut observer));
        progress.begin(Stage::Collect, 1);
        progress.advance("a");
        progress.begin(Stage::Export, 2);
        progress.advance("b");
    }
    assert_eq!(
        stages,
        vec![(Stage::Collect, 1, 1), (Stage::Export, 1, 2)]
    );
}

#[test]
fn no_observer_still_counts() {
    let mut progress = Progress::new(None);
    progress.begin(Stage::Collect, 3);
    progress.advance("a");
    progress.advance("b");
    assert_eq!(progress.count, 2);
}

#[test]
fn finish_settles_a_short_stage() {
    let mut seen = Vec::new();
    let mut observer = |u: &ProgressUpdate<'_>| seen.push((u.count, u.total, u.label.to_owned()));
    {
        let mut progress = Progress::new(Some(&mut observer));
        progress.begin(Stage::Collect, 5);
        let t0 = Instant::now();
        progress.advance_at("a", t0);
        progress.advance_at("b", t0 + Duration::from_millis(10));
        progress.finish();
        progress.finish();
    }
    assert_eq!(
        seen,
        vec![(1, 5, "a".to_owned()), (2, 2, "b".to_owned())]
    );
}

#[test]
fn finish_is_silent_after_a_complete_stage() {
    let mut counts = Vec::new();
    let mut observer = |u: &ProgressUpdate<'_>| counts.push(u.count);
    {
        let mut progress = Progress::new(Some(&mut observer));
        progress.begin(Stage::Export, 2);
        progress.advance("a");
        progress.advance("b");
        progress.finish();
        progress.begin(Stage::Collect, 3);
        progress.finish();
    }
    assert_eq!(counts, vec![1, 2]);
}
