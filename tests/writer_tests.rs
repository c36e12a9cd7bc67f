//! Record writer: contention backoff, give-up, non-contention errors, sink files.

mod common;

use catwalk::CatalogError;
use catwalk::engine::retry::{RecordingSleeper, Sleeper};
use catwalk::pipeline::{RecordWriter, create_sink};
use common::{FlakyWriter, ScriptedWriter, read_rows};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn row(name: &str) -> Vec<String> {
    vec![name.into(), "txt".into(), "0.00".into(), "0.00".into(), format!("{name}.txt"), String::new()]
}

fn writer(failures: usize, kind: ErrorKind) -> (RecordWriter<FlakyWriter>, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::new());
    let dyn_sleeper: Arc<dyn Sleeper> = sleeper.clone();
    (
        RecordWriter::new(FlakyWriter::new(failures, kind), dyn_sleeper),
        sleeper,
    )
}

#[test]
fn test_contention_clears_on_fourth_attempt() {
    let (mut w, sleeper) = writer(3, ErrorKind::PermissionDenied);
    w.append(&row("a")).unwrap();

    assert_eq!(w.get_ref().attempts, 4);
    assert_eq!(
        sleeper.sleeps(),
        vec![
            Duration::from_millis(500),
            Duration::from_secs(1),
            Duration::from_secs(2)
        ]
    );
    assert_eq!(sleeper.total(), Duration::from_millis(3500));
    assert_eq!(w.rows(), 1);
    assert_eq!(w.retries(), 3);
    assert_eq!(String::from_utf8(w.into_inner().data).unwrap(), "a,txt,0.00,0.00,a.txt,\n");
}

#[test]
fn test_contention_never_clears_gives_up_after_six_attempts() {
    let (mut w, sleeper) = writer(usize::MAX, ErrorKind::PermissionDenied);
    let err = w.append(&row("a")).unwrap_err();

    assert!(matches!(err, CatalogError::WriteContention { attempts: 6 }));
    assert!(err.is_fatal_for_partition());
    assert_eq!(w.get_ref().attempts, 6);
    // No sleep after the last attempt.
    assert_eq!(sleeper.sleeps().len(), 5);
    assert_eq!(sleeper.total(), Duration::from_millis(500 + 1000 + 2000 + 4000 + 8000));
    assert_eq!(w.rows(), 0);
}

#[test]
fn test_other_io_errors_are_not_retried() {
    let (mut w, sleeper) = writer(1, ErrorKind::StorageFull);
    let err = w.append(&row("a")).unwrap_err();

    assert!(matches!(err, CatalogError::SinkIo(_)));
    assert!(err.is_fatal_for_partition());
    assert_eq!(w.get_ref().attempts, 1);
    assert!(sleeper.sleeps().is_empty());
}

#[test]
fn test_contention_after_partial_write_resumes_without_duplicating() {
    let sleeper = Arc::new(RecordingSleeper::new());
    let dyn_sleeper: Arc<dyn Sleeper> = sleeper.clone();
    let script = vec![Ok(4), Err(ErrorKind::PermissionDenied), Ok(3)];
    let mut w = RecordWriter::new(ScriptedWriter::new(script), dyn_sleeper);
    w.append(&row("report")).unwrap();

    assert_eq!(w.get_ref().writes, 4);
    assert_eq!(sleeper.sleeps(), vec![Duration::from_millis(500)]);
    assert_eq!(
        String::from_utf8(w.into_inner().data).unwrap(),
        "report,txt,0.00,0.00,report.txt,\n"
    );
}

#[test]
fn test_locked_flush_is_retried() {
    let sleeper = Arc::new(RecordingSleeper::new());
    let dyn_sleeper: Arc<dyn Sleeper> = sleeper.clone();
    let inner = ScriptedWriter::new(Vec::new()).with_flush_failures(2);
    let mut w = RecordWriter::new(inner, dyn_sleeper);
    w.append(&row("a")).unwrap();
    w.flush().unwrap();

    assert_eq!(w.get_ref().flushes, 3);
    assert_eq!(sleeper.sleeps().len(), 2);
    assert_eq!(w.retries(), 2);
}

#[test]
fn test_fields_are_quoted_when_needed() {
    let (mut w, _) = writer(0, ErrorKind::PermissionDenied);
    w.append(&["a, b".to_string(), "say \"hi\"".to_string()]).unwrap();
    assert_eq!(
        String::from_utf8(w.into_inner().data).unwrap(),
        "\"a, b\",\"say \"\"hi\"\"\"\n"
    );
}

#[test]
fn test_create_sink_writes_header_then_appends() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("catalog_p.csv");
    let sleeper: Arc<dyn Sleeper> = Arc::new(RecordingSleeper::new());

    let mut sink = create_sink(&path, true, true, Arc::clone(&sleeper)).unwrap();
    let mut first = row("a");
    first.push("p".into());
    sink.append(&first).unwrap();
    sink.sync().unwrap();
    assert_eq!(sink.rows(), 1);
    drop(sink);

    let mut sink = create_sink(&path, false, true, Arc::clone(&sleeper)).unwrap();
    let mut second = row("b");
    second.push("p".into());
    sink.append(&second).unwrap();
    sink.sync().unwrap();
    drop(sink);

    let rows = read_rows(&path);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0][0], "file_name");
    assert_eq!(rows[0][6], "top_level_dir");
    assert_eq!(rows[1][0], "a");
    assert_eq!(rows[2][0], "b");

    // Truncating starts over with just the header.
    drop(create_sink(&path, true, true, sleeper).unwrap());
    assert_eq!(read_rows(&path).len(), 1);
}
