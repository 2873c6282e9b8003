use tempfile::NamedTempFile;

use tagpack::Error;
use tagpack::Key;
use tagpack::Result;
use tagpack::Value;

use crate::ByteOrder;
use crate::DumpOptions;
use crate::TagFile;

fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (Key::from(k), v)).collect())
}

// ============================================================================
//  SCOPE STACK
// ============================================================================

#[test]
fn test_incremental_scopes_close_in_order() -> Result<()> {
    let tmp = NamedTempFile::new()?;
    {
        let f = TagFile::create(tmp.path())?;
        f.set("name", &Value::from("demo"))?;
        let metrics = f.set_map("metrics")?;
        f.set_in(metrics, "count", &Value::from(3i64))?;
        let samples = f.set_list_in(metrics, "samples")?;
        f.add_to(samples, &Value::from(1i64))?;
        f.add_to(samples, &Value::from(2i64))?;
        assert_eq!(f.last(), Some(samples));
        // A root-level write closes samples, then metrics.
        f.set("done", &Value::Bool(true))?;
        assert!(matches!(
            f.add_to(samples, &Value::from(9i64)),
            Err(Error::ScopeClosed)
        ));
        f.close()?;
    }
    let f = TagFile::open(tmp.path())?;
    let value = f.read()?.expect("root value");
    assert_eq!(
        value,
        map(vec![
            ("name", Value::from("demo")),
            (
                "metrics",
                map(vec![
                    ("count", Value::from(3i64)),
                    ("samples", Value::List(vec![Value::from(1i64), Value::from(2i64)])),
                ])
            ),
            ("done", Value::Bool(true)),
        ])
    );
    Ok(())
}

#[test]
fn test_writing_to_ancestor_closes_descendants() -> Result<()> {
    let tmp = NamedTempFile::new()?;
    {
        let f = TagFile::create(tmp.path())?;
        let outer = f.add_list()?;
        let inner = f.add_list_to(outer)?;
        f.add_to(inner, &Value::from(1i64))?;
        // Targeting the outer scope closes the inner one first.
        f.add_to(outer, &Value::from(2i64))?;
        assert!(matches!(f.add_to(inner, &Value::from(3i64)), Err(Error::ScopeClosed)));
        f.close()?;
    }
    let f = TagFile::open(tmp.path())?;
    assert_eq!(
        f.read()?.unwrap(),
        Value::List(vec![Value::List(vec![
            Value::List(vec![Value::from(1i64)]),
            Value::from(2i64),
        ])])
    );
    Ok(())
}

#[test]
fn test_wrong_container_kind() -> Result<()> {
    let tmp = NamedTempFile::new()?;
    let f = TagFile::create(tmp.path())?;
    let scope = f.set_map("nested")?;
    assert!(matches!(
        f.add_to(scope, &Value::from(1i64)),
        Err(Error::WrongContainerKind)
    ));
    // Root kind was fixed as a map by the first operation.
    assert!(matches!(f.add(&Value::from(1i64)), Err(Error::WrongContainerKind)));
    Ok(())
}

#[test]
fn test_unclosed_scopes_balanced_at_close() -> Result<()> {
    let tmp = NamedTempFile::new()?;
    {
        let f = TagFile::create(tmp.path())?;
        let a = f.add_list()?;
        let b = f.add_list_to(a)?;
        f.add_to(b, &Value::from(7i64))?;
        // Dropping the handle closes b, a, then the root.
    }
    let f = TagFile::open(tmp.path())?;
    assert_eq!(
        f.read()?.unwrap(),
        Value::List(vec![Value::List(vec![Value::List(vec![Value::from(7i64)])])])
    );
    Ok(())
}

// ============================================================================
//  HANDLE LIFECYCLE
// ============================================================================

#[test]
fn test_read_only_handles_refuse_writes() -> Result<()> {
    let tmp = NamedTempFile::new()?;
    {
        let f = TagFile::create(tmp.path())?;
        f.write(&Value::from(1i64))?;
    }
    let f = TagFile::open(tmp.path())?;
    assert!(matches!(f.write(&Value::from(2i64)), Err(Error::ReadOnly)));
    assert!(matches!(f.set("k", &Value::Null), Err(Error::ReadOnly)));
    Ok(())
}

#[test]
fn test_closed_handle_fails_with_reopened() -> Result<()> {
    let tmp = NamedTempFile::new()?;
    {
        let f = TagFile::create(tmp.path())?;
        f.write(&map(vec![("a", Value::from(1i64))]))?;
    }
    let f = TagFile::open(tmp.path())?;
    let nav = f.root()?.expect("root");
    f.close()?;
    assert!(matches!(f.read(), Err(Error::Reopened)));
    assert!(matches!(nav.materialize(), Err(Error::Reopened)));
    // close is idempotent
    f.close()?;
    Ok(())
}

#[test]
fn test_empty_file_reads_as_no_value() -> Result<()> {
    let tmp = NamedTempFile::new()?;
    {
        TagFile::create(tmp.path())?.close()?;
    }
    let f = TagFile::open(tmp.path())?;
    assert!(f.read()?.is_none());
    assert!(f.root()?.is_none());
    Ok(())
}

// ============================================================================
//  DEBUG DUMP
// ============================================================================

#[test]
fn test_debug_dump_layout() -> Result<()> {
    let tmp = NamedTempFile::new()?;
    {
        let f = TagFile::create_with(tmp.path(), ByteOrder::Little)?;
        f.write(&map(vec![
            ("a", Value::from(42i64)),
            ("text", Value::from("hi")),
        ]))?;
    }
    let f = TagFile::open(tmp.path())?;
    let lines = f.debug_dump(DumpOptions::default())?;
    assert_eq!(
        lines,
        vec![
            "*j: d2 04".to_string(),
            "{".to_string(),
            "  1s: \"a\"".to_string(),
            "  I: 2a".to_string(),
            "  4s: \"text\"".to_string(),
            "  2s: \"hi\"".to_string(),
            "}".to_string(),
        ]
    );
    Ok(())
}

#[test]
fn test_debug_dump_truncates_binary() -> Result<()> {
    let tmp = NamedTempFile::new()?;
    {
        let f = TagFile::create_with(tmp.path(), ByteOrder::Little)?;
        f.write(&Value::Bytes(vec![0xAB; 20]))?;
    }
    let f = TagFile::open(tmp.path())?;
    let lines = f.debug_dump(DumpOptions { indent: 2, max_depth: 10, max_bytes: 4 })?;
    assert_eq!(lines[1], "M(20)x: ab ab ab ab ... (20 bytes total)");

    // The dump does not disturb subsequent reads.
    assert_eq!(f.read()?.unwrap(), Value::Bytes(vec![0xAB; 20]));
    Ok(())
}
