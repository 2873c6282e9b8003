use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::NamedTempFile;

use tagfile::AxisSel;
use tagfile::ByteOrder;
use tagfile::Item;
use tagfile::TagFile;
use tagfile::{Array, Error, Key, Value};

fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (Key::from(k), v)).collect())
}

fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn arange_i32(n: i32) -> Vec<i32> {
    (0..n).collect()
}

fn write_file(value: &Value) -> anyhow::Result<NamedTempFile> {
    write_file_with(value, ByteOrder::Auto)
}

fn write_file_with(value: &Value, order: ByteOrder) -> anyhow::Result<NamedTempFile> {
    let tmp = NamedTempFile::new()?;
    let f = TagFile::create_with(tmp.path(), order)?;
    f.write(value)?;
    f.close()?;
    Ok(tmp)
}

// --- Scenario S1: minimal primitives ---

#[test]
fn s1_minimal_primitives() -> anyhow::Result<()> {
    trace_init();
    let value = map(vec![
        ("integer", Value::from(42i64)),
        ("float", Value::from(3.14159265359)),
        ("large_int", Value::from(9_223_372_036_854_775_807i64)),
        ("none_value", Value::Null),
        ("bytes", Value::Bytes(b"Binary data".to_vec())),
    ]);
    let tmp = write_file(&value)?;

    let f = TagFile::open(tmp.path())?;
    assert_eq!(f.get("integer")?.into_value()?, Value::from(42i64));
    assert_eq!(f.get("float")?.into_value()?, Value::from(3.14159265359));
    assert_eq!(
        f.get("large_int")?.into_value()?,
        Value::from(9_223_372_036_854_775_807i64)
    );
    assert_eq!(f.get("none_value")?.into_value()?, Value::Null);
    assert_eq!(
        f.get("bytes")?.into_value()?,
        Value::Bytes(b"Binary data".to_vec())
    );
    assert_eq!(f.read()?.unwrap(), value);

    // Narrowest-tag selection is visible in the raw bytes.
    let bytes = std::fs::read(tmp.path())?;
    assert!(bytes.windows(2).any(|w| w == [b'I', 42]));
    let mut large = vec![b'L'];
    if cfg!(target_endian = "little") {
        large.extend_from_slice(&9_223_372_036_854_775_807u64.to_le_bytes());
    } else {
        large.extend_from_slice(&9_223_372_036_854_775_807u64.to_be_bytes());
    }
    assert!(bytes.windows(9).any(|w| w == large.as_slice()));
    Ok(())
}

// --- Scenario S2: deep map ---

#[test]
fn s2_deep_map() -> anyhow::Result<()> {
    let mut value = map(vec![("value", Value::from(42i64))]);
    for _ in 0..10 {
        value = map(vec![("level", value)]);
    }
    let tmp = write_file(&value)?;

    let f = TagFile::open(tmp.path())?;
    assert_eq!(f.len()?, 1);
    let mut nav = f.root()?.expect("root");
    for _ in 0..10 {
        nav = nav.get("level")?.node()?;
    }
    assert_eq!(nav.get("value")?.into_value()?, Value::from(42i64));
    Ok(())
}

// --- Scenario S3: slicing a list ---

#[test]
fn s3_list_slicing() -> anyhow::Result<()> {
    let value = map(vec![(
        "list",
        Value::List((0..10).map(|i| Value::from(i as i64)).collect()),
    )]);
    let tmp = write_file(&value)?;

    let f = TagFile::open(tmp.path())?;
    let list = f.get("list")?.node()?;
    let ints = |v: Vec<Value>| -> Vec<i128> {
        v.into_iter()
            .map(|v| match v {
                Value::Int(i) => i,
                other => panic!("expected int, got {:?}", other),
            })
            .collect()
    };
    assert_eq!(ints(list.range(Some(2), Some(5), None)?), vec![2, 3, 4]);
    assert_eq!(ints(list.range(None, None, Some(2))?), vec![0, 2, 4, 6, 8]);
    assert_eq!(ints(list.range(Some(1), Some(8), Some(3))?), vec![1, 4, 7]);
    assert_eq!(list.len()?, 10);
    Ok(())
}

// --- Scenario S4: 4-D array random access ---

#[test]
fn s4_four_dimensional_access() -> anyhow::Result<()> {
    let data = arange_i32(360);
    let a = Array::from_i32(&data, &[3, 4, 5, 6])?;
    let tmp = write_file(&map(vec![("A", Value::Array(a))]))?;

    let f = TagFile::open(tmp.path())?;
    let nav = f.get("A")?.node()?;

    // A[1,2] -> 5x6 block
    let out = nav.select(&[AxisSel::at(1), AxisSel::at(2)])?;
    assert_eq!(out.shape(), &[5, 6]);
    let base = 1 * 120 + 2 * 30;
    assert_eq!(out.as_i32()?, ((base)..(base + 30)).collect::<Vec<_>>());

    // A[1:,2,3] -> 2x6
    let out = nav.select(&[AxisSel::span(1, None), AxisSel::at(2), AxisSel::at(3)])?;
    assert_eq!(out.shape(), &[2, 6]);
    let expected: Vec<i32> = (0..2)
        .flat_map(|a| (0..6).map(move |d| (a + 1) * 120 + 2 * 30 + 3 * 6 + d))
        .collect();
    assert_eq!(out.as_i32()?, expected);

    // A[0,0,0,::2] -> [0,2,4]
    let out = nav.select(&[
        AxisSel::at(0),
        AxisSel::at(0),
        AxisSel::at(0),
        AxisSel::span_step(None, None, 2),
    ])?;
    assert_eq!(out.shape(), &[3]);
    assert_eq!(out.as_i32()?, vec![0, 2, 4]);

    // A[0,[0,2],1] -> 2x6 gather
    let out = nav.select(&[AxisSel::at(0), AxisSel::pick(vec![0, 2]), AxisSel::at(1)])?;
    assert_eq!(out.shape(), &[2, 6]);
    let expected: Vec<i32> = [0, 2]
        .iter()
        .flat_map(|&b| (0..6).map(move |d| b * 30 + 6 + d))
        .collect();
    assert_eq!(out.as_i32()?, expected);

    // A[0:2,1:3,2:4,1:5:2] has shape (2,2,2,2)
    let out = nav.select(&[
        AxisSel::span(0, 2),
        AxisSel::span(1, 3),
        AxisSel::span(2, 4),
        AxisSel::span_step(1, 5, 2),
    ])?;
    assert_eq!(out.shape(), &[2, 2, 2, 2]);
    let mut expected = Vec::new();
    for a in 0..2 {
        for b in 1..3 {
            for c in 2..4 {
                for d in [1, 3] {
                    expected.push(a * 120 + b * 30 + c * 6 + d);
                }
            }
        }
    }
    assert_eq!(out.as_i32()?, expected);
    Ok(())
}

// --- Scenario S5: in-place edits ---

#[test]
fn s5_in_place_edits() -> anyhow::Result<()> {
    let value = map(vec![
        ("A1", Value::Array(Array::from_i32(&arange_i32(10), &[10])?)),
        (
            "A2",
            Value::Array(Array::from_f32(
                &(0..12).map(|i| i as f32).collect::<Vec<_>>(),
                &[3, 4],
            )?),
        ),
        (
            "A3",
            Value::Array(Array::from_i16(
                &(0..24).collect::<Vec<i16>>(),
                &[2, 3, 4],
            )?),
        ),
    ]);
    let tmp = write_file(&value)?;

    {
        let f = TagFile::open_rw(tmp.path())?;
        let a1 = f.get("A1")?.node()?;
        a1.assign(
            &[AxisSel::pick(vec![0, 2, 5, 8])],
            &Value::Array(Array::from_i32(&[100, 101, 102, 103], &[4])?),
        )?;
        a1.assign(&[AxisSel::pick(vec![1, 3, 7, 9])], &Value::from(55i64))?;
        let a3 = f.get("A3")?.node()?;
        a3.assign(
            &[AxisSel::at(0), AxisSel::at(-1), AxisSel::span(1, -1)],
            &Value::Array(Array::from_i16(&[500, 501], &[2])?),
        )?;
        f.close()?;
    }

    let f = TagFile::open(tmp.path())?;
    let a1 = f.get("A1")?.node()?;
    assert_eq!(
        a1.select(&[AxisSel::pick(vec![0, 2, 5, 8])])?.as_i32()?,
        vec![100, 101, 102, 103]
    );
    assert_eq!(
        a1.select(&[AxisSel::pick(vec![1, 3, 7, 9])])?.as_i32()?,
        vec![55, 55, 55, 55]
    );
    assert_eq!(
        a1.select(&[])?.as_i32()?,
        vec![100, 55, 101, 55, 4, 102, 6, 55, 103, 55]
    );

    // A2 was never touched.
    let a2 = f.get("A2")?.node()?.materialize()?;
    assert_eq!(
        a2.as_array().unwrap().as_f32()?,
        (0..12).map(|i| i as f32).collect::<Vec<_>>()
    );

    let a3 = f.get("A3")?.node()?;
    let mut expected: Vec<i16> = (0..24).collect();
    expected[2 * 4 + 1] = 500; // [0, 2, 1]
    expected[2 * 4 + 2] = 501; // [0, 2, 2]
    assert_eq!(a3.select(&[])?.as_i16()?, expected);
    Ok(())
}

// --- Scenario S6: byte-order interoperability ---

#[test]
fn s6_byte_order_interoperability() -> anyhow::Result<()> {
    let value = map(vec![
        ("x", Value::from(123_456_789i64)),
        ("y", Value::from(3.14159265359)),
        ("a", Value::Array(Array::from_f64(&[1.0, 2.0, 3.0], &[3])?)),
    ]);
    for order in [ByteOrder::Little, ByteOrder::Big] {
        let tmp = write_file_with(&value, order)?;
        let f = TagFile::open(tmp.path())?; // byte_order = auto
        assert_eq!(f.read()?.unwrap(), value);
        assert_eq!(
            f.get("a")?.node()?.select(&[])?.as_f64()?,
            vec![1.0, 2.0, 3.0]
        );
    }
    Ok(())
}

// --- Navigator equivalences and stability ---

#[test]
fn navigator_reads_leave_file_unchanged() -> anyhow::Result<()> {
    let value = map(vec![
        ("k1", Value::from(1i64)),
        ("k2", Value::List(vec![Value::from(2i64), Value::from("x")])),
        ("k3", Value::Array(Array::from_i32(&arange_i32(6), &[2, 3])?)),
    ]);
    let tmp = write_file(&value)?;
    let f = TagFile::open(tmp.path())?;

    assert_eq!(f.keys()?, vec![Key::from("k1"), Key::from("k2"), Key::from("k3")]);
    assert_eq!(f.len()?, 3);
    let list = f.get("k2")?.node()?;
    assert_eq!(list.len()?, 2);
    let collected: Result<Vec<_>, _> = list.iter()?.collect();
    assert_eq!(
        collected?,
        vec![Value::from(2i64), Value::from("x")]
    );
    let _ = f.get("k3")?.node()?.select(&[AxisSel::at(1)])?;

    // After arbitrary navigation, a full read still matches.
    assert_eq!(f.read()?.unwrap(), value);
    Ok(())
}

#[test]
fn byte_order_mark_is_an_ordinary_footnote() -> anyhow::Result<()> {
    let tmp = write_file_with(&Value::from(5i64), ByteOrder::Little)?;
    let f = TagFile::open_with(tmp.path(), ByteOrder::Little)?;
    let root = f.root()?.expect("root");
    let notes = root.footnotes()?;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].materialize()?, Value::from(1234i64));
    Ok(())
}

#[test]
fn list_items_by_index_and_iteration() -> anyhow::Result<()> {
    let items: Vec<Value> = vec![
        Value::Null,
        Value::from(7i64),
        Value::from("mid"),
        Value::List(vec![Value::from(1i64)]),
        Value::Bool(false),
    ];
    let tmp = write_file(&Value::List(items.clone()))?;
    let f = TagFile::open(tmp.path())?;
    let root = f.root()?.expect("root");

    for (i, expected) in items.iter().enumerate() {
        assert_eq!(&root.at(i)?.into_value()?, expected);
    }
    assert!(matches!(
        root.at(5),
        Err(Error::IndexOutOfRange { index: 5, .. })
    ));
    let collected: Result<Vec<_>, _> = root.iter()?.collect();
    assert_eq!(collected?, items);
    Ok(())
}

#[test]
fn proxy_versus_value_policy() -> anyhow::Result<()> {
    let value = map(vec![
        ("scalar", Value::from(1i64)),
        ("text", Value::from("abc")),
        ("blob", Value::Bytes(vec![1, 2, 3])),
        ("vec", Value::Array(Array::from_i32(&[1, 2, 3], &[3])?)),
        ("nested", Value::List(vec![])),
    ]);
    let tmp = write_file(&value)?;
    let f = TagFile::open(tmp.path())?;

    assert!(matches!(f.get("scalar")?, Item::Value(Value::Int(1))));
    assert!(matches!(f.get("text")?, Item::Value(Value::Str(_))));
    assert!(matches!(f.get("blob")?, Item::Value(Value::Bytes(_))));
    // Numeric arrays come back as navigators even at rank 1.
    let vec_nav = f.get("vec")?.node()?;
    assert_eq!(format!("{:?}", vec_nav), "<Nav type='int32' shape=[3]>");
    assert!(matches!(f.get("nested")?, Item::Node(_)));

    assert!(matches!(f.get("missing"), Err(Error::KeyNotFound(_))));
    Ok(())
}

// --- Assignment failure modes ---

#[test]
fn assignment_checks_shape_dtype_and_mode() -> anyhow::Result<()> {
    let value = map(vec![(
        "A",
        Value::Array(Array::from_i32(&arange_i32(12), &[3, 4])?),
    )]);
    let tmp = write_file(&value)?;

    {
        let f = TagFile::open(tmp.path())?;
        let nav = f.get("A")?.node()?;
        assert!(matches!(
            nav.assign(&[AxisSel::at(0)], &Value::from(1i64)),
            Err(Error::ReadOnly)
        ));
    }

    let f = TagFile::open_rw(tmp.path())?;
    let nav = f.get("A")?.node()?;
    assert!(matches!(
        nav.assign(
            &[AxisSel::at(0)],
            &Value::Array(Array::from_i32(&[1, 2], &[2])?)
        ),
        Err(Error::ShapeMismatch { .. })
    ));
    assert!(matches!(
        nav.assign(
            &[AxisSel::at(0)],
            &Value::Array(Array::from_f64(&[1.0, 2.0, 3.0, 4.0], &[4])?)
        ),
        Err(Error::DtypeMismatch { .. })
    ));
    assert!(matches!(
        nav.select(&[AxisSel::at(7)]),
        Err(Error::IndexOutOfRange { .. })
    ));

    // An empty selection assigns nothing and succeeds.
    nav.assign(
        &[AxisSel::span(1, 1)],
        &Value::Array(Array::from_i32(&[], &[0, 4])?),
    )?;
    assert_eq!(nav.select(&[])?.as_i32()?, arange_i32(12));
    Ok(())
}

#[test]
fn bool_array_assignment() -> anyhow::Result<()> {
    let value = map(vec![(
        "mask",
        Value::Array(Array::from_bool(&[false; 6], &[6])?),
    )]);
    let tmp = write_file(&value)?;
    let f = TagFile::open_rw(tmp.path())?;
    let nav = f.get("mask")?.node()?;
    nav.assign(&[AxisSel::span_step(None, None, 2)], &Value::Bool(true))?;
    assert_eq!(
        nav.select(&[])?.as_bool()?,
        vec![true, false, true, false, true, false]
    );
    Ok(())
}

// --- Coalescing equivalence (randomized) ---

fn wrap(i: i64, dim: usize) -> usize {
    if i < 0 { (i + dim as i64) as usize } else { i as usize }
}

/// Independent per-element implementation of the selection semantics.
fn naive_select(
    values: &[i32],
    shape: &[usize],
    sels: &[AxisSel],
) -> (Vec<i32>, Vec<usize>) {
    let mut axes: Vec<Vec<usize>> = Vec::new();
    let mut result_shape = Vec::new();
    for (i, sel) in sels.iter().enumerate() {
        let dim = shape[i];
        match sel {
            AxisSel::At(v) => axes.push(vec![wrap(*v, dim)]),
            AxisSel::Span { start, stop, step } => {
                let step = step.unwrap_or(1);
                let n = dim as i64;
                let clamp = |b: Option<i64>, on_none: i64| match b {
                    None => on_none,
                    Some(mut v) => {
                        if v < 0 {
                            v += n;
                            if v < 0 {
                                v = if step > 0 { 0 } else { -1 };
                            }
                        } else if v >= n {
                            v = if step > 0 { n } else { n - 1 };
                        }
                        v
                    }
                };
                let lo = clamp(*start, if step > 0 { 0 } else { n - 1 });
                let hi = clamp(*stop, if step > 0 { n } else { -1 });
                let mut seq = Vec::new();
                let mut k = lo;
                while if step > 0 { k < hi } else { k > hi } {
                    seq.push(k as usize);
                    k += step;
                }
                result_shape.push(seq.len());
                axes.push(seq);
            }
            AxisSel::Pick(list) => {
                let seq: Vec<usize> = list.iter().map(|&p| wrap(p, dim)).collect();
                result_shape.push(seq.len());
                axes.push(seq);
            }
        }
    }
    for i in sels.len()..shape.len() {
        axes.push((0..shape[i]).collect());
        result_shape.push(shape[i]);
    }

    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }

    let mut out = Vec::new();
    let mut pos = vec![0usize; axes.len()];
    'outer: loop {
        if axes.iter().any(|a| a.is_empty()) {
            break;
        }
        let flat: usize = pos
            .iter()
            .enumerate()
            .map(|(i, &p)| axes[i][p] * strides[i])
            .sum();
        out.push(values[flat]);
        let mut axis = axes.len();
        loop {
            if axis == 0 {
                break 'outer;
            }
            axis -= 1;
            pos[axis] += 1;
            if pos[axis] < axes[axis].len() {
                break;
            }
            pos[axis] = 0;
        }
    }
    (out, result_shape)
}

#[test]
fn coalescing_matches_naive_plan() -> anyhow::Result<()> {
    trace_init();
    let mut rng = StdRng::seed_from_u64(0x7461_6766);
    for _ in 0..40 {
        let rank = rng.gen_range(1..=4);
        let shape: Vec<usize> = (0..rank).map(|_| rng.gen_range(1..=5)).collect();
        let count: usize = shape.iter().product();
        let values = arange_i32(count as i32);

        let tmp = write_file(&map(vec![(
            "A",
            Value::Array(Array::from_i32(&values, &shape)?),
        )]))?;
        let f = TagFile::open(tmp.path())?;
        let nav = f.get("A")?.node()?;

        let n_sels = rng.gen_range(0..=rank);
        let mut sels = Vec::new();
        for axis in 0..n_sels {
            let dim = shape[axis] as i64;
            sels.push(match rng.gen_range(0..3) {
                0 => AxisSel::at(rng.gen_range(-dim..dim)),
                1 => {
                    let a = rng.gen_range(-dim - 1..=dim + 1);
                    let b = rng.gen_range(-dim - 1..=dim + 1);
                    let step = *[1, 1, 2, 3].get(rng.gen_range(0..4)).unwrap();
                    AxisSel::span_step(Some(a), Some(b), step)
                }
                _ => {
                    let picks = (0..rng.gen_range(0..=3))
                        .map(|_| rng.gen_range(-dim..dim))
                        .collect::<Vec<_>>();
                    AxisSel::pick(picks)
                }
            });
        }

        let (expected, expected_shape) = naive_select(&values, &shape, &sels);
        let got = nav.select(&sels)?;
        assert_eq!(got.shape(), expected_shape.as_slice(), "sels {:?} shape {:?}", sels, shape);
        assert_eq!(got.as_i32()?, expected, "sels {:?} shape {:?}", sels, shape);
    }
    Ok(())
}
