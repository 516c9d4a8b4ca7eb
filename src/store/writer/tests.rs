use super::*;
use crate::store::element::ComponentRecord;
use crate::store::format::{FROZEN_FLAG, FROZEN_OFFSET, HEADER_SIZE, NOT_FROZEN_FLAG, STORE_MAGIC};
use crate::store::reader::StoreReader;
use std::fs::File;
use std::io::Read;
use tempfile::NamedTempFile;

fn read_header(path: &Path) -> StoreResult<[u8; HEADER_SIZE]> {
    let mut file = File::open(path)?;
    let mut header = [0u8; HEADER_SIZE];
    file.read_exact(&mut header)?;
    Ok(header)
}

#[test]
fn test_write_empty_container() -> StoreResult<()> {
    let temp = NamedTempFile::new()?;
    let path = temp.path();

    let writer = StoreWriter::create(path)?;
    writer.close()?;

    let header = read_header(path)?;
    assert_eq!(&header[0..5], STORE_MAGIC);
    assert_eq!(header[FROZEN_OFFSET], FROZEN_FLAG);

    let reader = StoreReader::open(path)?;
    assert_eq!(reader.root().num_children(), 0);
    Ok(())
}

#[test]
fn test_unclosed_container_is_rejected() -> StoreResult<()> {
    let temp = NamedTempFile::new()?;
    let path = temp.path();

    let mut writer = StoreWriter::create(path)?;
    let root = writer.root();
    writer.write_array(root, "values", &[1.0f64, 2.0])?;
    drop(writer);

    assert_eq!(read_header(path)?[FROZEN_OFFSET], NOT_FROZEN_FLAG);
    assert!(matches!(
        StoreReader::open(path),
        Err(StoreError::NotFinalized(_))
    ));
    Ok(())
}

#[test]
fn test_groups_scalars_and_arrays() -> StoreResult<()> {
    let temp = NamedTempFile::new()?;
    let path = temp.path();

    let mut writer = StoreWriter::create(path)?;
    let root = writer.root();
    writer.write_scalar(root, "rate", 1000.0)?;
    writer.write_scalar(root, "kind", "continuous-delay")?;
    let links = writer.create_group(root, "links")?;
    let a = writer.create_group(links, "a")?;
    writer.write_array(a, "delays", &[1e-6f64, 2e-6, 3e-6])?;
    writer.write_array(a, "names", &["los".to_string(), "ground".to_string()])?;

    assert_eq!(writer.group_path(a), "/links/a");
    assert!(matches!(
        writer.create_group(links, "a"),
        Err(StoreError::AlreadyExists(_))
    ));
    assert!(matches!(
        writer.write_scalar(root, "rate", 2.0),
        Err(StoreError::AlreadyExists(_))
    ));
    writer.close()?;

    let reader = StoreReader::open(path)?;
    assert_eq!(reader.root().scalar::<f64>("rate")?, 1000.0);
    assert_eq!(reader.root().scalar::<String>("kind")?, "continuous-delay");
    assert!(matches!(
        reader.root().scalar::<u64>("rate"),
        Err(StoreError::TypeMismatch { .. })
    ));

    let group = reader.group("/links/a")?;
    assert_eq!(group.child_names().collect::<Vec<_>>(), vec!["delays", "names"]);
    assert_eq!(reader.array("/links/a/delays")?.read_all::<f64>()?, vec![1e-6, 2e-6, 3e-6]);
    assert_eq!(group.array("names")?.read_all::<String>()?, vec!["los", "ground"]);
    assert!(matches!(
        group.array("delays")?.read_all::<u64>(),
        Err(StoreError::TypeMismatch { .. })
    ));
    assert!(matches!(reader.group("/links/b"), Err(StoreError::NotFound(_))));
    Ok(())
}

#[test]
fn test_growable_matrix_by_columns() -> StoreResult<()> {
    let temp = NamedTempFile::new()?;
    let path = temp.path();

    let mut writer = StoreWriter::create_with_options(path, StoreOptions { compression_level: 6 })?;
    let root = writer.root();
    let matrix = writer.create_array::<f64>(root, "m", ArraySpec::growable(&[3, 0], &[1]))?;

    for col in 0..5u64 {
        writer.extend_array(matrix, &[3, col + 1])?;
        let column: Vec<f64> = (0..3).map(|r| (r * 10 + col) as f64).collect();
        writer.write_slice(matrix, &[0, col], &[3, 1], &column)?;
    }
    assert_eq!(writer.shape(matrix), &[3, 5]);
    assert!(matches!(
        writer.write_slice(matrix, &[0, 5], &[3, 1], &[0.0; 3]),
        Err(StoreError::OutOfBounds { .. })
    ));
    assert!(writer.extend_array(matrix, &[4, 5]).is_err());
    writer.close()?;

    let reader = StoreReader::open(path)?;
    let array = reader.array("/m")?;
    assert_eq!(array.shape(), &[3, 5]);
    assert_eq!(array.read_slice::<f64>(&[0, 2], &[3, 1])?, vec![2.0, 12.0, 22.0]);
    assert_eq!(array.read_slice::<f64>(&[1, 0], &[1, 5])?, vec![10.0, 11.0, 12.0, 13.0, 14.0]);
    Ok(())
}

#[test]
fn test_growable_vector_and_records() -> StoreResult<()> {
    let temp = NamedTempFile::new()?;
    let path = temp.path();

    let mut writer = StoreWriter::create(path)?;
    let root = writer.root();
    let refs = writer.create_array::<f64>(root, "refs", ArraySpec::growable(&[0], &[0]))?;
    for i in 0..2500u64 {
        writer.extend_array(refs, &[i + 1])?;
        writer.write_slice(refs, &[i], &[1], &[i as f64 * 0.5])?;
    }
    let records = vec![
        ComponentRecord { kind: 0, id: 1, delay: 1e-7, real: 1.0, imag: 0.0 },
        ComponentRecord { kind: 3, id: 2, delay: 2e-7, real: 0.5, imag: -0.5 },
    ];
    writer.write_array(root, "cir", &records)?;
    writer.close()?;

    let reader = StoreReader::open_opts(path, false)?;
    let values = reader.array("/refs")?.read_all::<f64>()?;
    assert_eq!(values.len(), 2500);
    assert_eq!(values[2499], 1249.5);
    assert_eq!(reader.array("/cir")?.read_all::<ComponentRecord>()?, records);
    Ok(())
}

#[test]
fn test_unwritten_chunks_read_as_zero() -> StoreResult<()> {
    let temp = NamedTempFile::new()?;
    let path = temp.path();

    let mut writer = StoreWriter::create(path)?;
    let root = writer.root();
    let arr = writer.create_array::<u64>(root, "sparse", ArraySpec::fixed(&[8]).with_chunk(&[2]))?;
    writer.write_slice(arr, &[6], &[2], &[7u64, 8])?;
    writer.close()?;

    let reader = StoreReader::open(path)?;
    assert_eq!(
        reader.array("/sparse")?.read_all::<u64>()?,
        vec![0, 0, 0, 0, 0, 0, 7, 8]
    );
    Ok(())
}

#[test]
fn test_variable_size_arrays_must_be_fixed() -> StoreResult<()> {
    let temp = NamedTempFile::new()?;
    let mut writer = StoreWriter::create(temp.path())?;
    let root = writer.root();
    let result = writer.create_array::<String>(root, "names", ArraySpec::growable(&[0], &[0]));
    assert!(matches!(result, Err(StoreError::ShapeMismatch { .. })));

    writer.create_array::<String>(root, "partial", ArraySpec::fixed(&[2]))?;
    assert!(writer.close().is_err());
    Ok(())
}

#[test]
fn test_complete_chunks_reach_file_before_close() -> StoreResult<()> {
    let temp = NamedTempFile::new()?;
    let path = temp.path();

    let mut writer = StoreWriter::create(path)?;
    let root = writer.root();
    let matrix = writer.create_array::<f64>(root, "m", ArraySpec::growable(&[3, 0], &[1]))?;
    let refs = writer.create_array::<f64>(root, "refs", ArraySpec::growable(&[0], &[0]))?;

    // one raw block per column: size, flag byte, three values
    let column_block = 8 + 1 + 3 * 8;
    for col in 0..10u64 {
        writer.extend_array(matrix, &[3, col + 1])?;
        writer.write_slice(matrix, &[0, col], &[3, 1], &[col as f64; 3])?;
        writer.extend_array(refs, &[col + 1])?;
        writer.write_slice(refs, &[col], &[1], &[col as f64])?;
        assert_eq!(writer.bytes_written(), (HEADER_SIZE + (col as usize + 1) * column_block) as u64);
    }
    writer.flush()?;
    assert_eq!(std::fs::metadata(path)?.len(), writer.bytes_written());
    assert_eq!(read_header(path)?[FROZEN_OFFSET], NOT_FROZEN_FLAG);

    // rewriting a column that is already in the file appends a new block
    writer.write_slice(matrix, &[1, 4], &[1, 1], &[-1.0])?;
    assert_eq!(
        writer.bytes_written(),
        (HEADER_SIZE + 11 * column_block) as u64
    );
    writer.close()?;

    let reader = StoreReader::open(path)?;
    let m = reader.array("/m")?;
    assert_eq!(m.shape(), &[3, 10]);
    assert_eq!(m.read_slice::<f64>(&[0, 4], &[3, 1])?, vec![4.0, -1.0, 4.0]);
    assert_eq!(m.read_slice::<f64>(&[2, 0], &[1, 10])?, (0..10).map(|c| c as f64).collect::<Vec<_>>());
    // the partial vector chunk is written at close
    assert_eq!(reader.array("/refs")?.read_all::<f64>()?[9], 9.0);
    Ok(())
}

#[test]
fn test_group_with_data_child_is_corrupt() -> StoreResult<()> {
    let temp = NamedTempFile::new()?;
    let path = temp.path();

    let mut sink = super::sink::BlockSink::create(path)?;
    let header = sink.data(&[NODE_GROUP, 1, 0, 0, 0, 0, 0, 0, 0])?;
    let stray = sink.data(b"not a node")?;
    let root = sink.group(&[make_data_offset(header), make_data_offset(stray)])?;
    sink.finish(root)?;

    assert!(matches!(StoreReader::open(path), Err(StoreError::Corrupt(_))));
    Ok(())
}
