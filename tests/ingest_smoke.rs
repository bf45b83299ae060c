use csv_survey::{CsvFormat, CsvReader, CsvStat, DataType, ReaderOptions, SourceMeta};
use std::{fs::File, io::Write, path::PathBuf, process::Command};
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn parses_gzip_and_counts_rows() -> anyhow::Result<()> {
    // Create small CSV
    let dir = tempfile::tempdir()?;
    let csv_path = dir.path().join("tiny.csv");
    let mut f = File::create(&csv_path)?;
    writeln!(f, "sku,col1")?;
    for i in 0..100_000 {
        writeln!(f, "SKU{i:06},{i}")?;
    }

    // gzip it (use system gzip for speed)
    let gz_path: PathBuf = dir.path().join("tiny.csv.gz");
    let status = Command::new("bash")
        .arg("-lc")
        .arg(format!(
            "gzip -c {} > {}",
            csv_path.display(),
            gz_path.display()
        ))
        .status()?;
    assert!(status.success());

    // Small chunks so rows straddle chunk boundaries.
    let options = ReaderOptions::default().chunk_size(4096);
    let mut reader = CsvReader::open_path(&gz_path, CsvFormat::guess(), options).await?;
    assert_eq!(vec!["sku", "col1"], reader.col_names());
    assert_eq!(0, reader.col_pos("sku")?);

    let stat = CsvStat::from_reader(&mut reader).await?;
    let info = reader.file_info();
    assert_eq!(Some(100_000), info.row_count);
    assert_eq!("tiny.csv.gz", info.source);

    let summary = stat.summary().expect("finalized");
    assert_eq!(100_000, summary.rows);
    let col1 = summary.column("col1").expect("col1");
    assert_eq!(DataType::Integer, col1.dominant_type);
    assert_eq!(Some(0.0), col1.min);
    assert_eq!(Some(99_999.0), col1.max);
    assert!((col1.mean.unwrap() - 49_999.5).abs() < 1e-6);
    assert_eq!(
        DataType::String,
        summary.column("sku").expect("sku").dominant_type
    );
    Ok(())
}

#[tokio::test]
async fn parses_zstd() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("data.csv.zst");

    let file = tokio::fs::File::create(&path).await?;
    let mut encoder = async_compression::tokio::write::ZstdEncoder::new(file);
    encoder.write_all(b"id;name\n1;\"a;b\"\n2;c\n").await?;
    encoder.shutdown().await?;

    let mut reader =
        CsvReader::open_path(&path, CsvFormat::guess(), ReaderOptions::default()).await?;
    assert_eq!(b';', reader.format().delimiter);
    let rows = reader.read_all().await?;
    assert_eq!(2, rows.len());
    assert_eq!(Some("a;b"), rows[0].get_by_name("name")?);
    Ok(())
}

#[tokio::test]
async fn transcodes_declared_charset() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("latin1.csv");
    std::fs::write(&path, b"city,temp\nM\xfcnchen,12\nK\xf8benhavn,9\n")?;

    let options = ReaderOptions::default()
        .meta(SourceMeta::default().with_charset(encoding_rs::WINDOWS_1252));
    let mut reader = CsvReader::open_path(&path, CsvFormat::default(), options).await?;
    let rows = reader.read_all().await?;
    assert_eq!("München", &rows[0][0]);
    assert_eq!("København", &rows[1][0]);
    assert_eq!("windows-1252", reader.file_info().encoding);
    Ok(())
}

#[tokio::test]
async fn missing_file_is_io_error() {
    let err = CsvReader::open_path(
        "/definitely/not/here.csv",
        CsvFormat::default(),
        ReaderOptions::default(),
    )
    .await
    .err()
    .expect("open should fail");
    assert!(matches!(err, csv_survey::CsvError::Io(_)));
}
