use csv_survey::{
    csv_data_types, get_col_pos, get_file_info, CsvError, CsvFormat, CsvReader, CsvStat, DataType,
    LineTerminator, ReaderOptions,
};
use std::io::Write;

fn write_fixture(
    dir: &tempfile::TempDir,
    name: &str,
    contents: &str,
) -> anyhow::Result<std::path::PathBuf> {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path)?;
    f.write_all(contents.as_bytes())?;
    Ok(path)
}

const MIXED: &str = "id;price;active;name;code\r\n\
                     1;9.5;true;apple;1\r\n\
                     2;10;false;\"pear; green\";true\r\n\
                     3;;true;fig;2\r\n";

#[tokio::test]
async fn file_info_after_full_read() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_fixture(&dir, "mixed.csv", MIXED)?;

    let info = get_file_info(&path).await?;
    assert_eq!("mixed.csv", info.source);
    assert_eq!(Some(3), info.row_count);
    assert_eq!(5, info.column_count);
    assert_eq!(vec!["id", "price", "active", "name", "code"], info.col_names);
    assert_eq!(b';', info.format.delimiter);
    assert_eq!(Some(0), info.format.header);
    assert_eq!(LineTerminator::CrLf, info.format.terminator);
    assert!(!info.bom);
    Ok(())
}

#[tokio::test]
async fn column_positions() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_fixture(&dir, "mixed.csv", MIXED)?;
    let format = CsvFormat::default().delimiter(b';');

    assert_eq!(3, get_col_pos(&path, "name", format.clone()).await?);
    assert!(matches!(
        get_col_pos(&path, "missing", format).await,
        Err(CsvError::ColumnNotFound(name)) if name == "missing"
    ));
    Ok(())
}

#[tokio::test]
async fn storage_types_by_column() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_fixture(&dir, "mixed.csv", MIXED)?;

    let types = csv_data_types(&path).await?;
    assert_eq!(Some(&DataType::Integer), types.get("id"));
    assert_eq!(Some(&DataType::Float), types.get("price"));
    assert_eq!(Some(&DataType::Boolean), types.get("active"));
    assert_eq!(Some(&DataType::String), types.get("name"));
    // Booleans mixed with numbers only fit in text.
    assert_eq!(Some(&DataType::String), types.get("code"));
    Ok(())
}

#[tokio::test]
async fn empty_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_fixture(&dir, "empty.csv", "")?;

    let info = get_file_info(&path).await?;
    assert_eq!(Some(0), info.row_count);
    assert_eq!(0, info.column_count);
    assert!(csv_data_types(&path).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn early_stop_leaves_row_count_unknown() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut contents = String::from("n,square\n");
    for i in 0..10_000u64 {
        contents.push_str(&format!("{i},{}\n", i * i));
    }
    let path = write_fixture(&dir, "squares.csv", &contents)?;

    let options = ReaderOptions::default().chunk_size(1024);
    let mut reader = CsvReader::open_path(&path, CsvFormat::guess(), options).await?;
    for _ in 0..3 {
        assert!(reader.next_row().await?.is_some());
    }
    assert_eq!(None, reader.file_info().row_count);
    drop(reader);

    assert_eq!(Some(10_000), get_file_info(&path).await?.row_count);
    Ok(())
}

#[tokio::test]
async fn guessed_scenario_with_stats() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_fixture(&dir, "abc.csv", "a,b,c\n1,2,3\n4,5,\"x,y\"\n")?;

    let mut reader =
        CsvReader::open_path(&path, CsvFormat::guess(), ReaderOptions::default()).await?;
    assert_eq!(vec!["a", "b", "c"], reader.col_names());
    assert_eq!(1, reader.col_pos("b")?);

    let mut stat = CsvStat::from_reader(&mut reader).await?;
    let summary = stat.finalize().clone();
    assert_eq!(2, summary.rows);

    let a = summary.column("a").expect("column a");
    assert_eq!(DataType::Integer, a.dominant_type);
    assert_eq!(Some(2.5), a.mean);

    let c = summary.column("c").expect("column c");
    assert_eq!(Some(&1), c.types.get(&DataType::String));
    assert_eq!(Some(&1), c.types.get(&DataType::Integer));
    // Tie between integer and string goes to integer.
    assert_eq!(DataType::Integer, c.dominant_type);
    assert_eq!(Some(3.0), c.max);

    let json = serde_json::to_value(&summary)?;
    assert_eq!("integer", json["columns"][0]["dominant_type"]);
    Ok(())
}
