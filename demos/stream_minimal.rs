use csv_survey::{CsvFormat, CsvReader, CsvStat, ReaderOptions};
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = Path::new("./data/sample.csv.gz");
    let mut reader =
        CsvReader::open_path(path, CsvFormat::guess(), ReaderOptions::default()).await?;

    let sku = reader.col_pos("sku")?;
    let mut stat = CsvStat::new(reader.col_names().to_vec());

    while let Some(row) = reader.next_row().await? {
        let _sku = row.get(sku).unwrap_or("");
        stat.fold(&row)?;
    }

    let info = reader.file_info();
    println!("rows={:?} columns={:?}", info.row_count, info.col_names);
    for column in &stat.finalize().columns {
        println!("{} {} mean={:?}", column.name, column.dominant_type, column.mean);
    }
    Ok(())
}
