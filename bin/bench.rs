use clap::{Arg, ArgAction, Command};
use crc32fast::Hasher as Crc32;
use csv_survey::{CsvError, CsvFormat, CsvReader, CsvStat, ReaderOptions};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("bench")
        .arg(
            Arg::new("path")
                .long("path")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("delimiter")
                .long("delimiter")
                .help("Field delimiter; guessed from the first chunk when omitted"),
        )
        .arg(
            Arg::new("no-header")
                .long("no-header")
                .help("Treat the first row as data")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .help("Report rows whose width differs from the header")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("chunk-size")
                .long("chunk-size")
                .help("Bytes pulled from the source per read")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("required")
                .long("required")
                .help("Column that must be present and non-empty in every row")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("verify")
                .long("verify")
                .help("CRC32 over all fields")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .help("Stop after N rows")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .help("Compute per-column statistics")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print statistics as JSON")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::WARN.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let path = matches
        .get_one::<PathBuf>("path")
        .ok_or_else(|| anyhow::anyhow!("Provide --path <file>"))?;

    let mut format = match matches.get_one::<String>("delimiter") {
        Some(d) => {
            let delimiter = match d.as_str() {
                "\\t" | "tab" => b'\t',
                d if d.len() == 1 => d.as_bytes()[0],
                d => anyhow::bail!("delimiter must be a single byte, got '{d}'"),
            };
            CsvFormat::default().delimiter(delimiter)
        }
        None => CsvFormat::guess(),
    };
    if matches.get_flag("no-header") {
        format = format.no_header();
    }
    format = format.strict(matches.get_flag("strict"));

    let mut options = ReaderOptions::default();
    if let Some(chunk_size) = matches.get_one::<usize>("chunk-size") {
        options = options.chunk_size(*chunk_size);
    }

    let start = Instant::now();
    let mut reader = CsvReader::open_path(path, format, options).await?;

    let required = matches
        .get_many::<String>("required")
        .into_iter()
        .flatten()
        .map(|name| reader.col_pos(name).map(|idx| (name.as_str(), idx)))
        .collect::<Result<Vec<_>, _>>()?;

    let limit = matches.get_one::<u64>("limit").copied();
    let verify = matches.get_flag("verify");
    let mut stat = matches
        .get_flag("stats")
        .then(|| CsvStat::new(reader.col_names().to_vec()));

    let mut crc = Crc32::new();
    let mut malformed = Vec::new();
    let mut row_count: u64 = 0;
    loop {
        let row = match reader.next_row().await {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(err @ CsvError::MalformedRow { .. }) => {
                malformed.push(err.to_string());
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        row_count += 1;

        for (name, idx) in &required {
            if matches!(row.get(*idx), None | Some("")) {
                anyhow::bail!("line {} missing required field '{}'", row.line(), name);
            }
        }
        if verify {
            // Fields separated by '\x1f' (unit separator).
            for (fi, field) in row.iter().enumerate() {
                if fi > 0 {
                    crc.update(&[0x1f]);
                }
                crc.update(field.as_bytes());
            }
        }
        if let Some(stat) = stat.as_mut() {
            stat.fold(&row)?;
        }
        if limit.is_some_and(|lim| row_count >= lim) {
            break;
        }
    }
    let elapsed = start.elapsed().as_secs_f64();
    let rps = (row_count as f64) / elapsed;

    let info = reader.file_info();
    let total = info
        .row_count
        .map_or_else(|| "unknown".to_string(), |n| n.to_string());
    println!(
        "source={} encoding={} delimiter={:?} header={:?} columns={:?}",
        info.source,
        info.encoding,
        info.format.delimiter as char,
        info.format.header,
        info.col_names
    );
    println!(
        "rows={} row_count={} skipped={} malformed={}",
        row_count, total, info.skipped_rows, info.malformed_rows
    );
    for line in malformed.iter().take(10) {
        println!("malformed: {line}");
    }
    if verify {
        println!("crc=0x{:08x}", crc.finalize());
    }
    println!("elapsed={:.1}s rows/sec={:.0}", elapsed, rps);

    if let Some(mut stat) = stat {
        let summary = stat.finalize();
        if matches.get_flag("json") {
            println!("{}", serde_json::to_string_pretty(summary)?);
        } else {
            for column in &summary.columns {
                println!(
                    "{:>20} type={:<8} storage={:<8} nulls={:<8} \
                     min={:?} max={:?} mean={:?} var={:?} distinct>={}",
                    column.name,
                    column.dominant_type,
                    column.storage_type(),
                    column.null_count,
                    column.min,
                    column.max,
                    column.mean,
                    column.variance,
                    column.frequencies.len()
                );
            }
        }
    }
    Ok(())
}
