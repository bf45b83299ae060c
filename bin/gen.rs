use clap::{Arg, ArgAction, Command};
use csv_survey::{format_row, CsvFormat};
use std::io::{self, Write};

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("with_header")
                .long("with-header")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("cols")
                .long("cols")
                .value_parser(clap::value_parser!(usize))
                .default_value("5"),
        )
        .arg(Arg::new("delim").long("delim").default_value(","))
        .arg(
            Arg::new("quoted")
                .long("quoted")
                .help("Embed delimiters, quotes and line breaks in text columns")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let rows: u64 = *matches
        .get_one("rows")
        .ok_or_else(|| anyhow::anyhow!("--rows is required"))?;
    let with_header = matches.get_flag("with_header");
    let cols: usize = matches.get_one::<usize>("cols").copied().unwrap_or(5).max(1);
    let quoted = matches.get_flag("quoted");
    let delim = match matches.get_one::<String>("delim").map(String::as_str) {
        Some("\\t") | Some("tab") => b'\t',
        Some(d) if d.len() == 1 => d.as_bytes()[0],
        other => anyhow::bail!("delimiter must be a single byte, got {other:?}"),
    };
    let format = CsvFormat::default().delimiter(delim);
    format.validate()?;

    let mut out = io::BufWriter::new(io::stdout().lock());

    if with_header {
        let header: Vec<String> = (0..cols).map(column_name).collect();
        writeln!(&mut out, "{}", format_row(&header, &format))?;
    }

    // Deterministic data cycling through sku, integer, float, boolean and text.
    let mut fields = Vec::with_capacity(cols);
    for i in 0..rows {
        fields.clear();
        fields.extend((0..cols).map(|c| value(c, i, quoted)));
        writeln!(&mut out, "{}", format_row(&fields, &format))?;
        if i % 10_000 == 0 {
            out.flush()?;
        } // keep buffers moving on huge runs
    }

    out.flush()?;
    Ok(())
}

fn column_name(c: usize) -> String {
    match c % 5 {
        0 if c == 0 => "sku".to_string(),
        0 => format!("sku{c}"),
        1 => format!("qty{c}"),
        2 => format!("price{c}"),
        3 => format!("active{c}"),
        _ => format!("note{c}"),
    }
}

fn value(c: usize, i: u64, quoted: bool) -> String {
    match c % 5 {
        0 => format!("SKU{:010}", i),
        1 => ((i * 7 + c as u64) % 1000).to_string(),
        2 => format!("{:.2}", (i % 10_000) as f64 * 0.25 + c as f64),
        3 => (i % 3 == 0).to_string(),
        _ if quoted && i % 4 == 0 => format!("v{c}_{i}, \"quoted\"\nsecond line"),
        _ if quoted && i % 4 == 2 => format!("v{c}_{i};{i}|{c}"),
        _ => format!("v{c}_{i}"),
    }
}
