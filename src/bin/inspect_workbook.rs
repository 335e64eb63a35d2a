use clap::Parser;
use lansia_report_service::editor::DraftEditor;
use lansia_report_service::ingest::parse_workbook;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "inspect-workbook")]
#[command(about = "Parse a local record workbook and print the detected structure", long_about = None)]
struct Cli {
    /// Path to the xlsx/xls/csv file to inspect
    file: PathBuf,

    /// Print every canonical column, not just the first few
    #[arg(long)]
    all_columns: bool,

    /// Print per-cell validation issues
    #[arg(long)]
    issues: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let bytes = fs::read(&cli.file)?;
    let file_name = cli
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook.xlsx".to_string());

    let draft = parse_workbook(&file_name, &bytes)?;
    println!("File: {} ({} bytes)", draft.file_name, bytes.len());
    println!("Usable worksheets: {}", draft.worksheets.len());

    for (i, ws) in draft.worksheets.iter().enumerate() {
        println!("\n{}", "=".repeat(80));
        println!(
            "Worksheet {}: {} (sheet '{}')",
            i + 1,
            ws.worksheet_name,
            ws.source_sheet_name
        );
        if let Some(kabupaten) = &ws.kabupaten {
            println!("  Kabupaten:   {}", kabupaten);
        }
        if let Some(puskesmas) = &ws.puskesmas {
            println!("  Puskesmas:   {}", puskesmas);
        }
        if let Some(bulan_tahun) = &ws.bulan_tahun {
            println!("  Bulan/Tahun: {}", bulan_tahun);
        }
        println!(
            "  Header rows {}-{}, {} columns, {} data rows",
            ws.header_block.start_row + 1,
            ws.header_block.end_row + 1,
            ws.columns.len(),
            ws.rows.len()
        );

        let shown = if cli.all_columns {
            ws.columns.len()
        } else {
            ws.columns.len().min(12)
        };
        for column in &ws.columns[..shown] {
            println!(
                "    col {:3}  {:24}  {}",
                column.index + 1,
                column.key,
                column.label
            );
        }
        if shown < ws.columns.len() {
            println!(
                "    ... {} more (use --all-columns)",
                ws.columns.len() - shown
            );
        }

        let editor = DraftEditor::new(ws.columns.clone(), ws.rows.clone());
        let report = editor.validate();
        println!(
            "  Validation: {} rows, {} valid, {} error",
            report.summary.total, report.summary.valid, report.summary.error
        );
        if cli.issues {
            for issue in &report.issues {
                println!(
                    "    row {:4}  {:16}  {}",
                    issue.row_id, issue.key, issue.message
                );
            }
        }
    }

    Ok(())
}
