// ai
//! 📊 The run summary: a table so comfy it has lumbar support.

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_BORDERS_ONLY};
use fdx::RunReport;

/// 🍽️ Two columns: what we counted, how many. Outcome on top.
pub fn render(report: &RunReport) -> String {
    let stats = &report.stats;
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("fdx run"), Cell::new(report.outcome.to_string())]);

    let rows: [(&str, u64); 7] = [
        ("records read", stats.records_read),
        ("records transformed", stats.records_transformed),
        ("records skipped", stats.records_skipped),
        ("records shipped", stats.records_shipped),
        ("bulk requests", stats.batches_sent),
        ("requests with rejections", stats.batches_with_rejections),
        ("documents rejected", stats.documents_rejected),
    ];
    for (label, value) in rows {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    table.to_string()
}
