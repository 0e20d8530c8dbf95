//! Excel生成（共通ライブラリ）
//!
//! バッチ積算結果を数量内訳書（BOQ）形式のExcelとしてバッファに生成する。
//! シート構成: Summary（KPI・種別別・条項別）/ BOQ（明細行）/ Warnings

use crate::pipeline::{BatchEntry, BatchOutcome};
use crate::summary::BatchSummary;
use crate::types::{CostBreakdown, LineKind, Warning};
use rust_xlsxwriter::*;

/// BOQシートの列見出し
pub const BOQ_HEADERS: &[&str] = &[
    "No.", "Intervention", "Chainage", "Clause", "Item", "Type", "Qty", "Unit", "Rate", "Amount",
];

const BOQ_COL_WIDTHS: &[f64] = &[6.0, 24.0, 12.0, 22.0, 44.0, 12.0, 10.0, 8.0, 12.0, 14.0];

struct Formats {
    header: Format,
    text: Format,
    number: Format,
    money: Format,
    total_label: Format,
    total_money: Format,
}

impl Formats {
    fn new() -> Self {
        let border = |f: Format| f.set_border(FormatBorder::Hair).set_border_color(Color::RGB(0xAAAAAA));
        Self {
            header: border(
                Format::new()
                    .set_bold()
                    .set_font_size(10.0)
                    .set_background_color(Color::RGB(0xF5F5F5))
                    .set_align(FormatAlign::Center)
                    .set_align(FormatAlign::VerticalCenter),
            ),
            text: border(Format::new().set_font_size(10.0).set_text_wrap()),
            number: border(Format::new().set_font_size(10.0).set_num_format("0.0000")),
            money: border(Format::new().set_font_size(10.0).set_num_format("#,##0.00")),
            total_label: border(Format::new().set_bold().set_font_size(10.0).set_align(FormatAlign::Right)),
            total_money: border(Format::new().set_bold().set_font_size(10.0).set_num_format("#,##0.00")),
        }
    }
}

/// 1対策分の明細（中断は None）
fn entry_view(entry: &BatchEntry) -> Option<(&str, Option<&str>, Option<&str>, &CostBreakdown, &[Warning])> {
    match entry {
        BatchEntry::Costed(c) => Some((
            c.intervention_type.as_str(),
            c.chainage.as_deref(),
            c.clause.as_deref(),
            &c.cost,
            c.warnings.as_slice(),
        )),
        BatchEntry::Failed(e) => Some((
            e.intervention_type.as_str(),
            e.chainage.as_deref(),
            e.clause.as_deref(),
            &e.cost,
            e.warnings.as_slice(),
        )),
        BatchEntry::Cancelled { .. } => None,
    }
}

/// BOQ Excelをバッファに生成
///
/// # Arguments
/// * `outcome` - バッチ積算結果
/// * `summary` - バッチ集計
/// * `generated_at` - 出力日時の表示文字列
pub fn generate_boq_buffer(
    outcome: &BatchOutcome,
    summary: &BatchSummary,
    generated_at: &str,
) -> Result<Vec<u8>, String> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();

    write_summary_sheet(workbook.add_worksheet(), &formats, outcome, summary, generated_at)?;
    write_boq_sheet(workbook.add_worksheet(), &formats, outcome)?;
    write_warning_sheet(workbook.add_worksheet(), &formats, outcome)?;

    workbook.save_to_buffer()
        .map_err(|e| format!("Excel保存エラー: {}", e))
}

fn write_summary_sheet(
    sheet: &mut Worksheet,
    formats: &Formats,
    outcome: &BatchOutcome,
    summary: &BatchSummary,
    generated_at: &str,
) -> Result<(), String> {
    sheet.set_name("Summary")
        .map_err(|e| format!("シート名設定エラー: {}", e))?;
    sheet.set_column_width(0, 32.0)
        .map_err(|e| format!("列幅設定エラー: {}", e))?;
    sheet.set_column_width(1, 14.0)
        .map_err(|e| format!("列幅設定エラー: {}", e))?;
    sheet.set_column_width(2, 16.0)
        .map_err(|e| format!("列幅設定エラー: {}", e))?;

    let kpis = &summary.kpis;
    let header_rows: [(&str, String); 6] = [
        ("Generated", generated_at.to_string()),
        ("Data fingerprint", outcome.fingerprint.clone()),
        ("Interventions", kpis.total_interventions.to_string()),
        ("Failed", kpis.failed_interventions.to_string()),
        ("Cancelled", kpis.cancelled_interventions.to_string()),
        ("Unique clauses", kpis.unique_clauses.to_string()),
    ];

    let mut row: u32 = 0;
    for (label, value) in header_rows.iter() {
        sheet.write_string_with_format(row, 0, *label, &formats.header)
            .map_err(|e| format!("ラベル書き込みエラー: {}", e))?;
        sheet.write_string_with_format(row, 1, value, &formats.text)
            .map_err(|e| format!("値書き込みエラー: {}", e))?;
        row += 1;
    }
    sheet.write_string_with_format(row, 0, "Grand total", &formats.total_label)
        .map_err(|e| format!("ラベル書き込みエラー: {}", e))?;
    sheet.write_number_with_format(row, 1, kpis.grand_total, &formats.total_money)
        .map_err(|e| format!("値書き込みエラー: {}", e))?;
    row += 2;

    let groups = [("By intervention type", &summary.by_type), ("By clause", &summary.by_clause)];
    for (title, group) in groups {
        for (col, text) in [title, "Count", "Total"].iter().enumerate() {
            sheet.write_string_with_format(row, col as u16, *text, &formats.header)
                .map_err(|e| format!("見出し書き込みエラー: {}", e))?;
        }
        row += 1;
        for (key, total) in group.iter() {
            sheet.write_string_with_format(row, 0, key, &formats.text)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;
            sheet.write_number_with_format(row, 1, total.count as f64, &formats.text)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;
            sheet.write_number_with_format(row, 2, total.total_cost, &formats.money)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;
            row += 1;
        }
        row += 1;
    }

    Ok(())
}

fn write_boq_sheet(sheet: &mut Worksheet, formats: &Formats, outcome: &BatchOutcome) -> Result<(), String> {
    sheet.set_name("BOQ")
        .map_err(|e| format!("シート名設定エラー: {}", e))?;
    for (col, width) in BOQ_COL_WIDTHS.iter().enumerate() {
        sheet.set_column_width(col as u16, *width)
            .map_err(|e| format!("列幅設定エラー: {}", e))?;
    }
    for (col, header) in BOQ_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &formats.header)
            .map_err(|e| format!("見出し書き込みエラー: {}", e))?;
    }
    sheet.set_freeze_panes(1, 0)
        .map_err(|e| format!("固定表示設定エラー: {}", e))?;

    let mut row: u32 = 1;
    for (index, entry) in outcome.entries.iter().enumerate() {
        let Some((intervention_type, chainage, clause, cost, _)) = entry_view(entry) else {
            continue;
        };

        for item in &cost.items {
            let kind = match item.kind {
                LineKind::Material => "material",
                LineKind::Installation => "installation",
            };
            let texts = [
                (1u16, intervention_type),
                (2, chainage.unwrap_or("")),
                (3, clause.unwrap_or("")),
                (4, item.label.as_str()),
                (5, kind),
                (7, item.unit.as_deref().unwrap_or("")),
            ];
            sheet.write_number_with_format(row, 0, (index + 1) as f64, &formats.text)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;
            for (col, text) in texts {
                sheet.write_string_with_format(row, col, text, &formats.text)
                    .map_err(|e| format!("値書き込みエラー: {}", e))?;
            }
            sheet.write_number_with_format(row, 6, item.quantity, &formats.number)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;
            match item.rate {
                Some(rate) => sheet.write_number_with_format(row, 8, rate, &formats.money),
                None => sheet.write_string_with_format(row, 8, "-", &formats.text),
            }
            .map_err(|e| format!("値書き込みエラー: {}", e))?;
            sheet.write_number_with_format(row, 9, item.amount, &formats.money)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;
            row += 1;
        }

        sheet.write_string_with_format(row, 8, "Total", &formats.total_label)
            .map_err(|e| format!("値書き込みエラー: {}", e))?;
        sheet.write_number_with_format(row, 9, cost.total_cost, &formats.total_money)
            .map_err(|e| format!("値書き込みエラー: {}", e))?;
        row += 1;
    }

    Ok(())
}

fn write_warning_sheet(sheet: &mut Worksheet, formats: &Formats, outcome: &BatchOutcome) -> Result<(), String> {
    sheet.set_name("Warnings")
        .map_err(|e| format!("シート名設定エラー: {}", e))?;
    for (col, (header, width)) in [("No.", 6.0), ("Kind", 26.0), ("Subject", 30.0), ("Message", 60.0)]
        .iter()
        .enumerate()
    {
        sheet.set_column_width(col as u16, *width)
            .map_err(|e| format!("列幅設定エラー: {}", e))?;
        sheet.write_string_with_format(0, col as u16, *header, &formats.header)
            .map_err(|e| format!("見出し書き込みエラー: {}", e))?;
    }

    let mut row: u32 = 1;
    for (index, entry) in outcome.entries.iter().enumerate() {
        let Some((_, _, _, _, warnings)) = entry_view(entry) else {
            continue;
        };
        for warning in warnings {
            let kind = serde_json::to_value(warning.kind)
                .ok()
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .unwrap_or_default();
            sheet.write_number_with_format(row, 0, (index + 1) as f64, &formats.text)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;
            sheet.write_string_with_format(row, 1, &kind, &formats.text)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;
            sheet.write_string_with_format(row, 2, &warning.subject, &formats.text)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;
            sheet.write_string_with_format(row, 3, &warning.message, &formats.text)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;
            row += 1;
        }
    }

    Ok(())
}
