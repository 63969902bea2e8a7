//! Single-stage commands: OCR a file, detect structure in text.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use console::style;

use super::context::{load_rules, read_structure};
use crate::config::Settings;
use crate::models::{ContentBuffer, OcrOptions};
use crate::narrative::{NarrativeExtractor, RegexNerBackend};
use crate::ocr::OcrEngine;
use crate::parsing::{StructureDetector, TableParser};

pub async fn cmd_ocr(
    settings: &Settings,
    file: &Path,
    pages: Option<String>,
    language: Option<String>,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let buffer = ContentBuffer::from_file(bytes, file);
    let engine = OcrEngine::from_config(&settings.ocr);
    if !engine.has_vision() && !engine.has_fallback() {
        eprintln!(
            "{} No OCR backend available (set GOOGLE_VISION_API_KEY or install tesseract)",
            style("!").yellow()
        );
    }

    let result = engine.ocr(&buffer, &OcrOptions { pages, language }).await;
    eprintln!(
        "{} {} via {} at {:.2} ({} page(s))",
        style("→").cyan(),
        buffer.mime(),
        result.service.as_str(),
        result.confidence,
        result.page_count
    );
    for page in &result.pages {
        eprintln!(
            "  page {:>3}: {} at {:.2}, {} chars",
            page.page,
            page.service.as_str(),
            page.confidence,
            page.text.chars().count()
        );
    }
    if let Some(error) = &result.error {
        eprintln!("{} {}", style("!").yellow(), error);
    }
    println!("{}", result.text);
    Ok(())
}

pub async fn cmd_detect(
    settings: &Settings,
    file: &Path,
    structure: Option<&Path>,
    show_rows: bool,
) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let hint = match structure {
        Some(path) => read_structure(path).await?,
        None => Default::default(),
    };
    let rules = load_rules(settings).await?;
    let declared = hint.ordered_columns();

    let detection = StructureDetector::new(rules.clone()).detect(&text, &declared, hint.layout);
    let s = &detection.structure;
    println!(
        "{} {} (confidence {:.2}), {} ink lines",
        style("✓").green(),
        s.kind.as_str(),
        s.confidence,
        detection.lines.len()
    );
    if !s.column_positions.is_empty() {
        println!("  column starts: {:?}", s.column_positions);
    }
    if !show_rows {
        return Ok(());
    }

    if s.is_tabular() {
        let parsed = TableParser::new(rules).parse(&detection.lines, &declared, s);
        let headers: Vec<String> = parsed.columns.iter().map(|c| c.header()).collect();
        println!("\n{}", style(headers.join(" | ")).bold());
        for row in &parsed.rows {
            let values: Vec<&str> = row.columns.iter().map(|c| c.value.as_str()).collect();
            println!("{:>4}  {}  ({:.2})", row.row_index, values.join(" | "), row.confidence);
        }
        for (class, count) in parsed.malformed_classes() {
            println!("  {} {} malformed: {}", style("!").yellow(), count, class);
        }
    } else {
        let result = NarrativeExtractor::new(rules)
            .with_ner(Arc::new(RegexNerBackend::new()))
            .extract(&text, &[]);
        for person in result
            .slaveholders
            .iter()
            .chain(&result.enslaved)
            .chain(&result.other_entities)
        {
            println!(
                "  {:<12} {:<30} {:.2}",
                person.role.as_str(),
                person.name,
                person.confidence
            );
        }
        println!(
            "  {} transactions, {} relationships, confidence {:.2}",
            result.transactions.len(),
            result.relationships.len(),
            result.confidence
        );
    }
    Ok(())
}
