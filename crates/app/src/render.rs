use cosmos_search_core::{ExecutionResult, PaperRow};
use std::time::Duration;

const ABSTRACT_WIDTH: usize = 80;

pub fn format_seconds(elapsed: Duration) -> String {
    format!("{:.4} seconds", elapsed.as_secs_f64())
}

pub fn report(result: &ExecutionResult) -> String {
    let embedding_time = result
        .embedding_time
        .map(format_seconds)
        .unwrap_or_else(|| "n/a".to_string());

    let mut lines = vec![
        format!("Executed query: {}", result.executed_query),
        format!("Index: {}", result.index),
        format!("Found {} listings.", result.rows.len()),
        format!("Embedding generation time: {embedding_time}"),
        format!("Query time: {}", format_seconds(result.query_time)),
        format!("RU consumed: {}", result.request_charge),
    ];
    if !result.rows.is_empty() {
        lines.push(table(&result.rows));
    }
    lines.join("\n") + "\n"
}

fn table(rows: &[PaperRow]) -> String {
    let with_score = rows.iter().any(|row| row.similarity_score.is_some());
    let mut header = vec!["id", "title", "abstract"];
    if with_score {
        header.push("SimilarityScore");
    }

    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let mut cells = vec![
                row.id.clone(),
                row.title.clone(),
                truncate(&row.abstract_text, ABSTRACT_WIDTH),
            ];
            if with_score {
                cells.push(
                    row.similarity_score
                        .map(|score| format!("{score:.4}"))
                        .unwrap_or_default(),
                );
            }
            cells
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|name| name.chars().count()).collect();
    for cells in &body {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut lines = vec![
        format_row(header.iter().map(|name| name.to_string()), &widths),
        format_row(widths.iter().map(|width| "-".repeat(*width)), &widths),
    ];
    lines.extend(body.into_iter().map(|cells| format_row(cells.into_iter(), &widths)));
    lines.join("\n")
}

fn format_row(cells: impl Iterator<Item = String>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ")
        .trim_end()
        .to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let kept: String = single_line.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmos_search_core::{IndexSelection, SearchMode};

    fn result(rows: Vec<PaperRow>, embedding_time: Option<Duration>) -> ExecutionResult {
        ExecutionResult {
            executed_query: "SELECT TOP 10 l.id FROM l".to_string(),
            mode: SearchMode::Vector,
            index: IndexSelection::QuantizedFlat,
            rows,
            embedding_time,
            query_time: Duration::from_millis(1_250),
            request_charge: 4.21,
        }
    }

    #[test]
    fn seconds_use_four_decimals() {
        assert_eq!(format_seconds(Duration::from_micros(123_456)), "0.1235 seconds");
    }

    #[test]
    fn report_lists_metrics_and_rows() {
        let rows = vec![PaperRow {
            id: "7".to_string(),
            title: "Wormholes".to_string(),
            abstract_text: "Traversable\nwormholes.".to_string(),
            similarity_score: Some(0.8123),
        }];
        let text = report(&result(rows, Some(Duration::from_millis(300))));

        assert!(text.contains("Executed query: SELECT TOP 10 l.id FROM l\n"));
        assert!(text.contains("Index: QFLAT & Full Text Search Index\n"));
        assert!(text.contains("Found 1 listings.\n"));
        assert!(text.contains("Embedding generation time: 0.3000 seconds\n"));
        assert!(text.contains("Query time: 1.2500 seconds\n"));
        assert!(text.contains("RU consumed: 4.21\n"));
        assert!(text.contains("7  | Wormholes | Traversable wormholes. | 0.8123"));
    }

    #[test]
    fn keyword_results_have_no_score_column() {
        let rows = vec![PaperRow {
            id: "1".to_string(),
            title: "t".to_string(),
            abstract_text: "a".to_string(),
            similarity_score: None,
        }];
        let text = report(&result(rows, None));
        assert!(text.contains("Embedding generation time: n/a\n"));
        assert!(!text.contains("SimilarityScore"));
    }

    #[test]
    fn long_abstracts_are_truncated() {
        let truncated = truncate(&"x".repeat(200), 10);
        assert_eq!(truncated, "xxxxxxx...");
    }
}
