//! Table formatting for command output using comfy-table.

use comfy_table::{Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::clustering::{ClusterMatch, ClusterStats, ClusterSummary};
use crate::documents::IngestStats;
use crate::retrieval::SearchHit;

/// Builder for creating styled tables.
pub struct TableBuilder {
    table: Table,
}

impl TableBuilder {
    /// Create a new table builder with default styling.
    pub fn new() -> Self {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Add a row of prepared cells.
    pub fn add_cells(mut self, row: Vec<Cell>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorten `text` to `max` characters on a single line.
pub fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

/// One row per cluster: size, keywords and representative documents.
pub fn create_cluster_table(summaries: &[ClusterSummary]) -> String {
    let mut builder =
        TableBuilder::new().set_headers(vec!["Cluster", "Size", "Keywords", "Representative documents"]);

    for summary in summaries {
        let docs = summary
            .representative_docs
            .iter()
            .map(|d| format!("{} ({})", d.filename, d.count))
            .collect::<Vec<_>>()
            .join(", ");
        builder = builder.add_cells(vec![
            Cell::new(summary.cluster_id).fg(Color::Cyan),
            Cell::new(summary.size),
            Cell::new(summary.keywords.join(", ")),
            Cell::new(docs),
        ]);
    }

    builder.build()
}

/// Result-level statistics followed by the size of every cluster.
pub fn create_stats_table(stats: &ClusterStats) -> String {
    let mut builder = TableBuilder::new()
        .set_headers(vec!["Metric", "Value"])
        .add_row(vec!["Points".to_string(), stats.total_points.to_string()])
        .add_row(vec!["Clusters".to_string(), stats.n_clusters.to_string()])
        .add_row(vec!["Algorithm".to_string(), stats.algorithm.to_string()])
        .add_row(vec!["Reduction".to_string(), stats.reduction_method.to_string()])
        .add_row(vec!["Level".to_string(), stats.level.to_string()]);

    for (label, size) in &stats.cluster_sizes {
        builder = builder.add_row(vec![format!("Cluster {label}"), size.to_string()]);
    }

    if stats.noise_points > 0 {
        builder = builder.add_cells(vec![
            Cell::new("Noise").fg(Color::Yellow),
            Cell::new(stats.noise_points).fg(Color::Yellow),
        ]);
    }

    builder.build()
}

/// Ranked search hits with a short content preview.
pub fn create_hits_table(hits: &[SearchHit]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec!["#", "Score", "File", "Content"]);

    for (i, hit) in hits.iter().enumerate() {
        builder = builder.add_cells(vec![
            Cell::new(i + 1),
            Cell::new(format!("{:.3}", hit.score)).fg(Color::Green),
            Cell::new(&hit.filename),
            Cell::new(preview(&hit.chunk_content, 80)),
        ]);
    }

    builder.build()
}

/// Records returned by a cluster search.
pub fn create_matches_table(matches: &[ClusterMatch]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec!["Document", "File", "Content"]);

    for found in matches {
        let (document_id, filename, content) = match found {
            ClusterMatch::Point(point) => (
                point.meta.document_id,
                &point.meta.filename,
                point.meta.chunk_content.as_deref().or(point.meta.description.as_deref()),
            ),
            ClusterMatch::Document(doc) => (
                doc.document_id,
                &doc.filename,
                doc.chunk_content.as_deref().or(doc.description.as_deref()),
            ),
        };
        builder = builder.add_row(vec![
            document_id.to_string(),
            filename.clone(),
            preview(content.unwrap_or_default(), 80),
        ]);
    }

    builder.build()
}

/// Summary of an ingest run.
pub fn create_ingest_table(stats: &IngestStats) -> String {
    let failed = if stats.files_failed > 0 {
        Cell::new(stats.files_failed).fg(Color::Red)
    } else {
        Cell::new(stats.files_failed)
    };

    TableBuilder::new()
        .set_headers(vec!["Metric", "Value"])
        .add_row(vec!["Files indexed".to_string(), stats.files_indexed.to_string()])
        .add_row(vec!["Files skipped".to_string(), stats.files_skipped.to_string()])
        .add_cells(vec![Cell::new("Files failed"), failed])
        .add_row(vec!["Chunks stored".to_string(), stats.chunks_indexed.to_string()])
        .add_row(vec![
            "Elapsed".to_string(),
            format!("{:.2}s", stats.elapsed.as_secs_f64()),
        ])
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::{Algorithm, ClusterLabel, Granularity, ReductionMethod, RepresentativeDoc};
    use crate::documents::DocumentId;
    use std::collections::BTreeMap;

    #[test]
    fn test_preview_flattens_and_truncates() {
        assert_eq!(preview("a\n\nb   c", 20), "a b c");
        assert_eq!(preview("abcdefghij", 6), "abc...");
        assert_eq!(preview("", 6), "");
    }

    #[test]
    fn test_cluster_table_lists_keywords_and_docs() {
        let summary = ClusterSummary {
            cluster_id: ClusterLabel::new(2),
            size: 4,
            representative_docs: vec![RepresentativeDoc {
                document_id: DocumentId::new(7).unwrap(),
                filename: "notes.md".to_string(),
                description: None,
                count: 3,
            }],
            keywords: vec!["invoice".to_string(), "payment".to_string()],
            centroid: vec![0.0; 4],
        };
        let table = create_cluster_table(&[summary]);
        assert!(table.contains("invoice, payment"));
        assert!(table.contains("notes.md (3)"));
    }

    #[test]
    fn test_stats_table_shows_noise_only_when_present() {
        let mut stats = ClusterStats {
            total_points: 5,
            n_clusters: 1,
            algorithm: Algorithm::Hdbscan,
            reduction_method: ReductionMethod::Umap,
            level: Granularity::Chunk,
            cluster_sizes: BTreeMap::from([(ClusterLabel::new(0), 5)]),
            noise_points: 0,
        };
        assert!(!create_stats_table(&stats).contains("Noise"));

        stats.noise_points = 2;
        let table = create_stats_table(&stats);
        assert!(table.contains("Noise"));
        assert!(table.contains("hdbscan"));
    }
}
