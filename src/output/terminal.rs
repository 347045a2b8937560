// Colored terminal output for vectorize summaries and centroid tables.

use colored::Colorize;

use super::truncate_chars;
use crate::cluster::centroids::TopicCentroid;
use crate::pipeline::vectorize::VectorizeReport;

/// Print the outcome of `kwmap vectorize`.
pub fn display_vectorize_report(report: &VectorizeReport) {
    println!("\n{}", "=== Vectorization complete ===".bold());
    for (field, dims) in &report.fields {
        println!("  {} {:<9} {} dimensions", "+".green(), field.to_string(), dims);
    }
    println!();
    println!("  {:<18} {}", "Rows:".dimmed(), report.rows);
    println!("  {:<18} {}", "Original columns:".dimmed(), report.original_columns);
    println!("  {:<18} {}", "Added columns:".dimmed(), report.added_columns);
    println!("  {:<18} {}", "Total columns:".dimmed(), report.total_columns);
    println!(
        "  {:<18} {}",
        "Output:".dimmed(),
        report.output.display().to_string().cyan()
    );
}

/// Print topic centroids, largest groups first.
pub fn display_centroids(centroids: &[TopicCentroid], keyword_count: usize) {
    if centroids.is_empty() {
        println!("No topics found.");
        return;
    }

    println!(
        "\n{}",
        format!(
            "=== {} topics across {} keywords ===",
            centroids.len(),
            keyword_count
        )
        .bold()
    );
    println!();
    println!(
        "  {:<32} {:>6}  {:>9}  {:>9}  {:>10}",
        "Topic".dimmed(),
        "Count".dimmed(),
        "X".dimmed(),
        "Y".dimmed(),
        "Dispersion".dimmed(),
    );
    println!("  {}", "-".repeat(72).dimmed());

    let mut sorted: Vec<&TopicCentroid> = centroids.iter().collect();
    sorted.sort_by(|a, b| b.count.cmp(&a.count));

    for c in sorted {
        let dispersion = format!("{:>10.3}", c.dispersion);
        let dispersion = if c.count == 1 {
            dispersion.dimmed()
        } else if c.dispersion > 2.0 {
            dispersion.yellow()
        } else {
            dispersion.normal()
        };
        println!(
            "  {:<32} {:>6}  {:>9.3}  {:>9.3}  {}",
            truncate_chars(&c.topic, 32),
            c.count,
            c.x,
            c.y,
            dispersion,
        );
    }
    println!();
}
