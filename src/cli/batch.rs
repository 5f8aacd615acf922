use std::path::Path;

use anyhow::{Context, Result};
use cascade_core::QueryContext;
use tracing::info;

use super::render::{format_result, format_stats};
use crate::app::{self, AppConfig};

/// Non-empty, trimmed lines; `#` starts a comment line
fn parse_queries(content: &str) -> Vec<&str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

pub async fn run(config: &AppConfig, file: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let queries = parse_queries(&content);
    if queries.is_empty() {
        println!("⚠️  No queries found in {}", file.display());
        return Ok(());
    }

    let engine = app::build_engine(config)?;
    for query in &queries {
        engine.enqueue(*query, QueryContext::new());
    }
    info!(count = queries.len(), file = %file.display(), "Batch enqueued");

    let results = engine.drain().await;
    let failed = results.iter().filter(|r| !r.success).count();
    for result in &results {
        println!("{}", format_result(result));
    }

    engine.close();
    println!();
    print!("{}", format_stats(&engine.stats()));

    if failed > 0 {
        println!("\n⚠️  {failed} of {} queries failed", results.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_queries_skips_blanks_and_comments() {
        let content = "sales report\n\n  # quarterly\n  top customers  \n";
        assert_eq!(parse_queries(content), vec!["sales report", "top customers"]);
    }
}
