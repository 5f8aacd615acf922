use anyhow::Result;
use cascade_core::QueryContext;

use super::render::{format_result, format_stats};
use crate::app::{self, AppConfig};

pub async fn run(config: &AppConfig, queries: Vec<String>, conversation: Option<String>) -> Result<()> {
    let engine = app::build_engine(config)?;
    let context = match conversation {
        Some(id) => QueryContext::new().with_conversation(id),
        None => QueryContext::new(),
    };

    for query in queries {
        let result = engine.submit(query, context.clone()).await;
        println!("{}", format_result(&result));
    }

    for result in engine.drain().await {
        println!("{}", format_result(&result));
    }

    engine.close();
    println!();
    print!("{}", format_stats(&engine.stats()));
    Ok(())
}
