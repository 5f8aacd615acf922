//! Terminal output for results and statistics

use cascade_core::{format_query_error, ExecutionResult, StatsSnapshot};

/// Render one result as terminal text
pub fn format_result(result: &ExecutionResult) -> String {
    let indent = "  ".repeat(result.depth as usize);
    let label = if result.depth == 0 {
        result.text.clone()
    } else {
        format!("↳ {}", result.text)
    };

    match (&result.response, &result.error) {
        (Some(response), _) => {
            let source = if result.served_from_cache {
                " [cached]".to_string()
            } else if result.attempts > 1 {
                format!(" [{} attempts]", result.attempts)
            } else {
                String::new()
            };
            format!("{indent}✅ {label}{source}\n{indent}   {}", response.content)
        }
        (None, Some(error)) => {
            let message = format_query_error(error).replace('\n', &format!("\n{indent}   "));
            format!("{indent}❌ {label}\n{indent}   {message}")
        }
        (None, None) => format!("{indent}❔ {label}"),
    }
}

/// Render the statistics counters
pub fn format_stats(stats: &StatsSnapshot) -> String {
    let rows = [
        ("Submitted", stats.submitted),
        ("Cache hits", stats.cache_hits),
        ("Cache misses", stats.cache_misses),
        ("Transport calls", stats.transport_calls),
        ("Retries", stats.retries),
        ("Succeeded", stats.succeeded),
        ("Failed", stats.failed),
        ("Follow-ups", stats.recursive_expansions),
        ("Depth rejections", stats.depth_rejections),
        ("Budget rejections", stats.expansion_limit_hits),
        ("Cancelled", stats.cancelled),
    ];

    let mut output = String::from("📊 Statistics\n");
    for (name, value) in rows {
        output.push_str(&format!("   {name:<18} {value}\n"));
    }
    output.push_str(&format!(
        "   {:<18} {:.1}%\n",
        "Cache hit rate",
        stats.cache_hit_rate() * 100.0
    ));
    output
}
