use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::api::WikiReadApi;
use crate::graph::CategoryGraph;
use crate::i18n::{self, message};
use crate::title::CategoryTitle;

/// Outline of `root` and its subcategories, one `#`-prefixed line per node.
///
/// Nodes below `max_depth` are not opened; a `[...]` line marks the cut, so
/// cycles in the graph cannot keep the walk going.
pub fn render_tree<A: WikiReadApi>(
    graph: &mut CategoryGraph<A>,
    root: &CategoryTitle,
    max_depth: usize,
) -> Result<String> {
    let mut output = String::new();
    render_node(graph, root, 0, None, max_depth, &mut output)?;
    Ok(output)
}

fn render_node<A: WikiReadApi>(
    graph: &mut CategoryGraph<A>,
    category: &CategoryTitle,
    depth: usize,
    parent: Option<&CategoryTitle>,
    max_depth: usize,
    output: &mut String,
) -> Result<()> {
    let article_count = graph.contents(category)?.articles.len();
    output.push_str(&"#".repeat(depth));
    output.push_str(&category.link());
    output.push_str(&format!(" ({article_count})"));

    let others = graph
        .parents(category)?
        .into_iter()
        .filter(|other| Some(other) != parent)
        .map(|other| other.link())
        .collect::<Vec<_>>();
    if !others.is_empty() {
        let lang = graph.site().lang.clone();
        output.push(' ');
        output.push_str(&message(i18n::ALSO_IN_CATEGORIES, &lang, &[&others.join(", ")]));
    }
    output.push('\n');

    let subcategories = graph.subcategories(category)?;
    if depth < max_depth {
        for subcategory in &subcategories {
            render_node(graph, subcategory, depth + 1, Some(category), max_depth, output)?;
        }
    } else if !subcategories.is_empty() {
        output.push_str(&"#".repeat(depth + 1));
        output.push_str("[...]\n");
    }
    Ok(())
}

/// Append a rendered tree to `path` as UTF-8, creating the file if needed.
pub fn append_tree(path: &Path, tree: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(tree.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "saved category tree");
    Ok(())
}
