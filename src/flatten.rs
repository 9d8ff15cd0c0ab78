//! Taxonomy tree flattening.
//!
//! Converts a nested forest of [`TaxonomyNode`]s into pre-order
//! [`FlatTaxonomyRecord`]s carrying depth and parent linkage, and back.
//!
//! Traversal uses an explicit stack, so tree depth is bounded by memory
//! rather than by the call stack. Codes are not deduplicated: a code that
//! appears twice in the source yields two records.

use crate::errors::TaxonomyError;
use crate::models::{FlatTaxonomyRecord, TaxonomyNode};

/// Flatten a forest of root nodes (level 0, no parent).
pub fn flatten(nodes: Vec<TaxonomyNode>) -> Vec<FlatTaxonomyRecord> {
    flatten_under(nodes, 0, None)
}

/// Flatten `nodes` as children of `parent` (`(name, code)`) at `level`.
///
/// Each node is emitted before its subtree, and siblings keep input order.
pub fn flatten_under(
    nodes: Vec<TaxonomyNode>,
    level: u32,
    parent: Option<(String, String)>,
) -> Vec<FlatTaxonomyRecord> {
    let mut records = Vec::new();
    let mut stack: Vec<(TaxonomyNode, u32, Option<(String, String)>)> = nodes
        .into_iter()
        .rev()
        .map(|node| (node, level, parent.clone()))
        .collect();

    while let Some((node, level, parent)) = stack.pop() {
        let TaxonomyNode {
            label,
            code,
            children,
        } = node;

        for child in children.into_iter().rev() {
            stack.push((child, level + 1, Some((label.clone(), code.clone()))));
        }

        let (parent_name, parent_code) = parent.unzip();
        records.push(FlatTaxonomyRecord {
            name: label,
            code,
            level,
            parent_name,
            parent_code,
        });
    }

    records
}

/// Rebuild the forest from pre-order records produced by [`flatten`].
///
/// Fails if a record skips a level or names a parent code other than the
/// code of the open node one level up.
pub fn rebuild(records: &[FlatTaxonomyRecord]) -> Result<Vec<TaxonomyNode>, TaxonomyError> {
    let mut roots = Vec::new();
    let mut open: Vec<TaxonomyNode> = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let broken = || TaxonomyError::BrokenLinkage {
            index,
            code: record.code.clone(),
        };

        let level = record.level as usize;
        if level > open.len() {
            return Err(broken());
        }
        while open.len() > level {
            close_top(&mut open, &mut roots);
        }

        match open.last() {
            Some(parent) if record.parent_code.as_deref() != Some(parent.code.as_str()) => {
                return Err(broken());
            }
            None if record.parent_code.is_some() => return Err(broken()),
            _ => {}
        }

        open.push(TaxonomyNode::leaf(record.name.clone(), record.code.clone()));
    }

    while !open.is_empty() {
        close_top(&mut open, &mut roots);
    }
    Ok(roots)
}

fn close_top(open: &mut Vec<TaxonomyNode>, roots: &mut Vec<TaxonomyNode>) {
    if let Some(node) = open.pop() {
        match open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => roots.push(node),
        }
    }
}
