//! Plan rendering and metadata-only descriptions
//!
//! Output is deterministic: the same plan always renders the same text.

use std::fmt;

use crate::schema::LogicalSchema;

use super::plan::{Engine, NodeKind, PlanNode, QueryPlan};

/// One operator line of an explain tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainLine {
    pub depth: usize,
    pub engine: Engine,
    pub operator: &'static str,
    pub detail: String,
    pub estimated_rows: u64,
}

/// Indented operator tree with engine ownership, root first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainPlan {
    pub lines: Vec<ExplainLine>,
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            write!(
                f,
                "{:indent$}{} [{}] rows<={}",
                "",
                line.operator,
                line.engine.as_str(),
                line.estimated_rows,
                indent = line.depth * 2
            )?;
            if !line.detail.is_empty() {
                write!(f, ": {}", line.detail)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Output columns and row bound of a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanDescription {
    pub schema: LogicalSchema,
    pub estimated_rows: u64,
    pub engine: Engine,
}

impl fmt::Display for PlanDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows<={} on {}",
            self.schema,
            self.estimated_rows,
            self.engine.as_str()
        )
    }
}

fn join_display<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn detail(node: &PlanNode) -> String {
    match node.kind() {
        NodeKind::Scan { dataset, columns } => format!(
            "{} [{}] partitions={}",
            dataset.root().display(),
            columns.join(", "),
            dataset.partition_count()
        ),
        NodeKind::Filter { predicate, .. } => predicate.to_string(),
        NodeKind::Project { exprs, .. } => join_display(exprs),
        NodeKind::Aggregate {
            group_by,
            aggregates,
            ..
        } => format!("by [{}] {}", group_by.join(", "), join_display(aggregates)),
        NodeKind::Sort { keys, fetch, .. } => match fetch {
            Some(n) => format!("{} fetch={}", join_display(keys), n),
            None => join_display(keys),
        },
        NodeKind::Limit { n, .. } => n.to_string(),
        NodeKind::Join { on, .. } => on
            .iter()
            .map(|(l, r)| format!("{} = {}", l, r))
            .collect::<Vec<_>>()
            .join(" AND "),
        NodeKind::BridgeOut { .. } => String::new(),
    }
}

fn walk(node: &PlanNode, depth: usize, lines: &mut Vec<ExplainLine>) {
    lines.push(ExplainLine {
        depth,
        engine: node.engine(),
        operator: node.kind().name(),
        detail: detail(node),
        estimated_rows: node.estimated_rows(),
    });
    for input in node.inputs() {
        walk(input, depth + 1, lines);
    }
}

impl QueryPlan {
    /// Operator tree of the plan
    pub fn explain(&self) -> ExplainPlan {
        let mut lines = Vec::new();
        walk(self.root(), 0, &mut lines);
        ExplainPlan { lines }
    }

    /// Output schema and estimated row bound; performs no I/O
    pub fn describe(&self) -> PlanDescription {
        PlanDescription {
            schema: self.schema().clone(),
            estimated_rows: self.estimated_rows(),
            engine: self.engine(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{DatasetHandle, PartitionDescriptor};
    use crate::planner::{col, lit, SortKey};
    use crate::schema::{RawSchemaSpec, SchemaRegistry};

    fn plan() -> QueryPlan {
        let schema =
            SchemaRegistry::bind(&RawSchemaSpec::new().column("name", "utf8").column("v", "int64"))
                .unwrap();
        let ds = DatasetHandle::new(
            "data".into(),
            schema,
            vec![Arc::new(PartitionDescriptor::new("data/a.scol", 8, 0))],
        );
        QueryPlan::scan(&ds, &["name", "v"])
            .unwrap()
            .filter(col("v").gt(lit(1i64)))
            .unwrap()
            .filter_or_delegate(col("name").like("a%"))
            .unwrap()
            .sort(vec![SortKey::desc("v")])
            .unwrap()
            .limit(2)
            .unwrap()
    }

    #[test]
    fn test_explain_tree() {
        let text = plan().explain().to_string();
        let expected = "\
TopK [secondary] rows<=2: v DESC fetch=2
  Filter [secondary] rows<=8: name LIKE 'a%'
    BridgeOut [secondary] rows<=8
      Filter [primary] rows<=8: (v > 1)
        Scan [primary] rows<=8: data [name, v] partitions=1
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_describe_is_metadata_only() {
        let description = plan().describe();
        assert_eq!(description.estimated_rows, 2);
        assert_eq!(description.engine, Engine::Secondary);
        assert_eq!(description.to_string(), "(name: utf8, v: int64) rows<=2 on secondary");
    }
}
