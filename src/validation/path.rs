//! The path grammar rules use to reach into the serialized document
//! tree: dotted field access, `[n]` indexing, and `[*]` wildcard
//! iteration over arrays. See SPEC_FULL.md §4.6.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Field(String),
    Index(usize),
    Wildcard,
}

/// Parses a path like `claims[*].services[0].procedure_code` into a
/// sequence of field/index/wildcard steps.
fn parse(path: &str) -> Vec<Step> {
    let mut steps = Vec::new();
    for raw_segment in path.split('.') {
        let mut rest = raw_segment;
        if let Some(bracket) = rest.find('[') {
            let field = &rest[..bracket];
            if !field.is_empty() {
                steps.push(Step::Field(field.to_string()));
            }
            rest = &rest[bracket..];
            while let Some(end) = rest.find(']') {
                let inner = &rest[1..end];
                if inner == "*" {
                    steps.push(Step::Wildcard);
                } else if let Ok(index) = inner.parse::<usize>() {
                    steps.push(Step::Index(index));
                }
                rest = &rest[end + 1..];
            }
        } else if !rest.is_empty() {
            steps.push(Step::Field(rest.to_string()));
        }
    }
    steps
}

/// Resolves `path` against `root`, returning every matched leaf (or
/// intermediate node, if the path ends mid-tree) paired with the
/// concrete path string that reached it (wildcards replaced with the
/// actual index, for diagnostic messages).
pub fn evaluate<'a>(root: &'a Value, path: &str) -> Vec<(String, &'a Value)> {
    let steps = parse(path);
    let mut frontier: Vec<(String, &Value)> = vec![(String::new(), root)];

    for step in steps {
        let mut next = Vec::new();
        for (prefix, value) in frontier {
            match &step {
                Step::Field(name) => {
                    if let Some(child) = value.get(name.as_str()) {
                        let concrete = if prefix.is_empty() { name.clone() } else { format!("{prefix}.{name}") };
                        next.push((concrete, child));
                    }
                }
                Step::Index(i) => {
                    if let Some(child) = value.get(*i) {
                        next.push((format!("{prefix}[{i}]"), child));
                    }
                }
                Step::Wildcard => {
                    if let Some(array) = value.as_array() {
                        for (i, child) in array.iter().enumerate() {
                            next.push((format!("{prefix}[{i}]"), child));
                        }
                    }
                }
            }
        }
        frontier = next;
    }

    frontier
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dotted_field_access() {
        let tree = json!({ "a": { "b": 5 } });
        let matches = evaluate(&tree, "a.b");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].1, &json!(5));
    }

    #[test]
    fn wildcard_over_array() {
        let tree = json!({ "claims": [ { "total_paid": 1 }, { "total_paid": 2 } ] });
        let matches = evaluate(&tree, "claims[*].total_paid");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].0, "claims[0].total_paid");
        assert_eq!(matches[1].0, "claims[1].total_paid");
    }

    #[test]
    fn missing_path_yields_no_matches() {
        let tree = json!({ "a": 1 });
        assert!(evaluate(&tree, "b.c").is_empty());
    }
}
