use std::fmt;

use crate::Value;

/// A segment in a path addressing a live instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object field access by declared name
    Field(String),

    /// Array element access by position
    Index(usize),
}

/// Location of one instance inside the slice handed to the resolver.
///
/// The first segment is always the index of the root instance.
///
/// # Examples
///
/// - `[3]` is the fourth root instance
/// - `[0].Customer` is the object in the `Customer` field of the first root
/// - `[0].Lines[2]` is the third element of its `Lines` list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct InstancePath(Vec<PathSegment>);

impl InstancePath {
    pub fn root(index: usize) -> Self {
        InstancePath(vec![PathSegment::Index(index)])
    }

    pub fn field(&self, name: impl Into<String>) -> Self {
        self.child(PathSegment::Field(name.into()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.child(PathSegment::Index(index))
    }

    fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        InstancePath(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// The instance this path points at. `None` when any step is missing.
    pub fn get<'a>(&self, roots: &'a [Value]) -> Option<&'a Value> {
        let (first, rest) = self.0.split_first()?;
        let PathSegment::Index(index) = first else {
            return None;
        };
        rest.iter()
            .try_fold(roots.get(*index)?, |current, segment| step(current, segment))
    }

    pub fn get_mut<'a>(&self, roots: &'a mut [Value]) -> Option<&'a mut Value> {
        let (first, rest) = self.0.split_first()?;
        let PathSegment::Index(index) = first else {
            return None;
        };
        let mut current = roots.get_mut(*index)?;
        for segment in rest {
            current = match (current, segment) {
                (Value::Object(map), PathSegment::Field(key)) => map.get_mut(key)?,
                (Value::Array(items), PathSegment::Index(i)) => items.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

fn step<'a>(current: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match (current, segment) {
        (Value::Object(map), PathSegment::Field(key)) => map.get(key),
        (Value::Array(items), PathSegment::Index(i)) => items.get(*i),
        _ => None,
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            match segment {
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Value> {
        let line: Value = [("Sku", Value::from("A-1"))].into_iter().collect();
        let order: Value = [("Lines", Value::Array(vec![line]))].into_iter().collect();
        vec![Value::Null, order]
    }

    #[test]
    fn nested_lookup() {
        let roots = sample();
        let path = InstancePath::root(1).field("Lines").index(0);
        assert_eq!(path.to_string(), "[1].Lines[0]");
        assert_eq!(
            path.get(&roots).and_then(|line| line.get("Sku")),
            Some(&Value::from("A-1"))
        );
    }

    #[test]
    fn missing_steps_are_none() {
        let mut roots = sample();
        assert!(InstancePath::root(0).field("Lines").get(&roots).is_none());
        assert!(InstancePath::root(1).field("Lines").index(5).get_mut(&mut roots).is_none());
        assert!(InstancePath::root(9).get(&roots).is_none());
    }
}
