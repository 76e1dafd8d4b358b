use crate::cell::Cell;
use crate::error::CellError;
use indexmap::{IndexMap, IndexSet};

/// Who supplies a variable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Producer {
    Cell(String),
    /// Several cells claim the name, none of them wins.
    Conflict(Vec<String>),
}

/// Variable to producer mapping plus the names each cell reads.
///
/// Edited one cell at a time, so registering or replacing a cell costs only
/// its own outputs and inputs. Never sorted: evaluation order is discovered
/// while resolving.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    producers: IndexMap<String, Producer>,
    /// Input name to the cells reading it, in registration order.
    readers: IndexMap<String, IndexSet<String>>,
}

/// Every name a cell answers to: its outputs, then its own name.
fn claimed_names(cell: &Cell) -> impl Iterator<Item = &String> {
    cell.outputs.iter().chain([&cell.name])
}

impl Graph {
    pub fn build<'a>(cells: impl IntoIterator<Item = &'a Cell>) -> Self {
        let mut graph = Graph::default();
        for cell in cells {
            graph.insert(cell);
        }
        graph
    }

    /// Register the claims and inputs of `cell`.
    ///
    /// Returns the names that became contested, their cached values no
    /// longer belong to a single cell.
    pub fn insert(&mut self, cell: &Cell) -> Vec<String> {
        let mut contested = Vec::new();
        for name in claimed_names(cell) {
            if self.claim(name, &cell.name) {
                contested.push(name.clone());
            }
        }
        for input in &cell.inputs {
            self.readers
                .entry(input.clone())
                .or_default()
                .insert(cell.name.clone());
        }
        contested
    }

    /// Withdraw the claims and inputs of `cell`.
    ///
    /// Returns the names that were contested and still have a producer.
    pub fn remove(&mut self, cell: &Cell) -> Vec<String> {
        let mut settled = Vec::new();
        for name in claimed_names(cell) {
            let remaining: Vec<String> = match self.producers.get(name) {
                Some(Producer::Cell(owner)) if *owner == cell.name => Vec::new(),
                Some(Producer::Conflict(cells)) if cells.contains(&cell.name) => cells
                    .iter()
                    .filter(|other| **other != cell.name)
                    .cloned()
                    .collect(),
                _ => continue,
            };
            match remaining.as_slice() {
                [] => {
                    self.producers.shift_remove(name);
                }
                [only] => {
                    self.producers.insert(name.clone(), Producer::Cell(only.clone()));
                    settled.push(name.clone());
                }
                _ => {
                    self.producers.insert(name.clone(), Producer::Conflict(remaining.clone()));
                    settled.push(name.clone());
                }
            }
        }
        for input in &cell.inputs {
            let Some(readers) = self.readers.get_mut(input) else {
                continue;
            };
            readers.shift_remove(&cell.name);
            if readers.is_empty() {
                self.readers.shift_remove(input);
            }
        }
        settled
    }

    /// Returns whether `name` is contested after the claim.
    fn claim(&mut self, name: &str, cell: &str) -> bool {
        let cells = match self.producers.get_mut(name) {
            None => {
                self.producers.insert(name.to_owned(), Producer::Cell(cell.to_owned()));
                return false;
            }
            Some(Producer::Cell(existing)) if existing == cell => return false,
            Some(producer @ Producer::Cell(_)) => {
                let Producer::Cell(existing) = producer else {
                    return false;
                };
                let cells = vec![existing.clone(), cell.to_owned()];
                *producer = Producer::Conflict(cells.clone());
                cells
            }
            Some(Producer::Conflict(cells)) => {
                if !cells.iter().any(|existing| existing == cell) {
                    cells.push(cell.to_owned());
                }
                cells.clone()
            }
        };
        log::warn!("'{name}' is produced by several cells: {}", cells.join(", "));
        true
    }

    pub fn producer(&self, name: &str) -> Option<&Producer> {
        self.producers.get(name)
    }

    pub fn producers(&self) -> impl Iterator<Item = (&str, &Producer)> {
        self.producers.iter().map(|(name, producer)| (name.as_str(), producer))
    }

    /// Every name claimed by more than one cell, as the failure stored for it.
    pub fn conflicts(&self) -> Vec<CellError> {
        self.producers
            .iter()
            .filter_map(|(name, producer)| match producer {
                Producer::Conflict(cells) => Some(CellError::DuplicateProducer {
                    name: name.clone(),
                    cells: cells.clone(),
                }),
                Producer::Cell(_) => None,
            })
            .collect()
    }

    /// Producer to consumer pairs without duplicates, a cell reading its own
    /// output included. Every claimant of a contested name counts.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        let mut edges = IndexSet::new();
        for (name, readers) in &self.readers {
            let producers: &[String] = match self.producers.get(name) {
                Some(Producer::Cell(cell)) => std::slice::from_ref(cell),
                Some(Producer::Conflict(cells)) => cells,
                None => &[],
            };
            for producer in producers {
                for reader in readers {
                    edges.insert((producer.as_str(), reader.as_str()));
                }
            }
        }
        edges.into_iter().collect()
    }

    pub fn dependencies(&self, cell: &str) -> Vec<&str> {
        self.edges()
            .into_iter()
            .filter(|(_, consumer)| *consumer == cell)
            .map(|(producer, _)| producer)
            .collect()
    }

    pub fn dependents(&self, cell: &str) -> Vec<&str> {
        self.edges()
            .into_iter()
            .filter(|(producer, _)| *producer == cell)
            .map(|(_, consumer)| consumer)
            .collect()
    }

    /// `(cell, input)` pairs whose input has no producer.
    pub fn unresolved(&self) -> Vec<(&str, &str)> {
        self.readers
            .iter()
            .filter(|(name, _)| !self.producers.contains_key(*name))
            .flat_map(|(name, readers)| readers.iter().map(move |reader| (reader.as_str(), name.as_str())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::compile_cell;

    fn cell(name: &str, source: &str, outputs: &[&str]) -> Cell {
        let outputs: Vec<String> = outputs.iter().map(|o| o.to_string()).collect();
        compile_cell(name, source, &outputs)
    }

    #[test]
    fn test_producers_and_edges() {
        let cells = [
            cell("data", "xs = List/range(10)\nn = 3", &["xs", "n"]),
            cell("total", "List/sum(xs) * n", &[]),
            cell("report", "Text/from(total)", &[]),
        ];
        let graph = Graph::build(&cells);
        assert_eq!(graph.producer("xs"), Some(&Producer::Cell("data".into())));
        assert_eq!(graph.producer("data"), Some(&Producer::Cell("data".into())));
        assert_eq!(graph.producer("total"), Some(&Producer::Cell("total".into())));
        assert_eq!(graph.dependencies("total"), vec!["data"]);
        assert_eq!(graph.dependents("total"), vec!["report"]);
        assert!(graph.conflicts().is_empty());
        assert!(graph.unresolved().is_empty());
    }

    #[test]
    fn test_duplicate_producer_is_a_conflict() {
        let cells = [
            cell("a", "x = 1", &["x"]),
            cell("b", "x = 2", &["x"]),
            cell("c", "x + 1", &[]),
        ];
        let graph = Graph::build(&cells);
        assert_eq!(
            graph.producer("x"),
            Some(&Producer::Conflict(vec!["a".into(), "b".into()]))
        );
        assert_eq!(
            graph.conflicts(),
            vec![CellError::DuplicateProducer {
                name: "x".into(),
                cells: vec!["a".into(), "b".into()],
            }]
        );
        assert_eq!(graph.dependencies("c"), vec!["a", "b"]);
    }

    #[test]
    fn test_cell_name_colliding_with_output() {
        let cells = [cell("x", "y = 1", &["y"]), cell("other", "x = 2", &["x"])];
        let graph = Graph::build(&cells);
        assert!(matches!(graph.producer("x"), Some(Producer::Conflict(cells)) if cells.len() == 2));
    }

    #[test]
    fn test_unresolved_inputs() {
        let cells = [cell("c", "missing * 2", &[])];
        let graph = Graph::build(&cells);
        assert_eq!(graph.unresolved(), vec![("c", "missing")]);
    }

    #[test]
    fn test_edits_match_a_fresh_build() {
        let a = cell("a", "x = 1", &["x"]);
        let b = cell("b", "x = 2", &["x"]);
        let c = cell("c", "x + y", &[]);
        let d = cell("d", "y = 5", &["y"]);

        let mut graph = Graph::default();
        assert!(graph.insert(&c).is_empty());
        assert!(graph.insert(&a).is_empty());
        assert_eq!(graph.unresolved(), vec![("c", "y")]);
        assert_eq!(graph.insert(&b), vec!["x".to_string()]);
        graph.insert(&d);
        assert_eq!(graph, Graph::build([&c, &a, &b, &d]));

        assert_eq!(graph.remove(&a), vec!["x".to_string()]);
        assert_eq!(graph.producer("x"), Some(&Producer::Cell("b".into())));
        assert!(graph.producer("a").is_none());
        assert_eq!(graph, Graph::build([&c, &b, &d]));

        graph.remove(&c);
        assert!(graph.dependents("b").is_empty());
        assert_eq!(graph, Graph::build([&b, &d]));
    }

    #[test]
    fn test_replacing_a_cell_moves_its_claims() {
        let old = cell("a", "x = 1", &["x"]);
        let new = cell("a", "y = 1", &["y"]);
        let reader = cell("r", "x + 1", &[]);
        let mut graph = Graph::build([&old, &reader]);
        graph.remove(&old);
        graph.insert(&new);
        assert!(graph.producer("x").is_none());
        assert_eq!(graph.producer("y"), Some(&Producer::Cell("a".into())));
        assert_eq!(graph.unresolved(), vec![("r", "x")]);
    }
}
