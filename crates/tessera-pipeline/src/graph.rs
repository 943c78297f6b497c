use std::collections::{HashMap, HashSet, VecDeque};

use crate::step::Step;

/// Graph structure for traversal and analysis.
///
/// Nodes keep the order in which steps were declared.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Step names in declaration order.
  nodes: Vec<String>,
  /// Adjacency list: step -> list of downstream steps.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: step -> list of upstream steps, in `needs` order.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Steps with no incoming edges.
  entry_points: Vec<String>,
  /// Steps with multiple incoming edges.
  join_points: HashSet<String>,
}

impl Graph {
  /// Build a graph from steps. Every name in `needs` must be a step.
  pub fn new(steps: &[Step]) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for step in steps {
      adjacency.entry(step.name.clone()).or_default();
      reverse_adjacency.entry(step.name.clone()).or_default();
    }

    for step in steps {
      for predecessor in &step.needs {
        adjacency
          .entry(predecessor.clone())
          .or_default()
          .push(step.name.clone());
        reverse_adjacency
          .entry(step.name.clone())
          .or_default()
          .push(predecessor.clone());
      }
    }

    let nodes: Vec<String> = steps.iter().map(|s| s.name.clone()).collect();

    let entry_points = nodes
      .iter()
      .filter(|id| reverse_adjacency.get(*id).is_none_or(|v| v.is_empty()))
      .cloned()
      .collect();

    let join_points = reverse_adjacency
      .iter()
      .filter(|(_, incoming)| incoming.len() > 1)
      .map(|(id, _)| id.clone())
      .collect();

    Self {
      nodes,
      adjacency,
      reverse_adjacency,
      entry_points,
      join_points,
    }
  }

  /// Step names in declaration order.
  pub fn nodes(&self) -> &[String] {
    &self.nodes
  }

  /// Steps with no predecessors; they receive the pipeline input.
  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  pub fn downstream(&self, step: &str) -> &[String] {
    self
      .adjacency
      .get(step)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  pub fn upstream(&self, step: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(step)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Check if a step has multiple predecessors.
  pub fn is_join_point(&self, step: &str) -> bool {
    self.join_points.contains(step)
  }

  /// Steps that take part in a cycle, in declaration order. Empty when the
  /// graph is acyclic.
  ///
  /// Repeatedly removes steps with no remaining incoming edges; whatever is
  /// left still has an upstream step that can never finish.
  pub fn cyclic_steps(&self) -> Vec<String> {
    let mut in_degree: HashMap<&str, usize> = self
      .nodes
      .iter()
      .map(|id| (id.as_str(), self.upstream(id).len()))
      .collect();

    let mut queue: VecDeque<&str> = self
      .nodes
      .iter()
      .map(String::as_str)
      .filter(|id| in_degree[id] == 0)
      .collect();

    while let Some(current) = queue.pop_front() {
      for successor in self.downstream(current) {
        if let Some(degree) = in_degree.get_mut(successor.as_str()) {
          *degree -= 1;
          if *degree == 0 {
            queue.push_back(successor.as_str());
          }
        }
      }
    }

    self
      .nodes
      .iter()
      .filter(|id| in_degree[id.as_str()] > 0)
      .cloned()
      .collect()
  }
}
