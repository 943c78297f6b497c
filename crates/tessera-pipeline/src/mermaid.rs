//! Mermaid rendering of a pipeline.

use std::fmt::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::pipeline::Pipeline;

/// Render the pipeline as a top-down mermaid flowchart.
///
/// Repeated steps show their fan-out: a split node, one node per
/// repetition, and a join node that feeds the successors.
pub fn to_mermaid(pipeline: &Pipeline) -> String {
  let graph = pipeline.graph();
  let mut out = String::from("graph TD\n");

  for step in pipeline.steps() {
    let name = &step.name;
    let successors = graph.downstream(name);

    match step.kind.repetitions() {
      Some(repetitions) => {
        let _ = writeln!(out, "  {name}{{ }}");
        let _ = writeln!(out, "  {name}_join{{ }}");
        for i in 0..repetitions {
          let _ = writeln!(out, "  {name}_{i}({name}_{i})");
          let _ = writeln!(out, "  {name} --> {name}_{i}");
          let _ = writeln!(out, "  {name}_{i} --> {name}_join");
        }
        for successor in successors {
          let _ = writeln!(out, "  {name}_join --> {successor}");
        }
      }
      None => {
        let _ = writeln!(out, "  {name}({name})");
        for successor in successors {
          let _ = writeln!(out, "  {name} --> {successor}");
        }
      }
    }
  }

  out
}

/// Link to an SVG rendering of `diagram` on mermaid.ink.
pub fn mermaid_url(diagram: &str) -> String {
  format!(
    "https://mermaid.ink/svg/{}?theme=dark",
    STANDARD.encode(diagram.as_bytes())
  )
}
