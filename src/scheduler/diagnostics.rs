use std::collections::HashMap;
use std::fmt::{Display, Formatter, Write};

use crate::engine::OrderToken;
use crate::scheduler::{Scheduler, TaskExecution};

/// Execution metrics of a single [`Scheduler::execute_all`] pass.
///
/// Only tasks invoked directly by the pass are recorded. Tasks computed on
/// demand as a producer of another task are folded into that task's
/// duration.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Execution metrics keyed by task.
    pub execution_times: HashMap<OrderToken, TaskExecution>,
}

impl Diagnostics {
    /// Renders the task graph as a Mermaid diagram, color-coded by execution
    /// duration.
    ///
    /// * **Green** to **Red**: fast to slow, invoked by this pass
    /// * **Blue**: already computed before the pass
    /// * **Grey**: never computed
    pub fn render_mermaid(&self, scheduler: &Scheduler) -> String {
        Mermaid {
            diagnostics: self,
            scheduler,
        }
        .to_string()
    }
}

struct Mermaid<'a> {
    diagnostics: &'a Diagnostics,
    scheduler: &'a Scheduler,
}

impl Mermaid<'_> {
    fn bounds(&self) -> (f64, f64) {
        let times = &self.diagnostics.execution_times;

        let min = times
            .values()
            .map(|t| t.duration.as_secs_f64())
            .fold(f64::MAX, f64::min);
        let max = times
            .values()
            .map(|t| t.duration.as_secs_f64())
            .fold(f64::MIN, f64::max);

        if min > max {
            return (0.0, 1.0);
        }

        // Avoid divide by zero if all tasks took same time
        if (max - min).abs() < f64::EPSILON {
            return (min, min + 1.0);
        }

        (min, max)
    }
}

impl Display for Mermaid<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let graph = self.scheduler.graph();
        let (min, max) = self.bounds();

        writeln!(f, "graph LR")?;

        for index in graph.node_indices() {
            let task = &graph[index];
            let token = task.token();

            let (label, color) = match self.diagnostics.execution_times.get(&token) {
                Some(exec) => {
                    let t = (exec.duration.as_secs_f64() - min) / (max - min);
                    (format!("{:.2?}", exec.duration), gradient(t))
                }
                None if task.is_computed() => ("Cached".to_string(), "#ADD8E6".to_string()),
                None => ("Pending".to_string(), "#D3D3D3".to_string()),
            };

            writeln!(
                f,
                "    {}[\"{}: {}\\n{}\"]",
                token.index(),
                token,
                HtmlSafe(task.result_type().name()),
                label
            )?;
            writeln!(f, "    style {} fill:{}", token.index(), color)?;
        }

        for edge in graph.raw_edges() {
            writeln!(f, "    {} --> {}", edge.source().index(), edge.target().index())?;
        }

        Ok(())
    }
}

/// Green (0.0) through yellow (0.5) to red (1.0).
fn gradient(t: f64) -> String {
    let t = t.clamp(0.0, 1.0);

    let (r, g, b) = if t < 0.5 {
        ((255.0 * t * 2.0) as u8, 255, 0)
    } else {
        (255, (255.0 * (1.0 - (t - 0.5) * 2.0)) as u8, 0)
    };

    format!("#{:02X}{:02X}{:02X}", r, g, b)
}

struct HtmlSafe<'a>(&'a str);

impl Display for HtmlSafe<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for c in self.0.chars() {
            match c {
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '&' => f.write_str("&amp;")?,
                '"' => f.write_str("&quot;")?,
                _ => f.write_char(c)?,
            }
        }
        Ok(())
    }
}
