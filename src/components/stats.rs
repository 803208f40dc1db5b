//! Per-frame statistics transformer.

use crate::component::{ComponentContext, ComponentResult, OutputSpec, Transformer};
use crate::stream::{Stream, StreamDescriptor};
use crate::types::SampleKind;

const STATS: [&str; 4] = ["mean", "min", "max", "energy"];

/// Summarises every input dimension of a frame into mean, min, max and
/// energy (mean square). Outputs one `F64` sample per frame with
/// `4 × total input dims` values, ordered source by source.
#[derive(Debug, Clone)]
pub struct FrameStats {
    name: String,
}

impl FrameStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Transformer for FrameStats {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe_output(&self, inputs: &[StreamDescriptor]) -> OutputSpec {
        let labels: Vec<String> = inputs
            .iter()
            .flat_map(|d| (0..d.dim).map(move |i| d.label(i)))
            .flat_map(|label| STATS.iter().map(move |s| format!("{}.{}", label, s)))
            .collect();
        OutputSpec::new(SampleKind::F64, labels.len()).with_labels(labels)
    }

    fn output_samples(&self, _frames: &[usize]) -> usize {
        1
    }

    fn transform(&mut self, _ctx: &ComponentContext, inputs: &[Stream], output: &mut Stream) -> ComponentResult<()> {
        let mut index = 0;
        for input in inputs {
            for dim in 0..input.dim() {
                let summary = summarize(input.channel_values(dim));
                for value in summary {
                    output.set_value(0, index, value);
                    index += 1;
                }
            }
        }
        Ok(())
    }
}

/// `[mean, min, max, energy]` of `values`, all zero when empty
fn summarize(values: impl Iterator<Item = f64>) -> [f64; 4] {
    let mut count = 0usize;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values {
        count += 1;
        sum += v;
        sum_sq += v * v;
        min = min.min(v);
        max = max.max(v);
    }
    if count == 0 {
        return [0.0; 4];
    }
    let n = count as f64;
    [sum / n, min, max, sum_sq / n]
}
